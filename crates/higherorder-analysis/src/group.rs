//! Causal self-containment of entity groups.
//!
//! All functions take an impact map keyed by directed `(source, target)`
//! pairs; labels are ignored, only edge membership matters. Empty inputs
//! yield the zero or one baselines instead of errors, since these are
//! reporting functions.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

/// Fraction of a group's impact edges that stay inside the group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupRatio {
    /// `between_count / total_count`, or 0 when `total_count` is 0.
    pub ratio: f64,
    /// Edges with both endpoints in the group.
    pub between_count: usize,
    /// Edges with at least one endpoint in the group.
    pub total_count: usize,
}

/// Weighted self-containment of a group against a random baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupStrength {
    /// `strength / expected`.
    pub normalized: f64,
    /// Internal endpoint count: 2 per fully internal edge.
    pub internal: usize,
    /// Boundary edge count: 1 per edge with exactly one endpoint inside.
    pub outgoing: usize,
    /// `internal / (internal + outgoing)`, or 0 when both are 0.
    pub strength: f64,
    /// Strength expected for a random group of the same size.
    pub expected: f64,
}

/// Result of [`find_self_controlling_group`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfControllingGroup<E> {
    /// Members in the order they were added; the first is the seed.
    pub members: Vec<E>,
    /// Strength of the final group.
    pub strength: GroupStrength,
}

// Counts are bounded by the impact map size; representable as f64.
#[allow(clippy::cast_precision_loss)]
fn fraction(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Share of the impact edges touching `group` that are fully internal.
pub fn impact_group_ratio<E: Ord, L>(
    impacts: &BTreeMap<(E, E), L>,
    group: &BTreeSet<E>,
) -> GroupRatio {
    let mut between_count: usize = 0;
    let mut total_count: usize = 0;
    for (source, target) in impacts.keys() {
        let source_in = group.contains(source);
        let target_in = group.contains(target);
        if source_in || target_in {
            total_count = total_count.saturating_add(1);
            if source_in && target_in {
                between_count = between_count.saturating_add(1);
            }
        }
    }
    GroupRatio {
        ratio: fraction(between_count, total_count),
        between_count,
        total_count,
    }
}

/// Expected internal fraction for a uniformly random group of `group_size`
/// out of `total_nodes`: `(k - 1) / (n - 1)`, or 1 when `n <= 1`,
/// `k <= 1`, or `k >= n`.
pub fn expected_strength(group_size: usize, total_nodes: usize) -> f64 {
    if total_nodes <= 1 || group_size <= 1 || group_size >= total_nodes {
        return 1.0;
    }
    fraction(group_size.saturating_sub(1), total_nodes.saturating_sub(1))
}

/// Weighted self-containment of `group` among `total_nodes` nodes.
pub fn group_impact_strength<E: Ord, L>(
    impacts: &BTreeMap<(E, E), L>,
    group: &BTreeSet<E>,
    total_nodes: usize,
) -> GroupStrength {
    let mut internal: usize = 0;
    let mut outgoing: usize = 0;
    for (source, target) in impacts.keys() {
        match (group.contains(source), group.contains(target)) {
            (true, true) => internal = internal.saturating_add(2),
            (true, false) | (false, true) => outgoing = outgoing.saturating_add(1),
            (false, false) => {}
        }
    }
    let strength = fraction(internal, internal.saturating_add(outgoing));
    let expected = expected_strength(group.len(), total_nodes);
    GroupStrength {
        normalized: strength / expected,
        internal,
        outgoing,
        strength,
        expected,
    }
}

/// Greedily grow the group most causally self-contained relative to chance.
///
/// Seeds with the node of highest impact degree (first in `nodes` order on
/// ties). Each round adds the candidate giving the highest normalized
/// strength. A candidate is committed while the group is smaller than
/// `min_group_size`, or when it strictly improves on the current normalized
/// strength; otherwise the search stops. Returns `None` when `nodes` is
/// empty.
pub fn find_self_controlling_group<E: Ord + Clone, L>(
    impacts: &BTreeMap<(E, E), L>,
    nodes: &[E],
    min_group_size: usize,
) -> Option<SelfControllingGroup<E>> {
    let mut degree: BTreeMap<&E, usize> = BTreeMap::new();
    for (source, target) in impacts.keys() {
        let d = degree.entry(source).or_insert(0);
        *d = d.saturating_add(1);
        let d = degree.entry(target).or_insert(0);
        *d = d.saturating_add(1);
    }

    let mut seed: Option<(&E, usize)> = None;
    for node in nodes {
        let node_degree = degree.get(node).copied().unwrap_or(0);
        if seed.is_none_or(|(_, best)| node_degree > best) {
            seed = Some((node, node_degree));
        }
    }
    let (seed, _) = seed?;

    let total_nodes = nodes.len();
    let mut members = vec![seed.clone()];
    let mut group: BTreeSet<E> = BTreeSet::from([seed.clone()]);
    let mut current = group_impact_strength(impacts, &group, total_nodes);

    loop {
        let mut best: Option<(&E, GroupStrength)> = None;
        for candidate in nodes.iter().filter(|n| !group.contains(*n)) {
            let mut trial = group.clone();
            trial.insert(candidate.clone());
            let strength = group_impact_strength(impacts, &trial, total_nodes);
            if best.is_none_or(|(_, b)| strength.normalized > b.normalized) {
                best = Some((candidate, strength));
            }
        }
        let Some((candidate, strength)) = best else {
            break;
        };
        if group.len() >= min_group_size && strength.normalized <= current.normalized {
            break;
        }
        group.insert(candidate.clone());
        members.push(candidate.clone());
        current = strength;
        debug!(
            size = group.len(),
            normalized = current.normalized,
            "self-controlling group grown"
        );
    }

    Some(SelfControllingGroup {
        members,
        strength: current,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn edges(pairs: &[(char, char)]) -> BTreeMap<(char, char), &'static str> {
        pairs.iter().map(|&pair| (pair, "x")).collect()
    }

    fn set(members: &[char]) -> BTreeSet<char> {
        members.iter().copied().collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn ratio_counts_internal_edges() {
        let mut impacts = BTreeMap::new();
        impacts.insert(('A', 'B'), "x");
        impacts.insert(('A', 'C'), "y");
        let ratio = impact_group_ratio(&impacts, &set(&['A', 'B']));
        assert!(close(ratio.ratio, 0.5));
        assert_eq!(ratio.between_count, 1);
        assert_eq!(ratio.total_count, 2);
    }

    #[test]
    fn ratio_of_untouched_group_is_zero() {
        let ratio = impact_group_ratio(&edges(&[('A', 'B')]), &set(&['Z']));
        assert_eq!((ratio.between_count, ratio.total_count), (0, 0));
        assert!(close(ratio.ratio, 0.0));
    }

    #[test]
    fn expected_strength_baselines() {
        assert!(close(expected_strength(3, 5), 0.5));
        assert!(close(expected_strength(1, 5), 1.0));
        assert!(close(expected_strength(4, 1), 1.0));
        assert!(close(expected_strength(5, 5), 1.0));
    }

    #[test]
    fn strength_weights_internal_edges_double() {
        let impacts = edges(&[('A', 'B'), ('B', 'C'), ('C', 'D')]);
        let strength = group_impact_strength(&impacts, &set(&['A', 'B']), 4);
        assert_eq!(strength.internal, 2);
        assert_eq!(strength.outgoing, 1);
        assert!(close(strength.strength, 2.0 / 3.0));
        assert!(close(strength.expected, 1.0 / 3.0));
        assert!(close(strength.normalized, 2.0));
    }

    #[test]
    fn whole_group_has_unit_baseline() {
        let impacts = edges(&[('A', 'B'), ('B', 'C')]);
        let strength = group_impact_strength(&impacts, &set(&['A', 'B', 'C']), 3);
        assert!(close(strength.expected, 1.0));
        assert!(close(strength.normalized, strength.strength));
        assert!(close(strength.strength, 1.0));
    }

    #[test]
    fn strength_without_edges_is_zero() {
        let strength = group_impact_strength(&edges(&[]), &set(&['A']), 4);
        assert_eq!((strength.internal, strength.outgoing), (0, 0));
        assert!(close(strength.strength, 0.0));
    }

    #[test]
    fn search_finds_dense_cluster() {
        // A triangle loosely attached to a chain. Adding D to the triangle
        // raises raw strength but lowers it relative to chance.
        let impacts = edges(&[
            ('A', 'B'),
            ('B', 'A'),
            ('B', 'C'),
            ('C', 'A'),
            ('A', 'C'),
            ('C', 'D'),
            ('D', 'E'),
            ('E', 'F'),
        ]);
        let nodes = ['A', 'B', 'C', 'D', 'E', 'F'];
        let found = find_self_controlling_group(&impacts, &nodes, 3).unwrap();
        assert_eq!(found.members.first(), Some(&'A'));
        let members: BTreeSet<char> = found.members.iter().copied().collect();
        assert_eq!(members, set(&['A', 'B', 'C']));
        assert!(found.strength.normalized > 1.0);
    }

    #[test]
    fn search_respects_minimum_size() {
        let impacts = edges(&[('A', 'B'), ('C', 'D')]);
        let nodes = ['A', 'B', 'C', 'D'];
        let found = find_self_controlling_group(&impacts, &nodes, 4).unwrap();
        assert_eq!(found.members.len(), 4);
    }

    #[test]
    fn search_on_no_nodes() {
        assert!(find_self_controlling_group(&edges(&[('A', 'B')]), &[], 1).is_none());
    }
}
