//! Causal impact classification between neighboring entities.
//!
//! An impact is a directed pair `(source, neighbor)` labelled with the role
//! the source plays in the neighbor's next transition. The Game of Life
//! classifier below uses exact live-neighbor counts; its conditions are
//! mutually exclusive (each is a distinct `(neighbor alive, count)` pair), so
//! every pair receives at most one label.

use core::fmt;
use std::collections::BTreeMap;

use higherorder_structures::{Entity, Lut, StateMap};
use serde::{Deserialize, Serialize};

/// Causal category of a directed impact edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLabel {
    /// Live source with a live neighbor that has exactly 3 other live
    /// neighbors: the source tips it into overpopulation.
    Kill,
    /// Live source with a live neighbor that has more than 3 other live
    /// neighbors: it dies with or without the source.
    RedundancyKill,
    /// Live source with a dead neighbor that has exactly 1 other live
    /// neighbor.
    Birth,
    /// Live source with a dead neighbor that has exactly 3 other live
    /// neighbors: the source overcrowds it.
    NoBirth,
    /// Live source with a live neighbor that has exactly 2 other live
    /// neighbors: it survives with or without the source.
    RedundancyLive,
    /// Dead source with a live neighbor that has exactly 1 live neighbor.
    NonactiveKill,
    /// Dead source with a live neighbor that has exactly 3 live neighbors.
    NonactiveLive,
    /// Dead source with a live neighbor that has exactly 2 live neighbors.
    NonactiveRedundancyLive,
    /// Dead source with a dead neighbor that has exactly 3 live neighbors.
    NonactiveBirth,
    /// Dead source with a dead neighbor that has exactly 2 live neighbors.
    NonactiveNoBirth,
}

impl ImpactLabel {
    /// Return the label's snake-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kill => "kill",
            Self::RedundancyKill => "redundancy_kill",
            Self::Birth => "birth",
            Self::NoBirth => "no_birth",
            Self::RedundancyLive => "redundancy_live",
            Self::NonactiveKill => "nonactive_kill",
            Self::NonactiveLive => "nonactive_live",
            Self::NonactiveRedundancyLive => "nonactive_redundancy_live",
            Self::NonactiveBirth => "nonactive_birth",
            Self::NonactiveNoBirth => "nonactive_no_birth",
        }
    }

    /// Whether a live source produced this label.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Kill | Self::RedundancyKill | Self::Birth | Self::NoBirth | Self::RedundancyLive
        )
    }

    /// Whether the neighbor's outcome does not depend on the source.
    pub const fn is_redundancy(self) -> bool {
        matches!(
            self,
            Self::RedundancyKill | Self::RedundancyLive | Self::NonactiveRedundancyLive
        )
    }
}

impl fmt::Display for ImpactLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed `(source, neighbor)` pairs and their labels.
pub type ImpactMap<E> = BTreeMap<(E, E), ImpactLabel>;

/// A classifier of impact edges over one state.
pub trait ImpactRule<E: Entity> {
    /// Classify the impact of every source entity on each of its neighbors.
    ///
    /// With `active_only`, dead entities originate no edges at all.
    fn classify(&self, state: &StateMap<E>, lut: &Lut<E>, active_only: bool) -> ImpactMap<E>;
}

/// Game of Life impact classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameOfLifeImpact;

impl GameOfLifeImpact {
    fn label_active(neighbour_alive: bool, other_live: usize) -> Option<ImpactLabel> {
        match (neighbour_alive, other_live) {
            (true, 3) => Some(ImpactLabel::Kill),
            (true, n) if n > 3 => Some(ImpactLabel::RedundancyKill),
            (true, 2) => Some(ImpactLabel::RedundancyLive),
            (false, 1) => Some(ImpactLabel::Birth),
            (false, 3) => Some(ImpactLabel::NoBirth),
            _ => None,
        }
    }

    fn label_nonactive(neighbour_alive: bool, live: usize) -> Option<ImpactLabel> {
        match (neighbour_alive, live) {
            (true, 1) => Some(ImpactLabel::NonactiveKill),
            (true, 2) => Some(ImpactLabel::NonactiveRedundancyLive),
            (true, 3) => Some(ImpactLabel::NonactiveLive),
            (false, 2) => Some(ImpactLabel::NonactiveNoBirth),
            (false, 3) => Some(ImpactLabel::NonactiveBirth),
            _ => None,
        }
    }
}

impl<E: Entity> ImpactRule<E> for GameOfLifeImpact {
    fn classify(&self, state: &StateMap<E>, lut: &Lut<E>, active_only: bool) -> ImpactMap<E> {
        let alive = |entity: &E| state.get(entity).is_some_and(|&v| v > 0);
        let live_count = |entity: &E| {
            lut.get(entity)
                .map_or(0, |neighbours| neighbours.iter().filter(|n| alive(n)).count())
        };

        let mut impacts = ImpactMap::new();
        for source in state.keys() {
            let source_alive = alive(source);
            if !source_alive && active_only {
                continue;
            }
            let Some(neighbours) = lut.get(source) else {
                continue;
            };
            for neighbour in neighbours {
                let neighbour_alive = alive(neighbour);
                let live = live_count(neighbour);
                let label = if source_alive {
                    Self::label_active(neighbour_alive, live.saturating_sub(1))
                } else {
                    Self::label_nonactive(neighbour_alive, live)
                };
                if let Some(label) = label {
                    impacts.insert((source.clone(), neighbour.clone()), label);
                }
            }
        }
        impacts
    }
}

/// Classify impacts after filling in entities missing from `state`.
///
/// Every entity known to `lut` (as a key or a neighbor) but absent from
/// `state` is treated as 0, so sparse states classify like full ones.
pub fn general_impact<E, I>(
    impact_rule: &I,
    state: &StateMap<E>,
    lut: &Lut<E>,
    active_only: bool,
) -> ImpactMap<E>
where
    E: Entity,
    I: ImpactRule<E> + ?Sized,
{
    let mut filled = state.clone();
    for (entity, neighbours) in lut {
        filled.entry(entity.clone()).or_insert(0);
        for neighbour in neighbours {
            filled.entry(neighbour.clone()).or_insert(0);
        }
    }
    impact_rule.classify(&filled, lut, active_only)
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Which labels an impact query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImpactKind {
    /// Every label.
    #[default]
    All,
    /// Labels produced by live sources.
    Active,
    /// Exactly one label.
    Label(ImpactLabel),
}

/// Filter for recorded impacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImpactFilter {
    /// Label selection.
    pub kind: ImpactKind,
    /// Additionally keep only redundancy labels.
    pub redundancy_only: bool,
}

impl ImpactFilter {
    /// Whether `label` passes the filter.
    pub fn matches(&self, label: ImpactLabel) -> bool {
        let kind = match self.kind {
            ImpactKind::All => true,
            ImpactKind::Active => label.is_active(),
            ImpactKind::Label(wanted) => wanted == label,
        };
        kind && (!self.redundancy_only || label.is_redundancy())
    }

    /// Keep the edges of `impacts` that pass the filter.
    pub fn apply<E: Entity>(&self, impacts: &ImpactMap<E>) -> ImpactMap<E> {
        impacts
            .iter()
            .filter(|(_, label)| self.matches(**label))
            .map(|(pair, label)| (pair.clone(), *label))
            .collect()
    }
}
