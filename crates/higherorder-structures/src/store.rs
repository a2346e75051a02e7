//! Time-indexed entity state shared by every structure variant.
//!
//! The [`EntityStore`] owns the entity set, the deduplicated connection list,
//! and each entity's value history keyed by [`TimeKey`]. Grids and graphs
//! differ only in how they build their entities and connections; everything
//! after construction (neighbor queries, time slices, history projections)
//! lives here.
//!
//! Entities are never created or destroyed after construction. Only their
//! per-timestep values grow, and past timesteps are never rewritten.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::StructureError;
use crate::time_key::{KeyName, TimeKey};
use crate::{Entity, History, Lut, StateMap, Value};

/// A timestep × entity matrix of values.
///
/// Rows follow `steps`, columns follow `entities`. Missing values are 0.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TimeArray<E> {
    /// Column order.
    pub entities: Vec<E>,
    /// Row order (timestep indices).
    pub steps: Vec<u64>,
    /// One row per step, one column per entity.
    pub values: Vec<Vec<Value>>,
}

/// Entities, connections, and per-entity value histories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityStore<E> {
    /// Entity -> timestep key -> value.
    entities: BTreeMap<E, History>,
    /// Undirected edges, each stored once.
    connections: Vec<(E, E)>,
    /// Naming scheme of the initial series.
    key_name: KeyName,
    /// Timestep the structure was created at.
    initial_time_step: u64,
    /// Base name -> highest recorded index.
    last_iterations: BTreeMap<String, u64>,
}

impl<E: Entity> EntityStore<E> {
    /// Create a store from initial values and an edge list.
    ///
    /// Every entity receives the initial key `base_name + time_step`.
    /// Edges are deduplicated as undirected pairs.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::InvalidArgument`] if an edge references an
    /// entity that is not in `initial_values`.
    pub fn new(
        initial_values: BTreeMap<E, Value>,
        connections: Vec<(E, E)>,
        key_name: KeyName,
    ) -> Result<Self, StructureError> {
        for (a, b) in &connections {
            if !initial_values.contains_key(a) || !initial_values.contains_key(b) {
                return Err(StructureError::invalid(format!(
                    "connection ({a:?}, {b:?}) references an unknown entity"
                )));
            }
        }

        let initial_key = key_name.initial_key();
        let entities = initial_values
            .into_iter()
            .map(|(entity, value)| {
                let mut history = History::new();
                history.insert(initial_key.clone(), value);
                (entity, history)
            })
            .collect();

        let mut last_iterations = BTreeMap::new();
        last_iterations.insert(key_name.base_name.clone(), key_name.index);

        Ok(Self {
            entities,
            connections: unique_connections(&connections, true),
            initial_time_step: key_name.index,
            key_name,
            last_iterations,
        })
    }

    // -------------------------------------------------------------------
    // Read-only views
    // -------------------------------------------------------------------

    /// Return an independent copy of every entity's history.
    pub fn entities(&self) -> BTreeMap<E, History> {
        self.entities.clone()
    }

    /// Return an independent copy of the connection list.
    pub fn connections(&self) -> Vec<(E, E)> {
        self.connections.clone()
    }

    /// Iterate over entity identifiers in order.
    pub fn entity_ids(&self) -> impl Iterator<Item = &E> {
        self.entities.keys()
    }

    /// Return the number of entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Whether the entity exists.
    pub fn contains(&self, entity: &E) -> bool {
        self.entities.contains_key(entity)
    }

    /// Return the naming scheme of the initial series.
    pub const fn key_name(&self) -> &KeyName {
        &self.key_name
    }

    /// Return the first key of the initial series.
    pub fn initial_key_name(&self) -> TimeKey {
        self.key_name.initial_key()
    }

    /// Return the timestep the structure was created at.
    pub const fn initial_time_step(&self) -> u64 {
        self.initial_time_step
    }

    /// Return the highest recorded index for a series.
    pub fn last_iteration(&self, base_name: &str) -> Option<u64> {
        self.last_iterations.get(base_name).copied()
    }

    /// Return a copy of every series' highest recorded index.
    pub fn last_iterations(&self) -> BTreeMap<String, u64> {
        self.last_iterations.clone()
    }

    // -------------------------------------------------------------------
    // Neighbor queries
    // -------------------------------------------------------------------

    /// Build the connection lookup table: entity -> set of neighbors.
    ///
    /// One pass over the edge list. Entities without edges map to an empty
    /// set. Neighbor sets are duplicate-free by construction.
    pub fn connections_lut(&self) -> Lut<E> {
        let mut lut: Lut<E> = self
            .entities
            .keys()
            .map(|entity| (entity.clone(), BTreeSet::new()))
            .collect();
        for (a, b) in &self.connections {
            lut.entry(a.clone()).or_default().insert(b.clone());
            lut.entry(b.clone()).or_default().insert(a.clone());
        }
        lut
    }

    /// Return the edges touching `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::EntityNotFound`] if the entity is absent.
    pub fn entity_connections(&self, entity: &E) -> Result<Vec<(E, E)>, StructureError> {
        if !self.contains(entity) {
            return Err(StructureError::entity_not_found(entity));
        }
        Ok(self
            .connections
            .iter()
            .filter(|(a, b)| a == entity || b == entity)
            .cloned()
            .collect())
    }

    /// Return the neighbors of `entity`, in edge order.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::EntityNotFound`] if the entity is absent.
    pub fn entity_neighbours(&self, entity: &E) -> Result<Vec<E>, StructureError> {
        Ok(self
            .entity_connections(entity)?
            .into_iter()
            .map(|(a, b)| if &a == entity { b } else { a })
            .collect())
    }

    /// Return the union of the neighbors of `entities`.
    ///
    /// With `dedupe`, each neighbor appears once (in sorted order). With
    /// `external_only`, neighbors that are themselves members of `entities`
    /// are dropped, which yields the growth frontier of the set.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::EntityNotFound`] if any input is absent.
    pub fn entities_neighbours(
        &self,
        entities: &[E],
        dedupe: bool,
        external_only: bool,
    ) -> Result<Vec<E>, StructureError> {
        let mut neighbours = Vec::new();
        for entity in entities {
            neighbours.extend(self.entity_neighbours(entity)?);
        }
        if dedupe {
            let unique: BTreeSet<E> = neighbours.into_iter().collect();
            neighbours = unique.into_iter().collect();
        }
        if external_only {
            let members: BTreeSet<&E> = entities.iter().collect();
            neighbours.retain(|n| !members.contains(n));
        }
        Ok(neighbours)
    }

    /// Return the edges touching any of `entities`.
    ///
    /// With `external_only`, only boundary edges (one endpoint outside the
    /// set) are kept.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::EntityNotFound`] if any input is absent.
    pub fn entities_connections(
        &self,
        entities: &[E],
        dedupe: bool,
        external_only: bool,
    ) -> Result<Vec<(E, E)>, StructureError> {
        let mut connections = Vec::new();
        for entity in entities {
            connections.extend(self.entity_connections(entity)?);
        }
        if dedupe {
            connections = unique_connections(&connections, true);
        }
        if external_only {
            let members: BTreeSet<&E> = entities.iter().collect();
            connections.retain(|(a, b)| !members.contains(a) || !members.contains(b));
        }
        Ok(connections)
    }

    // -------------------------------------------------------------------
    // Time slices
    // -------------------------------------------------------------------

    /// Whether `key` has been recorded for this structure.
    ///
    /// A key counts as recorded when any entity carries it, or when its
    /// index lies within the recorded range of its series (sparse storage
    /// leaves all-zero steps without per-entity entries).
    pub fn has_time_key(&self, key: &TimeKey) -> bool {
        let in_range = self
            .last_iterations
            .get(key.base_name())
            .is_some_and(|&last| self.initial_time_step <= key.index() && key.index() <= last);
        in_range || self.entities.values().any(|h| h.contains_key(key))
    }

    /// Fail with [`StructureError::TimeKeyNotFound`] unless `key` is recorded.
    pub fn require_time_key(&self, key: &TimeKey) -> Result<(), StructureError> {
        if self.has_time_key(key) {
            Ok(())
        } else {
            Err(StructureError::TimeKeyNotFound(key.clone()))
        }
    }

    /// Project one timestep to a flat entity -> value map.
    ///
    /// `only_nonzero` drops zero values and takes precedence over
    /// `fill_missing`, which otherwise inserts 0 for entities lacking `key`.
    pub fn time_slice(&self, key: &TimeKey, only_nonzero: bool, fill_missing: bool) -> StateMap<E> {
        let mut missing: usize = 0;
        let mut slice = StateMap::new();
        for (entity, history) in &self.entities {
            match history.get(key) {
                Some(&value) if only_nonzero && value == 0 => {}
                Some(&value) => {
                    slice.insert(entity.clone(), value);
                }
                None if fill_missing && !only_nonzero => {
                    slice.insert(entity.clone(), 0);
                }
                None => missing = missing.saturating_add(1),
            }
        }
        if missing > 0 && !only_nonzero {
            debug!(key = %key, missing, "Entities without a value for time key");
        }
        slice
    }

    /// Return the nonzero entities at `key`.
    ///
    /// Inside a recorded series a missing value is a sparse 0. A key outside
    /// every recorded range yields an empty map and one warning.
    pub fn nonzero_entities(&self, key: &TimeKey) -> StateMap<E> {
        if !self.has_time_key(key) {
            warn!(key = %key, "Time key not recorded");
            return StateMap::new();
        }
        self.entities
            .iter()
            .filter_map(|(entity, history)| {
                history
                    .get(key)
                    .filter(|&&value| value != 0)
                    .map(|&value| (entity.clone(), value))
            })
            .collect()
    }

    /// Record a new timestep.
    ///
    /// Entities absent from `state` receive no entry for `key`. The series'
    /// last iteration advances to `key.index()`.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::EntityNotFound`] for an unknown entity, or
    /// [`StructureError::TimeKeyAlreadyRecorded`] if `key` does not lie past
    /// the series' last recorded index.
    pub fn record_time_slice(
        &mut self,
        key: &TimeKey,
        state: &StateMap<E>,
    ) -> Result<(), StructureError> {
        if let Some(&last) = self.last_iterations.get(key.base_name())
            && key.index() <= last
        {
            return Err(StructureError::TimeKeyAlreadyRecorded(key.clone()));
        }
        if let Some(unknown) = state.keys().find(|e| !self.entities.contains_key(e)) {
            return Err(StructureError::entity_not_found(unknown));
        }

        for (entity, &value) in state {
            if let Some(history) = self.entities.get_mut(entity) {
                history.insert(key.clone(), value);
            }
        }
        self.last_iterations
            .insert(key.base_name().to_owned(), key.index());
        Ok(())
    }

    /// Overwrite one entity's value at an already recorded key.
    ///
    /// Used to seed initial patterns before a simulation starts.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::EntityNotFound`] or
    /// [`StructureError::TimeKeyNotFound`].
    pub fn set_value(&mut self, entity: &E, key: &TimeKey, value: Value) -> Result<(), StructureError> {
        self.require_time_key(key)?;
        let history = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| StructureError::entity_not_found(entity))?;
        history.insert(key.clone(), value);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Histories
    // -------------------------------------------------------------------

    /// Return each entity's values in the series `base_name` within
    /// `[start, end]` (`end = None` is open).
    ///
    /// `only_nonzero` drops zero values and entities left without any value.
    /// Otherwise `fill_missing` inserts 0 for every index between the
    /// initial step and the series' last iteration that an entity lacks.
    pub fn entities_states(
        &self,
        base_name: &str,
        start: u64,
        end: Option<u64>,
        only_nonzero: bool,
        fill_missing: bool,
    ) -> BTreeMap<E, History> {
        let in_window = |key: &TimeKey| {
            key.is_in_series(base_name)
                && start <= key.index()
                && end.is_none_or(|end| key.index() <= end)
        };

        let mut states: BTreeMap<E, History> = self
            .entities
            .iter()
            .map(|(entity, history)| {
                let window = history
                    .iter()
                    .filter(|(key, value)| in_window(*key) && (!only_nonzero || **value != 0))
                    .map(|(key, value)| (key.clone(), *value))
                    .collect();
                (entity.clone(), window)
            })
            .collect();

        if only_nonzero {
            states.retain(|_, history| !history.is_empty());
        } else if fill_missing && let Some(last) = self.last_iteration(base_name) {
            let first = self.initial_time_step.max(start);
            let last = end.map_or(last, |end| end.min(last));
            for history in states.values_mut() {
                for index in first..=last {
                    history.entry(TimeKey::new(base_name, index)).or_insert(0);
                }
            }
        }
        states
    }

    /// Return one entity's values in the series `base_name`, in time order.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::EntityNotFound`] if the entity is absent.
    pub fn entity_sorted_values(
        &self,
        entity: &E,
        base_name: &str,
    ) -> Result<Vec<(TimeKey, Value)>, StructureError> {
        let history = self
            .entities
            .get(entity)
            .ok_or_else(|| StructureError::entity_not_found(entity))?;
        // BTreeMap order is (base name, index), so one series is contiguous.
        Ok(history
            .iter()
            .filter(|(key, _)| key.is_in_series(base_name))
            .map(|(key, value)| (key.clone(), *value))
            .collect())
    }

    /// Project the series `base_name` into a timestep × entity matrix.
    ///
    /// Rows cover `[start, end]` clamped to the recorded range; `end = None`
    /// runs to the last iteration. Missing values are 0.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::TimeKeyNotFound`] if the series was never
    /// recorded.
    pub fn entities_time_array(
        &self,
        base_name: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<TimeArray<E>, StructureError> {
        let last = self
            .last_iteration(base_name)
            .ok_or_else(|| StructureError::TimeKeyNotFound(TimeKey::new(base_name, start)))?;
        let first = self.initial_time_step.max(start);
        let last = end.map_or(last, |end| end.min(last));

        let entities: Vec<E> = self.entities.keys().cloned().collect();
        let steps: Vec<u64> = (first..=last).collect();
        let values = steps
            .iter()
            .map(|&index| {
                let key = TimeKey::new(base_name, index);
                self.entities
                    .values()
                    .map(|history| history.get(&key).copied().unwrap_or(0))
                    .collect()
            })
            .collect();

        Ok(TimeArray {
            entities,
            steps,
            values,
        })
    }
}

/// Deduplicate an edge list, keeping the first occurrence of each edge.
///
/// With `undirected`, `(a, b)` and `(b, a)` are the same edge.
pub fn unique_connections<E: Entity>(connections: &[(E, E)], undirected: bool) -> Vec<(E, E)> {
    let mut seen: BTreeSet<(E, E)> = BTreeSet::new();
    let mut unique = Vec::with_capacity(connections.len());
    for (a, b) in connections {
        let canonical = if undirected && b < a {
            (b.clone(), a.clone())
        } else {
            (a.clone(), b.clone())
        };
        if seen.insert(canonical) {
            unique.push((a.clone(), b.clone()));
        }
    }
    unique
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt as _};

    use super::*;

    /// Counts `WARN` events emitted while installed.
    #[derive(Clone, Default)]
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_warnings(f: impl FnOnce()) -> usize {
        let counter = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        tracing::subscriber::with_default(subscriber, f);
        counter.0.load(Ordering::SeqCst)
    }

    /// Path graph 1 - 2 - 3 - 4 with values [1, 0, 2, 0] at `t_0`.
    fn make_path_store() -> EntityStore<u32> {
        let values: BTreeMap<u32, Value> = [(1, 1), (2, 0), (3, 2), (4, 0)].into_iter().collect();
        let edges = vec![(1, 2), (2, 3), (3, 4), (2, 1)];
        EntityStore::new(values, edges, KeyName::default()).unwrap()
    }

    fn state(pairs: &[(u32, Value)]) -> StateMap<u32> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn duplicate_edges_are_removed() {
        let store = make_path_store();
        assert_eq!(store.connections(), vec![(1, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn unknown_edge_endpoint_rejected() {
        let values: BTreeMap<u32, Value> = [(1, 0)].into_iter().collect();
        let result = EntityStore::new(values, vec![(1, 9)], KeyName::default());
        assert!(matches!(result, Err(StructureError::InvalidArgument { .. })));
    }

    #[test]
    fn lut_is_symmetric() {
        let lut = make_path_store().connections_lut();
        assert_eq!(lut.get(&2).map(|s| s.iter().copied().collect::<Vec<_>>()), Some(vec![1, 3]));
        assert_eq!(lut.get(&1).map(BTreeSet::len), Some(1));
        assert_eq!(lut.get(&4).map(BTreeSet::len), Some(1));
    }

    #[test]
    fn neighbours_of_missing_entity_fail() {
        let store = make_path_store();
        assert!(matches!(
            store.entity_neighbours(&99),
            Err(StructureError::EntityNotFound(_))
        ));
    }

    #[test]
    fn external_neighbours_exclude_members() {
        let store = make_path_store();
        let frontier = store.entities_neighbours(&[2, 3], true, true);
        assert_eq!(frontier, Ok(vec![1, 4]));
        let all = store.entities_neighbours(&[2, 3], false, false);
        assert_eq!(all.map(|n| n.len()), Ok(4));
    }

    #[test]
    fn external_connections_are_boundary_edges() {
        let store = make_path_store();
        let boundary = store.entities_connections(&[2, 3], true, true);
        assert_eq!(boundary, Ok(vec![(1, 2), (3, 4)]));
    }

    #[test]
    fn time_slice_filters() {
        let store = make_path_store();
        let key = TimeKey::at(0);
        assert_eq!(store.time_slice(&key, true, false), state(&[(1, 1), (3, 2)]));
        assert_eq!(store.time_slice(&key, false, false).len(), 4);
        // Nonzero wins over fill.
        assert_eq!(store.time_slice(&key, true, true).len(), 2);
    }

    #[test]
    fn fill_missing_inserts_zero() {
        let mut store = make_path_store();
        let key = TimeKey::at(1);
        assert!(store.record_time_slice(&key, &state(&[(1, 5)])).is_ok());
        assert_eq!(store.time_slice(&key, false, false), state(&[(1, 5)]));
        assert_eq!(
            store.time_slice(&key, false, true),
            state(&[(1, 5), (2, 0), (3, 0), (4, 0)])
        );
    }

    #[test]
    fn past_keys_are_never_rewritten() {
        let mut store = make_path_store();
        assert!(store.record_time_slice(&TimeKey::at(1), &state(&[(1, 1)])).is_ok());
        let rewrite = store.record_time_slice(&TimeKey::at(1), &state(&[(1, 0)]));
        assert!(matches!(rewrite, Err(StructureError::TimeKeyAlreadyRecorded(_))));
        assert_eq!(store.last_iteration("t_"), Some(1));
    }

    #[test]
    fn sparse_step_counts_as_recorded() {
        let mut store = make_path_store();
        let key = TimeKey::at(1);
        assert!(store.record_time_slice(&key, &StateMap::new()).is_ok());
        assert!(store.has_time_key(&key));
        assert!(!store.has_time_key(&TimeKey::at(2)));
        assert!(store.require_time_key(&TimeKey::new("other_", 0)).is_err());
    }

    #[test]
    fn entities_states_fill_and_window() {
        let mut store = make_path_store();
        assert!(store.record_time_slice(&TimeKey::at(1), &state(&[(1, 0), (2, 3)])).is_ok());
        assert!(store.record_time_slice(&TimeKey::at(2), &state(&[(1, 4)])).is_ok());

        let nonzero = store.entities_states("t_", 0, None, true, false);
        assert_eq!(nonzero.len(), 3);
        assert_eq!(nonzero.get(&1).map(History::len), Some(2));

        let filled = store.entities_states("t_", 1, Some(2), false, true);
        assert_eq!(filled.get(&4).map(History::len), Some(2));
        assert_eq!(filled.get(&2).and_then(|h| h.get(&TimeKey::at(2))), Some(&0));
    }

    #[test]
    fn sorted_values_follow_time() {
        let mut store = make_path_store();
        for index in 1..=11 {
            assert!(store.record_time_slice(&TimeKey::at(index), &state(&[(3, 7)])).is_ok());
        }
        let values = store.entity_sorted_values(&3, "t_").unwrap();
        let indices: Vec<u64> = values.iter().map(|(k, _)| k.index()).collect();
        assert_eq!(indices, (0..=11).collect::<Vec<_>>());
        assert!(store.entity_sorted_values(&42, "t_").is_err());
    }

    #[test]
    fn time_array_is_step_by_entity() {
        let mut store = make_path_store();
        assert!(store.record_time_slice(&TimeKey::at(1), &state(&[(2, 1)])).is_ok());
        let array = store.entities_time_array("t_", 0, None);
        assert_eq!(
            array,
            Ok(TimeArray {
                entities: vec![1, 2, 3, 4],
                steps: vec![0, 1],
                values: vec![vec![1, 0, 2, 0], vec![0, 1, 0, 0]],
            })
        );
        assert!(store.entities_time_array("missing_", 0, None).is_err());
    }

    #[test]
    fn set_value_requires_recorded_key() {
        let mut store = make_path_store();
        assert!(store.set_value(&2, &TimeKey::at(0), 9).is_ok());
        assert_eq!(store.time_slice(&TimeKey::at(0), true, false).get(&2), Some(&9));
        assert!(store.set_value(&2, &TimeKey::at(5), 9).is_err());
        assert!(store.set_value(&8, &TimeKey::at(0), 9).is_err());
    }

    #[test]
    fn sparse_step_reads_back_without_warnings() {
        let mut store = make_path_store();
        store.record_time_slice(&TimeKey::at(1), &state(&[(3, 5)])).unwrap();

        let mut nonzero = StateMap::new();
        let warnings = count_warnings(|| nonzero = store.nonzero_entities(&TimeKey::at(1)));
        assert_eq!(warnings, 0);
        assert_eq!(nonzero, state(&[(3, 5)]));
    }

    #[test]
    fn unrecorded_key_warns_once() {
        let store = make_path_store();
        let mut nonzero = state(&[(1, 1)]);
        let warnings = count_warnings(|| nonzero = store.nonzero_entities(&TimeKey::at(7)));
        assert_eq!(warnings, 1);
        assert!(nonzero.is_empty());
    }
}
