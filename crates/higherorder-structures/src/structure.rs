//! The [`Structure`] capability trait shared by grids and graphs.
//!
//! A structure owns an [`EntityStore`] and knows how to reduce a state to a
//! topology fingerprint. Everything else (neighbor lookup, time slices,
//! components, snapshots) is provided on top of those two capabilities, so
//! the dynamics layer can drive either variant without knowing which one it
//! holds.

use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::blobs;
use crate::error::StructureError;
use crate::grid::GridGeometry;
use crate::snapshot::{EntityRecord, SnapshotVariables, StructureSnapshot};
use crate::store::EntityStore;
use crate::time_key::TimeKey;
use crate::{Entity, History, Lut, StateMap};

/// Which concrete variant a structure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureType {
    /// A rectangular cell grid.
    Grid,
    /// A graph over externally supplied nodes and edges.
    Graph,
}

/// Entity container with adjacency and time-indexed state.
pub trait Structure {
    /// Entity identifier type.
    type Entity: Entity;
    /// Canonical, comparable encoding of a state's component set.
    type Fingerprint: Clone + PartialEq + fmt::Debug;

    /// Return the entity store.
    fn store(&self) -> &EntityStore<Self::Entity>;

    /// Return the entity store mutably.
    fn store_mut(&mut self) -> &mut EntityStore<Self::Entity>;

    /// Return the concrete variant.
    fn structure_type(&self) -> StructureType;

    /// Reduce a flat state to its topology fingerprint.
    ///
    /// Every entity in `state` is treated as present; filter first.
    fn topology_representation(&self, state: &StateMap<Self::Entity>) -> Self::Fingerprint;

    /// Return grid geometry, if this is a grid.
    fn geometry(&self) -> Option<GridGeometry> {
        None
    }

    /// Return an independent copy of every entity's history.
    fn get_entities(&self) -> BTreeMap<Self::Entity, History> {
        self.store().entities()
    }

    /// Return an independent copy of the connection list.
    fn get_connections(&self) -> Vec<(Self::Entity, Self::Entity)> {
        self.store().connections()
    }

    /// Build the entity -> neighbor-set lookup table.
    fn connections_lut(&self) -> Lut<Self::Entity> {
        self.store().connections_lut()
    }

    /// Project a recorded timestep.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::TimeKeyNotFound`] if `key` was never recorded.
    fn time_slice(
        &self,
        key: &TimeKey,
        only_nonzero: bool,
        fill_missing: bool,
    ) -> Result<StateMap<Self::Entity>, StructureError> {
        self.store().require_time_key(key)?;
        Ok(self.store().time_slice(key, only_nonzero, fill_missing))
    }

    /// Connected components of the state at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::TimeKeyNotFound`] if `key` was never recorded.
    fn components_at(
        &self,
        key: &TimeKey,
        only_nonzero: bool,
    ) -> Result<Vec<Vec<Self::Entity>>, StructureError> {
        let state = self.time_slice(key, only_nonzero, !only_nonzero)?;
        Ok(blobs(&state, &self.connections_lut()))
    }

    /// Topology fingerprint of the state at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::TimeKeyNotFound`] if `key` was never recorded.
    fn topology_at(
        &self,
        key: &TimeKey,
        only_nonzero: bool,
    ) -> Result<Self::Fingerprint, StructureError> {
        let state = self.time_slice(key, only_nonzero, !only_nonzero)?;
        Ok(self.topology_representation(&state))
    }

    /// Export the structure in its persistence layout.
    fn to_snapshot(&self) -> StructureSnapshot<Self::Entity> {
        let store = self.store();
        let geometry = self.geometry();
        let entities = store
            .entities()
            .into_iter()
            .map(|(entity, history)| EntityRecord {
                entity,
                values: history
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value))
                    .collect(),
            })
            .collect();

        StructureSnapshot {
            structure_type: self.structure_type(),
            variables: SnapshotVariables {
                width: geometry.map(|g| g.width),
                height: geometry.map(|g| g.height),
                periodic_boundary: geometry.map(|g| g.periodic_boundary),
                diagonal_neighbours: geometry.map(|g| g.diagonal_neighbours),
                key_name: store.key_name().clone(),
                initial_key_name: store.initial_key_name().to_string(),
                initial_time_step: store.initial_time_step(),
                last_iterations: store.last_iterations(),
                connections: store.connections(),
                entities,
            },
        }
    }
}
