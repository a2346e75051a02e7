//! Serializable export of a structure.
//!
//! The layout is `{structure_type, variables: {...}}` so that persistence
//! collaborators can write it as JSON without reaching into book-keeping
//! fields. Timestep keys are rendered as strings (`t_0`, `t_1`, ...).
//! Grid-only fields are omitted for graphs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Value;
use crate::structure::StructureType;
use crate::time_key::KeyName;

/// A structure in its persistence layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSnapshot<E> {
    /// Concrete variant.
    pub structure_type: StructureType,
    /// Variant state.
    pub variables: SnapshotVariables<E>,
}

/// The `variables` block of a [`StructureSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVariables<E> {
    /// Grid width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Grid height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Grid torus flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic_boundary: Option<bool>,
    /// Grid Moore-neighborhood flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagonal_neighbours: Option<bool>,
    /// Naming scheme of the initial series.
    pub key_name: KeyName,
    /// Rendered first key.
    pub initial_key_name: String,
    /// Timestep the structure was created at.
    pub initial_time_step: u64,
    /// Base name -> highest recorded index.
    pub last_iterations: BTreeMap<String, u64>,
    /// Undirected edges.
    pub connections: Vec<(E, E)>,
    /// Per-entity histories.
    pub entities: Vec<EntityRecord<E>>,
}

/// One entity and its rendered history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord<E> {
    /// The entity identifier.
    pub entity: E,
    /// Rendered time key -> value.
    pub values: BTreeMap<String, Value>,
}
