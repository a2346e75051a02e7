//! Structures with time-indexed entity state for the Higherorder simulator.
//!
//! A structure is a fixed set of entities, undirected connections between
//! them, and a per-entity history of integer values keyed by timestep. Grids
//! and graphs share all of their state handling through [`EntityStore`] and
//! the [`Structure`] trait; they differ in how entities and connections are
//! built and in how a state is reduced to a topology fingerprint.
//!
//! # Modules
//!
//! - [`components`] -- Iterative connected-components finder over a
//!   neighbor lookup table.
//! - [`error`] -- Error types for structure operations.
//! - [`generate`] -- Seeded random blob growth on grids.
//! - [`graph`] -- [`Graph`] over caller-supplied nodes and edges.
//! - [`grid`] -- [`Grid`] of cells with von Neumann or Moore neighborhoods,
//!   optional periodic boundary, and centroid-relative fingerprints.
//! - [`snapshot`] -- Serializable persistence layout of a structure.
//! - [`store`] -- [`EntityStore`]: histories, neighbor queries, time slices.
//! - [`structure`] -- The [`Structure`] trait.
//! - [`time_key`] -- Typed timestep keys (`t_0`, `t_1`, ...).

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

pub mod components;
pub mod error;
pub mod generate;
pub mod graph;
pub mod grid;
pub mod snapshot;
pub mod store;
pub mod structure;
pub mod time_key;

// Re-export primary types at crate root.
pub use components::blobs;
pub use error::StructureError;
pub use generate::random_blob;
pub use graph::{Graph, GraphOptions, GraphTopology};
pub use grid::{
    Cell, FINGERPRINT_PRECISION, Grid, GridGeometry, GridOptions, GridTopology, InitialValues,
    Offset, Orientation,
};
pub use snapshot::{EntityRecord, SnapshotVariables, StructureSnapshot};
pub use store::{EntityStore, TimeArray, unique_connections};
pub use structure::{Structure, StructureType};
pub use time_key::{DEFAULT_BASE_NAME, KeyName, TimeKey};

/// The value an entity holds at one timestep.
pub type Value = i64;

/// A flat state: entity -> value at one timestep.
pub type StateMap<E> = BTreeMap<E, Value>;

/// Neighbor lookup table: entity -> set of adjacent entities.
pub type Lut<E> = BTreeMap<E, BTreeSet<E>>;

/// One entity's values keyed by timestep.
pub type History = BTreeMap<TimeKey, Value>;

/// Bounds required of an entity identifier.
pub trait Entity: Clone + Ord + fmt::Debug {}

impl<T: Clone + Ord + fmt::Debug> Entity for T {}
