//! Graphs over caller-supplied nodes and edges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::blobs;
use crate::error::StructureError;
use crate::store::EntityStore;
use crate::structure::{Structure, StructureType};
use crate::time_key::KeyName;
use crate::{Entity, StateMap, Value};

/// Construction options for a [`Graph`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphOptions {
    /// Naming scheme of the initial series.
    pub key_name: KeyName,
}

/// Component membership of a graph state.
///
/// Members are sorted within each component, and components are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphTopology<N>(pub Vec<Vec<N>>);

impl<N> GraphTopology<N> {
    /// Return the sorted components.
    pub fn components(&self) -> &[Vec<N>] {
        &self.0
    }
}

/// An undirected graph with time-indexed node values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph<N> {
    store: EntityStore<N>,
}

impl<N: Entity> Graph<N> {
    /// Build a graph.
    ///
    /// Edge endpoints missing from `nodes` are added as nodes. Nodes without
    /// an initial value start at 0. Duplicate edges, in either direction,
    /// are stored once.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::InvalidArgument`] if `initial_values`
    /// names a node that is neither in `nodes` nor on an edge.
    pub fn new(
        nodes: impl IntoIterator<Item = N>,
        edges: Vec<(N, N)>,
        initial_values: &BTreeMap<N, Value>,
        options: GraphOptions,
    ) -> Result<Self, StructureError> {
        let mut values: BTreeMap<N, Value> = nodes.into_iter().map(|node| (node, 0)).collect();
        for (a, b) in &edges {
            values.entry(a.clone()).or_insert(0);
            values.entry(b.clone()).or_insert(0);
        }
        for (node, &value) in initial_values {
            let Some(slot) = values.get_mut(node) else {
                return Err(StructureError::invalid(format!(
                    "initial value given for unknown node {node:?}"
                )));
            };
            *slot = value;
        }

        let store = EntityStore::new(values, edges, options.key_name)?;
        Ok(Self { store })
    }

    /// Build a graph from its edge list alone, all values 0.
    ///
    /// # Errors
    ///
    /// Same as [`Graph::new`].
    pub fn from_edges(edges: Vec<(N, N)>) -> Result<Self, StructureError> {
        Self::new(Vec::new(), edges, &BTreeMap::new(), GraphOptions::default())
    }
}

impl<N: Entity> Structure for Graph<N> {
    type Entity = N;
    type Fingerprint = GraphTopology<N>;

    fn store(&self) -> &EntityStore<N> {
        &self.store
    }

    fn store_mut(&mut self) -> &mut EntityStore<N> {
        &mut self.store
    }

    fn structure_type(&self) -> StructureType {
        StructureType::Graph
    }

    fn topology_representation(&self, state: &StateMap<N>) -> GraphTopology<N> {
        let mut components = blobs(state, &self.store.connections_lut());
        for component in &mut components {
            component.sort();
        }
        components.sort();
        GraphTopology(components)
    }
}
