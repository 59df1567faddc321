//! Dependency graph over declared names (embeds or links) that reference each other through
//! `combine` refs.

use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};
use std::{collections::BTreeMap, fmt::Display};

use crate::error::WeaveError;

/// Edges point from a dependency to its dependant, so a topological order evaluates every name
/// after everything it refers to.
#[derive(Debug, Clone)]
pub struct RefGraph<K: Ord + Clone + Display> {
    graph: DiGraph<K, ()>,
    index: BTreeMap<K, NodeIndex>,
}

impl<K: Ord + Clone + Display> Default for RefGraph<K> {
    fn default() -> Self {
        RefGraph {
            graph: DiGraph::new(),
            index: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone + Display> RefGraph<K> {
    /// Nodes are added in iteration order, which fixes the tie-break order of [`RefGraph::order`].
    pub fn new<I: IntoIterator<Item = K>>(keys: I) -> Self {
        let mut refs = RefGraph::default();
        for key in keys {
            refs.declare(key);
        }
        refs
    }

    pub fn declare(&mut self, key: K) -> NodeIndex {
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }
        let idx = self.graph.add_node(key.clone());
        self.index.insert(key, idx);
        idx
    }

    /// Record that `dependant` refers to `dependency`. Both must be declared. `path` is the
    /// config location of the ref, used in the error.
    pub fn add_ref(&mut self, dependant: &K, dependency: &K, path: &str) -> Result<(), WeaveError> {
        let Some(to) = self.index.get(dependant).copied() else {
            return Err(WeaveError::reference(
                path,
                format!("'{dependant}' is not declared"),
            ));
        };
        let Some(from) = self.index.get(dependency).copied() else {
            return Err(WeaveError::reference(
                path,
                format!("ref '{dependency}' does not name a declared entry"),
            ));
        };
        if from == to {
            return Err(WeaveError::reference(
                path,
                format!("'{dependant}' refers to itself"),
            ));
        }
        self.graph.update_edge(from, to, ());
        Ok(())
    }

    /// Topological evaluation order. A cycle is a reference error naming one of its members.
    pub fn order(&self, section: &str) -> Result<Vec<K>, WeaveError> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|idx| self.graph[idx].clone()).collect())
            .map_err(|cycle| {
                WeaveError::reference(
                    format!("{section}.{}", self.graph[cycle.node_id()]),
                    "combine refs form a cycle",
                )
            })
    }
}
