//! Community detection over the assembled graph.

use petgraph::unionfind::UnionFind;
use std::collections::BTreeMap;

use crate::{error::WeaveError, graph::Graph};

pub const COMPONENTS: &str = "components";

/// Assigns every node of a graph a community id. The returned vector is parallel to
/// [`Graph::nodes`].
pub trait CommunityDetector: Send + Sync {
    fn detect(&self, graph: &Graph) -> Result<Vec<usize>, WeaveError>;
}

/// Weakly connected components. Ids are numbered in order of first appearance in the node list,
/// so they are stable for identical inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentsDetector;

impl CommunityDetector for ComponentsDetector {
    fn detect(&self, graph: &Graph) -> Result<Vec<usize>, WeaveError> {
        let digraph = graph.as_digraph();
        let mut sets = UnionFind::<usize>::new(digraph.node_count());
        for edge in digraph.raw_edges() {
            sets.union(edge.source().index(), edge.target().index());
        }
        let mut ids: BTreeMap<usize, usize> = BTreeMap::new();
        let assignment = (0..graph.nodes.len())
            .map(|idx| {
                let next = ids.len();
                *ids.entry(sets.find(idx)).or_insert(next)
            })
            .collect::<Vec<_>>();
        tracing::debug!(
            "[ComponentsDetector::detect] {} nodes in {} components",
            assignment.len(),
            ids.len()
        );
        Ok(assignment)
    }
}
