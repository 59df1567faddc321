//! The assembled output graph: resolved nodes, weighted directed edges, and the conversions used
//! by community detection and export.

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::{error::WeaveError, record::Provenance, vector::VectorSet};

pub const TYPE_ATTR: &str = "_type";
pub const META_ATTR: &str = "_meta";
pub const COMMUNITY_ATTR: &str = "community";

/// A node after field extraction and embed resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedNode {
    pub id: String,
    pub node_type: String,
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vectors: BTreeMap<String, VectorSet>,
    pub meta: Provenance,
    /// Position of the originating record in the build input.
    pub record: usize,
    /// Position of this node among the nodes of its type extracted from the same record.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<usize>,
}

impl ResolvedNode {
    /// `{source}:{type}:{index}`, stable for identical inputs.
    pub fn make_id(meta: &Provenance, node_type: &str, index: usize) -> String {
        format!("{}:{}:{}", meta.source_key(), node_type, index)
    }

    /// Field values plus the reserved `_type`, `_meta` and (when detected) `community` keys.
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        let mut attrs = self.fields.clone();
        attrs.insert(TYPE_ATTR.to_string(), Value::String(self.node_type.clone()));
        attrs.insert(
            META_ATTR.to_string(),
            serde_json::to_value(&self.meta).unwrap_or(Value::Null),
        );
        if let Some(community) = self.community {
            attrs.insert(COMMUNITY_ATTR.to_string(), Value::from(community));
        }
        attrs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    /// Name of the link declaration that produced the edge.
    pub link_type: String,
    pub method: String,
    pub source_type: String,
    pub target_type: String,
    #[serde(skip)]
    pub(crate) source_idx: usize,
    #[serde(skip)]
    pub(crate) target_idx: usize,
}

impl ResolvedEdge {
    pub(crate) fn between(
        source: (usize, &ResolvedNode),
        target: (usize, &ResolvedNode),
        weight: f64,
        link_type: &str,
        method: &str,
    ) -> Self {
        ResolvedEdge {
            source: source.1.id.clone(),
            target: target.1.id.clone(),
            weight,
            link_type: link_type.to_string(),
            method: method.to_string(),
            source_type: source.1.node_type.clone(),
            target_type: target.1.node_type.clone(),
            source_idx: source.0,
            target_idx: target.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<ResolvedNode>,
    pub edges: Vec<ResolvedEdge>,
}

impl Graph {
    /// Check node id uniqueness and apply the network-level `min` to every edge.
    pub fn assemble(
        nodes: Vec<ResolvedNode>,
        mut edges: Vec<ResolvedEdge>,
        network_min: Option<f64>,
    ) -> Result<Graph, WeaveError> {
        let mut seen = BTreeSet::new();
        for node in nodes.iter() {
            if !seen.insert(node.id.as_str()) {
                return Err(WeaveError::DuplicateId(node.id.clone()));
            }
        }
        if let Some(min) = network_min {
            let before = edges.len();
            edges.retain(|edge| edge.weight >= min);
            tracing::debug!(
                "[Graph::assemble] network min {} dropped {} of {} edges",
                min,
                before - edges.len(),
                before
            );
        }
        Ok(Graph { nodes, edges })
    }

    pub fn node(&self, id: &str) -> Option<&ResolvedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes_of_type<'a>(&'a self, node_type: &'a str) -> impl Iterator<Item = &'a ResolvedNode> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }

    pub fn edges_of_link<'a>(&'a self, link: &'a str) -> impl Iterator<Item = &'a ResolvedEdge> {
        self.edges.iter().filter(move |e| e.link_type == link)
    }

    /// Weight of the `source → target` edge produced by `link`, if any.
    pub fn weight(&self, link: &str, source: &str, target: &str) -> Option<f64> {
        self.edges
            .iter()
            .find(|e| e.link_type == link && e.source == source && e.target == target)
            .map(|e| e.weight)
    }

    /// Node weights are indices into [`Graph::nodes`]; node `i` is `NodeIndex::new(i)`.
    pub fn as_digraph(&self) -> DiGraph<usize, f64> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        for idx in 0..self.nodes.len() {
            graph.add_node(idx);
        }
        for edge in self.edges.iter() {
            graph.add_edge(
                NodeIndex::new(edge.source_idx),
                NodeIndex::new(edge.target_idx),
                edge.weight,
            );
        }
        graph
    }

    pub fn attach_communities(&mut self, communities: Vec<usize>) -> Result<(), WeaveError> {
        if communities.len() != self.nodes.len() {
            return Err(crate::providers::ProviderKind::Community.error(
                "assignment",
                format!(
                    "returned {} assignments for {} nodes",
                    communities.len(),
                    self.nodes.len()
                ),
            ));
        }
        for (node, community) in self.nodes.iter_mut().zip(communities) {
            node.community = Some(community);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(source: &str, node_type: &str, index: usize) -> ResolvedNode {
        let meta = Provenance::new(source);
        ResolvedNode {
            id: ResolvedNode::make_id(&meta, node_type, index),
            node_type: node_type.to_string(),
            fields: BTreeMap::new(),
            vectors: BTreeMap::new(),
            meta,
            record: 0,
            index,
            community: None,
        }
    }

    #[test]
    fn test_assemble_rejects_duplicate_ids() {
        let err = Graph::assemble(vec![node("a", "t", 0), node("a", "t", 0)], vec![], None)
            .unwrap_err();
        assert_eq!(err, WeaveError::DuplicateId("a:t:0".to_string()));
    }

    #[test]
    fn test_network_min_is_inclusive() {
        let nodes = vec![node("a", "t", 0), node("a", "t", 1)];
        let edges = vec![
            ResolvedEdge::between((0, &nodes[0]), (1, &nodes[1]), 0.5, "l", "cosine"),
            ResolvedEdge::between((1, &nodes[1]), (0, &nodes[0]), 0.49, "l", "cosine"),
        ];
        let graph = Graph::assemble(nodes, edges, Some(0.5)).unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.weight("l", "a:t:0", "a:t:1"), Some(0.5));
        assert_eq!(graph.as_digraph().edge_count(), 1);
    }

    #[test]
    fn test_attributes_carry_reserved_keys() {
        let mut n = node("doc.json", "turn", 2);
        n.fields.insert("text".into(), Value::from("hi"));
        n.community = Some(3);
        let attrs = n.attributes();
        assert_eq!(attrs["_type"], Value::from("turn"));
        assert_eq!(attrs["_meta"]["source_path"], Value::from("doc.json"));
        assert_eq!(attrs["community"], Value::from(3));
        assert_eq!(attrs["text"], Value::from("hi"));
    }
}
