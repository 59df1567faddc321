//! # weave-core
//!
//! A resolution engine that turns a declarative configuration plus a collection of structured
//! source documents into a weighted, heterogeneous, directed graph.
//!
//! ## Overview
//!
//! A configuration declares **node types** (how to pull items out of each record), **fields**
//! (small extraction pipelines over those items), **embeds** (how to turn node text into
//! vectors), **links** (how pairs of nodes are scored) and **network** settings (a global edge
//! threshold and optional community detection). Resolution proceeds in phases:
//!
//! 1. validate names, refs and method requirements before touching any record
//! 2. extract nodes and fields from each record and resolve its embeds
//! 3. compute links over the whole corpus
//! 4. assemble the graph
//!
//! Given identical configuration, records and deterministic providers the output is identical,
//! including node and edge order.
//!
//! ### Key Features
//!
//! - **Extraction pipelines**: `from` / `where` / `pluck` / `reduce` / `default` / `type` per field
//! - **Embedding patterns**: simple, chunked, per-list-item, and weighted `combine` blends, with
//!   refs across embeds of the same record resolved in dependency order
//! - **Link methods**: cosine (or any registered metric), jaccard, dice, overlap, exact, numeric,
//!   parent, reference, and weighted `combine` over other links
//! - **Pluggable providers**: embedding, metric, chunking and community detection behind traits,
//!   looked up by name in a [`providers::ProviderRegistry`]
//! - **Fail fast**: configuration errors are reported with their config path before any
//!   provider is called; data errors name both the config path and the record
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use weave_core::{
//!     config::GraphConfig, engine, providers::ProviderRegistry,
//!     record::{Provenance, SourceRecord},
//! };
//!
//! # fn main() -> Result<(), weave_core::WeaveError> {
//! let config = GraphConfig::from_yaml_str(r#"
//! nodes:
//!   paper:
//!     fields:
//!       tags: tags
//!       year: { from: year, type: number }
//! links:
//!   shared_tags:
//!     between: [paper, paper]
//!     method: jaccard
//!     field: tags
//!     min: 0.2
//! "#)?;
//! let records = vec![
//!     SourceRecord::new(json!({"tags": ["rust", "graphs"], "year": 2021}), Provenance::new("a.json")),
//!     SourceRecord::new(json!({"tags": ["graphs"], "year": 2023}), Provenance::new("b.json")),
//! ];
//! let graph = engine::build(&config, &records, &ProviderRegistry::create())?;
//! assert_eq!(graph.nodes.len(), 2);
//! assert_eq!(graph.weight("shared_tags", "a.json:paper:0", "b.json:paper:0"), Some(0.5));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - **[`config`]**: the declaration model and file loading (YAML, TOML, JSON)
//! - **[`pipeline`]**: field extraction pipelines over `serde_json::Value` items
//! - **[`record`]** / **[`ingest`]**: source records, provenance, and reading files into records
//! - **[`context`]**: static validation and evaluation order for one build
//! - **[`extract`]** / **[`embed`]**: per-record node extraction and embed resolution
//! - **[`link`]**: pair scoring and edge emission
//! - **[`graph`]** / **[`community`]**: the assembled graph and community detection
//! - **[`engine`]**: the [`engine::build`] entry point
//! - **[`providers`]**: provider traits, built-ins and the registry
//! - **[`export`]**: JSON, edge list and GraphML output

pub mod community;
pub mod config;
pub mod context;
pub mod embed;
pub mod engine;
pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod ingest;
pub mod link;
pub mod pipeline;
pub mod providers;
pub mod record;
pub mod refgraph;
#[cfg(test)]
mod tests;
pub mod vector;

pub use error::*;
