//! Shared test utilities for resolution tests

use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    config::GraphConfig,
    engine,
    error::WeaveError,
    graph::Graph,
    providers::{EmbeddingProvider, ProviderKind, ProviderRegistry},
    record::{Provenance, SourceRecord},
    vector::Vector,
};

pub const STUB: &str = "stub";

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Embeds known texts to fixed vectors; any other text is a provider error.
pub struct StubEmbedder(pub BTreeMap<String, Vector>);

impl StubEmbedder {
    pub fn new<I: IntoIterator<Item = (&'static str, Vector)>>(table: I) -> Self {
        StubEmbedder(
            table
                .into_iter()
                .map(|(text, v)| (text.to_string(), v))
                .collect(),
        )
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vector>, WeaveError> {
        texts
            .iter()
            .map(|text| {
                self.0
                    .get(text)
                    .cloned()
                    .ok_or_else(|| ProviderKind::Embedding.error(STUB, format!("unknown text '{text}'")))
            })
            .collect()
    }
}

/// Unit vectors with cos(a, b) = 0.42 and cos(c, a) = cos(c, b) = 0.1.
pub fn scenario_vectors() -> [Vector; 3] {
    let b1 = (1.0f64 - 0.42 * 0.42).sqrt();
    let c1 = (0.1 - 0.42 * 0.1) / b1;
    let c2 = (1.0 - 0.1 * 0.1 - c1 * c1).sqrt();
    [
        vec![1.0, 0.0, 0.0],
        vec![0.42, b1, 0.0],
        vec![0.1, c1, c2],
    ]
}

/// Registry with the built-ins plus [`StubEmbedder`] under `stub`.
pub fn stub_registry(table: Vec<(&'static str, Vector)>) -> ProviderRegistry {
    let registry = ProviderRegistry::create();
    registry.register_embedding(STUB, Arc::new(StubEmbedder::new(table)));
    registry
}

pub fn record(source: &str, data: Value) -> SourceRecord {
    SourceRecord::new(data, Provenance::new(source))
}

pub fn build_yaml(
    config: &str,
    records: &[SourceRecord],
    registry: &ProviderRegistry,
) -> Result<Graph, WeaveError> {
    let config = GraphConfig::from_yaml_str(config)?;
    engine::build(&config, records, registry)
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
