//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use serde_json::Value;
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};
use tempfile::TempDir;
use weave_core::{
    providers::{EmbeddingProvider, ProviderKind, ProviderRegistry},
    record::{Provenance, SourceRecord},
    WeaveError,
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Embedding provider backed by a fixed text → vector table.
pub struct TableEmbedder(BTreeMap<String, Vec<f64>>);

impl EmbeddingProvider for TableEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, WeaveError> {
        texts
            .iter()
            .map(|text| {
                self.0.get(text).cloned().ok_or_else(|| {
                    ProviderKind::Embedding.error("table", format!("unknown text '{text}'"))
                })
            })
            .collect()
    }
}

/// Registry with the built-ins plus a `table` embedding provider.
#[allow(dead_code)]
pub fn table_registry(table: &[(&str, Vec<f64>)]) -> ProviderRegistry {
    let registry = ProviderRegistry::create();
    registry.register_embedding(
        "table",
        Arc::new(TableEmbedder(
            table
                .iter()
                .map(|(text, v)| (text.to_string(), v.clone()))
                .collect(),
        )),
    );
    registry
}

/// Unit vectors with cos(a, b) = 0.42 and cos(c, a) = cos(c, b) = 0.1.
#[allow(dead_code)]
pub fn scenario_vectors() -> [Vec<f64>; 3] {
    let b1 = (1.0f64 - 0.42 * 0.42).sqrt();
    let c1 = (0.1 - 0.42 * 0.1) / b1;
    let c2 = (1.0 - 0.1 * 0.1 - c1 * c1).sqrt();
    [vec![1.0, 0.0, 0.0], vec![0.42, b1, 0.0], vec![0.1, c1, c2]]
}

#[allow(dead_code)]
pub fn record(source: &str, data: Value) -> SourceRecord {
    SourceRecord::new(data, Provenance::new(source))
}

/// Write `files` (relative path → content) under a fresh temp directory.
///
/// Returns the temp dir guard and the path of its `sources/` directory.
#[allow(dead_code)]
pub fn write_sources(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().join("sources");
    for (name, content) in files {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    (temp_dir, root)
}

#[allow(dead_code)]
pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
