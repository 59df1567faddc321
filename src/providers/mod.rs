//! Provider capability contracts and the name → implementation registry.
//!
//! The engine only depends on the traits in this module. Built-in and user supplied providers
//! resolve through the same [`ProviderRegistry`] lookup, so registering a provider under a
//! built-in name replaces the built-in for every build that uses that registry.
//!
//! ```rust
//! use std::sync::Arc;
//! use weave_core::{providers::{MetricProvider, PROVIDERS}, WeaveError};
//!
//! struct Manhattan;
//!
//! impl MetricProvider for Manhattan {
//!     fn score(&self, a: &[f64], b: &[f64]) -> Result<f64, WeaveError> {
//!         let d: f64 = a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum();
//!         Ok(1.0 / (1.0 + d))
//!     }
//! }
//!
//! PROVIDERS.register_metric("manhattan", Arc::new(Manhattan));
//! assert!(PROVIDERS.metric("manhattan").is_ok());
//! ```

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::{community::CommunityDetector, error::WeaveError, vector::Vector};

pub mod builtin;

/// Global registry with the built-in providers. Builds take a `&ProviderRegistry`, so this is
/// only a convenience for the CLI and downstream registration.
pub static PROVIDERS: Lazy<ProviderRegistry> = Lazy::new(ProviderRegistry::create);

/// `text → vector`. Receives every text of one node at once so remote providers can batch.
/// Retrying transient failures is the provider's responsibility.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vector>, WeaveError>;
}

/// `(a, b) → score`
pub trait MetricProvider: Send + Sync {
    fn score(&self, a: &[f64], b: &[f64]) -> Result<f64, WeaveError>;
}

/// `(text, max_tokens, overlap) → ordered pieces of text`
pub trait ChunkingProvider: Send + Sync {
    fn chunk(&self, text: &str, max_tokens: usize, overlap: usize)
        -> Result<Vec<String>, WeaveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProviderKind {
    Embedding,
    Metric,
    Chunking,
    Community,
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderKind::Embedding => "embedding",
            ProviderKind::Metric => "metric",
            ProviderKind::Chunking => "chunking",
            ProviderKind::Community => "community",
        };
        write!(f, "{name}")
    }
}

impl ProviderKind {
    pub fn error<N: Into<String>, M: Into<String>>(self, name: N, message: M) -> WeaveError {
        WeaveError::Provider {
            kind: self.to_string(),
            name: name.into(),
            message: message.into(),
        }
    }
}

#[derive(Default)]
struct ProviderTables {
    embedding: BTreeMap<String, Arc<dyn EmbeddingProvider>>,
    metric: BTreeMap<String, Arc<dyn MetricProvider>>,
    chunking: BTreeMap<String, Arc<dyn ChunkingProvider>>,
    community: BTreeMap<String, Arc<dyn CommunityDetector>>,
}

/// Thread-safe registry of named providers, one table per capability.
pub struct ProviderRegistry(Arc<RwLock<ProviderTables>>);

impl Clone for ProviderRegistry {
    fn clone(&self) -> Self {
        ProviderRegistry(self.0.clone())
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        ProviderRegistry::create()
    }
}

fn insert_logged<T: ?Sized>(
    table: &mut BTreeMap<String, Arc<T>>,
    kind: ProviderKind,
    name: String,
    provider: Arc<T>,
) {
    if table.contains_key(&name) {
        tracing::info!(
            "[ProviderRegistry::register] Overwriting existing {} provider: {}",
            kind,
            name
        );
    }
    table.insert(name, provider);
}

fn lookup<T: ?Sized>(
    table: &BTreeMap<String, Arc<T>>,
    kind: ProviderKind,
    name: &str,
) -> Result<Arc<T>, WeaveError> {
    table
        .get(name)
        .cloned()
        .ok_or_else(|| kind.error(name, "no provider registered under this name"))
}

impl ProviderRegistry {
    /// Registry without any providers.
    pub fn empty() -> Self {
        ProviderRegistry(Arc::new(RwLock::new(ProviderTables::default())))
    }

    /// Create registry with built-in providers
    pub fn create() -> Self {
        let registry = ProviderRegistry::empty();
        registry.register_embedding(
            builtin::HASHING,
            Arc::new(builtin::HashingEmbedder::default()),
        );
        registry.register_metric(builtin::COSINE, Arc::new(builtin::CosineMetric));
        registry.register_metric(builtin::EUCLIDEAN, Arc::new(builtin::EuclideanMetric));
        registry.register_chunking(builtin::TOKENS, Arc::new(builtin::TokenChunker));
        registry.register_chunking(builtin::SENTENCES, Arc::new(builtin::SentenceChunker));
        registry.register_community(
            crate::community::COMPONENTS,
            Arc::new(crate::community::ComponentsDetector),
        );
        registry
    }

    pub fn register_embedding<N: Into<String>>(&self, name: N, provider: Arc<dyn EmbeddingProvider>) {
        let mut writer = self.0.write();
        insert_logged(
            &mut writer.embedding,
            ProviderKind::Embedding,
            name.into(),
            provider,
        );
    }

    pub fn register_metric<N: Into<String>>(&self, name: N, provider: Arc<dyn MetricProvider>) {
        let mut writer = self.0.write();
        insert_logged(&mut writer.metric, ProviderKind::Metric, name.into(), provider);
    }

    pub fn register_chunking<N: Into<String>>(&self, name: N, provider: Arc<dyn ChunkingProvider>) {
        let mut writer = self.0.write();
        insert_logged(
            &mut writer.chunking,
            ProviderKind::Chunking,
            name.into(),
            provider,
        );
    }

    pub fn register_community<N: Into<String>>(
        &self,
        name: N,
        detector: Arc<dyn CommunityDetector>,
    ) {
        let mut writer = self.0.write();
        insert_logged(
            &mut writer.community,
            ProviderKind::Community,
            name.into(),
            detector,
        );
    }

    pub fn embedding(&self, name: &str) -> Result<Arc<dyn EmbeddingProvider>, WeaveError> {
        lookup(&self.0.read().embedding, ProviderKind::Embedding, name)
    }

    pub fn metric(&self, name: &str) -> Result<Arc<dyn MetricProvider>, WeaveError> {
        lookup(&self.0.read().metric, ProviderKind::Metric, name)
    }

    pub fn chunking(&self, name: &str) -> Result<Arc<dyn ChunkingProvider>, WeaveError> {
        lookup(&self.0.read().chunking, ProviderKind::Chunking, name)
    }

    pub fn community(&self, name: &str) -> Result<Arc<dyn CommunityDetector>, WeaveError> {
        lookup(&self.0.read().community, ProviderKind::Community, name)
    }

    /// List all registered provider names of one kind
    pub fn list(&self, kind: ProviderKind) -> Vec<String> {
        let reader = self.0.read();
        match kind {
            ProviderKind::Embedding => reader.embedding.keys().cloned().collect(),
            ProviderKind::Metric => reader.metric.keys().cloned().collect(),
            ProviderKind::Chunking => reader.chunking.keys().cloned().collect(),
            ProviderKind::Community => reader.community.keys().cloned().collect(),
        }
    }
}
