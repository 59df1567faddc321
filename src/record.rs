//! Source records: one ingested document, normalized to a `serde_json::Value` tree and carrying
//! its provenance block.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};

/// Provenance block attached to every record (`_meta` on resolved nodes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_path: String,
    /// Position of the record within a multi-record source (JSONL line, JSON array element, YAML
    /// document). `None` for single-record sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// 1-based line number for line-oriented sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Source modification time, unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
    #[serde(default)]
    pub size: u64,
    /// SHA-256 of the record's raw text, hex encoded.
    #[serde(default)]
    pub hash: String,
}

impl Provenance {
    pub fn new<P: Into<String>>(source_path: P) -> Self {
        Provenance {
            source_path: source_path.into(),
            ..Default::default()
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_content(mut self, raw: &str) -> Self {
        self.size = raw.len() as u64;
        self.hash = content_hash(raw);
        self
    }

    /// The source component of node ids. Multi-record sources are disambiguated by index so that
    /// ids stay unique across records of the same file.
    pub fn source_key(&self) -> String {
        match self.index {
            Some(index) => format!("{}#{}", self.source_path, index),
            None => self.source_path.clone(),
        }
    }
}

pub fn content_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub data: Value,
    #[serde(rename = "_meta")]
    pub meta: Provenance,
}

impl SourceRecord {
    pub fn new(data: Value, meta: Provenance) -> Self {
        SourceRecord { data, meta }
    }
}

impl Display for SourceRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.meta.source_key())
    }
}
