//! Built-in providers registered by [`ProviderRegistry::create`](super::ProviderRegistry::create).

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use super::{ChunkingProvider, EmbeddingProvider, MetricProvider, ProviderKind};
use crate::{
    error::WeaveError,
    vector::{cosine_similarity, l2_normalize, Vector},
};

pub const HASHING: &str = "hashing";
pub const COSINE: &str = "cosine";
pub const EUCLIDEAN: &str = "euclidean";
pub const TOKENS: &str = "tokens";
pub const SENTENCES: &str = "sentences";

const DEFAULT_HASHING_DIMS: usize = 256;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static word pattern"));
static SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("static sentence pattern"));

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Deterministic feature-hashed bag of words, L2 normalised. Identical text always yields the
/// identical vector, across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    pub dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        HashingEmbedder {
            dims: DEFAULT_HASHING_DIMS,
        }
    }
}

impl HashingEmbedder {
    fn embed_one(&self, text: &str) -> Vector {
        let mut v = vec![0.0; self.dims];
        for word in WORD.find_iter(text) {
            let token = word.as_str().to_lowercase();
            let slot = (fnv1a(token.as_bytes()) % self.dims as u64) as usize;
            v[slot] += 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vector>, WeaveError> {
        if self.dims == 0 {
            return Err(ProviderKind::Embedding.error(HASHING, "dimension must be positive"));
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Body of the core `cosine` link method. Registering another metric under `cosine` replaces it
/// for every link declared with `method: cosine`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMetric;

impl MetricProvider for CosineMetric {
    fn score(&self, a: &[f64], b: &[f64]) -> Result<f64, WeaveError> {
        if a.len() != b.len() {
            return Err(WeaveError::shape(
                format!("metrics.{COSINE}"),
                format!("dimension mismatch: {} vs {}", a.len(), b.len()),
            ));
        }
        Ok(cosine_similarity(a, b))
    }
}

/// `1 / (1 + ‖a - b‖)`
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMetric;

impl MetricProvider for EuclideanMetric {
    fn score(&self, a: &[f64], b: &[f64]) -> Result<f64, WeaveError> {
        if a.len() != b.len() {
            return Err(ProviderKind::Metric.error(
                EUCLIDEAN,
                format!("dimension mismatch: {} vs {}", a.len(), b.len()),
            ));
        }
        let d = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt();
        Ok(1.0 / (1.0 + d))
    }
}

fn check_window(name: &str, max_tokens: usize, overlap: usize) -> Result<(), WeaveError> {
    if max_tokens == 0 {
        return Err(ProviderKind::Chunking.error(name, "max_tokens must be positive"));
    }
    if overlap >= max_tokens {
        return Err(ProviderKind::Chunking.error(
            name,
            format!("overlap ({overlap}) must be smaller than max_tokens ({max_tokens})"),
        ));
    }
    Ok(())
}

/// Token ranges of consecutive windows of `max_tokens`, each sharing `overlap` tokens with the
/// previous one.
fn window_ranges(len: usize, max_tokens: usize, overlap: usize) -> Vec<Range<usize>> {
    let step = max_tokens - overlap;
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + max_tokens).min(len);
        ranges.push(start..end);
        if end == len {
            break;
        }
        start += step;
    }
    ranges
}

/// Fixed windows of whitespace separated tokens, consecutive windows sharing `overlap` tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenChunker;

impl ChunkingProvider for TokenChunker {
    fn chunk(
        &self,
        text: &str,
        max_tokens: usize,
        overlap: usize,
    ) -> Result<Vec<String>, WeaveError> {
        check_window(TOKENS, max_tokens, overlap)?;
        let tokens: Vec<&str> = text.split_whitespace().collect();
        Ok(window_ranges(tokens.len(), max_tokens, overlap)
            .into_iter()
            .map(|range| tokens[range].join(" "))
            .collect())
    }
}

/// Packs whole sentences up to `max_tokens`; each new piece starts with the last `overlap`
/// tokens of the previous one. A sentence that overflows the window is split into token windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceChunker;

impl ChunkingProvider for SentenceChunker {
    fn chunk(
        &self,
        text: &str,
        max_tokens: usize,
        overlap: usize,
    ) -> Result<Vec<String>, WeaveError> {
        check_window(SENTENCES, max_tokens, overlap)?;
        let mut pieces = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        // Sentences added since the last flush; overlap carry-over alone is not a piece.
        let mut fresh = 0;
        for sentence in SENTENCE.find_iter(text) {
            let words: Vec<&str> = sentence.as_str().split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            if fresh > 0 && current.len() + words.len() > max_tokens {
                pieces.push(current.join(" "));
                let keep = current.len().min(overlap);
                current = current.split_off(current.len() - keep);
                fresh = 0;
            }
            current.extend(words);
            fresh += 1;
            if current.len() > max_tokens {
                let ranges = window_ranges(current.len(), max_tokens, overlap);
                if let Some((last, head)) = ranges.split_last() {
                    for range in head {
                        pieces.push(current[range.clone()].join(" "));
                    }
                    current = current[last.clone()].to_vec();
                }
            }
        }
        if fresh > 0 {
            pieces.push(current.join(" "));
        }
        Ok(pieces)
    }
}
