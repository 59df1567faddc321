//! Vector sets and the aggregate/blend rules applied to them.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::WeaveError;

pub type Vector = Vec<f64>;

/// One collapsed vector, or an ordered sequence of vectors left uncollapsed (`aggregate: none`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorSet {
    Single(Vector),
    Multi(Vec<Vector>),
}

impl VectorSet {
    pub fn vectors(&self) -> &[Vector] {
        match self {
            VectorSet::Single(v) => std::slice::from_ref(v),
            VectorSet::Multi(vs) => vs,
        }
    }

    pub fn into_vectors(self) -> Vec<Vector> {
        match self {
            VectorSet::Single(v) => vec![v],
            VectorSet::Multi(vs) => vs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Mean,
    Max,
    First,
    Last,
    None,
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Aggregate::Mean => "mean",
            Aggregate::Max => "max",
            Aggregate::First => "first",
            Aggregate::Last => "last",
            Aggregate::None => "none",
        };
        write!(f, "{name}")
    }
}

impl Aggregate {
    /// Collapse `vectors` into a [`VectorSet`]. `None` keeps the sequence as-is; an empty input
    /// always stays an empty uncollapsed set.
    pub fn apply(self, vectors: Vec<Vector>, path: &str) -> Result<VectorSet, WeaveError> {
        if vectors.is_empty() {
            return Ok(VectorSet::Multi(vectors));
        }
        let collapsed = match self {
            Aggregate::None => return Ok(VectorSet::Multi(vectors)),
            Aggregate::Mean => {
                let mut sum = vec![0.0; common_dims(&vectors, path)?];
                for v in &vectors {
                    for (acc, x) in sum.iter_mut().zip(v) {
                        *acc += x;
                    }
                }
                let n = vectors.len() as f64;
                sum.into_iter().map(|x| x / n).collect()
            }
            Aggregate::Max => {
                let mut max = vec![f64::NEG_INFINITY; common_dims(&vectors, path)?];
                for v in &vectors {
                    for (acc, x) in max.iter_mut().zip(v) {
                        *acc = acc.max(*x);
                    }
                }
                max
            }
            Aggregate::First | Aggregate::Last => {
                common_dims(&vectors, path)?;
                let picked = match self {
                    Aggregate::First => vectors.into_iter().next(),
                    _ => vectors.into_iter().last(),
                };
                picked.unwrap_or_default()
            }
        };
        Ok(VectorSet::Single(collapsed))
    }
}

fn common_dims(vectors: &[Vector], path: &str) -> Result<usize, WeaveError> {
    let dims = vectors.first().map(Vec::len).unwrap_or(0);
    match vectors.iter().position(|v| v.len() != dims) {
        Some(i) => Err(WeaveError::shape(
            path,
            format!(
                "vector {i} has {} dimensions, expected {dims}",
                vectors[i].len()
            ),
        )),
        None => Ok(dims),
    }
}

/// Weighted elementwise sum divided by the sum of the weights used.
pub fn weighted_blend(parts: &[(f64, &Vector)], path: &str) -> Result<Vector, WeaveError> {
    let total: f64 = parts.iter().map(|(w, _)| w).sum();
    if total == 0.0 {
        return Err(WeaveError::Config(format!(
            "{path}: combine weights sum to zero"
        )));
    }
    let vectors = parts.iter().map(|(_, v)| (*v).clone()).collect::<Vec<_>>();
    let dims = common_dims(&vectors, path)?;
    let mut blended = vec![0.0; dims];
    for (weight, v) in parts {
        for (acc, x) in blended.iter_mut().zip(v.iter()) {
            *acc += weight * x;
        }
    }
    Ok(blended.into_iter().map(|x| x / total).collect())
}

/// Zero for empty, zero-norm or differently sized inputs. Links reach this only through the
/// `cosine` metric in the provider registry, which checks dimensions first and can be overridden.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

pub fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
