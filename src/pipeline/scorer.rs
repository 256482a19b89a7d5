//! Similarity scoring between two descriptors.
//!
//! Raw similarity lives in [-1, 1]: higher means more alike, identical
//! descriptors score exactly 1, and the score is symmetric.

use thiserror::Error;

use super::extractor::Descriptor;

pub const RAW_MIN: f32 = -1.0;
pub const RAW_MAX: f32 = 1.0;

/// Descriptors from different extractors, or of different lengths.
/// Never caused by user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Descriptor mismatch: {left_version}[{left_len}] vs {right_version}[{right_len}]")]
pub struct DescriptorMismatch {
    pub left_version: String,
    pub left_len: usize,
    pub right_version: String,
    pub right_len: usize,
}

pub trait SimilarityScorer: Send + Sync {
    /// Raw similarity in [`RAW_MIN`, `RAW_MAX`].
    fn similarity(&self, a: &Descriptor, b: &Descriptor) -> Result<f32, DescriptorMismatch>;
}

/// Cosine similarity.
///
/// A zero-norm descriptor (blank drawing) is orthogonal to everything except
/// an identical descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CosineSimilarity;

impl SimilarityScorer for CosineSimilarity {
    fn similarity(&self, a: &Descriptor, b: &Descriptor) -> Result<f32, DescriptorMismatch> {
        check_comparable(a, b)?;
        if a.values() == b.values() {
            return Ok(RAW_MAX);
        }

        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for (&x, &y) in a.values().iter().zip(b.values()) {
            dot += x as f64 * y as f64;
            norm_a += x as f64 * x as f64;
            norm_b += y as f64 * y as f64;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom <= 0.0 || !denom.is_finite() || !dot.is_finite() {
            return Ok(0.0);
        }
        Ok(((dot / denom) as f32).clamp(RAW_MIN, RAW_MAX))
    }
}

fn check_comparable(a: &Descriptor, b: &Descriptor) -> Result<(), DescriptorMismatch> {
    if a.len() != b.len() || a.version() != b.version() {
        return Err(DescriptorMismatch {
            left_version: a.version().to_string(),
            left_len: a.len(),
            right_version: b.version().to_string(),
            right_len: b.len(),
        });
    }
    Ok(())
}
