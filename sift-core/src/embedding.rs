//! Embedding vector operations

use crate::{SiftError, SiftResult, VectorError};
use serde::{Deserialize, Serialize};

/// Semantic embedding of one issue's title and body.
///
/// Embeddings are immutable once computed. They are never merged or averaged
/// in place; a changed issue gets a new embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// The embedding data as a vector of f32 values.
    pub data: Vec<f32>,
    /// Identifier of the model that produced this embedding.
    pub model_id: String,
    /// Number of dimensions (must match data.len()).
    pub dimensions: usize,
}

impl Embedding {
    /// Create a new embedding.
    pub fn new(data: Vec<f32>, model_id: impl Into<String>) -> Self {
        let dimensions = data.len();
        Self {
            data,
            model_id: model_id.into(),
            dimensions,
        }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// An all-zero vector (a provider's answer for text it could not embed)
    /// is similar to nothing and scores 0 rather than NaN. Rounding can push
    /// the quotient of near-parallel vectors past 1, so the result is clamped
    /// to `[-1, 1]` before callers compare it against tier thresholds.
    pub fn cosine_similarity(&self, other: &Embedding) -> SiftResult<f32> {
        if self.dimensions != other.dimensions {
            return Err(SiftError::Vector(VectorError::DimensionMismatch {
                expected: self.dimensions,
                got: other.dimensions,
            }));
        }

        let mut dot_product = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.data.iter().zip(other.data.iter()) {
            dot_product += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let norm_a = norm_a.sqrt();
        let norm_b = norm_b.sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }

        Ok((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
    }

    /// Check that a provider returned a usable vector: non-empty, length
    /// matching `dimensions`, and free of NaN or infinite components.
    ///
    /// # Errors
    /// `VectorError::InvalidVector` describing the first problem found.
    pub fn validate(&self) -> SiftResult<()> {
        let reason = if self.dimensions == 0 {
            "embedding has no dimensions".to_string()
        } else if self.data.len() != self.dimensions {
            format!(
                "embedding declares {} dimensions but holds {} values",
                self.dimensions,
                self.data.len()
            )
        } else if self.data.iter().any(|v| !v.is_finite()) {
            "embedding contains non-finite values".to_string()
        } else {
            return Ok(());
        };
        Err(SiftError::Vector(VectorError::InvalidVector { reason }))
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

// =============================================================================
// TESTS
// =============================================================================
