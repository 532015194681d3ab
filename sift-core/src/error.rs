//! Error types for SIFT operations

use thiserror::Error;

/// Embedding and structured-generation provider errors.
///
/// Detectors never surface these to callers; they select the fallback path
/// instead and record the reason in the result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("No {capability} provider configured")]
    NotConfigured { capability: String },

    #[error("Request to {provider} failed: {message}")]
    RequestFailed { provider: String, message: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("Structured generation failed: {reason}")]
    GenerationFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Vector operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid vector: {reason}")]
    InvalidVector { reason: String },
}

/// Master error type for all SIFT errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SiftError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

impl SiftError {
    /// True when the error came from a provider and should trigger a fallback
    /// path rather than reach the caller.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, SiftError::Provider(_))
    }

    /// Normalize an error returned by an embedding provider.
    ///
    /// Provider implementations may return any `SiftError`; anything that is
    /// not already a `Provider` error becomes `EmbeddingFailed` so detectors
    /// take their fallback path instead of passing it to the caller.
    pub fn into_embedding_failure(self) -> Self {
        match self {
            SiftError::Provider(_) => self,
            other => SiftError::Provider(ProviderError::EmbeddingFailed {
                reason: other.to_string(),
            }),
        }
    }

    /// Normalize an error returned by a structured generator. Non-provider
    /// errors become `GenerationFailed`.
    pub fn into_generation_failure(self) -> Self {
        match self {
            SiftError::Provider(_) => self,
            other => SiftError::Provider(ProviderError::GenerationFailed {
                reason: other.to_string(),
            }),
        }
    }

    /// Shorthand for an invalid configuration value.
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        SiftError::Config(ConfigError::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        })
    }
}

/// Result type alias for SIFT operations.
pub type SiftResult<T> = Result<T, SiftError>;

// =============================================================================
// TESTS
// =============================================================================
