//! Typed boundary for structured generation.
//!
//! Every structured-generation call names a response type. The raw JSON from
//! the generator is deserialized into that type and validated; anything that
//! fails either step is reported as [`ProviderError::InvalidResponse`] so the
//! caller can treat it exactly like an unavailable provider.

use crate::{StructuredGenerator, StructuredSchema};
use serde::de::DeserializeOwned;
use sift_core::{ProviderError, SiftError, SiftResult};

/// A response shape requested from a [`StructuredGenerator`].
pub trait StructuredResponse: DeserializeOwned + Send {
    /// Schema sent alongside the prompt.
    fn schema() -> StructuredSchema;

    /// Semantic checks serde cannot express (ranges, non-empty names).
    fn validate(&self) -> Result<(), String>;
}

/// Run a structured-generation call and parse the result into `T`.
pub async fn generate_typed<T: StructuredResponse>(
    generator: &dyn StructuredGenerator,
    prompt: &str,
) -> SiftResult<T> {
    let schema = T::schema();
    let raw = generator
        .generate_structured(prompt, &schema)
        .await
        .map_err(SiftError::into_generation_failure)?;

    let parsed: T = serde_json::from_value(raw).map_err(|e| invalid(generator, &schema, e))?;
    parsed
        .validate()
        .map_err(|reason| invalid(generator, &schema, reason))?;

    tracing::trace!(schema = %schema.name, model = generator.model_id(), "structured response accepted");
    Ok(parsed)
}

fn invalid(
    generator: &dyn StructuredGenerator,
    schema: &StructuredSchema,
    reason: impl std::fmt::Display,
) -> SiftError {
    SiftError::Provider(ProviderError::InvalidResponse {
        provider: generator.model_id().to_string(),
        reason: format!("{}: {}", schema.name, reason),
    })
}

/// Check that a model-reported confidence is a probability.
pub fn check_probability(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{field} must be within [0, 1], got {value}"))
    }
}
