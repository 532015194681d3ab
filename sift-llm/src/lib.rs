//! SIFT LLM - Provider seams
//!
//! Provider-agnostic traits for embeddings and structured generation, the
//! [`ProviderSet`] through which they are injected into the engine, and the
//! shared [`EmbeddingCache`]. Concrete network clients are user-supplied;
//! [`mock`] ships deterministic in-process providers for tests and demos.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::{Embedding, ProviderError, SiftError, SiftResult};
use std::sync::Arc;

pub mod cache;
pub mod mock;
pub mod structured;

pub use cache::{CacheStats, EmbeddingCache};
pub use structured::{generate_typed, StructuredResponse};

// ============================================================================
// EMBEDDING PROVIDER TRAIT
// ============================================================================

/// Trait for embedding providers.
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct OpenAIEmbedding { /* ... */ }
///
/// #[async_trait]
/// impl EmbeddingProvider for OpenAIEmbedding {
///     async fn embed(&self, text: &str) -> SiftResult<Embedding> {
///         // Call OpenAI API
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> SiftResult<Embedding>;

    /// Generate embeddings for multiple texts in one call.
    ///
    /// # Returns
    /// * `Ok(Vec<Embedding>)` - One embedding per input, in input order
    /// * `Err(SiftError::Provider)` - If embedding fails
    async fn embed_batch(&self, texts: &[&str]) -> SiftResult<Vec<Embedding>>;

    /// Cosine similarity in `[-1, 1]` between two embeddings from this provider.
    fn cosine_similarity(&self, a: &Embedding, b: &Embedding) -> SiftResult<f32> {
        a.cosine_similarity(b)
    }

    /// Get the model identifier for this provider.
    fn model_id(&self) -> &str;
}

// ============================================================================
// STRUCTURED GENERATION TRAIT
// ============================================================================

/// JSON schema describing the object a structured-generation call must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredSchema {
    /// Short identifier, e.g. `"label_suggestions"`.
    pub name: String,
    /// JSON Schema document.
    pub schema: serde_json::Value,
}

impl StructuredSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Trait for providers that turn a prompt into a schema-shaped JSON object.
///
/// Implementations are not trusted to honor the schema; callers validate the
/// returned value through [`generate_typed`].
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    /// Generate an object for `prompt` following `schema`.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &StructuredSchema,
    ) -> SiftResult<serde_json::Value>;

    /// Get the model identifier for this provider.
    fn model_id(&self) -> &str;
}

// ============================================================================
// PROVIDER SET
// ============================================================================

/// The provider capabilities injected into the engine.
/// Providers must be explicitly supplied - there is no process-wide default.
///
/// # Example
/// ```ignore
/// let providers = ProviderSet::new()
///     .with_embedding(Arc::new(my_embedding_provider))
///     .with_generator(Arc::new(my_generator));
///
/// let embedding = providers.embedding()?.embed("hello").await?;
/// ```
#[derive(Clone, Default)]
pub struct ProviderSet {
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn StructuredGenerator>>,
}

impl ProviderSet {
    /// Create an empty set. Every detector still works without providers by
    /// running its fallback path.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(provider);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn StructuredGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the embedding provider.
    pub fn register_embedding(&mut self, provider: Box<dyn EmbeddingProvider>) {
        self.embedding = Some(Arc::from(provider));
    }

    /// Replace the structured generator.
    pub fn register_generator(&mut self, generator: Box<dyn StructuredGenerator>) {
        self.generator = Some(Arc::from(generator));
    }

    /// Get the embedding provider.
    ///
    /// # Returns
    /// * `Err(SiftError::Provider(ProviderError::NotConfigured))` - If none was supplied
    pub fn embedding(&self) -> SiftResult<Arc<dyn EmbeddingProvider>> {
        self.embedding.clone().ok_or_else(|| {
            SiftError::Provider(ProviderError::NotConfigured {
                capability: "embedding".to_string(),
            })
        })
    }

    /// Get the structured generator.
    pub fn generator(&self) -> SiftResult<Arc<dyn StructuredGenerator>> {
        self.generator.clone().ok_or_else(|| {
            SiftError::Provider(ProviderError::NotConfigured {
                capability: "structured generation".to_string(),
            })
        })
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub fn clear_embedding(&mut self) {
        self.embedding = None;
    }

    pub fn clear_generator(&mut self) {
        self.generator = None;
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("embedding", &self.embedding.as_ref().map(|p| p.model_id().to_string()))
            .field("generator", &self.generator.as_ref().map(|g| g.model_id().to_string()))
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
