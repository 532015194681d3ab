//! Deterministic in-process providers for tests and demos.

use crate::{EmbeddingProvider, StructuredGenerator, StructuredSchema};
use async_trait::async_trait;
use sift_core::{Embedding, ProviderError, SiftError, SiftResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// CALL COUNTERS
// ============================================================================

/// Counts provider calls so tests can assert batching and cache reuse.
#[derive(Debug, Default)]
pub struct CallCounter {
    single: AtomicUsize,
    batches: AtomicUsize,
    texts: AtomicUsize,
}

impl CallCounter {
    fn record_single(&self) {
        self.single.fetch_add(1, Ordering::Relaxed);
        self.texts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_batch(&self, size: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.texts.fetch_add(size, Ordering::Relaxed);
    }

    /// Number of `embed` calls.
    pub fn single_calls(&self) -> usize {
        self.single.load(Ordering::Relaxed)
    }

    /// Number of `embed_batch` calls.
    pub fn batch_calls(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    /// Total texts embedded across both entry points.
    pub fn texts_embedded(&self) -> usize {
        self.texts.load(Ordering::Relaxed)
    }
}

// ============================================================================
// HASHING EMBEDDING PROVIDER
// ============================================================================

/// Mock embedding provider producing bag-of-words vectors.
///
/// Every lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets and the result is normalized to a unit vector, so texts sharing
/// most of their words have high cosine similarity.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    model_id: String,
    dimensions: usize,
    counter: CallCounter,
}

impl MockEmbeddingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions: dimensions.max(1),
            counter: CallCounter::default(),
        }
    }

    pub fn calls(&self) -> &CallCounter {
        &self.counter
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut data = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let idx = (fnv1a(&token.to_lowercase()) % self.dimensions as u64) as usize;
            data[idx] += 1.0;
        }

        // Normalize to unit vector
        let norm: f32 = data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut data {
                *x /= norm;
            }
        }

        data
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> SiftResult<Embedding> {
        self.counter.record_single();
        Ok(Embedding::new(self.generate_embedding(text), self.model_id.clone()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> SiftResult<Vec<Embedding>> {
        self.counter.record_batch(texts.len());
        Ok(texts
            .iter()
            .map(|text| Embedding::new(self.generate_embedding(text), self.model_id.clone()))
            .collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// SCRIPTED EMBEDDING PROVIDER
// ============================================================================

/// Embedding provider answering from a fixed text → vector table.
///
/// Unknown texts map to a zero vector, which has similarity 0 with anything.
#[derive(Debug)]
pub struct ScriptedEmbeddingProvider {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
    counter: CallCounter,
    /// When set, `embed_batch` drops its last result.
    truncate_batches: bool,
}

impl ScriptedEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimensions,
            counter: CallCounter::default(),
            truncate_batches: false,
        }
    }

    /// Map `text` to `vector`.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Return one embedding too few from every batch call.
    pub fn with_truncated_batches(mut self) -> Self {
        self.truncate_batches = true;
        self
    }

    pub fn calls(&self) -> &CallCounter {
        &self.counter
    }

    fn lookup(&self, text: &str) -> Embedding {
        let data = self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimensions]);
        Embedding::new(data, "scripted")
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbeddingProvider {
    async fn embed(&self, text: &str) -> SiftResult<Embedding> {
        self.counter.record_single();
        Ok(self.lookup(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> SiftResult<Vec<Embedding>> {
        self.counter.record_batch(texts.len());
        let mut out: Vec<Embedding> = texts.iter().map(|t| self.lookup(t)).collect();
        if self.truncate_batches {
            out.pop();
        }
        Ok(out)
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// FAILING PROVIDERS
// ============================================================================

fn request_failed(message: impl Into<String>) -> SiftError {
    SiftError::Provider(ProviderError::RequestFailed {
        provider: "failing".to_string(),
        message: message.into(),
    })
}

/// Embedding provider whose every call fails.
#[derive(Debug, Clone)]
pub struct FailingEmbeddingProvider {
    error: SiftError,
}

impl FailingEmbeddingProvider {
    /// Fail with `ProviderError::RequestFailed`.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_error(request_failed(message))
    }

    /// Fail with an arbitrary error, e.g. a `VectorError` a buggy client
    /// might return.
    pub fn with_error(error: SiftError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _text: &str) -> SiftResult<Embedding> {
        Err(self.error.clone())
    }

    async fn embed_batch(&self, _texts: &[&str]) -> SiftResult<Vec<Embedding>> {
        Err(self.error.clone())
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

/// Structured generator whose every call fails.
#[derive(Debug, Clone)]
pub struct FailingGenerator {
    error: SiftError,
}

impl FailingGenerator {
    /// Fail with `ProviderError::RequestFailed`.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_error(request_failed(message))
    }

    /// Fail with an arbitrary error.
    pub fn with_error(error: SiftError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl StructuredGenerator for FailingGenerator {
    async fn generate_structured(
        &self,
        _prompt: &str,
        _schema: &StructuredSchema,
    ) -> SiftResult<serde_json::Value> {
        Err(self.error.clone())
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

// ============================================================================
// SCRIPTED GENERATOR
// ============================================================================

/// Structured generator returning canned JSON, keyed by schema name.
///
/// Records the last prompt and schema it was asked for.
#[derive(Debug)]
pub struct ScriptedGenerator {
    default: serde_json::Value,
    by_schema: HashMap<String, serde_json::Value>,
    last_prompt: Mutex<Option<String>>,
    last_schema: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Answer every request with `response`.
    pub fn new(response: serde_json::Value) -> Self {
        Self {
            default: response,
            by_schema: HashMap::new(),
            last_prompt: Mutex::new(None),
            last_schema: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer requests for `schema` with `response`.
    pub fn with_response(mut self, schema: impl Into<String>, response: serde_json::Value) -> Self {
        self.by_schema.insert(schema.into(), response);
        self
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn last_schema(&self) -> Option<String> {
        self.last_schema
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &StructuredSchema,
    ) -> SiftResult<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        *self.last_prompt.lock().unwrap_or_else(|p| p.into_inner()) = Some(prompt.to_string());
        *self.last_schema.lock().unwrap_or_else(|p| p.into_inner()) = Some(schema.name.clone());

        Ok(self
            .by_schema
            .get(&schema.name)
            .unwrap_or(&self.default)
            .clone())
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_embedding_is_deterministic_and_unit_length() {
        let provider = MockEmbeddingProvider::new("m", 128);
        let a = provider.embed("Login page crashes").await.unwrap();
        let b = provider.embed("login PAGE crashes").await.unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.dimensions, 128);

        let norm: f32 = a.data.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embedding_similarity_tracks_word_overlap() {
        let provider = MockEmbeddingProvider::new("m", 256);
        let base = provider.embed("export to csv fails with unicode names").await.unwrap();
        let close = provider.embed("export to csv fails with unicode filenames").await.unwrap();
        let far = provider.embed("dark mode toggle missing").await.unwrap();

        let near_sim = base.cosine_similarity(&close).unwrap();
        let far_sim = base.cosine_similarity(&far).unwrap();
        assert!(near_sim > far_sim);
        assert!(near_sim > 0.7);
    }

    #[tokio::test]
    async fn test_mock_batch_counts_calls() {
        let provider = MockEmbeddingProvider::new("m", 16);
        let out = provider.embed_batch(&["a", "b", "c"]).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(provider.calls().batch_calls(), 1);
        assert_eq!(provider.calls().texts_embedded(), 3);
        assert_eq!(provider.calls().single_calls(), 0);
    }

    #[tokio::test]
    async fn test_scripted_embedding_lookup_and_truncation() {
        let provider = ScriptedEmbeddingProvider::new(2)
            .with_vector("q", vec![1.0, 0.0])
            .with_truncated_batches();
        assert_eq!(provider.embed("q").await.unwrap().data, vec![1.0, 0.0]);
        assert_eq!(provider.embed("unknown").await.unwrap().data, vec![0.0, 0.0]);
        assert_eq!(provider.embed_batch(&["q", "q"]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_embedding_provider() {
        let provider = FailingEmbeddingProvider::new("down");
        assert!(provider.embed("x").await.is_err());
        let err = provider.embed_batch(&["x"]).await.unwrap_err();
        assert!(format!("{}", err).contains("down"));
    }

    #[tokio::test]
    async fn test_scripted_generator_routes_by_schema() {
        let generator = ScriptedGenerator::new(json!({"default": true}))
            .with_response("labels", json!({"labels": true}));

        let labels = generator
            .generate_structured("p1", &StructuredSchema::new("labels", json!({})))
            .await
            .unwrap();
        assert_eq!(labels, json!({"labels": true}));

        let other = generator
            .generate_structured("p2", &StructuredSchema::new("other", json!({})))
            .await
            .unwrap();
        assert_eq!(other, json!({"default": true}));
        assert_eq!(generator.last_prompt().as_deref(), Some("p2"));
        assert_eq!(generator.call_count(), 2);
    }
}
