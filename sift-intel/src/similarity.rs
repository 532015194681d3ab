//! Embedding similarity search over a candidate pool.

use crate::tiers::Tiered;
use crate::tokens::{shared_terms, significant_tokens};
use sift_core::{
    by_similarity_desc, Embedding, Issue, IssueQuery, ProviderError, SiftError, SiftResult,
    SimilarityCandidate, SimilarityThresholds,
};
use sift_llm::{EmbeddingCache, ProviderSet};
use std::sync::Arc;

/// Shared terms quoted in a candidate's reasoning.
const REASONING_TERMS: usize = 3;

/// Result of one similarity search.
#[derive(Debug, Clone)]
pub struct SimilarityOutcome {
    pub candidates: Tiered<SimilarityCandidate>,
    /// Embedding of the query text, for callers that want to cache it.
    pub new_embedding: Embedding,
    /// Candidates compared successfully.
    pub scanned: usize,
    /// Candidates whose similarity could not be computed.
    pub skipped: usize,
}

impl SimilarityOutcome {
    /// Candidates considered, excluding the query itself.
    pub fn pool_size(&self) -> usize {
        self.scanned + self.skipped
    }
}

/// Embeds a query and its candidates, reusing cached candidate embeddings,
/// and tiers candidates by cosine similarity.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    providers: ProviderSet,
    cache: Arc<EmbeddingCache>,
}

impl SimilarityEngine {
    pub fn new(providers: ProviderSet, cache: Arc<EmbeddingCache>) -> Self {
        Self { providers, cache }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Find candidates similar to `query`.
    ///
    /// # Errors
    /// * `SiftError::Config` - invalid thresholds
    /// * `SiftError::Provider` - no embedding provider, a failed call, an
    ///   unusable vector, or a batch response of the wrong length. Any error
    ///   the provider itself returns is reported as a provider error. Never
    ///   an empty success.
    pub async fn find_similar(
        &self,
        query: &IssueQuery,
        candidates: &[Issue],
        thresholds: &SimilarityThresholds,
    ) -> SiftResult<SimilarityOutcome> {
        thresholds.validate("thresholds")?;
        let provider = self.providers.embedding()?;

        let pool: Vec<&Issue> = candidates.iter().filter(|c| !query.is_self(c)).collect();

        let mut resolved: Vec<Option<Arc<Embedding>>> = Vec::with_capacity(pool.len());
        let mut misses: Vec<usize> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();
        for (idx, issue) in pool.iter().enumerate() {
            match self.cache.get(&issue.id, &issue.content_hash()) {
                Some(embedding) => resolved.push(Some(embedding)),
                None => {
                    resolved.push(None);
                    misses.push(idx);
                    miss_texts.push(issue.embedding_text());
                }
            }
        }

        let query_text = query.embedding_text();
        let embedded = if miss_texts.is_empty() {
            provider
                .embed(&query_text)
                .await
                .map(|query| (query, Vec::new()))
        } else {
            let refs: Vec<&str> = miss_texts.iter().map(String::as_str).collect();
            tokio::try_join!(provider.embed(&query_text), provider.embed_batch(&refs))
        };
        let (query_embedding, fresh) = embedded.map_err(SiftError::into_embedding_failure)?;

        for embedding in std::iter::once(&query_embedding).chain(&fresh) {
            embedding.validate().map_err(|e| {
                SiftError::Provider(ProviderError::InvalidResponse {
                    provider: provider.model_id().to_string(),
                    reason: e.to_string(),
                })
            })?;
        }

        if fresh.len() != misses.len() {
            return Err(SiftError::Provider(ProviderError::InvalidResponse {
                provider: provider.model_id().to_string(),
                reason: format!(
                    "embed_batch returned {} embeddings for {} texts",
                    fresh.len(),
                    misses.len()
                ),
            }));
        }

        for (idx, embedding) in misses.iter().copied().zip(fresh) {
            let issue = pool[idx];
            self.cache
                .set(issue.id.clone(), issue.content_hash(), embedding.clone());
            resolved[idx] = Some(Arc::new(embedding));
        }

        let query_tokens = significant_tokens(&query_text);
        let mut tiers = Tiered::default();
        let mut scanned = 0;
        let mut skipped = 0;

        for (issue, embedding) in pool.iter().zip(&resolved) {
            let Some(embedding) = embedding else {
                skipped += 1;
                continue;
            };
            let similarity = match provider.cosine_similarity(&query_embedding, embedding) {
                Ok(value) => f64::from(value).max(0.0),
                Err(e) => {
                    tracing::debug!(issue = %issue.id, error = %e, "skipping candidate");
                    skipped += 1;
                    continue;
                }
            };
            scanned += 1;

            let tier = if similarity >= thresholds.high {
                &mut tiers.high
            } else if similarity >= thresholds.medium {
                &mut tiers.medium
            } else if similarity >= thresholds.min {
                &mut tiers.low
            } else {
                continue;
            };

            let band = if similarity >= thresholds.high {
                "High"
            } else if similarity >= thresholds.medium {
                "Moderate"
            } else {
                "Weak"
            };
            let terms = shared_terms(
                &query_tokens,
                &significant_tokens(&issue.embedding_text()),
                REASONING_TERMS,
            );

            tier.push(SimilarityCandidate {
                issue_id: issue.id.clone(),
                issue_number: issue.number,
                title: issue.title.clone(),
                similarity,
                reasoning: reasoning(band, similarity, &terms),
            });
        }

        tiers.sort_by(by_similarity_desc);

        tracing::debug!(
            candidates = pool.len(),
            cached = pool.len() - misses.len(),
            embedded = misses.len(),
            matched = tiers.total(),
            "similarity search complete"
        );

        Ok(SimilarityOutcome {
            candidates: tiers,
            new_embedding: query_embedding,
            scanned,
            skipped,
        })
    }
}

fn reasoning(band: &str, similarity: f64, terms: &[String]) -> String {
    let mut text = format!("{band} semantic similarity ({:.0}%)", similarity * 100.0);
    if !terms.is_empty() {
        text.push_str("; shared terms: ");
        text.push_str(&terms.join(", "));
    }
    text
}
