//! SIFT Intel - Issue intelligence engine
//!
//! Duplicate detection, label suggestion and related-issue linking over a
//! caller-supplied candidate pool. Every detector has a primary path backed
//! by an injected provider and a fallback path that runs without one; the
//! result records which path ran in its [`DetectionPath`](sift_core::DetectionPath).
//!
//! # Example
//! ```ignore
//! let providers = ProviderSet::new().with_embedding(Arc::new(my_embedder));
//! let intel = IssueIntelligence::new(IntelConfig::default(), providers)?;
//!
//! let result = intel.detect_duplicates(&query, &open_issues).await?;
//! for candidate in result.candidates.iter() {
//!     println!("#{} {:.2}", candidate.issue_number, candidate.similarity);
//! }
//! ```

use sift_core::{
    Clock, IntelConfig, Issue, IssueQuery, LabelDefinition, LabelHistoryEntry, SiftResult,
};
use sift_llm::{EmbeddingCache, ProviderSet};
use std::sync::Arc;

pub mod dependency;
pub mod duplicate;
pub mod labels;
pub mod related;
pub mod scorer;
pub mod similarity;
pub mod tiers;
pub mod tokens;

pub use duplicate::{DuplicateDetector, DuplicateResult};
pub use labels::{LabelSuggester, LabelSuggestion, LabelSuggestions, NewLabelProposal};
pub use related::{RelatedIssueLinker, RelatedIssues, StrategyReport};
pub use scorer::{ConfidenceScorer, FactorMap};
pub use similarity::{SimilarityEngine, SimilarityOutcome};
pub use tiers::Tiered;

// ============================================================================
// FACADE
// ============================================================================

/// All three detectors wired to one configuration, one provider set and one
/// shared embedding cache.
#[derive(Debug, Clone)]
pub struct IssueIntelligence {
    config: IntelConfig,
    cache: Arc<EmbeddingCache>,
    duplicates: DuplicateDetector,
    labels: LabelSuggester,
    related: RelatedIssueLinker,
}

impl IssueIntelligence {
    /// Build the engine with a cache reading the system clock.
    ///
    /// # Errors
    /// `SiftError::Config` when any section of `config` is invalid.
    pub fn new(config: IntelConfig, providers: ProviderSet) -> SiftResult<Self> {
        let cache = Arc::new(EmbeddingCache::new(&config.cache)?);
        Self::with_cache(config, providers, cache)
    }

    /// Build the engine with a cache reading `clock`.
    pub fn with_clock(
        config: IntelConfig,
        providers: ProviderSet,
        clock: Arc<dyn Clock>,
    ) -> SiftResult<Self> {
        let cache = Arc::new(EmbeddingCache::with_clock(&config.cache, clock)?);
        Self::with_cache(config, providers, cache)
    }

    /// Build the engine around an existing cache, e.g. one shared with
    /// another engine instance.
    pub fn with_cache(
        config: IntelConfig,
        providers: ProviderSet,
        cache: Arc<EmbeddingCache>,
    ) -> SiftResult<Self> {
        config.validate()?;
        let engine = SimilarityEngine::new(providers.clone(), cache.clone());

        Ok(Self {
            duplicates: DuplicateDetector::new(engine.clone(), config.duplicates.clone())?,
            labels: LabelSuggester::new(providers, config.labels.clone())?,
            related: RelatedIssueLinker::new(engine, config.related.clone())?,
            config,
            cache,
        })
    }

    pub fn config(&self) -> &IntelConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn duplicates(&self) -> &DuplicateDetector {
        &self.duplicates
    }

    pub fn labels(&self) -> &LabelSuggester {
        &self.labels
    }

    pub fn related(&self) -> &RelatedIssueLinker {
        &self.related
    }

    /// Find existing issues that duplicate `query`.
    pub async fn detect_duplicates(
        &self,
        query: &IssueQuery,
        candidates: &[Issue],
    ) -> SiftResult<DuplicateResult> {
        self.duplicates.detect(query, candidates).await
    }

    /// Suggest labels for `query` from `catalog`.
    pub async fn suggest_labels(
        &self,
        query: &IssueQuery,
        catalog: &[LabelDefinition],
        history: &[LabelHistoryEntry],
    ) -> SiftResult<LabelSuggestions> {
        self.labels.suggest(query, catalog, history).await
    }

    /// Find issues related to `subject`, which must carry an issue id.
    pub async fn find_related(
        &self,
        subject: &IssueQuery,
        candidates: &[Issue],
    ) -> SiftResult<RelatedIssues> {
        self.related.find(subject, candidates).await
    }

    /// Drop expired cache entries. Returns the number removed.
    pub fn clean_cache(&self) -> usize {
        self.cache.clean_expired()
    }
}
