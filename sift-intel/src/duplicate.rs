//! Duplicate detection.
//!
//! The primary path tiers candidates by embedding similarity. When the
//! embedding provider is missing or fails, candidates are tiered by token
//! overlap instead and the overall confidence is capped.

use crate::scorer::{factors, ConfidenceScorer};
use crate::similarity::SimilarityEngine;
use crate::tiers::Tiered;
use crate::tokens::{input_quality, jaccard, shared_terms, significant_tokens};
use serde::{Deserialize, Serialize};
use sift_core::{
    by_similarity_desc, ConfidenceScore, DetectionPath, DuplicateConfig, Embedding,
    FallbackReason, Issue, IssueQuery, SiftResult, SimilarityCandidate, SimilarityThresholds,
};

pub const SECTION_ID: &str = "duplicates";

const PATTERN_MATCH_WEIGHT: f64 = 0.6;
const INPUT_QUALITY_WEIGHT: f64 = 0.4;

/// Token overlap is a weaker signal than embedding similarity, so the
/// fallback tiers use their own fixed bands.
pub const FALLBACK_THRESHOLDS: SimilarityThresholds = SimilarityThresholds {
    high: 0.8,
    medium: 0.6,
    min: 0.3,
};

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateResult {
    #[serde(flatten)]
    pub candidates: Tiered<SimilarityCandidate>,
    /// Query embedding; absent when the fallback ran.
    pub new_embedding: Option<Embedding>,
    pub confidence: ConfidenceScore,
    pub path: DetectionPath,
}

/// Finds existing issues that duplicate a query.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    engine: SimilarityEngine,
    config: DuplicateConfig,
    scorer: ConfidenceScorer,
}

impl DuplicateDetector {
    /// # Errors
    /// `SiftError::Config` when `config` is invalid.
    pub fn new(engine: SimilarityEngine, config: DuplicateConfig) -> SiftResult<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            scorer: ConfidenceScorer::new(),
        })
    }

    pub fn config(&self) -> &DuplicateConfig {
        &self.config
    }

    /// Check `query` against `candidates` with the detector's configuration.
    pub async fn detect(
        &self,
        query: &IssueQuery,
        candidates: &[Issue],
    ) -> SiftResult<DuplicateResult> {
        self.detect_with(query, candidates, &self.config).await
    }

    /// Check `query` against `candidates` with per-call options.
    ///
    /// # Errors
    /// Only `SiftError::Config`; provider failures select the fallback path.
    pub async fn detect_with(
        &self,
        query: &IssueQuery,
        candidates: &[Issue],
        options: &DuplicateConfig,
    ) -> SiftResult<DuplicateResult> {
        options.validate()?;

        let mut result = match self
            .engine
            .find_similar(query, candidates, &options.thresholds)
            .await
        {
            Ok(outcome) => {
                let pattern_match = if outcome.pool_size() == 0 {
                    1.0
                } else {
                    outcome.scanned as f64 / outcome.pool_size() as f64
                };
                DuplicateResult {
                    candidates: outcome.candidates,
                    new_embedding: Some(outcome.new_embedding),
                    confidence: self.confidence(query, pattern_match)?,
                    path: DetectionPath::Primary,
                }
            }
            Err(e) if e.is_provider_failure() => {
                tracing::warn!(error = %e, "embedding unavailable, falling back to token overlap");
                self.fallback(query, candidates, options, FallbackReason::from(&e))?
            }
            Err(e) => return Err(e),
        };

        if let Some(max) = options.max_results {
            result.candidates.truncate(max);
        }

        tracing::debug!(
            high = result.candidates.high.len(),
            medium = result.candidates.medium.len(),
            low = result.candidates.low.len(),
            score = result.confidence.score,
            fallback = result.path.is_fallback(),
            "duplicate detection complete"
        );
        Ok(result)
    }

    fn fallback(
        &self,
        query: &IssueQuery,
        candidates: &[Issue],
        options: &DuplicateConfig,
        reason: FallbackReason,
    ) -> SiftResult<DuplicateResult> {
        let query_tokens = significant_tokens(&query.embedding_text());
        let mut tiers = Tiered::default();
        let mut pool = 0usize;
        let mut comparable = 0usize;

        for issue in candidates.iter().filter(|c| !query.is_self(c)) {
            pool += 1;
            let tokens = significant_tokens(&issue.embedding_text());
            if !tokens.is_empty() {
                comparable += 1;
            }
            let overlap = jaccard(&query_tokens, &tokens);

            let tier = if overlap >= FALLBACK_THRESHOLDS.high {
                &mut tiers.high
            } else if overlap >= FALLBACK_THRESHOLDS.medium {
                &mut tiers.medium
            } else if overlap >= FALLBACK_THRESHOLDS.min {
                &mut tiers.low
            } else {
                continue;
            };

            let mut reasoning = format!("Token overlap {:.0}%", overlap * 100.0);
            let terms = shared_terms(&query_tokens, &tokens, 3);
            if !terms.is_empty() {
                reasoning.push_str("; shared terms: ");
                reasoning.push_str(&terms.join(", "));
            }

            tier.push(SimilarityCandidate {
                issue_id: issue.id.clone(),
                issue_number: issue.number,
                title: issue.title.clone(),
                similarity: overlap,
                reasoning,
            });
        }

        tiers.sort_by(by_similarity_desc);

        let pattern_match = if pool == 0 {
            1.0
        } else {
            comparable as f64 / pool as f64
        };
        let confidence = self.scorer.cap(
            self.confidence(query, pattern_match)?,
            options.fallback_confidence_cap,
        );

        Ok(DuplicateResult {
            candidates: tiers,
            new_embedding: None,
            confidence,
            path: DetectionPath::fallback(reason),
        })
    }

    fn confidence(&self, query: &IssueQuery, pattern_match: f64) -> SiftResult<ConfidenceScore> {
        self.scorer.score(
            SECTION_ID,
            &factors([
                ("patternMatch", pattern_match),
                ("inputQuality", input_quality(query.body_text())),
            ]),
            &factors([
                ("patternMatch", PATTERN_MATCH_WEIGHT),
                ("inputQuality", INPUT_QUALITY_WEIGHT),
            ]),
        )
    }
}
