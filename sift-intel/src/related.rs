//! Related-issue linking.
//!
//! Up to three strategies nominate targets: embedding similarity, dependency
//! classification and label overlap. Nominations are merged so each target
//! appears once, carrying the strongest strategy's relationship.

use crate::dependency::{classify, keyword_scan};
use crate::scorer::{factors, ConfidenceScorer};
use crate::similarity::SimilarityEngine;
use crate::tokens::{input_quality, jaccard};
use serde::{Deserialize, Serialize};
use sift_core::{
    by_confidence_desc, ConfidenceScore, DetectionPath, FallbackReason, Issue, IssueId,
    IssueQuery, RelatedConfig, Relationship, RelationshipType, SiftResult, SimilarityThresholds,
    ValidationError,
};
use std::collections::{BTreeSet, HashMap};

pub const SECTION_ID: &str = "related";

const STRATEGY_COVERAGE_WEIGHT: f64 = 0.3;
const CANDIDATE_COVERAGE_WEIGHT: f64 = 0.4;
const INPUT_QUALITY_WEIGHT: f64 = 0.3;
const STRATEGY_COUNT: f64 = 3.0;

/// How one strategy fared in a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub strategy: RelationshipType,
    pub path: DetectionPath,
    /// Candidates the strategy was able to look at.
    pub evaluated: usize,
    /// Relationships it nominated before merging.
    pub nominated: usize,
}

/// Outcome of a related-issue request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedIssues {
    /// One relationship per target, strongest first.
    pub relationships: Vec<Relationship>,
    pub confidence: ConfidenceScore,
    /// One report per enabled strategy.
    pub strategies: Vec<StrategyReport>,
}

struct StrategyRun {
    relationships: Vec<Relationship>,
    report: StrategyReport,
}

impl StrategyRun {
    fn new(
        strategy: RelationshipType,
        path: DetectionPath,
        evaluated: usize,
        relationships: Vec<Relationship>,
    ) -> Self {
        Self {
            report: StrategyReport {
                strategy,
                path,
                evaluated,
                nominated: relationships.len(),
            },
            relationships,
        }
    }
}

/// Finds issues related to a subject issue.
#[derive(Debug, Clone)]
pub struct RelatedIssueLinker {
    engine: SimilarityEngine,
    config: RelatedConfig,
    scorer: ConfidenceScorer,
}

impl RelatedIssueLinker {
    /// # Errors
    /// `SiftError::Config` when `config` is invalid.
    pub fn new(engine: SimilarityEngine, config: RelatedConfig) -> SiftResult<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            scorer: ConfidenceScorer::new(),
        })
    }

    pub fn config(&self) -> &RelatedConfig {
        &self.config
    }

    pub async fn find(
        &self,
        subject: &IssueQuery,
        candidates: &[Issue],
    ) -> SiftResult<RelatedIssues> {
        self.find_with(subject, candidates, &self.config).await
    }

    /// Find related issues with per-call options.
    ///
    /// # Errors
    /// * `SiftError::Config` - invalid options
    /// * `SiftError::Validation` - `subject.issue_id` is missing
    pub async fn find_with(
        &self,
        subject: &IssueQuery,
        candidates: &[Issue],
        options: &RelatedConfig,
    ) -> SiftResult<RelatedIssues> {
        options.validate()?;
        let source_id = subject.issue_id.clone().ok_or_else(|| {
            ValidationError::RequiredFieldMissing {
                field: "issue_id".to_string(),
            }
        })?;

        let pool: Vec<&Issue> = candidates.iter().filter(|c| c.id != source_id).collect();

        let (semantic, dependency) = tokio::join!(
            self.semantic(subject, &source_id, candidates, options),
            self.dependency(subject, &source_id, &pool, options),
        );
        let component = self.component(subject, &source_id, &pool, options);
        let runs: Vec<StrategyRun> = [semantic?, dependency, component]
            .into_iter()
            .flatten()
            .collect();

        let relationships = merge(&runs, &source_id, options.max_results);

        let pool_size = pool.len();
        let candidate_coverage = if runs.is_empty() || pool_size == 0 {
            1.0
        } else {
            runs.iter()
                .map(|r| r.report.evaluated.min(pool_size) as f64 / pool_size as f64)
                .sum::<f64>()
                / runs.len() as f64
        };
        let mut confidence = self.scorer.score(
            SECTION_ID,
            &factors([
                ("strategyCoverage", options.enabled_strategy_count() as f64 / STRATEGY_COUNT),
                ("candidateCoverage", candidate_coverage),
                ("inputQuality", input_quality(subject.body_text())),
            ]),
            &factors([
                ("strategyCoverage", STRATEGY_COVERAGE_WEIGHT),
                ("candidateCoverage", CANDIDATE_COVERAGE_WEIGHT),
                ("inputQuality", INPUT_QUALITY_WEIGHT),
            ]),
        )?;
        if runs.iter().any(|r| r.report.path.is_fallback()) {
            confidence = self.scorer.cap(confidence, options.fallback_confidence_cap);
        }

        tracing::debug!(
            source = %source_id,
            candidates = pool_size,
            relationships = relationships.len(),
            score = confidence.score,
            "related issue search complete"
        );

        Ok(RelatedIssues {
            relationships,
            confidence,
            strategies: runs.into_iter().map(|r| r.report).collect(),
        })
    }

    async fn semantic(
        &self,
        subject: &IssueQuery,
        source_id: &IssueId,
        candidates: &[Issue],
        options: &RelatedConfig,
    ) -> SiftResult<Option<StrategyRun>> {
        if !options.enable_semantic {
            return Ok(None);
        }
        let floor = options.semantic_min;
        let thresholds = SimilarityThresholds::new(floor, floor, floor);

        match self.engine.find_similar(subject, candidates, &thresholds).await {
            Ok(outcome) => {
                let relationships = outcome
                    .candidates
                    .iter()
                    .map(|c| Relationship {
                        source_issue_id: source_id.clone(),
                        target_issue_id: c.issue_id.clone(),
                        target_issue_number: c.issue_number,
                        target_issue_title: c.title.clone(),
                        relationship_type: RelationshipType::Semantic,
                        sub_type: None,
                        confidence: c.similarity,
                        reasoning: c.reasoning.clone(),
                    })
                    .collect();
                Ok(Some(StrategyRun::new(
                    RelationshipType::Semantic,
                    DetectionPath::Primary,
                    outcome.scanned,
                    relationships,
                )))
            }
            Err(e) if e.is_provider_failure() => {
                tracing::warn!(error = %e, "semantic strategy unavailable, skipping");
                Ok(Some(StrategyRun::new(
                    RelationshipType::Semantic,
                    DetectionPath::fallback(FallbackReason::from(&e)),
                    0,
                    Vec::new(),
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn dependency(
        &self,
        subject: &IssueQuery,
        source_id: &IssueId,
        pool: &[&Issue],
        options: &RelatedConfig,
    ) -> Option<StrategyRun> {
        if !options.enable_dependency {
            return None;
        }

        let reason = if !options.use_ai_dependencies {
            FallbackReason::Disabled
        } else {
            let limited = &pool[..pool.len().min(options.max_dependency_candidates)];
            let attempt = match self.engine.providers().generator() {
                Ok(generator) => classify(generator.as_ref(), subject, source_id, limited).await,
                Err(e) => Err(e),
            };
            match attempt {
                Ok(relationships) => {
                    return Some(StrategyRun::new(
                        RelationshipType::Dependency,
                        DetectionPath::Primary,
                        limited.len(),
                        relationships,
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dependency classification unavailable, falling back to keyword scan");
                    FallbackReason::from(&e)
                }
            }
        };

        Some(StrategyRun::new(
            RelationshipType::Dependency,
            DetectionPath::fallback(reason),
            pool.len(),
            keyword_scan(subject, source_id, pool),
        ))
    }

    fn component(
        &self,
        subject: &IssueQuery,
        source_id: &IssueId,
        pool: &[&Issue],
        options: &RelatedConfig,
    ) -> Option<StrategyRun> {
        if !options.enable_component {
            return None;
        }

        let subject_labels = lowercase_labels(&subject.labels);
        let mut relationships = Vec::new();
        if !subject_labels.is_empty() {
            for issue in pool {
                let labels = lowercase_labels(&issue.labels);
                if labels.is_empty() {
                    continue;
                }
                let overlap = jaccard(&subject_labels, &labels);
                if overlap < options.component_min_overlap {
                    continue;
                }
                let shared: Vec<&str> = subject_labels
                    .intersection(&labels)
                    .map(String::as_str)
                    .collect();
                relationships.push(Relationship {
                    source_issue_id: source_id.clone(),
                    target_issue_id: issue.id.clone(),
                    target_issue_number: issue.number,
                    target_issue_title: issue.title.clone(),
                    relationship_type: RelationshipType::Component,
                    sub_type: None,
                    confidence: overlap,
                    reasoning: format!(
                        "Shares labels {} ({:.0}% overlap)",
                        shared.join(", "),
                        overlap * 100.0
                    ),
                });
            }
        }

        Some(StrategyRun::new(
            RelationshipType::Component,
            DetectionPath::Primary,
            pool.len(),
            relationships,
        ))
    }
}

fn lowercase_labels(labels: &[String]) -> BTreeSet<String> {
    labels
        .iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

/// One relationship per target, the strongest nomination winning. Ties keep
/// the earlier strategy.
fn merge(
    runs: &[StrategyRun],
    source_id: &IssueId,
    max_results: Option<usize>,
) -> Vec<Relationship> {
    let mut best: HashMap<&IssueId, &Relationship> = HashMap::new();
    for rel in runs.iter().flat_map(|r| &r.relationships) {
        if &rel.target_issue_id == source_id {
            continue;
        }
        match best.get(&rel.target_issue_id) {
            Some(current) if current.confidence >= rel.confidence => {}
            _ => {
                best.insert(&rel.target_issue_id, rel);
            }
        }
    }

    let mut merged: Vec<Relationship> = best.into_values().cloned().collect();
    merged.sort_by(by_confidence_desc);
    if let Some(max) = max_results {
        merged.truncate(max);
    }
    merged
}
