//! SIFT Test Utilities
//!
//! Centralized test infrastructure for the SIFT workspace:
//! - Proptest generators for issues, embeddings and thresholds
//! - Deterministic providers and a manual clock
//! - Fixtures for common scenarios
//! - Custom assertions for detector results

use std::sync::Once;

// Re-export mock providers from their source crate
pub use sift_llm::mock::{
    CallCounter, FailingEmbeddingProvider, FailingGenerator, MockEmbeddingProvider,
    ScriptedEmbeddingProvider, ScriptedGenerator,
};

// Re-export core types for convenience
pub use sift_core::{
    CacheConfig, ConfidenceScore, ConfidenceTier, DetectionPath, Embedding, FallbackReason,
    IntelConfig, Issue, IssueId, IssueQuery, IssueState, LabelDefinition, LabelHistoryEntry,
    ManualClock, Relationship, SiftError, SiftResult, SimilarityCandidate, SimilarityThresholds,
};

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a test-writer subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    /// Generate a word-like token.
    pub fn arb_word() -> impl Strategy<Value = String> {
        "[a-z]{3,9}"
    }

    /// Generate a short title of a few words.
    pub fn arb_title() -> impl Strategy<Value = String> {
        prop::collection::vec(arb_word(), 1..6).prop_map(|words| words.join(" "))
    }

    /// Generate an optional body.
    pub fn arb_body() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop::collection::vec(arb_word(), 0..40).prop_map(|w| w.join(" ")))
    }

    /// Generate a label set drawn from a small vocabulary.
    pub fn arb_labels() -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set(
            prop_oneof![
                Just("bug"),
                Just("enhancement"),
                Just("area/ui"),
                Just("area/db"),
                Just("performance"),
                Just("docs"),
            ],
            0..4,
        )
        .prop_map(|set| set.into_iter().map(String::from).collect())
    }

    /// Generate an issue with the given number.
    pub fn arb_issue(number: u64) -> impl Strategy<Value = Issue> {
        (arb_title(), arb_body(), arb_labels(), any::<bool>(), 0i64..1_000_000).prop_map(
            move |(title, body, labels, open, offset)| Issue {
                id: IssueId::new(format!("issue-{number}")),
                number,
                title,
                body,
                labels,
                state: if open { IssueState::Open } else { IssueState::Closed },
                created_at: Utc
                    .timestamp_opt(1_700_000_000 + offset, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            },
        )
    }

    /// Generate a pool of issues numbered `1..=len`.
    pub fn arb_issue_pool(max_len: usize) -> impl Strategy<Value = Vec<Issue>> {
        (0..=max_len).prop_flat_map(|len| {
            (1..=len as u64)
                .map(arb_issue)
                .collect::<Vec<_>>()
        })
    }

    /// Generate an Embedding with specified dimensions.
    pub fn arb_embedding(dimensions: usize) -> impl Strategy<Value = Embedding> {
        (
            prop::collection::vec(-1.0f32..1.0f32, dimensions),
            "[a-z]{3,10}",
        )
            .prop_map(|(data, model_id)| Embedding::new(data, model_id))
    }

    /// Generate valid similarity thresholds (`min <= medium <= high`).
    pub fn arb_thresholds() -> impl Strategy<Value = SimilarityThresholds> {
        prop::collection::vec(0.0f64..=1.0, 3).prop_map(|mut v| {
            v.sort_by(|a, b| a.total_cmp(b));
            SimilarityThresholds::new(v[2], v[1], v[0])
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::{TimeZone, Utc};

    /// Build an open issue with `id` = `number`.
    pub fn issue(number: u64, title: &str, body: Option<&str>) -> Issue {
        IssueBuilder::new(number, title).body_opt(body).build()
    }

    /// Builder for candidate issues.
    #[derive(Debug, Clone)]
    pub struct IssueBuilder {
        issue: Issue,
    }

    impl IssueBuilder {
        pub fn new(number: u64, title: &str) -> Self {
            Self {
                issue: Issue {
                    id: IssueId::new(number.to_string()),
                    number,
                    title: title.to_string(),
                    body: None,
                    labels: Vec::new(),
                    state: IssueState::Open,
                    created_at: Utc
                        .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
                        .single()
                        .unwrap_or_else(Utc::now),
                },
            }
        }

        pub fn id(mut self, id: &str) -> Self {
            self.issue.id = IssueId::new(id);
            self
        }

        pub fn body(mut self, body: &str) -> Self {
            self.issue.body = Some(body.to_string());
            self
        }

        pub fn body_opt(mut self, body: Option<&str>) -> Self {
            self.issue.body = body.map(str::to_string);
            self
        }

        pub fn labels(mut self, labels: &[&str]) -> Self {
            self.issue.labels = labels.iter().map(|l| l.to_string()).collect();
            self
        }

        pub fn closed(mut self) -> Self {
            self.issue.state = IssueState::Closed;
            self
        }

        pub fn build(self) -> Issue {
            self.issue
        }
    }

    /// Query for an issue that has not been filed yet.
    pub fn new_query(title: &str, body: &str) -> IssueQuery {
        IssueQuery::new(title, Some(body.to_string()))
    }

    /// A small label catalog covering the usual triage axes.
    pub fn label_catalog() -> Vec<LabelDefinition> {
        vec![
            LabelDefinition::new("bug")
                .with_description("Something is not working")
                .with_color("d73a4a"),
            LabelDefinition::new("enhancement")
                .with_description("New feature or request")
                .with_color("a2eeef"),
            LabelDefinition::new("documentation")
                .with_description("Improvements or additions to docs")
                .with_color("0075ca"),
            LabelDefinition::new("area/ui")
                .with_description("User interface, styling and layout"),
            LabelDefinition::new("area/db").with_description("Database schema and queries"),
            LabelDefinition::new("performance")
                .with_description("Slow responses, latency or memory usage"),
        ]
    }

    /// A few prior labeling decisions.
    pub fn label_history() -> Vec<LabelHistoryEntry> {
        vec![
            LabelHistoryEntry {
                issue_title: "Dashboard takes 10s to load".to_string(),
                labels: vec!["performance".to_string(), "area/ui".to_string()],
            },
            LabelHistoryEntry {
                issue_title: "Migration fails on empty table".to_string(),
                labels: vec!["bug".to_string(), "area/db".to_string()],
            },
        ]
    }

    /// Config with a one-hour cache TTL.
    pub fn one_hour_cache() -> CacheConfig {
        CacheConfig::new().with_ttl_secs(3600)
    }

    /// Unit vector whose cosine similarity with `[1, 0]` is `similarity`.
    pub fn vector_at(similarity: f32) -> Vec<f32> {
        vec![similarity, (1.0 - similarity * similarity).max(0.0).sqrt()]
    }

    /// Embedding provider mapping each text to a vector at a fixed similarity
    /// from `query`.
    pub fn scripted_similarities(query: &str, candidates: &[(&str, f32)]) -> ScriptedEmbeddingProvider {
        candidates.iter().fold(
            ScriptedEmbeddingProvider::new(2).with_vector(query, vec![1.0, 0.0]),
            |provider, (text, similarity)| provider.with_vector(*text, vector_at(*similarity)),
        )
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// Assert that a result is a configuration error.
    pub fn assert_config_error<T: std::fmt::Debug>(result: &SiftResult<T>) {
        assert!(
            matches!(result, Err(SiftError::Config(_))),
            "Expected config error, got {:?}",
            result
        );
    }

    /// Assert that a result is a validation error.
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &SiftResult<T>) {
        assert!(
            matches!(result, Err(SiftError::Validation(_))),
            "Expected validation error, got {:?}",
            result
        );
    }

    /// Assert that values are in non-increasing order.
    pub fn assert_descending(values: &[f64]) {
        for pair in values.windows(2) {
            assert!(
                pair[0] >= pair[1],
                "Expected descending order, got {:?}",
                values
            );
        }
    }

    /// Assert the invariants of a degraded-path confidence block.
    pub fn assert_degraded(confidence: &ConfidenceScore, path: &DetectionPath, cap: u8) {
        assert!(path.is_fallback(), "Expected fallback path, got {:?}", path);
        assert!(
            confidence.score <= cap,
            "Fallback score {} exceeds cap {}",
            confidence.score,
            cap
        );
        assert!(confidence.needs_review, "Fallback result must need review");
    }

    /// Assert that tier and review flag agree with the score.
    pub fn assert_consistent_confidence(confidence: &ConfidenceScore) {
        assert_eq!(confidence.tier, ConfidenceTier::for_score(confidence.score));
        if confidence.tier != ConfidenceTier::High {
            assert!(confidence.needs_review);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;
    use sift_llm::EmbeddingProvider;

    #[test]
    fn test_issue_builder() {
        let issue = IssueBuilder::new(7, "title")
            .id("abc")
            .body("body")
            .labels(&["bug"])
            .closed()
            .build();
        assert_eq!(issue.id.as_str(), "abc");
        assert_eq!(issue.number, 7);
        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.labels, vec!["bug"]);
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let catalog = label_catalog();
        let mut names: Vec<&str> = catalog.iter().map(|l| l.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), catalog.len());
    }

    #[tokio::test]
    async fn test_scripted_similarities() {
        let provider = scripted_similarities("q", &[("a", 0.8)]);
        let q = provider.embed("q").await.unwrap();
        let a = provider.embed("a").await.unwrap();
        let sim = provider.cosine_similarity(&q, &a).unwrap();
        assert!((sim - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_generated_thresholds_are_valid(t in arb_thresholds()) {
            prop_assert!(t.validate("t").is_ok());
        }

        #[test]
        fn prop_generated_pool_is_numbered(pool in arb_issue_pool(8)) {
            for (i, issue) in pool.iter().enumerate() {
                prop_assert_eq!(issue.number, i as u64 + 1);
            }
        }
    }
}
