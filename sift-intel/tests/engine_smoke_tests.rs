//! End-to-end checks of the engine facade and its shared embedding cache.

use chrono::Duration;
use sift_intel::IssueIntelligence;
use sift_llm::ProviderSet;
use sift_test_utils::fixtures::*;
use sift_test_utils::*;
use serde_json::json;
use std::sync::Arc;

fn pool() -> Vec<Issue> {
    vec![
        issue(1, "Login page crashes on submit", Some("Stack trace attached")),
        issue(2, "Export to CSV drops unicode", Some("Names with accents vanish")),
        issue(3, "Dark theme request", None),
    ]
}

#[tokio::test]
async fn cache_reuse_invalidation_and_expiry() {
    init_test_tracing();
    let clock = ManualClock::fixed();
    let provider = Arc::new(MockEmbeddingProvider::new("mock", 64));
    let config = IntelConfig {
        cache: one_hour_cache(),
        ..IntelConfig::default()
    };
    let intel = IssueIntelligence::with_clock(
        config,
        ProviderSet::new().with_embedding(provider.clone()),
        Arc::new(clock.clone()),
    )
    .unwrap();
    let query = new_query("Login crashes", "Submitting the login form crashes");
    let mut issues = pool();

    intel.detect_duplicates(&query, &issues).await.unwrap();
    assert_eq!(provider.calls().batch_calls(), 1);
    assert_eq!(provider.calls().texts_embedded(), 4);
    assert_eq!(intel.cache().len(), 3);

    // Warm cache: only the query is embedded.
    intel.detect_duplicates(&query, &issues).await.unwrap();
    assert_eq!(provider.calls().batch_calls(), 1);
    assert_eq!(provider.calls().texts_embedded(), 5);

    // Editing an issue changes its content hash.
    issues[1].body = Some("Names with accents vanish after export".to_string());
    intel.detect_duplicates(&query, &issues).await.unwrap();
    assert_eq!(provider.calls().batch_calls(), 2);
    assert_eq!(provider.calls().texts_embedded(), 7);

    // Entries expire once their age reaches the TTL.
    clock.advance(Duration::minutes(59));
    assert_eq!(intel.clean_cache(), 0);
    clock.advance(Duration::minutes(1));
    assert_eq!(intel.clean_cache(), 3);
    assert!(intel.cache().is_empty());

    intel.detect_duplicates(&query, &issues).await.unwrap();
    assert_eq!(provider.calls().batch_calls(), 3);
    assert_eq!(provider.calls().texts_embedded(), 11);
}

#[tokio::test]
async fn full_cache_evicts_oldest_entries() {
    let clock = ManualClock::fixed();
    let provider = Arc::new(MockEmbeddingProvider::new("mock", 16));
    let config = IntelConfig {
        cache: one_hour_cache().with_max_entries(10),
        ..IntelConfig::default()
    };
    let intel = IssueIntelligence::with_clock(
        config,
        ProviderSet::new().with_embedding(provider),
        Arc::new(clock.clone()),
    )
    .unwrap();

    let first: Vec<Issue> = (1..=10)
        .map(|n| issue(n, &format!("first batch {n}"), None))
        .collect();
    intel
        .detect_duplicates(&IssueQuery::new("q", None), &first)
        .await
        .unwrap();
    assert_eq!(intel.cache().len(), 10);

    clock.advance(Duration::seconds(1));
    intel
        .detect_duplicates(&IssueQuery::new("q", None), &[issue(11, "late", None)])
        .await
        .unwrap();

    assert_eq!(intel.cache().len(), 10);
    assert!(intel.cache().has(&IssueId::new("11")));
    assert!(intel.cache().stats().evictions >= 1);
}

#[tokio::test]
async fn engine_runs_all_detectors_from_toml() {
    let config = IntelConfig::from_toml_str(
        r#"
        [duplicates]
        max_results = 2

        [related]
        enable_dependency = false
        "#,
    )
    .unwrap();
    let generator = ScriptedGenerator::new(json!({})).with_response(
        "label_suggestions",
        json!({
            "suggestions": [{"label": "bug", "isExisting": true, "confidence": 0.9}],
            "overallConfidence": 0.9
        }),
    );
    let intel = IssueIntelligence::new(
        config,
        ProviderSet::new()
            .with_embedding(Arc::new(MockEmbeddingProvider::new("mock", 64)))
            .with_generator(Arc::new(generator)),
    )
    .unwrap();

    let issues = pool();
    let subject = IssueQuery::from_issue(&issues[0]);

    let duplicates = intel.detect_duplicates(&subject, &issues).await.unwrap();
    assert!(duplicates.candidates.total() <= 2);
    assert!(duplicates.candidates.iter().all(|c| c.issue_number != 1));

    let labels = intel
        .suggest_labels(&subject, &label_catalog(), &label_history())
        .await
        .unwrap();
    assert_eq!(labels.suggestions.high[0].label, "bug");

    let related = intel.find_related(&subject, &issues).await.unwrap();
    assert_eq!(related.strategies.len(), 2);
    assert!(related
        .relationships
        .iter()
        .all(|r| r.target_issue_number != 1));

    let json = serde_json::to_value(&duplicates).unwrap();
    assert!(json.get("high").is_some());
    assert!(json.get("confidence").is_some());
}

#[test]
fn invalid_toml_values_are_config_errors() {
    let result = IntelConfig::from_toml_str("[cache]\nmax_entries = 0\n");
    sift_test_utils::assertions::assert_config_error(&result);
}
