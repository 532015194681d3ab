//! Label suggestion.
//!
//! The primary path asks the structured generator for suggestions against
//! the repository's label catalog. Without a usable generator, label names
//! and descriptions are matched against the issue's words.

use crate::scorer::{factors, ConfidenceScorer};
use crate::tiers::Tiered;
use crate::tokens::{input_quality, significant_tokens};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sift_core::{
    ConfidenceScore, DetectionPath, FallbackReason, IssueQuery, LabelConfig, LabelDefinition,
    LabelHistoryEntry, SiftResult,
};
use sift_llm::structured::check_probability;
use sift_llm::{generate_typed, ProviderSet, StructuredResponse, StructuredSchema};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

pub const SECTION_ID: &str = "labels";

const MODEL_CONFIDENCE_WEIGHT: f64 = 0.5;
const CATALOG_MATCH_WEIGHT: f64 = 0.3;
const INPUT_QUALITY_WEIGHT: f64 = 0.2;

/// Keyword-match confidences never exceed this.
const FALLBACK_MAX_CONFIDENCE: f64 = 0.9;
/// Keyword matches below this are dropped.
const FALLBACK_MIN_CONFIDENCE: f64 = 0.2;
const NAME_HIT_WEIGHT: f64 = 0.7;
const DESCRIPTION_HIT_WEIGHT: f64 = 0.3;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// One suggested label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSuggestion {
    pub label: String,
    /// Whether the label already exists in the catalog.
    pub is_existing: bool,
    /// 0-1.
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub matched_patterns: Vec<String>,
}

/// A label the generator would like to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLabelProposal {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub rationale: String,
}

/// Structured-generation response for label suggestions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSuggestionResponse {
    pub suggestions: Vec<LabelSuggestion>,
    #[serde(default)]
    pub new_label_proposals: Vec<NewLabelProposal>,
    pub overall_confidence: f64,
}

impl StructuredResponse for LabelSuggestionResponse {
    fn schema() -> StructuredSchema {
        StructuredSchema::new(
            "label_suggestions",
            json!({
                "type": "object",
                "required": ["suggestions", "overallConfidence"],
                "properties": {
                    "suggestions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["label", "isExisting", "confidence"],
                            "properties": {
                                "label": {"type": "string"},
                                "isExisting": {"type": "boolean"},
                                "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                                "rationale": {"type": "string"},
                                "matchedPatterns": {"type": "array", "items": {"type": "string"}}
                            }
                        }
                    },
                    "newLabelProposals": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["name"],
                            "properties": {
                                "name": {"type": "string"},
                                "description": {"type": "string"},
                                "color": {"type": "string"},
                                "rationale": {"type": "string"}
                            }
                        }
                    },
                    "overallConfidence": {"type": "number", "minimum": 0, "maximum": 1}
                }
            }),
        )
    }

    fn validate(&self) -> Result<(), String> {
        check_probability("overallConfidence", self.overall_confidence)?;
        for (i, suggestion) in self.suggestions.iter().enumerate() {
            if suggestion.label.trim().is_empty() {
                return Err(format!("suggestions[{i}].label is empty"));
            }
            check_probability(&format!("suggestions[{i}].confidence"), suggestion.confidence)?;
        }
        for (i, proposal) in self.new_label_proposals.iter().enumerate() {
            if proposal.name.trim().is_empty() {
                return Err(format!("newLabelProposals[{i}].name is empty"));
            }
        }
        Ok(())
    }
}

/// Outcome of a label suggestion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSuggestions {
    #[serde(flatten)]
    pub suggestions: Tiered<LabelSuggestion>,
    pub new_label_proposals: Vec<NewLabelProposal>,
    pub confidence: ConfidenceScore,
    pub path: DetectionPath,
}

// ============================================================================
// SUGGESTER
// ============================================================================

/// Suggests labels for an issue from a label catalog.
#[derive(Debug, Clone)]
pub struct LabelSuggester {
    providers: ProviderSet,
    config: LabelConfig,
    scorer: ConfidenceScorer,
}

impl LabelSuggester {
    /// # Errors
    /// `SiftError::Config` when `config` is invalid.
    pub fn new(providers: ProviderSet, config: LabelConfig) -> SiftResult<Self> {
        config.validate()?;
        Ok(Self {
            providers,
            config,
            scorer: ConfidenceScorer::new(),
        })
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    pub async fn suggest(
        &self,
        query: &IssueQuery,
        catalog: &[LabelDefinition],
        history: &[LabelHistoryEntry],
    ) -> SiftResult<LabelSuggestions> {
        self.suggest_with(query, catalog, history, &self.config).await
    }

    /// Suggest labels with per-call options.
    ///
    /// # Errors
    /// Only `SiftError::Config`; generator failures select the fallback path.
    pub async fn suggest_with(
        &self,
        query: &IssueQuery,
        catalog: &[LabelDefinition],
        history: &[LabelHistoryEntry],
        options: &LabelConfig,
    ) -> SiftResult<LabelSuggestions> {
        options.validate()?;

        if catalog.is_empty() {
            return Ok(LabelSuggestions {
                suggestions: Tiered::default(),
                new_label_proposals: Vec::new(),
                confidence: self.confidence(0.0, 0.0, query)?,
                path: DetectionPath::Primary,
            });
        }

        let generated = match self.providers.generator() {
            Ok(generator) => {
                let prompt = build_prompt(query, catalog, history, options);
                generate_typed::<LabelSuggestionResponse>(generator.as_ref(), &prompt).await
            }
            Err(e) => Err(e),
        };

        let result = match generated {
            Ok(response) => self.primary(query, catalog, response, options)?,
            Err(e) if e.is_provider_failure() => {
                tracing::warn!(error = %e, "label generation unavailable, falling back to keyword match");
                self.fallback(query, catalog, options, FallbackReason::from(&e))?
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(
            suggestions = result.suggestions.total(),
            proposals = result.new_label_proposals.len(),
            score = result.confidence.score,
            fallback = result.path.is_fallback(),
            "label suggestion complete"
        );
        Ok(result)
    }

    fn primary(
        &self,
        query: &IssueQuery,
        catalog: &[LabelDefinition],
        response: LabelSuggestionResponse,
        options: &LabelConfig,
    ) -> SiftResult<LabelSuggestions> {
        let canonical: HashMap<String, &str> = catalog
            .iter()
            .map(|l| (l.name.to_lowercase(), l.name.as_str()))
            .collect();
        let applied = lowercase_set(&query.labels);

        let mut best: HashMap<String, LabelSuggestion> = HashMap::new();
        for mut suggestion in response.suggestions {
            let key = suggestion.label.trim().to_lowercase();
            if applied.contains(&key) {
                continue;
            }
            match canonical.get(&key) {
                Some(name) => {
                    suggestion.label = (*name).to_string();
                    suggestion.is_existing = true;
                }
                None => {
                    suggestion.label = suggestion.label.trim().to_string();
                    suggestion.is_existing = false;
                }
            }
            if !suggestion.is_existing && !options.include_new_proposals {
                continue;
            }
            match best.get(&key) {
                Some(existing) if existing.confidence >= suggestion.confidence => {}
                _ => {
                    best.insert(key, suggestion);
                }
            }
        }

        let kept: Vec<LabelSuggestion> = best.into_values().collect();
        let catalog_match = if kept.is_empty() {
            0.0
        } else {
            kept.iter().filter(|s| s.is_existing).count() as f64 / kept.len() as f64
        };
        let suggestions = tier(kept, options);

        let new_label_proposals = if options.include_new_proposals {
            response
                .new_label_proposals
                .into_iter()
                .filter(|p| !canonical.contains_key(&p.name.trim().to_lowercase()))
                .collect()
        } else {
            Vec::new()
        };

        Ok(LabelSuggestions {
            suggestions,
            new_label_proposals,
            confidence: self.confidence(response.overall_confidence, catalog_match, query)?,
            path: DetectionPath::Primary,
        })
    }

    fn fallback(
        &self,
        query: &IssueQuery,
        catalog: &[LabelDefinition],
        options: &LabelConfig,
        reason: FallbackReason,
    ) -> SiftResult<LabelSuggestions> {
        let text = query.embedding_text();
        let words = words(&text);
        let significant = significant_tokens(&text);
        let applied = lowercase_set(&query.labels);

        let mut kept = Vec::new();
        for label in catalog {
            if applied.contains(&label.name.to_lowercase()) {
                continue;
            }

            let name_tokens = label_name_tokens(&label.name);
            let name_matches: Vec<&String> =
                name_tokens.iter().filter(|t| words.contains(*t)).collect();
            let name_hit = fraction(name_matches.len(), name_tokens.len());

            let desc_tokens = label
                .description
                .as_deref()
                .map(significant_tokens)
                .unwrap_or_default();
            let desc_matches: Vec<&String> = desc_tokens.intersection(&significant).collect();
            let desc_hit = fraction(desc_matches.len(), desc_tokens.len());

            let confidence = (NAME_HIT_WEIGHT * name_hit + DESCRIPTION_HIT_WEIGHT * desc_hit)
                .min(FALLBACK_MAX_CONFIDENCE);
            if confidence < FALLBACK_MIN_CONFIDENCE {
                continue;
            }

            let mut matched_patterns: Vec<String> = name_matches.into_iter().cloned().collect();
            for token in desc_matches {
                if !matched_patterns.contains(token) {
                    matched_patterns.push(token.clone());
                }
            }

            kept.push(LabelSuggestion {
                label: label.name.clone(),
                is_existing: true,
                confidence,
                rationale: format!(
                    "Keyword match: {:.0}% of label name, {:.0}% of description",
                    name_hit * 100.0,
                    desc_hit * 100.0
                ),
                matched_patterns,
            });
        }

        let mean_confidence = if kept.is_empty() {
            0.0
        } else {
            kept.iter().map(|s| s.confidence).sum::<f64>() / kept.len() as f64
        };
        let catalog_match = if kept.is_empty() { 0.0 } else { 1.0 };
        let suggestions = tier(kept, options);

        let confidence = self.scorer.cap(
            self.confidence(mean_confidence, catalog_match, query)?,
            options.fallback_confidence_cap,
        );

        Ok(LabelSuggestions {
            suggestions,
            new_label_proposals: Vec::new(),
            confidence,
            path: DetectionPath::fallback(reason),
        })
    }

    fn confidence(
        &self,
        model_confidence: f64,
        catalog_match: f64,
        query: &IssueQuery,
    ) -> SiftResult<ConfidenceScore> {
        self.scorer.score(
            SECTION_ID,
            &factors([
                ("modelConfidence", model_confidence),
                ("catalogMatch", catalog_match),
                ("inputQuality", input_quality(query.body_text())),
            ]),
            &factors([
                ("modelConfidence", MODEL_CONFIDENCE_WEIGHT),
                ("catalogMatch", CATALOG_MATCH_WEIGHT),
                ("inputQuality", INPUT_QUALITY_WEIGHT),
            ]),
        )
    }
}

/// Rank, tier and truncate suggestions.
fn tier(mut suggestions: Vec<LabelSuggestion>, options: &LabelConfig) -> Tiered<LabelSuggestion> {
    suggestions.sort_by(|a, b| rank(a, b, options.prefer_existing));

    let thresholds = options.confidence_thresholds;
    let mut tiers = Tiered::default();
    for suggestion in suggestions {
        if suggestion.confidence >= thresholds.high {
            tiers.high.push(suggestion);
        } else if suggestion.confidence >= thresholds.medium {
            tiers.medium.push(suggestion);
        } else {
            tiers.low.push(suggestion);
        }
    }
    tiers.truncate(options.max_suggestions);
    tiers
}

fn rank(a: &LabelSuggestion, b: &LabelSuggestion, prefer_existing: bool) -> Ordering {
    let by_confidence = b
        .confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal);
    let by_existing = if prefer_existing {
        b.is_existing.cmp(&a.is_existing)
    } else {
        Ordering::Equal
    };
    by_confidence
        .then(by_existing)
        .then_with(|| a.label.cmp(&b.label))
}

fn build_prompt(
    query: &IssueQuery,
    catalog: &[LabelDefinition],
    history: &[LabelHistoryEntry],
    options: &LabelConfig,
) -> String {
    let mut prompt = String::from("Suggest labels for the following issue.\n\n");
    prompt.push_str(&format!("Title: {}\n", query.title.trim()));
    if !query.body_text().trim().is_empty() {
        prompt.push_str(&format!("Body:\n{}\n", query.body_text().trim()));
    }
    if !query.labels.is_empty() {
        prompt.push_str(&format!("Already labeled: {}\n", query.labels.join(", ")));
    }

    prompt.push_str("\nAvailable labels:\n");
    for label in catalog {
        prompt.push_str(&format!("- {}", label.name));
        if let Some(description) = &label.description {
            prompt.push_str(&format!(": {description}"));
        }
        if let Some(color) = &label.color {
            prompt.push_str(&format!(" (#{})", color.trim_start_matches('#')));
        }
        prompt.push('\n');
    }

    let examples: Vec<&LabelHistoryEntry> =
        history.iter().take(options.max_history_examples).collect();
    if !examples.is_empty() {
        prompt.push_str("\nPreviously labeled issues:\n");
        for entry in examples {
            prompt.push_str(&format!("- \"{}\": {}\n", entry.issue_title, entry.labels.join(", ")));
        }
    }

    prompt.push_str(&format!(
        "\nReturn at most {} suggestions with a confidence between 0 and 1 and a short rationale.",
        options.max_suggestions
    ));
    if options.prefer_existing {
        prompt.push_str(" Prefer labels from the available list.");
    }
    if options.include_new_proposals {
        prompt.push_str(" You may propose new labels in newLabelProposals.");
    } else {
        prompt.push_str(" Only suggest labels from the available list.");
    }
    prompt
}

fn lowercase_set(labels: &[String]) -> BTreeSet<String> {
    labels.iter().map(|l| l.trim().to_lowercase()).collect()
}

/// Every lowercase alphanumeric word, without length or stop-word filtering.
fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Words of a label name such as `area/ui` or `type:bug`.
fn label_name_tokens(name: &str) -> BTreeSet<String> {
    words(name)
}

fn fraction(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::SiftError;
    use sift_llm::mock::{FailingGenerator, ScriptedGenerator};
    use std::sync::Arc;

    fn catalog() -> Vec<LabelDefinition> {
        vec![
            LabelDefinition::new("bug").with_description("Something is not working"),
            LabelDefinition::new("area/ui")
                .with_description("User interface and styling")
                .with_color("c5def5"),
            LabelDefinition::new("performance").with_description("Slow queries or rendering"),
        ]
    }

    fn suggester(generator: Option<Arc<dyn sift_llm::StructuredGenerator>>) -> LabelSuggester {
        let mut providers = ProviderSet::new();
        if let Some(generator) = generator {
            providers = providers.with_generator(generator);
        }
        LabelSuggester::new(providers, LabelConfig::default()).unwrap()
    }

    fn query() -> IssueQuery {
        IssueQuery::new(
            "Button styling broken in dark mode",
            Some("The submit button renders with the wrong colour in the ui".to_string()),
        )
    }

    #[tokio::test]
    async fn test_primary_reconciles_catalog_and_tiers() {
        let generator = Arc::new(ScriptedGenerator::new(json!({
            "suggestions": [
                {"label": "Area/UI", "isExisting": false, "confidence": 0.9, "rationale": "styling"},
                {"label": "bug", "isExisting": true, "confidence": 0.6},
                {"label": "bug", "isExisting": true, "confidence": 0.7},
                {"label": "dark-mode", "isExisting": false, "confidence": 0.4}
            ],
            "newLabelProposals": [{"name": "dark-mode", "color": "000000"}],
            "overallConfidence": 0.85
        })));
        let suggester = suggester(Some(generator.clone()));

        let result = suggester.suggest(&query(), &catalog(), &[]).await.unwrap();
        assert_eq!(result.path, DetectionPath::Primary);
        assert_eq!(result.suggestions.high[0].label, "area/ui");
        assert!(result.suggestions.high[0].is_existing);
        assert_eq!(result.suggestions.medium.len(), 1);
        assert_eq!(result.suggestions.medium[0].confidence, 0.7);
        assert_eq!(result.suggestions.low[0].label, "dark-mode");
        assert!(!result.suggestions.low[0].is_existing);
        assert_eq!(result.new_label_proposals.len(), 1);
        assert_eq!(generator.last_schema().as_deref(), Some("label_suggestions"));
        assert!(generator.last_prompt().unwrap().contains("area/ui: User interface"));
    }

    #[tokio::test]
    async fn test_new_proposals_dropped_when_disabled() {
        let generator = Arc::new(ScriptedGenerator::new(json!({
            "suggestions": [
                {"label": "bug", "isExisting": true, "confidence": 0.8},
                {"label": "dark-mode", "isExisting": false, "confidence": 0.95}
            ],
            "newLabelProposals": [{"name": "dark-mode"}],
            "overallConfidence": 0.8
        })));
        let suggester = suggester(Some(generator));
        let options = LabelConfig::default().with_new_proposals(false);

        let result = suggester
            .suggest_with(&query(), &catalog(), &[], &options)
            .await
            .unwrap();
        assert_eq!(result.suggestions.total(), 1);
        assert_eq!(result.suggestions.high[0].label, "bug");
        assert!(result.new_label_proposals.is_empty());
    }

    #[tokio::test]
    async fn test_prefer_existing_breaks_ties() {
        let generator = Arc::new(ScriptedGenerator::new(json!({
            "suggestions": [
                {"label": "aardvark", "isExisting": false, "confidence": 0.6},
                {"label": "performance", "isExisting": true, "confidence": 0.6}
            ],
            "overallConfidence": 0.6
        })));
        let suggester = suggester(Some(generator));

        let result = suggester.suggest(&query(), &catalog(), &[]).await.unwrap();
        let order: Vec<&str> = result.suggestions.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(order, vec!["performance", "aardvark"]);

        let options = LabelConfig::default().with_prefer_existing(false);
        let result = suggester
            .suggest_with(&query(), &catalog(), &[], &options)
            .await
            .unwrap();
        let order: Vec<&str> = result.suggestions.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(order, vec!["aardvark", "performance"]);
    }

    #[tokio::test]
    async fn test_malformed_response_falls_back() {
        let generator = Arc::new(ScriptedGenerator::new(json!({
            "suggestions": [{"label": "bug", "isExisting": true, "confidence": 4.0}],
            "overallConfidence": 0.9
        })));
        let suggester = suggester(Some(generator));

        let result = suggester.suggest(&query(), &catalog(), &[]).await.unwrap();
        assert!(matches!(
            result.path,
            DetectionPath::Fallback {
                reason: FallbackReason::MalformedResponse(_)
            }
        ));
        assert!(result.confidence.score <= 70);
        assert!(result.confidence.needs_review);
    }

    #[tokio::test]
    async fn test_fallback_keyword_match() {
        let suggester = suggester(Some(Arc::new(FailingGenerator::new("offline"))));

        let result = suggester.suggest(&query(), &catalog(), &[]).await.unwrap();
        assert!(result.path.is_fallback());
        assert!(result.new_label_proposals.is_empty());

        let ui = result
            .suggestions
            .iter()
            .find(|s| s.label == "area/ui")
            .expect("area/ui suggested");
        // "ui" of "area/ui" matched, "styling" of the description matched
        assert!(ui.matched_patterns.contains(&"ui".to_string()));
        assert!(ui.confidence <= FALLBACK_MAX_CONFIDENCE);
        assert!(result
            .suggestions
            .iter()
            .all(|s| s.confidence >= FALLBACK_MIN_CONFIDENCE && s.is_existing));
    }

    #[tokio::test]
    async fn test_applied_labels_are_not_suggested() {
        let suggester = suggester(None);
        let query = query().with_labels(vec!["Area/UI".to_string()]);
        let result = suggester.suggest(&query, &catalog(), &[]).await.unwrap();
        assert!(result.suggestions.iter().all(|s| s.label != "area/ui"));
    }

    #[tokio::test]
    async fn test_empty_catalog_yields_empty_tiers() {
        let suggester = suggester(None);
        let result = suggester.suggest(&query(), &[], &[]).await.unwrap();
        assert!(result.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_max_suggestions_zero_is_config_error() {
        let suggester = suggester(None);
        let options = LabelConfig::default().with_max_suggestions(0);
        let err = suggester
            .suggest_with(&query(), &catalog(), &[], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, SiftError::Config(_)));
    }

    #[test]
    fn test_prompt_limits_history() {
        let history: Vec<LabelHistoryEntry> = (0..30)
            .map(|i| LabelHistoryEntry {
                issue_title: format!("past issue {i}"),
                labels: vec!["bug".to_string()],
            })
            .collect();
        let prompt = build_prompt(&query(), &catalog(), &history, &LabelConfig::default());
        assert!(prompt.contains("past issue 19"));
        assert!(!prompt.contains("past issue 20"));
        assert!(prompt.contains("(#c5def5)"));
    }
}
