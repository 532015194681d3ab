//! Dependency classification between a subject issue and its candidates.
//!
//! With a structured generator the candidates are classified by the model.
//! Otherwise issue texts are scanned for explicit references such as
//! "blocked by #12" or "blocks #40".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use sift_core::{
    DependencyType, Issue, IssueId, IssueQuery, Relationship, RelationshipType, SiftResult,
};
use sift_llm::structured::check_probability;
use sift_llm::{generate_typed, StructuredGenerator, StructuredResponse, StructuredSchema};
use std::collections::HashMap;

/// Confidence of a keyword match in the blocks/blocked-by family.
pub const KEYWORD_BLOCKING_CONFIDENCE: f64 = 0.8;
/// Confidence of a keyword match expressing a loose relation.
pub const KEYWORD_RELATED_CONFIDENCE: f64 = 0.6;

static BLOCKED_BY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:blocked\s+by|depends\s+on|requires|needs|waiting\s+on)\s+#(\d+)")
        .expect("Invalid blocked-by regex")
});

static BLOCKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bblocks\s+#(\d+)").expect("Invalid blocks regex"));

static RELATED_TO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:related\s+to|relates\s+to|see|duplicate\s+of)\s+#(\d+)")
        .expect("Invalid related-to regex")
});

// ============================================================================
// STRUCTURED CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyClassification {
    pub issue_number: u64,
    pub relationship: DependencyType,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Structured-generation response for dependency classification.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyResponse {
    pub dependencies: Vec<DependencyClassification>,
}

impl StructuredResponse for DependencyResponse {
    fn schema() -> StructuredSchema {
        StructuredSchema::new(
            "issue_dependencies",
            json!({
                "type": "object",
                "required": ["dependencies"],
                "properties": {
                    "dependencies": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["issueNumber", "relationship", "confidence"],
                            "properties": {
                                "issueNumber": {"type": "integer", "minimum": 0},
                                "relationship": {"enum": ["blocks", "blocked_by", "related_to"]},
                                "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                                "reasoning": {"type": "string"}
                            }
                        }
                    }
                }
            }),
        )
    }

    fn validate(&self) -> Result<(), String> {
        for (i, dep) in self.dependencies.iter().enumerate() {
            check_probability(&format!("dependencies[{i}].confidence"), dep.confidence)?;
        }
        Ok(())
    }
}

/// Ask `generator` to classify `candidates` relative to `subject`.
///
/// Classifications naming an issue number outside `candidates` are dropped.
/// When the model classifies the same issue twice the stronger answer wins.
pub async fn classify(
    generator: &dyn StructuredGenerator,
    subject: &IssueQuery,
    source_id: &IssueId,
    candidates: &[&Issue],
) -> SiftResult<Vec<Relationship>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let prompt = build_prompt(subject, candidates);
    let response: DependencyResponse = generate_typed(generator, &prompt).await?;

    let by_number: HashMap<u64, &Issue> = candidates.iter().map(|c| (c.number, *c)).collect();
    let mut found = Findings::default();
    for dep in response.dependencies {
        let Some(target) = by_number.get(&dep.issue_number) else {
            tracing::debug!(issue_number = dep.issue_number, "dropping unknown issue number");
            continue;
        };
        let reasoning = if dep.reasoning.trim().is_empty() {
            format!("Model classified as {}", dep.relationship)
        } else {
            dep.reasoning
        };
        found.offer(source_id, target, dep.relationship, dep.confidence, reasoning);
    }
    Ok(found.into_relationships())
}

fn build_prompt(subject: &IssueQuery, candidates: &[&Issue]) -> String {
    let mut prompt = String::from(
        "Classify how each candidate issue depends on the subject issue.\n\
         Use \"blocks\" when the subject must be resolved before the candidate, \
         \"blocked_by\" when the candidate must be resolved before the subject, \
         and \"related_to\" for a weaker connection. Omit unrelated candidates.\n\n",
    );
    match subject.number {
        Some(number) => prompt.push_str(&format!("Subject #{number}: {}\n", subject.title.trim())),
        None => prompt.push_str(&format!("Subject: {}\n", subject.title.trim())),
    }
    if !subject.body_text().trim().is_empty() {
        prompt.push_str(&format!("{}\n", subject.body_text().trim()));
    }

    prompt.push_str("\nCandidates:\n");
    for issue in candidates {
        prompt.push_str(&format!("- #{}: {}\n", issue.number, issue.title.trim()));
    }
    prompt
}

// ============================================================================
// KEYWORD SCAN
// ============================================================================

/// Scan issue texts for explicit dependency references.
///
/// References in the subject map directly ("blocked by #12" makes the subject
/// blocked by #12). References to the subject's number inside a candidate map
/// to the inverse relation.
pub fn keyword_scan(
    subject: &IssueQuery,
    source_id: &IssueId,
    candidates: &[&Issue],
) -> Vec<Relationship> {
    let by_number: HashMap<u64, &Issue> = candidates.iter().map(|c| (c.number, *c)).collect();
    let mut found = Findings::default();

    for (dep_type, number, phrase) in references(&subject.embedding_text()) {
        if let Some(target) = by_number.get(&number) {
            found.offer(
                source_id,
                target,
                dep_type,
                keyword_confidence(dep_type),
                format!("Subject says \"{phrase}\""),
            );
        }
    }

    if let Some(subject_number) = subject.number {
        for issue in candidates {
            for (dep_type, number, phrase) in references(&issue.embedding_text()) {
                if number != subject_number {
                    continue;
                }
                let inverse = dep_type.inverse();
                found.offer(
                    source_id,
                    issue,
                    inverse,
                    keyword_confidence(inverse),
                    format!("#{} says \"{phrase}\"", issue.number),
                );
            }
        }
    }

    found.into_relationships()
}

fn keyword_confidence(dep_type: DependencyType) -> f64 {
    match dep_type {
        DependencyType::Blocks | DependencyType::BlockedBy => KEYWORD_BLOCKING_CONFIDENCE,
        DependencyType::RelatedTo => KEYWORD_RELATED_CONFIDENCE,
    }
}

/// Every `(type, referenced number, matched phrase)` in `text`.
fn references(text: &str) -> Vec<(DependencyType, u64, String)> {
    let mut out = Vec::new();
    for (pattern, dep_type) in [
        (&*BLOCKED_BY, DependencyType::BlockedBy),
        (&*BLOCKS, DependencyType::Blocks),
        (&*RELATED_TO, DependencyType::RelatedTo),
    ] {
        for caps in pattern.captures_iter(text) {
            let (Some(phrase), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if let Ok(number) = number.as_str().parse::<u64>() {
                out.push((dep_type, number, phrase.as_str().to_string()));
            }
        }
    }
    out
}

/// Strongest dependency per target.
#[derive(Default)]
struct Findings {
    by_target: HashMap<IssueId, Relationship>,
}

impl Findings {
    fn offer(
        &mut self,
        source_id: &IssueId,
        target: &Issue,
        dep_type: DependencyType,
        confidence: f64,
        reasoning: String,
    ) {
        if &target.id == source_id {
            return;
        }
        if let Some(existing) = self.by_target.get(&target.id) {
            if existing.confidence >= confidence {
                return;
            }
        }
        self.by_target.insert(
            target.id.clone(),
            Relationship {
                source_issue_id: source_id.clone(),
                target_issue_id: target.id.clone(),
                target_issue_number: target.number,
                target_issue_title: target.title.clone(),
                relationship_type: RelationshipType::Dependency,
                sub_type: Some(dep_type),
                confidence,
                reasoning,
            },
        );
    }

    fn into_relationships(self) -> Vec<Relationship> {
        self.by_target.into_values().collect()
    }
}
