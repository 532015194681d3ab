//! Issue records supplied by the caller.
//!
//! The engine never fetches issues itself. Callers hand in the subject of a
//! request as an [`IssueQuery`] and the candidate pool as a slice of [`Issue`].

use crate::{compute_content_hash, ContentHash, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an issue in the upstream tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(String);

impl IssueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IssueId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for IssueId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Open/closed state of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// An existing issue in the candidate pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub state: IssueState,
    pub created_at: Timestamp,
}

impl Issue {
    /// Text handed to the embedding provider.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.title, self.body.as_deref())
    }

    /// Hash of the normalized title and body.
    pub fn content_hash(&self) -> ContentHash {
        compute_content_hash(Some(&self.title), self.body.as_deref())
    }

    /// Body text, empty when absent.
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// The subject of a detection request.
///
/// A query may describe an issue that does not exist yet (duplicate check
/// before filing), so `issue_id` and `number` are optional. When `issue_id`
/// is set, candidates carrying the same id are never matched against it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IssueQuery {
    pub issue_id: Option<IssueId>,
    pub number: Option<u64>,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
}

impl IssueQuery {
    /// Create a query from a title and optional body.
    pub fn new(title: impl Into<String>, body: Option<String>) -> Self {
        Self {
            title: title.into(),
            body,
            ..Self::default()
        }
    }

    /// Build a query describing an existing issue.
    pub fn from_issue(issue: &Issue) -> Self {
        Self {
            issue_id: Some(issue.id.clone()),
            number: Some(issue.number),
            title: issue.title.clone(),
            body: issue.body.clone(),
            labels: issue.labels.clone(),
        }
    }

    pub fn with_issue_id(mut self, id: impl Into<IssueId>) -> Self {
        self.issue_id = Some(id.into());
        self
    }

    pub fn with_number(mut self, number: u64) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Text handed to the embedding provider.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.title, self.body.as_deref())
    }

    /// Body text, empty when absent.
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    /// True when `issue` is the subject itself.
    pub fn is_self(&self, issue: &Issue) -> bool {
        self.issue_id.as_ref() == Some(&issue.id)
    }
}

fn embedding_text(title: &str, body: Option<&str>) -> String {
    match body.map(str::trim).filter(|b| !b.is_empty()) {
        Some(body) => format!("{}\n\n{}", title.trim(), body),
        None => title.trim().to_string(),
    }
}

/// A label available in the repository's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDefinition {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl LabelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            color: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// A past issue and the labels it ended up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelHistoryEntry {
    pub issue_title: String,
    pub labels: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn issue(id: &str, title: &str, body: Option<&str>) -> Issue {
        Issue {
            id: IssueId::new(id),
            number: 7,
            title: title.to_string(),
            body: body.map(str::to_string),
            labels: vec!["bug".to_string()],
            state: IssueState::Open,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_embedding_text_joins_title_and_body() {
        let with_body = issue("1", " Crash on save ", Some("Segfault in writer"));
        assert_eq!(with_body.embedding_text(), "Crash on save\n\nSegfault in writer");

        let without_body = issue("1", "Crash on save", Some("   "));
        assert_eq!(without_body.embedding_text(), "Crash on save");
    }

    #[test]
    fn test_content_hash_matches_free_function() {
        let i = issue("1", "Title", Some("Body"));
        assert_eq!(
            i.content_hash(),
            compute_content_hash(Some("title"), Some("body"))
        );
    }

    #[test]
    fn test_query_from_issue_detects_self() {
        let i = issue("42", "Title", None);
        let query = IssueQuery::from_issue(&i);
        assert!(query.is_self(&i));
        assert_eq!(query.number, Some(7));

        let anonymous = IssueQuery::new("Title", None);
        assert!(!anonymous.is_self(&i));
    }

    #[test]
    fn test_issue_state_serializes_lowercase() {
        let json = serde_json::to_string(&IssueState::Closed).unwrap();
        assert_eq!(json, "\"closed\"");
    }
}
