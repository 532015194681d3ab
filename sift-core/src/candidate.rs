//! Transient per-request result types.
//!
//! Candidates and relationships are created and consumed within a single
//! request and are never persisted.

use crate::{IssueId, ProviderError, SiftError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One candidate issue scored against the subject of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityCandidate {
    pub issue_id: IssueId,
    pub issue_number: u64,
    pub title: String,
    /// 0-1.
    pub similarity: f64,
    pub reasoning: String,
}

/// Descending similarity, ties broken by ascending issue number.
pub fn by_similarity_desc(a: &SimilarityCandidate, b: &SimilarityCandidate) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.issue_number.cmp(&b.issue_number))
}

/// Strategy that produced a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Semantic,
    Dependency,
    Component,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::Semantic => "semantic",
            RelationshipType::Dependency => "dependency",
            RelationshipType::Component => "component",
        }
    }
}

/// Direction of a dependency, relative to the subject issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// The subject blocks the target.
    Blocks,
    /// The subject is blocked by the target.
    BlockedBy,
    RelatedTo,
}

impl DependencyType {
    /// The same edge seen from the other end.
    pub fn inverse(self) -> Self {
        match self {
            DependencyType::Blocks => DependencyType::BlockedBy,
            DependencyType::BlockedBy => DependencyType::Blocks,
            DependencyType::RelatedTo => DependencyType::RelatedTo,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DependencyType::Blocks => "blocks",
            DependencyType::BlockedBy => "blocked_by",
            DependencyType::RelatedTo => "related_to",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A link from the subject issue to one target issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_issue_id: IssueId,
    pub target_issue_id: IssueId,
    pub target_issue_number: u64,
    pub target_issue_title: String,
    pub relationship_type: RelationshipType,
    pub sub_type: Option<DependencyType>,
    /// 0-1.
    pub confidence: f64,
    pub reasoning: String,
}

/// Descending confidence, ties broken by ascending target number.
pub fn by_confidence_desc(a: &Relationship, b: &Relationship) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.target_issue_number.cmp(&b.target_issue_number))
}

/// Why a detector ran its degraded path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No provider was injected for the needed capability.
    ProviderNotConfigured,
    /// The provider call errored.
    ProviderFailed(String),
    /// The provider answered but the response failed validation.
    MalformedResponse(String),
    /// The caller turned the primary path off.
    Disabled,
}

impl From<&SiftError> for FallbackReason {
    fn from(err: &SiftError) -> Self {
        match err {
            SiftError::Provider(ProviderError::NotConfigured { .. }) => {
                FallbackReason::ProviderNotConfigured
            }
            SiftError::Provider(ProviderError::InvalidResponse { reason, .. }) => {
                FallbackReason::MalformedResponse(reason.clone())
            }
            other => FallbackReason::ProviderFailed(other.to_string()),
        }
    }
}

/// Which variant of a detector produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum DetectionPath {
    Primary,
    Fallback { reason: FallbackReason },
}

impl DetectionPath {
    pub fn is_fallback(&self) -> bool {
        matches!(self, DetectionPath::Fallback { .. })
    }

    pub fn fallback(reason: FallbackReason) -> Self {
        DetectionPath::Fallback { reason }
    }
}
