//! SIFT Core - Entity Types
//!
//! Pure data structures shared by the provider and engine crates: issue
//! records, embeddings, content hashes, confidence scores, relationships,
//! configuration and the error taxonomy. No provider calls live here.

use chrono::{DateTime, Utc};

pub mod candidate;
pub mod clock;
pub mod confidence;
pub mod config;
pub mod embedding;
pub mod error;
pub mod hash;
pub mod issue;

pub use candidate::{
    by_confidence_desc, by_similarity_desc, DependencyType, DetectionPath, FallbackReason,
    Relationship, RelationshipType, SimilarityCandidate,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use confidence::{ConfidenceScore, ConfidenceTier, HIGH_TIER_FLOOR, MEDIUM_TIER_FLOOR};
pub use config::{
    CacheConfig, DuplicateConfig, IntelConfig, LabelConfig, LabelThresholds, RelatedConfig,
    SimilarityThresholds, DEFAULT_FALLBACK_CONFIDENCE_CAP,
};
pub use embedding::Embedding;
pub use error::{
    ConfigError, ProviderError, SiftError, SiftResult, ValidationError, VectorError,
};
pub use hash::{compute_content_hash, ContentHash};
pub use issue::{
    Issue, IssueId, IssueQuery, IssueState, LabelDefinition, LabelHistoryEntry,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
