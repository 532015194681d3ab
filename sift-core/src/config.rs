//! Configuration types
//!
//! Every struct deserializes from TOML with per-field defaults and exposes
//! `validate()`. Invalid values are rejected, never clamped.

use crate::{ConfigError, SiftError, SiftResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cache TTL (24 hours).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
/// Default cache capacity.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;
/// Default high similarity threshold.
pub const DEFAULT_HIGH_SIMILARITY: f64 = 0.92;
/// Default medium similarity threshold.
pub const DEFAULT_MEDIUM_SIMILARITY: f64 = 0.75;
/// Default similarity floor for duplicate detection.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.50;
/// Default similarity floor for semantic relationships.
pub const DEFAULT_SEMANTIC_MIN_SIMILARITY: f64 = 0.75;
/// Default minimum label overlap for component relationships.
pub const DEFAULT_COMPONENT_MIN_OVERLAP: f64 = 0.3;
/// Default ceiling applied to confidence scores produced by fallback paths.
pub const DEFAULT_FALLBACK_CONFIDENCE_CAP: u8 = 70;

// ============================================================================
// SIMILARITY THRESHOLDS
// ============================================================================

/// Tier boundaries for similarity scores.
///
/// `similarity >= high` is high tier, `[medium, high)` medium,
/// `[min, medium)` low, and anything below `min` is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityThresholds {
    pub high: f64,
    pub medium: f64,
    pub min: f64,
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            high: DEFAULT_HIGH_SIMILARITY,
            medium: DEFAULT_MEDIUM_SIMILARITY,
            min: DEFAULT_MIN_SIMILARITY,
        }
    }
}

impl SimilarityThresholds {
    pub fn new(high: f64, medium: f64, min: f64) -> Self {
        Self { high, medium, min }
    }

    /// Validate `0 <= min <= medium <= high <= 1`.
    pub fn validate(&self, field: &str) -> SiftResult<()> {
        for (name, value) in [("high", self.high), ("medium", self.medium), ("min", self.min)] {
            check_unit_interval(&format!("{field}.{name}"), value)?;
        }
        if self.min > self.medium || self.medium > self.high {
            return Err(SiftError::invalid_config(
                field,
                format!("high={} medium={} min={}", self.high, self.medium, self.min),
                "thresholds must satisfy min <= medium <= high",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Embedding cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
    /// Maximum number of cached embeddings.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL in whole seconds.
    pub fn with_ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }

    /// Set the max entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> SiftResult<()> {
        if self.ttl_secs == 0 {
            return Err(SiftError::invalid_config(
                "cache.ttl_secs",
                self.ttl_secs,
                "ttl must be positive",
            ));
        }
        if self.max_entries == 0 {
            return Err(SiftError::invalid_config(
                "cache.max_entries",
                self.max_entries,
                "capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// DUPLICATE DETECTION
// ============================================================================

/// Duplicate detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    pub thresholds: SimilarityThresholds,
    /// Cap on the combined number of candidates across all tiers.
    pub max_results: Option<usize>,
    pub fallback_confidence_cap: u8,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            thresholds: SimilarityThresholds::default(),
            max_results: None,
            fallback_confidence_cap: DEFAULT_FALLBACK_CONFIDENCE_CAP,
        }
    }
}

impl DuplicateConfig {
    pub fn with_thresholds(mut self, thresholds: SimilarityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn validate(&self) -> SiftResult<()> {
        self.thresholds.validate("duplicates.thresholds")?;
        check_max_results("duplicates.max_results", self.max_results)?;
        check_cap("duplicates.fallback_confidence_cap", self.fallback_confidence_cap)
    }
}

// ============================================================================
// LABEL SUGGESTION
// ============================================================================

/// Tier boundaries for per-label confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.5,
        }
    }
}

impl LabelThresholds {
    pub fn validate(&self, field: &str) -> SiftResult<()> {
        check_unit_interval(&format!("{field}.high"), self.high)?;
        check_unit_interval(&format!("{field}.medium"), self.medium)?;
        if self.medium > self.high {
            return Err(SiftError::invalid_config(
                field,
                format!("high={} medium={}", self.high, self.medium),
                "medium threshold must not exceed high threshold",
            ));
        }
        Ok(())
    }
}

/// Label suggester configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Cap on the combined number of suggestions across all tiers.
    pub max_suggestions: usize,
    pub confidence_thresholds: LabelThresholds,
    /// Pass through labels that do not exist in the catalog yet.
    pub include_new_proposals: bool,
    /// Rank an existing label ahead of a proposed one at equal confidence.
    pub prefer_existing: bool,
    /// How many history entries to show the generator.
    pub max_history_examples: usize,
    pub fallback_confidence_cap: u8,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            max_suggestions: 5,
            confidence_thresholds: LabelThresholds::default(),
            include_new_proposals: true,
            prefer_existing: true,
            max_history_examples: 20,
            fallback_confidence_cap: DEFAULT_FALLBACK_CONFIDENCE_CAP,
        }
    }
}

impl LabelConfig {
    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    pub fn with_new_proposals(mut self, enabled: bool) -> Self {
        self.include_new_proposals = enabled;
        self
    }

    pub fn with_prefer_existing(mut self, enabled: bool) -> Self {
        self.prefer_existing = enabled;
        self
    }

    pub fn validate(&self) -> SiftResult<()> {
        check_max_results("labels.max_suggestions", Some(self.max_suggestions))?;
        self.confidence_thresholds
            .validate("labels.confidence_thresholds")?;
        check_cap("labels.fallback_confidence_cap", self.fallback_confidence_cap)
    }
}

// ============================================================================
// RELATED ISSUES
// ============================================================================

/// Related-issue linker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedConfig {
    pub enable_semantic: bool,
    pub enable_dependency: bool,
    pub enable_component: bool,
    /// Ask the structured generator to classify dependencies; keyword scan otherwise.
    pub use_ai_dependencies: bool,
    pub semantic_min: f64,
    pub component_min_overlap: f64,
    /// Upper bound on candidates shown to the generator in one prompt.
    pub max_dependency_candidates: usize,
    pub max_results: Option<usize>,
    pub fallback_confidence_cap: u8,
}

impl Default for RelatedConfig {
    fn default() -> Self {
        Self {
            enable_semantic: true,
            enable_dependency: true,
            enable_component: true,
            use_ai_dependencies: true,
            semantic_min: DEFAULT_SEMANTIC_MIN_SIMILARITY,
            component_min_overlap: DEFAULT_COMPONENT_MIN_OVERLAP,
            max_dependency_candidates: 50,
            max_results: None,
            fallback_confidence_cap: DEFAULT_FALLBACK_CONFIDENCE_CAP,
        }
    }
}

impl RelatedConfig {
    pub fn with_strategies(mut self, semantic: bool, dependency: bool, component: bool) -> Self {
        self.enable_semantic = semantic;
        self.enable_dependency = dependency;
        self.enable_component = component;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_ai_dependencies(mut self, enabled: bool) -> Self {
        self.use_ai_dependencies = enabled;
        self
    }

    pub fn enabled_strategy_count(&self) -> usize {
        [self.enable_semantic, self.enable_dependency, self.enable_component]
            .iter()
            .filter(|enabled| **enabled)
            .count()
    }

    pub fn validate(&self) -> SiftResult<()> {
        if self.enabled_strategy_count() == 0 {
            return Err(SiftError::invalid_config(
                "related.enable_*",
                "none",
                "at least one strategy must be enabled",
            ));
        }
        check_unit_interval("related.semantic_min", self.semantic_min)?;
        check_unit_interval("related.component_min_overlap", self.component_min_overlap)?;
        if self.max_dependency_candidates == 0 {
            return Err(SiftError::invalid_config(
                "related.max_dependency_candidates",
                0,
                "must be at least 1",
            ));
        }
        check_max_results("related.max_results", self.max_results)?;
        check_cap("related.fallback_confidence_cap", self.fallback_confidence_cap)
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelConfig {
    pub cache: CacheConfig,
    pub duplicates: DuplicateConfig,
    pub labels: LabelConfig,
    pub related: RelatedConfig,
}

impl IntelConfig {
    /// Parse and validate a TOML document.
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn from_toml_str(source: &str) -> SiftResult<Self> {
        let config: IntelConfig = toml::from_str(source).map_err(|e| {
            SiftError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> SiftResult<()> {
        self.cache.validate()?;
        self.duplicates.validate()?;
        self.labels.validate()?;
        self.related.validate()
    }
}

fn check_unit_interval(field: &str, value: f64) -> SiftResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SiftError::invalid_config(
            field,
            value,
            "must be between 0.0 and 1.0",
        ));
    }
    Ok(())
}

fn check_max_results(field: &str, value: Option<usize>) -> SiftResult<()> {
    if value == Some(0) {
        return Err(SiftError::invalid_config(field, 0, "must be at least 1"));
    }
    Ok(())
}

fn check_cap(field: &str, value: u8) -> SiftResult<()> {
    if value > 100 {
        return Err(SiftError::invalid_config(
            field,
            value,
            "must be between 0 and 100",
        ));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
