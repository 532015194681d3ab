//! Confidence scores shared by every detector.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scores strictly below this are low-tier.
pub const MEDIUM_TIER_FLOOR: u8 = 50;

/// Scores at or above this are high-tier and need no review.
pub const HIGH_TIER_FLOOR: u8 = 70;

/// Confidence tier derived from a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Classify a score into its tier.
    pub fn for_score(score: u8) -> Self {
        if score >= HIGH_TIER_FLOOR {
            ConfidenceTier::High
        } else if score >= MEDIUM_TIER_FLOOR {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    /// Whether results in this tier should be reviewed by a human.
    pub fn needs_review(self) -> bool {
        self != ConfidenceTier::High
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

/// Overall confidence block attached to every detector result.
///
/// `factors` records the inputs so a score can be explained and tested
/// independently of the final number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub section_id: String,
    /// 0-100.
    pub score: u8,
    pub tier: ConfidenceTier,
    pub factors: BTreeMap<String, f64>,
    pub needs_review: bool,
}

impl ConfidenceScore {
    /// Build a score whose tier and review flag follow the fixed bands.
    pub fn from_score(
        section_id: impl Into<String>,
        score: u8,
        factors: BTreeMap<String, f64>,
    ) -> Self {
        let score = score.min(100);
        let tier = ConfidenceTier::for_score(score);
        Self {
            section_id: section_id.into(),
            score,
            tier,
            factors,
            needs_review: tier.needs_review(),
        }
    }

    /// Score as a 0-1 fraction.
    pub fn as_fraction(&self) -> f64 {
        f64::from(self.score) / 100.0
    }
}
