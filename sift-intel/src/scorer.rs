//! Weighted confidence scoring shared by every detector.

use sift_core::{ConfidenceScore, ConfidenceTier, SiftError, SiftResult};
use std::collections::BTreeMap;

/// Named factor values or weights.
pub type FactorMap = BTreeMap<String, f64>;

/// Build a [`FactorMap`] from `(name, value)` pairs.
pub fn factors<const N: usize>(pairs: [(&str, f64); N]) -> FactorMap {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Combines weighted factors into a 0-100 score with a tier and review flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Weighted mean of the factors present in both maps, scaled to 0-100.
    ///
    /// Factors without a weight, and weights without a factor, are ignored so
    /// a disabled input does not drag the score down.
    ///
    /// # Errors
    /// `ConfigError::InvalidValue` for a factor outside `[0, 1]` or a negative
    /// or non-finite weight.
    pub fn score(
        &self,
        section_id: &str,
        factors: &FactorMap,
        weights: &FactorMap,
    ) -> SiftResult<ConfidenceScore> {
        for (name, value) in factors {
            if !value.is_finite() || !(0.0..=1.0).contains(value) {
                return Err(SiftError::invalid_config(
                    format!("factors.{name}"),
                    value,
                    "factor must be between 0.0 and 1.0",
                ));
            }
        }
        for (name, weight) in weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(SiftError::invalid_config(
                    format!("weights.{name}"),
                    weight,
                    "weight must be a non-negative number",
                ));
            }
        }

        let (weighted, total_weight) = factors
            .iter()
            .filter_map(|(name, value)| weights.get(name).map(|w| (value * w, *w)))
            .fold((0.0, 0.0), |(sum, total), (v, w)| (sum + v, total + w));

        let score = if total_weight > 0.0 {
            ((weighted / total_weight) * 100.0).round().clamp(0.0, 100.0) as u8
        } else {
            0
        };

        Ok(ConfidenceScore::from_score(section_id, score, factors.clone()))
    }

    /// Lower `score` to `ceiling` and mark it for review.
    pub fn cap(&self, mut score: ConfidenceScore, ceiling: u8) -> ConfidenceScore {
        score.score = score.score.min(ceiling);
        score.tier = ConfidenceTier::for_score(score.score);
        score.needs_review = true;
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::ConfigError;

    #[test]
    fn test_weighted_mean() {
        let scorer = ConfidenceScorer::new();
        let score = scorer
            .score(
                "duplicates",
                &factors([("a", 1.0), ("b", 0.5)]),
                &factors([("a", 0.6), ("b", 0.4)]),
            )
            .unwrap();
        assert_eq!(score.score, 80);
        assert_eq!(score.tier, ConfidenceTier::High);
        assert!(!score.needs_review);
        assert_eq!(score.section_id, "duplicates");
        assert_eq!(score.factors.get("b"), Some(&0.5));
    }

    #[test]
    fn test_missing_factor_does_not_lower_score() {
        let scorer = ConfidenceScorer::new();
        let weights = factors([("a", 1.0), ("b", 1.0)]);
        let score = scorer.score("s", &factors([("a", 0.9)]), &weights).unwrap();
        assert_eq!(score.score, 90);
    }

    #[test]
    fn test_unnormalized_weights() {
        let scorer = ConfidenceScorer::new();
        let score = scorer
            .score("s", &factors([("a", 0.5), ("b", 0.5)]), &factors([("a", 3.0), ("b", 1.0)]))
            .unwrap();
        assert_eq!(score.score, 50);
        assert_eq!(score.tier, ConfidenceTier::Medium);
        assert!(score.needs_review);
    }

    #[test]
    fn test_zero_weight_scores_zero() {
        let scorer = ConfidenceScorer::new();
        let score = scorer
            .score("s", &factors([("a", 1.0)]), &factors([("a", 0.0)]))
            .unwrap();
        assert_eq!(score.score, 0);
        assert_eq!(score.tier, ConfidenceTier::Low);
    }

    #[test]
    fn test_rejects_out_of_range_inputs() {
        let scorer = ConfidenceScorer::new();
        let err = scorer
            .score("s", &factors([("a", 1.5)]), &factors([("a", 1.0)]))
            .unwrap_err();
        assert!(matches!(err, SiftError::Config(ConfigError::InvalidValue { .. })));
        assert!(scorer
            .score("s", &factors([("a", 0.5)]), &factors([("a", -1.0)]))
            .is_err());
        assert!(scorer
            .score("s", &factors([("a", f64::NAN)]), &factors([("a", 1.0)]))
            .is_err());
    }

    #[test]
    fn test_cap_lowers_and_flags_review() {
        let scorer = ConfidenceScorer::new();
        let score = scorer
            .score("s", &factors([("a", 0.95)]), &factors([("a", 1.0)]))
            .unwrap();
        let capped = scorer.cap(score, 70);
        assert_eq!(capped.score, 70);
        assert_eq!(capped.tier, ConfidenceTier::High);
        assert!(capped.needs_review);

        let low = scorer
            .score("s", &factors([("a", 0.3)]), &factors([("a", 1.0)]))
            .unwrap();
        let capped = scorer.cap(low, 70);
        assert_eq!(capped.score, 30);
        assert_eq!(capped.tier, ConfidenceTier::Low);
    }
}
