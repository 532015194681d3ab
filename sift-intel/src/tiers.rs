//! High/medium/low partitions of ranked results.

use serde::{Deserialize, Serialize};

/// Results split into confidence tiers.
///
/// Each tier is sorted descending and every entry in a higher tier outranks
/// every entry in a lower one, so `high ++ medium ++ low` is the combined
/// ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tiered<T> {
    pub high: Vec<T>,
    pub medium: Vec<T>,
    pub low: Vec<T>,
}

impl<T> Default for Tiered<T> {
    fn default() -> Self {
        Self {
            high: Vec::new(),
            medium: Vec::new(),
            low: Vec::new(),
        }
    }
}

impl<T> Tiered<T> {
    /// Number of entries across all tiers.
    pub fn total(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Combined ranking, best first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.high.iter().chain(&self.medium).chain(&self.low)
    }

    /// Keep the best `max` entries of the combined ranking.
    pub fn truncate(&mut self, max: usize) {
        let mut remaining = max;
        for tier in [&mut self.high, &mut self.medium, &mut self.low] {
            tier.truncate(remaining);
            remaining -= tier.len();
        }
    }

    /// Apply `order` within each tier.
    pub fn sort_by(&mut self, mut order: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        for tier in [&mut self.high, &mut self.medium, &mut self.low] {
            tier.sort_by(&mut order);
        }
    }
}
