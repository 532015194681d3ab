//! Content-addressed embedding cache.
//!
//! Entries are keyed by issue id and guarded by the content hash of the text
//! they were computed from. A read with a different hash, or after the TTL
//! has elapsed, deletes the entry and reports a miss.
//!
//! Keys are independent: each read or write of one key is atomic through the
//! sharded map, and eviction works from a snapshot of `(cached_at, seq)`
//! without blocking unrelated keys. Only the admission of *new* keys is
//! serialized, which keeps the map at or under capacity.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sift_core::{CacheConfig, Clock, ContentHash, Embedding, IssueId, SiftResult, SystemClock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fraction of entries evicted when a new key would exceed capacity.
const EVICTION_FRACTION: f64 = 0.10;

#[derive(Debug, Clone)]
struct CacheEntry {
    content_hash: ContentHash,
    embedding: Arc<Embedding>,
    cached_at: DateTime<Utc>,
    /// Insertion order; breaks `cached_at` ties during eviction.
    seq: u64,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of entries currently in cache.
    pub size: usize,
    pub max_size: usize,
    pub ttl: Duration,
    pub oldest_entry_age: Option<Duration>,
    pub newest_entry_age: Option<Duration>,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for new keys.
    pub evictions: u64,
    /// Entries removed because of hash mismatch, expiry or explicit invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

enum Lookup {
    Hit(Arc<Embedding>),
    Invalid,
    Missing,
}

/// Cache for embedding vectors to avoid redundant provider calls.
pub struct EmbeddingCache {
    entries: DashMap<IssueId, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
    ttl_delta: chrono::Duration,
    clock: Arc<dyn Clock>,
    next_seq: AtomicU64,
    admission: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl EmbeddingCache {
    /// Create a cache reading time from the system clock.
    pub fn new(config: &CacheConfig) -> SiftResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> SiftResult<Self> {
        config.validate()?;
        let ttl = config.ttl();
        Ok(Self {
            entries: DashMap::new(),
            max_entries: config.max_entries,
            ttl,
            ttl_delta: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(365 * 100)),
            clock,
            next_seq: AtomicU64::new(0),
            admission: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        })
    }

    /// Insert or overwrite the embedding for `issue_id`.
    ///
    /// Inserting a new key into a full cache first evicts the oldest tenth of
    /// the entries. Overwriting an existing key never evicts.
    pub fn set(&self, issue_id: IssueId, content_hash: ContentHash, embedding: Embedding) {
        let entry = CacheEntry {
            content_hash,
            embedding: Arc::new(embedding),
            cached_at: self.clock.now(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        if let Some(mut existing) = self.entries.get_mut(&issue_id) {
            *existing = entry;
            return;
        }

        let _admission = self.admission.lock().unwrap_or_else(|p| p.into_inner());
        if !self.entries.contains_key(&issue_id) {
            while self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.entries.insert(issue_id, entry);
    }

    /// Get the embedding for `issue_id` if it was computed from `content_hash`
    /// and has not expired. Invalid entries are deleted.
    pub fn get(&self, issue_id: &IssueId, content_hash: &ContentHash) -> Option<Arc<Embedding>> {
        let now = self.clock.now();

        let lookup = match self.entries.get(issue_id) {
            Some(entry) if self.is_valid(&entry, content_hash, now) => {
                Lookup::Hit(Arc::clone(&entry.embedding))
            }
            Some(_) => Lookup::Invalid,
            None => Lookup::Missing,
        };

        match lookup {
            Lookup::Hit(embedding) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(embedding)
            }
            Lookup::Invalid => {
                // Re-checked under the shard lock so a concurrent valid set survives.
                let removed = self
                    .entries
                    .remove_if(issue_id, |_, entry| !self.is_valid(entry, content_hash, now));
                if removed.is_some() {
                    self.invalidations.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(issue_id = %issue_id, "dropped stale embedding");
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Missing => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether an entry exists for `issue_id`, regardless of TTL or hash.
    pub fn has(&self, issue_id: &IssueId) -> bool {
        self.entries.contains_key(issue_id)
    }

    /// Remove the entry for `issue_id`. Returns whether one existed.
    pub fn invalidate(&self, issue_id: &IssueId) -> bool {
        let removed = self.entries.remove(issue_id).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn clean_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let keep = !self.is_expired(entry, now);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            self.invalidations
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(removed, remaining = self.entries.len(), "cleaned expired embeddings");
        }
        removed
    }

    /// Clear all cached entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get the current number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all cached entries, in no particular order.
    pub fn keys(&self) -> Vec<IssueId> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;
        for entry in self.entries.iter() {
            let at = entry.cached_at;
            oldest = Some(oldest.map_or(at, |o| o.min(at)));
            newest = Some(newest.map_or(at, |n| n.max(at)));
        }
        let age = |at: DateTime<Utc>| (now - at).to_std().unwrap_or(Duration::ZERO);

        CacheStats {
            size: self.entries.len(),
            max_size: self.max_entries,
            ttl: self.ttl,
            oldest_entry_age: oldest.map(age),
            newest_entry_age: newest.map(age),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.cached_at >= self.ttl_delta
    }

    fn is_valid(&self, entry: &CacheEntry, content_hash: &ContentHash, now: DateTime<Utc>) -> bool {
        entry.content_hash == *content_hash && !self.is_expired(entry, now)
    }

    /// Evict the oldest tenth (at least one) of the entries by `(cached_at, seq)`.
    ///
    /// An entry overwritten since the snapshot keeps its place.
    fn evict_oldest(&self) -> usize {
        let mut snapshot: Vec<(IssueId, DateTime<Utc>, u64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.cached_at, entry.seq))
            .collect();
        snapshot.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

        let target = ((snapshot.len() as f64 * EVICTION_FRACTION).ceil() as usize).max(1);
        let mut evicted = 0usize;
        for (issue_id, _, seq) in snapshot.into_iter().take(target) {
            if self
                .entries
                .remove_if(&issue_id, |_, entry| entry.seq == seq)
                .is_some()
            {
                evicted += 1;
            }
        }

        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        tracing::debug!(evicted, capacity = self.max_entries, "evicted oldest embeddings");
        evicted
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("max_entries", &self.max_entries)
            .field("ttl", &self.ttl)
            .field("current_size", &self.len())
            .finish()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::{compute_content_hash, ManualClock};

    fn embedding(seed: f32) -> Embedding {
        Embedding::new(vec![seed, 1.0, 0.0], "test")
    }

    fn hash(text: &str) -> ContentHash {
        compute_content_hash(Some(text), None)
    }

    fn cache_with(config: CacheConfig) -> (EmbeddingCache, ManualClock) {
        let clock = ManualClock::fixed();
        let cache = EmbeddingCache::with_clock(&config, Arc::new(clock.clone())).unwrap();
        (cache, clock)
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(EmbeddingCache::new(&CacheConfig::new().with_max_entries(0)).is_err());
    }

    #[test]
    fn test_set_then_get() {
        let (cache, _) = cache_with(CacheConfig::default());
        assert!(cache.is_empty());

        cache.set(IssueId::new("1"), hash("a"), embedding(0.5));
        assert_eq!(cache.len(), 1);

        let found = cache.get(&IssueId::new("1"), &hash("a")).unwrap();
        assert_eq!(found.data, vec![0.5, 1.0, 0.0]);
        assert!(cache.get(&IssueId::new("2"), &hash("a")).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let (cache, clock) =
            cache_with(CacheConfig::new().with_ttl_secs(60 * 60));
        let id = IssueId::new("1");
        cache.set(id.clone(), hash("a"), embedding(1.0));

        clock.advance(chrono::Duration::minutes(30));
        assert!(cache.get(&id, &hash("a")).is_some());

        clock.advance(chrono::Duration::minutes(31));
        assert!(cache.get(&id, &hash("a")).is_none());
        assert!(!cache.has(&id));
    }

    #[test]
    fn test_hash_mismatch_deletes_entry() {
        let (cache, _) = cache_with(CacheConfig::default());
        let id = IssueId::new("1");
        cache.set(id.clone(), hash("original"), embedding(1.0));

        assert!(cache.get(&id, &hash("edited")).is_none());
        assert!(!cache.has(&id));
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_overwrite_replaces_entry_and_refreshes_timestamp() {
        let (cache, clock) =
            cache_with(CacheConfig::new().with_ttl_secs(60 * 60));
        let id = IssueId::new("1");
        cache.set(id.clone(), hash("v1"), embedding(1.0));
        clock.advance(chrono::Duration::minutes(50));
        cache.set(id.clone(), hash("v2"), embedding(2.0));
        clock.advance(chrono::Duration::minutes(50));

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&id, &hash("v2")).is_some());
    }

    #[test]
    fn test_eviction_keeps_capacity_and_newest_key() {
        let (cache, clock) = cache_with(CacheConfig::new().with_max_entries(5));
        for i in 0..6 {
            cache.set(IssueId::new(i.to_string()), hash(&i.to_string()), embedding(i as f32));
            clock.advance(chrono::Duration::seconds(1));
        }

        assert!(cache.len() <= 5);
        assert!(cache.has(&IssueId::new("5")));
        assert!(!cache.has(&IssueId::new("0")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_ties_follow_insertion_order() {
        // Same timestamp for every entry: insertion order decides.
        let (cache, _) = cache_with(CacheConfig::new().with_max_entries(3));
        for i in 0..4 {
            cache.set(IssueId::new(i.to_string()), hash("x"), embedding(0.0));
        }
        assert!(!cache.has(&IssueId::new("0")));
        assert!(cache.has(&IssueId::new("1")));
        assert!(cache.has(&IssueId::new("3")));
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, _) = cache_with(CacheConfig::new().with_max_entries(2));
        cache.set(IssueId::new("a"), hash("a"), embedding(0.0));
        cache.set(IssueId::new("b"), hash("b"), embedding(0.0));
        cache.set(IssueId::new("a"), hash("a2"), embedding(1.0));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_clean_expired_counts_removed() {
        let (cache, clock) =
            cache_with(CacheConfig::new().with_ttl_secs(60));
        cache.set(IssueId::new("old"), hash("o"), embedding(0.0));
        clock.advance(chrono::Duration::seconds(45));
        cache.set(IssueId::new("new"), hash("n"), embedding(0.0));
        clock.advance(chrono::Duration::seconds(30));

        assert_eq!(cache.clean_expired(), 1);
        assert_eq!(cache.keys(), vec![IssueId::new("new")]);
        assert_eq!(cache.clean_expired(), 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (cache, _) = cache_with(CacheConfig::default());
        cache.set(IssueId::new("1"), hash("a"), embedding(0.0));
        cache.set(IssueId::new("2"), hash("b"), embedding(0.0));

        assert!(cache.invalidate(&IssueId::new("1")));
        assert!(!cache.invalidate(&IssueId::new("1")));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_reports_ages_and_hit_rate() {
        let (cache, clock) = cache_with(CacheConfig::default());
        let empty = cache.stats();
        assert_eq!(empty.oldest_entry_age, None);
        assert_eq!(empty.hit_rate(), 0.0);

        cache.set(IssueId::new("1"), hash("a"), embedding(0.0));
        clock.advance(chrono::Duration::seconds(10));
        cache.set(IssueId::new("2"), hash("b"), embedding(0.0));
        clock.advance(chrono::Duration::seconds(5));

        let _ = cache.get(&IssueId::new("1"), &hash("a"));
        let _ = cache.get(&IssueId::new("3"), &hash("c"));

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.max_size, 10_000);
        assert_eq!(stats.ttl, Duration::from_secs(86_400));
        assert_eq!(stats.oldest_entry_age, Some(Duration::from_secs(15)));
        assert_eq!(stats.newest_entry_age, Some(Duration::from_secs(5)));
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let cache = Arc::new(EmbeddingCache::new(&CacheConfig::new().with_max_entries(50)).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("{t}-{i}");
                        cache.set(IssueId::new(key.clone()), hash(&key), embedding(i as f32));
                        let _ = cache.get(&IssueId::new(key.clone()), &hash(&key));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 50);
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use sift_core::{compute_content_hash, ManualClock};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any capacity and insert sequence, the cache never exceeds its
        /// capacity and always retains the key inserted last.
        #[test]
        fn prop_capacity_never_exceeded(
            capacity in 1usize..40,
            keys in prop::collection::vec(0u32..200, 1..120)
        ) {
            let clock = ManualClock::fixed();
            let cache = EmbeddingCache::with_clock(
                &CacheConfig::new().with_max_entries(capacity),
                Arc::new(clock.clone()),
            ).unwrap();

            for key in &keys {
                let text = key.to_string();
                cache.set(
                    IssueId::new(text.clone()),
                    compute_content_hash(Some(&text), None),
                    Embedding::new(vec![*key as f32], "p"),
                );
                clock.advance(chrono::Duration::milliseconds(1));
                prop_assert!(cache.len() <= capacity);
            }

            let last = keys.last().unwrap().to_string();
            prop_assert!(cache.has(&IssueId::new(last)));
        }

        /// A get with any hash other than the stored one misses and removes the entry.
        #[test]
        fn prop_hash_mismatch_always_invalidates(stored in "[a-z]{1,20}", supplied in "[a-z]{1,20}") {
            prop_assume!(stored != supplied);
            let cache = EmbeddingCache::new(&CacheConfig::default()).unwrap();
            let id = IssueId::new("x");
            cache.set(id.clone(), compute_content_hash(Some(&stored), None), Embedding::new(vec![1.0], "p"));

            prop_assert!(cache.get(&id, &compute_content_hash(Some(&supplied), None)).is_none());
            prop_assert!(!cache.has(&id));
        }
    }
}
