//! Tier-1 process-local feed cache
//!
//! DashMap-backed, TTL-stamped entries, bounded size with oldest-first
//! eviction of ~10% when full. Entries are immutable once written
//! (replace-not-mutate), so concurrent readers never see partial state.
//!
//! Cross-instance coherence: every invalidation (local or received over
//! pub/sub) bumps a monotonically increasing generation counter and records
//! it against the affected key or viewer prefix. A read is only a hit when
//! the entry's generation is newer than the latest invalidation mark for its
//! key, which lets an instance drop stale entries without a network round
//! trip even inside the TTL.

use dashmap::DashMap;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::ScoredPost;

lazy_static! {
    static ref CACHE_HIT: IntCounter = register_int_counter!(
        "feed_cache_l1_hit_total",
        "Total number of tier-1 feed cache hits"
    )
    .expect("Failed to register feed_cache_l1_hit_total");
    static ref CACHE_MISS: IntCounter = register_int_counter!(
        "feed_cache_l1_miss_total",
        "Total number of tier-1 feed cache misses"
    )
    .expect("Failed to register feed_cache_l1_miss_total");
    static ref CACHE_EVICTION: IntCounter = register_int_counter!(
        "feed_cache_l1_eviction_total",
        "Total number of tier-1 feed cache evictions (TTL or capacity)"
    )
    .expect("Failed to register feed_cache_l1_eviction_total");
    static ref CACHE_INVALIDATION: IntCounter = register_int_counter!(
        "feed_cache_l1_invalidation_total",
        "Total number of tier-1 feed cache invalidations"
    )
    .expect("Failed to register feed_cache_l1_invalidation_total");
}

#[derive(Debug, Clone)]
struct LocalEntry {
    posts: Vec<ScoredPost>,
    inserted_at: Instant,
    expires_at: Instant,
    generation: u64,
}

impl LocalEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local cache tier keyed by the shared `feed:{viewer}:{feed}` layout
pub struct MemoryTier {
    store: DashMap<String, LocalEntry>,
    /// Latest invalidation generation per exact key or viewer prefix
    invalidated: DashMap<String, u64>,
    generation: AtomicU64,
    ttl: Duration,
    max_entries: usize,
}

impl MemoryTier {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            store: DashMap::new(),
            invalidated: DashMap::new(),
            generation: AtomicU64::new(1),
            ttl,
            max_entries,
        }
    }

    /// Look up a key. `viewer_prefix` is the viewer-wide invalidation scope
    /// the entry also answers to (`feed:{viewer}:`).
    pub fn get(&self, key: &str, viewer_prefix: &str) -> Option<Vec<ScoredPost>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() && !self.superseded(&entry, key, viewer_prefix) {
                CACHE_HIT.inc();
                debug!(key = %key, "tier-1 hit");
                return Some(entry.posts.clone());
            }
            drop(entry);
            self.evict(key);
        }
        CACHE_MISS.inc();
        debug!(key = %key, "tier-1 miss");
        None
    }

    pub fn insert(&self, key: String, posts: Vec<ScoredPost>) {
        self.enforce_capacity();

        let now = Instant::now();
        let entry = LocalEntry {
            posts,
            inserted_at: now,
            expires_at: now + self.ttl,
            generation: self.generation.load(Ordering::SeqCst),
        };
        self.store.insert(key, entry);
    }

    /// Drop entries for one key or a whole viewer prefix and record the new
    /// invalidation generation so in-flight or remote-written entries created
    /// before this point read as stale.
    pub fn invalidate(&self, key: Option<&str>, viewer_prefix: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        match key {
            Some(key) => {
                self.invalidated.insert(key.to_string(), generation);
                self.store.remove(key);
            }
            None => {
                self.invalidated
                    .insert(viewer_prefix.to_string(), generation);
                let stale: Vec<String> = self
                    .store
                    .iter()
                    .filter(|entry| entry.key().starts_with(viewer_prefix))
                    .map(|entry| entry.key().clone())
                    .collect();
                for key in stale {
                    self.store.remove(&key);
                }
            }
        }

        CACHE_INVALIDATION.inc();
        debug!(key = ?key, prefix = %viewer_prefix, generation, "tier-1 invalidate");
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn superseded(&self, entry: &LocalEntry, key: &str, viewer_prefix: &str) -> bool {
        // Strict: a write racing the invalidation keeps its pre-bump
        // generation and reads as stale; writes after the bump are current
        let mark = |k: &str| self.invalidated.get(k).map(|g| *g).unwrap_or(0);
        entry.generation < mark(key).max(mark(viewer_prefix))
    }

    /// Evict the oldest ~10% when at capacity
    fn enforce_capacity(&self) {
        if self.store.len() < self.max_entries {
            return;
        }

        let mut by_age: Vec<(String, Instant)> = self
            .store
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().inserted_at))
            .collect();
        by_age.sort_by_key(|(_, inserted_at)| *inserted_at);

        let evict_count = (self.max_entries / 10).max(1);
        for (key, _) in by_age.into_iter().take(evict_count) {
            self.evict(&key);
        }

        debug!(evicted = evict_count, "tier-1 capacity eviction");
    }

    fn evict(&self, key: &str) {
        if self.store.remove(key).is_some() {
            CACHE_EVICTION.inc();
        }
    }
}
