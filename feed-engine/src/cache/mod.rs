//! Two-tier feed cache
//!
//! Lookup order: tier-1 (process-local, short TTL) → tier-2 (shared Redis,
//! longer TTL) → compute, then populate both tiers. Anonymous viewers bypass
//! caching entirely.
//!
//! Invalidation clears tier-1 immediately, deletes the tier-2 key(s), and
//! broadcasts a fire-and-forget event so other instances drop their tier-1
//! entries without waiting for TTL. Until that event lands, another instance
//! may serve the old entry for at most the tier-1 TTL; that staleness window
//! is an accepted trade-off, not a bug.
//!
//! The shared tier is strictly optional: every Redis call is wrapped so an
//! unavailable backend degrades to tier-1-plus-compute and is logged once per
//! outage, never surfaced to callers.

mod local;

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cache_invalidation::{feed_cache_key, viewer_pattern, InvalidationEvent, InvalidationPublisher};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::models::{FeedType, ScoredPost};

use local::MemoryTier;

/// Tier-2 cache value
#[derive(Debug, Serialize, Deserialize)]
struct SharedEntry {
    posts: Vec<ScoredPost>,
    cached_at: i64,
}

pub struct FeedCache {
    local: MemoryTier,
    redis: Option<ConnectionManager>,
    publisher: Option<InvalidationPublisher>,
    instance_id: String,
    shared_ttl_secs: u64,
    degraded: AtomicBool,
}

impl FeedCache {
    pub fn new(
        cfg: &CacheConfig,
        redis: Option<ConnectionManager>,
        publisher: Option<InvalidationPublisher>,
    ) -> Self {
        let instance_id = publisher
            .as_ref()
            .map(|p| p.instance_id().to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            local: MemoryTier::new(
                Duration::from_secs(cfg.local_ttl_secs),
                cfg.local_max_entries,
            ),
            redis,
            publisher,
            instance_id,
            shared_ttl_secs: cfg.shared_ttl_secs,
            degraded: AtomicBool::new(false),
        }
    }

    /// Identity stamped on published invalidation events; remote events from
    /// this id are ignored by [`FeedCache::apply_remote`]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Serve a feed from cache, computing and populating both tiers on miss.
    ///
    /// Anonymous viewers always compute live. There is no compute lock:
    /// concurrent misses for one key may both compute and both write, which
    /// is bounded redundancy, not corruption (entries replace wholesale).
    pub async fn get_or_compute<F, Fut>(
        &self,
        viewer_id: Option<Uuid>,
        feed: FeedType,
        compute: F,
    ) -> Result<Vec<ScoredPost>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ScoredPost>>>,
    {
        let Some(viewer) = viewer_id else {
            return compute().await;
        };

        let key = feed_cache_key(&viewer, feed.as_str());
        let prefix = format!("feed:{}:", viewer);

        if let Some(posts) = self.local.get(&key, &prefix) {
            return Ok(posts);
        }

        if let Some(posts) = self.shared_get(&key).await {
            debug!(key = %key, "tier-2 hit");
            self.local.insert(key, posts.clone());
            return Ok(posts);
        }

        let posts = compute().await?;
        self.shared_set(&key, &posts).await;
        self.local.insert(key, posts.clone());
        Ok(posts)
    }

    /// Invalidate a viewer's cached feed(s).
    ///
    /// Clears tier-1, deletes the tier-2 key (direct delete when the feed
    /// type is known, SCAN + DEL over the viewer's pattern otherwise), then
    /// broadcasts. None of it can fail the caller.
    pub async fn invalidate_user(&self, viewer_id: Uuid, feed: Option<FeedType>) {
        let prefix = format!("feed:{}:", viewer_id);

        match feed {
            Some(feed) => {
                let key = feed_cache_key(&viewer_id, feed.as_str());
                self.local.invalidate(Some(&key), &prefix);
                self.shared_delete(&key).await;
            }
            None => {
                self.local.invalidate(None, &prefix);
                self.shared_delete_pattern(&viewer_pattern(&viewer_id)).await;
            }
        }

        if let Some(publisher) = &self.publisher {
            let origin = publisher.instance_id().to_string();
            let event = match feed {
                Some(feed) => InvalidationEvent::feed(viewer_id, feed.as_str(), origin),
                None => InvalidationEvent::viewer(viewer_id, origin),
            };
            // Fire-and-forget: a failed publish leaves other instances on TTL
            if let Err(e) = publisher.publish(event).await {
                warn!(
                    viewer_id = %viewer_id,
                    error = %e,
                    "Invalidation publish failed, remote instances degrade to TTL expiry"
                );
            }
        }
    }

    /// Apply an invalidation event received from another instance
    pub fn apply_remote(&self, event: &InvalidationEvent) {
        if event.origin == self.instance_id {
            return;
        }

        let prefix = format!("feed:{}:", event.viewer_id);
        match event.feed.as_deref() {
            Some(feed) => {
                let key = feed_cache_key(&event.viewer_id, feed);
                self.local.invalidate(Some(&key), &prefix);
            }
            None => self.local.invalidate(None, &prefix),
        }

        debug!(
            viewer_id = %event.viewer_id,
            feed = ?event.feed,
            origin = %event.origin,
            "Applied remote invalidation"
        );
    }

    /// Populate both tiers outside the request path (background refresh)
    pub async fn warm(&self, viewer_id: Uuid, feed: FeedType, posts: Vec<ScoredPost>) {
        let key = feed_cache_key(&viewer_id, feed.as_str());
        self.shared_set(&key, &posts).await;
        self.local.insert(key, posts);
    }

    async fn shared_get(&self, key: &str) -> Option<Vec<ScoredPost>> {
        let manager = self.redis.as_ref()?;
        let mut conn = manager.clone();

        match redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
        {
            Ok(value) => {
                self.backend_recovered();
                let json = value?;
                match serde_json::from_str::<SharedEntry>(&json) {
                    Ok(entry) => Some(entry.posts),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Discarding undecodable tier-2 entry");
                        None
                    }
                }
            }
            Err(e) => {
                self.backend_degraded(&e);
                None
            }
        }
    }

    async fn shared_set(&self, key: &str, posts: &[ScoredPost]) {
        let Some(manager) = self.redis.as_ref() else {
            return;
        };

        let entry = SharedEntry {
            posts: posts.to_vec(),
            cached_at: chrono::Utc::now().timestamp(),
        };
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Tier-2 serialization failed");
                return;
            }
        };

        let mut conn = manager.clone();
        match redis::cmd("SETEX")
            .arg(key)
            .arg(self.shared_ttl_secs)
            .arg(json)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            Ok(()) => self.backend_recovered(),
            Err(e) => self.backend_degraded(&e),
        }
    }

    async fn shared_delete(&self, key: &str) {
        let Some(manager) = self.redis.as_ref() else {
            return;
        };
        let mut conn = manager.clone();
        match redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            Ok(()) => self.backend_recovered(),
            Err(e) => self.backend_degraded(&e),
        }
    }

    /// SCAN + DEL over a key pattern; SCAN is non-blocking unlike KEYS
    async fn shared_delete_pattern(&self, pattern: &str) {
        let Some(manager) = self.redis.as_ref() else {
            return;
        };
        let mut conn = manager.clone();
        let mut cursor: u64 = 0;
        let mut total_deleted = 0usize;

        loop {
            let scanned: std::result::Result<(u64, Vec<String>), redis::RedisError> =
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await;

            let (next_cursor, keys) = match scanned {
                Ok(res) => res,
                Err(e) => {
                    self.backend_degraded(&e);
                    return;
                }
            };

            if !keys.is_empty() {
                if let Err(e) = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async::<_, ()>(&mut conn)
                    .await
                {
                    self.backend_degraded(&e);
                    return;
                }
                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        self.backend_recovered();
        if total_deleted > 0 {
            debug!(pattern = %pattern, deleted = total_deleted, "tier-2 pattern delete");
        }
    }

    fn backend_degraded(&self, e: &redis::RedisError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(
                error = %e,
                "Feed cache backend unavailable, serving without the shared tier"
            );
        }
    }

    fn backend_recovered(&self) {
        if self.degraded.swap(false, Ordering::SeqCst) {
            info!("Feed cache backend recovered");
        }
    }
}
