//! Trending topic aggregation
//!
//! A periodic batch job counts hashtag occurrences over sliding windows and
//! derives a momentum-weighted score per topic. Each cycle wholesale-replaces
//! the stored entries for a window (never merges), so stale ranks cannot
//! linger and concurrent runs are idempotent — the last writer wins.
//!
//! Reads are served from the shared cache tier with a TTL matching the
//! aggregation interval; a miss falls back to the durable last-persisted
//! result. A read never triggers a synchronous recomputation.

use chrono::{Duration, Utc};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::TrendingConfig;
use crate::error::Result;
use crate::models::{TrendingEntry, TrendingWindow};
use crate::store::CandidateStore;

pub struct TrendingAggregator {
    store: Arc<dyn CandidateStore>,
    redis: Option<ConnectionManager>,
    cfg: TrendingConfig,
    degraded: AtomicBool,
}

impl TrendingAggregator {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        redis: Option<ConnectionManager>,
        cfg: TrendingConfig,
    ) -> Self {
        Self {
            store,
            redis,
            cfg,
            degraded: AtomicBool::new(false),
        }
    }

    /// Recompute every window. Store failures abort the cycle (the previous
    /// persisted results keep serving); cache write failures only degrade.
    pub async fn calculate(&self) -> Result<()> {
        for window in TrendingWindow::ALL {
            let entries = self.calculate_window(window).await?;
            info!(
                window = %window,
                topics = entries.len(),
                top = entries.first().map(|e| e.topic.as_str()),
                "Trending window recomputed"
            );
        }
        Ok(())
    }

    /// Aggregate one window and replace its stored entries
    pub async fn calculate_window(&self, window: TrendingWindow) -> Result<Vec<TrendingEntry>> {
        let now = Utc::now();
        let long_start = now - Duration::hours(window.hours());
        let short_start = now - Duration::hours(window.short_hours());

        let posts = self.store.posts_since(long_start, self.cfg.scan_limit).await?;

        let mut long_counts: HashMap<String, u64> = HashMap::new();
        let mut short_counts: HashMap<String, u64> = HashMap::new();
        for doc in &posts {
            let Some(created_at) = doc.created_at else {
                // Trending tolerates dirty documents; ranking does not
                continue;
            };
            for tag in &doc.hashtags {
                *long_counts.entry(tag.clone()).or_default() += 1;
                if created_at >= short_start {
                    *short_counts.entry(tag.clone()).or_default() += 1;
                }
            }
        }

        let ratio = window.hours() as f64 / window.short_hours() as f64;
        let entries = rank_topics(long_counts, &short_counts, ratio, window, self.cfg.top_n);

        self.replace_window(window, &entries).await;
        Ok(entries)
    }

    /// Cached trending read. Serving-key miss falls back to the durable
    /// last-persisted aggregation; backend trouble yields an empty list.
    pub async fn get_trending(&self, window: TrendingWindow, limit: usize) -> Vec<TrendingEntry> {
        let mut entries = self.read_key(&serving_key(window)).await;
        if entries.is_none() {
            debug!(window = %window, "Trending cache miss, falling back to last persisted");
            entries = self.read_key(&durable_key(window)).await;
        }

        let mut entries = entries.unwrap_or_default();
        entries.truncate(limit);
        entries
    }

    /// Wholesale replace: both keys are rewritten with the complete entry
    /// list, the serving key with the interval TTL, the fallback key without
    async fn replace_window(&self, window: TrendingWindow, entries: &[TrendingEntry]) {
        let Some(manager) = self.redis.as_ref() else {
            return;
        };
        let json = match serde_json::to_string(entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(window = %window, error = %e, "Trending serialization failed");
                return;
            }
        };

        let mut conn = manager.clone();
        let serving: redis::RedisResult<()> = redis::cmd("SETEX")
            .arg(serving_key(window))
            .arg(self.cfg.interval_secs)
            .arg(&json)
            .query_async(&mut conn)
            .await;
        let durable: redis::RedisResult<()> = redis::cmd("SET")
            .arg(durable_key(window))
            .arg(&json)
            .query_async(&mut conn)
            .await;

        match serving.and(durable) {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!("Trending cache backend recovered");
                }
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    warn!(error = %e, "Trending cache backend unavailable, results not persisted");
                }
            }
        }
    }

    async fn read_key(&self, key: &str) -> Option<Vec<TrendingEntry>> {
        let manager = self.redis.as_ref()?;
        let mut conn = manager.clone();

        match redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
        {
            Ok(value) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!("Trending cache backend recovered");
                }
                let json = value?;
                match serde_json::from_str(&json) {
                    Ok(entries) => Some(entries),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Discarding undecodable trending entries");
                        None
                    }
                }
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    warn!(error = %e, "Trending cache backend unavailable, serving empty trending");
                }
                None
            }
        }
    }
}

fn serving_key(window: TrendingWindow) -> String {
    format!("pulse:trending:{}", window.as_str())
}

fn durable_key(window: TrendingWindow) -> String {
    format!("pulse:trending:{}:last", window.as_str())
}

/// Score and rank topic counts.
///
/// momentum = (short × ratio) / long, clamped to [0, 1]: a topic whose
/// short-window share matches its long-window run-rate scores 1.0, a cooling
/// topic approaches 0. score = long × (1 + momentum × 0.5). Ranks are dense
/// (equal scores share a rank) and the sort is made deterministic by topic
/// name, so identical input always produces identical output.
fn rank_topics(
    long_counts: HashMap<String, u64>,
    short_counts: &HashMap<String, u64>,
    ratio: f64,
    window: TrendingWindow,
    top_n: usize,
) -> Vec<TrendingEntry> {
    let mut entries: Vec<TrendingEntry> = long_counts
        .into_iter()
        .map(|(topic, volume)| {
            let short = short_counts.get(&topic).copied().unwrap_or(0);
            let momentum = if volume == 0 {
                0.0
            } else {
                ((short as f64 * ratio) / volume as f64).clamp(0.0, 1.0)
            };
            let score = volume as f64 * (1.0 + momentum * 0.5);
            TrendingEntry {
                topic,
                window: window.as_str().to_string(),
                volume,
                momentum,
                score,
                rank: 0,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.topic.cmp(&b.topic))
    });
    entries.truncate(top_n);

    let mut rank = 0u32;
    let mut prev_score = f64::INFINITY;
    for entry in entries.iter_mut() {
        if entry.score < prev_score {
            rank += 1;
            prev_score = entry.score;
        }
        entry.rank = rank;
    }

    entries
}
