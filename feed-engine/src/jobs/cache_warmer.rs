//! Cache warmer background job
//!
//! Proactively precomputes and caches feeds for viewers likely to request
//! them soon, so their next request is a tier-1 hit instead of a full
//! ranking pass. Which viewers are "hot" is the host's call — it supplies a
//! [`WarmListSource`] (typically recent-activity data the engine has no view
//! of).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use uuid::Uuid;

use crate::engine::FeedEngine;
use crate::error::Result;
use crate::models::FeedType;

/// Supplies the viewers worth warming each cycle
#[async_trait]
pub trait WarmListSource: Send + Sync {
    /// Up to `limit` viewer ids, most valuable first
    async fn warm_candidates(&self, limit: usize) -> Result<Vec<Uuid>>;
}

/// Configuration for cache warming
#[derive(Clone)]
pub struct CacheWarmerConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Cap per cycle, to avoid overwhelming the cache backend
    pub max_viewers_per_cycle: usize,
    /// Delay before the first cycle, to let services come up
    pub startup_delay: Duration,
}

impl Default for CacheWarmerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(5 * 60),
            max_viewers_per_cycle: 500,
            startup_delay: Duration::from_secs(30),
        }
    }
}

/// Run the cache warm loop until the task is dropped
pub async fn start_cache_warmer(
    engine: Arc<FeedEngine>,
    source: Arc<dyn WarmListSource>,
    config: CacheWarmerConfig,
) {
    if !config.enabled {
        tracing::info!("Cache warmer disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        max_viewers = config.max_viewers_per_cycle,
        "Starting cache warmer background job"
    );

    sleep(config.startup_delay).await;

    loop {
        let cycle_start = Instant::now();

        match run_warm_cycle(engine.as_ref(), source.as_ref(), &config).await {
            Ok(warmed_count) => {
                tracing::info!(
                    viewers_warmed = warmed_count,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Cache warm cycle completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Cache warm cycle failed"
                );
            }
        }

        sleep(config.interval).await;
    }
}

/// Run a single warming cycle
async fn run_warm_cycle(
    engine: &FeedEngine,
    source: &dyn WarmListSource,
    config: &CacheWarmerConfig,
) -> Result<usize> {
    let candidates = source.warm_candidates(config.max_viewers_per_cycle).await?;

    if candidates.is_empty() {
        tracing::debug!("No warm candidates found");
        return Ok(0);
    }

    tracing::debug!(candidates = candidates.len(), "Found cache warm candidates");

    let mut warmed_count = 0;

    for viewer_id in candidates.into_iter().take(config.max_viewers_per_cycle) {
        if let Err(e) = engine.precompute_feed(viewer_id, FeedType::ForYou).await {
            tracing::debug!(
                viewer_id = %viewer_id,
                error = %e,
                "Failed to warm feed for viewer"
            );
            continue;
        }

        warmed_count += 1;

        // Small delay so a full cycle cannot saturate the backends
        sleep(Duration::from_millis(10)).await;
    }

    Ok(warmed_count)
}
