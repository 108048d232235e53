//! Trending refresh background job
//!
//! Drives [`TrendingAggregator::calculate`] on a fixed interval. Every
//! instance may run its own timer: the aggregator's wholesale-replace
//! semantics make overlapping runs idempotent (last writer wins), so no
//! cross-instance coordination is needed.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::services::trending::TrendingAggregator;

/// Configuration for the trending refresh job
#[derive(Clone)]
pub struct TrendingRefreshConfig {
    pub enabled: bool,
    /// How often to recompute; should match the serving-key TTL
    pub interval: Duration,
    /// Delay before the first cycle, to let services come up
    pub startup_delay: Duration,
}

impl Default for TrendingRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(3600),
            startup_delay: Duration::from_secs(10),
        }
    }
}

/// Run the trending refresh loop until the task is dropped
pub async fn start_trending_refresh(
    aggregator: Arc<TrendingAggregator>,
    config: TrendingRefreshConfig,
) {
    if !config.enabled {
        tracing::info!("Trending refresh disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Starting trending refresh background job"
    );

    sleep(config.startup_delay).await;

    loop {
        let cycle_start = Instant::now();

        match aggregator.calculate().await {
            Ok(()) => {
                tracing::info!(
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Trending refresh cycle completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Trending refresh cycle failed"
                );
            }
        }

        sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TrendingRefreshConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_secs(3600));
    }
}
