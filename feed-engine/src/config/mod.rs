use serde::{Deserialize, Serialize};

/// Engine configuration, grouped per subsystem.
///
/// Every field has a default; `from_env` overrides from `FEED_*` environment
/// variables so deployments can tune weights without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub trending: TrendingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ranking: RankingConfig::default(),
            cache: CacheConfig::default(),
            session: SessionConfig::default(),
            trending: TrendingConfig::default(),
        }
    }
}

/// Ranking weights and thresholds.
///
/// The multiplicative score model reads every knob from here; exact numeric
/// tuning is deployment configuration, not code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Engagement counter weights
    pub like_weight: f64,
    pub repost_weight: f64,
    pub share_weight: f64,
    pub comment_weight: f64,
    pub save_weight: f64,
    pub view_weight: f64,

    /// Recency half-life in hours
    pub half_life_hours: f64,
    /// Hard cutoff: posts older than this score zero
    pub max_age_hours: f64,
    /// Lower bound of the recency factor inside the max-age window
    pub recency_floor: f64,

    /// Scores closer than this preserve retrieval order
    pub epsilon: f64,

    /// Diversity penalties for repeated author / topic within one pass
    pub repeat_author_penalty: f64,
    pub repeat_topic_penalty: f64,

    /// Upper bound of the personalization factor
    pub personalization_cap: f64,

    /// Minimum views before the engagement rate is considered meaningful
    pub min_quality_views: u64,
    /// Engagement rate above which the quality factor boosts
    pub high_engagement_rate: f64,
    /// Engagement rate below which the quality factor penalizes
    pub low_engagement_rate: f64,

    /// How many candidates a ranked feed pulls per computation
    pub candidate_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            like_weight: 1.0,
            repost_weight: 2.0,
            share_weight: 2.0,
            comment_weight: 2.0,
            save_weight: 1.5,
            view_weight: 0.1,
            half_life_hours: 24.0,
            max_age_hours: 168.0,
            recency_floor: 0.05,
            epsilon: 0.001,
            repeat_author_penalty: 0.95,
            repeat_topic_penalty: 0.92,
            personalization_cap: 2.0,
            min_quality_views: 100,
            high_engagement_rate: 0.1,
            low_engagement_rate: 0.01,
            candidate_limit: 200,
        }
    }
}

/// Two-tier cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Tier-1 (in-process) TTL in seconds
    pub local_ttl_secs: u64,
    /// Tier-1 entry cap; ~10% of the oldest entries are evicted when full
    pub local_max_entries: usize,
    /// Tier-2 (shared) TTL in seconds
    pub shared_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl_secs: 60,
            local_max_entries: 10_000,
            shared_ttl_secs: 900, // 15 minutes
        }
    }
}

/// Feed session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session TTL in seconds (sessions expire, they are never deleted)
    pub ttl_secs: u64,
    /// Redis key prefix
    pub key_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400, // 24 hours
            key_prefix: "feed_session".to_string(),
        }
    }
}

/// Trending aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingConfig {
    /// Aggregation interval in seconds; also the serving-key TTL
    pub interval_secs: u64,
    /// Maximum posts scanned per window per cycle
    pub scan_limit: usize,
    /// Entries kept per window
    pub top_n: usize,
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            scan_limit: 5000,
            top_n: 50,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Config::default();
        Ok(Config {
            ranking: RankingConfig {
                half_life_hours: env_or("FEED_HALF_LIFE_HOURS", defaults.ranking.half_life_hours),
                max_age_hours: env_or("FEED_MAX_AGE_HOURS", defaults.ranking.max_age_hours),
                epsilon: env_or("FEED_SCORE_EPSILON", defaults.ranking.epsilon),
                candidate_limit: env_or("FEED_CANDIDATE_LIMIT", defaults.ranking.candidate_limit),
                ..defaults.ranking
            },
            cache: CacheConfig {
                local_ttl_secs: env_or("FEED_LOCAL_CACHE_TTL_SECS", defaults.cache.local_ttl_secs),
                local_max_entries: env_or(
                    "FEED_LOCAL_CACHE_MAX_ENTRIES",
                    defaults.cache.local_max_entries,
                ),
                shared_ttl_secs: env_or(
                    "FEED_SHARED_CACHE_TTL_SECS",
                    defaults.cache.shared_ttl_secs,
                ),
            },
            session: SessionConfig {
                ttl_secs: env_or("FEED_SESSION_TTL_SECS", defaults.session.ttl_secs),
                key_prefix: std::env::var("FEED_SESSION_KEY_PREFIX")
                    .unwrap_or(defaults.session.key_prefix),
            },
            trending: TrendingConfig {
                interval_secs: env_or("FEED_TRENDING_INTERVAL_SECS", defaults.trending.interval_secs),
                scan_limit: env_or("FEED_TRENDING_SCAN_LIMIT", defaults.trending.scan_limit),
                top_n: env_or("FEED_TRENDING_TOP_N", defaults.trending.top_n),
            },
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
