//! Relevance score model
//!
//! The score of a candidate is a product of independent multiplicative
//! factors; any factor at zero fully suppresses the post, which is how hard
//! negative signals (blocked authors, expired posts) work. All weights and
//! thresholds come from [`RankingConfig`].
//!
//! Factors, in evaluation order:
//! - engagement: log-compressed weighted counter sum
//! - recency: exponential half-life decay with a hard max-age cutoff
//! - author relationship: follow boost or profile-derived weight
//! - personalization: topic / post-type / language affinity, capped
//! - quality: engagement rate against view volume
//! - trending: engagement velocity for young posts
//! - time of day: viewer's active-hours histogram
//! - diversity: penalty for authors/topics already ranked in this pass
//! - negative signals: hidden/muted/blocked authors, hidden topics

use chrono::{DateTime, Timelike, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::RankingConfig;
use crate::models::{CandidatePost, ViewerContext};

/// Per-pass accumulator of authors and topics already ranked.
///
/// Threaded through the pass in original candidate order, so the penalty on a
/// post only reflects items ranked before it. The scoring step reads the
/// state; [`DiversityState::observe`] advances it.
#[derive(Debug, Default)]
pub struct DiversityState {
    authors: HashSet<Uuid>,
    topics: HashSet<String>,
}

impl DiversityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a post after it has been scored
    pub fn observe(&mut self, post: &CandidatePost) {
        self.authors.insert(post.author_id);
        for tag in &post.hashtags {
            self.topics.insert(tag.clone());
        }
    }

    fn author_seen(&self, author_id: &Uuid) -> bool {
        self.authors.contains(author_id)
    }

    fn any_topic_seen(&self, hashtags: &[String]) -> bool {
        hashtags.iter().any(|tag| self.topics.contains(tag))
    }
}

/// Compute the relevance score for one candidate.
///
/// Pure: no I/O, no shared state beyond the explicit accumulator.
pub fn score_post(
    post: &CandidatePost,
    viewer: &ViewerContext,
    now: DateTime<Utc>,
    diversity: &DiversityState,
    cfg: &RankingConfig,
) -> f64 {
    let age_hours = ((now - post.created_at).num_seconds() as f64 / 3600.0).max(0.0);

    engagement_factor(post, cfg)
        * recency_factor(age_hours, cfg)
        * author_factor(post, viewer)
        * personalization_factor(post, viewer, cfg)
        * quality_factor(post, age_hours, cfg)
        * trending_factor(post, age_hours)
        * time_of_day_factor(post, viewer)
        * diversity_factor(post, diversity, cfg)
        * negative_signal_factor(post, viewer)
}

/// Weighted counter sum, log-compressed so outlier virality cannot dominate.
/// The `1 +` base keeps zero-engagement posts alive in the product.
fn engagement_factor(post: &CandidatePost, cfg: &RankingConfig) -> f64 {
    let e = &post.engagement;
    let sum = e.likes as f64 * cfg.like_weight
        + e.reposts as f64 * cfg.repost_weight
        + e.shares as f64 * cfg.share_weight
        + e.comments as f64 * cfg.comment_weight
        + e.saves as f64 * cfg.save_weight
        + e.views as f64 * cfg.view_weight;

    1.0 + (1.0 + sum / 10.0).ln()
}

/// Half-life decay, floored inside the window, hard zero past max age.
/// Posts under an hour old are not decayed at all.
fn recency_factor(age_hours: f64, cfg: &RankingConfig) -> f64 {
    if age_hours >= cfg.max_age_hours {
        return 0.0;
    }
    if age_hours < 1.0 {
        return 1.0;
    }
    0.5f64
        .powf(age_hours / cfg.half_life_hours)
        .max(cfg.recency_floor)
}

/// Follow relationship beats profile-derived affinity; strangers get a mild
/// penalty so followed/known authors can surface. Anonymous viewers are
/// neutral.
fn author_factor(post: &CandidatePost, viewer: &ViewerContext) -> f64 {
    if viewer.is_anonymous() {
        return 1.0;
    }
    if viewer.follows(&post.author_id) {
        return 1.8;
    }
    let weight = viewer
        .profile
        .as_ref()
        .map(|p| p.author_weight(&post.author_id))
        .unwrap_or(0.0);
    if weight > 0.7 {
        1.5
    } else if weight > 0.3 {
        1.2
    } else {
        0.9
    }
}

/// Topic, post-type and language affinity boosts, capped
fn personalization_factor(post: &CandidatePost, viewer: &ViewerContext, cfg: &RankingConfig) -> f64 {
    let Some(profile) = viewer.profile.as_ref() else {
        return 1.0;
    };

    let mut boost = 1.0;

    let topic_matches = post
        .hashtags
        .iter()
        .filter(|tag| profile.topic_weights.get(*tag).copied().unwrap_or(0.0) > 0.3)
        .count();
    boost += 0.25 * topic_matches as f64;

    let affinity_total: u32 = profile.post_type_affinity.values().sum();
    if affinity_total > 0 {
        let kind_count = profile
            .post_type_affinity
            .get(post.kind.as_str())
            .copied()
            .unwrap_or(0);
        if kind_count as f64 / affinity_total as f64 > 0.25 {
            boost += 0.2;
        }
    }

    if let Some(lang) = post.language.as_deref() {
        if profile.preferred_languages.contains(lang) {
            boost += 0.1;
        }
    }

    boost.min(cfg.personalization_cap)
}

/// Engagement rate, only judged once the view count is statistically
/// meaningful. High-rate young posts get a small extra kicker.
fn quality_factor(post: &CandidatePost, age_hours: f64, cfg: &RankingConfig) -> f64 {
    if post.engagement.views < cfg.min_quality_views {
        return 1.0;
    }
    let rate = post.engagement.total() as f64 / post.engagement.views as f64;
    if rate >= cfg.high_engagement_rate {
        let kicker = if age_hours < 24.0 { 1.1 } else { 1.0 };
        1.3 * kicker
    } else if rate <= cfg.low_engagement_rate {
        0.8
    } else {
        1.0
    }
}

/// Engagement velocity for posts younger than a day
fn trending_factor(post: &CandidatePost, age_hours: f64) -> f64 {
    if age_hours >= 24.0 {
        return 1.0;
    }
    let per_hour = post.engagement.total() as f64 / age_hours.max(1.0);
    if per_hour > 50.0 {
        1.5
    } else if per_hour > 20.0 {
        1.3
    } else if per_hour > 10.0 {
        1.15
    } else {
        1.0
    }
}

/// Boost posts created in the viewer's historically active hours
fn time_of_day_factor(post: &CandidatePost, viewer: &ViewerContext) -> f64 {
    let Some(profile) = viewer.profile.as_ref() else {
        return 1.0;
    };
    let total: u32 = profile.active_hours.iter().sum();
    if total == 0 {
        return 1.0;
    }
    let mean = total as f64 / 24.0;
    let active = |hour: usize| profile.active_hours[hour % 24] as f64 > mean;

    let post_hour = post.created_at.hour() as usize;
    if active(post_hour) {
        1.2
    } else if active(post_hour + 23) || active(post_hour + 1) {
        1.1
    } else {
        1.0
    }
}

/// Penalize authors/topics already ranked earlier in this pass
fn diversity_factor(post: &CandidatePost, state: &DiversityState, cfg: &RankingConfig) -> f64 {
    let mut factor = 1.0;
    if state.author_seen(&post.author_id) {
        factor *= cfg.repeat_author_penalty;
    }
    if state.any_topic_seen(&post.hashtags) {
        factor *= cfg.repeat_topic_penalty;
    }
    factor
}

/// Hard zero for suppressed authors, half for hidden topics
fn negative_signal_factor(post: &CandidatePost, viewer: &ViewerContext) -> f64 {
    let Some(profile) = viewer.profile.as_ref() else {
        return 1.0;
    };
    if profile.suppresses_author(&post.author_id) {
        return 0.0;
    }
    if post
        .hashtags
        .iter()
        .any(|tag| profile.hidden_topics.contains(tag))
    {
        return 0.5;
    }
    1.0
}
