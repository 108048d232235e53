use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{FeedError, Result};

/// Feed variants served by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedType {
    ForYou,
    Following,
    Explore,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForYou => "for_you",
            Self::Following => "following",
            Self::Explore => "explore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "for_you" => Some(Self::ForYou),
            "following" => Some(Self::Following),
            "explore" => Some(Self::Explore),
            _ => None,
        }
    }

    /// Ranked feeds need session-backed duplicate tracking; the chronological
    /// feed only needs a (timestamp, id) boundary cursor.
    pub fn is_ranked(&self) -> bool {
        !matches!(self, Self::Following)
    }
}

impl std::fmt::Display for FeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Post visibility as stored by the content system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Followers,
    Unlisted,
    Private,
}

/// Post content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    #[default]
    Text,
    Image,
    Video,
    Link,
    Repost,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Link => "link",
            Self::Repost => "repost",
        }
    }
}

/// Engagement counters; absent counters decode as zero
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EngagementCounts {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub reposts: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub saves: u64,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub shares: u64,
}

impl EngagementCounts {
    /// Total engagement excluding views (used by quality and trending factors)
    pub fn total(&self) -> u64 {
        self.likes + self.reposts + self.comments + self.saves + self.shares
    }
}

/// Raw candidate document as returned by the external store.
///
/// Everything dynamic about the source documents is absorbed here: counters
/// default to zero, optional fields stay optional. Conversion into
/// [`CandidatePost`] is the validation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDoc {
    pub id: Uuid,
    pub author_id: Uuid,
    /// Absent `created_at` is an invariant violation, never defaulted
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub engagement: EngagementCounts,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub kind: PostKind,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub reposted_from: Option<Uuid>,
}

/// A validated candidate post, immutable for the duration of a ranking pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePost {
    pub id: Uuid,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub visibility: Visibility,
    pub engagement: EngagementCounts,
    pub hashtags: Vec<String>,
    pub language: Option<String>,
    pub kind: PostKind,
    pub parent_id: Option<Uuid>,
    pub reposted_from: Option<Uuid>,
}

impl TryFrom<CandidateDoc> for CandidatePost {
    type Error = FeedError;

    fn try_from(doc: CandidateDoc) -> Result<Self> {
        let created_at = doc.created_at.ok_or_else(|| {
            FeedError::InvalidCandidate(format!("candidate {} has no created_at", doc.id))
        })?;

        Ok(Self {
            id: doc.id,
            author_id: doc.author_id,
            created_at,
            visibility: doc.visibility,
            engagement: doc.engagement,
            hashtags: doc.hashtags,
            language: doc.language,
            kind: doc.kind,
            parent_id: doc.parent_id,
            reposted_from: doc.reposted_from,
        })
    }
}

/// Viewer-side context resolved once per ranking pass
#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    /// None for anonymous viewers
    pub viewer_id: Option<Uuid>,
    pub following: HashSet<Uuid>,
    pub profile: Option<BehaviorProfile>,
}

impl ViewerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_viewer(viewer_id: Uuid) -> Self {
        Self {
            viewer_id: Some(viewer_id),
            ..Self::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.viewer_id.is_none()
    }

    pub fn follows(&self, author_id: &Uuid) -> bool {
        self.following.contains(author_id)
    }
}

/// Behavioral profile maintained by the analytics pipeline; read-only here
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorProfile {
    /// Per-author relationship weights in 0..1, decayed by recency upstream
    #[serde(default)]
    pub author_weights: HashMap<Uuid, f64>,
    /// Per-topic interest weights in 0..1
    #[serde(default)]
    pub topic_weights: HashMap<String, f64>,
    /// Interaction counts per post kind
    #[serde(default)]
    pub post_type_affinity: HashMap<String, u32>,
    /// Activity histogram per hour of day
    #[serde(default)]
    pub active_hours: [u32; 24],
    /// Languages the viewer engages with
    #[serde(default)]
    pub preferred_languages: HashSet<String>,
    #[serde(default)]
    pub hidden_authors: HashSet<Uuid>,
    #[serde(default)]
    pub muted_authors: HashSet<Uuid>,
    #[serde(default)]
    pub blocked_authors: HashSet<Uuid>,
    #[serde(default)]
    pub hidden_topics: HashSet<String>,
}

impl BehaviorProfile {
    /// Author is hidden, muted or blocked
    pub fn suppresses_author(&self, author_id: &Uuid) -> bool {
        self.hidden_authors.contains(author_id)
            || self.muted_authors.contains(author_id)
            || self.blocked_authors.contains(author_id)
    }

    pub fn author_weight(&self, author_id: &Uuid) -> f64 {
        self.author_weights.get(author_id).copied().unwrap_or(0.0)
    }
}

/// A candidate with its computed relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPost {
    pub post: CandidatePost,
    /// Non-negative relevance score
    pub score: f64,
    /// Position in the original retrieval order, used for the epsilon tie-break
    pub retrieval_rank: usize,
}

/// One page of a feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<ScoredPost>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    /// Present for ranked feeds backed by a session
    pub session_id: Option<Uuid>,
}

/// Sliding window for trending aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendingWindow {
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    TwentyFourHours,
    #[serde(rename = "7d")]
    SevenDays,
}

impl TrendingWindow {
    pub const ALL: [TrendingWindow; 3] = [
        TrendingWindow::SixHours,
        TrendingWindow::TwentyFourHours,
        TrendingWindow::SevenDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SixHours => "6h",
            Self::TwentyFourHours => "24h",
            Self::SevenDays => "7d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "6h" => Some(Self::SixHours),
            "24h" => Some(Self::TwentyFourHours),
            "7d" => Some(Self::SevenDays),
            _ => None,
        }
    }

    pub fn hours(&self) -> i64 {
        match self {
            Self::SixHours => 6,
            Self::TwentyFourHours => 24,
            Self::SevenDays => 168,
        }
    }

    /// Momentum sub-window: a quarter of the long window, at least one hour
    pub fn short_hours(&self) -> i64 {
        (self.hours() / 4).max(1)
    }
}

impl std::fmt::Display for TrendingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One trending topic within a window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendingEntry {
    pub topic: String,
    pub window: String,
    /// Occurrences over the long window
    pub volume: u64,
    /// Short-window share of long-window activity, clamped to [0, 1]
    pub momentum: f64,
    pub score: f64,
    /// Dense rank: equal scores share a rank
    pub rank: u32,
}
