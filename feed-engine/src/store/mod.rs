//! Collaborator seams
//!
//! The engine never talks to storage directly; it is constructed with these
//! trait objects. The candidate store is the external document store holding
//! posts (queryable by filter, recency sort, limit), the social graph and
//! profile reader are the read-only personalization sources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{BehaviorProfile, CandidateDoc, FeedType};

/// Strictly-decreasing (timestamp, id) pagination boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorBoundary {
    pub ts: i64,
    pub id: Uuid,
}

/// Query shape the candidate store must support: simple filters, recency
/// sort, limit. Nothing richer is assumed of the backing store.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub feed: FeedType,
    /// Restrict to these authors (following feed); None means no restriction
    pub authors: Option<Vec<Uuid>>,
    /// Only posts strictly older than this boundary
    pub before: Option<CursorBoundary>,
    /// Post ids already shown to this session
    pub exclude_ids: Vec<Uuid>,
    /// Includes the +1 overfetch used for has_more detection
    pub limit: usize,
}

impl CandidateQuery {
    pub fn new(feed: FeedType, limit: usize) -> Self {
        Self {
            feed,
            authors: None,
            before: None,
            exclude_ids: Vec::new(),
            limit,
        }
    }
}

/// External post store, sorted by recency descending
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Fetch candidates matching `query`, newest first
    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateDoc>>;

    /// Public posts created at or after `since`, newest first, for trending
    /// aggregation
    async fn posts_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<CandidateDoc>>;
}

/// Read-only social graph lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialGraph: Send + Sync {
    async fn following(&self, viewer_id: Uuid) -> Result<HashSet<Uuid>>;
}

/// Read-only behavior profile lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileReader: Send + Sync {
    async fn behavior_profile(&self, viewer_id: Uuid) -> Result<Option<BehaviorProfile>>;
}
