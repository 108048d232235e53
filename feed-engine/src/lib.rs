//! Personalized feed engine
//!
//! Selects, scores, orders, paginates and caches candidate posts for a
//! social network's feeds. Four pieces form the core: the multiplicative
//! score model and ranker, the two-tier cache with cross-instance
//! invalidation, the session-backed pagination protocol for ranked feeds,
//! and the periodic trending aggregator sharing the same cache discipline.
//!
//! Transport, auth and storage live elsewhere; the engine is constructed
//! from trait-object collaborators and exposes [`engine::FeedEngine`].

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod models;
pub mod pagination;
pub mod services;
pub mod store;

pub use config::Config;
pub use engine::FeedEngine;
pub use error::{FeedError, Result};

pub use cache::FeedCache;
pub use models::{
    BehaviorProfile, CandidateDoc, CandidatePost, EngagementCounts, FeedPage, FeedType, PostKind,
    ScoredPost, TrendingEntry, TrendingWindow, ViewerContext, Visibility,
};
pub use pagination::{
    build_chronological_page, build_page, candidate_query, decode_cursor, encode_cursor,
    FeedCursor, FeedSession, MemorySessionStore, RedisSessionStore, SessionBackend, Sessions,
};
pub use services::ranking::Ranker;
pub use services::scoring::{score_post, DiversityState};
pub use services::trending::TrendingAggregator;
pub use store::{CandidateQuery, CandidateStore, CursorBoundary, ProfileReader, SocialGraph};
