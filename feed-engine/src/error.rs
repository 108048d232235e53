//! Error types for the feed engine
//!
//! Most failure classes are absorbed internally (cache backend down, bad
//! cursor tokens, graph/profile lookups failing) and degrade to slower or
//! less-personalized behavior. The variants here cover what is left: failures
//! of the primary candidate store, and invariant violations that must fail a
//! ranking pass loudly rather than corrupt its ordering.

use thiserror::Error;

/// Result type for feed engine operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Feed engine errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// Candidate store query failed
    #[error("candidate store error: {0}")]
    Store(String),

    /// Social graph or behavior profile lookup failed
    #[error("upstream lookup failed: {0}")]
    Upstream(String),

    /// A candidate violated a ranking invariant (e.g. missing timestamp)
    #[error("invalid candidate: {0}")]
    InvalidCandidate(String),

    /// Serialization of a cache/session payload failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}
