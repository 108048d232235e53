//! Error types for feed cache invalidation

use thiserror::Error;

/// Invalidation broadcast errors
#[derive(Error, Debug)]
pub enum InvalidationError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Event serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Received event payload that could not be understood
    #[error("Invalid event format: {0}")]
    InvalidEvent(String),
}
