//! Feed cache invalidation over Redis Pub/Sub
//!
//! Keeps the process-local feed caches of multiple engine instances coherent:
//! whenever one instance invalidates a viewer's feed, it broadcasts an event so
//! every other instance drops its own tier-1 entries for that viewer instead of
//! waiting for TTL expiry.
//!
//! ```text
//! Instance A:
//!   1. Drop local entries for (viewer, feed)
//!   2. DEL the shared cache key(s)
//!   3. PUBLISH feed:invalidate {"viewer_id": "...", "feed": "for_you", ...}
//!      ↓
//! Redis Pub/Sub (broadcast)
//!      ↓
//! Instances B, C:
//!   4. Receive the event, skip if self-originated
//!   5. Drop matching tier-1 entries
//! ```
//!
//! Publishing is fire-and-forget: a failed publish degrades remote instances to
//! TTL-based expiry, it never fails the invalidating request.
//!
//! # Example: publisher
//!
//! ```no_run
//! use cache_invalidation::{InvalidationEvent, InvalidationPublisher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let publisher =
//!         InvalidationPublisher::new("redis://localhost:6379", "instance-1".to_string()).await?;
//!
//!     let viewer = uuid::Uuid::new_v4();
//!     // One feed type
//!     publisher
//!         .publish(InvalidationEvent::feed(viewer, "for_you", "instance-1".to_string()))
//!         .await?;
//!     // Every feed for the viewer
//!     publisher
//!         .publish(InvalidationEvent::viewer(viewer, "instance-1".to_string()))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: subscriber
//!
//! ```no_run
//! use cache_invalidation::InvalidationSubscriber;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subscriber = InvalidationSubscriber::new("redis://localhost:6379")?;
//!     let handle = subscriber
//!         .subscribe(|event| async move {
//!             println!("dropping tier-1 entries for {}", event.viewer_id);
//!             Ok(())
//!         })
//!         .await?;
//!     handle.await?;
//!     Ok(())
//! }
//! ```

use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

mod error;
mod keys;

pub use error::InvalidationError;
pub use keys::{feed_cache_key, parse_feed_cache_key, viewer_pattern};

type Result<T> = std::result::Result<T, InvalidationError>;

/// A single feed invalidation event.
///
/// `feed` is the string tag of the feed type (`for_you`, `following`, ...);
/// `None` means every cached feed for the viewer is stale. `origin` carries the
/// publishing instance's id so subscribers can skip their own events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub event_id: String,
    pub viewer_id: Uuid,
    pub feed: Option<String>,
    pub origin: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InvalidationEvent {
    /// Event invalidating one feed type for a viewer
    pub fn feed(viewer_id: Uuid, feed: &str, origin: String) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            viewer_id,
            feed: Some(feed.to_string()),
            origin,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Event invalidating every feed type for a viewer
    pub fn viewer(viewer_id: Uuid, origin: String) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            viewer_id,
            feed: None,
            origin,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Publisher half of the invalidation channel
#[derive(Clone)]
pub struct InvalidationPublisher {
    client: ConnectionManager,
    channel: String,
    instance_id: String,
}

impl InvalidationPublisher {
    /// Default Redis channel for feed invalidation
    pub const DEFAULT_CHANNEL: &'static str = "feed:invalidate";

    /// Create a publisher identified by `instance_id` (used as event origin)
    pub async fn new(redis_url: &str, instance_id: String) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            client: connection,
            channel: Self::DEFAULT_CHANNEL.to_string(),
            instance_id,
        })
    }

    /// Create a publisher on a custom channel
    pub async fn with_channel(
        redis_url: &str,
        instance_id: String,
        channel: String,
    ) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            client: connection,
            channel,
            instance_id,
        })
    }

    /// Instance id stamped as the origin of published events
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Publish an invalidation event.
    ///
    /// Returns the number of subscribers that received it.
    pub async fn publish(&self, event: InvalidationEvent) -> Result<usize> {
        let payload = serde_json::to_string(&event)?;

        debug!(
            event_id = %event.event_id,
            viewer_id = %event.viewer_id,
            feed = ?event.feed,
            channel = %self.channel,
            "Publishing feed invalidation"
        );

        let mut conn = self.client.clone();
        let subscriber_count: usize = conn.publish(&self.channel, payload).await?;

        debug!(
            event_id = %event.event_id,
            subscribers = subscriber_count,
            "Feed invalidation published"
        );

        Ok(subscriber_count)
    }

    /// Publish an event for one feed type of a viewer
    pub async fn invalidate_feed(&self, viewer_id: Uuid, feed: &str) -> Result<usize> {
        self.publish(InvalidationEvent::feed(
            viewer_id,
            feed,
            self.instance_id.clone(),
        ))
        .await
    }

    /// Publish an event for every feed type of a viewer
    pub async fn invalidate_viewer(&self, viewer_id: Uuid) -> Result<usize> {
        self.publish(InvalidationEvent::viewer(
            viewer_id,
            self.instance_id.clone(),
        ))
        .await
    }
}

/// Subscriber half of the invalidation channel
pub struct InvalidationSubscriber {
    client: Client,
    channel: String,
}

impl InvalidationSubscriber {
    /// Create a subscriber on the default channel
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        Ok(Self {
            client,
            channel: InvalidationPublisher::DEFAULT_CHANNEL.to_string(),
        })
    }

    /// Create a subscriber on a custom channel
    pub fn with_channel(redis_url: &str, channel: String) -> Result<Self> {
        let client = Client::open(redis_url)?;

        Ok(Self { client, channel })
    }

    /// Subscribe and run `callback` for every received event on a background
    /// task. Malformed payloads are logged and skipped, they never stop the
    /// subscription.
    pub async fn subscribe<F, Fut>(&self, callback: F) -> Result<JoinHandle<()>>
    where
        F: Fn(InvalidationEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        info!(channel = %self.channel, "Subscribed to feed invalidation events");

        let callback = Arc::new(callback);

        let handle = tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = ?e, "Failed to read invalidation payload");
                        continue;
                    }
                };

                let event: InvalidationEvent = match serde_json::from_str(&payload) {
                    Ok(ev) => ev,
                    Err(e) => {
                        error!(error = ?e, payload = %payload, "Failed to decode invalidation event");
                        continue;
                    }
                };

                debug!(
                    event_id = %event.event_id,
                    viewer_id = %event.viewer_id,
                    feed = ?event.feed,
                    origin = %event.origin,
                    "Received feed invalidation"
                );

                let callback = Arc::clone(&callback);
                if let Err(e) = callback(event.clone()).await {
                    error!(
                        error = ?e,
                        event_id = %event.event_id,
                        "Invalidation callback failed"
                    );
                }
            }

            warn!("Feed invalidation subscription ended");
        });

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_event_shape() {
        let viewer = Uuid::new_v4();
        let event = InvalidationEvent::feed(viewer, "for_you", "instance-1".to_string());

        assert_eq!(event.viewer_id, viewer);
        assert_eq!(event.feed.as_deref(), Some("for_you"));
        assert_eq!(event.origin, "instance-1");
    }

    #[test]
    fn test_viewer_event_covers_all_feeds() {
        let viewer = Uuid::new_v4();
        let event = InvalidationEvent::viewer(viewer, "instance-2".to_string());

        assert_eq!(event.feed, None);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = InvalidationEvent::feed(Uuid::new_v4(), "explore", "instance-1".to_string());

        let json = serde_json::to_string(&event).unwrap();
        let decoded: InvalidationEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.event_id, event.event_id);
        assert_eq!(decoded.viewer_id, event.viewer_id);
        assert_eq!(decoded.feed, event.feed);
        assert_eq!(decoded.origin, event.origin);
    }

    #[test]
    fn test_event_ids_are_unique() {
        let viewer = Uuid::new_v4();
        let a = InvalidationEvent::viewer(viewer, "i".to_string());
        let b = InvalidationEvent::viewer(viewer, "i".to_string());
        assert_ne!(a.event_id, b.event_id);
    }
}
