//! Feed sessions
//!
//! Ranked feeds cannot exclude already-shown posts with a boundary predicate
//! (score order is not monotonic with time), so each browsing session keeps a
//! server-side record of the post ids it has been shown. Cursors carry only
//! the session id; the seen-set lives here.
//!
//! Sessions are stored under `feed_session:{id}` with a fixed TTL (default
//! 24 h) and expire on their own; there is no explicit delete path. A
//! backend that is down or a session that cannot be loaded degrades to a
//! fresh session — pagination restarts, the request never fails.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::models::FeedType;

/// Server-side record of what one browsing session has been shown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSession {
    pub id: Uuid,
    pub viewer_id: Option<Uuid>,
    pub feed: FeedType,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub seen: HashSet<Uuid>,
    #[serde(default)]
    pub last_cursor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FeedSession {
    pub fn new(viewer_id: Option<Uuid>, feed: FeedType, ttl_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            viewer_id,
            feed,
            filters: Vec::new(),
            seen: HashSet::new(),
            last_cursor: None,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs as i64),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Append the ids of a returned page to the seen-set
    pub fn record_seen<'a>(&mut self, ids: impl IntoIterator<Item = &'a Uuid>) {
        self.seen.extend(ids.into_iter().copied());
    }
}

/// Persistence seam for feed sessions
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Load a session; None for missing, expired or unreadable records
    async fn load(&self, id: Uuid) -> Option<FeedSession>;
    /// Persist a session; best-effort, failures are logged and swallowed
    async fn save(&self, session: &FeedSession);
}

/// Redis-backed session store
pub struct RedisSessionStore {
    redis: ConnectionManager,
    cfg: SessionConfig,
    degraded: AtomicBool,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager, cfg: SessionConfig) -> Self {
        Self {
            redis,
            cfg,
            degraded: AtomicBool::new(false),
        }
    }

    fn key(&self, id: Uuid) -> String {
        format!("{}:{}", self.cfg.key_prefix, id)
    }
}

#[async_trait]
impl SessionBackend for RedisSessionStore {
    async fn load(&self, id: Uuid) -> Option<FeedSession> {
        let mut conn = self.redis.clone();
        let value: Option<String> = match conn.get(self.key(id)).await {
            Ok(value) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    debug!("Session store recovered");
                }
                value
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    warn!(error = %e, "Session store unavailable, paginating with fresh sessions");
                }
                return None;
            }
        };

        let json = value?;
        match serde_json::from_str::<FeedSession>(&json) {
            Ok(session) if !session.is_expired(Utc::now()) => Some(session),
            Ok(_) => None,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Discarding undecodable session record");
                None
            }
        }
    }

    async fn save(&self, session: &FeedSession) {
        let json = match serde_json::to_string(session) {
            Ok(json) => json,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Session serialization failed");
                return;
            }
        };

        let mut conn = self.redis.clone();
        let result: redis::RedisResult<()> = conn
            .set_ex(self.key(session.id), json, self.cfg.ttl_secs)
            .await;
        match result {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    debug!("Session store recovered");
                }
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::SeqCst) {
                    warn!(error = %e, "Session store unavailable, seen-set not persisted");
                }
            }
        }
    }
}

/// In-process session store for single-instance deployments and tests
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<Uuid, FeedSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionBackend for MemorySessionStore {
    async fn load(&self, id: Uuid) -> Option<FeedSession> {
        let session = self.sessions.get(&id)?.clone();
        if session.is_expired(Utc::now()) {
            self.sessions.remove(&id);
            return None;
        }
        Some(session)
    }

    async fn save(&self, session: &FeedSession) {
        self.sessions.insert(session.id, session.clone());
    }
}

/// Session lifecycle on top of a backend
pub struct Sessions {
    backend: std::sync::Arc<dyn SessionBackend>,
    ttl_secs: u64,
}

impl Sessions {
    pub fn new(backend: std::sync::Arc<dyn SessionBackend>, ttl_secs: u64) -> Self {
        Self { backend, ttl_secs }
    }

    /// Resume the session a cursor references, or start a fresh one.
    ///
    /// An unknown/expired id or an unavailable backend silently becomes a
    /// fresh session.
    pub async fn resume_or_create(
        &self,
        session_id: Option<Uuid>,
        viewer_id: Option<Uuid>,
        feed: FeedType,
    ) -> FeedSession {
        if let Some(id) = session_id {
            if let Some(session) = self.backend.load(id).await {
                debug!(session_id = %id, seen = session.seen.len(), "Resumed feed session");
                return session;
            }
            debug!(session_id = %id, "Session not resumable, starting fresh");
        }
        FeedSession::new(viewer_id, feed, self.ttl_secs)
    }

    pub async fn save(&self, session: &FeedSession) {
        self.backend.save(session).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry() {
        let mut session = FeedSession::new(Some(Uuid::new_v4()), FeedType::ForYou, 60);
        let now = Utc::now();
        assert!(!session.is_expired(now));

        session.expires_at = now - Duration::seconds(1);
        assert!(session.is_expired(now));
    }

    #[test]
    fn test_record_seen_accumulates() {
        let mut session = FeedSession::new(None, FeedType::Explore, 60);
        let first: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let second: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();

        session.record_seen(&first);
        session.record_seen(&second);
        session.record_seen(&first); // idempotent

        assert_eq!(session.seen.len(), 5);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        let session = FeedSession::new(Some(Uuid::new_v4()), FeedType::ForYou, 60);

        store.save(&session).await;
        let loaded = store.load(session.id).await.unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.feed, FeedType::ForYou);
    }

    #[tokio::test]
    async fn test_memory_store_drops_expired() {
        let store = MemorySessionStore::new();
        let mut session = FeedSession::new(None, FeedType::ForYou, 60);
        session.expires_at = Utc::now() - Duration::seconds(1);

        store.save(&session).await;
        assert!(store.load(session.id).await.is_none());
    }

    #[tokio::test]
    async fn test_resume_or_create() {
        let backend = std::sync::Arc::new(MemorySessionStore::new());
        let sessions = Sessions::new(backend.clone(), 60);
        let viewer = Some(Uuid::new_v4());

        // Unknown id → fresh session
        let fresh = sessions
            .resume_or_create(Some(Uuid::new_v4()), viewer, FeedType::ForYou)
            .await;
        assert!(fresh.seen.is_empty());

        // Known id → resumed with its seen-set
        let mut session = FeedSession::new(viewer, FeedType::ForYou, 60);
        session.record_seen(&[Uuid::new_v4()]);
        sessions.save(&session).await;

        let resumed = sessions
            .resume_or_create(Some(session.id), viewer, FeedType::ForYou)
            .await;
        assert_eq!(resumed.id, session.id);
        assert_eq!(resumed.seen.len(), 1);
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let mut session = FeedSession::new(Some(Uuid::new_v4()), FeedType::Explore, 3600);
        session.record_seen(&[Uuid::new_v4(), Uuid::new_v4()]);
        session.last_cursor = Some("token".to_string());

        let json = serde_json::to_string(&session).unwrap();
        let decoded: FeedSession = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.id, session.id);
        assert_eq!(decoded.seen, session.seen);
        assert_eq!(decoded.last_cursor, session.last_cursor);
    }
}
