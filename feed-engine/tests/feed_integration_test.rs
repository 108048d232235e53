//! End-to-end engine tests against in-memory collaborators.
//!
//! No Redis here: the engine runs tier-1-only with the in-memory session
//! store, which is exactly the degraded mode it must support anyway.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use feed_engine::{
    BehaviorProfile, CandidateDoc, CandidateQuery, CandidateStore, Config, EngagementCounts,
    FeedEngine, FeedError, FeedType, MemorySessionStore, PostKind, ProfileReader, Result,
    SocialGraph, Visibility,
};

struct InMemoryStore {
    posts: Vec<CandidateDoc>,
    fetch_calls: AtomicUsize,
}

impl InMemoryStore {
    fn new(posts: Vec<CandidateDoc>) -> Self {
        Self {
            posts,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateStore for InMemoryStore {
    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateDoc>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let mut docs: Vec<CandidateDoc> = self
            .posts
            .iter()
            .filter(|doc| match &query.authors {
                Some(authors) => authors.contains(&doc.author_id),
                None => true,
            })
            .filter(|doc| match query.before {
                Some(boundary) => match doc.created_at {
                    Some(created_at) => {
                        let ts = created_at.timestamp();
                        ts < boundary.ts || (ts == boundary.ts && doc.id < boundary.id)
                    }
                    None => true,
                },
                None => true,
            })
            .filter(|doc| !query.exclude_ids.contains(&doc.id))
            .cloned()
            .collect();

        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs.truncate(query.limit);
        Ok(docs)
    }

    async fn posts_since(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CandidateDoc>> {
        let mut docs: Vec<CandidateDoc> = self
            .posts
            .iter()
            .filter(|doc| doc.created_at.map(|ts| ts >= since).unwrap_or(false))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs.truncate(limit);
        Ok(docs)
    }
}

struct StaticGraph {
    following: HashSet<Uuid>,
}

#[async_trait]
impl SocialGraph for StaticGraph {
    async fn following(&self, _viewer_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self.following.clone())
    }
}

struct NoProfiles;

#[async_trait]
impl ProfileReader for NoProfiles {
    async fn behavior_profile(&self, _viewer_id: Uuid) -> Result<Option<BehaviorProfile>> {
        Ok(None)
    }
}

fn doc(author_id: Uuid, minutes_ago: i64, likes: u64) -> CandidateDoc {
    CandidateDoc {
        id: Uuid::new_v4(),
        author_id,
        created_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
        visibility: Visibility::Public,
        engagement: EngagementCounts {
            likes,
            ..Default::default()
        },
        hashtags: vec![],
        language: None,
        kind: PostKind::Text,
        parent_id: None,
        reposted_from: None,
    }
}

fn engine_with(posts: Vec<CandidateDoc>, following: HashSet<Uuid>) -> (FeedEngine, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new(posts));
    let engine = FeedEngine::new(
        Arc::clone(&store) as Arc<dyn CandidateStore>,
        Arc::new(StaticGraph { following }),
        Arc::new(NoProfiles),
        Arc::new(MemorySessionStore::new()),
        None,
        None,
        Config::default(),
    );
    (engine, store)
}

#[tokio::test]
async fn ranked_feed_pages_never_repeat_posts() {
    let posts: Vec<CandidateDoc> = (0..25)
        .map(|i| doc(Uuid::new_v4(), i * 3 + 1, (i as u64 * 13) % 40))
        .collect();
    let (engine, _store) = engine_with(posts, HashSet::new());
    let viewer = Some(Uuid::new_v4());

    let mut cursor: Option<String> = None;
    let mut all_ids: Vec<Uuid> = Vec::new();
    let mut pages = 0;

    loop {
        let page = engine
            .feed_page(viewer, FeedType::ForYou, cursor.as_deref(), 10)
            .await
            .unwrap();
        all_ids.extend(page.items.iter().map(|p| p.post.id));
        pages += 1;

        if !page.has_more {
            assert!(page.next_cursor.is_none());
            break;
        }
        assert!(page.next_cursor.is_some());
        cursor = page.next_cursor;
    }

    assert_eq!(pages, 3);
    assert_eq!(all_ids.len(), 25);
    let unique: HashSet<Uuid> = all_ids.iter().copied().collect();
    assert_eq!(unique.len(), 25, "a session must never repeat a post");
}

#[tokio::test]
async fn ranked_pages_reuse_the_cached_snapshot() {
    let posts: Vec<CandidateDoc> = (0..30).map(|i| doc(Uuid::new_v4(), i + 1, 5)).collect();
    let (engine, store) = engine_with(posts, HashSet::new());
    let viewer = Some(Uuid::new_v4());

    let first = engine
        .feed_page(viewer, FeedType::ForYou, None, 10)
        .await
        .unwrap();
    let second = engine
        .feed_page(
            viewer,
            FeedType::ForYou,
            first.next_cursor.as_deref(),
            10,
        )
        .await
        .unwrap();

    assert_eq!(first.items.len(), 10);
    assert_eq!(second.items.len(), 10);
    // Both pages came out of one ranking pass; scores were not recomputed
    assert_eq!(store.fetch_count(), 1);
}

#[tokio::test]
async fn invalidation_forces_recompute() {
    let posts: Vec<CandidateDoc> = (0..5).map(|i| doc(Uuid::new_v4(), i + 1, 1)).collect();
    let (engine, store) = engine_with(posts, HashSet::new());
    let viewer = Uuid::new_v4();

    engine
        .feed_page(Some(viewer), FeedType::ForYou, None, 10)
        .await
        .unwrap();
    engine
        .feed_page(Some(viewer), FeedType::ForYou, None, 10)
        .await
        .unwrap();
    assert_eq!(store.fetch_count(), 1);

    engine
        .invalidate_user_cache(viewer, Some(FeedType::ForYou))
        .await;

    engine
        .feed_page(Some(viewer), FeedType::ForYou, None, 10)
        .await
        .unwrap();
    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn anonymous_viewers_always_compute_live() {
    let posts: Vec<CandidateDoc> = (0..5).map(|i| doc(Uuid::new_v4(), i + 1, 1)).collect();
    let (engine, store) = engine_with(posts, HashSet::new());

    engine
        .feed_page(None, FeedType::Explore, None, 5)
        .await
        .unwrap();
    engine
        .feed_page(None, FeedType::Explore, None, 5)
        .await
        .unwrap();

    assert_eq!(store.fetch_count(), 2);
}

#[tokio::test]
async fn following_feed_is_chronological_and_restricted() {
    let followed = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let mut posts = Vec::new();
    for i in 0..12 {
        posts.push(doc(followed, i * 10 + 1, 0));
    }
    posts.push(doc(stranger, 2, 999));

    let (engine, _store) = engine_with(posts, HashSet::from([followed]));
    let viewer = Some(Uuid::new_v4());

    let first = engine
        .feed_page(viewer, FeedType::Following, None, 5)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 5);
    assert!(first.has_more);
    assert!(first.session_id.is_none());
    assert!(first.items.iter().all(|p| p.post.author_id == followed));

    // Strictly newest-first within the page
    for pair in first.items.windows(2) {
        assert!(pair[0].post.created_at > pair[1].post.created_at);
    }

    let second = engine
        .feed_page(viewer, FeedType::Following, first.next_cursor.as_deref(), 5)
        .await
        .unwrap();

    let first_ids: HashSet<Uuid> = first.items.iter().map(|p| p.post.id).collect();
    let second_ids: HashSet<Uuid> = second.items.iter().map(|p| p.post.id).collect();
    assert!(first_ids.is_disjoint(&second_ids));

    let boundary = first.items.last().unwrap().post.created_at;
    assert!(second.items.iter().all(|p| p.post.created_at < boundary));
}

#[tokio::test]
async fn candidate_without_timestamp_fails_the_pass() {
    let mut bad = doc(Uuid::new_v4(), 1, 0);
    bad.created_at = None;
    let (engine, _store) = engine_with(vec![bad], HashSet::new());

    let result = engine
        .feed_page(Some(Uuid::new_v4()), FeedType::ForYou, None, 10)
        .await;

    assert!(matches!(result, Err(FeedError::InvalidCandidate(_))));
}

#[tokio::test]
async fn garbage_cursor_restarts_from_first_page() {
    let posts: Vec<CandidateDoc> = (0..8).map(|i| doc(Uuid::new_v4(), i + 1, 2)).collect();
    let (engine, _store) = engine_with(posts, HashSet::new());
    let viewer = Some(Uuid::new_v4());

    let clean = engine
        .feed_page(viewer, FeedType::ForYou, None, 5)
        .await
        .unwrap();
    let garbled = engine
        .feed_page(viewer, FeedType::ForYou, Some("!!definitely-not-a-cursor!!"), 5)
        .await
        .unwrap();

    // A fresh session: the same leading posts come back
    let clean_ids: Vec<Uuid> = clean.items.iter().map(|p| p.post.id).collect();
    let garbled_ids: Vec<Uuid> = garbled.items.iter().map(|p| p.post.id).collect();
    assert_eq!(clean_ids, garbled_ids);
}

#[tokio::test]
async fn precompute_makes_the_next_request_a_cache_hit() {
    let posts: Vec<CandidateDoc> = (0..6).map(|i| doc(Uuid::new_v4(), i + 1, 3)).collect();
    let (engine, store) = engine_with(posts, HashSet::new());
    let viewer = Uuid::new_v4();

    engine
        .precompute_feed(viewer, FeedType::ForYou)
        .await
        .unwrap();
    assert_eq!(store.fetch_count(), 1);

    let page = engine
        .feed_page(Some(viewer), FeedType::ForYou, None, 10)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 6);
    assert_eq!(store.fetch_count(), 1);
}

#[tokio::test]
async fn trending_aggregation_reads_from_candidate_store() {
    let author = Uuid::new_v4();
    let mut posts = Vec::new();
    for i in 0..4 {
        let mut d = doc(author, i * 30 + 1, 0);
        d.hashtags = vec!["rustlang".to_string()];
        posts.push(d);
    }
    let mut other = doc(author, 10, 0);
    other.hashtags = vec!["coffee".to_string()];
    posts.push(other);

    let (engine, _store) = engine_with(posts, HashSet::new());
    let trending = engine.trending();

    let entries = trending
        .calculate_window(feed_engine::TrendingWindow::TwentyFourHours)
        .await
        .unwrap();

    assert_eq!(entries[0].topic, "rustlang");
    assert_eq!(entries[0].volume, 4);
    assert_eq!(entries[0].rank, 1);
    // Without a cache backend the read path serves nothing rather than
    // recomputing synchronously
    let served = engine
        .get_trending(feed_engine::TrendingWindow::TwentyFourHours, 10)
        .await;
    assert!(served.is_empty());
}
