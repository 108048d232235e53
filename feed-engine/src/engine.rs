//! Engine facade
//!
//! Ties ranking, caching, pagination and trending together behind the
//! interface the service layer consumes. All collaborators are injected at
//! construction (one instance per process, torn down at shutdown); nothing
//! in the engine reaches for global state.

use chrono::Utc;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use cache_invalidation::{InvalidationError, InvalidationPublisher, InvalidationSubscriber};

use crate::cache::FeedCache;
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    CandidatePost, FeedPage, FeedType, ScoredPost, TrendingEntry, TrendingWindow, ViewerContext,
};
use crate::pagination::{
    build_chronological_page, build_page, candidate_query, decode_cursor, SessionBackend, Sessions,
};
use crate::services::ranking::Ranker;
use crate::services::trending::TrendingAggregator;
use crate::store::{CandidateQuery, CandidateStore, ProfileReader, SocialGraph};

pub struct FeedEngine {
    store: Arc<dyn CandidateStore>,
    ranker: Ranker,
    cache: Arc<FeedCache>,
    sessions: Sessions,
    trending: Arc<TrendingAggregator>,
    cfg: Config,
}

impl FeedEngine {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        graph: Arc<dyn SocialGraph>,
        profiles: Arc<dyn ProfileReader>,
        session_backend: Arc<dyn SessionBackend>,
        redis: Option<ConnectionManager>,
        publisher: Option<InvalidationPublisher>,
        cfg: Config,
    ) -> Self {
        let ranker = Ranker::new(graph, profiles, cfg.ranking.clone());
        let cache = Arc::new(FeedCache::new(&cfg.cache, redis.clone(), publisher));
        let sessions = Sessions::new(session_backend, cfg.session.ttl_secs);
        let trending = Arc::new(TrendingAggregator::new(
            Arc::clone(&store),
            redis,
            cfg.trending.clone(),
        ));

        Self {
            store,
            ranker,
            cache,
            sessions,
            trending,
            cfg,
        }
    }

    /// The trending aggregator, shared with the refresh job
    pub fn trending(&self) -> Arc<TrendingAggregator> {
        Arc::clone(&self.trending)
    }

    /// Score and order candidates for a viewer
    pub async fn rank_posts(
        &self,
        candidates: Vec<CandidatePost>,
        viewer_id: Option<Uuid>,
        context: Option<ViewerContext>,
    ) -> Result<Vec<ScoredPost>> {
        self.ranker.rank(candidates, viewer_id, context).await
    }

    /// Cached feed lookup with caller-supplied computation
    pub async fn get_or_compute_feed<F, Fut>(
        &self,
        viewer_id: Option<Uuid>,
        feed: FeedType,
        compute: F,
    ) -> Result<Vec<ScoredPost>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ScoredPost>>>,
    {
        self.cache.get_or_compute(viewer_id, feed, compute).await
    }

    /// Invalidate a viewer's cached feed(s) across tiers and instances
    pub async fn invalidate_user_cache(&self, viewer_id: Uuid, feed: Option<FeedType>) {
        self.cache.invalidate_user(viewer_id, feed).await;
    }

    /// Cached trending read
    pub async fn get_trending(
        &self,
        window: TrendingWindow,
        limit: usize,
    ) -> Vec<TrendingEntry> {
        self.trending.get_trending(window, limit).await
    }

    /// Serve one page of a feed.
    ///
    /// Ranked feeds page out of a cached ranked snapshot through a session
    /// that tracks what this browsing session has seen; the chronological
    /// feed pages by (timestamp, id) boundary alone. A bad cursor token means
    /// the first page, never an error.
    pub async fn feed_page(
        &self,
        viewer_id: Option<Uuid>,
        feed: FeedType,
        cursor_token: Option<&str>,
        limit: usize,
    ) -> Result<FeedPage> {
        let limit = limit.clamp(1, 100);
        let cursor = cursor_token.and_then(decode_cursor);

        if feed.is_ranked() {
            let session_id = cursor.as_ref().and_then(|c| c.session_id);
            let mut session = self
                .sessions
                .resume_or_create(session_id, viewer_id, feed)
                .await;

            let ranked = self
                .cache
                .get_or_compute(viewer_id, feed, || self.compute_ranked(viewer_id, feed))
                .await?;

            let page = build_page(ranked, limit, &mut session);
            self.sessions.save(&session).await;
            Ok(page)
        } else {
            let ctx = self.ranker.resolve_context(viewer_id).await;

            let mut query = candidate_query(feed, limit, cursor.as_ref(), None);
            if !ctx.following.is_empty() {
                query.authors = Some(ctx.following.iter().copied().collect());
            }
            // An empty follow list (or a degraded graph) falls back to the
            // global recent stream rather than an empty page

            let candidates = self.fetch_validated(&query).await?;
            let items = candidates
                .into_iter()
                .enumerate()
                .map(|(i, post)| ScoredPost {
                    post,
                    score: 1.0 - i as f64 * 0.01,
                    retrieval_rank: i,
                })
                .collect();

            Ok(build_chronological_page(items, limit))
        }
    }

    /// Compute and cache a viewer's ranked feed outside the request path
    pub async fn precompute_feed(&self, viewer_id: Uuid, feed: FeedType) -> Result<()> {
        let ranked = self.compute_ranked(Some(viewer_id), feed).await?;
        self.cache.warm(viewer_id, feed, ranked).await;
        Ok(())
    }

    /// Wire the cross-instance invalidation subscription into the local tier
    pub async fn spawn_invalidation_listener(
        &self,
        subscriber: InvalidationSubscriber,
    ) -> std::result::Result<JoinHandle<()>, InvalidationError> {
        let cache = Arc::clone(&self.cache);
        subscriber
            .subscribe(move |event| {
                let cache = Arc::clone(&cache);
                async move {
                    cache.apply_remote(&event);
                    Ok(())
                }
            })
            .await
    }

    /// Full ranked-feed computation: fetch, validate, rank
    async fn compute_ranked(
        &self,
        viewer_id: Option<Uuid>,
        feed: FeedType,
    ) -> Result<Vec<ScoredPost>> {
        let ctx = self.ranker.resolve_context(viewer_id).await;
        let query = CandidateQuery::new(feed, self.cfg.ranking.candidate_limit);
        let candidates = self.fetch_validated(&query).await?;
        Ok(self.ranker.rank_with_context(candidates, &ctx, Utc::now()))
    }

    /// Fetch candidates and validate them at the boundary; a document
    /// violating a ranking invariant fails the whole pass loudly
    async fn fetch_validated(&self, query: &CandidateQuery) -> Result<Vec<CandidatePost>> {
        let docs = self.store.fetch_candidates(query).await?;
        docs.into_iter().map(CandidatePost::try_from).collect()
    }
}
