//! Candidate ranking
//!
//! Orchestrates the score model over a candidate set: resolves the viewer
//! context once, scores sequentially while advancing the diversity
//! accumulator, then orders the results with an epsilon-stable sort.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RankingConfig;
use crate::error::Result;
use crate::models::{CandidatePost, ScoredPost, ViewerContext};
use crate::services::scoring::{score_post, DiversityState};
use crate::store::{ProfileReader, SocialGraph};

pub struct Ranker {
    graph: Arc<dyn SocialGraph>,
    profiles: Arc<dyn ProfileReader>,
    cfg: RankingConfig,
}

impl Ranker {
    pub fn new(
        graph: Arc<dyn SocialGraph>,
        profiles: Arc<dyn ProfileReader>,
        cfg: RankingConfig,
    ) -> Self {
        Self {
            graph,
            profiles,
            cfg,
        }
    }

    /// Build the viewer context for a ranking pass.
    ///
    /// Graph or profile lookup failures degrade to empty/neutral values; a
    /// rank must never abort because personalization data is unavailable.
    pub async fn resolve_context(&self, viewer_id: Option<Uuid>) -> ViewerContext {
        let Some(viewer) = viewer_id else {
            return ViewerContext::anonymous();
        };

        let mut ctx = ViewerContext::for_viewer(viewer);

        match self.graph.following(viewer).await {
            Ok(following) => ctx.following = following,
            Err(e) => {
                warn!(viewer_id = %viewer, error = %e, "Follow list unavailable, ranking without it");
            }
        }

        match self.profiles.behavior_profile(viewer).await {
            Ok(profile) => ctx.profile = profile,
            Err(e) => {
                warn!(viewer_id = %viewer, error = %e, "Behavior profile unavailable, ranking without it");
            }
        }

        ctx
    }

    /// Rank candidates for a viewer, resolving context if not supplied.
    ///
    /// The final score is attached to each result so later pages can reuse it
    /// without re-scoring.
    pub async fn rank(
        &self,
        candidates: Vec<CandidatePost>,
        viewer_id: Option<Uuid>,
        context: Option<ViewerContext>,
    ) -> Result<Vec<ScoredPost>> {
        let ctx = match context {
            Some(ctx) => ctx,
            None => self.resolve_context(viewer_id).await,
        };
        Ok(self.rank_with_context(candidates, &ctx, Utc::now()))
    }

    /// The pure ranking pass. Candidates are scored in retrieval order (the
    /// diversity penalty on a post only sees items ranked before it), then
    /// sorted descending by score; scores within epsilon keep retrieval
    /// order. The output is a permutation of the input.
    pub fn rank_with_context(
        &self,
        candidates: Vec<CandidatePost>,
        ctx: &ViewerContext,
        now: DateTime<Utc>,
    ) -> Vec<ScoredPost> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut diversity = DiversityState::new();
        let mut scored = Vec::with_capacity(candidates.len());

        for (retrieval_rank, post) in candidates.into_iter().enumerate() {
            let score = score_post(&post, ctx, now, &diversity, &self.cfg);
            diversity.observe(&post);
            scored.push(ScoredPost {
                post,
                score,
                retrieval_rank,
            });
        }

        let epsilon = self.cfg.epsilon;
        scored.sort_by(|a, b| {
            score_bucket(b.score, epsilon)
                .cmp(&score_bucket(a.score, epsilon))
                .then(a.retrieval_rank.cmp(&b.retrieval_rank))
        });

        debug!(
            viewer_id = ?ctx.viewer_id,
            ranked = scored.len(),
            top_score = scored.first().map(|p| p.score),
            "Ranking pass complete"
        );

        scored
    }
}

/// Quantize a score to its epsilon bucket so near-equal scores compare equal
/// and fall back to retrieval order.
fn score_bucket(score: f64, epsilon: f64) -> i64 {
    (score / epsilon).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::models::{EngagementCounts, PostKind, Visibility};
    use crate::store::{MockProfileReader, MockSocialGraph};
    use chrono::Duration;
    use std::collections::HashSet;

    fn test_ranker() -> Ranker {
        let mut graph = MockSocialGraph::new();
        graph.expect_following().returning(|_| Ok(HashSet::new()));
        let mut profiles = MockProfileReader::new();
        profiles.expect_behavior_profile().returning(|_| Ok(None));
        Ranker::new(
            Arc::new(graph),
            Arc::new(profiles),
            RankingConfig::default(),
        )
    }

    fn test_post(age_hours: i64, likes: u64) -> CandidatePost {
        CandidatePost {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            created_at: Utc::now() - Duration::hours(age_hours),
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

    #[tokio::test]
    async fn test_rank_is_a_permutation() {
        let ranker = test_ranker();
        let candidates: Vec<_> = (0..20).map(|i| test_post(i % 5 + 1, i as u64 * 7)).collect();
        let input_ids: HashSet<Uuid> = candidates.iter().map(|p| p.id).collect();

        let ranked = ranker.rank(candidates, None, None).await.unwrap();

        assert_eq!(ranked.len(), 20);
        let output_ids: HashSet<Uuid> = ranked.iter().map(|p| p.post.id).collect();
        assert_eq!(input_ids, output_ids);
    }

    #[tokio::test]
    async fn test_scores_descend() {
        let ranker = test_ranker();
        let candidates = vec![test_post(1, 0), test_post(1, 500), test_post(1, 50)];

        let ranked = ranker.rank(candidates, None, None).await.unwrap();

        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score - RankingConfig::default().epsilon);
        }
        assert_eq!(ranked[0].post.engagement.likes, 500);
    }

    #[tokio::test]
    async fn test_near_equal_scores_keep_retrieval_order() {
        let ranker = test_ranker();
        // Identical posts at identical age: identical scores except for the
        // diversity penalty, which only hits repeated authors/topics; distinct
        // authors with no tags score exactly equal.
        let candidates: Vec<_> = (0..6).map(|_| test_post(3, 10)).collect();
        let input_order: Vec<Uuid> = candidates.iter().map(|p| p.id).collect();

        let ranked = ranker.rank(candidates, None, None).await.unwrap();
        let output_order: Vec<Uuid> = ranked.iter().map(|p| p.post.id).collect();

        assert_eq!(input_order, output_order);
    }

    #[tokio::test]
    async fn test_graph_failure_degrades_to_unpersonalized_rank() {
        let mut graph = MockSocialGraph::new();
        graph
            .expect_following()
            .returning(|_| Err(FeedError::Upstream("graph down".to_string())));
        let mut profiles = MockProfileReader::new();
        profiles
            .expect_behavior_profile()
            .returning(|_| Err(FeedError::Upstream("profiles down".to_string())));
        let ranker = Ranker::new(
            Arc::new(graph),
            Arc::new(profiles),
            RankingConfig::default(),
        );

        let candidates = vec![test_post(1, 10), test_post(2, 20)];
        let ranked = ranker
            .rank(candidates, Some(Uuid::new_v4()), None)
            .await
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|p| p.score > 0.0));
    }

    #[tokio::test]
    async fn test_supplied_context_skips_lookups() {
        // Mocks with no expectations panic if called
        let graph = MockSocialGraph::new();
        let profiles = MockProfileReader::new();
        let ranker = Ranker::new(
            Arc::new(graph),
            Arc::new(profiles),
            RankingConfig::default(),
        );

        let ctx = ViewerContext::for_viewer(Uuid::new_v4());
        let ranked = ranker
            .rank(vec![test_post(1, 5)], ctx.viewer_id, Some(ctx))
            .await
            .unwrap();

        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_score_bucket_groups_near_equal() {
        assert_eq!(score_bucket(1.0000, 0.001), score_bucket(1.0004, 0.001));
        assert_ne!(score_bucket(1.0, 0.001), score_bucket(1.1, 0.001));
    }
}
