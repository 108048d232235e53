//! Page building
//!
//! The page protocol uses an N+1 overfetch: callers pull `limit + 1`
//! candidates, and the presence of the extra item is what sets `has_more`.
//! The extra item itself is dropped and never recorded as seen, so it
//! reappears on the next page.

pub mod cursor;
pub mod session;

pub use cursor::{decode_cursor, encode_cursor, FeedCursor};
pub use session::{FeedSession, MemorySessionStore, RedisSessionStore, SessionBackend, Sessions};

use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{FeedPage, FeedType, ScoredPost};
use crate::store::{CandidateQuery, CursorBoundary};

/// Translate cursor + session state into the store query for the next page.
///
/// Chronological feeds rely on the strictly-decreasing (ts, id) boundary;
/// ranked feeds additionally exclude everything the session has seen. The
/// limit includes the +1 overfetch.
pub fn candidate_query(
    feed: FeedType,
    limit: usize,
    cursor: Option<&FeedCursor>,
    session: Option<&FeedSession>,
) -> CandidateQuery {
    let mut query = CandidateQuery::new(feed, limit + 1);
    if let Some(cursor) = cursor {
        query.before = cursor.ts.map(|ts| CursorBoundary {
            ts,
            id: cursor.last_seen_id,
        });
    }
    if let Some(session) = session {
        query.exclude_ids = session.seen.iter().copied().collect();
    }
    query
}

/// Build one page of a ranked feed from candidates ordered by score.
///
/// Skips ids the session has already seen, de-duplicates the page by id as a
/// final safety net, truncates to `limit` (anything beyond it only drives
/// `has_more`), appends the returned ids to the session's seen-set, and
/// derives the next cursor — which carries the session id instead of an
/// ever-growing id list — from the last returned item.
pub fn build_page(candidates: Vec<ScoredPost>, limit: usize, session: &mut FeedSession) -> FeedPage {
    let mut page_ids: HashSet<Uuid> = HashSet::new();
    let mut items: Vec<ScoredPost> = Vec::with_capacity(limit + 1);

    for post in candidates {
        if session.seen.contains(&post.post.id) {
            continue;
        }
        if !page_ids.insert(post.post.id) {
            continue;
        }
        items.push(post);
        if items.len() > limit {
            break;
        }
    }

    let has_more = items.len() > limit;
    items.truncate(limit);

    // Only what is actually returned becomes "seen"; the dropped overfetch
    // item must surface on the next page.
    session.record_seen(items.iter().map(|p| &p.post.id));

    let next_cursor = if has_more {
        items
            .last()
            .map(|last| {
                encode_cursor(&FeedCursor::ranked(
                    last.post.id,
                    session.id,
                    last.post.created_at.timestamp(),
                ))
            })
    } else {
        None
    };
    session.last_cursor = next_cursor.clone();

    FeedPage {
        items,
        has_more,
        next_cursor,
        session_id: Some(session.id),
    }
}

/// Build one page of a chronological feed from candidates ordered newest
/// first. No session: the (ts, id) boundary cursor alone excludes earlier
/// pages.
pub fn build_chronological_page(candidates: Vec<ScoredPost>, limit: usize) -> FeedPage {
    let mut page_ids: HashSet<Uuid> = HashSet::new();
    let mut items: Vec<ScoredPost> = Vec::with_capacity(limit + 1);

    for post in candidates {
        if !page_ids.insert(post.post.id) {
            continue;
        }
        items.push(post);
        if items.len() > limit {
            break;
        }
    }

    let has_more = items.len() > limit;
    items.truncate(limit);

    let next_cursor = if has_more {
        items.last().map(|last| {
            encode_cursor(&FeedCursor::chronological(
                last.post.id,
                last.post.created_at.timestamp(),
            ))
        })
    } else {
        None
    };

    FeedPage {
        items,
        has_more,
        next_cursor,
        session_id: None,
    }
}
