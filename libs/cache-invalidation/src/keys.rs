//! Feed cache key helpers
//!
//! Key layout shared by the cache tiers and the invalidation path:
//! `feed:{viewer_id}:{feed}`.

use uuid::Uuid;

/// Build the cache key for one (viewer, feed) pair
///
/// # Example
///
/// ```
/// use cache_invalidation::feed_cache_key;
/// use uuid::Uuid;
///
/// let viewer = Uuid::nil();
/// let key = feed_cache_key(&viewer, "for_you");
/// assert_eq!(key, "feed:00000000-0000-0000-0000-000000000000:for_you");
/// ```
pub fn feed_cache_key(viewer_id: &Uuid, feed: &str) -> String {
    format!("feed:{}:{}", viewer_id, feed)
}

/// SCAN pattern matching every cached feed of a viewer
pub fn viewer_pattern(viewer_id: &Uuid) -> String {
    format!("feed:{}:*", viewer_id)
}

/// Parse a feed cache key back into (viewer_id, feed)
///
/// Returns `None` for keys that are not feed cache keys.
pub fn parse_feed_cache_key(key: &str) -> Option<(Uuid, &str)> {
    let rest = key.strip_prefix("feed:")?;
    let (viewer, feed) = rest.split_once(':')?;
    if feed.is_empty() {
        return None;
    }
    let viewer_id = Uuid::parse_str(viewer).ok()?;
    Some((viewer_id, feed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip() {
        let viewer = Uuid::new_v4();
        let key = feed_cache_key(&viewer, "following");

        let (parsed_viewer, parsed_feed) = parse_feed_cache_key(&key).unwrap();
        assert_eq!(parsed_viewer, viewer);
        assert_eq!(parsed_feed, "following");
    }

    #[test]
    fn test_viewer_pattern_matches_prefix() {
        let viewer = Uuid::new_v4();
        let pattern = viewer_pattern(&viewer);
        let key = feed_cache_key(&viewer, "explore");

        assert!(key.starts_with(pattern.trim_end_matches('*')));
    }

    #[test]
    fn test_parse_rejects_foreign_keys() {
        assert!(parse_feed_cache_key("post:123").is_none());
        assert!(parse_feed_cache_key("feed:not-a-uuid:for_you").is_none());
        assert!(parse_feed_cache_key("feed:").is_none());
        let viewer = Uuid::new_v4();
        assert!(parse_feed_cache_key(&format!("feed:{}:", viewer)).is_none());
    }
}
