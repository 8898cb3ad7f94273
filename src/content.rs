//! Content lifecycle rules: slug derivation and publish-state transitions.
//!
//! These are pure functions so the invariants (slug shape, `published_at`
//! stamping) can be tested without a database. Route handlers apply them
//! inside the transaction that performs the actual write.

use chrono::{DateTime, Utc};

use crate::db::models::PostStatus;

/// Derive a URL slug from a title: lowercase, every maximal run of
/// characters outside `[a-z0-9]` collapses to a single hyphen, and leading/
/// trailing hyphens are stripped.
///
/// `"Welcome to RippleWorks!"` becomes `"welcome-to-rippleworks"`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Slug to store after an update: regenerated only when the title actually
/// changed, so public URLs don't churn on content-only edits.
pub fn slug_for_update(existing_title: &str, existing_slug: &str, new_title: &str) -> String {
    if new_title != existing_title {
        slugify(new_title)
    } else {
        existing_slug.to_string()
    }
}

/// `published_at` value for a status transition.
///
/// - staying PUBLISHED keeps the original timestamp (re-saving a published
///   post never resets it)
/// - entering PUBLISHED stamps now()
/// - leaving PUBLISHED (or staying unpublished) clears it
pub fn published_at_for_transition(
    previous: PostStatus,
    previous_published_at: Option<DateTime<Utc>>,
    next: PostStatus,
) -> Option<DateTime<Utc>> {
    match (previous, next) {
        (PostStatus::Published, PostStatus::Published) => previous_published_at,
        (_, PostStatus::Published) => Some(Utc::now()),
        (_, PostStatus::Draft) => None,
    }
}

/// `published_at` for a newly created post: stamped only when the caller
/// asked for PUBLISHED up front.
pub fn published_at_for_creation(status: PostStatus) -> Option<DateTime<Utc>> {
    match status {
        PostStatus::Published => Some(Utc::now()),
        PostStatus::Draft => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Welcome to RippleWorks!"), "welcome-to-rippleworks");
    }

    #[test]
    fn test_slugify_collapses_runs_and_trims() {
        assert_eq!(slugify("  ---Multiple   Spaces!!!---  "), "multiple-spaces");
    }

    #[test]
    fn test_slugify_idempotent() {
        for title in [
            "Welcome to RippleWorks!",
            "  ---Multiple   Spaces!!!---  ",
            "Ünïcödé & Symbols #42",
            "already-a-slug",
            "",
        ] {
            let once = slugify(title);
            assert_eq!(slugify(&once), once, "slugify not idempotent for {title:?}");
        }
    }

    #[test]
    fn test_slugify_keeps_digits() {
        assert_eq!(slugify("Top 10 Tips for 2024"), "top-10-tips-for-2024");
    }

    #[test]
    fn test_slugify_all_symbols_yields_empty() {
        assert_eq!(slugify("!!! ???"), "");
    }

    #[test]
    fn test_slug_unchanged_when_title_unchanged() {
        let slug = slug_for_update("My Post", "my-post-old-slug", "My Post");
        assert_eq!(slug, "my-post-old-slug");
    }

    #[test]
    fn test_slug_regenerated_when_title_changes() {
        let slug = slug_for_update("My Post", "my-post", "My New Post");
        assert_eq!(slug, "my-new-post");
    }

    #[test]
    fn test_publish_stamps_timestamp() {
        let at = published_at_for_transition(PostStatus::Draft, None, PostStatus::Published);
        assert!(at.is_some());
    }

    #[test]
    fn test_republish_keeps_original_timestamp() {
        let original = Utc::now() - Duration::days(3);
        let at = published_at_for_transition(
            PostStatus::Published,
            Some(original),
            PostStatus::Published,
        );
        assert_eq!(at, Some(original));
    }

    #[test]
    fn test_unpublish_clears_timestamp() {
        let original = Utc::now() - Duration::days(3);
        let at = published_at_for_transition(
            PostStatus::Published,
            Some(original),
            PostStatus::Draft,
        );
        assert_eq!(at, None);
    }

    #[test]
    fn test_draft_to_draft_stays_clear() {
        let at = published_at_for_transition(PostStatus::Draft, None, PostStatus::Draft);
        assert_eq!(at, None);
    }

    #[test]
    fn test_creation_timestamp_follows_initial_status() {
        assert!(published_at_for_creation(PostStatus::Published).is_some());
        assert!(published_at_for_creation(PostStatus::Draft).is_none());
    }
}
