//! Join point detection between a fetched page and the window.
//!
//! Matching is on `(cid, timeline timestamp)` because a repost shares the
//! original's cid, and thread context rows carry the timestamp of the reply
//! that pulled them in.

use crate::feed::page::Page;
use crate::model::Post;
use tracing::debug;

/// Result of [`find_overlap_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlapStart {
    /// Number of leading page posts that are new, or `None` when the whole
    /// page precedes the window at this point.
    pub index: Option<usize>,
    /// The page dropped an already stored post older than the window anchor,
    /// so the page reaches into held data even without a visible match.
    pub overlaps_discarded: bool,
}

fn anchor(posts: &[Post], index: usize) -> Option<&Post> {
    posts
        .get(index..)
        .unwrap_or_default()
        .iter()
        .find(|post| !post.is_placeholder())
}

fn same_row(a: &Post, b: &Post) -> bool {
    a.cid().is_some() && a.cid() == b.cid() && a.timeline_timestamp() == b.timeline_timestamp()
}

/// Finds where `page` joins the window rows starting at `index`.
///
/// The anchor is the first real post at or after `index`. The page is scanned
/// from its start for the anchor itself or the first post strictly older
/// than it. Page placeholders have no timestamp and are passed over. When neither exists the page may still end right before the
/// anchor; that cannot be told apart from a real gap and is reported as one.
pub fn find_overlap_start(posts: &[Post], page: &Page, index: usize) -> OverlapStart {
    let Some(anchor) = anchor(posts, index) else {
        debug!(index, "No real posts to overlap with");
        return OverlapStart::default();
    };
    let anchor_timestamp = anchor.timeline_timestamp();

    let overlaps_discarded = match (page.oldest_discarded_timestamp(), anchor_timestamp) {
        (Some(discarded), Some(anchor)) => discarded < anchor,
        _ => false,
    };

    let real_posts = page
        .posts()
        .iter()
        .enumerate()
        .filter(|(_, post)| !post.is_placeholder());

    for (page_index, post) in real_posts {
        if same_row(anchor, post) {
            debug!(page_index, "Matching overlap start");
            return OverlapStart {
                index: Some(page_index),
                overlaps_discarded,
            };
        }

        if anchor_timestamp > post.timeline_timestamp() {
            debug!(page_index, "Overlap start on timestamp");
            return OverlapStart {
                index: Some(page_index),
                overlaps_discarded,
            };
        }
    }

    debug!("No overlap found, there is a gap");
    OverlapStart {
        index: None,
        overlaps_discarded,
    }
}

/// Finds the window row, at or after `index`, where the page's last real
/// post lines up or first is not newer than a window post.
///
/// Returns `None` when the page reaches past the end of the window.
pub fn find_overlap_end(posts: &[Post], page: &Page, index: usize) -> Option<usize> {
    let last = page.posts().iter().rev().find(|post| !post.is_placeholder())?;
    let last_timestamp = last.timeline_timestamp();

    let found = posts
        .iter()
        .enumerate()
        .skip(index)
        .filter(|(_, post)| !post.is_placeholder())
        .find(|(_, post)| same_row(last, post) || last_timestamp >= post.timeline_timestamp())
        .map(|(window_index, _)| window_index);

    match found {
        Some(window_index) => debug!(window_index, "Overlap end found"),
        None => debug!("Page exceeds end of window"),
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::filter::{FeedPolicy, FilterStats};
    use crate::feed::page::PageBuilder;
    use crate::feed::stored_cids::StoredCids;
    use crate::model::{GapId, RawEntry, RawPage};
    use crate::test_harness::*;

    fn rows(posts: &[(&str, i64)]) -> Vec<Post> {
        posts
            .iter()
            .map(|(id, secs)| Post::from_feed_entry(entry(id, *secs)))
            .collect()
    }

    fn build(raw: RawPage, stored: &StoredCids) -> Page {
        let policy = FeedPolicy::default();
        let mut stats = FilterStats::default();
        PageBuilder::new(stored, &policy, &mut stats).build(raw)
    }

    #[test]
    fn exact_match_gives_overlap_length() {
        let window = rows(&[("c", 8)]);
        let page = build(page(&[("z", 12), ("y", 11), ("c", 8)], Some("n")), &StoredCids::new(10));

        let start = find_overlap_start(&window, &page, 0);

        assert_eq!(start.index, Some(2));
        assert!(!start.overlaps_discarded);
    }

    #[test]
    fn older_page_post_marks_overlap() {
        let window = rows(&[("a", 10)]);
        let page = build(page(&[("z", 12), ("q", 9)], Some("n")), &StoredCids::new(10));

        assert_eq!(find_overlap_start(&window, &page, 0).index, Some(1));
    }

    #[test]
    fn page_fully_newer_is_a_gap() {
        let window = rows(&[("a", 10)]);
        let page = build(page(&[("z", 12), ("y", 11)], Some("n")), &StoredCids::new(10));

        assert_eq!(find_overlap_start(&window, &page, 0).index, None);
    }

    #[test]
    fn repost_of_anchor_with_other_timestamp_does_not_match() {
        let window = rows(&[("a", 10)]);
        let page = build(
            page_of(vec![repost("a", 10, "bob", 12)], Some("n")),
            &StoredCids::new(10),
        );

        assert_eq!(find_overlap_start(&window, &page, 0).index, None);
    }

    #[test]
    fn placeholders_are_skipped_for_anchor() {
        let mut window = vec![Post::gap(GapId::new(1).unwrap(), None)];
        window.extend(rows(&[("a", 10)]));
        let page = build(page(&[("a", 10)], Some("n")), &StoredCids::new(10));

        assert_eq!(find_overlap_start(&window, &page, 0).index, Some(0));
    }

    fn with_unsupported(entries: Vec<RawEntry>) -> Page {
        build(RawPage::new(entries, Some(cursor("n"))), &StoredCids::new(10))
    }

    fn unsupported() -> RawEntry {
        RawEntry::Unsupported {
            record_type: "app.bsky.feed.generator".to_string(),
        }
    }

    #[test]
    fn unsupported_page_rows_are_not_older_than_anchor() {
        // GIVEN a window anchored at a@10
        let window = rows(&[("a", 10)]);

        // WHEN the page holds only newer posts around an unsupported record
        let head = with_unsupported(vec![
            unsupported(),
            RawEntry::Post(entry("z", 12)),
            RawEntry::Post(entry("y", 11)),
        ]);
        let middle = with_unsupported(vec![
            RawEntry::Post(entry("z", 12)),
            unsupported(),
            RawEntry::Post(entry("y", 11)),
        ]);

        // THEN the placeholder does not count as an overlap
        assert_eq!(find_overlap_start(&window, &head, 0).index, None);
        assert_eq!(find_overlap_start(&window, &middle, 0).index, None);
    }

    #[test]
    fn unsupported_page_row_before_older_post_is_kept() {
        let window = rows(&[("a", 10)]);
        let page = with_unsupported(vec![
            RawEntry::Post(entry("z", 12)),
            unsupported(),
            RawEntry::Post(entry("q", 9)),
        ]);

        assert_eq!(find_overlap_start(&window, &page, 0).index, Some(2));
    }

    #[test]
    fn overlap_end_uses_last_real_page_post() {
        // GIVEN [a@10, b@9, c@8]
        let window = rows(&[("a", 10), ("b", 9), ("c", 8)]);

        // WHEN the page ends on b@9 followed by an unsupported record
        let page = with_unsupported(vec![
            RawEntry::Post(entry("a", 10)),
            RawEntry::Post(entry("b", 9)),
            unsupported(),
        ]);

        // THEN the end lines up with b
        assert_eq!(find_overlap_end(&window, &page, 0), Some(1));
    }

    #[test]
    fn discarded_older_post_is_reported() {
        // GIVEN b@5 is stored and the window anchor is a@10
        let window = rows(&[("a", 10)]);
        let mut stored = StoredCids::new(10);
        stored.store(cid("b"));

        // WHEN the page holds z@12 and the stored b@5
        let page = build(page(&[("z", 12), ("b", 5)], Some("n")), &stored);

        // THEN no overlap is visible but the discarded post is flagged
        let start = find_overlap_start(&window, &page, 0);
        assert_eq!(start.index, None);
        assert!(start.overlaps_discarded);
    }

    #[test]
    fn no_real_posts_means_no_overlap() {
        let window = vec![Post::gap(GapId::new(1).unwrap(), None)];
        let page = build(page(&[("a", 10)], Some("n")), &StoredCids::new(10));

        assert_eq!(find_overlap_start(&window, &page, 0), OverlapStart::default());
    }

    #[test]
    fn overlap_end_finds_matching_row() {
        let window = rows(&[("a", 10), ("b", 9), ("c", 8)]);
        let page = build(page(&[("a", 10), ("b", 9)], Some("n")), &StoredCids::new(10));

        assert_eq!(find_overlap_end(&window, &page, 0), Some(1));
    }

    #[test]
    fn overlap_end_finds_first_row_not_newer() {
        let window = rows(&[("a", 10), ("c", 8)]);
        let page = build(page(&[("a", 10), ("q", 9)], Some("n")), &StoredCids::new(10));

        assert_eq!(find_overlap_end(&window, &page, 0), Some(1));
    }

    #[test]
    fn overlap_end_none_past_window() {
        let window = rows(&[("a", 10)]);
        let page = build(page(&[("a", 10), ("q", 3)], Some("n")), &StoredCids::new(10));

        assert_eq!(find_overlap_end(&window, &page, 0), None);
    }
}
