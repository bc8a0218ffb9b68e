//! Page construction.
//!
//! [`PageBuilder`] turns one fetched [`RawPage`] into a [`Page`]: entries
//! already in the window are dropped, the content policy is applied, replies
//! get their thread root and parent pulled in front of them, and long
//! threads are folded.

use crate::feed::filter::{FeedPolicy, FilterStats};
use crate::feed::stored_cids::StoredCids;
use crate::model::{
    Cid, Cursor, FoldedPostType, Post, PostType, RawEntry, RawPage, ThreadContext,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Threads spanning fewer rows than this stay unfolded.
const MIN_FOLD_SPAN: usize = 4;

/// A normalized page, ready to be merged into a window.
#[derive(Debug, Clone, Default)]
pub struct Page {
    posts: Vec<Post>,
    added_cids: HashSet<Cid>,
    parent_index: HashMap<Cid, usize>,
    cursor: Option<Cursor>,
    oldest_discarded_timestamp: Option<DateTime<Utc>>,
}

impl Page {
    /// Rows in display order.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// True when every entry was dropped.
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Cursor of the next page.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Oldest timeline timestamp among non-repost entries dropped because the
    /// window already holds them.
    pub fn oldest_discarded_timestamp(&self) -> Option<DateTime<Utc>> {
        self.oldest_discarded_timestamp
    }

    /// True when `cid` was added to this page.
    pub fn cid_added(&self, cid: &Cid) -> bool {
        self.added_cids.contains(cid)
    }

    /// Splits the page into its rows and cursor.
    pub fn into_parts(self) -> (Vec<Post>, Option<Cursor>) {
        (self.posts, self.cursor)
    }

    fn add_post(&mut self, post: Post, is_parent: bool) {
        if let Some(cid) = post.cid() {
            self.added_cids.insert(cid.clone());
            if is_parent {
                self.parent_index.insert(cid.clone(), self.posts.len());
            }
        }
        self.posts.push(post);
    }

    fn note_discarded(&mut self, timestamp: Option<DateTime<Utc>>) {
        let Some(timestamp) = timestamp else {
            return;
        };
        self.oldest_discarded_timestamp = Some(match self.oldest_discarded_timestamp {
            Some(oldest) => oldest.min(timestamp),
            None => timestamp,
        });
    }

    /// Replaces a parent row added earlier in this page with the full entry.
    ///
    /// Returns `false` when `post` is not a parent row of this page.
    fn try_add_to_existing_thread(
        &mut self,
        post: &Post,
        context: &ThreadContext,
        stored: &StoredCids,
    ) -> bool {
        let Some(cid) = post.cid() else {
            return false;
        };
        let Some(&index) = self.parent_index.get(cid) else {
            return false;
        };
        let Some(old) = self.posts.get(index) else {
            debug_assert!(false, "parent index {index} out of page bounds");
            warn!(index, len = self.posts.len(), "Parent index out of page bounds");
            return false;
        };

        let old_timestamp = old.timeline_timestamp();
        let old_type = old.post_type();
        let old_parent_in_thread = old.parent_in_thread();

        let mut promoted = post.clone();
        promoted.set_reply_ref_timestamp(old_timestamp);

        let root_cid = context.root.cid();
        let parent_cid = context.parent.cid();

        if parent_cid == root_cid {
            // The root is already the row above.
            promoted.set_post_type(old_type);
            promoted.set_parent_in_thread(true);
            self.posts[index] = promoted;
            return true;
        }

        self.parent_index.remove(cid);

        let parent_available = parent_cid
            .is_none_or(|parent_cid| !stored.contains(parent_cid) && !self.cid_added(parent_cid));

        if !parent_available {
            promoted.set_post_type(old_type);
            promoted.set_parent_in_thread(old_parent_in_thread);
            self.posts[index] = promoted;
            return true;
        }

        promoted.set_post_type(PostType::Reply);
        promoted.set_parent_in_thread(true);
        self.posts[index] = promoted;

        debug!(parent = ?parent_cid, index, "Adding parent of promoted thread row");
        let mut parent = context.parent.clone();
        parent.set_reply_ref_timestamp(old_timestamp);
        parent.set_post_type(old_type);
        if parent.reply_parent_cid().is_some() && parent.reply_parent_cid() == root_cid {
            parent.set_parent_in_thread(true);
        }
        self.posts.insert(index, parent);

        for row in self.parent_index.values_mut() {
            if *row >= index {
                *row += 1;
            }
        }
        if let Some(parent_cid) = parent_cid {
            self.added_cids.insert(parent_cid.clone());
            self.parent_index.insert(parent_cid.clone(), index);
        }
        true
    }

    fn mark_end_of_feed(&mut self) {
        if let Some(last) = self.posts.iter_mut().rev().find(|post| !post.is_placeholder()) {
            last.set_end_of_feed(true);
        }
    }

    fn fold_threads(&mut self) {
        let mut thread_start = None;

        for index in 0..self.posts.len() {
            match self.posts[index].post_type() {
                PostType::Root => thread_start = Some(index),
                PostType::LastReply => {
                    if let Some(start) = thread_start.take() {
                        self.fold_posts(start, index);
                    }
                }
                PostType::Reply | PostType::Standalone | PostType::Thread => {}
            }
        }
    }

    /// Keeps the root, the first reply and the last two rows visible.
    fn fold_posts(&mut self, start: usize, end: usize) {
        if end - start < MIN_FOLD_SPAN {
            return;
        }
        self.posts[start + 1].set_folded(FoldedPostType::First);
        for post in &mut self.posts[start + 2..end - 1] {
            post.set_folded(FoldedPostType::Subsequent);
        }
    }
}

/// Builds a [`Page`] against the window's current dedup set and policy.
pub struct PageBuilder<'a> {
    stored: &'a StoredCids,
    policy: &'a FeedPolicy,
    stats: &'a mut FilterStats,
}

impl<'a> PageBuilder<'a> {
    /// Creates a builder.
    ///
    /// # Arguments
    ///
    /// * `stored` - cids already in the window
    /// * `policy` - content and reply policy
    /// * `stats` - receives checked/hidden counts
    pub fn new(stored: &'a StoredCids, policy: &'a FeedPolicy, stats: &'a mut FilterStats) -> Self {
        Self {
            stored,
            policy,
            stats,
        }
    }

    /// Converts `raw` into a page.
    ///
    /// An empty result is valid: every entry may have been a duplicate or
    /// filtered out.
    pub fn build(mut self, raw: RawPage) -> Page {
        let assemble_threads = self.policy.preferences().assemble_threads;
        let mut page = Page::default();

        for entry in raw.entries {
            let feed_entry = match entry {
                RawEntry::Post(feed_entry) => feed_entry,
                RawEntry::Unsupported { record_type } => {
                    warn!(%record_type, "Unsupported record in feed");
                    page.add_post(Post::not_supported(record_type), false);
                    continue;
                }
            };

            let mut post = Post::from_feed_entry(feed_entry);
            let Some(cid) = post.cid().cloned() else {
                continue;
            };

            if self.stored.contains(&cid) {
                if !post.is_repost() {
                    page.note_discarded(post.timeline_timestamp());
                }
                continue;
            }

            self.stats.checked();
            if let Some(reason) = self.policy.must_hide_content(&post) {
                self.stats.report(reason);
                continue;
            }

            let context = post.thread_context();

            match context {
                Some(context) if !post.is_repost() => {
                    if assemble_threads
                        && page.try_add_to_existing_thread(&post, &context, self.stored)
                    {
                        continue;
                    }
                    if let Some(reason) = self.policy.must_hide_reply(&post, Some(&context)) {
                        self.stats.report(reason);
                        continue;
                    }
                    if page.cid_added(&cid) {
                        continue;
                    }
                    if assemble_threads {
                        self.add_thread_context(&mut page, &mut post, &context);
                    }
                }
                _ if post.is_reply() && !post.is_repost() => {
                    if let Some(reason) = self.policy.must_hide_reply(&post, None) {
                        self.stats.report(reason);
                        continue;
                    }
                    if page.cid_added(&cid) {
                        continue;
                    }
                }
                _ => {
                    if page.cid_added(&cid) {
                        continue;
                    }
                }
            }

            page.add_post(post, false);
        }

        match raw.next_cursor {
            Some(cursor) => page.cursor = Some(cursor),
            None => page.mark_end_of_feed(),
        }

        page.fold_threads();
        debug!(
            posts = page.len(),
            has_cursor = page.cursor.is_some(),
            "Built page"
        );
        page
    }

    /// Inserts the reply's root and parent in front of it.
    ///
    /// A parent that is already stored or added is not repeated, so the
    /// reply only joins the thread when its parent row lands right before it.
    fn add_thread_context(&mut self, page: &mut Page, post: &mut Post, context: &ThreadContext) {
        let root_cid = context.root.cid();
        let parent_cid = context.parent.cid();
        let mut root_added = false;

        if let Some(root_cid) = root_cid {
            if Some(root_cid) != parent_cid && self.is_new(page, root_cid) {
                self.stats.checked();
                match self.policy.must_hide_content(&context.root) {
                    None => {
                        let mut root = context.root.clone();
                        root.set_post_type(PostType::Root);
                        page.add_post(root, false);
                        root_added = true;
                    }
                    Some(reason) => self.stats.report(reason),
                }
            }
        }

        if let Some(parent_cid) = parent_cid {
            if self.is_new(page, parent_cid) {
                self.stats.checked();
                match self.policy.must_hide_content(&context.parent) {
                    None => {
                        let mut parent = context.parent.clone();
                        parent.set_post_type(if root_added {
                            PostType::Reply
                        } else {
                            PostType::Root
                        });
                        if parent.reply_parent_cid().is_some() && parent.reply_parent_cid() == root_cid {
                            if let Some(root_author) = context.root.author() {
                                parent.set_reply_to_author(root_author.clone());
                            }
                            parent.set_parent_in_thread(root_added);
                        }
                        page.add_post(parent, true);
                        post.set_post_type(PostType::LastReply);
                        post.set_parent_in_thread(true);
                        return;
                    }
                    Some(reason) => self.stats.report(reason),
                }
            }
        }
        // Parent not shown here: the reply stays standalone.
    }

    fn is_new(&self, page: &Page, cid: &Cid) -> bool {
        !self.stored.contains(cid) && !page.cid_added(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::filter::{FeedPreferences, HideReason};
    use crate::model::{FeedEntry, PostContent, RawEntry, ReplyElement};
    use crate::test_harness::*;

    fn build(raw: RawPage, stored: &StoredCids) -> Page {
        build_with(raw, stored, &FeedPolicy::default()).0
    }

    fn build_with(raw: RawPage, stored: &StoredCids, policy: &FeedPolicy) -> (Page, FilterStats) {
        let mut stats = FilterStats::default();
        let page = PageBuilder::new(stored, policy, &mut stats).build(raw);
        (page, stats)
    }

    fn cids(page: &Page) -> Vec<String> {
        page.posts()
            .iter()
            .map(|post| post.cid().map(|c| c.to_string()).unwrap_or_else(|| "-".into()))
            .collect()
    }

    // ===== Dedup =====

    #[test]
    fn stored_entries_are_skipped_and_noted() {
        let mut stored = StoredCids::new(100);
        stored.store(cid("b"));

        let page = build(page(&[("a", 10), ("b", 9), ("c", 8)], Some("n")), &stored);

        assert_eq!(cids(&page), vec!["a", "c"]);
        assert_eq!(page.oldest_discarded_timestamp(), Some(at(9)));
    }

    #[test]
    fn stored_repost_is_skipped_without_discard_note() {
        let mut stored = StoredCids::new(100);
        stored.store(cid("a"));

        let page = build(page_of(vec![repost("a", 1, "bob", 20)], Some("n")), &stored);

        assert!(page.is_empty());
        assert_eq!(page.oldest_discarded_timestamp(), None);
    }

    #[test]
    fn repost_and_original_in_same_page_keep_first() {
        let stored = StoredCids::new(100);
        let page = build(
            page_of(vec![repost("a", 1, "bob", 20), entry("a", 1)], Some("n")),
            &stored,
        );
        assert_eq!(page.len(), 1);
        assert!(page.posts()[0].is_repost());
    }

    // ===== Placeholders and cursor =====

    #[test]
    fn unsupported_entry_becomes_placeholder() {
        let stored = StoredCids::new(100);
        let raw = RawPage::new(
            vec![
                RawEntry::Post(entry("a", 10)),
                RawEntry::Unsupported {
                    record_type: "app.bsky.feed.generator".into(),
                },
            ],
            Some(cursor("n")),
        );

        let page = build(raw, &stored);

        assert_eq!(page.len(), 2);
        assert!(matches!(
            page.posts()[1].content(),
            PostContent::NotSupported { record_type } if record_type == "app.bsky.feed.generator"
        ));
    }

    #[test]
    fn missing_cursor_flags_last_real_post() {
        let stored = StoredCids::new(100);
        let raw = RawPage::new(
            vec![
                RawEntry::Post(entry("a", 10)),
                RawEntry::Post(entry("b", 9)),
                RawEntry::Unsupported {
                    record_type: "x".into(),
                },
            ],
            None,
        );

        let page = build(raw, &stored);

        assert!(page.cursor().is_none());
        assert!(!page.posts()[0].end_of_feed());
        assert!(page.posts()[1].end_of_feed());
        assert!(!page.posts()[2].end_of_feed());
    }

    #[test]
    fn cursor_is_carried_over() {
        let stored = StoredCids::new(100);
        let page = build(page(&[("a", 10)], Some("next")), &stored);
        assert_eq!(page.cursor().map(Cursor::as_str), Some("next"));
        assert!(!page.posts()[0].end_of_feed());
    }

    // ===== Thread reconstruction =====

    #[test]
    fn reply_gets_root_and_parent_in_front() {
        // GIVEN reply r (t=30) to p (t=2) in the thread of x (t=1)
        let root = view("x", 1);
        let parent = as_reply(view("p", 2), &root, &root);
        let stored = StoredCids::new(100);

        // WHEN the page is built
        let page = build(page_of(vec![reply_entry("r", 30, &root, &parent)], Some("n")), &stored);

        // THEN root, parent, reply appear in thread order with the reply's timestamp
        assert_eq!(cids(&page), vec!["x", "p", "r"]);
        let types: Vec<_> = page.posts().iter().map(Post::post_type).collect();
        assert_eq!(types, vec![PostType::Root, PostType::Reply, PostType::LastReply]);
        assert!(page.posts().iter().all(|p| p.timeline_timestamp() == Some(at(30))));
        assert!(page.posts()[1].parent_in_thread());
        assert!(page.posts()[2].parent_in_thread());
        assert_eq!(
            page.posts()[1].reply_to_author().map(|a| a.handle.as_str()),
            Some("alice.test")
        );
    }

    #[test]
    fn stored_root_is_not_repeated() {
        let root = view("x", 1);
        let parent = as_reply(view("p", 2), &root, &root);
        let mut stored = StoredCids::new(100);
        stored.store(cid("x"));

        let page = build(page_of(vec![reply_entry("r", 30, &root, &parent)], Some("n")), &stored);

        assert_eq!(cids(&page), vec!["p", "r"]);
        assert_eq!(page.posts()[0].post_type(), PostType::Root);
        assert!(!page.posts()[0].parent_in_thread());
    }

    #[test]
    fn reply_stays_standalone_when_parent_is_stored() {
        // GIVEN p (a reply to root x) is already stored
        let root = view("x", 1);
        let parent = as_reply(view("p", 2), &root, &root);
        let mut stored = StoredCids::new(100);
        stored.store(cid("p"));

        // WHEN reply r to p arrives with the unseen root x
        let page = build(page_of(vec![reply_entry("r", 30, &root, &parent)], Some("n")), &stored);

        // THEN the root comes in but r does not close a thread under it
        assert_eq!(cids(&page), vec!["x", "r"]);
        assert_eq!(page.posts()[0].post_type(), PostType::Root);
        assert_eq!(page.posts()[1].post_type(), PostType::Standalone);
        assert!(!page.posts()[1].parent_in_thread());
    }

    #[test]
    fn direct_reply_to_root_adds_root_as_parent() {
        let root = view("x", 1);
        let stored = StoredCids::new(100);

        let page = build(page_of(vec![reply_entry("r", 30, &root, &root)], Some("n")), &stored);

        assert_eq!(cids(&page), vec!["x", "r"]);
        assert_eq!(page.posts()[0].post_type(), PostType::Root);
        assert_eq!(page.posts()[1].post_type(), PostType::LastReply);
    }

    #[test]
    fn thread_assembly_can_be_disabled() {
        let root = view("x", 1);
        let stored = StoredCids::new(100);
        let policy = FeedPolicy::new(
            None,
            FeedPreferences {
                assemble_threads: false,
                ..FeedPreferences::default()
            },
        );

        let (page, _) = build_with(
            page_of(vec![reply_entry("r", 30, &root, &root)], Some("n")),
            &stored,
            &policy,
        );

        assert_eq!(cids(&page), vec!["r"]);
        assert_eq!(page.posts()[0].post_type(), PostType::Standalone);
    }

    #[test]
    fn parent_row_is_promoted_in_place() {
        // GIVEN reply r to p (p replies to root x), then p itself as entry
        let root = view("x", 1);
        let parent = as_reply(view("p", 2), &root, &root);
        let p_entry = FeedEntry::new(parent.clone()).with_reply_context(
            ReplyElement::Post(root.clone()),
            ReplyElement::Post(root.clone()),
        );
        let stored = StoredCids::new(100);

        // WHEN both arrive in one page
        let page = build(
            page_of(vec![reply_entry("r", 30, &root, &parent), p_entry], Some("n")),
            &stored,
        );

        // THEN p is not duplicated and keeps its thread role
        assert_eq!(cids(&page), vec!["x", "p", "r"]);
        assert_eq!(page.posts()[1].post_type(), PostType::Reply);
        assert!(page.posts()[1].parent_in_thread());
        assert_eq!(page.posts()[1].timeline_timestamp(), Some(at(30)));
        assert!(matches!(page.posts()[1].content(), PostContent::FeedEntry(_)));
    }

    #[test]
    fn promoted_parent_pulls_in_its_own_parent() {
        // GIVEN root x already stored, reply r to p, then p (reply to q) as entry
        let root = view("x", 1);
        let q = as_reply(view("q", 2), &root, &root);
        let p = as_reply(view("p", 3), &root, &q);
        let p_entry = FeedEntry::new(p.clone())
            .with_reply_context(ReplyElement::Post(root.clone()), ReplyElement::Post(q.clone()));
        let mut stored = StoredCids::new(100);
        stored.store(cid("x"));

        // WHEN the page is built
        let page = build(
            page_of(vec![reply_entry("r", 30, &root, &p), p_entry], Some("n")),
            &stored,
        );

        // THEN q is inserted in front of p and takes over the root role
        assert_eq!(cids(&page), vec!["q", "p", "r"]);
        assert_eq!(page.posts()[0].post_type(), PostType::Root);
        assert!(page.posts()[0].parent_in_thread());
        assert_eq!(page.posts()[1].post_type(), PostType::Reply);
        assert!(page.posts()[1].parent_in_thread());
        assert_eq!(page.posts()[2].post_type(), PostType::LastReply);
    }

    #[test]
    fn reposted_reply_has_no_thread_context() {
        let root = view("x", 1);
        let stored = StoredCids::new(100);
        let reposted = reply_entry("r", 30, &root, &root).reposted_by(author("bob"), at(40));

        let page = build(page_of(vec![reposted], Some("n")), &stored);

        assert_eq!(cids(&page), vec!["r"]);
        assert_eq!(page.posts()[0].timeline_timestamp(), Some(at(40)));
    }

    // ===== Policy =====

    #[test]
    fn hidden_entries_are_counted() {
        let stored = StoredCids::new(100);
        let policy = FeedPolicy::new(
            None,
            FeedPreferences {
                hide_reposts: true,
                ..FeedPreferences::default()
            },
        );

        let (page, stats) = build_with(
            page_of(vec![entry("a", 10), repost("b", 5, "bob", 9)], Some("n")),
            &stored,
            &policy,
        );

        assert_eq!(cids(&page), vec!["a"]);
        assert_eq!(stats.checked_count(), 2);
        assert_eq!(stats.hidden_count(HideReason::Repost), 1);
    }

    #[test]
    fn hidden_replies_are_dropped() {
        let root = view("x", 1);
        let stored = StoredCids::new(100);
        let policy = FeedPolicy::new(
            None,
            FeedPreferences {
                hide_replies: true,
                ..FeedPreferences::default()
            },
        );

        let (page, stats) = build_with(
            page_of(vec![reply_entry("r", 30, &root, &root), entry("a", 20)], Some("n")),
            &stored,
            &policy,
        );

        assert_eq!(cids(&page), vec!["a"]);
        assert_eq!(stats.hidden_count(HideReason::Reply), 1);
    }

    // ===== Folding =====

    #[test]
    fn long_thread_is_folded() {
        let mut page = Page::default();
        let types = [
            PostType::Root,
            PostType::Reply,
            PostType::Reply,
            PostType::Reply,
            PostType::Reply,
            PostType::LastReply,
        ];
        for (n, post_type) in types.iter().enumerate() {
            let mut post = Post::standalone(view(&format!("t{n}"), 10));
            post.set_post_type(*post_type);
            page.add_post(post, false);
        }

        page.fold_threads();

        let folded: Vec<_> = page.posts().iter().map(Post::folded).collect();
        assert_eq!(
            folded,
            vec![
                FoldedPostType::None,
                FoldedPostType::First,
                FoldedPostType::Subsequent,
                FoldedPostType::Subsequent,
                FoldedPostType::None,
                FoldedPostType::None,
            ]
        );
    }

    #[test]
    fn short_thread_is_not_folded() {
        let mut page = Page::default();
        for (n, post_type) in [PostType::Root, PostType::Reply, PostType::LastReply]
            .iter()
            .enumerate()
        {
            let mut post = Post::standalone(view(&format!("t{n}"), 10));
            post.set_post_type(*post_type);
            page.add_post(post, false);
        }

        page.fold_threads();

        assert!(page.posts().iter().all(|p| p.folded() == FoldedPostType::None));
    }
}
