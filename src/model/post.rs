//! Normalized timeline rows.
//!
//! A [`Post`] is either a real post (backed by a fetched [`FeedEntry`] or by a
//! post view taken from a reply context) or one of several placeholders. The
//! content is immutable and shared; page construction decorates it with
//! thread display state.

use crate::model::feed_entry::{
    Author, Embed, FeedEntry, Label, PostView, Reason, ReplyElement,
};
use crate::model::identifiers::{Cid, Cursor, GapId, PostUri};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Role of a row in thread display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PostType {
    /// Not part of an assembled thread.
    #[default]
    Standalone,
    /// First row of an assembled thread.
    Root,
    /// Middle row of an assembled thread.
    Reply,
    /// Row that closes an assembled thread.
    LastReply,
    /// Row of a full thread view.
    Thread,
}

/// Fold state of a row inside a long assembled thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FoldedPostType {
    /// Shown normally.
    #[default]
    None,
    /// First hidden row; shown as the fold handle.
    First,
    /// Further hidden rows.
    Subsequent,
}

/// What a row holds.
#[derive(Debug, Clone, PartialEq)]
pub enum PostContent {
    /// A fetched timeline entry.
    FeedEntry(Arc<FeedEntry>),
    /// A post pulled in from a reply context (thread root or parent).
    Standalone(Arc<PostView>),
    /// Unfetched range between two pages.
    Gap {
        /// Window-unique id.
        gap_id: GapId,
        /// Cursor that fetches the missing range.
        cursor: Option<Cursor>,
    },
    /// Thread element that no longer exists.
    NotFound {
        /// URI, when known.
        uri: Option<PostUri>,
    },
    /// Thread element hidden by a block.
    Blocked {
        /// URI, when known.
        uri: Option<PostUri>,
    },
    /// Entry whose record type cannot be displayed.
    NotSupported {
        /// Raw record type.
        record_type: String,
    },
}

/// Root and parent of a reply, converted into rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadContext {
    /// Thread root.
    pub root: Post,
    /// Direct parent.
    pub parent: Post,
}

/// One row of a feed window.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    content: PostContent,
    post_type: PostType,
    folded: FoldedPostType,
    parent_in_thread: bool,
    end_of_feed: bool,
    reply_ref_timestamp: Option<DateTime<Utc>>,
    reply_to_author: Option<Author>,
}

impl Post {
    fn with_content(content: PostContent) -> Self {
        Self {
            content,
            post_type: PostType::Standalone,
            folded: FoldedPostType::None,
            parent_in_thread: false,
            end_of_feed: false,
            reply_ref_timestamp: None,
            reply_to_author: None,
        }
    }

    /// Row for a fetched feed entry.
    pub fn from_feed_entry(entry: FeedEntry) -> Self {
        Self::with_content(PostContent::FeedEntry(Arc::new(entry)))
    }

    /// Row for a post view outside a feed entry.
    pub fn standalone(view: PostView) -> Self {
        Self::with_content(PostContent::Standalone(Arc::new(view)))
    }

    /// Gap placeholder.
    pub fn gap(gap_id: GapId, cursor: Option<Cursor>) -> Self {
        Self::with_content(PostContent::Gap { gap_id, cursor })
    }

    /// Placeholder for a missing thread element.
    pub fn not_found(uri: Option<PostUri>) -> Self {
        Self::with_content(PostContent::NotFound { uri })
    }

    /// Placeholder for a blocked thread element.
    pub fn blocked(uri: Option<PostUri>) -> Self {
        Self::with_content(PostContent::Blocked { uri })
    }

    /// Placeholder for an undisplayable record type.
    pub fn not_supported(record_type: impl Into<String>) -> Self {
        Self::with_content(PostContent::NotSupported {
            record_type: record_type.into(),
        })
    }

    fn from_reply_element(element: &ReplyElement) -> Self {
        match element {
            ReplyElement::Post(view) => Self::standalone(view.clone()),
            ReplyElement::NotFound { uri } => Self::not_found(Some(uri.clone())),
            ReplyElement::Blocked { uri } => Self::blocked(Some(uri.clone())),
        }
    }

    // ===== Content =====

    /// The row's content.
    pub fn content(&self) -> &PostContent {
        &self.content
    }

    /// Post view backing a real post.
    pub fn post_view(&self) -> Option<&PostView> {
        match &self.content {
            PostContent::FeedEntry(entry) => Some(&entry.post),
            PostContent::Standalone(view) => Some(view),
            PostContent::Gap { .. }
            | PostContent::NotFound { .. }
            | PostContent::Blocked { .. }
            | PostContent::NotSupported { .. } => None,
        }
    }

    /// True for every row that is not backed by a post view.
    pub fn is_placeholder(&self) -> bool {
        self.post_view().is_none()
    }

    /// True for gap placeholders.
    pub fn is_gap(&self) -> bool {
        matches!(self.content, PostContent::Gap { .. })
    }

    /// Gap id of a gap placeholder.
    pub fn gap_id(&self) -> Option<GapId> {
        match &self.content {
            PostContent::Gap { gap_id, .. } => Some(*gap_id),
            _ => None,
        }
    }

    /// Cursor of a gap placeholder.
    pub fn gap_cursor(&self) -> Option<&Cursor> {
        match &self.content {
            PostContent::Gap { cursor, .. } => cursor.as_ref(),
            _ => None,
        }
    }

    /// Content identifier; `None` for placeholders.
    pub fn cid(&self) -> Option<&Cid> {
        self.post_view().map(|view| &view.cid)
    }

    /// Record URI; `None` for gaps and not-supported rows.
    pub fn uri(&self) -> Option<&PostUri> {
        match &self.content {
            PostContent::NotFound { uri } | PostContent::Blocked { uri } => uri.as_ref(),
            _ => self.post_view().map(|view| &view.uri),
        }
    }

    /// Author of a real post.
    pub fn author(&self) -> Option<&Author> {
        self.post_view().map(|view| &view.author)
    }

    /// Body text; empty for placeholders.
    pub fn text(&self) -> &str {
        self.post_view()
            .map(|view| view.record.text.as_str())
            .unwrap_or_default()
    }

    /// Time the backend indexed the post.
    pub fn indexed_at(&self) -> Option<DateTime<Utc>> {
        self.post_view().map(|view| view.indexed_at)
    }

    /// Moderation labels.
    pub fn labels(&self) -> &[Label] {
        self.post_view()
            .map(|view| view.labels.as_slice())
            .unwrap_or_default()
    }

    /// Embedded media or quote.
    pub fn embed(&self) -> Option<&Embed> {
        self.post_view().and_then(|view| view.embed.as_ref())
    }

    fn reason(&self) -> Option<&Reason> {
        match &self.content {
            PostContent::FeedEntry(entry) => entry.reason.as_ref(),
            _ => None,
        }
    }

    /// True when the entry appears because someone reposted it.
    pub fn is_repost(&self) -> bool {
        matches!(self.reason(), Some(Reason::Repost { .. }))
    }

    /// Reposting account.
    pub fn reposted_by(&self) -> Option<&Author> {
        match self.reason() {
            Some(Reason::Repost { by, .. }) => Some(by),
            _ => None,
        }
    }

    /// Time of the repost.
    pub fn repost_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.reason() {
            Some(Reason::Repost { indexed_at, .. }) => Some(*indexed_at),
            _ => None,
        }
    }

    /// The timestamp the feed is ordered by.
    ///
    /// Thread context rows borrow their reply's timestamp; reposts sort by
    /// repost time; everything else by indexed time. `None` for placeholders.
    pub fn timeline_timestamp(&self) -> Option<DateTime<Utc>> {
        let view = self.post_view()?;
        Some(
            self.reply_ref_timestamp
                .or_else(|| self.repost_timestamp())
                .unwrap_or(view.indexed_at),
        )
    }

    /// True when the record is a reply.
    pub fn is_reply(&self) -> bool {
        self.post_view()
            .is_some_and(|view| view.record.reply.is_some())
    }

    /// Cid of the thread root this post replies in.
    pub fn reply_root_cid(&self) -> Option<&Cid> {
        self.post_view()
            .and_then(|view| view.record.reply.as_ref())
            .map(|reply| &reply.root.cid)
    }

    /// Cid of the post this post replies to.
    pub fn reply_parent_cid(&self) -> Option<&Cid> {
        self.post_view()
            .and_then(|view| view.record.reply.as_ref())
            .map(|reply| &reply.parent.cid)
    }

    /// Hydrated thread context of a reply entry.
    ///
    /// The returned rows carry this post's timeline timestamp so that they
    /// sort next to it.
    pub fn thread_context(&self) -> Option<ThreadContext> {
        let PostContent::FeedEntry(entry) = &self.content else {
            return None;
        };
        let reply = entry.reply.as_ref()?;
        let timestamp = self.timeline_timestamp();

        let mut root = Self::from_reply_element(&reply.root);
        root.reply_ref_timestamp = timestamp;
        let mut parent = Self::from_reply_element(&reply.parent);
        parent.reply_ref_timestamp = timestamp;

        Some(ThreadContext { root, parent })
    }

    /// Reply count as fetched.
    pub fn reply_count(&self) -> i64 {
        self.post_view().map_or(0, |view| view.reply_count)
    }

    /// Repost count as fetched.
    pub fn repost_count(&self) -> i64 {
        self.post_view().map_or(0, |view| view.repost_count)
    }

    /// Like count as fetched.
    pub fn like_count(&self) -> i64 {
        self.post_view().map_or(0, |view| view.like_count)
    }

    /// Quote count as fetched.
    pub fn quote_count(&self) -> i64 {
        self.post_view().map_or(0, |view| view.quote_count)
    }

    /// URI of the acting user's repost, as fetched.
    pub fn viewer_repost_uri(&self) -> Option<&str> {
        self.post_view()
            .and_then(|view| view.viewer.repost.as_deref())
    }

    /// URI of the acting user's like, as fetched.
    pub fn viewer_like_uri(&self) -> Option<&str> {
        self.post_view().and_then(|view| view.viewer.like.as_deref())
    }

    // ===== Decorations =====

    /// Thread display role.
    pub fn post_type(&self) -> PostType {
        self.post_type
    }

    /// Sets the thread display role.
    pub fn set_post_type(&mut self, post_type: PostType) {
        self.post_type = post_type;
    }

    /// Fold state.
    pub fn folded(&self) -> FoldedPostType {
        self.folded
    }

    /// Sets the fold state.
    pub fn set_folded(&mut self, folded: FoldedPostType) {
        self.folded = folded;
    }

    /// True when the previous row is this row's parent.
    pub fn parent_in_thread(&self) -> bool {
        self.parent_in_thread
    }

    /// Sets the parent-in-thread flag.
    pub fn set_parent_in_thread(&mut self, parent_in_thread: bool) {
        self.parent_in_thread = parent_in_thread;
    }

    /// True on the last real row when the backend has no further pages.
    pub fn end_of_feed(&self) -> bool {
        self.end_of_feed
    }

    /// Sets the end-of-feed marker.
    pub fn set_end_of_feed(&mut self, end_of_feed: bool) {
        self.end_of_feed = end_of_feed;
    }

    /// Timestamp borrowed from the reply that pulled this row in.
    pub fn reply_ref_timestamp(&self) -> Option<DateTime<Utc>> {
        self.reply_ref_timestamp
    }

    /// Sets the borrowed timestamp.
    pub fn set_reply_ref_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.reply_ref_timestamp = timestamp;
    }

    /// Author of the post this row replies to, when known from thread
    /// assembly.
    pub fn reply_to_author(&self) -> Option<&Author> {
        self.reply_to_author.as_ref()
    }

    /// Records the author replied to.
    pub fn set_reply_to_author(&mut self, author: Author) {
        self.reply_to_author = Some(author);
    }
}
