//! Read-time composition of a row with its local edits.

use crate::model::{
    Author, Cid, Did, Embed, FoldedPostType, GapId, Label, LocalChange, Post, PostContent,
    PostType, PostUri,
};
use chrono::{DateTime, Utc};

/// What a list view shows for one row.
///
/// Counters and URIs already include local edits; the stored [`Post`] is
/// never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayPost {
    /// The row as stored.
    pub post: Post,
    /// Fetched reply count plus local delta.
    pub reply_count: i64,
    /// Fetched repost count plus local delta.
    pub repost_count: i64,
    /// Fetched like count plus local delta.
    pub like_count: i64,
    /// Fetched quote count plus local delta.
    pub quote_count: i64,
    /// The user's repost of this post, if any.
    pub repost_uri: Option<String>,
    /// The user's like of this post, if any.
    pub like_uri: Option<String>,
    /// Hidden by a local action.
    pub locally_deleted: bool,
}

impl DisplayPost {
    /// Composes `post` with its local edits.
    ///
    /// A URI override replaces the fetched URI, an empty override means the
    /// like or repost was undone. A row also counts as deleted when it shows
    /// the acting user's own repost and that repost has since changed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use skyfeed::feed::DisplayPost;
    /// # use skyfeed::model::{Author, Cid, Did, LocalChange, Post, PostUri, PostView};
    /// # use chrono::Utc;
    /// let author = Author::new(Did::new("did:plc:alice").unwrap(), "alice.test");
    /// let view = PostView::new(
    ///     PostUri::new("at://did:plc:alice/app.bsky.feed.post/1").unwrap(),
    ///     Cid::new("c1").unwrap(),
    ///     author,
    ///     "hello",
    ///     Utc::now(),
    /// )
    /// .with_counts(0, 0, 3, 0);
    /// let change = LocalChange {
    ///     like_count_delta: 1,
    ///     like_uri: Some("at://like".into()),
    ///     ..LocalChange::default()
    /// };
    ///
    /// let shown = DisplayPost::compose(&Post::standalone(view), Some(&change), None);
    /// assert_eq!(shown.like_count, 4);
    /// assert_eq!(shown.like_uri.as_deref(), Some("at://like"));
    /// ```
    pub fn compose(post: &Post, change: Option<&LocalChange>, user_did: Option<&Did>) -> Self {
        let fetched_repost_uri = post.viewer_repost_uri();
        let fetched_like_uri = post.viewer_like_uri();

        let Some(change) = change else {
            return Self {
                post: post.clone(),
                reply_count: post.reply_count(),
                repost_count: post.repost_count(),
                like_count: post.like_count(),
                quote_count: post.quote_count(),
                repost_uri: fetched_repost_uri.map(str::to_owned),
                like_uri: fetched_like_uri.map(str::to_owned),
                locally_deleted: false,
            };
        };

        let repost_uri = override_uri(change.repost_uri.as_deref(), fetched_repost_uri);
        let like_uri = override_uri(change.like_uri.as_deref(), fetched_like_uri);

        let own_repost_undone = change.repost_uri.as_deref().is_some_and(|uri| {
            let reposted_by_user = post
                .reposted_by()
                .zip(user_did)
                .is_some_and(|(by, user)| &by.did == user);
            reposted_by_user && Some(uri) != fetched_repost_uri
        });

        Self {
            post: post.clone(),
            reply_count: post.reply_count().saturating_add(change.reply_count_delta),
            repost_count: post.repost_count().saturating_add(change.repost_count_delta),
            like_count: post.like_count().saturating_add(change.like_count_delta),
            quote_count: post.quote_count().saturating_add(change.quote_count_delta),
            repost_uri,
            like_uri,
            locally_deleted: change.post_deleted || own_repost_undone,
        }
    }

    /// Cid of the row.
    pub fn cid(&self) -> Option<&Cid> {
        self.post.cid()
    }

    /// Uri of the row.
    pub fn uri(&self) -> Option<&PostUri> {
        self.post.uri()
    }

    /// Author of the row.
    pub fn author(&self) -> Option<&Author> {
        self.post.author()
    }

    /// Body text.
    pub fn text(&self) -> &str {
        self.post.text()
    }

    /// Embedded media or record.
    pub fn embed(&self) -> Option<&Embed> {
        self.post.embed()
    }

    /// Labels on the post.
    pub fn labels(&self) -> &[Label] {
        self.post.labels()
    }

    /// Timestamp the row sorts by.
    pub fn timeline_timestamp(&self) -> Option<DateTime<Utc>> {
        self.post.timeline_timestamp()
    }

    /// Thread role.
    pub fn post_type(&self) -> PostType {
        self.post.post_type()
    }

    /// Fold state.
    pub fn folded(&self) -> FoldedPostType {
        self.post.folded()
    }

    /// Gap id when the row is a gap placeholder.
    pub fn gap_id(&self) -> Option<GapId> {
        self.post.gap_id()
    }

    /// Raw content.
    pub fn content(&self) -> &PostContent {
        self.post.content()
    }
}

fn override_uri(change: Option<&str>, fetched: Option<&str>) -> Option<String> {
    match change {
        Some("") => None,
        Some(uri) => Some(uri.to_owned()),
        None => fetched.map(str::to_owned),
    }
}
