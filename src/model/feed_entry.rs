//! Raw timeline data as delivered by the backend.
//!
//! The serde layout follows the common timeline JSON shape (camelCase
//! fields, `$type` discriminators) so the same types decode fetched pages
//! and round-trip through replay files. Identifiers are validated while
//! deserializing.

use crate::model::identifiers::{Cid, Cursor, Did, PostUri};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record type of a regular post.
pub const POST_RECORD_TYPE: &str = "app.bsky.feed.post";

/// Account that authored or reposted a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Account identifier.
    pub did: Did,
    /// Handle, e.g. `alice.bsky.social`.
    pub handle: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Relationship of the acting user to this account.
    #[serde(default)]
    pub viewer: AuthorViewer,
}

impl Author {
    /// Creates an author with no display name and no viewer state.
    pub fn new(did: Did, handle: impl Into<String>) -> Self {
        Self {
            did,
            handle: handle.into(),
            display_name: None,
            viewer: AuthorViewer::default(),
        }
    }

    /// Marks the author as muted by the acting user.
    pub fn muted(mut self) -> Self {
        self.viewer.muted = true;
        self
    }
}

/// Viewer state attached to an author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorViewer {
    /// The acting user muted this account.
    #[serde(default)]
    pub muted: bool,
}

/// Moderation label attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label value, e.g. `porn` or `!hide`.
    pub val: String,
    /// DID of the labeler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl Label {
    /// Creates a label without source.
    pub fn new(val: impl Into<String>) -> Self {
        Self {
            val: val.into(),
            src: None,
        }
    }
}

/// Reference to a specific version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    /// Record URI.
    pub uri: PostUri,
    /// Record cid.
    pub cid: Cid,
}

/// Root and parent of a reply, as stored in the post record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReplyRef {
    /// First post of the thread.
    pub root: StrongRef,
    /// Post directly replied to.
    pub parent: StrongRef,
}

/// The post record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    /// Body text.
    #[serde(default)]
    pub text: String,
    /// Client supplied creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Present when the post is a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<RecordReplyRef>,
}

/// Acting user's interactions with a post, as fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostViewerState {
    /// URI of the user's repost record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost: Option<String>,
    /// URI of the user's like record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<String>,
}

/// Image in an image embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageView {
    /// Thumbnail URL.
    pub thumb: String,
    /// Full size URL.
    pub fullsize: String,
    /// Alt text.
    #[serde(default)]
    pub alt: String,
}

/// Link card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalView {
    /// Link target.
    pub uri: String,
    /// Card title.
    #[serde(default)]
    pub title: String,
    /// Card description.
    #[serde(default)]
    pub description: String,
}

/// Quoted record reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedRecord {
    /// URI of the quoted record.
    pub uri: String,
}

/// Media and record embeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Embed {
    /// One or more images.
    #[serde(rename = "app.bsky.embed.images#view")]
    Images {
        /// Embedded images.
        images: Vec<ImageView>,
    },
    /// Link card.
    #[serde(rename = "app.bsky.embed.external#view")]
    External {
        /// The card.
        external: ExternalView,
    },
    /// Quote post.
    #[serde(rename = "app.bsky.embed.record#view")]
    Record {
        /// The quoted record.
        record: EmbeddedRecord,
    },
    /// Video.
    #[serde(rename = "app.bsky.embed.video#view")]
    Video {
        /// HLS playlist URL.
        playlist: String,
        /// Alt text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
    /// Any embed kind this crate does not model.
    #[serde(other)]
    Unknown,
}

/// Hydrated view of a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    /// Record URI.
    pub uri: PostUri,
    /// Record cid.
    pub cid: Cid,
    /// Author.
    pub author: Author,
    /// The record.
    pub record: PostRecord,
    /// Embedded media or quote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    /// Reply count at fetch time.
    #[serde(default)]
    pub reply_count: i64,
    /// Repost count at fetch time.
    #[serde(default)]
    pub repost_count: i64,
    /// Like count at fetch time.
    #[serde(default)]
    pub like_count: i64,
    /// Quote count at fetch time.
    #[serde(default)]
    pub quote_count: i64,
    /// Time the backend indexed the post.
    pub indexed_at: DateTime<Utc>,
    /// Moderation labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    /// Acting user's interactions.
    #[serde(default)]
    pub viewer: PostViewerState,
}

impl PostView {
    /// Creates a plain text post with zero counters.
    pub fn new(
        uri: PostUri,
        cid: Cid,
        author: Author,
        text: impl Into<String>,
        indexed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uri,
            cid,
            author,
            record: PostRecord {
                text: text.into(),
                created_at: Some(indexed_at),
                reply: None,
            },
            embed: None,
            reply_count: 0,
            repost_count: 0,
            like_count: 0,
            quote_count: 0,
            indexed_at,
            labels: Vec::new(),
            viewer: PostViewerState::default(),
        }
    }

    /// Makes the record a reply to `parent` in the thread started by `root`.
    pub fn with_reply(mut self, root: StrongRef, parent: StrongRef) -> Self {
        self.record.reply = Some(RecordReplyRef { root, parent });
        self
    }

    /// Replaces the labels.
    pub fn with_labels(mut self, labels: Vec<Label>) -> Self {
        self.labels = labels;
        self
    }

    /// Sets reply, repost, like and quote counters.
    pub fn with_counts(mut self, reply: i64, repost: i64, like: i64, quote: i64) -> Self {
        self.reply_count = reply;
        self.repost_count = repost;
        self.like_count = like;
        self.quote_count = quote;
        self
    }

    /// Sets the embed.
    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    /// Sets the acting user's repost and like record URIs.
    pub fn with_viewer(mut self, repost: Option<String>, like: Option<String>) -> Self {
        self.viewer = PostViewerState { repost, like };
        self
    }

    /// Strong reference to this post.
    pub fn strong_ref(&self) -> StrongRef {
        StrongRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }
}

/// Element of a hydrated reply context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ReplyElement {
    /// Available post.
    #[serde(rename = "app.bsky.feed.defs#postView")]
    Post(PostView),
    /// Deleted or never existed.
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFound {
        /// URI of the missing post.
        uri: PostUri,
    },
    /// Hidden by a block relation.
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    Blocked {
        /// URI of the blocked post.
        uri: PostUri,
    },
}

/// Hydrated root and parent of a reply entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyContext {
    /// Thread root.
    pub root: ReplyElement,
    /// Direct parent.
    pub parent: ReplyElement,
}

/// Why an entry appears in the feed when the author is not followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Reason {
    /// Someone reposted the post.
    #[serde(rename = "app.bsky.feed.defs#reasonRepost")]
    Repost {
        /// Reposting account.
        by: Author,
        /// Time of the repost.
        #[serde(rename = "indexedAt")]
        indexed_at: DateTime<Utc>,
        /// URI of the repost record.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    /// The post is pinned on the author's profile.
    #[serde(rename = "app.bsky.feed.defs#reasonPin")]
    Pin,
}

/// One entry of a timeline page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// The post.
    pub post: PostView,
    /// Hydrated thread context for replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyContext>,
    /// Repost or pin reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

impl FeedEntry {
    /// Entry for an original post.
    pub fn new(post: PostView) -> Self {
        Self {
            post,
            reply: None,
            reason: None,
        }
    }

    /// Turns the entry into a repost by `by` at `indexed_at`.
    pub fn reposted_by(mut self, by: Author, indexed_at: DateTime<Utc>) -> Self {
        self.reason = Some(Reason::Repost {
            by,
            indexed_at,
            uri: None,
        });
        self
    }

    /// Attaches hydrated thread context.
    pub fn with_reply_context(mut self, root: ReplyElement, parent: ReplyElement) -> Self {
        self.reply = Some(ReplyContext { root, parent });
        self
    }
}

/// A decoded page entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawEntry {
    /// A post entry.
    Post(FeedEntry),
    /// A record type this crate cannot display, or an entry that failed to
    /// decode.
    Unsupported {
        /// Record `$type`, or a description of the decode failure.
        record_type: String,
    },
}

/// One fetched page: entries newest first plus the continuation cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    /// Entries in backend order.
    #[serde(default)]
    pub entries: Vec<RawEntry>,
    /// Cursor of the next (older) page; absent at the end of the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

impl RawPage {
    /// Creates a page.
    pub fn new(entries: Vec<RawEntry>, next_cursor: Option<Cursor>) -> Self {
        Self {
            entries,
            next_cursor,
        }
    }

    /// Page of post entries.
    pub fn from_entries(entries: impl IntoIterator<Item = FeedEntry>, next_cursor: Option<Cursor>) -> Self {
        Self::new(entries.into_iter().map(RawEntry::Post).collect(), next_cursor)
    }

    /// Number of raw entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the backend returned no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_view() -> PostView {
        let author = Author::new(Did::new("did:plc:alice").unwrap(), "alice.test");
        PostView::new(
            PostUri::new("at://did:plc:alice/app.bsky.feed.post/1").unwrap(),
            Cid::new("cid-1").unwrap(),
            author,
            "hello",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn repost_reason_decodes_from_wire_shape() {
        let json = r#"{
            "$type": "app.bsky.feed.defs#reasonRepost",
            "by": {"did": "did:plc:bob", "handle": "bob.test"},
            "indexedAt": "2024-05-01T13:00:00Z"
        }"#;
        let reason: Reason = serde_json::from_str(json).unwrap();
        match reason {
            Reason::Repost { by, uri, .. } => {
                assert_eq!(by.handle, "bob.test");
                assert_eq!(uri, None);
            }
            Reason::Pin => panic!("expected repost"),
        }
    }

    #[test]
    fn unknown_embed_type_decodes_as_unknown() {
        let json = r#"{"$type": "app.bsky.embed.recordWithMedia#view", "media": {}}"#;
        let embed: Embed = serde_json::from_str(json).unwrap();
        assert_eq!(embed, Embed::Unknown);
    }

    #[test]
    fn not_found_reply_element_decodes() {
        let json = r#"{"$type": "app.bsky.feed.defs#notFoundPost", "uri": "at://x/y/z", "notFound": true}"#;
        let element: ReplyElement = serde_json::from_str(json).unwrap();
        assert!(matches!(element, ReplyElement::NotFound { .. }));
    }

    #[test]
    fn raw_page_survives_json_round_trip() {
        let page = RawPage::new(
            vec![
                RawEntry::Post(FeedEntry::new(sample_view())),
                RawEntry::Unsupported {
                    record_type: "app.bsky.feed.generator".to_string(),
                },
            ],
            Some(Cursor::new("c1").unwrap()),
        );
        let json = serde_json::to_string(&page).unwrap();
        let decoded: RawPage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, page);
    }

    #[test]
    fn post_view_with_empty_cid_is_rejected() {
        let json = r#"{
            "uri": "at://x/app.bsky.feed.post/1", "cid": "",
            "author": {"did": "did:plc:a", "handle": "a"},
            "record": {"text": "hi"},
            "indexedAt": "2024-05-01T12:00:00Z"
        }"#;
        assert!(serde_json::from_str::<PostView>(json).is_err());
    }
}
