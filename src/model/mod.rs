//! Domain model types (pure).
//!
//! All types in this module are pure data with smart constructors.

pub mod error;
pub mod feed_entry;
pub mod identifiers;
pub mod local_changes;
pub mod post;

// Re-export for convenience
pub use error::{DecodeError, FetchError, PagerError, WindowError};
pub use feed_entry::{
    Author, AuthorViewer, Embed, EmbeddedRecord, ExternalView, FeedEntry, ImageView, Label,
    PostRecord, PostView, PostViewerState, RawEntry, RawPage, Reason, RecordReplyRef,
    ReplyContext, ReplyElement, StrongRef, POST_RECORD_TYPE,
};
pub use identifiers::{
    Cid, Cursor, Did, GapId, GapIdAllocator, InvalidCid, InvalidCursor, InvalidDid, InvalidUri,
    PostUri,
};
pub use local_changes::{LocalChange, LocalChangeEvent, LocalChangeKind, LocalOverlay};
pub use post::{FoldedPostType, Post, PostContent, PostType, ThreadContext};
