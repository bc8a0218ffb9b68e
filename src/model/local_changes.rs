//! Optimistic local edits layered over fetched posts.
//!
//! Changes are keyed by cid and never touch the fetched data. They are
//! composed with a post only when a row is read.

use crate::model::identifiers::Cid;
use std::collections::HashMap;

/// Accumulated local edits for one post.
///
/// A URI override of `Some("")` records that the user removed their
/// like or repost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalChange {
    /// Added to the fetched reply count.
    pub reply_count_delta: i64,
    /// Added to the fetched repost count.
    pub repost_count_delta: i64,
    /// Added to the fetched like count.
    pub like_count_delta: i64,
    /// Added to the fetched quote count.
    pub quote_count_delta: i64,
    /// Replaces the fetched repost URI.
    pub repost_uri: Option<String>,
    /// Replaces the fetched like URI.
    pub like_uri: Option<String>,
    /// The post was deleted locally.
    pub post_deleted: bool,
}

/// One edit published on the local change bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalChangeKind {
    /// Reply count moved by the delta.
    ReplyCountDelta(i64),
    /// Repost count moved by the delta.
    RepostCountDelta(i64),
    /// Like count moved by the delta.
    LikeCountDelta(i64),
    /// Quote count moved by the delta.
    QuoteCountDelta(i64),
    /// User's repost URI changed (empty when the repost was undone).
    RepostUri(String),
    /// User's like URI changed (empty when the like was undone).
    LikeUri(String),
    /// Post deleted.
    PostDeleted,
}

/// Edit addressed to a cid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalChangeEvent {
    /// Post the edit applies to.
    pub cid: Cid,
    /// The edit.
    pub kind: LocalChangeKind,
}

impl LocalChangeEvent {
    /// Creates an event.
    pub fn new(cid: Cid, kind: LocalChangeKind) -> Self {
        Self { cid, kind }
    }
}

/// Sparse map of local edits.
#[derive(Debug, Clone, Default)]
pub struct LocalOverlay {
    changes: HashMap<Cid, LocalChange>,
}

impl LocalOverlay {
    /// Empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Edits recorded for `cid`, if any.
    pub fn get_change(&self, cid: &Cid) -> Option<&LocalChange> {
        self.changes.get(cid)
    }

    /// Edits for `cid`, created empty on first touch.
    pub fn get_or_create_change(&mut self, cid: &Cid) -> &mut LocalChange {
        self.changes.entry(cid.clone()).or_default()
    }

    /// Folds one bus event into the overlay.
    pub fn apply(&mut self, event: &LocalChangeEvent) {
        let change = self.get_or_create_change(&event.cid);
        match &event.kind {
            LocalChangeKind::ReplyCountDelta(delta) => {
                change.reply_count_delta = change.reply_count_delta.saturating_add(*delta)
            }
            LocalChangeKind::RepostCountDelta(delta) => {
                change.repost_count_delta = change.repost_count_delta.saturating_add(*delta)
            }
            LocalChangeKind::LikeCountDelta(delta) => {
                change.like_count_delta = change.like_count_delta.saturating_add(*delta)
            }
            LocalChangeKind::QuoteCountDelta(delta) => {
                change.quote_count_delta = change.quote_count_delta.saturating_add(*delta)
            }
            LocalChangeKind::RepostUri(uri) => change.repost_uri = Some(uri.clone()),
            LocalChangeKind::LikeUri(uri) => change.like_uri = Some(uri.clone()),
            LocalChangeKind::PostDeleted => change.post_deleted = true,
        }
    }

    /// Number of posts with edits.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True when nothing was edited.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Forgets all edits.
    pub fn clear(&mut self) {
        self.changes.clear();
    }
}
