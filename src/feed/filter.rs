//! Feed content policy.
//!
//! Decides which entries are dropped while a page is built: muted authors,
//! label based hiding through a pluggable [`ContentFilter`], and the user's
//! repost/reply preferences.

use crate::model::{Did, Label, Post, ThreadContext};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// How a label affects display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Visibility {
    /// No effect.
    #[default]
    Show,
    /// Show with a warning over the media.
    WarnMedia,
    /// Show with a warning over the whole post.
    WarnPost,
    /// Hide the media.
    HideMedia,
    /// Drop the post from the feed.
    HidePost,
}

/// Label visibility policy, owned by the moderation subsystem.
pub trait ContentFilter {
    /// Strictest visibility among `labels`, with the warning text to show.
    fn visibility_and_warning(&self, labels: &[Label]) -> (Visibility, String);
}

/// Content filter that never hides anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowAll;

impl ContentFilter for ShowAll {
    fn visibility_and_warning(&self, _labels: &[Label]) -> (Visibility, String) {
        (Visibility::Show, String::new())
    }
}

/// Content filter driven by a label value → visibility table.
#[derive(Debug, Clone, Default)]
pub struct LabelTableFilter {
    table: HashMap<String, Visibility>,
}

impl LabelTableFilter {
    /// Empty table; every label shows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the visibility for one label value.
    pub fn with_label(mut self, value: impl Into<String>, visibility: Visibility) -> Self {
        self.table.insert(value.into(), visibility);
        self
    }

    /// Table with the system labels every client honors.
    pub fn with_system_labels() -> Self {
        Self::new()
            .with_label("!hide", Visibility::HidePost)
            .with_label("!warn", Visibility::WarnPost)
    }
}

impl ContentFilter for LabelTableFilter {
    fn visibility_and_warning(&self, labels: &[Label]) -> (Visibility, String) {
        labels
            .iter()
            .filter_map(|label| {
                self.table
                    .get(&label.val)
                    .map(|visibility| (*visibility, label.val.clone()))
            })
            .max_by_key(|(visibility, _)| *visibility)
            .unwrap_or_default()
    }
}

/// Set of accounts, e.g. the accounts the user follows.
pub trait ProfileStore {
    /// True when `did` is in the store.
    fn contains(&self, did: &Did) -> bool;
}

impl ProfileStore for HashSet<Did> {
    fn contains(&self, did: &Did) -> bool {
        HashSet::contains(self, did)
    }
}

/// Per-feed display preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedPreferences {
    /// Pull thread root and parent next to replies.
    pub assemble_threads: bool,
    /// Drop reposts.
    pub hide_reposts: bool,
    /// Drop replies.
    pub hide_replies: bool,
    /// Drop replies to accounts the user does not follow.
    pub hide_replies_by_unfollowed: bool,
}

impl Default for FeedPreferences {
    fn default() -> Self {
        Self {
            assemble_threads: true,
            hide_reposts: false,
            hide_replies: false,
            hide_replies_by_unfollowed: false,
        }
    }
}

/// Why an entry was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HideReason {
    /// Author or reposter is muted.
    MutedAuthor,
    /// A label resolved to [`Visibility::HidePost`].
    Label,
    /// Reposts are hidden.
    Repost,
    /// Replies are hidden.
    Reply,
    /// Reply to an account the user does not follow.
    ReplyToUnfollowed,
}

impl fmt::Display for HideReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MutedAuthor => "muted author",
            Self::Label => "label",
            Self::Repost => "repost",
            Self::Reply => "reply",
            Self::ReplyToUnfollowed => "reply to unfollowed",
        };
        f.write_str(text)
    }
}

/// Counts of checked and dropped entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    checked: usize,
    hidden: BTreeMap<HideReason, usize>,
}

impl FilterStats {
    /// Counts one entry that went through the policy.
    pub fn checked(&mut self) {
        self.checked += 1;
    }

    /// Counts one dropped entry.
    pub fn report(&mut self, reason: HideReason) {
        *self.hidden.entry(reason).or_default() += 1;
    }

    /// Entries that went through the policy.
    pub fn checked_count(&self) -> usize {
        self.checked
    }

    /// Entries dropped for `reason`.
    pub fn hidden_count(&self, reason: HideReason) -> usize {
        self.hidden.get(&reason).copied().unwrap_or(0)
    }

    /// Entries dropped for any reason.
    pub fn total_hidden(&self) -> usize {
        self.hidden.values().sum()
    }

    /// Resets all counters.
    pub fn clear(&mut self) {
        self.checked = 0;
        self.hidden.clear();
    }
}

/// Everything page construction needs to decide what to drop.
pub struct FeedPolicy {
    user_did: Option<Did>,
    content_filter: Box<dyn ContentFilter>,
    following: Box<dyn ProfileStore>,
    preferences: FeedPreferences,
}

impl fmt::Debug for FeedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedPolicy")
            .field("user_did", &self.user_did)
            .field("preferences", &self.preferences)
            .finish_non_exhaustive()
    }
}

impl Default for FeedPolicy {
    fn default() -> Self {
        Self::new(None, FeedPreferences::default())
    }
}

impl FeedPolicy {
    /// Policy with the system label table and an empty following list.
    pub fn new(user_did: Option<Did>, preferences: FeedPreferences) -> Self {
        Self {
            user_did,
            content_filter: Box::new(LabelTableFilter::with_system_labels()),
            following: Box::new(HashSet::<Did>::new()),
            preferences,
        }
    }

    /// Replaces the content filter.
    pub fn with_content_filter(mut self, filter: impl ContentFilter + 'static) -> Self {
        self.content_filter = Box::new(filter);
        self
    }

    /// Replaces the following store.
    pub fn with_following(mut self, following: impl ProfileStore + 'static) -> Self {
        self.following = Box::new(following);
        self
    }

    /// Acting user.
    pub fn user_did(&self) -> Option<&Did> {
        self.user_did.as_ref()
    }

    /// Display preferences.
    pub fn preferences(&self) -> FeedPreferences {
        self.preferences
    }

    fn is_user(&self, did: &Did) -> bool {
        self.user_did.as_ref() == Some(did)
    }

    /// Reason to drop `post` regardless of thread context.
    pub fn must_hide_content(&self, post: &Post) -> Option<HideReason> {
        if self.preferences.hide_reposts && post.is_repost() {
            return Some(HideReason::Repost);
        }

        if post.author().is_some_and(|author| author.viewer.muted) {
            debug!(cid = ?post.cid(), "Hide post of muted author");
            return Some(HideReason::MutedAuthor);
        }

        if post.reposted_by().is_some_and(|by| by.viewer.muted) {
            debug!(cid = ?post.cid(), "Hide repost of muted author");
            return Some(HideReason::MutedAuthor);
        }

        let (visibility, warning) = self.content_filter.visibility_and_warning(post.labels());
        if visibility == Visibility::HidePost {
            debug!(cid = ?post.cid(), %warning, "Hide labeled post");
            return Some(HideReason::Label);
        }

        None
    }

    /// Reason to drop a reply given its thread context.
    ///
    /// `context` is `None` when the backend sent no usable reference,
    /// which happens for replies in blocked threads.
    pub fn must_hide_reply(&self, post: &Post, context: Option<&ThreadContext>) -> Option<HideReason> {
        if self.preferences.hide_replies {
            return Some(HideReason::Reply);
        }

        if post.author().is_some_and(|author| self.is_user(&author.did)) {
            return None;
        }

        if !self.preferences.hide_replies_by_unfollowed {
            return None;
        }

        let Some(context) = context else {
            return Some(HideReason::ReplyToUnfollowed);
        };

        let Some(parent_author) = context.parent.author() else {
            return Some(HideReason::ReplyToUnfollowed);
        };

        if self.is_user(&parent_author.did) {
            return None;
        }

        if context
            .root
            .author()
            .is_some_and(|root_author| self.is_user(&root_author.did))
        {
            return None;
        }

        if !self.following.contains(&parent_author.did) {
            return Some(HideReason::ReplyToUnfollowed);
        }

        None
    }
}
