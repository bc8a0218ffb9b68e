//! The feed window: an ordered, bounded, de-duplicated list of timeline rows.
//!
//! Rows are spliced in from fetched pages at the tail (next page), at the
//! head (newer posts) or in place of a gap placeholder (missing range). Three
//! structures track positions inside the rows and are kept in step by every
//! mutation:
//!
//! - the cursor ledger: row index of each page end and the cursor that
//!   continues from there
//! - the gap registry: gap id and row index of each gap placeholder
//! - the stored cid set: every cid in the window, bounded with FIFO eviction
//!
//! Local edits live in a separate overlay and are only applied when a row is
//! read through [`FeedWindow::get`].

use crate::feed::bus::LocalChangeSubscription;
use crate::feed::display::DisplayPost;
use crate::feed::filter::{FeedPolicy, FilterStats};
use crate::feed::ledger::{CursorLedger, GapRegistry};
use crate::feed::observer::{ChangedField, WindowEvent, WindowObserver};
use crate::feed::overlap::{find_overlap_end, find_overlap_start};
use crate::feed::page::{Page, PageBuilder};
use crate::feed::stored_cids::StoredCids;
use crate::model::{
    Cid, Cursor, GapId, GapIdAllocator, LocalChangeEvent, LocalChangeKind, LocalOverlay, Post,
    RawPage, WindowError,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Default bound on the stored cid set.
pub const DEFAULT_MAX_TIMELINE_SIZE: usize = 5000;

/// Ordered timeline rows plus their bookkeeping.
#[derive(Debug)]
pub struct FeedWindow {
    posts: Vec<Post>,
    stored: StoredCids,
    ledger: CursorLedger,
    gaps: GapRegistry,
    gap_ids: GapIdAllocator,
    end_of_feed: bool,
    overlay: LocalOverlay,
    policy: FeedPolicy,
    stats: FilterStats,
    events: Vec<WindowEvent>,
    last_inserted_row: Option<usize>,
}

impl Default for FeedWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TIMELINE_SIZE)
    }
}

impl FeedWindow {
    /// Empty window whose stored cid set is bounded by `max_timeline_size`.
    pub fn new(max_timeline_size: usize) -> Self {
        Self::with_policy(max_timeline_size, FeedPolicy::default())
    }

    /// Empty window applying `policy` to every page.
    pub fn with_policy(max_timeline_size: usize, policy: FeedPolicy) -> Self {
        Self {
            posts: Vec::new(),
            stored: StoredCids::new(max_timeline_size),
            ledger: CursorLedger::new(),
            gaps: GapRegistry::new(),
            gap_ids: GapIdAllocator::new(),
            end_of_feed: false,
            overlay: LocalOverlay::new(),
            policy,
            stats: FilterStats::default(),
            events: Vec::new(),
            last_inserted_row: None,
        }
    }

    // ===== Page merging =====

    /// Replaces the window content with one page.
    ///
    /// # Errors
    ///
    /// See [`FeedWindow::add_feed`].
    pub fn set_feed(&mut self, raw: RawPage) -> Result<(), WindowError> {
        self.clear();
        self.add_feed(raw)
    }

    /// Appends a page at the tail.
    ///
    /// Without a next cursor the window reaches the end of the feed; if the
    /// page brought nothing new, the current last row gets the end marker.
    ///
    /// # Errors
    ///
    /// Returns `WindowError::StoredCidQueueDrained` if dedup eviction finds
    /// its queue out of step with the set.
    pub fn add_feed(&mut self, raw: RawPage) -> Result<(), WindowError> {
        debug!(entries = raw.len(), len = self.posts.len(), "Add feed");
        let page = self.build_page(raw);
        let (rows, cursor) = page.into_parts();
        let page_was_empty = rows.is_empty();

        if page_was_empty {
            debug!(
                checked = self.stats.checked_count(),
                hidden = self.stats.total_hidden(),
                "All posts have been filtered from page"
            );
        } else {
            let index = self.posts.len();
            self.splice(index, rows);
        }

        match cursor {
            Some(cursor) => {
                if let Some(last) = self.posts.len().checked_sub(1) {
                    self.ledger.insert(last, cursor);
                }
            }
            None => {
                self.end_of_feed = true;
                if page_was_empty {
                    if let Some(last) = self.posts.len().checked_sub(1) {
                        self.posts[last].set_end_of_feed(true);
                        self.events.push(WindowEvent::Changed {
                            first: last,
                            last,
                            fields: vec![ChangedField::EndOfFeed],
                        });
                    }
                }
            }
        }

        self.log_indices();
        self.stored.cleanup()
    }

    /// Inserts newer posts at the head.
    ///
    /// Returns the id of the gap placed between the new posts and the old
    /// head when the page did not reach the old head.
    ///
    /// # Errors
    ///
    /// See [`FeedWindow::insert_feed`].
    pub fn prepend_feed(&mut self, raw: RawPage) -> Result<Option<GapId>, WindowError> {
        debug!(entries = raw.len(), len = self.posts.len(), "Prepend feed");
        if raw.is_empty() {
            return Ok(None);
        }
        if self.posts.is_empty() {
            self.set_feed(raw)?;
            return Ok(None);
        }
        self.insert_feed(raw, 0, None)
    }

    /// Fills a gap with a fetched page.
    ///
    /// The placeholder is removed first; if the page does not reach the rows
    /// after the gap, a new gap takes its place and its id is returned.
    ///
    /// # Errors
    ///
    /// Returns `WindowError::GapNotFound` for an unknown gap id and
    /// `GapIndexOutOfBounds` or `GapMismatch` when the registry is out of
    /// step with the rows.
    pub fn gap_fill_feed(&mut self, raw: RawPage, gap_id: GapId) -> Result<Option<GapId>, WindowError> {
        debug!(%gap_id, entries = raw.len(), len = self.posts.len(), "Fill gap");
        let index = self.validated_gap_index(gap_id)?;
        self.gaps.remove(gap_id);

        self.posts.remove(index);
        self.ledger.shift(index, -1);
        self.gaps.shift(index, -1);
        self.events.push(WindowEvent::Removed {
            first: index,
            last: index,
        });
        debug!(index, "Removed gap placeholder");

        self.insert_feed(raw, index, Some(gap_id))
    }

    /// Splices the new part of a page in at `insert_index`.
    ///
    /// - no overlap with the rows at `insert_index`: the whole page goes in,
    ///   followed by a new gap placeholder unless the page dropped stored
    ///   posts older than those rows
    /// - overlap at page index 0: nothing is new
    /// - overlap at page index `k`: the first `k` posts go in
    ///
    /// # Errors
    ///
    /// Returns `WindowError::InsertIndexOutOfBounds` when `insert_index` is
    /// past the end, and eviction errors as [`FeedWindow::add_feed`].
    pub fn insert_feed(
        &mut self,
        raw: RawPage,
        insert_index: usize,
        fill_gap: Option<GapId>,
    ) -> Result<Option<GapId>, WindowError> {
        if insert_index > self.posts.len() {
            return Err(WindowError::InsertIndexOutOfBounds {
                index: insert_index,
                len: self.posts.len(),
            });
        }

        let page = self.build_page(raw);
        if page.is_empty() {
            debug!(
                fill_gap = ?fill_gap,
                checked = self.stats.checked_count(),
                hidden = self.stats.total_hidden(),
                "Page has no posts"
            );
            return Ok(None);
        }

        let start = find_overlap_start(&self.posts, &page, insert_index);

        let gap_id = match start.index {
            None => self.insert_whole_page(page, insert_index, start.overlaps_discarded),
            Some(0) => {
                debug!(fill_gap = ?fill_gap, "Full overlap, no new posts");
                return Ok(None);
            }
            Some(overlap) => {
                let overlap_end = find_overlap_end(&self.posts, &page, insert_index);
                let (mut rows, cursor) = page.into_parts();
                rows.truncate(overlap);
                self.splice(insert_index, rows);

                if let (Some(cursor), Some(end)) = (cursor, overlap_end) {
                    self.ledger.insert(overlap + end, cursor);
                }
                debug!(inserted = overlap, len = self.posts.len(), "Inserted overlapping page");
                None
            }
        };

        self.log_indices();
        self.stored.cleanup()?;
        Ok(gap_id)
    }

    fn insert_whole_page(
        &mut self,
        page: Page,
        insert_index: usize,
        overlaps_discarded: bool,
    ) -> Option<GapId> {
        let (mut rows, cursor) = page.into_parts();

        let gap_id = (!overlaps_discarded).then(|| {
            let gap_id = self.gap_ids.allocate();
            rows.push(Post::gap(gap_id, cursor.clone()));
            debug!(%gap_id, "Create new gap");
            gap_id
        });

        let last = insert_index + rows.len() - 1;
        self.splice(insert_index, rows);

        let mut cursor_index = last;
        if let Some(gap_id) = gap_id {
            self.gaps.insert(gap_id, last);
            cursor_index = last - 1;
        }
        if let Some(cursor) = cursor {
            self.ledger.insert(cursor_index, cursor);
        }

        debug!(len = self.posts.len(), gap = ?gap_id, "Full page inserted");
        gap_id
    }

    /// Inserts `rows` at `index`, shifting bookkeeping and storing cids.
    fn splice(&mut self, index: usize, rows: Vec<Post>) {
        let count = rows.len();
        if count == 0 {
            return;
        }

        for cid in rows.iter().filter_map(Post::cid) {
            self.stored.store(cid.clone());
        }
        self.posts.splice(index..index, rows);
        self.ledger.shift(index, count as isize);
        self.gaps.shift(index, count as isize);

        let last = index + count - 1;
        self.events.push(WindowEvent::Inserted { first: index, last });
        self.last_inserted_row = Some(last);
    }

    fn build_page(&mut self, raw: RawPage) -> Page {
        PageBuilder::new(&self.stored, &self.policy, &mut self.stats).build(raw)
    }

    // ===== Eviction =====

    /// Removes about `count` rows from the head, returning how many went.
    ///
    /// Gap placeholders directly after the cut go with it. Nothing is removed
    /// if that would empty the window.
    pub fn remove_head_posts(&mut self, count: usize) -> usize {
        debug!(count, len = self.posts.len(), "Remove head posts");
        let len = self.posts.len();
        if count == 0 || count >= len {
            return 0;
        }

        let mut end = count - 1;
        while end < len - 1 && self.posts[end + 1].is_gap() {
            end += 1;
        }
        if end >= len - 1 {
            warn!(end, len, "Cannot remove head beyond end");
            return 0;
        }

        let removed = end + 1;
        self.remove_rows(0, removed);
        self.ledger.remove_through(end);
        self.gaps.retain_indices(|index| index > end);
        self.ledger.shift(0, -(removed as isize));
        self.gaps.shift(0, -(removed as isize));
        self.last_inserted_row = self
            .last_inserted_row
            .and_then(|row| row.checked_sub(removed));

        debug_assert!(!self.posts.first().is_some_and(Post::is_gap));
        debug!(removed, len = self.posts.len(), "Removed head rows");
        self.log_indices();
        removed
    }

    /// Removes about `count` rows from the tail, returning how many went.
    ///
    /// The cut is placed at a page boundary from the cursor ledger so that
    /// fetching the next page resumes exactly after the new last row.
    pub fn remove_tail_posts(&mut self, count: usize) -> usize {
        debug!(count, len = self.posts.len(), "Remove tail posts");
        let len = self.posts.len();
        if count == 0 || count >= len {
            return 0;
        }

        let Some((cursor_index, _)) = self.ledger.lower_bound(len - count - 1) else {
            warn!(count, len, "No page boundary to cut the tail at");
            return 0;
        };

        let remove_index = cursor_index + 1;
        if remove_index >= len {
            debug!(remove_index, len, "Cannot remove tail beyond end");
            return 0;
        }

        let removed = len - remove_index;
        self.remove_rows(remove_index, removed);
        self.ledger.remove_after(cursor_index);
        self.gaps.retain_indices(|index| index < remove_index);
        self.end_of_feed = false;
        if self.last_inserted_row.is_some_and(|row| row >= remove_index) {
            self.last_inserted_row = None;
        }

        debug!(removed, len = self.posts.len(), "Removed tail rows");
        self.log_indices();
        removed
    }

    fn remove_rows(&mut self, start: usize, count: usize) {
        for post in self.posts.drain(start..start + count) {
            if let Some(cid) = post.cid() {
                self.stored.remove(cid);
            }
        }
        self.events.push(WindowEvent::Removed {
            first: start,
            last: start + count - 1,
        });
    }

    /// Removes all rows, bookkeeping and local edits.
    pub fn clear(&mut self) {
        if let Some(last) = self.posts.len().checked_sub(1) {
            self.events.push(WindowEvent::Removed { first: 0, last });
        }
        self.posts.clear();
        self.stored.clear();
        self.ledger.clear();
        self.gaps.clear();
        self.overlay.clear();
        self.stats.clear();
        self.end_of_feed = false;
        self.last_inserted_row = None;
        debug!("All posts removed");
    }

    /// Evicts the oldest stored cids down to the bound.
    ///
    /// # Errors
    ///
    /// Returns `WindowError::StoredCidQueueDrained` when the eviction queue
    /// is out of step with the set.
    pub fn cleanup_stored_cids(&mut self) -> Result<(), WindowError> {
        self.stored.cleanup()
    }

    // ===== Queries =====

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// True when the window has no rows.
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// All rows as stored.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Row `index` as stored.
    pub fn post(&self, index: usize) -> Option<&Post> {
        self.posts.get(index)
    }

    /// Row `index` with local edits applied.
    pub fn get(&self, index: usize) -> Option<DisplayPost> {
        let post = self.posts.get(index)?;
        let change = post.cid().and_then(|cid| self.overlay.get_change(cid));
        Some(DisplayPost::compose(post, change, self.policy.user_did()))
    }

    /// Cursor to fetch the page after the last row, unless the feed ended.
    pub fn last_cursor(&self) -> Option<&Cursor> {
        if self.end_of_feed {
            return None;
        }
        self.ledger.last().map(|(_, cursor)| cursor)
    }

    /// Cursor of the page holding the first row.
    pub fn first_cursor(&self) -> Option<&Cursor> {
        self.ledger.iter().next().map(|(_, cursor)| cursor)
    }

    /// Cursor recorded at row `index`.
    pub fn cursor_at(&self, index: usize) -> Option<&Cursor> {
        self.ledger.get(index)
    }

    /// Placeholder row of a gap.
    pub fn gap_placeholder(&self, gap_id: GapId) -> Option<&Post> {
        match self.validated_gap_index(gap_id) {
            Ok(index) => self.posts.get(index),
            Err(err) => {
                debug!(%err, "Gap placeholder lookup failed");
                None
            }
        }
    }

    /// Row index of a gap.
    pub fn gap_index(&self, gap_id: GapId) -> Option<usize> {
        self.gaps.get(gap_id)
    }

    /// Open gaps, in row order.
    pub fn gap_ids(&self) -> Vec<GapId> {
        self.gaps.ids_by_index().into_iter().map(|(gap_id, _)| gap_id).collect()
    }

    /// Timeline timestamp of the last row.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.posts.last().and_then(Post::timeline_timestamp)
    }

    /// Row at which `timestamp` sits, scanning from the tail.
    ///
    /// Prefers a row with exactly that timestamp (and `cid`, when given);
    /// otherwise the last row newer than `timestamp`. Returns 0 when every
    /// row is older.
    pub fn find_timestamp(&self, timestamp: DateTime<Utc>, cid: Option<&Cid>) -> usize {
        let mut found = None;

        for (index, post) in self.posts.iter().enumerate().rev() {
            if post.is_placeholder() {
                continue;
            }
            let Some(post_timestamp) = post.timeline_timestamp() else {
                continue;
            };

            if post_timestamp == timestamp {
                if cid.is_some() && post.cid() == cid {
                    return index;
                }
                found.get_or_insert(index);
            } else if post_timestamp > timestamp {
                return found.unwrap_or(index);
            }
        }

        found.unwrap_or(0)
    }

    /// True once a page arrived without a next cursor.
    pub fn is_end_of_feed(&self) -> bool {
        self.end_of_feed
    }

    /// Last row of the most recent insertion.
    pub fn last_inserted_row(&self) -> Option<usize> {
        self.last_inserted_row
    }

    /// Checked and hidden counts of every page built so far.
    pub fn filter_stats(&self) -> &FilterStats {
        &self.stats
    }

    /// Content and reply policy.
    pub fn policy(&self) -> &FeedPolicy {
        &self.policy
    }

    /// Local edits.
    pub fn overlay(&self) -> &LocalOverlay {
        &self.overlay
    }

    /// Number of stored cids.
    pub fn stored_cid_count(&self) -> usize {
        self.stored.len()
    }

    /// Bound on the stored cid set.
    pub fn max_timeline_size(&self) -> usize {
        self.stored.limit()
    }

    /// Verifies that all bookkeeping agrees with the rows.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), WindowError> {
        let len = self.posts.len();

        let mut seen = HashSet::with_capacity(len);
        for post in &self.posts {
            if let Some(cid) = post.cid() {
                if !seen.insert(cid) {
                    return Err(WindowError::DuplicateCid {
                        cid: cid.to_string(),
                    });
                }
            }
        }

        if let Some((index, _)) = self.ledger.last() {
            if index >= len {
                return Err(WindowError::LedgerIndexOutOfBounds { index, len });
            }
        }

        for (gap_id, _) in self.gaps.ids_by_index() {
            self.validated_gap_index(gap_id)?;
        }

        for (index, post) in self.posts.iter().enumerate() {
            if let Some(gap_id) = post.gap_id() {
                if self.gaps.get(gap_id) != Some(index) {
                    return Err(WindowError::OrphanGap { gap_id, index });
                }
            }
        }

        if self.stored.len() > self.stored.limit() {
            return Err(WindowError::StoredCidsOverCapacity {
                len: self.stored.len(),
                limit: self.stored.limit(),
            });
        }

        Ok(())
    }

    fn validated_gap_index(&self, gap_id: GapId) -> Result<usize, WindowError> {
        let index = self
            .gaps
            .get(gap_id)
            .ok_or(WindowError::GapNotFound { gap_id })?;

        let Some(post) = self.posts.get(index) else {
            return Err(WindowError::GapIndexOutOfBounds {
                gap_id,
                index,
                len: self.posts.len(),
            });
        };

        if post.gap_id() != Some(gap_id) {
            return Err(WindowError::GapMismatch { gap_id, index });
        }
        Ok(index)
    }

    fn log_indices(&self) {
        debug!(cursors = ?self.ledger.iter().collect::<Vec<_>>(), "Cursor ledger");
        debug!(gaps = ?self.gaps.ids_by_index(), "Gap registry");
    }

    // ===== Local changes =====

    /// Folds one local edit into the overlay.
    ///
    /// The whole window is reported changed: a cid can sit on several rows
    /// (original and reposts) and rows may have moved since the edit began.
    pub fn apply_local_change(&mut self, event: &LocalChangeEvent) {
        self.overlay.apply(event);
        let fields = match &event.kind {
            LocalChangeKind::ReplyCountDelta(_) => vec![ChangedField::ReplyCount],
            LocalChangeKind::RepostCountDelta(_) => vec![ChangedField::RepostCount],
            LocalChangeKind::LikeCountDelta(_) => vec![ChangedField::LikeCount],
            LocalChangeKind::QuoteCountDelta(_) => vec![ChangedField::QuoteCount],
            LocalChangeKind::RepostUri(_) => {
                vec![ChangedField::RepostUri, ChangedField::LocallyDeleted]
            }
            LocalChangeKind::LikeUri(_) => vec![ChangedField::LikeUri],
            LocalChangeKind::PostDeleted => vec![ChangedField::LocallyDeleted],
        };
        self.mark_all_changed(fields);
    }

    /// Applies every pending event of `subscription`, returning how many.
    pub fn sync_local_changes(&mut self, subscription: &LocalChangeSubscription) -> usize {
        let events = subscription.drain();
        for event in &events {
            self.apply_local_change(event);
        }
        events.len()
    }

    /// Adds `delta` to the displayed reply count of `cid`.
    pub fn update_reply_count_delta(&mut self, cid: &Cid, delta: i64) {
        self.apply_local_change(&LocalChangeEvent::new(
            cid.clone(),
            LocalChangeKind::ReplyCountDelta(delta),
        ));
    }

    /// Adds `delta` to the displayed repost count of `cid`.
    pub fn update_repost_count_delta(&mut self, cid: &Cid, delta: i64) {
        self.apply_local_change(&LocalChangeEvent::new(
            cid.clone(),
            LocalChangeKind::RepostCountDelta(delta),
        ));
    }

    /// Adds `delta` to the displayed like count of `cid`.
    pub fn update_like_count_delta(&mut self, cid: &Cid, delta: i64) {
        self.apply_local_change(&LocalChangeEvent::new(
            cid.clone(),
            LocalChangeKind::LikeCountDelta(delta),
        ));
    }

    /// Adds `delta` to the displayed quote count of `cid`.
    pub fn update_quote_count_delta(&mut self, cid: &Cid, delta: i64) {
        self.apply_local_change(&LocalChangeEvent::new(
            cid.clone(),
            LocalChangeKind::QuoteCountDelta(delta),
        ));
    }

    /// Overrides the user's repost URI of `cid`; empty means undone.
    pub fn update_repost_uri(&mut self, cid: &Cid, uri: impl Into<String>) {
        self.apply_local_change(&LocalChangeEvent::new(
            cid.clone(),
            LocalChangeKind::RepostUri(uri.into()),
        ));
    }

    /// Overrides the user's like URI of `cid`; empty means undone.
    pub fn update_like_uri(&mut self, cid: &Cid, uri: impl Into<String>) {
        self.apply_local_change(&LocalChangeEvent::new(
            cid.clone(),
            LocalChangeKind::LikeUri(uri.into()),
        ));
    }

    /// Marks `cid` as deleted by the user.
    pub fn mark_post_deleted(&mut self, cid: &Cid) {
        self.apply_local_change(&LocalChangeEvent::new(cid.clone(), LocalChangeKind::PostDeleted));
    }

    fn mark_all_changed(&mut self, fields: Vec<ChangedField>) {
        if let Some(last) = self.posts.len().checked_sub(1) {
            self.events.push(WindowEvent::Changed {
                first: 0,
                last,
                fields,
            });
        }
    }

    // ===== Events =====

    /// Takes the events queued since the last call.
    pub fn take_events(&mut self) -> Vec<WindowEvent> {
        std::mem::take(&mut self.events)
    }

    /// Pushes the queued events into `observer`.
    pub fn dispatch_events(&mut self, observer: &mut dyn WindowObserver) {
        for event in self.take_events() {
            observer.on_event(&event);
        }
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
