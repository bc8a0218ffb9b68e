//! Fetch orchestration for a feed window.
//!
//! A fetch is split in two halves so that it can run on any transport:
//! `begin_*` checks the guards and hands out a [`FetchTicket`] naming the
//! cursor and page size to request; [`FeedPager::complete`] applies the
//! response. Only one ticket is live at a time, and tickets issued before
//! [`FeedPager::close`] are dropped on completion.
//!
//! The `fetch_*` helpers run both halves against a blocking [`FetchApi`].
//!
//! With recording on, every applied page and trim is mirrored into a
//! [`PageReplay`] so the window can be rebuilt offline.

use crate::feed::FeedWindow;
use crate::model::{Cursor, FetchError, GapId, PagerError, RawPage};
use crate::replay::{PageReplay, ReplayError};
use std::fmt;
use tracing::{debug, info, warn};

/// Rows per next-page fetch; also the head trim when the window is full.
pub const DEFAULT_ADD_PAGE_SIZE: usize = 100;
/// Rows per prepend fetch.
pub const DEFAULT_PREPEND_PAGE_SIZE: usize = 50;
/// Rows per gap fill fetch.
pub const DEFAULT_GAP_FILL_PAGE_SIZE: usize = 100;
/// Rows dropped per tail trim.
pub const DEFAULT_DELETE_SIZE: usize = 100;
/// Fetch the next page when fewer rows than this remain below the viewport.
pub const DEFAULT_NEXT_PAGE_THRESHOLD: usize = 50;

/// Source of timeline pages.
pub trait FetchApi {
    /// Fetches up to `page_size` entries continuing from `cursor`, or the
    /// newest entries when `cursor` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport, auth or decode failures.
    fn fetch_page(&mut self, cursor: Option<&Cursor>, page_size: usize) -> Result<RawPage, FetchError>;
}

/// Page sizes and trimming thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerSettings {
    /// Rows per next-page fetch.
    pub add_page_size: usize,
    /// Rows per prepend fetch.
    pub prepend_page_size: usize,
    /// Rows per gap fill fetch.
    pub gap_fill_page_size: usize,
    /// Rows dropped per tail trim.
    pub delete_size: usize,
    /// Remaining rows below the viewport that trigger a next-page fetch.
    pub next_page_threshold: usize,
}

impl Default for PagerSettings {
    fn default() -> Self {
        Self {
            add_page_size: DEFAULT_ADD_PAGE_SIZE,
            prepend_page_size: DEFAULT_PREPEND_PAGE_SIZE,
            gap_fill_page_size: DEFAULT_GAP_FILL_PAGE_SIZE,
            delete_size: DEFAULT_DELETE_SIZE,
            next_page_threshold: DEFAULT_NEXT_PAGE_THRESHOLD,
        }
    }
}

/// What a ticket will do with its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Replace the window.
    Reload,
    /// Append at the tail.
    NextPage,
    /// Insert newer posts at the head.
    Prepend,
    /// Fill the given gap.
    GapFill(GapId),
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reload => f.write_str("reload"),
            Self::NextPage => f.write_str("next page"),
            Self::Prepend => f.write_str("prepend"),
            Self::GapFill(gap_id) => write!(f, "gap fill {gap_id}"),
        }
    }
}

/// A started fetch.
///
/// Not `Clone`: a ticket is consumed by [`FeedPager::complete`].
#[derive(Debug, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    kind: FetchKind,
    cursor: Option<Cursor>,
    page_size: usize,
}

impl FetchTicket {
    /// What the page will be used for.
    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    /// Cursor to request, `None` for the newest entries.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Number of entries to request.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pager generation the ticket was issued in.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Severity of a [`StatusMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    /// Informational.
    Info,
    /// A fetch failed.
    Error,
}

/// User-facing result of the last fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Severity.
    pub level: StatusLevel,
    /// Message text.
    pub text: String,
}

impl StatusMessage {
    fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }
}

/// Effect of an applied page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Posts added, gap placeholders not counted.
    pub posts_added: usize,
    /// Gap created by a prepend or a short gap fill.
    pub new_gap: Option<GapId>,
}

/// Owns a window and drives fetches into it.
#[derive(Debug)]
pub struct FeedPager {
    window: FeedWindow,
    settings: PagerSettings,
    in_progress: bool,
    generation: u64,
    status: Option<StatusMessage>,
    recording: Option<PageReplay>,
}

impl FeedPager {
    /// Pager over `window`.
    pub fn new(window: FeedWindow, settings: PagerSettings) -> Self {
        Self {
            window,
            settings,
            in_progress: false,
            generation: 0,
            status: None,
            recording: None,
        }
    }

    /// Starts mirroring merges into a fresh [`PageReplay`].
    pub fn record(&mut self) {
        self.record_into(PageReplay::new());
    }

    /// Continues mirroring merges into `replay`, which must describe the
    /// current window.
    pub fn record_into(&mut self, replay: PageReplay) {
        self.recording = Some(replay);
    }

    /// The recording, if enabled.
    pub fn recording(&self) -> Option<&PageReplay> {
        self.recording.as_ref()
    }

    /// Stops recording and returns what was recorded.
    pub fn take_recording(&mut self) -> Option<PageReplay> {
        self.recording.take()
    }

    /// The window.
    pub fn window(&self) -> &FeedWindow {
        &self.window
    }

    /// The window, for local edits and event draining.
    pub fn window_mut(&mut self) -> &mut FeedWindow {
        &mut self.window
    }

    /// Page sizes in use.
    pub fn settings(&self) -> PagerSettings {
        self.settings
    }

    /// True while a ticket is outstanding.
    pub fn is_fetch_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Result of the last completed fetch.
    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    // ===== Starting fetches =====

    /// Starts fetching the newest page to replace the window.
    ///
    /// # Errors
    ///
    /// Returns `PagerError::FetchInProgress` if a ticket is outstanding.
    pub fn begin_reload(&mut self) -> Result<FetchTicket, PagerError> {
        self.ensure_idle()?;
        Ok(self.issue(FetchKind::Reload, None, self.settings.add_page_size))
    }

    /// Starts fetching the page after the last row.
    ///
    /// A full window first drops `add_page_size` rows from the head.
    ///
    /// # Errors
    ///
    /// Returns `PagerError::FetchInProgress` if a ticket is outstanding and
    /// `PagerError::NoCursor` at the end of the feed.
    pub fn begin_next_page(&mut self) -> Result<FetchTicket, PagerError> {
        self.ensure_idle()?;
        let cursor = self.window.last_cursor().cloned().ok_or(PagerError::NoCursor)?;

        if self.window.len() >= self.window.max_timeline_size() {
            info!(
                len = self.window.len(),
                remove = self.settings.add_page_size,
                "Timeline full, removing head posts"
            );
            if self.window.remove_head_posts(self.settings.add_page_size) > 0 {
                let first = self.window.first_cursor().cloned();
                self.with_recording(|replay| match first {
                    Some(cursor) => replay.remove_head(&cursor),
                    None => Ok(()),
                });
            }
        }

        Ok(self.issue(FetchKind::NextPage, Some(cursor), self.settings.add_page_size))
    }

    /// Starts fetching the newest page to prepend.
    ///
    /// # Errors
    ///
    /// Returns `PagerError::FetchInProgress` if a ticket is outstanding and
    /// `PagerError::TimelineFull` when the window is at capacity.
    pub fn begin_prepend(&mut self) -> Result<FetchTicket, PagerError> {
        self.ensure_idle()?;
        let len = self.window.len();
        if len >= self.window.max_timeline_size() {
            debug!(len, "Timeline is full");
            return Err(PagerError::TimelineFull { len });
        }
        Ok(self.issue(FetchKind::Prepend, None, self.settings.prepend_page_size))
    }

    /// Starts fetching the range behind a gap.
    ///
    /// # Errors
    ///
    /// Returns `PagerError::FetchInProgress` if a ticket is outstanding,
    /// `PagerError::GapNotFound` for an unknown gap and
    /// `PagerError::GapWithoutCursor` when the gap cannot be fetched.
    pub fn begin_gap_fill(&mut self, gap_id: GapId) -> Result<FetchTicket, PagerError> {
        self.ensure_idle()?;
        let placeholder = self
            .window
            .gap_placeholder(gap_id)
            .ok_or(PagerError::GapNotFound(gap_id))?;
        let cursor = placeholder
            .gap_cursor()
            .cloned()
            .ok_or(PagerError::GapWithoutCursor(gap_id))?;

        Ok(self.issue(
            FetchKind::GapFill(gap_id),
            Some(cursor),
            self.settings.gap_fill_page_size,
        ))
    }

    fn ensure_idle(&self) -> Result<(), PagerError> {
        if self.in_progress {
            debug!("Fetch still in progress");
            return Err(PagerError::FetchInProgress);
        }
        Ok(())
    }

    fn issue(&mut self, kind: FetchKind, cursor: Option<Cursor>, page_size: usize) -> FetchTicket {
        self.in_progress = true;
        debug!(%kind, cursor = ?cursor, page_size, generation = self.generation, "Fetch started");
        FetchTicket {
            generation: self.generation,
            kind,
            cursor,
            page_size,
        }
    }

    // ===== Completing fetches =====

    /// Applies the response for `ticket`.
    ///
    /// Returns `Ok(None)` when the ticket is stale or no fetch is in
    /// progress; the window is not touched in that case.
    ///
    /// # Errors
    ///
    /// Returns `PagerError::Fetch` when the fetch failed and
    /// `PagerError::Window` when applying the page broke a window invariant.
    /// Either way the fetch is over. Failures other than a prepend record
    /// an error status; a failed prepend stays silent.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<RawPage, FetchError>,
    ) -> Result<Option<FetchOutcome>, PagerError> {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                kind = %ticket.kind,
                "Dropping stale fetch completion"
            );
            return Ok(None);
        }
        if !self.in_progress {
            debug!(kind = %ticket.kind, "Dropping completion with no fetch in progress");
            return Ok(None);
        }
        self.in_progress = false;

        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                warn!(kind = %ticket.kind, %err, "Fetch failed");
                if ticket.kind != FetchKind::Prepend {
                    self.status = Some(StatusMessage::error(err.to_string()));
                }
                return Err(err.into());
            }
        };

        let recorded = self.recording.is_some().then(|| raw.clone());
        let was_empty = self.window.is_empty();
        let before = self.post_count();
        let applied = match ticket.kind {
            FetchKind::Reload => self.window.set_feed(raw).map(|()| None),
            FetchKind::NextPage => self.window.add_feed(raw).map(|()| None),
            FetchKind::Prepend => self.window.prepend_feed(raw),
            FetchKind::GapFill(gap_id) => self.window.gap_fill_feed(raw, gap_id),
        };

        let new_gap = match applied {
            Ok(new_gap) => new_gap,
            Err(err) => {
                warn!(kind = %ticket.kind, %err, "Applying page failed");
                self.status = Some(StatusMessage::error(err.to_string()));
                return Err(err.into());
            }
        };

        let posts_added = match ticket.kind {
            FetchKind::Reload => self.post_count(),
            _ => self.post_count().saturating_sub(before),
        };
        debug!(kind = %ticket.kind, posts_added, new_gap = ?new_gap, len = self.window.len(), "Fetch applied");
        if let Some(raw) = recorded {
            self.record_page(&ticket, raw, new_gap, was_empty, posts_added);
        }
        self.status = Some(StatusMessage::info(match posts_added {
            1 => "1 new post".to_string(),
            n => format!("{n} new posts"),
        }));

        Ok(Some(FetchOutcome {
            posts_added,
            new_gap,
        }))
    }

    fn record_page(
        &mut self,
        ticket: &FetchTicket,
        raw: RawPage,
        new_gap: Option<GapId>,
        was_empty: bool,
        posts_added: usize,
    ) {
        let kind = ticket.kind;
        let gap_cursor = ticket.cursor.clone();
        self.with_recording(move |replay| {
            match kind {
                FetchKind::Reload => {
                    replay.clear();
                    replay.append(raw);
                }
                FetchKind::NextPage => replay.append(raw),
                FetchKind::Prepend if was_empty => {
                    replay.clear();
                    replay.append(raw);
                }
                FetchKind::Prepend if posts_added > 0 => replay.prepend(raw, new_gap.is_some()),
                FetchKind::Prepend => {}
                FetchKind::GapFill(_) => {
                    if let Some(gap_cursor) = gap_cursor {
                        return replay.gap_fill(raw, &gap_cursor, new_gap.is_some());
                    }
                }
            }
            Ok(())
        });
    }

    /// Applies `update` to the recording. A failure stops recording.
    fn with_recording(
        &mut self,
        update: impl FnOnce(&mut PageReplay) -> Result<(), ReplayError>,
    ) {
        let Some(replay) = self.recording.as_mut() else {
            return;
        };
        if let Err(err) = update(replay) {
            warn!(%err, "Recording out of step with window, stopped recording");
            self.recording = None;
        }
    }

    fn post_count(&self) -> usize {
        self.window.posts().iter().filter(|post| !post.is_gap()).count()
    }

    /// Clears the window and invalidates outstanding tickets.
    pub fn close(&mut self) {
        self.generation += 1;
        self.in_progress = false;
        self.window.clear();
        if let Some(replay) = self.recording.as_mut() {
            replay.clear();
        }
        debug!(generation = self.generation, "Pager closed");
    }

    // ===== Blocking helpers =====

    /// Reloads the window from `api`.
    ///
    /// # Errors
    ///
    /// See [`FeedPager::begin_reload`] and [`FeedPager::complete`].
    pub fn fetch_reload(&mut self, api: &mut dyn FetchApi) -> Result<FetchOutcome, PagerError> {
        let ticket = self.begin_reload()?;
        self.run(api, ticket)
    }

    /// Appends the next page from `api`.
    ///
    /// # Errors
    ///
    /// See [`FeedPager::begin_next_page`] and [`FeedPager::complete`].
    pub fn fetch_next_page(&mut self, api: &mut dyn FetchApi) -> Result<FetchOutcome, PagerError> {
        let ticket = self.begin_next_page()?;
        self.run(api, ticket)
    }

    /// Prepends the newest page from `api`, then follows up to
    /// `auto_gap_fill` gaps that the prepend leaves behind.
    ///
    /// # Errors
    ///
    /// See [`FeedPager::begin_prepend`] and [`FeedPager::complete`].
    pub fn fetch_prepend(
        &mut self,
        api: &mut dyn FetchApi,
        auto_gap_fill: usize,
    ) -> Result<FetchOutcome, PagerError> {
        let ticket = self.begin_prepend()?;
        let outcome = self.run(api, ticket)?;
        self.follow_gaps(api, outcome, auto_gap_fill)
    }

    /// Fills `gap_id` from `api`, then follows up to `auto_gap_fill` gaps
    /// that remain.
    ///
    /// # Errors
    ///
    /// See [`FeedPager::begin_gap_fill`] and [`FeedPager::complete`].
    pub fn fetch_gap(
        &mut self,
        api: &mut dyn FetchApi,
        gap_id: GapId,
        auto_gap_fill: usize,
    ) -> Result<FetchOutcome, PagerError> {
        let ticket = self.begin_gap_fill(gap_id)?;
        let outcome = self.run(api, ticket)?;
        self.follow_gaps(api, outcome, auto_gap_fill)
    }

    fn follow_gaps(
        &mut self,
        api: &mut dyn FetchApi,
        mut outcome: FetchOutcome,
        mut remaining: usize,
    ) -> Result<FetchOutcome, PagerError> {
        while remaining > 0 {
            let Some(gap_id) = outcome.new_gap else {
                break;
            };
            remaining -= 1;
            debug!(%gap_id, remaining, "Auto gap fill");
            let ticket = self.begin_gap_fill(gap_id)?;
            let next = self.run(api, ticket)?;
            outcome = FetchOutcome {
                posts_added: outcome.posts_added + next.posts_added,
                new_gap: next.new_gap,
            };
        }
        Ok(outcome)
    }

    fn run(&mut self, api: &mut dyn FetchApi, ticket: FetchTicket) -> Result<FetchOutcome, PagerError> {
        let result = api.fetch_page(ticket.cursor(), ticket.page_size());
        Ok(self.complete(ticket, result)?.unwrap_or_default())
    }

    // ===== Scrolling =====

    /// Reacts to the list coming to rest with rows `first_visible..=last_visible`
    /// on screen.
    ///
    /// Trims the tail when far more rows than needed remain below the
    /// viewport, and returns whether the next page should be fetched now.
    pub fn movement_ended(&mut self, first_visible: usize, last_visible: usize) -> bool {
        let len = self.window.len();
        if first_visible > last_visible || last_visible >= len {
            debug!(first_visible, last_visible, len, "Ignoring invalid viewport");
            return false;
        }

        let delete_size = self.settings.delete_size;
        let max_tail = delete_size * 2;
        let remains = len - last_visible;

        if remains > max_tail {
            let removed = self.window.remove_tail_posts(remains - (max_tail - delete_size));
            debug!(remains, removed, "Trimmed tail");
            if removed > 0 {
                let last = self.window.last_cursor().cloned();
                self.with_recording(|replay| match last {
                    Some(cursor) => replay.remove_tail(&cursor),
                    None => Ok(()),
                });
            }
        }

        remains < self.settings.next_page_threshold
            && !self.in_progress
            && self.window.last_cursor().is_some()
    }
}

#[cfg(test)]
#[path = "pager_tests.rs"]
mod tests;
