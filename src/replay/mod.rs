//! Recorded page sequences.
//!
//! A [`PageReplay`] remembers which pages were merged into a window and how,
//! so that the window can be rebuilt later without the backend. Pages are
//! grouped in lists: the first list holds the pages appended at the tail;
//! every later list starts with a prepended page followed by the pages that
//! filled the gap below it, in order.

use crate::feed::FeedWindow;
use crate::model::{Cursor, RawPage, WindowError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Replay recording and loading failures.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Replay file could not be read or written.
    #[error("Replay file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Replay file content is not a valid replay.
    #[error("Invalid replay JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// No page list ends with an open gap at this cursor.
    #[error("Gap with cursor {cursor} not found")]
    GapNotFound {
        /// Cursor of the gap.
        cursor: Cursor,
    },

    /// No recorded page has this cursor.
    #[error("Cursor {cursor} not found")]
    CursorNotFound {
        /// Cursor looked up.
        cursor: Cursor,
    },

    /// Merging a recorded page failed.
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// One prepended page and the gap fills that followed it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageList {
    pages: Vec<RawPage>,
    #[serde(default)]
    gap_till_next_page: bool,
}

impl PageList {
    fn last_cursor(&self) -> Option<&Cursor> {
        self.pages.last().and_then(|page| page.next_cursor.as_ref())
    }

    fn position(&self, cursor: &Cursor) -> Option<usize> {
        self.pages
            .iter()
            .position(|page| page.next_cursor.as_ref() == Some(cursor))
    }
}

/// Sequence of page lists, oldest list first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReplay {
    page_prepend_sequence: Vec<PageList>,
}

impl PageReplay {
    /// Empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.page_prepend_sequence.is_empty()
    }

    /// Number of page lists.
    pub fn list_count(&self) -> usize {
        self.page_prepend_sequence.len()
    }

    /// Total number of recorded pages.
    pub fn page_count(&self) -> usize {
        self.page_prepend_sequence
            .iter()
            .map(|list| list.pages.len())
            .sum()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        debug!("Clear replay");
        self.page_prepend_sequence.clear();
    }

    // ===== Recording =====

    /// Records a page appended at the tail.
    pub fn append(&mut self, page: RawPage) {
        debug!(entries = page.len(), cursor = ?page.next_cursor, "Record append");
        if self.page_prepend_sequence.is_empty() {
            self.page_prepend_sequence.push(PageList::default());
        }
        self.page_prepend_sequence[0].pages.push(page);
    }

    /// Records a page prepended at the head; `gap_till_next_page` tells
    /// whether it left a gap behind.
    pub fn prepend(&mut self, page: RawPage, gap_till_next_page: bool) {
        debug!(entries = page.len(), cursor = ?page.next_cursor, gap_till_next_page, "Record prepend");
        self.page_prepend_sequence.push(PageList {
            pages: vec![page],
            gap_till_next_page,
        });
    }

    /// Records a page that filled the gap fetched from `gap_cursor`.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::GapNotFound` when no list ends at `gap_cursor`.
    pub fn gap_fill(
        &mut self,
        page: RawPage,
        gap_cursor: &Cursor,
        gap_till_next_page: bool,
    ) -> Result<(), ReplayError> {
        debug!(entries = page.len(), %gap_cursor, gap_till_next_page, "Record gap fill");
        let list = self.find_gap(gap_cursor)?;
        debug_assert!(list.gap_till_next_page);
        list.pages.push(page);
        list.gap_till_next_page = gap_till_next_page;
        Ok(())
    }

    /// Records that the gap at `gap_cursor` closed without a further page.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::GapNotFound` when no list ends at `gap_cursor`.
    pub fn close_gap(&mut self, gap_cursor: &Cursor) -> Result<(), ReplayError> {
        debug!(%gap_cursor, "Record close gap");
        let list = self.find_gap(gap_cursor)?;
        list.gap_till_next_page = false;
        Ok(())
    }

    /// Drops everything recorded below the page with `cursor`.
    ///
    /// That page stays the last one of its list and the list's gap is
    /// closed; older lists are dropped.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::CursorNotFound` when no page has `cursor`.
    pub fn remove_tail(&mut self, cursor: &Cursor) -> Result<(), ReplayError> {
        debug!(%cursor, "Record remove tail");
        let (list_index, page_index) = self.locate(cursor)?;

        let list = &mut self.page_prepend_sequence[list_index];
        list.pages.truncate(page_index + 1);
        list.gap_till_next_page = false;
        self.page_prepend_sequence.drain(..list_index);
        Ok(())
    }

    /// Drops everything recorded above the page with `cursor`.
    ///
    /// That page becomes the first one of its list; newer lists are dropped.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::CursorNotFound` when no page has `cursor`.
    pub fn remove_head(&mut self, cursor: &Cursor) -> Result<(), ReplayError> {
        debug!(%cursor, "Record remove head");
        let (list_index, page_index) = self.locate(cursor)?;

        self.page_prepend_sequence[list_index].pages.drain(..page_index);
        self.page_prepend_sequence.truncate(list_index + 1);
        Ok(())
    }

    fn find_gap(&mut self, gap_cursor: &Cursor) -> Result<&mut PageList, ReplayError> {
        self.page_prepend_sequence
            .iter_mut()
            .find(|list| list.last_cursor() == Some(gap_cursor))
            .ok_or_else(|| ReplayError::GapNotFound {
                cursor: gap_cursor.clone(),
            })
    }

    fn locate(&self, cursor: &Cursor) -> Result<(usize, usize), ReplayError> {
        self.page_prepend_sequence
            .iter()
            .enumerate()
            .find_map(|(list_index, list)| list.position(cursor).map(|page_index| (list_index, page_index)))
            .ok_or_else(|| {
                warn!(%cursor, "Cursor not found in replay");
                ReplayError::CursorNotFound {
                    cursor: cursor.clone(),
                }
            })
    }

    // ===== Replaying =====

    /// Rebuilds `window` from the recording.
    ///
    /// The window is cleared, the first list is appended, and every later
    /// list is prepended with its gap fills. A gap that was closed without a
    /// page is closed with an empty page.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Window` when a merge fails.
    pub fn replay(&self, window: &mut FeedWindow) -> Result<(), ReplayError> {
        debug!(lists = self.list_count(), pages = self.page_count(), "Replay");
        window.clear();

        let Some((first, rest)) = self.page_prepend_sequence.split_first() else {
            debug!("Nothing to replay");
            return Ok(());
        };

        for page in &first.pages {
            window.add_feed(page.clone())?;
        }

        for (list_index, list) in rest.iter().enumerate() {
            let Some((head, fills)) = list.pages.split_first() else {
                warn!(list_index, "Empty page list");
                continue;
            };

            let mut gap_id = window.prepend_feed(head.clone())?;
            for (page_index, page) in fills.iter().enumerate() {
                let Some(open_gap) = gap_id else {
                    warn!(list_index, page_index, "No gap to fill");
                    break;
                };
                gap_id = window.gap_fill_feed(page.clone(), open_gap)?;
            }

            if let Some(open_gap) = gap_id {
                if !list.gap_till_next_page {
                    window.gap_fill_feed(RawPage::default(), open_gap)?;
                }
            }
        }

        debug!(len = window.len(), "Replay done");
        Ok(())
    }

    // ===== Persistence =====

    /// Writes the recording as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Io` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ReplayError> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), pages = self.page_count(), "Saved replay");
        Ok(())
    }

    /// Reads a recording written by [`PageReplay::save`].
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Io` if the file cannot be read and
    /// `ReplayError::Json` if it is not a replay.
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let contents = fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let replay: Self = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), pages = replay.page_count(), "Loaded replay");
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::*;

    fn ids(window: &FeedWindow) -> Vec<String> {
        window
            .posts()
            .iter()
            .map(|post| match post.cid() {
                Some(cid) => cid.as_str().to_string(),
                None => "<gap>".to_string(),
            })
            .collect()
    }

    /// Replay matching: append [c, d], prepend [a, b] leaving a gap, fill
    /// the gap with [b2] (reaching the stored rows below it).
    fn recorded() -> PageReplay {
        let mut replay = PageReplay::new();
        replay.append(page(&[("c", 30), ("d", 20)], Some("old")));
        replay.prepend(page(&[("a", 50), ("b", 40)], Some("gap1")), true);
        replay
            .gap_fill(page(&[("b2", 35), ("c", 30), ("d", 20)], Some("x")), &cursor("gap1"), false)
            .unwrap();
        replay
    }

    #[test]
    fn replay_rebuilds_window_with_gap_fills() {
        let mut window = FeedWindow::default();
        recorded().replay(&mut window).unwrap();

        assert_eq!(ids(&window), vec!["a", "b", "b2", "c", "d"]);
        assert!(window.gap_ids().is_empty());
        window.check_invariants().unwrap();
    }

    #[test]
    fn open_gap_is_kept_and_closed_gap_is_removed() {
        let mut replay = PageReplay::new();
        replay.append(page(&[("c", 30), ("d", 20)], Some("old")));
        replay.prepend(page(&[("a", 50), ("b", 40)], Some("gap1")), true);

        let mut window = FeedWindow::default();
        replay.replay(&mut window).unwrap();
        assert_eq!(ids(&window), vec!["a", "b", "<gap>", "c", "d"]);

        replay.close_gap(&cursor("gap1")).unwrap();
        replay.replay(&mut window).unwrap();
        assert_eq!(ids(&window), vec!["a", "b", "c", "d"]);
        window.check_invariants().unwrap();
    }

    #[test]
    fn gap_fill_needs_a_list_ending_at_the_cursor() {
        let mut replay = recorded();
        let result = replay.gap_fill(page(&[("z", 1)], None), &cursor("nope"), false);
        assert!(matches!(result, Err(ReplayError::GapNotFound { .. })));
        assert_eq!(replay.page_count(), 3);
    }

    #[test]
    fn remove_tail_keeps_pages_through_cursor() {
        // GIVEN two appended pages under a prepended list
        let mut replay = PageReplay::new();
        replay.append(page(&[("c", 30)], Some("p1")));
        replay.append(page(&[("d", 20)], Some("p2")));
        replay.prepend(page(&[("a", 50)], Some("gap1")), true);

        // WHEN the tail is cut at the first appended page
        replay.remove_tail(&cursor("p1")).unwrap();

        // THEN the second page is gone and the prepended list survives
        assert_eq!(replay.list_count(), 2);
        assert_eq!(replay.page_count(), 2);
    }

    #[test]
    fn remove_tail_inside_prepended_list_drops_older_lists() {
        let mut replay = recorded();
        replay.remove_tail(&cursor("gap1")).unwrap();

        assert_eq!(replay.list_count(), 1);
        assert_eq!(replay.page_count(), 1);

        let mut window = FeedWindow::default();
        replay.replay(&mut window).unwrap();
        assert_eq!(ids(&window), vec!["a", "b"]);
    }

    #[test]
    fn remove_head_drops_newer_lists() {
        let mut replay = PageReplay::new();
        replay.append(page(&[("c", 30)], Some("p1")));
        replay.append(page(&[("d", 20)], Some("p2")));
        replay.prepend(page(&[("a", 50)], Some("gap1")), true);

        replay.remove_head(&cursor("p2")).unwrap();

        assert_eq!(replay.list_count(), 1);
        let mut window = FeedWindow::default();
        replay.replay(&mut window).unwrap();
        assert_eq!(ids(&window), vec!["d"]);
    }

    #[test]
    fn unknown_cursor_is_reported() {
        let mut replay = recorded();
        assert!(matches!(
            replay.remove_head(&cursor("nope")),
            Err(ReplayError::CursorNotFound { .. })
        ));
        assert!(matches!(
            replay.remove_tail(&cursor("nope")),
            Err(ReplayError::CursorNotFound { .. })
        ));
    }

    #[test]
    fn empty_replay_clears_window() {
        let mut window = FeedWindow::default();
        window.add_feed(page(&[("a", 10)], None)).unwrap();

        PageReplay::new().replay(&mut window).unwrap();

        assert!(window.is_empty());
    }

    #[test]
    fn save_and_load_preserve_recording() {
        let dir = std::env::temp_dir().join(format!("skyfeed-replay-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("replay.json");

        let replay = recorded();
        replay.save(&path).unwrap();
        let loaded = PageReplay::load(&path).unwrap();

        assert_eq!(loaded, replay);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_rejects_non_replay_json() {
        let dir = std::env::temp_dir().join(format!("skyfeed-replay-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("replay.json");
        fs::write(&path, r#"{"pagePrependSequence": 3}"#).unwrap();

        assert!(matches!(PageReplay::load(&path), Err(ReplayError::Json(_))));
        assert!(matches!(
            PageReplay::load(&dir.join("missing.json")),
            Err(ReplayError::Io { .. })
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
