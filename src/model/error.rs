//! Error types for the feed engine.
//!
//! This module defines the error taxonomy using `thiserror`. Errors compose
//! via `?` and `From` conversions.
//!
//! # Error Hierarchy
//!
//! - [`FetchError`] - a page could not be obtained from the backend
//!   (transport, authentication, or a page envelope that does not decode)
//! - [`DecodeError`] - a JSON page or entry failed to decode
//! - [`WindowError`] - a feed window bookkeeping invariant was violated
//! - [`PagerError`] - a fetch was refused or its completion failed
//!
//! # Error Recovery Strategy
//!
//! Entry-level decode failures are **non-fatal**: the entry becomes a
//! not-supported placeholder and the rest of the page is kept. Fetch failures
//! are reported once to the pager's caller as a status message; the window
//! is left untouched. Window errors are programming errors; they trip debug
//! assertions and are logged and recovered from in release builds.

use crate::model::identifiers::GapId;
use thiserror::Error;

/// Failure to obtain a page from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network or server failure.
    #[error("Transport error: {message}")]
    Transport {
        /// Backend or transport supplied description.
        message: String,
    },

    /// The session is not authorized for this feed.
    #[error("Authentication error: {message}")]
    Auth {
        /// Backend supplied description.
        message: String,
    },

    /// The response arrived but the page envelope did not decode.
    #[error("Failed to decode page: {0}")]
    Decode(#[from] DecodeError),
}

/// JSON decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input is not valid JSON, or does not have the expected shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use skyfeed::model::error::DecodeError;
    ///
    /// let err = DecodeError::InvalidJson { message: "expected value".to_string() };
    /// assert!(err.to_string().contains("expected value"));
    /// ```
    #[error("Invalid JSON: {message}")]
    InvalidJson {
        /// Error message from serde_json.
        message: String,
    },

    /// Required field is absent.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// An identifier field was present but empty.
    #[error("Invalid identifier in field {field}")]
    InvalidIdentifier {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Feed window bookkeeping invariant violations.
///
/// None of these can be triggered by backend data alone; each indicates a
/// caller passing stale state or an internal bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// Gap id is not registered (already filled, evicted, or never issued).
    #[error("Gap {gap_id} not found")]
    GapNotFound {
        /// The unknown gap id.
        gap_id: GapId,
    },

    /// Registered gap index points past the end of the window.
    #[error("Gap {gap_id} index {index} out of bounds (len: {len})")]
    GapIndexOutOfBounds {
        /// Gap that was looked up.
        gap_id: GapId,
        /// Recorded index.
        index: usize,
        /// Window length at lookup time.
        len: usize,
    },

    /// Registered gap index does not hold that gap's placeholder.
    #[error("Gap {gap_id} is not at index {index}")]
    GapMismatch {
        /// Gap that was looked up.
        gap_id: GapId,
        /// Recorded index.
        index: usize,
    },

    /// Rows were to be inserted past the end of the window.
    #[error("Insert index {index} out of bounds (len: {len})")]
    InsertIndexOutOfBounds {
        /// Requested insert position.
        index: usize,
        /// Window length.
        len: usize,
    },

    /// A gap placeholder exists in the window without a registry entry.
    #[error("Gap placeholder {gap_id} at index {index} is not registered")]
    OrphanGap {
        /// Id carried by the placeholder.
        gap_id: GapId,
        /// Position of the placeholder.
        index: usize,
    },

    /// A cursor ledger entry points past the end of the window.
    #[error("Cursor ledger index {index} out of bounds (len: {len})")]
    LedgerIndexOutOfBounds {
        /// Recorded index.
        index: usize,
        /// Window length.
        len: usize,
    },

    /// Two non-placeholder rows share a cid.
    #[error("Duplicate cid {cid} in window")]
    DuplicateCid {
        /// The duplicated cid.
        cid: String,
    },

    /// The dedup set grew past its bound.
    #[error("Stored cid set holds {len} entries (limit: {limit})")]
    StoredCidsOverCapacity {
        /// Current size.
        len: usize,
        /// Configured bound.
        limit: usize,
    },

    /// The FIFO eviction queue ran dry while the dedup set still held cids.
    #[error("Stored cid queue drained with {orphaned} cids left in the set")]
    StoredCidQueueDrained {
        /// Number of set entries that had no queue entry.
        orphaned: usize,
    },
}

/// Reasons the pager refuses or fails a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PagerError {
    /// Another fetch for this pager has not completed yet.
    #[error("A fetch is already in progress")]
    FetchInProgress,

    /// There is no cursor to continue from (end of feed or empty window).
    #[error("No cursor to continue from")]
    NoCursor,

    /// The window is at capacity; prepending is refused.
    #[error("Timeline is full ({len} posts)")]
    TimelineFull {
        /// Current window length.
        len: usize,
    },

    /// The gap to fill is not in the window.
    #[error("Gap {0} not found")]
    GapNotFound(GapId),

    /// The gap placeholder carries no cursor, so it cannot be fetched.
    #[error("Gap {0} has no cursor")]
    GapWithoutCursor(GapId),

    /// The fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Applying the page violated a window invariant.
    #[error(transparent)]
    Window(#[from] WindowError),
}
