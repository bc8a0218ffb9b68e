//! Feed window synchronization.
//!
//! Fetched pages flow through [`PageBuilder`] into a [`FeedWindow`], which
//! splices them into an ordered, de-duplicated row list and keeps cursor and
//! gap positions current. Local edits are composed into [`DisplayPost`]s at
//! read time.

pub mod bus;
pub mod display;
pub mod filter;
pub mod ledger;
pub mod observer;
pub mod overlap;
pub mod page;
pub mod stored_cids;
pub mod window;

pub use bus::{LocalChangeBus, LocalChangeSubscription};
pub use display::DisplayPost;
pub use filter::{
    ContentFilter, FeedPolicy, FeedPreferences, FilterStats, HideReason, LabelTableFilter,
    ProfileStore, ShowAll, Visibility,
};
pub use ledger::{CursorLedger, GapRegistry};
pub use observer::{ChangedField, RecordingObserver, WindowEvent, WindowObserver};
pub use overlap::{find_overlap_end, find_overlap_start, OverlapStart};
pub use page::{Page, PageBuilder};
pub use stored_cids::StoredCids;
pub use window::{FeedWindow, DEFAULT_MAX_TIMELINE_SIZE};
