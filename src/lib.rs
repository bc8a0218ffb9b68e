//! Skyfeed
//!
//! Bounded, gap-aware timeline window for a Bluesky-style social feed.
//!
//! Pages fetched from the backend are merged into a [`feed::FeedWindow`]
//! that deduplicates posts, assembles reply threads, tracks holes between
//! non-contiguous pages and trims itself to a fixed capacity. The
//! [`pager::FeedPager`] drives fetches against a [`pager::FetchApi`] and
//! [`replay::PageReplay`] records merges so a window can be rebuilt later.

pub mod config;
pub mod feed;
pub mod logging;
pub mod model;
pub mod pager;
pub mod parser;
pub mod replay;
pub mod view;

#[cfg(test)]
mod test_harness;
