//! Shared fixtures for integration tests.
//!
//! [`SimulatedFeed`] stands in for the timeline backend: a fixed list of
//! posts, newest first, where cursors are plain offsets into the list and
//! new posts "arrive" by moving the head of the feed up.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use skyfeed::feed::FeedWindow;
use skyfeed::model::{
    Author, Cid, Cursor, Did, FeedEntry, FetchError, PostUri, PostView, RawPage,
};
use skyfeed::pager::FetchApi;

const EPOCH: i64 = 1_700_000_000;

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH + seconds, 0).single().unwrap()
}

pub fn author(name: &str) -> Author {
    Author::new(Did::new(format!("did:plc:{name}")).unwrap(), format!("{name}.test"))
}

pub fn cursor(raw: &str) -> Cursor {
    Cursor::new(raw).unwrap()
}

pub fn view(id: &str, seconds: i64) -> PostView {
    PostView::new(
        PostUri::new(format!("at://did:plc:alice/app.bsky.feed.post/{id}")).unwrap(),
        Cid::new(id).unwrap(),
        author("alice"),
        format!("post {id}"),
        at(seconds),
    )
}

pub fn entry(id: &str, seconds: i64) -> FeedEntry {
    FeedEntry::new(view(id, seconds))
}

pub fn page(posts: &[(&str, i64)], next: Option<&str>) -> RawPage {
    RawPage::from_entries(
        posts.iter().map(|(id, seconds)| entry(id, *seconds)),
        next.map(cursor),
    )
}

/// Cid of every row, `None` for placeholders.
pub fn row_ids(window: &FeedWindow) -> Vec<Option<String>> {
    window
        .posts()
        .iter()
        .map(|post| post.cid().map(|cid| cid.as_str().to_string()))
        .collect()
}

/// Cids of real posts only.
pub fn post_ids(window: &FeedWindow) -> Vec<String> {
    row_ids(window).into_iter().flatten().collect()
}

/// Position of a simulated post in the feed, from its `p{n}` cid.
pub fn feed_index(id: &str) -> usize {
    id.trim_start_matches('p').parse().unwrap()
}

/// Backend serving `total` posts `p0..p{total}`, newest first.
#[derive(Debug, Clone)]
pub struct SimulatedFeed {
    total: usize,
    head: usize,
    fetches: usize,
}

impl SimulatedFeed {
    /// Feed whose newest visible post is `p{head}`.
    pub fn new(total: usize, head: usize) -> Self {
        Self {
            total,
            head: head.min(total),
            fetches: 0,
        }
    }

    /// Makes `count` newer posts visible.
    pub fn arrive(&mut self, count: usize) {
        self.head = self.head.saturating_sub(count);
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Ids of posts `start..end`.
    pub fn ids(&self, start: usize, end: usize) -> Vec<String> {
        (start..end.min(self.total)).map(|i| format!("p{i}")).collect()
    }

    fn entry_at(&self, index: usize) -> FeedEntry {
        let seconds = i64::try_from(self.total - index).unwrap();
        entry(&format!("p{index}"), seconds)
    }
}

impl FetchApi for SimulatedFeed {
    fn fetch_page(&mut self, cursor: Option<&Cursor>, page_size: usize) -> Result<RawPage, FetchError> {
        self.fetches += 1;
        let start = match cursor {
            Some(cursor) => cursor.as_str().parse::<usize>().map_err(|e| FetchError::Transport {
                message: format!("bad cursor {cursor}: {e}"),
            })?,
            None => self.head,
        };
        let start = start.min(self.total);
        let end = (start + page_size).min(self.total);
        let next = (end < self.total).then(|| self::cursor(&end.to_string()));

        Ok(RawPage::from_entries(
            (start..end).map(|index| self.entry_at(index)),
            next,
        ))
    }
}
