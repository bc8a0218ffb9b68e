//! Fixture builders for unit tests.
//!
//! Posts are identified by a short name that doubles as cid, and timestamped
//! in whole seconds from a fixed epoch so ordering assertions stay readable.

use crate::model::{
    Author, Cid, Cursor, Did, FeedEntry, PostUri, PostView, RawEntry, RawPage, ReplyElement,
};
use chrono::{DateTime, TimeZone, Utc};

/// Fixed epoch for fixture timestamps.
const EPOCH: i64 = 1_700_000_000;

/// Timestamp `seconds` after the fixture epoch.
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH + seconds, 0)
        .single()
        .expect("fixture timestamp in range")
}

/// Author `did:plc:{name}` with handle `{name}.test`.
pub fn author(name: &str) -> Author {
    Author::new(
        Did::new(format!("did:plc:{name}")).expect("fixture did"),
        format!("{name}.test"),
    )
}

/// Cid of fixture post `id`.
pub fn cid(id: &str) -> Cid {
    Cid::new(id).expect("fixture cid")
}

/// Cursor with the given text.
pub fn cursor(raw: &str) -> Cursor {
    Cursor::new(raw).expect("fixture cursor")
}

/// Post `id` by `alice`, indexed at `seconds`.
pub fn view(id: &str, seconds: i64) -> PostView {
    view_by(id, seconds, author("alice"))
}

/// Post `id` by `by`, indexed at `seconds`.
pub fn view_by(id: &str, seconds: i64, by: Author) -> PostView {
    PostView::new(
        PostUri::new(format!("at://{}/app.bsky.feed.post/{id}", by.did)).expect("fixture uri"),
        cid(id),
        by,
        format!("post {id}"),
        at(seconds),
    )
}

/// Feed entry for post `id` at `seconds`.
pub fn entry(id: &str, seconds: i64) -> FeedEntry {
    FeedEntry::new(view(id, seconds))
}

/// Reply `id` at `seconds` to `parent` in the thread of `root`, with
/// hydrated context.
pub fn reply_entry(id: &str, seconds: i64, root: &PostView, parent: &PostView) -> FeedEntry {
    let reply = view(id, seconds).with_reply(root.strong_ref(), parent.strong_ref());
    FeedEntry::new(reply).with_reply_context(
        ReplyElement::Post(root.clone()),
        ReplyElement::Post(parent.clone()),
    )
}

/// `view` as a reply to `parent` in the thread of `root` (record only).
pub fn as_reply(view: PostView, root: &PostView, parent: &PostView) -> PostView {
    view.with_reply(root.strong_ref(), parent.strong_ref())
}

/// Repost of post `id` (indexed at `seconds`) by `by` at `repost_seconds`.
pub fn repost(id: &str, seconds: i64, by: &str, repost_seconds: i64) -> FeedEntry {
    entry(id, seconds).reposted_by(author(by), at(repost_seconds))
}

/// Page of `(id, seconds)` posts.
pub fn page(posts: &[(&str, i64)], next: Option<&str>) -> RawPage {
    RawPage::from_entries(
        posts.iter().map(|(id, seconds)| entry(id, *seconds)),
        next.map(cursor),
    )
}

/// Page of arbitrary entries.
pub fn page_of(entries: Vec<FeedEntry>, next: Option<&str>) -> RawPage {
    RawPage::new(
        entries.into_iter().map(RawEntry::Post).collect(),
        next.map(cursor),
    )
}
