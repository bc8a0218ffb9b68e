//! Plain text rendering of a feed window.
//!
//! One line per row, cut to a terminal width measured in display columns.

use crate::feed::{DisplayPost, FeedWindow};
use crate::model::{FoldedPostType, PostContent, PostType};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: char = '…';

/// Renders row `index` as one line of at most `width` columns.
///
/// Returns `None` for rows hidden inside a folded thread.
pub fn render_row(index: usize, row: &DisplayPost, width: usize) -> Option<String> {
    let line = match row.folded() {
        FoldedPostType::Subsequent => return None,
        FoldedPostType::First => format!("{index} : [thread folded]"),
        FoldedPostType::None => describe(index, row),
    };
    Some(fit_to_width(&line, width))
}

/// Renders every visible row of `window`, newest first.
pub fn render_window(window: &FeedWindow, width: usize) -> String {
    (0..window.len())
        .filter_map(|index| window.get(index).and_then(|row| render_row(index, &row, width)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe(index: usize, row: &DisplayPost) -> String {
    match row.content() {
        PostContent::Gap { gap_id, .. } => return format!("{index} ~ ... gap {gap_id} ..."),
        PostContent::NotFound { .. } => return format!("{index} ! [post not found]"),
        PostContent::Blocked { .. } => return format!("{index} ! [blocked post]"),
        PostContent::NotSupported { record_type } => {
            return format!("{index} ? [unsupported {record_type}]")
        }
        PostContent::FeedEntry(_) | PostContent::Standalone(_) => {}
    }

    if row.locally_deleted {
        return format!("{index} x [deleted]");
    }

    let marker = match row.post_type() {
        PostType::Standalone => '-',
        PostType::Root => '+',
        PostType::Reply => '|',
        PostType::LastReply => '`',
        PostType::Thread => '*',
    };
    let time = row
        .timeline_timestamp()
        .map(|ts| ts.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let handle = row.author().map(|a| a.handle.as_str()).unwrap_or("?");
    let reposted = row
        .post
        .reposted_by()
        .map(|by| format!(" (reposted by @{})", by.handle))
        .unwrap_or_default();
    let text = row.text().replace(['\n', '\r'], " ");

    let mut line = format!("{index} {marker} {time} @{handle}{reposted}: {text}");
    if row.like_count > 0 {
        line.push_str(&format!(" [likes: {}]", row.like_count));
    }
    line
}

/// Cuts `line` to `width` display columns, marking the cut with an ellipsis.
fn fit_to_width(line: &str, width: usize) -> String {
    if line.width() <= width {
        return line.to_string();
    }
    if width == 0 {
        return String::new();
    }

    let budget = width - 1;
    let mut used = 0;
    let mut out = String::new();
    for c in line.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push(ELLIPSIS);
    out
}
