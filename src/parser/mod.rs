//! JSON parser for timeline pages.
//!
//! A page envelope (`{"feed": [...], "cursor": "..."}`) must decode, but each
//! entry is decoded on its own: an entry with a record type other than a post,
//! or one that fails validation, becomes [`RawEntry::Unsupported`] so the rest
//! of the page survives.

use crate::model::{Cursor, DecodeError, FeedEntry, RawEntry, RawPage, POST_RECORD_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Record type reported for entries that are not even JSON objects.
const UNKNOWN_RECORD_TYPE: &str = "unknown";

/// Raw page envelope.
#[derive(Debug, Deserialize)]
struct RawTimelinePage {
    #[serde(default)]
    feed: Option<Vec<Value>>,
    #[serde(default)]
    cursor: Option<String>,
}

/// Parse one timeline page.
///
/// # Errors
///
/// Returns `DecodeError` if the input is not JSON or has no `feed` array.
/// Individual entries never fail the page.
///
/// # Examples
///
/// ```
/// use skyfeed::parser::parse_page;
///
/// let page = parse_page(r#"{"feed": [], "cursor": "abc"}"#).unwrap();
/// assert!(page.is_empty());
/// assert_eq!(page.next_cursor.unwrap().as_str(), "abc");
/// ```
pub fn parse_page(raw: &str) -> Result<RawPage, DecodeError> {
    let envelope: RawTimelinePage =
        serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson {
            message: e.to_string(),
        })?;

    let feed = envelope
        .feed
        .ok_or(DecodeError::MissingField { field: "feed" })?;

    // The backend sends an empty string instead of omitting the cursor on
    // some endpoints.
    let next_cursor = envelope.cursor.and_then(|c| Cursor::new(c).ok());

    let entries: Vec<RawEntry> = feed.into_iter().map(parse_entry_graceful).collect();
    debug!(
        entries = entries.len(),
        has_cursor = next_cursor.is_some(),
        "Parsed timeline page"
    );

    Ok(RawPage::new(entries, next_cursor))
}

/// Decode a single feed entry, never failing.
///
/// Unknown record types and decode errors produce
/// [`RawEntry::Unsupported`] carrying the record type.
pub fn parse_entry_graceful(value: Value) -> RawEntry {
    let record_type = record_type(&value).map(str::to_owned);

    if let Some(record_type) = record_type
        .as_deref()
        .filter(|t| *t != POST_RECORD_TYPE)
    {
        debug!(record_type, "Entry holds an unsupported record type");
        return RawEntry::Unsupported {
            record_type: record_type.to_string(),
        };
    }

    match parse_entry(value) {
        Ok(entry) => RawEntry::Post(entry),
        Err(e) => {
            warn!(error = %e, "Failed to decode feed entry");
            RawEntry::Unsupported {
                record_type: record_type.unwrap_or_else(|| UNKNOWN_RECORD_TYPE.to_string()),
            }
        }
    }
}

/// Decode a single feed entry.
///
/// # Errors
///
/// Returns `DecodeError::InvalidJson` if the entry does not have the
/// feed entry shape or carries empty identifiers.
pub fn parse_entry(value: Value) -> Result<FeedEntry, DecodeError> {
    if value.get("post").is_none() {
        return Err(DecodeError::MissingField { field: "post" });
    }
    serde_json::from_value(value).map_err(|e| DecodeError::InvalidJson {
        message: e.to_string(),
    })
}

/// `$type` of the entry's record, when present.
fn record_type(value: &Value) -> Option<&str> {
    value
        .get("post")?
        .get("record")?
        .get("$type")?
        .as_str()
}
