//! Change notifications for list views bound to a window.
//!
//! The window queues [`WindowEvent`]s while it mutates; a view drains them
//! with `take_events` or has them pushed into a [`WindowObserver`].

use std::fmt;

/// A displayed field that may change without rows moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangedField {
    /// Reply counter.
    ReplyCount,
    /// Repost counter.
    RepostCount,
    /// Like counter.
    LikeCount,
    /// Quote counter.
    QuoteCount,
    /// The user's repost URI.
    RepostUri,
    /// The user's like URI.
    LikeUri,
    /// Local deletion flag.
    LocallyDeleted,
    /// End-of-feed marker.
    EndOfFeed,
}

impl fmt::Display for ChangedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReplyCount => "reply_count",
            Self::RepostCount => "repost_count",
            Self::LikeCount => "like_count",
            Self::QuoteCount => "quote_count",
            Self::RepostUri => "repost_uri",
            Self::LikeUri => "like_uri",
            Self::LocallyDeleted => "locally_deleted",
            Self::EndOfFeed => "end_of_feed",
        };
        f.write_str(name)
    }
}

/// A mutation of the window, with inclusive row ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// Rows `first..=last` were inserted.
    Inserted {
        /// First inserted row.
        first: usize,
        /// Last inserted row.
        last: usize,
    },
    /// Rows `first..=last` were removed (indices before removal).
    Removed {
        /// First removed row.
        first: usize,
        /// Last removed row.
        last: usize,
    },
    /// Fields of rows `first..=last` changed.
    Changed {
        /// First changed row.
        first: usize,
        /// Last changed row.
        last: usize,
        /// Fields that changed.
        fields: Vec<ChangedField>,
    },
}

/// Receives window events in the order they happened.
pub trait WindowObserver {
    /// Rows were inserted.
    fn rows_inserted(&mut self, first: usize, last: usize);

    /// Rows were removed.
    fn rows_removed(&mut self, first: usize, last: usize);

    /// Displayed fields of rows changed.
    fn fields_changed(&mut self, first: usize, last: usize, fields: &[ChangedField]);

    /// Routes one event to the matching callback.
    fn on_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Inserted { first, last } => self.rows_inserted(*first, *last),
            WindowEvent::Removed { first, last } => self.rows_removed(*first, *last),
            WindowEvent::Changed {
                first,
                last,
                fields,
            } => self.fields_changed(*first, *last, fields),
        }
    }
}

/// Observer that keeps every event, for tests and replay tooling.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    /// Events received so far.
    pub events: Vec<WindowEvent>,
}

impl WindowObserver for RecordingObserver {
    fn rows_inserted(&mut self, first: usize, last: usize) {
        self.events.push(WindowEvent::Inserted { first, last });
    }

    fn rows_removed(&mut self, first: usize, last: usize) {
        self.events.push(WindowEvent::Removed { first, last });
    }

    fn fields_changed(&mut self, first: usize, last: usize, fields: &[ChangedField]) {
        self.events.push(WindowEvent::Changed {
            first,
            last,
            fields: fields.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_event_routes_to_callbacks() {
        let mut observer = RecordingObserver::default();
        let events = vec![
            WindowEvent::Inserted { first: 0, last: 2 },
            WindowEvent::Removed { first: 1, last: 1 },
            WindowEvent::Changed {
                first: 0,
                last: 1,
                fields: vec![ChangedField::LikeCount],
            },
        ];

        for event in &events {
            observer.on_event(event);
        }

        assert_eq!(observer.events, events);
    }

    #[test]
    fn changed_field_display_is_snake_case() {
        assert_eq!(ChangedField::LocallyDeleted.to_string(), "locally_deleted");
    }
}
