//! Core identifier newtypes with smart constructors.
//!
//! All string identifiers validate non-empty input at construction time.
//! Deserialization goes through the same smart constructors, so a decoded
//! post always carries a usable `(uri, cid)` pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// Defines a validated string newtype with `new`, `as_str`, `Display` and
/// serde support through `TryFrom<String>`.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $error:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Smart constructor: validates a non-empty ", $label, ".")]
            pub fn new(raw: impl Into<String>) -> Result<Self, $error> {
                let raw = raw.into();
                if raw.is_empty() {
                    return Err($error::Empty);
                }
                Ok(Self(raw))
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $error;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_identifier!(
    /// Content identifier of a post (hash of the record).
    ///
    /// Two rows showing the same record share a cid, which is what the
    /// window de-duplicates on.
    Cid,
    InvalidCid,
    "content identifier"
);

string_identifier!(
    /// `at://` URI of a post record.
    PostUri,
    InvalidUri,
    "post URI"
);

string_identifier!(
    /// Decentralized identifier of an account.
    Did,
    InvalidDid,
    "DID"
);

string_identifier!(
    /// Opaque pagination token handed out by the backend.
    ///
    /// The backend signals "no further pages" by omitting the cursor, so an
    /// empty token is never valid.
    Cursor,
    InvalidCursor,
    "cursor"
);

/// Identifier of a gap placeholder inside one feed window.
///
/// Always positive. Allocated by [`GapIdAllocator`], never reused within the
/// allocator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GapId(NonZeroU64);

impl GapId {
    /// Smart constructor: rejects zero.
    ///
    /// # Examples
    ///
    /// ```
    /// # use skyfeed::model::GapId;
    /// assert!(GapId::new(0).is_none());
    /// assert_eq!(GapId::new(7).map(GapId::get), Some(7));
    /// ```
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Numeric value of the id.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for GapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic gap id source, owned by a single feed window.
#[derive(Debug, Clone)]
pub struct GapIdAllocator {
    next: NonZeroU64,
}

impl GapIdAllocator {
    /// Creates an allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: NonZeroU64::MIN,
        }
    }

    /// Hands out the next id.
    pub fn allocate(&mut self) -> GapId {
        let id = GapId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

impl Default for GapIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Error Types =====

/// Rejected content identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCid {
    /// The cid string was empty.
    #[error("CID cannot be empty")]
    Empty,
}

/// Rejected post URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidUri {
    /// The URI string was empty.
    #[error("Post URI cannot be empty")]
    Empty,
}

/// Rejected DID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidDid {
    /// The DID string was empty.
    #[error("DID cannot be empty")]
    Empty,
}

/// Rejected cursor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCursor {
    /// The cursor string was empty.
    #[error("Cursor cannot be empty")]
    Empty,
}

// ===== Tests =====
