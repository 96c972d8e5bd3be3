//! # Tag Events
//!
//! The immutable value that travels through the pipeline.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TagEvent                                                               │
//! │  ─────────                                                              │
//! │  reader_id    "R1"             configured reader name                   │
//! │  tag_id       "04A21B7F"       UID as uppercase hex (TagId)            │
//! │  detected_at  Instant          monotonic, never wall-clock             │
//! │                                                                         │
//! │  key() = (reader_id, tag_id)   identity used for debouncing            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::time::Instant;

use crate::validation::{parse_hex_uid, validate_uid_bytes, UidBounds, ValidationResult};

// =============================================================================
// Tag Identifier
// =============================================================================

/// A tag UID rendered as uppercase hexadecimal.
///
/// Can only be built through the validating constructors, so a `TagId` in hand
/// is always non-empty uppercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(String);

impl TagId {
    /// Builds a tag id from raw UID bytes using the default length bounds.
    pub fn from_bytes(bytes: &[u8]) -> ValidationResult<Self> {
        Self::from_bytes_within(bytes, UidBounds::default())
    }

    /// Builds a tag id from raw UID bytes, enforcing `bounds`.
    pub fn from_bytes_within(bytes: &[u8], bounds: UidBounds) -> ValidationResult<Self> {
        validate_uid_bytes(bytes, bounds)?;
        Ok(TagId(hex::encode_upper(bytes)))
    }

    /// Parses a hex string (any case, optional separators) into a tag id.
    pub fn parse(text: &str, bounds: UidBounds) -> ValidationResult<Self> {
        let bytes = parse_hex_uid(text)?;
        Self::from_bytes_within(&bytes, bounds)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of UID bytes this id encodes.
    pub fn byte_len(&self) -> usize {
        self.0.len() / 2
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TagId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Tag Event
// =============================================================================

/// Debounce identity of a detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagKey {
    pub reader_id: String,
    pub tag_id: TagId,
}

/// One detected tag presentation.
#[derive(Debug, Clone)]
pub struct TagEvent {
    reader_id: String,
    tag_id: TagId,
    detected_at: Instant,
}

impl TagEvent {
    pub fn new(reader_id: impl Into<String>, tag_id: TagId, detected_at: Instant) -> Self {
        TagEvent {
            reader_id: reader_id.into(),
            tag_id,
            detected_at,
        }
    }

    pub fn reader_id(&self) -> &str {
        &self.reader_id
    }

    pub fn tag_id(&self) -> &TagId {
        &self.tag_id
    }

    pub fn detected_at(&self) -> Instant {
        self.detected_at
    }

    pub fn key(&self) -> TagKey {
        TagKey {
            reader_id: self.reader_id.clone(),
            tag_id: self.tag_id.clone(),
        }
    }
}

/// Events compare by `(reader_id, tag_id)`; the detection time is ignored.
impl PartialEq for TagEvent {
    fn eq(&self, other: &Self) -> bool {
        self.reader_id == other.reader_id && self.tag_id == other.tag_id
    }
}

impl Eq for TagEvent {}

// =============================================================================
// Unit Tests
// =============================================================================
