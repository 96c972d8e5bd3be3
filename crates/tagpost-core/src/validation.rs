//! # Validation Module
//!
//! Rules for the identifiers that flow through the pipeline.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Reader driver                                                │
//! │  └── Anti-collision, CRC, BCC checks (external, not our concern)       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: ReaderPoller                                                 │
//! │  └── THIS MODULE: UID length bounds, hex format                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Payload serializer                                           │
//! │  └── Non-empty readerId/tagId before anything reaches the network      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::{DEFAULT_MAX_UID_BYTES, DEFAULT_MIN_UID_BYTES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest reader id accepted (it ends up in logs and, optionally, on the wire).
pub const MAX_READER_ID_LEN: usize = 64;

// =============================================================================
// UID Bounds
// =============================================================================

/// Inclusive byte-length bounds for a well-formed UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidBounds {
    pub min: usize,
    pub max: usize,
}

impl UidBounds {
    pub const fn new(min: usize, max: usize) -> Self {
        UidBounds { min, max }
    }
}

impl Default for UidBounds {
    fn default() -> Self {
        UidBounds::new(DEFAULT_MIN_UID_BYTES, DEFAULT_MAX_UID_BYTES)
    }
}

// =============================================================================
// Validators
// =============================================================================

/// Validates raw UID bytes read from a card.
///
/// ## Rules
/// - Must not be empty
/// - Length must fall within `bounds`
///
/// ## Example
/// ```rust
/// use tagpost_core::validation::{validate_uid_bytes, UidBounds};
///
/// let bounds = UidBounds::new(4, 10);
/// assert!(validate_uid_bytes(&[0x04, 0xA2, 0x1B, 0x7F], bounds).is_ok());
/// assert!(validate_uid_bytes(&[], bounds).is_err());
/// assert!(validate_uid_bytes(&[0xDE, 0xAD], bounds).is_err());
/// ```
pub fn validate_uid_bytes(bytes: &[u8], bounds: UidBounds) -> ValidationResult<()> {
    if bytes.is_empty() {
        return Err(ValidationError::Required {
            field: "tag_id".to_string(),
        });
    }

    if bytes.len() < bounds.min {
        return Err(ValidationError::TooShort {
            field: "tag_id".to_string(),
            min: bounds.min,
        });
    }

    if bytes.len() > bounds.max {
        return Err(ValidationError::TooLong {
            field: "tag_id".to_string(),
            max: bounds.max,
        });
    }

    Ok(())
}

/// Decodes a hex UID as printed by line-oriented readers.
///
/// Surrounding whitespace, a `0x` prefix and `:`/`-`/space separators are
/// tolerated; case is ignored.
pub fn parse_hex_uid(text: &str) -> ValidationResult<Vec<u8>> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect();

    if digits.is_empty() {
        return Err(ValidationError::Required {
            field: "tag_id".to_string(),
        });
    }

    hex::decode(&digits).map_err(|e| ValidationError::InvalidFormat {
        field: "tag_id".to_string(),
        reason: e.to_string(),
    })
}

/// Validates a reader identifier.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_READER_ID_LEN`] characters
/// - Letters, digits, `-`, `_`, `.` and `:` only
pub fn validate_reader_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "reader_id".to_string(),
        });
    }

    if id.len() > MAX_READER_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "reader_id".to_string(),
            max: MAX_READER_ID_LEN,
        });
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "reader_id".to_string(),
            reason: "must contain only letters, numbers, '-', '_', '.' and ':'".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_bounds() {
        let bounds = UidBounds::new(4, 7);
        assert!(validate_uid_bytes(&[1, 2, 3, 4], bounds).is_ok());
        assert!(validate_uid_bytes(&[1, 2, 3, 4, 5, 6, 7], bounds).is_ok());
        assert!(matches!(
            validate_uid_bytes(&[1, 2, 3], bounds),
            Err(ValidationError::TooShort { min: 4, .. })
        ));
        assert!(matches!(
            validate_uid_bytes(&[0; 8], bounds),
            Err(ValidationError::TooLong { max: 7, .. })
        ));
        assert!(matches!(
            validate_uid_bytes(&[], bounds),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_default_bounds_accept_two_bytes() {
        assert!(validate_uid_bytes(&[0xDE, 0xAD], UidBounds::default()).is_ok());
    }

    #[test]
    fn test_parse_hex_uid() {
        assert_eq!(parse_hex_uid("dead").unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(parse_hex_uid("  0x04A21B7F\n").unwrap(), vec![0x04, 0xA2, 0x1B, 0x7F]);
        assert_eq!(parse_hex_uid("04:a2:1b:7f").unwrap(), vec![0x04, 0xA2, 0x1B, 0x7F]);
        assert!(parse_hex_uid("").is_err());
        assert!(parse_hex_uid("xyz").is_err());
        assert!(parse_hex_uid("ABC").is_err()); // odd length
    }

    #[test]
    fn test_reader_id() {
        assert!(validate_reader_id("R1").is_ok());
        assert!(validate_reader_id("AABBCCDDEEFF-door.north").is_ok());
        assert!(validate_reader_id("").is_err());
        assert!(validate_reader_id("has space").is_err());
        assert!(validate_reader_id(&"R".repeat(MAX_READER_ID_LEN + 1)).is_err());
    }
}
