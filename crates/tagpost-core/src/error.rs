//! # Error Types
//!
//! Domain-specific error types for tagpost-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tagpost-core errors (this file)                                       │
//! │  ├── ValidationError  - Malformed tag / reader identifiers             │
//! │  └── QueueError       - Operations on entries the queue no longer has  │
//! │                                                                         │
//! │  tagpost-agent errors (separate crate)                                 │
//! │  └── AgentError       - Config, reader, network, serialization         │
//! │                                                                         │
//! │  Flow: ValidationError → AgentError::Validation → dropped + counted    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::queue::EntryId;

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// A validation error on detection data is permanent: retrying the same bytes
/// can never make them valid, so callers drop the detection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value is shorter than allowed.
    #[error("{field} must be at least {min} bytes")]
    TooShort { field: String, min: usize },

    /// Value is longer than allowed.
    #[error("{field} must be at most {max} bytes")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g. non-hex characters in a tag id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Queue Error
// =============================================================================

/// Errors raised by [`crate::OutboundQueue`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The entry is gone: already committed, dropped, or evicted for capacity
    /// while its delivery was in flight.
    #[error("Queue entry {0} not found")]
    UnknownEntry(EntryId),
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "tag_id".to_string(),
        };
        assert_eq!(err.to_string(), "tag_id is required");

        let err = ValidationError::TooLong {
            field: "tag_id".to_string(),
            max: 10,
        };
        assert_eq!(err.to_string(), "tag_id must be at most 10 bytes");
    }

    #[test]
    fn test_queue_error_message() {
        let err = QueueError::UnknownEntry(EntryId::from_raw(7));
        assert_eq!(err.to_string(), "Queue entry #7 not found");
    }
}
