//! # tagpost-core: Pure Pipeline Logic for tagpost
//!
//! This crate holds the detection pipeline as plain data structures with zero
//! I/O dependencies. Every operation that depends on time takes `now` as an
//! argument.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        tagpost Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/node (binary)                           │   │
//! │  │        tracing setup ──► config ──► Agent::run                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tagpost-agent                                │   │
//! │  │    ReaderPoller, Reporter, Agent, HttpTransport, adapters      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tagpost-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   event   │  │ debounce  │  │   queue   │  │  backoff  │  │   │
//! │  │   │ TagEvent  │  │ Debouncer │  │ Outbound  │  │  Policy   │  │   │
//! │  │   │  TagId    │  │           │  │  Queue    │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO HARDWARE • EXPLICIT CLOCK           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`event`] - `TagEvent`, `TagId`, `TagKey`
//! - [`debounce`] - cooldown-window duplicate suppression
//! - [`queue`] - bounded FIFO of pending deliveries
//! - [`backoff`] - exponential retry delay policy
//! - [`picc`] - card type and reader chip version decoding
//! - [`validation`] - tag id and reader id rules
//! - [`error`] - domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use tagpost_core::{Debouncer, OutboundQueue, TagEvent, TagId};
//!
//! let now = Instant::now();
//! let tag = TagId::from_bytes(&[0xDE, 0xAD]).unwrap();
//! assert_eq!(tag.as_str(), "DEAD");
//!
//! let mut debouncer = Debouncer::new(Duration::from_secs(3));
//! assert!(debouncer.should_emit("R1", &tag, now));
//! assert!(!debouncer.should_emit("R1", &tag, now));
//!
//! let mut queue = OutboundQueue::new(16, 5);
//! assert!(queue.enqueue(TagEvent::new("R1", tag, now), now));
//! assert!(queue.peek_ready(now).is_some());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backoff;
pub mod debounce;
pub mod error;
pub mod event;
pub mod picc;
pub mod queue;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use backoff::BackoffPolicy;
pub use debounce::Debouncer;
pub use error::{QueueError, ValidationError};
pub use event::{TagEvent, TagId, TagKey};
pub use picc::{ChipVersion, PiccType};
pub use queue::{EntryId, OutboundQueue, QueueEntry, QueueStats, Rescheduled};
pub use validation::UidBounds;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Smallest UID accepted by default.
///
/// The default is permissive; deployments that only see ISO/IEC 14443 cards
/// can raise it to 4.
pub const DEFAULT_MIN_UID_BYTES: usize = 1;

/// Largest UID accepted by default (triple-size ISO/IEC 14443 UID).
pub const DEFAULT_MAX_UID_BYTES: usize = 10;
