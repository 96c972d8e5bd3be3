//! # Debouncer
//!
//! Suppresses repeated detections of the same tag on the same reader while
//! the card is still sitting on the antenna.
//!
//! ```text
//!   accepted            suppressed     suppressed          accepted
//!      │                    │              │                   │
//!  ────●────────────────────○──────────────○───────────────────●────► t
//!      │◄──────────── cooldown ──────────────►│
//! ```
//!
//! A suppressed detection does not extend the window: the cooldown always runs
//! from the last *accepted* detection.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::event::{TagId, TagKey};

/// Cooldown-window duplicate filter keyed by `(reader_id, tag_id)`.
#[derive(Debug)]
pub struct Debouncer {
    cooldown: Duration,
    last_accepted: HashMap<TagKey, Instant>,
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Debouncer {
            cooldown,
            last_accepted: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns true if this detection should be forwarded, recording `now` as
    /// the key's last accepted time.
    ///
    /// Expired keys are purged on every call, so the table never holds more
    /// than the keys accepted within the last cooldown window.
    pub fn should_emit(&mut self, reader_id: &str, tag_id: &TagId, now: Instant) -> bool {
        self.purge_expired(now);

        let key = TagKey {
            reader_id: reader_id.to_string(),
            tag_id: tag_id.clone(),
        };

        if self.last_accepted.contains_key(&key) {
            return false;
        }

        self.last_accepted.insert(key, now);
        true
    }

    /// Number of keys currently inside their cooldown window.
    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }

    fn purge_expired(&mut self, now: Instant) {
        let cooldown = self.cooldown;
        self.last_accepted
            .retain(|_, accepted_at| now.saturating_duration_since(*accepted_at) < cooldown);
    }
}
