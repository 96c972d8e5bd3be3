//! # Reader Poller
//!
//! Turns reader activity into debounced [`TagEvent`]s.
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Reader 1 │   │ Reader 2 │   │ Reader N │     polled in order, one pass per tick
//! └────┬─────┘   └────┬─────┘   └────┬─────┘
//!      └──────────────┼──────────────┘
//!                     ▼
//!        TagSession → read → TagId (validated, uppercase hex)
//!                     ▼
//!                 Debouncer ──── duplicate inside cooldown ──► dropped
//!                     ▼
//!               Vec<TagEvent>
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use tagpost_core::{ChipVersion, Debouncer, PiccType, TagEvent, TagId, UidBounds};

use crate::reader::{TagReader, TagSession};

struct PolledReader {
    reader: Box<dyn TagReader>,
    active: bool,
}

/// Owns the reader collection and the debounce state.
pub struct ReaderPoller {
    readers: Vec<PolledReader>,
    debouncer: Debouncer,
    bounds: UidBounds,
}

impl ReaderPoller {
    pub fn new(readers: Vec<Box<dyn TagReader>>, cooldown: Duration, bounds: UidBounds) -> Self {
        ReaderPoller {
            readers: readers
                .into_iter()
                .map(|reader| PolledReader {
                    reader,
                    active: false,
                })
                .collect(),
            debouncer: Debouncer::new(cooldown),
            bounds,
        }
    }

    /// Initializes every reader; returns how many are usable.
    ///
    /// A reader that errors, or whose version register reads as no response,
    /// is excluded from polling. The rest carry on.
    pub fn init_readers(&mut self) -> usize {
        for slot in &mut self.readers {
            let id = slot.reader.id().to_string();
            slot.active = match slot.reader.init() {
                Ok(info) => match info.version.map(ChipVersion::from_register) {
                    Some(version) if !version.is_responding() => {
                        warn!(reader = %id, version = %version, "Reader not responding, excluded from polling");
                        false
                    }
                    Some(version) => {
                        info!(reader = %id, version = %version, description = %info.description, "Reader initialized");
                        true
                    }
                    None => {
                        info!(reader = %id, description = %info.description, "Reader initialized");
                        true
                    }
                },
                Err(e) => {
                    warn!(reader = %id, error = %e, "Reader initialization failed, excluded from polling");
                    false
                }
            };
        }

        self.active_readers()
    }

    pub fn active_readers(&self) -> usize {
        self.readers.iter().filter(|slot| slot.active).count()
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// One pass over all active readers.
    pub fn poll_once(&mut self, now: Instant) -> Vec<TagEvent> {
        let mut events = Vec::new();

        for slot in self.readers.iter_mut().filter(|slot| slot.active) {
            let reader: &mut dyn TagReader = &mut *slot.reader;
            if !reader.is_new_tag_present() {
                continue;
            }

            let reader_id = reader.id().to_string();
            let read = {
                let mut session = TagSession::open(reader);
                session.read()
            };

            let Some(read) = read else {
                debug!(reader = %reader_id, "Card present but UID read failed");
                continue;
            };

            let tag_id = match TagId::from_bytes_within(&read.uid, self.bounds) {
                Ok(tag_id) => tag_id,
                Err(e) => {
                    warn!(reader = %reader_id, uid_len = read.uid.len(), error = %e, "Discarding malformed UID");
                    continue;
                }
            };

            if let Some(sak) = read.sak {
                debug!(reader = %reader_id, tag = %tag_id, picc = %PiccType::from_sak(sak), "Card selected");
            }

            if self.debouncer.should_emit(&reader_id, &tag_id, now) {
                events.push(TagEvent::new(reader_id, tag_id, now));
            } else {
                trace!(reader = %reader_id, tag = %tag_id, "Duplicate inside cooldown");
            }
        }

        events
    }
}
