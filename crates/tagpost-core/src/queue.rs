//! # Outbound Queue
//!
//! Bounded FIFO of detections waiting for delivery.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   enqueue ──► [ #1 ready ][ #2 wait 4s ][ #3 ready ] ◄── capacity N    │
//! │                    │                                                    │
//! │                    │ peek_ready(now) returns #1, then #3 while #2 waits │
//! │                    ▼                                                    │
//! │        ┌───────────┴────────────┬────────────────────┐                 │
//! │        ▼                        ▼                    ▼                  │
//! │     commit                 reschedule             discard              │
//! │   (delivered)       attempts += 1, retry later  (bad data)             │
//! │                             │                                           │
//! │                             └─ attempts > max_attempts → Exhausted     │
//! │                                                                         │
//! │  FULL QUEUE: the oldest entry is evicted, the poller is never blocked  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Contents live in RAM only; a power cycle loses whatever is still queued.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::QueueError;
use crate::event::TagEvent;

// =============================================================================
// Entry Types
// =============================================================================

/// Queue-assigned identifier, increasing in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub const fn from_raw(raw: u64) -> Self {
        EntryId(raw)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pending delivery.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    id: EntryId,
    event: TagEvent,
    attempts: u32,
    next_retry_at: Instant,
    enqueued_at: Instant,
}

impl QueueEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn event(&self) -> &TagEvent {
        &self.event
    }

    /// Failed delivery attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_retry_at(&self) -> Instant {
        self.next_retry_at
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    fn is_ready(&self, now: Instant) -> bool {
        self.next_retry_at <= now
    }
}

/// Result of [`OutboundQueue::reschedule`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rescheduled {
    /// The entry stays queued and becomes ready again at `next_retry_at`.
    Scheduled { attempts: u32, next_retry_at: Instant },

    /// Retry budget exhausted; the entry was removed. Reported exactly once.
    Exhausted(TagEvent),
}

/// Lifetime counters, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub evicted: u64,
    pub permanent_failures: u64,
}

// =============================================================================
// Outbound Queue
// =============================================================================

/// Bounded FIFO with oldest-first eviction.
#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
    max_attempts: u32,
    next_id: u64,
    stats: QueueStats,
}

impl OutboundQueue {
    /// Creates an empty queue. A zero capacity is treated as one.
    pub fn new(capacity: usize, max_attempts: u32) -> Self {
        let capacity = capacity.max(1);
        OutboundQueue {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            max_attempts,
            next_id: 1,
            stats: QueueStats::default(),
        }
    }

    /// Appends a new entry, ready immediately.
    ///
    /// Returns false when the oldest entry had to be evicted to make room.
    /// Never fails and never blocks.
    pub fn enqueue(&mut self, event: TagEvent, now: Instant) -> bool {
        let mut evicted = false;
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.stats.evicted += 1;
            evicted = true;
        }

        let id = EntryId(self.next_id);
        self.next_id += 1;

        self.entries.push_back(QueueEntry {
            id,
            event,
            attempts: 0,
            next_retry_at: now,
            enqueued_at: now,
        });
        self.stats.enqueued += 1;

        !evicted
    }

    /// Oldest entry whose retry time has come, left in place.
    pub fn peek_ready(&self, now: Instant) -> Option<&QueueEntry> {
        self.entries.iter().find(|entry| entry.is_ready(now))
    }

    /// Removes an entry after confirmed delivery.
    pub fn commit(&mut self, id: EntryId) -> Result<TagEvent, QueueError> {
        let entry = self.remove(id)?;
        self.stats.delivered += 1;
        Ok(entry.event)
    }

    /// Records a failed attempt and pushes the entry's retry time out by
    /// `delay`. The entry keeps its position in the queue.
    ///
    /// When the new attempt count would exceed `max_attempts` the entry is
    /// removed and counted as a permanent failure instead.
    pub fn reschedule(
        &mut self,
        id: EntryId,
        delay: Duration,
        now: Instant,
    ) -> Result<Rescheduled, QueueError> {
        let index = self.position(id)?;
        let attempts = self.entries[index].attempts.saturating_add(1);

        if attempts > self.max_attempts {
            let entry = self.remove(id)?;
            self.stats.permanent_failures += 1;
            return Ok(Rescheduled::Exhausted(entry.event));
        }

        let entry = &mut self.entries[index];
        entry.attempts = attempts;
        entry.next_retry_at = now + delay;

        Ok(Rescheduled::Scheduled {
            attempts,
            next_retry_at: entry.next_retry_at,
        })
    }

    /// Drops an entry whose data can never be delivered.
    pub fn discard(&mut self, id: EntryId) -> Result<TagEvent, QueueError> {
        let entry = self.remove(id)?;
        self.stats.permanent_failures += 1;
        Ok(entry.event)
    }

    pub fn get(&self, id: EntryId) -> Option<&QueueEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Iterates entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    fn position(&self, id: EntryId) -> Result<usize, QueueError> {
        self.entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(QueueError::UnknownEntry(id))
    }

    fn remove(&mut self, id: EntryId) -> Result<QueueEntry, QueueError> {
        let index = self.position(id)?;
        self.entries
            .remove(index)
            .ok_or(QueueError::UnknownEntry(id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TagId;

    fn event(reader: &str, bytes: &[u8], at: Instant) -> TagEvent {
        TagEvent::new(reader, TagId::from_bytes(bytes).unwrap(), at)
    }

    #[test]
    fn test_fifo_order_when_all_ready() {
        let t0 = Instant::now();
        let mut queue = OutboundQueue::new(8, 3);
        queue.enqueue(event("R1", &[0xAA], t0), t0);
        queue.enqueue(event("R1", &[0xBB], t0), t0);

        let first = queue.peek_ready(t0).unwrap().id();
        assert_eq!(queue.commit(first).unwrap().tag_id().as_str(), "AA");

        let second = queue.peek_ready(t0).unwrap().id();
        assert_eq!(queue.commit(second).unwrap().tag_id().as_str(), "BB");

        assert!(queue.peek_ready(t0).is_none());
        assert_eq!(queue.stats().delivered, 2);
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let t0 = Instant::now();
        let capacity = 4;
        let mut queue = OutboundQueue::new(capacity, 3);

        let mut no_eviction = Vec::new();
        for i in 0..(capacity as u8 + 3) {
            no_eviction.push(queue.enqueue(event("R1", &[i], t0), t0));
        }

        assert_eq!(no_eviction, vec![true, true, true, true, false, false, false]);
        assert_eq!(queue.len(), capacity);
        assert_eq!(queue.stats().evicted, 3);

        let kept: Vec<&str> = queue.iter().map(|e| e.event().tag_id().as_str()).collect();
        assert_eq!(kept, vec!["03", "04", "05", "06"]);
    }

    #[test]
    fn test_not_ready_entries_are_skipped_but_keep_position() {
        let t0 = Instant::now();
        let mut queue = OutboundQueue::new(8, 5);
        queue.enqueue(event("R1", &[0x01], t0), t0);
        queue.enqueue(event("R1", &[0x02], t0), t0);

        let first = queue.peek_ready(t0).unwrap().id();
        queue.reschedule(first, Duration::from_secs(4), t0).unwrap();

        // #1 waits, #2 goes ahead
        let ready = queue.peek_ready(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(ready.event().tag_id().as_str(), "02");

        // once both are ready, #1 is first again
        let ready = queue.peek_ready(t0 + Duration::from_secs(4)).unwrap();
        assert_eq!(ready.id(), first);
    }

    #[test]
    fn test_next_retry_strictly_increases() {
        let t0 = Instant::now();
        let policy = crate::BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(8));
        let mut queue = OutboundQueue::new(8, 10);
        queue.enqueue(event("R1", &[0x01], t0), t0);

        let mut now = t0;
        let mut previous = t0;
        for _ in 0..6 {
            let entry = queue.peek_ready(now).unwrap();
            let (id, attempts) = (entry.id(), entry.attempts());
            match queue.reschedule(id, policy.delay_for(attempts), now).unwrap() {
                Rescheduled::Scheduled { next_retry_at, .. } => {
                    assert!(next_retry_at > previous);
                    previous = next_retry_at;
                    now = next_retry_at;
                }
                Rescheduled::Exhausted(_) => panic!("budget should not be exhausted"),
            }
        }
    }

    #[test]
    fn test_retry_exhaustion_reports_once() {
        let t0 = Instant::now();
        let max_attempts = 3;
        let mut queue = OutboundQueue::new(8, max_attempts);
        queue.enqueue(event("R1", &[0x01], t0), t0);
        let id = queue.peek_ready(t0).unwrap().id();

        let mut exhausted = 0;
        for _ in 0..max_attempts + 1 {
            match queue.reschedule(id, Duration::ZERO, t0) {
                Ok(Rescheduled::Scheduled { attempts, .. }) => assert!(attempts <= max_attempts),
                Ok(Rescheduled::Exhausted(event)) => {
                    assert_eq!(event.tag_id().as_str(), "01");
                    exhausted += 1;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(exhausted, 1);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().permanent_failures, 1);
        assert_eq!(
            queue.reschedule(id, Duration::ZERO, t0),
            Err(QueueError::UnknownEntry(id))
        );
    }

    #[test]
    fn test_evicted_entry_is_unknown() {
        let t0 = Instant::now();
        let mut queue = OutboundQueue::new(1, 3);
        queue.enqueue(event("R1", &[0x01], t0), t0);
        let id = queue.peek_ready(t0).unwrap().id();
        queue.enqueue(event("R1", &[0x02], t0), t0);

        assert_eq!(queue.commit(id), Err(QueueError::UnknownEntry(id)));
    }

    #[test]
    fn test_discard_counts_permanent_failure() {
        let t0 = Instant::now();
        let mut queue = OutboundQueue::new(4, 3);
        queue.enqueue(event("R1", &[0x01], t0), t0);
        let id = queue.peek_ready(t0).unwrap().id();

        queue.discard(id).unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.stats().permanent_failures, 1);
    }
}
