//! # Reporter
//!
//! Delivers queued detections, one at a time, with exponential backoff.
//!
//! ## Tick Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Reporter::tick                                 │
//! │                                                                         │
//! │  in flight? ──yes──► wait ≤ send_slice ─┬─ answered ──► settle          │
//! │      │                                  ├─ past timeout ► abort, settle │
//! │      no                                 └─ still going ► InFlight       │
//! │      ▼                                                                  │
//! │  peek_ready ── none ──► Idle                                            │
//! │      │                                                                  │
//! │  offline? ──yes──► reschedule (no transport call)                       │
//! │      │                                                                  │
//! │  build payload ── error ──► discard (Dropped)                           │
//! │      │                                                                  │
//! │  spawn transport.send ──► wait ≤ send_slice ──► (as above)              │
//! │                                                                         │
//! │  settle:  2xx ──► commit                                                │
//! │           other / error / timeout ──► reschedule(min(base·2^n, max))    │
//! │           entry gone (evicted meanwhile) ──► Orphaned                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The spawned send never touches the queue; the queue is only changed from
//! `tick`, on the caller's task.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tagpost_core::{BackoffPolicy, EntryId, OutboundQueue, Rescheduled, TagId};

use crate::config::NodeConfig;
use crate::error::{AgentError, AgentResult};
use crate::payload::PayloadBuilder;
use crate::transport::{OutboundRequest, Transport, TransportResponse};

// =============================================================================
// Settings and Outcome
// =============================================================================

/// Delivery parameters.
#[derive(Debug, Clone)]
pub struct ReporterSettings {
    pub endpoint: String,
    pub policy: BackoffPolicy,
    /// Upper bound for one attempt, measured from when it started.
    pub request_timeout: Duration,
    /// Longest a single tick waits on the transport.
    pub send_slice: Duration,
}

impl ReporterSettings {
    pub fn from_config(config: &NodeConfig) -> Self {
        ReporterSettings {
            endpoint: config.endpoint.url.clone(),
            policy: config.backoff_policy(),
            request_timeout: config.request_timeout(),
            send_slice: config.send_slice(),
        }
    }
}

/// What one [`Reporter::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Nothing ready.
    Idle,
    /// A request is still running; it is resumed next tick.
    InFlight { entry: EntryId },
    Delivered { entry: EntryId, status: u16 },
    /// Failed attempt; the entry is retried after `delay`.
    Rescheduled {
        entry: EntryId,
        attempts: u32,
        delay: Duration,
    },
    /// Failed attempt that used up the retry budget; the entry is gone.
    Exhausted { entry: EntryId, tag: TagId },
    /// Payload could not be built; the entry is gone.
    Dropped { entry: EntryId },
    /// The entry was evicted while its request was in flight.
    Orphaned { entry: EntryId },
}

struct InFlight {
    entry: EntryId,
    handle: JoinHandle<AgentResult<TransportResponse>>,
    deadline: Instant,
}

// =============================================================================
// Reporter
// =============================================================================

pub struct Reporter {
    transport: Arc<dyn Transport>,
    settings: ReporterSettings,
    payload: PayloadBuilder,
    in_flight: Option<InFlight>,
    last_error: Option<String>,
}

impl Reporter {
    pub fn new(transport: Arc<dyn Transport>, settings: ReporterSettings, payload: PayloadBuilder) -> Self {
        Reporter {
            transport,
            settings,
            payload,
            in_flight: None,
            last_error: None,
        }
    }

    pub fn identity(&self) -> &str {
        self.payload.identity()
    }

    pub fn set_identity(&mut self, identity: impl Into<String>) {
        self.payload.set_identity(identity);
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Most recent delivery failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Performs at most one delivery step.
    pub async fn tick(&mut self, queue: &mut OutboundQueue, now: Instant, online: bool) -> DeliveryOutcome {
        if let Some(flight) = self.in_flight.take() {
            return self.resume(flight, queue, now).await;
        }

        let Some(entry) = queue.peek_ready(now) else {
            return DeliveryOutcome::Idle;
        };
        let (id, attempts) = (entry.id(), entry.attempts());

        if !online {
            return self.fail(queue, id, attempts, now, AgentError::Offline);
        }

        let body = match self.payload.body_for(entry.event()) {
            Ok(body) => body,
            Err(e) => {
                warn!(entry = %id, error = %e, "Dropping detection that cannot be serialized");
                self.last_error = Some(e.to_string());
                if let Err(e) = queue.discard(id) {
                    debug!(error = %e, "Entry already gone");
                }
                return DeliveryOutcome::Dropped { entry: id };
            }
        };

        let request = OutboundRequest::json(&self.settings.endpoint, body, self.settings.request_timeout);
        let transport = Arc::clone(&self.transport);
        let handle = tokio::spawn(async move { transport.send(&request).await });

        debug!(entry = %id, attempts, "Delivery started");
        let flight = InFlight {
            entry: id,
            handle,
            deadline: now + self.settings.request_timeout,
        };
        self.resume(flight, queue, now).await
    }

    async fn resume(&mut self, mut flight: InFlight, queue: &mut OutboundQueue, now: Instant) -> DeliveryOutcome {
        let waited = tokio::time::timeout(self.settings.send_slice, &mut flight.handle).await;
        let result = match waited {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AgentError::Transport(format!("send task failed: {join_error}"))),
            Err(_) if now >= flight.deadline => {
                flight.handle.abort();
                let timeout_ms = u64::try_from(self.settings.request_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(AgentError::Timeout(timeout_ms))
            }
            Err(_) => {
                let entry = flight.entry;
                self.in_flight = Some(flight);
                return DeliveryOutcome::InFlight { entry };
            }
        };

        self.settle(queue, flight.entry, result, now)
    }

    fn settle(
        &mut self,
        queue: &mut OutboundQueue,
        id: EntryId,
        result: AgentResult<TransportResponse>,
        now: Instant,
    ) -> DeliveryOutcome {
        let Some(attempts) = queue.get(id).map(|entry| entry.attempts()) else {
            debug!(entry = %id, "Entry evicted while its delivery was in flight");
            return DeliveryOutcome::Orphaned { entry: id };
        };

        match result {
            Ok(response) if response.is_success() => match queue.commit(id) {
                Ok(event) => {
                    info!(entry = %id, reader = %event.reader_id(), tag = %event.tag_id(), status = response.status, "Detection delivered");
                    DeliveryOutcome::Delivered {
                        entry: id,
                        status: response.status,
                    }
                }
                Err(_) => DeliveryOutcome::Orphaned { entry: id },
            },
            Ok(response) => self.fail(queue, id, attempts, now, AgentError::HttpStatus { status: response.status }),
            Err(e) => self.fail(queue, id, attempts, now, e),
        }
    }

    fn fail(
        &mut self,
        queue: &mut OutboundQueue,
        id: EntryId,
        attempts: u32,
        now: Instant,
        error: AgentError,
    ) -> DeliveryOutcome {
        let delay = self.settings.policy.delay_for(attempts);
        self.last_error = Some(error.to_string());

        match queue.reschedule(id, delay, now) {
            Ok(Rescheduled::Scheduled { attempts, .. }) => {
                debug!(entry = %id, attempts, ?delay, error = %error, "Delivery failed, retrying later");
                DeliveryOutcome::Rescheduled {
                    entry: id,
                    attempts,
                    delay,
                }
            }
            Ok(Rescheduled::Exhausted(event)) => {
                warn!(entry = %id, reader = %event.reader_id(), tag = %event.tag_id(), error = %error, "Retry budget exhausted, detection dropped");
                DeliveryOutcome::Exhausted {
                    entry: id,
                    tag: event.tag_id().clone(),
                }
            }
            Err(_) => DeliveryOutcome::Orphaned { entry: id },
        }
    }

    /// Aborts any in-flight request.
    pub fn abort(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            debug!(entry = %flight.entry, "Aborting in-flight delivery");
            flight.handle.abort();
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.abort();
    }
}
