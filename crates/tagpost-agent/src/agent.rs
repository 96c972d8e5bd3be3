//! # Node Agent
//!
//! Main orchestrator: owns the readers, the queue, and the reporter, and drives
//! them through the node lifecycle.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌─────────┐  ≥1 reader   ┌────────────┐   acquired    ┌─────────┐    │
//! │   │ Booting │ ───────────► │ Connecting │ ────────────► │ Running │    │
//! │   └────┬────┘              └─────┬──────┘               └──┬───▲──┘    │
//! │        │ no reader               │ attempts used up   link │   │ link  │
//! │        ▼                         ▼                    lost │   │ back  │
//! │   ┌─────────┐              ┌────────────┐ ◄────────────────┘   │       │
//! │   │ Halted  │              │  Degraded  │ ─────────────────────┘       │
//! │   └─────────┘              └────────────┘                              │
//! │                                                                         │
//! │  Running:  poll → enqueue → reporter.tick(online)                      │
//! │  Degraded: poll → enqueue → reporter.tick(offline, fails fast)         │
//! │            re-acquire on an exponential schedule                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Task Model
//! Everything runs on the task that calls [`Agent::run`]. The only other task
//! is the reporter's in-flight request, which never touches the queue.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use tagpost_core::{OutboundQueue, QueueStats};

use crate::config::NodeConfig;
use crate::connectivity::Connectivity;
use crate::error::{AgentError, AgentResult};
use crate::payload::PayloadBuilder;
use crate::poller::ReaderPoller;
use crate::reader::TagReader;
use crate::reporter::{DeliveryOutcome, Reporter, ReporterSettings};
use crate::transport::Transport;

// =============================================================================
// State and Status
// =============================================================================

/// Lifecycle state of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Booting,
    Connecting,
    Running,
    Degraded,
    Halted,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Booting => write!(f, "booting"),
            AgentState::Connecting => write!(f, "connecting"),
            AgentState::Running => write!(f, "running"),
            AgentState::Degraded => write!(f, "degraded"),
            AgentState::Halted => write!(f, "halted"),
        }
    }
}

/// Snapshot for external queries.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub state: AgentState,

    /// Identity reported as `readerId` in device mode.
    pub reporter_id: String,

    /// Readers that passed initialization.
    pub active_readers: usize,

    /// Detections waiting for delivery.
    pub pending: usize,

    pub stats: QueueStats,

    /// Wall-clock time of the last confirmed delivery.
    pub last_delivery: Option<DateTime<Utc>>,

    /// Last error message (if any).
    pub last_error: Option<String>,
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus {
            state: AgentState::Booting,
            reporter_id: String::new(),
            active_readers: 0,
            pending: 0,
            stats: QueueStats::default(),
            last_delivery: None,
            last_error: None,
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable control handle for a running agent.
///
/// Dropping every handle stops the agent as if `shutdown` had been called.
#[derive(Clone)]
pub struct AgentHandle {
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<AgentStatus>>,
}

impl AgentHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> AgentResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| AgentError::ChannelError("Shutdown channel closed".into()))
    }

    /// Returns the current status.
    pub async fn status(&self) -> AgentStatus {
        self.status.read().await.clone()
    }
}

// =============================================================================
// Agent
// =============================================================================

/// Current time on the runtime clock (follows a paused test clock).
fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub struct Agent {
    state: AgentState,
    poller: ReaderPoller,
    queue: OutboundQueue,
    reporter: Reporter,
    connectivity: Arc<dyn Connectivity>,

    poll_interval: Duration,
    connect_timeout: Duration,
    connect_attempts: u32,
    /// Per-attempt bound while Degraded, kept short so polling is not stalled.
    reacquire_timeout: Duration,
    reconnect: ExponentialBackoff,
    next_reconnect_at: Option<Instant>,

    last_delivery: Option<DateTime<Utc>>,
    last_error: Option<String>,
    status: Arc<RwLock<AgentStatus>>,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl Agent {
    /// Creates an agent and returns a handle for controlling it.
    ///
    /// `config` is assumed validated.
    pub fn new(
        config: &NodeConfig,
        readers: Vec<Box<dyn TagReader>>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> (Self, AgentHandle) {
        let identity = connectivity.identity();
        let payload = PayloadBuilder::new(identity.clone(), config.payload.reader_id_source);
        let reporter = Reporter::new(transport, ReporterSettings::from_config(config), payload);

        let reconnect_initial = Duration::from_millis(config.network.reconnect_initial_ms);
        let reconnect = ExponentialBackoff {
            current_interval: reconnect_initial,
            initial_interval: reconnect_initial,
            max_interval: Duration::from_secs(config.network.reconnect_max_secs),
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let status = Arc::new(RwLock::new(AgentStatus {
            reporter_id: identity,
            ..Default::default()
        }));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let agent = Agent {
            state: AgentState::Booting,
            poller: ReaderPoller::new(readers, config.cooldown(), config.uid_bounds()),
            queue: OutboundQueue::new(config.delivery.queue_capacity, config.delivery.max_attempts),
            reporter,
            connectivity,
            poll_interval: config.poll_interval(),
            connect_timeout: config.connect_timeout(),
            connect_attempts: config.network.connect_attempts.max(1),
            reacquire_timeout: config.send_slice(),
            reconnect,
            next_reconnect_at: None,
            last_delivery: None,
            last_error: None,
            status: Arc::clone(&status),
            shutdown_rx: Some(shutdown_rx),
        };

        (agent, AgentHandle { shutdown_tx, status })
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Runs the agent until shutdown.
    ///
    /// Only a boot with no usable reader returns an error.
    pub async fn run(mut self) -> AgentResult<()> {
        let Some(mut shutdown_rx) = self.shutdown_rx.take() else {
            return Err(AgentError::ShuttingDown);
        };

        info!(readers = self.poller.reader_count(), "Agent starting");
        self.boot().await?;

        let connected = tokio::select! {
            _ = self.connect() => true,
            _ = shutdown_rx.recv() => false,
        };
        if !connected {
            info!("Shutdown requested while connecting");
            self.halt().await;
            return Ok(());
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(clock_now()).await;
                }

                _ = shutdown_rx.recv() => {
                    info!("Agent received shutdown");
                    break;
                }
            }
        }

        self.halt().await;
        info!(pending = self.queue.len(), "Agent stopped");
        Ok(())
    }

    /// Boots the readers and acquires the network.
    ///
    /// Ends in `Running` or `Degraded`, or fails with `NoReaders`.
    pub async fn start(&mut self) -> AgentResult<()> {
        self.boot().await?;
        self.connect().await;
        Ok(())
    }

    async fn boot(&mut self) -> AgentResult<()> {
        self.set_state(AgentState::Booting).await;

        let active = self.poller.init_readers();
        self.status.write().await.active_readers = active;

        if active == 0 {
            error!(configured = self.poller.reader_count(), "No reader initialized");
            self.last_error = Some(AgentError::NoReaders.to_string());
            self.halt().await;
            return Err(AgentError::NoReaders);
        }

        info!(active, configured = self.poller.reader_count(), "Readers ready");
        Ok(())
    }

    async fn connect(&mut self) {
        self.set_state(AgentState::Connecting).await;

        for attempt in 1..=self.connect_attempts {
            match self.connectivity.acquire(self.connect_timeout).await {
                Ok(()) => {
                    self.on_connected().await;
                    return;
                }
                Err(e) => {
                    warn!(attempt, max_attempts = self.connect_attempts, error = %e, "Network acquisition failed");
                    self.last_error = Some(e.to_string());
                }
            }
        }

        self.enter_degraded(clock_now()).await;
    }

    /// One cycle: connectivity check, one poll pass, one delivery step.
    pub async fn tick(&mut self, now: Instant) -> DeliveryOutcome {
        self.check_connectivity(now).await;

        for event in self.poller.poll_once(now) {
            info!(reader = %event.reader_id(), tag = %event.tag_id(), "Tag detected");
            if !self.queue.enqueue(event, now) {
                warn!(capacity = self.queue.capacity(), "Queue full, oldest detection evicted");
            }
        }

        let online = self.state == AgentState::Running;
        let outcome = self.reporter.tick(&mut self.queue, now, online).await;

        match &outcome {
            DeliveryOutcome::Delivered { .. } => self.last_delivery = Some(Utc::now()),
            DeliveryOutcome::Rescheduled { .. }
            | DeliveryOutcome::Exhausted { .. }
            | DeliveryOutcome::Dropped { .. } => {
                self.last_error = self.reporter.last_error().map(str::to_string);
            }
            _ => {}
        }

        self.publish().await;
        outcome
    }

    async fn check_connectivity(&mut self, now: Instant) {
        match self.state {
            AgentState::Running if !self.connectivity.is_connected() => {
                warn!("Connectivity lost");
                self.enter_degraded(now).await;
            }
            AgentState::Degraded => {
                if self.connectivity.is_connected() {
                    info!("Connectivity restored");
                    self.on_connected().await;
                    return;
                }

                if self.next_reconnect_at.is_some_and(|at| now < at) {
                    return;
                }

                match self.connectivity.acquire(self.reacquire_timeout).await {
                    Ok(()) => {
                        info!("Network re-acquired");
                        self.on_connected().await;
                    }
                    Err(e) => {
                        let delay = self.reconnect.next_backoff().unwrap_or(self.reconnect.max_interval);
                        debug!(error = %e, ?delay, "Re-acquisition failed");
                        self.next_reconnect_at = Some(now + delay);
                    }
                }
            }
            _ => {}
        }
    }

    async fn on_connected(&mut self) {
        let identity = self.connectivity.identity();
        if identity != self.reporter.identity() {
            info!(identity = %identity, "Reporter identity updated");
            self.reporter.set_identity(identity);
        }

        self.reconnect.reset();
        self.next_reconnect_at = None;
        self.set_state(AgentState::Running).await;
    }

    async fn enter_degraded(&mut self, now: Instant) {
        self.reconnect.reset();
        let delay = self.reconnect.next_backoff().unwrap_or(self.reconnect.max_interval);
        self.next_reconnect_at = Some(now + delay);
        self.set_state(AgentState::Degraded).await;
    }

    async fn halt(&mut self) {
        self.reporter.abort();
        self.set_state(AgentState::Halted).await;
    }

    async fn set_state(&mut self, state: AgentState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "Agent state changed");
            self.state = state;
        }
        self.publish().await;
    }

    async fn publish(&mut self) {
        let mut status = self.status.write().await;
        status.state = self.state;
        status.reporter_id = self.reporter.identity().to_string();
        status.active_readers = self.poller.active_readers();
        status.pending = self.queue.len();
        status.stats = self.queue.stats();
        status.last_delivery = self.last_delivery;
        status.last_error = self.last_error.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, ReaderConfig};
    use crate::testing::{present, MockConnectivity, MockReader, Reply, ScriptedTransport};
    use std::path::PathBuf;

    fn config() -> NodeConfig {
        NodeConfig {
            endpoint: EndpointConfig {
                url: "http://collector.local/api/reads".into(),
                ..Default::default()
            },
            readers: vec![ReaderConfig {
                id: "R1".into(),
                source: PathBuf::from("/dev/null"),
            }],
            ..Default::default()
        }
    }

    fn boxed(readers: Vec<MockReader>) -> Vec<Box<dyn TagReader>> {
        readers
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn TagReader>)
            .collect()
    }

    #[tokio::test]
    async fn test_no_readers_is_fatal() {
        let (mut agent, handle) = Agent::new(
            &config(),
            boxed(vec![MockReader::failing("R1", "bus error"), MockReader::failing("R2", "bus error")]),
            ScriptedTransport::new([]),
            MockConnectivity::new(true),
        );

        let err = agent.start().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(agent.state(), AgentState::Halted);

        let status = handle.status().await;
        assert_eq!(status.state, AgentState::Halted);
        assert_eq!(status.active_readers, 0);
    }

    #[tokio::test]
    async fn test_detection_delivered_end_to_end() {
        let reader = MockReader::new("R1");
        let state = reader.state();
        let transport = ScriptedTransport::new([Reply::Status(200)]);
        let (mut agent, handle) = Agent::new(
            &config(),
            boxed(vec![reader, MockReader::failing("R2", "bus error")]),
            transport.clone(),
            MockConnectivity::new(true),
        );

        agent.start().await.unwrap();
        assert_eq!(agent.state(), AgentState::Running);

        present(&state, &[0xDE, 0xAD]);
        let outcome = agent.tick(clock_now()).await;
        assert!(matches!(outcome, DeliveryOutcome::Delivered { status: 200, .. }));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body, r#"{"readerId":"AABBCCDDEEFF","tagId":"DEAD"}"#);

        let status = handle.status().await;
        assert_eq!(status.state, AgentState::Running);
        assert_eq!(status.active_readers, 1);
        assert_eq!(status.pending, 0);
        assert_eq!(status.stats.delivered, 1);
        assert!(status.last_delivery.is_some());
    }

    #[tokio::test]
    async fn test_degraded_buffers_then_recovers() {
        let reader = MockReader::new("R1");
        let state = reader.state();
        let transport = ScriptedTransport::new([]);
        let connectivity = MockConnectivity::new(false);
        let (mut agent, _handle) = Agent::new(&config(), boxed(vec![reader]), transport.clone(), connectivity.clone());

        agent.start().await.unwrap();
        assert_eq!(agent.state(), AgentState::Degraded);
        assert_eq!(connectivity.acquire_calls(), 3);

        let now = clock_now();
        present(&state, &[0xDE, 0xAD]);
        let outcome = agent.tick(now).await;
        assert!(matches!(
            outcome,
            DeliveryOutcome::Rescheduled { attempts: 1, delay, .. } if delay == Duration::from_secs(1)
        ));
        assert_eq!(transport.request_count(), 0);
        assert_eq!(agent.queue().len(), 1);

        connectivity.set_connected(true);
        let outcome = agent.tick(now + Duration::from_secs(1)).await;
        assert_eq!(agent.state(), AgentState::Running);
        assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_link_loss_enters_degraded() {
        let connectivity = MockConnectivity::new(true);
        let (mut agent, handle) = Agent::new(
            &config(),
            boxed(vec![MockReader::new("R1")]),
            ScriptedTransport::new([]),
            connectivity.clone(),
        );
        agent.start().await.unwrap();

        connectivity.set_connected(false);
        assert_eq!(agent.tick(clock_now()).await, DeliveryOutcome::Idle);
        assert_eq!(agent.state(), AgentState::Degraded);
        assert_eq!(handle.status().await.state, AgentState::Degraded);
    }

    #[tokio::test]
    async fn test_reacquisition_follows_backoff_schedule() {
        let connectivity = MockConnectivity::new(false);
        let (mut agent, _handle) = Agent::new(
            &config(),
            boxed(vec![MockReader::new("R1")]),
            ScriptedTransport::new([]),
            connectivity.clone(),
        );
        agent.start().await.unwrap();
        let now = clock_now();
        let startup_calls = connectivity.acquire_calls();

        agent.tick(now).await;
        assert_eq!(connectivity.acquire_calls(), startup_calls);

        agent.tick(now + Duration::from_secs(2)).await;
        assert_eq!(connectivity.acquire_calls(), startup_calls + 1);

        // next attempt 2s later
        agent.tick(now + Duration::from_secs(3)).await;
        assert_eq!(connectivity.acquire_calls(), startup_calls + 1);

        agent.tick(now + Duration::from_secs(4)).await;
        assert_eq!(connectivity.acquire_calls(), startup_calls + 2);
        assert_eq!(agent.state(), AgentState::Degraded);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let (agent, handle) = Agent::new(
            &config(),
            boxed(vec![MockReader::new("R1")]),
            ScriptedTransport::new([]),
            MockConnectivity::new(true),
        );

        let task = tokio::spawn(agent.run());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(handle.status().await.state, AgentState::Running);

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(handle.status().await.state, AgentState::Halted);
    }

    #[tokio::test]
    async fn test_run_fails_without_readers() {
        let (agent, _handle) = Agent::new(
            &config(),
            boxed(vec![MockReader::failing("R1", "bus error")]),
            ScriptedTransport::new([]),
            MockConnectivity::new(true),
        );

        assert!(matches!(agent.run().await, Err(AgentError::NoReaders)));
    }
}
