//! # tagpost-agent: Reader Node Runtime
//!
//! Wires the pure pipeline from `tagpost-core` to readers, the network, and
//! the collection endpoint.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Agent (orchestrator)                            │
//! │                                                                         │
//! │   one tick = check link → poll readers → enqueue → one delivery step   │
//! │                                                                         │
//! │  ┌────────────────┐   TagEvent   ┌────────────────┐   ┌──────────────┐ │
//! │  │  ReaderPoller  │ ───────────► │ OutboundQueue  │ ─►│   Reporter   │ │
//! │  │                │              │ (tagpost-core) │   │              │ │
//! │  │ TagReader ×N   │              │ bounded, FIFO  │   │ backoff,     │ │
//! │  │ Debouncer      │              │                │   │ in-flight    │ │
//! │  └────────────────┘              └────────────────┘   └──────┬───────┘ │
//! │                                                              │         │
//! │  ┌────────────────┐                                 ┌────────▼───────┐ │
//! │  │  Connectivity  │  Running / Degraded             │   Transport    │ │
//! │  │  (NetInterface)│ ──────────────────────────────► │ (HttpTransport)│ │
//! │  └────────────────┘                                 └────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - `Agent` state machine, `AgentHandle`, `AgentStatus`
//! - [`poller`] - `ReaderPoller`
//! - [`reporter`] - `Reporter` and `DeliveryOutcome`
//! - [`reader`] - `TagReader` trait, `TagSession` guard, `LineReader`
//! - [`connectivity`] - `Connectivity` trait, `NetInterface`
//! - [`transport`] - `Transport` trait, `HttpTransport`
//! - [`payload`] - JSON wire payload
//! - [`config`] - node configuration (TOML + environment)
//! - [`error`] - agent error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tagpost_agent::{Agent, HttpTransport, LineReader, NetInterface, NodeConfig, TagReader};
//!
//! let config = NodeConfig::load(None)?;
//! let readers: Vec<Box<dyn TagReader>> = config
//!     .readers
//!     .iter()
//!     .map(|r| Box::new(LineReader::new(&r.id, &r.source)) as Box<dyn TagReader>)
//!     .collect();
//! let net = NetInterface::new(&config.network.interface).with_identity(config.device_id());
//!
//! let (agent, handle) = Agent::new(&config, readers, Arc::new(HttpTransport::new()?), Arc::new(net));
//! tokio::spawn(agent.run());
//! println!("{:?}", handle.status().await.state);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod payload;
pub mod poller;
pub mod reader;
pub mod reporter;
pub mod transport;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{Agent, AgentHandle, AgentState, AgentStatus};
pub use config::{NodeConfig, ReaderConfig, ReaderIdSource};
pub use connectivity::{Connectivity, NetInterface};
pub use error::{AgentError, AgentResult};
pub use payload::{PayloadBuilder, WirePayload};
pub use poller::ReaderPoller;
pub use reader::{LineReader, ReaderInfo, TagRead, TagReader, TagSession};
pub use reporter::{DeliveryOutcome, Reporter, ReporterSettings};
pub use transport::{HttpTransport, OutboundRequest, Transport, TransportResponse};
