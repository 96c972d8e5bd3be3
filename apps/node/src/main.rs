//! # tagpost Node
//!
//! Headless reader node: polls the configured readers and reports every
//! detection to the collection endpoint.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize tracing (RUST_LOG, default info,tagpost=debug)          │
//! │  2. Load config ($TAGPOST_CONFIG or platform config dir, env overrides)│
//! │  3. Build adapters: LineReader per [[readers]], NetInterface, HTTP     │
//! │  4. Run the agent until Ctrl-C / SIGTERM                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tagpost_agent::{Agent, HttpTransport, LineReader, NetInterface, NodeConfig, TagReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tagpost node");

    let config = NodeConfig::load(None)?;
    info!(
        endpoint = %config.endpoint.url,
        readers = config.readers.len(),
        interface = %config.network.interface,
        reader_id_source = %config.payload.reader_id_source,
        "Configuration loaded"
    );

    let readers: Vec<Box<dyn TagReader>> = config
        .readers
        .iter()
        .map(|reader| Box::new(LineReader::new(&reader.id, &reader.source)) as Box<dyn TagReader>)
        .collect();

    let connectivity =
        NetInterface::new(&config.network.interface).with_identity(config.device_id());
    let transport = HttpTransport::new()?;

    let (agent, handle) = Agent::new(&config, readers, Arc::new(transport), Arc::new(connectivity));
    let mut agent_task = tokio::spawn(agent.run());

    tokio::select! {
        result = &mut agent_task => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!(error = %e, "Agent stopped");
                    Err(e.into())
                }
                Err(e) => {
                    error!(error = %e, "Agent task failed");
                    Err(e.into())
                }
            };
        }

        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Agent already gone");
    }
    agent_task.await??;

    let status = handle.status().await;
    info!(
        pending = status.pending,
        delivered = status.stats.delivered,
        evicted = status.stats.evicted,
        permanent_failures = status.stats.permanent_failures,
        "tagpost node stopped"
    );
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tagpost_agent=trace` - Show per-card traces
/// - Default: INFO, DEBUG for tagpost crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tagpost=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
