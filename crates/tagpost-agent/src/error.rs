//! # Agent Error Types
//!
//! Error types for the reader node runtime.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Agent Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Reader      │  │     Network             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  ReaderInit     │  │  ConnectivityFailed     │ │
//! │  │  InvalidUrl     │  │  NoReaders      │  │  Offline / Timeout      │ │
//! │  │  ConfigLoad/Save│  │                 │  │  Transport / HttpStatus │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │      Data       │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Validation     │  │  ShuttingDown   │                              │
//! │  │  Serialization  │  │  ChannelError   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! │                                                                         │
//! │  Network  → retried with backoff, never fatal                          │
//! │  Data     → event dropped and counted                                  │
//! │  NoReaders→ the only error that stops the agent                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use tagpost_core::{QueueError, ValidationError};

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Agent error type covering all runtime failures.
#[derive(Debug, Error)]
pub enum AgentError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Endpoint URL is malformed or not http(s).
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Reader Errors
    // =========================================================================
    /// A reader peripheral failed to initialize.
    #[error("Reader {reader} failed to initialize: {reason}")]
    ReaderInit { reader: String, reason: String },

    /// Every configured reader failed to initialize.
    #[error("No reader initialized; refusing to run")]
    NoReaders,

    // =========================================================================
    // Network Errors
    // =========================================================================
    /// Could not acquire network connectivity.
    #[error("Connectivity unavailable: {0}")]
    ConnectivityFailed(String),

    /// Delivery attempted while offline.
    #[error("Network offline")]
    Offline,

    /// Operation exceeded its time bound.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Transport-level failure (DNS, TCP, TLS, I/O).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a non-2xx status.
    #[error("Endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// Detection data failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Payload could not be serialized.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Queue bookkeeping referenced an entry that is gone.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Agent is shutting down.
    #[error("Agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for AgentError {
    fn from(err: url::ParseError) -> Self {
        AgentError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AgentError::Timeout(0);
        }
        match err.status() {
            Some(status) => AgentError::HttpStatus {
                status: status.as_u16(),
            },
            None => AgentError::Transport(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for AgentError {
    fn from(err: toml::de::Error) -> Self {
        AgentError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for AgentError {
    fn from(err: toml::ser::Error) -> Self {
        AgentError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl AgentError {
    /// Returns true if a delivery that failed with this error may succeed later.
    ///
    /// ## Retryable Errors
    /// - Connectivity loss and offline fast-fails
    /// - Timeouts
    /// - Transport failures and non-2xx responses
    ///
    /// ## Non-Retryable Errors
    /// - Validation and serialization failures (the data itself is bad)
    /// - Configuration and reader initialization errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ConnectivityFailed(_)
                | AgentError::Offline
                | AgentError::Timeout(_)
                | AgentError::Transport(_)
                | AgentError::HttpStatus { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AgentError::InvalidConfig(_)
                | AgentError::InvalidUrl(_)
                | AgentError::ConfigLoadFailed(_)
                | AgentError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error must stop the agent.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::NoReaders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AgentError::Offline.is_retryable());
        assert!(AgentError::Timeout(5_000).is_retryable());
        assert!(AgentError::HttpStatus { status: 500 }.is_retryable());
        assert!(AgentError::Transport("connection refused".into()).is_retryable());

        assert!(!AgentError::SerializationFailed("bad".into()).is_retryable());
        assert!(!AgentError::InvalidConfig("bad".into()).is_retryable());
        assert!(!AgentError::NoReaders.is_retryable());
    }

    #[test]
    fn test_only_no_readers_is_fatal() {
        assert!(AgentError::NoReaders.is_fatal());
        assert!(!AgentError::ReaderInit {
            reader: "R1".into(),
            reason: "no response".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = AgentError::ReaderInit {
            reader: "R2".into(),
            reason: "version register read 0x00".into(),
        };
        assert!(err.to_string().contains("R2"));
        assert_eq!(
            AgentError::HttpStatus { status: 503 }.to_string(),
            "Endpoint returned HTTP 503"
        );
    }

    #[test]
    fn test_validation_converts() {
        let err: AgentError = ValidationError::Required {
            field: "reader_id".into(),
        }
        .into();
        assert!(matches!(err, AgentError::Validation(_)));
        assert!(!err.is_retryable());
    }
}
