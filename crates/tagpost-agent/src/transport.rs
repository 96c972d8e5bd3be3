//! # Delivery Transport
//!
//! The narrow seam between the reporter and the network.
//!
//! ```text
//! ┌──────────────┐  OutboundRequest   ┌──────────────────┐   POST json   ┌───────────┐
//! │   Reporter   │ ─────────────────► │  dyn Transport   │ ────────────► │ Collector │
//! │              │ ◄───────────────── │  (HttpTransport) │ ◄──────────── │           │
//! └──────────────┘ TransportResponse  └──────────────────┘   status      └───────────┘
//! ```
//!
//! A non-2xx status is still an `Ok(TransportResponse)`; interpreting it is
//! the reporter's job. `Err` means the request never got an answer.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, AgentResult};

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("tagpost/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Request / Response
// =============================================================================

/// One POST to the collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub timeout: Duration,
}

impl OutboundRequest {
    /// JSON POST with the standard headers.
    pub fn json(url: impl Into<String>, body: String, timeout: Duration) -> Self {
        OutboundRequest {
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
            timeout,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        TransportResponse {
            status,
            body: String::new(),
        }
    }

    /// Any 2xx counts as delivered.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Sends a request and waits for the response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> AgentResult<TransportResponse>;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AgentError::Transport(format!("http client build failed: {e}")))?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> AgentResult<TransportResponse> {
        let timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);

        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout(timeout_ms)
            } else {
                AgentError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        // The body is informational only; a failure to read it does not undo delivery.
        let body = response.text().await.unwrap_or_default();

        debug!(url = %request.url, status, "Endpoint responded");
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        assert!(TransportResponse::new(200).is_success());
        assert!(TransportResponse::new(204).is_success());
        assert!(TransportResponse::new(299).is_success());
        assert!(!TransportResponse::new(199).is_success());
        assert!(!TransportResponse::new(301).is_success());
        assert!(!TransportResponse::new(500).is_success());
    }

    #[test]
    fn test_json_request_headers() {
        let request = OutboundRequest::json(
            "http://collector.local/api/reads",
            "{}".into(),
            Duration::from_secs(5),
        );
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("Authorization"), None);
    }

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("tagpost/"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retryable() {
        let transport = HttpTransport::new().unwrap();
        // Port 9 on loopback: nothing listens, connection is refused.
        let request = OutboundRequest::json(
            "http://127.0.0.1:9/api/reads",
            "{}".into(),
            Duration::from_secs(2),
        );
        let err = transport.send(&request).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
