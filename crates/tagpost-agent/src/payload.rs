//! # Wire Payload
//!
//! The JSON body POSTed for every detection:
//!
//! ```json
//! {"readerId": "AABBCCDDEEFF", "tagId": "DEADBEEF"}
//! ```
//!
//! `readerId` is chosen by [`ReaderIdSource`]; `tagId` is always the
//! uppercase hex UID.

use serde::{Deserialize, Serialize};

use tagpost_core::TagEvent;

use crate::config::ReaderIdSource;
use crate::error::{AgentError, AgentResult};

/// Body of one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePayload {
    pub reader_id: String,
    pub tag_id: String,
}

/// Turns queued events into request bodies.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    identity: String,
    source: ReaderIdSource,
}

impl PayloadBuilder {
    pub fn new(identity: impl Into<String>, source: ReaderIdSource) -> Self {
        PayloadBuilder {
            identity: identity.into(),
            source,
        }
    }

    /// Reporter identity used for `ReaderIdSource::Device`.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Replaces the reporter identity, e.g. once connectivity reports a MAC.
    pub fn set_identity(&mut self, identity: impl Into<String>) {
        self.identity = identity.into();
    }

    /// Builds the payload for `event`.
    ///
    /// Fails when a field would go out empty; such an event can never be
    /// delivered and is dropped by the caller.
    pub fn payload_for(&self, event: &TagEvent) -> AgentResult<WirePayload> {
        let reader_id = match self.source {
            ReaderIdSource::Device => self.identity.clone(),
            ReaderIdSource::Reader => event.reader_id().to_string(),
            ReaderIdSource::DeviceAndReader => {
                if self.identity.is_empty() {
                    String::new()
                } else {
                    format!("{}-{}", self.identity, event.reader_id())
                }
            }
        };

        if reader_id.is_empty() {
            return Err(AgentError::SerializationFailed(format!(
                "readerId is empty (source: {})",
                self.source
            )));
        }

        let tag_id = event.tag_id().as_str();
        if tag_id.is_empty() {
            return Err(AgentError::SerializationFailed("tagId is empty".into()));
        }

        Ok(WirePayload {
            reader_id,
            tag_id: tag_id.to_string(),
        })
    }

    /// Serialized JSON body for `event`.
    pub fn body_for(&self, event: &TagEvent) -> AgentResult<String> {
        let payload = self.payload_for(event)?;
        Ok(serde_json::to_string(&payload)?)
    }
}
