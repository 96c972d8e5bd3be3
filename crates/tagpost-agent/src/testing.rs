//! Scripted fakes for the reader, transport, and connectivity seams.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::connectivity::Connectivity;
use crate::error::{AgentError, AgentResult};
use crate::reader::{ReaderInfo, TagRead, TagReader};
use crate::transport::{OutboundRequest, Transport, TransportResponse};

// =============================================================================
// MockReader
// =============================================================================

#[derive(Debug, Default)]
pub struct MockReaderState {
    /// Cards waiting in the field; `None` simulates a failed read.
    pub cards: VecDeque<Option<TagRead>>,
    pub releases: u32,
    pub init_error: Option<String>,
    pub version: Option<u8>,
}

/// Reader whose field is scripted from the test.
pub struct MockReader {
    id: String,
    state: Arc<Mutex<MockReaderState>>,
}

impl MockReader {
    pub fn new(id: &str) -> Self {
        MockReader {
            id: id.to_string(),
            state: Arc::new(Mutex::new(MockReaderState {
                version: Some(0x92),
                ..Default::default()
            })),
        }
    }

    pub fn failing(id: &str, reason: &str) -> Self {
        let reader = Self::new(id);
        reader.state.lock().unwrap().init_error = Some(reason.to_string());
        reader
    }

    pub fn with_version(self, version: u8) -> Self {
        self.state.lock().unwrap().version = Some(version);
        self
    }

    pub fn state(&self) -> Arc<Mutex<MockReaderState>> {
        Arc::clone(&self.state)
    }

    /// Places a card with `uid` in the field.
    pub fn present(&self, uid: &[u8]) {
        present(&self.state, uid);
    }

    /// Places a card that cannot be read.
    pub fn present_unreadable(&self) {
        self.state.lock().unwrap().cards.push_back(None);
    }
}

pub fn present(state: &Arc<Mutex<MockReaderState>>, uid: &[u8]) {
    state.lock().unwrap().cards.push_back(Some(TagRead {
        uid: uid.to_vec(),
        sak: Some(0x08),
    }));
}

impl TagReader for MockReader {
    fn id(&self) -> &str {
        &self.id
    }

    fn init(&mut self) -> AgentResult<ReaderInfo> {
        let state = self.state.lock().unwrap();
        match &state.init_error {
            Some(reason) => Err(AgentError::ReaderInit {
                reader: self.id.clone(),
                reason: reason.clone(),
            }),
            None => Ok(ReaderInfo {
                version: state.version,
                description: "mock reader".into(),
            }),
        }
    }

    fn is_new_tag_present(&mut self) -> bool {
        !self.state.lock().unwrap().cards.is_empty()
    }

    fn read_tag(&mut self) -> Option<TagRead> {
        self.state.lock().unwrap().cards.front().cloned().flatten()
    }

    fn release(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.cards.pop_front();
        state.releases += 1;
    }
}

// =============================================================================
// ScriptedTransport
// =============================================================================

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    /// Answers with `status` after `delay`.
    Delayed(Duration, u16),
    Fail(String),
    /// Never answers.
    Hang,
}

/// Transport that plays back scripted replies; 200 once the script runs out.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(ScriptedTransport {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &OutboundRequest) -> AgentResult<TransportResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();

        match reply.unwrap_or(Reply::Status(200)) {
            Reply::Status(status) => Ok(TransportResponse::new(status)),
            Reply::Delayed(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse::new(status))
            }
            Reply::Fail(reason) => Err(AgentError::Transport(reason)),
            Reply::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// MockConnectivity
// =============================================================================

pub struct MockConnectivity {
    connected: AtomicBool,
    acquire_calls: AtomicU32,
    identity: String,
}

impl MockConnectivity {
    pub fn new(connected: bool) -> Arc<Self> {
        Arc::new(MockConnectivity {
            connected: AtomicBool::new(connected),
            acquire_calls: AtomicU32::new(0),
            identity: "AABBCCDDEEFF".into(),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn acquire_calls(&self) -> u32 {
        self.acquire_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connectivity for MockConnectivity {
    async fn acquire(&self, _timeout: Duration) -> AgentResult<()> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_connected() {
            Ok(())
        } else {
            Err(AgentError::ConnectivityFailed("mock link down".into()))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }
}
