//! # Tag Readers
//!
//! Capability trait for reader peripherals, the scoped session guard, and the
//! line-oriented reader used on the Linux node.
//!
//! ## Session Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  is_new_tag_present() ── false ──► next reader                          │
//! │          │                                                              │
//! │         true                                                            │
//! │          ▼                                                              │
//! │  TagSession::open(reader)                                               │
//! │          │                                                              │
//! │          ├─► read_tag() ── Some(TagRead) ──► validate, debounce         │
//! │          │              └─ None ───────────► read failure, logged       │
//! │          ▼                                                              │
//! │  drop(session) ──► reader.release()        (on every path)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use tagpost_core::validation::parse_hex_uid;

use crate::error::{AgentError, AgentResult};

// =============================================================================
// Trait and Values
// =============================================================================

/// What a reader reports at initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderInfo {
    /// Raw chip version register, when the hardware exposes one.
    pub version: Option<u8>,
    pub description: String,
}

/// A single card read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRead {
    pub uid: Vec<u8>,
    /// Select Acknowledge byte, when the hardware exposes it.
    pub sak: Option<u8>,
}

/// A reader peripheral. All calls are non-blocking.
///
/// `ReaderInfo::version` and `TagRead::sak` are optional. Without a version
/// register the reader is never excluded as unresponsive; without a SAK byte
/// no card type is logged.
pub trait TagReader: Send {
    /// Configured reader name ("R1").
    fn id(&self) -> &str;

    /// Brings the peripheral up. Called once during boot.
    fn init(&mut self) -> AgentResult<ReaderInfo>;

    /// True when a card not yet read is in the field.
    fn is_new_tag_present(&mut self) -> bool;

    /// Reads the card found by `is_new_tag_present`. `None` on read failure.
    fn read_tag(&mut self) -> Option<TagRead>;

    /// Ends the card session (halt + stop crypto on real hardware).
    fn release(&mut self);
}

// =============================================================================
// Session Guard
// =============================================================================

/// Scoped card session; releases the reader when dropped.
pub struct TagSession<'a> {
    reader: &'a mut dyn TagReader,
}

impl<'a> TagSession<'a> {
    pub fn open(reader: &'a mut dyn TagReader) -> Self {
        TagSession { reader }
    }

    pub fn read(&mut self) -> Option<TagRead> {
        self.reader.read_tag()
    }
}

impl Drop for TagSession<'_> {
    fn drop(&mut self) {
        trace!(reader = %self.reader.id(), "Releasing card session");
        self.reader.release();
    }
}

// =============================================================================
// Line Reader
// =============================================================================

/// Delay before reopening the source after EOF or a read error.
const REOPEN_DELAY: Duration = Duration::from_millis(500);

/// Buffered lines waiting to be polled.
const LINE_BUFFER: usize = 64;

/// Reader module that prints one card per line as `UID[,SAK]` in hex
/// (`04A21B7F` or `04:A2:1B:7F,08`).
///
/// A background task owns the file and forwards lines over a channel; the
/// trait methods only drain the channel. Device nodes and FIFOs are reopened
/// after EOF. A regular file is read once and then followed for appended
/// lines, never replayed.
pub struct LineReader {
    id: String,
    source: PathBuf,
    lines: Option<mpsc::Receiver<String>>,
    pending: Option<String>,
    task: Option<JoinHandle<()>>,
}

impl LineReader {
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        LineReader {
            id: id.into(),
            source: source.into(),
            lines: None,
            pending: None,
            task: None,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    async fn pump(id: String, source: PathBuf, follow: bool, tx: mpsc::Sender<String>) {
        loop {
            match tokio::fs::File::open(&source).await {
                Ok(file) => {
                    let mut lines = BufReader::new(file).lines();
                    loop {
                        match lines.next_line().await {
                            Ok(Some(line)) => {
                                let line = line.trim().to_string();
                                if line.is_empty() {
                                    continue;
                                }
                                if tx.send(line).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) if follow => {
                                if tx.is_closed() {
                                    return;
                                }
                                tokio::time::sleep(REOPEN_DELAY).await;
                            }
                            Ok(None) => break,
                            Err(e) => {
                                warn!(reader = %id, error = %e, "Read error on reader source");
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!(reader = %id, path = ?source, error = %e, "Cannot open reader source"),
            }

            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(REOPEN_DELAY).await;
        }
    }
}

/// Splits a `UID[,SAK]` line.
fn parse_line(line: &str) -> Result<TagRead, String> {
    let (uid, sak) = match line.split_once(',') {
        Some((uid, sak)) => (uid, Some(sak.trim())),
        None => (line, None),
    };

    let uid = parse_hex_uid(uid.trim()).map_err(|e| e.to_string())?;
    let sak = match sak {
        Some(sak) => {
            let digits = sak
                .strip_prefix("0x")
                .or_else(|| sak.strip_prefix("0X"))
                .unwrap_or(sak);
            Some(u8::from_str_radix(digits, 16).map_err(|e| format!("invalid SAK '{}': {}", sak, e))?)
        }
        None => None,
    };

    Ok(TagRead { uid, sak })
}

impl TagReader for LineReader {
    fn id(&self) -> &str {
        &self.id
    }

    fn init(&mut self) -> AgentResult<ReaderInfo> {
        let metadata = std::fs::metadata(&self.source).map_err(|e| AgentError::ReaderInit {
            reader: self.id.clone(),
            reason: format!("{}: {}", self.source.display(), e),
        })?;
        let follow = metadata.file_type().is_file();
        if follow {
            debug!(reader = %self.id, path = ?self.source, "Regular file source, following appended lines");
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| AgentError::ReaderInit {
            reader: self.id.clone(),
            reason: e.to_string(),
        })?;

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        self.task = Some(runtime.spawn(Self::pump(self.id.clone(), self.source.clone(), follow, tx)));
        self.lines = Some(rx);

        Ok(ReaderInfo {
            version: None,
            description: format!("line reader on {}", self.source.display()),
        })
    }

    fn is_new_tag_present(&mut self) -> bool {
        if self.pending.is_some() {
            return true;
        }
        let Some(lines) = self.lines.as_mut() else {
            return false;
        };
        match lines.try_recv() {
            Ok(line) => {
                self.pending = Some(line);
                true
            }
            Err(_) => false,
        }
    }

    fn read_tag(&mut self) -> Option<TagRead> {
        let line = self.pending.as_deref()?;
        match parse_line(line) {
            Ok(read) => Some(read),
            Err(e) => {
                debug!(reader = %self.id, line = %line, error = %e, "Unparseable reader line");
                None
            }
        }
    }

    fn release(&mut self) {
        self.pending = None;
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
