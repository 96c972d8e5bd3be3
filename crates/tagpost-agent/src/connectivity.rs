//! # Network Connectivity
//!
//! Link acquisition and reporter identity.
//!
//! ## Linux Implementation
//! ```text
//! /sys/class/net/<iface>/operstate   "up" | "down" | "dormant" | ...
//! /sys/class/net/<iface>/address     "aa:bb:cc:dd:ee:ff"
//!                                        │
//!                                        ▼
//!                         identity() = "AABBCCDDEEFF"
//! ```
//!
//! Association and provisioning are left to the OS network stack; the node
//! only waits for the link to come up.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AgentError, AgentResult};

/// Default sysfs network class directory.
pub const SYSFS_NET: &str = "/sys/class/net";

/// How often `acquire` re-reads the link state.
const LINK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Network link as seen by the agent.
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Waits until the link is usable, failing after `timeout`.
    async fn acquire(&self, timeout: Duration) -> AgentResult<()>;

    /// Non-blocking link check, called every tick.
    fn is_connected(&self) -> bool;

    /// Stable reporter identifier.
    fn identity(&self) -> String;
}

// =============================================================================
// NetInterface
// =============================================================================

/// Connectivity backed by a Linux network interface.
#[derive(Debug, Clone)]
pub struct NetInterface {
    interface: String,
    root: PathBuf,
    identity_override: Option<String>,
}

impl NetInterface {
    pub fn new(interface: impl Into<String>) -> Self {
        Self::with_root(interface, SYSFS_NET)
    }

    /// Reads interface files under `root` instead of `/sys/class/net`.
    pub fn with_root(interface: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        NetInterface {
            interface: interface.into(),
            root: root.into(),
            identity_override: None,
        }
    }

    /// Uses `identity` instead of the interface MAC.
    pub fn with_identity(mut self, identity: Option<&str>) -> Self {
        self.identity_override = identity.map(str::to_string);
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn interface_dir(&self) -> PathBuf {
        self.root.join(&self.interface)
    }

    fn operstate_path(&self) -> PathBuf {
        self.interface_dir().join("operstate")
    }

    fn link_is_up(path: &Path) -> bool {
        std::fs::read_to_string(path)
            .map(|state| state.trim() == "up")
            .unwrap_or(false)
    }
}

/// Formats a MAC address as uppercase hex without separators.
pub fn mac_to_identity(mac: &str) -> String {
    mac.trim()
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

#[async_trait]
impl Connectivity for NetInterface {
    async fn acquire(&self, timeout: Duration) -> AgentResult<()> {
        let path = self.operstate_path();
        debug!(interface = %self.interface, ?timeout, "Waiting for link");

        let wait = async {
            loop {
                match tokio::fs::read_to_string(&path).await {
                    Ok(state) if state.trim() == "up" => return Ok(()),
                    Ok(state) => debug!(interface = %self.interface, state = %state.trim(), "Link not up yet"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(AgentError::ConnectivityFailed(format!(
                            "interface {} does not exist",
                            self.interface
                        )));
                    }
                    Err(e) => debug!(interface = %self.interface, error = %e, "Cannot read link state"),
                }
                tokio::time::sleep(LINK_POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::ConnectivityFailed(format!(
                "interface {} not up after {:?}",
                self.interface, timeout
            ))),
        }
    }

    fn is_connected(&self) -> bool {
        Self::link_is_up(&self.operstate_path())
    }

    fn identity(&self) -> String {
        if let Some(identity) = &self.identity_override {
            return identity.clone();
        }

        match std::fs::read_to_string(self.interface_dir().join("address")) {
            Ok(mac) if !mac.trim().is_empty() => mac_to_identity(&mac),
            _ => {
                warn!(interface = %self.interface, "No MAC address available, using interface name as identity");
                self.interface.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(name: &str, operstate: &str, mac: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("tagpost-sysfs-{}-{}", name, std::process::id()));
        let dir = root.join("wlan0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("operstate"), format!("{operstate}\n")).unwrap();
        std::fs::write(dir.join("address"), format!("{mac}\n")).unwrap();
        root
    }

    #[test]
    fn test_mac_to_identity() {
        assert_eq!(mac_to_identity("aa:bb:cc:dd:ee:ff\n"), "AABBCCDDEEFF");
        assert_eq!(mac_to_identity("AA-BB-CC-00-11-22"), "AABBCC001122");
    }

    #[test]
    fn test_identity_from_mac_and_override() {
        let root = fake_sysfs("identity", "up", "de:ad:be:ef:00:01");
        let net = NetInterface::with_root("wlan0", &root);
        assert_eq!(net.identity(), "DEADBEEF0001");

        let net = net.with_identity(Some("node-7"));
        assert_eq!(net.identity(), "node-7");

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_missing_interface_falls_back_to_name() {
        let net = NetInterface::with_root("eth9", std::env::temp_dir().join("tagpost-no-such-root"));
        assert!(!net.is_connected());
        assert_eq!(net.identity(), "eth9");
    }

    #[tokio::test]
    async fn test_acquire_when_up() {
        let root = fake_sysfs("up", "up", "aa:bb:cc:dd:ee:ff");
        let net = NetInterface::with_root("wlan0", &root);
        assert!(net.is_connected());
        assert!(net.acquire(Duration::from_secs(1)).await.is_ok());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_down() {
        let root = fake_sysfs("down", "down", "aa:bb:cc:dd:ee:ff");
        let net = NetInterface::with_root("wlan0", &root);
        assert!(!net.is_connected());

        let err = net.acquire(Duration::from_millis(300)).await.unwrap_err();
        assert!(matches!(err, AgentError::ConnectivityFailed(_)));
        assert!(err.is_retryable());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_acquire_missing_interface_fails_fast() {
        let net = NetInterface::with_root("eth9", std::env::temp_dir().join("tagpost-no-such-root"));
        let err = net.acquire(Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
