//! # Node Configuration
//!
//! Configuration management for the reader node.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TAGPOST_ENDPOINT_URL=https://collector.local/api/reads             │
//! │     TAGPOST_DEVICE_ID=AABBCCDDEEFF                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $TAGPOST_CONFIG, or                                                │
//! │     ~/.config/tagpost/tagpost.toml (Linux)                             │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = ""                      # empty: derive from the network interface MAC
//!
//! [endpoint]
//! url = "http://192.168.1.10:8080/api/reads"
//! timeout_ms = 5000
//!
//! [payload]
//! reader_id_source = "device"  # device | reader | device_and_reader
//!
//! [delivery]
//! queue_capacity = 256
//! base_delay_ms = 1000
//! max_delay_ms = 60000
//! max_attempts = 10
//!
//! [polling]
//! poll_interval_ms = 50
//! cooldown_ms = 3000
//!
//! [network]
//! interface = "wlan0"
//!
//! [[readers]]
//! id = "R1"
//! source = "/dev/ttyUSB0"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use tagpost_core::validation::validate_reader_id;
use tagpost_core::{BackoffPolicy, UidBounds, DEFAULT_MAX_UID_BYTES, DEFAULT_MIN_UID_BYTES};

use crate::error::{AgentError, AgentResult};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TAGPOST_CONFIG";

/// Upper bound for `network.reconnect_max_secs` (one hour).
pub const MAX_RECONNECT_SECS: u64 = 3_600;

// =============================================================================
// Reader Id Source
// =============================================================================

/// Which identifier goes into the payload's `readerId` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderIdSource {
    /// The node identity (MAC without colons). Every reader reports as the device.
    #[default]
    Device,

    /// The configured reader id (e.g. "R1").
    Reader,

    /// `"<identity>-<reader id>"`, unique across nodes and readers.
    DeviceAndReader,
}

impl std::fmt::Display for ReaderIdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderIdSource::Device => write!(f, "device"),
            ReaderIdSource::Reader => write!(f, "reader"),
            ReaderIdSource::DeviceAndReader => write!(f, "device_and_reader"),
        }
    }
}

impl std::str::FromStr for ReaderIdSource {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "device" | "mac" => Ok(ReaderIdSource::Device),
            "reader" => Ok(ReaderIdSource::Reader),
            "device_and_reader" | "both" => Ok(ReaderIdSource::DeviceAndReader),
            other => Err(AgentError::InvalidConfig(format!(
                "Unknown reader id source: '{}'. Valid options: device, reader, device_and_reader",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Identity of this node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Explicit reporter identity. Empty means "derive from connectivity".
    #[serde(default)]
    pub id: String,
}

/// Collection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// URL detections are POSTed to.
    #[serde(default)]
    pub url: String,

    /// Upper bound for one delivery attempt (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub timeout_ms: u64,

    /// How long a tick waits on an in-flight request before moving on
    /// (milliseconds). The request itself keeps running until `timeout_ms`.
    #[serde(default = "default_send_slice")]
    pub send_slice_ms: u64,
}

fn default_request_timeout() -> u64 {
    5_000
}
fn default_send_slice() -> u64 {
    250
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            url: String::new(),
            timeout_ms: default_request_timeout(),
            send_slice_ms: default_send_slice(),
        }
    }
}

/// Wire payload options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadConfig {
    #[serde(default)]
    pub reader_id_source: ReaderIdSource,
}

/// Queue and retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum pending detections held in RAM.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// First retry delay (milliseconds).
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Retry delay ceiling (milliseconds).
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Failed attempts tolerated before a detection is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_queue_capacity() -> usize {
    256
}
fn default_base_delay() -> u64 {
    1_000
}
fn default_max_delay() -> u64 {
    60_000
}
fn default_max_attempts() -> u32 {
    10
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            queue_capacity: default_queue_capacity(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Reader polling behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Tick period hint (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Duplicate suppression window per (reader, tag) (milliseconds).
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Shortest UID accepted (bytes).
    #[serde(default = "default_min_uid_bytes")]
    pub min_uid_bytes: usize,

    /// Longest UID accepted (bytes).
    #[serde(default = "default_max_uid_bytes")]
    pub max_uid_bytes: usize,
}

fn default_poll_interval() -> u64 {
    50
}
fn default_cooldown() -> u64 {
    3_000
}
fn default_min_uid_bytes() -> usize {
    DEFAULT_MIN_UID_BYTES
}
fn default_max_uid_bytes() -> usize {
    DEFAULT_MAX_UID_BYTES
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            poll_interval_ms: default_poll_interval(),
            cooldown_ms: default_cooldown(),
            min_uid_bytes: default_min_uid_bytes(),
            max_uid_bytes: default_max_uid_bytes(),
        }
    }
}

/// Network acquisition behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface whose link state and MAC are used.
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Per-attempt acquisition timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Acquisition attempts during startup before going Degraded.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// First re-acquisition delay while Degraded (milliseconds).
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_ms: u64,

    /// Re-acquisition delay ceiling while Degraded (seconds).
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u64,
}

fn default_interface() -> String {
    "wlan0".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_connect_attempts() -> u32 {
    3
}
fn default_reconnect_initial() -> u64 {
    1_000
}
fn default_reconnect_max() -> u64 {
    60
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            interface: default_interface(),
            connect_timeout_secs: default_connect_timeout(),
            connect_attempts: default_connect_attempts(),
            reconnect_initial_ms: default_reconnect_initial(),
            reconnect_max_secs: default_reconnect_max(),
        }
    }
}

/// One attached reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Name used in logs and, depending on `reader_id_source`, on the wire.
    pub id: String,

    /// Device node or FIFO the reader prints UIDs to.
    pub source: PathBuf,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub payload: PayloadConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub readers: Vec<ReaderConfig>,
}

impl NodeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`tagpost.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> AgentResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document without validating it.
    pub fn from_toml(contents: &str) -> AgentResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> AgentResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| AgentError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| AgentError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AgentResult<()> {
        let url = url::Url::parse(&self.endpoint.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AgentError::InvalidUrl(format!(
                "Endpoint URL must start with http:// or https://, got: {}",
                self.endpoint.url
            )));
        }

        if self.endpoint.timeout_ms == 0 {
            return Err(AgentError::InvalidConfig(
                "endpoint.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.endpoint.send_slice_ms == 0 || self.endpoint.send_slice_ms > self.endpoint.timeout_ms {
            return Err(AgentError::InvalidConfig(format!(
                "endpoint delays must satisfy 0 < send_slice_ms ({}) <= timeout_ms ({})",
                self.endpoint.send_slice_ms, self.endpoint.timeout_ms
            )));
        }

        if self.delivery.queue_capacity == 0 {
            return Err(AgentError::InvalidConfig(
                "delivery.queue_capacity must be greater than 0".into(),
            ));
        }

        if self.delivery.base_delay_ms == 0 || self.delivery.max_delay_ms < self.delivery.base_delay_ms
        {
            return Err(AgentError::InvalidConfig(format!(
                "delivery delays must satisfy 0 < base_delay_ms ({}) <= max_delay_ms ({})",
                self.delivery.base_delay_ms, self.delivery.max_delay_ms
            )));
        }

        if self.polling.poll_interval_ms == 0 {
            return Err(AgentError::InvalidConfig(
                "polling.poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.polling.min_uid_bytes == 0 || self.polling.min_uid_bytes > self.polling.max_uid_bytes {
            return Err(AgentError::InvalidConfig(format!(
                "UID bounds must satisfy 1 <= min_uid_bytes ({}) <= max_uid_bytes ({})",
                self.polling.min_uid_bytes, self.polling.max_uid_bytes
            )));
        }

        if self.network.connect_attempts == 0 {
            return Err(AgentError::InvalidConfig(
                "network.connect_attempts must be greater than 0".into(),
            ));
        }

        let reconnect_max_ms = self.network.reconnect_max_secs.saturating_mul(1_000);
        if self.network.reconnect_initial_ms == 0
            || self.network.reconnect_max_secs > MAX_RECONNECT_SECS
            || self.network.reconnect_initial_ms > reconnect_max_ms
        {
            return Err(AgentError::InvalidConfig(format!(
                "reconnect delays must satisfy 0 < reconnect_initial_ms ({}) <= reconnect_max_secs ({}) * 1000, with reconnect_max_secs <= {}",
                self.network.reconnect_initial_ms, self.network.reconnect_max_secs, MAX_RECONNECT_SECS
            )));
        }

        if self.readers.is_empty() {
            return Err(AgentError::InvalidConfig(
                "at least one [[readers]] entry is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for reader in &self.readers {
            validate_reader_id(&reader.id)?;
            if !seen.insert(reader.id.as_str()) {
                return Err(AgentError::InvalidConfig(format!(
                    "duplicate reader id '{}'",
                    reader.id
                )));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("TAGPOST_ENDPOINT_URL") {
            debug!(url = %url, "Overriding endpoint URL from environment");
            self.endpoint.url = url;
        }

        if let Ok(id) = std::env::var("TAGPOST_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(iface) = std::env::var("TAGPOST_NET_INTERFACE") {
            self.network.interface = iface;
        }

        if let Ok(capacity) = std::env::var("TAGPOST_QUEUE_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(c) => self.delivery.queue_capacity = c,
                Err(_) => warn!(value = %capacity, "Ignoring non-numeric TAGPOST_QUEUE_CAPACITY"),
            }
        }

        if let Ok(cooldown) = std::env::var("TAGPOST_COOLDOWN_MS") {
            match cooldown.parse::<u64>() {
                Ok(c) => self.polling.cooldown_ms = c,
                Err(_) => warn!(value = %cooldown, "Ignoring non-numeric TAGPOST_COOLDOWN_MS"),
            }
        }

        if let Ok(source) = std::env::var("TAGPOST_READER_ID_SOURCE") {
            match source.parse() {
                Ok(parsed) => self.payload.reader_id_source = parsed,
                Err(e) => warn!(error = %e, "Ignoring TAGPOST_READER_ID_SOURCE"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "tagpost", "tagpost")
            .map(|dirs| dirs.config_dir().join("tagpost.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Explicit reporter identity, if configured.
    pub fn device_id(&self) -> Option<&str> {
        let id = self.device.id.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint.timeout_ms)
    }

    pub fn send_slice(&self) -> Duration {
        Duration::from_millis(self.endpoint.send_slice_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.poll_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.polling.cooldown_ms)
    }

    pub fn uid_bounds(&self) -> UidBounds {
        UidBounds::new(self.polling.min_uid_bytes, self.polling.max_uid_bytes)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.delivery.base_delay_ms),
            Duration::from_millis(self.delivery.max_delay_ms),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.network.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> NodeConfig {
        NodeConfig {
            endpoint: EndpointConfig {
                url: "http://collector.local:8080/api/reads".into(),
                ..Default::default()
            },
            readers: vec![ReaderConfig {
                id: "R1".into(),
                source: PathBuf::from("/dev/ttyUSB0"),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_reader_id_source_parsing() {
        assert_eq!("device".parse::<ReaderIdSource>().unwrap(), ReaderIdSource::Device);
        assert_eq!("mac".parse::<ReaderIdSource>().unwrap(), ReaderIdSource::Device);
        assert_eq!("reader".parse::<ReaderIdSource>().unwrap(), ReaderIdSource::Reader);
        assert_eq!(
            "device_and_reader".parse::<ReaderIdSource>().unwrap(),
            ReaderIdSource::DeviceAndReader
        );
        assert!("nope".parse::<ReaderIdSource>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.delivery.queue_capacity, 256);
        assert_eq!(config.delivery.max_attempts, 10);
        assert_eq!(config.polling.cooldown_ms, 3_000);
        assert_eq!(config.payload.reader_id_source, ReaderIdSource::Device);
        assert!(config.device_id().is_none());
    }

    #[test]
    fn test_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.endpoint.url = "ftp://collector.local".into();
        assert!(matches!(config.validate(), Err(AgentError::InvalidUrl(_))));

        config.endpoint.url = "not a url".into();
        assert!(matches!(config.validate(), Err(AgentError::InvalidUrl(_))));

        let mut config = valid_config();
        config.delivery.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.delivery.max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.polling.min_uid_bytes = 11;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.readers.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.endpoint.send_slice_ms = 0;
        assert!(config.validate().is_err());
        config.endpoint.send_slice_ms = config.endpoint.timeout_ms + 1;
        assert!(config.validate().is_err());
        config.endpoint.send_slice_ms = config.endpoint.timeout_ms;
        assert!(config.validate().is_ok());

        let mut config = valid_config();
        config.network.reconnect_max_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(AgentError::InvalidConfig(_))));
        config.network.reconnect_max_secs = MAX_RECONNECT_SECS;
        assert!(config.validate().is_ok());
        config.network.reconnect_initial_ms = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.readers.push(config.readers[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_file_format() {
        let config = NodeConfig::from_toml(
            r#"
            [endpoint]
            url = "https://collector.example/api/reads"

            [delivery]
            queue_capacity = 32
            base_delay_ms = 500
            max_delay_ms = 8000

            [payload]
            reader_id_source = "device_and_reader"

            [[readers]]
            id = "R1"
            source = "/dev/ttyUSB0"

            [[readers]]
            id = "R2"
            source = "/dev/ttyUSB1"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.readers.len(), 2);
        assert_eq!(config.delivery.queue_capacity, 32);
        assert_eq!(config.delivery.max_attempts, 10); // default kept
        assert_eq!(config.payload.reader_id_source, ReaderIdSource::DeviceAndReader);
        assert_eq!(config.backoff_policy().delay_for(1), Duration::from_secs(1));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&valid_config()).unwrap();
        assert!(toml_str.contains("[endpoint]"));
        assert!(toml_str.contains("[delivery]"));
        assert!(toml_str.contains("[[readers]]"));
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("tagpost-config-{}.toml", std::process::id()));
        let config = valid_config();
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let reloaded = NodeConfig::from_toml(&contents).unwrap();
        assert_eq!(reloaded.endpoint.url, config.endpoint.url);
        assert_eq!(reloaded.readers[0].id, "R1");

        let _ = std::fs::remove_file(path);
    }
}
