//! Configuration system for murmur.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MURMUR_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/murmur/config.toml
//!   3. ~/.config/murmur/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub api: ApiConfig,
    pub session: SessionDefaults,
    pub network: NetworkConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Loopback port for the HTTP control surface.
    pub port: u16,
    /// Events retained per session before the oldest are dropped.
    pub event_log_capacity: usize,
}

/// Defaults applied to sessions the daemon opens itself, and to API
/// requests that leave a field unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub listen_address: String,
    pub rendezvous_topic: String,
    /// Hex key file for the autostart session. Generated on first run.
    pub key_path: PathBuf,
    pub connection_timeout_secs: f64,
    pub pubsub_mode: PubsubMode,
    pub verbose: bool,
    pub peer_poll_interval_ms: u64,
    pub search_backoff_ms: u64,
    /// Open one session with these settings when the daemon starts.
    pub autostart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Well-known DHT entry points dialled during discovery.
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub fatal_policy: FatalPolicy,
}

/// Delivery strategy of the pub/sub engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PubsubMode {
    /// Partial relay through a mesh overlay.
    #[default]
    Gossip,
    /// Publish directly to every known subscriber.
    Flood,
}

/// What the daemon does when a session reports a fatal condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalPolicy {
    /// Exit the process.
    #[default]
    Terminate,
    /// Destroy only the failing session and keep serving the rest.
    CloseSession,
}

impl std::str::FromStr for PubsubMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gossip" => Ok(Self::Gossip),
            "flood" => Ok(Self::Flood),
            other => Err(format!("unknown pubsub mode: {other}")),
        }
    }
}

impl std::str::FromStr for FatalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terminate" => Ok(Self::Terminate),
            "close_session" => Ok(Self::CloseSession),
            other => Err(format!("unknown fatal policy: {other}")),
        }
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// The public IPFS bootstrap set.
pub const DEFAULT_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
];

pub const DEFAULT_LISTEN_ADDRESS: &str = "/ip4/0.0.0.0/udp/0/quic-v1";

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 9101,
            event_log_capacity: 1024,
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            rendezvous_topic: "murmur/discovery/v1".to_string(),
            key_path: config_dir().join("id.key"),
            connection_timeout_secs: 60.0,
            pubsub_mode: PubsubMode::Gossip,
            verbose: false,
            peer_poll_interval_ms: 1000,
            search_backoff_ms: 500,
            autostart: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bootstrap_peers: DEFAULT_BOOTSTRAP_PEERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SessionDefaults {
    pub fn connection_timeout(&self) -> Duration {
        secs_to_duration(self.connection_timeout_secs)
    }

    pub fn peer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.peer_poll_interval_ms.max(1))
    }

    pub fn search_backoff(&self) -> Duration {
        Duration::from_millis(self.search_backoff_ms)
    }
}

/// Fractional seconds to a duration. Negative or NaN become zero; anything
/// too large to represent, infinity included, saturates at `Duration::MAX`.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("murmur")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MurmurConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MurmurConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MURMUR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MurmurConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply MURMUR_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(p) = var("MURMUR_API__PORT").and_then(|v| v.parse().ok()) {
            self.api.port = p;
        }
        if let Some(v) = var("MURMUR_SESSION__LISTEN_ADDRESS") {
            self.session.listen_address = v;
        }
        if let Some(v) = var("MURMUR_SESSION__RENDEZVOUS_TOPIC") {
            self.session.rendezvous_topic = v;
        }
        if let Some(v) = var("MURMUR_SESSION__VERBOSE") {
            self.session.verbose = v == "true" || v == "1";
        }
        if let Some(t) = var("MURMUR_SESSION__CONNECTION_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.session.connection_timeout_secs = t;
        }
        if let Some(p) = var("MURMUR_RUNTIME__FATAL_POLICY").and_then(|v| v.parse().ok()) {
            self.runtime.fatal_policy = p;
        }
    }
}
