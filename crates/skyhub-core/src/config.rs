//! Configuration system for skyhub.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SKYHUB_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/skyhub/config.toml
//!   3. ~/.config/skyhub/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub sessions: SessionConfig,
    pub relays: Vec<FeedConfig>,
    pub crossfeeds: Vec<FeedConfig>,
    pub access: AccessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name announced in packets this hub originates.
    pub name: String,
    /// Bind address. Empty = all interfaces.
    pub bind_address: String,
    /// UDP port for client and relay traffic.
    pub port: u16,
    /// Hub mode: forward relay-origin traffic to other relays.
    pub hub_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds of silence before a session is evicted.
    pub ttl_secs: u64,
    /// Upper bound on a client-advertised radar range, NM.
    pub max_radar_range_nm: u16,
    /// Range assigned to clients that do not advertise one, NM.
    pub out_of_reach_nm: u16,
}

/// A downstream packet target: a relay peer or a crossfeed sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Host name or literal address.
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Addresses (optionally with /prefix) always accepted as relays.
    pub whitelist: Vec<String>,
    /// Addresses (optionally with /prefix) whose packets are dropped.
    pub blacklist: Vec<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sessions: SessionConfig::default(),
            relays: Vec::new(),
            crossfeeds: Vec::new(),
            access: AccessConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "skyhub".to_owned(),
            bind_address: String::new(),
            port: 5000,
            hub_mode: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 10,
            max_radar_range_nm: 2000,
            out_of_reach_nm: 100,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_or_tmp().join(".config"))
        .join("skyhub")
}

fn home_or_tmp() -> PathBuf {
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

impl HubConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            HubConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SKYHUB_CONFIG")
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
            let text = toml::to_string_pretty(&HubConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply SKYHUB_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SKYHUB_SERVER__NAME") {
            self.server.name = v;
        }
        if let Ok(v) = std::env::var("SKYHUB_SERVER__BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Ok(v) = std::env::var("SKYHUB_SERVER__PORT") {
            if let Ok(p) = v.parse() {
                self.server.port = p;
            }
        }
        if let Ok(v) = std::env::var("SKYHUB_SERVER__HUB_MODE") {
            self.server.hub_mode = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("SKYHUB_SESSIONS__TTL_SECS") {
            if let Ok(t) = v.parse() {
                self.sessions.ttl_secs = t;
            }
        }
        if let Ok(v) = std::env::var("SKYHUB_SESSIONS__MAX_RADAR_RANGE_NM") {
            if let Ok(r) = v.parse() {
                self.sessions.max_radar_range_nm = r;
            }
        }
        if let Ok(v) = std::env::var("SKYHUB_SESSIONS__OUT_OF_REACH_NM") {
            if let Ok(r) = v.parse() {
                self.sessions.out_of_reach_nm = r;
            }
        }
    }
}
