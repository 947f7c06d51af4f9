//! Configuration loading for the bridge.
//!
//! Parses `imebridge.toml` (or an override path supplied by the binary):
//! `[sync] wait_timeout_ms` bounds every synchronization wait, `[channel]
//! capacity` sizes the document command channel. Unknown fields are ignored
//! (TOML deserialization tolerance) so the file can evolve without warnings;
//! a missing discovery-path file yields defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "imebridge.toml";
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn default_wait_timeout_ms() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSection {
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelSection {
    #[serde(default = "default_channel_capacity")]
    pub capacity: usize,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub channel: ChannelSection,
}

/// Effective bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub wait_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        ConfigFile::default().into()
    }
}

impl From<ConfigFile> for BridgeConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            wait_timeout: Duration::from_millis(file.sync.wait_timeout_ms),
            // A zero capacity would deadlock the fire-and-forget command lane.
            channel_capacity: file.channel.capacity.max(1),
        }
    }
}

/// Load configuration. An explicit `path` must exist and parse; with `None`,
/// `imebridge.toml` in the working directory is used when present, defaults
/// otherwise.
pub fn load_from(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(source) if !required && source.kind() == io::ErrorKind::NotFound => {
            info!(target: "config", path = %path.display(), "absent_using_defaults");
            return Ok(BridgeConfig::default());
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    let file: ConfigFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    let config = BridgeConfig::from(file);
    info!(
        target: "config",
        path = %path.display(),
        wait_timeout_ms = config.wait_timeout.as_millis() as u64,
        channel_capacity = config.channel_capacity,
        "loaded"
    );
    Ok(config)
}
