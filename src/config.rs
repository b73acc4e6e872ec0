// src/config.rs

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::metrics::DEFAULT_HISTORY_CAPACITY;

pub const CONFIG_ENV_OVERRIDE: &str = "HOST_MONITOR_CONFIG";
const MIN_PERIOD_MS: u64 = 10;
/// Twelve hours of System + User samples at the default period.
pub const MAX_HISTORY_CAPACITY: usize = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub cpu_period_ms: u64,           // Default: 1000
    pub memory_period_ms: u64,        // Default: 1000
    pub history_capacity: usize,      // Default: 240 (two minutes of System + User)
    pub hidden_mount_prefixes: Vec<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            cpu_period_ms: 1000,
            memory_period_ms: 1000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            hidden_mount_prefixes: vec![
                "/System/Volumes".to_string(),
                "/private/var/vm".to_string(),
                "/dev".to_string(),
                "/snap".to_string(),
            ],
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, io::Error),
    Parse(PathBuf, serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, err) => write!(f, "reading {} failed: {}", path.display(), err),
            ConfigError::Parse(path, err) => {
                write!(f, "invalid config {}: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(_, err) => Some(err),
            ConfigError::Parse(_, err) => Some(err),
        }
    }
}

impl SamplerConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        serde_json::from_str(&text).map_err(|err| ConfigError::Parse(path.to_path_buf(), err))
    }

    /// `$HOST_MONITOR_CONFIG`, else `<config dir>/host-monitor/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_OVERRIDE) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("host-monitor").join("config.json"))
    }

    /// Loads from [`default_path`](Self::default_path). A missing file means
    /// defaults; an unreadable or malformed one is logged and also yields
    /// defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_or_default(&path),
            None => Self::default(),
        }
    }

    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::from_path(path) {
            Ok(config) => config.validated(),
            Err(err) => {
                warn!("ignoring sampler config: {}", err);
                Self::default()
            }
        }
    }

    /// Periods below 10 ms are raised to 10 ms; `history_capacity` is capped
    /// at [`MAX_HISTORY_CAPACITY`].
    pub fn validated(&self) -> Self {
        if self.history_capacity > MAX_HISTORY_CAPACITY {
            warn!(
                "history_capacity {} is above {}; capping",
                self.history_capacity, MAX_HISTORY_CAPACITY
            );
        }
        SamplerConfig {
            cpu_period_ms: self.cpu_period_ms.max(MIN_PERIOD_MS),
            memory_period_ms: self.memory_period_ms.max(MIN_PERIOD_MS),
            history_capacity: self.history_capacity.min(MAX_HISTORY_CAPACITY),
            ..self.clone()
        }
    }
}

lazy_static! {
    pub static ref SAMPLER_CONFIG: SamplerConfig = SamplerConfig::load();
}
