//! Controller configuration.
//!
//! Read from a TOML file; every field is optional and falls back to its
//! default.
//!
//! ```toml
//! # ~/.config/rxscope/config.toml
//! supported_session_kinds = ["rust", "lldb"]
//! agent_address = "127.0.0.1:9329"
//! event_buffer = 1024
//! command_buffer = 100
//! attach_timeout_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use rxscope_protocol::{AGENT_ADDRESS_ENV, DEFAULT_AGENT_ADDRESS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Debug session kinds a session is attached for.
    pub supported_session_kinds: Vec<String>,
    /// Agent address used when a session does not name one.
    pub agent_address: String,
    /// Per-subscriber capacity of event channels.
    pub event_buffer: usize,
    /// Capacity of actor command channels.
    pub command_buffer: usize,
    /// Upper bound on a session's attach handshake, in milliseconds.
    pub attach_timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            supported_session_kinds: ["rust", "lldb", "codelldb", "gdb"]
                .into_iter()
                .map(String::from)
                .collect(),
            agent_address: DEFAULT_AGENT_ADDRESS.to_string(),
            event_buffer: 1024,
            command_buffer: 100,
            attach_timeout_ms: 5_000,
        }
    }
}

impl ControllerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        debug!(path = %path.display(), "Loaded controller config");
        Self::from_toml_str(&content)
    }

    /// Loads `<config dir>/rxscope/config.toml`, or the defaults if there
    /// is no such file.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Applies `RXSCOPE_AGENT_ADDR` if set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(address) = std::env::var(AGENT_ADDRESS_ENV) {
            if !address.is_empty() {
                self.agent_address = address;
            }
        }
        self
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    pub fn supports_kind(&self, kind: &str) -> bool {
        self.supported_session_kinds.iter().any(|k| k == kind)
    }
}

/// `<config dir>/rxscope/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rxscope").join("config.toml"))
}
