//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/skiff/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/skiff/` (~/.config/skiff/)
//! - Data: `$XDG_DATA_HOME/skiff/` (~/.local/share/skiff/)
//! - State/Logs: `$XDG_STATE_HOME/skiff/` (~/.local/state/skiff/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Backend server endpoints
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat behavior
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// HTTP API base (e.g. `http://127.0.0.1:8000/api`)
    #[serde(default = "default_http_base")]
    pub http_base: String,

    /// WebSocket base; derived from `http_base` when unset
    pub ws_base: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_base: default_http_base(),
            ws_base: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Returns the HTTP base with no trailing slash.
    pub fn http_base(&self) -> &str {
        self.http_base.trim_end_matches('/')
    }

    /// Returns the WebSocket base, deriving it from `http_base` when unset.
    ///
    /// `http://` becomes `ws://` and `https://` becomes `wss://`.
    pub fn ws_base(&self) -> String {
        if let Some(ws) = &self.ws_base {
            return ws.trim_end_matches('/').to_string();
        }
        let base = self.http_base();
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        }
    }

    /// Validate configuration, returning an error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.http_base.trim().is_empty() {
            return Err(Error::Config("server.http_base must not be empty".to_string()));
        }
        if !self.http_base.starts_with("http://") && !self.http_base.starts_with("https://") {
            return Err(Error::Config(format!(
                "server.http_base must start with http:// or https://, got {}",
                self.http_base
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "server.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_http_base() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Chat behavior configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Whether turns ask the backend to include web content in retrieval
    #[serde(default = "default_include_web")]
    pub include_web: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            include_web: default_include_web(),
        }
    }
}

fn default_include_web() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.server.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/skiff/config.toml` (~/.config/skiff/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("skiff").join("config.toml")
    }

    /// Returns the data directory path (for the persisted chat state)
    ///
    /// `$XDG_DATA_HOME/skiff/` (~/.local/share/skiff/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("skiff")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/skiff/` (~/.local/state/skiff/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("skiff")
    }

    /// Returns the persisted chat state file path
    ///
    /// `$XDG_DATA_HOME/skiff/state.json` (~/.local/share/skiff/state.json)
    pub fn state_path() -> PathBuf {
        Self::data_dir().join("state.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/skiff/skiff.log` (~/.local/state/skiff/skiff.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("skiff.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
