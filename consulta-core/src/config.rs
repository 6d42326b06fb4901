//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/consulta/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/consulta/` (~/.config/consulta/)
//! - Data: `$XDG_DATA_HOME/consulta/` (~/.local/share/consulta/)
//! - State/Logs: `$XDG_STATE_HOME/consulta/` (~/.local/state/consulta/)

use crate::error::{Error, Result};
use crate::session::SessionType;
use serde::Deserialize;
use std::path::PathBuf;

const APP_DIR: &str = "consulta";

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
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Session behaviour
    #[serde(default)]
    pub sessions: SessionPolicy,

    /// Document generator endpoint (optional)
    #[serde(default)]
    pub generator: GeneratorConfig,
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

/// Rules the service applies on top of the entity state machines
#[derive(Debug, Deserialize, Clone)]
pub struct SessionPolicy {
    /// Type used when a session is opened without one
    #[serde(default)]
    pub default_type: SessionType,

    /// Only start a session while its meeting is active
    #[serde(default)]
    pub require_live_meeting: bool,

    /// Number of most recent turns sent to the document generator
    #[serde(default = "default_transcript_window")]
    pub transcript_window: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            default_type: SessionType::default(),
            require_live_meeting: false,
            transcript_window: default_transcript_window(),
        }
    }
}

fn default_transcript_window() -> usize {
    20
}

/// Document generator configuration
///
/// When enabled, `session generate` posts the session's requirements and
/// recent transcript to `{endpoint}/documents`.
#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    /// Enable/disable document generation
    #[serde(default)]
    pub enabled: bool,

    /// Generator base URL (e.g., `https://docs.example.com`)
    pub endpoint: Option<String>,

    /// Bearer token sent with every request
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_generator_max_retries")]
    pub max_retries: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            timeout_secs: default_generator_timeout(),
            max_retries: default_generator_max_retries(),
        }
    }
}

impl GeneratorConfig {
    /// Check if the generator is enabled and has somewhere to send requests
    pub fn is_ready(&self) -> bool {
        self.enabled && self.endpoint.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.endpoint.as_deref() {
            None => {
                return Err(Error::Config(
                    "generator.endpoint is required when generator is enabled".to_string(),
                ))
            }
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                return Err(Error::Config(format!(
                    "generator.endpoint must be an http(s) URL, got {:?}",
                    url
                )))
            }
            Some(_) => {}
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "generator.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_generator_timeout() -> u64 {
    60
}

fn default_generator_max_retries() -> usize {
    3
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

        config.generator.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/consulta/config.toml` (~/.config/consulta/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/consulta/consulta.db` (~/.local/share/consulta/consulta.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("consulta.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/consulta/consulta.log` (~/.local/state/consulta/consulta.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("consulta.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// Called by the CLI before anything reads these env vars.
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
