//! # Configuration Management Module
//!
//! Settings for the link and for logging, loaded from a TOML file.
//!
//! ## Configuration Structure
//!
//! - [`LinkConfig`] - backend selection, serial line parameters and worker tuning
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dltlink::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("dlt.toml").await?;
//!     println!("Serial Port: {}", config.link.port);
//!
//!     Config::create_default("dlt.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [link]
//! backend = "serial"
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//! read_timeout_ms = 250
//! poll_interval_ms = 1
//! read_chunk = 64
//! deliver_empty_frames = false
//! clear_input_on_connect = true
//!
//! [logging]
//! level = "info"
//! # file = "dlt.log"
//! ```
//!
//! Every field has a default, so a partial file (or an empty one) is valid.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::dlt::{BackendKind, BackendTuning, SerialSettings};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Backend name. Only "serial" is supported.
    pub backend: String,
    pub port: String,
    pub baud_rate: u32,
    /// Bound on each transport read; also bounds how long `close` waits.
    pub read_timeout_ms: u64,
    /// Sleep between worker loop iterations.
    pub poll_interval_ms: u64,
    /// Max bytes per transport read.
    pub read_chunk: usize,
    /// Deliver zero-length frames to `read()` instead of dropping them.
    pub deliver_empty_frames: bool,
    pub clear_input_on_connect: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            backend: "serial".to_string(),
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115200,
            read_timeout_ms: 250,
            poll_interval_ms: 1,
            read_chunk: 64,
            deliver_empty_frames: false,
            clear_input_on_connect: true,
        }
    }
}

impl LinkConfig {
    pub fn tuning(&self) -> BackendTuning {
        BackendTuning {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_chunk: self.read_chunk,
            deliver_empty_frames: self.deliver_empty_frames,
        }
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.read_timeout_ms),
            clear_input_on_connect: self.clear_input_on_connect,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        match self.level.to_ascii_lowercase().as_str() {
            "off" => Some(log::LevelFilter::Off),
            "error" => Some(log::LevelFilter::Error),
            "warn" | "warning" => Some(log::LevelFilter::Warn),
            "info" => Some(log::LevelFilter::Info),
            "debug" => Some(log::LevelFilter::Debug),
            "trace" => Some(log::LevelFilter::Trace),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config = Self::from_toml_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.link
            .backend
            .parse::<BackendKind>()
            .map_err(|e| anyhow!("link.backend: {}", e))?;
        if self.link.port.trim().is_empty() {
            return Err(anyhow!("link.port must not be empty"));
        }
        if self.link.baud_rate == 0 {
            return Err(anyhow!("link.baud_rate must be greater than zero"));
        }
        if !(1..=10_000).contains(&self.link.read_timeout_ms) {
            return Err(anyhow!(
                "link.read_timeout_ms must be between 1 and 10000, got {}",
                self.link.read_timeout_ms
            ));
        }
        if !(1..=4096).contains(&self.link.read_chunk) {
            return Err(anyhow!(
                "link.read_chunk must be between 1 and 4096, got {}",
                self.link.read_chunk
            ));
        }
        if self.logging.level_filter().is_none() {
            return Err(anyhow!("logging.level '{}' is not a log level", self.logging.level));
        }
        Ok(())
    }
}
