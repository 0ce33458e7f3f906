//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelemetryError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub sources: SourceConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Telemetry log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Directory receiving the telemetry `.log` files
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Directory receiving the application's own tracing output
    #[serde(default = "default_app_log_dir")]
    pub app_log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_write_interval_ms")]
    pub write_interval_ms: u64,
}

/// Recency buffer capacities per record class
#[derive(Debug, Deserialize, Clone)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_capacity")]
    pub ca: usize,

    #[serde(default = "default_buffer_capacity")]
    pub gnss: usize,

    #[serde(default = "default_buffer_capacity")]
    pub electric: usize,

    #[serde(default = "default_buffer_capacity")]
    pub system: usize,
}

/// Sensor source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Use simulated sources instead of hardware
    #[serde(default)]
    pub simulate: bool,

    /// Cycle Analyst serial device, e.g. "/dev/ttyUSB0"
    #[serde(default)]
    pub ca_port: Option<String>,

    #[serde(default = "default_ca_baud_rate")]
    pub ca_baud_rate: u32,

    /// GNSS receiver serial device, e.g. "/dev/ttyAMA0"
    #[serde(default)]
    pub gnss_port: Option<String>,

    #[serde(default = "default_gnss_baud_rate")]
    pub gnss_baud_rate: u32,

    #[serde(default = "default_ca_interval_ms")]
    pub ca_interval_ms: u64,

    #[serde(default = "default_gnss_interval_ms")]
    pub gnss_interval_ms: u64,

    #[serde(default = "default_electric_interval_ms")]
    pub electric_interval_ms: u64,

    #[serde(default = "default_system_interval_ms")]
    pub system_interval_ms: u64,
}

/// Broadcast hub configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,

    #[serde(default = "default_broadcast_ca_interval_ms")]
    pub ca_interval_ms: u64,

    #[serde(default = "default_gnss_interval_ms")]
    pub gnss_interval_ms: u64,

    #[serde(default = "default_electric_interval_ms")]
    pub electric_interval_ms: u64,

    #[serde(default = "default_system_interval_ms")]
    pub system_interval_ms: u64,
}

// Default value functions
fn default_log_dir() -> String { "./logs".to_string() }
fn default_app_log_dir() -> String { "./logs/app".to_string() }
fn default_max_records_per_file() -> usize { crate::telemetry::DEFAULT_MAX_RECORDS_PER_FILE }
fn default_write_interval_ms() -> u64 { 100 }

fn default_buffer_capacity() -> usize { crate::buffer::DEFAULT_BUFFER_CAPACITY }

fn default_ca_baud_rate() -> u32 { crate::sources::cycle_analyst::CA_BAUD_RATE }
fn default_gnss_baud_rate() -> u32 { crate::sources::gnss::GNSS_BAUD_RATE }
fn default_ca_interval_ms() -> u64 { 100 }
fn default_gnss_interval_ms() -> u64 { 1000 }
fn default_electric_interval_ms() -> u64 { 1000 }
fn default_system_interval_ms() -> u64 { 5000 }

fn default_max_subscribers() -> usize { crate::broadcast::DEFAULT_MAX_SUBSCRIBERS }
fn default_broadcast_ca_interval_ms() -> u64 { 200 }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            app_log_dir: default_app_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            write_interval_ms: default_write_interval_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            ca: default_buffer_capacity(),
            gnss: default_buffer_capacity(),
            electric: default_buffer_capacity(),
            system: default_buffer_capacity(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            ca_port: None,
            ca_baud_rate: default_ca_baud_rate(),
            gnss_port: None,
            gnss_baud_rate: default_gnss_baud_rate(),
            ca_interval_ms: default_ca_interval_ms(),
            gnss_interval_ms: default_gnss_interval_ms(),
            electric_interval_ms: default_electric_interval_ms(),
            system_interval_ms: default_system_interval_ms(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_subscribers: default_max_subscribers(),
            ca_interval_ms: default_broadcast_ca_interval_ms(),
            gnss_interval_ms: default_gnss_interval_ms(),
            electric_interval_ms: default_electric_interval_ms(),
            system_interval_ms: default_system_interval_ms(),
        }
    }
}

impl SourceConfig {
    pub fn ca_interval(&self) -> Duration { Duration::from_millis(self.ca_interval_ms) }
    pub fn gnss_interval(&self) -> Duration { Duration::from_millis(self.gnss_interval_ms) }
    pub fn electric_interval(&self) -> Duration { Duration::from_millis(self.electric_interval_ms) }
    pub fn system_interval(&self) -> Duration { Duration::from_millis(self.system_interval_ms) }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use greybike::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.log.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty"));
        }

        if self.log.app_log_dir.is_empty() {
            return Err(invalid("app_log_dir cannot be empty"));
        }

        if self.log.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        for (name, capacity) in [
            ("buffers.ca", self.buffers.ca),
            ("buffers.gnss", self.buffers.gnss),
            ("buffers.electric", self.buffers.electric),
            ("buffers.system", self.buffers.system),
        ] {
            if capacity == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }

        for (name, interval_ms) in [
            ("log.write_interval_ms", self.log.write_interval_ms),
            ("sources.ca_interval_ms", self.sources.ca_interval_ms),
            ("sources.gnss_interval_ms", self.sources.gnss_interval_ms),
            ("sources.electric_interval_ms", self.sources.electric_interval_ms),
            ("sources.system_interval_ms", self.sources.system_interval_ms),
            ("broadcast.ca_interval_ms", self.broadcast.ca_interval_ms),
            ("broadcast.gnss_interval_ms", self.broadcast.gnss_interval_ms),
            ("broadcast.electric_interval_ms", self.broadcast.electric_interval_ms),
            ("broadcast.system_interval_ms", self.broadcast.system_interval_ms),
        ] {
            if interval_ms == 0 || interval_ms > 60000 {
                return Err(invalid(format!("{} must be between 1 and 60000", name)));
            }
        }

        if self.broadcast.max_subscribers == 0 {
            return Err(invalid("max_subscribers must be greater than 0"));
        }

        for (name, port) in [("ca_port", &self.sources.ca_port), ("gnss_port", &self.sources.gnss_port)] {
            if matches!(port, Some(p) if p.is_empty()) {
                return Err(invalid(format!("{} cannot be empty when set", name)));
            }
        }

        Ok(())
    }
}

fn invalid<T: std::fmt::Display>(msg: T) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}
