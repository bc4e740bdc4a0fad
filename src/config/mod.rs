//! Configuration module for TriboDAQ
//!
//! This module handles application configuration including:
//! - Serial link settings (port, baud rate, read timeout)
//! - Experiment parameters sent to the rig before a run
//! - Data settings (save directory, live buffer size, flush batching)
//! - The active sensor source
//!
//! Every section and field carries a serde default, so a partial file is
//! merged over the defaults when loaded.
//!
//! # Files
//!
//! Configuration files are JSON (`.json`) or TOML (`.toml`), picked by
//! extension. Application logs go to the platform data directory under
//! [`APP_ID`]:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.tribodaq-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.tribodaq-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.tribodaq-rs\`
//!
//! # Example
//!
//! ```ignore
//! use tribodaq_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default("config.json");
//! config.serial.port = "/dev/ttyACM0".to_string();
//! config.save("config.json")?;
//! ```

use crate::error::{DaqError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::types::SensorSource;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.tribodaq-rs";

/// Default serial port
pub const DEFAULT_PORT: &str = "COM3";

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default serial read timeout in seconds
pub const DEFAULT_TIMEOUT_S: f64 = 1.0;

/// Default number of points kept in the live buffer
pub const DEFAULT_LIVE_BUFFER_CAPACITY: usize = 10_000;

/// Default number of durable-log rows between flushes to disk
pub const DEFAULT_FLUSH_EVERY_ROWS: usize = 50;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        DaqError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            DaqError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Serial Settings ====================

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g. "COM3", "/dev/ttyACM0")
    #[serde(default = "default_port")]
    pub port: String,

    /// Baud rate
    #[serde(default = "default_baud_rate", alias = "baudrate")]
    pub baud_rate: u32,

    /// Read timeout in seconds
    #[serde(default = "default_timeout_s", alias = "timeout")]
    pub timeout_s: f64,
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_s() -> f64 {
    DEFAULT_TIMEOUT_S
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_s: DEFAULT_TIMEOUT_S,
        }
    }
}

impl SerialConfig {
    /// Read timeout as a `Duration` (negative or NaN values clamp to zero)
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_s).unwrap_or(Duration::ZERO)
    }
}

// ==================== Experiment Parameters ====================

/// Parameters of one experiment run, sent to the rig before it starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ExperimentParameters {
    /// Run the force axis in closed-loop control mode
    #[serde(default)]
    pub use_force_control_mode: bool,

    /// Pump speed in RPM
    #[serde(default = "default_rpm_pump")]
    pub rpm_pump: f64,

    /// Sliding axis speed in RPM
    #[serde(default = "default_rpm_axis")]
    pub rpm_axis: f64,

    /// Force axis speed in RPM
    #[serde(default = "default_rpm_force")]
    pub rpm_force: f64,

    /// Total run duration in seconds (device time)
    #[serde(default = "default_experiment_duration_s")]
    pub experiment_duration_s: f64,
}

fn default_rpm_pump() -> f64 {
    500.0
}

fn default_rpm_axis() -> f64 {
    80.0
}

fn default_rpm_force() -> f64 {
    60.0
}

fn default_experiment_duration_s() -> f64 {
    282.1
}

impl Default for ExperimentParameters {
    fn default() -> Self {
        Self {
            use_force_control_mode: false,
            rpm_pump: default_rpm_pump(),
            rpm_axis: default_rpm_axis(),
            rpm_force: default_rpm_force(),
            experiment_duration_s: default_experiment_duration_s(),
        }
    }
}

// ==================== Data Settings ====================

/// Where and how run data is kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Directory receiving one durable log per run
    #[serde(default = "default_save_directory")]
    pub save_directory: PathBuf,

    /// Write a summary report next to the log when a run stops
    #[serde(default = "default_true")]
    pub auto_save: bool,

    /// How often the presentation layer refreshes, in milliseconds
    #[serde(default = "default_plot_update_interval", alias = "plot_update_interval")]
    pub plot_update_interval_ms: u64,

    /// Capacity of the live ring buffer
    #[serde(default = "default_live_buffer_capacity")]
    pub live_buffer_capacity: usize,

    /// Durable-log rows between flushes to stable storage
    #[serde(default = "default_flush_every_rows")]
    pub flush_every_rows: usize,
}

fn default_save_directory() -> PathBuf {
    PathBuf::from("experiment_data")
}

fn default_true() -> bool {
    true
}

fn default_plot_update_interval() -> u64 {
    100
}

fn default_live_buffer_capacity() -> usize {
    DEFAULT_LIVE_BUFFER_CAPACITY
}

fn default_flush_every_rows() -> usize {
    DEFAULT_FLUSH_EVERY_ROWS
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            save_directory: default_save_directory(),
            auto_save: true,
            plot_update_interval_ms: default_plot_update_interval(),
            live_buffer_capacity: DEFAULT_LIVE_BUFFER_CAPACITY,
            flush_every_rows: DEFAULT_FLUSH_EVERY_ROWS,
        }
    }
}

impl DataSettings {
    /// Refresh interval as a `Duration`
    pub fn plot_update_interval(&self) -> Duration {
        Duration::from_millis(self.plot_update_interval_ms)
    }
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Which sensor feeds the canonical force values
    #[serde(default)]
    pub sensor_source: SensorSource,

    /// Serial link settings
    #[serde(default, alias = "serial_settings")]
    pub serial: SerialConfig,

    /// Experiment parameters
    #[serde(default, alias = "experiment_parameters")]
    pub experiment: ExperimentParameters,

    /// Data settings
    #[serde(default, alias = "data_settings")]
    pub data: DataSettings,
}

/// On-disk configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl AppConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| DaqError::Config(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DaqError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DaqError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        match ConfigFormat::from_path(path) {
            ConfigFormat::Json => Self::from_json(&content),
            ConfigFormat::Toml => Self::from_toml(&content),
        }
    }

    /// Load a configuration file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DaqError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| DaqError::Config(format!("Failed to serialize config: {}", e)))?,
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| DaqError::Config(format!("Failed to serialize config: {}", e)))?,
        };

        std::fs::write(path, content).map_err(|e| {
            DaqError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
