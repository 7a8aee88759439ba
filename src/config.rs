//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tokio::time::Duration;

use crate::connection::endpoint::{is_websocket_url, websocket_url_for_origin};
use crate::connection::ManagerSettings;
use crate::error::{DashboardError, Result};
use crate::telemetry::{AggregatorSettings, ClassificationRules, Position, SampleGroup};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub series: SeriesConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telemetry endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// Explicit `ws://` or `wss://` URL; empty means derive from `origin`
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Time series configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SeriesConfig {
    #[serde(default = "default_max_data_points")]
    pub max_data_points: usize,
}

/// Map configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_fallback_latitude")]
    pub fallback_latitude: f64,

    #[serde(default = "default_fallback_longitude")]
    pub fallback_longitude: f64,
}

/// Sample classification configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ClassificationConfig {
    #[serde(default = "default_precedence")]
    pub precedence: Vec<SampleGroup>,
}

/// Replay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    #[serde(default = "default_replay_log_dir")]
    pub log_dir: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; empty disables file output
    #[serde(default)]
    pub log_dir: String,

    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

// Default value functions
fn default_origin() -> String { "http://localhost:1880".to_string() }
fn default_path() -> String { "/ws".to_string() }
fn default_reconnect_delay_ms() -> u64 { crate::connection::manager::DEFAULT_RECONNECT_DELAY_MS }
fn default_connect_timeout_ms() -> u64 { 10000 }

fn default_max_data_points() -> usize { crate::telemetry::MAX_DATA_POINTS }

fn default_fallback_latitude() -> f64 { 55.7558 }
fn default_fallback_longitude() -> f64 { 37.6176 }

fn default_precedence() -> Vec<SampleGroup> { ClassificationRules::default().precedence().to_vec() }

fn default_replay_log_dir() -> String { "/data/logs".to_string() }

fn default_log_level() -> String { "info".to_string() }
fn default_snapshot_interval_ms() -> u64 { 1000 }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            origin: default_origin(),
            path: default_path(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self { max_data_points: default_max_data_points() }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            fallback_latitude: default_fallback_latitude(),
            fallback_longitude: default_fallback_longitude(),
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self { precedence: default_precedence() }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { log_dir: default_replay_log_dir() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
        }
    }
}

impl ConnectionConfig {
    /// Resolve the WebSocket URL to connect to
    ///
    /// Uses `endpoint` when set, otherwise derives `{ws|wss}://{host}{path}`
    /// from `origin`.
    pub fn endpoint_url(&self) -> Result<String> {
        if self.endpoint.is_empty() {
            websocket_url_for_origin(&self.origin, &self.path)
        } else {
            Ok(self.endpoint.clone())
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
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
    /// use drone_dashboard::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Settings for the telemetry aggregator
    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            max_data_points: self.series.max_data_points,
            fallback_position: Position {
                latitude: self.map.fallback_latitude,
                longitude: self.map.fallback_longitude,
            },
            rules: ClassificationRules::new(self.classification.precedence.clone()),
        }
    }

    /// Settings for the connection manager
    pub fn manager_settings(&self) -> Result<ManagerSettings> {
        Ok(ManagerSettings {
            url: self.connection.endpoint_url()?,
            reconnect_delay: Duration::from_millis(self.connection.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.connection.connect_timeout_ms),
            replay_dir: self.replay.log_dir.clone(),
        })
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate endpoint
        if !self.connection.endpoint.is_empty() && !is_websocket_url(&self.connection.endpoint) {
            return Err(invalid("endpoint must start with ws:// or wss://"));
        }

        if self.connection.endpoint.is_empty() {
            self.connection.endpoint_url().map_err(|e| invalid(format!("origin: {}", e)))?;
        }

        // Validate timing fields
        if self.connection.reconnect_delay_ms == 0 || self.connection.reconnect_delay_ms > 60000 {
            return Err(invalid("reconnect_delay_ms must be between 1 and 60000"));
        }

        if self.connection.connect_timeout_ms == 0 || self.connection.connect_timeout_ms > 60000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 60000"));
        }

        if self.logging.snapshot_interval_ms == 0 || self.logging.snapshot_interval_ms > 60000 {
            return Err(invalid("snapshot_interval_ms must be between 1 and 60000"));
        }

        // Validate series capacity
        if self.series.max_data_points == 0 || self.series.max_data_points > 10000 {
            return Err(invalid("max_data_points must be between 1 and 10000"));
        }

        // Validate fallback coordinate
        if !(-90.0..=90.0).contains(&self.map.fallback_latitude) {
            return Err(invalid("fallback_latitude must be between -90 and 90"));
        }

        if !(-180.0..=180.0).contains(&self.map.fallback_longitude) {
            return Err(invalid("fallback_longitude must be between -180 and 180"));
        }

        // Validate classification precedence
        let precedence = &self.classification.precedence;
        if precedence.is_empty() {
            return Err(invalid("classification precedence cannot be empty"));
        }

        for (i, group) in precedence.iter().enumerate() {
            if precedence[..i].contains(group) {
                return Err(invalid(format!(
                    "classification precedence lists {:?} more than once",
                    group
                )));
            }
        }

        // Validate log level
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> DashboardError {
    DashboardError::Config(toml::de::Error::custom(msg))
}
