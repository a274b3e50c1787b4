//! Monitor configuration

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Source};
use obd_scheduler::SchedulerConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "OBD_MONITOR";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub relay_addr: SocketAddr,
    pub response_timeout_ms: u64,
    /// RPM and speed
    pub fast_rate_hz: f64,
    /// Temperatures and fuel level
    pub medium_rate_hz: f64,
    /// Battery, MIL, trouble codes and pressures
    pub slow_rate_hz: f64,
    /// Coolant temperature (°C) above which coolant is polled faster
    pub coolant_boost_threshold: f64,
    /// JSON file of trouble code descriptions
    pub descriptions: Option<String>,
    /// Median filter window for RPM and speed
    pub filter_window: usize,
    pub summary_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            relay_addr: SocketAddr::from(([127, 0, 0, 1], 8989)),
            response_timeout_ms: 2000,
            fast_rate_hz: scheduler.fast_rate_hz,
            medium_rate_hz: scheduler.medium_rate_hz,
            slow_rate_hz: scheduler.slow_rate_hz,
            coolant_boost_threshold: scheduler.coolant_boost_threshold,
            descriptions: None,
            filter_window: 5,
            summary_secs: 10,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &str) -> Result<Self> {
        Self::from_source(File::with_name(path).required(false))
            .with_context(|| format!("Failed to load monitor configuration from {}", path))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Self::from_source(File::from_str(text, FileFormat::Toml))
            .context("Failed to parse monitor configuration")
    }

    fn from_source<S>(file: S) -> Result<Self, config::ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_secs.max(1))
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            fast_rate_hz: self.fast_rate_hz,
            medium_rate_hz: self.medium_rate_hz,
            slow_rate_hz: self.slow_rate_hz,
            coolant_boost_threshold: self.coolant_boost_threshold,
            ..SchedulerConfig::default()
        }
    }
}
