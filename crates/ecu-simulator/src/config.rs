//! Simulator configuration

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Source};
use obd_protocol::{DtcCode, ObdProtocol};
use serde::Deserialize;
use std::net::SocketAddr;

pub const ENV_PREFIX: &str = "ECU_SIM";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub bind_addr: SocketAddr,
    /// Echo requests back, as an interpreter does after reset
    pub echo: bool,
    pub battery_voltage: f64,
    pub vin: String,
    pub ecu_name: String,
    /// Stored trouble code, empty for none
    pub stored_dtc: String,
    /// Protocol the simulated vehicle speaks
    pub protocol: u8,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8990)),
            echo: true,
            battery_voltage: 12.6,
            vin: "1D4GP00R55B123456".to_string(),
            ecu_name: "ECM-EngineControl".to_string(),
            stored_dtc: "P0133".to_string(),
            protocol: 6,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl SimulatorConfig {
    pub fn load(path: &str) -> Result<Self> {
        Self::from_source(File::with_name(path).required(false))
            .with_context(|| format!("Failed to load simulator configuration from {}", path))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Self::from_source(File::from_str(text, FileFormat::Toml))
            .context("Failed to parse simulator configuration")
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

    /// Parsed stored trouble code
    pub fn stored_dtc(&self) -> Result<Option<DtcCode>> {
        let text = self.stored_dtc.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let code = text
            .parse()
            .with_context(|| format!("Invalid stored_dtc {:?}", text))?;
        Ok(Some(code))
    }

    pub fn protocol(&self) -> ObdProtocol {
        ObdProtocol::from_number(self.protocol)
    }
}
