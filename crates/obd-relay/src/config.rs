//! Relay configuration
//!
//! Optional TOML file layered under `OBD_RELAY__*` environment variables,
//! e.g. `OBD_RELAY__LINE__KIND=udp`.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Source};
use obd_protocol::{ObdProtocol, Terminator};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "OBD_RELAY";

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// What the relay talks to on its single line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// ELM327 interpreter on a serial port
    #[default]
    Serial,
    /// ECU simulator over UDP
    Udp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub kind: LineKind,
    /// Serial device path
    pub device: String,
    pub baud_rate: u32,
    /// Simulator address when `kind = "udp"`
    pub addr: SocketAddr,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            kind: LineKind::Serial,
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            addr: SocketAddr::from(([127, 0, 0, 1], 8990)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address dashboard clients send requests to
    pub bind_addr: SocketAddr,
    pub line: LineConfig,
    pub terminator: Terminator,
    pub response_timeout_ms: u64,
    /// Protocol number passed to `ATTP` on start (0 = automatic)
    pub protocol: u8,
    /// Requests waiting for the line before clients are refused
    pub queue_depth: usize,
    /// Seconds without traffic before a client's session is dropped
    pub client_idle_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8989)),
            line: LineConfig::default(),
            terminator: Terminator::Cr,
            response_timeout_ms: 2000,
            protocol: 0,
            queue_depth: 32,
            client_idle_secs: 300,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl RelayConfig {
    /// Load from an optional TOML file and the environment
    pub fn load(path: &str) -> Result<Self> {
        Self::from_source(File::with_name(path).required(false))
            .with_context(|| format!("Failed to load relay configuration from {}", path))
    }

    /// Parse a TOML document, still honouring environment overrides
    pub fn from_toml(text: &str) -> Result<Self> {
        Self::from_source(File::from_str(text, FileFormat::Toml))
            .context("Failed to parse relay configuration")
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

    pub fn client_idle(&self) -> Duration {
        Duration::from_secs(self.client_idle_secs)
    }

    /// Protocol selected with `ATTP`, out-of-range numbers fall back to automatic
    pub fn protocol(&self) -> ObdProtocol {
        ObdProtocol::from_number(self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr.port(), 8989);
        assert_eq!(config.line.kind, LineKind::Serial);
        assert_eq!(config.line.baud_rate, 9600);
        assert_eq!(config.terminator, Terminator::Cr);
        assert_eq!(config.response_timeout(), Duration::from_secs(2));
        assert_eq!(config.protocol(), ObdProtocol::Auto);
    }

    #[test]
    fn test_toml_overrides() {
        let config = RelayConfig::from_toml(
            r#"
            bind_addr = "127.0.0.1:9000"
            terminator = "crlf"
            protocol = 6
            log_format = "json"

            [line]
            kind = "udp"
            addr = "127.0.0.1:8990"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.terminator, Terminator::CrLf);
        assert_eq!(config.line.kind, LineKind::Udp);
        assert_eq!(config.line.device, "/dev/ttyUSB0");
        assert_eq!(config.protocol(), ObdProtocol::Iso15765_4Can11bit500);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.queue_depth, 32);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = RelayConfig::load("/nonexistent/obd-relay.toml").unwrap();
        assert_eq!(config.client_idle(), Duration::from_secs(300));
    }

    #[test]
    fn test_bad_terminator_rejected() {
        assert!(RelayConfig::from_toml("terminator = \"tab\"").is_err());
    }
}
