//! ECU Simulator
//!
//! Answers OBD-II and AT requests over UDP the way a vehicle behind an
//! ELM327 interpreter would, so the relay and monitor run without hardware.

pub mod config;
pub mod elm;
pub mod server;
pub mod simulator;
pub mod vehicle;

pub use crate::config::{LogFormat, SimulatorConfig};
pub use elm::{ElmState, BANNER};
pub use server::SimulatorServer;
pub use simulator::Simulator;
pub use vehicle::VehicleModel;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(level: &str, format: LogFormat) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .expect("Failed to set tracing subscriber");
}

/// Build the vehicle from configuration and serve requests
pub async fn run(config: SimulatorConfig) -> Result<()> {
    let vehicle = VehicleModel::new(
        config.battery_voltage,
        config.vin.clone(),
        config.ecu_name.clone(),
        config.stored_dtc()?,
        config.protocol(),
    );
    let server = SimulatorServer::bind(config.bind_addr, Simulator::new(vehicle), config.echo)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    server.serve().await.context("Simulator socket failed")
}
