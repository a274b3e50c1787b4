//! ECU Simulator - Main Entry Point

use ecu_simulator::{init_logging, run, SimulatorConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "ecu-simulator.toml".to_string());
    let config = SimulatorConfig::load(&path)?;
    init_logging(&config.log_level, config.log_format);

    info!("=== ECU Simulator v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "VIN {}, stored code {:?}, protocol {}",
        config.vin,
        config.stored_dtc,
        config.protocol()
    );

    tokio::select! {
        result = run(config) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
