//! OBD-II Relay - Main Entry Point

use obd_relay::{init_logging, run, RelayConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "obd-relay.toml".to_string());
    let config = RelayConfig::load(&path)?;
    init_logging(&config.log_level, config.log_format);

    info!("=== OBD-II Relay v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Clients on {}, line {:?}", config.bind_addr, config.line.kind);

    tokio::select! {
        result = run(config) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
