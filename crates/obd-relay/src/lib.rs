//! OBD-II Relay
//!
//! Bridges dashboard clients speaking UDP to the single ELM327 line. The
//! line serves one request at a time; client requests queue for it.

pub mod clients;
pub mod config;
pub mod line;
pub mod server;

pub use clients::ClientRegistry;
pub use crate::config::{LineConfig, LineKind, LogFormat, RelayConfig};
pub use line::{open_line, spawn_line, status_reply, LineHandle, LineRequest};
pub use server::{reply_datagrams, RelayServer};

use anyhow::{anyhow, Context, Result};
use obd_protocol::ObdClient;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Level};
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

/// Open the line, configure the interpreter and serve clients
pub async fn run(config: RelayConfig) -> Result<()> {
    let mut client = open_line(&config).await?;

    match client.initialize(config.protocol()).await {
        Ok(info) => info!(
            "Line ready: {} on {}",
            info.interface_name, info.protocol_name
        ),
        // The vehicle may be switched off; requests retry through the session
        Err(e) => warn!("Interpreter initialization failed: {}", e),
    }

    let (line, line_task) = spawn_line(client, config.queue_depth);
    let server = RelayServer::bind(
        config.bind_addr,
        line,
        config.terminator,
        config.client_idle(),
    )
    .await
    .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    supervise(server, line_task).await
}

/// Serve clients until the socket fails or the line owner stops
pub async fn supervise(server: RelayServer, mut line_task: JoinHandle<ObdClient>) -> Result<()> {
    tokio::select! {
        result = server.serve() => result.context("Relay socket failed"),
        finished = &mut line_task => {
            let reason = match finished {
                Ok(_) => "line owner stopped".to_string(),
                Err(e) => format!("line owner failed: {}", e),
            };
            error!("Relay shutting down, {}", reason);
            Err(anyhow!("Relay {}", reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{Terminator, Transport};
    use std::net::SocketAddr;
    use std::time::Duration;

    #[tokio::test]
    async fn test_relay_stops_when_line_owner_dies() {
        let (ours, _theirs) = tokio::io::duplex(64);
        let mut client = ObdClient::new(Transport::stream(ours), Terminator::Cr);
        client.assume_ready();
        let (line, line_task) = spawn_line(client, 4);

        let bind = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = RelayServer::bind(bind, line, Terminator::Cr, Duration::from_secs(60))
            .await
            .unwrap();

        line_task.abort();
        let result = tokio::time::timeout(Duration::from_secs(5), supervise(server, line_task))
            .await
            .unwrap();
        let message = result.unwrap_err().to_string();
        assert!(message.contains("line owner failed"), "{}", message);
    }
}
