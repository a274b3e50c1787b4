//! OBD-II Monitor - Main Entry Point
//!
//! Polls the vehicle through the relay on the dashboard schedule and logs
//! validated gauge values.

mod config;
mod dashboard;

use anyhow::{Context, Result};
use crate::config::{LogFormat, MonitorConfig};
use dashboard::Dashboard;
use obd_protocol::{DescriptionMap, DescriptionStore, ObdClient, Terminator, Transport};
use obd_scheduler::RequestScheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const EVENT_QUEUE_DEPTH: usize = 64;

fn init_logging(level: &str, format: LogFormat) {
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

fn load_descriptions(config: &MonitorConfig) -> Result<Option<Arc<dyn DescriptionStore>>> {
    let Some(path) = &config.descriptions else {
        return Ok(None);
    };
    let map = DescriptionMap::load(path)
        .with_context(|| format!("Failed to load descriptions from {}", path))?;
    info!("Loaded {} descriptions", map.len());
    Ok(Some(Arc::new(map)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "obd-monitor.toml".to_string());
    let config = MonitorConfig::load(&path)?;
    init_logging(&config.log_level, config.log_format);

    info!("=== OBD-II Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let descriptions = load_descriptions(&config)?;
    let transport = Transport::udp(SocketAddr::from(([0, 0, 0, 0], 0)), config.relay_addr)
        .await
        .with_context(|| format!("Failed to connect to relay at {}", config.relay_addr))?;

    let mut client = ObdClient::new(transport, Terminator::Cr);
    client.set_timeout(config.response_timeout());
    client.assume_ready();

    let mut dashboard = Dashboard::new(config.filter_window).context("Invalid filter_window")?;
    if let Some(store) = descriptions {
        client = client.with_descriptions(store.clone());
        dashboard = dashboard.with_descriptions(store);
    }

    match client.probe().await {
        Ok(events) => events.into_iter().for_each(|event| dashboard.handle(event)),
        Err(e) => warn!("Vehicle probe failed: {}", e),
    }

    let mut scheduler = RequestScheduler::with_dashboard_plan(config.scheduler());
    let stop = scheduler.stop_handle();
    info!("Polling {} requests through {}", scheduler.pid_count(), config.relay_addr);

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let mut poller = tokio::spawn(async move { scheduler.run(&mut client, events_tx).await });
    let mut summary = tokio::time::interval(config.summary_interval());

    loop {
        tokio::select! {
            Some(event) = events_rx.recv() => dashboard.handle(event),
            _ = summary.tick() => info!("{}", dashboard.summary()),
            finished = &mut poller => {
                match finished {
                    Ok(Ok(())) => info!("Scheduler finished"),
                    Ok(Err(e)) => warn!("Scheduler stopped: {}", e),
                    Err(e) => warn!("Scheduler task failed: {}", e),
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                stop.stop();
                break;
            }
        }
    }

    info!("{}", dashboard.summary());
    Ok(())
}
