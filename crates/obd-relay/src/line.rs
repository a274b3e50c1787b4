//! Line owner task
//!
//! The interpreter handles one request at a time, so a single task owns the
//! [`ObdClient`] and every client request is queued to it over an mpsc
//! channel with a oneshot for the reply.

use crate::config::{LineKind, RelayConfig};
use anyhow::{Context, Result};
use obd_protocol::{Exchange, ObdClient, ObdError, ObdRequest, SessionError, Transport};
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Request queued to the line owner
pub struct LineRequest {
    pub request: ObdRequest,
    pub reply_tx: oneshot::Sender<Result<Exchange, ObdError>>,
}

/// Cloneable handle used by request handlers
#[derive(Clone)]
pub struct LineHandle {
    tx: mpsc::Sender<LineRequest>,
}

impl LineHandle {
    /// Queue a request and wait for the exchange.
    ///
    /// A full queue is reported as a busy session rather than waiting.
    pub async fn query(&self, request: ObdRequest) -> Result<Exchange, ObdError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .try_send(LineRequest { request, reply_tx })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ObdError::Session(SessionError::Busy),
                mpsc::error::TrySendError::Closed(_) => ObdError::Closed,
            })?;
        reply_rx.await.map_err(|_| ObdError::Closed)?
    }
}

/// Interpreter-style status text for a failed exchange
pub fn status_reply(err: &ObdError) -> &'static str {
    match err {
        ObdError::Timeout(_) => "NO DATA",
        ObdError::Closed => "UNABLE TO CONNECT",
        ObdError::Session(SessionError::Busy) => "BUS BUSY",
        ObdError::Session(_) => "ERROR",
        ObdError::Transport(_) => "CAN ERROR",
    }
}

/// Open the configured line and wrap it in a client
pub async fn open_line(config: &RelayConfig) -> Result<ObdClient> {
    let transport = match config.line.kind {
        LineKind::Serial => {
            info!(
                "Opening serial line {} at {} baud",
                config.line.device, config.line.baud_rate
            );
            Transport::serial(&config.line.device, config.line.baud_rate)
                .with_context(|| format!("Failed to open {}", config.line.device))?
        }
        LineKind::Udp => {
            info!("Connecting UDP line to {}", config.line.addr);
            let local = SocketAddr::from(([0, 0, 0, 0], 0));
            Transport::udp(local, config.line.addr)
                .await
                .with_context(|| format!("Failed to connect to {}", config.line.addr))?
        }
    };

    let mut client = ObdClient::new(transport, config.terminator);
    client.set_timeout(config.response_timeout());
    Ok(client)
}

/// Spawn the task that owns the line
pub fn spawn_line(client: ObdClient, queue_depth: usize) -> (LineHandle, JoinHandle<ObdClient>) {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    let task = tokio::spawn(line_task(client, rx));
    (LineHandle { tx }, task)
}

/// Serve queued requests until every handle is dropped, then give the
/// client back
async fn line_task(mut client: ObdClient, mut rx: mpsc::Receiver<LineRequest>) -> ObdClient {
    info!("Line task started");

    while let Some(LineRequest { request, reply_tx }) = rx.recv().await {
        let result = client.query(request).await;
        match &result {
            Ok(exchange) => debug!("{} -> {:?}", request, exchange.transcript),
            Err(ObdError::Timeout(ms)) => warn!("{} timed out after {}ms", request, ms),
            Err(e) => error!("{} failed: {}", request, e),
        }
        if reply_tx.send(result).is_err() {
            debug!("Requester for {} went away", request);
        }
    }

    info!("Line task stopped");
    client
}
