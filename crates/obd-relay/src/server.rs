//! UDP front end
//!
//! Each datagram from a dashboard client is one request. Replies go back as
//! one datagram per message followed by a `>` prompt datagram. Requests from
//! one client are answered strictly in order.

use crate::clients::ClientRegistry;
use crate::line::{status_reply, LineHandle};
use obd_protocol::{
    Exchange, InterpreterStatus, ObdError, ObdRequest, SessionError, Terminator, READY_PROMPT,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

const MAX_DATAGRAM_LEN: usize = 512;

/// Datagrams answering one request, prompt last
pub fn reply_datagrams(result: &Result<Exchange, ObdError>, terminator: Terminator) -> Vec<String> {
    let le = terminator.as_str();
    let mut datagrams = Vec::new();

    match result {
        Ok(exchange) => {
            for message in &exchange.transcript {
                match InterpreterStatus::detect(message) {
                    Some(InterpreterStatus::NoData) | None => {
                        datagrams.push(format!("{}{}", message, le));
                    }
                    Some(status) => warn!("Dropping interpreter reply {}", status),
                }
            }
        }
        Err(e) => datagrams.push(format!("{}{}", status_reply(e), le)),
    }

    datagrams.push((READY_PROMPT as char).to_string());
    datagrams
}

/// Requests a client may have queued behind its in-flight one
const CLIENT_QUEUE_DEPTH: usize = 8;

pub struct RelayServer {
    handler: DatagramHandler,
    /// One worker per client keeps its requests in arrival order
    workers: HashMap<SocketAddr, mpsc::Sender<String>>,
}

impl RelayServer {
    pub async fn bind(
        addr: SocketAddr,
        line: LineHandle,
        terminator: Terminator,
        client_idle: Duration,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Relay listening on {}", socket.local_addr()?);
        Ok(Self {
            handler: DatagramHandler {
                socket: Arc::new(socket),
                line,
                clients: Arc::new(Mutex::new(ClientRegistry::new(terminator, client_idle))),
                terminator,
            },
            workers: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.handler.socket.local_addr()
    }

    /// Receive requests forever, queueing each to its client's worker
    pub async fn serve(mut self) -> std::io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let mut eviction = tokio::time::interval(Duration::from_secs(30));

        loop {
            tokio::select! {
                received = self.handler.socket.recv_from(&mut buf) => {
                    let (n, peer) = received?;
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    self.dispatch(peer, text);
                }
                _ = eviction.tick() => {
                    let evicted = self.handler.clients.lock().await.evict_idle();
                    if !evicted.is_empty() {
                        debug!("Evicted {} idle clients", evicted.len());
                    }
                    self.workers
                        .retain(|addr, tx| !tx.is_closed() && !evicted.contains(addr));
                }
            }
        }
    }

    fn dispatch(&mut self, peer: SocketAddr, text: String) {
        let tx = self
            .workers
            .entry(peer)
            .or_insert_with(|| spawn_worker(self.handler.clone(), peer));

        match tx.try_send(text) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Client {} has too many requests queued", peer);
                let busy = reply_datagrams(
                    &Err(ObdError::Session(SessionError::Busy)),
                    self.handler.terminator,
                );
                let socket = self.handler.socket.clone();
                tokio::spawn(async move { send_all(&socket, peer, &busy).await });
            }
            Err(mpsc::error::TrySendError::Closed(text)) => {
                let tx = spawn_worker(self.handler.clone(), peer);
                if tx.try_send(text).is_err() {
                    error!("Client {} worker refused request", peer);
                }
                self.workers.insert(peer, tx);
            }
        }
    }
}

fn spawn_worker(handler: DatagramHandler, peer: SocketAddr) -> mpsc::Sender<String> {
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            handler.handle(peer, text).await;
        }
        debug!("Worker for {} stopped", peer);
    });
    tx
}

#[derive(Clone)]
struct DatagramHandler {
    socket: Arc<UdpSocket>,
    line: LineHandle,
    clients: Arc<Mutex<ClientRegistry>>,
    terminator: Terminator,
}

impl DatagramHandler {
    /// Query the line and send the whole reply before returning
    async fn handle(&self, peer: SocketAddr, text: String) {
        let request = match ObdRequest::parse(&text) {
            Ok(request) => request,
            Err(e) => {
                debug!("Invalid request {:?} from {}: {}", text.trim(), peer, e);
                let le = self.terminator.as_str();
                let reply = [format!("?{}", le), (READY_PROMPT as char).to_string()];
                send_all(&self.socket, peer, &reply).await;
                return;
            }
        };

        debug!("{} -> {}", peer, request);
        self.clients.lock().await.track_request(peer, request);

        let result = self.line.query(request).await;
        let datagrams = reply_datagrams(&result, self.terminator);

        {
            let mut registry = self.clients.lock().await;
            for datagram in &datagrams {
                registry.record_reply(peer, datagram.as_bytes());
            }
        }

        send_all(&self.socket, peer, &datagrams).await;
    }
}

async fn send_all(socket: &UdpSocket, peer: SocketAddr, datagrams: &[String]) {
    for datagram in datagrams {
        if let Err(e) = socket.send_to(datagram.as_bytes(), peer).await {
            error!("Failed to reply to {}: {}", peer, e);
            return;
        }
    }
}
