//! Per-client session tracking
//!
//! Every dashboard client gets its own [`ProtocolSession`] fed with exactly
//! the bytes the relay sends it, so interface details and parameter values
//! are tracked per client.

use obd_protocol::{
    EngineParameterSet, InterfaceInfo, ObdRequest, ProtocolSession, SessionEvent, SessionState,
    Terminator,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

struct ClientEntry {
    session: ProtocolSession,
    last_seen: Instant,
    requests: u64,
}

/// Sessions of all known clients, keyed by source address
pub struct ClientRegistry {
    clients: HashMap<SocketAddr, ClientEntry>,
    terminator: Terminator,
    idle_timeout: Duration,
}

impl ClientRegistry {
    pub fn new(terminator: Terminator, idle_timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            terminator,
            idle_timeout,
        }
    }

    /// Record a request from `addr`, creating its session on first contact
    pub fn track_request(&mut self, addr: SocketAddr, request: ObdRequest) {
        let terminator = self.terminator;
        let entry = self.clients.entry(addr).or_insert_with(|| {
            info!("New client {}", addr);
            let mut session = ProtocolSession::new(terminator);
            session.assume_ready();
            ClientEntry {
                session,
                last_seen: Instant::now(),
                requests: 0,
            }
        });

        entry.last_seen = Instant::now();
        entry.requests += 1;
        if entry.session.state() != SessionState::Idle {
            // Previous reply never completed
            entry.session.reset();
            entry.session.assume_ready();
        }
        if let Err(e) = entry.session.send(request) {
            debug!("Client {} session rejected {}: {}", addr, request, e);
        }
    }

    /// Feed bytes sent to `addr` into its session
    pub fn record_reply(&mut self, addr: SocketAddr, bytes: &[u8]) -> Vec<SessionEvent> {
        let Some(entry) = self.clients.get_mut(&addr) else {
            return Vec::new();
        };
        let events = entry.session.receive(bytes);
        for event in &events {
            match event {
                SessionEvent::Parameter(p) => debug!("{} <- {}", addr, p),
                SessionEvent::Dtc(code) => info!("{} <- trouble code {}", addr, code),
                SessionEvent::Interface(update) => debug!("{} <- {:?}", addr, update),
                SessionEvent::VehicleInfo(info) => debug!("{} <- {:?}", addr, info),
                SessionEvent::Ready | SessionEvent::Error(_) => {}
            }
        }
        events
    }

    /// Drop clients that have been silent longer than the idle timeout,
    /// returning their addresses
    pub fn evict_idle(&mut self) -> Vec<SocketAddr> {
        let idle_timeout = self.idle_timeout;
        let mut evicted = Vec::new();
        self.clients.retain(|addr, entry| {
            let keep = entry.last_seen.elapsed() < idle_timeout;
            if !keep {
                info!(
                    "Evicting idle client {} after {} requests",
                    addr, entry.requests
                );
                evicted.push(*addr);
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.clients.contains_key(addr)
    }

    pub fn interface(&self, addr: &SocketAddr) -> Option<&InterfaceInfo> {
        self.clients.get(addr).map(|e| e.session.interface())
    }

    pub fn parameters(&self, addr: &SocketAddr) -> Option<&EngineParameterSet> {
        self.clients.get(addr).map(|e| e.session.parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{AtCommand, EngineParameter, Pid};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut registry = ClientRegistry::new(Terminator::Cr, Duration::from_secs(60));
        registry.track_request(addr(1), ObdRequest::CurrentData(Pid::Rpm));
        registry.track_request(addr(2), ObdRequest::At(AtCommand::ReadVoltage));

        let events = registry.record_reply(addr(1), b"41 0C 1A F8\r");
        assert_eq!(events, vec![SessionEvent::Parameter(EngineParameter::EngineRpm(1726.0))]);
        registry.record_reply(addr(1), b">");
        registry.record_reply(addr(2), b"12.5V\r>");

        assert_eq!(registry.parameters(&addr(1)).unwrap().engine_rpm, Some(1726.0));
        assert_eq!(registry.parameters(&addr(2)).unwrap().engine_rpm, None);
        assert_eq!(registry.interface(&addr(2)).unwrap().battery_voltage, Some(12.5));
        assert_eq!(registry.interface(&addr(1)).unwrap().battery_voltage, None);
    }

    #[test]
    fn test_unknown_client_reply_ignored() {
        let mut registry = ClientRegistry::new(Terminator::Cr, Duration::from_secs(60));
        assert!(registry.record_reply(addr(9), b"41 0D 32\r>").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unfinished_reply_does_not_block_next_request() {
        let mut registry = ClientRegistry::new(Terminator::Cr, Duration::from_secs(60));
        registry.track_request(addr(1), ObdRequest::CurrentData(Pid::Rpm));
        registry.track_request(addr(1), ObdRequest::CurrentData(Pid::Speed));

        let events = registry.record_reply(addr(1), b"41 0D 32\r>");
        assert!(events.contains(&SessionEvent::Parameter(EngineParameter::VehicleSpeed(50.0))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_eviction() {
        let mut registry = ClientRegistry::new(Terminator::Cr, Duration::from_secs(300));
        registry.track_request(addr(1), ObdRequest::StoredDtcs);
        tokio::time::advance(Duration::from_secs(200)).await;
        registry.track_request(addr(2), ObdRequest::StoredDtcs);
        tokio::time::advance(Duration::from_secs(150)).await;

        assert_eq!(registry.evict_idle(), vec![addr(1)]);
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(&addr(1)));
        assert!(registry.interface(&addr(2)).is_some());
    }
}
