//! UDP front end, one interpreter state per peer

use crate::elm::ElmState;
use crate::simulator::Simulator;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

const MAX_DATAGRAM_LEN: usize = 512;

pub struct SimulatorServer {
    socket: UdpSocket,
    simulator: Simulator,
    peers: HashMap<SocketAddr, ElmState>,
    echo: bool,
}

impl SimulatorServer {
    pub async fn bind(addr: SocketAddr, simulator: Simulator, echo: bool) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Simulator listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            simulator,
            peers: HashMap::new(),
            echo,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answer requests until the socket fails
    pub async fn serve(mut self) -> std::io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        loop {
            let (n, peer) = self.socket.recv_from(&mut buf).await?;
            let request = String::from_utf8_lossy(&buf[..n]);
            let echo = self.echo;
            let state = self.peers.entry(peer).or_insert_with(|| {
                info!("New peer {}", peer);
                ElmState::new(echo)
            });

            let reply = self.simulator.respond(state, &request);
            debug!("{} {:?} -> {:?}", peer, request.trim(), reply);
            if let Err(e) = self.socket.send_to(reply.as_bytes(), peer).await {
                warn!("Failed to reply to {}: {}", peer, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::VehicleModel;
    use obd_protocol::{
        AtCommand, EngineParameter, ObdClient, ObdProtocol, ObdRequest, Pid, SessionEvent,
        Terminator, Transport,
    };

    async fn start() -> SocketAddr {
        let vehicle = VehicleModel::new(
            12.6,
            "1D4GP00R55B123456",
            "ECM-EngineControl",
            "P0133".parse().ok(),
            ObdProtocol::Iso15765_4Can11bit500,
        );
        let server = SimulatorServer::bind(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            Simulator::new(vehicle),
            true,
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());
        addr
    }

    async fn client(addr: SocketAddr) -> ObdClient {
        let transport = Transport::udp(SocketAddr::from(([127, 0, 0, 1], 0)), addr)
            .await
            .unwrap();
        let mut client = ObdClient::new(transport, Terminator::Cr);
        client.assume_ready();
        client
    }

    #[tokio::test]
    async fn test_client_initializes_against_simulator() {
        let addr = start().await;
        let mut client = client(addr).await;

        let info = client.initialize(ObdProtocol::Auto).await.unwrap();
        assert_eq!(info.interface_name, "ELM327 v1.5");
        assert_eq!(info.battery_voltage, Some(12.6));
    }

    #[tokio::test]
    async fn test_client_reads_parameters() {
        let addr = start().await;
        let mut client = client(addr).await;

        let exchange = client.query(ObdRequest::CurrentData(Pid::MonitorStatus)).await.unwrap();
        assert_eq!(
            exchange.parameters().copied().collect::<Vec<_>>(),
            vec![EngineParameter::MilStatus { on: true, dtc_count: 1 }]
        );

        let exchange = client.query(ObdRequest::StoredDtcs).await.unwrap();
        assert!(exchange
            .events
            .iter()
            .any(|e| matches!(e, SessionEvent::Dtc(code) if code.to_string() == "P0133")));
    }

    #[tokio::test]
    async fn test_peers_keep_separate_settings() {
        let addr = start().await;
        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 128];

        first
            .send_to(ObdRequest::At(AtCommand::Echo(false)).text().as_bytes(), addr)
            .await
            .unwrap();
        first.recv_from(&mut buf).await.unwrap();

        first.send_to(b"ATI", addr).await.unwrap();
        let (n, _) = first.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ELM327 v1.5\r\r>");

        second.send_to(b"ATI", addr).await.unwrap();
        let (n, _) = second.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ATI\rELM327 v1.5\r\r>");
    }
}
