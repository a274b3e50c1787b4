//! Interpreter Transports
//!
//! The byte channel an [`ObdClient`](crate::ObdClient) talks through: a
//! serial port (or any async stream) or a connected UDP socket.

use crate::error::ObdError;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

/// Any duplex async byte stream
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// Byte channel to an interpreter
pub enum Transport {
    Stream(Box<dyn ByteStream>),
    Udp(UdpSocket),
}

impl Transport {
    /// Open a serial port (e.g. "/dev/ttyUSB0" or "COM3")
    pub fn serial(device: &str, baud_rate: u32) -> Result<Self, ObdError> {
        info!("Opening serial port {} at {} baud", device, baud_rate);
        let port = tokio_serial::new(device, baud_rate).open_native_async()?;
        Ok(Transport::Stream(Box::new(port)))
    }

    /// Bind `local` and connect to `peer`
    pub async fn udp(local: SocketAddr, peer: SocketAddr) -> Result<Self, ObdError> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        info!("UDP transport {} -> {}", socket.local_addr()?, peer);
        Ok(Transport::Udp(socket))
    }

    /// Wrap an already open stream
    pub fn stream<T: ByteStream + 'static>(io: T) -> Self {
        Transport::Stream(Box::new(io))
    }

    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        debug!("TX {:?}", String::from_utf8_lossy(bytes));
        match self {
            Transport::Stream(io) => {
                io.write_all(bytes).await?;
                io.flush().await?;
            }
            Transport::Udp(socket) => {
                socket.send(bytes).await?;
            }
        }
        Ok(())
    }

    /// Read available bytes into `buf`; `Ok(0)` means a stream was closed
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ObdError> {
        let n = match self {
            Transport::Stream(io) => io.read(buf).await?,
            Transport::Udp(socket) => socket.recv(buf).await?,
        };
        debug!("RX {:?}", String::from_utf8_lossy(&buf[..n]));
        Ok(n)
    }

    pub fn is_datagram(&self) -> bool {
        matches!(self, Transport::Udp(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_round_trip() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut transport = Transport::stream(a);

        transport.send(b"01 0C\r").await.unwrap();
        let mut buf = [0u8; 16];
        let n = b.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"01 0C\r");

        b.write_all(b"41 0C 1A F8\r>").await.unwrap();
        let n = transport.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"41 0C 1A F8\r>");
    }

    #[tokio::test]
    async fn test_stream_closed() {
        let (a, b) = tokio::io::duplex(64);
        let mut transport = Transport::stream(a);
        drop(b);
        let mut buf = [0u8; 16];
        assert_eq!(transport.recv(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_udp_round_trip() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();
        let mut transport = Transport::udp("127.0.0.1:0".parse().unwrap(), peer_addr)
            .await
            .unwrap();
        assert!(transport.is_datagram());

        transport.send(b"ATRV\r").await.unwrap();
        let mut buf = [0u8; 32];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ATRV\r");

        peer.send_to(b"12.5V\r\r>", from).await.unwrap();
        let n = transport.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"12.5V\r\r>");
    }
}
