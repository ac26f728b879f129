use std::io::ErrorKind;
use std::net::SocketAddr;

use log::{debug, warn};
use serde::Serialize;
use tokio::net::UdpSocket;

use super::{codec, NetworkError};
use crate::raft::RaftMessage;

const MAX_DATAGRAM: usize = 64 * 1024;

/// Delivery counters for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub sent: u64,
    pub send_failures: u64,
    pub received: u64,
    pub dropped: u64,
}

/// Connectionless endpoint owned by a single node.
///
/// Sends never block and never fail the caller: an undeliverable message is
/// counted and forgotten. Undecodable datagrams are dropped on receipt.
pub struct Transport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buf: Vec<u8>,
    stats: TransportStats,
}

impl Transport {
    pub async fn bind(addr: SocketAddr) -> Result<Self, NetworkError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| NetworkError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| NetworkError::Bind { addr, source })?;

        Ok(Self {
            socket,
            local_addr,
            buf: vec![0u8; MAX_DATAGRAM],
            stats: TransportStats::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Fire-and-forget send. Returns whether the datagram left the socket.
    pub fn send(&mut self, to: SocketAddr, message: &RaftMessage) -> bool {
        match self.try_send(to, message) {
            Ok(()) => {
                self.stats.sent += 1;
                true
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("Failed to send {} to {to}: {e}", message.kind());
                false
            }
        }
    }

    fn try_send(&self, to: SocketAddr, message: &RaftMessage) -> Result<(), NetworkError> {
        let payload = codec::encode(message)?;
        self.socket
            .try_send_to(&payload, to)
            .map_err(|source| NetworkError::Send { addr: to, source })?;
        Ok(())
    }

    /// Returns one decoded message if a datagram is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<(SocketAddr, RaftMessage)> {
        loop {
            match self.socket.try_recv_from(&mut self.buf) {
                Ok((len, from)) => {
                    if let Some(message) = self.decode_datagram(len, from) {
                        return Some((from, message));
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) => {
                    warn!("Receive error on {}: {e}", self.local_addr);
                    return None;
                }
            }
        }
    }

    /// Waits for the next decodable datagram. Cancel safe.
    pub async fn recv(&mut self) -> Result<(SocketAddr, RaftMessage), NetworkError> {
        loop {
            let (len, from) = self.socket.recv_from(&mut self.buf).await?;
            if let Some(message) = self.decode_datagram(len, from) {
                return Ok((from, message));
            }
        }
    }

    fn decode_datagram(&mut self, len: usize, from: SocketAddr) -> Option<RaftMessage> {
        match codec::decode(&self.buf[..len]) {
            Ok(message) => {
                self.stats.received += 1;
                Some(message)
            }
            Err(e) => {
                self.stats.dropped += 1;
                debug!("Dropping datagram from {from}: {e}");
                None
            }
        }
    }
}
