//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::packet::Packet`] to the client and server, and raw datagrams to
//! the simulator (which must forward corrupted bytes untouched).  All
//! protocol logic lives elsewhere; this module owns only byte I/O.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError, MAX_PACKET_LEN};

/// Receive buffer size.  Anything longer is not one of ours: it arrives
/// truncated and fails decoding.
pub const RECV_BUF_LEN: usize = MAX_PACKET_LEN * 2;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The received datagram could not be decoded as a valid packet.
    #[error("packet decode error: {0}")]
    Packet(#[from] PacketError),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, packet-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Encode `packet` and send it as a single UDP datagram to `dest`.
    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(&packet.encode(), dest).await?;
        Ok(())
    }

    /// Receive the next datagram and decode it into a [`Packet`].
    ///
    /// Returns `(packet, sender_address)`.  Datagrams that fail to decode are
    /// returned as [`SocketError::Packet`] — the caller decides whether to
    /// retry.
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let (bytes, addr) = self.recv_raw().await?;
        let packet = Packet::decode(&bytes)?;
        Ok((packet, addr))
    }

    /// Send raw bytes as one datagram.
    pub async fn send_raw(&self, datagram: &[u8], dest: SocketAddr) -> std::io::Result<()> {
        self.inner.send_to(datagram, dest).await?;
        Ok(())
    }

    /// Receive one datagram without decoding it.
    pub async fn recv_raw(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = [0u8; RECV_BUF_LEN];
        let (n, addr) = self.recv_raw_into(&mut buf).await?;
        Ok((buf[..n].to_vec(), addr))
    }

    /// Receive one datagram into a caller-owned buffer, returning its length.
    pub async fn recv_raw_into(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}

/// Returns true for errors a UDP endpoint can shrug off and keep reading,
/// such as ICMP-triggered refusals reported on the next receive.
pub fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}
