use std::net::SocketAddr;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{debug, trace};

use crate::error::Error;

/// State machine of one [`Connection`], mirroring the handshake phases in
/// the Group construction protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Invalid,
    Connecting,
    TransportConnected,
    HelloSent,
    HelloReceived,
    Connected,
}

impl ConnState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Knobs applied to a freshly accepted or connected socket.
#[derive(Debug, Clone, Copy)]
pub struct SocketOpts {
    pub nodelay: bool,
    pub reuseaddr: bool,
    pub send_buffer_size: Option<u32>,
    pub recv_buffer_size: Option<u32>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        Self {
            nodelay: true,
            reuseaddr: true,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

impl SocketOpts {
    /// Apply these options to a socket2 socket before it is handed off to
    /// tokio. Close-on-exec is requested explicitly for parity with the
    /// non-blocking-socket contract, even though tokio sockets are not
    /// inherited across `exec` by default on any platform we target.
    pub fn apply(&self, sock: &socket2::Socket) -> std::io::Result<()> {
        sock.set_nodelay(self.nodelay)?;
        sock.set_reuse_address(self.reuseaddr)?;
        if let Some(n) = self.send_buffer_size {
            sock.set_send_buffer_size(n as usize)?;
        }
        if let Some(n) = self.recv_buffer_size {
            sock.set_recv_buffer_size(n as usize)?;
        }
        sock.set_cloexec(true)?;
        sock.set_nonblocking(true)?;
        Ok(())
    }
}

/// One ordered, reliable, bidirectional byte pipe to one peer.
///
/// Owned exclusively by the [`crate::Group`] (or test harness) that created
/// it — never shared between the Dispatcher and a worker thread performing a
/// synchronous collective at the same time (see the concurrency model in the
/// specification, §5).
pub struct Connection {
    socket: TcpStream,
    peer_rank: usize,
    group_id: u64,
    state: ConnState,
    peer_addr: SocketAddr,
    last_error: Option<String>,
}

impl Connection {
    pub fn new(socket: TcpStream, peer_rank: usize, group_id: u64) -> Self {
        let peer_addr = socket
            .peer_addr()
            .unwrap_or_else(|_| "0.0.0.0:0".parse().unwrap());
        Self {
            socket,
            peer_rank,
            group_id,
            state: ConnState::TransportConnected,
            peer_addr,
            last_error: None,
        }
    }

    pub fn peer_rank(&self) -> usize {
        self.peer_rank
    }

    /// Fix up the peer's rank once it is learned from a handshake message,
    /// since the accepting side of a connection does not know it up front.
    pub fn set_peer_rank(&mut self, rank: usize) {
        self.peer_rank = rank;
    }

    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnState) {
        trace!(peer = self.peer_rank, ?state, "connection state transition");
        self.state = state;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn mark_invalid(&mut self, err: impl std::fmt::Display) {
        debug!(peer = self.peer_rank, %err, "connection invalidated");
        self.last_error = Some(err.to_string());
        self.state = ConnState::Invalid;
    }

    pub fn socket(&self) -> &TcpStream {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut TcpStream {
        &mut self.socket
    }

    /// Send exactly `buf.len()` bytes, looping over partial writes.
    pub async fn send(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.socket.write_all(buf).await?;
        Ok(())
    }

    /// Receive exactly `buf.len()` bytes. A 0-byte read before any data has
    /// been delivered is treated identically to a mid-message EOF: both
    /// surface as [`Error::PeerClosed`].
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        match self.socket.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::PeerClosed),
            Err(e) => Err(e.into()),
        }
    }

    /// Send `out`, then receive `want_len` bytes. The side with the lower
    /// rank always calls this variant in a hypercube-style exchange; the
    /// higher-ranked peer calls [`Connection::receive_send`] so neither side
    /// blocks writing into a full socket buffer while the other blocks
    /// reading.
    pub async fn send_receive(&mut self, out: &[u8], want_len: usize) -> Result<Vec<u8>, Error> {
        self.send(out).await?;
        let mut buf = vec![0u8; want_len];
        self.recv(&mut buf).await?;
        Ok(buf)
    }

    /// Receive `want_len` bytes, then send `out`. Dual of
    /// [`Connection::send_receive`].
    pub async fn receive_send(&mut self, want_len: usize, out: &[u8]) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; want_len];
        self.recv(&mut buf).await?;
        self.send(out).await?;
        Ok(buf)
    }
}
