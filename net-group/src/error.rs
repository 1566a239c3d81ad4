use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error")]
    Io(#[from] std::io::Error),

    #[error("transport error")]
    Transport(#[from] net_io::Error),

    #[error("connection refused by {0}")]
    ConnectRefused(SocketAddr),

    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("bad handshake: {0}")]
    BadHandshake(String),

    #[error("rank {rank} out of range for {num_hosts} hosts")]
    InvalidRank { rank: usize, num_hosts: usize },

    #[error("peer {0} connection is invalid")]
    PeerInvalid(usize),
}
