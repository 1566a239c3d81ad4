use std::io;

/// Errors raised by a single [`crate::Connection`].
///
/// Every syscall that would return `EINTR`/`EAGAIN` is absorbed by tokio's
/// readiness-driven retry loop before it ever reaches this type — what's left
/// are genuinely fatal conditions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error")]
    Transport(#[from] io::Error),

    #[error("peer closed the connection")]
    PeerClosed,
}

impl Error {
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::PeerClosed)
    }
}
