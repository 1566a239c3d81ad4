//! Non-blocking peer connections (C1) and the async I/O dispatcher (C2).

mod connection;
mod dispatcher;
mod error;

pub use connection::{ConnState, Connection, SocketOpts};
pub use dispatcher::{ConnId, Dispatcher};
pub use error::Error;
