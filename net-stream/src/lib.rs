//! Multiplexed many-to-many byte streams over a [`net_group::Group`] (C5):
//! demultiplexing inbound blocks into per-worker queues, the loopback fast
//! path, and scatter.

mod error;
mod header;
mod multiplexer;
mod queue;
mod scatter;
mod stream;

pub use error::Error;
pub use header::StreamHeader;
pub use multiplexer::Multiplexer;
pub use queue::{InboundQueue, StreamBlock};
pub use scatter::scatter;
pub use stream::{Reader, Writer};
