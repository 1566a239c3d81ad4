//! Rank-addressed peer connections (C3): group construction over TCP with a
//! three-phase handshake, and the MPI-style collectives built on top of it.

mod collective;
mod error;
mod group;
mod handshake;
mod wire;

pub use collective::{
    all_gather_bruck, all_gather_recursive_doubling, all_reduce, all_reduce_elimination,
    all_reduce_hypercube, all_reduce_then_broadcast, broadcast, prefix_sum_exclusive,
    prefix_sum_hypercube, prefix_sum_inclusive, reduce, scatter_ranges,
};
pub use error::Error;
pub use group::Group;
pub use handshake::WelcomeMsg;
pub use wire::Wire;
