#![cfg_attr(feature = "nightly", feature(try_trait_v2))]

mod spawn;
pub use spawn::{Cancelled, JoinError, Spawner, Stats, Task};

mod time;
pub use time::{interval, sleep, timeout, Elapsed};

pub mod incoming;
pub use incoming::{TcpListenerExt, UnixListenerExt};

pub mod tasks;
