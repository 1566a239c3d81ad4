//! Distributed location detection (C8): decides, for every key seen on two
//! or more input DIAs, which worker holds the most occurrences of it — the
//! "assembly point" a subsequent shuffle routes that key to. Keys and
//! counts move between workers as golomb-coded hash sketches rather than
//! full records, per `# 4.8`.

mod detect;
mod error;
mod golomb;
mod record;

pub use detect::{LocationDetection, LocationMap, DEFAULT_B};
pub use error::Error;
pub use record::{Occurrence, WinnerPair};
