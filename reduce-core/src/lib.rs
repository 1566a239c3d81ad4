//! Partitioned hash tables for reduce aggregation (C6, C7): local
//! pre-reduce with sink-on-flush, global post-reduce with spill-to-disk and
//! recursive re-reduction, and the dense `ReduceToIndex` variant.

mod codec;
mod error;
mod post_table;
mod pre_table;
mod reduce_to_index;
mod spill;

pub use codec::{Codec, StringU64Codec, UsizeU64Codec};
pub use error::Error;
pub use post_table::PostReduceTable;
pub use pre_table::PreReduceTable;
pub use reduce_to_index::ReduceToIndexTable;
