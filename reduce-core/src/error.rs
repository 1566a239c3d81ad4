use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("block pool error: {0}")]
    Pool(#[from] block_data::Error),

    #[error("spill recursion exceeded {0} levels without converging; partition has too many distinct keys to fit in memory even after halving")]
    RecursionLimit(u32),
}
