use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("group communication error: {0}")]
    Group(#[from] net_group::Error),

    #[error("golomb code divisor must be at least 1")]
    InvalidDivisor,

    #[error("golomb-coded bitstream ended mid-symbol")]
    TruncatedStream,
}
