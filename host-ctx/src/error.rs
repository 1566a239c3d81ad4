#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("environment variable {name}={value:?} is invalid: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("malformed hostlist entry {0:?}: missing port")]
    MissingPort(String),

    #[error("malformed hostlist entry {0:?}: {1}")]
    BadHostEntry(String, String),

    #[error("rank {rank} out of range for {num_hosts} hosts")]
    RankOutOfRange { rank: usize, num_hosts: usize },

    #[error("block_size {0} must be a power of two and at least 1024 bytes")]
    InvalidBlockSize(usize),

    #[error("group bootstrap failed: {0}")]
    Group(#[from] net_group::Error),

    #[error("block pool error: {0}")]
    Pool(#[from] block_data::Error),

    #[error("stream error: {0}")]
    Stream(#[from] net_stream::Error),

    #[error("user-provided operator panicked: {0}")]
    UserOperator(String),
}
