#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("block_size must be greater than zero")]
    ZeroBlockSize,

    #[error("block of {len} bytes exceeds block_size {block_size}")]
    BlockTooLarge { len: usize, block_size: usize },
}
