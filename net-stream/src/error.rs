#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error")]
    Transport(#[from] net_group::Error),

    #[error("block pool error")]
    Pool(#[from] block_data::Error),

    #[error("bad stream header: {0}")]
    BadHeader(String),
}
