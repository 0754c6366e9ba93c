use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain has no blocks")]
    EmptyChain,

    #[error("block index {index} out of range (chain length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("a mining operation is already in flight")]
    MiningInProgress,
}

pub type Result<T> = std::result::Result<T, ChainError>;
