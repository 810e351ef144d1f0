//! Error types for the miner application.

use std::path::PathBuf;

use blockminer_core::{
    BlockError, CoinbaseError, DifficultyError, MerkleError, TransactionError,
};
use thiserror::Error;

/// Failures talking to the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("cannot read certificate {path}: {source}")]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid certificate {path}: {reason}")]
    InvalidCertificate { path: PathBuf, reason: String },
    #[error("node rejected credentials (HTTP {0})")]
    Auth(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response from node: {0}")]
    Protocol(String),
}

impl NodeError {
    /// Whether the connection itself is unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NodeError::Rpc { .. } | NodeError::Protocol(_))
    }
}

/// Problems with the configuration file or its values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything the mining loop can run into.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot connect to node: {0}")]
    Connect(#[source] NodeError),
    #[error("template fetch failed: {0}")]
    Fetch(#[source] NodeError),
    #[error("block submission failed: {0}")]
    Submit(#[source] NodeError),
    #[error("malformed difficulty: {0}")]
    Difficulty(#[from] DifficultyError),
    #[error("malformed template transaction: {0}")]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Coinbase(#[from] CoinbaseError),
    #[error("malformed witness commitment {0:?}")]
    WitnessCommitment(String),
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl MinerError {
    /// Fatal errors stop the process; the rest abandon one cycle.
    pub fn is_fatal(&self) -> bool {
        match self {
            MinerError::Config(_) | MinerError::ThreadPool(_) | MinerError::Connect(_) => true,
            MinerError::Fetch(err) => err.is_fatal(),
            // The block is lost either way; the next fetch finds out whether
            // the node is still reachable.
            MinerError::Submit(_) => false,
            // The reward address and message are static configuration.
            MinerError::Coinbase(_) => true,
            MinerError::Difficulty(_)
            | MinerError::Transaction(_)
            | MinerError::Merkle(_)
            | MinerError::Block(_)
            | MinerError::WitnessCommitment(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MinerError>;
