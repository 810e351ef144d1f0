//! Solo miner that works against a full node's `getblocktemplate`.
//!
//! The binary wires these pieces together: [`config`] loads the TOML file,
//! [`rpc`] talks to the node, and [`miner`] runs the fetch, assemble, search
//! and submit loop on top of `blockminer-core`.

pub mod config;
pub mod error;
pub mod miner;
pub mod rpc;
pub mod state;

pub use config::{Config, MinerConfig, NodeConfig};
pub use error::{ConfigError, MinerError, NodeError};
pub use miner::{CycleOutcome, MinerState, MiningLoop};
pub use rpc::{NodeClient, RpcClient, SubmitOutcome};
pub use state::MiningStats;
