//! Configuration management for blockminer

use std::fs;
use std::path::{Path, PathBuf};

use blockminer_core::{CoinbaseBuilder, ExtraNonceSource, Network, RewardAddress};
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// JSON-RPC endpoint, e.g. `http://127.0.0.1:8332`.
    pub url: String,
    pub user: String,
    pub password: String,
    /// PEM certificate trusted as a root for HTTPS endpoints.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    /// Request timeout; absent means wait indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_template_rules")]
    pub template_rules: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default)]
    pub network: Network,
    pub reward_address: String,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_nonces_per_template")]
    pub nonces_per_template: u64,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Pay the template's coinbase value (subsidy plus fees).
    #[serde(default)]
    pub collect_fees: bool,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_template_rules() -> Vec<String> {
    vec!["segwit".to_string()]
}

fn default_message() -> String {
    "blockminer".to_string()
}

fn default_nonces_per_template() -> u64 {
    10_000_000
}

fn default_threads() -> usize {
    1
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Config {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse without validating, so callers can apply overrides first.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    /// Check the values that cannot change while mining.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.url.is_empty() {
            return Err(ConfigError::Invalid("node.url must be set".into()));
        }
        self.miner.validate()
    }
}

impl MinerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reward_address.is_empty() {
            return Err(ConfigError::Invalid("miner.reward_address must be set".into()));
        }
        if self.nonces_per_template == 0 {
            return Err(ConfigError::Invalid(
                "miner.nonces_per_template must be greater than zero".into(),
            ));
        }
        if self.threads == 0 {
            return Err(ConfigError::Invalid("miner.threads must be greater than zero".into()));
        }

        RewardAddress::parse(&self.reward_address, self.network).map_err(|e| {
            ConfigError::Invalid(format!(
                "miner.reward_address is not a {} address: {}",
                self.network, e
            ))
        })?;

        // Largest height and extra nonce give the longest script, so a
        // message that fits here fits in every block.
        CoinbaseBuilder::new(self.network)
            .build(u32::MAX, &self.reward_address, &self.message, &mut WidestNonce)
            .map_err(|e| ConfigError::Invalid(format!("miner.message does not fit: {}", e)))?;

        Ok(())
    }
}

struct WidestNonce;

impl ExtraNonceSource for WidestNonce {
    fn next_extra_nonce(&mut self) -> u64 {
        u64::MAX
    }
}
