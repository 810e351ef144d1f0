//! Chain parameters the miner needs per network.

use core::fmt;

use serde::Deserialize;

/// Network the miner pays out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    /// Bech32 human-readable part for witness addresses.
    pub fn bech32_hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "bc",
            Network::Testnet | Network::Signet => "tb",
            Network::Regtest => "bcrt",
        }
    }

    /// Base58 version byte for P2PKH addresses.
    pub fn p2pkh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            _ => 0x6f,
        }
    }

    /// Base58 version byte for P2SH addresses.
    pub fn p2sh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            _ => 0xc4,
        }
    }

    /// Blocks between subsidy halvings.
    pub fn halving_interval(&self) -> u32 {
        match self {
            Network::Regtest => 150,
            _ => 210_000,
        }
    }

    /// Block subsidy in satoshis at `height`.
    ///
    /// Starts at 50 coins and halves every [`Network::halving_interval`] blocks.
    pub fn block_subsidy(&self, height: u32) -> u64 {
        let halvings = height / self.halving_interval();
        if halvings >= 64 {
            return 0;
        }
        INITIAL_SUBSIDY >> halvings
    }

    /// Network name as used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 50 coins in satoshis.
pub const INITIAL_SUBSIDY: u64 = 5_000_000_000;

/// Default header version (BIP9 versionbits top bits, no deployments signalled).
pub const BLOCK_VERSION: i32 = 0x20000000;

/// Size of a serialized block header.
pub const BLOCK_HEADER_SIZE: usize = 80;

/// Consensus bounds on the coinbase scriptSig length.
pub const MIN_COINBASE_SCRIPTSIG_SIZE: usize = 2;
pub const MAX_COINBASE_SCRIPTSIG_SIZE: usize = 100;
