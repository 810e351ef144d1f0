//! Core block mining logic for blockminer.
//!
//! This crate provides pure Rust implementations of:
//! - Compact difficulty decoding and encoding with 256-bit targets
//! - Merkle roots and witness commitments
//! - Coinbase transaction building with BIP34 heights and extra nonces
//! - Reward address decoding (P2PKH, P2SH, P2WPKH, P2WSH, P2TR)
//! - Raw transaction parsing and block assembly
//! - Serial and parallel nonce search

pub mod address;
pub mod block;
pub mod coinbase;
pub mod difficulty;
pub mod hash;
pub mod merkle;
pub mod network;
pub mod script;
pub mod search;
pub mod template;
pub mod transaction;

pub use address::{AddressError, AddressKind, RewardAddress};
pub use block::{Block, BlockAssembler, BlockError, BlockHeader};
pub use coinbase::{CoinbaseBuilder, CoinbaseError, CoinbaseTransaction, ExtraNonceSource};
pub use difficulty::{format_difficulty, parse_bits_hex, DifficultyError, Target};
pub use hash::{double_sha256, hash_to_display_hex, Hash256};
pub use merkle::{compute_merkle_root, transactions_merkle_root, MerkleError};
pub use network::Network;
pub use search::{DoubleSha256, HashFault, HeaderHasher, NonceSearch, SearchOutcome};
pub use template::{BlockTemplate, TemplateTransaction};
pub use transaction::{Transaction, TransactionError};
