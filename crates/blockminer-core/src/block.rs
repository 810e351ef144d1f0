//! Bitcoin block header construction and serialization.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::hash::{double_sha256, hash_from_display_hex, Hash256};
use crate::network::{BLOCK_HEADER_SIZE, BLOCK_VERSION};
use crate::transaction::{encode_varint, Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("malformed previous block hash {0:?}")]
    MalformedHash(String),
}

/// A Bitcoin block header (80 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version with BIP9 versionbits.
    pub version: i32,
    /// Hash of the previous block (internal byte order).
    pub prev_block_hash: Hash256,
    /// Merkle root of all transactions.
    pub merkle_root: Hash256,
    /// Block timestamp (Unix time).
    pub timestamp: u32,
    /// Difficulty target in compact "bits" format.
    pub bits: u32,
    /// Nonce for proof of work.
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialize the block header to 80 bytes.
    pub fn serialize(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header[0..4].copy_from_slice(&self.version.to_le_bytes());
        header[4..36].copy_from_slice(&self.prev_block_hash);
        header[36..68].copy_from_slice(&self.merkle_root);
        header[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        header[72..76].copy_from_slice(&self.bits.to_le_bytes());
        header[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        header
    }

    /// Compute the block hash (double SHA256).
    pub fn hash(&self) -> Hash256 {
        double_sha256(&self.serialize())
    }
}

/// A header plus its ordered transactions, coinbase first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Serialize in network block format.
    pub fn serialize(&self) -> Vec<u8> {
        let body: usize = self.transactions.iter().map(Transaction::len).sum();
        let mut block = Vec::with_capacity(BLOCK_HEADER_SIZE + 9 + body);
        block.extend_from_slice(&self.header.serialize());
        encode_varint(self.transactions.len() as u64, &mut block);
        for tx in &self.transactions {
            block.extend_from_slice(tx.as_bytes());
        }
        block
    }

    /// Get the block as hex string for submission.
    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }
}

/// Builds blocks from the pieces of a template.
///
/// Version and timestamp come from the template when it has them; otherwise
/// the default version and the wall clock are used.
#[derive(Debug, Clone, Default)]
pub struct BlockAssembler {
    version: Option<i32>,
    timestamp: Option<u32>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Assemble a block.
    ///
    /// `prev_hash` is in display order (as RPC returns it) and must be
    /// exactly 64 hex characters.
    pub fn assemble(
        &self,
        prev_hash: &str,
        merkle_root: Hash256,
        bits: u32,
        nonce: u32,
        transactions: Vec<Transaction>,
    ) -> Result<Block, BlockError> {
        let prev_block_hash = hash_from_display_hex(prev_hash)
            .ok_or_else(|| BlockError::MalformedHash(prev_hash.to_string()))?;

        let header = BlockHeader {
            version: self.version.unwrap_or(BLOCK_VERSION),
            prev_block_hash,
            merkle_root,
            timestamp: self.timestamp.unwrap_or_else(current_timestamp),
            bits,
            nonce,
        };

        Ok(Block {
            header,
            transactions,
        })
    }
}

/// Get the current Unix timestamp.
fn current_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
