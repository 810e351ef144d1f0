//! Raw transactions as the miner handles them.
//!
//! A [`Transaction`] keeps the bytes exactly as they go on the wire, with the
//! txid and wtxid computed once when the bytes are decoded. Decoding goes
//! through `bitcoin::consensus`; the miner never needs the structured form
//! afterwards, only the bytes and the hashes.

use bitcoin::consensus::encode::deserialize_partial;
use bitcoin::hashes::Hash;
use thiserror::Error;

use crate::hash::{double_sha256, hash_to_display_hex, Hash256};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction is not valid hex")]
    InvalidHex,
    #[error("transaction does not decode: {0}")]
    Decode(String),
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),
    #[error("txid mismatch: computed {computed}, node reported {reported}")]
    TxidMismatch { computed: String, reported: String },
}

/// A transaction carrying its wire bytes and precomputed hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    raw: Vec<u8>,
    txid: Hash256,
    wtxid: Hash256,
}

impl Transaction {
    /// Decode wire bytes, legacy or segwit.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, TransactionError> {
        let (tx, consumed) = deserialize_partial::<bitcoin::Transaction>(&raw)
            .map_err(|e| TransactionError::Decode(e.to_string()))?;
        if consumed != raw.len() {
            return Err(TransactionError::TrailingBytes(raw.len() - consumed));
        }
        Ok(Transaction {
            txid: tx.compute_txid().to_byte_array(),
            wtxid: tx.compute_wtxid().to_byte_array(),
            raw,
        })
    }

    /// Parse a hex-encoded transaction as delivered in a block template.
    pub fn from_hex(data: &str) -> Result<Self, TransactionError> {
        let raw = hex::decode(data).map_err(|_| TransactionError::InvalidHex)?;
        Self::from_bytes(raw)
    }

    /// Build from bytes this crate serialized itself, where the txid was
    /// hashed from the stripped form during construction.
    pub(crate) fn from_parts(raw: Vec<u8>, txid: Hash256) -> Self {
        let wtxid = double_sha256(&raw);
        Transaction { raw, txid, wtxid }
    }

    /// Compare against a txid reported by the node in display order.
    pub fn check_txid(&self, reported: &str) -> Result<(), TransactionError> {
        let computed = hash_to_display_hex(&self.txid);
        if computed.eq_ignore_ascii_case(reported) {
            Ok(())
        } else {
            Err(TransactionError::TxidMismatch {
                computed,
                reported: reported.to_string(),
            })
        }
    }

    pub fn txid(&self) -> &Hash256 {
        &self.txid
    }

    /// Hash of the full wire bytes, witness included.
    ///
    /// Equal to the txid for transactions without witness data.
    pub fn wtxid(&self) -> &Hash256 {
        &self.wtxid
    }

    /// Wire bytes, including witness data if any.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Append a CompactSize length prefix.
pub fn encode_varint(value: u64, output: &mut Vec<u8>) {
    if value < 0xfd {
        output.push(value as u8);
    } else if value <= 0xffff {
        output.push(0xfd);
        output.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        output.push(0xfe);
        output.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        output.push(0xff);
        output.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// The genesis coinbase, a legacy transaction with a well-known txid.
    pub(crate) const GENESIS_COINBASE_HEX: &str = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";
    pub(crate) const GENESIS_COINBASE_TXID: &str =
        "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn test_legacy_txid() {
        let tx = Transaction::from_hex(GENESIS_COINBASE_HEX).unwrap();
        assert_eq!(hash_to_display_hex(tx.txid()), GENESIS_COINBASE_TXID);
        assert!(tx.check_txid(GENESIS_COINBASE_TXID).is_ok());
        assert_eq!(tx.len(), GENESIS_COINBASE_HEX.len() / 2);
    }

    #[test]
    fn test_segwit_txid_ignores_witness() {
        let legacy = hex::decode(GENESIS_COINBASE_HEX).unwrap();

        // Same transaction with a marker, flag and a one-item witness spliced in.
        let mut segwit = Vec::new();
        segwit.extend_from_slice(&legacy[..4]);
        segwit.extend_from_slice(&[0x00, 0x01]);
        segwit.extend_from_slice(&legacy[4..legacy.len() - 4]);
        segwit.extend_from_slice(&[0x01, 0x20]);
        segwit.extend_from_slice(&[0u8; 32]);
        segwit.extend_from_slice(&legacy[legacy.len() - 4..]);

        let tx = Transaction::from_bytes(segwit.clone()).unwrap();
        assert_eq!(hash_to_display_hex(tx.txid()), GENESIS_COINBASE_TXID);
        assert_eq!(tx.as_bytes(), segwit.as_slice());
        assert_ne!(tx.wtxid(), tx.txid());
        assert_eq!(*tx.wtxid(), double_sha256(&segwit));
    }

    #[test]
    fn test_legacy_wtxid_equals_txid() {
        let tx = Transaction::from_hex(GENESIS_COINBASE_HEX).unwrap();
        assert_eq!(tx.wtxid(), tx.txid());
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(Transaction::from_hex("zz"), Err(TransactionError::InvalidHex));
        assert!(matches!(
            Transaction::from_hex("01000000"),
            Err(TransactionError::Decode(_))
        ));

        // Segwit marker and flag with every witness stack empty.
        let legacy = hex::decode(GENESIS_COINBASE_HEX).unwrap();
        let mut no_witness = Vec::new();
        no_witness.extend_from_slice(&legacy[..4]);
        no_witness.extend_from_slice(&[0x00, 0x01]);
        no_witness.extend_from_slice(&legacy[4..legacy.len() - 4]);
        no_witness.push(0x00);
        no_witness.extend_from_slice(&legacy[legacy.len() - 4..]);
        assert!(matches!(
            Transaction::from_bytes(no_witness),
            Err(TransactionError::Decode(_))
        ));

        let mut padded = GENESIS_COINBASE_HEX.to_string();
        padded.push_str("00");
        assert_eq!(Transaction::from_hex(&padded), Err(TransactionError::TrailingBytes(1)));
    }

    #[test]
    fn test_txid_mismatch_reported() {
        let tx = Transaction::from_hex(GENESIS_COINBASE_HEX).unwrap();
        let result = tx.check_txid(&"00".repeat(32));
        assert!(matches!(result, Err(TransactionError::TxidMismatch { .. })));
    }

    #[test]
    fn test_encode_varint() {
        let mut output = Vec::new();
        encode_varint(100, &mut output);
        assert_eq!(output, vec![100]);

        output.clear();
        encode_varint(0x1234, &mut output);
        assert_eq!(output, vec![0xfd, 0x34, 0x12]);

        output.clear();
        encode_varint(0x1_0000, &mut output);
        assert_eq!(output, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
    }
}
