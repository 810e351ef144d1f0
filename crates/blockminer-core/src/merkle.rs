//! Merkle tree computation for Bitcoin transactions.

use thiserror::Error;

use crate::hash::{hash_pair, Hash256};
use crate::script::OP_RETURN;
use crate::transaction::Transaction;

/// Header bytes that mark a witness commitment output.
pub const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("cannot compute a merkle root over zero transactions")]
    EmptyTransactionSet,
}

/// Compute the merkle root from a list of transaction IDs.
///
/// A single txid is its own root. Levels with an odd number of entries
/// pair the last entry with itself.
pub fn compute_merkle_root(txids: &[Hash256]) -> Result<Hash256, MerkleError> {
    match txids {
        [] => Err(MerkleError::EmptyTransactionSet),
        [single] => Ok(*single),
        _ => {
            let mut current_level = txids.to_vec();
            while current_level.len() > 1 {
                current_level = current_level
                    .chunks(2)
                    .map(|pair| {
                        let left = &pair[0];
                        let right = pair.get(1).unwrap_or(left);
                        hash_pair(left, right)
                    })
                    .collect();
            }
            Ok(current_level[0])
        }
    }
}

/// Merkle root over the txids of an ordered transaction list, coinbase first.
pub fn transactions_merkle_root(transactions: &[Transaction]) -> Result<Hash256, MerkleError> {
    let txids: Vec<Hash256> = transactions.iter().map(|tx| *tx.txid()).collect();
    compute_merkle_root(&txids)
}

/// Compute the witness commitment for the transactions that follow the coinbase.
///
/// The witness tree uses wtxids, with the coinbase slot fixed at all zeros.
/// The commitment is SHA256d(witness_root || witness_reserved_value).
pub fn compute_witness_commitment(
    non_coinbase: &[Transaction],
    witness_reserved_value: &Hash256,
) -> Hash256 {
    let mut wtxids = Vec::with_capacity(non_coinbase.len() + 1);
    wtxids.push([0u8; 32]);
    wtxids.extend(non_coinbase.iter().map(|tx| *tx.wtxid()));

    // The list always holds the coinbase slot.
    let witness_root = compute_merkle_root(&wtxids).unwrap_or_default();
    hash_pair(&witness_root, witness_reserved_value)
}

/// Generate the scriptPubKey for a witness commitment output.
///
/// Format: OP_RETURN <0xaa21a9ed || commitment>
pub fn witness_commitment_script(witness_commitment: &Hash256) -> Vec<u8> {
    let mut script = Vec::with_capacity(38);
    script.push(OP_RETURN);
    script.push(0x24);
    script.extend_from_slice(&WITNESS_COMMITMENT_HEADER);
    script.extend_from_slice(witness_commitment);
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::double_sha256;
    use crate::transaction::tests::GENESIS_COINBASE_HEX;

    #[test]
    fn test_empty_merkle_root() {
        assert_eq!(compute_merkle_root(&[]), Err(MerkleError::EmptyTransactionSet));
        assert_eq!(transactions_merkle_root(&[]), Err(MerkleError::EmptyTransactionSet));
    }

    #[test]
    fn test_single_tx_merkle_root() {
        let txid = [0x42u8; 32];
        assert_eq!(compute_merkle_root(&[txid]), Ok(txid));

        let tx = Transaction::from_hex(GENESIS_COINBASE_HEX).unwrap();
        assert_eq!(transactions_merkle_root(&[tx.clone()]), Ok(*tx.txid()));
    }

    #[test]
    fn test_two_tx_merkle_root() {
        let tx1 = [0x11u8; 32];
        let tx2 = [0x22u8; 32];

        let mut combined = [0u8; 64];
        combined[..32].copy_from_slice(&tx1);
        combined[32..].copy_from_slice(&tx2);
        let expected = double_sha256(&combined);

        assert_eq!(compute_merkle_root(&[tx1, tx2]), Ok(expected));
    }

    #[test]
    fn test_three_tx_merkle_root() {
        // With 3 transactions, the third is duplicated
        let tx1 = [0x11u8; 32];
        let tx2 = [0x22u8; 32];
        let tx3 = [0x33u8; 32];

        let h12 = hash_pair(&tx1, &tx2);
        let h33 = hash_pair(&tx3, &tx3);
        let expected = hash_pair(&h12, &h33);

        assert_eq!(compute_merkle_root(&[tx1, tx2, tx3]), Ok(expected));
    }

    #[test]
    fn test_merkle_root_is_order_sensitive() {
        let a = [0x01u8; 32];
        let b = [0x02u8; 32];
        let forward = compute_merkle_root(&[a, b]).unwrap();
        let backward = compute_merkle_root(&[b, a]).unwrap();
        assert_ne!(forward, backward);
        assert_eq!(forward, compute_merkle_root(&[a, b]).unwrap());
    }

    #[test]
    fn test_witness_commitment_without_transactions() {
        let reserved = [0u8; 32];
        let commitment = compute_witness_commitment(&[], &reserved);
        assert_eq!(commitment, double_sha256(&[0u8; 64]));
    }

    #[test]
    fn test_witness_commitment_script() {
        let commitment = [0xAB; 32];
        let script = witness_commitment_script(&commitment);

        assert_eq!(script.len(), 38);
        assert_eq!(script[0], 0x6a); // OP_RETURN
        assert_eq!(script[1], 0x24); // Push 36 bytes
        assert_eq!(&script[2..6], &WITNESS_COMMITMENT_HEADER);
        assert_eq!(&script[6..], &commitment[..]);
    }
}
