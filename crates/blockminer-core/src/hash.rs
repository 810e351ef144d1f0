//! Double SHA256 and hash byte-order helpers.

use sha2::{Digest, Sha256};

/// A 32-byte hash in internal (wire) byte order.
pub type Hash256 = [u8; 32];

/// Bitcoin's double SHA256: SHA256(SHA256(data)).
///
/// Used for block hashes, transaction ids and merkle nodes.
#[inline]
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut result = [0u8; 32];
    result.copy_from_slice(&second);
    result
}

/// Hash two nodes together, left then right.
#[inline]
pub fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left);
    combined[32..].copy_from_slice(right);
    double_sha256(&combined)
}

/// Reverse the byte order of a 32-byte hash.
///
/// Nodes display hashes reversed relative to their wire order.
#[inline]
pub fn reverse_bytes(bytes: &Hash256) -> Hash256 {
    let mut reversed = *bytes;
    reversed.reverse();
    reversed
}

/// Render a hash the way nodes print it (reversed hex).
pub fn hash_to_display_hex(hash: &Hash256) -> String {
    hex::encode(reverse_bytes(hash))
}

/// Parse a displayed (reversed) hex hash back into wire order.
///
/// Returns `None` unless the input is exactly 64 hex characters.
pub fn hash_from_display_hex(s: &str) -> Option<Hash256> {
    if s.len() != 64 {
        return None;
    }
    let mut hash = [0u8; 32];
    hex::decode_to_slice(s, &mut hash).ok()?;
    hash.reverse();
    Some(hash)
}

/// Count leading zero bits of the displayed hash.
///
/// The displayed form is byte-reversed, so this walks the internal array from
/// the end.
pub fn count_leading_zeros(hash: &Hash256) -> u32 {
    let mut zeros = 0u32;
    for byte in hash.iter().rev() {
        if *byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros();
            break;
        }
    }
    zeros
}
