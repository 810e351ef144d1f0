//! Compact difficulty encoding and full-precision targets.
//!
//! Headers carry the target as a 32-bit "compact" value: one exponent byte
//! followed by a three-byte mantissa, read as `mantissa * 256^(exponent - 3)`.
//! The mantissa is nominally signed, so bit 23 is a sign flag that a valid
//! target never sets.

use core::fmt;

use primitive_types::U256;
use thiserror::Error;

use crate::hash::Hash256;

/// Compact bits of the difficulty-1 target on mainnet.
pub const DIFFICULTY_ONE_BITS: u32 = 0x1d00ffff;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Difficulty decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DifficultyError {
    /// The bits string is not a 32-bit hexadecimal value.
    #[error("malformed difficulty bits {0:?}")]
    MalformedBits(String),
    /// The sign flag is set on a non-zero mantissa.
    #[error("negative difficulty target in bits {0:08x}")]
    Negative(u32),
    /// The decoded value does not fit in 256 bits.
    #[error("difficulty target overflows 256 bits in bits {0:08x}")]
    Overflow(u32),
}

/// A 256-bit proof-of-work target. A header hash is valid when `hash <= target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Target(U256);

impl Target {
    /// The zero target. No hash satisfies it except the all-zero hash.
    pub const ZERO: Target = Target(U256([0; 4]));

    /// Wrap a raw 256-bit value.
    pub fn from_u256(value: U256) -> Self {
        Target(value)
    }

    /// The underlying integer.
    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Decode compact bits.
    pub fn from_compact(bits: u32) -> Result<Self, DifficultyError> {
        let exponent = bits >> 24;
        let mut mantissa = bits & MANTISSA_MASK;
        if exponent <= 3 {
            mantissa >>= 8 * (3 - exponent);
        }

        if mantissa != 0 && bits & SIGN_BIT != 0 {
            return Err(DifficultyError::Negative(bits));
        }

        let overflow = mantissa != 0
            && (exponent > 34
                || (mantissa > 0xff && exponent > 33)
                || (mantissa > 0xffff && exponent > 32));
        if overflow {
            return Err(DifficultyError::Overflow(bits));
        }

        let value = if exponent <= 3 {
            U256::from(mantissa)
        } else {
            U256::from(mantissa) << (8 * (exponent as usize - 3))
        };
        Ok(Target(value))
    }

    /// Encode as compact bits.
    ///
    /// This is the inverse of [`Target::from_compact`] for every canonical
    /// compact value. Precision below the top three bytes is dropped.
    pub fn to_compact(&self) -> u32 {
        let mut size = (self.0.bits() as u32 + 7) / 8;
        let mut compact = if size <= 3 {
            (self.0.low_u64() << (8 * (3 - size))) as u32
        } else {
            (self.0 >> (8 * (size as usize - 3))).low_u32()
        };

        // Keep the sign flag clear by moving one byte into the exponent.
        if compact & SIGN_BIT != 0 {
            compact >>= 8;
            size += 1;
        }

        compact | (size << 24)
    }

    /// Check a header hash against this target.
    ///
    /// The hash is in wire order, which is the little-endian encoding of the
    /// integer the network compares. Comparing raw bytes against a big-endian
    /// target would test the wrong end of the hash.
    #[inline]
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        U256::from_little_endian(hash) <= self.0
    }

    /// Difficulty relative to the mainnet difficulty-1 target.
    pub fn difficulty(&self) -> f64 {
        let current = u256_to_f64(self.0);
        if current == 0.0 {
            return f64::INFINITY;
        }
        let one = Target::from_compact(DIFFICULTY_ONE_BITS).unwrap_or_default();
        u256_to_f64(one.0) / current
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        f.write_str(&hex::encode(bytes))
    }
}

/// Parse the bits field as the node sends it, e.g. `"1d00ffff"`.
pub fn parse_bits_hex(bits: &str) -> Result<u32, DifficultyError> {
    let malformed = || DifficultyError::MalformedBits(bits.to_string());
    let digits = bits.strip_prefix("0x").unwrap_or(bits);
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    u32::from_str_radix(digits, 16).map_err(|_| malformed())
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

/// Format difficulty for display (e.g. "1.23T").
pub fn format_difficulty(difficulty: f64) -> String {
    if difficulty >= 1e15 {
        format!("{:.2}P", difficulty / 1e15)
    } else if difficulty >= 1e12 {
        format!("{:.2}T", difficulty / 1e12)
    } else if difficulty >= 1e9 {
        format!("{:.2}G", difficulty / 1e9)
    } else if difficulty >= 1e6 {
        format!("{:.2}M", difficulty / 1e6)
    } else if difficulty >= 1e3 {
        format!("{:.2}K", difficulty / 1e3)
    } else {
        format!("{:.2}", difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_genesis_bits() {
        let target = Target::from_compact(0x1d00ffff).unwrap();
        assert_eq!(target.as_u256(), U256::from(0xffffu64) << 208usize);
        assert_eq!(
            target.to_string(),
            "00000000ffff0000000000000000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_decode_small_exponents() {
        assert_eq!(Target::from_compact(0x01003456).unwrap().as_u256(), U256::zero());
        assert_eq!(Target::from_compact(0x01123456).unwrap().as_u256(), U256::from(0x12u64));
        assert_eq!(Target::from_compact(0x02123456).unwrap().as_u256(), U256::from(0x1234u64));
        assert_eq!(Target::from_compact(0x03123456).unwrap().as_u256(), U256::from(0x123456u64));
        assert_eq!(
            Target::from_compact(0x04123456).unwrap().as_u256(),
            U256::from(0x12345600u64)
        );
    }

    #[test]
    fn test_decode_rejects_negative_and_overflow() {
        assert_eq!(
            Target::from_compact(0x04923456),
            Err(DifficultyError::Negative(0x04923456))
        );
        assert_eq!(
            Target::from_compact(0xff123456),
            Err(DifficultyError::Overflow(0xff123456))
        );
        // A zero mantissa with the sign bit is just zero.
        assert_eq!(Target::from_compact(0x01800000).unwrap(), Target::ZERO);
    }

    #[test]
    fn test_compact_roundtrip() {
        let canonical = [
            0x1d00ffff, // mainnet genesis
            0x207fffff, // regtest
            0x17034219,
            0x1b0404cb,
            0x1c05a3f4,
            0x03123456,
            0x02008000,
            0x00000000,
        ];
        for &bits in &canonical {
            let target = Target::from_compact(bits).unwrap();
            assert_eq!(target.to_compact(), bits, "roundtrip failed for {:08x}", bits);
        }
    }

    /// The shortest encoding with the sign bit clear and nothing in the
    /// bytes the exponent shifts out.
    fn is_canonical(bits: u32) -> bool {
        let exponent = bits >> 24;
        let mantissa = bits & 0x00ff_ffff;
        if mantissa == 0 {
            return bits == 0;
        }
        if mantissa & 0x0080_0000 != 0 {
            return false;
        }
        if mantissa >> 16 == 0 && mantissa & 0x8000 == 0 {
            return false;
        }
        exponent >= 3 || mantissa & ((1 << (8 * (3 - exponent))) - 1) == 0
    }

    #[test]
    fn test_compact_roundtrip_sweep() {
        let mantissas = [
            0x000000, 0x000001, 0x008000, 0x0080ff, 0x00ffff, 0x010000, 0x123456, 0x400001,
            0x7f0000, 0x7fffff,
        ];
        let mut checked = 0;
        for exponent in 0u32..=34 {
            for &mantissa in &mantissas {
                let bits = (exponent << 24) | mantissa;
                if !is_canonical(bits) {
                    continue;
                }
                let target = match Target::from_compact(bits) {
                    Ok(target) => target,
                    Err(_) => continue,
                };
                assert_eq!(target.to_compact(), bits, "roundtrip failed for {:08x}", bits);
                checked += 1;
            }
        }
        assert!(checked > 200, "only {} values checked", checked);
        assert!(is_canonical(0x207fffff));
        assert!(is_canonical(0x02008000));
        assert!(!is_canonical(0x01123456));
    }

    #[test]
    fn test_encode_moves_sign_byte_into_exponent() {
        let target = Target::from_u256(U256::from(0x80u64));
        assert_eq!(target.to_compact(), 0x02008000);
    }

    #[test]
    fn test_parse_bits_hex() {
        assert_eq!(parse_bits_hex("1d00ffff"), Ok(0x1d00ffff));
        assert_eq!(parse_bits_hex("207fffff"), Ok(0x207fffff));
        assert!(matches!(parse_bits_hex("1d00fffff"), Err(DifficultyError::MalformedBits(_))));
        assert!(matches!(parse_bits_hex("xyz"), Err(DifficultyError::MalformedBits(_))));
        assert!(matches!(parse_bits_hex(""), Err(DifficultyError::MalformedBits(_))));
        assert_eq!(parse_bits_hex("0x1d00ffff"), Ok(0x1d00ffff));
        assert!(matches!(parse_bits_hex("+1d00fff"), Err(DifficultyError::MalformedBits(_))));
        assert!(matches!(parse_bits_hex("0x0x1d00ffff"), Err(DifficultyError::MalformedBits(_))));
        assert!(matches!(parse_bits_hex("0x"), Err(DifficultyError::MalformedBits(_))));
    }

    #[test]
    fn test_is_met_by_uses_network_byte_order() {
        let target = Target::from_compact(0x1d00ffff).unwrap();

        // Wire order: the most significant bytes sit at the end of the array.
        let mut good = [0xffu8; 32];
        good[28..].copy_from_slice(&[0, 0, 0, 0]);
        good[26] = 0x00;
        good[27] = 0x00;
        assert!(target.is_met_by(&good));

        let mut bad = [0u8; 32];
        bad[28] = 0x01;
        assert!(!target.is_met_by(&bad));

        // Equality satisfies the target.
        let mut exact = [0u8; 32];
        exact[26] = 0xff;
        exact[27] = 0xff;
        assert!(target.is_met_by(&exact));
    }

    #[test]
    fn test_zero_target() {
        assert!(!Target::ZERO.is_met_by(&[0x01; 32]));
        assert!(Target::ZERO.difficulty().is_infinite());
    }

    #[test]
    fn test_difficulty_calculation() {
        let one = Target::from_compact(DIFFICULTY_ONE_BITS).unwrap();
        assert!((one.difficulty() - 1.0).abs() < 1e-9);

        let harder = Target::from_compact(0x1b0404cb).unwrap();
        assert!((harder.difficulty() - 16307.42).abs() < 0.01);
        assert_eq!(format_difficulty(harder.difficulty()), "16.31K");
    }
}
