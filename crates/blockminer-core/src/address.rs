//! Reward address decoding into output scripts.
//!
//! Supports Base58Check P2PKH/P2SH and bech32/bech32m witness addresses
//! (P2WPKH, P2WSH, P2TR).

use core::fmt;

use thiserror::Error;

use crate::hash::double_sha256;
use crate::network::Network;
use crate::script::{
    ScriptBuilder, OP_0, OP_1, OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid base58 character {0:?}")]
    InvalidBase58Char(char),
    #[error("invalid checksum")]
    InvalidChecksum,
    #[error("unrecognized address payload")]
    InvalidFormat,
    #[error("invalid bech32 encoding: {0}")]
    InvalidBech32(&'static str),
    #[error("invalid witness version {0}")]
    InvalidWitnessVersion(u8),
    #[error("invalid witness program length {0}")]
    InvalidWitnessProgramLength(usize),
    #[error("address is for another network than {expected}")]
    NetworkMismatch { expected: Network },
}

/// The output script shape an address encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressKind::P2pkh => "p2pkh",
            AddressKind::P2sh => "p2sh",
            AddressKind::P2wpkh => "p2wpkh",
            AddressKind::P2wsh => "p2wsh",
            AddressKind::P2tr => "p2tr",
        };
        f.write_str(name)
    }
}

/// A decoded address the coinbase can pay to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardAddress {
    pub kind: AddressKind,
    pub network: Network,
    /// The scriptPubKey of the reward output.
    pub script_pubkey: Vec<u8>,
    display: String,
}

impl RewardAddress {
    /// Decode `address` and check that it belongs to `network`.
    pub fn parse(address: &str, network: Network) -> Result<Self, AddressError> {
        let trimmed = address.trim();
        let hrp_prefix = format!("{}1", network.bech32_hrp());
        let looks_bech32 = trimmed.to_lowercase().starts_with(&hrp_prefix)
            || ["bc1", "tb1", "bcrt1"]
                .iter()
                .any(|p| trimmed.to_lowercase().starts_with(p));

        let (kind, script_pubkey) = if looks_bech32 {
            decode_witness_address(trimmed, network)?
        } else {
            decode_base58_address(trimmed, network)?
        };

        Ok(RewardAddress {
            kind,
            network,
            script_pubkey,
            display: trimmed.to_string(),
        })
    }
}

impl fmt::Display for RewardAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

fn decode_base58_address(
    address: &str,
    network: Network,
) -> Result<(AddressKind, Vec<u8>), AddressError> {
    let decoded = base58_decode(address)?;
    if decoded.len() != 25 {
        return Err(AddressError::InvalidFormat);
    }

    let (payload, checksum) = decoded.split_at(21);
    if double_sha256(payload)[..4] != *checksum {
        return Err(AddressError::InvalidChecksum);
    }

    let (version, hash) = (payload[0], &payload[1..]);
    let kind = if version == network.p2pkh_version() {
        AddressKind::P2pkh
    } else if version == network.p2sh_version() {
        AddressKind::P2sh
    } else if [0x00, 0x05, 0x6f, 0xc4].contains(&version) {
        return Err(AddressError::NetworkMismatch { expected: network });
    } else {
        return Err(AddressError::InvalidFormat);
    };

    let builder = match kind {
        AddressKind::P2pkh => ScriptBuilder::new()
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG),
        _ => ScriptBuilder::new()
            .push_opcode(OP_HASH160)
            .push_slice(hash)
            .push_opcode(OP_EQUAL),
    };
    let script = builder.into_script().map_err(|_| AddressError::InvalidFormat)?;
    Ok((kind, script))
}

fn decode_witness_address(
    address: &str,
    network: Network,
) -> Result<(AddressKind, Vec<u8>), AddressError> {
    let (hrp, data, variant) = bech32_decode(address)?;
    if hrp != network.bech32_hrp() {
        return Err(AddressError::NetworkMismatch { expected: network });
    }

    let (&version, program5) = data
        .split_first()
        .ok_or(AddressError::InvalidBech32("empty data part"))?;
    if version > 16 {
        return Err(AddressError::InvalidWitnessVersion(version));
    }
    let expected_variant = if version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    if variant != expected_variant {
        return Err(AddressError::InvalidBech32("checksum variant does not match witness version"));
    }

    let program = regroup_5_to_8(program5)?;
    let kind = match (version, program.len()) {
        (0, 20) => AddressKind::P2wpkh,
        (0, 32) => AddressKind::P2wsh,
        (1, 32) => AddressKind::P2tr,
        (0, len) | (1, len) => return Err(AddressError::InvalidWitnessProgramLength(len)),
        (v, _) => return Err(AddressError::InvalidWitnessVersion(v)),
    };

    let version_op = if version == 0 { OP_0 } else { OP_1 + version - 1 };
    let mut script = Vec::with_capacity(2 + program.len());
    script.push(version_op);
    script.push(program.len() as u8);
    script.extend_from_slice(&program);
    Ok((kind, script))
}

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn base58_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());
    for c in input.chars() {
        let mut carry = BASE58_ALPHABET
            .iter()
            .position(|&a| a as char == c)
            .ok_or(AddressError::InvalidBase58Char(c))? as u32;
        // Little-endian accumulator; reversed at the end.
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = carry as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push(carry as u8);
            carry >>= 8;
        }
    }
    let leading_ones = input.chars().take_while(|&c| c == '1').count();
    bytes.extend(core::iter::repeat(0).take(leading_ones));
    bytes.reverse();
    Ok(bytes)
}

const BECH32_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BECH32M_CONST: u32 = 0x2bc830a3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Bech32,
    Bech32m,
}

fn bech32_decode(input: &str) -> Result<(String, Vec<u8>, Variant), AddressError> {
    let has_lower = input.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = input.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(AddressError::InvalidBech32("mixed case"));
    }
    let lower = input.to_ascii_lowercase();

    let sep = lower.rfind('1').ok_or(AddressError::InvalidBech32("missing separator"))?;
    if sep == 0 || sep + 7 > lower.len() || lower.len() > 90 {
        return Err(AddressError::InvalidBech32("bad length"));
    }
    let (hrp, rest) = (&lower[..sep], &lower[sep + 1..]);

    let mut data = rest
        .bytes()
        .map(|b| BECH32_CHARSET.iter().position(|&c| c == b).map(|i| i as u8))
        .collect::<Option<Vec<u8>>>()
        .ok_or(AddressError::InvalidBech32("invalid character"))?;

    let mut values = hrp_expand(hrp);
    values.extend_from_slice(&data);
    let variant = match polymod(&values) {
        1 => Variant::Bech32,
        BECH32M_CONST => Variant::Bech32m,
        _ => return Err(AddressError::InvalidChecksum),
    };

    data.truncate(data.len() - 6);
    Ok((hrp.to_string(), data, variant))
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    bytes
        .iter()
        .map(|b| b >> 5)
        .chain(core::iter::once(0))
        .chain(bytes.iter().map(|b| b & 0x1f))
        .collect()
}

fn polymod(values: &[u8]) -> u32 {
    const GEN: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
    values.iter().fold(1u32, |chk, &v| {
        let top = chk >> 25;
        let mut chk = ((chk & 0x1ffffff) << 5) ^ v as u32;
        for (i, g) in GEN.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= g;
            }
        }
        chk
    })
}

fn regroup_5_to_8(data: &[u8]) -> Result<Vec<u8>, AddressError> {
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    let mut out = Vec::with_capacity(data.len() * 5 / 8);
    for &value in data {
        acc = ((acc << 5) | value as u32) & 0xfff;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    if bits >= 5 || (acc << (8 - bits)) & 0xff != 0 {
        return Err(AddressError::InvalidBech32("non-zero padding"));
    }
    Ok(out)
}
