//! Coinbase transaction construction for Bitcoin mining.
//!
//! The coinbase transaction is the first transaction in a block that creates
//! new coins (the block reward). Its input script carries the block height
//! (BIP34), a random extra nonce so that two runs never hash the same
//! header, and the operator's message.

use thiserror::Error;

use crate::address::{AddressError, RewardAddress};
use crate::hash::{double_sha256, Hash256};
use crate::merkle::witness_commitment_script;
use crate::network::{Network, MAX_COINBASE_SCRIPTSIG_SIZE, MIN_COINBASE_SCRIPTSIG_SIZE};
use crate::script::{instructions, Instruction, ScriptBuilder, ScriptError, OP_0, OP_1NEGATE};
use crate::transaction::{encode_varint, Transaction};

/// Version field of the coinbase transactions we build.
const COINBASE_TX_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoinbaseError {
    #[error("invalid reward address: {0}")]
    InvalidAddress(#[from] AddressError),
    #[error("cannot build coinbase script: {0}")]
    ScriptConstruction(#[from] ScriptError),
    #[error("coinbase script is {0} bytes, allowed range is 2 to 100")]
    ScriptSigSize(usize),
}

/// Supplies the extra nonce mixed into every coinbase.
pub trait ExtraNonceSource {
    fn next_extra_nonce(&mut self) -> u64;
}

impl<R: rand::RngCore> ExtraNonceSource for R {
    fn next_extra_nonce(&mut self) -> u64 {
        self.next_u64()
    }
}

/// Builder for constructing coinbase transactions.
#[derive(Debug, Clone)]
pub struct CoinbaseBuilder {
    network: Network,
    /// Overrides the protocol subsidy (used to collect template fees).
    value: Option<u64>,
    /// Witness commitment, present when the block carries witness data.
    witness_commitment: Option<Hash256>,
    /// Witness reserved value (32 bytes, all zeros in practice).
    witness_reserved: Hash256,
}

impl CoinbaseBuilder {
    pub fn new(network: Network) -> Self {
        CoinbaseBuilder {
            network,
            value: None,
            witness_commitment: None,
            witness_reserved: [0u8; 32],
        }
    }

    /// Pay `value` satoshis instead of the block subsidy.
    pub fn with_value(mut self, value: u64) -> Self {
        self.value = Some(value);
        self
    }

    /// Add a witness commitment output and the witness reserved value.
    pub fn with_witness_commitment(mut self, commitment: Hash256) -> Self {
        self.witness_commitment = Some(commitment);
        self
    }

    pub fn witness_reserved(&self) -> &Hash256 {
        &self.witness_reserved
    }

    /// Build the coinbase for `height`, paying `reward_address`.
    ///
    /// Draws one extra nonce from `source`.
    pub fn build(
        &self,
        height: u32,
        reward_address: &str,
        message: &str,
        source: &mut dyn ExtraNonceSource,
    ) -> Result<CoinbaseTransaction, CoinbaseError> {
        let address = RewardAddress::parse(reward_address, self.network)?;
        let extra_nonce = source.next_extra_nonce();
        let script_sig = build_script_sig(height, extra_nonce, message.as_bytes())?;
        let value = self
            .value
            .unwrap_or_else(|| self.network.block_subsidy(height));

        let mut outputs = vec![TxOutput {
            value,
            script_pubkey: address.script_pubkey,
        }];
        if let Some(commitment) = &self.witness_commitment {
            outputs.push(TxOutput {
                value: 0,
                script_pubkey: witness_commitment_script(commitment),
            });
        }

        let stripped = self.serialize(&script_sig, &outputs, false);
        let txid = double_sha256(&stripped);
        let raw = if self.witness_commitment.is_some() {
            self.serialize(&script_sig, &outputs, true)
        } else {
            stripped
        };

        Ok(CoinbaseTransaction {
            transaction: Transaction::from_parts(raw, txid),
            script_sig,
            extra_nonce,
            value,
        })
    }

    fn serialize(&self, script_sig: &[u8], outputs: &[TxOutput], with_witness: bool) -> Vec<u8> {
        let mut raw = Vec::with_capacity(256);
        raw.extend_from_slice(&COINBASE_TX_VERSION.to_le_bytes());
        if with_witness {
            raw.extend_from_slice(&[0x00, 0x01]);
        }

        // Single input spending the null outpoint.
        raw.push(0x01);
        raw.extend_from_slice(&[0u8; 32]);
        raw.extend_from_slice(&u32::MAX.to_le_bytes());
        encode_varint(script_sig.len() as u64, &mut raw);
        raw.extend_from_slice(script_sig);
        raw.extend_from_slice(&u32::MAX.to_le_bytes());

        encode_varint(outputs.len() as u64, &mut raw);
        for output in outputs {
            raw.extend_from_slice(&output.value.to_le_bytes());
            encode_varint(output.script_pubkey.len() as u64, &mut raw);
            raw.extend_from_slice(&output.script_pubkey);
        }

        if with_witness {
            raw.push(0x01);
            raw.push(0x20);
            raw.extend_from_slice(&self.witness_reserved);
        }

        raw.extend_from_slice(&0u32.to_le_bytes());
        raw
    }
}

/// A constructed coinbase transaction.
#[derive(Debug, Clone)]
pub struct CoinbaseTransaction {
    pub transaction: Transaction,
    /// The input script: height, extra nonce, message.
    pub script_sig: Vec<u8>,
    pub extra_nonce: u64,
    /// Satoshis paid to the reward address.
    pub value: u64,
}

impl CoinbaseTransaction {
    /// Read the BIP34 height back out of the input script.
    pub fn height(&self) -> Option<i64> {
        decode_height(&self.script_sig)
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}

/// A transaction output.
struct TxOutput {
    value: u64,
    script_pubkey: Vec<u8>,
}

fn build_script_sig(height: u32, extra_nonce: u64, message: &[u8]) -> Result<Vec<u8>, CoinbaseError> {
    let script = ScriptBuilder::new()
        .push_int(height as i64)
        .push_uint(extra_nonce)
        .push_slice(message)
        .into_script()?;

    if !(MIN_COINBASE_SCRIPTSIG_SIZE..=MAX_COINBASE_SCRIPTSIG_SIZE).contains(&script.len()) {
        return Err(CoinbaseError::ScriptSigSize(script.len()));
    }
    Ok(script)
}

/// Decode the height pushed first in a coinbase input script.
pub fn decode_height(script_sig: &[u8]) -> Option<i64> {
    match instructions(script_sig).next()? {
        Ok(instruction) => instruction.as_int(),
        Err(_) => None,
    }
}

/// Decode every push of a coinbase input script as (height, extra nonce, message).
pub fn decode_script_sig(script_sig: &[u8]) -> Option<(i64, u64, Vec<u8>)> {
    let parts: Vec<Instruction<'_>> = instructions(script_sig).collect::<Result<_, _>>().ok()?;
    match parts.as_slice() {
        [height, extra_nonce, message] => {
            let height = height.as_int()?;
            let extra_nonce = match extra_nonce {
                Instruction::Push(bytes) if bytes.len() == 9 => {
                    let mut le = [0u8; 8];
                    le.copy_from_slice(&bytes[..8]);
                    u64::from_le_bytes(le)
                }
                other => other.as_int()? as u64,
            };
            let message = match *message {
                Instruction::Push(bytes) => bytes.to_vec(),
                Instruction::Op(OP_0) => Vec::new(),
                Instruction::Op(OP_1NEGATE) => vec![0x81],
                ref other => vec![other.as_int()? as u8],
            };
            Some((height, extra_nonce, message))
        }
        _ => None,
    }
}
