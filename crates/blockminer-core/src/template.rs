//! Block templates as returned by `getblocktemplate`.
//!
//! Only the fields the miner consumes are modeled; anything else the node
//! sends is ignored during deserialization.

use serde::Deserialize;

use crate::difficulty::{parse_bits_hex, DifficultyError};
use crate::transaction::{Transaction, TransactionError};

/// A candidate block from the node. Superseded by the next fetch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockTemplate {
    /// Previous block hash in display order.
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: String,
    /// Compact target as hex, e.g. "1d00ffff".
    pub bits: String,
    pub height: u32,
    #[serde(default)]
    pub transactions: Vec<TemplateTransaction>,
    /// Suggested header timestamp.
    #[serde(default)]
    pub curtime: Option<u32>,
    /// Suggested header version.
    #[serde(default)]
    pub version: Option<i32>,
    /// Subsidy plus the fees of every template transaction.
    #[serde(default, rename = "coinbasevalue")]
    pub coinbase_value: Option<u64>,
    /// Full scriptPubKey of the witness commitment output, as hex.
    #[serde(default)]
    pub default_witness_commitment: Option<String>,
}

/// One transaction entry of a template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TemplateTransaction {
    /// Raw transaction as hex.
    pub data: String,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub fee: Option<u64>,
}

impl BlockTemplate {
    /// Parse the compact difficulty bits.
    pub fn bits(&self) -> Result<u32, DifficultyError> {
        parse_bits_hex(&self.bits)
    }

    /// Decode every template transaction in order.
    ///
    /// Each decoded txid is checked against the one the node reported, when
    /// it reported one.
    pub fn decode_transactions(&self) -> Result<Vec<Transaction>, TransactionError> {
        self.transactions
            .iter()
            .map(|entry| {
                let tx = Transaction::from_hex(&entry.data)?;
                if let Some(txid) = &entry.txid {
                    tx.check_txid(txid)?;
                }
                Ok(tx)
            })
            .collect()
    }

    /// Fees of all template transactions, when the node reported them.
    pub fn total_fees(&self) -> Option<u64> {
        self.transactions.iter().map(|tx| tx.fee).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tests::{GENESIS_COINBASE_HEX, GENESIS_COINBASE_TXID};

    fn sample_json() -> String {
        format!(
            r#"{{
                "version": 536870912,
                "rules": ["csv", "!segwit"],
                "previousblockhash": "000000000000000000024bead8df69990852c202db0e0097c1a12ea637d7e96d",
                "transactions": [
                    {{"data": "{}", "txid": "{}", "fee": 1500, "weight": 816}}
                ],
                "coinbasevalue": 312501500,
                "curtime": 1700000000,
                "bits": "17034219",
                "height": 840000,
                "default_witness_commitment": "6a24aa21a9ed0000000000000000000000000000000000000000000000000000000000000000"
            }}"#,
            GENESIS_COINBASE_HEX, GENESIS_COINBASE_TXID
        )
    }

    #[test]
    fn test_deserialize_template() {
        let template: BlockTemplate = serde_json::from_str(&sample_json()).unwrap();
        assert_eq!(template.height, 840_000);
        assert_eq!(template.bits().unwrap(), 0x17034219);
        assert_eq!(template.version, Some(0x20000000));
        assert_eq!(template.curtime, Some(1_700_000_000));
        assert_eq!(template.coinbase_value, Some(312_501_500));
        assert_eq!(template.total_fees(), Some(1500));
        assert_eq!(
            template.default_witness_commitment.as_deref(),
            Some("6a24aa21a9ed0000000000000000000000000000000000000000000000000000000000000000")
        );
        assert_eq!(template.transactions.len(), 1);
    }

    #[test]
    fn test_minimal_template() {
        let json = r#"{"previousblockhash": "00", "bits": "207fffff", "height": 1}"#;
        let template: BlockTemplate = serde_json::from_str(json).unwrap();
        assert!(template.transactions.is_empty());
        assert_eq!(template.curtime, None);
        assert_eq!(template.total_fees(), Some(0));
        assert_eq!(template.default_witness_commitment, None);
    }

    #[test]
    fn test_decode_transactions_checks_txid() {
        let mut template: BlockTemplate = serde_json::from_str(&sample_json()).unwrap();
        let txs = template.decode_transactions().unwrap();
        assert_eq!(txs.len(), 1);

        template.transactions[0].txid = Some("11".repeat(32));
        assert!(matches!(
            template.decode_transactions(),
            Err(TransactionError::TxidMismatch { .. })
        ));

        template.transactions[0].txid = None;
        template.transactions[0].data = "00".to_string();
        assert!(template.decode_transactions().is_err());
    }

    #[test]
    fn test_bad_bits() {
        let json = r#"{"previousblockhash": "00", "bits": "nothex", "height": 1}"#;
        let template: BlockTemplate = serde_json::from_str(json).unwrap();
        assert!(template.bits().is_err());
    }
}
