//! Inputs of a trace: accounts, the transaction and the block it runs in.
//!
//! Every type here is plain data that (de)serializes with camelCase keys,
//! so a whole [`TraceConfig`] can be loaded from a JSON file.

use std::collections::BTreeMap;

use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};

/// Account state keyed by address.
pub type Accounts = BTreeMap<H160, Account>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    #[serde(with = "hex_bytes")]
    pub code: Vec<u8>,
    pub storage: BTreeMap<U256, U256>,
}

impl Account {
    pub fn with_code(code: Vec<u8>) -> Self {
        Self { code, ..Self::default() }
    }
}

/// A message call, or a contract creation when `to` is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transaction {
    pub from: H160,
    pub to: Option<H160>,
    pub nonce: u64,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: U256,
    #[serde(with = "hex_bytes")]
    pub call_data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockConstants {
    pub coinbase: H160,
    pub timestamp: u64,
    pub number: u64,
    pub difficulty: U256,
    pub gas_limit: U256,
    pub base_fee: U256,
}

/// What the struct logger captures at each step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    pub enable_memory: bool,
    pub disable_stack: bool,
    pub disable_storage: bool,
    /// Maximum number of struct logs to keep, 0 for no limit.
    pub limit: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { enable_memory: true, disable_stack: false, disable_storage: false, limit: 0 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TraceConfig {
    pub chain_id: U256,
    pub block_constants: BlockConstants,
    pub accounts: Accounts,
    pub transaction: Transaction,
    pub logger_config: LoggerConfig,
}

/// `0x`-prefixed hex strings for byte vectors; the prefix is optional on input.
pub(crate) mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(D::Error::custom)
    }
}
