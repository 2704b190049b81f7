//! Runs a transaction and records a geth-compatible struct log per step.

use std::collections::BTreeMap;

use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::machine::{keccak256, Evm, EvmConfig, EvmError, Halt, Hook};
use crate::opcodes::{self, SLOAD, SSTORE};
use crate::types::{LoggerConfig, TraceConfig};

const TX_GAS: u64 = 21_000;
const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
const TX_DATA_ZERO_GAS: u64 = 4;
const TX_DATA_NON_ZERO_GAS: u64 = 16;
const CREATE_DATA_GAS: u64 = 200;
const INIT_CODE_WORD_GAS: u64 = 2;
const MAX_CODE_SIZE: usize = 24_576;
const MAX_INIT_CODE_SIZE: usize = 2 * MAX_CODE_SIZE;
const MAX_REFUND_QUOTIENT: u64 = 5;

/// Setup failures that keep a transaction from executing at all.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("intrinsic gas too low: have {limit}, want {required}")]
    IntrinsicGas { limit: u64, required: u64 },
    #[error(
        "insufficient funds for gas * price + value: address {address:?} have {balance} want {cost}"
    )]
    InsufficientBalance { address: H160, balance: U256, cost: U256 },
    #[error("nonce of {0:?} has reached its maximum")]
    NonceOverflow(H160),
    #[error("max initcode size exceeded: code size {size} limit {limit}")]
    MaxInitCodeSize { size: usize, limit: usize },
    /// Raised by backends other than [`LocalBackend`].
    #[error("{0}")]
    Backend(String),
}

/// Machine state captured right before one instruction executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructLog {
    pub pc: u64,
    pub op: String,
    pub gas: u64,
    pub gas_cost: u64,
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<U256>>,
    /// 32-byte words, hex without prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub refund: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Gas used by the transaction, after refunds.
    pub gas: u64,
    pub failed: bool,
    pub return_value: String,
    pub struct_logs: Vec<StructLog>,
}

/// Something that can execute a transaction and report its struct logs.
pub trait TraceBackend {
    fn trace_tx(&self, config: &TraceConfig) -> Result<ExecutionResult, TraceError>;
}

/// Traces with the interpreter in [`crate::machine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBackend;

impl TraceBackend for LocalBackend {
    fn trace_tx(&self, config: &TraceConfig) -> Result<ExecutionResult, TraceError> {
        trace_tx(config)
    }
}

/// [`Hook`] that turns interpreter steps into [`StructLog`]s.
#[derive(Debug, Default)]
pub struct StructLogger {
    cfg: LoggerConfig,
    logs: Vec<StructLog>,
    storage: BTreeMap<U256, U256>,
    open: bool,
}

impl StructLogger {
    pub fn new(cfg: LoggerConfig) -> Self {
        Self { cfg, ..Self::default() }
    }

    pub fn into_logs(self) -> Vec<StructLog> {
        self.logs
    }
}

impl Hook for StructLogger {
    fn step(&mut self, evm: &Evm, op: u8) {
        self.open = false;
        if self.cfg.limit != 0 && self.logs.len() >= self.cfg.limit {
            return;
        }

        let mut storage = None;
        if !self.cfg.disable_storage {
            // the stack is still pre-execution: key on top, value below it
            let top = |n: usize| evm.stack.len().checked_sub(n + 1).map(|i| evm.stack[i]);
            match (op, top(0), top(1)) {
                (SLOAD, Some(key), _) => {
                    self.storage.insert(key, evm.sload(key));
                }
                (SSTORE, Some(key), Some(val)) => {
                    self.storage.insert(key, val);
                }
                _ => {}
            }
            if op == SLOAD || op == SSTORE {
                storage = Some(
                    self.storage
                        .iter()
                        .map(|(k, v)| (word_hex(*k), word_hex(*v)))
                        .collect(),
                );
            }
        }

        self.logs.push(StructLog {
            pc: evm.pc as u64,
            op: opcodes::label(op),
            gas: evm.gas,
            gas_cost: 0,
            depth: 1,
            error: None,
            stack: (!self.cfg.disable_stack).then(|| evm.stack.clone()),
            memory: self
                .cfg
                .enable_memory
                .then(|| evm.memory.chunks(32).map(hex::encode).collect()),
            storage,
            refund: evm.refund,
        });
        self.open = true;
    }

    fn step_end(&mut self, evm: &Evm, error: Option<&EvmError>) {
        if !self.open {
            return;
        }
        if let Some(log) = self.logs.last_mut() {
            log.gas_cost = log.gas.saturating_sub(evm.gas);
            log.error = error.map(ToString::to_string);
        }
    }
}

fn word_hex(v: U256) -> String {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    hex::encode(buf)
}

/// Gas charged before the first instruction runs.
pub fn intrinsic_gas(data: &[u8], is_create: bool) -> u64 {
    let base = if is_create { TX_GAS_CONTRACT_CREATION } else { TX_GAS };
    let zeros = data.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = data.len() as u64 - zeros;
    let mut gas = base + zeros * TX_DATA_ZERO_GAS + non_zeros * TX_DATA_NON_ZERO_GAS;
    if is_create {
        gas += INIT_CODE_WORD_GAS * ((data.len() as u64 + 31) / 32);
    }
    gas
}

/// Execute `config.transaction` against `config.accounts` and collect its
/// struct logs.
///
/// Only setup problems are errors. Faults inside the EVM end up in the
/// last struct log and mark the result as failed.
pub fn trace_tx(config: &TraceConfig) -> Result<ExecutionResult, TraceError> {
    let tx = &config.transaction;
    if tx.to.is_none() && tx.call_data.len() > MAX_INIT_CODE_SIZE {
        return Err(TraceError::MaxInitCodeSize {
            size: tx.call_data.len(),
            limit: MAX_INIT_CODE_SIZE,
        });
    }
    let required = intrinsic_gas(&tx.call_data, tx.to.is_none());
    if tx.gas_limit < required {
        return Err(TraceError::IntrinsicGas { limit: tx.gas_limit, required });
    }

    let mut world = config.accounts.clone();
    let sender = world.entry(tx.from).or_default();
    let cost = U256::from(tx.gas_limit)
        .checked_mul(tx.gas_price)
        .and_then(|fee| fee.checked_add(tx.value))
        .unwrap_or(U256::MAX);
    if sender.balance < cost {
        return Err(TraceError::InsufficientBalance {
            address: tx.from,
            balance: sender.balance,
            cost,
        });
    }
    let nonce = sender.nonce;
    sender.nonce = nonce.checked_add(1).ok_or(TraceError::NonceOverflow(tx.from))?;
    sender.balance -= tx.value;

    let (address, code, calldata) = match tx.to {
        Some(to) => {
            let code = world.get(&to).map(|a| a.code.clone()).unwrap_or_default();
            (to, code, tx.call_data.clone())
        }
        None => (create_address(tx.from, nonce), tx.call_data.clone(), Vec::new()),
    };
    let recipient = world.entry(address).or_default();
    recipient.balance = recipient.balance.overflowing_add(tx.value).0;

    debug!(
        from = ?tx.from,
        to = ?address,
        gas_limit = tx.gas_limit,
        code_len = code.len(),
        "tracing transaction"
    );

    let mut evm = Evm::new(
        code,
        EvmConfig {
            gas_limit: tx.gas_limit - required,
            calldata,
            address,
            caller: tx.from,
            origin: tx.from,
            value: tx.value,
            gas_price: tx.gas_price,
            chain_id: config.chain_id,
            block: config.block_constants.clone(),
            world,
        },
    );
    let mut logger = StructLogger::new(config.logger_config.clone());
    let outcome = evm.run_with(&mut logger);

    let (failed, gas_left) = match (&outcome, evm.halted) {
        (Err(_), _) => (true, 0),
        (Ok(()), Some(Halt::Revert)) => (true, evm.gas),
        (Ok(()), _) if tx.to.is_none() => {
            // the returned runtime code has to be valid and paid for
            let code = &evm.return_data;
            let deposit = CREATE_DATA_GAS * code.len() as u64;
            match evm.gas.checked_sub(deposit) {
                Some(left) if code.len() <= MAX_CODE_SIZE && code.first() != Some(&0xef) => {
                    (false, left)
                }
                _ => (true, 0),
            }
        }
        (Ok(()), _) => (false, evm.gas),
    };

    let mut used = tx.gas_limit - gas_left;
    if !failed {
        used -= evm.refund.min(used / MAX_REFUND_QUOTIENT);
    }

    let struct_logs = logger.into_logs();
    debug!(gas_used = used, failed, steps = struct_logs.len(), "transaction traced");

    Ok(ExecutionResult {
        gas: used,
        failed,
        return_value: hex::encode(&evm.return_data),
        struct_logs,
    })
}

/// Address of a contract created by `from` at `nonce`: the low 20 bytes of
/// keccak256(rlp([from, nonce])).
pub fn create_address(from: H160, nonce: u64) -> H160 {
    let enc_from = rlp_bytes(from.as_bytes());
    let enc_nonce = rlp_u64(nonce);
    let mut rlp = vec![0xc0 + (enc_from.len() + enc_nonce.len()) as u8];
    rlp.extend_from_slice(&enc_from);
    rlp.extend_from_slice(&enc_nonce);
    H160::from_slice(&keccak256(&rlp)[12..])
}

fn rlp_bytes(b: &[u8]) -> Vec<u8> {
    if b.len() == 1 && b[0] < 0x80 {
        return vec![b[0]];
    }
    let mut out = Vec::with_capacity(b.len() + 1);
    out.push(0x80 + b.len() as u8);
    out.extend_from_slice(b);
    out
}

fn rlp_u64(n: u64) -> Vec<u8> {
    let be = n.to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(be.len());
    rlp_bytes(&be[first..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Assembly;
    use crate::types::{Account, Transaction};

    fn call_config(code: Vec<u8>, gas_limit: u64) -> TraceConfig {
        let to = H160::from_low_u64_be(0xff);
        TraceConfig {
            accounts: [(to, Account::with_code(code))].into(),
            transaction: Transaction { to: Some(to), gas_limit, ..Transaction::default() },
            ..TraceConfig::default()
        }
    }

    #[test]
    fn mstore_mload_trace() {
        let code = Assembly::new().mstore(0x40, 0x80).mload(0x40).bytecode();
        let result = trace_tx(&call_config(code, 21_100)).unwrap();

        assert!(!result.failed);
        assert_eq!(result.gas, 21_024);
        let ops: Vec<_> = result.struct_logs.iter().map(|l| l.op.as_str()).collect();
        assert_eq!(ops, ["PUSH1", "PUSH1", "MSTORE", "PUSH1", "MLOAD", "STOP"]);
        let pcs: Vec<_> = result.struct_logs.iter().map(|l| l.pc).collect();
        assert_eq!(pcs, [0, 2, 4, 5, 7, 8]);
        let gas: Vec<_> = result.struct_logs.iter().map(|l| (l.gas, l.gas_cost)).collect();
        assert_eq!(gas, [(100, 3), (97, 3), (94, 12), (82, 3), (79, 3), (76, 0)]);

        let mstore = &result.struct_logs[2];
        assert_eq!(mstore.stack, Some(vec![U256::from(0x80), U256::from(0x40)]));
        assert_eq!(mstore.memory, Some(vec![]));

        let mload = &result.struct_logs[4];
        let memory = mload.memory.as_ref().unwrap();
        assert_eq!(memory.len(), 3);
        assert_eq!(memory[2], format!("{:0>64}", "80"));
        assert_eq!(result.struct_logs[5].stack, Some(vec![U256::from(0x80)]));
        assert!(result.struct_logs.iter().all(|l| l.depth == 1 && l.error.is_none()));
    }

    #[test]
    fn intrinsic_gas_too_low() {
        let err = trace_tx(&call_config(vec![], 20_999)).unwrap_err();
        assert!(matches!(err, TraceError::IntrinsicGas { limit: 20_999, required: 21_000 }));
        assert_eq!(err.to_string(), "intrinsic gas too low: have 20999, want 21000");
    }

    #[test]
    fn intrinsic_gas_counts_call_data() {
        assert_eq!(intrinsic_gas(&[0, 1, 0, 2], false), 21_000 + 2 * 4 + 2 * 16);
        assert_eq!(intrinsic_gas(&[], true), 53_000);
        // creation also pays 2 per word of init code
        assert_eq!(intrinsic_gas(&[1; 33], true), 53_000 + 33 * 16 + 2 * 2);
    }

    #[test]
    fn missing_account_runs_empty_code() {
        let mut cfg = call_config(vec![], 21_000);
        cfg.accounts.clear();
        let result = trace_tx(&cfg).unwrap();
        assert_eq!(result.struct_logs.len(), 1);
        assert_eq!(result.struct_logs[0].op, "STOP");
        assert_eq!(result.gas, 21_000);
    }

    #[test]
    fn out_of_gas_fails_and_consumes_everything() {
        let code = Assembly::new().mstore(0x40, 0x80).mload(0x40).bytecode();
        let result = trace_tx(&call_config(code, 21_010)).unwrap();
        assert!(result.failed);
        assert_eq!(result.gas, 21_010);
        let last = result.struct_logs.last().unwrap();
        assert_eq!(last.op, "MSTORE");
        assert_eq!(last.error.as_deref(), Some("out of gas"));
    }

    #[test]
    fn invalid_opcode_is_named() {
        let result = trace_tx(&call_config(vec![0x0c], 21_100)).unwrap();
        assert!(result.failed);
        assert_eq!(result.struct_logs[0].op, "opcode 0xc not defined");
        assert_eq!(
            result.struct_logs[0].error.as_deref(),
            Some("invalid opcode: opcode 0xc not defined")
        );
    }

    #[test]
    fn unsupported_call_is_reported_by_name() {
        let result = trace_tx(&call_config(vec![opcodes::CALL], 21_100)).unwrap();
        assert!(result.failed);
        assert_eq!(result.struct_logs[0].op, "CALL");
        assert_eq!(result.struct_logs[0].error.as_deref(), Some("invalid opcode: CALL"));
    }

    #[test]
    fn stack_underflow_wins_over_out_of_gas() {
        // POP on an empty stack with no gas left after the intrinsic charge
        let result = trace_tx(&call_config(vec![opcodes::POP], 21_000)).unwrap();
        assert!(result.failed);
        assert_eq!(result.struct_logs[0].error.as_deref(), Some("stack underflow"));
    }

    #[test]
    fn revert_keeps_unused_gas() {
        // PUSH0 PUSH0 REVERT
        let result = trace_tx(&call_config(vec![0x5f, 0x5f, 0xfd], 21_100)).unwrap();
        assert!(result.failed);
        assert_eq!(result.gas, 21_004);
    }

    #[test]
    fn logger_options_and_limit() {
        let code = Assembly::new().mstore(0x40, 0x80).mload(0x40).bytecode();
        let mut cfg = call_config(code, 21_100);
        cfg.logger_config = LoggerConfig {
            enable_memory: false,
            disable_stack: true,
            disable_storage: true,
            limit: 2,
        };
        let result = trace_tx(&cfg).unwrap();
        assert_eq!(result.struct_logs.len(), 2);
        assert!(result.struct_logs.iter().all(|l| l.stack.is_none() && l.memory.is_none()));
        // the limit only caps logging, execution still completes
        assert_eq!(result.gas, 21_024);
    }

    #[test]
    fn storage_is_reported_on_sload_and_sstore() {
        // PUSH1 0x2a PUSH1 0x01 SSTORE PUSH1 0x01 SLOAD
        let code = hex::decode("602a600155600154").unwrap();
        let result = trace_tx(&call_config(code, 50_000)).unwrap();
        assert!(!result.failed);

        let key = format!("{:0>64}", "1");
        let val = format!("{:0>64}", "2a");
        let sstore = &result.struct_logs[2];
        assert_eq!(sstore.op, "SSTORE");
        assert_eq!(sstore.gas_cost, 22_100);
        assert_eq!(sstore.storage.as_ref().unwrap()[&key], val);
        let sload = &result.struct_logs[4];
        assert_eq!(sload.op, "SLOAD");
        assert_eq!(sload.storage.as_ref().unwrap()[&key], val);
        assert!(result.struct_logs[0].storage.is_none());
    }

    #[test]
    fn value_transfer_needs_funds() {
        let mut cfg = call_config(vec![], 21_000);
        cfg.transaction.value = U256::from(10);
        let err = trace_tx(&cfg).unwrap_err();
        assert!(matches!(err, TraceError::InsufficientBalance { .. }));

        let funded = Account { balance: U256::from(10), ..Account::default() };
        cfg.accounts.insert(H160::zero(), funded);
        assert!(!trace_tx(&cfg).unwrap().failed);
    }

    #[test]
    fn value_credit_to_a_full_balance_wraps() {
        let mut cfg = call_config(vec![], 21_000);
        cfg.transaction.value = U256::one();
        let to = H160::from_low_u64_be(0xff);
        cfg.accounts.get_mut(&to).unwrap().balance = U256::MAX;
        let funded = Account { balance: U256::one(), ..Account::default() };
        cfg.accounts.insert(H160::zero(), funded);
        let result = trace_tx(&cfg).unwrap();
        assert!(!result.failed);
        assert_eq!(result.gas, 21_000);
    }

    #[test]
    fn exhausted_sender_nonce_is_rejected() {
        let mut cfg = call_config(vec![], 21_000);
        let sender = Account { nonce: u64::MAX, ..Account::default() };
        cfg.accounts.insert(H160::zero(), sender);
        let err = trace_tx(&cfg).unwrap_err();
        assert!(matches!(err, TraceError::NonceOverflow(a) if a == H160::zero()));
    }

    #[test]
    fn refund_is_capped_at_a_fifth_of_gas_used() {
        let to = H160::from_low_u64_be(0xff);
        // PUSH0 PUSH1 0x01 SSTORE PUSH0 PUSH1 0x02 SSTORE: clears two slots
        let mut cfg = call_config(hex::decode("5f6001555f600255").unwrap(), 50_000);
        let storage = &mut cfg.accounts.get_mut(&to).unwrap().storage;
        storage.insert(U256::from(1), U256::from(5));
        storage.insert(U256::from(2), U256::from(7));
        let result = trace_tx(&cfg).unwrap();
        assert!(!result.failed);
        // 2 * (PUSH0 + PUSH1 + cold reset) on top of the base cost
        let used = 21_000 + 2 * (2 + 3 + 2100 + 2900);
        assert_eq!(result.struct_logs.last().unwrap().refund, 2 * 4800);
        assert_eq!(result.gas, used - used / 5);
    }

    fn create_config(init: &str, gas_limit: u64) -> TraceConfig {
        TraceConfig {
            transaction: Transaction {
                gas_limit,
                call_data: hex::decode(init).unwrap(),
                ..Transaction::default()
            },
            ..TraceConfig::default()
        }
    }

    #[test]
    fn unpaid_code_deposit_fails_creation() {
        // PUSH2 0x0100 PUSH0 RETURN: 256 bytes of runtime code, 51200 deposit
        let gas_limit = intrinsic_gas(&hex::decode("6101005ff3").unwrap(), true) + 1_000;
        let result = trace_tx(&create_config("6101005ff3", gas_limit)).unwrap();
        assert!(result.failed);
        assert_eq!(result.gas, gas_limit);
        assert!(result.struct_logs.iter().all(|l| l.error.is_none()));
    }

    #[test]
    fn deployed_code_rules() {
        // PUSH1 0xef PUSH0 MSTORE8 PUSH1 0x01 PUSH0 RETURN: code starting with 0xef
        let result = trace_tx(&create_config("60ef5f5360015ff3", 60_000)).unwrap();
        assert!(result.failed);
        assert_eq!(result.gas, 60_000);

        // PUSH2 0x6001 PUSH0 RETURN: one byte over the code size limit
        let result = trace_tx(&create_config("6160015ff3", 6_000_000)).unwrap();
        assert!(result.failed);
        assert_eq!(result.gas, 6_000_000);
    }

    #[test]
    fn oversized_init_code_is_rejected() {
        let mut cfg = create_config("", 30_000_000);
        cfg.transaction.call_data = vec![0; MAX_INIT_CODE_SIZE + 1];
        let err = trace_tx(&cfg).unwrap_err();
        assert!(matches!(err, TraceError::MaxInitCodeSize { size: 49_153, limit: 49_152 }));
    }

    #[test]
    fn creation_runs_init_code() {
        // PUSH1 0x01 PUSH0 MSTORE8 PUSH1 0x01 PUSH0 RETURN: deploys the single byte 0x01
        let init = hex::decode("60015f5360015ff3").unwrap();
        let cfg = TraceConfig {
            transaction: Transaction {
                gas_limit: 60_000,
                call_data: init,
                ..Transaction::default()
            },
            ..TraceConfig::default()
        };
        let result = trace_tx(&cfg).unwrap();
        assert!(!result.failed);
        assert_eq!(result.return_value, "01");
        assert_eq!(result.struct_logs.last().unwrap().op, "RETURN");
    }

    #[test]
    fn create_address_matches_known_vector() {
        let sender = hex::decode("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();
        let from = H160::from_slice(&sender);
        let expected = hex::decode("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap();
        assert_eq!(create_address(from, 0), H160::from_slice(&expected));
    }

    #[test]
    fn struct_log_json_shape() {
        let log = StructLog {
            pc: 7,
            op: "MLOAD".into(),
            gas: 79,
            gas_cost: 3,
            depth: 1,
            error: None,
            stack: Some(vec![U256::from(0x40)]),
            memory: None,
            storage: None,
            refund: 0,
        };
        let v = serde_json::to_value(&log).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "pc": 7, "op": "MLOAD", "gas": 79, "gasCost": 3, "depth": 1, "stack": ["0x40"]
            })
        );
    }
}
