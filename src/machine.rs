use std::collections::{BTreeMap, HashSet};

use primitive_types::{H160, U256, U512};
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};
use tracing::trace;

use crate::opcodes::*;
use crate::types::{Accounts, BlockConstants};

/// Execution environment of a single call frame.
#[derive(Debug, Clone, Default)]
pub struct EvmConfig {
    pub gas_limit: u64,
    pub calldata: Vec<u8>,
    pub address: H160,
    pub caller: H160,
    pub origin: H160,
    pub value: U256,
    pub gas_price: U256,
    pub chain_id: U256,
    pub block: BlockConstants,
    pub world: Accounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvmError {
    #[error("out of gas")]
    OutOfGas,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack limit reached 1024")]
    StackOverflow,
    #[error("invalid jump destination {0}")]
    InvalidJump(usize),
    #[error("invalid opcode: {}", label(*.0))]
    InvalidOpcode(u8),
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,
}

/// Observes the interpreter around every executed instruction.
pub trait Hook {
    /// Called before `op` at `evm.pc` runs, with the pre-state visible.
    fn step(&mut self, _evm: &Evm, _op: u8) {}

    /// Called once the instruction has finished or faulted.
    fn step_end(&mut self, _evm: &Evm, _error: Option<&EvmError>) {}
}

impl Hook for () {}

const STACK_LIMIT: usize = 1024;

const COLD_SLOAD_COST: u64 = 2100;
const COLD_ACCOUNT_ACCESS_COST: u64 = 2600;
const WARM_STORAGE_READ_COST: u64 = 100;
const SSTORE_SET: u64 = 20_000;
const SSTORE_RESET: u64 = 2900;
const SSTORE_CLEARS_REFUND: u64 = 4800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Stop,
    Return,
    Revert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: H160,
    pub topics: Vec<U256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Evm {
    pub pc: usize,
    pub gas: u64,
    pub code: Vec<u8>,
    pub stack: Vec<U256>,
    pub memory: Vec<u8>,
    pub calldata: Vec<u8>,
    pub return_data: Vec<u8>,
    /// Output of the last sub-call. Frames here never call out, so it stays empty.
    last_call_output: Vec<u8>,
    pub halted: Option<Halt>,
    pub logs: Vec<LogEntry>,
    pub refund: u64,
    pub address: H160,
    pub caller: H160,
    pub origin: H160,
    pub callvalue: U256,
    pub gas_price: U256,
    pub chain_id: U256,
    pub block: BlockConstants,
    pub world: Accounts,
    original_storage: BTreeMap<U256, U256>,
    warm_accounts: HashSet<H160>,
    warm_slots: HashSet<U256>,
    jumpdests: HashSet<usize>,
}

impl Evm {
    pub fn new(code: Vec<u8>, cfg: EvmConfig) -> Self {
        let jumpdests = scan_jumpdests(&code);
        let original_storage =
            cfg.world.get(&cfg.address).map(|a| a.storage.clone()).unwrap_or_default();
        let warm_accounts = [cfg.address, cfg.caller, cfg.origin, cfg.block.coinbase].into();
        Self {
            pc: 0,
            gas: cfg.gas_limit,
            code,
            stack: Vec::with_capacity(64),
            memory: Vec::new(),
            calldata: cfg.calldata,
            return_data: Vec::new(),
            last_call_output: Vec::new(),
            halted: None,
            logs: Vec::new(),
            refund: 0,
            address: cfg.address,
            caller: cfg.caller,
            origin: cfg.origin,
            callvalue: cfg.value,
            gas_price: cfg.gas_price,
            chain_id: cfg.chain_id,
            block: cfg.block,
            world: cfg.world,
            original_storage,
            warm_accounts,
            warm_slots: HashSet::new(),
            jumpdests,
        }
    }

    /// The instruction at `pc`; running off the end of the code reads STOP.
    pub fn current_op(&self) -> u8 {
        self.code.get(self.pc).copied().unwrap_or(STOP)
    }

    pub fn run(&mut self) -> Result<(), EvmError> {
        self.run_with(&mut ())
    }

    /// Run until the frame halts, reporting each step to `hook`.
    pub fn run_with<H: Hook>(&mut self, hook: &mut H) -> Result<(), EvmError> {
        while self.halted.is_none() {
            let op = self.current_op();
            hook.step(self, op);
            let res = self.step();
            hook.step_end(self, res.as_ref().err());
            res?;
        }
        Ok(())
    }

    pub fn step(&mut self) -> Result<(), EvmError> {
        let op = self.current_op();
        trace!(pc = self.pc, op = %label(op), gas = self.gas, "executing opcode");
        let (static_gas, pops, pushes) = op_info(op).ok_or(EvmError::InvalidOpcode(op))?;
        // stack shape is checked before any gas is taken
        let depth = self.stack.len();
        if depth < pops {
            return Err(EvmError::StackUnderflow);
        }
        if depth - pops + pushes > STACK_LIMIT {
            return Err(EvmError::StackOverflow);
        }
        self.gas_dec(static_gas)?;
        match op {
            STOP => self.halt(Halt::Stop),

            // Arithmetic
            ADD => self.binop(|a, b| a.overflowing_add(b).0)?,
            MUL => self.binop(|a, b| a.overflowing_mul(b).0)?,
            SUB => self.binop(|a, b| a.overflowing_sub(b).0)?,
            DIV => self.binop(|a, b| if b.is_zero() { U256::zero() } else { a / b })?,
            SDIV => self.binop(|a, b| {
                if b.is_zero() {
                    return U256::zero();
                }
                let q = abs(a) / abs(b);
                if is_negative(a) != is_negative(b) {
                    negate(q)
                } else {
                    q
                }
            })?,
            MOD => self.binop(|a, b| if b.is_zero() { U256::zero() } else { a % b })?,
            SMOD => self.binop(|a, b| {
                if b.is_zero() {
                    return U256::zero();
                }
                let r = abs(a) % abs(b);
                if is_negative(a) {
                    negate(r)
                } else {
                    r
                }
            })?,
            ADDMOD | MULMOD => {
                let a = U512::from(self.pop()?);
                let b = U512::from(self.pop()?);
                let n = self.pop()?;
                let r = if n.is_zero() {
                    U256::zero()
                } else {
                    // the intermediate result may need up to 512 bits
                    let wide = if op == ADDMOD { a + b } else { a * b };
                    U256::try_from(wide % U512::from(n)).unwrap_or_default()
                };
                self.push(r)?;
            }
            EXP => {
                let base = self.pop()?;
                let exponent = self.pop()?;
                self.gas_dec(50 * ((exponent.bits() as u64 + 7) / 8))?;
                self.push(base.overflowing_pow(exponent).0)?;
            }
            SIGNEXTEND => self.binop(|b, x| {
                if b >= U256::from(31) {
                    return x;
                }
                let bit = b.low_u32() as usize * 8 + 7;
                let mask = (U256::one() << (bit + 1)) - U256::one();
                if x.bit(bit) {
                    x | !mask
                } else {
                    x & mask
                }
            })?,

            // Logic/compare
            LT => self.binop(|a, b| bool_word(a < b))?,
            GT => self.binop(|a, b| bool_word(a > b))?,
            SLT => self.binop(|a, b| bool_word(signed_lt(a, b)))?,
            SGT => self.binop(|a, b| bool_word(signed_lt(b, a)))?,
            EQ => self.binop(|a, b| bool_word(a == b))?,
            ISZERO => self.unop(|a| bool_word(a.is_zero()))?,
            AND => self.binop(|a, b| a & b)?,
            OR => self.binop(|a, b| a | b)?,
            XOR => self.binop(|a, b| a ^ b)?,
            NOT => self.unop(|a| !a)?,
            BYTE => self.binop(|i, x| match to_shift(i, 32) {
                Some(i) => U256::from(x.byte(31 - i)),
                None => U256::zero(),
            })?,
            SHL => self.binop(|shift, v| to_shift(shift, 256).map_or(U256::zero(), |s| v << s))?,
            SHR => self.binop(|shift, v| to_shift(shift, 256).map_or(U256::zero(), |s| v >> s))?,
            SAR => self.binop(|shift, v| {
                let fill = if is_negative(v) { U256::MAX } else { U256::zero() };
                match to_shift(shift, 256) {
                    // shift the complement so vacated bits come in as ones
                    Some(s) if is_negative(v) => !(!v >> s),
                    Some(s) => v >> s,
                    None => fill,
                }
            })?,

            SHA3 => {
                let offset = self.pop()?;
                let size = self.pop()?;
                let region = self.expand(offset, size)?;
                if let Some((_, s)) = region {
                    self.gas_dec(6 * words(s))?;
                }
                let data = self.read_memory(region);
                self.push(U256::from_big_endian(&keccak256(&data)))?;
            }

            // Env opcodes
            ADDRESS => self.push(h160_to_u256(self.address))?,
            BALANCE => {
                let addr = u256_to_h160(self.pop()?);
                self.access_account(addr)?;
                let bal = self.world.get(&addr).map(|a| a.balance).unwrap_or_default();
                self.push(bal)?;
            }
            ORIGIN => self.push(h160_to_u256(self.origin))?,
            CALLER => self.push(h160_to_u256(self.caller))?,
            CALLVALUE => self.push(self.callvalue)?,
            CALLDATALOAD => {
                let offset = self.pop()?;
                let mut buf = [0u8; 32];
                if let Some(o) = to_usize(offset) {
                    for (i, b) in buf.iter_mut().enumerate() {
                        *b = self.calldata.get(o.saturating_add(i)).copied().unwrap_or(0);
                    }
                }
                self.push(U256::from_big_endian(&buf))?;
            }
            CALLDATASIZE => self.push(U256::from(self.calldata.len()))?,
            CALLDATACOPY => {
                let src = self.calldata.clone();
                self.copy_to_memory(&src)?;
            }
            CODESIZE => self.push(U256::from(self.code.len()))?,
            CODECOPY => {
                let src = self.code.clone();
                self.copy_to_memory(&src)?;
            }
            GASPRICE => self.push(self.gas_price)?,
            EXTCODESIZE => {
                let addr = u256_to_h160(self.pop()?);
                self.access_account(addr)?;
                let size = self.world.get(&addr).map_or(0, |a| a.code.len());
                self.push(U256::from(size))?;
            }
            EXTCODECOPY => {
                let addr = u256_to_h160(self.pop()?);
                self.access_account(addr)?;
                let src = self.world.get(&addr).map(|a| a.code.clone()).unwrap_or_default();
                self.copy_to_memory(&src)?;
            }
            RETURNDATASIZE => self.push(U256::from(self.last_call_output.len()))?,
            RETURNDATACOPY => {
                let mem_offset = self.pop()?;
                let data_offset = self.pop()?;
                let size = self.pop()?;
                let end = data_offset.checked_add(size);
                if end.map_or(true, |e| e > U256::from(self.last_call_output.len())) {
                    return Err(EvmError::ReturnDataOutOfBounds);
                }
                if let Some((m, s)) = self.expand(mem_offset, size)? {
                    self.gas_dec(3 * words(s))?;
                    let d = data_offset.low_u64() as usize;
                    self.memory[m..m + s].copy_from_slice(&self.last_call_output[d..d + s]);
                }
            }
            EXTCODEHASH => {
                let addr = u256_to_h160(self.pop()?);
                self.access_account(addr)?;
                // accounts that do not exist hash to zero
                let hash = match self.world.get(&addr) {
                    Some(a) if a.nonce != 0 || !a.balance.is_zero() || !a.code.is_empty() => {
                        U256::from_big_endian(&keccak256(&a.code))
                    }
                    _ => U256::zero(),
                };
                self.push(hash)?;
            }

            // Block env
            BLOCKHASH => {
                self.pop()?;
                self.push(U256::zero())?;
            }
            COINBASE => self.push(h160_to_u256(self.block.coinbase))?,
            TIMESTAMP => self.push(U256::from(self.block.timestamp))?,
            NUMBER => self.push(U256::from(self.block.number))?,
            DIFFICULTY => self.push(self.block.difficulty)?,
            GASLIMIT => self.push(self.block.gas_limit)?,
            CHAINID => self.push(self.chain_id)?,
            SELFBALANCE => {
                let bal = self.world.get(&self.address).map(|a| a.balance).unwrap_or_default();
                self.push(bal)?;
            }
            BASEFEE => self.push(self.block.base_fee)?,

            // Stack/Memory/Storage
            POP => {
                self.pop()?;
            }
            MLOAD => {
                let offset = self.pop()?;
                let region = self.expand(offset, U256::from(32))?;
                let word = self.read_memory(region);
                self.push(U256::from_big_endian(&word))?;
            }
            MSTORE => {
                let offset = self.pop()?;
                let val = self.pop()?;
                if let Some((o, _)) = self.expand(offset, U256::from(32))? {
                    val.to_big_endian(&mut self.memory[o..o + 32]);
                }
            }
            MSTORE8 => {
                let offset = self.pop()?;
                let val = self.pop()?;
                if let Some((o, _)) = self.expand(offset, U256::one())? {
                    self.memory[o] = val.byte(0);
                }
            }
            SLOAD => {
                let key = self.pop()?;
                if self.warm_slots.insert(key) {
                    self.gas_dec(COLD_SLOAD_COST)?;
                } else {
                    self.gas_dec(WARM_STORAGE_READ_COST)?;
                }
                let val = self.sload(key);
                self.push(val)?;
            }
            SSTORE => {
                let key = self.pop()?;
                let val = self.pop()?;
                self.sstore_gas(key, val)?;
                self.world.entry(self.address).or_default().storage.insert(key, val);
            }

            // Flow
            JUMP => {
                let dest = self.pop()?;
                self.pc = self.jump_target(dest)?;
                return Ok(());
            }
            JUMPI => {
                let dest = self.pop()?;
                let cond = self.pop()?;
                if !cond.is_zero() {
                    self.pc = self.jump_target(dest)?;
                    return Ok(());
                }
            }
            JUMPDEST => {}

            // Introspection
            PC => self.push(U256::from(self.pc))?,
            MSIZE => self.push(U256::from(self.memory.len()))?,
            GAS => self.push(U256::from(self.gas))?,

            PUSH0 => self.push(U256::zero())?,
            PUSH1..=PUSH32 => {
                let n = immediate_size(op);
                let start = (self.pc + 1).min(self.code.len());
                let end = (start + n).min(self.code.len());
                // immediates cut short by the end of code are zero-padded on the right
                let mut buf = [0u8; 32];
                buf[32 - n..32 - n + (end - start)].copy_from_slice(&self.code[start..end]);
                self.push(U256::from_big_endian(&buf))?;
                self.pc += 1 + n;
                return Ok(());
            }
            DUP1..=DUP16 => {
                let n = (op - DUP1 + 1) as usize;
                let val = self.stack[self.stack.len() - n];
                self.push(val)?;
            }
            SWAP1..=SWAP16 => {
                let n = (op - SWAP1 + 1) as usize;
                let top = self.stack.len() - 1;
                self.stack.swap(top, top - n);
            }

            LOG0..=LOG4 => {
                let n = (op - LOG0) as usize;
                let offset = self.pop()?;
                let size = self.pop()?;
                let mut topics = Vec::with_capacity(n);
                for _ in 0..n {
                    topics.push(self.pop()?);
                }
                let region = self.expand(offset, size)?;
                self.gas_dec(375 * n as u64 + 8 * region.map_or(0, |(_, s)| s as u64))?;
                let data = self.read_memory(region);
                self.logs.push(LogEntry { address: self.address, topics, data });
            }

            RETURN | REVERT => {
                let offset = self.pop()?;
                let size = self.pop()?;
                let region = self.expand(offset, size)?;
                self.return_data = self.read_memory(region);
                self.halt(if op == RETURN { Halt::Return } else { Halt::Revert });
            }

            _ => return Err(EvmError::InvalidOpcode(op)),
        }
        if self.halted.is_none() {
            self.pc += 1;
        }
        Ok(())
    }

    fn halt(&mut self, how: Halt) {
        self.halted = Some(how);
    }

    fn push(&mut self, v: U256) -> Result<(), EvmError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(EvmError::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<U256, EvmError> {
        self.stack.pop().ok_or(EvmError::StackUnderflow)
    }

    fn binop<F: Fn(U256, U256) -> U256>(&mut self, f: F) -> Result<(), EvmError> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(f(a, b))
    }

    fn unop<F: Fn(U256) -> U256>(&mut self, f: F) -> Result<(), EvmError> {
        let a = self.pop()?;
        self.push(f(a))
    }

    fn gas_dec(&mut self, amount: u64) -> Result<(), EvmError> {
        self.gas = self.gas.checked_sub(amount).ok_or(EvmError::OutOfGas)?;
        Ok(())
    }

    /// Charge for and grow memory to cover `size` bytes at `offset`.
    /// Returns `None` for an empty region, which touches nothing.
    fn expand(&mut self, offset: U256, size: U256) -> Result<Option<(usize, usize)>, EvmError> {
        if size.is_zero() {
            return Ok(None);
        }
        let (o, s) = match (to_usize(offset), to_usize(size)) {
            (Some(o), Some(s)) => (o, s),
            _ => return Err(EvmError::OutOfGas),
        };
        let end = o.checked_add(s).ok_or(EvmError::OutOfGas)?;
        let before = words(self.memory.len());
        let after = words(end);
        if after > before {
            self.gas_dec(mem_cost(after) - mem_cost(before))?;
            self.memory.resize(after as usize * 32, 0u8);
        }
        Ok(Some((o, s)))
    }

    /// EIP-2929 account access charge.
    fn access_account(&mut self, addr: H160) -> Result<(), EvmError> {
        if self.warm_accounts.insert(addr) {
            self.gas_dec(COLD_ACCOUNT_ACCESS_COST)
        } else {
            self.gas_dec(WARM_STORAGE_READ_COST)
        }
    }

    fn read_memory(&self, region: Option<(usize, usize)>) -> Vec<u8> {
        region.map(|(o, s)| self.memory[o..o + s].to_vec()).unwrap_or_default()
    }

    /// Shared body of CALLDATACOPY, CODECOPY and EXTCODECOPY.
    fn copy_to_memory(&mut self, src: &[u8]) -> Result<(), EvmError> {
        let mem_offset = self.pop()?;
        let src_offset = self.pop()?;
        let size = self.pop()?;
        let Some((m, s)) = self.expand(mem_offset, size)? else {
            return Ok(());
        };
        self.gas_dec(3 * words(s))?;
        let from = to_usize(src_offset);
        for i in 0..s {
            let b = from.and_then(|f| src.get(f.checked_add(i)?)).copied().unwrap_or(0);
            self.memory[m + i] = b;
        }
        Ok(())
    }

    fn jump_target(&self, dest: U256) -> Result<usize, EvmError> {
        match to_usize(dest) {
            Some(d) if self.jumpdests.contains(&d) => Ok(d),
            Some(d) => Err(EvmError::InvalidJump(d)),
            None => Err(EvmError::InvalidJump(usize::MAX)),
        }
    }

    pub fn sload(&self, key: U256) -> U256 {
        self.world
            .get(&self.address)
            .and_then(|acc| acc.storage.get(&key))
            .copied()
            .unwrap_or_default()
    }

    /// SSTORE pricing with warm/cold slots and clearing refunds.
    fn sstore_gas(&mut self, key: U256, val: U256) -> Result<(), EvmError> {
        // a frame must keep the call stipend to write storage
        if self.gas <= 2300 {
            return Err(EvmError::OutOfGas);
        }
        let mut cost = 0;
        if self.warm_slots.insert(key) {
            cost += COLD_SLOAD_COST;
        }
        let current = self.sload(key);
        let original = self.original_storage.get(&key).copied().unwrap_or_default();
        cost += if current == val || original != current {
            WARM_STORAGE_READ_COST
        } else if original.is_zero() {
            SSTORE_SET
        } else {
            SSTORE_RESET
        };
        if !original.is_zero() && original == current && val.is_zero() {
            self.refund += SSTORE_CLEARS_REFUND;
        }
        self.gas_dec(cost)
    }
}

/// Static gas, stack items taken and stack items left for `op`, or `None`
/// when the byte is not an instruction this interpreter runs.
fn op_info(op: u8) -> Option<(u64, usize, usize)> {
    let info = match op {
        STOP => (0, 0, 0),
        RETURN | REVERT => (0, 2, 0),
        JUMPDEST => (1, 0, 0),
        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE
        | RETURNDATASIZE | COINBASE | TIMESTAMP | NUMBER | DIFFICULTY | GASLIMIT | CHAINID
        | BASEFEE | PC | MSIZE | GAS | PUSH0 => (2, 0, 1),
        POP => (2, 1, 0),
        ADD | SUB | LT | GT | SLT | SGT | EQ | AND | OR | XOR | BYTE | SHL | SHR | SAR => (3, 2, 1),
        ISZERO | NOT | CALLDATALOAD | MLOAD => (3, 1, 1),
        CALLDATACOPY | CODECOPY | RETURNDATACOPY => (3, 3, 0),
        MSTORE | MSTORE8 => (3, 2, 0),
        PUSH1..=PUSH32 => (3, 0, 1),
        DUP1..=DUP16 => {
            let n = (op - DUP1 + 1) as usize;
            (3, n, n + 1)
        }
        SWAP1..=SWAP16 => {
            let n = (op - SWAP1 + 2) as usize;
            (3, n, n)
        }
        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND => (5, 2, 1),
        SELFBALANCE => (5, 0, 1),
        ADDMOD | MULMOD => (8, 3, 1),
        JUMP => (8, 1, 0),
        EXP => (10, 2, 1),
        JUMPI => (10, 2, 0),
        BLOCKHASH => (20, 1, 1),
        SHA3 => (30, 2, 1),
        // priced by access lists and storage state
        BALANCE | EXTCODESIZE | EXTCODEHASH | SLOAD => (0, 1, 1),
        EXTCODECOPY => (0, 4, 0),
        SSTORE => (0, 2, 0),
        LOG0..=LOG4 => (375, (op - LOG0) as usize + 2, 0),
        _ => return None,
    };
    Some(info)
}

fn scan_jumpdests(code: &[u8]) -> HashSet<usize> {
    let mut set = HashSet::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        if op == JUMPDEST {
            set.insert(pc);
        }
        pc += 1 + immediate_size(op);
    }
    set
}

fn bool_word(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}

/// `v` as a shift amount or byte index, `None` once it reaches `limit`.
fn to_shift(v: U256, limit: u32) -> Option<usize> {
    (v < U256::from(limit)).then(|| v.low_u32() as usize)
}

fn is_negative(v: U256) -> bool {
    v.bit(255)
}

/// Two's complement negation.
fn negate(v: U256) -> U256 {
    (!v).overflowing_add(U256::one()).0
}

fn abs(v: U256) -> U256 {
    if is_negative(v) {
        negate(v)
    } else {
        v
    }
}

fn signed_lt(a: U256, b: U256) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

/// Memory offsets past 4 GiB can never be paid for.
fn to_usize(v: U256) -> Option<usize> {
    if v > U256::from(u32::MAX) {
        None
    } else {
        Some(v.low_u64() as usize)
    }
}

pub(crate) fn h160_to_u256(a: H160) -> U256 {
    U256::from_big_endian(a.as_bytes())
}

pub(crate) fn u256_to_h160(v: U256) -> H160 {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    H160::from_slice(&buf[12..])
}

pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

fn words(size: usize) -> u64 {
    (size as u64 + 31) / 32
}

fn mem_cost(words: u64) -> u64 {
    3 * words + (words * words) / 512
}
