//! Builder that turns a short sequence of opcode invocations into bytecode.

use primitive_types::U256;

use crate::opcodes::*;

/// Accumulates bytecode one instruction at a time.
///
/// Operands are pushed in reverse so the first argument of each
/// instruction is on top of the stack when it executes:
///
/// ```
/// use evm_struct_trace::Assembly;
///
/// let code = Assembly::new().mstore(0x40, 0x80).mload(0x40).bytecode();
/// assert_eq!(code, vec![0x60, 0x80, 0x60, 0x40, 0x52, 0x60, 0x40, 0x51]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    code: Vec<u8>,
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `value` with the narrowest PUSHn that fits it.
    pub fn push(mut self, value: impl Into<U256>) -> Self {
        let value = value.into();
        let mut buf = [0u8; 32];
        value.to_big_endian(&mut buf);
        let n = (value.bits() + 7) / 8;
        let n = n.max(1);
        self.code.push(PUSH1 + (n - 1) as u8);
        self.code.extend_from_slice(&buf[32 - n..]);
        self
    }

    /// `MSTORE(offset, value)`: write a 32-byte word at `offset`.
    pub fn mstore(self, offset: impl Into<U256>, value: impl Into<U256>) -> Self {
        self.push(value).push(offset).op(MSTORE)
    }

    /// `MLOAD(offset)`: read the 32-byte word at `offset` onto the stack.
    pub fn mload(self, offset: impl Into<U256>) -> Self {
        self.push(offset).op(MLOAD)
    }

    fn op(mut self, op: u8) -> Self {
        self.code.push(op);
        self
    }

    pub fn bytecode(&self) -> Vec<u8> {
        self.code.clone()
    }
}
