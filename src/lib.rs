pub mod asm;
pub mod demo;
pub mod disasm;
pub mod logging;
pub mod machine;
pub mod opcodes;
pub mod report;
pub mod tracer;
pub mod types;

pub use asm::Assembly;
pub use machine::{Evm, EvmConfig, EvmError, Halt, Hook};
pub use tracer::{
    trace_tx, ExecutionResult, LocalBackend, StructLog, StructLogger, TraceBackend, TraceError,
};
pub use types::{Account, Accounts, BlockConstants, LoggerConfig, TraceConfig, Transaction};
