//! The MSTORE/MLOAD walkthrough: assemble two instructions, deploy them at
//! `0x..ff`, trace a call to them and print the struct logs.
//!
//! Neither a failed trace nor a failed render stops the program; each is
//! reported as one line on the error stream and the program carries on.

use std::io::Write;

use primitive_types::H160;
use thiserror::Error;
use tracing::{debug, warn};

use crate::asm::Assembly;
use crate::report::write_struct_logs;
use crate::tracer::{TraceBackend, TraceError};
use crate::types::{Account, TraceConfig, Transaction};

pub const GAS_LIMIT: u64 = 21_100;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to trace tx, err: {0}")]
    TraceFailure(#[from] TraceError),
    #[error("failed to marshal logs, err: {0}")]
    SerializationFailure(#[from] serde_json::Error),
}

pub fn contract_address() -> H160 {
    H160::from_low_u64_be(0xff)
}

pub fn bytecode() -> Vec<u8> {
    Assembly::new().mstore(0x40, 0x80).mload(0x40).bytecode()
}

pub fn mstore_mload_config() -> TraceConfig {
    let address = contract_address();
    TraceConfig {
        accounts: [(address, Account::with_code(bytecode()))].into(),
        transaction: Transaction {
            to: Some(address),
            gas_limit: GAS_LIMIT,
            ..Transaction::default()
        },
        ..TraceConfig::default()
    }
}

/// Trace the example with `backend`, writing the logs to `out` and
/// diagnostics to `err`.
pub fn run<B, O, E>(backend: &B, out: &mut O, err: &mut E)
where
    B: TraceBackend + ?Sized,
    O: Write,
    E: Write,
{
    let config = mstore_mload_config();
    debug!(address = ?contract_address(), gas_limit = GAS_LIMIT, "running mstore/mload example");

    let logs = match backend.trace_tx(&config) {
        Ok(result) => result.struct_logs,
        Err(e) => {
            report(err, Error::from(e));
            Vec::new()
        }
    };

    if let Err(e) = write_struct_logs(&logs, out) {
        report(err, Error::from(e));
    }
}

fn report<E: Write>(err: &mut E, e: Error) {
    if let Err(io) = writeln!(err, "{e}") {
        warn!(error = %io, "could not write diagnostic");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::parse_struct_logs;
    use crate::tracer::{ExecutionResult, LocalBackend};

    struct Failing;

    impl TraceBackend for Failing {
        fn trace_tx(&self, _: &TraceConfig) -> Result<ExecutionResult, TraceError> {
            Err(TraceError::Backend("evm unavailable".into()))
        }
    }

    /// Returns a canned result regardless of the input.
    struct Canned(ExecutionResult);

    impl TraceBackend for Canned {
        fn trace_tx(&self, _: &TraceConfig) -> Result<ExecutionResult, TraceError> {
            Ok(self.0.clone())
        }
    }

    fn run_to_strings<B: TraceBackend>(backend: &B) -> (String, String) {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        run(backend, &mut out, &mut err);
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[test]
    fn fixed_inputs() {
        let cfg = mstore_mload_config();
        assert_eq!(cfg.transaction.to, Some(contract_address()));
        assert_eq!(cfg.transaction.gas_limit, 21_100);
        assert_eq!(hex::encode(&cfg.accounts[&contract_address()].code), "6080604052604051");
        assert_eq!(
            format!("{:?}", contract_address()),
            "0x00000000000000000000000000000000000000ff"
        );
    }

    #[test]
    fn local_backend_prints_one_log_per_step() {
        let (out, err) = run_to_strings(&LocalBackend);
        assert!(err.is_empty(), "{err}");
        let logs = parse_struct_logs(&out).unwrap();
        assert!(logs.len() >= 2);
        assert_eq!(logs[2].op, "MSTORE");
        assert_eq!(logs[4].op, "MLOAD");
    }

    #[test]
    fn failing_backend_reports_once_and_prints_empty_logs() {
        let (out, err) = run_to_strings(&Failing);
        assert_eq!(out, "[]\n");
        assert_eq!(err.lines().count(), 1);
        assert_eq!(err, "failed to trace tx, err: evm unavailable\n");
    }

    #[test]
    fn canned_result_is_printed_verbatim() {
        let result = LocalBackend.trace_tx(&mstore_mload_config()).unwrap();
        let (out, err) = run_to_strings(&Canned(result.clone()));
        assert!(err.is_empty());
        assert_eq!(parse_struct_logs(&out).unwrap(), result.struct_logs);
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unwritable_output_is_reported() {
        let mut err = Vec::new();
        run(&LocalBackend, &mut Closed, &mut err);
        let err = String::from_utf8(err).unwrap();
        assert_eq!(err.lines().count(), 1);
        assert!(err.starts_with("failed to marshal logs, err: "), "{err}");
    }
}
