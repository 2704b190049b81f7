use clap::{Parser, Subcommand};
use evm_struct_trace::{
    demo, disasm, logging, report, trace_tx, Account, TraceConfig, Transaction,
};
use primitive_types::{H160, U256};

#[derive(Debug, Parser)]
#[command(name = "evm", about = "Assemble, disassemble and trace EVM bytecode")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Execute bytecode in a call transaction and print its struct logs
    Trace {
        /// Hex bytecode (e.g., 0x6080604052) or @file; replaces the code at the --config target
        code: Option<String>,
        /// JSON trace config (accounts, transaction, block constants)
        #[arg(long)]
        config: Option<String>,
        /// Transaction gas limit, intrinsic gas included
        #[arg(long, default_value_t = demo::GAS_LIMIT, conflicts_with = "config")]
        gas: u64,
        /// Contract address (0x..)
        #[arg(long, value_parser = parse_h160, conflicts_with = "config")]
        address: Option<H160>,
        /// Calldata as hex
        #[arg(long, default_value = "0x", conflicts_with = "config")]
        calldata: String,
        /// Call value (0x.. or decimal), credited to the zero-address sender first
        #[arg(long, value_parser = parse_u256, default_value = "0", conflicts_with = "config")]
        value: U256,
        /// Leave the stack out of each log
        #[arg(long)]
        disable_stack: bool,
        /// Leave memory out of each log
        #[arg(long)]
        disable_memory: bool,
        /// Leave storage out of each log
        #[arg(long)]
        disable_storage: bool,
        /// Print the whole execution result instead of just the logs
        #[arg(long)]
        full: bool,
    },
    /// Disassemble bytecode
    Disasm {
        /// Hex bytecode or @file
        code: String,
    },
    /// Print the bytecode of the MSTORE/MLOAD example
    Example,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Trace {
            code,
            config,
            gas,
            address,
            calldata,
            value,
            disable_stack,
            disable_memory,
            disable_storage,
            full,
        } => {
            let from_file = config.is_some();
            let mut cfg = match config {
                Some(path) => load_config(&path),
                None => {
                    let address = address.unwrap_or_else(demo::contract_address);
                    let call_data =
                        parse_bytes(&calldata).unwrap_or_else(|_| die("Invalid calldata hex"));
                    // gas is free here, so the sender only needs the value it sends
                    let sender = Account { balance: value, ..Account::default() };
                    TraceConfig {
                        accounts: [(H160::zero(), sender)].into(),
                        transaction: Transaction {
                            to: Some(address),
                            gas_limit: gas,
                            call_data,
                            value,
                            ..Transaction::default()
                        },
                        ..TraceConfig::default()
                    }
                }
            };
            if let Some(code) = code {
                let target = cfg.transaction.to.unwrap_or_else(|| {
                    die("--config describes a contract creation; drop the code argument")
                });
                cfg.accounts.entry(target).or_default().code = read_code_arg(&code);
            } else if !from_file {
                die("nothing to trace: pass bytecode or --config");
            }
            let logger = &mut cfg.logger_config;
            logger.disable_stack |= disable_stack;
            logger.disable_storage |= disable_storage;
            logger.enable_memory &= !disable_memory;
            trace_cmd(&cfg, full)
        }
        Cmd::Disasm { code } => disasm_cmd(&code),
        Cmd::Example => println!("0x{}", hex::encode(demo::bytecode())),
    }
}

fn trace_cmd(cfg: &TraceConfig, full: bool) {
    let result = trace_tx(cfg).unwrap_or_else(|e| die(&format!("failed to trace tx, err: {e}")));
    let stdout = std::io::stdout();
    let written = if full {
        serde_json::to_writer_pretty(stdout.lock(), &result).map(|()| println!())
    } else {
        report::write_struct_logs(&result.struct_logs, stdout.lock())
    };
    if let Err(e) = written {
        die(&format!("failed to marshal logs, err: {e}"));
    }
}

fn disasm_cmd(code_arg: &str) {
    let code = read_code_arg(code_arg);
    for line in disasm::disassemble(&code) {
        println!("{}", line);
    }
}

fn load_config(path: &str) -> TraceConfig {
    let txt = std::fs::read_to_string(path).unwrap_or_else(|e| die(&format!("read config: {e}")));
    serde_json::from_str(&txt).unwrap_or_else(|e| die(&format!("parse config json: {e}")))
}

fn read_code_arg(arg: &str) -> Vec<u8> {
    if let Some(rest) = arg.strip_prefix('@') {
        std::fs::read(rest).unwrap_or_else(|e| die(&format!("Failed to read file: {e}")))
    } else {
        parse_bytes(arg).unwrap_or_else(|_| die("Invalid code hex"))
    }
}

fn parse_bytes(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s.trim();
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

fn parse_h160(s: &str) -> Result<H160, String> {
    let b = parse_bytes(s).map_err(|e| e.to_string())?;
    if b.len() != 20 {
        return Err(format!("expected 20 bytes, got {}", b.len()));
    }
    Ok(H160::from_slice(&b))
}

fn parse_u256(s: &str) -> Result<U256, String> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(s).map_err(|e| e.to_string()),
    }
}

fn die(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}
