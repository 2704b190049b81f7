use crate::opcodes::{immediate_size, name};

/// One line per instruction: `pc: MNEMONIC [0ximmediate]`.
pub fn disassemble(code: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        let mut line = format!("{:04x}: ", pc);
        match name(op) {
            Some(n) => line.push_str(n),
            None => line.push_str(&format!("0x{:02x}", op)),
        }
        let n = immediate_size(op);
        if n > 0 {
            let start = pc + 1;
            let end = (start + n).min(code.len());
            line.push_str(&format!(" 0x{}", hex::encode(&code[start..end])));
        }
        out.push(line);
        pc += 1 + n;
    }
    out
}
