//! Text rendering of struct logs.

use std::io::Write;

use crate::tracer::StructLog;

/// Write `logs` as a JSON array indented by two spaces, newline terminated.
///
/// The whole document is rendered before anything is written, so a
/// serialization failure leaves `out` untouched.
pub fn write_struct_logs<W: Write>(logs: &[StructLog], mut out: W) -> serde_json::Result<()> {
    let mut buf = serde_json::to_vec_pretty(logs)?;
    buf.push(b'\n');
    out.write_all(&buf).map_err(serde_json::Error::io)?;
    out.flush().map_err(serde_json::Error::io)
}

pub fn parse_struct_logs(text: &str) -> serde_json::Result<Vec<StructLog>> {
    serde_json::from_str(text)
}
