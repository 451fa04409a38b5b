//! Hex formatting for traffic logs and configured payloads

use crate::error::{Error, Result};
use std::fmt::Write;

/// `[0x0F, 0x20]` -> `"0F 20"`
pub fn encode_spaced(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// Parse whitespace-separated hex bytes (`"0f 20 A5"`).
///
/// Tokens longer than two digits hold several bytes, so `"0F20"` also parses.
/// Each token must have an even number of digits.
pub fn parse(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in text.split_whitespace() {
        let decoded = hex::decode(token)
            .map_err(|e| Error::InvalidParameter(format!("bad hex token '{}': {}", token, e)))?;
        bytes.extend_from_slice(&decoded);
    }
    Ok(bytes)
}
