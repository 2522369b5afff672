//! Hex text helpers used by logging, demo data and the CLI.

use std::fmt::Write;

use crate::error::{FrameError, Result};

/// Uppercase, space-separated hex: `AA D6 EA 01 00 AB`.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().saturating_mul(3));
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}

/// Parse hex bytes separated by whitespace or commas.
///
/// Tokens may carry a `0x` prefix; a token longer than two digits is read
/// as consecutive byte pairs.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for token in text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.is_empty() || !digits.is_ascii() {
            return Err(FrameError::InvalidHex(token.to_string()));
        }
        if digits.len() <= 2 {
            out.push(parse_byte(digits, token)?);
            continue;
        }
        if digits.len() % 2 != 0 {
            return Err(FrameError::InvalidHex(token.to_string()));
        }
        for pair in digits.as_bytes().chunks(2) {
            // chunks of an ASCII str are valid UTF-8
            let pair = std::str::from_utf8(pair)
                .map_err(|_| FrameError::InvalidHex(token.to_string()))?;
            out.push(parse_byte(pair, token)?);
        }
    }
    Ok(out)
}

fn parse_byte(digits: &str, token: &str) -> Result<u8> {
    u8::from_str_radix(digits, 16).map_err(|_| FrameError::InvalidHex(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_spaced_uppercase() {
        assert_eq!(encode(&[0xAA, 0x0d, 0xE6]), "AA 0D E6");
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn decode_accepts_common_forms() {
        assert_eq!(decode("aa d6 0xEA,01").unwrap(), vec![0xAA, 0xD6, 0xEA, 0x01]);
        assert_eq!(decode("AAD6EA").unwrap(), vec![0xAA, 0xD6, 0xEA]);
        assert_eq!(decode("  7f\n7F ").unwrap(), vec![0x7F, 0x7F]);
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode("zz"), Err(FrameError::InvalidHex(_))));
        assert!(matches!(decode("ABC"), Err(FrameError::InvalidHex(_))));
        assert!(matches!(decode("0x"), Err(FrameError::InvalidHex(_))));
    }
}
