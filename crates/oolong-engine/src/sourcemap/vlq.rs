//! Base64 variable-length quantities
//!
//! Each value is zig-zag folded (sign in the low bit), then emitted as base64 digits of
//! five payload bits each, least significant first, with bit 5 as continuation.

use thiserror::Error;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const CONTINUATION: u64 = 0x20;
const PAYLOAD_MASK: u64 = 0x1F;

/// Errors from decoding a VLQ string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VlqError {
    /// A byte outside the base64 alphabet
    #[error("Invalid base64 character '{ch}' at offset {offset}")]
    InvalidCharacter {
        /// Offending character
        ch: char,
        /// Byte offset in the input
        offset: usize,
    },

    /// Input ended inside a value
    #[error("Unexpected end of VLQ value at offset {0}")]
    UnexpectedEnd(usize),

    /// Value wider than 63 bits
    #[error("VLQ value overflows at offset {0}")]
    Overflow(usize),

    /// An accumulated mapping field is negative or wider than 32 bits
    #[error("Mapping field out of range at offset {0}")]
    OutOfRange(usize),

    /// A segment names a source the map does not list
    #[error("Source index {index} out of bounds ({count} sources)")]
    UnknownSource {
        /// Decoded index
        index: u32,
        /// Length of `sources`
        count: usize,
    },
}

/// Append the VLQ encoding of `value` to `out`.
pub fn encode(value: i64, out: &mut String) {
    let mut folded = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = folded & PAYLOAD_MASK;
        folded >>= 5;
        if folded != 0 {
            digit |= CONTINUATION;
        }
        out.push(BASE64[digit as usize] as char);
        if folded == 0 {
            return;
        }
    }
}

fn digit_value(byte: u8) -> Option<u64> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(u64::from(value))
}

/// Decode one value starting at `*offset`, advancing the offset past it.
pub fn decode(input: &[u8], offset: &mut usize) -> Result<i64, VlqError> {
    let mut folded: u64 = 0;
    let mut shift = 0u32;
    loop {
        let Some(&byte) = input.get(*offset) else {
            return Err(VlqError::UnexpectedEnd(*offset));
        };
        let digit = digit_value(byte).ok_or(VlqError::InvalidCharacter {
            ch: byte as char,
            offset: *offset,
        })?;
        if shift > 60 {
            return Err(VlqError::Overflow(*offset));
        }
        folded |= (digit & PAYLOAD_MASK) << shift;
        shift += 5;
        *offset += 1;
        if digit & CONTINUATION == 0 {
            break;
        }
    }
    let magnitude = (folded >> 1) as i64;
    Ok(if folded & 1 == 1 { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: i64) -> String {
        let mut out = String::new();
        encode(value, &mut out);
        out
    }

    #[test]
    fn test_small_values() {
        assert_eq!(encoded(0), "A");
        assert_eq!(encoded(1), "C");
        assert_eq!(encoded(-1), "D");
        assert_eq!(encoded(15), "e");
        assert_eq!(encoded(16), "gB");
        assert_eq!(encoded(-16), "hB");
    }

    #[test]
    fn test_decode_sequence() {
        let input = b"AACAgB";
        let mut offset = 0;
        let mut values = Vec::new();
        while offset < input.len() {
            values.push(decode(input, &mut offset).expect("valid vlq"));
        }
        assert_eq!(values, vec![0, 0, 1, 0, 16]);
    }

    #[test]
    fn test_decode_errors() {
        let mut offset = 0;
        assert_eq!(
            decode(b"!", &mut offset),
            Err(VlqError::InvalidCharacter { ch: '!', offset: 0 })
        );
        let mut offset = 0;
        assert_eq!(decode(b"g", &mut offset), Err(VlqError::UnexpectedEnd(1)));
    }
}
