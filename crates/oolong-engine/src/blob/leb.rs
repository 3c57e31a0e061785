//! LEB128 variable-length integers
//!
//! Unsigned values are split into 7-bit groups, least significant first, with the high bit
//! of every byte except the last set. Signed values use the same layout but stop once the
//! remaining bits are pure sign extension of bit 6 of the last byte.

use thiserror::Error;

/// Widest padded encoding of a 32-bit value.
pub const MAX_LEB32_LEN: usize = 5;

/// Errors that can occur while decoding a LEB128 value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LebError {
    /// Input ended before the terminating byte
    #[error("Unexpected end of LEB128 value at offset {0}")]
    UnexpectedEnd(usize),

    /// Value does not fit the requested width
    #[error("LEB128 value overflows {bits} bits at offset {offset}")]
    Overflow {
        /// Target width in bits
        bits: u32,
        /// Offset of the offending byte
        offset: usize,
    },
}

/// Encode an unsigned value, feeding each byte to `emit`.
pub fn encode_unsigned(mut value: u64, mut emit: impl FnMut(u8)) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            emit(byte);
            return;
        }
        emit(byte | 0x80);
    }
}

/// Encode a signed value, feeding each byte to `emit`.
pub fn encode_signed(mut value: i64, mut emit: impl FnMut(u8)) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            emit(byte);
            return;
        }
        emit(byte | 0x80);
    }
}

/// Encode an unsigned 32-bit value using exactly [`MAX_LEB32_LEN`] bytes.
///
/// Padded encodings are valid LEB128 and let a reserved slot be backpatched in place.
pub fn encode_padded(value: u32, mut emit: impl FnMut(u8)) {
    let mut value = value;
    for i in 0..MAX_LEB32_LEN {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if i + 1 == MAX_LEB32_LEN {
            emit(byte);
        } else {
            emit(byte | 0x80);
        }
    }
}

/// Number of bytes the minimal unsigned encoding of `value` takes.
pub fn unsigned_len(value: u64) -> usize {
    let mut len = 0;
    encode_unsigned(value, |_| len += 1);
    len
}

/// Decode an unsigned value of at most `bits` bits. Returns the value and bytes consumed.
pub fn decode_unsigned(bytes: &[u8], bits: u32) -> Result<(u64, usize), LebError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    for (offset, &byte) in bytes.iter().enumerate() {
        let payload = u64::from(byte & 0x7F);
        if shift >= bits || (bits - shift < 7 && payload >> (bits - shift) != 0) {
            return Err(LebError::Overflow { bits, offset });
        }
        result |= payload << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((result, offset + 1));
        }
    }
    Err(LebError::UnexpectedEnd(bytes.len()))
}

/// Decode a signed value of at most `bits` bits. Returns the value and bytes consumed.
pub fn decode_signed(bytes: &[u8], bits: u32) -> Result<(i64, usize), LebError> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    for (offset, &byte) in bytes.iter().enumerate() {
        if shift >= bits {
            return Err(LebError::Overflow { bits, offset });
        }
        result |= i64::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if result < min || result > max {
                    return Err(LebError::Overflow { bits, offset });
                }
            }
            return Ok((result, offset + 1));
        }
    }
    Err(LebError::UnexpectedEnd(bytes.len()))
}

/// Decode an unsigned 32-bit value.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize), LebError> {
    decode_unsigned(bytes, 32).map(|(value, len)| (value as u32, len))
}

/// Decode a signed 32-bit value.
pub fn decode_i32(bytes: &[u8]) -> Result<(i32, usize), LebError> {
    decode_signed(bytes, 32).map(|(value, len)| (value as i32, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_unsigned(value, |b| out.push(b));
        out
    }

    fn signed(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_signed(value, |b| out.push(b));
        out
    }

    #[test]
    fn test_known_unsigned_encodings() {
        assert_eq!(unsigned(0), vec![0x00]);
        assert_eq!(unsigned(127), vec![0x7F]);
        assert_eq!(unsigned(128), vec![0x80, 0x01]);
        assert_eq!(unsigned(624_485), vec![0xE5, 0x8E, 0x26]);
        assert_eq!(unsigned(u32::MAX as u64), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_known_signed_encodings() {
        assert_eq!(signed(0), vec![0x00]);
        assert_eq!(signed(-1), vec![0x7F]);
        assert_eq!(signed(63), vec![0x3F]);
        assert_eq!(signed(64), vec![0xC0, 0x00]);
        assert_eq!(signed(-64), vec![0x40]);
        assert_eq!(signed(-65), vec![0xBF, 0x7F]);
        assert_eq!(signed(-123_456), vec![0xC0, 0xBB, 0x78]);
    }

    #[test]
    fn test_padded_encoding_decodes_to_same_value() {
        let mut out = Vec::new();
        encode_padded(300, |b| out.push(b));
        assert_eq!(out.len(), MAX_LEB32_LEN);
        assert_eq!(decode_u32(&out), Ok((300, MAX_LEB32_LEN)));
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(decode_u32(&[0x80, 0x80]), Err(LebError::UnexpectedEnd(2)));
        assert_eq!(decode_i32(&[]), Err(LebError::UnexpectedEnd(0)));
    }

    #[test]
    fn test_overflow_is_reported() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x1F];
        assert!(matches!(decode_u32(&bytes), Err(LebError::Overflow { bits: 32, .. })));
        let six = [0x80, 0x80, 0x80, 0x80, 0x80, 0x00];
        assert!(matches!(decode_u32(&six), Err(LebError::Overflow { .. })));
    }

    #[test]
    fn test_unsigned_len() {
        assert_eq!(unsigned_len(0), 1);
        assert_eq!(unsigned_len(16_383), 2);
        assert_eq!(unsigned_len(16_384), 3);
    }
}
