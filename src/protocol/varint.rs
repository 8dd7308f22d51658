//! Variable-length integers: 7 data bits per byte, least significant group
//! first, high bit set on every byte except the last.

use crate::common::ProtocolError;
use bytes::BufMut;

/// A `u32` never needs more than five groups.
pub const MAX_VARINT_LEN: usize = 5;

/// Number of bytes `value` occupies once encoded.
pub fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Append the encoding of `value` to `buf`.
pub fn put_varint<B: BufMut>(buf: &mut B, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

pub fn encode_varint(value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(varint_len(value));
    put_varint(&mut out, value);
    out
}

/// Decode the VarInt starting at `offset`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(buf: &[u8], offset: usize) -> Result<(u32, usize), ProtocolError> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = *buf.get(offset + i).ok_or(ProtocolError::MalformedVarInt)?;
        if i == MAX_VARINT_LEN - 1 && byte > 0x0F {
            return Err(ProtocolError::VarIntTooLong);
        }
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ProtocolError::VarIntTooLong)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_a_single_byte() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(decode_varint(&[0x00], 0), Ok((0, 1)));
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode_varint(1), vec![0x01]);
        assert_eq!(encode_varint(127), vec![0x7F]);
        assert_eq!(encode_varint(128), vec![0x80, 0x01]);
        assert_eq!(encode_varint(255), vec![0xFF, 0x01]);
        assert_eq!(encode_varint(25565), vec![0xDD, 0xC7, 0x01]);
        assert_eq!(encode_varint(u32::MAX), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let samples = [
            0u32,
            1,
            127,
            128,
            300,
            16_383,
            16_384,
            2_097_151,
            2_097_152,
            268_435_455,
            268_435_456,
            u32::MAX - 1,
            u32::MAX,
        ];
        for value in samples {
            let encoded = encode_varint(value);
            assert_eq!(encoded.len(), varint_len(value), "length of {value}");
            assert_eq!(decode_varint(&encoded, 0), Ok((value, encoded.len())));
        }
    }

    #[test]
    fn decodes_at_offset() {
        let buf = [0xAA, 0xBB, 0xDD, 0xC7, 0x01, 0x02];
        assert_eq!(decode_varint(&buf, 2), Ok((25565, 3)));
        assert_eq!(decode_varint(&buf, 5), Ok((2, 1)));
    }

    #[test]
    fn truncated_input_is_malformed() {
        assert_eq!(decode_varint(&[], 0), Err(ProtocolError::MalformedVarInt));
        assert_eq!(decode_varint(&[0x80, 0x80], 0), Err(ProtocolError::MalformedVarInt));
        assert_eq!(decode_varint(&[0x01], 1), Err(ProtocolError::MalformedVarInt));
    }

    #[test]
    fn overlong_input_is_rejected() {
        let six = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert_eq!(decode_varint(&six, 0), Err(ProtocolError::VarIntTooLong));
        let overflow = [0xFF, 0xFF, 0xFF, 0xFF, 0x1F];
        assert_eq!(decode_varint(&overflow, 0), Err(ProtocolError::VarIntTooLong));
    }
}
