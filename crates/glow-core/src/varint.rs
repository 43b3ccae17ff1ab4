//! Base-128 varint codec
//!
//! Standard protobuf encoding: 7 data bits per byte, least significant group
//! first, high bit set on every byte except the last.

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Longest encoding of a `u64`
pub const MAX_VARINT_LEN: usize = 10;

/// Append the canonical encoding of `value` to `buf`
#[inline]
pub fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    while value > 0x7f {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Encode `value` as a standalone varint
pub fn encode(value: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(value));
    put_varint(&mut buf, value);
    buf.freeze()
}

/// Number of bytes `value` occupies once encoded
#[inline]
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decode a varint starting at `start`
///
/// Returns the value and the offset of the first byte after it.
pub fn decode(buf: &[u8], start: usize) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut pos = start;

    while let Some(&byte) = buf.get(pos) {
        let bits = u64::from(byte & 0x7f);
        // The tenth byte may only contribute the top bit of a u64
        if shift > 63 || (shift == 63 && bits > 1) {
            return Err(Error::VarintOverflow { offset: start });
        }
        value |= bits << shift;
        pos += 1;

        if byte & 0x80 == 0 {
            return Ok((value, pos));
        }
        shift += 7;
    }

    Err(Error::Truncated { offset: pos })
}
