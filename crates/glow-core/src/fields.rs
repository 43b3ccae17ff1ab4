//! Protobuf-like field parsing
//!
//! The device speaks a reduced protobuf dialect: only varint (wire type 0)
//! and length-delimited (wire type 2) fields ever appear. Parsing here is
//! forgiving: a malformed tag, a truncated varint or a length
//! running past the buffer ends the scan and whatever was collected so far
//! is returned.
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ tag varint                   │ value                        │
//! │   field_number = tag >> 3    │   wire 0: varint             │
//! │   wire_type    = tag & 0x07  │   wire 2: varint len + bytes │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```

use crate::varint::{self, put_varint};
use crate::Result;
use bytes::{BufMut, Bytes};
use std::collections::BTreeMap;

/// Supported wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    LengthDelimited = 2,
}

impl WireType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WireType::Varint),
            2 => Some(WireType::LengthDelimited),
            _ => None,
        }
    }
}

/// A decoded field tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub field: u32,
    /// Raw 3-bit wire type; may be one this dialect does not support
    pub wire: u8,
}

impl Tag {
    /// Read a tag at `pos`
    ///
    /// Returns `Ok(None)` for a malformed tag (field 0 or beyond `u32`).
    pub fn read(buf: &[u8], pos: usize) -> Result<Option<(Tag, usize)>> {
        let (raw, next) = varint::decode(buf, pos)?;
        let field = match u32::try_from(raw >> 3) {
            Ok(0) | Err(_) => return Ok(None),
            Ok(field) => field,
        };
        Ok(Some((
            Tag {
                field,
                wire: (raw & 0x07) as u8,
            },
            next,
        )))
    }

    pub fn wire_type(&self) -> Option<WireType> {
        WireType::from_u8(self.wire)
    }
}

/// A single decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Varint(u64),
    Bytes(Bytes),
}

impl FieldValue {
    pub fn as_varint(&self) -> Option<u64> {
        match self {
            FieldValue::Varint(v) => Some(*v),
            FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            FieldValue::Varint(_) => None,
        }
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            FieldValue::Varint(_) => WireType::Varint,
            FieldValue::Bytes(_) => WireType::LengthDelimited,
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Varint(v)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(b: &[u8]) -> Self {
        FieldValue::Bytes(Bytes::copy_from_slice(b))
    }
}

/// Field number to every value seen for it, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: BTreeMap<u32, Vec<FieldValue>>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat buffer. Never fails.
    pub fn parse(buf: &[u8]) -> Self {
        let mut map = FieldMap::new();
        let mut pos = 0;

        while pos < buf.len() {
            let Ok(Some((tag, next))) = Tag::read(buf, pos) else {
                break;
            };

            match tag.wire_type() {
                Some(WireType::Varint) => {
                    let Ok((value, next)) = varint::decode(buf, next) else {
                        break;
                    };
                    map.push(tag.field, FieldValue::Varint(value));
                    pos = next;
                }
                Some(WireType::LengthDelimited) => {
                    let Ok((len, start)) = varint::decode(buf, next) else {
                        break;
                    };
                    let Some(end) = usize::try_from(len)
                        .ok()
                        .and_then(|len| start.checked_add(len))
                        .filter(|end| *end <= buf.len())
                    else {
                        break;
                    };
                    map.push(tag.field, FieldValue::from(&buf[start..end]));
                    pos = end;
                }
                None => break,
            }
        }

        map
    }

    /// Append a value for `field`
    pub fn push(&mut self, field: u32, value: FieldValue) {
        self.fields.entry(field).or_default().push(value);
    }

    /// All values for `field`, in arrival order
    pub fn get(&self, field: u32) -> Option<&[FieldValue]> {
        self.fields.get(&field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: u32) -> bool {
        self.fields.contains_key(&field)
    }

    /// Last occurrence of `field`, if any
    pub fn last(&self, field: u32) -> Option<&FieldValue> {
        self.fields.get(&field).and_then(|values| values.last())
    }

    /// Last occurrence of `field` if it is a varint
    pub fn last_varint(&self, field: u32) -> Option<u64> {
        self.last(field).and_then(FieldValue::as_varint)
    }

    /// Last occurrence of `field` if it is length-delimited
    pub fn last_bytes(&self, field: u32) -> Option<&Bytes> {
        self.last(field).and_then(FieldValue::as_bytes)
    }

    /// Number of distinct field numbers
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in ascending field-number order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[FieldValue])> {
        self.fields.iter().map(|(k, v)| (*k, v.as_slice()))
    }
}

/// Parse a flat buffer; shorthand for [`FieldMap::parse`]
pub fn parse_fields(buf: &[u8]) -> FieldMap {
    FieldMap::parse(buf)
}

/// Parse `buf`, then descend into the last `outer` and the last `inner`
/// length-delimited fields.
///
/// Returns `None` if either level is missing or is not length-delimited.
/// Later occurrences replace earlier ones, matching protobuf's handling of
/// repeated singular fields.
pub fn parse_nested(buf: &[u8], outer: u32, inner: u32) -> Option<FieldMap> {
    let top = parse_fields(buf);
    let outer_map = FieldMap::parse(top.last_bytes(outer)?);
    let inner_bytes = outer_map.last_bytes(inner)?;
    Some(FieldMap::parse(inner_bytes))
}

/// Write a tag
#[inline]
pub fn put_tag(buf: &mut impl BufMut, field: u32, wire: WireType) {
    put_varint(buf, (u64::from(field) << 3) | wire as u64);
}

/// Write a complete varint field
#[inline]
pub fn put_varint_field(buf: &mut impl BufMut, field: u32, value: u64) {
    put_tag(buf, field, WireType::Varint);
    put_varint(buf, value);
}

/// Write a complete length-delimited field
#[inline]
pub fn put_bytes_field(buf: &mut impl BufMut, field: u32, value: &[u8]) {
    put_tag(buf, field, WireType::LengthDelimited);
    put_varint(buf, value.len() as u64);
    buf.put_slice(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_tag_read() {
        assert_eq!(
            Tag::read(&[0x9a, 0x01], 0),
            Ok(Some((Tag { field: 19, wire: 2 }, 2)))
        );
        // field 0 is never valid
        assert_eq!(Tag::read(&[0x00], 0), Ok(None));
    }

    #[test]
    fn test_writers() {
        let mut buf = BytesMut::new();
        put_varint_field(&mut buf, 1, 42);
        put_bytes_field(&mut buf, 14, &[0x08, 0x00]);
        assert_eq!(buf.as_ref(), &[0x08, 0x2a, 0x72, 0x02, 0x08, 0x00]);
    }

    #[test]
    fn test_unsupported_wire_type_stops() {
        // field 1 = 5, then a fixed64 tag (wire 1), then field 2 = 7
        let data = [0x08, 0x05, 0x09, 0x10, 0x07];
        let map = FieldMap::parse(&data);
        assert_eq!(map.get(1), Some(&[FieldValue::Varint(5)][..]));
        assert!(!map.contains(2));
    }

    #[test]
    fn test_last_occurrence_wins() {
        let data = [0x08, 0x01, 0x08, 0x02];
        let map = FieldMap::parse(&data);
        assert_eq!(map.last_varint(1), Some(2));
        assert_eq!(map.last_bytes(1), None);
    }
}
