//! Command packet construction
//!
//! Command packet layout:
//! ```text
//! 08 01                 field 1 (varint) = 1
//! 10 <varint token>     field 2 (varint) = session token
//! 22 <varint len>       field 4 (length-delimited)
//!    <action body>
//! ```
//!
//! Brightness body layout:
//! ```text
//! 92 01 <varint len>    field 18 (length-delimited)
//!    10 <varint pct>    field 2 = brightness percent
//!    18 <varint ms>     field 3 = dimming duration in milliseconds
//! ```

use crate::action::{ActionBody, Brightness};
use crate::fields::{put_bytes_field, put_varint_field};
use crate::varint::encoded_len;
use bytes::{Bytes, BytesMut};

const HEADER_FIELD: u32 = 1;
const HEADER_VALUE: u64 = 1;
const TOKEN_FIELD: u32 = 2;
const BODY_FIELD: u32 = 4;

const BRIGHTNESS_FIELD: u32 = 18;
const BRIGHTNESS_PERCENT_FIELD: u32 = 2;
const BRIGHTNESS_DURATION_FIELD: u32 = 3;

/// Wrap `body` in a command packet authorized by `token`
pub fn build_action_packet(token: u64, body: &ActionBody) -> Bytes {
    let capacity = 2 + 1 + encoded_len(token) + 1 + encoded_len(body.len() as u64) + body.len();
    let mut buf = BytesMut::with_capacity(capacity);

    put_varint_field(&mut buf, HEADER_FIELD, HEADER_VALUE);
    put_varint_field(&mut buf, TOKEN_FIELD, token);
    put_bytes_field(&mut buf, BODY_FIELD, body.as_bytes());

    buf.freeze()
}

/// Build the body that sets brightness together with a dimming duration
pub fn build_brightness_body(brightness: Brightness, dimming_ms: u64) -> ActionBody {
    let mut inner = BytesMut::with_capacity(4 + encoded_len(dimming_ms));
    put_varint_field(
        &mut inner,
        BRIGHTNESS_PERCENT_FIELD,
        u64::from(brightness.percent()),
    );
    put_varint_field(&mut inner, BRIGHTNESS_DURATION_FIELD, dimming_ms);

    let mut body = BytesMut::with_capacity(3 + inner.len());
    put_bytes_field(&mut body, BRIGHTNESS_FIELD, &inner);

    ActionBody::from(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TURN_ON;

    #[test]
    fn test_packet_header() {
        let packet = build_action_packet(300, &ActionBody::from_static(TURN_ON));
        assert_eq!(&packet[..5], &[0x08, 0x01, 0x10, 0xac, 0x02]);
        assert_eq!(&packet[5..7], &[0x22, 0x04]);
        assert_eq!(&packet[7..], TURN_ON);
    }

    #[test]
    fn test_brightness_body_30min() {
        let body = build_brightness_body(Brightness::Pct100, 1_800_000);
        // 1_800_000 = 0xc0 0xee 0x6d
        assert_eq!(
            body.as_bytes(),
            &[0x92, 0x01, 0x06, 0x10, 0x64, 0x18, 0xc0, 0xee, 0x6d]
        );
    }
}
