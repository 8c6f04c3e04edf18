//! Stateless encoder/decoder for the wire format
//!
//! One encoded item is `tag (1 byte) | payload length (u32 BE) | payload`.
//! Tag `0x00` marks a byte-string whose payload is the raw bytes; tag
//! `0x01` marks a list whose payload is the concatenation of its encoded
//! children. The layout is self-describing and symmetric: for every
//! finite tree `v`, `decode(&encode(&v), 0)` yields `v` back.

use crate::wire::value::WireValue;
use thiserror::Error;

const TAG_BYTES: u8 = 0x00;
const TAG_LIST: u8 = 0x01;

/// Bytes of header before every payload: tag plus u32 length.
const HEADER_LEN: usize = 5;

/// Upper bound on a single item's declared payload length. A hostile
/// length prefix must not be able to drive a huge allocation.
pub const MAX_ITEM_LEN: usize = 16 * 1024 * 1024;

/// Nesting bound for decoded lists.
const MAX_DEPTH: usize = 128;

/// Decoding failures. All of these cost at most the offending message,
/// never the process.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("truncated item at offset {offset}: need {needed} bytes, have {have}")]
    Truncated {
        offset: usize,
        needed: usize,
        have: usize,
    },
    #[error("unknown type tag {0:#04x}")]
    BadTag(u8),
    #[error("declared length {0} exceeds maximum item size")]
    Oversized(usize),
    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("unknown message type {0}")]
    UnknownMessageType(u64),
}

/// Encode one value tree to its canonical byte form.
///
/// # Panics
///
/// Panics if any item's payload exceeds [`MAX_ITEM_LEN`]. Building such
/// an item is a local programming error; the decode side rejects the
/// frame anyway, so it must never reach the wire.
pub fn encode(value: &WireValue) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &WireValue, out: &mut Vec<u8>) {
    match value {
        WireValue::Bytes(b) => {
            out.push(TAG_BYTES);
            out.extend_from_slice(&item_header(b.len()));
            out.extend_from_slice(b);
        }
        WireValue::List(items) => {
            let mut body = Vec::new();
            for item in items {
                encode_into(item, &mut body);
            }
            out.push(TAG_LIST);
            out.extend_from_slice(&item_header(body.len()));
            out.extend_from_slice(&body);
        }
    }
}

/// The length half of an item header. Guards the `u32` cast: a payload
/// the decoder would refuse must not be encodable either.
fn item_header(len: usize) -> [u8; 4] {
    assert!(
        len <= MAX_ITEM_LEN,
        "payload of {len} bytes exceeds maximum item size"
    );
    (len as u32).to_be_bytes()
}

/// Decode one item starting at `offset`, returning the value and the
/// number of bytes consumed (header included). Short or malformed input
/// is an error, never a panic or an out-of-bounds read.
pub fn decode(buf: &[u8], offset: usize) -> Result<(WireValue, usize), WireError> {
    decode_at(buf, offset, 0)
}

fn decode_at(buf: &[u8], offset: usize, depth: usize) -> Result<(WireValue, usize), WireError> {
    if depth > MAX_DEPTH {
        return Err(WireError::TooDeep);
    }

    let have = buf.len().saturating_sub(offset);
    if have < HEADER_LEN {
        return Err(WireError::Truncated {
            offset,
            needed: HEADER_LEN,
            have,
        });
    }

    let tag = buf[offset];
    let len = u32::from_be_bytes([
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
        buf[offset + 4],
    ]) as usize;

    if len > MAX_ITEM_LEN {
        return Err(WireError::Oversized(len));
    }
    if have < HEADER_LEN + len {
        return Err(WireError::Truncated {
            offset,
            needed: HEADER_LEN + len,
            have,
        });
    }

    let payload = &buf[offset + HEADER_LEN..offset + HEADER_LEN + len];
    let value = match tag {
        TAG_BYTES => WireValue::Bytes(payload.to_vec()),
        TAG_LIST => {
            let mut items = Vec::new();
            let mut at = 0;
            while at < payload.len() {
                let (child, used) = decode_at(payload, at, depth + 1)?;
                items.push(child);
                at += used;
            }
            WireValue::List(items)
        }
        other => return Err(WireError::BadTag(other)),
    };

    Ok((value, HEADER_LEN + len))
}

/// Total encoded size (header included) of the item starting at `offset`,
/// or `None` if the header itself is incomplete. Used by the frame codec
/// to find message boundaries without decoding.
pub(crate) fn item_len(buf: &[u8], offset: usize) -> Option<Result<usize, WireError>> {
    if buf.len().saturating_sub(offset) < HEADER_LEN {
        return None;
    }
    let tag = buf[offset];
    if tag != TAG_BYTES && tag != TAG_LIST {
        return Some(Err(WireError::BadTag(tag)));
    }
    let len = u32::from_be_bytes([
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
        buf[offset + 4],
    ]) as usize;
    if len > MAX_ITEM_LEN {
        return Some(Err(WireError::Oversized(len)));
    }
    Some(Ok(HEADER_LEN + len))
}
