//! Canonical length-prefixed recursive binary encoding.
//!
//! Every structure on the wire is built from two shapes: byte strings
//! and lists. The encoding is canonical, so a value has exactly one
//! valid byte representation and hashing the encoding is
//! deterministic:
//!
//! - a single byte below `0x80` encodes as itself;
//! - a string of 0..=55 bytes as `0x80 + len` followed by the bytes;
//! - a longer string as `0xb7 + len_of_len`, the big-endian length,
//!   then the bytes;
//! - a list whose encoded payload is 0..=55 bytes as `0xc0 + len`
//!   followed by the payload;
//! - a longer list as `0xf7 + len_of_len`, the big-endian length, then
//!   the payload.
//!
//! Unsigned integers are minimal big-endian byte strings (zero is the
//! empty string). Decoding is strict: non-minimal encodings, lengths
//! with leading zeros, truncated items, and trailing bytes after the
//! top-level item are all rejected as
//! [`MurmurError::MalformedEnvelope`].

use murmur_types::{MurmurError, Result};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A decoded item: either an opaque byte string or a list of items.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// An opaque byte string.
    Bytes(Vec<u8>),
    /// An ordered list of nested items.
    List(Vec<Value>),
}

impl Value {
    /// Builds the canonical byte-string form of an unsigned integer:
    /// minimal big-endian, with zero as the empty string.
    pub fn uint(v: u64) -> Self {
        let bytes = v.to_be_bytes();
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(8);
        Value::Bytes(bytes[first..].to_vec())
    }

    /// Returns the byte string, or an error for a list.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Bytes(b) => Ok(b),
            Value::List(_) => Err(malformed("expected byte string, found list")),
        }
    }

    /// Returns the list items, or an error for a byte string.
    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            Value::Bytes(_) => Err(malformed("expected list, found byte string")),
        }
    }

    /// Interprets the byte string as a canonical unsigned integer.
    pub fn to_u64(&self) -> Result<u64> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 8 {
            return Err(malformed("integer wider than 64 bits"));
        }
        if bytes.first() == Some(&0) {
            return Err(malformed("integer has leading zero"));
        }
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    /// Interprets the byte string as a canonical u32.
    pub fn to_u32(&self) -> Result<u32> {
        let v = self.to_u64()?;
        u32::try_from(v).map_err(|_| malformed("integer wider than 32 bits"))
    }
}

fn malformed(reason: &str) -> MurmurError {
    MurmurError::MalformedEnvelope {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encodes a value into its canonical byte representation.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bytes(bytes) => {
            if bytes.len() == 1 && bytes[0] < 0x80 {
                out.push(bytes[0]);
            } else {
                write_header(bytes.len(), 0x80, out);
                out.extend_from_slice(bytes);
            }
        }
        Value::List(items) => {
            let mut payload = Vec::new();
            for item in items {
                encode_into(item, &mut payload);
            }
            write_header(payload.len(), 0xc0, out);
            out.extend_from_slice(&payload);
        }
    }
}

fn write_header(len: usize, offset: u8, out: &mut Vec<u8>) {
    if len <= 55 {
        out.push(offset + len as u8);
    } else {
        let be = (len as u64).to_be_bytes();
        let first = be.iter().position(|&b| b != 0).unwrap_or(7);
        let len_bytes = &be[first..];
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decodes a single top-level value, rejecting trailing bytes.
pub fn decode(data: &[u8]) -> Result<Value> {
    let (value, consumed) = decode_item(data)?;
    if consumed != data.len() {
        return Err(malformed("trailing bytes after top-level item"));
    }
    Ok(value)
}

/// Decodes one item from the front of `data`, returning the value and
/// the number of bytes consumed.
fn decode_item(data: &[u8]) -> Result<(Value, usize)> {
    let first = *data.first().ok_or_else(|| malformed("unexpected end of input"))?;

    match first {
        0x00..=0x7f => Ok((Value::Bytes(vec![first]), 1)),

        0x80..=0xb7 => {
            let len = (first - 0x80) as usize;
            let bytes = data
                .get(1..1 + len)
                .ok_or_else(|| malformed("truncated string"))?;
            if len == 1 && bytes[0] < 0x80 {
                return Err(malformed("non-canonical single-byte string"));
            }
            Ok((Value::Bytes(bytes.to_vec()), 1 + len))
        }

        0xb8..=0xbf => {
            let len_of_len = (first - 0xb7) as usize;
            let len = read_length(data.get(1..1 + len_of_len))?;
            if len <= 55 {
                return Err(malformed("non-canonical long string length"));
            }
            let start = 1 + len_of_len;
            let end = start
                .checked_add(len)
                .ok_or_else(|| malformed("string length overflows"))?;
            let bytes = data
                .get(start..end)
                .ok_or_else(|| malformed("truncated long string"))?;
            Ok((Value::Bytes(bytes.to_vec()), end))
        }

        0xc0..=0xf7 => {
            let len = (first - 0xc0) as usize;
            let payload = data
                .get(1..1 + len)
                .ok_or_else(|| malformed("truncated list"))?;
            Ok((Value::List(decode_list(payload)?), 1 + len))
        }

        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            let len = read_length(data.get(1..1 + len_of_len))?;
            if len <= 55 {
                return Err(malformed("non-canonical long list length"));
            }
            let start = 1 + len_of_len;
            let end = start
                .checked_add(len)
                .ok_or_else(|| malformed("list length overflows"))?;
            let payload = data
                .get(start..end)
                .ok_or_else(|| malformed("truncated long list"))?;
            Ok((Value::List(decode_list(payload)?), end))
        }
    }
}

/// Decodes a big-endian length field, rejecting leading zeros.
fn read_length(bytes: Option<&[u8]>) -> Result<usize> {
    let bytes = bytes.ok_or_else(|| malformed("truncated length field"))?;
    if bytes.is_empty() {
        return Err(malformed("empty length field"));
    }
    if bytes[0] == 0 {
        return Err(malformed("length field has leading zero"));
    }
    if bytes.len() > std::mem::size_of::<usize>() {
        return Err(malformed("length field too wide"));
    }
    Ok(bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | usize::from(b)))
}

/// Decodes back-to-back items filling a list payload exactly.
fn decode_list(payload: &[u8]) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let (item, used) = decode_item(&payload[pos..])?;
        pos += used;
        items.push(item);
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
