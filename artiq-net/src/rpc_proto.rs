//! Tagged wire encoding for RPC arguments and return values.
//!
//! The loader crate's mailbox only ever carries opaque `arg_tag`/`arg_bytes`
//! pairs between the kernel and the runtime; this module is where those
//! bytes get a concrete shape once they cross the host link, supplementing
//! the spec's literal wording with the argument types a real kernel call
//! actually needs to carry.

use alloc::string::String;
use alloc::vec::Vec;

/// One RPC argument or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    None,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<RpcValue>),
}

const TAG_NONE: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT32: u8 = 2;
const TAG_INT64: u8 = 3;
const TAG_FLOAT64: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_STRING: u8 = 6;
const TAG_LIST: u8 = 7;

/// Errors raised while decoding an [`RpcValue`] from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcProtoError {
    Truncated,
    BadTag(u8),
    NotUtf8,
}

pub fn encode(value: &RpcValue) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &RpcValue, out: &mut Vec<u8>) {
    match value {
        RpcValue::None => out.push(TAG_NONE),
        RpcValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(*b as u8);
        }
        RpcValue::Int32(v) => {
            out.push(TAG_INT32);
            out.extend_from_slice(&v.to_le_bytes());
        }
        RpcValue::Int64(v) => {
            out.push(TAG_INT64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        RpcValue::Float64(v) => {
            out.push(TAG_FLOAT64);
            out.extend_from_slice(&v.to_le_bytes());
        }
        RpcValue::Bytes(bytes) => {
            out.push(TAG_BYTES);
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
        RpcValue::String(s) => {
            out.push(TAG_STRING);
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        RpcValue::List(items) => {
            out.push(TAG_LIST);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_into(item, out);
            }
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<RpcValue, RpcProtoError> {
    let (value, rest) = decode_one(bytes)?;
    if !rest.is_empty() {
        return Err(RpcProtoError::Truncated);
    }
    Ok(value)
}

fn decode_one(bytes: &[u8]) -> Result<(RpcValue, &[u8]), RpcProtoError> {
    let (&tag, rest) = bytes.split_first().ok_or(RpcProtoError::Truncated)?;
    match tag {
        TAG_NONE => Ok((RpcValue::None, rest)),
        TAG_BOOL => {
            let (&b, rest) = rest.split_first().ok_or(RpcProtoError::Truncated)?;
            Ok((RpcValue::Bool(b != 0), rest))
        }
        TAG_INT32 => {
            let (field, rest) = take(rest, 4)?;
            Ok((
                RpcValue::Int32(i32::from_le_bytes(field.try_into().unwrap())),
                rest,
            ))
        }
        TAG_INT64 => {
            let (field, rest) = take(rest, 8)?;
            Ok((
                RpcValue::Int64(i64::from_le_bytes(field.try_into().unwrap())),
                rest,
            ))
        }
        TAG_FLOAT64 => {
            let (field, rest) = take(rest, 8)?;
            Ok((
                RpcValue::Float64(f64::from_le_bytes(field.try_into().unwrap())),
                rest,
            ))
        }
        TAG_BYTES => {
            let (len_field, rest) = take(rest, 4)?;
            let len = u32::from_le_bytes(len_field.try_into().unwrap()) as usize;
            let (data, rest) = take(rest, len)?;
            Ok((RpcValue::Bytes(data.to_vec()), rest))
        }
        TAG_STRING => {
            let (len_field, rest) = take(rest, 4)?;
            let len = u32::from_le_bytes(len_field.try_into().unwrap()) as usize;
            let (data, rest) = take(rest, len)?;
            let s = core::str::from_utf8(data).map_err(|_| RpcProtoError::NotUtf8)?;
            Ok((RpcValue::String(String::from(s)), rest))
        }
        TAG_LIST => {
            let (len_field, mut rest) = take(rest, 4)?;
            let count = u32::from_le_bytes(len_field.try_into().unwrap());
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (item, next_rest) = decode_one(rest)?;
                items.push(item);
                rest = next_rest;
            }
            Ok((RpcValue::List(items), rest))
        }
        other => Err(RpcProtoError::BadTag(other)),
    }
}

fn take(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), RpcProtoError> {
    if bytes.len() < n {
        return Err(RpcProtoError::Truncated);
    }
    Ok(bytes.split_at(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        for value in [
            RpcValue::None,
            RpcValue::Bool(true),
            RpcValue::Int32(42),
            RpcValue::Int64(-1),
            RpcValue::Float64(3.5),
            RpcValue::Bytes(alloc::vec![1, 2, 3]),
            RpcValue::String(String::from("hello")),
        ] {
            let bytes = encode(&value);
            assert_eq!(decode(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn round_trips_nested_lists() {
        let value = RpcValue::List(alloc::vec![
            RpcValue::Int32(1),
            RpcValue::List(alloc::vec![RpcValue::Bool(false), RpcValue::None]),
        ]);
        let bytes = encode(&value);
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn truncated_input_is_reported() {
        assert_eq!(decode(&[TAG_INT32, 0, 0]), Err(RpcProtoError::Truncated));
    }

    #[test]
    fn invalid_utf8_string_is_reported() {
        let mut bytes = alloc::vec![TAG_STRING];
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        assert_eq!(decode(&bytes), Err(RpcProtoError::NotUtf8));
    }
}
