//! On-flash record encoding: `len:u16 | key:zstring | value:bytes | crc:u16`.

use alloc::vec::Vec;
use crc::{Crc, CRC_16_IBM_3740};

/// Maximum key length in bytes (NUL terminator excluded).
pub const MAX_KEY_LEN: usize = 31;

/// CRC-16 instance used for record integrity, computed over `key || value`.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// A decoded flash record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    /// Total on-flash size of this record once encoded.
    pub fn encoded_len(&self) -> usize {
        2 + self.key.len() + 1 + self.value.len() + 2
    }

    /// `true` if this is a logical-delete tombstone (zero-length value).
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }

    /// Serialize this record to its on-flash byte representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        let len = (self.key.len() + 1 + self.value.len()) as u16;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.key);
        out.push(0);
        out.extend_from_slice(&self.value);
        let mut digest = CRC16.digest();
        digest.update(&self.key);
        digest.update(&self.value);
        out.extend_from_slice(&digest.finalize().to_le_bytes());
        out
    }
}

/// Outcome of attempting to decode one record at a cursor position.
pub enum Decoded {
    /// A valid record, and the number of bytes it occupied.
    Record(Record, usize),
    /// Nothing more to read: blank flash (`len == 0xFFFF`) or a CRC mismatch,
    /// either of which terminates the scan per the end-of-log contract.
    End,
}

/// Attempt to decode one record starting at `buf[0..]`.
///
/// A CRC mismatch is treated as end-of-log rather than an error: the header
/// scan stops there instead of reporting corruption, per the flash KV design.
pub fn decode_one(buf: &[u8]) -> Decoded {
    if buf.len() < 2 {
        return Decoded::End;
    }
    let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    if len == 0xFFFF || len == 0 {
        return Decoded::End;
    }
    let body_start = 2;
    let body_end = body_start + len;
    let crc_end = body_end + 2;
    if buf.len() < crc_end {
        return Decoded::End;
    }
    let body = &buf[body_start..body_end];
    let Some(nul_pos) = body.iter().position(|&b| b == 0) else {
        return Decoded::End;
    };
    let key = &body[..nul_pos];
    let value = &body[nul_pos + 1..];
    if key.len() > MAX_KEY_LEN {
        return Decoded::End;
    }
    let stored_crc = u16::from_le_bytes([buf[body_end], buf[body_end + 1]]);
    let mut digest = CRC16.digest();
    digest.update(key);
    digest.update(value);
    if digest.finalize() != stored_crc {
        return Decoded::End;
    }
    Decoded::Record(
        Record {
            key: key.to_vec(),
            value: value.to_vec(),
        },
        crc_end,
    )
}

/// Validate a key for use with the store: non-empty, no NUL, within
/// [`MAX_KEY_LEN`].
pub fn validate_key(key: &[u8]) -> bool {
    !key.is_empty() && key.len() <= MAX_KEY_LEN && !key.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let rec = Record {
            key: b"ip".to_vec(),
            value: b"192.168.1.50".to_vec(),
        };
        let bytes = rec.encode();
        match decode_one(&bytes) {
            Decoded::Record(got, consumed) => {
                assert_eq!(got, rec);
                assert_eq!(consumed, bytes.len());
            }
            Decoded::End => panic!("expected a record"),
        }
    }

    #[test]
    fn tombstone_has_empty_value() {
        let rec = Record {
            key: b"foo".to_vec(),
            value: Vec::new(),
        };
        assert!(rec.is_tombstone());
    }

    #[test]
    fn corrupted_crc_is_end_of_log() {
        let rec = Record {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
        };
        let mut bytes = rec.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(decode_one(&bytes), Decoded::End));
    }

    #[test]
    fn blank_flash_is_end_of_log() {
        let blank = [0xFFu8; 16];
        assert!(matches!(decode_one(&blank), Decoded::End));
    }
}
