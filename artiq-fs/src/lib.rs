//! Log-structured key/value store for the runtime's persistent configuration.
//!
//! Records are appended to a contiguous flash region as
//! `len:u16 | key:zstring | value:bytes | crc:u16`. A forward scan finds the
//! most recent record for a key; deletion is logical (a zero-length value).
//! Two physical sectors alternate as primary/secondary so that compaction can
//! rewrite the live set into a freshly erased region without ever leaving the
//! store without a valid copy, even across a power loss mid-rewrite.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod flash;
pub mod record;
pub mod store;

pub use flash::{Flash, FlashError};
pub use record::{Record, MAX_KEY_LEN};
pub use store::KvStore;

/// Errors returned by key/value operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvError {
    /// The flash device returned an I/O error.
    Flash(FlashError),
    /// The key exceeds [`MAX_KEY_LEN`] bytes or contains a NUL byte.
    InvalidKey,
    /// There is no room left even after compaction.
    RegionFull,
    /// Neither sector carries a valid sentinel; the store is uninitialized.
    NoValidSector,
}

impl core::fmt::Display for KvError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KvError::Flash(e) => write!(f, "flash I/O error: {}", e),
            KvError::InvalidKey => write!(f, "invalid key"),
            KvError::RegionFull => write!(f, "flash region full"),
            KvError::NoValidSector => write!(f, "no valid sector found"),
        }
    }
}

impl From<FlashError> for KvError {
    fn from(e: FlashError) -> Self {
        KvError::Flash(e)
    }
}
