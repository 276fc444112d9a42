//! Kernel image parsing and validation.
//!
//! On-flash/on-wire layout (little-endian, OR1K-tagged ELF-subset per the
//! wire protocol section of the spec):
//!
//! ```text
//! magic        [u8; 4]   b"AKB1"
//! machine      u16       0x005C (OR1K)
//! flags        u16       reserved, must be 0
//! code_len     u32       length of the relocated code/data region
//! bss_len      u32       zero-filled region appended after code at load time
//! support_len  u32       length of the AMP syscall-stub support blob (<=32 KiB)
//! run_kernel   u32       offset of the `run_kernel` entry point, or NO_ENTRY
//! finalize     u32       offset of the `finalize` entry point, or NO_ENTRY
//! code[code_len]
//! support[support_len]
//! ```

use alloc::vec::Vec;

/// Fixed header magic identifying a kernel image.
pub const HEADER_MAGIC: [u8; 4] = *b"AKB1";

/// OR1K machine tag, matching the real ELF `e_machine` value for OpenRISC.
pub const MACHINE_OR1K: u16 = 0x005C;

/// Maximum permitted size of the AMP support blob.
pub const MAX_SUPPORT_LEN: usize = 32 * 1024;

/// Sentinel meaning "this entry point is not present in the image".
pub const NO_ENTRY: u32 = 0xFFFF_FFFF;

/// Size of the fixed header, in bytes.
pub const HEADER_LEN: usize = 4 + 2 + 2 + 4 + 4 + 4 + 4 + 4;

/// Total addressable kernel memory window. Code plus BSS must fit within it.
pub const KERNEL_MEM_SIZE: usize = 256 * 1024;

/// A named, resolved entry point into a loaded kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryName {
    RunKernel,
    Finalize,
}

/// Errors raised while validating or resolving a kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderError {
    /// Shorter than the fixed header, or the declared lengths don't add up
    /// to the number of bytes actually supplied.
    Truncated,
    /// The magic number did not match.
    BadMagic,
    /// The machine tag is not OR1K.
    BadMachine,
    /// The image is not 4-byte aligned.
    Misaligned,
    /// `support_len` exceeds [`MAX_SUPPORT_LEN`].
    SupportTooLarge,
    /// `code_len + bss_len` exceeds [`KERNEL_MEM_SIZE`].
    ImageTooLarge,
    /// The requested entry point is not present in this image.
    EntryNotFound,
    /// No image is currently resident.
    NoImageLoaded,
}

impl core::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LoaderError::Truncated => write!(f, "truncated kernel image"),
            LoaderError::BadMagic => write!(f, "bad kernel image magic"),
            LoaderError::BadMachine => write!(f, "unsupported machine tag"),
            LoaderError::Misaligned => write!(f, "kernel image is not 4-byte aligned"),
            LoaderError::SupportTooLarge => write!(f, "support blob exceeds 32 KiB"),
            LoaderError::ImageTooLarge => write!(f, "image does not fit in kernel memory"),
            LoaderError::EntryNotFound => write!(f, "entry point not present in image"),
            LoaderError::NoImageLoaded => write!(f, "no kernel image is resident"),
        }
    }
}

impl LoaderError {
    /// `true` for malformed-header errors (wire scenario S3: `BAD_IMAGE`),
    /// as opposed to well-formed-but-oversized images (a resource error).
    pub fn is_bad_image(self) -> bool {
        matches!(
            self,
            LoaderError::Truncated
                | LoaderError::BadMagic
                | LoaderError::BadMachine
                | LoaderError::Misaligned
        )
    }
}

/// A validated, relocated kernel image resident in kernel memory.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelImage {
    /// Program bytes for the sandboxed kernel VM (see [`crate::vm`]).
    pub code: Vec<u8>,
    /// Zero-filled region appended after `code` in the kernel memory window.
    pub bss_len: u32,
    /// Opaque AMP syscall-stub blob, carried but not interpreted here.
    pub support: Vec<u8>,
    run_kernel_offset: u32,
    finalize_offset: u32,
}

impl KernelImage {
    /// Parse and validate a kernel image. `declared_size` is the size the
    /// host claimed to be sending (`kloader_load(image, size)`); it must
    /// match `bytes.len()` exactly.
    pub fn parse(bytes: &[u8], declared_size: usize) -> Result<Self, LoaderError> {
        if bytes.len() != declared_size || bytes.len() < HEADER_LEN {
            return Err(LoaderError::Truncated);
        }
        if bytes.len() % 4 != 0 {
            return Err(LoaderError::Misaligned);
        }
        if bytes[0..4] != HEADER_MAGIC {
            return Err(LoaderError::BadMagic);
        }
        let machine = u16::from_le_bytes([bytes[4], bytes[5]]);
        if machine != MACHINE_OR1K {
            return Err(LoaderError::BadMachine);
        }
        let code_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let bss_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let support_len = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
        let run_kernel_offset = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
        let finalize_offset = u32::from_le_bytes(bytes[24..28].try_into().unwrap());

        if support_len > MAX_SUPPORT_LEN {
            return Err(LoaderError::SupportTooLarge);
        }
        if code_len as usize + bss_len as usize > KERNEL_MEM_SIZE {
            return Err(LoaderError::ImageTooLarge);
        }
        let expected_len = HEADER_LEN + code_len + support_len;
        if bytes.len() != expected_len {
            return Err(LoaderError::Truncated);
        }

        let code = bytes[HEADER_LEN..HEADER_LEN + code_len].to_vec();
        let support = bytes[HEADER_LEN + code_len..].to_vec();

        Ok(KernelImage {
            code,
            bss_len,
            support,
            run_kernel_offset,
            finalize_offset,
        })
    }

    /// Resolve one of the small fixed set of named entry points.
    pub fn resolve(&self, name: EntryName) -> Result<u32, LoaderError> {
        let offset = match name {
            EntryName::RunKernel => self.run_kernel_offset,
            EntryName::Finalize => self.finalize_offset,
        };
        if offset == NO_ENTRY {
            Err(LoaderError::EntryNotFound)
        } else {
            Ok(offset)
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Test-only helper to build a well-formed image around a VM program,
    //! used by this crate's own tests and importable by `artiq-fw`'s.
    use super::*;
    use crate::vm::Instr;

    pub fn build_image(program: &[Instr], support: &[u8]) -> Vec<u8> {
        let code = crate::vm::encode_program(program);
        let mut out = Vec::with_capacity(HEADER_LEN + code.len() + support.len());
        out.extend_from_slice(&HEADER_MAGIC);
        out.extend_from_slice(&MACHINE_OR1K.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(code.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // bss_len
        out.extend_from_slice(&(support.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // run_kernel at offset 0
        out.extend_from_slice(&NO_ENTRY.to_le_bytes()); // no finalize
        out.extend_from_slice(&code);
        out.extend_from_slice(support);
        out
    }
}
