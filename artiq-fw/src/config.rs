//! Board capability set, replacing the teacher's `#[cfg(CSR_*_BASE)]`
//! conditional compilation with a runtime-discovered capability bitset:
//! each bit reports whether a given CSR block is present on this gateware
//! build, so a feature missing from a smaller SoC variant disables cleanly
//! instead of failing to link.

use bitflags::bitflags;

bitflags! {
    /// Which memory-mapped register blocks this gateware build wired up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BoardCaps: u32 {
        const ETHMAC   = 1 << 0;
        const SPIFLASH = 1 << 1;
        const RTIO     = 1 << 2;
        const DDS      = 1 << 3;
        const TIMER0   = 1 << 4;
    }
}

impl BoardCaps {
    /// The capability set a fully populated board reports.
    pub const FULL: BoardCaps = BoardCaps::all();
}

/// Control-channel TCP port.
pub const SESSION_PORT: u16 = 1381;
/// Monitor/injection port, always listening regardless of session state.
pub const MONINJ_PORT: u16 = 1383;

/// SPI flash KV region geometry: two alternating sectors.
pub const FLASH_SECTOR_SIZE: usize = 64 * 1024;
pub const FLASH_SECTOR_COUNT: usize = 2;

/// Kernel heap reserved for the bump allocator.
pub const HEAP_SIZE: usize = 512 * 1024;
