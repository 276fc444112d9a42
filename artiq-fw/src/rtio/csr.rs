//! Raw register access to the RTIO/DDS gateware block.
//!
//! The CSR surface is "consumed from gateware, not defined here": real
//! addresses and bit layouts come from the generated `csr.csv` for a given
//! board build. This trait is the seam that lets [`super::bridge::Bridge`]
//! stay portable across boards and swap in an in-memory fake for tests.

/// Memory-mapped access to the `rtio_*` and `dds_*` CSR blocks.
pub trait CsrBus {
    /// Raise the bridge's `now` cursor to a safe future offset and enable
    /// the fabric. Idempotent.
    fn brg_start(&mut self);

    /// Current value of the RTIO fabric's coarse cycle counter.
    fn rtio_now(&self) -> i64;

    /// Issue a timestamped write to `channel`/`addr`. The fabric rejects
    /// (and reports) writes at or before its current cycle counter.
    fn rtio_output(&mut self, channel: u32, timestamp: i64, addr: u32, data: u32) -> bool;

    /// Read back a DDS register. Only valid when no kernel owns the bridge.
    fn dds_read(&mut self, channel: u32, addr: u32) -> u32;
}
