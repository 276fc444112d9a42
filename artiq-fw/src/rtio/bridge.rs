//! The RTIO/DDS bridge: the runtime's own access to the fabric when no
//! kernel owns it, and the [`RtioSink`] a running kernel schedules events
//! through.
//!
//! Timing contract (spec §4.4): every write is issued at `now`, and `now`
//! is advanced by a platform-defined minimum gap afterwards. Ownership is
//! exclusive: the session engine may only call [`Bridge::direct_write`] in
//! `IDLE`; once a kernel runs, the bridge belongs to it until it exits or
//! is stopped.

use artiq_loader::host::{RtioFault, RtioSink};

use super::csr::CsrBus;

/// Minimum inter-write gap enforced between consecutive bridge writes,
/// expressed in RTIO coarse cycles. Board-variant specific in real
/// gateware; this is the conservative default used when no faster timing
/// has been characterized for a board.
pub const MIN_GAP_CYCLES: i64 = 8;

/// How far past the fabric's current cycle counter `brg_start` parks the
/// timeline cursor, so the first scheduled event always has headroom.
const START_OFFSET_CYCLES: i64 = 1_000;

pub struct Bridge<C: CsrBus> {
    csr: C,
    cursor: i64,
    started: bool,
}

impl<C: CsrBus> Bridge<C> {
    pub fn new(csr: C) -> Self {
        Bridge {
            csr,
            cursor: 0,
            started: false,
        }
    }

    /// Enable the bridge and park `now` at a safe future offset.
    /// Idempotent: calling this while already started leaves the cursor
    /// where it is rather than rewinding it.
    pub fn brg_start(&mut self) {
        if self.started {
            return;
        }
        self.csr.brg_start();
        self.cursor = self.csr.rtio_now() + START_OFFSET_CYCLES;
        self.started = true;
    }

    pub fn now(&self) -> i64 {
        self.cursor
    }

    /// A register write issued by the runtime itself rather than a kernel,
    /// used by the boot-time DDS init sequence and the test-mode REPL.
    /// Only meaningful while no kernel owns the bridge.
    pub fn direct_write(&mut self, channel: u32, addr: u32, data: u32) -> Result<(), RtioFault> {
        self.schedule_at(channel, self.cursor, addr, data)
    }

    pub fn direct_read(&mut self, channel: u32, addr: u32) -> u32 {
        self.csr.dds_read(channel, addr)
    }

    fn schedule_at(
        &mut self,
        channel: u32,
        timestamp: i64,
        addr: u32,
        data: u32,
    ) -> Result<(), RtioFault> {
        if timestamp <= self.csr.rtio_now() {
            return Err(RtioFault { channel, timestamp });
        }
        let accepted = self.csr.rtio_output(channel, timestamp, addr, data);
        if !accepted {
            return Err(RtioFault { channel, timestamp });
        }
        self.cursor = timestamp + MIN_GAP_CYCLES;
        Ok(())
    }
}

/// Kernels address the bridge purely through `schedule`/`now`; `addr` is
/// folded into the low bits of `data` by the kernel ABI (register address
/// selection is a DDS-shim concern, not an RTIO timeline concern), so this
/// impl treats every scheduled write as addr 0 on the channel's own
/// register file.
impl<C: CsrBus> RtioSink for Bridge<C> {
    fn schedule(&mut self, channel: u32, timestamp: i64, data: u32) -> Result<(), RtioFault> {
        self.schedule_at(channel, timestamp, 0, data)
    }

    fn now(&self) -> i64 {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    struct FakeCsr {
        now: i64,
        writes: Vec<(u32, i64, u32, u32)>,
    }

    impl CsrBus for FakeCsr {
        fn brg_start(&mut self) {}
        fn rtio_now(&self) -> i64 {
            self.now
        }
        fn rtio_output(&mut self, channel: u32, timestamp: i64, addr: u32, data: u32) -> bool {
            self.writes.push((channel, timestamp, addr, data));
            true
        }
        fn dds_read(&mut self, _channel: u32, _addr: u32) -> u32 {
            0
        }
    }

    #[test]
    fn brg_start_is_idempotent() {
        let mut bridge = Bridge::new(FakeCsr {
            now: 50,
            writes: Vec::new(),
        });
        bridge.brg_start();
        let cursor = bridge.now();
        bridge.brg_start();
        assert_eq!(bridge.now(), cursor);
    }

    #[test]
    fn scheduling_in_the_past_raises_rtio_fault() {
        let mut bridge = Bridge::new(FakeCsr {
            now: 1_000,
            writes: Vec::new(),
        });
        let err = bridge.schedule(3, 10, 0xAB).unwrap_err();
        assert_eq!(err.channel, 3);
        assert_eq!(err.timestamp, 10);
    }

    #[test]
    fn a_successful_schedule_advances_the_cursor_by_the_minimum_gap() {
        let mut bridge = Bridge::new(FakeCsr {
            now: 0,
            writes: Vec::new(),
        });
        bridge.schedule(1, 100, 0x42).unwrap();
        assert_eq!(bridge.now(), 100 + MIN_GAP_CYCLES);
    }
}
