//! The runtime's log ring: a fixed 4096-byte wraparound buffer backing both
//! the `log` facade (so `log::info!` etc. work everywhere in this crate)
//! and the session engine's `LOG` request, which drains it on demand.

use alloc::format;
use alloc::vec::Vec;
use spin::Mutex;

/// Total ring capacity. One byte is always reserved so a full-history
/// snapshot can still append the NUL terminator within this many bytes.
pub const RING_LEN: usize = 4096;

/// Fixed-size wraparound character buffer. Writes never block and never
/// fail; once full, the oldest bytes are silently overwritten.
pub struct LogRing {
    buf: [u8; RING_LEN],
    head: usize,
    wrapped: bool,
}

impl LogRing {
    pub const fn new() -> Self {
        LogRing {
            buf: [0; RING_LEN],
            head: 0,
            wrapped: false,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.buf[self.head] = byte;
            self.head += 1;
            if self.head == RING_LEN {
                self.head = 0;
                self.wrapped = true;
            }
        }
    }

    /// A linearized, NUL-terminated snapshot covering up to one full wrap
    /// of history: if wrapped, the tail-after-head region followed by the
    /// head-before-head region; otherwise just what's been written so far.
    /// Property 7: never more than `RING_LEN - 1` data bytes, and always
    /// the most recent ones.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RING_LEN);
        if self.wrapped {
            out.extend_from_slice(&self.buf[self.head..]);
            out.extend_from_slice(&self.buf[..self.head]);
        } else {
            out.extend_from_slice(&self.buf[..self.head]);
        }
        if out.len() > RING_LEN - 1 {
            let excess = out.len() - (RING_LEN - 1);
            out.drain(0..excess);
        }
        out.push(0);
        out
    }

    /// Snapshot and clear in one step, for the session engine's `LOG`
    /// request which drains the ring on read.
    pub fn take(&mut self) -> Vec<u8> {
        let out = self.snapshot();
        self.head = 0;
        self.wrapped = false;
        out
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`log::Log`] backend writing formatted records into a [`LogRing`].
/// Reentrant-safe only to the extent that updating `head` happens under a
/// single-CPU lock; there is no cross-CPU safety story, matching the
/// original single-threaded runtime CPU.
pub struct RingLogger {
    ring: Mutex<LogRing>,
}

impl RingLogger {
    pub const fn new() -> Self {
        RingLogger {
            ring: Mutex::new(LogRing::new()),
        }
    }

    pub fn log_get(&self) -> Vec<u8> {
        self.ring.lock().snapshot()
    }

    /// Snapshot and clear, for the `LOG` session request.
    pub fn log_take(&self) -> Vec<u8> {
        self.ring.lock().take()
    }

    /// Append bytes verbatim, bypassing the `[LEVEL] ` formatting `log()`
    /// applies. Used for kernel `LOG` mailbox messages, which already
    /// arrive as the exact bytes the kernel wrote.
    pub fn log_raw(&self, bytes: &[u8]) {
        self.ring.lock().write(bytes);
    }
}

impl Default for RingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl log::Log for RingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}\n", record.level(), record.args());
        self.ring.lock().write(line.as_bytes());
    }

    fn flush(&self) {}
}
