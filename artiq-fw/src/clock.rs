//! Monotonic millisecond clock, backed by a free-running `timer0` CSR.
//!
//! `clock_get_ms` wraps every 2^32 ms (~49.7 days); every comparison here
//! subtracts rather than compares directly so a wraparound mid-timeout
//! doesn't read as "already expired forever".

use core::sync::atomic::{AtomicU32, Ordering};

/// Board CSR access for the free-running timer. Implemented against real
/// `timer0_*` registers in production, and a plain counter in tests.
pub trait TimerCsr {
    /// Current tick count, incrementing once per millisecond.
    fn ticks_ms(&self) -> u32;
}

static CURRENT_MS: AtomicU32 = AtomicU32::new(0);

/// Latch the timer's current value into the cached monotonic clock. Called
/// once per service-loop iteration; reads of [`clock_get_ms`] in between
/// observe the last-latched value rather than re-touching the CSR on every
/// call site.
pub fn latch<T: TimerCsr>(timer: &T) {
    CURRENT_MS.store(timer.ticks_ms(), Ordering::Relaxed);
}

/// Monotonic millisecond tick, wrapping every ~49.7 days.
pub fn clock_get_ms() -> u32 {
    CURRENT_MS.load(Ordering::Relaxed)
}

/// Alias used by the network stack's timer source.
pub fn sys_now() -> u32 {
    clock_get_ms()
}

/// `true` once `period` milliseconds have elapsed since `since`, using
/// wraparound-safe subtraction rather than `now >= since + period`.
pub fn elapsed(since: u32, period: u32) -> bool {
    clock_get_ms().wrapping_sub(since) >= period
}

/// A single-shot elapsed-time tracker, matching the teacher's usage in the
/// boot-time LED blink and other polling loops.
pub struct ElapsedEvent {
    since: u32,
}

impl ElapsedEvent {
    pub fn now() -> Self {
        ElapsedEvent {
            since: clock_get_ms(),
        }
    }

    pub fn has_elapsed(&self, period: u32) -> bool {
        elapsed(self.since, period)
    }

    pub fn reset(&mut self) {
        self.since = clock_get_ms();
    }
}
