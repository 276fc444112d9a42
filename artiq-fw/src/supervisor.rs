//! Boot sequence and the top-level service loop (spec §4.8).
//!
//! `main.rs` is deliberately thin: board bring-up (masking interrupts,
//! wiring real CSRs) happens there, and everything that can be exercised
//! without real gateware lives here instead.

use alloc::vec::Vec;

use artiq_fs::Flash;
use artiq_loader::host::KernelHost;

use crate::clock::{ElapsedEvent, TimerCsr};
use crate::rtio::{Bridge, CsrBus};
use crate::serial::{Serial, UartCsr};
use crate::session::monitor::Monitor;
use crate::session::{ClockMux, Session};

/// A single boot-time LED, toggled three times during the test-mode window.
pub trait Leds {
    fn set(&mut self, on: bool);
}

const BLINK_PERIOD_MS: u32 = 100;
const BLINK_COUNT: u32 = 3;

/// Prints the boot banner and blinks the LED three times at 100 ms on/off,
/// watching for a `t`/`T` keypress the whole time. Returns `true` if test
/// mode was selected.
pub fn run_boot_sequence<L: Leds, U: UartCsr, T: TimerCsr>(
    leds: &mut L,
    serial: &mut Serial<U>,
    timer: &T,
) -> bool {
    serial.write_str("ARTIQ runtime built ");
    serial.write_str(crate::BUILD_IDENT);
    serial.write_str("\n");

    let mut test_mode = false;
    for _ in 0..BLINK_COUNT {
        leds.set(true);
        if poll_for(serial, timer, BLINK_PERIOD_MS) {
            test_mode = true;
        }
        leds.set(false);
        if poll_for(serial, timer, BLINK_PERIOD_MS) {
            test_mode = true;
        }
    }
    test_mode
}

/// Poll the UART for a test-mode keypress for up to `period_ms`, latching
/// the timer as we go so [`crate::clock::elapsed`] sees live values.
fn poll_for<U: UartCsr, T: TimerCsr>(serial: &mut Serial<U>, timer: &T, period_ms: u32) -> bool {
    crate::clock::latch(timer);
    let deadline = ElapsedEvent::now();
    let mut pressed = false;
    while !deadline.has_elapsed(period_ms) {
        if serial.poll_test_mode_keypress() {
            pressed = true;
        }
        crate::clock::latch(timer);
    }
    pressed
}

/// The steady-state `regular_main` body: drives one kernel-execution
/// backend's session engine plus the always-on bridge/DDS bring-up that
/// happens once at boot, independent of any particular network device.
pub struct ServiceLoop<'a, H: KernelHost, F: Flash, C: ClockMux, Csr: CsrBus> {
    session: Session<'a, H, F, C>,
    bridge: Bridge<Csr>,
}

impl<'a, H: KernelHost, F: Flash, C: ClockMux, Csr: CsrBus> ServiceLoop<'a, H, F, C, Csr> {
    /// Runs the fixed boot-time bring-up order: bridge start, DDS init,
    /// then an idempotent kernel stop so a warm reset never leaves a
    /// previous session's kernel resident.
    pub fn new(
        mut bridge: Bridge<Csr>,
        dds_channel_count: u32,
        mut session: Session<'a, H, F, C>,
    ) -> Self {
        bridge.brg_start();
        crate::rtio::ddsinitall(&mut bridge, dds_channel_count);
        session.reset();
        ServiceLoop { session, bridge }
    }

    pub fn bridge_mut(&mut self) -> &mut Bridge<Csr> {
        &mut self.bridge
    }

    pub fn session(&self) -> &Session<'a, H, F, C> {
        &self.session
    }

    /// One round of `lwip_service()` + `kserver_service()`: feed whatever
    /// control-port bytes arrived, drain anything the kernel mailbox
    /// produced on its own since the last tick, and answer whatever landed
    /// on the always-on monitor/injection port. The two ports are separate
    /// sockets, so their outbound bytes come back separately too.
    pub fn service_tick(&mut self, control_inbound: &[u8], monitor_inbound: &[u8]) -> ServiceOutput {
        let mut control_out = self.session.feed(control_inbound);
        control_out.extend(self.session.poll_kernel());

        let monitor_out = if monitor_inbound.is_empty() {
            Vec::new()
        } else {
            let mut monitor = Monitor::new(&mut self.bridge, self.session.is_kernel_active());
            monitor.handle(monitor_inbound)
        };

        ServiceOutput {
            control_out,
            monitor_out,
        }
    }
}

/// The two independent outbound byte streams a [`ServiceLoop::service_tick`]
/// can produce: the control session's replies, and the monitor/injection
/// port's reply to whatever request arrived on it this tick.
pub struct ServiceOutput {
    pub control_out: Vec<u8>,
    pub monitor_out: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use alloc::vec;
    use artiq_fs::flash::RamFlash;
    use artiq_fs::KvStore;
    use artiq_loader::host::testing::RecordingRtioSink;
    use artiq_loader::up::UpHost;
    use artiq_net::proto::{Frame, MsgType, MAGIC_CONTROL};
    use core::sync::atomic::{AtomicU32, Ordering};

    struct FakeLeds {
        flips: u32,
    }
    impl Leds for FakeLeds {
        fn set(&mut self, _on: bool) {
            self.flips += 1;
        }
    }

    struct FakeTimer(AtomicU32);
    impl TimerCsr for FakeTimer {
        fn ticks_ms(&self) -> u32 {
            self.0.fetch_add(50, Ordering::Relaxed)
        }
    }

    struct NullUart;
    impl UartCsr for NullUart {
        fn try_read(&mut self) -> Option<u8> {
            None
        }
        fn write(&mut self, _byte: u8) {}
    }

    struct KeypressUart {
        bytes: VecDeque<u8>,
    }
    impl UartCsr for KeypressUart {
        fn try_read(&mut self) -> Option<u8> {
            self.bytes.pop_front()
        }
        fn write(&mut self, _byte: u8) {}
    }

    #[test]
    fn boot_sequence_blinks_the_led_six_times() {
        let mut leds = FakeLeds { flips: 0 };
        let mut serial = Serial::new(NullUart);
        let timer = FakeTimer(AtomicU32::new(0));
        let test_mode = run_boot_sequence(&mut leds, &mut serial, &timer);
        assert_eq!(leds.flips, 6);
        assert!(!test_mode);
    }

    #[test]
    fn a_keypress_during_the_blink_window_selects_test_mode() {
        let mut leds = FakeLeds { flips: 0 };
        let mut serial = Serial::new(KeypressUart {
            bytes: VecDeque::from(vec![b't']),
        });
        let timer = FakeTimer(AtomicU32::new(0));
        assert!(run_boot_sequence(&mut leds, &mut serial, &timer));
    }

    struct FakeCsr {
        now: i64,
    }
    impl CsrBus for FakeCsr {
        fn brg_start(&mut self) {}
        fn rtio_now(&self) -> i64 {
            self.now
        }
        fn rtio_output(&mut self, _channel: u32, _timestamp: i64, _addr: u32, _data: u32) -> bool {
            true
        }
        fn dds_read(&mut self, _channel: u32, _addr: u32) -> u32 {
            0
        }
    }

    struct NoOpClock;
    impl ClockMux for NoOpClock {
        fn switch(&mut self, _source: u8) -> bool {
            true
        }
    }

    #[test]
    fn service_tick_answers_an_ident_request() {
        let flash = RamFlash::new(4096, 2);
        let store = KvStore::mount(flash).unwrap();
        let host = UpHost::new(RecordingRtioSink::new(0));
        let logger = crate::diag::RingLogger::new();
        let session = Session::new(host, store, NoOpClock, &logger);
        let bridge = Bridge::new(FakeCsr { now: 0 });
        let mut service = ServiceLoop::new(bridge, 0, session);

        let request = Frame {
            magic: MAGIC_CONTROL,
            msg_type: MsgType::Ident,
            payload: Vec::new(),
        }
        .encode();
        let out = service.service_tick(&request, &[]);
        assert!(!out.control_out.is_empty());
        assert!(out.monitor_out.is_empty());
    }

    #[test]
    fn service_tick_answers_a_monitor_probe_while_idle() {
        let flash = RamFlash::new(4096, 2);
        let store = KvStore::mount(flash).unwrap();
        let host = UpHost::new(RecordingRtioSink::new(0));
        let logger = crate::diag::RingLogger::new();
        let session = Session::new(host, store, NoOpClock, &logger);
        let bridge = Bridge::new(FakeCsr { now: 0 });
        let mut service = ServiceLoop::new(bridge, 0, session);

        let request = artiq_net::moninj_proto::MonInjRequest::MonitorProbe {
            channel: 0,
            enable: true,
        }
        .encode();
        let out = service.service_tick(&[], &request);
        assert!(out.control_out.is_empty());
        assert!(!out.monitor_out.is_empty());
    }
}
