//! The control-session state machine (spec §4.6): a single-threaded engine
//! consuming framed bytes off one TCP connection and driving the loader,
//! the flash KV store, and the log ring in response.
//!
//! Only one control session may be active at a time; a second connection
//! attempt while one is already open is refused by the caller before a
//! [`Session`] is even constructed (see [`Session::is_idle`]).

mod handlers;
pub mod monitor;

use alloc::vec::Vec;

use artiq_fs::Flash;
use artiq_loader::host::KernelHost;
use artiq_net::proto::{Frame, FrameDecoder, MAGIC_CONTROL};

use crate::diag::RingLogger;

/// Where the session currently is in the request/reply protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No kernel is resident or running; any control request is valid.
    Idle,
    /// Transient: validating and copying a `LOAD_KERNEL` image into the
    /// kernel memory window. Never observed across a `feed` call boundary.
    KernelLoading,
    /// A kernel is executing and has not suspended on an RPC.
    KernelRunning,
    /// The kernel has called into a host-side service and is suspended
    /// until `RPC_REPLY` arrives.
    RpcWait,
    /// Transient: an `RPC_REPLY` has arrived and is being delivered to the
    /// kernel mailbox, possibly resuming it to completion inline.
    RpcReply,
    /// Transient: the session is being torn down (disconnect or a fresh
    /// `session_end`), forcing any running kernel to stop.
    Closing,
}

impl SessionState {
    /// `true` once a kernel is loaded and running in some form — whether
    /// actively stepping or suspended on an RPC reply.
    fn is_kernel_active(self) -> bool {
        matches!(
            self,
            SessionState::KernelRunning | SessionState::RpcWait | SessionState::RpcReply
        )
    }
}

/// Reconfigures the RTIO reference clock mux for `SWITCH_CLOCK`.
/// Implemented against the real clock-select CSR in production and a
/// recording fake in tests.
pub trait ClockMux {
    /// Returns `false` if `source` is not a clock the board exposes.
    fn switch(&mut self, source: u8) -> bool;
}

/// The control-session engine. Generic over the kernel execution backend,
/// the flash device, and the clock mux so the same state machine runs
/// against real hardware or an in-memory test harness.
pub struct Session<'a, H: KernelHost, F: Flash, C: ClockMux> {
    decoder: FrameDecoder,
    state: SessionState,
    host: H,
    store: artiq_fs::KvStore<F>,
    clock: C,
    log: &'a RingLogger,
    /// The last `NOW_SAVE` cursor reported by the kernel currently (or most
    /// recently) running, folded into the terminal reply to `RUN_KERNEL`.
    last_now: i64,
}

impl<'a, H: KernelHost, F: Flash, C: ClockMux> Session<'a, H, F, C> {
    pub fn new(host: H, store: artiq_fs::KvStore<F>, clock: C, log: &'a RingLogger) -> Self {
        Session {
            decoder: FrameDecoder::new(),
            state: SessionState::Idle,
            host,
            store,
            clock,
            log,
            last_now: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a new control connection may be accepted against this
    /// session slot. Enforces "single active session": a fresh connection
    /// is only let in once this one is back at `Idle`.
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    /// Whether a kernel currently owns the bridge, for the monitor port's
    /// "no kernel running" precondition on direct probe/inject access.
    pub fn is_kernel_active(&self) -> bool {
        self.state.is_kernel_active()
    }

    /// Feed newly received bytes and return whatever frames (encoded,
    /// concatenated) the session wants written back. Never blocks: if a
    /// frame is incomplete, this simply buffers it and returns nothing.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.decoder.feed(bytes);
        let mut out = Vec::new();
        loop {
            match self.decoder.poll() {
                Ok(Some(frame)) => {
                    for reply in handlers::dispatch(self, frame) {
                        out.extend_from_slice(&reply.encode());
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    // A malformed frame invalidates the byte stream; the
                    // caller policy is to close the connection, so stop
                    // processing and let it do so.
                    break;
                }
            }
        }
        out
    }

    /// Called once per service-loop iteration regardless of whether new
    /// bytes arrived, so a kernel fault or completion that the mailbox
    /// picked up between `feed` calls is still reported promptly.
    pub fn poll_kernel(&mut self) -> Vec<u8> {
        if !self.state.is_kernel_active() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for frame in handlers::drain_mailbox(self) {
            out.extend_from_slice(&frame.encode());
        }
        out
    }

    /// Forces the session back to a clean `IDLE`, halting any running
    /// kernel. Used on disconnect and at boot (`session_end`).
    pub fn reset(&mut self) {
        self.state = SessionState::Closing;
        self.host.stop();
        self.decoder = FrameDecoder::new();
        self.state = SessionState::Idle;
        self.last_now = 0;
    }
}

fn out_of_state_error(message: &[u8]) -> Frame {
    Frame::error(
        MAGIC_CONTROL,
        artiq_net::proto::ErrorKind::Protocol,
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use artiq_fs::flash::RamFlash;
    use artiq_fs::KvStore;
    use artiq_loader::host::testing::RecordingRtioSink;
    use artiq_loader::image::testing::build_image;
    use artiq_loader::up::UpHost;
    use artiq_loader::vm::Instr;
    use artiq_net::proto::{ErrorKind, MsgType, MAGIC_KERNEL_RPC};
    use artiq_net::rpc_proto::{self, RpcValue};

    struct NoOpClock;
    impl ClockMux for NoOpClock {
        fn switch(&mut self, _source: u8) -> bool {
            true
        }
    }

    fn new_session<'a>(
        log: &'a RingLogger,
    ) -> Session<'a, UpHost<RecordingRtioSink>, RamFlash, NoOpClock> {
        let flash = RamFlash::new(4096, 2);
        let store = KvStore::mount(flash).unwrap();
        let host = UpHost::new(RecordingRtioSink::new(0));
        Session::new(host, store, NoOpClock, log)
    }

    fn request(msg_type: MsgType, payload: Vec<u8>) -> Vec<u8> {
        Frame {
            magic: MAGIC_CONTROL,
            msg_type,
            payload,
        }
        .encode()
    }

    fn only_frame(bytes: &[u8]) -> Frame {
        let mut decoder = FrameDecoder::new();
        decoder.feed(bytes);
        let frame = decoder.poll().unwrap().expect("one frame");
        assert_eq!(decoder.poll().unwrap(), None);
        frame
    }

    #[test]
    fn ident_reply_contains_the_build_marker() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let reply = only_frame(&session.feed(&request(MsgType::Ident, Vec::new())));
        assert_eq!(reply.msg_type, MsgType::Reply);
        let text = core::str::from_utf8(&reply.payload).unwrap();
        assert!(text.contains("ARTIQ runtime built"));
    }

    #[test]
    fn a_malformed_image_is_rejected_and_the_session_stays_idle() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let junk = alloc::vec![0u8; 12];
        let reply = only_frame(&session.feed(&request(MsgType::LoadKernel, junk)));
        assert_eq!(reply.msg_type, MsgType::Error);
        assert_eq!(reply.payload[0], ErrorKind::BadImage as u8);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn an_oversized_support_blob_is_a_resource_error_not_bad_image() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let support = alloc::vec![0u8; artiq_loader::image::MAX_SUPPORT_LEN + 1];
        let image = build_image(&[Instr::Halt], &support);
        let reply = only_frame(&session.feed(&request(MsgType::LoadKernel, image)));
        assert_eq!(reply.msg_type, MsgType::Error);
        assert_eq!(reply.payload[0], ErrorKind::Resource as u8);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn a_kernel_that_calls_out_and_exits_reports_kernel_run_finished() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let arg = rpc_proto::encode(&RpcValue::Int32(42));
        let (&arg_tag, arg_body) = arg.split_first().unwrap();
        let image = build_image(
            &[
                Instr::RpcCall {
                    service_id: 1,
                    arg_tag,
                    arg_bytes: arg_body.to_vec(),
                },
                Instr::Halt,
            ],
            &[],
        );
        let load_reply = only_frame(&session.feed(&request(MsgType::LoadKernel, image)));
        assert_eq!(load_reply.msg_type, MsgType::Reply);

        let run_reply = only_frame(&session.feed(&request(MsgType::RunKernel, b"run_kernel".to_vec())));
        assert_eq!(run_reply.msg_type, MsgType::RpcCall);
        assert_eq!(run_reply.magic, MAGIC_KERNEL_RPC);
        assert_eq!(session.state(), SessionState::RpcWait);

        let reply_payload = rpc_proto::encode(&RpcValue::Int32(84));
        let finish_reply = only_frame(&session.feed(&request(MsgType::RpcReply, reply_payload)));
        assert_eq!(finish_reply.msg_type, MsgType::Reply);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(&finish_reply.payload[..4], &0u32.to_le_bytes());
    }

    #[test]
    fn an_rpc_reply_with_a_malformed_value_encoding_is_rejected() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let arg = rpc_proto::encode(&RpcValue::Int32(42));
        let (&arg_tag, arg_body) = arg.split_first().unwrap();
        let image = build_image(
            &[
                Instr::RpcCall {
                    service_id: 1,
                    arg_tag,
                    arg_bytes: arg_body.to_vec(),
                },
                Instr::Halt,
            ],
            &[],
        );
        only_frame(&session.feed(&request(MsgType::LoadKernel, image)));
        only_frame(&session.feed(&request(MsgType::RunKernel, b"run_kernel".to_vec())));

        // Tag 2 is `Int32`, which needs a 4-byte body; one trailing byte
        // doesn't decode to a well-formed value.
        let bad_reply = alloc::vec![2u8, 0];
        let reply = only_frame(&session.feed(&request(MsgType::RpcReply, bad_reply)));
        assert_eq!(reply.msg_type, MsgType::Error);
        assert_eq!(reply.payload[0], ErrorKind::Protocol as u8);
        // Rejected before delivery, so the kernel is still waiting.
        assert_eq!(session.state(), SessionState::RpcWait);
    }

    #[test]
    fn scheduling_in_the_past_reports_rtio_underflow() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let image = build_image(
            &[
                Instr::ScheduleAt {
                    channel: 0,
                    timestamp: -1_000,
                    data: 0,
                },
                Instr::Halt,
            ],
            &[],
        );
        only_frame(&session.feed(&request(MsgType::LoadKernel, image)));
        let run_reply = only_frame(&session.feed(&request(MsgType::RunKernel, b"run_kernel".to_vec())));
        assert_eq!(run_reply.msg_type, MsgType::Error);
        assert_eq!(run_reply.payload[0], ErrorKind::RtioUnderflow as u8);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn flash_read_of_mac_on_blank_flash_returns_the_documented_default() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let reply = only_frame(&session.feed(&request(MsgType::FlashRead, b"mac".to_vec())));
        assert_eq!(reply.msg_type, MsgType::Reply);
        assert_eq!(reply.payload, b"10:e2:d5:32:50:00");
    }

    #[test]
    fn flash_write_then_read_of_ip_round_trips_the_overridden_value() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let mut write_payload = alloc::vec![2u8]; // key_len
        write_payload.extend_from_slice(b"ip");
        write_payload.extend_from_slice(b"192.168.1.50");
        only_frame(&session.feed(&request(MsgType::FlashWrite, write_payload)));

        let reply = only_frame(&session.feed(&request(MsgType::FlashRead, b"ip".to_vec())));
        assert_eq!(reply.payload, b"192.168.1.50");
    }

    #[test]
    fn stop_kernel_while_idle_is_a_harmless_no_op() {
        let logger = RingLogger::new();
        let mut session = new_session(&logger);
        let reply = only_frame(&session.feed(&request(MsgType::StopKernel, Vec::new())));
        assert_eq!(reply.msg_type, MsgType::Reply);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn a_terminal_reply_carries_the_log_entries_that_led_up_to_it_and_clears_the_ring() {
        let logger = RingLogger::new();
        logger.log_raw(b"boot diagnostics\n");
        let mut session = new_session(&logger);
        let reply = only_frame(&session.feed(&request(MsgType::StopKernel, Vec::new())));
        let extra_len = u32::from_le_bytes(reply.payload[0..4].try_into().unwrap()) as usize;
        let log_bytes = &reply.payload[4 + extra_len + 8..];
        assert_eq!(log_bytes, b"boot diagnostics\n");
        assert_eq!(logger.log_take(), Vec::<u8>::new());
    }
}
