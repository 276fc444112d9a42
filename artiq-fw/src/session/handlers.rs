//! Per-request-type logic for the control session. Kept out of `mod.rs` so
//! the state machine's framing/buffering concerns stay separate from what
//! each request actually does.

use alloc::vec;
use alloc::vec::Vec;

use artiq_fs::Flash;
use artiq_loader::host::{EntryPoint, FaultKind, KernelHost};
use artiq_loader::image::{KernelImage, LoaderError};
use artiq_loader::mailbox::Message;
use artiq_net::proto::{ErrorKind, Frame, MsgType, MAGIC_CONTROL, MAGIC_KERNEL_RPC};
use artiq_net::rpc_proto;

use super::{out_of_state_error, ClockMux, Session, SessionState};

/// Route one decoded frame to its handler, honoring the session's current
/// state.
pub(super) fn dispatch<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    frame: Frame,
) -> Vec<Frame> {
    if session.state.is_kernel_active() {
        return match frame.msg_type {
            MsgType::RpcReply => handle_rpc_reply(session, &frame.payload),
            MsgType::StopKernel => handle_stop_kernel(session),
            _ => vec![out_of_state_error(b"kernel is running")],
        };
    }
    match frame.msg_type {
        MsgType::Ident => vec![handle_ident()],
        MsgType::Log => vec![handle_log(session)],
        MsgType::FlashRead => vec![handle_flash_read(session, &frame.payload)],
        MsgType::FlashWrite => vec![handle_flash_write(session, &frame.payload)],
        MsgType::FlashRemove => vec![handle_flash_remove(session, &frame.payload)],
        MsgType::FlashErase => vec![handle_flash_erase(session)],
        MsgType::SwitchClock => vec![handle_switch_clock(session, &frame.payload)],
        MsgType::LoadKernel => vec![handle_load_kernel(session, &frame.payload)],
        MsgType::RunKernel => handle_run_kernel(session, &frame.payload),
        MsgType::StopKernel => handle_stop_kernel(session),
        _ => vec![out_of_state_error(b"unexpected request in IDLE")],
    }
}

fn handle_ident() -> Frame {
    Frame::reply(MAGIC_CONTROL, crate::BUILD_IDENT.as_bytes().to_vec())
}

fn handle_log<H: KernelHost, F: Flash, C: ClockMux>(session: &mut Session<'_, H, F, C>) -> Frame {
    Frame::reply(MAGIC_CONTROL, session.log.log_take())
}

fn handle_flash_read<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    key: &[u8],
) -> Frame {
    let mut buf = [0u8; 4096];
    match session.store.fs_read(key, &mut buf) {
        // Absent: fall back to the documented ASCII default for the four
        // network-identity keys, empty payload for everything else.
        Ok(0) => Frame::reply(MAGIC_CONTROL, crate::flash_cfg::default_text(key).unwrap_or_default()),
        Ok(len) => Frame::reply(MAGIC_CONTROL, buf[..len].to_vec()),
        Err(e) => Frame::error(MAGIC_CONTROL, flash_error_kind(e), alloc::format!("{e}").as_bytes()),
    }
}

fn handle_flash_write<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    payload: &[u8],
) -> Frame {
    let Some((&key_len, rest)) = payload.split_first() else {
        return Frame::error(MAGIC_CONTROL, ErrorKind::Protocol, b"empty FLASH_WRITE payload");
    };
    let key_len = key_len as usize;
    if rest.len() < key_len {
        return Frame::error(MAGIC_CONTROL, ErrorKind::Protocol, b"truncated FLASH_WRITE key");
    }
    let (key, value) = rest.split_at(key_len);
    match session.store.fs_write(key, value) {
        Ok(()) => Frame::reply(MAGIC_CONTROL, Vec::new()),
        Err(e) => Frame::error(MAGIC_CONTROL, flash_error_kind(e), alloc::format!("{e}").as_bytes()),
    }
}

fn handle_flash_remove<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    key: &[u8],
) -> Frame {
    match session.store.fs_remove(key) {
        Ok(()) => Frame::reply(MAGIC_CONTROL, Vec::new()),
        Err(e) => Frame::error(MAGIC_CONTROL, flash_error_kind(e), alloc::format!("{e}").as_bytes()),
    }
}

fn handle_flash_erase<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
) -> Frame {
    match session.store.fs_erase() {
        Ok(()) => Frame::reply(MAGIC_CONTROL, Vec::new()),
        Err(e) => Frame::error(MAGIC_CONTROL, flash_error_kind(e), alloc::format!("{e}").as_bytes()),
    }
}

fn flash_error_kind(_e: artiq_fs::KvError) -> ErrorKind {
    ErrorKind::Resource
}

fn handle_switch_clock<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    payload: &[u8],
) -> Frame {
    match payload.first() {
        Some(&source) if session.clock.switch(source) => Frame::reply(MAGIC_CONTROL, Vec::new()),
        Some(_) => Frame::error(MAGIC_CONTROL, ErrorKind::Resource, b"unsupported clock source"),
        None => Frame::error(MAGIC_CONTROL, ErrorKind::Protocol, b"missing clock source"),
    }
}

fn handle_load_kernel<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    image_bytes: &[u8],
) -> Frame {
    session.state = SessionState::KernelLoading;
    let reply = match KernelImage::parse(image_bytes, image_bytes.len()) {
        Ok(image) => match session.host.load(image) {
            Ok(()) => Frame::reply(MAGIC_CONTROL, Vec::new()),
            Err(e) => load_error_frame(e),
        },
        Err(e) => load_error_frame(e),
    };
    // IDLE -> KERNEL_LOADING -> IDLE on both success and failure: a bad
    // image never leaves a half-loaded kernel resident.
    session.state = SessionState::Idle;
    reply
}

/// A malformed header (`S3`) is `BAD_IMAGE`; a well-formed image that simply
/// doesn't fit (oversized code/BSS or support blob) is a resource error.
fn load_error_frame(e: LoaderError) -> Frame {
    let kind = if e.is_bad_image() {
        ErrorKind::BadImage
    } else {
        ErrorKind::Resource
    };
    Frame::error(MAGIC_CONTROL, kind, alloc::format!("{e}").as_bytes())
}

fn parse_entry(name: &[u8]) -> Option<EntryPoint> {
    match name {
        b"run_kernel" => Some(EntryPoint::RunKernel),
        b"finalize" => Some(EntryPoint::Finalize),
        _ => None,
    }
}

fn handle_run_kernel<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    payload: &[u8],
) -> Vec<Frame> {
    let Some(entry) = parse_entry(payload) else {
        return vec![Frame::error(MAGIC_CONTROL, ErrorKind::Protocol, b"unknown entry point")];
    };
    match session.host.start(entry) {
        Ok(()) => {
            session.state = SessionState::KernelRunning;
            session.last_now = 0;
            drain_mailbox(session)
        }
        Err(e) => vec![Frame::error(MAGIC_CONTROL, ErrorKind::KernelFault, alloc::format!("{e}").as_bytes())],
    }
}

fn handle_rpc_reply<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    payload: &[u8],
) -> Vec<Frame> {
    let Some((&ret_tag, ret_bytes)) = payload.split_first() else {
        return vec![Frame::error(MAGIC_KERNEL_RPC, ErrorKind::Protocol, b"empty RPC_REPLY")];
    };
    if rpc_value_is_malformed(ret_tag, ret_bytes) {
        return vec![Frame::error(
            MAGIC_KERNEL_RPC,
            ErrorKind::Protocol,
            b"malformed RPC_REPLY value encoding",
        )];
    }
    let message = Message::RpcReply {
        ret_tag,
        ret_bytes: ret_bytes.to_vec(),
    };
    session.state = SessionState::RpcReply;
    match session.host.send_mailbox(message) {
        Ok(()) => drain_mailbox(session),
        Err(_) => {
            session.state = SessionState::RpcWait;
            vec![Frame::error(MAGIC_KERNEL_RPC, ErrorKind::Protocol, b"no RPC call is outstanding")]
        }
    }
}

fn handle_stop_kernel<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
) -> Vec<Frame> {
    session.host.stop();
    session.state = SessionState::Idle;
    vec![Frame::reply(MAGIC_CONTROL, terminal_payload(session, &[]))]
}

/// Build a terminal reply payload: `extra_len:u32_le | extra | last_now:i64_le
/// | log_bytes`. `extra` carries a fault message for error replies, empty
/// otherwise. The log ring is snapshotted and cleared in the same step that
/// builds this payload, so a caller never observes a terminal reply without
/// the log entries that led up to it, nor a later `LOG` request replaying
/// them.
fn terminal_payload<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
    extra: &[u8],
) -> Vec<u8> {
    let log_snapshot = session.log.log_take();
    let mut payload = Vec::with_capacity(4 + extra.len() + 8 + log_snapshot.len());
    payload.extend_from_slice(&(extra.len() as u32).to_le_bytes());
    payload.extend_from_slice(extra);
    payload.extend_from_slice(&session.last_now.to_le_bytes());
    payload.extend_from_slice(&log_snapshot);
    payload
}

/// Drain whatever the kernel host's mailbox has queued, translating it
/// into zero or more frames to send. Stops at the first message that
/// either suspends (`RpcCall`) or terminates (`KernelRunFinished`,
/// `KernelException`) the run, since nothing more can have been queued
/// behind a suspension point.
pub(super) fn drain_mailbox<H: KernelHost, F: Flash, C: ClockMux>(
    session: &mut Session<'_, H, F, C>,
) -> Vec<Frame> {
    let mut out = Vec::new();
    while let Some(message) = session.host.recv_mailbox() {
        match message {
            Message::NowSave(cursor) => {
                session.last_now = cursor;
            }
            Message::Log(bytes) => {
                session.log.log_raw(&bytes);
            }
            Message::KernelRunFinished => {
                session.state = SessionState::Idle;
                let payload = terminal_payload(session, &[]);
                out.push(Frame::reply(MAGIC_CONTROL, payload));
                break;
            }
            Message::KernelException {
                kind,
                message,
                backtrace: _,
            } => {
                session.state = SessionState::Idle;
                let payload = terminal_payload(session, &message);
                out.push(Frame::error(MAGIC_CONTROL, fault_error_kind(kind), &payload));
                break;
            }
            Message::RpcCall {
                service_id,
                arg_tag,
                arg_bytes,
            } => {
                if rpc_value_is_malformed(arg_tag, &arg_bytes) {
                    session.state = SessionState::Idle;
                    let fault = terminal_payload(session, b"malformed RPC argument encoding");
                    out.push(Frame::error(MAGIC_CONTROL, ErrorKind::KernelFault, &fault));
                    break;
                }
                session.state = SessionState::RpcWait;
                let mut payload = Vec::with_capacity(5 + arg_bytes.len());
                payload.extend_from_slice(&service_id.to_le_bytes());
                payload.push(arg_tag);
                payload.extend_from_slice(&arg_bytes);
                out.push(Frame::rpc_call(payload));
                break;
            }
            Message::RpcReply { .. } => {
                // Only ever queued toward the kernel, never observed here.
            }
        }
    }
    out
}

/// `tag` and `body` are the wire split of an RPC argument or return value
/// (first byte, rest); reassembled and run through the tagged-value decoder
/// so a call/reply whose bytes don't describe a well-formed `RpcValue` is
/// caught here rather than handed to the kernel or the host opaquely.
fn rpc_value_is_malformed(tag: u8, body: &[u8]) -> bool {
    let mut encoded = vec![tag];
    encoded.extend_from_slice(body);
    rpc_proto::decode(&encoded).is_err()
}

fn fault_error_kind(kind: FaultKind) -> ErrorKind {
    match kind {
        FaultKind::RtioUnderflow => ErrorKind::RtioUnderflow,
        FaultKind::Exception => ErrorKind::KernelFault,
        FaultKind::BusError => ErrorKind::HardwareFault,
    }
}
