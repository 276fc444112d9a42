//! Session wire framing: `magic:u8 | type:u8 | len:u32_be | payload[len]`.
//!
//! The `magic` byte distinguishes the control channel from the kernel-RPC
//! sub-channel multiplexed on the same TCP connection. Everything but `len`
//! is little-endian; `len` is explicitly big-endian per the wire protocol
//! section.

use alloc::vec::Vec;

/// Control-channel requests and replies.
pub const MAGIC_CONTROL: u8 = 0x5A;
/// Kernel-RPC sub-channel, multiplexed on the same connection.
pub const MAGIC_KERNEL_RPC: u8 = 0x5B;

const HEADER_LEN: usize = 1 + 1 + 4;

/// One parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub magic: u8,
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

/// The request/reply vocabulary of the control channel, per the session
/// engine's dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Ident = 1,
    Log = 2,
    FlashRead = 3,
    FlashWrite = 4,
    FlashRemove = 5,
    FlashErase = 6,
    SwitchClock = 7,
    LoadKernel = 8,
    RunKernel = 9,
    RpcReply = 10,
    StopKernel = 11,
    /// A successful reply to any of the above.
    Reply = 12,
    /// An error reply, carrying an [`ErrorKind`] tag as the first payload
    /// byte.
    Error = 13,
    /// Runtime→host push on the kernel-RPC sub-channel: the running kernel
    /// is calling a host-side service and awaiting an `RpcReply`.
    RpcCall = 14,
}

impl MsgType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => MsgType::Ident,
            2 => MsgType::Log,
            3 => MsgType::FlashRead,
            4 => MsgType::FlashWrite,
            5 => MsgType::FlashRemove,
            6 => MsgType::FlashErase,
            7 => MsgType::SwitchClock,
            8 => MsgType::LoadKernel,
            9 => MsgType::RunKernel,
            10 => MsgType::RpcReply,
            11 => MsgType::StopKernel,
            12 => MsgType::Reply,
            13 => MsgType::Error,
            14 => MsgType::RpcCall,
            _ => return None,
        })
    }
}

/// Error taxonomy kinds carried in an `Error` reply's first payload byte,
/// matching the error handling design's kind-not-name taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    Protocol = 0,
    Resource = 1,
    KernelFault = 2,
    HardwareFault = 3,
    Unrecoverable = 4,
    /// A malformed or undersized kernel image (`S3` in the testable
    /// scenarios); distinct from a generic `KernelFault` so the host can
    /// tell "never loaded" from "loaded, then crashed".
    BadImage = 5,
    RtioUnderflow = 6,
}

impl ErrorKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => ErrorKind::Protocol,
            1 => ErrorKind::Resource,
            2 => ErrorKind::KernelFault,
            3 => ErrorKind::HardwareFault,
            4 => ErrorKind::Unrecoverable,
            5 => ErrorKind::BadImage,
            6 => ErrorKind::RtioUnderflow,
            _ => return None,
        })
    }
}

/// Errors raised while decoding frames from a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoError {
    UnknownMagic(u8),
    UnknownMsgType(u8),
    /// `len` would grow the frame past what a session is willing to buffer.
    PayloadTooLarge,
}

/// Maximum payload a single frame may declare before the decoder gives up
/// and reports a protocol error, bounding how much a malicious or
/// misbehaving peer can make the session buffer.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.magic);
        out.push(self.msg_type as u8);
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn reply(magic: u8, payload: Vec<u8>) -> Frame {
        Frame {
            magic,
            msg_type: MsgType::Reply,
            payload,
        }
    }

    /// An unsolicited kernel-RPC push announcing a call the kernel made
    /// into a host-side service.
    pub fn rpc_call(payload: Vec<u8>) -> Frame {
        Frame {
            magic: MAGIC_KERNEL_RPC,
            msg_type: MsgType::RpcCall,
            payload,
        }
    }

    pub fn error(magic: u8, kind: ErrorKind, message: &[u8]) -> Frame {
        let mut payload = Vec::with_capacity(1 + message.len());
        payload.push(kind as u8);
        payload.extend_from_slice(message);
        Frame {
            magic,
            msg_type: MsgType::Error,
            payload,
        }
    }
}

/// Incremental frame parser for a byte stream that may deliver data in
/// arbitrarily small chunks. The session engine never blocks the network
/// stack waiting for a full frame; it feeds whatever arrived and drains
/// whatever frames became complete.
#[derive(Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder { buf: Vec::new() }
    }

    /// Append newly received bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete frame out of the buffer, if one has arrived.
    pub fn poll(&mut self) -> Result<Option<Frame>, ProtoError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let magic = self.buf[0];
        if magic != MAGIC_CONTROL && magic != MAGIC_KERNEL_RPC {
            return Err(ProtoError::UnknownMagic(magic));
        }
        let msg_type =
            MsgType::from_u8(self.buf[1]).ok_or(ProtoError::UnknownMsgType(self.buf[1]))?;
        let len = u32::from_be_bytes(self.buf[2..6].try_into().unwrap()) as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(ProtoError::PayloadTooLarge);
        }
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        let payload = self.buf[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.buf.drain(0..HEADER_LEN + len);
        Ok(Some(Frame {
            magic,
            msg_type,
            payload,
        }))
    }
}
