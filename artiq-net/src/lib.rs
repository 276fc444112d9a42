//! Session wire framing, the RPC argument/return tag format, the minimal
//! monitor/injection protocol, and the PPP/Ethernet device shims that feed
//! smoltcp. Everything a kernel's host connection needs that isn't loader
//! or flash-store business lives here.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod device;
pub mod hdlc;
pub mod moninj_proto;
pub mod ppp;
pub mod proto;
pub mod rpc_proto;
pub mod shim;

pub use proto::{ErrorKind, Frame, FrameDecoder, MsgType};
pub use shim::{NetConfig, NetShim};
