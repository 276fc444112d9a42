//! Kernel image loading and the UP/AMP kernel execution hosts.
//!
//! The session engine only ever sees a [`KernelHost`]: `{load, start, stop,
//! send_mailbox, recv_mailbox}` (see the spec's `KernelHost` capability
//! redesign note). [`up::UpHost`] and [`amp::AmpHost`] are two independent
//! implementations that differ only in how they drive the sandboxed kernel
//! program forward between mailbox polls; neither leaks into the session
//! engine's view of the world.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod amp;
pub mod cache;
pub mod host;
pub mod image;
pub mod mailbox;
mod runner;
pub mod up;
pub mod vm;

pub use cache::RpcCache;
pub use host::{EntryPoint, FaultKind, KernelHost, RtioFault, RtioSink};
pub use image::{KernelImage, LoaderError};
pub use mailbox::{Mailbox, MailboxError, Message};
