//! The capability the session engine needs from a kernel execution backend.
//!
//! The session engine must not know or care whether it's driving a UP or an
//! AMP board: both are exposed as exactly the same five operations here.

use crate::image::{KernelImage, LoaderError};
use crate::mailbox::{MailboxError, Message};

pub use crate::image::EntryName as EntryPoint;

/// What kind of fault ended a kernel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The kernel scheduled an RTIO event at or before the timeline cursor.
    RtioUnderflow,
    /// The kernel raised an exception.
    Exception,
    /// A memory-mapped register access targeted an unmapped channel.
    BusError,
}

/// An RTIO event that couldn't be scheduled because its timestamp had
/// already passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtioFault {
    pub channel: u32,
    pub timestamp: i64,
}

/// The RTIO/DDS bridge as seen by a running kernel: a place to schedule
/// timestamped register writes and read back the current timeline cursor.
/// Implemented for real by the RTIO bridge in the firmware crate, and by an
/// in-memory recorder here for loader-level tests.
pub trait RtioSink {
    fn schedule(&mut self, channel: u32, timestamp: i64, data: u32) -> Result<(), RtioFault>;
    fn now(&self) -> i64;
}

/// The five operations a kernel execution backend exposes to the session
/// engine. [`crate::up::UpHost`] and [`crate::amp::AmpHost`] are the two
/// implementations.
pub trait KernelHost {
    /// Accept a validated kernel image, discarding whatever ran before.
    fn load(&mut self, image: KernelImage) -> Result<(), LoaderError>;
    /// Resolve and jump to a named entry point, running until the kernel
    /// needs the runtime's attention (an RPC call, a fault, or exit).
    fn start(&mut self, entry: EntryPoint) -> Result<(), LoaderError>;
    /// Halt whatever kernel is running and discard its state. Safe to call
    /// on an already-idle host.
    fn stop(&mut self);
    /// Deliver a message to the kernel side (in practice, an RPC reply).
    fn send_mailbox(&mut self, message: Message) -> Result<(), MailboxError>;
    /// Drain the next message the kernel side produced, if any.
    fn recv_mailbox(&mut self) -> Option<Message>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! An in-memory [`RtioSink`] for tests that don't have real RTIO
    //! hardware: records every accepted event and faults on any timestamp
    //! at or before the current cursor, exactly like the real bridge.
    use super::*;
    use alloc::vec::Vec;

    pub struct RecordingRtioSink {
        pub events: Vec<(u32, i64, u32)>,
        now: i64,
    }

    impl RecordingRtioSink {
        pub fn new(now: i64) -> Self {
            RecordingRtioSink {
                events: Vec::new(),
                now,
            }
        }
    }

    impl RtioSink for RecordingRtioSink {
        fn schedule(&mut self, channel: u32, timestamp: i64, data: u32) -> Result<(), RtioFault> {
            if timestamp <= self.now {
                return Err(RtioFault { channel, timestamp });
            }
            self.now = timestamp;
            self.events.push((channel, timestamp, data));
            Ok(())
        }

        fn now(&self) -> i64 {
            self.now
        }
    }

}
