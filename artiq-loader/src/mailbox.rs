//! The shared mailbox connecting the session/runtime side of a kernel host
//! to the kernel side. Both the UP and AMP backends are built on the same
//! pair of one-deep slots; they differ only in how a real board would wake
//! the far side up, which this sandbox has no need to model.

use alloc::vec::Vec;
use spin::Mutex;

use crate::host::FaultKind;

/// A message carried across the mailbox in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KernelRunFinished,
    KernelException {
        kind: FaultKind,
        message: Vec<u8>,
        backtrace: Vec<u32>,
    },
    RpcCall {
        service_id: u32,
        arg_tag: u8,
        arg_bytes: Vec<u8>,
    },
    RpcReply { ret_tag: u8, ret_bytes: Vec<u8> },
    Log(Vec<u8>),
    NowSave(i64),
}

/// Errors raised by the mailbox itself, as opposed to the kernel host using
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    /// The addressed slot already holds an undelivered message. Real ARTIQ
    /// allows exactly one message in flight per direction; so do we.
    Full,
}

/// Two one-deep channels, one per direction.
#[derive(Default)]
pub struct Mailbox {
    to_kernel: Mutex<Option<Message>>,
    to_runtime: Mutex<Option<Message>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Mailbox {
            to_kernel: Mutex::new(None),
            to_runtime: Mutex::new(None),
        }
    }

    pub fn send_to_runtime(&self, message: Message) -> Result<(), MailboxError> {
        let mut slot = self.to_runtime.lock();
        if slot.is_some() {
            return Err(MailboxError::Full);
        }
        *slot = Some(message);
        Ok(())
    }

    pub fn take_to_runtime(&self) -> Option<Message> {
        self.to_runtime.lock().take()
    }

    pub fn to_runtime_occupied(&self) -> bool {
        self.to_runtime.lock().is_some()
    }

    pub fn send_to_kernel(&self, message: Message) -> Result<(), MailboxError> {
        let mut slot = self.to_kernel.lock();
        if slot.is_some() {
            return Err(MailboxError::Full);
        }
        *slot = Some(message);
        Ok(())
    }

    pub fn take_to_kernel(&self) -> Option<Message> {
        self.to_kernel.lock().take()
    }

    /// Clear both slots. Called when a kernel is stopped or a new one
    /// loaded, so a stale message can't leak into the next run.
    pub fn reset(&self) {
        *self.to_kernel.lock() = None;
        *self.to_runtime.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_send_without_drain_is_rejected() {
        let mailbox = Mailbox::new();
        mailbox.send_to_runtime(Message::KernelRunFinished).unwrap();
        assert_eq!(
            mailbox.send_to_runtime(Message::KernelRunFinished),
            Err(MailboxError::Full)
        );
        assert_eq!(mailbox.take_to_runtime(), Some(Message::KernelRunFinished));
        mailbox.send_to_runtime(Message::KernelRunFinished).unwrap();
    }

    #[test]
    fn reset_drops_pending_messages_in_both_directions() {
        let mailbox = Mailbox::new();
        mailbox.send_to_runtime(Message::KernelRunFinished).unwrap();
        mailbox
            .send_to_kernel(Message::RpcReply {
                ret_tag: 0,
                ret_bytes: Vec::new(),
            })
            .unwrap();
        mailbox.reset();
        assert_eq!(mailbox.take_to_runtime(), None);
        assert_eq!(mailbox.take_to_kernel(), None);
    }
}
