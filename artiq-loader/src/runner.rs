//! Bytecode-stepping loop shared by both kernel host backends.
//!
//! UP and AMP differ in how a real board wakes the far side and whether a
//! support blob needs relocating first; the loop that drives a loaded
//! kernel forward between mailbox messages is identical, so it lives here
//! once and [`crate::up::UpHost`]/[`crate::amp::AmpHost`] just wrap it.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::cache::RpcCache;
use crate::host::{FaultKind, RtioSink};
use crate::image::{KernelImage, LoaderError};
use crate::mailbox::{Mailbox, MailboxError, Message};
use crate::vm::{KernelEvent, Vm};

pub(crate) struct KernelRunner<S: RtioSink> {
    rtio: S,
    mailbox: Mailbox,
    image: Option<KernelImage>,
    vm: Option<Vm>,
    pending: VecDeque<Message>,
    awaiting_rpc_reply: bool,
    /// `(tag, args)` of the call currently suspended on a reply, so the
    /// reply can be cached against the exact arguments that produced it.
    pending_rpc: Option<(i32, Vec<u8>)>,
    cache: RpcCache,
}

impl<S: RtioSink> KernelRunner<S> {
    pub(crate) fn new(rtio: S) -> Self {
        KernelRunner {
            rtio,
            mailbox: Mailbox::new(),
            image: None,
            vm: None,
            pending: VecDeque::new(),
            awaiting_rpc_reply: false,
            pending_rpc: None,
            cache: RpcCache::new(),
        }
    }

    pub(crate) fn load(&mut self, image: KernelImage) {
        self.vm = Some(Vm::new(image.code.clone()));
        self.image = Some(image);
        self.pending.clear();
        self.mailbox.reset();
        self.awaiting_rpc_reply = false;
        self.pending_rpc = None;
        self.cache.clear();
    }

    pub(crate) fn start(&mut self, entry: crate::image::EntryName) -> Result<(), LoaderError> {
        let offset = self
            .image
            .as_ref()
            .ok_or(LoaderError::NoImageLoaded)?
            .resolve(entry)?;
        self.vm
            .as_mut()
            .ok_or(LoaderError::NoImageLoaded)?
            .jump(offset);
        self.run_until_suspended();
        Ok(())
    }

    pub(crate) fn stop(&mut self) {
        self.vm = None;
        self.pending.clear();
        self.mailbox.reset();
        self.awaiting_rpc_reply = false;
        self.pending_rpc = None;
        self.cache.clear();
    }

    /// Deliver a reply to the kernel side via the mailbox's `to_kernel` slot,
    /// then resume the VM with it. Only ever used for `RpcReply`: the other
    /// `Message` variants are runtime-bound, never session-to-kernel.
    pub(crate) fn send_mailbox(&mut self, message: Message) -> Result<(), MailboxError> {
        if !matches!(message, Message::RpcReply { .. }) || !self.awaiting_rpc_reply {
            return Ok(());
        }
        self.mailbox.send_to_kernel(message)?;
        self.deliver_to_kernel();
        Ok(())
    }

    fn deliver_to_kernel(&mut self) {
        let Some(Message::RpcReply { ret_tag, ret_bytes }) = self.mailbox.take_to_kernel() else {
            return;
        };
        self.awaiting_rpc_reply = false;
        if let Some((tag, args)) = self.pending_rpc.take() {
            self.cache.put(tag, args, ret_tag, ret_bytes.clone());
        }
        if let Some(vm) = self.vm.as_mut() {
            vm.resume_rpc(ret_tag, ret_bytes);
        }
        self.run_until_suspended();
    }

    pub(crate) fn recv_mailbox(&mut self) -> Option<Message> {
        let message = self.mailbox.take_to_runtime();
        self.pump();
        message
    }

    fn emit(&mut self, message: Message) {
        self.pending.push_back(message);
        self.pump();
    }

    fn pump(&mut self) {
        if !self.mailbox.to_runtime_occupied() {
            if let Some(message) = self.pending.pop_front() {
                let _ = self.mailbox.send_to_runtime(message);
            }
        }
    }

    /// Step the VM until it needs the runtime's attention: an RPC call to
    /// answer, a fault to report, or a finished/crashed kernel to tear down.
    fn run_until_suspended(&mut self) {
        loop {
            let vm = match self.vm.as_mut() {
                Some(vm) => vm,
                None => return,
            };
            let event = vm.step();
            match event {
                Ok(KernelEvent::ScheduleRtio {
                    channel,
                    timestamp,
                    data,
                }) => match self.rtio.schedule(channel, timestamp, data) {
                    Ok(()) => continue,
                    Err(fault) => {
                        self.emit(Message::KernelException {
                            kind: FaultKind::RtioUnderflow,
                            message: alloc::format!(
                                "rtio underflow: channel {} at {}",
                                fault.channel, fault.timestamp
                            )
                            .into_bytes(),
                            backtrace: Vec::new(),
                        });
                        self.vm = None;
                        return;
                    }
                },
                Ok(KernelEvent::RpcCall {
                    service_id,
                    arg_tag,
                    arg_bytes,
                }) => {
                    let tag = service_id as i32;
                    if let Some((ret_tag, ret_bytes)) = self.cache.get(tag, &arg_bytes) {
                        let ret_bytes = ret_bytes.to_vec();
                        if let Some(vm) = self.vm.as_mut() {
                            vm.resume_rpc(ret_tag, ret_bytes);
                        }
                        continue;
                    }
                    self.pending_rpc = Some((tag, arg_bytes.clone()));
                    self.awaiting_rpc_reply = true;
                    self.emit(Message::RpcCall {
                        service_id,
                        arg_tag,
                        arg_bytes,
                    });
                    return;
                }
                Ok(KernelEvent::Fault { message }) => {
                    self.emit(Message::KernelException {
                        kind: FaultKind::Exception,
                        message,
                        backtrace: Vec::new(),
                    });
                    self.vm = None;
                    return;
                }
                Ok(KernelEvent::Finished) => {
                    self.emit(Message::NowSave(self.rtio.now()));
                    self.emit(Message::KernelRunFinished);
                    self.vm = None;
                    return;
                }
                Err(_decode_error) => {
                    self.emit(Message::KernelException {
                        kind: FaultKind::Exception,
                        message: Vec::from(&b"malformed kernel bytecode"[..]),
                        backtrace: Vec::new(),
                    });
                    self.vm = None;
                    return;
                }
            }
        }
    }
}
