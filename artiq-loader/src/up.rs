//! The UP (uniprocessor) kernel host: the kernel program and the session
//! runtime share one CPU. "Sending" a mailbox message is a plain write into
//! a shared slot, and "starting" a kernel runs it inline until it blocks on
//! something only the runtime can answer.

use crate::host::{EntryPoint, KernelHost, RtioSink};
use crate::image::{KernelImage, LoaderError};
use crate::mailbox::{MailboxError, Message};
use crate::runner::KernelRunner;

pub struct UpHost<S: RtioSink> {
    runner: KernelRunner<S>,
}

impl<S: RtioSink> UpHost<S> {
    pub fn new(rtio: S) -> Self {
        UpHost {
            runner: KernelRunner::new(rtio),
        }
    }
}

impl<S: RtioSink> KernelHost for UpHost<S> {
    fn load(&mut self, image: KernelImage) -> Result<(), LoaderError> {
        self.runner.load(image);
        Ok(())
    }

    fn start(&mut self, entry: EntryPoint) -> Result<(), LoaderError> {
        self.runner.start(entry)
    }

    fn stop(&mut self) {
        self.runner.stop();
    }

    fn send_mailbox(&mut self, message: Message) -> Result<(), MailboxError> {
        self.runner.send_mailbox(message)
    }

    fn recv_mailbox(&mut self) -> Option<Message> {
        self.runner.recv_mailbox()
    }
}
