//! The AMP (asymmetric multiprocessing) kernel host: the kernel runs on a
//! second core, reached only through the shared mailbox, with a relocated
//! syscall-stub blob installed alongside the image. The bytecode-stepping
//! loop is identical to the UP backend (see [`crate::runner`]); what's
//! specific here is refusing to start a kernel whose support blob never
//! arrived.

use alloc::vec::Vec;

use crate::host::{EntryPoint, KernelHost, RtioSink};
use crate::image::{KernelImage, LoaderError};
use crate::mailbox::{MailboxError, Message};
use crate::runner::KernelRunner;

pub struct AmpHost<S: RtioSink> {
    runner: KernelRunner<S>,
    support: Vec<u8>,
}

impl<S: RtioSink> AmpHost<S> {
    pub fn new(rtio: S) -> Self {
        AmpHost {
            runner: KernelRunner::new(rtio),
            support: Vec::new(),
        }
    }

    /// The syscall-stub blob carried in the most recently loaded image.
    pub fn support(&self) -> &[u8] {
        &self.support
    }
}

impl<S: RtioSink> KernelHost for AmpHost<S> {
    fn load(&mut self, image: KernelImage) -> Result<(), LoaderError> {
        self.support = image.support.clone();
        self.runner.load(image);
        Ok(())
    }

    fn start(&mut self, entry: EntryPoint) -> Result<(), LoaderError> {
        if self.support.is_empty() && entry == EntryPoint::RunKernel {
            return Err(LoaderError::EntryNotFound);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingRtioSink;
    use crate::image::{testing::build_image, EntryName};
    use crate::vm::Instr;

    #[test]
    fn refuses_to_start_without_a_support_blob() {
        let mut host = AmpHost::new(RecordingRtioSink::new(0));
        let bytes = build_image(&[Instr::Halt], &[]);
        let image = KernelImage::parse(&bytes, bytes.len()).unwrap();
        host.load(image).unwrap();
        assert_eq!(
            host.start(EntryName::RunKernel),
            Err(LoaderError::EntryNotFound)
        );
    }

    #[test]
    fn runs_to_completion_once_a_support_blob_is_present() {
        let mut host = AmpHost::new(RecordingRtioSink::new(0));
        let bytes = build_image(&[Instr::Halt], &[0xAA, 0xBB]);
        let image = KernelImage::parse(&bytes, bytes.len()).unwrap();
        host.load(image).unwrap();
        host.start(EntryName::RunKernel).unwrap();
        assert!(matches!(host.recv_mailbox(), Some(Message::NowSave(0))));
        assert!(matches!(
            host.recv_mailbox(),
            Some(Message::KernelRunFinished)
        ));
    }
}
