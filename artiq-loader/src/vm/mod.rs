//! A sandboxed interpreter for kernel bytecode.
//!
//! Real ARTIQ kernels compile to OR1K machine code and run directly on the
//! target core. There is no such core here, so this crate gives a kernel
//! image a tiny bytecode program instead and interprets it one instruction
//! at a time, the same way the teacher's WASM host steps a guest module
//! between calls into host functions. Every state transition a real kernel
//! can cause — scheduling an RTIO event, calling out over RPC, raising an
//! exception, returning — shows up here as one [`KernelEvent`], which is all
//! [`crate::host::KernelHost`] implementations need to drive a session.

mod opcode;

pub use opcode::{decode_one, encode_program, Instr, VmError};

use alloc::vec::Vec;

/// A single step's worth of news from a running kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    ScheduleRtio { channel: u32, timestamp: i64, data: u32 },
    RpcCall {
        service_id: u32,
        arg_tag: u8,
        arg_bytes: Vec<u8>,
    },
    Fault { message: Vec<u8> },
    Finished,
}

/// Interpreter state for one loaded kernel's program.
pub struct Vm {
    code: Vec<u8>,
    pc: usize,
    halted: bool,
}

impl Vm {
    pub fn new(code: Vec<u8>) -> Self {
        Vm {
            code,
            pc: 0,
            halted: true,
        }
    }

    /// Set the program counter to a resolved entry offset and mark the VM
    /// runnable.
    pub fn jump(&mut self, offset: u32) {
        self.pc = offset as usize;
        self.halted = false;
    }

    /// Continue a kernel that suspended on an `RpcCall` event now that the
    /// runtime has delivered a reply. The VM doesn't model a return-value
    /// register itself; callers that care about the reply payload keep it
    /// alongside their own bookkeeping.
    pub fn resume_rpc(&mut self, _ret_tag: u8, _ret_bytes: Vec<u8>) {
        self.halted = false;
    }

    /// Execute exactly one instruction and report what it did. Once halted
    /// (by `Halt`, a fault, or an unanswered `RpcCall`), repeated calls keep
    /// reporting [`KernelEvent::Finished`] without touching the program.
    pub fn step(&mut self) -> Result<KernelEvent, VmError> {
        if self.halted {
            return Ok(KernelEvent::Finished);
        }
        let (instr, next_pc) = decode_one(&self.code, self.pc)?;
        self.pc = next_pc;
        match instr {
            Instr::Halt => {
                self.halted = true;
                Ok(KernelEvent::Finished)
            }
            Instr::ScheduleAt {
                channel,
                timestamp,
                data,
            } => Ok(KernelEvent::ScheduleRtio {
                channel,
                timestamp,
                data,
            }),
            Instr::RpcCall {
                service_id,
                arg_tag,
                arg_bytes,
            } => {
                self.halted = true;
                Ok(KernelEvent::RpcCall {
                    service_id,
                    arg_tag,
                    arg_bytes,
                })
            }
            Instr::Raise { message } => {
                self.halted = true;
                Ok(KernelEvent::Fault { message })
            }
        }
    }
}
