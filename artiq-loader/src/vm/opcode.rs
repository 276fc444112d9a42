//! Wire encoding for the tiny bytecode a kernel image's `code` section holds.
//!
//! Each instruction is a one-byte tag followed by a fixed or length-prefixed
//! body, little-endian throughout, mirroring the on-flash record encodings
//! used elsewhere in this workspace.

use alloc::vec::Vec;

/// One instruction in a kernel's compiled program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// Schedule a timestamped RTIO register write.
    ScheduleAt { channel: u32, timestamp: i64, data: u32 },
    /// Call out to a host-side RPC service, blocking until a reply arrives.
    RpcCall {
        service_id: u32,
        arg_tag: u8,
        arg_bytes: Vec<u8>,
    },
    /// Raise a kernel-side exception, ending the run.
    Raise { message: Vec<u8> },
    /// End the run normally.
    Halt,
}

const TAG_HALT: u8 = 0;
const TAG_SCHEDULE_AT: u8 = 1;
const TAG_RPC_CALL: u8 = 2;
const TAG_RAISE: u8 = 3;

/// Errors raised while decoding a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The code ended mid-instruction.
    Truncated,
    /// The tag byte didn't match any known instruction.
    BadOpcode(u8),
}

/// Encode a whole program as a flat byte string, suitable for a kernel
/// image's `code` section.
pub fn encode_program(program: &[Instr]) -> Vec<u8> {
    let mut out = Vec::new();
    for instr in program {
        encode_one(instr, &mut out);
    }
    out
}

fn encode_one(instr: &Instr, out: &mut Vec<u8>) {
    match instr {
        Instr::Halt => out.push(TAG_HALT),
        Instr::ScheduleAt {
            channel,
            timestamp,
            data,
        } => {
            out.push(TAG_SCHEDULE_AT);
            out.extend_from_slice(&channel.to_le_bytes());
            out.extend_from_slice(&timestamp.to_le_bytes());
            out.extend_from_slice(&data.to_le_bytes());
        }
        Instr::RpcCall {
            service_id,
            arg_tag,
            arg_bytes,
        } => {
            out.push(TAG_RPC_CALL);
            out.extend_from_slice(&service_id.to_le_bytes());
            out.push(*arg_tag);
            out.extend_from_slice(&(arg_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(arg_bytes);
        }
        Instr::Raise { message } => {
            out.push(TAG_RAISE);
            out.extend_from_slice(&(message.len() as u32).to_le_bytes());
            out.extend_from_slice(message);
        }
    }
}

/// Decode a single instruction starting at `pc`, returning it along with the
/// offset of the one that follows.
pub fn decode_one(code: &[u8], pc: usize) -> Result<(Instr, usize), VmError> {
    let tag = *code.get(pc).ok_or(VmError::Truncated)?;
    let body = pc + 1;
    match tag {
        TAG_HALT => Ok((Instr::Halt, body)),
        TAG_SCHEDULE_AT => {
            let end = body + 16;
            let bytes = code.get(body..end).ok_or(VmError::Truncated)?;
            let channel = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
            let timestamp = i64::from_le_bytes(bytes[4..12].try_into().unwrap());
            let data = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
            Ok((
                Instr::ScheduleAt {
                    channel,
                    timestamp,
                    data,
                },
                end,
            ))
        }
        TAG_RPC_CALL => {
            let header_end = body + 9;
            let header = code.get(body..header_end).ok_or(VmError::Truncated)?;
            let service_id = u32::from_le_bytes(header[0..4].try_into().unwrap());
            let arg_tag = header[4];
            let arg_len = u32::from_le_bytes(header[5..9].try_into().unwrap()) as usize;
            let data_end = header_end + arg_len;
            let arg_bytes = code
                .get(header_end..data_end)
                .ok_or(VmError::Truncated)?
                .to_vec();
            Ok((
                Instr::RpcCall {
                    service_id,
                    arg_tag,
                    arg_bytes,
                },
                data_end,
            ))
        }
        TAG_RAISE => {
            let len_end = body + 4;
            let len_bytes = code.get(body..len_end).ok_or(VmError::Truncated)?;
            let msg_len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
            let data_end = len_end + msg_len;
            let message = code
                .get(len_end..data_end)
                .ok_or(VmError::Truncated)?
                .to_vec();
            Ok((Instr::Raise { message }, data_end))
        }
        other => Err(VmError::BadOpcode(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_instruction_kind() {
        let program = [
            Instr::ScheduleAt {
                channel: 5,
                timestamp: -12,
                data: 0xDEAD_BEEF,
            },
            Instr::RpcCall {
                service_id: 2,
                arg_tag: 1,
                arg_bytes: alloc::vec![1, 2, 3, 4],
            },
            Instr::Raise {
                message: alloc::vec![b'o', b'o', b'p', b's'],
            },
            Instr::Halt,
        ];
        let bytes = encode_program(&program);
        let mut pc = 0;
        for expected in &program {
            let (decoded, next) = decode_one(&bytes, pc).unwrap();
            assert_eq!(&decoded, expected);
            pc = next;
        }
        assert_eq!(pc, bytes.len());
    }

    #[test]
    fn truncated_body_is_reported() {
        assert_eq!(decode_one(&[TAG_SCHEDULE_AT, 0, 0], 0), Err(VmError::Truncated));
    }

    #[test]
    fn unknown_tag_is_reported() {
        assert_eq!(decode_one(&[0x7F], 0), Err(VmError::BadOpcode(0x7F)));
    }
}
