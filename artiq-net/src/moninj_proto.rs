//! Minimal monitor/injection protocol.
//!
//! Real ARTIQ runs a second, always-on UDP-ish port letting a dashboard
//! watch and override RTIO channels without going through a kernel session
//! at all. The distilled spec doesn't mention it, but the supervisor's
//! "secondary always-on monitor port" implies something answers on it; this
//! is that protocol, trimmed to the three requests a monitor actually needs.

use alloc::vec::Vec;

/// A request on the monitor/injection port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonInjRequest {
    /// Start or stop periodic monitoring of one RTIO channel's probe value.
    MonitorProbe { channel: u32, enable: bool },
    /// Force an RTIO channel's output, bypassing kernel scheduling.
    Inject { channel: u32, overrd: u8, value: u8 },
    /// Ask whether a channel currently has an injection override active.
    GetInjectionStatus { channel: u32, overrd: u8 },
}

/// A reply on the monitor/injection port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonInjReply {
    ProbeValue { channel: u32, probe: u8, value: u32 },
    InjectionStatus { channel: u32, overrd: u8, value: u8 },
}

const REQ_MONITOR_PROBE: u8 = 0;
const REQ_INJECT: u8 = 1;
const REQ_GET_INJECTION_STATUS: u8 = 2;

const REPLY_PROBE_VALUE: u8 = 0;
const REPLY_INJECTION_STATUS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonInjError {
    Truncated,
    BadTag(u8),
}

impl MonInjRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            MonInjRequest::MonitorProbe { channel, enable } => {
                out.push(REQ_MONITOR_PROBE);
                out.extend_from_slice(&channel.to_le_bytes());
                out.push(*enable as u8);
            }
            MonInjRequest::Inject {
                channel,
                overrd,
                value,
            } => {
                out.push(REQ_INJECT);
                out.extend_from_slice(&channel.to_le_bytes());
                out.push(*overrd);
                out.push(*value);
            }
            MonInjRequest::GetInjectionStatus { channel, overrd } => {
                out.push(REQ_GET_INJECTION_STATUS);
                out.extend_from_slice(&channel.to_le_bytes());
                out.push(*overrd);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MonInjError> {
        let (&tag, rest) = bytes.split_first().ok_or(MonInjError::Truncated)?;
        match tag {
            REQ_MONITOR_PROBE => {
                let channel = read_u32(rest)?;
                let enable = *rest.get(4).ok_or(MonInjError::Truncated)? != 0;
                Ok(MonInjRequest::MonitorProbe { channel, enable })
            }
            REQ_INJECT => {
                let channel = read_u32(rest)?;
                let overrd = *rest.get(4).ok_or(MonInjError::Truncated)?;
                let value = *rest.get(5).ok_or(MonInjError::Truncated)?;
                Ok(MonInjRequest::Inject {
                    channel,
                    overrd,
                    value,
                })
            }
            REQ_GET_INJECTION_STATUS => {
                let channel = read_u32(rest)?;
                let overrd = *rest.get(4).ok_or(MonInjError::Truncated)?;
                Ok(MonInjRequest::GetInjectionStatus { channel, overrd })
            }
            other => Err(MonInjError::BadTag(other)),
        }
    }
}

impl MonInjReply {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            MonInjReply::ProbeValue {
                channel,
                probe,
                value,
            } => {
                out.push(REPLY_PROBE_VALUE);
                out.extend_from_slice(&channel.to_le_bytes());
                out.push(*probe);
                out.extend_from_slice(&value.to_le_bytes());
            }
            MonInjReply::InjectionStatus {
                channel,
                overrd,
                value,
            } => {
                out.push(REPLY_INJECTION_STATUS);
                out.extend_from_slice(&channel.to_le_bytes());
                out.push(*overrd);
                out.push(*value);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MonInjError> {
        let (&tag, rest) = bytes.split_first().ok_or(MonInjError::Truncated)?;
        match tag {
            REPLY_PROBE_VALUE => {
                let channel = read_u32(rest)?;
                let &probe = rest.get(4).ok_or(MonInjError::Truncated)?;
                let value = read_u32(rest.get(5..).ok_or(MonInjError::Truncated)?)?;
                Ok(MonInjReply::ProbeValue {
                    channel,
                    probe,
                    value,
                })
            }
            REPLY_INJECTION_STATUS => {
                let channel = read_u32(rest)?;
                let &overrd = rest.get(4).ok_or(MonInjError::Truncated)?;
                let &value = rest.get(5).ok_or(MonInjError::Truncated)?;
                Ok(MonInjReply::InjectionStatus {
                    channel,
                    overrd,
                    value,
                })
            }
            other => Err(MonInjError::BadTag(other)),
        }
    }
}

fn read_u32(bytes: &[u8]) -> Result<u32, MonInjError> {
    let field = bytes.get(0..4).ok_or(MonInjError::Truncated)?;
    Ok(u32::from_le_bytes(field.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_probe_round_trips() {
        let req = MonInjRequest::MonitorProbe {
            channel: 3,
            enable: true,
        };
        assert_eq!(MonInjRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn inject_round_trips() {
        let req = MonInjRequest::Inject {
            channel: 1,
            overrd: 1,
            value: 0,
        };
        assert_eq!(MonInjRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn unknown_request_tag_is_reported() {
        assert_eq!(
            MonInjRequest::decode(&[0xFF]),
            Err(MonInjError::BadTag(0xFF))
        );
    }

    #[test]
    fn probe_value_reply_encodes_fields_in_order() {
        let reply = MonInjReply::ProbeValue {
            channel: 2,
            probe: 0,
            value: 0xAABB_CCDD,
        };
        let bytes = reply.encode();
        assert_eq!(bytes[0], REPLY_PROBE_VALUE);
        assert_eq!(&bytes[1..5], &2u32.to_le_bytes());
    }
}
