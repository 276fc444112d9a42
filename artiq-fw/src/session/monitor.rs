//! The secondary always-on monitor/injection port (spec §4.6, last
//! paragraph): read-only introspection of RTIO counters and manual
//! TTL/DDS overrides while no kernel is running. Coexists with the
//! control session; has no state machine of its own since every request
//! is answered immediately from current hardware state.

use alloc::vec::Vec;

use artiq_net::moninj_proto::{MonInjError, MonInjReply, MonInjRequest};

use crate::rtio::{Bridge, CsrBus};

/// Answers one monitor/injection request directly against the bridge.
/// Returns `None` for a request the bridge can't currently service (a
/// kernel owns it), matching the "no kernel running" precondition on
/// injection.
pub struct Monitor<'a, C: CsrBus> {
    bridge: &'a mut Bridge<C>,
    kernel_running: bool,
}

impl<'a, C: CsrBus> Monitor<'a, C> {
    pub fn new(bridge: &'a mut Bridge<C>, kernel_running: bool) -> Self {
        Monitor {
            bridge,
            kernel_running,
        }
    }

    pub fn handle(&mut self, bytes: &[u8]) -> Vec<u8> {
        match MonInjRequest::decode(bytes) {
            Ok(request) => self.dispatch(request).encode(),
            Err(e) => encode_error(e),
        }
    }

    fn dispatch(&mut self, request: MonInjRequest) -> MonInjReply {
        match request {
            MonInjRequest::MonitorProbe { channel, .. } => {
                let value = if self.kernel_running {
                    0
                } else {
                    self.bridge.direct_read(channel, 0)
                };
                MonInjReply::ProbeValue {
                    channel,
                    probe: 0,
                    value,
                }
            }
            MonInjRequest::Inject {
                channel,
                overrd,
                value,
            } => {
                if !self.kernel_running {
                    let _ = self.bridge.direct_write(channel, 0, value as u32);
                }
                MonInjReply::InjectionStatus {
                    channel,
                    overrd,
                    value,
                }
            }
            MonInjRequest::GetInjectionStatus { channel, overrd } => {
                let value = if self.kernel_running {
                    0
                } else {
                    self.bridge.direct_read(channel, 0) as u8
                };
                MonInjReply::InjectionStatus {
                    channel,
                    overrd,
                    value,
                }
            }
        }
    }
}

fn encode_error(e: MonInjError) -> Vec<u8> {
    match e {
        MonInjError::Truncated => alloc::vec![0xFF],
        MonInjError::BadTag(tag) => alloc::vec![0xFE, tag],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCsr {
        regs: [u32; 4],
    }

    impl CsrBus for FakeCsr {
        fn brg_start(&mut self) {}
        fn rtio_now(&self) -> i64 {
            0
        }
        fn rtio_output(&mut self, channel: u32, _timestamp: i64, _addr: u32, data: u32) -> bool {
            self.regs[channel as usize] = data;
            true
        }
        fn dds_read(&mut self, channel: u32, _addr: u32) -> u32 {
            self.regs[channel as usize]
        }
    }

    #[test]
    fn probe_reads_back_through_the_bridge_when_idle() {
        let mut bridge = Bridge::new(FakeCsr { regs: [7, 0, 0, 0] });
        bridge.brg_start();
        let mut monitor = Monitor::new(&mut bridge, false);
        let request = MonInjRequest::MonitorProbe {
            channel: 0,
            enable: true,
        };
        let reply_bytes = monitor.handle(&request.encode());
        let reply = MonInjReply::decode(&reply_bytes).unwrap();
        assert_eq!(
            reply,
            MonInjReply::ProbeValue {
                channel: 0,
                probe: 0,
                value: 7
            }
        );
    }

    #[test]
    fn probe_is_inert_while_a_kernel_owns_the_bridge() {
        let mut bridge = Bridge::new(FakeCsr { regs: [7, 0, 0, 0] });
        bridge.brg_start();
        let mut monitor = Monitor::new(&mut bridge, true);
        let request = MonInjRequest::MonitorProbe {
            channel: 0,
            enable: true,
        };
        let reply_bytes: Vec<u8> = monitor.handle(&request.encode());
        let reply = MonInjReply::decode(&reply_bytes).unwrap();
        assert_eq!(
            reply,
            MonInjReply::ProbeValue {
                channel: 0,
                probe: 0,
                value: 0
            }
        );
    }
}
