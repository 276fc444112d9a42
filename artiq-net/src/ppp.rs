//! A minimal PPP control-plane state machine: just enough LCP and IPCP to
//! bring an unauthenticated point-to-point serial link up so IP packets can
//! flow. No PAP/CHAP — the boards this runtime targets are reached over a
//! direct serial cable, not a dial-up link with a hostile peer.

use alloc::vec::Vec;

pub const PROTO_LCP: u16 = 0xC021;
pub const PROTO_IPCP: u16 = 0x8021;
pub const PROTO_IP: u16 = 0x0021;

const CODE_CONFIGURE_REQUEST: u8 = 1;
const CODE_CONFIGURE_ACK: u8 = 2;
const CODE_TERMINATE_REQUEST: u8 = 5;
const CODE_TERMINATE_ACK: u8 = 6;

/// Where the link is in bringup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PppState {
    Dead,
    LcpNegotiating,
    IpcpNegotiating,
    NetworkUp,
}

/// Something worth telling the caller about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PppEvent {
    /// The link reached `NetworkUp`: IP packets may now flow.
    NetworkUp,
    /// The link went back down (a Terminate-Request was received).
    NetworkDown,
    /// Nothing externally visible changed.
    None,
}

/// A parsed LCP/IPCP control packet.
struct ControlPacket<'a> {
    code: u8,
    id: u8,
    data: &'a [u8],
}

fn parse_control(packet: &[u8]) -> Option<ControlPacket<'_>> {
    if packet.len() < 4 {
        return None;
    }
    let code = packet[0];
    let id = packet[1];
    let len = u16::from_be_bytes([packet[2], packet[3]]) as usize;
    if len < 4 || len > packet.len() {
        return None;
    }
    Some(ControlPacket {
        code,
        id,
        data: &packet[4..len],
    })
}

fn encode_control(code: u8, id: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    out.push(code);
    out.push(id);
    out.extend_from_slice(&((4 + data.len()) as u16).to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// Drives LCP then IPCP to completion. Every `Configure-Request` the peer
/// sends is accepted unconditionally (no option negotiation, no auth); this
/// link either comes up immediately or stays `Dead`.
pub struct PppLink {
    state: PppState,
    lcp_acked_ours: bool,
    lcp_acked_theirs: bool,
    ipcp_acked_ours: bool,
    ipcp_acked_theirs: bool,
    next_id: u8,
}

impl Default for PppLink {
    fn default() -> Self {
        Self::new()
    }
}

impl PppLink {
    pub fn new() -> Self {
        PppLink {
            state: PppState::Dead,
            lcp_acked_ours: false,
            lcp_acked_theirs: false,
            ipcp_acked_ours: false,
            ipcp_acked_theirs: false,
            next_id: 0,
        }
    }

    pub fn state(&self) -> PppState {
        self.state
    }

    /// Begin bringup: send our own LCP Configure-Request.
    pub fn open(&mut self) -> Vec<u8> {
        self.state = PppState::LcpNegotiating;
        self.next_frame(CODE_CONFIGURE_REQUEST, &[])
    }

    fn next_frame(&mut self, code: u8, data: &[u8]) -> Vec<u8> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        encode_control(code, id, data)
    }

    /// Feed one received control packet (already demultiplexed by
    /// `protocol`). Returns any reply to send back and the event, if any,
    /// the transition produced.
    pub fn receive(&mut self, protocol: u16, packet: &[u8]) -> (Option<Vec<u8>>, PppEvent) {
        let Some(control) = parse_control(packet) else {
            return (None, PppEvent::None);
        };
        match (protocol, control.code) {
            (PROTO_LCP, CODE_CONFIGURE_REQUEST) => {
                self.lcp_acked_theirs = true;
                let reply = encode_control(CODE_CONFIGURE_ACK, control.id, control.data);
                (Some(reply), self.advance())
            }
            (PROTO_LCP, CODE_CONFIGURE_ACK) => {
                self.lcp_acked_ours = true;
                (None, self.advance())
            }
            (PROTO_IPCP, CODE_CONFIGURE_REQUEST) => {
                self.ipcp_acked_theirs = true;
                let reply = encode_control(CODE_CONFIGURE_ACK, control.id, control.data);
                (Some(reply), self.advance())
            }
            (PROTO_IPCP, CODE_CONFIGURE_ACK) => {
                self.ipcp_acked_ours = true;
                (None, self.advance())
            }
            (PROTO_LCP, CODE_TERMINATE_REQUEST) => {
                let reply = encode_control(CODE_TERMINATE_ACK, control.id, &[]);
                self.state = PppState::Dead;
                self.lcp_acked_ours = false;
                self.lcp_acked_theirs = false;
                self.ipcp_acked_ours = false;
                self.ipcp_acked_theirs = false;
                (Some(reply), PppEvent::NetworkDown)
            }
            _ => (None, PppEvent::None),
        }
    }

    fn advance(&mut self) -> PppEvent {
        match self.state {
            PppState::LcpNegotiating if self.lcp_acked_ours && self.lcp_acked_theirs => {
                self.state = PppState::IpcpNegotiating;
                PppEvent::None
            }
            PppState::IpcpNegotiating if self.ipcp_acked_ours && self.ipcp_acked_theirs => {
                self.state = PppState::NetworkUp;
                PppEvent::NetworkUp
            }
            _ => PppEvent::None,
        }
    }

    /// Build this side's Configure-Request for the phase the link is
    /// currently in, if one should be (re)sent.
    pub fn configure_request(&mut self) -> Option<Vec<u8>> {
        match self.state {
            PppState::LcpNegotiating if !self.lcp_acked_ours => {
                Some(self.next_frame(CODE_CONFIGURE_REQUEST, &[]))
            }
            PppState::IpcpNegotiating if !self.ipcp_acked_ours => {
                Some(self.next_frame(CODE_CONFIGURE_REQUEST, &[]))
            }
            _ => None,
        }
    }
}
