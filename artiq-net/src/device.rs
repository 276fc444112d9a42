//! smoltcp `Device` shims over the two physical links this runtime can run
//! on: a CSR-mapped Ethernet MAC, or a point-to-point PPP link over the
//! debug UART.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use smoltcp::phy::{Device, DeviceCapabilities, Medium, RxToken, TxToken};
use smoltcp::time::Instant;

use crate::hdlc::{self, HdlcReceiver};
use crate::ppp::{PppLink, PppState, PROTO_IP};

/// What an Ethernet MAC driver needs to expose to feed smoltcp.
pub trait EthernetMac {
    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize>;
    fn try_send(&mut self, buf: &[u8]) -> bool;
    fn mtu(&self) -> usize;
}

pub struct EthernetDevice<M: EthernetMac> {
    mac: M,
}

impl<M: EthernetMac> EthernetDevice<M> {
    pub fn new(mac: M) -> Self {
        EthernetDevice { mac }
    }
}

pub struct EthernetRxToken {
    buffer: Vec<u8>,
}

impl RxToken for EthernetRxToken {
    fn consume<R, F: FnOnce(&mut [u8]) -> R>(mut self, f: F) -> R {
        f(&mut self.buffer)
    }
}

pub struct EthernetTxToken<'a, M: EthernetMac> {
    mac: &'a mut M,
}

impl<'a, M: EthernetMac> TxToken for EthernetTxToken<'a, M> {
    fn consume<R, F: FnOnce(&mut [u8]) -> R>(self, len: usize, f: F) -> R {
        let mut buffer = alloc::vec![0u8; len];
        let result = f(&mut buffer);
        let _ = self.mac.try_send(&buffer);
        result
    }
}

impl<M: EthernetMac> Device for EthernetDevice<M> {
    type RxToken<'a>
        = EthernetRxToken
    where
        Self: 'a;
    type TxToken<'a>
        = EthernetTxToken<'a, M>
    where
        Self: 'a;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let mut buf = alloc::vec![0u8; self.mac.mtu()];
        let n = self.mac.try_recv(&mut buf)?;
        buf.truncate(n);
        Some((
            EthernetRxToken { buffer: buf },
            EthernetTxToken { mac: &mut self.mac },
        ))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        Some(EthernetTxToken { mac: &mut self.mac })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.max_transmission_unit = self.mac.mtu();
        caps.medium = Medium::Ethernet;
        caps
    }
}

/// What a PPP link needs from the serial port carrying it.
pub trait SerialPort {
    fn try_read_byte(&mut self) -> Option<u8>;
    fn write_byte(&mut self, byte: u8);
}

/// Presents an HDLC-framed PPP link over a UART as an IP-medium smoltcp
/// device, running LCP/IPCP bringup internally and surfacing only IP
/// packets to the interface above it.
pub struct PppIpDevice<S: SerialPort> {
    serial: S,
    link: PppLink,
    hdlc_rx: HdlcReceiver,
    pending_control_tx: VecDeque<Vec<u8>>,
    mtu: usize,
}

impl<S: SerialPort> PppIpDevice<S> {
    pub fn new(serial: S, mtu: usize) -> Self {
        let mut device = PppIpDevice {
            serial,
            link: PppLink::new(),
            hdlc_rx: HdlcReceiver::new(),
            pending_control_tx: VecDeque::new(),
            mtu,
        };
        let open_request = device.link.open();
        device.queue_control(crate::ppp::PROTO_LCP, &open_request);
        device
    }

    pub fn link_state(&self) -> PppState {
        self.link.state()
    }

    fn queue_control(&mut self, protocol: u16, control_packet: &[u8]) {
        let mut framed = Vec::with_capacity(2 + control_packet.len());
        framed.extend_from_slice(&protocol.to_be_bytes());
        framed.extend_from_slice(control_packet);
        self.pending_control_tx.push_back(hdlc::encode_frame(&framed));
    }

    fn flush_control_tx(&mut self) {
        while let Some(frame) = self.pending_control_tx.pop_front() {
            for &byte in &frame {
                self.serial.write_byte(byte);
            }
        }
    }

    /// Drain bytes off the wire until an IP packet arrives or the serial
    /// input runs dry; control-protocol frames are consumed and answered
    /// inline rather than surfaced.
    fn poll_serial_for_ip_packet(&mut self) -> Option<Vec<u8>> {
        loop {
            let byte = self.serial.try_read_byte()?;
            let Some(result) = self.hdlc_rx.push_byte(byte) else {
                continue;
            };
            let Ok(unstuffed) = result else { continue };
            if unstuffed.len() < 2 {
                continue;
            }
            let protocol = u16::from_be_bytes([unstuffed[0], unstuffed[1]]);
            let payload = &unstuffed[2..];
            if protocol == PROTO_IP {
                return Some(payload.to_vec());
            }
            let (reply, _event) = self.link.receive(protocol, payload);
            if let Some(reply) = reply {
                self.queue_control(protocol, &reply);
            }
        }
    }
}

pub struct PppRxToken {
    buffer: Vec<u8>,
}

impl RxToken for PppRxToken {
    fn consume<R, F: FnOnce(&mut [u8]) -> R>(mut self, f: F) -> R {
        f(&mut self.buffer)
    }
}

pub struct PppTxToken<'a, S: SerialPort> {
    device: &'a mut PppIpDevice<S>,
}

impl<'a, S: SerialPort> TxToken for PppTxToken<'a, S> {
    fn consume<R, F: FnOnce(&mut [u8]) -> R>(self, len: usize, f: F) -> R {
        let mut buffer = alloc::vec![0u8; len];
        let result = f(&mut buffer);
        let mut framed = Vec::with_capacity(2 + len);
        framed.extend_from_slice(&PROTO_IP.to_be_bytes());
        framed.extend_from_slice(&buffer);
        let stuffed = hdlc::encode_frame(&framed);
        for &byte in &stuffed {
            self.device.serial.write_byte(byte);
        }
        result
    }
}

impl<S: SerialPort> Device for PppIpDevice<S> {
    type RxToken<'a>
        = PppRxToken
    where
        Self: 'a;
    type TxToken<'a>
        = PppTxToken<'a, S>
    where
        Self: 'a;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        self.flush_control_tx();
        let payload = self.poll_serial_for_ip_packet()?;
        Some((PppRxToken { buffer: payload }, PppTxToken { device: self }))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        self.flush_control_tx();
        if self.link.state() != PppState::NetworkUp {
            return None;
        }
        Some(PppTxToken { device: self })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.max_transmission_unit = self.mtu;
        caps.medium = Medium::Ip;
        caps
    }
}
