//! Debug UART: the boot banner, the test-mode REPL, and the PPP serial
//! link (via [`artiq_net::device::SerialPort`]) all go through here.

use artiq_net::device::SerialPort as NetSerialPort;

/// Raw register access to a UART CSR block. Implemented against real
/// `uart_*` registers in production, and an in-memory loopback in tests.
pub trait UartCsr {
    fn try_read(&mut self) -> Option<u8>;
    fn write(&mut self, byte: u8);
}

pub struct Serial<C: UartCsr> {
    csr: C,
}

impl<C: UartCsr> Serial<C> {
    pub fn new(csr: C) -> Self {
        Serial { csr }
    }

    pub fn try_read_byte(&mut self) -> Option<u8> {
        self.csr.try_read()
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.csr.write(byte);
    }

    pub fn write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }

    /// Non-blocking poll for the boot-time test-mode keypress (`t` or `T`).
    pub fn poll_test_mode_keypress(&mut self) -> bool {
        matches!(self.try_read_byte(), Some(b't') | Some(b'T'))
    }
}

impl<C: UartCsr> NetSerialPort for Serial<C> {
    fn try_read_byte(&mut self) -> Option<u8> {
        Serial::try_read_byte(self)
    }

    fn write_byte(&mut self, byte: u8) {
        Serial::write_byte(self, byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;

    struct LoopbackCsr {
        rx: VecDeque<u8>,
        tx: alloc::vec::Vec<u8>,
    }

    impl UartCsr for LoopbackCsr {
        fn try_read(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }
        fn write(&mut self, byte: u8) {
            self.tx.push(byte);
        }
    }

    #[test]
    fn write_str_emits_every_byte() {
        let mut serial = Serial::new(LoopbackCsr {
            rx: VecDeque::new(),
            tx: alloc::vec::Vec::new(),
        });
        serial.write_str("hi");
        assert_eq!(serial.csr.tx, alloc::vec![b'h', b'i']);
    }

    #[test]
    fn test_mode_keypress_recognizes_both_cases() {
        let mut serial = Serial::new(LoopbackCsr {
            rx: VecDeque::from(alloc::vec![b't']),
            tx: alloc::vec::Vec::new(),
        });
        assert!(serial.poll_test_mode_keypress());

        let mut serial = Serial::new(LoopbackCsr {
            rx: VecDeque::from(alloc::vec![b'x']),
            tx: alloc::vec::Vec::new(),
        });
        assert!(!serial.poll_test_mode_keypress());
    }
}
