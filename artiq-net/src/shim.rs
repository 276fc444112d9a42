//! Owns the smoltcp interface, whichever [`Device`] backs it, and the
//! sockets the session engine and monitor port use.

use alloc::vec;
use alloc::vec::Vec;

use smoltcp::iface::{Config, Interface, SocketHandle, SocketSet};
use smoltcp::phy::Device;
use smoltcp::socket::tcp;
use smoltcp::time::Instant;
use smoltcp::wire::{EthernetAddress, HardwareAddress, IpAddress, IpCidr, Ipv4Address};

/// Network identity defaults, overridable from the flash KV store's `mac`,
/// `ip`, `netmask`, and `gateway` keys.
#[derive(Debug, Clone, Copy)]
pub struct NetConfig {
    pub mac: [u8; 6],
    pub ip: Ipv4Address,
    pub netmask: Ipv4Address,
    pub gateway: Ipv4Address,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            mac: [0x10, 0xe2, 0xd5, 0x32, 0x50, 0x00],
            ip: Ipv4Address::new(192, 168, 0, 42),
            netmask: Ipv4Address::new(255, 255, 255, 0),
            gateway: Ipv4Address::new(192, 168, 0, 1),
        }
    }
}

fn netmask_to_prefix_len(mask: Ipv4Address) -> u8 {
    u32::from_be_bytes(mask.0).count_ones() as u8
}

/// Everything the session/monitor layers need from the network: the
/// interface, the device driving it, and the socket set.
pub struct NetShim<D: Device> {
    iface: Interface,
    device: D,
    sockets: SocketSet<'static>,
}

impl<D: Device> NetShim<D> {
    /// Build the shim over an Ethernet-medium device.
    pub fn new_ethernet(device: D, config: NetConfig, now: Instant) -> Self {
        let hw = HardwareAddress::Ethernet(EthernetAddress(config.mac));
        Self::new(device, hw, config, now)
    }

    /// Build the shim over an IP-medium device (the PPP serial link).
    pub fn new_ppp(device: D, config: NetConfig, now: Instant) -> Self {
        Self::new(device, HardwareAddress::Ip, config, now)
    }

    fn new(mut device: D, hw: HardwareAddress, config: NetConfig, now: Instant) -> Self {
        let mut iface = Interface::new(Config::new(hw), &mut device, now);
        iface.update_ip_addrs(|addrs| {
            addrs
                .push(IpCidr::new(
                    IpAddress::Ipv4(config.ip),
                    netmask_to_prefix_len(config.netmask),
                ))
                .expect("a fresh interface has room for one address");
        });
        iface
            .routes_mut()
            .add_default_ipv4_route(config.gateway)
            .expect("a fresh interface has room for one route");
        NetShim {
            iface,
            device,
            sockets: SocketSet::new(Vec::new()),
        }
    }

    /// Open a TCP socket listening on `port`. The session engine uses this
    /// for the single control connection it ever serves at once.
    pub fn open_listening_socket(&mut self, port: u16, buffer_len: usize) -> SocketHandle {
        let rx_buffer = tcp::SocketBuffer::new(vec![0u8; buffer_len]);
        let tx_buffer = tcp::SocketBuffer::new(vec![0u8; buffer_len]);
        let mut socket = tcp::Socket::new(rx_buffer, tx_buffer);
        socket
            .listen(port)
            .expect("listen on a freshly created socket cannot fail");
        self.sockets.add(socket)
    }

    pub fn socket_mut(&mut self, handle: SocketHandle) -> &mut tcp::Socket<'static> {
        self.sockets.get_mut::<tcp::Socket>(handle)
    }

    /// Service the device and every socket once; the session/monitor loops
    /// call this every iteration and reopen any listening socket a closed
    /// connection left behind.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.iface.poll(now, &mut self.device, &mut self.sockets)
    }

    pub fn ipv4_address(&self) -> Option<Ipv4Address> {
        self.iface.ipv4_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_the_documented_defaults() {
        let config = NetConfig::default();
        assert_eq!(config.mac, [0x10, 0xe2, 0xd5, 0x32, 0x50, 0x00]);
        assert_eq!(config.ip, Ipv4Address::new(192, 168, 0, 42));
        assert_eq!(config.gateway, Ipv4Address::new(192, 168, 0, 1));
    }

    #[test]
    fn netmask_prefix_conversion_matches_common_masks() {
        assert_eq!(netmask_to_prefix_len(Ipv4Address::new(255, 255, 255, 0)), 24);
        assert_eq!(netmask_to_prefix_len(Ipv4Address::new(255, 255, 0, 0)), 16);
        assert_eq!(netmask_to_prefix_len(Ipv4Address::new(255, 255, 255, 255)), 32);
    }
}
