//! Bridges the flash KV store's persisted network identity to
//! [`artiq_net::shim::NetConfig`]. `mac`/`ip`/`netmask`/`gateway` are kept
//! in the store as ASCII text (`xx:xx:xx:xx:xx:xx`, dotted-quad), exactly
//! as the host-facing `FLASH_READ`/`FLASH_WRITE` requests see them, so a
//! value written through the control session and one loaded here always
//! agree. Falls back to [`NetConfig::default`] for any key that's absent,
//! malformed, or the store itself is unmounted.

use alloc::string::String;
use alloc::vec::Vec;

use artiq_fs::{Flash, KvStore};
use artiq_net::shim::NetConfig;
use smoltcp::wire::Ipv4Address;

pub const KEY_MAC: &[u8] = b"mac";
pub const KEY_IP: &[u8] = b"ip";
pub const KEY_NETMASK: &[u8] = b"netmask";
pub const KEY_GATEWAY: &[u8] = b"gateway";

/// The ASCII default text `FLASH_READ` of one of the four network-identity
/// keys returns on blank flash, matching [`NetConfig::default`]. `None` for
/// any other key, which keeps its existing "absent means empty" behavior.
pub fn default_text(key: &[u8]) -> Option<Vec<u8>> {
    let default = NetConfig::default();
    let text = match key {
        KEY_MAC => format_mac(default.mac),
        KEY_IP => alloc::format!("{}", default.ip),
        KEY_NETMASK => alloc::format!("{}", default.netmask),
        KEY_GATEWAY => alloc::format!("{}", default.gateway),
        _ => return None,
    };
    Some(text.into_bytes())
}

/// Read the runtime's network identity out of the KV store, falling back
/// to [`NetConfig::default`] field-by-field.
pub fn load_net_config<F: Flash>(store: &KvStore<F>) -> NetConfig {
    let mut config = NetConfig::default();
    if let Some(mac) = read_mac(store) {
        config.mac = mac;
    }
    if let Some(ip) = read_ipv4(store, KEY_IP) {
        config.ip = ip;
    }
    if let Some(netmask) = read_ipv4(store, KEY_NETMASK) {
        config.netmask = netmask;
    }
    if let Some(gateway) = read_ipv4(store, KEY_GATEWAY) {
        config.gateway = gateway;
    }
    config
}

fn read_mac<F: Flash>(store: &KvStore<F>) -> Option<[u8; 6]> {
    let mut buf = [0u8; 32];
    let len = store.fs_read(KEY_MAC, &mut buf).ok()?;
    parse_mac(&buf[..len])
}

fn read_ipv4<F: Flash>(store: &KvStore<F>, key: &[u8]) -> Option<Ipv4Address> {
    let mut buf = [0u8; 32];
    let len = store.fs_read(key, &mut buf).ok()?;
    parse_ipv4(&buf[..len])
}

fn format_mac(mac: [u8; 6]) -> String {
    alloc::format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

fn parse_mac(bytes: &[u8]) -> Option<[u8; 6]> {
    let text = core::str::from_utf8(bytes).ok()?;
    let mut octets = [0u8; 6];
    let mut parts = text.split(':');
    for octet in octets.iter_mut() {
        *octet = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

fn parse_ipv4(bytes: &[u8]) -> Option<Ipv4Address> {
    let text = core::str::from_utf8(bytes).ok()?;
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');
    for octet in octets.iter_mut() {
        *octet = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Address::new(octets[0], octets[1], octets[2], octets[3]))
}

/// Persist an overridden network identity back to the KV store as ASCII
/// dotted-quad text, used by the test-mode REPL's `set_ip`-style commands.
pub fn store_ipv4<F: Flash>(
    store: &mut KvStore<F>,
    key: &[u8],
    addr: Ipv4Address,
) -> Result<(), artiq_fs::KvError> {
    store.fs_write(key, alloc::format!("{addr}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use artiq_fs::flash::RamFlash;

    fn mounted_store() -> KvStore<RamFlash> {
        let flash = RamFlash::new(4096, 2);
        KvStore::mount(flash).unwrap()
    }

    #[test]
    fn absent_keys_fall_back_to_defaults() {
        let store = mounted_store();
        let config = load_net_config(&store);
        let default = NetConfig::default();
        assert_eq!(config.mac, default.mac);
        assert_eq!(config.ip, default.ip);
    }

    #[test]
    fn default_mac_text_matches_the_documented_default() {
        assert_eq!(default_text(KEY_MAC).unwrap(), b"10:e2:d5:32:50:00");
    }

    #[test]
    fn default_text_is_none_for_an_unrelated_key() {
        assert_eq!(default_text(b"user-key"), None);
    }

    #[test]
    fn a_stored_ip_overrides_the_default() {
        let mut store = mounted_store();
        store_ipv4(&mut store, KEY_IP, Ipv4Address::new(10, 0, 0, 5)).unwrap();
        let config = load_net_config(&store);
        assert_eq!(config.ip, Ipv4Address::new(10, 0, 0, 5));
        assert_eq!(config.gateway, NetConfig::default().gateway);
    }
}
