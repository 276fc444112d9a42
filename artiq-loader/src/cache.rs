//! Per-session RPC value cache.
//!
//! A kernel that calls the same RPC inside a loop re-sends identical
//! argument shapes every iteration; caching the host's reply against the
//! exact argument bytes that produced it lets a byte-identical repeat call
//! skip the mailbox round trip entirely. Grounded on the historical ARTIQ
//! runtime's own `rpc` value cache, trimmed to what the loader layer needs.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

#[derive(Debug)]
struct CachedReply {
    args: Vec<u8>,
    ret_tag: u8,
    ret_bytes: Vec<u8>,
}

/// Caches one reply per call-site tag (the kernel compiler's per-call-site
/// identifier, reused here as the RPC's `service_id`), alongside the
/// argument bytes that produced it.
#[derive(Debug, Default)]
pub struct RpcCache {
    slots: BTreeMap<i32, CachedReply>,
}

impl RpcCache {
    pub fn new() -> Self {
        RpcCache {
            slots: BTreeMap::new(),
        }
    }

    /// Returns the cached `(ret_tag, ret_bytes)` for `tag` if the last call
    /// there carried exactly `args`, meaning a fresh round trip would just
    /// produce the same reply again.
    pub fn get(&self, tag: i32, args: &[u8]) -> Option<(u8, &[u8])> {
        let entry = self.slots.get(&tag)?;
        if entry.args == args {
            Some((entry.ret_tag, entry.ret_bytes.as_slice()))
        } else {
            None
        }
    }

    pub fn put(&mut self, tag: i32, args: Vec<u8>, ret_tag: u8, ret_bytes: Vec<u8>) {
        self.slots.insert(
            tag,
            CachedReply {
                args,
                ret_tag,
                ret_bytes,
            },
        );
    }

    /// Drop every cached entry. Called between kernel runs so a stale
    /// allocation from a previous experiment can't be reused by mistake.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips_on_matching_args() {
        let mut cache = RpcCache::new();
        cache.put(3, alloc::vec![1, 2, 3], 0, alloc::vec![9, 9]);
        assert_eq!(cache.get(3, &[1, 2, 3]), Some((0, &[9, 9][..])));
        assert_eq!(cache.get(4, &[1, 2, 3]), None);
    }

    #[test]
    fn a_changed_argument_shape_misses() {
        let mut cache = RpcCache::new();
        cache.put(3, alloc::vec![1, 2, 3], 0, alloc::vec![9, 9]);
        assert_eq!(cache.get(3, &[1, 2, 4]), None);
    }

    #[test]
    fn clear_drops_all_entries() {
        let mut cache = RpcCache::new();
        cache.put(1, alloc::vec![9], 0, alloc::vec![1]);
        cache.clear();
        assert_eq!(cache.get(1, &[9]), None);
    }
}
