//! The append-only, compacting key/value store itself.
//!
//! Two sectors alternate as primary/secondary. Each sector starts with a
//! 5-byte header: a 1-byte sentinel (`0xA5` valid, `0xFF` blank, `0x00`
//! stale) followed by a 4-byte little-endian generation counter. The
//! generation counter is not part of the literal spec wording but is
//! required to make the mount-time sector choice deterministic in the one
//! case the sentinel byte alone cannot resolve: a crash that lands exactly
//! between "new sector marked valid" and "old sector marked stale", where
//! both sectors would otherwise read `0xA5`. See `DESIGN.md`.

use alloc::vec::Vec;
use log::{debug, warn};

use crate::flash::Flash;
use crate::record::{decode_one, validate_key, Decoded, Record};
use crate::{KvError, MAX_KEY_LEN};

const SENTINEL_VALID: u8 = 0xA5;
const SENTINEL_BLANK: u8 = 0xFF;
const SENTINEL_STALE: u8 = 0x00;

/// Bytes reserved at the start of each sector for the sentinel + generation.
const SECTOR_HEADER_LEN: usize = 5;

/// Compaction runs when the free tail drops below this fraction of a sector.
const COMPACT_THRESHOLD_NUM: usize = 1;
const COMPACT_THRESHOLD_DEN: usize = 8;

/// A mounted flash key/value store.
pub struct KvStore<F: Flash> {
    flash: F,
    active: usize,
    generation: u32,
    /// Number of log bytes currently written in the active sector, not
    /// counting the header.
    used: usize,
}

impl<F: Flash> KvStore<F> {
    /// Mount the store: read both sectors' sentinels and pick the active one.
    /// If neither sector is valid, the store is treated as blank and
    /// initialized on the first write.
    pub fn mount(flash: F) -> Result<Self, KvError> {
        assert!(
            flash.sector_count() >= 2,
            "flash KV store requires at least two sectors"
        );
        let mut candidates: Vec<(usize, u32)> = Vec::new();
        for sector in 0..2 {
            let mut header = [0u8; SECTOR_HEADER_LEN];
            flash.read(sector * flash.sector_size(), &mut header)?;
            if header[0] == SENTINEL_VALID {
                let gen = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
                candidates.push((sector, gen));
            }
        }
        let (active, generation) = match candidates.len() {
            0 => (usize::MAX, 0),
            1 => candidates[0],
            _ => {
                warn!("both flash KV sectors report valid sentinels; picking the higher generation");
                candidates.into_iter().max_by_key(|&(_, g)| g).unwrap()
            }
        };
        let mut store = KvStore {
            flash,
            active: if active == usize::MAX { 0 } else { active },
            generation,
            used: 0,
        };
        if active == usize::MAX {
            store.init_blank_sector(0, 0)?;
        } else {
            store.used = store.scan_used_bytes(active)?;
        }
        Ok(store)
    }

    fn sector_size(&self) -> usize {
        self.flash.sector_size()
    }

    fn sector_base(&self, sector: usize) -> usize {
        sector * self.sector_size()
    }

    fn init_blank_sector(&mut self, sector: usize, generation: u32) -> Result<(), KvError> {
        self.flash.erase_sector(sector)?;
        let mut header = [0u8; SECTOR_HEADER_LEN];
        header[0] = SENTINEL_VALID;
        header[1..5].copy_from_slice(&generation.to_le_bytes());
        self.flash.write(self.sector_base(sector), &header)?;
        self.active = sector;
        self.generation = generation;
        self.used = 0;
        Ok(())
    }

    fn scan_used_bytes(&self, sector: usize) -> Result<usize, KvError> {
        let base = self.sector_base(sector) + SECTOR_HEADER_LEN;
        let remaining = self.sector_size() - SECTOR_HEADER_LEN;
        let mut buf = alloc::vec![0u8; remaining];
        self.flash.read(base, &mut buf)?;
        let mut offset = 0;
        while offset < buf.len() {
            match decode_one(&buf[offset..]) {
                Decoded::Record(_, consumed) => offset += consumed,
                Decoded::End => break,
            }
        }
        Ok(offset)
    }

    /// Forward-scan the active sector, returning the most recent non-deleted
    /// record for `key`, tracking the last match rather than stopping at the
    /// first: a forward scan that kept only the first hit could never
    /// observe an overwrite, so "the match that wins" is the one closest to
    /// the tail of the log. A CRC mismatch still ends the scan outright.
    fn find_latest(&self, key: &[u8]) -> Result<Option<Record>, KvError> {
        let base = self.sector_base(self.active) + SECTOR_HEADER_LEN;
        let mut buf = alloc::vec![0u8; self.used];
        if self.used > 0 {
            self.flash.read(base, &mut buf)?;
        }
        let mut offset = 0;
        let mut found: Option<Record> = None;
        while offset < buf.len() {
            match decode_one(&buf[offset..]) {
                Decoded::Record(rec, consumed) => {
                    if rec.key == key {
                        found = Some(rec);
                    }
                    offset += consumed;
                }
                Decoded::End => break,
            }
        }
        Ok(found)
    }

    /// `fs_read`: returns the value length, or `0` if the key is absent or
    /// tombstoned. Copies up to `buf.len()` bytes of the value into `buf`.
    pub fn fs_read(&self, key: &[u8], buf: &mut [u8]) -> Result<usize, KvError> {
        if !validate_key(key) {
            return Err(KvError::InvalidKey);
        }
        match self.find_latest(key)? {
            Some(rec) if !rec.is_tombstone() => {
                let n = rec.value.len().min(buf.len());
                buf[..n].copy_from_slice(&rec.value[..n]);
                Ok(rec.value.len())
            }
            _ => Ok(0),
        }
    }

    /// `fs_write`: append a new record, compacting first if there isn't
    /// room, and failing if there still isn't room afterward.
    pub fn fs_write(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        if !validate_key(key) || key.len() > MAX_KEY_LEN {
            return Err(KvError::InvalidKey);
        }
        self.write_record(key, value)
    }

    /// `fs_remove`: logical delete via a zero-length value record.
    pub fn fs_remove(&mut self, key: &[u8]) -> Result<(), KvError> {
        if !validate_key(key) {
            return Err(KvError::InvalidKey);
        }
        self.write_record(key, &[])
    }

    /// `fs_erase`: wipe the whole region back to a blank, freshly mounted
    /// store.
    pub fn fs_erase(&mut self) -> Result<(), KvError> {
        self.flash.erase_sector(0)?;
        self.flash.erase_sector(1)?;
        self.init_blank_sector(0, 0)
    }

    fn write_record(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        let rec = Record {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        let needed = rec.encoded_len();
        let capacity = self.sector_size() - SECTOR_HEADER_LEN;
        if needed > capacity {
            return Err(KvError::RegionFull);
        }
        if self.free_tail() < needed || self.should_compact() {
            self.compact()?;
        }
        if self.free_tail() < needed {
            return Err(KvError::RegionFull);
        }
        let addr = self.sector_base(self.active) + SECTOR_HEADER_LEN + self.used;
        let bytes = rec.encode();
        self.flash.write(addr, &bytes)?;
        self.used += bytes.len();
        Ok(())
    }

    fn free_tail(&self) -> usize {
        (self.sector_size() - SECTOR_HEADER_LEN).saturating_sub(self.used)
    }

    fn should_compact(&self) -> bool {
        self.free_tail() * COMPACT_THRESHOLD_DEN < self.sector_size() * COMPACT_THRESHOLD_NUM
    }

    /// Collect the latest live value for every unique key, rewrite them
    /// densely into the other sector, then atomically switch over: the new
    /// sector's sentinel is written valid only after the full rewrite
    /// succeeds, and the old sector's sentinel is only then cleared to
    /// stale, so a crash at any point during compaction leaves exactly one
    /// sector readable as `0xA5` (ties broken by generation, see `mount`).
    pub fn compact(&mut self) -> Result<(), KvError> {
        let live = self.collect_live()?;
        let other = 1 - self.active;
        self.flash.erase_sector(other)?;
        let mut offset = self.sector_base(other) + SECTOR_HEADER_LEN;
        let mut used = 0;
        for rec in &live {
            let bytes = rec.encode();
            self.flash.write(offset, &bytes)?;
            offset += bytes.len();
            used += bytes.len();
        }
        let next_gen = self.generation.wrapping_add(1);
        let mut header = [0u8; SECTOR_HEADER_LEN];
        header[0] = SENTINEL_VALID;
        header[1..5].copy_from_slice(&next_gen.to_le_bytes());
        self.flash.write(self.sector_base(other), &header)?;

        // Demote the old sector only after the new one is durably valid.
        self.flash
            .write(self.sector_base(self.active), &[SENTINEL_STALE])?;

        debug!(
            "flash KV compaction: sector {} -> {} ({} live records, {} bytes)",
            self.active,
            other,
            live.len(),
            used
        );
        self.active = other;
        self.generation = next_gen;
        self.used = used;
        Ok(())
    }

    fn collect_live(&self) -> Result<Vec<Record>, KvError> {
        let base = self.sector_base(self.active) + SECTOR_HEADER_LEN;
        let mut buf = alloc::vec![0u8; self.used];
        if self.used > 0 {
            self.flash.read(base, &mut buf)?;
        }
        let mut offset = 0;
        let mut live: Vec<Record> = Vec::new();
        while offset < buf.len() {
            match decode_one(&buf[offset..]) {
                Decoded::Record(rec, consumed) => {
                    if let Some(existing) = live.iter_mut().find(|r: &&mut Record| r.key == rec.key) {
                        *existing = rec;
                    } else {
                        live.push(rec);
                    }
                    offset += consumed;
                }
                Decoded::End => break,
            }
        }
        live.retain(|r| !r.is_tombstone());
        Ok(live)
    }

    /// Total bytes currently occupied by the live log (for diagnostics and
    /// the "region ≥90% full" style test scenarios).
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Capacity of one sector's log area, excluding the header.
    pub fn sector_capacity(&self) -> usize {
        self.sector_size() - SECTOR_HEADER_LEN
    }
}

impl KvStore<crate::flash::RamFlash> {
    /// Snapshot the whole backing flash image, for crash-injection tests.
    pub fn flash_snapshot(&self) -> Vec<u8> {
        self.flash.dump()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::RamFlash;

    fn store() -> KvStore<RamFlash> {
        KvStore::mount(RamFlash::new(4096, 2)).unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut kv = store();
        kv.fs_write(b"ip", b"192.168.1.50").unwrap();
        let mut buf = [0u8; 32];
        let n = kv.fs_read(b"ip", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"192.168.1.50");
    }

    #[test]
    fn missing_key_reads_as_empty() {
        let kv = store();
        let mut buf = [0u8; 8];
        assert_eq!(kv.fs_read(b"nope", &mut buf).unwrap(), 0);
    }

    #[test]
    fn remove_then_read_is_not_found() {
        let mut kv = store();
        kv.fs_write(b"k", b"v").unwrap();
        kv.fs_remove(b"k").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(kv.fs_read(b"k", &mut buf).unwrap(), 0);
    }

    #[test]
    fn overwrite_returns_latest_value() {
        let mut kv = store();
        kv.fs_write(b"k", b"first").unwrap();
        kv.fs_write(b"k", b"second").unwrap();
        let mut buf = [0u8; 16];
        let n = kv.fs_read(b"k", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"second");
    }

    #[test]
    fn compaction_preserves_live_set_and_drops_dead_keys() {
        let mut kv = store();
        for i in 0..40u32 {
            kv.fs_write(alloc::format!("k{i}").as_bytes(), b"0123456789").unwrap();
        }
        kv.fs_remove(b"k0").unwrap();
        let before = kv.used_bytes();
        kv.compact().unwrap();
        assert!(kv.used_bytes() <= before);
        let mut buf = [0u8; 16];
        assert_eq!(kv.fs_read(b"k0", &mut buf).unwrap(), 0);
        let n = kv.fs_read(b"k39", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"0123456789");
    }

    #[test]
    fn fs_write_triggers_compaction_when_region_is_nearly_full() {
        let mut kv = store();
        let value = [b'x'; 100];
        let mut i = 0;
        while kv.free_tail() > 200 {
            kv.fs_write(alloc::format!("key{i}").as_bytes(), &value).unwrap();
            i += 1;
        }
        assert!(kv.used_bytes() as f64 / kv.sector_capacity() as f64 >= 0.5);
        kv.fs_write(b"final", b"ok").unwrap();
        let mut buf = [0u8; 8];
        let n = kv.fs_read(b"final", &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ok");
        let n = kv.fs_read(b"key0", &mut buf).unwrap();
        assert_eq!(n, value.len());
    }

    #[test]
    fn fs_erase_blanks_the_region() {
        let mut kv = store();
        kv.fs_write(b"k", b"v").unwrap();
        kv.fs_erase().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(kv.fs_read(b"k", &mut buf).unwrap(), 0);
        assert_eq!(kv.used_bytes(), 0);
    }

    #[test]
    fn remount_after_compaction_sees_correct_sector() {
        let mut kv = KvStore::mount(RamFlash::new(1024, 2)).unwrap();
        kv.fs_write(b"a", b"1").unwrap();
        for i in 0..15u32 {
            kv.fs_write(
                alloc::format!("pad{i}").as_bytes(),
                b"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
            )
            .unwrap();
        }
        let active_before = kv.active;
        let gen_before = kv.generation;
        kv.compact().unwrap();
        assert_ne!(kv.active, active_before);
        assert!(kv.generation > gen_before);

        // Simulate a reboot: mount a fresh store over the same flash image
        // and confirm it picks the post-compaction sector.
        let snapshot = kv.flash.clone();
        let remounted = KvStore::mount(snapshot).unwrap();
        assert_eq!(remounted.active, kv.active);
        assert_eq!(remounted.generation, kv.generation);
        let mut buf = [0u8; 8];
        assert_eq!(remounted.fs_read(b"a", &mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], b"1");
    }
}
