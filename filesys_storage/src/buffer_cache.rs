//! Write-back sector cache
//!
//! Every sector access of the file system goes through a `BufferCache`.
//! The cache keeps a fixed number of sector-sized slots; a miss with no free
//! slot evicts a victim chosen by the clock algorithm, writing it back first
//! if it is dirty.
//!
//! ## Lifecycle
//!
//! - `new` is the cache's init: it takes ownership of the device
//! - `flush` writes every dirty slot back and flushes the device
//! - `teardown` flushes and hands the device back

use std::collections::HashMap;

use hal::{BlockDevice, BLOCK_SIZE};

use crate::error::{StorageError, StorageResult};
use crate::layout::SectorId;

/// Default number of cached sectors
pub const DEFAULT_CACHE_SLOTS: usize = 64;

/// Counters describing cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub write_backs: u64,
}

struct CacheSlot {
    sector: SectorId,
    data: Box<[u8; BLOCK_SIZE]>,
    dirty: bool,
    accessed: bool,
}

/// A fixed-capacity, write-back cache in front of a block device
pub struct BufferCache {
    device: Box<dyn BlockDevice + Send>,
    slots: Vec<CacheSlot>,
    index: HashMap<SectorId, usize>,
    capacity: usize,
    clock_hand: usize,
    stats: CacheStats,
}

impl BufferCache {
    /// Creates a cache with room for `capacity` sectors (at least one)
    pub fn new(device: Box<dyn BlockDevice + Send>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            device,
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            capacity,
            clock_hand: 0,
            stats: CacheStats::default(),
        }
    }

    /// Number of sectors on the underlying device
    pub fn sector_count(&self) -> u64 {
        self.device.block_count()
    }

    /// Number of slots currently holding a sector
    pub fn resident(&self) -> usize {
        self.slots.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Copies `buf.len()` bytes starting at `offset` within `sector` into `buf`
    pub fn read_at(&mut self, sector: SectorId, offset: usize, buf: &mut [u8]) -> StorageResult<()> {
        check_range(offset, buf.len())?;
        let idx = self.slot_for(sector, true)?;
        buf.copy_from_slice(&self.slots[idx].data[offset..offset + buf.len()]);
        Ok(())
    }

    /// Copies `data` into `sector` starting at `offset`
    ///
    /// A write covering the whole sector does not read the old contents.
    pub fn write_at(&mut self, sector: SectorId, offset: usize, data: &[u8]) -> StorageResult<()> {
        check_range(offset, data.len())?;
        let whole = offset == 0 && data.len() == BLOCK_SIZE;
        let idx = self.slot_for(sector, !whole)?;
        let slot = &mut self.slots[idx];
        slot.data[offset..offset + data.len()].copy_from_slice(data);
        slot.dirty = true;
        Ok(())
    }

    /// Overwrites `sector` with zeros
    pub fn zero(&mut self, sector: SectorId) -> StorageResult<()> {
        let idx = self.slot_for(sector, false)?;
        let slot = &mut self.slots[idx];
        slot.data.fill(0);
        slot.dirty = true;
        Ok(())
    }

    /// Writes every dirty slot back and flushes the device
    pub fn flush(&mut self) -> StorageResult<()> {
        for slot in self.slots.iter_mut().filter(|s| s.dirty) {
            self.device.write_block(slot.sector, &slot.data[..])?;
            slot.dirty = false;
            self.stats.write_backs += 1;
        }
        self.device.flush()?;
        Ok(())
    }

    /// Flushes and returns the device
    pub fn teardown(mut self) -> StorageResult<Box<dyn BlockDevice + Send>> {
        self.flush()?;
        Ok(self.device)
    }

    fn slot_for(&mut self, sector: SectorId, load: bool) -> StorageResult<usize> {
        if let Some(&idx) = self.index.get(&sector) {
            self.stats.hits += 1;
            self.slots[idx].accessed = true;
            return Ok(idx);
        }

        self.stats.misses += 1;
        if sector >= self.sector_count() {
            return Err(StorageError::SectorOutOfRange(sector));
        }

        let mut data = Box::new([0u8; BLOCK_SIZE]);
        if load {
            self.device.read_block(sector, &mut data[..])?;
        }

        let slot = CacheSlot {
            sector,
            data,
            dirty: false,
            accessed: true,
        };

        let idx = if self.slots.len() < self.capacity {
            self.slots.push(slot);
            self.slots.len() - 1
        } else {
            let idx = self.evict()?;
            self.slots[idx] = slot;
            idx
        };
        self.index.insert(sector, idx);
        Ok(idx)
    }

    /// Picks a victim with the clock algorithm and writes it back if dirty
    fn evict(&mut self) -> StorageResult<usize> {
        loop {
            let idx = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % self.slots.len();

            let slot = &mut self.slots[idx];
            if slot.accessed {
                slot.accessed = false;
                continue;
            }

            if slot.dirty {
                self.device.write_block(slot.sector, &slot.data[..])?;
                slot.dirty = false;
                self.stats.write_backs += 1;
            }
            log::trace!("buffer cache: evicting sector {}", slot.sector);
            self.index.remove(&slot.sector);
            self.stats.evictions += 1;
            return Ok(idx);
        }
    }
}

fn check_range(offset: usize, len: usize) -> StorageResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= BLOCK_SIZE => Ok(()),
        _ => Err(StorageError::BadRange { offset, len }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamDisk;

    fn cache(blocks: usize, slots: usize) -> BufferCache {
        BufferCache::new(Box::new(RamDisk::new(blocks)), slots)
    }

    #[test]
    fn test_write_then_read_hits_cache() {
        let mut cache = cache(8, 4);
        cache.write_at(2, 10, b"hello").unwrap();

        let mut out = [0u8; 5];
        cache.read_at(2, 10, &mut out).unwrap();
        assert_eq!(&out, b"hello");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_eviction_writes_back_dirty_slot() {
        let mut cache = cache(8, 2);
        cache.write_at(0, 0, b"zero").unwrap();
        cache.write_at(1, 0, b"one").unwrap();
        // Third sector forces an eviction.
        cache.write_at(2, 0, b"two").unwrap();
        assert_eq!(cache.resident(), 2);
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.stats().write_backs >= 1);

        // Every sector still reads back, whether cached or reloaded.
        let mut out = [0u8; 4];
        cache.read_at(0, 0, &mut out).unwrap();
        assert_eq!(&out, b"zero");
        let mut out = [0u8; 3];
        cache.read_at(1, 0, &mut out).unwrap();
        assert_eq!(&out, b"one");
    }

    #[test]
    fn test_teardown_flushes_to_device() {
        let mut cache = cache(4, 4);
        cache.write_at(3, 100, &[9u8; 16]).unwrap();

        let mut device = cache.teardown().unwrap();
        let mut block = [0u8; BLOCK_SIZE];
        device.read_block(3, &mut block).unwrap();
        assert_eq!(&block[100..116], &[9u8; 16]);
    }

    #[test]
    fn test_zero_clears_sector() {
        let mut cache = cache(4, 4);
        cache.write_at(1, 0, &[0xFFu8; 32]).unwrap();
        cache.zero(1).unwrap();

        let mut out = [1u8; 32];
        cache.read_at(1, 0, &mut out).unwrap();
        assert_eq!(out, [0u8; 32]);
    }

    #[test]
    fn test_out_of_range_sector() {
        let mut cache = cache(4, 4);
        let mut out = [0u8; 1];
        assert_eq!(
            cache.read_at(4, 0, &mut out),
            Err(StorageError::SectorOutOfRange(4))
        );
    }

    #[test]
    fn test_range_past_sector_end_rejected() {
        let mut cache = cache(4, 4);
        let result = cache.write_at(0, BLOCK_SIZE - 2, b"abc");
        assert!(matches!(result, Err(StorageError::BadRange { .. })));
    }
}
