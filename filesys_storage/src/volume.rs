//! Mounted volume
//!
//! A `Volume` owns everything below the namespace layer that is shared by
//! all callers: the buffer cache in front of the device, the free map, and
//! the table of open inodes. Each of them sits behind its own mutex, which
//! makes every individual lower-layer call atomic.
//!
//! Lock order: open-inode table, inode state, free map, buffer cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hal::BlockDevice;

use crate::buffer_cache::{BufferCache, CacheStats};
use crate::error::{StorageError, StorageResult};
use crate::free_map::FreeMap;
use crate::inode::InodeState;
use crate::layout::{SectorId, MIN_DEVICE_SECTORS};

/// Locks a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A block device with its cache, free map and open inodes
pub struct Volume {
    cache: Mutex<BufferCache>,
    free_map: Mutex<FreeMap>,
    open_inodes: Mutex<HashMap<SectorId, Arc<InodeState>>>,
    sector_count: u64,
}

impl Volume {
    /// Formats `device`: writes a fresh free map with the free-map and
    /// root-directory sectors reserved
    ///
    /// The root directory itself is created by the caller.
    pub fn format(device: Box<dyn BlockDevice + Send>, cache_slots: usize) -> StorageResult<Arc<Self>> {
        let sector_count = device.block_count();
        if sector_count < MIN_DEVICE_SECTORS {
            return Err(StorageError::DeviceTooSmall(sector_count));
        }

        log::info!("volume: formatting {} sectors", sector_count);
        let mut cache = BufferCache::new(device, cache_slots);
        let free_map = FreeMap::create(&mut cache, sector_count)?;
        cache.flush()?;
        Ok(Self::assemble(cache, free_map, sector_count))
    }

    /// Mounts an already formatted device
    pub fn mount(device: Box<dyn BlockDevice + Send>, cache_slots: usize) -> StorageResult<Arc<Self>> {
        let sector_count = device.block_count();
        if sector_count < MIN_DEVICE_SECTORS {
            return Err(StorageError::DeviceTooSmall(sector_count));
        }

        let mut cache = BufferCache::new(device, cache_slots);
        let free_map = FreeMap::open(&mut cache)?;
        log::info!(
            "volume: mounted {} sectors, {} free",
            sector_count,
            free_map.free_count()
        );
        Ok(Self::assemble(cache, free_map, sector_count))
    }

    fn assemble(cache: BufferCache, free_map: FreeMap, sector_count: u64) -> Arc<Self> {
        Arc::new(Self {
            cache: Mutex::new(cache),
            free_map: Mutex::new(free_map),
            open_inodes: Mutex::new(HashMap::new()),
            sector_count,
        })
    }

    pub fn sector_count(&self) -> u64 {
        self.sector_count
    }

    /// Allocates `count` contiguous sectors and persists the free map
    pub fn allocate(&self, count: usize) -> StorageResult<SectorId> {
        let mut free_map = lock(&self.free_map);
        let sector = free_map.allocate(count).ok_or(StorageError::NoSpace)?;
        if let Err(e) = free_map.store(&mut lock(&self.cache)) {
            free_map.release(sector, count);
            return Err(e);
        }
        Ok(sector)
    }

    /// Returns `count` sectors starting at `sector` to the free map
    pub fn release(&self, sector: SectorId, count: usize) -> StorageResult<()> {
        let mut free_map = lock(&self.free_map);
        if !free_map.release(sector, count) {
            log::warn!("volume: released sectors {}+{} that were not all in use", sector, count);
        }
        free_map.store(&mut lock(&self.cache))
    }

    pub fn free_sector_count(&self) -> u64 {
        lock(&self.free_map).free_count()
    }

    pub fn is_sector_used(&self, sector: SectorId) -> bool {
        lock(&self.free_map).is_used(sector)
    }

    /// Number of distinct inodes with at least one open handle
    pub fn open_inode_count(&self) -> usize {
        lock(&self.open_inodes).len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        lock(&self.cache).stats()
    }

    /// Writes the free map and every dirty cached sector to the device
    pub fn flush(&self) -> StorageResult<()> {
        let free_map = lock(&self.free_map);
        let mut cache = lock(&self.cache);
        free_map.store(&mut cache)?;
        cache.flush()
    }

    /// Closes the free map and tears the cache down to the device
    ///
    /// The volume stays usable afterwards; shutting down is a full flush.
    pub fn shutdown(&self) -> StorageResult<()> {
        let open = self.open_inode_count();
        if open > 0 {
            log::warn!("volume: shutting down with {} inodes still open", open);
        }
        self.flush()?;
        log::info!("volume: shut down");
        Ok(())
    }

    /// Runs `f` with exclusive access to the buffer cache
    pub(crate) fn with_cache<R>(&self, f: impl FnOnce(&mut BufferCache) -> R) -> R {
        f(&mut lock(&self.cache))
    }

    pub(crate) fn lock_open_inodes(&self) -> MutexGuard<'_, HashMap<SectorId, Arc<InodeState>>> {
        lock(&self.open_inodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FREE_MAP_SECTOR, ROOT_DIR_SECTOR};
    use hal::RamDisk;

    #[test]
    fn test_format_reserves_metadata_sectors() {
        let volume = Volume::format(Box::new(RamDisk::new(32)), 8).unwrap();
        assert!(volume.is_sector_used(FREE_MAP_SECTOR));
        assert!(volume.is_sector_used(ROOT_DIR_SECTOR));
        // free-map inode, root inode, one free-map data sector
        assert_eq!(volume.free_sector_count(), 29);
    }

    #[test]
    fn test_format_rejects_tiny_device() {
        let result = Volume::format(Box::new(RamDisk::new(2)), 8);
        assert!(matches!(result, Err(StorageError::DeviceTooSmall(2))));
    }

    #[test]
    fn test_allocate_until_exhausted() {
        let volume = Volume::format(Box::new(RamDisk::new(8)), 8).unwrap();
        let free = volume.free_sector_count();
        for _ in 0..free {
            volume.allocate(1).unwrap();
        }
        assert_eq!(volume.allocate(1), Err(StorageError::NoSpace));
    }

    #[test]
    fn test_release_makes_sector_reusable() {
        let volume = Volume::format(Box::new(RamDisk::new(8)), 8).unwrap();
        let sector = volume.allocate(1).unwrap();
        volume.release(sector, 1).unwrap();
        assert!(!volume.is_sector_used(sector));
        assert_eq!(volume.allocate(1).unwrap(), sector);
    }

    #[test]
    fn test_mount_sees_allocations_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.img");

        let sector = {
            let disk = hal::FileDisk::create(&path, 32).unwrap();
            let volume = Volume::format(Box::new(disk), 4).unwrap();
            let sector = volume.allocate(1).unwrap();
            volume.shutdown().unwrap();
            sector
        };

        let disk = hal::FileDisk::open(&path).unwrap();
        let volume = Volume::mount(Box::new(disk), 4).unwrap();
        assert!(volume.is_sector_used(sector));
        assert_eq!(volume.free_sector_count(), 28);
    }

    #[test]
    fn test_mount_unformatted_device_fails() {
        let result = Volume::mount(Box::new(RamDisk::new(16)), 4);
        assert!(matches!(result, Err(StorageError::CorruptInode { .. })));
    }
}
