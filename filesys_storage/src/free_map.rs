//! Free-space bitmap
//!
//! One bit per device sector; a set bit means the sector is in use. The
//! bitmap itself is persisted as the contents of a file-kind inode stored at
//! `FREE_MAP_SECTOR`, so it is found again at mount time.

use hal::BLOCK_SIZE;

use crate::buffer_cache::BufferCache;
use crate::error::{StorageError, StorageResult};
use crate::inode::DiskInode;
use crate::layout::{bytes_to_sectors, SectorId, FREE_MAP_SECTOR, ROOT_DIR_SECTOR};

/// Sector allocation bitmap
#[derive(Debug, Clone)]
pub struct FreeMap {
    bits: Vec<u8>,
    sector_count: u64,
    /// Data sectors of the free-map file
    file_sectors: Vec<SectorId>,
}

impl FreeMap {
    /// Creates a bitmap with every sector free
    pub fn new(sector_count: u64) -> Self {
        Self {
            bits: vec![0; (sector_count as usize).div_ceil(8)],
            sector_count,
            file_sectors: Vec::new(),
        }
    }

    pub fn sector_count(&self) -> u64 {
        self.sector_count
    }

    /// Size of the persisted bitmap in bytes
    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_used(&self, sector: SectorId) -> bool {
        sector < self.sector_count && self.bits[(sector / 8) as usize] & (1 << (sector % 8)) != 0
    }

    pub fn mark_used(&mut self, sector: SectorId) {
        if sector < self.sector_count {
            self.bits[(sector / 8) as usize] |= 1 << (sector % 8);
        }
    }

    fn mark_free(&mut self, sector: SectorId) {
        if sector < self.sector_count {
            self.bits[(sector / 8) as usize] &= !(1 << (sector % 8));
        }
    }

    /// Number of sectors not in use
    pub fn free_count(&self) -> u64 {
        (0..self.sector_count).filter(|&s| !self.is_used(s)).count() as u64
    }

    /// Finds the first run of `count` free sectors, marks it used and
    /// returns its first sector
    pub fn allocate(&mut self, count: usize) -> Option<SectorId> {
        if count == 0 {
            return None;
        }
        let count = count as u64;
        let mut run_start = 0;
        let mut run_len = 0;
        for sector in 0..self.sector_count {
            if self.is_used(sector) {
                run_len = 0;
                run_start = sector + 1;
                continue;
            }
            run_len += 1;
            if run_len == count {
                for s in run_start..run_start + count {
                    self.mark_used(s);
                }
                return Some(run_start);
            }
        }
        None
    }

    /// Marks `count` sectors starting at `sector` free again
    ///
    /// Returns false if any of them was not in use.
    pub fn release(&mut self, sector: SectorId, count: usize) -> bool {
        let mut all_used = true;
        for s in sector..sector + count as u64 {
            if !self.is_used(s) {
                all_used = false;
            }
            self.mark_free(s);
        }
        all_used
    }

    /// Builds the bitmap for a freshly formatted device and writes the
    /// free-map file (its inode and its contents)
    pub(crate) fn create(cache: &mut BufferCache, sector_count: u64) -> StorageResult<Self> {
        let mut map = Self::new(sector_count);
        map.mark_used(FREE_MAP_SECTOR);
        map.mark_used(ROOT_DIR_SECTOR);

        let len = map.byte_len() as u64;
        let needed = bytes_to_sectors(len);
        let start = map.allocate(needed).ok_or(StorageError::NoSpace)?;
        map.file_sectors = (start..start + needed as u64).collect();

        DiskInode::new(len, false, map.file_sectors.clone()).write(cache, FREE_MAP_SECTOR)?;
        map.store(cache)?;
        Ok(map)
    }

    /// Loads the bitmap from the free-map file of a formatted device
    pub(crate) fn open(cache: &mut BufferCache) -> StorageResult<Self> {
        let sector_count = cache.sector_count();
        let inode = DiskInode::read(cache, FREE_MAP_SECTOR)?;

        let mut map = Self::new(sector_count);
        if inode.length != map.byte_len() as u64 {
            return Err(StorageError::CorruptInode {
                sector: FREE_MAP_SECTOR,
                reason: format!(
                    "free map holds {} bytes, device needs {}",
                    inode.length,
                    map.byte_len()
                ),
            });
        }

        for (i, chunk) in map.bits.chunks_mut(BLOCK_SIZE).enumerate() {
            let sector = inode.sectors.get(i).copied().ok_or_else(|| {
                StorageError::CorruptInode {
                    sector: FREE_MAP_SECTOR,
                    reason: "free map file is missing data sectors".to_string(),
                }
            })?;
            cache.read_at(sector, 0, chunk)?;
        }
        map.file_sectors = inode.sectors;
        Ok(map)
    }

    /// Writes the bitmap into the free-map file
    pub(crate) fn store(&self, cache: &mut BufferCache) -> StorageResult<()> {
        for (chunk, &sector) in self.bits.chunks(BLOCK_SIZE).zip(&self.file_sectors) {
            cache.write_at(sector, 0, chunk)?;
        }
        Ok(())
    }
}
