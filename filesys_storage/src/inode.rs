//! Inode layer
//!
//! An inode is the on-disk object stored at a sector: a small record with
//! the object's length, its kind (file or directory) and the list of data
//! sectors holding its bytes.
//!
//! ## Open inodes
//!
//! All handles on the same sector share one `InodeState` through the
//! volume's open-inode table, so they observe a single open count. Dropping
//! a handle closes it. An inode marked removed keeps working for every
//! holder and is reclaimed (data sectors and its own sector) only when the
//! last handle is dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use hal::BLOCK_SIZE;
use serde::{Deserialize, Serialize};

use crate::buffer_cache::BufferCache;
use crate::error::{StorageError, StorageResult};
use crate::layout::{bytes_to_sectors, SectorId, INODE_MAGIC, MAX_INODE_SECTORS};
use crate::volume::{lock, Volume};

/// Inode record as stored on disk
///
/// Serialized as JSON into a zero-padded sector, guarded by a magic number
/// and a CRC32 checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DiskInode {
    magic: u32,
    pub(crate) length: u64,
    pub(crate) is_dir: bool,
    pub(crate) sectors: Vec<SectorId>,
    /// CRC32 of the record with this field set to zero
    checksum: u32,
}

impl DiskInode {
    pub(crate) fn new(length: u64, is_dir: bool, sectors: Vec<SectorId>) -> Self {
        let mut inode = Self {
            magic: INODE_MAGIC,
            length,
            is_dir,
            sectors,
            checksum: 0,
        };
        inode.checksum = inode.compute_checksum();
        inode
    }

    fn compute_checksum(&self) -> u32 {
        let mut temp = self.clone();
        temp.checksum = 0;
        let data = serde_json::to_vec(&temp).unwrap_or_default();
        crc32fast::hash(&data)
    }

    pub(crate) fn write(&self, cache: &mut BufferCache, sector: SectorId) -> StorageResult<()> {
        let json =
            serde_json::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))?;
        if json.len() > BLOCK_SIZE {
            return Err(StorageError::Serialization(format!(
                "inode record of {} bytes does not fit in a sector",
                json.len()
            )));
        }
        let mut block = [0u8; BLOCK_SIZE];
        block[..json.len()].copy_from_slice(&json);
        cache.write_at(sector, 0, &block)
    }

    pub(crate) fn read(cache: &mut BufferCache, sector: SectorId) -> StorageResult<Self> {
        let mut block = [0u8; BLOCK_SIZE];
        cache.read_at(sector, 0, &mut block)?;

        let json_end = block.iter().position(|&b| b == 0).unwrap_or(BLOCK_SIZE);
        let corrupt = |reason: String| StorageError::CorruptInode { sector, reason };

        let inode: DiskInode =
            serde_json::from_slice(&block[..json_end]).map_err(|e| corrupt(e.to_string()))?;
        if inode.magic != INODE_MAGIC {
            return Err(corrupt(format!("bad magic {:#x}", inode.magic)));
        }
        if inode.checksum != inode.compute_checksum() {
            return Err(corrupt("checksum mismatch".to_string()));
        }
        Ok(inode)
    }
}

/// Shared in-memory state of an open inode
pub(crate) struct InodeState {
    sector: SectorId,
    inner: Mutex<InodeInner>,
    /// Serializes directory entry lookups and mutations on this inode
    entries: Mutex<()>,
}

struct InodeInner {
    open_count: usize,
    removed: bool,
    disk: DiskInode,
}

/// An open handle on an inode
///
/// Closing is dropping. `reopen` hands out another handle on the same
/// inode and bumps the shared open count.
pub struct Inode {
    volume: Arc<Volume>,
    state: Arc<InodeState>,
}

impl Inode {
    /// Writes a new inode of `length` bytes at `sector`
    ///
    /// Data sectors are allocated from the free map and zeroed. On failure
    /// every data sector allocated so far is released again; `sector` itself
    /// is owned by the caller and left alone.
    pub fn create(volume: &Volume, sector: SectorId, length: u64, is_dir: bool) -> StorageResult<()> {
        if sector >= volume.sector_count() {
            return Err(StorageError::SectorOutOfRange(sector));
        }
        let count = bytes_to_sectors(length);
        if count > MAX_INODE_SECTORS {
            return Err(StorageError::FileTooLarge(length));
        }

        let mut sectors = Vec::with_capacity(count);
        let result = (|| {
            for _ in 0..count {
                let data = volume.allocate(1)?;
                sectors.push(data);
                volume.with_cache(|cache| cache.zero(data))?;
            }
            let disk = DiskInode::new(length, is_dir, sectors.clone());
            volume.with_cache(|cache| disk.write(cache, sector))
        })();

        if result.is_err() {
            for &data in &sectors {
                if let Err(e) = volume.release(data, 1) {
                    log::warn!("inode create rollback: releasing sector {}: {}", data, e);
                }
            }
        }
        result
    }

    /// Opens the inode stored at `sector`
    ///
    /// If the inode is already open, the existing state is shared.
    pub fn open(volume: &Arc<Volume>, sector: SectorId) -> StorageResult<Inode> {
        let mut table = volume.lock_open_inodes();
        if let Some(state) = table.get(&sector) {
            lock(&state.inner).open_count += 1;
            return Ok(Inode {
                volume: Arc::clone(volume),
                state: Arc::clone(state),
            });
        }

        let disk = volume.with_cache(|cache| DiskInode::read(cache, sector))?;
        let state = Arc::new(InodeState {
            sector,
            inner: Mutex::new(InodeInner {
                open_count: 1,
                removed: false,
                disk,
            }),
            entries: Mutex::new(()),
        });
        table.insert(sector, Arc::clone(&state));
        Ok(Inode {
            volume: Arc::clone(volume),
            state,
        })
    }

    /// Opens another handle on the same inode
    pub fn reopen(&self) -> Inode {
        lock(&self.state.inner).open_count += 1;
        Inode {
            volume: Arc::clone(&self.volume),
            state: Arc::clone(&self.state),
        }
    }

    /// The sector this inode lives at, which doubles as its inode number
    pub fn inumber(&self) -> SectorId {
        self.state.sector
    }

    pub fn is_directory(&self) -> bool {
        lock(&self.state.inner).disk.is_dir
    }

    /// Number of handles currently open on this inode, across all callers
    pub fn open_count(&self) -> usize {
        lock(&self.state.inner).open_count
    }

    /// Logical length in bytes
    pub fn length(&self) -> u64 {
        lock(&self.state.inner).disk.length
    }

    pub fn is_removed(&self) -> bool {
        lock(&self.state.inner).removed
    }

    /// Marks the inode for reclamation when its last handle closes
    pub fn remove(&self) {
        lock(&self.state.inner).removed = true;
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    /// Reads up to `buf.len()` bytes starting at `offset`
    ///
    /// Returns the number of bytes read, which is short at end of file.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<usize> {
        let inner = lock(&self.state.inner);
        let len = span(inner.disk.length, offset, buf.len());

        let mut done = 0;
        while done < len {
            let pos = offset + done as u64;
            let sector = inner.disk.sectors[(pos / BLOCK_SIZE as u64) as usize];
            let sector_ofs = (pos % BLOCK_SIZE as u64) as usize;
            let chunk = (BLOCK_SIZE - sector_ofs).min(len - done);
            self.volume
                .with_cache(|cache| cache.read_at(sector, sector_ofs, &mut buf[done..done + chunk]))?;
            done += chunk;
        }
        Ok(done)
    }

    /// Writes up to `data.len()` bytes starting at `offset`
    ///
    /// Inodes do not grow: bytes past the logical length are not written.
    /// Returns the number of bytes written.
    pub fn write_at(&self, data: &[u8], offset: u64) -> StorageResult<usize> {
        let inner = lock(&self.state.inner);
        let len = span(inner.disk.length, offset, data.len());

        let mut done = 0;
        while done < len {
            let pos = offset + done as u64;
            let sector = inner.disk.sectors[(pos / BLOCK_SIZE as u64) as usize];
            let sector_ofs = (pos % BLOCK_SIZE as u64) as usize;
            let chunk = (BLOCK_SIZE - sector_ofs).min(len - done);
            self.volume
                .with_cache(|cache| cache.write_at(sector, sector_ofs, &data[done..done + chunk]))?;
            done += chunk;
        }
        Ok(done)
    }

    /// Holds the directory-entry lock of this inode
    pub(crate) fn lock_entries(&self) -> MutexGuard<'_, ()> {
        lock(&self.state.entries)
    }
}

/// Number of bytes of a `want`-byte access at `offset` that fall inside `length`
fn span(length: u64, offset: u64, want: usize) -> usize {
    if offset >= length {
        return 0;
    }
    (length - offset).min(want as u64) as usize
}

impl Drop for Inode {
    fn drop(&mut self) {
        let mut table = self.volume.lock_open_inodes();
        let mut inner = lock(&self.state.inner);
        inner.open_count = inner.open_count.saturating_sub(1);
        if inner.open_count > 0 {
            return;
        }

        table.remove(&self.state.sector);
        if !inner.removed {
            return;
        }

        log::trace!("inode {}: reclaiming on last close", self.state.sector);
        for &data in &inner.disk.sectors {
            if let Err(e) = self.volume.release(data, 1) {
                log::warn!("inode {}: releasing data sector {}: {}", self.state.sector, data, e);
            }
        }
        if let Err(e) = self.volume.release(self.state.sector, 1) {
            log::warn!("inode {}: releasing inode sector: {}", self.state.sector, e);
        }
    }
}

impl fmt::Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.state.inner);
        f.debug_struct("Inode")
            .field("sector", &self.state.sector)
            .field("is_dir", &inner.disk.is_dir)
            .field("length", &inner.disk.length)
            .field("open_count", &inner.open_count)
            .field("removed", &inner.removed)
            .finish()
    }
}
