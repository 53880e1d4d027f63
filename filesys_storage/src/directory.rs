//! Directories
//!
//! A directory is an inode whose bytes are a fixed number of 64-byte entry
//! slots. An all-zero slot is free; a used slot holds a zero-padded JSON
//! record mapping a name to the sector of the entry's inode.
//!
//! Every directory made by the file system also carries a `.` entry (its own
//! sector) and a `..` entry (its parent's sector). The root's `..` is itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::inode::Inode;
use crate::layout::{SectorId, DIR_ENTRY_SIZE, NAME_MAX, ROOT_DIR_SECTOR};
use crate::volume::Volume;

/// One used entry slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DirEntry {
    sector: SectorId,
    name: String,
}

impl DirEntry {
    fn encode(&self) -> StorageResult<[u8; DIR_ENTRY_SIZE]> {
        let json =
            serde_json::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))?;
        if json.len() > DIR_ENTRY_SIZE {
            return Err(StorageError::InvalidName(self.name.clone()));
        }
        let mut slot = [0u8; DIR_ENTRY_SIZE];
        slot[..json.len()].copy_from_slice(&json);
        Ok(slot)
    }

    /// Decodes a slot, `None` for a free one
    fn decode(slot: &[u8], dir_sector: SectorId) -> StorageResult<Option<Self>> {
        let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        if end == 0 {
            return Ok(None);
        }
        serde_json::from_slice(&slot[..end])
            .map(Some)
            .map_err(|e| StorageError::CorruptInode {
                sector: dir_sector,
                reason: format!("bad directory entry: {}", e),
            })
    }
}

/// Checks that `name` can be stored as a directory entry
fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.len() > NAME_MAX || name.contains('/') || name.contains('\0') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// An open directory
///
/// Dropping the directory closes its inode.
#[derive(Debug)]
pub struct Directory {
    inode: Inode,
    /// Slot index of the next `read_next_entry`
    pos: usize,
}

impl Directory {
    /// Creates an empty directory with room for `capacity` entries at `sector`
    pub fn create(volume: &Volume, sector: SectorId, capacity: usize) -> StorageResult<()> {
        Inode::create(volume, sector, (capacity * DIR_ENTRY_SIZE) as u64, true)
    }

    /// Wraps an open inode, which must be a directory
    pub fn open(inode: Inode) -> StorageResult<Self> {
        if !inode.is_directory() {
            return Err(StorageError::NotADirectory(inode.inumber()));
        }
        Ok(Self { inode, pos: 0 })
    }

    pub fn open_root(volume: &Arc<Volume>) -> StorageResult<Self> {
        Self::open(Inode::open(volume, ROOT_DIR_SECTOR)?)
    }

    /// Opens another handle on the same directory, positioned at the start
    pub fn reopen(&self) -> Self {
        Self {
            inode: self.inode.reopen(),
            pos: 0,
        }
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    pub fn inumber(&self) -> SectorId {
        self.inode.inumber()
    }

    /// Number of entry slots, used or free
    pub fn capacity(&self) -> usize {
        self.inode.length() as usize / DIR_ENTRY_SIZE
    }

    fn read_slot(&self, idx: usize) -> StorageResult<Option<DirEntry>> {
        let mut slot = [0u8; DIR_ENTRY_SIZE];
        self.inode.read_at(&mut slot, (idx * DIR_ENTRY_SIZE) as u64)?;
        DirEntry::decode(&slot, self.inumber())
    }

    fn write_slot(&self, idx: usize, slot: &[u8; DIR_ENTRY_SIZE]) -> StorageResult<()> {
        self.inode.write_at(slot, (idx * DIR_ENTRY_SIZE) as u64)?;
        Ok(())
    }

    /// Finds the slot holding `name`; the entry lock must be held
    fn find(&self, name: &str) -> StorageResult<Option<(usize, DirEntry)>> {
        for idx in 0..self.capacity() {
            if let Some(entry) = self.read_slot(idx)? {
                if entry.name == name {
                    return Ok(Some((idx, entry)));
                }
            }
        }
        Ok(None)
    }

    /// Sector of the inode `name` refers to, if present
    pub fn lookup_sector(&self, name: &str) -> StorageResult<Option<SectorId>> {
        let _entries = self.inode.lock_entries();
        Ok(self.find(name)?.map(|(_, entry)| entry.sector))
    }

    /// Opens the inode `name` refers to, if present
    pub fn lookup(&self, name: &str) -> StorageResult<Option<Inode>> {
        let _entries = self.inode.lock_entries();
        match self.find(name)? {
            Some((_, entry)) => Ok(Some(Inode::open(self.inode.volume(), entry.sector)?)),
            None => Ok(None),
        }
    }

    /// Adds an entry `name -> sector`
    ///
    /// Fails with `DuplicateEntry` if `name` is taken and with
    /// `DirectoryFull` if no slot is free.
    pub fn add(&self, name: &str, sector: SectorId) -> StorageResult<()> {
        validate_name(name)?;
        let slot = DirEntry {
            sector,
            name: name.to_string(),
        }
        .encode()?;

        let _entries = self.inode.lock_entries();
        let mut free = None;
        for idx in 0..self.capacity() {
            match self.read_slot(idx)? {
                Some(entry) if entry.name == name => {
                    return Err(StorageError::DuplicateEntry(name.to_string()));
                }
                Some(_) => {}
                None => {
                    free.get_or_insert(idx);
                }
            }
        }

        let idx = free.ok_or(StorageError::DirectoryFull)?;
        self.write_slot(idx, &slot)
    }

    /// Removes the entry `name` and marks its inode removed
    ///
    /// The inode itself is reclaimed once its last handle closes. Returns
    /// false if there was no such entry.
    pub fn remove(&self, name: &str) -> StorageResult<bool> {
        let _entries = self.inode.lock_entries();
        let Some((idx, entry)) = self.find(name)? else {
            return Ok(false);
        };

        let target = Inode::open(self.inode.volume(), entry.sector)?;
        self.write_slot(idx, &[0u8; DIR_ENTRY_SIZE])?;
        target.remove();
        Ok(true)
    }

    /// Removes the entry `name` without touching the inode it refers to
    ///
    /// Used to back out an `add` whose target was never fully set up.
    pub fn unlink(&self, name: &str) -> StorageResult<bool> {
        let _entries = self.inode.lock_entries();
        let Some((idx, _)) = self.find(name)? else {
            return Ok(false);
        };
        self.write_slot(idx, &[0u8; DIR_ENTRY_SIZE])?;
        Ok(true)
    }

    /// Returns the next entry name, skipping `.` and `..`
    pub fn read_next_entry(&mut self) -> StorageResult<Option<String>> {
        let _entries = self.inode.lock_entries();
        while self.pos < self.capacity() {
            let idx = self.pos;
            self.pos += 1;
            if let Some(entry) = self.read_slot(idx)? {
                if entry.name != "." && entry.name != ".." {
                    return Ok(Some(entry.name));
                }
            }
        }
        Ok(None)
    }

    /// True if the directory has no entries besides `.` and `..`
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.reopen().read_next_entry()?.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamDisk;

    fn volume_with_root() -> Arc<Volume> {
        let volume = Volume::format(Box::new(RamDisk::new(64)), 16).unwrap();
        Directory::create(&volume, ROOT_DIR_SECTOR, 4).unwrap();
        volume
    }

    fn new_file(volume: &Volume) -> SectorId {
        let sector = volume.allocate(1).unwrap();
        Inode::create(volume, sector, 0, false).unwrap();
        sector
    }

    #[test]
    fn test_add_and_lookup() {
        let volume = volume_with_root();
        let root = Directory::open_root(&volume).unwrap();
        let sector = new_file(&volume);

        root.add("notes", sector).unwrap();
        assert_eq!(root.lookup_sector("notes").unwrap(), Some(sector));
        let inode = root.lookup("notes").unwrap().unwrap();
        assert_eq!(inode.inumber(), sector);
        assert!(root.lookup("missing").unwrap().is_none());
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let volume = volume_with_root();
        let root = Directory::open_root(&volume).unwrap();
        let sector = new_file(&volume);

        root.add("a", sector).unwrap();
        assert_eq!(
            root.add("a", sector),
            Err(StorageError::DuplicateEntry("a".to_string()))
        );
    }

    #[test]
    fn test_add_until_full() {
        let volume = volume_with_root();
        let root = Directory::open_root(&volume).unwrap();
        assert_eq!(root.capacity(), 4);

        for name in ["a", "b", "c", "d"] {
            root.add(name, new_file(&volume)).unwrap();
        }
        assert_eq!(
            root.add("e", new_file(&volume)),
            Err(StorageError::DirectoryFull)
        );
    }

    #[test]
    fn test_invalid_names() {
        let volume = volume_with_root();
        let root = Directory::open_root(&volume).unwrap();
        for name in ["", "a/b", "fifteen_chars__"] {
            assert!(matches!(
                root.add(name, 5),
                Err(StorageError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_remove_frees_slot_and_reclaims_inode() {
        let volume = volume_with_root();
        let root = Directory::open_root(&volume).unwrap();
        let before = volume.free_sector_count();
        let sector = new_file(&volume);
        root.add("tmp", sector).unwrap();

        assert!(root.remove("tmp").unwrap());
        assert!(!root.remove("tmp").unwrap());
        assert!(root.lookup("tmp").unwrap().is_none());
        assert_eq!(volume.free_sector_count(), before);
    }

    #[test]
    fn test_read_next_entry_skips_self_and_parent() {
        let volume = volume_with_root();
        let mut root = Directory::open_root(&volume).unwrap();
        root.add(".", ROOT_DIR_SECTOR).unwrap();
        root.add("..", ROOT_DIR_SECTOR).unwrap();
        assert!(root.is_empty().unwrap());

        root.add("x", new_file(&volume)).unwrap();
        assert!(!root.is_empty().unwrap());
        assert_eq!(root.read_next_entry().unwrap(), Some("x".to_string()));
        assert_eq!(root.read_next_entry().unwrap(), None);
    }

    #[test]
    fn test_open_file_as_directory_fails() {
        let volume = volume_with_root();
        let sector = new_file(&volume);
        let inode = Inode::open(&volume, sector).unwrap();
        assert_eq!(
            Directory::open(inode).unwrap_err(),
            StorageError::NotADirectory(sector)
        );
    }

    #[test]
    fn test_unlink_leaves_inode_alone() {
        let volume = volume_with_root();
        let root = Directory::open_root(&volume).unwrap();
        let sector = new_file(&volume);
        root.add("keep", sector).unwrap();

        assert!(root.unlink("keep").unwrap());
        assert!(volume.is_sector_used(sector));
        let inode = Inode::open(&volume, sector).unwrap();
        assert!(!inode.is_removed());
    }
}
