//! Open files

use filesys_storage::{Inode, SectorId, StorageResult};

/// An open file or directory returned by `open`
///
/// Reads and writes go through a cursor. Dropping the handle closes the
/// underlying inode.
#[derive(Debug)]
pub struct FileHandle {
    inode: Inode,
    pos: u64,
}

impl FileHandle {
    pub(crate) fn new(inode: Inode) -> Self {
        Self { inode, pos: 0 }
    }

    /// Reads at the cursor and advances it by the number of bytes read
    pub fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        let n = self.inode.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Writes at the cursor; files do not grow past their length
    pub fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        let n = self.inode.write_at(data, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn length(&self) -> u64 {
        self.inode.length()
    }

    pub fn inumber(&self) -> SectorId {
        self.inode.inumber()
    }

    pub fn is_directory(&self) -> bool {
        self.inode.is_directory()
    }

    pub fn inode(&self) -> &Inode {
        &self.inode
    }
}
