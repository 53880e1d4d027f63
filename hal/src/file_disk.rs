//! File-backed block device
//!
//! Stores blocks in a regular host file so a formatted volume survives a
//! shutdown and can be mounted again.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::block_device::{check_request, BlockDevice, BlockError, BLOCK_SIZE};

/// A block device whose blocks live in a host file
pub struct FileDisk {
    file: File,
    block_count: u64,
}

impl FileDisk {
    /// Creates (or truncates) a disk image of `block_count` zeroed blocks
    pub fn create(path: impl AsRef<Path>, block_count: u64) -> Result<Self, BlockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|_| BlockError::NotReady)?;
        file.set_len(block_count * BLOCK_SIZE as u64)
            .map_err(|_| BlockError::IoError)?;
        Ok(Self { file, block_count })
    }

    /// Opens an existing disk image
    ///
    /// The block count is derived from the file length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| BlockError::NotReady)?;
        let len = file.metadata().map_err(|_| BlockError::IoError)?.len();
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(BlockError::InvalidSize);
        }
        Ok(Self {
            file,
            block_count: len / BLOCK_SIZE as u64,
        })
    }

    fn seek_to(&mut self, block_idx: u64) -> Result<(), BlockError> {
        self.file
            .seek(SeekFrom::Start(block_idx * BLOCK_SIZE as u64))
            .map(|_| ())
            .map_err(|_| BlockError::IoError)
    }
}

impl BlockDevice for FileDisk {
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        check_request(block_idx, self.block_count, buffer.len())?;
        self.seek_to(block_idx)?;
        self.file
            .read_exact(&mut buffer[..BLOCK_SIZE])
            .map_err(|_| BlockError::IoError)
    }

    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError> {
        check_request(block_idx, self.block_count, buffer.len())?;
        self.seek_to(block_idx)?;
        self.file
            .write_all(&buffer[..BLOCK_SIZE])
            .map_err(|_| BlockError::IoError)
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        self.file.sync_data().map_err(|_| BlockError::IoError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_disk_round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");

        {
            let mut disk = FileDisk::create(&path, 8).unwrap();
            assert_eq!(disk.block_count(), 8);
            disk.write_block(5, &[0xA5u8; BLOCK_SIZE]).unwrap();
            disk.flush().unwrap();
        }

        let mut disk = FileDisk::open(&path).unwrap();
        assert_eq!(disk.block_count(), 8);
        let mut block = [0u8; BLOCK_SIZE];
        disk.read_block(5, &mut block).unwrap();
        assert!(block.iter().all(|&b| b == 0xA5));
    }

    #[test]
    fn test_file_disk_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = FileDisk::create(dir.path().join("small.img"), 2).unwrap();
        let mut block = [0u8; BLOCK_SIZE];
        assert_eq!(disk.read_block(2, &mut block), Err(BlockError::OutOfBounds));
    }

    #[test]
    fn test_open_missing_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileDisk::open(dir.path().join("missing.img"));
        assert!(matches!(result, Err(BlockError::NotReady)));
    }
}
