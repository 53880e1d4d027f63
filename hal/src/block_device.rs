//! Sector devices underneath the buffer cache
//!
//! The volume never touches a device except through whole-sector reads and
//! writes addressed by sector number, so RAM, file and fault-injecting
//! devices are interchangeable.
use thiserror::Error;

/// Bytes per sector; buffer cache slots and inode records are this size
pub const BLOCK_SIZE: usize = 4096;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    #[error("sector out of range")]
    OutOfBounds,
    /// The backing medium rejected a transfer or a flush
    #[error("device I/O failed")]
    IoError,
    /// The backing medium could not be opened or created
    #[error("device unavailable")]
    NotReady,
    /// Caller passed a buffer shorter than one sector
    #[error("buffer shorter than a sector")]
    InvalidSize,
}

/// A fixed-size array of sectors
///
/// Reads and writes move exactly `BLOCK_SIZE` bytes; longer buffers are
/// accepted and only their first sector is used.
pub trait BlockDevice {
    /// Number of addressable sectors
    fn block_count(&self) -> u64;

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Copies sector `block_idx` into the front of `buffer`
    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError>;

    /// Stores the first `BLOCK_SIZE` bytes of `buffer` as sector `block_idx`
    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError>;

    /// Makes earlier writes durable; called on volume flush and shutdown
    fn flush(&mut self) -> Result<(), BlockError> {
        Ok(())
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        (**self).read_block(block_idx, buffer)
    }

    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError> {
        (**self).write_block(block_idx, buffer)
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        (**self).flush()
    }
}

/// Rejects out-of-range sectors and short buffers
pub(crate) fn check_request(
    block_idx: u64,
    block_count: u64,
    buffer_len: usize,
) -> Result<(), BlockError> {
    if block_idx >= block_count {
        return Err(BlockError::OutOfBounds);
    }
    if buffer_len < BLOCK_SIZE {
        return Err(BlockError::InvalidSize);
    }
    Ok(())
}

/// Volatile sectors held in memory, zeroed at creation
pub struct RamDisk {
    blocks: Vec<[u8; BLOCK_SIZE]>,
}

impl RamDisk {
    pub fn new(block_count: usize) -> Self {
        Self {
            blocks: vec![[0u8; BLOCK_SIZE]; block_count],
        }
    }
}

impl BlockDevice for RamDisk {
    fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        check_request(block_idx, self.block_count(), buffer.len())?;
        let block = &self.blocks[block_idx as usize];
        buffer[..BLOCK_SIZE].copy_from_slice(block);
        Ok(())
    }

    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError> {
        check_request(block_idx, self.block_count(), buffer.len())?;
        let block = &mut self.blocks[block_idx as usize];
        block.copy_from_slice(&buffer[..BLOCK_SIZE]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramdisk_creation() {
        let disk = RamDisk::new(10);
        assert_eq!(disk.block_count(), 10);
        assert_eq!(disk.block_size(), BLOCK_SIZE);
    }

    #[test]
    fn test_ramdisk_read_write() {
        let mut disk = RamDisk::new(10);

        let write_data = [0x42u8; BLOCK_SIZE];
        disk.write_block(3, &write_data).unwrap();

        let mut read_data = [0u8; BLOCK_SIZE];
        disk.read_block(3, &mut read_data).unwrap();

        assert_eq!(write_data, read_data);
    }

    #[test]
    fn test_ramdisk_out_of_bounds() {
        let mut disk = RamDisk::new(10);
        let mut buffer = [0u8; BLOCK_SIZE];

        assert_eq!(
            disk.read_block(10, &mut buffer),
            Err(BlockError::OutOfBounds)
        );
        assert_eq!(disk.write_block(10, &buffer), Err(BlockError::OutOfBounds));
    }

    #[test]
    fn test_ramdisk_invalid_size() {
        let mut disk = RamDisk::new(10);
        let mut small_buffer = [0u8; 100];

        assert_eq!(
            disk.read_block(0, &mut small_buffer),
            Err(BlockError::InvalidSize)
        );
        assert_eq!(
            disk.write_block(0, &small_buffer),
            Err(BlockError::InvalidSize)
        );
    }

    #[test]
    fn test_boxed_device_delegates() {
        let mut disk: Box<dyn BlockDevice + Send> = Box::new(RamDisk::new(4));
        assert_eq!(disk.block_count(), 4);

        disk.write_block(1, &[7u8; BLOCK_SIZE]).unwrap();
        let mut out = [0u8; BLOCK_SIZE];
        disk.read_block(1, &mut out).unwrap();
        assert_eq!(out[0], 7);
    }
}
