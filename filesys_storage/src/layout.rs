//! On-disk layout constants

use hal::BLOCK_SIZE;

/// Index of a sector (one `BLOCK_SIZE` block) on the device
pub type SectorId = u64;

/// Sector holding the inode of the free-map file
pub const FREE_MAP_SECTOR: SectorId = 0;

/// Sector holding the inode of the root directory
pub const ROOT_DIR_SECTOR: SectorId = 1;

/// Maximum length of a single path component, in bytes
pub const NAME_MAX: usize = 14;

/// Number of entry slots a freshly made directory gets
pub const DEFAULT_DIRECTORY_CAPACITY: usize = 16;

/// Size of one directory entry slot
pub const DIR_ENTRY_SIZE: usize = 64;

/// Magic number stamped into every on-disk inode
pub const INODE_MAGIC: u32 = 0x494E_4F44; // "INOD"

/// Upper bound on the data sectors a single inode can address
pub const MAX_INODE_SECTORS: usize = 256;

/// Smallest device that can be formatted: free-map inode, root inode,
/// one free-map data sector and one root directory data sector.
pub const MIN_DEVICE_SECTORS: u64 = 4;

/// Number of sectors needed to hold `bytes` bytes
pub fn bytes_to_sectors(bytes: u64) -> usize {
    bytes.div_ceil(BLOCK_SIZE as u64) as usize
}
