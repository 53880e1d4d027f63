//! # File System Storage
//!
//! The layers underneath the namespace: everything that turns a block device
//! into inodes and directories.
//!
//! ## Layers
//!
//! - **BufferCache**: fixed-size write-back sector cache with clock eviction
//! - **FreeMap**: sector allocation bitmap, persisted as a file at sector 0
//! - **Inode**: sector-addressed objects with a length and a kind, shared
//!   through an open-inode table so every handle sees one open count
//! - **Directory**: an inode of fixed-size name → sector entry slots
//! - **Volume**: the mounted device tying the layers together
//!
//! ## Design
//!
//! - Handles close on `Drop`; removed inodes are reclaimed on last close
//! - Every call into a layer is atomic; nothing here spans a whole path walk
//! - On-disk records are JSON in zero-padded sectors, inodes checksummed

pub mod buffer_cache;
pub mod directory;
pub mod error;
pub mod failing_device;
pub mod free_map;
pub mod inode;
pub mod layout;
pub mod volume;

pub use buffer_cache::{BufferCache, CacheStats, DEFAULT_CACHE_SLOTS};
pub use directory::Directory;
pub use error::{StorageError, StorageResult};
pub use failing_device::{FailingBlockDevice, FailureControl, FailurePolicy};
pub use free_map::FreeMap;
pub use inode::Inode;
pub use layout::{
    SectorId, DEFAULT_DIRECTORY_CAPACITY, FREE_MAP_SECTOR, NAME_MAX, ROOT_DIR_SECTOR,
};
pub use volume::Volume;
