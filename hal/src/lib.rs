//! Sector devices for the file system
//!
//! The volume is handed a boxed [`BlockDevice`] and reads and writes whole
//! sectors through it.
//!
//! - [`RamDisk`]: volatile, in-memory; used by most tests
//! - [`FileDisk`]: a host file holding the disk image; survives remounts

pub mod block_device;
pub mod file_disk;

pub use block_device::{BlockDevice, BlockError, RamDisk, BLOCK_SIZE};
pub use file_disk::FileDisk;
