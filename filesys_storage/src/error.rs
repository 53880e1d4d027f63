//! Storage layer error type

use hal::BlockError;
use thiserror::Error;

use crate::layout::SectorId;

/// Errors raised by the buffer cache, free map, inode and directory layers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The underlying device failed
    #[error("block device error: {0}")]
    Block(#[from] BlockError),

    /// The free map has no run of free sectors large enough
    #[error("no free sectors left on the volume")]
    NoSpace,

    /// A sector number past the end of the device was used
    #[error("sector {0} is beyond the end of the device")]
    SectorOutOfRange(SectorId),

    /// A byte range does not fit inside one sector
    #[error("range {offset}+{len} does not fit in a sector")]
    BadRange { offset: usize, len: usize },

    /// An on-disk inode failed validation
    #[error("corrupt inode at sector {sector}: {reason}")]
    CorruptInode { sector: SectorId, reason: String },

    /// An on-disk record could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The requested inode length needs more sectors than an inode can map
    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    /// A directory operation was applied to a non-directory inode
    #[error("inode at sector {0} is not a directory")]
    NotADirectory(SectorId),

    /// A directory already holds an entry with this name
    #[error("directory entry already exists: {0}")]
    DuplicateEntry(String),

    /// Every entry slot of the directory is in use
    #[error("directory is full")]
    DirectoryFull,

    /// The entry name is empty, too long, or contains a separator
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),

    /// The device cannot hold a file system
    #[error("device too small to format: {0} sectors")]
    DeviceTooSmall(u64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
