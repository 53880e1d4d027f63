//! Namespace operations
//!
//! This module defines the path-based operations of the file system and the
//! errors they report.

use filesys_storage::StorageError;
use fs_namespace::PathError;
use thiserror::Error;

use crate::context::ProcessContext;
use crate::file::FileHandle;

/// Errors that can occur during namespace operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamespaceError {
    /// Path is empty, or names something that cannot be operated on
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A path component is longer than the maximum name length
    #[error("Name too long: {0}")]
    NameTooLong(String),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// No free sector, or no free slot in the containing directory
    #[error("No space left")]
    NoSpace,

    /// The directory has other open handles
    #[error("Directory busy: {0}")]
    DirectoryBusy(String),

    /// The directory holds entries besides `.` and `..`
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The directory is the caller's current directory
    #[error("Is the current directory: {0}")]
    IsCurrentDirectory(String),

    /// The storage layer failed
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<PathError> for NamespaceError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::InvalidPath(p) => NamespaceError::InvalidPath(p),
            PathError::NameTooLong(n) => NamespaceError::NameTooLong(n),
            PathError::NotFound(n) => NamespaceError::NotFound(n),
            PathError::NotADirectory(n) => NamespaceError::NotADirectory(n),
            PathError::Storage(e) => e.into(),
        }
    }
}

impl From<StorageError> for NamespaceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NoSpace | StorageError::DirectoryFull => NamespaceError::NoSpace,
            StorageError::DuplicateEntry(name) => NamespaceError::AlreadyExists(name),
            StorageError::InvalidName(name) => NamespaceError::InvalidPath(name),
            StorageError::NotADirectory(sector) => {
                NamespaceError::NotADirectory(format!("sector {}", sector))
            }
            other => NamespaceError::Storage(other),
        }
    }
}

/// Path-based file system operations
///
/// Relative paths are resolved against the calling context's current
/// directory. Every handle taken during an operation is released before it
/// returns, whatever the outcome.
pub trait NamespaceOperations {
    /// Create a file of `initial_size` zero bytes
    ///
    /// Fails with `AlreadyExists` if the final component is taken; nothing
    /// is allocated in that case.
    fn create(&self, ctx: &ProcessContext, path: &str, initial_size: u64)
        -> Result<(), NamespaceError>;

    /// Open a file or directory by path
    fn open(&self, ctx: &ProcessContext, path: &str) -> Result<FileHandle, NamespaceError>;

    /// Remove a name
    ///
    /// Directories must be empty, not open elsewhere, and not the caller's
    /// current directory. A removed file stays readable through handles that
    /// are already open.
    fn remove(&self, ctx: &ProcessContext, path: &str) -> Result<(), NamespaceError>;

    /// Create a directory holding `.` and `..`
    fn make_directory(&self, ctx: &ProcessContext, path: &str) -> Result<(), NamespaceError>;

    /// Replace the caller's current directory
    ///
    /// On failure the current directory is unchanged.
    fn change_directory(&self, ctx: &mut ProcessContext, path: &str)
        -> Result<(), NamespaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::BlockError;

    #[test]
    fn test_path_errors_map_by_kind() {
        assert_eq!(
            NamespaceError::from(PathError::NotFound("a".to_string())),
            NamespaceError::NotFound("a".to_string())
        );
        assert_eq!(
            NamespaceError::from(PathError::NameTooLong("x".to_string())),
            NamespaceError::NameTooLong("x".to_string())
        );
        assert_eq!(
            NamespaceError::from(PathError::Storage(StorageError::NoSpace)),
            NamespaceError::NoSpace
        );
    }

    #[test]
    fn test_storage_errors_map_by_kind() {
        assert_eq!(NamespaceError::from(StorageError::DirectoryFull), NamespaceError::NoSpace);
        assert_eq!(
            NamespaceError::from(StorageError::DuplicateEntry("f".to_string())),
            NamespaceError::AlreadyExists("f".to_string())
        );
        assert_eq!(
            NamespaceError::from(StorageError::Block(BlockError::IoError)),
            NamespaceError::Storage(StorageError::Block(BlockError::IoError))
        );
    }
}
