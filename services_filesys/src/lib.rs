//! # File System Service
//!
//! Path-based operations over a disk-backed volume.
//!
//! ## Operations
//!
//! - `create(path, size)`: create a zero-filled file of a fixed size
//! - `open(path)`: open a file or directory
//! - `remove(path)`: remove a file, or an empty and unused directory
//! - `make_directory(path)`: create a directory with `.` and `..`
//! - `change_directory(path)`: replace the caller's current directory
//!
//! ## Design
//!
//! - The current directory belongs to an explicit `ProcessContext`
//! - `NamespaceOperations` reports typed errors; `Process` narrows them to
//!   `bool`/`Option` for call sites that only need success or failure
//! - Handles are released on drop, on every path through an operation

pub mod config;
pub mod context;
pub mod file;
pub mod operations;
pub mod process;
pub mod service;

pub use config::FilesysConfig;
pub use context::ProcessContext;
pub use file::FileHandle;
pub use operations::{NamespaceError, NamespaceOperations};
pub use process::Process;
pub use service::FileSystem;
