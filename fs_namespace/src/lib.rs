//! # File System Namespace
//!
//! Turns path strings into directory handles and caches the results.
//!
//! ## Design
//!
//! - A path is tokenized once into borrowed components (`PathTokens`)
//! - Resolution walks one directory at a time and closes every handle it
//!   does not return
//! - `.` and `..` are ordinary entries stored in every directory
//! - The dentry cache is an accelerator only; it never decides an outcome

pub mod dentry;
pub mod path;

pub use dentry::{DentryCache, DentryEntry};
pub use path::{PathError, PathResolver, PathTokens};
