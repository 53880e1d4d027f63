//! Narrow per-process facade
//!
//! `Process` pairs a shared `FileSystem` with one execution context and
//! reports outcomes the way a system-call layer wants them: success as
//! `bool`, opened files as `Option`. The discarded error is logged.

use std::sync::Arc;

use crate::context::ProcessContext;
use crate::file::FileHandle;
use crate::operations::{NamespaceError, NamespaceOperations};
use crate::service::FileSystem;

/// One execution context bound to a file system
pub struct Process {
    fs: Arc<FileSystem>,
    context: ProcessContext,
}

impl Process {
    /// Starts a process whose current directory is the root
    pub fn new(fs: Arc<FileSystem>) -> Self {
        let context = fs.new_context();
        Self { fs, context }
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    pub fn file_system(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    pub fn create(&self, path: &str, initial_size: u64) -> bool {
        self.report("create", path, self.fs.create(&self.context, path, initial_size))
            .is_some()
    }

    pub fn open(&self, path: &str) -> Option<FileHandle> {
        self.report("open", path, self.fs.open(&self.context, path))
    }

    pub fn remove(&self, path: &str) -> bool {
        self.report("remove", path, self.fs.remove(&self.context, path))
            .is_some()
    }

    pub fn make_directory(&self, path: &str) -> bool {
        self.report("make_directory", path, self.fs.make_directory(&self.context, path))
            .is_some()
    }

    pub fn change_directory(&mut self, path: &str) -> bool {
        let result = self.fs.change_directory(&mut self.context, path);
        self.report("change_directory", path, result).is_some()
    }

    fn report<T>(&self, op: &str, path: &str, result: Result<T, NamespaceError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("{}: {} {:?} failed: {}", self.context.id(), op, path, e);
                None
            }
        }
    }
}
