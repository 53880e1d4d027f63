//! Per-execution-context state
//!
//! Each caller of the file system owns one `ProcessContext`. It holds the
//! caller's current directory; nothing about it is global.

use core_types::ContextId;
use filesys_storage::Directory;

/// State of one execution context
#[derive(Debug)]
pub struct ProcessContext {
    id: ContextId,
    cwd: Option<Directory>,
}

impl ProcessContext {
    /// Creates a context whose current directory is `cwd`
    ///
    /// A context without a current directory resolves relative paths from
    /// the root.
    pub fn new(cwd: Option<Directory>) -> Self {
        Self {
            id: ContextId::new(),
            cwd,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn current_directory(&self) -> Option<&Directory> {
        self.cwd.as_ref()
    }

    /// Installs `dir` as the current directory and returns the previous one
    ///
    /// Dropping the returned handle closes it.
    pub fn set_current_directory(&mut self, dir: Directory) -> Option<Directory> {
        self.cwd.replace(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filesys_storage::{Volume, ROOT_DIR_SECTOR};
    use hal::RamDisk;

    #[test]
    fn test_set_current_directory_returns_old() {
        let volume = Volume::format(Box::new(RamDisk::new(16)), 4).unwrap();
        Directory::create(&volume, ROOT_DIR_SECTOR, 4).unwrap();

        let mut ctx = ProcessContext::new(None);
        assert!(ctx.current_directory().is_none());

        let old = ctx.set_current_directory(Directory::open_root(&volume).unwrap());
        assert!(old.is_none());
        let old = ctx.set_current_directory(Directory::open_root(&volume).unwrap());
        assert_eq!(old.map(|d| d.inumber()), Some(ROOT_DIR_SECTOR));
        assert_eq!(ctx.current_directory().map(|d| d.inode().open_count()), Some(1));
    }

    #[test]
    fn test_contexts_have_distinct_ids() {
        assert_ne!(ProcessContext::new(None).id(), ProcessContext::new(None).id());
    }
}
