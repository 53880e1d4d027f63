//! File system service implementation
//!
//! `FileSystem` ties a mounted volume to the namespace: it resolves paths,
//! applies the create/open/remove/mkdir/chdir rules and keeps the dentry
//! cache coherent with removals.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use filesys_storage::{Directory, Inode, SectorId, Volume, ROOT_DIR_SECTOR};
use fs_namespace::{DentryCache, DentryEntry, PathResolver, PathTokens};
use hal::BlockDevice;

use crate::config::FilesysConfig;
use crate::context::ProcessContext;
use crate::file::FileHandle;
use crate::operations::{NamespaceError, NamespaceOperations};

/// A mounted file system
///
/// Shared between execution contexts as `Arc<FileSystem>`; each context
/// brings its own `ProcessContext`.
pub struct FileSystem {
    volume: Arc<Volume>,
    dentries: Mutex<DentryCache>,
    config: FilesysConfig,
}

impl FileSystem {
    /// Mounts `device`, formatting it first if `format` is set
    pub fn init(
        device: Box<dyn BlockDevice + Send>,
        format: bool,
    ) -> Result<Arc<Self>, NamespaceError> {
        let config = FilesysConfig {
            format,
            ..FilesysConfig::default()
        };
        Self::init_with_config(device, config)
    }

    pub fn init_with_config(
        device: Box<dyn BlockDevice + Send>,
        config: FilesysConfig,
    ) -> Result<Arc<Self>, NamespaceError> {
        let volume = if config.format {
            let volume = Volume::format(device, config.buffer_cache_slots)?;
            Self::do_format(&volume, config.directory_capacity)?;
            volume
        } else {
            Volume::mount(device, config.buffer_cache_slots)?
        };

        // The root must be usable before anyone gets a context.
        drop(Directory::open_root(&volume)?);

        let dentries = match config.dentry_cache_capacity {
            Some(capacity) => DentryCache::with_capacity(capacity),
            None => DentryCache::new(),
        };
        log::info!(
            "filesys: ready ({} sectors, {} free)",
            volume.sector_count(),
            volume.free_sector_count()
        );

        Ok(Arc::new(Self {
            volume,
            dentries: Mutex::new(dentries),
            config,
        }))
    }

    /// Writes the root directory, which is its own parent
    fn do_format(volume: &Arc<Volume>, capacity: usize) -> Result<(), NamespaceError> {
        Directory::create(volume, ROOT_DIR_SECTOR, capacity)?;
        let root = Directory::open_root(volume)?;
        root.add(".", ROOT_DIR_SECTOR)?;
        root.add("..", ROOT_DIR_SECTOR)?;
        drop(root);
        volume.flush()?;
        log::info!("filesys: formatted, root directory at sector {}", ROOT_DIR_SECTOR);
        Ok(())
    }

    /// Drops the dentry cache and flushes everything to the device
    pub fn shutdown(&self) -> Result<(), NamespaceError> {
        self.dentries().clear();
        self.volume.shutdown()?;
        Ok(())
    }

    /// Creates an execution context whose current directory is the root
    pub fn new_context(&self) -> ProcessContext {
        match Directory::open_root(&self.volume) {
            Ok(root) => ProcessContext::new(Some(root)),
            Err(e) => {
                log::warn!("filesys: new context without a current directory: {}", e);
                ProcessContext::new(None)
            }
        }
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    pub fn config(&self) -> &FilesysConfig {
        &self.config
    }

    /// Number of cached dentries
    pub fn cached_dentries(&self) -> usize {
        self.dentries().len()
    }

    fn dentries(&self) -> MutexGuard<'_, DentryCache> {
        self.dentries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the directory that contains the leaf of `tokens`
    ///
    /// Absolute paths of two or more components go through the dentry cache
    /// first; a miss falls back to a full walk whose result is cached.
    fn resolve(
        &self,
        ctx: &ProcessContext,
        tokens: &PathTokens<'_>,
    ) -> Result<Directory, NamespaceError> {
        let parent_key = match tokens.canonical() {
            Some(key) if self.config.dentry_cache_enabled && tokens.components().len() >= 2 => {
                key.rfind('/').map(|idx| key[..idx].to_string())
            }
            _ => None,
        };

        if let Some(key) = &parent_key {
            if let Some(dir) = self.cached_directory(key) {
                return Ok(dir);
            }
        }

        let dir = PathResolver::resolve_tokens(tokens, ctx.current_directory(), &self.volume)?;
        if let Some(key) = parent_key {
            self.remember_directory(key, &dir);
        }
        Ok(dir)
    }

    /// Opens the directory cached under `key`
    ///
    /// Entries that no longer open as a live directory are dropped.
    fn cached_directory(&self, key: &str) -> Option<Directory> {
        let mut dentries = self.dentries();
        let sector = dentries.search(key)?.sector;
        match Inode::open(&self.volume, sector).and_then(Directory::open) {
            Ok(dir) if !dir.inode().is_removed() => {
                log::trace!("filesys: dentry hit {} -> sector {}", key, sector);
                Some(dir)
            }
            Ok(_) => {
                log::debug!("filesys: dropping dentry {} of removed sector {}", key, sector);
                dentries.delete(key);
                None
            }
            Err(e) => {
                log::debug!("filesys: dropping stale dentry {}: {}", key, e);
                dentries.delete(key);
                None
            }
        }
    }

    /// Caches `dir` under `key` unless it was unlinked since the walk found it
    ///
    /// Unlinking and invalidation happen under the same lock, so a directory
    /// that is not marked removed here is still reachable.
    fn remember_directory(&self, key: String, dir: &Directory) -> bool {
        let mut dentries = self.dentries();
        if dir.inode().is_removed() {
            log::debug!("filesys: not caching {}, sector {} was removed", key, dir.inumber());
            return false;
        }
        dentries.insert(DentryEntry::new(key, dir.inumber(), true))
    }

    /// Reclaims an inode written at `sector` that never became reachable
    fn discard_inode(&self, sector: SectorId) {
        match Inode::open(&self.volume, sector) {
            Ok(inode) => inode.remove(),
            Err(e) => {
                log::warn!("filesys: cannot reopen sector {} to discard it: {}", sector, e);
                self.release_sector(sector);
            }
        }
    }

    fn release_sector(&self, sector: SectorId) {
        if let Err(e) = self.volume.release(sector, 1) {
            log::warn!("filesys: releasing sector {}: {}", sector, e);
        }
    }
}

impl NamespaceOperations for FileSystem {
    fn create(
        &self,
        ctx: &ProcessContext,
        path: &str,
        initial_size: u64,
    ) -> Result<(), NamespaceError> {
        let tokens = PathTokens::parse(path)?;
        let leaf = tokens.leaf();
        let dir = self.resolve(ctx, &tokens)?;

        if dir.lookup_sector(leaf)?.is_some() {
            return Err(NamespaceError::AlreadyExists(leaf.to_string()));
        }

        let sector = self.volume.allocate(1)?;
        if let Err(e) = Inode::create(&self.volume, sector, initial_size, false) {
            self.release_sector(sector);
            return Err(e.into());
        }
        if let Err(e) = dir.add(leaf, sector) {
            self.discard_inode(sector);
            return Err(e.into());
        }

        log::debug!("{}: created {} ({} bytes) at sector {}", ctx.id(), path, initial_size, sector);
        Ok(())
    }

    fn open(&self, ctx: &ProcessContext, path: &str) -> Result<FileHandle, NamespaceError> {
        let tokens = PathTokens::parse(path)?;
        let leaf = tokens.leaf();
        let dir = self.resolve(ctx, &tokens)?;

        let inode = dir
            .lookup(leaf)?
            .ok_or_else(|| NamespaceError::NotFound(leaf.to_string()))?;
        Ok(FileHandle::new(inode))
    }

    fn remove(&self, ctx: &ProcessContext, path: &str) -> Result<(), NamespaceError> {
        let tokens = PathTokens::parse(path)?;
        let leaf = tokens.leaf();
        let dir = self.resolve(ctx, &tokens)?;

        let inode = dir
            .lookup(leaf)?
            .ok_or_else(|| NamespaceError::NotFound(leaf.to_string()))?;
        let sector = inode.inumber();

        if inode.is_directory() {
            let is_cwd = ctx
                .current_directory()
                .is_some_and(|cwd| cwd.inumber() == sector);
            if is_cwd {
                return Err(NamespaceError::IsCurrentDirectory(path.to_string()));
            }
            if inode.open_count() > 1 {
                return Err(NamespaceError::DirectoryBusy(path.to_string()));
            }
            let target = Directory::open(inode)?;
            if !target.is_empty()? {
                return Err(NamespaceError::DirectoryNotEmpty(path.to_string()));
            }
        } else {
            drop(inode);
        }

        // `.` and `..` always fail the directory checks above
        if leaf == "." || leaf == ".." {
            return Err(NamespaceError::InvalidPath(path.to_string()));
        }

        let mut dentries = self.dentries();
        dir.remove(leaf)?;
        let invalidated = dentries.invalidate_sector(sector);
        drop(dentries);
        log::debug!(
            "{}: removed {} (sector {}, {} dentries invalidated)",
            ctx.id(),
            path,
            sector,
            invalidated
        );
        Ok(())
    }

    fn make_directory(&self, ctx: &ProcessContext, path: &str) -> Result<(), NamespaceError> {
        let tokens = PathTokens::parse(path)?;
        let leaf = tokens.leaf();
        let dir = self.resolve(ctx, &tokens)?;

        if dir.lookup_sector(leaf)?.is_some() {
            return Err(NamespaceError::AlreadyExists(leaf.to_string()));
        }

        let sector = self.volume.allocate(1)?;
        if let Err(e) = Directory::create(&self.volume, sector, self.config.directory_capacity) {
            self.release_sector(sector);
            return Err(e.into());
        }
        if let Err(e) = dir.add(leaf, sector) {
            self.discard_inode(sector);
            return Err(e.into());
        }

        let populated = Inode::open(&self.volume, sector)
            .and_then(Directory::open)
            .and_then(|new_dir| {
                new_dir.add(".", sector)?;
                new_dir.add("..", dir.inumber())
            });
        if let Err(e) = populated {
            log::warn!("{}: unlinking half-made directory {}: {}", ctx.id(), path, e);
            let mut dentries = self.dentries();
            if let Err(unlink) = dir.unlink(leaf) {
                log::warn!("{}: unlinking {}: {}", ctx.id(), path, unlink);
            }
            self.discard_inode(sector);
            dentries.invalidate_sector(sector);
            return Err(e.into());
        }

        log::debug!("{}: made directory {} at sector {}", ctx.id(), path, sector);
        Ok(())
    }

    fn change_directory(
        &self,
        ctx: &mut ProcessContext,
        path: &str,
    ) -> Result<(), NamespaceError> {
        let tokens = PathTokens::parse(path)?;
        let leaf = tokens.leaf();
        let dir = self.resolve(ctx, &tokens)?;

        let inode = dir
            .lookup(leaf)?
            .ok_or_else(|| NamespaceError::NotFound(leaf.to_string()))?;
        if !inode.is_directory() {
            return Err(NamespaceError::NotADirectory(leaf.to_string()));
        }
        let target = Directory::open(inode)?;
        drop(dir);

        log::debug!("{}: current directory is now sector {}", ctx.id(), target.inumber());
        ctx.set_current_directory(target);
        Ok(())
    }
}
