//! Dentry (directory entry) cache
//!
//! Caches path → inode lookups so repeated resolutions of the same
//! directory skip the walk from the root. Keys are full path strings and
//! are unique; an insert never overwrites an existing entry.
//!
//! The cache owns its entries. Deleting, evicting or clearing drops them.

use std::collections::{HashMap, VecDeque};

use filesys_storage::SectorId;

/// A cached resolution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DentryEntry {
    /// Full path this entry was resolved from
    pub path: String,
    /// Sector of the inode the path names
    pub sector: SectorId,
    pub is_dir: bool,
}

impl DentryEntry {
    pub fn new(path: impl Into<String>, sector: SectorId, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            sector,
            is_dir,
        }
    }
}

/// Path-keyed dentry cache with optional FIFO capacity bound
#[derive(Debug, Default)]
pub struct DentryCache {
    entries: HashMap<String, DentryEntry>,
    /// Keys in insertion order, for eviction
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl DentryCache {
    /// Creates an unbounded cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `entry` unless its path is already cached
    ///
    /// Returns true if the entry was inserted. At capacity the oldest entry
    /// is evicted first.
    pub fn insert(&mut self, entry: DentryEntry) -> bool {
        if self.entries.contains_key(&entry.path) {
            return false;
        }
        if let Some(capacity) = self.capacity {
            if capacity == 0 {
                return false;
            }
            while self.entries.len() >= capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                log::trace!("dentry cache: evicting {}", oldest);
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(entry.path.clone());
        self.entries.insert(entry.path.clone(), entry);
        true
    }

    /// Removes the entry for `path`; returns false if there was none
    pub fn delete(&mut self, path: &str) -> bool {
        if self.entries.remove(path).is_none() {
            return false;
        }
        self.order.retain(|key| key != path);
        true
    }

    /// Exact lookup by path
    pub fn search(&self, path: &str) -> Option<&DentryEntry> {
        self.entries.get(path)
    }

    /// Looks up the entry for the directory containing `path`
    ///
    /// The key is `path` up to (not including) its last `/`; a path without
    /// `/` searches for the empty key.
    pub fn parent_search(&self, path: &str) -> Option<&DentryEntry> {
        let key = match path.rfind('/') {
            Some(idx) => &path[..idx],
            None => "",
        };
        self.entries.get(key)
    }

    /// Deletes every entry naming `sector`, returning how many went
    pub fn invalidate_sector(&mut self, sector: SectorId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.sector != sector);
        let entries = &self.entries;
        self.order.retain(|key| entries.contains_key(key));
        before - self.entries.len()
    }

    /// Drops every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_unique() {
        let mut cache = DentryCache::new();
        assert!(cache.insert(DentryEntry::new("/a", 5, true)));
        assert!(!cache.insert(DentryEntry::new("/a", 9, false)));
        // First insert wins
        assert_eq!(cache.search("/a").map(|e| e.sector), Some(5));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_delete() {
        let mut cache = DentryCache::new();
        cache.insert(DentryEntry::new("/a", 5, true));
        assert!(cache.delete("/a"));
        assert!(!cache.delete("/a"));
        assert!(cache.search("/a").is_none());
        // The key can be reused afterwards
        assert!(cache.insert(DentryEntry::new("/a", 6, true)));
    }

    #[test]
    fn test_parent_search() {
        let mut cache = DentryCache::new();
        cache.insert(DentryEntry::new("/a/b", 7, true));

        assert_eq!(cache.parent_search("/a/b/c").map(|e| e.sector), Some(7));
        assert!(cache.parent_search("/a").is_none());
        assert!(cache.parent_search("a").is_none());

        cache.insert(DentryEntry::new("", 1, true));
        assert_eq!(cache.parent_search("/a").map(|e| e.sector), Some(1));
        assert_eq!(cache.parent_search("plain").map(|e| e.sector), Some(1));
    }

    #[test]
    fn test_invalidate_sector() {
        let mut cache = DentryCache::new();
        cache.insert(DentryEntry::new("/a", 5, true));
        cache.insert(DentryEntry::new("/x/../a", 5, true));
        cache.insert(DentryEntry::new("/b", 6, true));

        assert_eq!(cache.invalidate_sector(5), 2);
        assert_eq!(cache.invalidate_sector(5), 0);
        assert_eq!(cache.len(), 1);
        assert!(cache.search("/b").is_some());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache = DentryCache::with_capacity(2);
        cache.insert(DentryEntry::new("/a", 1, true));
        cache.insert(DentryEntry::new("/b", 2, true));
        cache.insert(DentryEntry::new("/c", 3, true));

        assert_eq!(cache.len(), 2);
        assert!(cache.search("/a").is_none());
        assert!(cache.search("/b").is_some());
        assert!(cache.search("/c").is_some());
    }

    #[test]
    fn test_eviction_skips_deleted_keys() {
        let mut cache = DentryCache::with_capacity(2);
        cache.insert(DentryEntry::new("/a", 1, true));
        cache.insert(DentryEntry::new("/b", 2, true));
        cache.delete("/a");
        cache.insert(DentryEntry::new("/c", 3, true));

        assert_eq!(cache.len(), 2);
        assert!(cache.search("/b").is_some());
    }

    #[test]
    fn test_clear() {
        let mut cache = DentryCache::with_capacity(4);
        cache.insert(DentryEntry::new("/a", 1, true));
        cache.insert(DentryEntry::new("/b", 2, true));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), Some(4));
    }
}
