//! File system configuration
//!
//! Typed defaults live here; a JSON document may override any subset of
//! them. Nothing is read from the environment.

use filesys_storage::{DEFAULT_CACHE_SLOTS, DEFAULT_DIRECTORY_CAPACITY};
use serde::{Deserialize, Serialize};

/// Default bound on cached dentries
pub const DEFAULT_DENTRY_CAPACITY: usize = 256;

/// Start-up configuration for a `FileSystem`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesysConfig {
    /// Format the device instead of mounting it
    pub format: bool,
    /// Number of sectors held by the buffer cache
    pub buffer_cache_slots: usize,
    /// Entry slots given to every new directory
    pub directory_capacity: usize,
    pub dentry_cache_enabled: bool,
    /// Maximum cached dentries; `None` means unbounded
    pub dentry_cache_capacity: Option<usize>,
}

impl FilesysConfig {
    /// Parses a configuration, filling omitted fields with defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for FilesysConfig {
    fn default() -> Self {
        Self {
            format: false,
            buffer_cache_slots: DEFAULT_CACHE_SLOTS,
            directory_capacity: DEFAULT_DIRECTORY_CAPACITY,
            dentry_cache_enabled: true,
            dentry_cache_capacity: Some(DEFAULT_DENTRY_CAPACITY),
        }
    }
}
