//! Path resolution logic
//!
//! A path is split once into `PathTokens` and then walked directory by
//! directory until the directory that contains the final component.

use std::sync::Arc;

use filesys_storage::{Directory, StorageError, Volume, NAME_MAX};
use thiserror::Error;

/// Errors that can occur during path resolution
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// Path is empty or invalid
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A component is longer than `NAME_MAX`
    #[error("Name too long: {0}")]
    NameTooLong(String),

    /// Path component not found during traversal
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attempted to traverse through a non-directory object
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// The storage layer failed during a lookup
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A path split into its components
///
/// Empty components (from leading, trailing or repeated slashes) are
/// discarded. The components borrow from the original string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTokens<'a> {
    absolute: bool,
    components: Vec<&'a str>,
}

impl<'a> PathTokens<'a> {
    /// Splits `path` and checks every component against `NAME_MAX`
    ///
    /// # Examples
    ///
    /// ```
    /// use fs_namespace::PathTokens;
    ///
    /// let tokens = PathTokens::parse("/docs//notes/").unwrap();
    /// assert!(tokens.is_absolute());
    /// assert_eq!(tokens.components(), &["docs", "notes"]);
    /// assert_eq!(tokens.leaf(), "notes");
    ///
    /// let root = PathTokens::parse("/").unwrap();
    /// assert_eq!(root.leaf(), ".");
    /// ```
    pub fn parse(path: &'a str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::InvalidPath("Empty path".to_string()));
        }

        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if let Some(long) = components.iter().find(|c| c.len() > NAME_MAX) {
            return Err(PathError::NameTooLong(long.to_string()));
        }

        Ok(Self {
            absolute: path.starts_with('/'),
            components,
        })
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn components(&self) -> &[&'a str] {
        &self.components
    }

    /// The final component, or `.` when there are no components
    pub fn leaf(&self) -> &'a str {
        self.components.last().copied().unwrap_or(".")
    }

    /// Every component before the leaf
    pub fn parents(&self) -> &[&'a str] {
        match self.components.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        }
    }

    /// True if any component is `.` or `..`
    pub fn has_dot_components(&self) -> bool {
        self.components.iter().any(|c| *c == "." || *c == "..")
    }

    /// `/a/b/c` form of an absolute path without `.`/`..` components
    ///
    /// Relative paths and paths with dot components have no canonical key:
    /// what they name depends on more than the string.
    pub fn canonical(&self) -> Option<String> {
        if !self.absolute || self.has_dot_components() {
            return None;
        }
        Some(format!("/{}", self.components.join("/")))
    }
}

/// Path resolver
///
/// Walks a path to the directory that holds its final component. The
/// returned directory handle belongs to the caller; every intermediate
/// handle is closed along the way.
pub struct PathResolver;

impl PathResolver {
    /// Resolves `path` into its containing directory and leaf name
    ///
    /// Absolute paths start at the root. Relative paths start at `cwd`, or
    /// at the root when the caller has no current directory.
    pub fn resolve(
        path: &str,
        cwd: Option<&Directory>,
        volume: &Arc<Volume>,
    ) -> Result<(Directory, String), PathError> {
        let tokens = PathTokens::parse(path)?;
        let dir = Self::resolve_tokens(&tokens, cwd, volume)?;
        Ok((dir, tokens.leaf().to_string()))
    }

    /// Resolves already parsed tokens to their containing directory
    pub fn resolve_tokens(
        tokens: &PathTokens<'_>,
        cwd: Option<&Directory>,
        volume: &Arc<Volume>,
    ) -> Result<Directory, PathError> {
        let start = match cwd {
            Some(cwd) if !tokens.is_absolute() => cwd.reopen(),
            _ => Directory::open_root(volume)?,
        };
        Self::walk(start, tokens.parents())
    }

    /// Descends from `start` through each of `names`
    pub fn walk(start: Directory, names: &[&str]) -> Result<Directory, PathError> {
        let mut dir = start;
        for name in names {
            let inode = dir
                .lookup(name)?
                .ok_or_else(|| PathError::NotFound(name.to_string()))?;
            if !inode.is_directory() {
                return Err(PathError::NotADirectory(name.to_string()));
            }
            log::trace!("resolve: {} -> sector {}", name, inode.inumber());
            dir = Directory::open(inode)?;
        }
        Ok(dir)
    }
}
