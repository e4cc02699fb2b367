//! File system abstraction
//!
//! Documents read through to disk while untracked and project discovery probes for
//! marker files. Both go through [`FileSystem`] so tests can substitute an in-memory
//! tree for the real disk.

use std::fmt::Debug;
use std::io;
use std::path::Path;

pub trait FileSystem: Send + Sync + Debug {
    /// Read the entire contents of a file
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Check if a path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_directory(&self, path: &Path) -> bool;
}

/// Standard file system implementation that uses [`std::fs`]
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// In-memory file system for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: std::collections::HashMap<std::path::PathBuf, String>,
}

#[cfg(test)]
impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<std::path::PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }
}

#[cfg(test)]
impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File not found"))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.files.keys().any(|file| file.starts_with(path) && file != path)
    }
}
