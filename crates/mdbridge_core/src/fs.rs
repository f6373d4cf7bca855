use std::io::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Abstraction over filesystem operations
/// Allows for different implementations: real filesystem, in-memory (for tests), etc.
pub trait FileSystem {
    /// Reads the file content (for parsing frontmatter)
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Overwrites or creates a file
    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Deletes a file
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Checks if a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Creates a directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Checks if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// List direct children (files and directories) of a directory
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    // ==================== Binary File Methods ====================

    /// Read binary file content
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        self.read_to_string(path).map(|s| s.into_bytes())
    }

    /// Write binary content to a file
    fn write_binary(&self, _path: &Path, _content: &[u8]) -> Result<()> {
        Err(Error::new(
            ErrorKind::Unsupported,
            "Binary write not supported",
        ))
    }

    /// Last modification time, when the backend tracks one
    fn modified_at(&self, _path: &Path) -> Option<DateTime<Utc>> {
        None
    }
}

// Blanket implementation for references to FileSystem
impl<T: FileSystem> FileSystem for &T {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        (*self).read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        (*self).write_file(path, content)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        (*self).delete_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (*self).exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        (*self).create_dir_all(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (*self).is_dir(path)
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        (*self).list_dir(dir)
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        (*self).read_binary(path)
    }

    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()> {
        (*self).write_binary(path, content)
    }

    fn modified_at(&self, path: &Path) -> Option<DateTime<Utc>> {
        (*self).modified_at(path)
    }
}

// ============================================================================
// RealFileSystem - Only available on non-WASM targets
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
use std::fs;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Copy, Debug, Default)]
/// This is a simple filesystem implementation that simply maps to std::fs methods
pub struct RealFileSystem;

#[cfg(not(target_arch = "wasm32"))]
impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    fn modified_at(&self, path: &Path) -> Option<DateTime<Utc>> {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }
}

// ============================================================================
// InMemoryFileSystem - Available on all targets
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

/// An in-memory filesystem implementation
/// Useful for testing the sync drivers without touching disk
#[derive(Clone, Default)]
pub struct InMemoryFileSystem {
    /// Files stored as path -> content bytes
    files: Arc<RwLock<BTreeMap<PathBuf, Vec<u8>>>>,
    /// Directories that exist (implicitly created when files are added)
    directories: Arc<RwLock<BTreeSet<PathBuf>>>,
}

impl InMemoryFileSystem {
    /// Create a new empty in-memory filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filesystem pre-populated with text files
    pub fn with_files(entries: Vec<(&str, &str)>) -> Self {
        let fs = Self::new();
        for (path, content) in entries {
            // Writes to an in-memory map cannot fail
            let _ = fs.write_file(Path::new(path), content);
        }
        fs
    }

    /// Get a list of all file paths in the filesystem
    pub fn list_all_files(&self) -> Vec<PathBuf> {
        let files = self.files.read().unwrap();
        files.keys().cloned().collect()
    }

    /// Helper to normalize paths (remove . and .. components where possible)
    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            use std::path::Component;
            match component {
                Component::CurDir => {} // Skip "."
                Component::ParentDir => {
                    if !components.is_empty() {
                        components.pop();
                    }
                }
                c => components.push(c),
            }
        }
        components.iter().collect()
    }

    fn register_parents(&self, path: &Path) {
        let mut dirs = self.directories.write().unwrap();
        let mut current = path;
        while let Some(parent) = current.parent() {
            if !parent.as_os_str().is_empty() {
                dirs.insert(parent.to_path_buf());
            }
            current = parent;
        }
    }
}

impl FileSystem for InMemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_binary(path)?;
        String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write_binary(path, content.as_bytes())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        let normalized = Self::normalize_path(path);
        let mut files = self.files.write().unwrap();
        files
            .remove(&normalized)
            .map(|_| ())
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path)))
    }

    fn exists(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        self.files.read().unwrap().contains_key(&normalized)
            || self.directories.read().unwrap().contains(&normalized)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let normalized = Self::normalize_path(path);
        if normalized.as_os_str().is_empty() {
            return Ok(());
        }
        self.register_parents(&normalized.join("_"));
        Ok(())
    }

    fn is_dir(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        self.directories.read().unwrap().contains(&normalized)
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let normalized = Self::normalize_path(dir);
        let files = self.files.read().unwrap();
        let dirs = self.directories.read().unwrap();

        let is_child = |p: &PathBuf| match p.parent() {
            Some(parent) => parent == normalized,
            None => false,
        };

        let mut result: Vec<PathBuf> = files.keys().filter(|p| is_child(p)).cloned().collect();
        result.extend(dirs.iter().filter(|p| is_child(p)).cloned());
        result.sort();
        Ok(result)
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        let normalized = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        files
            .get(&normalized)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path)))
    }

    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()> {
        let normalized = Self::normalize_path(path);
        self.register_parents(&normalized);
        let mut files = self.files.write().unwrap();
        files.insert(normalized, content.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_roundtrip() {
        let fs = InMemoryFileSystem::new();
        fs.write_file(Path::new("docs/guide/intro.md"), "# Intro")
            .unwrap();

        assert_eq!(
            fs.read_to_string(Path::new("docs/guide/intro.md")).unwrap(),
            "# Intro"
        );
        assert!(fs.is_dir(Path::new("docs/guide")));
        assert!(fs.is_dir(Path::new("docs")));
    }

    #[test]
    fn test_in_memory_normalizes_dot_segments() {
        let fs = InMemoryFileSystem::with_files(vec![("docs/a.md", "a")]);
        assert!(fs.exists(Path::new("docs/./sub/../a.md")));
    }

    #[test]
    fn test_list_dir_returns_files_and_dirs() {
        let fs = InMemoryFileSystem::with_files(vec![
            ("docs/a.md", "a"),
            ("docs/sub/b.md", "b"),
            ("other.md", "o"),
        ]);
        let listed = fs.list_dir(Path::new("docs")).unwrap();
        assert_eq!(
            listed,
            vec![PathBuf::from("docs/a.md"), PathBuf::from("docs/sub")]
        );
    }

    #[test]
    fn test_binary_write_and_delete() {
        let fs = InMemoryFileSystem::new();
        fs.write_binary(Path::new("img/x.png"), &[0x89, 0x50])
            .unwrap();
        assert_eq!(fs.read_binary(Path::new("img/x.png")).unwrap(), vec![0x89, 0x50]);
        fs.delete_file(Path::new("img/x.png")).unwrap();
        assert!(!fs.exists(Path::new("img/x.png")));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_real_fs_creates_parents_and_lists_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let fs = RealFileSystem;

        fs.write_file(&root.join("docs/b.md"), "# B").unwrap();
        fs.write_binary(&root.join("docs/img/a.png"), b"png").unwrap();

        let listed = fs.list_dir(&root.join("docs")).unwrap();
        assert_eq!(listed, vec![root.join("docs/b.md"), root.join("docs/img")]);
        assert!(fs.is_dir(&root.join("docs/img")));
        assert_eq!(fs.read_binary(&root.join("docs/img/a.png")).unwrap(), b"png");
        assert!(fs.modified_at(&root.join("docs/b.md")).is_some());
    }
}
