//! Markdown file discovery.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::error::{MdBridgeError, Result};
use crate::frontmatter::{self, Frontmatter};
use crate::fs::FileSystem;

/// A markdown file found in the workspace.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Workspace-relative path with `/` separators
    pub path: String,
    /// Parsed frontmatter
    pub frontmatter: Frontmatter,
    /// Body after the frontmatter
    pub body: String,
    /// Full file contents
    pub raw: String,
    /// Last modification time, when the filesystem reports one
    pub mtime: Option<DateTime<Utc>>,
}

/// Source of the documents a push run considers.
pub trait Scanner {
    /// Every document, sorted by path.
    fn scan(&self) -> Result<Vec<ScannedFile>>;
}

/// Recursive walk over a workspace directory.
///
/// Picks up `.md` and `.mdx` files and skips hidden files and directories.
pub struct WorkspaceScanner<'a, FS: FileSystem> {
    fs: &'a FS,
    root: PathBuf,
}

impl<'a, FS: FileSystem> WorkspaceScanner<'a, FS> {
    /// Create a scanner rooted at `root`.
    pub fn new(fs: &'a FS, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    fn collect(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        let mut entries = self.fs.list_dir(dir)?;
        entries.sort();

        for entry in entries {
            let hidden = entry
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }

            if self.fs.is_dir(&entry) {
                self.collect(&entry, out)?;
            } else if is_markdown(&entry) {
                out.push(entry);
            }
        }
        Ok(())
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("mdx"))
}

impl<FS: FileSystem> Scanner for WorkspaceScanner<'_, FS> {
    fn scan(&self) -> Result<Vec<ScannedFile>> {
        if !self.fs.is_dir(&self.root) {
            return Err(MdBridgeError::Config(format!(
                "workspace '{}' is not a directory",
                self.root.display()
            )));
        }

        let mut paths = Vec::new();
        self.collect(&self.root, &mut paths)?;
        log::debug!("Found {} markdown files under {}", paths.len(), self.root.display());

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = self
                .fs
                .read_to_string(&path)
                .map_err(|e| MdBridgeError::FileRead {
                    path: path.clone(),
                    source: e,
                })?;
            // Malformed YAML is reported when the document is pushed
            let parsed = frontmatter::parse_or_empty(&raw).unwrap_or_else(|e| {
                log::warn!("Ignoring frontmatter of {}: {}", path.display(), e);
                frontmatter::ParsedFile {
                    frontmatter: Frontmatter::new(),
                    body: raw.clone(),
                }
            });

            files.push(ScannedFile {
                path: self.relative(&path),
                frontmatter: parsed.frontmatter,
                body: parsed.body,
                mtime: self.fs.modified_at(&path),
                raw,
            });
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFileSystem;

    #[test]
    fn test_scan_walks_tree_and_skips_hidden() {
        let fs = InMemoryFileSystem::with_files(vec![
            ("docs/b.md", "# B\n"),
            ("docs/guide/a.mdx", "---\ntitle: A\n---\nBody\n"),
            ("docs/img/x.png", "png"),
            ("docs/.drafts/secret.md", "hidden"),
            ("docs/.mdbridge-ledger.json", "{}"),
        ]);
        let files = WorkspaceScanner::new(&fs, "docs").scan().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["b.md", "guide/a.mdx"]);

        let a = &files[1];
        assert_eq!(frontmatter::get_string(&a.frontmatter, "title"), Some("A"));
        assert_eq!(a.body, "Body\n");
        assert!(a.raw.starts_with("---\n"));
    }

    #[test]
    fn test_missing_workspace_is_config_error() {
        let fs = InMemoryFileSystem::new();
        let err = WorkspaceScanner::new(&fs, "nowhere").scan().unwrap_err();
        assert!(err.is_fatal());
    }
}
