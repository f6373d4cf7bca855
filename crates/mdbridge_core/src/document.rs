//! Local markdown documents and title resolution.

use std::path::{Path, PathBuf};

use crate::convert::{FenceLine, FenceTracker};
use crate::error::Result;
use crate::frontmatter::{self, Frontmatter};

/// A local markdown document ready to be pushed.
#[derive(Debug, Clone)]
pub struct Document {
    /// Resolved page title (never empty)
    pub title: String,
    /// Ordered frontmatter fields
    pub frontmatter: Frontmatter,
    /// Raw markdown body (frontmatter stripped)
    pub body: String,
    /// Workspace-relative source path
    pub source_path: PathBuf,
}

impl Document {
    /// Parse a document from its raw file content.
    pub fn parse(source_path: impl Into<PathBuf>, content: &str) -> Result<Self> {
        let parsed = frontmatter::parse_or_empty(content)?;
        Ok(Self::from_parts(source_path, parsed.frontmatter, parsed.body))
    }

    /// Build a document from already-parsed frontmatter and body.
    pub fn from_parts(
        source_path: impl Into<PathBuf>,
        frontmatter: Frontmatter,
        body: String,
    ) -> Self {
        let source_path = source_path.into();
        let title = resolve_title(&frontmatter, &body, &source_path);
        Self {
            title,
            frontmatter,
            body,
            source_path,
        }
    }
}

/// Resolve a title: frontmatter `title` > first level-1 heading > file name.
pub fn resolve_title(frontmatter: &Frontmatter, body: &str, path: &Path) -> String {
    if let Some(title) = frontmatter::get_string(frontmatter, "title")
        && !title.trim().is_empty()
    {
        return title.trim().to_string();
    }

    if let Some(heading) = first_h1(body) {
        return heading;
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    filename_to_title(stem)
}

/// Find the first ATX level-1 heading outside fenced code.
pub fn first_h1(body: &str) -> Option<String> {
    let mut fences = FenceTracker::default();
    for line in body.lines() {
        if fences.classify(line) != FenceLine::Outside {
            continue;
        }
        if let Some(rest) = line.trim_start().strip_prefix("# ") {
            let text = rest.trim().trim_end_matches('#').trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Turn a file stem like `getting-started_guide` into `Getting Started Guide`.
pub fn filename_to_title(stem: &str) -> String {
    let title = stem
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}
