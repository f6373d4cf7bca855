//! Intra-workspace link rewriting.
//!
//! On push, links between workspace documents (`[t](../a/b.md#frag)`,
//! `href="b.md"`, `/docs/x.md`) become remote page URLs. On pull, known page
//! URLs become relative paths again. Anything that cannot be resolved is left
//! exactly as written.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::LazyLock;

use crate::convert::{FenceLine, FenceTracker};

/// Inline code spans come first so links inside them are skipped.
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?P<code>`+[^`\n]*`+)|(?P<bang>!?)\[(?P<text>(?:[^\[\]\n]|\[[^\[\]\n]*\])*)\]\((?P<dest><[^<>\n]*>|[^\s()]+)(?P<title>\s+"[^"\n]*")?\)|(?P<attr>\bhref\s*=\s*)(?P<quote>["'])(?P<href>[^"'\n]*)["']"#,
    )
    .expect("valid link regex")
});

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("valid scheme regex"));

/// Workspace path → remote page URL, and back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    by_path: BTreeMap<String, String>,
    by_url: BTreeMap<String, String>,
}

impl LinkTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page.
    pub fn insert(&mut self, path: impl Into<String>, url: impl Into<String>) {
        let path = normalize_path(Path::new(&path.into()));
        let url = url.into();
        self.by_url.insert(url.clone(), path.clone());
        self.by_path.insert(path, url);
    }

    /// Remote URL for a workspace path.
    pub fn url_for(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    /// Workspace path for a remote URL.
    pub fn path_for(&self, url: &str) -> Option<&str> {
        self.by_url.get(url).map(String::as_str)
    }

    /// Number of registered pages.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Result of rewriting a document's links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewritten {
    /// The rewritten markdown
    pub markdown: String,
    /// Links that were rewritten
    pub resolved: usize,
    /// Local document links with no known page, left unchanged
    pub unresolved: Vec<String>,
}

/// Normalize a path, resolving `.` and `..` components.
///
/// Leading `..` that cannot be resolved are kept, which marks a path as
/// pointing outside the workspace.
pub fn normalize_path(path: &Path) -> String {
    let mut normalized: Vec<&str> = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !normalized.is_empty() && normalized.last() != Some(&"..") {
                    normalized.pop();
                } else {
                    normalized.push("..");
                }
            }
            Component::Normal(s) => {
                if let Some(s) = s.to_str() {
                    normalized.push(s);
                }
            }
            // Root, prefix and `.` carry no information for workspace paths
            _ => {}
        }
    }

    normalized.join("/")
}

/// Relative path from the file `from_path` to `to_path`, both workspace-relative.
pub fn compute_relative_path(from_path: &str, to_path: &str) -> String {
    let from_dir = Path::new(from_path).parent().unwrap_or(Path::new(""));
    let to = Path::new(to_path);

    let from_components: Vec<&str> = from_dir
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    let to_components: Vec<&str> = to
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();

    let common_len = from_components
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let ups = from_components.len().saturating_sub(common_len);
    let mut parts: Vec<&str> = vec![".."; ups];
    parts.extend(&to_components[common_len..]);
    parts.join("/")
}

fn split_fragment(dest: &str) -> (&str, Option<&str>) {
    match dest.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (dest, None),
    }
}

fn is_local_document_link(dest: &str) -> bool {
    !dest.is_empty() && !dest.starts_with('#') && !dest.starts_with("//") && !SCHEME_RE.is_match(dest)
}

/// Rewrites links against a [`LinkTable`].
pub struct ReferenceResolver<'t> {
    table: &'t LinkTable,
}

impl<'t> ReferenceResolver<'t> {
    /// Create a resolver over a table.
    pub fn new(table: &'t LinkTable) -> Self {
        Self { table }
    }

    /// Resolve one local link destination written in `doc_path`.
    pub fn resolve(&self, doc_path: &str, dest: &str) -> Option<String> {
        if !is_local_document_link(dest) {
            return None;
        }
        let (path_part, fragment) = split_fragment(dest);
        if path_part.is_empty() {
            return None;
        }
        let decoded = urlencoding::decode(path_part)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| path_part.to_string());

        let target = match decoded.strip_prefix('/') {
            Some(rooted) => normalize_path(Path::new(rooted)),
            None => {
                let dir = Path::new(doc_path).parent().unwrap_or(Path::new(""));
                normalize_path(&dir.join(&decoded))
            }
        };
        if target.is_empty() || target.starts_with("..") {
            return None;
        }

        let url = self.table.url_for(&target).or_else(|| {
            // Extensionless links to documents
            Path::new(&target)
                .extension()
                .is_none()
                .then(|| self.table.url_for(&format!("{}.md", target)))
                .flatten()
        })?;

        Some(match fragment {
            Some(f) if !f.is_empty() => format!("{}#{}", url, f),
            _ => url.to_string(),
        })
    }

    /// Rewrite local document links to remote URLs.
    pub fn to_remote(&self, doc_path: &str, markdown: &str) -> Rewritten {
        let mut resolved = 0;
        let mut unresolved = Vec::new();

        let markdown = map_outside_fences(markdown, |text| {
            rewrite_links(text, |dest| {
                let hit = self.resolve(doc_path, dest);
                match &hit {
                    Some(_) => resolved += 1,
                    None if is_local_document_link(dest) && looks_like_document(dest) => {
                        log::debug!("Unresolved link '{}' in {}", dest, doc_path);
                        unresolved.push(dest.to_string());
                    }
                    None => {}
                }
                hit
            })
        });

        Rewritten {
            markdown,
            resolved,
            unresolved,
        }
    }

    /// Rewrite known remote page URLs to paths relative to `doc_path`.
    pub fn to_local(&self, doc_path: &str, markdown: &str) -> Rewritten {
        let mut resolved = 0;
        let markdown = map_outside_fences(markdown, |text| {
            rewrite_links(text, |dest| {
                let (url, fragment) = split_fragment(dest);
                let target = self.table.path_for(url)?;
                resolved += 1;
                let relative = compute_relative_path(doc_path, target);
                Some(match fragment {
                    Some(f) if !f.is_empty() => format!("{}#{}", relative, f),
                    _ => relative,
                })
            })
        });
        Rewritten {
            markdown,
            resolved,
            unresolved: Vec::new(),
        }
    }
}

fn looks_like_document(dest: &str) -> bool {
    let (path, _) = split_fragment(dest);
    path.ends_with(".md") || path.ends_with(".mdx")
}

/// Apply `rewrite` to every link destination (markdown or `href`) in `text`.
/// Images and inline code are left alone.
fn rewrite_links(text: &str, mut rewrite: impl FnMut(&str) -> Option<String>) -> String {
    LINK_RE
        .replace_all(text, |caps: &Captures| {
            let whole = &caps[0];
            if caps.name("code").is_some() {
                return whole.to_string();
            }
            if let Some(href) = caps.name("href") {
                let quote = &caps["quote"];
                return match rewrite(href.as_str()) {
                    Some(new) => format!("{}{}{}{}", &caps["attr"], quote, new, quote),
                    None => whole.to_string(),
                };
            }
            if !caps["bang"].is_empty() {
                return whole.to_string();
            }

            let raw_dest = &caps["dest"];
            let dest = raw_dest
                .strip_prefix('<')
                .and_then(|d| d.strip_suffix('>'))
                .unwrap_or(raw_dest);
            match rewrite(dest) {
                Some(new) => format!(
                    "[{}]({}{})",
                    &caps["text"],
                    new,
                    caps.name("title").map(|t| t.as_str()).unwrap_or("")
                ),
                None => whole.to_string(),
            }
        })
        .into_owned()
}

/// Apply `f` to the parts of `markdown` outside fenced code blocks.
fn map_outside_fences(markdown: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut prose = String::new();
    let mut fences = FenceTracker::default();

    for line in markdown.split_inclusive('\n') {
        match fences.classify(line) {
            FenceLine::Outside => prose.push_str(line),
            FenceLine::Open(_) => {
                out.push_str(&f(&prose));
                prose.clear();
                out.push_str(line);
            }
            FenceLine::Inside | FenceLine::Close => out.push_str(line),
        }
    }
    out.push_str(&f(&prose));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LinkTable {
        let mut t = LinkTable::new();
        t.insert("docs/guide/intro.md", "https://wiki/p/1");
        t.insert("docs/api.md", "https://wiki/p/2");
        t.insert("README.md", "https://wiki/p/3");
        t
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("docs/./a/../b.md")), "docs/b.md");
        assert_eq!(normalize_path(Path::new("../x.md")), "../x.md");
    }

    #[test]
    fn test_compute_relative_path() {
        assert_eq!(compute_relative_path("docs/guide/intro.md", "docs/api.md"), "../api.md");
        assert_eq!(compute_relative_path("docs/api.md", "docs/guide/intro.md"), "guide/intro.md");
        assert_eq!(compute_relative_path("README.md", "docs/api.md"), "docs/api.md");
    }

    #[test]
    fn test_relative_and_rooted_links_resolve() {
        let t = table();
        let r = ReferenceResolver::new(&t);
        let md = "See [API](../api.md#auth), [root](/README.md) and [self](./intro).\n";
        let out = r.to_remote("docs/guide/intro.md", md);
        assert_eq!(
            out.markdown,
            "See [API](https://wiki/p/2#auth), [root](https://wiki/p/3) and [self](https://wiki/p/1).\n"
        );
        assert_eq!(out.resolved, 3);
    }

    #[test]
    fn test_external_anchor_image_and_code_untouched() {
        let t = table();
        let r = ReferenceResolver::new(&t);
        let md = "[a](https://x.org/api.md) [b](mailto:me@x.org) [c](#top) ![i](../api.md) `[d](../api.md)`\n\n```\n[e](../api.md)\n```\n";
        let out = r.to_remote("docs/guide/intro.md", md);
        assert_eq!(out.markdown, md);
        assert_eq!(out.resolved, 0);
    }

    #[test]
    fn test_unresolved_and_outside_links_left_alone() {
        let t = table();
        let r = ReferenceResolver::new(&t);
        let md = "[x](missing.md) [y](../../../outside.md)\n";
        let out = r.to_remote("docs/a.md", md);
        assert_eq!(out.markdown, md);
        assert_eq!(out.unresolved, vec!["missing.md", "../../../outside.md"]);
    }

    #[test]
    fn test_html_href_rewritten() {
        let t = table();
        let r = ReferenceResolver::new(&t);
        let out = r.to_remote("docs/api.md", "<a href=\"guide/intro.md\">Intro</a>\n");
        assert_eq!(out.markdown, "<a href=\"https://wiki/p/1\">Intro</a>\n");
    }

    #[test]
    fn test_to_local_inverts_to_remote() {
        let t = table();
        let r = ReferenceResolver::new(&t);
        let md = "See [API](../api.md#auth) and [web](https://example.com).\n";
        let remote = r.to_remote("docs/guide/intro.md", md);
        let local = r.to_local("docs/guide/intro.md", &remote.markdown);
        assert_eq!(local.markdown, md);
        assert_eq!(local.resolved, 1);
    }
}
