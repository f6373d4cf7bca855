//! Sync ledger tracking which local file maps to which remote page.
//!
//! The ledger stores, per workspace-relative path, the remote page identity
//! and the version and content hash seen at the last successful sync. Push and
//! pull consult it to skip documents that have not changed on either side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::config::RemoteConfig;
use crate::error::{MdBridgeError, Result};
use crate::fs::FileSystem;
use crate::reference::LinkTable;

/// Sync state of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    /// Remote page identifier
    pub remote_id: String,

    /// Page title at last sync
    pub title: String,

    /// Remote version at last sync
    pub version: u64,

    /// SHA-256 of the file contents at last sync
    pub content_hash: String,

    /// When this document was last synced
    pub last_synced_at: DateTime<Utc>,
}

/// Counters of the most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Pages created
    pub created: usize,
    /// Pages updated
    pub updated: usize,
    /// Documents skipped as unchanged
    pub skipped: usize,
    /// Documents that failed
    pub failed: usize,
}

/// Persistent map of local path → [`PageState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    /// Format version
    pub version: String,

    /// When the last run finished
    pub last_sync: Option<DateTime<Utc>>,

    /// Per-document state, keyed by workspace-relative path
    pub pages: BTreeMap<String, PageState>,

    /// Counters of the last run
    #[serde(default)]
    pub stats: LedgerStats,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Current ledger format version
    pub const CURRENT_VERSION: &'static str = "1.0.0";

    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            last_sync: None,
            pages: BTreeMap::new(),
            stats: LedgerStats::default(),
        }
    }

    /// Whether a local document must be pushed.
    pub fn needs_push(&self, path: &str, content_hash: &str, force: bool) -> bool {
        if force {
            return true;
        }
        match self.pages.get(path) {
            None => true,
            Some(state) => state.content_hash != content_hash,
        }
    }

    /// Whether a remote page must be pulled into `path`.
    pub fn needs_pull(
        &self,
        path: &str,
        remote_version: u64,
        remote_modified_at: Option<DateTime<Utc>>,
        force: bool,
    ) -> bool {
        if force {
            return true;
        }
        match self.pages.get(path) {
            None => true,
            Some(state) => {
                remote_version > state.version
                    || remote_modified_at.is_some_and(|m| m > state.last_synced_at)
            }
        }
    }

    /// Entry by workspace-relative path.
    pub fn lookup_by_path(&self, path: &str) -> Option<&PageState> {
        self.pages.get(path)
    }

    /// Entry (and its path) by remote page id.
    pub fn lookup_by_remote_id(&self, remote_id: &str) -> Option<(&str, &PageState)> {
        self.pages
            .iter()
            .find(|(_, state)| state.remote_id == remote_id)
            .map(|(path, state)| (path.as_str(), state))
    }

    /// Find the entry for a document that may have moved.
    ///
    /// A match by remote id wins over a match by path; when it was stored
    /// under another path it is re-keyed to `path`, replacing whatever entry
    /// `path` had.
    pub fn resolve_identity(&mut self, path: &str, remote_id: Option<&str>) -> Option<&PageState> {
        let by_id = remote_id
            .and_then(|id| self.lookup_by_remote_id(id))
            .map(|(p, _)| p.to_string());

        match by_id {
            Some(old_path) if old_path != path => {
                log::info!("Ledger entry moved: {} -> {}", old_path, path);
                if let Some(state) = self.pages.remove(&old_path) {
                    self.pages.insert(path.to_string(), state);
                }
            }
            Some(_) => {}
            None => {
                if let (Some(id), Some(state)) = (remote_id, self.pages.get(path))
                    && state.remote_id != id
                {
                    log::debug!(
                        "{} now maps to page {} (was {})",
                        path,
                        id,
                        state.remote_id
                    );
                }
            }
        }
        self.pages.get(path)
    }

    /// Record a successful sync.
    pub fn record(
        &mut self,
        path: impl Into<String>,
        remote_id: impl Into<String>,
        title: impl Into<String>,
        version: u64,
        content_hash: impl Into<String>,
    ) {
        let remote_id = remote_id.into();
        let path = path.into();
        // Keep remote ids unique across entries
        self.pages
            .retain(|p, state| *p == path || state.remote_id != remote_id);
        self.pages.insert(
            path,
            PageState {
                remote_id,
                title: title.into(),
                version,
                content_hash: content_hash.into(),
                last_synced_at: Utc::now(),
            },
        );
    }

    /// Remove entries whose local file no longer exists. Returns the removed paths.
    pub fn prune_orphans(&mut self, existing_paths: &[String]) -> Vec<String> {
        let existing: HashSet<&str> = existing_paths.iter().map(String::as_str).collect();
        let orphans: Vec<String> = self
            .pages
            .keys()
            .filter(|path| !existing.contains(path.as_str()))
            .cloned()
            .collect();
        for path in &orphans {
            log::debug!("Pruning ledger entry for missing file {}", path);
            self.pages.remove(path);
        }
        orphans
    }

    /// Path → page URL table for link resolution.
    pub fn link_table(&self, remote: &RemoteConfig) -> LinkTable {
        let mut table = LinkTable::new();
        for (path, state) in &self.pages {
            table.insert(path.clone(), remote.page_url(&state.remote_id));
        }
        table
    }

    /// Mark the run as complete with its counters.
    pub fn mark_synced(&mut self, stats: LedgerStats) {
        self.last_sync = Some(Utc::now());
        self.stats = stats;
    }

    /// Parse a ledger from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let ledger: Ledger = serde_json::from_str(json)?;
        if ledger.version.split('.').next() != Self::CURRENT_VERSION.split('.').next() {
            return Err(MdBridgeError::Ledger(format!(
                "unsupported ledger version {}",
                ledger.version
            )));
        }
        Ok(ledger)
    }

    /// Serialize the ledger to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load the ledger at `path`.
    ///
    /// A missing file yields an empty ledger. So does an unreadable or corrupt
    /// one, with a warning, so that the next run rebuilds it.
    pub fn load<FS: FileSystem>(fs: &FS, path: &Path) -> Self {
        if !fs.exists(path) {
            return Self::new();
        }
        let parsed = fs
            .read_to_string(path)
            .map_err(|e| MdBridgeError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })
            .and_then(|content| Self::from_json(&content));

        match parsed {
            Ok(ledger) => ledger,
            Err(e) => {
                log::warn!(
                    "Ignoring corrupt ledger {}: {}; starting fresh",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    /// Write the ledger to `path`.
    pub fn save<FS: FileSystem>(&self, fs: &FS, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs.create_dir_all(parent)?;
        }
        let content = self.to_json()?;
        fs.write_file(path, &content)
            .map_err(|e| MdBridgeError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFileSystem;
    use chrono::Duration;

    fn ledger_with(path: &str, id: &str, version: u64, hash: &str) -> Ledger {
        let mut ledger = Ledger::new();
        ledger.record(path, id, "Title", version, hash);
        ledger
    }

    #[test]
    fn test_needs_push() {
        let ledger = ledger_with("a.md", "1", 1, "h1");
        assert!(ledger.needs_push("new.md", "anything", false));
        assert!(!ledger.needs_push("a.md", "h1", false));
        assert!(ledger.needs_push("a.md", "h2", false));
        assert!(ledger.needs_push("a.md", "h1", true));
    }

    #[test]
    fn test_needs_pull() {
        let ledger = ledger_with("a.md", "1", 3, "h1");
        let synced = ledger.lookup_by_path("a.md").unwrap().last_synced_at;

        assert!(ledger.needs_pull("new.md", 1, None, false));
        assert!(!ledger.needs_pull("a.md", 3, None, false));
        assert!(!ledger.needs_pull("a.md", 3, Some(synced - Duration::hours(1)), false));
        assert!(ledger.needs_pull("a.md", 4, None, false));
        assert!(ledger.needs_pull("a.md", 3, Some(synced + Duration::hours(1)), false));
        assert!(ledger.needs_pull("a.md", 3, None, true));
    }

    #[test]
    fn test_resolve_identity_rekeys_on_rename() {
        let mut ledger = ledger_with("old/a.md", "42", 2, "h");
        let state = ledger.resolve_identity("new/a.md", Some("42")).unwrap();
        assert_eq!(state.remote_id, "42");
        assert!(ledger.lookup_by_path("old/a.md").is_none());
        assert_eq!(ledger.lookup_by_remote_id("42").unwrap().0, "new/a.md");
    }

    #[test]
    fn test_remote_id_match_wins_over_path_match() {
        let mut ledger = ledger_with("a.md", "1", 1, "h1");
        ledger.record("b.md", "2", "B", 1, "h2");

        let state = ledger.resolve_identity("a.md", Some("2")).unwrap();
        assert_eq!(state.remote_id, "2");
        assert_eq!(ledger.pages.len(), 1);
    }

    #[test]
    fn test_record_keeps_remote_ids_unique() {
        let mut ledger = ledger_with("a.md", "1", 1, "h1");
        ledger.record("b.md", "1", "Moved", 2, "h1");
        assert!(ledger.lookup_by_path("a.md").is_none());
        assert_eq!(ledger.lookup_by_remote_id("1").unwrap().0, "b.md");
    }

    #[test]
    fn test_prune_orphans() {
        let mut ledger = ledger_with("a.md", "1", 1, "h");
        ledger.record("b.md", "2", "B", 1, "h");
        ledger.record("c.md", "3", "C", 1, "h");

        let removed = ledger.prune_orphans(&["a.md".to_string(), "c.md".to_string()]);
        assert_eq!(removed, vec!["b.md".to_string()]);
        assert!(ledger.lookup_by_path("b.md").is_none());
        assert_eq!(ledger.pages.len(), 2);
    }

    #[test]
    fn test_json_shape() {
        let mut ledger = ledger_with("docs/a.md", "7", 2, "abc");
        ledger.mark_synced(LedgerStats {
            created: 1,
            ..Default::default()
        });
        let json: serde_json::Value = serde_json::from_str(&ledger.to_json().unwrap()).unwrap();

        assert_eq!(json["version"], "1.0.0");
        assert!(json["lastSync"].is_string());
        let page = &json["pages"]["docs/a.md"];
        assert_eq!(page["remoteId"], "7");
        assert_eq!(page["contentHash"], "abc");
        assert_eq!(page["version"], 2);
        assert!(page["lastSyncedAt"].is_string());
        assert_eq!(json["stats"]["created"], 1);
    }

    #[test]
    fn test_save_and_load() {
        let fs = InMemoryFileSystem::new();
        let ledger = ledger_with("a.md", "1", 1, "h");
        ledger.save(&fs, Path::new("ws/.ledger.json")).unwrap();
        assert_eq!(Ledger::load(&fs, Path::new("ws/.ledger.json")), ledger);
    }

    #[test]
    fn test_corrupt_or_missing_ledger_starts_fresh() {
        let fs = InMemoryFileSystem::with_files(vec![("bad.json", "{ not json")]);
        assert!(Ledger::load(&fs, Path::new("bad.json")).pages.is_empty());
        assert!(Ledger::load(&fs, Path::new("missing.json")).pages.is_empty());
    }

    #[test]
    fn test_link_table_uses_page_urls() {
        let ledger = ledger_with("docs/a.md", "9", 1, "h");
        let table = ledger.link_table(&RemoteConfig::new("https://wiki", "DOC"));
        assert_eq!(
            table.url_for("docs/a.md"),
            Some("https://wiki/pages/viewpage.action?pageId=9")
        );
    }
}
