//! Push and pull drivers.
//!
//! [`SyncEngine`] ties the pieces together for one run:
//!
//! ```text
//! push: scan → ledger check → links → diagrams → forward convert
//!       → images → create/update page → ledger
//! pull: fetch page → reverse convert → diagram decode → links
//!       → downloads → frontmatter merge → write file → ledger
//! ```
//!
//! Each document is processed inside its own error boundary: a failure is
//! recorded in the [`RunSummary`] and the run moves on. Only configuration
//! problems abort a run.

mod pull;
mod push;

pub use pull::{PageRef, PullTarget};

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::convert::StorageConverter;
use crate::diagram::{DiagramPipeline, DiagramStats};
use crate::error::{MdBridgeError, Result};
use crate::fs::FileSystem;
use crate::ledger::LedgerStats;
use crate::remote::RemoteClient;
use crate::report::{Progress, Reporter, Stage};

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Ignore the ledger and sync every document
    pub force: bool,
}

/// A document that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    /// Workspace-relative path (or remote page reference when no path is known)
    pub path: String,
    /// Page title, when it was resolved before the failure
    pub title: Option<String>,
    /// Error kind
    pub kind: String,
    /// Error message
    pub message: String,
}

/// Outcome of a push or pull run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Pages (or files) created
    pub created: usize,
    /// Pages (or files) updated
    pub updated: usize,
    /// Documents skipped as unchanged
    pub skipped: usize,
    /// Documents that failed
    pub failed: usize,
    /// Every failure, in processing order
    pub failures: Vec<FileFailure>,
    /// Diagram counts across all documents
    pub diagrams: DiagramStats,
}

impl RunSummary {
    /// Whether no document failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Counters persisted in the ledger.
    pub fn ledger_stats(&self) -> LedgerStats {
        LedgerStats {
            created: self.created,
            updated: self.updated,
            skipped: self.skipped,
            failed: self.failed,
        }
    }

    fn record_failure(&mut self, path: &str, title: Option<String>, error: &MdBridgeError) {
        let err = error.to_serializable();
        self.failed += 1;
        self.failures.push(FileFailure {
            path: path.to_string(),
            title,
            kind: err.kind,
            message: err.message,
        });
    }
}

/// What happened to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
}

impl Outcome {
    fn count(self, summary: &mut RunSummary) {
        match self {
            Outcome::Created => summary.created += 1,
            Outcome::Updated => summary.updated += 1,
        }
    }
}

/// Runs push and pull for one workspace against one remote space.
pub struct SyncEngine<'a, FS: FileSystem, C: RemoteClient + ?Sized> {
    fs: &'a FS,
    client: &'a C,
    config: &'a Config,
    converter: StorageConverter,
    pipeline: DiagramPipeline,
}

impl<'a, FS: FileSystem, C: RemoteClient + ?Sized> SyncEngine<'a, FS, C> {
    /// Create an engine. Fails on invalid configuration.
    pub fn new(fs: &'a FS, client: &'a C, config: &'a Config, pipeline: DiagramPipeline) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fs,
            client,
            config,
            converter: StorageConverter::new(&config.converter),
            pipeline,
        })
    }

    /// Create an engine that renders diagrams with the standard command-line tools.
    pub fn with_command_renderers(fs: &'a FS, client: &'a C, config: &'a Config) -> Result<Self> {
        config.validate()?;
        let pipeline = DiagramPipeline::with_command_renderers(&config.diagrams)?;
        Self::new(fs, client, config, pipeline)
    }

    /// The configuration this engine runs with.
    pub fn config(&self) -> &Config {
        self.config
    }

    fn ledger_path(&self) -> PathBuf {
        self.config.ledger_path()
    }

    /// Workspace location of a workspace-relative document path.
    fn local_path(&self, path: &str) -> PathBuf {
        self.config.workspace.join(path)
    }

    /// Directory of a document, inside the workspace.
    fn doc_dir(&self, path: &str) -> PathBuf {
        let local = self.local_path(path);
        local
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.workspace.clone())
    }
}

fn progress(stage: Stage, current: usize, total: usize, item: &str, message: Option<String>) -> Progress {
    Progress {
        stage,
        current,
        total,
        item: item.to_string(),
        message,
    }
}

fn report_failure(
    reporter: &mut dyn Reporter,
    summary: &mut RunSummary,
    current: usize,
    total: usize,
    path: &str,
    title: Option<String>,
    error: &MdBridgeError,
) {
    reporter.on_progress(&progress(Stage::Failed, current, total, path, Some(error.to_string())));
    summary.record_failure(path, title, error);
}
