//! Run progress reporting.
//!
//! Drivers never print; they tell a [`Reporter`] what they are doing. The
//! default [`LogReporter`] forwards everything to the `log` facade.

use serde::{Deserialize, Serialize};

use crate::sync::RunSummary;

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local markdown → remote pages
    Push,
    /// Remote pages → local markdown
    Pull,
}

impl Direction {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Push => "push",
            Direction::Pull => "pull",
        }
    }
}

/// Stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Document skipped as unchanged
    Skipped,
    /// Converting a document
    Converting,
    /// Rendering and uploading its assets
    Uploading,
    /// Downloading its attachments
    Downloading,
    /// Document finished
    Done,
    /// Document failed
    Failed,
}

impl Stage {
    /// Human-readable description of this stage.
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Skipped => "Unchanged",
            Stage::Converting => "Converting...",
            Stage::Uploading => "Uploading...",
            Stage::Downloading => "Downloading...",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }
}

/// Progress of one document within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Current stage
    pub stage: Stage,
    /// Document being processed (1-indexed)
    pub current: usize,
    /// Documents in this run
    pub total: usize,
    /// Workspace-relative path or page title
    pub item: String,
    /// Optional detail (e.g., the error message)
    pub message: Option<String>,
}

/// Observer of a sync run.
pub trait Reporter {
    /// The run is about to process `total` documents.
    fn on_start(&mut self, direction: Direction, total: usize);

    /// A document changed stage.
    fn on_progress(&mut self, progress: &Progress);

    /// The run finished.
    fn on_complete(&mut self, direction: Direction, summary: &RunSummary);
}

/// Reports through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn on_start(&mut self, direction: Direction, total: usize) {
        log::info!("Starting {} of {} documents", direction.as_str(), total);
    }

    fn on_progress(&mut self, progress: &Progress) {
        match (progress.stage, &progress.message) {
            (Stage::Failed, Some(message)) => log::warn!(
                "[{}/{}] {}: {}",
                progress.current,
                progress.total,
                progress.item,
                message
            ),
            (Stage::Done | Stage::Skipped, _) => log::info!(
                "[{}/{}] {} {}",
                progress.current,
                progress.total,
                progress.item,
                progress.stage.description()
            ),
            _ => log::debug!(
                "[{}/{}] {} {}",
                progress.current,
                progress.total,
                progress.item,
                progress.stage.description()
            ),
        }
    }

    fn on_complete(&mut self, direction: Direction, summary: &RunSummary) {
        log::info!(
            "Finished {}: {} created, {} updated, {} skipped, {} failed",
            direction.as_str(),
            summary.created,
            summary.updated,
            summary.skipped,
            summary.failed
        );
        for failure in &summary.failures {
            log::warn!("  {}: {}", failure.path, failure.message);
        }
        if summary.diagrams.failed > 0 {
            for (kind, stats) in &summary.diagrams.by_kind {
                if stats.failed > 0 {
                    log::warn!("  {} {} diagram(s) failed to render", stats.failed, kind);
                }
            }
        }
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn on_start(&mut self, _direction: Direction, _total: usize) {}
    fn on_progress(&mut self, _progress: &Progress) {}
    fn on_complete(&mut self, _direction: Direction, _summary: &RunSummary) {}
}
