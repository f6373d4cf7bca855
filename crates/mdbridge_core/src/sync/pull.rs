use std::fmt;
use std::path::Path;

use super::{Outcome, RunSummary, SyncEngine, SyncOptions, progress, report_failure};
use crate::attachment::AttachmentManager;
use crate::convert::{AttachmentLink, Converter, ReverseContext, tidy_markdown};
use crate::diagram::marker;
use crate::error::{MdBridgeError, Result};
use crate::frontmatter;
use crate::fs::FileSystem;
use crate::hash::content_hash;
use crate::ledger::Ledger;
use crate::reference::{ReferenceResolver, normalize_path};
use crate::remote::{RemoteClient, RemotePage};
use crate::report::{Direction, Reporter, Stage};

/// How to find a remote page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRef {
    /// By page id
    Id(String),
    /// By exact title in the configured space
    Title(String),
}

/// A page to pull, optionally into a specific workspace path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullTarget {
    /// The remote page
    pub page: PageRef,
    /// Workspace-relative destination; derived from the ledger or the title when unset
    pub path: Option<String>,
}

impl PullTarget {
    /// Pull a page by id.
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            page: PageRef::Id(id.into()),
            path: None,
        }
    }

    /// Pull a page by title.
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            page: PageRef::Title(title.into()),
            path: None,
        }
    }

    /// Write the page to `path`.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for PullTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, &self.page) {
            (Some(path), _) => write!(f, "{}", path),
            (None, PageRef::Id(id)) => write!(f, "page {}", id),
            (None, PageRef::Title(title)) => write!(f, "'{}'", title),
        }
    }
}

/// File name for a page pulled without a known path.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

impl<'a, FS: FileSystem, C: RemoteClient + ?Sized> SyncEngine<'a, FS, C> {
    /// Pull every page the ledger tracks back into its file.
    pub fn pull_tracked(&mut self, reporter: &mut dyn Reporter, options: &SyncOptions) -> Result<RunSummary> {
        let ledger = Ledger::load(self.fs, &self.ledger_path());
        let targets: Vec<PullTarget> = ledger
            .pages
            .iter()
            .map(|(path, state)| PullTarget::id(&state.remote_id).at(path))
            .collect();
        self.pull(&targets, reporter, options)
    }

    /// Pull the given pages into the workspace.
    pub fn pull(
        &mut self,
        targets: &[PullTarget],
        reporter: &mut dyn Reporter,
        options: &SyncOptions,
    ) -> Result<RunSummary> {
        let ledger_path = self.ledger_path();
        let mut ledger = Ledger::load(self.fs, &ledger_path);
        let mut summary = RunSummary::default();
        let mut attachments = AttachmentManager::new(self.client);

        let total = targets.len();
        reporter.on_start(Direction::Pull, total);

        for (i, target) in targets.iter().enumerate() {
            let current = i + 1;
            let label = target.to_string();

            let page = match self.fetch(&target.page) {
                Ok(page) => page,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Failed to fetch {}: {}", label, e);
                    report_failure(reporter, &mut summary, current, total, &label, None, &e);
                    continue;
                }
            };

            let path = self.target_path(&mut ledger, target, &page);
            let missing_locally = !self.fs.exists(&self.local_path(&path));
            if !ledger.needs_pull(
                &path,
                page.version,
                Some(page.modified_at),
                options.force || missing_locally,
            ) {
                log::debug!("{} is up to date with page {}", path, page.id);
                summary.skipped += 1;
                reporter.on_progress(&progress(Stage::Skipped, current, total, &path, None));
                continue;
            }

            reporter.on_progress(&progress(Stage::Converting, current, total, &path, None));
            match self.pull_page(&page, &path, &mut ledger, &mut attachments) {
                Ok(outcome) => {
                    outcome.count(&mut summary);
                    reporter.on_progress(&progress(Stage::Done, current, total, &path, None));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Failed to pull {} into {}: {}", page.id, path, e);
                    report_failure(
                        reporter,
                        &mut summary,
                        current,
                        total,
                        &path,
                        Some(page.title.clone()),
                        &e,
                    );
                }
            }
        }

        ledger.mark_synced(summary.ledger_stats());
        ledger.save(self.fs, &ledger_path)?;
        reporter.on_complete(Direction::Pull, &summary);
        Ok(summary)
    }

    fn fetch(&self, page: &PageRef) -> Result<RemotePage> {
        match page {
            PageRef::Id(id) => self.client.get_by_id(id),
            PageRef::Title(title) => self
                .client
                .find_by_title(&self.config.remote.space_key, title)?
                .ok_or_else(|| {
                    MdBridgeError::Remote(format!(
                        "no page titled '{}' in space {}",
                        title, self.config.remote.space_key
                    ))
                }),
        }
    }

    /// Decide where a page is written, moving its ledger entry when the
    /// requested path differs from the tracked one.
    fn target_path(&self, ledger: &mut Ledger, target: &PullTarget, page: &RemotePage) -> String {
        let tracked = ledger
            .lookup_by_remote_id(&page.id)
            .map(|(path, _)| path.to_string());

        match (target.path.as_deref().map(|p| normalize_path(Path::new(p))), tracked) {
            (Some(wanted), Some(old)) if wanted != old => {
                ledger.resolve_identity(&wanted, Some(&page.id));
                wanted
            }
            (Some(wanted), _) => wanted,
            (None, Some(old)) => old,
            (None, None) => self.new_path(ledger, page),
        }
    }

    fn new_path(&self, ledger: &Ledger, page: &RemotePage) -> String {
        let slug = slugify(&page.title);
        let candidate = format!("{}.md", slug);
        let taken = ledger
            .lookup_by_path(&candidate)
            .is_some_and(|state| state.remote_id != page.id)
            || (ledger.lookup_by_path(&candidate).is_none()
                && self.fs.exists(&self.local_path(&candidate)));
        if taken {
            format!("{}-{}.md", slug, page.id)
        } else {
            candidate
        }
    }

    fn pull_page(
        &self,
        page: &RemotePage,
        path: &str,
        ledger: &mut Ledger,
        attachments: &mut AttachmentManager<'a, C>,
    ) -> Result<Outcome> {
        let local = self.local_path(path);
        let existed = self.fs.exists(&local);

        let existing_frontmatter = if existed {
            let raw = self
                .fs
                .read_to_string(&local)
                .map_err(|e| MdBridgeError::FileRead {
                    path: local.clone(),
                    source: e,
                })?;
            Some(frontmatter::parse_or_empty(&raw)?.frontmatter)
        } else {
            None
        };

        let listed = self.client.list_attachments(&page.id)?;
        let ctx = ReverseContext {
            attachments: &listed,
            existing_frontmatter: existing_frontmatter.as_ref(),
            title: &page.title,
            labels: &page.labels,
        };
        let reversed = self.converter.convert_reverse(&page.body, &ctx)?;

        let decoded = marker::decode(&reversed.markdown);
        if decoded.restored > 0 {
            log::debug!("Restored {} diagram(s) in {}", decoded.restored, path);
        }

        let table = ledger.link_table(&self.config.remote);
        let linked = ReferenceResolver::new(&table).to_local(path, &decoded.markdown);
        let markdown = tidy_markdown(&linked.markdown);

        // Rendered diagrams went back to fences and need no download
        let wanted: Vec<AttachmentLink> = reversed
            .attachments
            .into_iter()
            .filter(|link| markdown.contains(&link.local_path))
            .collect();
        let report = attachments.download_missing(self.fs, &page.id, &self.doc_dir(path), &wanted);
        log::debug!(
            "{}: {} attachment(s) downloaded, {} already present, {} failed",
            path,
            report.downloaded.len(),
            report.skipped,
            report.failed.len()
        );

        let content = frontmatter::serialize(&reversed.frontmatter, &markdown)?;
        if let Some(parent) = local.parent()
            && !parent.as_os_str().is_empty()
        {
            self.fs.create_dir_all(parent)?;
        }
        self.fs
            .write_file(&local, &content)
            .map_err(|e| MdBridgeError::FileWrite {
                path: local.clone(),
                source: e,
            })?;

        ledger.record(
            path,
            &page.id,
            &page.title,
            page.version,
            content_hash(content.as_bytes()),
        );
        Ok(if existed {
            Outcome::Updated
        } else {
            Outcome::Created
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RemoteConfig};
    use crate::diagram::DiagramPipeline;
    use crate::fs::InMemoryFileSystem;
    use crate::remote::{InMemoryRemote, PageDraft};
    use crate::report::NoopReporter;

    fn engine_parts() -> (InMemoryFileSystem, InMemoryRemote, Config) {
        let fs = InMemoryFileSystem::new();
        fs.create_dir_all(Path::new("docs")).unwrap();
        let mut config = Config::new("docs", RemoteConfig::new("https://wiki", "DOC"));
        config.diagrams.enabled_kinds.clear();
        (fs, InMemoryRemote::new(), config)
    }

    fn create(remote: &InMemoryRemote, title: &str, body: &str) -> RemotePage {
        remote
            .create(
                "DOC",
                &PageDraft {
                    title: title.into(),
                    body: body.into(),
                    labels: vec!["guide".into()],
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started: Part 2"), "getting-started-part-2");
        assert_eq!(slugify("???"), "untitled");
    }

    #[test]
    fn test_pull_writes_file_with_frontmatter_and_images() {
        let (fs, remote, config) = engine_parts();
        let page = create(
            &remote,
            "Getting Started",
            "<h1>Getting Started</h1><p><ac:image><ri:attachment ri:filename=\"a.png\" /></ac:image></p>",
        );
        remote.upload_attachment(&page.id, "a.png", b"PNG", "image/png").unwrap();

        let pipeline = DiagramPipeline::new(&config.diagrams, Vec::new()).unwrap();
        let mut engine = SyncEngine::new(&fs, &remote, &config, pipeline).unwrap();
        let summary = engine
            .pull(&[PullTarget::title("Getting Started")], &mut NoopReporter, &SyncOptions::default())
            .unwrap();
        assert_eq!(summary.created, 1);

        let written = fs.read_to_string(Path::new("docs/getting-started.md")).unwrap();
        assert!(written.starts_with("---\ntitle: Getting Started\ntags:\n- guide\n---\n"));
        assert!(written.contains("![](img/a.png)"));
        assert_eq!(fs.read_binary(Path::new("docs/img/a.png")).unwrap(), b"PNG");

        // Unchanged page is skipped on the next run
        let again = engine.pull_tracked(&mut NoopReporter, &SyncOptions::default()).unwrap();
        assert_eq!(again.skipped, 1);
    }

    #[test]
    fn test_pull_preserves_unrelated_frontmatter() {
        let (fs, remote, config) = engine_parts();
        let page = create(&remote, "Notes", "<p>Remote text</p>");
        fs.write_file(Path::new("docs/notes.md"), "---\nsidebar_position: 3\ntitle: Old\n---\n\nLocal\n")
            .unwrap();

        let pipeline = DiagramPipeline::new(&config.diagrams, Vec::new()).unwrap();
        let mut engine = SyncEngine::new(&fs, &remote, &config, pipeline).unwrap();
        let summary = engine
            .pull(&[PullTarget::id(&page.id).at("notes.md")], &mut NoopReporter, &SyncOptions::default())
            .unwrap();
        assert_eq!(summary.updated, 1);

        let written = fs.read_to_string(Path::new("docs/notes.md")).unwrap();
        assert!(written.starts_with("---\nsidebar_position: 3\ntitle: Notes\n"));
        assert!(written.ends_with("Remote text\n"));
    }

    #[test]
    fn test_missing_page_is_recorded_failure() {
        let (fs, remote, config) = engine_parts();
        let pipeline = DiagramPipeline::new(&config.diagrams, Vec::new()).unwrap();
        let mut engine = SyncEngine::new(&fs, &remote, &config, pipeline).unwrap();
        let summary = engine
            .pull(&[PullTarget::id("404")], &mut NoopReporter, &SyncOptions::default())
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].path, "page 404");
        assert_eq!(summary.failures[0].kind, "Remote");
    }
}
