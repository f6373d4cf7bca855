use std::path::{Path, PathBuf};

use super::{Outcome, RunSummary, SyncEngine, SyncOptions, progress, report_failure};
use crate::attachment::AttachmentManager;
use crate::convert::Converter;
use crate::diagram::{AssetStore, DiagramStats};
use crate::document::Document;
use crate::error::{MdBridgeError, Result};
use crate::frontmatter;
use crate::fs::FileSystem;
use crate::hash::content_hash;
use crate::ledger::Ledger;
use crate::reference::{LinkTable, ReferenceResolver};
use crate::remote::{PageDraft, RemoteClient, RemotePage};
use crate::report::{Direction, Reporter, Stage};
use crate::scan::{ScannedFile, Scanner, WorkspaceScanner};

/// A document whose page is known and whose content is still to be published.
struct Pending<'f> {
    current: usize,
    file: &'f ScannedFile,
    doc: Document,
    hash: String,
    page: RemotePage,
    outcome: Outcome,
}

/// Per-run state shared by every document of a push.
struct PushRun<'r, 'c, C: RemoteClient + ?Sized> {
    links: &'r LinkTable,
    assets: &'r mut AssetStore,
    attachments: &'r mut AttachmentManager<'c, C>,
    diagrams: &'r mut DiagramStats,
}

impl<'a, FS: FileSystem, C: RemoteClient + ?Sized> SyncEngine<'a, FS, C> {
    /// Push every markdown file in the workspace.
    pub fn push(&mut self, reporter: &mut dyn Reporter, options: &SyncOptions) -> Result<RunSummary> {
        let scanner = WorkspaceScanner::new(self.fs, &self.config.workspace);
        self.push_with(&scanner, reporter, options)
    }

    /// Push the documents yielded by `scanner`.
    ///
    /// Pages are resolved (or created) for every changed document before any
    /// content is published, so links between documents new in this run
    /// resolve. Ledger entries for files the scanner no longer yields are
    /// pruned.
    pub fn push_with(
        &mut self,
        scanner: &dyn Scanner,
        reporter: &mut dyn Reporter,
        options: &SyncOptions,
    ) -> Result<RunSummary> {
        let files = scanner.scan()?;
        let ledger_path = self.ledger_path();
        let mut ledger = Ledger::load(self.fs, &ledger_path);
        let mut summary = RunSummary::default();

        let total = files.len();
        reporter.on_start(Direction::Push, total);

        let mut pending = Vec::new();
        for (i, file) in files.iter().enumerate() {
            let current = i + 1;
            let hash = content_hash(file.raw.as_bytes());

            if !ledger.needs_push(&file.path, &hash, options.force) {
                log::debug!("{} unchanged since last sync", file.path);
                summary.skipped += 1;
                reporter.on_progress(&progress(Stage::Skipped, current, total, &file.path, None));
                continue;
            }

            let doc = Document::from_parts(&file.path, file.frontmatter.clone(), file.body.clone());
            match self.ensure_page(file, &doc, &mut ledger) {
                Ok((page, outcome)) => pending.push(Pending {
                    current,
                    file,
                    doc,
                    hash,
                    page,
                    outcome,
                }),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Failed to push {}: {}", file.path, e);
                    let title = Some(doc.title.clone());
                    report_failure(reporter, &mut summary, current, total, &file.path, title, &e);
                }
            }
        }

        let mut links = ledger.link_table(&self.config.remote);
        for item in &pending {
            links.insert(item.file.path.clone(), self.config.remote.page_url(&item.page.id));
        }

        let mut assets = AssetStore::new();
        let mut attachments = AttachmentManager::new(self.client);
        for item in &pending {
            let path = &item.file.path;
            reporter.on_progress(&progress(Stage::Converting, item.current, total, path, None));

            let mut run = PushRun {
                links: &links,
                assets: &mut assets,
                attachments: &mut attachments,
                diagrams: &mut summary.diagrams,
            };
            match self.publish(item, &mut run) {
                Ok(updated) => {
                    ledger.record(path, &updated.id, &updated.title, updated.version, &item.hash);
                    item.outcome.count(&mut summary);
                    reporter.on_progress(&progress(Stage::Done, item.current, total, path, None));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Failed to push {}: {}", path, e);
                    let title = Some(item.doc.title.clone());
                    report_failure(reporter, &mut summary, item.current, total, path, title, &e);
                }
            }
        }

        let existing: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        let pruned = ledger.prune_orphans(&existing);
        if !pruned.is_empty() {
            log::info!("Dropped {} ledger entries for deleted files", pruned.len());
        }

        ledger.mark_synced(summary.ledger_stats());
        ledger.save(self.fs, &ledger_path)?;
        reporter.on_complete(Direction::Push, &summary);
        Ok(summary)
    }

    /// Find the page a document maps to, creating an empty one when none exists.
    fn ensure_page(
        &self,
        file: &ScannedFile,
        doc: &Document,
        ledger: &mut Ledger,
    ) -> Result<(RemotePage, Outcome)> {
        let space = &self.config.remote.space_key;

        let tracked = ledger.lookup_by_path(&file.path).map(|s| s.remote_id.clone());
        let existing = match tracked {
            Some(id) => match self.client.get_by_id(&id) {
                Ok(page) => Some(page),
                Err(e) => {
                    log::warn!(
                        "Tracked page {} for {} unavailable ({}); looking up by title",
                        id,
                        file.path,
                        e
                    );
                    self.client.find_by_title(space, &doc.title)?
                }
            },
            None => self.client.find_by_title(space, &doc.title)?,
        };

        if let Some(page) = existing {
            ledger.resolve_identity(&file.path, Some(&page.id));
            return Ok((page, Outcome::Updated));
        }

        // A document that cannot convert must not leave an empty page behind
        self.converter
            .convert_forward(Path::new(&file.path), &doc.body)?;

        // Created empty first so attachments have a page to live on
        let draft = PageDraft {
            title: doc.title.clone(),
            body: String::new(),
            labels: frontmatter::get_string_array(&doc.frontmatter, "tags"),
            parent_id: self.config.remote.parent_page_id.clone(),
        };
        let page = self.client.create(space, &draft)?;
        log::info!("Created page '{}' ({}) for {}", page.title, page.id, file.path);
        Ok((page, Outcome::Created))
    }

    /// Convert a document and replace its page's content.
    fn publish(&mut self, item: &Pending<'_>, run: &mut PushRun<'_, 'a, C>) -> Result<RemotePage> {
        let path = &item.file.path;
        let page = &item.page;

        let linked = ReferenceResolver::new(run.links).to_remote(path, &item.doc.body);
        for err in linked.unresolved.iter().cloned().map(MdBridgeError::Reference) {
            log::warn!("{}: {}; link left unchanged", path, err);
        }

        let diagrams = self
            .pipeline
            .process(&page.id, &linked.markdown, run.assets, run.attachments);
        run.diagrams.merge(&diagrams.stats);

        let forward = self
            .converter
            .convert_forward(Path::new(path), &diagrams.markdown)?;

        for image in &forward.images {
            if run.attachments.is_uploaded(&page.id, &image.filename) {
                continue;
            }
            let local = self.image_path(path, &image.source);
            if let Err(e) = run
                .attachments
                .upload_file(self.fs, &page.id, &local, &image.filename)
            {
                log::warn!("{}: skipping image {}: {}", path, image.source, e);
            }
        }

        let draft = PageDraft {
            title: item.doc.title.clone(),
            body: forward.markup,
            labels: frontmatter::get_string_array(&item.doc.frontmatter, "tags"),
            parent_id: None,
        };
        let updated = self.client.update(&page.id, page.version + 1, &draft)?;
        log::debug!("{} is now version {} of page {}", path, updated.version, updated.id);
        Ok(updated)
    }

    /// Local file behind an image destination written in `doc_path`.
    fn image_path(&self, doc_path: &str, source: &str) -> PathBuf {
        let decoded = urlencoding::decode(source)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| source.to_string());
        match decoded.strip_prefix('/') {
            Some(rooted) => self.config.workspace.join(rooted),
            None => self.doc_dir(doc_path).join(decoded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RemoteConfig};
    use crate::diagram::DiagramPipeline;
    use crate::fs::InMemoryFileSystem;
    use crate::remote::{Attachment, InMemoryRemote};
    use crate::report::NoopReporter;

    /// Every call fails as if credentials were never configured.
    struct Unauthorized;

    impl Unauthorized {
        fn err<T>() -> Result<T> {
            Err(MdBridgeError::Config("no credentials for remote".into()))
        }
    }

    impl RemoteClient for Unauthorized {
        fn find_by_title(&self, _: &str, _: &str) -> Result<Option<RemotePage>> {
            Self::err()
        }
        fn get_by_id(&self, _: &str) -> Result<RemotePage> {
            Self::err()
        }
        fn create(&self, _: &str, _: &PageDraft) -> Result<RemotePage> {
            Self::err()
        }
        fn update(&self, _: &str, _: u64, _: &PageDraft) -> Result<RemotePage> {
            Self::err()
        }
        fn list_attachments(&self, _: &str) -> Result<Vec<Attachment>> {
            Self::err()
        }
        fn upload_attachment(&self, _: &str, _: &str, _: &[u8], _: &str) -> Result<Attachment> {
            Self::err()
        }
        fn delete_attachment(&self, _: &str, _: &Attachment) -> Result<()> {
            Self::err()
        }
        fn download_attachment(&self, _: &str, _: &Attachment) -> Result<Vec<u8>> {
            Self::err()
        }
    }

    fn config() -> Config {
        let mut config = Config::new("docs", RemoteConfig::new("https://wiki", "DOC"));
        config.diagrams.enabled_kinds.clear();
        config
    }

    #[test]
    fn test_push_creates_then_skips_unchanged() {
        let fs = InMemoryFileSystem::with_files(vec![("docs/a.md", "# Alpha\n\nHello.\n")]);
        let remote = InMemoryRemote::new();
        let config = config();
        let pipeline = DiagramPipeline::new(&config.diagrams, Vec::new()).unwrap();
        let mut engine = SyncEngine::new(&fs, &remote, &config, pipeline).unwrap();

        let first = engine.push(&mut NoopReporter, &SyncOptions::default()).unwrap();
        assert_eq!((first.created, first.updated, first.skipped), (1, 0, 0));
        let page = remote.page("1").unwrap();
        assert_eq!(page.title, "Alpha");
        assert!(page.body.contains("<p>Hello.</p>"));

        let second = engine.push(&mut NoopReporter, &SyncOptions::default()).unwrap();
        assert_eq!((second.created, second.updated, second.skipped), (0, 0, 1));

        let forced = engine
            .push(&mut NoopReporter, &SyncOptions { force: true })
            .unwrap();
        assert_eq!(forced.updated, 1);
    }

    #[test]
    fn test_push_uploads_local_images_relative_to_document() {
        let fs = InMemoryFileSystem::with_files(vec![
            ("docs/guide/a.md", "![shot](./img/shot.png)\n"),
            ("docs/guide/img/shot.png", "PNG"),
        ]);
        let remote = InMemoryRemote::new();
        let config = config();
        let pipeline = DiagramPipeline::new(&config.diagrams, Vec::new()).unwrap();
        let mut engine = SyncEngine::new(&fs, &remote, &config, pipeline).unwrap();

        let summary = engine.push(&mut NoopReporter, &SyncOptions::default()).unwrap();
        assert!(summary.is_success());
        assert_eq!(remote.attachment_data("1", "shot.png").unwrap(), b"PNG");
        assert!(remote.page("1").unwrap().body.contains("ri:filename=\"shot.png\""));
    }

    #[test]
    fn test_failing_file_does_not_stop_run() {
        let fs = InMemoryFileSystem::with_files(vec![
            ("docs/a.md", ":::note\nnever closed\n"),
            ("docs/b.md", "# Fine\n"),
        ]);
        let remote = InMemoryRemote::new();
        let config = config();
        let pipeline = DiagramPipeline::new(&config.diagrams, Vec::new()).unwrap();
        let mut engine = SyncEngine::new(&fs, &remote, &config, pipeline).unwrap();

        let summary = engine.push(&mut NoopReporter, &SyncOptions::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.failures[0].path, "a.md");
        assert_eq!(summary.failures[0].kind, "Conversion");
        assert!(remote.find_by_title("DOC", "A").unwrap().is_none());

        let ledger = Ledger::load(&fs, &config.ledger_path());
        assert!(ledger.lookup_by_path("a.md").is_none());
        assert!(ledger.lookup_by_path("b.md").is_some());
    }

    #[test]
    fn test_invalid_config_aborts_before_any_file() {
        let fs = InMemoryFileSystem::with_files(vec![("docs/a.md", "# A\n")]);
        let remote = InMemoryRemote::new();
        let mut config = config();
        config.remote.base_url.clear();
        let pipeline = DiagramPipeline::new(&config.diagrams, Vec::new()).unwrap();
        assert!(SyncEngine::new(&fs, &remote, &config, pipeline).is_err());
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_configuration_error_mid_run_aborts() {
        let fs = InMemoryFileSystem::with_files(vec![("docs/a.md", "# A\n"), ("docs/b.md", "# B\n")]);
        let config = config();
        let pipeline = DiagramPipeline::new(&config.diagrams, Vec::new()).unwrap();
        let mut engine = SyncEngine::new(&fs, &Unauthorized, &config, pipeline).unwrap();

        let err = engine
            .push(&mut NoopReporter, &SyncOptions::default())
            .unwrap_err();
        assert!(matches!(err, MdBridgeError::Config(_)));
        assert!(!fs.exists(&config.ledger_path()));
    }
}
