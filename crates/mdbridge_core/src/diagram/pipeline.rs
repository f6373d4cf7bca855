use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::extract::{DiagramBlock, DiagramKindConfig, extract};
use super::marker;
use super::renderer::{CommandRenderer, DiagramRenderer};
use super::DiagramKind;
use crate::attachment::AttachmentManager;
use crate::config::DiagramConfig;
use crate::error::{MdBridgeError, Result};
use crate::remote::RemoteClient;

const SVG_MEDIA_TYPE: &str = "image/svg+xml";

/// A rendered and uploaded diagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAsset {
    /// Content-addressed diagram id
    pub diagram_id: String,
    /// Attachment file name
    pub filename: String,
    /// Rendered SVG on disk, valid for the pipeline's lifetime
    pub local_image_path: PathBuf,
    /// Remote reference returned by the upload
    pub remote_attachment_ref: String,
    /// MIME type of the rendered image
    pub media_type: String,
}

/// Rendered assets of one run, keyed by `(scope, content id)`.
///
/// The scope is the remote page id: the same diagram on two pages is
/// uploaded to each page once.
#[derive(Debug, Default)]
pub struct AssetStore {
    assets: HashMap<(String, String), RenderedAsset>,
}

impl AssetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an asset.
    pub fn get(&self, scope: &str, content_id: &str) -> Option<&RenderedAsset> {
        self.assets
            .get(&(scope.to_string(), content_id.to_string()))
    }

    /// Record an asset under its diagram id.
    pub fn insert(&mut self, scope: &str, asset: RenderedAsset) {
        self.assets
            .insert((scope.to_string(), asset.diagram_id.clone()), asset);
    }

    /// Number of stored assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Counts for one diagram kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// Diagrams found
    pub total: usize,
    /// Diagrams rendered (or reused) and embedded
    pub processed: usize,
    /// Diagrams left as annotated fences
    pub failed: usize,
}

/// Diagram counts overall and per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagramStats {
    /// Diagrams found
    pub total: usize,
    /// Diagrams rendered (or reused) and embedded
    pub processed: usize,
    /// Diagrams left as annotated fences
    pub failed: usize,
    /// Breakdown by kind
    pub by_kind: BTreeMap<DiagramKind, KindStats>,
}

impl DiagramStats {
    fn record(&mut self, kind: DiagramKind, ok: bool) {
        let entry = self.by_kind.entry(kind).or_default();
        self.total += 1;
        entry.total += 1;
        if ok {
            self.processed += 1;
            entry.processed += 1;
        } else {
            self.failed += 1;
            entry.failed += 1;
        }
    }

    /// Add another set of counts into this one.
    pub fn merge(&mut self, other: &DiagramStats) {
        self.total += other.total;
        self.processed += other.processed;
        self.failed += other.failed;
        for (kind, stats) in &other.by_kind {
            let entry = self.by_kind.entry(*kind).or_default();
            entry.total += stats.total;
            entry.processed += stats.processed;
            entry.failed += stats.failed;
        }
    }
}

/// Result of running the pipeline over one document.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    /// Markdown with diagrams embedded or annotated
    pub markdown: String,
    /// Attachment names uploaded (or reused) for this page
    pub attachments: Vec<String>,
    /// Counts for this document
    pub stats: DiagramStats,
}

/// Renders, uploads and embeds diagrams.
pub struct DiagramPipeline {
    kinds: Vec<DiagramKindConfig>,
    renderers: Vec<Box<dyn DiagramRenderer>>,
    availability: HashMap<DiagramKind, bool>,
    work_dir: tempfile::TempDir,
}

impl DiagramPipeline {
    /// Build a pipeline with the given renderers for the enabled kinds.
    pub fn new(config: &DiagramConfig, renderers: Vec<Box<dyn DiagramRenderer>>) -> Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("mdbridge-diagrams-");
            b
        };
        let work_dir = match &config.temp_dir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };

        Ok(Self {
            kinds: config
                .enabled_kinds
                .iter()
                .copied()
                .map(DiagramKindConfig::new)
                .collect(),
            renderers,
            availability: HashMap::new(),
            work_dir,
        })
    }

    /// Build a pipeline using the standard command-line tools.
    pub fn with_command_renderers(config: &DiagramConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.renderer_timeout_ms);
        let renderers = config
            .enabled_kinds
            .iter()
            .map(|kind| Box::new(CommandRenderer::for_kind(*kind, timeout)) as Box<dyn DiagramRenderer>)
            .collect();
        Self::new(config, renderers)
    }

    /// Find the diagrams this pipeline would process.
    pub fn extract(&self, markdown: &str) -> Vec<DiagramBlock> {
        extract(markdown, &self.kinds)
    }

    /// Process every diagram in `markdown` for the page `page_id`.
    ///
    /// Never fails as a whole: a diagram that cannot be rendered or uploaded
    /// is kept as an annotated fence and counted as failed.
    pub fn process<C: RemoteClient + ?Sized>(
        &mut self,
        page_id: &str,
        markdown: &str,
        assets: &mut AssetStore,
        attachments: &mut AttachmentManager<'_, C>,
    ) -> PipelineOutput {
        let markdown = marker::strip_unprocessed(markdown);
        let blocks = self.extract(&markdown);
        let mut out = PipelineOutput::default();
        let mut cursor = 0;

        for block in &blocks {
            out.markdown.push_str(&markdown[cursor..block.span.start]);
            cursor = block.span.end;

            match self.asset_for(page_id, block, assets, attachments) {
                Ok(asset) => {
                    out.markdown.push_str(&marker::embed(block, &asset.filename));
                    if !out.attachments.contains(&asset.filename) {
                        out.attachments.push(asset.filename);
                    }
                    out.stats.record(block.kind, true);
                }
                Err(e) => {
                    log::warn!("Diagram {} not processed: {}", block.id, e);
                    let original = &markdown[block.span.clone()];
                    out.markdown
                        .push_str(&marker::annotate_unprocessed(block.kind, &e.to_string(), original));
                    out.stats.record(block.kind, false);
                }
            }
        }

        out.markdown.push_str(&markdown[cursor..]);
        out
    }

    fn asset_for<C: RemoteClient + ?Sized>(
        &mut self,
        page_id: &str,
        block: &DiagramBlock,
        assets: &mut AssetStore,
        attachments: &mut AttachmentManager<'_, C>,
    ) -> Result<RenderedAsset> {
        if let Some(asset) = assets.get(page_id, &block.id) {
            log::debug!("Reusing rendered {}", block.id);
            return Ok(asset.clone());
        }

        let filename = marker::asset_filename(&block.id);
        let output = self.work_dir.path().join(&filename);
        if !output.exists() {
            self.render(block, &output)?;
        }

        let data = std::fs::read(&output)?;
        let attachment = attachments.upload(page_id, &filename, &data, SVG_MEDIA_TYPE)?;

        let asset = RenderedAsset {
            diagram_id: block.id.clone(),
            filename,
            local_image_path: output,
            remote_attachment_ref: attachment.remote_ref,
            media_type: SVG_MEDIA_TYPE.to_string(),
        };
        assets.insert(page_id, asset.clone());
        Ok(asset)
    }

    fn render(&mut self, block: &DiagramBlock, output: &Path) -> Result<()> {
        if !self.ensure_available(block.kind) {
            return Err(MdBridgeError::render(
                block.kind.as_str(),
                "renderer unavailable and could not be installed",
            ));
        }
        let renderer = self
            .renderers
            .iter()
            .find(|r| r.kind() == block.kind)
            .ok_or_else(|| MdBridgeError::render(block.kind.as_str(), "no renderer configured"))?;

        // Removed when dropped, whatever the render outcome
        let mut input = tempfile::Builder::new()
            .prefix("diagram-")
            .suffix(&format!(".{}", block.kind))
            .tempfile_in(self.work_dir.path())?;
        input.write_all(block.source.as_bytes())?;
        input.flush()?;

        log::debug!("Rendering {} with {:?}", block.id, input.path());
        let result = renderer.render(input.path(), output).and_then(|()| {
            match std::fs::metadata(output) {
                Ok(meta) if meta.len() > 0 => Ok(()),
                _ => Err(MdBridgeError::render(
                    block.kind.as_str(),
                    "renderer produced no output",
                )),
            }
        });
        if result.is_err() {
            let _ = std::fs::remove_file(output);
        }
        result
    }

    /// Check once per kind per run, trying an install when missing.
    fn ensure_available(&mut self, kind: DiagramKind) -> bool {
        if let Some(known) = self.availability.get(&kind) {
            return *known;
        }
        let available = match self.renderers.iter().find(|r| r.kind() == kind) {
            None => false,
            Some(renderer) if renderer.is_available() => true,
            Some(renderer) => match renderer.install() {
                Ok(()) => renderer.is_available(),
                Err(e) => {
                    log::warn!("Cannot install {} renderer: {}", kind, e);
                    false
                }
            },
        };
        self.availability.insert(kind, available);
        available
    }
}
