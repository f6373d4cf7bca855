//! Page attachment uploads and downloads.
//!
//! Uploads are keyed by `(page id, file name)`. The first upload of a name in
//! a run replaces any remote copy of that name; later uploads of the same key
//! reuse the cached result.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::convert::AttachmentLink;
use crate::error::{MdBridgeError, Result};
use crate::fs::FileSystem;
use crate::remote::{Attachment, RemoteClient};

/// MIME type guessed from a file extension.
pub fn media_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Outcome of [`AttachmentManager::download_missing`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Files written
    pub downloaded: Vec<PathBuf>,
    /// Files already present locally
    pub skipped: usize,
    /// `(filename, message)` for downloads that failed
    pub failed: Vec<(String, String)>,
}

/// Uploads and downloads attachments through a [`RemoteClient`].
pub struct AttachmentManager<'c, C: RemoteClient + ?Sized> {
    client: &'c C,
    listed: HashMap<String, Vec<Attachment>>,
    uploaded: HashMap<(String, String), Attachment>,
}

impl<'c, C: RemoteClient + ?Sized> AttachmentManager<'c, C> {
    /// Create a manager with an empty upload cache.
    pub fn new(client: &'c C) -> Self {
        Self {
            client,
            listed: HashMap::new(),
            uploaded: HashMap::new(),
        }
    }

    /// Whether `(page_id, filename)` was uploaded during this run.
    pub fn is_uploaded(&self, page_id: &str, filename: &str) -> bool {
        self.uploaded
            .contains_key(&(page_id.to_string(), filename.to_string()))
    }

    /// Upload `data` as `filename`, replacing a stale remote copy.
    pub fn upload(
        &mut self,
        page_id: &str,
        filename: &str,
        data: &[u8],
        media_type: &str,
    ) -> Result<Attachment> {
        let key = (page_id.to_string(), filename.to_string());
        if let Some(cached) = self.uploaded.get(&key) {
            log::debug!("Reusing upload of {} on page {}", filename, page_id);
            return Ok(cached.clone());
        }

        let as_upload_error = |e: MdBridgeError| match e {
            MdBridgeError::Upload { .. } => e,
            other => MdBridgeError::upload(filename, other.to_string()),
        };

        let stale = self
            .existing(page_id)
            .map_err(as_upload_error)?
            .iter()
            .find(|a| a.filename == filename)
            .cloned();
        if let Some(stale) = stale {
            log::debug!("Removing stale attachment {} from page {}", filename, page_id);
            self.client
                .delete_attachment(page_id, &stale)
                .map_err(as_upload_error)?;
            if let Some(list) = self.listed.get_mut(page_id) {
                list.retain(|a| a.filename != filename);
            }
        }

        let attachment = self
            .client
            .upload_attachment(page_id, filename, data, media_type)
            .map_err(as_upload_error)?;
        log::info!("Uploaded {} to page {}", filename, page_id);

        if let Some(list) = self.listed.get_mut(page_id) {
            list.push(attachment.clone());
        }
        self.uploaded.insert(key, attachment.clone());
        Ok(attachment)
    }

    /// Upload a workspace file under `filename`.
    pub fn upload_file<FS: FileSystem>(
        &mut self,
        fs: &FS,
        page_id: &str,
        path: &Path,
        filename: &str,
    ) -> Result<Attachment> {
        let data = fs
            .read_binary(path)
            .map_err(|e| MdBridgeError::upload(filename, format!("{}: {}", path.display(), e)))?;
        self.upload(page_id, filename, &data, media_type_for(filename))
    }

    /// Download every linked attachment that is not already present under
    /// `doc_dir`. Individual failures are reported, not returned. A link whose
    /// path would leave `doc_dir` is refused.
    pub fn download_missing<FS: FileSystem>(
        &mut self,
        fs: &FS,
        page_id: &str,
        doc_dir: &Path,
        links: &[AttachmentLink],
    ) -> DownloadReport {
        let mut report = DownloadReport::default();

        for link in links {
            let relative = urlencoding::decode(&link.local_path)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| link.local_path.clone());
            let contained = Path::new(&relative)
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
            if !contained {
                log::warn!(
                    "Refusing to write attachment {} to '{}' outside {}",
                    link.attachment.filename,
                    relative,
                    doc_dir.display()
                );
                report.failed.push((
                    link.attachment.filename.clone(),
                    format!("'{}' is outside the document directory", relative),
                ));
                continue;
            }
            let target = doc_dir.join(relative);

            if fs.exists(&target) {
                report.skipped += 1;
                continue;
            }

            let result = self
                .client
                .download_attachment(page_id, &link.attachment)
                .and_then(|data| {
                    if let Some(parent) = target.parent() {
                        fs.create_dir_all(parent)?;
                    }
                    fs.write_binary(&target, &data)?;
                    Ok(())
                });

            match result {
                Ok(()) => {
                    log::debug!("Downloaded {}", target.display());
                    report.downloaded.push(target);
                }
                Err(e) => {
                    log::warn!("Failed to download {}: {}", link.attachment.filename, e);
                    report
                        .failed
                        .push((link.attachment.filename.clone(), e.to_string()));
                }
            }
        }
        report
    }

    fn existing(&mut self, page_id: &str) -> Result<&Vec<Attachment>> {
        if !self.listed.contains_key(page_id) {
            let list = self.client.list_attachments(page_id)?;
            self.listed.insert(page_id.to_string(), list);
        }
        self.listed
            .get(page_id)
            .ok_or_else(|| MdBridgeError::Remote(format!("no attachment list for {}", page_id)))
    }
}
