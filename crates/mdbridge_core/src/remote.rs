//! Remote page platform interface.
//!
//! The HTTP client itself lives outside this crate; drivers only see the
//! [`RemoteClient`] trait. [`InMemoryRemote`] implements it over plain maps for
//! tests and dry runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::error::{MdBridgeError, Result};

/// A page as returned by the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePage {
    /// Remote page id
    pub id: String,
    /// Page title
    pub title: String,
    /// Monotonic version number
    pub version: u64,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
    /// Body in storage markup
    pub body: String,
    /// Page labels
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Content for a page create or update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageDraft {
    /// Page title
    pub title: String,
    /// Body in storage markup
    pub body: String,
    /// Labels to set
    pub labels: Vec<String>,
    /// Parent page for newly created pages
    pub parent_id: Option<String>,
}

/// A binary attachment on a page. The file name is unique within a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name
    pub filename: String,
    /// MIME type
    pub media_type: String,
    /// Remote identifier or download reference
    pub remote_ref: String,
}

/// Operations the sync drivers need from the remote platform.
pub trait RemoteClient {
    /// Find a page by exact title within a space.
    fn find_by_title(&self, space_key: &str, title: &str) -> Result<Option<RemotePage>>;

    /// Fetch a page with its body.
    fn get_by_id(&self, id: &str) -> Result<RemotePage>;

    /// Create a page.
    fn create(&self, space_key: &str, draft: &PageDraft) -> Result<RemotePage>;

    /// Replace a page's content; `version` is the new version number.
    fn update(&self, id: &str, version: u64, draft: &PageDraft) -> Result<RemotePage>;

    /// Attachments currently on a page.
    fn list_attachments(&self, page_id: &str) -> Result<Vec<Attachment>>;

    /// Add an attachment to a page.
    fn upload_attachment(
        &self,
        page_id: &str,
        filename: &str,
        data: &[u8],
        media_type: &str,
    ) -> Result<Attachment>;

    /// Remove an attachment from a page.
    fn delete_attachment(&self, page_id: &str, attachment: &Attachment) -> Result<()>;

    /// Download an attachment's bytes.
    fn download_attachment(&self, page_id: &str, attachment: &Attachment) -> Result<Vec<u8>>;
}

impl<T: RemoteClient + ?Sized> RemoteClient for &T {
    fn find_by_title(&self, space_key: &str, title: &str) -> Result<Option<RemotePage>> {
        (**self).find_by_title(space_key, title)
    }

    fn get_by_id(&self, id: &str) -> Result<RemotePage> {
        (**self).get_by_id(id)
    }

    fn create(&self, space_key: &str, draft: &PageDraft) -> Result<RemotePage> {
        (**self).create(space_key, draft)
    }

    fn update(&self, id: &str, version: u64, draft: &PageDraft) -> Result<RemotePage> {
        (**self).update(id, version, draft)
    }

    fn list_attachments(&self, page_id: &str) -> Result<Vec<Attachment>> {
        (**self).list_attachments(page_id)
    }

    fn upload_attachment(
        &self,
        page_id: &str,
        filename: &str,
        data: &[u8],
        media_type: &str,
    ) -> Result<Attachment> {
        (**self).upload_attachment(page_id, filename, data, media_type)
    }

    fn delete_attachment(&self, page_id: &str, attachment: &Attachment) -> Result<()> {
        (**self).delete_attachment(page_id, attachment)
    }

    fn download_attachment(&self, page_id: &str, attachment: &Attachment) -> Result<Vec<u8>> {
        (**self).download_attachment(page_id, attachment)
    }
}

#[derive(Debug)]
struct StoredPage {
    space_key: String,
    page: RemotePage,
    attachments: BTreeMap<String, (Attachment, Vec<u8>)>,
}

#[derive(Debug, Default)]
struct RemoteState {
    pages: BTreeMap<String, StoredPage>,
    next_id: u64,
    calls: Vec<String>,
}

/// Map-backed [`RemoteClient`].
///
/// Page ids are sequential (`"1"`, `"2"`, ...). Every call is appended to a
/// call log so tests can assert on traffic.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: RefCell<RemoteState>,
}

impl InMemoryRemote {
    /// Create an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a page directly, bypassing versioning.
    pub fn put_page(&self, space_key: &str, page: RemotePage) {
        let mut state = self.state.borrow_mut();
        let attachments = state
            .pages
            .remove(&page.id)
            .map(|p| p.attachments)
            .unwrap_or_default();
        state.pages.insert(
            page.id.clone(),
            StoredPage {
                space_key: space_key.to_string(),
                page,
                attachments,
            },
        );
    }

    /// Current state of a page.
    pub fn page(&self, id: &str) -> Option<RemotePage> {
        self.state.borrow().pages.get(id).map(|p| p.page.clone())
    }

    /// Stored bytes of an attachment.
    pub fn attachment_data(&self, page_id: &str, filename: &str) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .pages
            .get(page_id)
            .and_then(|p| p.attachments.get(filename))
            .map(|(_, data)| data.clone())
    }

    /// Calls made so far, as `"op:arg"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    fn log(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }

    fn missing(id: &str) -> MdBridgeError {
        MdBridgeError::Remote(format!("page '{}' not found", id))
    }
}

impl RemoteClient for InMemoryRemote {
    fn find_by_title(&self, space_key: &str, title: &str) -> Result<Option<RemotePage>> {
        self.log(format!("find_by_title:{}", title));
        Ok(self
            .state
            .borrow()
            .pages
            .values()
            .find(|p| p.space_key == space_key && p.page.title == title)
            .map(|p| p.page.clone()))
    }

    fn get_by_id(&self, id: &str) -> Result<RemotePage> {
        self.log(format!("get_by_id:{}", id));
        self.page(id).ok_or_else(|| Self::missing(id))
    }

    fn create(&self, space_key: &str, draft: &PageDraft) -> Result<RemotePage> {
        self.log(format!("create:{}", draft.title));
        let mut state = self.state.borrow_mut();
        if state
            .pages
            .values()
            .any(|p| p.space_key == space_key && p.page.title == draft.title)
        {
            return Err(MdBridgeError::Remote(format!(
                "a page titled '{}' already exists",
                draft.title
            )));
        }
        state.next_id += 1;
        let page = RemotePage {
            id: state.next_id.to_string(),
            title: draft.title.clone(),
            version: 1,
            modified_at: Utc::now(),
            body: draft.body.clone(),
            labels: draft.labels.clone(),
        };
        state.pages.insert(
            page.id.clone(),
            StoredPage {
                space_key: space_key.to_string(),
                page: page.clone(),
                attachments: BTreeMap::new(),
            },
        );
        Ok(page)
    }

    fn update(&self, id: &str, version: u64, draft: &PageDraft) -> Result<RemotePage> {
        self.log(format!("update:{}", id));
        let mut state = self.state.borrow_mut();
        let stored = state.pages.get_mut(id).ok_or_else(|| Self::missing(id))?;
        if version <= stored.page.version {
            return Err(MdBridgeError::Remote(format!(
                "version conflict on '{}': {} <= {}",
                id, version, stored.page.version
            )));
        }
        stored.page.title = draft.title.clone();
        stored.page.body = draft.body.clone();
        stored.page.labels = draft.labels.clone();
        stored.page.version = version;
        stored.page.modified_at = Utc::now();
        Ok(stored.page.clone())
    }

    fn list_attachments(&self, page_id: &str) -> Result<Vec<Attachment>> {
        self.log(format!("list_attachments:{}", page_id));
        let state = self.state.borrow();
        let stored = state.pages.get(page_id).ok_or_else(|| Self::missing(page_id))?;
        Ok(stored.attachments.values().map(|(a, _)| a.clone()).collect())
    }

    fn upload_attachment(
        &self,
        page_id: &str,
        filename: &str,
        data: &[u8],
        media_type: &str,
    ) -> Result<Attachment> {
        self.log(format!("upload_attachment:{}", filename));
        let mut state = self.state.borrow_mut();
        let stored = state
            .pages
            .get_mut(page_id)
            .ok_or_else(|| Self::missing(page_id))?;
        if stored.attachments.contains_key(filename) {
            return Err(MdBridgeError::upload(filename, "an attachment with this name exists"));
        }
        let attachment = Attachment {
            filename: filename.to_string(),
            media_type: media_type.to_string(),
            remote_ref: format!("{}/{}", page_id, filename),
        };
        stored
            .attachments
            .insert(filename.to_string(), (attachment.clone(), data.to_vec()));
        Ok(attachment)
    }

    fn delete_attachment(&self, page_id: &str, attachment: &Attachment) -> Result<()> {
        self.log(format!("delete_attachment:{}", attachment.filename));
        let mut state = self.state.borrow_mut();
        let stored = state
            .pages
            .get_mut(page_id)
            .ok_or_else(|| Self::missing(page_id))?;
        stored.attachments.remove(&attachment.filename);
        Ok(())
    }

    fn download_attachment(&self, page_id: &str, attachment: &Attachment) -> Result<Vec<u8>> {
        self.log(format!("download_attachment:{}", attachment.filename));
        self.attachment_data(page_id, &attachment.filename)
            .ok_or_else(|| {
                MdBridgeError::Remote(format!("attachment '{}' not found", attachment.filename))
            })
    }
}
