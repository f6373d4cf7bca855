//! Configuration types for mdbridge.
//!
//! This module provides the [`Config`] struct and the per-component records
//! it is made of. Configuration is persisted as TOML (typically at
//! `~/.config/mdbridge/config.toml` on Unix systems).
//!
//! # Sections
//!
//! - `[remote]`: platform base URL, space key, page URL template
//! - `[diagrams]`: renderer timeout, temp directory, enabled kinds
//! - `[converter]`: dialect, typographic punctuation, image directory
//!
//! # Example
//!
//! ```toml
//! workspace = "docs"
//!
//! [remote]
//! base_url = "https://wiki.example.com"
//! space_key = "DOC"
//!
//! [diagrams]
//! renderer_timeout_ms = 20000
//! enabled_kinds = ["mermaid", "graphviz"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dialect::DialectName;
use crate::diagram::DiagramKind;
use crate::error::{MdBridgeError, Result};
use crate::fs::FileSystem;

/// Default ledger file name, relative to the workspace.
pub const DEFAULT_LEDGER_FILE: &str = ".mdbridge-ledger.json";

/// Where pages live on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Platform base URL (e.g., "https://wiki.example.com")
    pub base_url: String,

    /// Space that pages are created in
    pub space_key: String,

    /// Public page URL; `{base_url}`, `{space_key}` and `{id}` are substituted
    #[serde(default = "default_page_url_template")]
    pub page_url_template: String,

    /// Parent page for newly created pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_page_id: Option<String>,
}

fn default_page_url_template() -> String {
    "{base_url}/pages/viewpage.action?pageId={id}".to_string()
}

impl RemoteConfig {
    /// Create a remote config with the default URL template.
    pub fn new(base_url: impl Into<String>, space_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            space_key: space_key.into(),
            page_url_template: default_page_url_template(),
            parent_page_id: None,
        }
    }

    /// Public URL of a page.
    pub fn page_url(&self, remote_id: &str) -> String {
        self.page_url_template
            .replace("{base_url}", self.base_url.trim_end_matches('/'))
            .replace("{space_key}", &self.space_key)
            .replace("{id}", remote_id)
    }
}

/// Diagram pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramConfig {
    /// Deadline for one renderer invocation
    pub renderer_timeout_ms: u64,

    /// Directory for render scratch files (system temp dir when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Diagram kinds to render; other fences stay code blocks
    pub enabled_kinds: Vec<DiagramKind>,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            renderer_timeout_ms: 30_000,
            temp_dir: None,
            enabled_kinds: DiagramKind::ALL.to_vec(),
        }
    }
}

/// Converter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Macro vocabulary of the remote platform
    pub dialect: DialectName,

    /// Typographic quotes and dashes in forward conversion
    pub smart_punctuation: bool,

    /// Directory (relative to each document) for pulled images
    pub image_dir: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            dialect: DialectName::default(),
            smart_punctuation: true,
            image_dir: "img".to_string(),
        }
    }
}

/// `Config` is the complete, validated set of mdbridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the markdown tree
    pub workspace: PathBuf,

    /// Ledger file, relative to the workspace unless absolute
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,

    /// Remote platform settings
    pub remote: RemoteConfig,

    /// Diagram pipeline settings
    #[serde(default)]
    pub diagrams: DiagramConfig,

    /// Converter settings
    #[serde(default)]
    pub converter: ConverterConfig,
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from(DEFAULT_LEDGER_FILE)
}

impl Config {
    /// Create a config with default component settings.
    pub fn new(workspace: impl Into<PathBuf>, remote: RemoteConfig) -> Self {
        Self {
            workspace: workspace.into(),
            ledger_file: default_ledger_file(),
            remote,
            diagrams: DiagramConfig::default(),
            converter: ConverterConfig::default(),
        }
    }

    /// Absolute or workspace-joined ledger location.
    pub fn ledger_path(&self) -> PathBuf {
        self.workspace.join(&self.ledger_file)
    }

    /// Check the settings every run depends on.
    pub fn validate(&self) -> Result<()> {
        let base = self.remote.base_url.trim();
        if base.is_empty() {
            return Err(MdBridgeError::Config("remote.base_url is not set".into()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(MdBridgeError::Config(format!(
                "remote.base_url must be an http(s) URL, got '{}'",
                base
            )));
        }
        if self.remote.space_key.trim().is_empty() {
            return Err(MdBridgeError::Config("remote.space_key is not set".into()));
        }
        if !self.remote.page_url_template.contains("{id}") {
            return Err(MdBridgeError::Config(
                "remote.page_url_template must contain {id}".into(),
            ));
        }
        if self.diagrams.renderer_timeout_ms == 0 {
            return Err(MdBridgeError::Config(
                "diagrams.renderer_timeout_ms must be positive".into(),
            ));
        }
        let image_dir = Path::new(&self.converter.image_dir);
        if self.converter.image_dir.is_empty()
            || image_dir.is_absolute()
            || image_dir
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(MdBridgeError::Config(format!(
                "converter.image_dir must be a relative directory inside the document folder, got '{}'",
                self.converter.image_dir
            )));
        }
        Ok(())
    }

    /// Load config from a specific path using a FileSystem.
    pub fn load_from<FS: FileSystem>(fs: &FS, path: &Path) -> Result<Self> {
        let contents = fs
            .read_to_string(path)
            .map_err(|e| MdBridgeError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path using a FileSystem.
    pub fn save_to<FS: FileSystem>(&self, fs: &FS, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs.create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs.write_file(path, &contents)
            .map_err(|e| MdBridgeError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(())
    }
}

// ============================================================================
// Native-only implementation (not available in WASM)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/mdbridge/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mdbridge").join("config.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let path = Self::config_path().ok_or(MdBridgeError::NoConfigDir)?;
        Self::load_from(&crate::fs::RealFileSystem, &path)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(MdBridgeError::NoConfigDir)?;
        self.save_to(&crate::fs::RealFileSystem, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFileSystem;

    fn valid() -> Config {
        Config::new("docs", RemoteConfig::new("https://wiki.example.com/", "DOC"))
    }

    #[test]
    fn test_minimal_toml_gets_defaults() {
        let fs = InMemoryFileSystem::with_files(vec![(
            "config.toml",
            "workspace = \"docs\"\n\n[remote]\nbase_url = \"https://wiki.example.com\"\nspace_key = \"DOC\"\n",
        )]);
        let config = Config::load_from(&fs, Path::new("config.toml")).unwrap();
        assert_eq!(config.diagrams, DiagramConfig::default());
        assert_eq!(config.converter.image_dir, "img");
        assert_eq!(config.ledger_path(), PathBuf::from("docs/.mdbridge-ledger.json"));
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_reload() {
        let fs = InMemoryFileSystem::new();
        let mut config = valid();
        config.diagrams.enabled_kinds = vec![DiagramKind::Graphviz];
        config.converter.dialect = DialectName::ConfluenceWiki;
        config.save_to(&fs, Path::new("cfg/config.toml")).unwrap();

        let loaded = Config::load_from(&fs, Path::new("cfg/config.toml")).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_page_url_template() {
        let remote = RemoteConfig::new("https://wiki.example.com/", "DOC");
        assert_eq!(
            remote.page_url("42"),
            "https://wiki.example.com/pages/viewpage.action?pageId=42"
        );
    }

    #[test]
    fn test_validation_errors_are_config_errors() {
        let mut missing_key = valid();
        missing_key.remote.space_key = " ".into();
        let err = missing_key.validate().unwrap_err();
        assert!(err.is_fatal());

        let mut bad_url = valid();
        bad_url.remote.base_url = "wiki.example.com".into();
        assert!(matches!(bad_url.validate(), Err(MdBridgeError::Config(_))));

        let mut escaping = valid();
        escaping.converter.image_dir = "../img".into();
        assert!(escaping.validate().is_err());

        let mut zero = valid();
        zero.diagrams.renderer_timeout_ms = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_unknown_diagram_kind_rejected() {
        let result: std::result::Result<DiagramConfig, _> =
            toml::from_str("enabled_kinds = [\"visio\"]");
        assert!(result.is_err());
    }
}
