use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for mdbridge operations
#[derive(Debug, Error)]
pub enum MdBridgeError {
    // IO errors
    /// Underlying IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A file could not be read
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        /// File being read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// A file could not be written
    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        /// File being written
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    // Serialization errors
    /// Frontmatter YAML did not parse or serialize
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Ledger JSON did not parse or serialize
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Config errors
    /// Config file is not valid TOML for [`Config`](crate::config::Config)
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config could not be written as TOML
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Configuration failed validation; aborts a run before any file
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Pipeline errors
    /// Malformed input for one document
    #[error("Conversion failed for '{path}': {message}")]
    Conversion {
        /// Document being converted
        path: PathBuf,
        /// What was wrong
        message: String,
    },

    /// A diagram renderer is missing or failed
    #[error("Diagram render failed ({kind}): {message}")]
    Render {
        /// Diagram kind
        kind: String,
        /// Renderer output or reason
        message: String,
    },

    /// The remote rejected an attachment
    #[error("Attachment upload failed for '{filename}': {message}")]
    Upload {
        /// Attachment file name
        filename: String,
        /// Reason given by the remote
        message: String,
    },

    /// Ledger file is unreadable or from an unsupported version
    #[error("Sync ledger error: {0}")]
    Ledger(String),

    /// A document link with no known page
    #[error("Unresolvable reference '{0}'")]
    Reference(String),

    // Remote client errors
    /// A remote call failed
    #[error("Remote request failed: {0}")]
    Remote(String),
}

/// Result type alias for mdbridge operations
pub type Result<T> = std::result::Result<T, MdBridgeError>;

impl MdBridgeError {
    /// Build a conversion error for the given source file.
    pub fn conversion(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Conversion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Build a render error for a diagram kind.
    pub fn render(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Build an upload error for an attachment filename.
    pub fn upload(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upload {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MdBridgeError::Config(_)
                | MdBridgeError::ConfigParse(_)
                | MdBridgeError::NoConfigDir
        )
    }
}

/// A serializable representation of MdBridgeError for run reports
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&MdBridgeError> for SerializableError {
    fn from(err: &MdBridgeError) -> Self {
        let kind = match err {
            MdBridgeError::Io(_) => "Io",
            MdBridgeError::FileRead { .. } => "FileRead",
            MdBridgeError::FileWrite { .. } => "FileWrite",
            MdBridgeError::Yaml(_) => "Yaml",
            MdBridgeError::Json(_) => "Json",
            MdBridgeError::ConfigParse(_) => "ConfigParse",
            MdBridgeError::ConfigSerialize(_) => "ConfigSerialize",
            MdBridgeError::NoConfigDir => "NoConfigDir",
            MdBridgeError::Config(_) => "Config",
            MdBridgeError::Conversion { .. } => "Conversion",
            MdBridgeError::Render { .. } => "Render",
            MdBridgeError::Upload { .. } => "Upload",
            MdBridgeError::Ledger(_) => "Ledger",
            MdBridgeError::Reference(_) => "Reference",
            MdBridgeError::Remote(_) => "Remote",
        }
        .to_string();

        let path = match err {
            MdBridgeError::FileRead { path, .. } => Some(path.clone()),
            MdBridgeError::FileWrite { path, .. } => Some(path.clone()),
            MdBridgeError::Conversion { path, .. } => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<MdBridgeError> for SerializableError {
    fn from(err: MdBridgeError) -> Self {
        SerializableError::from(&err)
    }
}

impl MdBridgeError {
    /// Convert to a serializable representation for reports
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}
