#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Attachment uploads and downloads
pub mod attachment;

/// Configuration options
pub mod config;

/// Markdown ↔ storage markup conversion
pub mod convert;

/// Remote platform macro vocabulary
pub mod dialect;

pub mod diagram;

/// Local documents and title resolution
pub mod document;

/// Error (common error types)
pub mod error;

/// Frontmatter parsing and serialization
pub mod frontmatter;

/// Filesystem abstraction
pub mod fs;

/// Content hashes and diagram ids
pub mod hash;

/// Sync ledger (local path ↔ remote page)
pub mod ledger;

/// Storage markup tree, parser and writer
pub mod markup;

/// Link rewriting between local paths and page URLs
pub mod reference;

/// Remote client interface
pub mod remote;

/// Run progress reporting
pub mod report;

/// Workspace scanning
pub mod scan;

/// Push and pull drivers
pub mod sync;
