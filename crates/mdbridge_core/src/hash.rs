//! Content hashing: sync fingerprints and content-addressed diagram ids.

use sha2::{Digest, Sha256};

/// Number of hex characters kept in a diagram id.
pub const DIAGRAM_ID_HEX_LEN: usize = 8;

/// SHA-256 fingerprint of file content, hex encoded.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Strip every whitespace character so reformatting does not change identity.
pub fn normalize_source(source: &str) -> String {
    source.chars().filter(|c| !c.is_whitespace()).collect()
}

/// `kind:<first 8 hex of sha256(normalized source)>`
pub fn diagram_id(kind: &str, source: &str) -> String {
    let digest = content_hash(normalize_source(source).as_bytes());
    format!("{}:{}", kind, &digest[..DIAGRAM_ID_HEX_LEN])
}
