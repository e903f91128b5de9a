//! Deterministic digests for node identity
//!
//! Node ids must survive re-ingestion unchanged, so they are derived from
//! document content coordinates rather than allocation order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the digest in a node id
const NODE_ID_HEX_LEN: usize = 24;

/// SHA256 checksum
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum over several parts, each length-delimited so that
    /// `("ab", "c")` and `("a", "bc")` differ
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading `len` hex characters
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &[u8]) -> bool {
        Self::from_bytes(content) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What anchors a node id inside its document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAnchor<'a> {
    /// The element's identity marker (`structures:id` / `@id`)
    Identity(&'a str),
    /// Positional path from the document root
    Path(&'a str),
}

/// Derive the stable id of a graph node
pub fn node_id(document: &str, anchor: NodeAnchor<'_>) -> String {
    let (kind, value) = match anchor {
        NodeAnchor::Identity(id) => ("id", id),
        NodeAnchor::Path(path) => ("path", path),
    };
    let digest = Checksum::from_parts(&[document, kind, value]);
    format!("{}:{}", document, digest.short(NODE_ID_HEX_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_is_stable() {
        let a = node_id("doc-1", NodeAnchor::Identity("P1"));
        let b = node_id("doc-1", NodeAnchor::Identity("P1"));
        assert_eq!(a, b);
        assert!(a.starts_with("doc-1:"));
    }

    #[test]
    fn test_node_id_separates_anchor_kinds() {
        let by_id = node_id("doc", NodeAnchor::Identity("x"));
        let by_path = node_id("doc", NodeAnchor::Path("x"));
        assert_ne!(by_id, by_path);
        assert_ne!(by_id, node_id("other", NodeAnchor::Identity("x")));
    }

    #[test]
    fn test_parts_are_delimited() {
        assert_ne!(Checksum::from_parts(&["ab", "c"]), Checksum::from_parts(&["a", "bc"]));
    }

    #[test]
    fn test_checksum_verification() {
        let checksum = Checksum::from_bytes(b"<nc:Person/>");
        assert!(checksum.verify(b"<nc:Person/>"));
        assert!(!checksum.verify(b"<nc:Person />"));
    }
}
