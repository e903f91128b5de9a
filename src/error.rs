//! Error types for the mapping engine
//!
//! Only fatal conditions live here. Non-fatal findings (unresolved
//! references, key collisions, orphans in warn mode) are collected as
//! [`crate::graph::Diagnostics`] and travel with the ingestion result.

use thiserror::Error;

/// Result type for mapping operations
pub type Result<T> = std::result::Result<T, MappingError>;

/// Fatal mapping errors
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Malformed document {document} at {location}: {message}")]
    MalformedDocument {
        document: String,
        location: String,
        message: String,
    },

    #[error("Document identifier submitted twice in one batch: {0}")]
    DuplicateDocument(String),

    #[error("Strict validation failed: {count} node(s) unreachable from any document root")]
    OrphanedNodes { count: usize, nodes: Vec<String> },

    #[error("Batch ingestion cancelled")]
    Cancelled,

    #[error("Invalid qualified name: {0}")]
    InvalidQName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl MappingError {
    /// Build a `MalformedDocument` error
    pub fn malformed(
        document: impl Into<String>,
        location: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::MalformedDocument {
            document: document.into(),
            location: location.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error only affects the document that raised it
    pub fn is_document_scoped(&self) -> bool {
        matches!(self, Self::MalformedDocument { .. })
    }
}
