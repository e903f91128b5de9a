//! Batch Ingestion
//!
//! Runs the full pipeline over a batch of source documents:
//!
//! ```text
//! parse each ──► barrier ──► identity index ──► resolve ──► plan ──► project ──► validate
//! ```
//!
//! Parsing is per document and a malformed document only removes itself from
//! the batch. Everything after the barrier sees the whole batch: identities
//! are indexed across all documents before any reference is resolved, and
//! validation runs on the merged delta.
//!
//! Cancellation is checked between phases and between documents. A cancelled
//! batch returns [`MappingError::Cancelled`] and no delta.

use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::config::MappingConfig;
use crate::document::{parse_document, resolve_references, DocumentFormat, ElementTree, IdentityIndex};
use crate::error::{MappingError, Result};
use crate::graph::{validate, Diagnostics, GraphDelta, ProjectionPlan, Projector};
use crate::schema::{ClassificationTable, SelectionSet};

// =============================================================================
// Input
// =============================================================================

/// One raw document with its identifier
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: String,
    pub format: DocumentFormat,
    pub content: String,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>, format: DocumentFormat, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            format,
            content: content.into(),
        }
    }

    pub fn xml(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, DocumentFormat::Xml, content)
    }

    pub fn json(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, DocumentFormat::Json, content)
    }

    /// Read a document from disk. The id is the file stem; the format comes
    /// from the extension, or from the content when the extension is unknown.
    pub fn from_path(path: &Path) -> Result<Self> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8(bytes).map_err(|e| {
            MappingError::malformed(&id, format!("byte {}", e.utf8_error().valid_up_to()), "invalid UTF-8")
        })?;
        let format = DocumentFormat::from_path(path)
            .or_else(|| DocumentFormat::sniff(&content))
            .ok_or_else(|| MappingError::malformed(&id, "line 1, column 1", "neither XML nor JSON"))?;
        Ok(Self { id, format, content })
    }

    /// Content digest, for callers that deduplicate uploads
    pub fn checksum(&self) -> Checksum {
        Checksum::from_bytes(self.content.as_bytes())
    }
}

/// Documents submitted together; identities resolve across all of them
#[derive(Debug, Clone, Default)]
pub struct Batch {
    documents: Vec<SourceDocument>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, document: SourceDocument) -> Self {
        self.documents.push(document);
        self
    }

    pub fn push(&mut self, document: SourceDocument) {
        self.documents.push(document);
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl FromIterator<SourceDocument> for Batch {
    fn from_iter<T: IntoIterator<Item = SourceDocument>>(iter: T) -> Self {
        Self {
            documents: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Shared flag for aborting a running batch from another thread
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self, phase: &str) -> Result<()> {
        if self.is_cancelled() {
            warn!(phase, "batch cancelled");
            return Err(MappingError::Cancelled);
        }
        Ok(())
    }
}

// =============================================================================
// Output
// =============================================================================

/// A document dropped from the batch because it could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub document: String,
    pub location: String,
    pub message: String,
}

/// Everything one ingestion produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionResult {
    pub delta: GraphDelta,
    pub diagnostics: Diagnostics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DocumentFailure>,
}

impl IngestionResult {
    /// No failures and no error-severity diagnostics
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.diagnostics.has_errors()
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The mapping engine: immutable inputs plus a cancellation handle
#[derive(Debug, Clone)]
pub struct Engine {
    table: ClassificationTable,
    selection: SelectionSet,
    config: MappingConfig,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(table: ClassificationTable, selection: SelectionSet, config: MappingConfig) -> Self {
        Self {
            table,
            selection,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle that cancels batches run by this engine
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn table(&self) -> &ClassificationTable {
        &self.table
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Ingest a single document
    pub fn ingest_document(&self, document: SourceDocument) -> Result<IngestionResult> {
        self.ingest(&Batch::new().with_document(document))
    }

    /// Ingest a batch
    pub fn ingest(&self, batch: &Batch) -> Result<IngestionResult> {
        self.cancel.check("start")?;

        let mut seen = HashSet::new();
        for document in batch.documents() {
            if !seen.insert(document.id.as_str()) {
                return Err(MappingError::DuplicateDocument(document.id.clone()));
            }
        }
        info!(documents = batch.len(), "ingesting batch");

        for qname in self.selection.ineffective_overrides(&self.table) {
            warn!(qname = %qname, "selection override ignored; role is not selectable");
        }

        // Phase 1: parse, per document
        let mut trees: Vec<ElementTree> = Vec::with_capacity(batch.len());
        let mut failures = Vec::new();
        for document in batch.documents() {
            self.cancel.check("parse")?;
            match parse_document(&document.id, &document.content, document.format, &self.config.document) {
                Ok(tree) => {
                    debug!(document = %document.id, elements = tree.len(), "parsed document");
                    trees.push(tree);
                }
                Err(MappingError::MalformedDocument { document, location, message }) => {
                    warn!(document = %document, location = %location, "skipping malformed document: {}", message);
                    failures.push(DocumentFailure { document, location, message });
                }
                Err(e) => return Err(e),
            }
        }

        // Barrier: every tree is parsed before any identity is looked up
        self.cancel.check("resolve")?;
        let mut diagnostics = Diagnostics::new();
        let index = IdentityIndex::build(&trees, &mut diagnostics);
        resolve_references(&mut trees, &index, &mut diagnostics);

        self.cancel.check("plan")?;
        let plan = ProjectionPlan::build(&trees, &index, &self.table, &self.selection, &mut diagnostics);

        let projector = Projector::new(&trees, &plan, &self.table, &self.config.projection);
        let mut delta = GraphDelta::new();
        for position in 0..trees.len() {
            self.cancel.check("project")?;
            delta.merge(projector.project_document(position, &mut diagnostics));
        }

        // Barrier: validation sees the merged delta of the whole batch
        self.cancel.check("validate")?;
        let documents: Vec<String> = trees.iter().map(|t| t.document_id().to_string()).collect();
        validate(&delta, &documents, self.config.validation.strict_orphans, &mut diagnostics)?;

        info!(
            nodes = delta.node_count(),
            edges = delta.edge_count(),
            diagnostics = diagnostics.len(),
            failures = failures.len(),
            "batch ingested"
        );

        Ok(IngestionResult {
            delta,
            diagnostics,
            failures,
        })
    }
}
