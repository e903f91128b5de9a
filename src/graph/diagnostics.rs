//! Diagnostics
//!
//! Non-fatal findings collected while resolving, projecting and validating a
//! batch. Every item names the document and the element path or node id it
//! is about, so a UI can point at the offending spot.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Reference resolution ===
    /// Reference marker whose identity is not declared anywhere in the batch
    UnresolvedReference,
    /// Identity declared by more than one element in the batch
    DuplicateIdentity,

    // === Projection ===
    /// Two flattened paths produced the same key on one node or edge
    PropertyKeyCollision,
    /// Association resolved fewer than two endpoints and became a node
    AssociationDegraded,
    /// Association resolved more than two endpoints; only the first two were used
    ExtraAssociationEndpoints,

    // === Validation ===
    /// Node not reachable from any document root
    OrphanNode,
    /// Node id emitted more than once
    DuplicateNodeId,
    /// Edge endpoint that is not an emitted node
    DanglingEdge,
    /// Document without exactly one root node
    RootViolation,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnresolvedReference => "W101",
            Self::DuplicateIdentity => "W102",
            Self::PropertyKeyCollision => "W201",
            Self::AssociationDegraded => "I202",
            Self::ExtraAssociationEndpoints => "W203",
            Self::OrphanNode => "W301",
            Self::DuplicateNodeId => "E302",
            Self::DanglingEdge => "E303",
            Self::RootViolation => "E304",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DuplicateNodeId | Self::DanglingEdge | Self::RootViolation => Severity::Error,

            Self::UnresolvedReference
            | Self::DuplicateIdentity
            | Self::PropertyKeyCollision
            | Self::ExtraAssociationEndpoints
            | Self::OrphanNode => Severity::Warning,

            Self::AssociationDegraded => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    pub code: DiagnosticCode,
    /// Source document, when the finding is tied to one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Element path or node id the finding is about
    pub subject: String,
    /// Human-readable message
    pub message: String,
    /// Additional context (markers, keys, related ids)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(code: DiagnosticCode, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            document: None,
            subject: subject.into(),
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn in_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {} (", self.code, self.code.severity(), self.message)?;
        if let Some(document) = &self.document {
            write!(f, "{} ", document)?;
        }
        write!(f, "{})", self.subject)?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from one ingestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic item
    pub fn push(&mut self, item: DiagnosticItem) {
        match item.severity() {
            Severity::Info => debug!(code = %item.code, subject = %item.subject, "{}", item.message),
            Severity::Warning | Severity::Error => {
                warn!(code = %item.code, subject = %item.subject, "{}", item.message)
            }
        }
        self.items.push(item);
    }

    /// Reference marker not found in the identity index
    pub fn unresolved_reference(&mut self, document: &str, element_path: &str, marker: &str) {
        self.push(
            DiagnosticItem::new(
                DiagnosticCode::UnresolvedReference,
                element_path,
                format!("reference '{}' does not match any identity in the batch", marker),
            )
            .in_document(document),
        );
    }

    /// Identity declared twice
    pub fn duplicate_identity(&mut self, document: &str, element_path: &str, identity: &str, first: &str) {
        self.push(
            DiagnosticItem::new(
                DiagnosticCode::DuplicateIdentity,
                element_path,
                format!("identity '{}' already declared; first declaration wins", identity),
            )
            .in_document(document)
            .with_context(format!("first declared at {}", first)),
        );
    }

    /// Flattened key already present on the node or edge
    pub fn key_collision(&mut self, document: &str, subject: &str, key: &str, source: &str) {
        self.push(
            DiagnosticItem::new(
                DiagnosticCode::PropertyKeyCollision,
                subject,
                format!("property '{}' already set; keeping the first value", key),
            )
            .in_document(document)
            .with_context(format!("discarded value from {}", source)),
        );
    }

    /// Association kept as a node
    pub fn association_degraded(&mut self, document: &str, element_path: &str, resolved: usize) {
        self.push(
            DiagnosticItem::new(
                DiagnosticCode::AssociationDegraded,
                element_path,
                format!(
                    "association resolved {} endpoint(s); materialized as a node instead of an edge",
                    resolved
                ),
            )
            .in_document(document),
        );
    }

    /// Association with more than two endpoints
    pub fn extra_endpoints(&mut self, document: &str, element_path: &str, resolved: &[String]) {
        let mut item = DiagnosticItem::new(
            DiagnosticCode::ExtraAssociationEndpoints,
            element_path,
            format!(
                "association resolved {} endpoints; only the first two form the edge",
                resolved.len()
            ),
        )
        .in_document(document);
        for ignored in resolved.iter().skip(2) {
            item = item.with_context(format!("ignored endpoint {}", ignored));
        }
        self.push(item);
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    /// Get all errors
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    /// Get all warnings
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Items with a given code
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    /// Count items with a given code
    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.with_code(code).count()
    }

    /// Get all items
    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    /// Get total count
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Count errors
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Count warnings
    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if !self.is_empty() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
