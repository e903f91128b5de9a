//! NIEM Graph Mapping
//!
//! Projects NIEM-conformant instance documents (XML or NIEM JSON) into a
//! property graph, driven by a schema-derived classification table and the
//! user's selection of which element kinds become nodes.
//!
//! ## Features
//!
//! - **Classification**: every element qname is an object, association,
//!   property or augmentation; names unknown to the schema are augmentations
//! - **Batch Resolution**: `structures:ref` / `@id` references resolve across
//!   every document of a batch, in any order
//! - **Flattening**: augmentations and unselected objects fold into the
//!   nearest materialized ancestor as prefixed properties
//! - **Association Edges**: binary associations become property-carrying
//!   edges, degrading to nodes when an endpoint is missing
//! - **Deterministic Ids**: node ids are SHA256-derived from document
//!   coordinates, so re-ingesting a document reproduces them
//! - **Validation**: one root per document, every node reachable from a root
//!
//! ## Architecture
//!
//! ```text
//! schema/     ClassificationTable, SelectionSet, Classifier (SchemaIndex -> table)
//! document/   ElementTree (xml, json), IdentityIndex + reference resolution
//! graph/      ProjectionPlan, Projector, validate, Diagnostics, GraphDelta
//! ingest      Engine: parse -> barrier -> resolve -> project -> validate
//! ```

pub mod checksum;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod qname;
pub mod schema;

pub use checksum::Checksum;
pub use config::MappingConfig;
pub use document::{DocumentFormat, ElementTree};
pub use error::{MappingError, Result};
pub use graph::{DiagnosticCode, Diagnostics, EdgeKind, GraphDelta, GraphEdge, GraphNode};
pub use ingest::{Batch, CancellationToken, Engine, IngestionResult, SourceDocument};
pub use schema::{ClassificationEntry, ClassificationTable, Role, SchemaIndex, SelectionSet};
