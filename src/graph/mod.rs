//! Property Graph Output
//!
//! The engine's output is a [`GraphDelta`]: nodes and edges ready to hand to a
//! storage adapter. Nothing here talks to a database; persistence is the
//! adapter's job.
//!
//! Pipeline inside this module:
//! - [`plan`] decides, per element, whether it becomes a node, an edge, a
//!   reference or flattened content
//! - [`project`] walks the trees and emits nodes, edges and properties
//! - [`validate`] checks root and reachability invariants on the merged delta
//! - [`diagnostics`] collects the non-fatal findings of all three

pub mod diagnostics;
pub mod plan;
pub mod project;
pub mod validate;

pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use plan::{Disposition, ProjectionPlan};
pub use project::Projector;
pub use validate::validate;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::Result;
use crate::qname::QName;

/// Node and edge property values. Lists and nested content are JSON strings.
pub type Properties = BTreeMap<String, String>;

// =============================================================================
// Nodes
// =============================================================================

/// A materialized entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Deterministic id: `<document>:<digest>`
    pub id: String,
    /// Graph label derived from the qname
    pub label: String,
    pub qname: QName,
    /// Source document identifier
    pub document: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub is_document_root: bool,
}

// =============================================================================
// Edges
// =============================================================================

/// Edge kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Structural parent -> child
    Containment,
    /// Projected association element
    Association,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Containment => write!(f, "containment"),
            EdgeKind::Association => write!(f, "association"),
        }
    }
}

/// A directed edge between two node ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub kind: EdgeKind,
    pub source: String,
    pub target: String,
    pub label: String,
    /// Element the edge was projected from
    pub qname: QName,
    pub document: String,
    /// Populated only for association edges
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl GraphEdge {
    pub fn containment(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
        qname: impl Into<QName>,
        document: impl Into<String>,
    ) -> Self {
        Self {
            kind: EdgeKind::Containment,
            source: source.into(),
            target: target.into(),
            label: label.into(),
            qname: qname.into(),
            document: document.into(),
            properties: Properties::new(),
        }
    }
}

// =============================================================================
// Delta
// =============================================================================

/// Nodes and edges produced by one ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDelta {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append another delta
    pub fn merge(&mut self, other: GraphDelta) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes projected from a qname
    pub fn nodes_with_qname<'a>(&'a self, qname: &'a str) -> impl Iterator<Item = &'a GraphNode> {
        self.nodes.iter().filter(move |n| n.qname == qname)
    }

    /// Document root nodes
    pub fn roots(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.is_document_root)
    }

    /// Root node of one document
    pub fn root_of(&self, document: &str) -> Option<&GraphNode> {
        self.roots().find(|n| n.document == document)
    }

    /// Edges of one kind
    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Outgoing edges of a node
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a GraphEdge> {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Export as a GraphViz DOT document
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph NiemGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n");
        output.push('\n');

        // One fill color per document, roots outlined
        let palette = ["#BBDEFB", "#C8E6C9", "#FFE0B2", "#E1BEE7", "#B2EBF2", "#FFCDD2"];
        let mut colors: HashMap<&str, &str> = HashMap::new();

        for node in &self.nodes {
            let next = palette[colors.len() % palette.len()];
            let color = *colors.entry(node.document.as_str()).or_insert(next);
            let peripheries = if node.is_document_root { 2 } else { 1 };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\", peripheries={}];\n",
                escape_dot(&node.id),
                escape_dot(&node.label),
                color,
                peripheries
            ));
        }

        output.push('\n');

        for edge in &self.edges {
            let style = match edge.kind {
                EdgeKind::Containment => "solid",
                EdgeKind::Association => "bold",
            };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\", style={}];\n",
                escape_dot(&edge.source),
                escape_dot(&edge.target),
                escape_dot(&edge.label),
                style
            ));
        }

        output.push_str("}\n");
        output
    }
}

fn escape_dot(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, document: &str, root: bool) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            label: "nc_Person".to_string(),
            qname: "nc:Person".to_string(),
            document: document.to_string(),
            properties: Properties::new(),
            is_document_root: root,
        }
    }

    #[test]
    fn test_merge_and_lookup() {
        let mut a = GraphDelta::new();
        a.nodes.push(node("a:1", "a", true));
        let mut b = GraphDelta::new();
        b.nodes.push(node("b:1", "b", true));
        b.nodes.push(node("b:2", "b", false));
        b.edges.push(GraphEdge::containment("b:1", "b:2", "nc_Person", "nc:Person", "b"));

        a.merge(b);
        assert_eq!(a.node_count(), 3);
        assert_eq!(a.roots().count(), 2);
        assert_eq!(a.root_of("b").unwrap().id, "b:1");
        assert_eq!(a.edges_from("b:1").count(), 1);
        assert_eq!(a.edges_of_kind(EdgeKind::Association).count(), 0);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let mut delta = GraphDelta::new();
        delta.nodes.push(node("a:1", "a", true));
        let json = delta.to_json().unwrap();
        assert!(json.contains("\"isDocumentRoot\": true"));
        assert_eq!(GraphDelta::from_json(&json).unwrap(), delta);
    }

    #[test]
    fn test_to_dot() {
        let mut delta = GraphDelta::new();
        delta.nodes.push(node("a:1", "a", true));
        delta.nodes.push(node("a:2", "a", false));
        delta.edges.push(GraphEdge::containment("a:1", "a:2", "nc_Person", "nc:Person", "a"));

        let dot = delta.to_dot();
        assert!(dot.starts_with("digraph NiemGraph {"));
        assert!(dot.contains("\"a:1\" [label=\"nc_Person\""));
        assert!(dot.contains("peripheries=2"));
        assert!(dot.contains("\"a:1\" -> \"a:2\" [label=\"nc_Person\", style=solid]"));
    }
}
