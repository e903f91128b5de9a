//! Root & Orphan Validation
//!
//! Runs once on the merged delta of a batch:
//! - every node id is emitted once
//! - every edge joins two emitted nodes
//! - every ingested document has exactly one root node
//! - every node is reachable from some root (breadth-first over
//!   containment and association edges)
//!
//! Findings are diagnostics. Orphans fail the batch only in strict mode.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::{DiagnosticCode, DiagnosticItem, Diagnostics, GraphDelta};
use crate::error::{MappingError, Result};

/// Validate a merged delta. `documents` are the ids of the documents that
/// were projected into it.
pub fn validate(delta: &GraphDelta, documents: &[String], strict: bool, diagnostics: &mut Diagnostics) -> Result<()> {
    let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(delta.node_count(), delta.edge_count());
    let mut indices: HashMap<&str, NodeIndex> = HashMap::with_capacity(delta.node_count());

    for node in &delta.nodes {
        if indices.contains_key(node.id.as_str()) {
            diagnostics.push(
                DiagnosticItem::new(DiagnosticCode::DuplicateNodeId, &node.id, "node id emitted more than once")
                    .in_document(&node.document),
            );
            continue;
        }
        indices.insert(&node.id, graph.add_node(&node.id));
    }

    for edge in &delta.edges {
        match (indices.get(edge.source.as_str()), indices.get(edge.target.as_str())) {
            (Some(&source), Some(&target)) => {
                graph.add_edge(source, target, ());
            }
            (source, _) => {
                let missing = if source.is_none() { &edge.source } else { &edge.target };
                diagnostics.push(
                    DiagnosticItem::new(
                        DiagnosticCode::DanglingEdge,
                        format!("{} -> {}", edge.source, edge.target),
                        format!("{} edge '{}' points at a node that was not emitted", edge.kind, edge.label),
                    )
                    .in_document(&edge.document)
                    .with_context(format!("missing node {}", missing)),
                );
            }
        }
    }

    let mut root_counts: HashMap<&str, usize> = documents.iter().map(|d| (d.as_str(), 0)).collect();
    for root in delta.roots() {
        *root_counts.entry(root.document.as_str()).or_insert(0) += 1;
    }
    let mut documents_sorted: Vec<(&str, usize)> = root_counts.into_iter().collect();
    documents_sorted.sort();
    for (document, count) in documents_sorted.into_iter().filter(|(_, count)| *count != 1) {
        diagnostics.push(
            DiagnosticItem::new(
                DiagnosticCode::RootViolation,
                document,
                format!("document has {} root node(s); expected exactly one", count),
            )
            .in_document(document),
        );
    }

    // Reachability from every root
    let mut reached: HashSet<NodeIndex> = HashSet::with_capacity(graph.node_count());
    for root in delta.roots() {
        let Some(&start) = indices.get(root.id.as_str()) else {
            continue;
        };
        if reached.contains(&start) {
            continue;
        }
        let mut bfs = Bfs::new(&graph, start);
        while let Some(visited) = bfs.next(&graph) {
            reached.insert(visited);
        }
    }

    let mut orphans = Vec::new();
    for node in &delta.nodes {
        let Some(&index) = indices.get(node.id.as_str()) else {
            continue;
        };
        if reached.contains(&index) || orphans.contains(&node.id) {
            continue;
        }
        diagnostics.push(
            DiagnosticItem::new(DiagnosticCode::OrphanNode, &node.id, "node is not reachable from any document root")
                .in_document(&node.document)
                .with_context(format!("qname {}", node.qname)),
        );
        orphans.push(node.id.clone());
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        reached = reached.len(),
        orphans = orphans.len(),
        "validated graph"
    );

    if strict && !orphans.is_empty() {
        warn!(orphans = orphans.len(), "strict validation rejected the batch");
        return Err(MappingError::OrphanedNodes {
            count: orphans.len(),
            nodes: orphans,
        });
    }

    Ok(())
}
