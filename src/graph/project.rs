//! Graph Projector
//!
//! Walks each resolved tree against a [`ProjectionPlan`] and emits the
//! document's nodes, edges and properties. A node is pushed only after all of
//! its content has been folded in (post-order), so flattened descendants are
//! complete when the node is written.
//!
//! Flattening rules, by the role of the folded element:
//! - leaf: `key = value`, key built from the path below the owner
//! - augmentation: its content lands on the owner with the augmentation
//!   prefix; the augmentation element itself adds no path segment
//! - unselected object: recurse with the element's local name appended
//! - nested content inside an augmentation or an association edge: one
//!   JSON-encoded string
//! - repeated siblings: one JSON-encoded list

use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::HashSet;
use tracing::debug;

use super::plan::{Disposition, ProjectionPlan};
use super::{Diagnostics, EdgeKind, GraphDelta, GraphEdge, GraphNode, Properties};
use crate::config::ProjectionConfig;
use crate::document::{ElementId, ElementTree};
use crate::qname;
use crate::schema::{ClassificationTable, Role};

/// How content below a folded element is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Unselected objects expand into path-prefixed keys
    Plain,
    /// Below an augmentation: prefixed keys, nested objects as JSON
    Augmentation,
    /// Association edge properties: nested objects as JSON
    Collapse,
}

/// Properties of one node or edge under construction
struct PropertySink<'s> {
    subject: &'s str,
    values: Properties,
}

impl<'s> PropertySink<'s> {
    fn new(subject: &'s str) -> Self {
        Self {
            subject,
            values: Properties::new(),
        }
    }

    /// First write wins; later writes are reported
    fn insert(&mut self, key: String, value: String, tree: &ElementTree, source: ElementId, diagnostics: &mut Diagnostics) {
        match self.values.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(slot) => {
                diagnostics.key_collision(tree.document_id(), self.subject, slot.key(), &tree.path(source));
            }
        }
    }
}

/// Emits graph elements for a planned batch
pub struct Projector<'a> {
    trees: &'a [ElementTree],
    plan: &'a ProjectionPlan,
    table: &'a ClassificationTable,
    config: &'a ProjectionConfig,
}

/// Mutable state of one document's walk
struct Walk<'w> {
    position: usize,
    tree: &'w ElementTree,
    delta: GraphDelta,
    diagnostics: &'w mut Diagnostics,
}

impl<'a> Projector<'a> {
    pub fn new(
        trees: &'a [ElementTree],
        plan: &'a ProjectionPlan,
        table: &'a ClassificationTable,
        config: &'a ProjectionConfig,
    ) -> Self {
        Self { trees, plan, table, config }
    }

    /// Project every document, in batch order
    pub fn project_all(&self, diagnostics: &mut Diagnostics) -> GraphDelta {
        let mut delta = GraphDelta::new();
        for position in 0..self.trees.len() {
            delta.merge(self.project_document(position, diagnostics));
        }
        delta
    }

    /// Project one document of the batch
    pub fn project_document(&self, position: usize, diagnostics: &mut Diagnostics) -> GraphDelta {
        let tree = &self.trees[position];
        let mut walk = Walk {
            position,
            tree,
            delta: GraphDelta::new(),
            diagnostics,
        };

        let root = tree.root();
        if let Disposition::Node { id } = self.plan.get(position, root) {
            self.visit_node(&mut walk, root, id);
        }

        debug!(
            document = tree.document_id(),
            nodes = walk.delta.node_count(),
            edges = walk.delta.edge_count(),
            "projected document"
        );
        walk.delta
    }

    // =========================================================================
    // Materialized elements
    // =========================================================================

    fn visit_node(&self, walk: &mut Walk<'_>, element: ElementId, id: &str) {
        let tree = walk.tree;
        let node = tree.get(element);
        let mut sink = PropertySink::new(id);

        if let Some(text) = &node.text {
            sink.insert(self.config.text_property.clone(), text.clone(), tree, element, walk.diagnostics);
        }
        self.place_children(walk, element, id, &[], Mode::Plain, &[], &mut sink);

        walk.delta.nodes.push(GraphNode {
            id: id.to_string(),
            label: qname::label_for(&node.qname),
            qname: node.qname.clone(),
            document: tree.document_id().to_string(),
            properties: sink.values,
            is_document_root: element == tree.root(),
        });
    }

    /// Emit whatever a non-flattened element projects to, hanging it off `owner`
    fn dispatch(&self, walk: &mut Walk<'_>, element: ElementId, owner: &str) {
        let tree = walk.tree;
        let node = tree.get(element);
        match self.plan.get(walk.position, element) {
            Disposition::Node { id } => {
                self.visit_node(walk, element, id);
                walk.delta.edges.push(GraphEdge::containment(
                    owner,
                    id.as_str(),
                    qname::label_for(&node.qname),
                    node.qname.as_str(),
                    tree.document_id(),
                ));
            }
            Disposition::Edge { source, target, endpoints } => {
                self.visit_association(walk, element, owner, source, target, endpoints);
            }
            Disposition::Reference => {
                let mut seen = HashSet::new();
                for target in &node.reference_targets {
                    let Some(target_id) = self.plan.nearest_node(self.trees, *target) else {
                        continue;
                    };
                    if target_id == owner || !seen.insert(target_id) {
                        continue;
                    }
                    walk.delta.edges.push(GraphEdge::containment(
                        owner,
                        target_id,
                        qname::label_for(&node.qname),
                        node.qname.as_str(),
                        tree.document_id(),
                    ));
                }
            }
            Disposition::Flatten => {}
        }
    }

    fn visit_association(
        &self,
        walk: &mut Walk<'_>,
        element: ElementId,
        owner: &str,
        source: &str,
        target: &str,
        endpoints: &[ElementId],
    ) {
        let tree = walk.tree;
        let node = tree.get(element);
        let subject = tree.path(element);
        let mut sink = PropertySink::new(&subject);

        // Inline endpoint objects still need a structural parent
        for &endpoint in endpoints {
            if matches!(self.plan.get(walk.position, endpoint), Disposition::Node { .. }) {
                self.dispatch(walk, endpoint, owner);
            }
        }

        if let Some(text) = &node.text {
            sink.insert(self.config.text_property.clone(), text.clone(), tree, element, walk.diagnostics);
        }
        self.place_children(walk, element, owner, &[], Mode::Collapse, endpoints, &mut sink);

        let label = self
            .table
            .get(&node.qname)
            .map(|entry| entry.association_label())
            .unwrap_or_else(|| qname::label_for(&node.qname));

        walk.delta.edges.push(GraphEdge {
            kind: EdgeKind::Association,
            source: source.to_string(),
            target: target.to_string(),
            label,
            qname: node.qname.clone(),
            document: tree.document_id().to_string(),
            properties: sink.values,
        });
    }

    // =========================================================================
    // Flattening
    // =========================================================================

    fn key(&self, augmentation: bool, segments: &[&str]) -> String {
        let path = segments.join(&self.config.path_separator);
        if augmentation {
            format!("{}{}", self.config.augmentation_prefix, path)
        } else {
            path
        }
    }

    /// Single occurrence serialized as a list because the schema allows many
    fn is_declared_list(&self, qname: &str, element: ElementId, tree: &ElementTree) -> bool {
        self.config.lists_follow_cardinality
            && tree.get(element).is_leaf()
            && self
                .table
                .cardinality_of(qname)
                .map(|c| c.max_occurs.is_many())
                .unwrap_or(false)
    }

    /// Fold the children of `parent` into `sink`, dispatching the ones that
    /// project to nodes, edges or references. `skip` lists children handled
    /// by the caller.
    #[allow(clippy::too_many_arguments)]
    fn place_children(
        &self,
        walk: &mut Walk<'_>,
        parent: ElementId,
        owner: &str,
        prefix: &[&str],
        mode: Mode,
        skip: &[ElementId],
        sink: &mut PropertySink<'_>,
    ) {
        let tree = walk.tree;

        for (name, group) in tree.child_groups(parent) {
            let mut folded = Vec::with_capacity(group.len());
            for element in group {
                if skip.contains(&element) {
                    continue;
                }
                if self.plan.get(walk.position, element).is_flatten() {
                    folded.push(element);
                } else {
                    self.dispatch(walk, element, owner);
                }
            }
            let Some(&first) = folded.first() else {
                continue;
            };

            let role = self.table.role_of(name);
            let augmentation = mode == Mode::Augmentation || role == Role::Augmentation;
            let local = qname::local_name(name);
            let mut segments = prefix.to_vec();
            segments.push(local);

            if folded.len() > 1 || self.is_declared_list(name, first, tree) {
                let items: Vec<Value> = folded
                    .iter()
                    .map(|element| self.to_value(walk, *element, owner))
                    .collect();
                let key = self.key(augmentation, &segments);
                sink.insert(key, Value::Array(items).to_string(), tree, first, walk.diagnostics);
                continue;
            }

            let node = tree.get(first);
            if node.is_leaf() {
                if let Some(value) = node.scalar_value() {
                    sink.insert(self.key(augmentation, &segments), value, tree, first, walk.diagnostics);
                }
            } else if role == Role::Augmentation {
                // Top-level augmentations add no segment; nested ones do
                let nested = if mode == Mode::Augmentation { segments.as_slice() } else { prefix };
                if let Some(text) = &node.text {
                    sink.insert(self.key(true, &segments), text.clone(), tree, first, walk.diagnostics);
                }
                self.place_children(walk, first, owner, nested, Mode::Augmentation, &[], sink);
            } else if mode == Mode::Plain {
                if let Some(text) = &node.text {
                    sink.insert(self.key(augmentation, &segments), text.clone(), tree, first, walk.diagnostics);
                }
                self.place_children(walk, first, owner, &segments, Mode::Plain, &[], sink);
            } else {
                let value = self.to_value(walk, first, owner);
                sink.insert(self.key(augmentation, &segments), value.to_string(), tree, first, walk.diagnostics);
            }
        }
    }

    /// JSON rendering of a folded element. Descendants that project on their
    /// own are dispatched instead of rendered.
    fn to_value(&self, walk: &mut Walk<'_>, element: ElementId, owner: &str) -> Value {
        let tree = walk.tree;
        let node = tree.get(element);
        if node.is_leaf() {
            return node.scalar_value().map(Value::String).unwrap_or(Value::Null);
        }

        let mut object = Map::new();
        if let Some(text) = &node.text {
            object.insert(self.config.text_property.clone(), Value::String(text.clone()));
        }
        for (name, group) in tree.child_groups(element) {
            let first = group[0];
            let mut values = Vec::with_capacity(group.len());
            for child in group {
                if self.plan.get(walk.position, child).is_flatten() {
                    values.push(self.to_value(walk, child, owner));
                } else {
                    self.dispatch(walk, child, owner);
                }
            }
            let value = match values.len() {
                0 => continue,
                1 if !self.is_declared_list(name, first, tree) => values.remove(0),
                _ => Value::Array(values),
            };
            object.insert(qname::local_name(name).to_string(), value);
        }
        Value::Object(object)
    }
}
