//! Projection Plan
//!
//! Decides what every element of a resolved batch turns into before anything
//! is emitted. Deciding up front keeps the projector a plain tree walk: it
//! never has to guess whether a referenced element, possibly in another
//! document, ends up as a node.
//!
//! Planning runs in three passes:
//! 1. Per element: root, role and selection give a draft disposition.
//!    Associations that could become edges stay pending. Content below an
//!    augmentation, and non-endpoint content of a pending association, is
//!    flattened wholesale.
//! 2. Every pending association resolves its endpoints against the drafts
//!    of pass 1 and becomes an edge (two or more distinct endpoints, each a
//!    node in its own right) or a node.
//! 3. Drafts are frozen into [`Disposition`]s.

use std::collections::HashSet;
use tracing::debug;

use super::Diagnostics;
use crate::checksum::{node_id, NodeAnchor};
use crate::document::{ElementId, ElementRef, ElementTree, IdentityIndex};
use crate::schema::{ClassificationEntry, ClassificationTable, Role, SelectionSet};

/// What an element projects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Materializes as a graph node
    Node { id: String },
    /// Projects as an association edge. `endpoints` are the child elements
    /// that supplied endpoints; they do not contribute edge properties.
    Edge {
        source: String,
        target: String,
        endpoints: Vec<ElementId>,
    },
    /// Reference-only element; stands for the nodes its targets project to
    Reference,
    /// Folded into the owning node or edge
    Flatten,
}

impl Disposition {
    pub fn is_flatten(&self) -> bool {
        matches!(self, Disposition::Flatten)
    }

    /// Node id, if this element materializes
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Disposition::Node { id } => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Draft {
    Node(String),
    Pending,
    Reference,
    Flatten,
}

/// Outcome of pass 2 for one association
enum Resolution {
    Edge(Disposition),
    /// Materializes as a node; `unlinked` reference children designate no
    /// node of their own and flatten as marker text instead
    Degraded { id: String, unlinked: Vec<ElementId> },
}

/// Dispositions for every element of a batch
#[derive(Debug, Clone, Default)]
pub struct ProjectionPlan {
    /// Indexed by document position, then element index
    dispositions: Vec<Vec<Disposition>>,
}

impl ProjectionPlan {
    /// Plan a resolved batch
    pub fn build(
        trees: &[ElementTree],
        index: &IdentityIndex,
        table: &ClassificationTable,
        selection: &SelectionSet,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let planner = Planner { trees, index, table, selection };

        // Pass 1
        let drafts: Vec<Vec<Draft>> = trees
            .iter()
            .map(|tree| {
                let mut out = vec![Draft::Flatten; tree.len()];
                planner.draft(tree, tree.root(), false, &mut out);
                out
            })
            .collect();

        // Pass 2, decided entirely against the pass 1 drafts
        let mut resolutions = Vec::new();
        for (position, tree) in trees.iter().enumerate() {
            for element in tree.pre_order() {
                if drafts[position][element.index()] == Draft::Pending {
                    let resolution = planner.resolve_association(&drafts, position, element, diagnostics);
                    resolutions.push((position, element, resolution));
                }
            }
        }

        // Pass 3
        let mut dispositions: Vec<Vec<Disposition>> = drafts
            .into_iter()
            .map(|doc| {
                doc.into_iter()
                    .map(|draft| match draft {
                        Draft::Node(id) => Disposition::Node { id },
                        Draft::Reference => Disposition::Reference,
                        Draft::Pending | Draft::Flatten => Disposition::Flatten,
                    })
                    .collect()
            })
            .collect();

        let (mut edges, mut degraded) = (0usize, 0usize);
        for (position, element, resolution) in resolutions {
            dispositions[position][element.index()] = match resolution {
                Resolution::Edge(edge) => {
                    edges += 1;
                    edge
                }
                Resolution::Degraded { id, unlinked } => {
                    degraded += 1;
                    for child in unlinked {
                        dispositions[position][child.index()] = Disposition::Flatten;
                    }
                    Disposition::Node { id }
                }
            };
        }

        debug!(documents = trees.len(), edges, degraded, "planned projection");
        Self { dispositions }
    }

    /// Disposition of one element
    pub fn get(&self, document: usize, element: ElementId) -> &Disposition {
        &self.dispositions[document][element.index()]
    }

    /// Nearest materialized node at or above an element
    pub fn nearest_node<'a>(&'a self, trees: &[ElementTree], target: ElementRef) -> Option<&'a str> {
        let tree = &trees[target.document];
        std::iter::once(target.element)
            .chain(tree.ancestors(target.element))
            .find_map(|element| self.get(target.document, element).node_id())
    }

    /// Number of elements planned as nodes
    pub fn node_count(&self) -> usize {
        self.dispositions
            .iter()
            .flatten()
            .filter(|d| matches!(d, Disposition::Node { .. }))
            .count()
    }
}

struct Planner<'a> {
    trees: &'a [ElementTree],
    index: &'a IdentityIndex,
    table: &'a ClassificationTable,
    selection: &'a SelectionSet,
}

impl<'a> Planner<'a> {
    /// Stable id for an element: its identity when it owns that identity in
    /// the batch, its path otherwise
    fn element_id(&self, tree: &ElementTree, element: ElementId) -> String {
        let owns_identity = tree.get(element).identity.as_deref().and_then(|identity| {
            self.index
                .get(identity)
                .filter(|owner| {
                    owner.element == element && self.trees[owner.document].document_id() == tree.document_id()
                })
                .map(|_| identity)
        });
        match owns_identity {
            Some(identity) => node_id(tree.document_id(), NodeAnchor::Identity(identity)),
            None => node_id(tree.document_id(), NodeAnchor::Path(&tree.path(element))),
        }
    }

    /// Draft for a non-root element outside any flattened region
    fn base_draft(&self, tree: &ElementTree, element: ElementId) -> Draft {
        let node = tree.get(element);
        let role = self.table.role_of(&node.qname);
        match role {
            Role::Property | Role::Augmentation => Draft::Flatten,
            Role::Object | Role::Association if node.is_reference_only() => {
                // Unresolved references keep their marker as a flattened value
                if node.reference_targets.is_empty() {
                    Draft::Flatten
                } else {
                    Draft::Reference
                }
            }
            Role::Object if self.selection.is_selected(&node.qname, role) => {
                Draft::Node(self.element_id(tree, element))
            }
            Role::Association if self.selection.is_selected(&node.qname, role) => Draft::Pending,
            Role::Object | Role::Association => Draft::Flatten,
        }
    }

    /// Whether a child of an association may supply an endpoint
    fn may_be_endpoint(&self, entry: Option<&ClassificationEntry>, tree: &ElementTree, child: ElementId) -> bool {
        let declared = match entry {
            Some(entry) if !entry.endpoints.is_empty() => entry.endpoint_rank(&tree.get(child).qname).is_some(),
            _ => true,
        };
        declared && matches!(self.base_draft(tree, child), Draft::Node(_) | Draft::Reference)
    }

    fn draft(&self, tree: &ElementTree, element: ElementId, collapsed: bool, out: &mut [Draft]) {
        let is_root = element == tree.root();
        let draft = if is_root {
            // The document element always materializes, whatever its role
            Draft::Node(self.element_id(tree, element))
        } else if collapsed {
            Draft::Flatten
        } else {
            self.base_draft(tree, element)
        };

        let node = tree.get(element);
        let below_augmentation = collapsed || (!is_root && self.table.role_of(&node.qname) == Role::Augmentation);
        let entry = self.table.get(&node.qname);
        let pending = draft == Draft::Pending;
        out[element.index()] = draft;

        for &child in &node.children {
            let child_collapsed = below_augmentation || (pending && !self.may_be_endpoint(entry, tree, child));
            self.draft(tree, child, child_collapsed, out);
        }
    }

    /// Node id drafted for a referenced element itself. Pending associations
    /// and elements that flatten into an ancestor are not endpoints, so the
    /// answer never depends on the order associations are resolved in.
    fn drafted_node<'d>(&self, drafts: &'d [Vec<Draft>], target: ElementRef) -> Option<&'d str> {
        match &drafts[target.document][target.element.index()] {
            Draft::Node(id) => Some(id.as_str()),
            _ => None,
        }
    }

    fn resolve_association(
        &self,
        drafts: &[Vec<Draft>],
        position: usize,
        element: ElementId,
        diagnostics: &mut Diagnostics,
    ) -> Resolution {
        let tree = &self.trees[position];
        let node = tree.get(element);
        let entry = self.table.get(&node.qname);

        // (declared rank, node id) per distinct resolved endpoint, in document order
        let mut resolved: Vec<(usize, String)> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut endpoint_children = Vec::new();
        let mut unlinked = Vec::new();

        for &child in &node.children {
            let rank = entry
                .and_then(|e| e.endpoint_rank(&tree.get(child).qname))
                .unwrap_or(0);
            match &drafts[position][child.index()] {
                Draft::Node(id) => {
                    if seen.insert(id.as_str()) {
                        resolved.push((rank, id.clone()));
                    }
                    endpoint_children.push(child);
                }
                Draft::Reference => {
                    let mut linked = false;
                    for target in &tree.get(child).reference_targets {
                        if let Some(id) = self.drafted_node(drafts, *target) {
                            linked = true;
                            if seen.insert(id) {
                                resolved.push((rank, id.to_string()));
                            }
                        }
                    }
                    if !linked {
                        unlinked.push(child);
                    }
                    endpoint_children.push(child);
                }
                Draft::Pending | Draft::Flatten => {}
            }
        }

        // Declared endpoint order first, document order within a role
        resolved.sort_by_key(|(rank, _)| *rank);
        let ids: Vec<String> = resolved.into_iter().map(|(_, id)| id).collect();
        let path = tree.path(element);

        if ids.len() < 2 {
            diagnostics.association_degraded(tree.document_id(), &path, ids.len());
            return Resolution::Degraded {
                id: self.element_id(tree, element),
                unlinked,
            };
        }
        if ids.len() > 2 {
            diagnostics.extra_endpoints(tree.document_id(), &path, &ids);
        }

        Resolution::Edge(Disposition::Edge {
            source: ids[0].clone(),
            target: ids[1].clone(),
            endpoints: endpoint_children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::resolve_batch;
    use crate::graph::DiagnosticCode;

    fn table() -> ClassificationTable {
        ClassificationTable::new()
            .with(ClassificationEntry::object("j:Report"))
            .with(ClassificationEntry::object("nc:Person"))
            .with(ClassificationEntry::object("nc:Location"))
            .with(ClassificationEntry::property("nc:PersonName"))
            .with(ClassificationEntry::property("nc:Flag"))
            .with(ClassificationEntry::association("nc:PersonAssociation", ["nc:Person"]))
    }

    /// Report with two identified people, an association and an augmentation
    fn report(second_ref: &str) -> ElementTree {
        let mut tree = ElementTree::new("doc", "j:Report");
        let root = tree.root();
        for id in ["P1", "P2"] {
            let p = tree.add_child(root, "nc:Person");
            tree.get_mut(p).identity = Some(id.to_string());
            let name = tree.add_child(p, "nc:PersonName");
            tree.get_mut(name).push_text(id);
        }
        let assoc = tree.add_child(root, "nc:PersonAssociation");
        for marker in ["P1", second_ref] {
            let r = tree.add_child(assoc, "nc:Person");
            tree.get_mut(r).reference_markers.push(marker.to_string());
        }
        let flag = tree.add_child(assoc, "nc:Flag");
        tree.get_mut(flag).push_text("false");
        let aug = tree.add_child(root, "ext:ReportAugmentation");
        tree.add_child(aug, "nc:Location");
        tree
    }

    fn plan(trees: &mut [ElementTree], selection: &SelectionSet) -> (ProjectionPlan, Diagnostics) {
        let (index, mut diags) = resolve_batch(trees);
        let plan = ProjectionPlan::build(trees, &index, &table(), selection, &mut diags);
        (plan, diags)
    }

    fn child(tree: &ElementTree, parent: ElementId, n: usize) -> ElementId {
        tree.get(parent).children[n]
    }

    #[test]
    fn test_association_with_two_endpoints_is_edge() {
        let mut trees = vec![report("P2")];
        let (plan, diags) = plan(&mut trees, &SelectionSet::new());
        let tree = &trees[0];
        let root = tree.root();

        let p1 = plan.get(0, child(tree, root, 0)).node_id().unwrap().to_string();
        let p2 = plan.get(0, child(tree, root, 1)).node_id().unwrap().to_string();
        let assoc = child(tree, root, 2);
        match plan.get(0, assoc) {
            Disposition::Edge { source, target, endpoints } => {
                assert_eq!(source, &p1);
                assert_eq!(target, &p2);
                assert_eq!(endpoints.len(), 2);
            }
            other => panic!("Expected edge, got {:?}", other),
        }
        assert!(plan.get(0, child(tree, assoc, 2)).is_flatten());
        assert!(diags.is_empty());
    }

    #[test]
    fn test_association_with_one_endpoint_degrades() {
        let mut trees = vec![report("P9")];
        let (plan, diags) = plan(&mut trees, &SelectionSet::new());
        let tree = &trees[0];
        let assoc = child(tree, tree.root(), 2);

        assert!(plan.get(0, assoc).node_id().is_some());
        assert_eq!(plan.get(0, child(tree, assoc, 0)), &Disposition::Reference);
        // Unresolved marker flattens
        assert!(plan.get(0, child(tree, assoc, 1)).is_flatten());
        assert_eq!(diags.count(DiagnosticCode::AssociationDegraded), 1);
        assert_eq!(diags.count(DiagnosticCode::UnresolvedReference), 1);
    }

    #[test]
    fn test_deselected_endpoints_degrade_association() {
        let mut trees = vec![report("P2")];
        let (plan, diags) = plan(&mut trees, &SelectionSet::new().deselect("nc:Person"));
        let tree = &trees[0];
        let assoc = child(tree, tree.root(), 2);

        // Both targets flatten into the root, so neither is an endpoint
        assert!(plan.get(0, assoc).node_id().is_some());
        assert!(plan.get(0, child(tree, assoc, 0)).is_flatten());
        assert!(plan.get(0, child(tree, assoc, 1)).is_flatten());
        assert_eq!(diags.count(DiagnosticCode::AssociationDegraded), 1);
        assert_eq!(diags.count(DiagnosticCode::UnresolvedReference), 0);
    }

    #[test]
    fn test_repeated_endpoint_counts_once() {
        let mut trees = vec![report("P1")];
        let (plan, diags) = plan(&mut trees, &SelectionSet::new());
        let tree = &trees[0];
        let assoc = child(tree, tree.root(), 2);

        assert!(plan.get(0, assoc).node_id().is_some());
        assert_eq!(plan.get(0, child(tree, assoc, 0)), &Disposition::Reference);
        assert_eq!(diags.count(DiagnosticCode::AssociationDegraded), 1);
    }

    #[test]
    fn test_extra_endpoints_use_first_two() {
        let mut tree = ElementTree::new("doc", "j:Report");
        let root = tree.root();
        let assoc = tree.add_child(root, "nc:PersonAssociation");
        for marker in ["P3", "P1", "P2"] {
            let r = tree.add_child(assoc, "nc:Person");
            tree.get_mut(r).reference_markers.push(marker.to_string());
        }
        for id in ["P1", "P2", "P3"] {
            let p = tree.add_child(root, "nc:Person");
            tree.get_mut(p).identity = Some(id.to_string());
        }
        let mut trees = vec![tree];
        let (plan, diags) = plan(&mut trees, &SelectionSet::new());

        match plan.get(0, assoc) {
            Disposition::Edge { source, target, endpoints } => {
                assert_eq!(source, &node_id("doc", NodeAnchor::Identity("P3")));
                assert_eq!(target, &node_id("doc", NodeAnchor::Identity("P1")));
                assert_eq!(endpoints.len(), 3);
            }
            other => panic!("Expected edge, got {:?}", other),
        }
        let extra: Vec<_> = diags.with_code(DiagnosticCode::ExtraAssociationEndpoints).collect();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].subject, "/j:Report[0]/nc:PersonAssociation[0]");
    }

    #[test]
    fn test_forward_reference_within_document() {
        // The association precedes the identities it points at
        let mut tree = ElementTree::new("doc", "j:Report");
        let root = tree.root();
        let assoc = tree.add_child(root, "nc:PersonAssociation");
        for marker in ["P1", "P2"] {
            let r = tree.add_child(assoc, "nc:Person");
            tree.get_mut(r).reference_markers.push(marker.to_string());
        }
        for id in ["P1", "P2"] {
            let p = tree.add_child(root, "nc:Person");
            tree.get_mut(p).identity = Some(id.to_string());
        }
        let mut trees = vec![tree];
        let (plan, diags) = plan(&mut trees, &SelectionSet::new());

        assert!(matches!(plan.get(0, assoc), Disposition::Edge { .. }));
        assert!(diags.is_empty(), "{}", diags);
    }

    #[test]
    fn test_augmentation_content_never_materializes() {
        let mut trees = vec![report("P2")];
        let (plan, _) = plan(&mut trees, &SelectionSet::new());
        let tree = &trees[0];
        let aug = child(tree, tree.root(), 3);
        assert!(plan.get(0, aug).is_flatten());
        // Selected object below an augmentation is still flattened
        assert!(plan.get(0, child(tree, aug, 0)).is_flatten());
    }

    #[test]
    fn test_root_always_materializes() {
        let mut trees = vec![ElementTree::new("doc", "ext:Unknown")];
        let (plan, _) = plan(&mut trees, &SelectionSet::new().deselect("ext:Unknown"));
        assert!(plan.get(0, trees[0].root()).node_id().is_some());
        assert_eq!(plan.node_count(), 1);
    }

    #[test]
    fn test_deselected_object_flattens() {
        let mut trees = vec![report("P2")];
        let (plan, _) = plan(&mut trees, &SelectionSet::new().deselect("nc:Person"));
        let tree = &trees[0];
        assert!(plan.get(0, child(tree, tree.root(), 0)).is_flatten());
    }

    #[test]
    fn test_ids_are_stable_and_identity_anchored() {
        let mut first = vec![report("P2")];
        let mut second = vec![report("P2")];
        let (a, _) = plan(&mut first, &SelectionSet::new());
        let (b, _) = plan(&mut second, &SelectionSet::new());
        let p1 = child(&first[0], first[0].root(), 0);
        assert_eq!(a.get(0, p1), b.get(0, p1));
        assert_eq!(
            a.get(0, p1).node_id(),
            Some(node_id("doc", NodeAnchor::Identity("P1")).as_str())
        );
    }

    #[test]
    fn test_nearest_node_walks_up() {
        let mut trees = vec![report("P2")];
        let (plan, _) = plan(&mut trees, &SelectionSet::new());
        let tree = &trees[0];
        let p1 = child(tree, tree.root(), 0);
        let name = child(tree, p1, 0);
        assert_eq!(
            plan.nearest_node(&trees, ElementRef::new(0, name)),
            plan.get(0, p1).node_id()
        );
    }
}
