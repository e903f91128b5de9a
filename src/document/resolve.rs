//! Reference Resolution
//!
//! Two passes over a whole batch. The first indexes every identity marker in
//! every document; the second points each reference marker at the element
//! declaring that identity. Because the index is complete before any lookup,
//! a reference may name an element in a document that appears later in the
//! batch.

use std::collections::HashMap;
use tracing::debug;

use super::{ElementRef, ElementTree};
use crate::graph::Diagnostics;

/// Batch-scoped identity -> element lookup
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    entries: HashMap<String, ElementRef>,
}

impl IdentityIndex {
    /// Index every identity in the batch. The first declaration of an identity
    /// (in batch order, then document order) wins; later ones are reported.
    pub fn build(trees: &[ElementTree], diagnostics: &mut Diagnostics) -> Self {
        let mut entries: HashMap<String, ElementRef> = HashMap::new();

        for (position, tree) in trees.iter().enumerate() {
            for element in tree.pre_order() {
                let Some(identity) = tree.get(element).identity.as_deref() else {
                    continue;
                };
                match entries.get(identity) {
                    Some(first) => {
                        let first_tree = &trees[first.document];
                        let first_at = format!(
                            "{} {}",
                            first_tree.document_id(),
                            first_tree.path(first.element)
                        );
                        diagnostics.duplicate_identity(
                            tree.document_id(),
                            &tree.path(element),
                            identity,
                            &first_at,
                        );
                    }
                    None => {
                        entries.insert(identity.to_string(), ElementRef::new(position, element));
                    }
                }
            }
        }

        debug!(identities = entries.len(), documents = trees.len(), "built identity index");
        Self { entries }
    }

    /// Element declaring an identity
    pub fn get(&self, identity: &str) -> Option<ElementRef> {
        self.entries.get(identity).copied()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fill `reference_targets` on every referencing element. Markers with no
/// matching identity stay unresolved and are reported.
pub fn resolve_references(trees: &mut [ElementTree], index: &IdentityIndex, diagnostics: &mut Diagnostics) {
    let mut resolved = 0usize;

    for tree in trees.iter_mut() {
        for element in tree.pre_order() {
            if !tree.get(element).is_reference() {
                continue;
            }

            let mut targets = Vec::new();
            let mut missing = Vec::new();
            for marker in &tree.get(element).reference_markers {
                match index.get(marker) {
                    Some(target) => targets.push(target),
                    None => missing.push(marker.clone()),
                }
            }

            if !missing.is_empty() {
                let path = tree.path(element);
                for marker in &missing {
                    diagnostics.unresolved_reference(tree.document_id(), &path, marker);
                }
            }

            resolved += targets.len();
            tree.get_mut(element).reference_targets = targets;
        }
    }

    debug!(resolved, "resolved references");
}

/// Index and resolve a batch in one call
pub fn resolve_batch(trees: &mut [ElementTree]) -> (IdentityIndex, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let index = IdentityIndex::build(trees, &mut diagnostics);
    resolve_references(trees, &index, &mut diagnostics);
    (index, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DiagnosticCode;

    fn person(doc: &str, identity: Option<&str>, reference: Option<&str>) -> ElementTree {
        let mut tree = ElementTree::new(doc, "j:Report");
        let root = tree.root();
        let p = tree.add_child(root, "nc:Person");
        tree.get_mut(p).identity = identity.map(str::to_string);
        if let Some(r) = reference {
            let link = tree.add_child(root, "nc:Person");
            tree.get_mut(link).reference_markers.push(r.to_string());
        }
        tree
    }

    #[test]
    fn test_cross_document_reference_resolves_regardless_of_order() {
        // Reference appears before its declaration in batch order
        let mut trees = vec![person("a", None, Some("P1")), person("b", Some("P1"), None)];
        let (index, diags) = resolve_batch(&mut trees);

        assert_eq!(index.len(), 1);
        assert!(diags.is_empty());

        let link = trees[0].get(trees[0].root()).children[1];
        let targets = &trees[0].get(link).reference_targets;
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].document, 1);
        assert_eq!(trees[1].get(targets[0].element).qname, "nc:Person");
    }

    #[test]
    fn test_unresolved_reference_reported() {
        let mut trees = vec![person("a", Some("P1"), Some("P9"))];
        let (_, diags) = resolve_batch(&mut trees);

        assert_eq!(diags.count(DiagnosticCode::UnresolvedReference), 1);
        let item = &diags.all()[0];
        assert_eq!(item.document.as_deref(), Some("a"));
        assert_eq!(item.subject, "/j:Report[0]/nc:Person[1]");

        let link = trees[0].get(trees[0].root()).children[1];
        assert!(trees[0].get(link).reference_targets.is_empty());
    }

    #[test]
    fn test_duplicate_identity_first_wins() {
        let mut trees = vec![person("a", Some("P1"), None), person("b", Some("P1"), None)];
        let (index, diags) = resolve_batch(&mut trees);

        assert_eq!(index.get("P1").unwrap().document, 0);
        assert_eq!(diags.count(DiagnosticCode::DuplicateIdentity), 1);
        assert_eq!(diags.all()[0].document.as_deref(), Some("b"));
    }
}
