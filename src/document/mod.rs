//! Instance Document Trees
//!
//! One ordered, attributed element tree per source document, independent of
//! whether it came from XML or NIEM JSON. Nodes live in a flat arena and
//! refer to each other by [`ElementId`]; the parent link is a plain index,
//! so ownership stays strictly top-down.
//!
//! Trees are built by [`xml`] / [`json`], enriched by [`resolve`], read by
//! the projector and then dropped.

pub mod json;
pub mod resolve;
pub mod xml;

pub use resolve::{resolve_batch, resolve_references, IdentityIndex};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::config::DocumentConfig;
use crate::error::{MappingError, Result};
use crate::qname::{self, QName};

// =============================================================================
// Identifiers
// =============================================================================

/// Index of an element inside its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(u32);

impl ElementId {
    /// Zero-based arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An element anywhere in a batch: (document position, element)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef {
    pub document: usize,
    pub element: ElementId,
}

impl ElementRef {
    pub fn new(document: usize, element: ElementId) -> Self {
        Self { document, element }
    }
}

// =============================================================================
// Element Node
// =============================================================================

/// One element occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub qname: QName,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    /// Attributes other than namespace declarations and identity/reference markers
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    /// Identity marker (`structures:id`, `@id`)
    pub identity: Option<String>,
    /// Raw reference markers (`structures:ref`, `structures:uri`, `{"@id": ..}`)
    pub reference_markers: Vec<String>,
    /// Elements the markers designate; filled in by the resolver
    pub reference_targets: Vec<ElementRef>,
}

impl ElementNode {
    fn new(qname: QName, parent: Option<ElementId>) -> Self {
        Self {
            qname,
            parent,
            children: Vec::new(),
            attributes: BTreeMap::new(),
            text: None,
            identity: None,
            reference_markers: Vec::new(),
            reference_targets: Vec::new(),
        }
    }

    /// Local part of the qname
    pub fn local_name(&self) -> &str {
        qname::local_name(&self.qname)
    }

    /// No child elements
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Carries at least one reference marker
    pub fn is_reference(&self) -> bool {
        !self.reference_markers.is_empty()
    }

    /// Stands in for another element: a reference with no content of its own
    pub fn is_reference_only(&self) -> bool {
        self.is_reference() && self.is_leaf() && self.text.is_none() && self.identity.is_none()
    }

    /// Append text, joining mixed-content fragments with a space
    pub fn push_text(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        match &mut self.text {
            Some(text) => {
                text.push(' ');
                text.push_str(fragment);
            }
            None => self.text = Some(fragment.to_string()),
        }
    }

    /// Value used when the element is folded into a scalar: its text, or
    /// its reference markers when it only points elsewhere
    pub fn scalar_value(&self) -> Option<String> {
        if let Some(text) = &self.text {
            return Some(text.clone());
        }
        if self.is_reference() {
            let markers: Vec<String> = self.reference_markers.iter().map(|m| format!("#{}", m)).collect();
            return Some(markers.join(" "));
        }
        None
    }
}

// =============================================================================
// Element Tree
// =============================================================================

/// Arena-backed element tree for one document
#[derive(Debug, Clone)]
pub struct ElementTree {
    document_id: String,
    nodes: Vec<ElementNode>,
}

impl ElementTree {
    /// Create a tree holding only its root element
    pub fn new(document_id: impl Into<String>, root_qname: impl Into<QName>) -> Self {
        Self {
            document_id: document_id.into(),
            nodes: vec![ElementNode::new(root_qname.into(), None)],
        }
    }

    /// Identifier of the source document
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// The document's top-level element
    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    /// Append a child element
    pub fn add_child(&mut self, parent: ElementId, qname: impl Into<QName>) -> ElementId {
        let id = ElementId(self.nodes.len() as u32);
        self.nodes.push(ElementNode::new(qname.into(), Some(parent)));
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn get(&self, id: ElementId) -> &ElementNode {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: ElementId) -> &mut ElementNode {
        &mut self.nodes[id.index()]
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Trees always hold a root, so this is never true
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Element ids in document (pre-)order
    pub fn pre_order(&self) -> Vec<ElementId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.get(id).children.iter().rev().copied());
        }
        order
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        std::iter::successors(self.get(id).parent, move |p| self.get(*p).parent)
    }

    /// Children grouped by qname, groups in first-appearance order.
    /// Repeated siblings form one array-like group.
    pub fn child_groups(&self, id: ElementId) -> Vec<(&str, Vec<ElementId>)> {
        let mut groups: Vec<(&str, Vec<ElementId>)> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for &child in &self.get(id).children {
            let name = self.get(child).qname.as_str();
            match positions.get(name) {
                Some(&pos) => groups[pos].1.push(child),
                None => {
                    positions.insert(name, groups.len());
                    groups.push((name, vec![child]));
                }
            }
        }
        groups
    }

    /// Positional path from the root, e.g. `/j:Report[0]/nc:Person[1]`.
    /// The index counts preceding siblings with the same qname.
    pub fn path(&self, id: ElementId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(element) = current {
            let node = self.get(element);
            let position = match node.parent {
                Some(parent) => self
                    .get(parent)
                    .children
                    .iter()
                    .take_while(|c| **c != element)
                    .filter(|c| self.get(**c).qname == node.qname)
                    .count(),
                None => 0,
            };
            segments.push(format!("{}[{}]", node.qname, position));
            current = node.parent;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }
}

// =============================================================================
// Parsing entry points
// =============================================================================

/// Source syntax of an instance document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Xml,
    Json,
}

impl DocumentFormat {
    /// Guess from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "xml" => Some(Self::Xml),
            "json" | "jsonld" => Some(Self::Json),
            _ => None,
        }
    }

    /// Guess from the first significant character
    pub fn sniff(content: &str) -> Option<Self> {
        match content.trim_start_matches('\u{feff}').trim_start().chars().next()? {
            '<' => Some(Self::Xml),
            '{' => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse one document into an element tree
pub fn parse_document(
    document_id: &str,
    content: &str,
    format: DocumentFormat,
    config: &DocumentConfig,
) -> Result<ElementTree> {
    match format {
        DocumentFormat::Xml => xml::parse(document_id, content, config),
        DocumentFormat::Json => json::parse(document_id, content, config),
    }
}

/// Parse raw bytes, rejecting anything that is not UTF-8
pub fn parse_bytes(
    document_id: &str,
    bytes: &[u8],
    format: DocumentFormat,
    config: &DocumentConfig,
) -> Result<ElementTree> {
    let content = std::str::from_utf8(bytes).map_err(|e| {
        MappingError::malformed(document_id, format!("byte {}", e.valid_up_to()), "invalid UTF-8")
    })?;
    parse_document(document_id, content, format, config)
}

/// Split a reference attribute value into identity markers (`#P1 P2` -> `P1`, `P2`)
pub(crate) fn split_markers(value: &str) -> Vec<String> {
    value
        .split_whitespace()
        .map(|m| m.strip_prefix('#').unwrap_or(m))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ElementTree {
        let mut tree = ElementTree::new("doc", "j:Report");
        let root = tree.root();
        let a = tree.add_child(root, "nc:Person");
        tree.add_child(root, "nc:Location");
        let b = tree.add_child(root, "nc:Person");
        tree.add_child(a, "nc:PersonName");
        tree.add_child(b, "nc:PersonName");
        tree
    }

    #[test]
    fn test_paths_count_same_name_siblings() {
        let tree = sample();
        let order = tree.pre_order();
        let paths: Vec<String> = order.iter().map(|id| tree.path(*id)).collect();
        assert_eq!(
            paths,
            vec![
                "/j:Report[0]",
                "/j:Report[0]/nc:Person[0]",
                "/j:Report[0]/nc:Person[0]/nc:PersonName[0]",
                "/j:Report[0]/nc:Location[0]",
                "/j:Report[0]/nc:Person[1]",
                "/j:Report[0]/nc:Person[1]/nc:PersonName[0]",
            ]
        );
    }

    #[test]
    fn test_child_groups_keep_first_appearance_order() {
        let tree = sample();
        let groups = tree.child_groups(tree.root());
        let names: Vec<(&str, usize)> = groups.iter().map(|(n, g)| (*n, g.len())).collect();
        assert_eq!(names, vec![("nc:Person", 2), ("nc:Location", 1)]);
    }

    #[test]
    fn test_ancestors_walk_to_root() {
        let tree = sample();
        let leaf = *tree.pre_order().last().unwrap();
        let ancestors: Vec<&str> = tree.ancestors(leaf).map(|id| tree.get(id).qname.as_str()).collect();
        assert_eq!(ancestors, vec!["nc:Person", "j:Report"]);
    }

    #[test]
    fn test_mixed_text_is_joined() {
        let mut tree = ElementTree::new("doc", "ext:Note");
        let root = tree.root();
        tree.get_mut(root).push_text("  first ");
        tree.get_mut(root).push_text("   ");
        tree.get_mut(root).push_text("second");
        assert_eq!(tree.get(root).text.as_deref(), Some("first second"));
    }

    #[test]
    fn test_split_markers() {
        assert_eq!(split_markers("#P1  P2"), vec!["P1", "P2"]);
        assert!(split_markers("  ").is_empty());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(DocumentFormat::sniff("  <x/>"), Some(DocumentFormat::Xml));
        assert_eq!(DocumentFormat::sniff("{}"), Some(DocumentFormat::Json));
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.XML")), Some(DocumentFormat::Xml));
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.txt")), None);
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let err = parse_bytes("bad", &[b'<', 0xff, b'>'], DocumentFormat::Xml, &DocumentConfig::default())
            .unwrap_err();
        assert!(err.is_document_scoped());
    }
}
