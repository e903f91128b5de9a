//! NIEM JSON Instance Parsing
//!
//! Maps a JSON-LD-like NIEM JSON document onto the same [`ElementTree`] the
//! XML parser produces:
//! - `@context` binds prefixes to namespace URIs
//! - `@id` on an object is its identity; an object holding only `@id` is a
//!   reference to that identity
//! - arrays are repeated siblings
//! - scalars are text; `@value` / `rdf:value` is text next to child elements
//!
//! A top-level object with exactly one element key uses that element as the
//! document root. Otherwise the top-level object itself is the root, named
//! by its `@type` (or `root`).

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::{split_markers, ElementId, ElementTree};
use crate::config::DocumentConfig;
use crate::error::{MappingError, Result};
use crate::qname;

const SYNTHETIC_ROOT: &str = "root";

struct JsonTreeBuilder<'a> {
    config: &'a DocumentConfig,
    /// Document prefix -> namespace URI, from `@context`
    context: HashMap<String, String>,
}

impl<'a> JsonTreeBuilder<'a> {
    fn canonical(&self, raw: &str) -> String {
        let (prefix, local) = qname::split(raw);
        let canonical = prefix
            .and_then(|p| self.context.get(p))
            .and_then(|uri| self.config.prefix_for(uri));
        match canonical {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => raw.to_string(),
        }
    }

    fn is_text_key(&self, key: &str) -> bool {
        key == "@value" || self.canonical(key) == "rdf:value" || key == "rdf:value"
    }

    fn is_element_key(&self, key: &str) -> bool {
        !key.starts_with('@') && !self.is_text_key(key)
    }

    /// Fill `id` from an object's members
    fn fill_object(&self, tree: &mut ElementTree, id: ElementId, object: &Map<String, Value>) {
        if object.len() == 1 {
            if let Some(Value::String(target)) = object.get("@id") {
                tree.get_mut(id).reference_markers.extend(split_markers(target));
                return;
            }
        }

        for (key, value) in object {
            if key == "@id" {
                if let Some(identity) = value.as_str() {
                    let identity = identity.strip_prefix('#').unwrap_or(identity).trim();
                    if !identity.is_empty() {
                        tree.get_mut(id).identity = Some(identity.to_string());
                    }
                }
            } else if self.is_text_key(key) {
                if let Some(text) = scalar_text(value) {
                    tree.get_mut(id).push_text(&text);
                }
            } else if key.starts_with('@') {
                if key != "@context" {
                    if let Some(text) = scalar_text(value) {
                        tree.get_mut(id).attributes.insert(key.clone(), text);
                    }
                }
            } else {
                let child_qname = self.canonical(key);
                self.add_element(tree, id, &child_qname, value);
            }
        }
    }

    /// Add one child element per occurrence of `value` (arrays repeat)
    fn add_element(&self, tree: &mut ElementTree, parent: ElementId, qname: &str, value: &Value) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.add_element(tree, parent, qname, item);
                }
            }
            Value::Object(object) => {
                let child = tree.add_child(parent, qname);
                self.fill_object(tree, child, object);
            }
            scalar => {
                let child = tree.add_child(parent, qname);
                if let Some(text) = scalar_text(scalar) {
                    tree.get_mut(child).push_text(&text);
                }
            }
        }
    }
}

/// Text form of a JSON scalar; `null` has none
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Parse a NIEM JSON instance document
pub fn parse(document_id: &str, content: &str, config: &DocumentConfig) -> Result<ElementTree> {
    let value: Value = serde_json::from_str(content).map_err(|e| {
        MappingError::malformed(document_id, format!("line {}, column {}", e.line(), e.column()), e)
    })?;
    let Value::Object(top) = value else {
        return Err(MappingError::malformed(document_id, "line 1, column 1", "top-level value is not an object"));
    };

    let context = match top.get("@context") {
        Some(Value::Object(bindings)) => bindings
            .iter()
            .filter_map(|(prefix, uri)| uri.as_str().map(|u| (prefix.clone(), u.to_string())))
            .collect(),
        _ => HashMap::new(),
    };
    let builder = JsonTreeBuilder { config, context };

    let element_keys: Vec<&String> = top.keys().filter(|k| builder.is_element_key(k)).collect();
    let single_root = match element_keys.as_slice() {
        [key] if matches!(top.get(key.as_str()), Some(Value::Object(_))) => Some(key.as_str()),
        _ => None,
    };

    let tree = match single_root {
        Some(key) => {
            let mut tree = ElementTree::new(document_id, builder.canonical(key));
            let root = tree.root();
            if let Some(Value::Object(object)) = top.get(key) {
                builder.fill_object(&mut tree, root, object);
            }
            // Identity or text declared beside the single element still belongs to the document
            if let Some(Value::String(identity)) = top.get("@id") {
                let node = tree.get_mut(root);
                if node.identity.is_none() {
                    node.identity = Some(identity.trim_start_matches('#').to_string());
                }
            }
            tree
        }
        None => {
            let root_name = top
                .get("@type")
                .and_then(Value::as_str)
                .map(|t| builder.canonical(t))
                .unwrap_or_else(|| SYNTHETIC_ROOT.to_string());
            let mut tree = ElementTree::new(document_id, root_name);
            let root = tree.root();
            builder.fill_object(&mut tree, root, &top);
            tree
        }
    };

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r##"{
        "@context": {
            "core": "https://docs.oasis-open.org/niemopen/ns/model/niem-core/6.0/",
            "j": "https://docs.oasis-open.org/niemopen/ns/model/domains/justice/6.0/"
        },
        "j:Report": {
            "core:Person": [
                {"@id": "#P1", "core:PersonName": "Ann", "core:PersonAge": 41},
                {"@id": "P2", "core:PersonName": null}
            ],
            "core:PersonAssociation": {
                "core:Person": [{"@id": "#P1"}, {"@id": "#P2"}],
                "core:Flag": false
            }
        }
    }"##;

    #[test]
    fn test_single_element_becomes_root() {
        let tree = parse("doc", DOC, &DocumentConfig::default()).unwrap();
        let root = tree.get(tree.root());
        assert_eq!(root.qname, "j:Report");
        assert_eq!(root.children.len(), 3);
    }

    #[test]
    fn test_identity_and_scalars() {
        let tree = parse("doc", DOC, &DocumentConfig::default()).unwrap();
        let root = tree.get(tree.root());
        let first = tree.get(root.children[0]);
        assert_eq!(first.qname, "nc:Person");
        assert_eq!(first.identity.as_deref(), Some("P1"));
        let texts: Vec<Option<&str>> = first.children.iter().map(|c| tree.get(*c).text.as_deref()).collect();
        assert_eq!(texts, vec![Some("Ann"), Some("41")]);

        let second = tree.get(root.children[1]);
        assert_eq!(second.identity.as_deref(), Some("P2"));
        assert!(tree.get(second.children[0]).text.is_none());
    }

    #[test]
    fn test_id_only_objects_are_references() {
        let tree = parse("doc", DOC, &DocumentConfig::default()).unwrap();
        let assoc_id = *tree
            .get(tree.root())
            .children
            .iter()
            .find(|c| tree.get(**c).qname == "nc:PersonAssociation")
            .unwrap();
        let refs: Vec<&str> = tree
            .get(assoc_id)
            .children
            .iter()
            .filter(|c| tree.get(**c).is_reference_only())
            .flat_map(|c| tree.get(*c).reference_markers.iter().map(String::as_str))
            .collect();
        assert_eq!(refs, vec!["P1", "P2"]);
    }

    #[test]
    fn test_multiple_top_level_elements_use_synthetic_root() {
        let doc = r#"{"@type": "ext:Bundle", "nc:Person": {"nc:PersonName": "A"}, "nc:Location": {}}"#;
        let tree = parse("doc", doc, &DocumentConfig::default()).unwrap();
        assert_eq!(tree.get(tree.root()).qname, "ext:Bundle");
        assert_eq!(tree.get(tree.root()).children.len(), 2);
    }

    #[test]
    fn test_value_key_is_text() {
        let doc = r#"{"ext:Note": {"@value": "see", "ext:Ref": "A1"}}"#;
        let tree = parse("doc", doc, &DocumentConfig::default()).unwrap();
        let root = tree.get(tree.root());
        assert_eq!(root.text.as_deref(), Some("see"));
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn test_syntax_error_is_malformed() {
        let err = parse("broken", "{\"a\": ", &DocumentConfig::default()).unwrap_err();
        match err {
            MappingError::MalformedDocument { document, location, .. } => {
                assert_eq!(document, "broken");
                assert!(location.starts_with("line 1"));
            }
            other => panic!("Expected MalformedDocument, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_top_level_is_malformed() {
        assert!(parse("arr", "[1, 2]", &DocumentConfig::default()).is_err());
    }
}
