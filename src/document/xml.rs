//! XML Instance Parsing
//!
//! Streams a document through `quick-xml` and builds an [`ElementTree`].
//! Element and attribute prefixes are resolved through the in-scope `xmlns`
//! declarations and rewritten to the canonical prefix bound in
//! [`DocumentConfig::namespaces`], so `<core:Person>` and `<nc:Person>` land
//! on the same qname when both prefixes name the same namespace.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

use super::{split_markers, ElementId, ElementTree};
use crate::config::DocumentConfig;
use crate::error::{MappingError, Result};
use crate::qname;

/// Namespace declarations made on one element
type Scope = HashMap<String, String>;

struct TreeBuilder<'a> {
    document_id: &'a str,
    config: &'a DocumentConfig,
    tree: Option<ElementTree>,
    /// Open elements, innermost last
    open: Vec<ElementId>,
    /// One scope per open element
    scopes: Vec<Scope>,
    closed_root: bool,
}

impl<'a> TreeBuilder<'a> {
    fn new(document_id: &'a str, config: &'a DocumentConfig) -> Self {
        Self {
            document_id,
            config,
            tree: None,
            open: Vec::new(),
            scopes: Vec::new(),
            closed_root: false,
        }
    }

    fn malformed(&self, position: u64, message: impl std::fmt::Display) -> MappingError {
        MappingError::malformed(self.document_id, format!("byte {}", position), message)
    }

    /// Namespace URI bound to a prefix (`""` for the default namespace)
    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(prefix))
            .map(String::as_str)
    }

    /// Rewrite a raw name to use the canonical prefix for its namespace
    fn canonical(&self, raw: &str, is_attribute: bool) -> String {
        let (prefix, local) = qname::split(raw);
        // Unprefixed attributes are in no namespace
        if prefix.is_none() && is_attribute {
            return raw.to_string();
        }
        let uri = self.lookup(prefix.unwrap_or(""));
        match uri.and_then(|u| self.config.prefix_for(u)) {
            Some(canonical) => format!("{}:{}", canonical, local),
            None => raw.to_string(),
        }
    }

    fn open(&mut self, start: &BytesStart<'_>, position: u64) -> Result<()> {
        if self.closed_root {
            return Err(self.malformed(position, "content after the document element"));
        }

        let raw_name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| self.malformed(position, e))?
            .to_string();

        // Namespace declarations first, so the element's own prefix resolves
        let mut scope = Scope::new();
        let mut plain = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| self.malformed(position, e))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| self.malformed(position, e))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| self.malformed(position, e))?
                .into_owned();
            if key == "xmlns" {
                scope.insert(String::new(), value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.insert(prefix.to_string(), value);
            } else {
                plain.push((key, value));
            }
        }
        self.scopes.push(scope);

        let qname = self.canonical(&raw_name, false);
        let parent = self.open.last().copied();
        let id = match (self.tree.as_mut(), parent) {
            (Some(tree), Some(parent)) => tree.add_child(parent, qname),
            (Some(_), None) => return Err(self.malformed(position, "multiple document elements")),
            (None, _) => {
                let tree = ElementTree::new(self.document_id, qname);
                let root = tree.root();
                self.tree = Some(tree);
                root
            }
        };

        let attributes: Vec<(String, String)> = plain
            .into_iter()
            .map(|(key, value)| (self.canonical(&key, true), value))
            .collect();
        let config = self.config;
        if let Some(tree) = self.tree.as_mut() {
            let node = tree.get_mut(id);
            for (key, value) in attributes {
                if config.is_id_attribute(&key) {
                    let identity = value.trim();
                    if !identity.is_empty() {
                        node.identity = Some(identity.to_string());
                    }
                } else if config.is_ref_attribute(&key) {
                    node.reference_markers.extend(split_markers(&value));
                } else {
                    node.attributes.insert(key, value);
                }
            }
        }

        self.open.push(id);
        Ok(())
    }

    fn close(&mut self) {
        self.open.pop();
        self.scopes.pop();
        if self.open.is_empty() {
            self.closed_root = true;
        }
    }

    fn text(&mut self, text: &str, position: u64) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        match (self.tree.as_mut(), self.open.last()) {
            (Some(tree), Some(&current)) => {
                tree.get_mut(current).push_text(text);
                Ok(())
            }
            _ => Err(self.malformed(position, "text outside the document element")),
        }
    }

    fn finish(self, position: u64) -> Result<ElementTree> {
        if let Some(&unclosed) = self.open.last() {
            let name = self
                .tree
                .as_ref()
                .map(|t| t.get(unclosed).qname.clone())
                .unwrap_or_default();
            return Err(self.malformed(position, format!("unterminated element <{}>", name)));
        }
        self.tree
            .ok_or_else(|| MappingError::malformed(self.document_id, "end of input", "no document element"))
    }
}

/// Parse an XML instance document
pub fn parse(document_id: &str, content: &str, config: &DocumentConfig) -> Result<ElementTree> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut builder = TreeBuilder::new(document_id, config);
    loop {
        let position = reader.buffer_position() as u64;
        match reader.read_event() {
            Ok(Event::Start(start)) => builder.open(&start, position)?,
            Ok(Event::Empty(start)) => {
                builder.open(&start, position)?;
                builder.close();
            }
            Ok(Event::End(_)) => builder.close(),
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| builder.malformed(position, e))?;
                builder.text(&text, position)?;
            }
            Ok(Event::CData(data)) => {
                let bytes = data.into_inner();
                let text = std::str::from_utf8(&bytes).map_err(|e| builder.malformed(position, e))?;
                builder.text(text, position)?;
            }
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions, doctype
            Ok(_) => {}
            Err(e) => return Err(builder.malformed(position, e)),
        }
    }

    builder.finish(reader.buffer_position() as u64)
}
