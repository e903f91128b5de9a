//! Classification Table Builder
//!
//! Derives a [`ClassificationTable`] from the element index that schema
//! analysis produces. Parsing XSD/CMF itself is upstream; this module only
//! consumes the already-extracted declarations.
//!
//! Classification runs in two passes: roles first, then association
//! endpoints (which need the roles of the association's children).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use super::{Cardinality, ClassificationEntry, ClassificationTable, Role};
use crate::error::Result;
use crate::qname::{self, QName};

// =============================================================================
// Schema Index (input)
// =============================================================================

/// Element declarations extracted by schema analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaIndex {
    /// Prefix -> namespace URI
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
    pub elements: Vec<ElementDecl>,
}

/// One element declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDecl {
    pub qname: QName,
    /// Declared type, e.g. `nc:PersonType`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_qname: Option<QName>,
    /// Base type the declared type derives from, e.g. `structures:ObjectType`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<QName>,
    /// Simple content (text value, no child elements)
    #[serde(default)]
    pub simple_content: bool,
    /// Child element declarations of the element's type, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildDecl>,
}

/// A child element slot inside a complex type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildDecl {
    pub qname: QName,
    #[serde(flatten)]
    pub cardinality: Cardinality,
}

impl SchemaIndex {
    /// Parse a schema index from JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let index: Self = serde_json::from_str(content)?;
        for element in &index.elements {
            qname::validate(&element.qname)?;
            for child in &element.children {
                qname::validate(&child.qname)?;
            }
        }
        Ok(index)
    }

    /// Load a schema index from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

fn local_ends_with(name: Option<&QName>, suffix: &str) -> bool {
    name.map(|n| qname::local_name(n).ends_with(suffix))
        .unwrap_or(false)
}

impl ElementDecl {
    fn is_augmentation(&self) -> bool {
        let local = qname::local_name(&self.qname);
        local.ends_with("Augmentation")
            || local.ends_with("AugmentationPoint")
            || local_ends_with(self.base_type.as_ref(), "AugmentationType")
            || local_ends_with(self.type_qname.as_ref(), "AugmentationType")
    }

    fn is_association(&self) -> bool {
        local_ends_with(self.base_type.as_ref(), "AssociationType")
            || local_ends_with(self.type_qname.as_ref(), "AssociationType")
    }

    fn is_simple(&self) -> bool {
        self.simple_content || self.children.is_empty()
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Builds a classification table from a schema index
pub struct Classifier<'a> {
    index: &'a SchemaIndex,
}

impl<'a> Classifier<'a> {
    pub fn new(index: &'a SchemaIndex) -> Self {
        Self { index }
    }

    /// Role for a single declaration, ignoring its relationships
    pub fn classify_role(decl: &ElementDecl) -> Role {
        if decl.is_augmentation() {
            Role::Augmentation
        } else if decl.is_association() {
            Role::Association
        } else if decl.is_simple() {
            Role::Property
        } else {
            Role::Object
        }
    }

    /// Classify every declared element
    pub fn build(&self) -> ClassificationTable {
        let mut decls: HashMap<&str, &ElementDecl> = HashMap::with_capacity(self.index.elements.len());
        for decl in &self.index.elements {
            if decls.insert(decl.qname.as_str(), decl).is_some() {
                warn!(qname = %decl.qname, "duplicate element declaration; keeping the last one");
            }
        }

        // First pass: roles
        let roles: HashMap<&str, Role> = decls
            .iter()
            .map(|(name, decl)| (*name, Self::classify_role(decl)))
            .collect();

        // Cardinality aggregated over every slot an element appears in
        let mut cardinalities: HashMap<&str, Cardinality> = HashMap::new();
        for decl in decls.values() {
            for child in &decl.children {
                cardinalities
                    .entry(child.qname.as_str())
                    .and_modify(|c| *c = c.union(child.cardinality))
                    .or_insert(child.cardinality);
            }
        }

        // Second pass: entries with endpoints
        let mut table = ClassificationTable::new();
        for (name, decl) in &decls {
            let role = roles[name];
            let mut entry = ClassificationEntry::new(decl.qname.clone(), role)
                .with_cardinality(cardinalities.get(name).copied().unwrap_or_else(Cardinality::one));

            if role == Role::Association {
                entry.endpoints = decl
                    .children
                    .iter()
                    .filter(|child| roles.get(child.qname.as_str()) == Some(&Role::Object))
                    .map(|child| child.qname.clone())
                    .collect();
                if entry.endpoints.len() < 2 {
                    debug!(
                        qname = %decl.qname,
                        endpoints = entry.endpoints.len(),
                        "association declares fewer than two object endpoints"
                    );
                }
            }

            table.insert(entry);
        }

        debug!(entries = table.len(), "built classification table");
        table
    }
}

impl ClassificationTable {
    /// Build a table from a schema index
    pub fn from_schema_index(index: &SchemaIndex) -> Self {
        Classifier::new(index).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MaxOccurs;

    fn index() -> SchemaIndex {
        SchemaIndex::from_json(
            r#"{
                "elements": [
                    {"qname": "nc:Person", "type": "nc:PersonType", "baseType": "structures:ObjectType",
                     "children": [
                        {"qname": "nc:PersonName", "minOccurs": 0, "maxOccurs": "unbounded"},
                        {"qname": "j:PersonAugmentation"}
                     ]},
                    {"qname": "nc:PersonName", "type": "nc:TextType", "simpleContent": true},
                    {"qname": "j:PersonAugmentation", "type": "j:PersonAugmentationType",
                     "children": [{"qname": "j:PersonAdultIndicator"}]},
                    {"qname": "j:PersonAdultIndicator", "type": "niem-xs:boolean"},
                    {"qname": "nc:PersonAssociation", "type": "nc:PersonAssociationType",
                     "baseType": "structures:AssociationType",
                     "children": [
                        {"qname": "nc:Person", "minOccurs": 2, "maxOccurs": 2},
                        {"qname": "nc:PersonName"}
                     ]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_roles_derived_from_types() {
        let table = ClassificationTable::from_schema_index(&index());
        assert_eq!(table.role_of("nc:Person"), Role::Object);
        assert_eq!(table.role_of("nc:PersonName"), Role::Property);
        assert_eq!(table.role_of("j:PersonAugmentation"), Role::Augmentation);
        assert_eq!(table.role_of("j:PersonAdultIndicator"), Role::Property);
        assert_eq!(table.role_of("nc:PersonAssociation"), Role::Association);
    }

    #[test]
    fn test_association_endpoints_are_object_children() {
        let table = ClassificationTable::from_schema_index(&index());
        let assoc = table.get("nc:PersonAssociation").unwrap();
        assert_eq!(assoc.endpoints, vec!["nc:Person".to_string()]);
    }

    #[test]
    fn test_cardinality_aggregates_over_slots() {
        let table = ClassificationTable::from_schema_index(&index());
        let name = table.cardinality_of("nc:PersonName").unwrap();
        assert_eq!(name.min_occurs, 0);
        assert_eq!(name.max_occurs, MaxOccurs::Unbounded);

        let person = table.cardinality_of("nc:Person").unwrap();
        assert_eq!(person, Cardinality::new(2, MaxOccurs::Bounded(2)));

        // Association is never a child here, so it defaults to exactly one
        assert_eq!(table.cardinality_of("nc:PersonAssociation").unwrap(), Cardinality::one());
    }
}
