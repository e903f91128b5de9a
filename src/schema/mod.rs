//! Classification Table
//!
//! Read-only lookup from element qname to its role in the projection:
//! object, association, property or augmentation. Produced by schema
//! analysis (see [`builder`]) or loaded from JSON, and consumed by every
//! later stage.
//!
//! A qname missing from the table is an augmentation. That is the working
//! definition of "augmentation" here, whatever the element is called.

pub mod builder;
pub mod selection;

pub use builder::{ChildDecl, Classifier, ElementDecl, SchemaIndex};
pub use selection::SelectionSet;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::qname::{self, QName};

// =============================================================================
// Role
// =============================================================================

/// How an element participates in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Entity; materializes as a node when selected
    Object,
    /// Relationship between referenced entities; projected as an edge when possible
    Association,
    /// Scalar or simple-content value; always flattened onto its owner
    Property,
    /// Extension content; flattened with the augmentation prefix
    Augmentation,
}

impl Role {
    /// Whether the user may choose to materialize elements of this role
    pub fn is_selectable(&self) -> bool {
        matches!(self, Role::Object | Role::Association)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Object => write!(f, "object"),
            Role::Association => write!(f, "association"),
            Role::Property => write!(f, "property"),
            Role::Augmentation => write!(f, "augmentation"),
        }
    }
}

// =============================================================================
// Cardinality
// =============================================================================

/// Upper occurrence bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMaxOccurs", into = "RawMaxOccurs")]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    /// Whether more than one occurrence is allowed
    pub fn is_many(&self) -> bool {
        match self {
            MaxOccurs::Bounded(n) => *n > 1,
            MaxOccurs::Unbounded => true,
        }
    }

    /// The larger of two bounds
    pub fn max(self, other: MaxOccurs) -> MaxOccurs {
        match (self, other) {
            (MaxOccurs::Bounded(a), MaxOccurs::Bounded(b)) => MaxOccurs::Bounded(a.max(b)),
            _ => MaxOccurs::Unbounded,
        }
    }
}

/// Wire form of `maxOccurs`: a count or the word "unbounded"
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawMaxOccurs {
    Count(u32),
    Word(String),
}

impl TryFrom<RawMaxOccurs> for MaxOccurs {
    type Error = String;

    fn try_from(raw: RawMaxOccurs) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawMaxOccurs::Count(n) => Ok(MaxOccurs::Bounded(n)),
            RawMaxOccurs::Word(word) if word == "unbounded" => Ok(MaxOccurs::Unbounded),
            RawMaxOccurs::Word(word) => word
                .parse::<u32>()
                .map(MaxOccurs::Bounded)
                .map_err(|_| format!("invalid maxOccurs: {}", word)),
        }
    }
}

impl From<MaxOccurs> for RawMaxOccurs {
    fn from(max: MaxOccurs) -> Self {
        match max {
            MaxOccurs::Bounded(n) => RawMaxOccurs::Count(n),
            MaxOccurs::Unbounded => RawMaxOccurs::Word("unbounded".to_string()),
        }
    }
}

/// Occurrence bounds (`minOccurs`, `maxOccurs`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cardinality {
    #[serde(default)]
    pub min_occurs: u32,
    #[serde(default = "default_max_occurs")]
    pub max_occurs: MaxOccurs,
}

fn default_max_occurs() -> MaxOccurs {
    MaxOccurs::Bounded(1)
}

impl Default for Cardinality {
    fn default() -> Self {
        Self {
            min_occurs: 0,
            max_occurs: default_max_occurs(),
        }
    }
}

impl Cardinality {
    pub fn new(min_occurs: u32, max_occurs: MaxOccurs) -> Self {
        Self { min_occurs, max_occurs }
    }

    /// Exactly one occurrence
    pub fn one() -> Self {
        Self::new(1, MaxOccurs::Bounded(1))
    }

    /// Widen to cover both bounds
    pub fn union(self, other: Cardinality) -> Self {
        Self {
            min_occurs: self.min_occurs.min(other.min_occurs),
            max_occurs: self.max_occurs.max(other.max_occurs),
        }
    }
}

// =============================================================================
// Classification Entry
// =============================================================================

/// Classification of one qualified element name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEntry {
    pub qname: QName,
    pub role: Role,
    /// Participant element names, in declaration order (associations only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<QName>,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Label for edges projected from this association
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_label: Option<String>,
}

impl ClassificationEntry {
    pub fn new(qname: impl Into<QName>, role: Role) -> Self {
        Self {
            qname: qname.into(),
            role,
            endpoints: Vec::new(),
            cardinality: Cardinality::default(),
            edge_label: None,
        }
    }

    pub fn object(qname: impl Into<QName>) -> Self {
        Self::new(qname, Role::Object)
    }

    pub fn property(qname: impl Into<QName>) -> Self {
        Self::new(qname, Role::Property)
    }

    pub fn augmentation(qname: impl Into<QName>) -> Self {
        Self::new(qname, Role::Augmentation)
    }

    pub fn association<I, S>(qname: impl Into<QName>, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<QName>,
    {
        let mut entry = Self::new(qname, Role::Association);
        entry.endpoints = endpoints.into_iter().map(Into::into).collect();
        entry
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn with_edge_label(mut self, label: impl Into<String>) -> Self {
        self.edge_label = Some(label.into());
        self
    }

    /// Position of a qname among the declared endpoints
    pub fn endpoint_rank(&self, qname: &str) -> Option<usize> {
        self.endpoints.iter().position(|e| e == qname)
    }

    /// Edge label for this association
    pub fn association_label(&self) -> String {
        self.edge_label
            .clone()
            .unwrap_or_else(|| qname::label_for(&self.qname))
    }
}

// =============================================================================
// Classification Table
// =============================================================================

/// qname -> classification lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ClassificationEntry>", into = "Vec<ClassificationEntry>")]
pub struct ClassificationTable {
    entries: HashMap<QName, ClassificationEntry>,
}

impl From<Vec<ClassificationEntry>> for ClassificationTable {
    fn from(entries: Vec<ClassificationEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.insert(entry);
        }
        table
    }
}

impl From<ClassificationTable> for Vec<ClassificationEntry> {
    fn from(table: ClassificationTable) -> Self {
        let mut entries: Vec<_> = table.entries.into_values().collect();
        entries.sort_by(|a, b| a.qname.cmp(&b.qname));
        entries
    }
}

impl FromIterator<ClassificationEntry> for ClassificationTable {
    fn from_iter<T: IntoIterator<Item = ClassificationEntry>>(iter: T) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl ClassificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Later entries for the same qname replace earlier ones.
    pub fn insert(&mut self, entry: ClassificationEntry) -> Option<ClassificationEntry> {
        self.entries.insert(entry.qname.clone(), entry)
    }

    /// Builder-style insert
    pub fn with(mut self, entry: ClassificationEntry) -> Self {
        self.insert(entry);
        self
    }

    /// Get the entry for a qname
    pub fn get(&self, qname: &str) -> Option<&ClassificationEntry> {
        self.entries.get(qname)
    }

    /// Whether the schema knows this element
    pub fn contains(&self, qname: &str) -> bool {
        self.entries.contains_key(qname)
    }

    /// Effective role; absent names are augmentations
    pub fn role_of(&self, qname: &str) -> Role {
        self.entries
            .get(qname)
            .map(|e| e.role)
            .unwrap_or(Role::Augmentation)
    }

    /// Declared cardinality, if the qname is known
    pub fn cardinality_of(&self, qname: &str) -> Option<Cardinality> {
        self.entries.get(qname).map(|e| e.cardinality)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted by qname
    pub fn entries(&self) -> Vec<&ClassificationEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.qname.cmp(&b.qname));
        entries
    }

    /// All qnames with a given role, sorted
    pub fn with_role(&self, role: Role) -> Vec<&QName> {
        let mut names: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.role == role)
            .map(|e| &e.qname)
            .collect();
        names.sort();
        names
    }

    /// Parse a table from its JSON form (an array of entries). Entry and
    /// endpoint names must be well-formed qnames.
    pub fn from_json(content: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(content)?;
        for entry in table.entries.values() {
            qname::validate(&entry.qname)?;
            for endpoint in &entry.endpoints {
                qname::validate(endpoint)?;
            }
        }
        Ok(table)
    }

    /// Load a table from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_qname_is_augmentation() {
        let table = ClassificationTable::new().with(ClassificationEntry::object("nc:Person"));
        assert_eq!(table.role_of("nc:Person"), Role::Object);
        assert_eq!(table.role_of("ext:Anything"), Role::Augmentation);
    }

    #[test]
    fn test_table_from_json() {
        let table = ClassificationTable::from_json(
            r#"[
                {"qname": "nc:Person", "role": "object"},
                {"qname": "nc:PersonAssociation", "role": "association",
                 "endpoints": ["nc:Person", "nc:Person"],
                 "cardinality": {"minOccurs": 0, "maxOccurs": "unbounded"}},
                {"qname": "nc:PersonGivenName", "role": "property",
                 "cardinality": {"maxOccurs": 3}}
            ]"#,
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        let assoc = table.get("nc:PersonAssociation").unwrap();
        assert_eq!(assoc.endpoints.len(), 2);
        assert_eq!(assoc.cardinality.max_occurs, MaxOccurs::Unbounded);
        assert_eq!(
            table.cardinality_of("nc:PersonGivenName").unwrap().max_occurs,
            MaxOccurs::Bounded(3)
        );
        assert_eq!(table.with_role(Role::Property), vec!["nc:PersonGivenName"]);
    }

    #[test]
    fn test_invalid_max_occurs_rejected() {
        let result = ClassificationTable::from_json(
            r#"[{"qname": "nc:Person", "role": "object", "cardinality": {"maxOccurs": "lots"}}]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_qname_rejected() {
        let result = ClassificationTable::from_json(
            r#"[{"qname": "nc:PersonAssociation", "role": "association", "endpoints": ["nc:Per son"]}]"#,
        );
        assert!(matches!(result, Err(crate::error::MappingError::InvalidQName(q)) if q == "nc:Per son"));
    }

    #[test]
    fn test_table_json_is_sorted() {
        let table = ClassificationTable::new()
            .with(ClassificationEntry::property("nc:Z"))
            .with(ClassificationEntry::object("nc:A"));
        let json = table.to_json().unwrap();
        assert!(json.find("nc:A").unwrap() < json.find("nc:Z").unwrap());
        assert_eq!(ClassificationTable::from_json(&json).unwrap(), table);
    }

    #[test]
    fn test_cardinality_union() {
        let a = Cardinality::one();
        let b = Cardinality::new(0, MaxOccurs::Bounded(4));
        let merged = a.union(b);
        assert_eq!(merged.min_occurs, 0);
        assert_eq!(merged.max_occurs, MaxOccurs::Bounded(4));
        assert!(merged.max_occurs.is_many());
        assert_eq!(merged.union(Cardinality::new(2, MaxOccurs::Unbounded)).max_occurs, MaxOccurs::Unbounded);
    }

    #[test]
    fn test_association_label() {
        let entry = ClassificationEntry::association("nc:PersonAssociation", ["nc:Person"]);
        assert_eq!(entry.association_label(), "nc_PersonAssociation");
        assert_eq!(entry.with_edge_label("KNOWS").association_label(), "KNOWS");
    }
}
