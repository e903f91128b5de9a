//! Selection Set
//!
//! Which qnames the user chose to materialize as nodes. Objects and
//! associations are selected unless explicitly deselected ("Skip" in the
//! designer). Properties and augmentations cannot be selected at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{ClassificationTable, Role};
use crate::error::Result;
use crate::qname::{self, QName};

/// Per-qname selection overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet {
    overrides: BTreeMap<QName, bool>,
}

impl SelectionSet {
    /// Empty set: every object and association selected
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly select a qname
    pub fn select(mut self, qname: impl Into<QName>) -> Self {
        self.overrides.insert(qname.into(), true);
        self
    }

    /// Deselect a qname so its elements flatten into their owner
    pub fn deselect(mut self, qname: impl Into<QName>) -> Self {
        self.overrides.insert(qname.into(), false);
        self
    }

    /// Set the selection state of a qname
    pub fn set(&mut self, qname: impl Into<QName>, selected: bool) {
        self.overrides.insert(qname.into(), selected);
    }

    /// Whether an element with this qname and role materializes
    pub fn is_selected(&self, qname: &str, role: Role) -> bool {
        if !role.is_selectable() {
            return false;
        }
        self.overrides.get(qname).copied().unwrap_or(true)
    }

    /// Convenience lookup through the classification table
    pub fn is_selected_in(&self, table: &ClassificationTable, qname: &str) -> bool {
        self.is_selected(qname, table.role_of(qname))
    }

    /// Overrides naming qnames that can never be selected
    pub fn ineffective_overrides<'a>(&'a self, table: &ClassificationTable) -> Vec<&'a QName> {
        self.overrides
            .iter()
            .filter(|(qname, selected)| **selected && !table.role_of(qname).is_selectable())
            .map(|(qname, _)| qname)
            .collect()
    }

    /// Parse from a JSON object of qname -> bool
    pub fn from_json(content: &str) -> Result<Self> {
        let selection: Self = serde_json::from_str(content)?;
        for name in selection.overrides.keys() {
            qname::validate(name)?;
        }
        Ok(selection)
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
