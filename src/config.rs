//! Configuration management for the mapping engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (niem-graph.toml)
//! - Environment variables (NIEM_GRAPH__*)
//!
//! ## Example config file (niem-graph.toml):
//! ```toml
//! [projection]
//! augmentation_prefix = "aug_"
//! path_separator = "_"
//!
//! [validation]
//! strict_orphans = true
//!
//! [document]
//! id_attributes = ["structures:id"]
//! ref_attributes = ["structures:ref", "structures:uri"]
//!
//! [document.namespaces]
//! nc = "https://docs.oasis-open.org/niemopen/ns/model/niem-core/6.0/"
//! structures = "https://docs.oasis-open.org/niemopen/ns/model/structures/6.0/"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Main configuration for the mapping engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Projection settings
    #[serde(default)]
    pub projection: ProjectionConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Document parsing settings
    #[serde(default)]
    pub document: DocumentConfig,
}

/// How flattened content is named on nodes and edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Prefix for keys sourced from augmentation content
    #[serde(default = "default_augmentation_prefix")]
    pub augmentation_prefix: String,

    /// Separator between path segments of flattened keys
    #[serde(default = "default_path_separator")]
    pub path_separator: String,

    /// Key used for text content of a materialized element
    #[serde(default = "default_text_property")]
    pub text_property: String,

    /// Serialize a single occurrence as a list when the table declares maxOccurs > 1
    #[serde(default = "default_true")]
    pub lists_follow_cardinality: bool,
}

/// Validation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Fail the whole batch when orphan nodes are found
    #[serde(default)]
    pub strict_orphans: bool,
}

/// Document parsing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Attribute names carrying an element's identity
    #[serde(default = "default_id_attributes")]
    pub id_attributes: Vec<String>,

    /// Attribute names carrying references to other elements
    #[serde(default = "default_ref_attributes")]
    pub ref_attributes: Vec<String>,

    /// Canonical prefix -> namespace URI bindings
    #[serde(default = "default_namespaces")]
    pub namespaces: BTreeMap<String, String>,
}

// Default value functions
fn default_augmentation_prefix() -> String {
    "aug_".to_string()
}

fn default_path_separator() -> String {
    "_".to_string()
}

fn default_text_property() -> String {
    "value".to_string()
}

fn default_true() -> bool {
    true
}

fn default_id_attributes() -> Vec<String> {
    vec!["structures:id".to_string()]
}

fn default_ref_attributes() -> Vec<String> {
    vec!["structures:ref".to_string(), "structures:uri".to_string()]
}

fn default_namespaces() -> BTreeMap<String, String> {
    [
        ("structures", "https://docs.oasis-open.org/niemopen/ns/model/structures/6.0/"),
        ("nc", "https://docs.oasis-open.org/niemopen/ns/model/niem-core/6.0/"),
        ("j", "https://docs.oasis-open.org/niemopen/ns/model/domains/justice/6.0/"),
        ("xsi", "http://www.w3.org/2001/XMLSchema-instance"),
    ]
    .into_iter()
    .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
    .collect()
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            augmentation_prefix: default_augmentation_prefix(),
            path_separator: default_path_separator(),
            text_property: default_text_property(),
            lists_follow_cardinality: true,
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            id_attributes: default_id_attributes(),
            ref_attributes: default_ref_attributes(),
            namespaces: default_namespaces(),
        }
    }
}

impl DocumentConfig {
    /// Canonical prefix for a namespace URI, if one is bound
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(_, bound)| bound.as_str() == uri)
            .map(|(prefix, _)| prefix.as_str())
    }

    /// Whether an attribute name marks identity
    pub fn is_id_attribute(&self, name: &str) -> bool {
        self.id_attributes.iter().any(|a| a == name)
    }

    /// Whether an attribute name marks a reference
    pub fn is_ref_attribute(&self, name: &str) -> bool {
        self.ref_attributes.iter().any(|a| a == name)
    }
}

impl MappingConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "niem-graph.toml",
            ".niem-graph.toml",
            "config/niem-graph.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "niem", "niem-graph") {
            let xdg_config = config_dir.config_dir().join("niem-graph.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Load from environment variables (NIEM_GRAPH__*)
        builder = builder.add_source(
            Environment::with_prefix("NIEM_GRAPH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MappingConfig::default();
        assert_eq!(config.projection.augmentation_prefix, "aug_");
        assert!(!config.validation.strict_orphans);
        assert!(config.document.is_ref_attribute("structures:uri"));
        assert_eq!(
            config.document.prefix_for("http://www.w3.org/2001/XMLSchema-instance"),
            Some("xsi")
        );
    }

    #[test]
    fn test_serialize_config() {
        let config = MappingConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[projection]"));
        assert!(toml_str.contains("[validation]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.toml");
        std::fs::write(
            &path,
            "[validation]\nstrict_orphans = true\n\n[projection]\naugmentation_prefix = \"ext_\"\n",
        )
        .unwrap();

        let config = MappingConfig::load_from(Some(&path)).unwrap();
        assert!(config.validation.strict_orphans);
        assert_eq!(config.projection.augmentation_prefix, "ext_");
        assert_eq!(config.projection.path_separator, "_");
    }

    #[test]
    fn test_save_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = MappingConfig::default();
        config.validation.strict_orphans = true;
        config.save(&path).unwrap();

        let loaded = MappingConfig::load_from(Some(&path)).unwrap();
        assert!(loaded.validation.strict_orphans);
        assert_eq!(loaded.document.namespaces, config.document.namespaces);
    }
}
