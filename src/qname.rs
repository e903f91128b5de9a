//! Qualified Names
//!
//! Elements are keyed by their prefixed name (`nc:Person`). The prefix is the
//! canonical one from the configured namespace bindings, so tables and
//! documents agree on spelling.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{MappingError, Result};

/// Prefixed element name, e.g. `j:CrimeAugmentation`
pub type QName = String;

fn qname_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z_][\w.\-]*:)?[A-Za-z_][\w.\-]*$").expect("static pattern")
    })
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("static pattern"))
}

/// Check that a string is a well-formed (optionally prefixed) name
pub fn validate(qname: &str) -> Result<()> {
    if qname_pattern().is_match(qname) {
        Ok(())
    } else {
        Err(MappingError::InvalidQName(qname.to_string()))
    }
}

/// Split `prefix:local` into its parts
pub fn split(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// Local part of a qualified name
pub fn local_name(qname: &str) -> &str {
    split(qname).1
}

/// Graph label derived from a qualified name: `nc:Person` -> `nc_Person`
pub fn label_for(qname: &str) -> String {
    label_pattern().replace_all(qname, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_prefixed() {
        assert_eq!(split("nc:Person"), (Some("nc"), "Person"));
        assert_eq!(split("Person"), (None, "Person"));
        assert_eq!(local_name("j:CrimeAugmentation"), "CrimeAugmentation");
    }

    #[test]
    fn test_label_sanitizes() {
        assert_eq!(label_for("nc:Person"), "nc_Person");
        assert_eq!(label_for("my-ext:Thing.Kind"), "my_ext_Thing_Kind");
    }

    #[test]
    fn test_validate() {
        assert!(validate("nc:Person").is_ok());
        assert!(validate("Person").is_ok());
        assert!(validate("nc:").is_err());
        assert!(validate("a b").is_err());
    }
}
