//! Controlled vocabularies for entity types and countries.
//!
//! The generator treats both as opaque finite sets and only checks
//! membership.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub trait Vocabulary {
    fn contains(&self, term: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermSet(BTreeSet<String>);

impl TermSet {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(terms.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }
}

impl Vocabulary for TermSet {
    fn contains(&self, term: &str) -> bool {
        self.0.contains(term)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    #[serde(default = "default_entity_types")]
    pub entity_types: TermSet,
    #[serde(default = "default_countries")]
    pub countries: TermSet,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            entity_types: default_entity_types(),
            countries: default_countries(),
        }
    }
}

fn default_entity_types() -> TermSet {
    TermSet::new(["Person", "Company", "Organization", "LegalEntity"])
}

// Jurisdictions that show up in the leak datasets the defaults are tuned on.
fn default_countries() -> TermSet {
    TermSet::new([
        "AE", "AT", "AZ", "BS", "BZ", "CH", "CY", "CZ", "DE", "EE", "ES", "FR", "GB", "GG",
        "HK", "IE", "IM", "IT", "JE", "KY", "KZ", "LI", "LT", "LU", "LV", "MC", "MT", "NL", "PA",
        "PL", "RU", "SC", "SG", "UA", "US", "VG", "WS",
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vocabulary_membership() {
        let v = VocabularyConfig::default();
        assert!(v.entity_types.contains("Company"));
        assert!(!v.entity_types.contains("company"));
        assert!(v.countries.contains("CY"));
        assert!(!v.countries.contains("XX"));
    }

    #[test]
    fn term_set_is_a_plain_json_array() {
        let t: TermSet = serde_json::from_str(r#"["b","a","a"]"#).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"["a","b"]"#);
    }
}
