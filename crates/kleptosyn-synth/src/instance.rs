//! Concrete motif instances.

use crate::entity::EntityId;
use crate::money::Amount;
use chrono::{DateTime, Utc};
use kleptosyn_motif::Relation;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const BACKGROUND: &str = "background";

/// Where an edge came from: a motif instance id, or background noise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    Motif(String),
    Background,
}

impl Origin {
    pub fn as_str(&self) -> &str {
        match self {
            Origin::Motif(id) => id,
            Origin::Background => BACKGROUND,
        }
    }

    pub fn is_background(&self) -> bool {
        matches!(self, Origin::Background)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Origin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(if s == BACKGROUND {
            Origin::Background
        } else {
            Origin::Motif(s)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub role: String,
    pub entities: Vec<EntityId>,
}

/// One materialized copy of a template edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteEdge {
    pub spec_index: usize,
    pub copy: usize,
    pub source: EntityId,
    pub target: EntityId,
    pub relation: Relation,
    /// Major currency units for transfers, strength otherwise.
    pub weight: f64,
    /// Exact value for transfers.
    pub amount: Option<Amount>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotifInstance {
    /// `"<template>#<n>"`, `n` counting per template from 0.
    pub id: String,
    pub template: String,
    /// Position of the motif request this instance came from.
    pub template_ordinal: usize,
    pub ordinal: usize,
    pub anchor: DateTime<Utc>,
    pub bindings: Vec<RoleBinding>,
    /// Sorted by `(spec_index, copy)`.
    pub edges: Vec<ConcreteEdge>,
    /// Bound with eligibility flags ignored.
    pub relaxed: bool,
}

impl MotifInstance {
    pub fn instance_id(template: &str, n: usize) -> String {
        format!("{template}#{n}")
    }

    pub fn origin(&self) -> Origin {
        Origin::Motif(self.id.clone())
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.bindings.iter().flat_map(|b| b.entities.iter().copied())
    }

    pub fn binding(&self, role: &str) -> Option<&[EntityId]> {
        self.bindings
            .iter()
            .find(|b| b.role == role)
            .map(|b| b.entities.as_slice())
    }

    /// All copies of one template edge.
    pub fn copies(&self, spec_index: usize) -> impl Iterator<Item = &ConcreteEdge> + '_ {
        self.edges.iter().filter(move |e| e.spec_index == spec_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_a_plain_string() {
        let o = Origin::Motif("mule_burst#3".into());
        assert_eq!(serde_json::to_string(&o).unwrap(), r#""mule_burst#3""#);
        let b: Origin = serde_json::from_str(r#""background""#).unwrap();
        assert!(b.is_background());
    }
}
