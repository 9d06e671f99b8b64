//! Motif template model.
//!
//! A template is read-only configuration: role slots, a structure (directed
//! edges between roles) and timing (latencies plus predecessor edges). The
//! JSON form is what users write in motif files:
//!
//! ```json
//! {
//!   "name": "fan_out_burst",
//!   "shape": { "burst": { "window_hours": 2.0 } },
//!   "roles": [
//!     { "name": "originator", "kind": "organization" },
//!     { "name": "beneficiary", "kind": "person",
//!       "cardinality": { "one_or_more": { "min": 5, "max": 5 } } }
//!   ],
//!   "edges": [
//!     { "id": "payout", "source": "originator", "target": "beneficiary",
//!       "relation": "transfer",
//!       "weight": { "dist": "log_normal", "median": 9500.0, "sigma": 0.3 } }
//!   ],
//!   "temporal": [
//!     { "edge": "payout", "latency": { "dist": "exponential", "mean": 0.5 } }
//!   ]
//! }
//! ```

use crate::distribution::Distribution;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Person, EntityKind::Organization];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "organization",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many entities a role binds per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    ExactlyOne,
    /// Between `min` and `max` entities (inclusive), drawn per instance.
    OneOrMore { min: usize, max: usize },
}

impl Cardinality {
    pub fn bounds(self) -> (usize, usize) {
        match self {
            Cardinality::ExactlyOne => (1, 1),
            Cardinality::OneOrMore { min, max } => (min, max),
        }
    }

    pub fn is_single(self) -> bool {
        matches!(self, Cardinality::ExactlyOne)
    }
}

/// A named position in a motif, bound to concrete entities at instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSlot {
    pub name: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Flags a candidate must carry (all of them) to be eligible.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eligibility: Vec<String>,
}

impl RoleSlot {
    pub fn single(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            cardinality: Cardinality::ExactlyOne,
            eligibility: Vec::new(),
        }
    }

    pub fn many(name: impl Into<String>, kind: EntityKind, min: usize, max: usize) -> Self {
        Self {
            cardinality: Cardinality::OneOrMore { min, max },
            ..Self::single(name, kind)
        }
    }

    pub fn requiring(mut self, flag: impl Into<String>) -> Self {
        self.eligibility.push(flag.into());
        self
    }
}

/// Relation types carried by graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Transfer,
    Ownership,
    Employment,
    Beneficiary,
    Control,
    Associate,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Transfer => "transfer",
            Relation::Ownership => "ownership",
            Relation::Employment => "employment",
            Relation::Beneficiary => "beneficiary",
            Relation::Control => "control",
            Relation::Associate => "associate",
        }
    }

    /// Transfers always carry a timestamp; other relations only when a
    /// template gives them timing.
    pub fn is_timed(self) -> bool {
        matches!(self, Relation::Transfer)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge between two roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relation: Relation,
    /// Required unless the value is derived by bleed-off from a predecessor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Distribution>,
}

impl EdgeSpec {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        relation: Relation,
        weight: Option<Distribution>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            relation,
            weight,
        }
    }
}

/// Timing of one edge relative to its predecessors (or the instance anchor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSpec {
    pub edge: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    /// Latency in hours, added on top of the latest predecessor timestamp.
    #[serde(default = "default_latency")]
    pub latency: Distribution,
}

/// Latency used for timed edges without an explicit temporal entry.
pub fn default_latency() -> Distribution {
    Distribution::exponential(1.0)
}

/// The tagged motif families.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotifShape {
    /// Pure structure; edges follow their declared timing if any.
    #[default]
    Static,
    /// Layering chain: each hop forwards `incoming * (1 - bleed_fraction)`.
    Chain { bleed_fraction: f64 },
    /// Every timed edge lands within `window_hours` of the instance anchor.
    Burst { window_hours: f64 },
}

impl MotifShape {
    pub fn label(&self) -> &'static str {
        match self {
            MotifShape::Static => "static",
            MotifShape::Chain { .. } => "chain",
            MotifShape::Burst { .. } => "burst",
        }
    }

    pub fn bleed_fraction(&self) -> Option<f64> {
        match *self {
            MotifShape::Chain { bleed_fraction } => Some(bleed_fraction),
            _ => None,
        }
    }

    pub fn window_hours(&self) -> Option<f64> {
        match *self {
            MotifShape::Burst { window_hours } => Some(window_hours),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotifTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub shape: MotifShape,
    pub roles: Vec<RoleSlot>,
    pub edges: Vec<EdgeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temporal: Vec<TemporalSpec>,
}

impl MotifTemplate {
    pub fn new(name: impl Into<String>, shape: MotifShape) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shape,
            roles: Vec::new(),
            edges: Vec::new(),
            temporal: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn role(mut self, role: RoleSlot) -> Self {
        self.roles.push(role);
        self
    }

    pub fn edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn timing(mut self, edge: &str, after: &[&str], latency: Distribution) -> Self {
        self.temporal.push(TemporalSpec {
            edge: edge.to_string(),
            after: after.iter().map(|s| s.to_string()).collect(),
            latency,
        });
        self
    }

    pub fn role_index(&self, name: &str) -> Option<usize> {
        self.roles.iter().position(|r| r.name == name)
    }

    pub fn edge_index(&self, id: &str) -> Option<usize> {
        self.edges.iter().position(|e| e.id == id)
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
