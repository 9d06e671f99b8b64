//! Population entities.

use kleptosyn_motif::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Dense id, assigned in sampling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A person or organization. Immutable once sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub type_tag: String,
    pub name: String,
    pub country: String,
    /// Role and risk flags (`mule`, `shell`, `sanctioned`, ...).
    pub flags: BTreeMap<String, bool>,
    /// Injected false positive: looks risky, never bound to a motif.
    pub anomaly: bool,
}

impl Entity {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }

    pub fn has_all(&self, flags: &[String]) -> bool {
        flags.iter().all(|f| self.has_flag(f))
    }
}
