//! The entity pool: an arena of sampled entities plus a usage index.
//!
//! Role binding reads and bumps usage counts under one lock, and a whole
//! instance is reserved atomically: either every role is filled or nothing
//! is recorded.

use crate::config::{ReusePolicy, SelectionPolicy};
use crate::entity::{Entity, EntityId};
use kleptosyn_motif::EntityKind;
use parking_lot::Mutex;
use std::cmp::Ordering;

/// What one role of an instance asks the pool for.
#[derive(Debug, Clone, Copy)]
pub struct RoleRequest<'a> {
    pub kind: EntityKind,
    pub count: usize,
    pub eligibility: &'a [String],
    /// Selection keys `u ∈ (0, 1]`, aligned with [`EntityPool::candidates`].
    pub keys: &'a [f64],
}

/// The first role that could not be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub role: usize,
    pub required: usize,
    pub available: usize,
}

pub struct EntityPool {
    entities: Vec<Entity>,
    /// Non-anomalous entities per kind, ascending id.
    candidates: [Vec<EntityId>; 2],
    /// All entities per kind, ascending id.
    by_kind: [Vec<EntityId>; 2],
    usage: Mutex<Vec<usize>>,
}

fn slot(kind: EntityKind) -> usize {
    match kind {
        EntityKind::Person => 0,
        EntityKind::Organization => 1,
    }
}

impl EntityPool {
    pub fn new(entities: Vec<Entity>) -> Self {
        let mut candidates: [Vec<EntityId>; 2] = Default::default();
        let mut by_kind: [Vec<EntityId>; 2] = Default::default();
        for e in &entities {
            by_kind[slot(e.kind)].push(e.id);
            if !e.anomaly {
                candidates[slot(e.kind)].push(e.id);
            }
        }
        let usage = Mutex::new(vec![0; entities.len()]);
        Self {
            entities,
            candidates,
            by_kind,
            usage,
        }
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities that may fill a role of this kind (anomalies excluded).
    pub fn candidates(&self, kind: EntityKind) -> &[EntityId] {
        &self.candidates[slot(kind)]
    }

    pub fn of_kind(&self, kind: EntityKind) -> &[EntityId] {
        &self.by_kind[slot(kind)]
    }

    pub fn uses(&self, id: EntityId) -> usize {
        self.usage.lock().get(id.index()).copied().unwrap_or(0)
    }

    /// Bind every role or none. With `relaxed`, eligibility flags are ignored.
    pub fn reserve(
        &self,
        roles: &[RoleRequest<'_>],
        policy: &SelectionPolicy,
        reuse: &ReusePolicy,
        relaxed: bool,
    ) -> Result<Vec<Vec<EntityId>>, Shortfall> {
        let mut usage = self.usage.lock();
        let limit = reuse.limit();
        let mut taken: Vec<EntityId> = Vec::new();
        let mut bindings = Vec::with_capacity(roles.len());

        for (r, role) in roles.iter().enumerate() {
            let mut scored: Vec<(f64, EntityId)> = self
                .candidates(role.kind)
                .iter()
                .zip(role.keys)
                .filter(|&(id, _)| usage[id.index()] < limit && !taken.contains(id))
                .filter(|&(id, _)| relaxed || self.entities[id.index()].has_all(role.eligibility))
                .map(|(&id, &u)| (u.ln() / policy.weight(usage[id.index()]), id))
                .collect();

            if scored.len() < role.count {
                return Err(Shortfall {
                    role: r,
                    required: role.count,
                    available: scored.len(),
                });
            }

            // Highest key first; equal keys go to the lower id.
            scored.sort_by(|a, b| match b.0.total_cmp(&a.0) {
                Ordering::Equal => a.1.cmp(&b.1),
                other => other,
            });
            let chosen: Vec<EntityId> = scored[..role.count].iter().map(|&(_, id)| id).collect();
            taken.extend_from_slice(&chosen);
            bindings.push(chosen);
        }

        for id in &taken {
            usage[id.index()] += 1;
        }
        Ok(bindings)
    }

    /// Undo a reservation made by [`EntityPool::reserve`].
    pub fn release(&self, bindings: &[Vec<EntityId>]) {
        let mut usage = self.usage.lock();
        for id in bindings.iter().flatten() {
            if let Some(n) = usage.get_mut(id.index()) {
                *n = n.saturating_sub(1);
            }
        }
    }

    pub fn into_entities(self) -> Vec<Entity> {
        self.entities
    }
}
