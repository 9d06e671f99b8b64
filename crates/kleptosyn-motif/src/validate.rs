//! Template validation.
//!
//! A template that passes validation is wrapped into a [`ValidatedTemplate`]
//! which carries the resolved timing DAG (predecessor indices, per-edge
//! latency, a stable topological order) so instantiation never has to
//! re-resolve names.

use crate::distribution::Distribution;
use crate::template::{default_latency, MotifShape, MotifTemplate, RoleSlot};
use std::collections::{BTreeSet, HashSet};

/// The specific rule a template broke.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MotifRule {
    #[error("template name must not be empty")]
    EmptyName,
    #[error("template declares no roles")]
    NoRoles,
    #[error("template declares no edges")]
    NoEdges,
    #[error("role `{0}` is declared more than once")]
    DuplicateRole(String),
    #[error("edge `{0}` is declared more than once")]
    DuplicateEdge(String),
    #[error("edge `{edge}` references undeclared role `{role}`")]
    UnknownRole { edge: String, role: String },
    #[error("edge `{0}` connects a role to itself")]
    SelfLoop(String),
    #[error("role `{role}` has invalid cardinality {min}..={max}")]
    InvalidCardinality { role: String, min: usize, max: usize },
    #[error("temporal entry references undeclared edge `{0}`")]
    UnknownEdge(String),
    #[error("edge `{0}` has more than one temporal entry")]
    DuplicateTemporal(String),
    #[error("edge `{0}` lists itself as a predecessor")]
    SelfPredecessor(String),
    #[error("temporal predecessors form a cycle through {0:?}")]
    TemporalCycle(Vec<String>),
    #[error("edge `{0}` needs a weight distribution")]
    MissingWeight(String),
    #[error("{context}: {message}")]
    InvalidDistribution { context: String, message: String },
    #[error("bleed fraction {0} must lie in [0, 1)")]
    InvalidBleedFraction(f64),
    #[error("chain role `{0}` must bind exactly one entity")]
    ChainRoleNotSingle(String),
    #[error("chain edge `{0}` has more than one predecessor")]
    ChainFanIn(String),
    #[error("burst window {0}h must be positive")]
    InvalidBurstWindow(f64),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("motif `{template}` is invalid: {rule}")]
pub struct MotifDefinitionError {
    pub template: String,
    pub rule: MotifRule,
}

/// A template plus its resolved timing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTemplate {
    template: MotifTemplate,
    /// Per edge: (source role index, target role index).
    endpoints: Vec<(usize, usize)>,
    predecessors: Vec<Vec<usize>>,
    latencies: Vec<Distribution>,
    timed: Vec<bool>,
    order: Vec<usize>,
}

impl ValidatedTemplate {
    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn template(&self) -> &MotifTemplate {
        &self.template
    }

    pub fn shape(&self) -> MotifShape {
        self.template.shape
    }

    pub fn roles(&self) -> &[RoleSlot] {
        &self.template.roles
    }

    pub fn endpoints(&self, edge: usize) -> (usize, usize) {
        self.endpoints[edge]
    }

    pub fn predecessors(&self, edge: usize) -> &[usize] {
        &self.predecessors[edge]
    }

    pub fn latency(&self, edge: usize) -> &Distribution {
        &self.latencies[edge]
    }

    /// Whether concrete copies of this edge get a timestamp.
    pub fn is_timed(&self, edge: usize) -> bool {
        self.timed[edge]
    }

    /// Edge indices in a topological order of the timing DAG (ties by
    /// declaration order).
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    /// Whether this edge's value is derived by bleed-off instead of drawn.
    pub fn is_derived(&self, edge: usize) -> bool {
        self.template.shape.bleed_fraction().is_some() && !self.predecessors[edge].is_empty()
    }
}

pub fn validate(template: MotifTemplate) -> Result<ValidatedTemplate, MotifDefinitionError> {
    let fail = |rule: MotifRule| MotifDefinitionError {
        template: template.name.clone(),
        rule,
    };

    if template.name.trim().is_empty() {
        return Err(fail(MotifRule::EmptyName));
    }
    if template.roles.is_empty() {
        return Err(fail(MotifRule::NoRoles));
    }
    if template.edges.is_empty() {
        return Err(fail(MotifRule::NoEdges));
    }

    let mut seen = HashSet::new();
    for role in &template.roles {
        if !seen.insert(role.name.as_str()) {
            return Err(fail(MotifRule::DuplicateRole(role.name.clone())));
        }
        let (min, max) = role.cardinality.bounds();
        if min == 0 || min > max {
            return Err(fail(MotifRule::InvalidCardinality {
                role: role.name.clone(),
                min,
                max,
            }));
        }
    }

    let mut seen = HashSet::new();
    let mut endpoints = Vec::with_capacity(template.edges.len());
    for edge in &template.edges {
        if !seen.insert(edge.id.as_str()) {
            return Err(fail(MotifRule::DuplicateEdge(edge.id.clone())));
        }
        let resolve = |role: &str| {
            template.role_index(role).ok_or_else(|| {
                fail(MotifRule::UnknownRole {
                    edge: edge.id.clone(),
                    role: role.to_string(),
                })
            })
        };
        let (s, t) = (resolve(&edge.source)?, resolve(&edge.target)?);
        if s == t {
            return Err(fail(MotifRule::SelfLoop(edge.id.clone())));
        }
        endpoints.push((s, t));
    }

    let n = template.edges.len();
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut latencies: Vec<Option<Distribution>> = vec![None; n];
    let mut timed: Vec<bool> = template.edges.iter().map(|e| e.relation.is_timed()).collect();

    for entry in &template.temporal {
        let idx = template
            .edge_index(&entry.edge)
            .ok_or_else(|| fail(MotifRule::UnknownEdge(entry.edge.clone())))?;
        if latencies[idx].is_some() {
            return Err(fail(MotifRule::DuplicateTemporal(entry.edge.clone())));
        }
        entry.latency.validate().map_err(|e| {
            fail(MotifRule::InvalidDistribution {
                context: format!("latency of edge `{}`", entry.edge),
                message: e.to_string(),
            })
        })?;
        latencies[idx] = Some(entry.latency.clone());
        timed[idx] = true;

        let mut preds = BTreeSet::new();
        for after in &entry.after {
            let p = template
                .edge_index(after)
                .ok_or_else(|| fail(MotifRule::UnknownEdge(after.clone())))?;
            if p == idx {
                return Err(fail(MotifRule::SelfPredecessor(entry.edge.clone())));
            }
            preds.insert(p);
            timed[p] = true;
        }
        predecessors[idx] = preds.into_iter().collect();
    }

    let order = topological_order(&predecessors).map_err(|stuck| {
        fail(MotifRule::TemporalCycle(
            stuck.iter().map(|&i| template.edges[i].id.clone()).collect(),
        ))
    })?;

    match template.shape {
        MotifShape::Static => {}
        MotifShape::Chain { bleed_fraction } => {
            if !(bleed_fraction.is_finite() && (0.0..1.0).contains(&bleed_fraction)) {
                return Err(fail(MotifRule::InvalidBleedFraction(bleed_fraction)));
            }
            if let Some(role) = template.roles.iter().find(|r| !r.cardinality.is_single()) {
                return Err(fail(MotifRule::ChainRoleNotSingle(role.name.clone())));
            }
            if let Some(i) = (0..n).find(|&i| predecessors[i].len() > 1) {
                return Err(fail(MotifRule::ChainFanIn(template.edges[i].id.clone())));
            }
        }
        MotifShape::Burst { window_hours } => {
            if !(window_hours.is_finite() && window_hours > 0.0) {
                return Err(fail(MotifRule::InvalidBurstWindow(window_hours)));
            }
        }
    }

    let chain = template.shape.bleed_fraction().is_some();
    for (i, edge) in template.edges.iter().enumerate() {
        let derived = chain && !predecessors[i].is_empty();
        match &edge.weight {
            Some(w) => w.validate().map_err(|e| {
                fail(MotifRule::InvalidDistribution {
                    context: format!("weight of edge `{}`", edge.id),
                    message: e.to_string(),
                })
            })?,
            None if !derived => return Err(fail(MotifRule::MissingWeight(edge.id.clone()))),
            None => {}
        }
    }

    let latencies = latencies
        .into_iter()
        .map(|l| l.unwrap_or_else(default_latency))
        .collect();

    Ok(ValidatedTemplate {
        template,
        endpoints,
        predecessors,
        latencies,
        timed,
        order,
    })
}

/// Kahn's algorithm, always releasing the lowest ready index first so the
/// order is stable. On a cycle, returns the edges that never became ready.
fn topological_order(predecessors: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = predecessors.len();
    let mut indegree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (edge, preds) in predecessors.iter().enumerate() {
        for &p in preds {
            successors[p].push(edge);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &s in &successors[next] {
            indegree[s] -= 1;
            if indegree[s] == 0 {
                ready.insert(s);
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).filter(|&i| indegree[i] > 0).collect())
    }
}
