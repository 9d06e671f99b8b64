//! Transaction Simulator.
//!
//! Turns the transfer edges of the assembled graph into one ordered event
//! log. Each motif instance is a lane, background noise is the last lane,
//! and lanes are merged by timestamp with a binary heap. Equal timestamps
//! resolve by lane (instance emission order), then by template edge index
//! and copy within a motif lane, then by graph order in the background lane.
//!
//! Before merging, every instance is re-checked against its template:
//! predecessor ordering, chain bleed-off amounts, and burst windows.

use crate::entity::EntityId;
use crate::error::{IntegrityViolationError, SynthError, TemporalConstraintError};
use crate::graph::{Graph, GraphEdge};
use crate::instance::{MotifInstance, Origin};
use crate::money::{Amount, RoundingConfig};
use chrono::{DateTime, Utc};
use kleptosyn_motif::{MotifLibrary, MotifShape, Relation, ValidatedTemplate};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub sequence: usize,
    pub source: EntityId,
    pub destination: EntityId,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<TransactionEvent>,
}

impl EventLog {
    pub fn events(&self) -> &[TransactionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TransactionEvent> {
        self.events.iter()
    }
}

/// Every timed edge of a burst instance must land within `window_hours` of
/// the anchor.
pub fn check_burst_window(
    instance: &MotifInstance,
    window_hours: f64,
    attempts: usize,
) -> Result<(), TemporalConstraintError> {
    let latest = instance
        .edges
        .iter()
        .filter_map(|e| e.timestamp)
        .max()
        .unwrap_or(instance.anchor);
    let observed_hours = (latest - instance.anchor).num_seconds() as f64 / 3600.0;
    if observed_hours <= window_hours {
        Ok(())
    } else {
        Err(TemporalConstraintError {
            instance: instance.id.clone(),
            window_hours,
            observed_hours,
            attempts,
        })
    }
}

/// Declared predecessors strictly precede every copy of their successor.
pub fn check_ordering(
    instance: &MotifInstance,
    template: &ValidatedTemplate,
) -> Result<(), IntegrityViolationError> {
    for edge in &instance.edges {
        let Some(ts) = edge.timestamp else { continue };
        for &p in template.predecessors(edge.spec_index) {
            for pred in instance.copies(p) {
                match pred.timestamp {
                    Some(pts) if pts < ts => {}
                    _ => {
                        return Err(IntegrityViolationError(format!(
                            "{}: edge `{}` is not after predecessor `{}`",
                            instance.id,
                            template.template().edges[edge.spec_index].id,
                            template.template().edges[p].id
                        )))
                    }
                }
            }
        }
    }
    Ok(())
}

/// Each derived hop equals `round(incoming * (1 - f))` in minor units.
pub fn check_bleed(
    instance: &MotifInstance,
    template: &ValidatedTemplate,
    rounding: &RoundingConfig,
) -> Result<(), IntegrityViolationError> {
    let Some(fraction) = template.shape().bleed_fraction() else {
        return Ok(());
    };
    for edge in &instance.edges {
        if edge.relation != Relation::Transfer || !template.is_derived(edge.spec_index) {
            continue;
        }
        let p = template.predecessors(edge.spec_index)[0];
        let Some(incoming) = instance.copies(p).next().and_then(|e| e.amount) else {
            continue;
        };
        let expected = rounding.bleed(incoming, fraction);
        if edge.amount != Some(expected) {
            return Err(IntegrityViolationError(format!(
                "{}: hop `{}` carries {:?}, bleed-off gives {}",
                instance.id,
                template.template().edges[edge.spec_index].id,
                edge.amount,
                expected
            )));
        }
    }
    Ok(())
}

pub struct TransactionSimulator<'a> {
    library: &'a MotifLibrary,
    rounding: RoundingConfig,
}

impl<'a> TransactionSimulator<'a> {
    pub fn new(library: &'a MotifLibrary, rounding: RoundingConfig) -> Self {
        Self { library, rounding }
    }

    pub fn simulate(
        &self,
        instances: &[MotifInstance],
        graph: &Graph,
    ) -> Result<EventLog, SynthError> {
        for inst in instances {
            let template = self.library.get(&inst.template).ok_or_else(|| {
                IntegrityViolationError(format!(
                    "{}: template `{}` is not in the library",
                    inst.id, inst.template
                ))
            })?;
            check_ordering(inst, template)?;
            check_bleed(inst, template, &self.rounding)?;
            if let MotifShape::Burst { window_hours } = template.shape() {
                check_burst_window(inst, window_hours, 0)?;
            }
        }

        // One lane per instance in emission order, background last.
        let mut lanes: Vec<Vec<(usize, usize, &GraphEdge)>> =
            vec![Vec::new(); instances.len() + 1];
        let lane_of: std::collections::HashMap<&str, usize> = instances
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.id.as_str(), i))
            .collect();
        let background = instances.len();
        // Motif edges enter the graph instance by instance in materialization
        // order, so the n-th graph edge of a lane is the n-th edge of its instance.
        let mut position = vec![0usize; instances.len()];
        for edge in graph.edges() {
            let lane = match &edge.origin {
                Origin::Background => background,
                Origin::Motif(id) => *lane_of.get(id.as_str()).ok_or_else(|| {
                    IntegrityViolationError(format!("edge origin `{id}` is not an instance"))
                })?,
            };
            let (spec_index, copy) = if lane == background {
                (0, 0)
            } else {
                let n = position[lane];
                position[lane] += 1;
                let concrete = instances[lane].edges.get(n).ok_or_else(|| {
                    IntegrityViolationError(format!(
                        "{} has more graph edges than materialized edges",
                        instances[lane].id
                    ))
                })?;
                (concrete.spec_index, concrete.copy)
            };
            if edge.relation == Relation::Transfer {
                lanes[lane].push((spec_index, copy, edge));
            }
        }
        for lane in &mut lanes {
            // Stable: background ties keep graph order.
            lane.sort_by_key(|&(spec_index, copy, e)| (e.timestamp, spec_index, copy));
        }

        let mut heap = BinaryHeap::new();
        for (lane, edges) in lanes.iter().enumerate() {
            if let Some(&(_, _, first)) = edges.first() {
                heap.push(Reverse((first.timestamp, lane, 0usize)));
            }
        }

        let mut events = Vec::with_capacity(lanes.iter().map(Vec::len).sum());
        while let Some(Reverse((_, lane, idx))) = heap.pop() {
            let (_, _, edge) = lanes[lane][idx];
            let timestamp = edge.timestamp.ok_or_else(|| {
                IntegrityViolationError(format!(
                    "transfer {} -> {} has no timestamp",
                    edge.source, edge.target
                ))
            })?;
            let amount = edge
                .amount
                .unwrap_or_else(|| self.rounding.to_minor(edge.weight));
            events.push(TransactionEvent {
                sequence: events.len(),
                source: edge.source,
                destination: edge.target,
                amount,
                timestamp,
                origin: edge.origin.clone(),
            });
            if let Some(&(_, _, next)) = lanes[lane].get(idx + 1) {
                heap.push(Reverse((next.timestamp, lane, idx + 1)));
            }
        }

        tracing::info!(events = events.len(), lanes = lanes.len(), "simulated transactions");
        Ok(EventLog { events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{ConcreteEdge, RoleBinding};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn instance(offsets_secs: &[i64]) -> MotifInstance {
        MotifInstance {
            id: "burst#0".into(),
            template: "burst".into(),
            template_ordinal: 0,
            ordinal: 0,
            anchor: t0(),
            bindings: vec![RoleBinding {
                role: "x".into(),
                entities: vec![EntityId(0)],
            }],
            edges: offsets_secs
                .iter()
                .enumerate()
                .map(|(i, &s)| ConcreteEdge {
                    spec_index: 0,
                    copy: i,
                    source: EntityId(0),
                    target: EntityId(1),
                    relation: Relation::Transfer,
                    weight: 1.0,
                    amount: Some(Amount(100)),
                    timestamp: Some(t0() + Duration::seconds(s)),
                })
                .collect(),
            relaxed: false,
        }
    }

    #[test]
    fn burst_window_is_inclusive() {
        assert!(check_burst_window(&instance(&[60, 7200]), 2.0, 0).is_ok());
        let err = check_burst_window(&instance(&[60, 7201]), 2.0, 3).unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(err.observed_hours > 2.0);
    }

    #[test]
    fn equal_timestamps_follow_template_edge_index() {
        use crate::entity::Entity;
        use kleptosyn_motif::{Distribution, EdgeSpec, EntityKind, MotifTemplate, RoleSlot};

        // Kahn order is e1, e2, e0 because e0 waits for e2.
        let fixed = || Some(Distribution::fixed(1.0));
        let template = MotifTemplate::new("triangle", MotifShape::Static)
            .role(RoleSlot::single("x", EntityKind::Person))
            .role(RoleSlot::single("y", EntityKind::Person))
            .role(RoleSlot::single("z", EntityKind::Person))
            .edge(EdgeSpec::new("e0", "x", "y", Relation::Transfer, fixed()))
            .edge(EdgeSpec::new("e1", "y", "z", Relation::Transfer, fixed()))
            .edge(EdgeSpec::new("e2", "x", "z", Relation::Transfer, fixed()))
            .timing("e0", &["e2"], Distribution::fixed(1.0))
            .timing("e1", &[], Distribution::fixed(1.0))
            .timing("e2", &[], Distribution::fixed(1.0));
        let mut library = MotifLibrary::new();
        library.insert(template).unwrap();

        let edge = |spec_index: usize, source: u32, target: u32, secs: i64| ConcreteEdge {
            spec_index,
            copy: 0,
            source: EntityId(source),
            target: EntityId(target),
            relation: Relation::Transfer,
            weight: 1.0,
            amount: Some(Amount(100)),
            timestamp: Some(t0() + Duration::seconds(secs)),
        };
        let inst = MotifInstance {
            id: "triangle#0".into(),
            template: "triangle".into(),
            template_ordinal: 0,
            ordinal: 0,
            anchor: t0(),
            bindings: (0..3)
                .map(|i| RoleBinding {
                    role: ["x", "y", "z"][i].into(),
                    entities: vec![EntityId(i as u32)],
                })
                .collect(),
            edges: vec![edge(1, 1, 2, 100), edge(2, 0, 2, 50), edge(0, 0, 1, 100)],
            relaxed: false,
        };

        let entities = (0..3)
            .map(|i| Entity {
                id: EntityId(i),
                kind: EntityKind::Person,
                type_tag: "Person".into(),
                name: format!("p{i}"),
                country: "GB".into(),
                flags: Default::default(),
                anomaly: false,
            })
            .collect();
        let mut graph = Graph::new(entities).unwrap();
        for e in &inst.edges {
            graph
                .add_edge(GraphEdge {
                    source: e.source,
                    target: e.target,
                    key: 0,
                    relation: e.relation,
                    weight: e.weight,
                    amount: e.amount,
                    timestamp: e.timestamp,
                    origin: inst.origin(),
                })
                .unwrap();
        }

        let log = TransactionSimulator::new(&library, RoundingConfig::default())
            .simulate(std::slice::from_ref(&inst), &graph)
            .unwrap();
        let order: Vec<(EntityId, EntityId)> =
            log.iter().map(|e| (e.source, e.destination)).collect();
        assert_eq!(
            order,
            vec![
                (EntityId(0), EntityId(2)),
                (EntityId(0), EntityId(1)),
                (EntityId(1), EntityId(2)),
            ]
        );
    }
}
