//! Network Assembler.
//!
//! Unions the population, every committed motif instance and background
//! noise into one directed multigraph, then computes node metrics.

use crate::config::{BackgroundRelation, SynthConfig};
use crate::entity::{Entity, EntityId};
use crate::error::{ConfigurationError, IntegrityViolationError, SynthError};
use crate::graph::{Graph, GraphEdge};
use crate::instance::{MotifInstance, Origin};
use crate::money::Amount;
use crate::rng::{stream_rng, BACKGROUND_STREAM};
use kleptosyn_motif::{EntityKind, Relation};
use rand::Rng;
use std::collections::{HashMap, HashSet};

pub struct NetworkAssembler<'a> {
    config: &'a SynthConfig,
}

impl<'a> NetworkAssembler<'a> {
    pub fn new(config: &'a SynthConfig) -> Self {
        Self { config }
    }

    pub fn assemble(
        &self,
        entities: Vec<Entity>,
        instances: &[MotifInstance],
    ) -> Result<Graph, SynthError> {
        self.check_instances(instances)?;

        let mut graph = Graph::new(entities)?;
        for inst in instances {
            let origin = inst.origin();
            for e in &inst.edges {
                graph.add_edge(GraphEdge {
                    source: e.source,
                    target: e.target,
                    key: 0,
                    relation: e.relation,
                    weight: e.weight,
                    amount: e.amount,
                    timestamp: e.timestamp,
                    origin: origin.clone(),
                })?;
            }
        }
        let motif_edges = graph.edge_count();

        let target = (self.config.background.mean_degree * graph.node_count() as f64).round() as usize;
        let wanted = target.saturating_sub(motif_edges);
        self.add_background(&mut graph, wanted)?;

        graph.compute_metrics();
        tracing::info!(
            nodes = graph.node_count(),
            motif_edges,
            background_edges = graph.edge_count() - motif_edges,
            components = graph.component_count(),
            "assembled graph"
        );
        Ok(graph)
    }

    fn check_instances(&self, instances: &[MotifInstance]) -> Result<(), IntegrityViolationError> {
        let mut ids = HashSet::new();
        let mut uses: HashMap<EntityId, usize> = HashMap::new();
        let limit = self.config.reuse.limit();
        for inst in instances {
            if !ids.insert(inst.id.as_str()) {
                return Err(IntegrityViolationError(format!(
                    "duplicate instance id `{}`",
                    inst.id
                )));
            }
            for id in inst.entities() {
                let n = uses.entry(id).or_insert(0);
                *n += 1;
                if *n > limit {
                    return Err(IntegrityViolationError(format!(
                        "entity {id} is bound in {n} instances (limit {limit}), last `{}`",
                        inst.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn add_background(&self, graph: &mut Graph, wanted: usize) -> Result<(), SynthError> {
        if wanted == 0 {
            return Ok(());
        }
        let table = &self.config.background.relations;
        let endpoints = |kind: Option<EntityKind>| -> Vec<EntityId> {
            graph
                .nodes()
                .iter()
                .filter(|n| kind.map_or(true, |k| n.entity.kind == k))
                .map(|n| n.entity.id)
                .collect()
        };
        let lists: Vec<(Vec<EntityId>, Vec<EntityId>)> = table
            .iter()
            .map(|row| (endpoints(row.source_kind), endpoints(row.target_kind)))
            .collect();

        let mut rng = stream_rng(self.config.seed, BACKGROUND_STREAM);
        let window = &self.config.window;
        let rounding = &self.config.rounding;
        for _ in 0..wanted {
            let r = pick_row(table, rng.gen());
            let row = &table[r];
            let (sources, targets) = &lists[r];

            let no_endpoints = || {
                ConfigurationError::new(
                    format!("background.relations[{r}]"),
                    "population cannot supply two distinct endpoints",
                )
            };
            if sources.is_empty() {
                return Err(no_endpoints().into());
            }
            let source = sources[rng.gen_range(0..sources.len())];
            // Draw among the targets other than `source` by shifting past it.
            let skip = targets.binary_search(&source).ok();
            let available = targets.len() - usize::from(skip.is_some());
            if available == 0 {
                return Err(no_endpoints().into());
            }
            let mut k = rng.gen_range(0..available);
            if let Some(s) = skip {
                if k >= s {
                    k += 1;
                }
            }
            let target = targets[k];

            let drawn = row.weight.sample(&mut rng)?;
            let (weight, amount) = if row.relation == Relation::Transfer {
                let amount = Amount(rounding.to_minor(drawn).0.max(1));
                (rounding.to_major(amount), Some(amount))
            } else {
                (drawn, None)
            };
            let timestamp = row.relation.is_timed().then(|| window.sample(&mut rng));

            graph.add_edge(GraphEdge {
                source,
                target,
                key: 0,
                relation: row.relation,
                weight,
                amount,
                timestamp,
                origin: Origin::Background,
            })?;
        }
        tracing::debug!(edges = wanted, "added background edges");
        Ok(())
    }
}

fn pick_row(table: &[BackgroundRelation], u: f64) -> usize {
    let mut acc = 0.0;
    for (i, row) in table.iter().enumerate() {
        acc += row.probability;
        if u < acc {
            return i;
        }
    }
    table.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{ConcreteEdge, RoleBinding};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn entity(id: u32, kind: EntityKind) -> Entity {
        Entity {
            id: EntityId(id),
            kind,
            type_tag: "Person".into(),
            name: format!("e{id}"),
            country: "GB".into(),
            flags: BTreeMap::new(),
            anomaly: false,
        }
    }

    fn population() -> Vec<Entity> {
        (0..10)
            .map(|i| {
                let kind = if i < 6 {
                    EntityKind::Person
                } else {
                    EntityKind::Organization
                };
                entity(i, kind)
            })
            .collect()
    }

    fn instance(id: &str, a: u32, b: u32) -> MotifInstance {
        MotifInstance {
            id: id.into(),
            template: "t".into(),
            template_ordinal: 0,
            ordinal: 0,
            anchor: Utc::now(),
            bindings: vec![
                RoleBinding {
                    role: "a".into(),
                    entities: vec![EntityId(a)],
                },
                RoleBinding {
                    role: "b".into(),
                    entities: vec![EntityId(b)],
                },
            ],
            edges: vec![ConcreteEdge {
                spec_index: 0,
                copy: 0,
                source: EntityId(a),
                target: EntityId(b),
                relation: Relation::Ownership,
                weight: 0.5,
                amount: None,
                timestamp: None,
            }],
            relaxed: false,
        }
    }

    #[test]
    fn background_fills_to_target_degree_without_self_loops() {
        let mut cfg = SynthConfig::default();
        cfg.background.mean_degree = 3.0;
        let graph = NetworkAssembler::new(&cfg)
            .assemble(population(), &[instance("t#0", 0, 6)])
            .unwrap();
        assert_eq!(graph.edge_count(), 30);
        assert!(graph.edges().iter().all(|e| e.source != e.target));
        let motif = graph.edges().iter().filter(|e| !e.origin.is_background()).count();
        assert_eq!(motif, 1);
        for e in graph.edges() {
            match e.relation {
                Relation::Transfer => assert!(e.timestamp.is_some() && e.amount.is_some()),
                Relation::Employment => {
                    assert_eq!(graph.node(e.source).unwrap().entity.kind, EntityKind::Person);
                    assert_eq!(graph.node(e.target).unwrap().entity.kind, EntityKind::Organization);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn shared_entity_without_reuse_is_fatal() {
        let mut cfg = SynthConfig::default();
        cfg.background.mean_degree = 0.0;
        let err = NetworkAssembler::new(&cfg)
            .assemble(population(), &[instance("t#0", 0, 6), instance("t#1", 0, 7)])
            .unwrap_err();
        assert!(matches!(err, SynthError::IntegrityViolation(_)));

        cfg.reuse.allow_entity_reuse = true;
        NetworkAssembler::new(&cfg)
            .assemble(population(), &[instance("t#0", 0, 6), instance("t#1", 0, 7)])
            .unwrap();
    }

    #[test]
    fn duplicate_instance_ids_and_dangling_edges_are_fatal() {
        let mut cfg = SynthConfig::default();
        cfg.background.mean_degree = 0.0;
        cfg.reuse.allow_entity_reuse = true;
        let assembler = NetworkAssembler::new(&cfg);
        assert!(assembler
            .assemble(population(), &[instance("t#0", 0, 6), instance("t#0", 1, 7)])
            .is_err());
        assert!(matches!(
            assembler.assemble(population(), &[instance("t#0", 0, 42)]),
            Err(SynthError::IntegrityViolation(_))
        ));
    }
}
