use approx::assert_relative_eq;
use kleptosyn_motif::builtin::rapid_movement;
use kleptosyn_motif::{
    Distribution, EdgeSpec, EntityKind, MotifShape, MotifTemplate, Relation, RoleSlot,
};
use kleptosyn_synth::{
    Amount, DropReason, Generator, MotifRequest, NodeLinkGraph, PopulationConfig, SynthConfig,
    SynthError,
};
use std::collections::HashMap;

fn population(persons: usize, organizations: usize) -> PopulationConfig {
    let mut p = PopulationConfig::default();
    p.persons.count = persons;
    p.organizations.count = organizations;
    p.persons.anomaly_rate = 0.0;
    p.organizations.anomaly_rate = 0.0;
    p
}

fn request(template: &str, count: usize) -> MotifRequest {
    MotifRequest {
        template: template.to_string(),
        count,
    }
}

fn motif_only(seed: u64, population: PopulationConfig, template: MotifTemplate) -> SynthConfig {
    let mut cfg = SynthConfig::default();
    cfg.seed = seed;
    cfg.population = population;
    cfg.motifs = vec![request(&template.name, 1)];
    cfg.templates = vec![template];
    cfg.background.mean_degree = 0.0;
    cfg
}

fn payout_burst() -> MotifTemplate {
    MotifTemplate::new("payout_burst", MotifShape::Burst { window_hours: 2.0 })
        .role(RoleSlot::single("originator", EntityKind::Organization))
        .role(RoleSlot::many("beneficiary", EntityKind::Person, 5, 5))
        .edge(EdgeSpec::new(
            "payout",
            "originator",
            "beneficiary",
            Relation::Transfer,
            Some(Distribution::log_normal(9_500.0, 0.3)),
        ))
        .timing("payout", &[], Distribution::uniform(0.1, 1.5))
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn burst_scenario_one_originator_five_beneficiaries() {
    let cfg = motif_only(42, population(5, 1), payout_burst());
    let generation = Generator::from_config(cfg).unwrap().run().unwrap();
    let graph = &generation.graph;

    assert_eq!(graph.node_count(), 6);
    assert_eq!(generation.instances.len(), 1);
    let inst = &generation.instances[0];
    assert_eq!(inst.id, "payout_burst#0");

    let originator = inst.binding("originator").unwrap()[0];
    assert_eq!(graph.node(originator).unwrap().entity.kind, EntityKind::Organization);

    let transfers: Vec<_> = graph
        .edges()
        .iter()
        .filter(|e| e.relation == Relation::Transfer)
        .collect();
    assert_eq!(transfers.len(), 5);
    assert!(transfers.iter().all(|e| e.source == originator));
    for e in &transfers {
        assert_eq!(graph.node(e.target).unwrap().entity.kind, EntityKind::Person);
    }

    let times: Vec<_> = transfers.iter().map(|e| e.timestamp.unwrap()).collect();
    let span = *times.iter().max().unwrap() - *times.iter().min().unwrap();
    assert!(span.num_seconds() <= 2 * 3600);
    assert_eq!(generation.events.len(), 5);
}

#[test]
fn circuit_scenario_bleeds_ten_percent_per_hop() {
    let mut pop = population(3, 6);
    pop.organizations.flags.insert("shell".into(), 1.0);
    let template = rapid_movement(4, 0.1, Distribution::fixed(100_000.0));
    let cfg = motif_only(7, pop, template);
    let generator = Generator::from_config(cfg).unwrap();
    let generation = generator.run().unwrap();

    let inst = &generation.instances[0];
    assert_eq!(inst.edges.len(), 4);
    let rounding = generator.config().rounding;
    assert_eq!(inst.edges[0].amount, Some(Amount(10_000_000)));
    assert_eq!(
        inst.edges[3].amount,
        Some(rounding.to_minor(100_000.0 * 0.9f64.powi(3)))
    );
    assert_relative_eq!(inst.edges[3].weight, 72_900.0, epsilon = 1e-9);
    assert_eq!(inst.edges[3].target, inst.edges[0].source);

    // Events replay the circuit in hop order.
    let amounts: Vec<i64> = generation.events.iter().map(|e| e.amount.0).collect();
    assert_eq!(amounts, vec![10_000_000, 9_000_000, 8_100_000, 7_290_000]);
}

// ============================================================================
// Properties of a full default run
// ============================================================================

#[test]
fn same_seed_same_bytes_parallel_or_not() {
    let mut cfg = SynthConfig::default();
    cfg.seed = 1234;
    cfg.parallel = true;
    let a = Generator::from_config(cfg.clone()).unwrap();
    cfg.parallel = false;
    let b = Generator::from_config(cfg).unwrap();

    let ga = a.run().unwrap();
    let gb = b.run().unwrap();
    let ja = NodeLinkGraph::from_graph(&ga.graph, a.graph_meta()).to_json_pretty().unwrap();
    let jb = NodeLinkGraph::from_graph(&gb.graph, b.graph_meta()).to_json_pretty().unwrap();
    assert_eq!(ja, jb);
    assert_eq!(ga.events, gb.events);
    assert_eq!(ga.report, gb.report);
}

#[test]
fn different_seeds_differ() {
    let mut cfg = SynthConfig::default();
    let a = Generator::from_config(cfg.clone()).unwrap().run().unwrap();
    cfg.seed += 1;
    let b = Generator::from_config(cfg).unwrap().run().unwrap();
    assert_ne!(a.graph, b.graph);
}

#[test]
fn default_run_honours_structural_invariants() {
    let generator = Generator::from_config(SynthConfig::default()).unwrap();
    let generation = generator.run().unwrap();
    let graph = &generation.graph;

    // Referential integrity.
    for e in graph.edges() {
        assert!(e.source.index() < graph.node_count());
        assert!(e.target.index() < graph.node_count());
        assert_ne!(e.source, e.target);
    }

    // No entity in two instances when reuse is off.
    let mut seen: HashMap<_, &str> = HashMap::new();
    for inst in &generation.instances {
        for id in inst.entities() {
            if let Some(prev) = seen.insert(id, &inst.id) {
                assert_eq!(prev, inst.id, "entity {id} reused");
            }
        }
        for id in inst.entities() {
            assert!(!graph.node(id).unwrap().entity.anomaly);
        }
    }

    // Declared predecessors strictly precede successors.
    for inst in &generation.instances {
        let template = generator.library().get(&inst.template).unwrap();
        for e in &inst.edges {
            for &p in template.predecessors(e.spec_index) {
                for pred in inst.copies(p) {
                    assert!(pred.timestamp.unwrap() < e.timestamp.unwrap());
                }
            }
        }
    }

    // Events are time ordered and numbered.
    for (i, pair) in generation.events.events().windows(2).enumerate() {
        assert!(pair[0].timestamp <= pair[1].timestamp);
        assert_eq!(pair[0].sequence, i);
    }

    // Manifest: achieved + dropped == requested per template.
    for row in &generation.report.templates {
        assert_eq!(row.achieved + row.dropped, row.requested, "{}", row.template);
    }
    assert_eq!(generation.report.counts.edges, graph.edge_count());
}

#[test]
fn node_link_round_trip() {
    let generator = Generator::from_config(SynthConfig::default()).unwrap();
    let generation = generator.run().unwrap();
    let doc = NodeLinkGraph::from_graph(&generation.graph, generator.graph_meta());
    let text = doc.to_json_pretty().unwrap();
    let back = NodeLinkGraph::from_json_str(&text).unwrap();
    assert_eq!(back, doc);
    assert_eq!(back.to_graph().unwrap(), generation.graph);
}

#[test]
fn reuse_bound_is_respected_when_enabled() {
    let mut cfg = SynthConfig::default();
    cfg.population = population(40, 30);
    cfg.reuse.allow_entity_reuse = true;
    cfg.reuse.max_reuse = 2;
    let generation = Generator::from_config(cfg).unwrap().run().unwrap();
    let mut uses: HashMap<_, usize> = HashMap::new();
    for inst in &generation.instances {
        for id in inst.entities() {
            *uses.entry(id).or_default() += 1;
        }
    }
    assert!(uses.values().all(|&n| n <= 2));
}

// ============================================================================
// Recoverable failures
// ============================================================================

fn vip_template() -> MotifTemplate {
    MotifTemplate::new("vip_transfer", MotifShape::Static)
        .role(RoleSlot::single("payer", EntityKind::Person).requiring("pep"))
        .role(RoleSlot::single("payee", EntityKind::Organization))
        .edge(EdgeSpec::new(
            "pay",
            "payer",
            "payee",
            Relation::Transfer,
            Some(Distribution::fixed(1_000.0)),
        ))
}

#[test]
fn shortfall_drops_and_reports() {
    let mut pop = population(4, 2);
    pop.persons.flags.insert("pep".into(), 0.0);
    let mut cfg = motif_only(3, pop, vip_template());
    cfg.motifs = vec![request("vip_transfer", 2)];
    let generation = Generator::from_config(cfg).unwrap().run().unwrap();

    assert!(generation.instances.is_empty());
    assert_eq!(generation.report.dropped.len(), 2);
    let d = &generation.report.dropped[0];
    assert_eq!(d.reason, DropReason::InsufficientPopulation);
    assert_eq!(d.instance, "vip_transfer#0");
    assert_eq!(generation.report.templates[0].dropped, 2);
    assert_eq!(generation.report.templates[0].achieved, 0);
}

#[test]
fn relaxed_eligibility_fills_the_role() {
    let mut pop = population(4, 2);
    pop.persons.flags.insert("pep".into(), 0.0);
    let mut cfg = motif_only(3, pop, vip_template());
    cfg.relax_eligibility = true;
    let generation = Generator::from_config(cfg).unwrap().run().unwrap();

    assert_eq!(generation.instances.len(), 1);
    assert!(generation.instances[0].relaxed);
    assert_eq!(generation.report.templates[0].relaxed, 1);
}

#[test]
fn burst_overflow_is_dropped_after_retries() {
    let mut slow = payout_burst();
    slow.temporal[0].latency = Distribution::fixed(3.0);
    let mut cfg = motif_only(42, population(5, 1), slow);
    cfg.temporal.max_retries = 3;
    let generation = Generator::from_config(cfg).unwrap().run().unwrap();

    assert!(generation.instances.is_empty());
    let d = &generation.report.dropped[0];
    assert_eq!(d.reason, DropReason::TemporalConstraint);
    assert_eq!(d.attempts, 3);
    assert!(generation.events.is_empty());
}

#[test]
fn out_of_range_latency_drops_instead_of_panicking() {
    let template = MotifTemplate::new("slow_pay", MotifShape::Static)
        .role(RoleSlot::single("payer", EntityKind::Person))
        .role(RoleSlot::single("payee", EntityKind::Organization))
        .edge(EdgeSpec::new(
            "pay",
            "payer",
            "payee",
            Relation::Transfer,
            Some(Distribution::fixed(1_000.0)),
        ))
        .timing("pay", &[], Distribution::fixed(1.0e11));
    let cfg = motif_only(11, population(4, 2), template);
    let generation = Generator::from_config(cfg).unwrap().run().unwrap();

    assert!(generation.instances.is_empty());
    let d = &generation.report.dropped[0];
    assert_eq!(d.reason, DropReason::TemporalConstraint);
    assert_eq!(d.attempts, 5);
    assert_eq!(generation.graph.edge_count(), 0);
}

// ============================================================================
// Fatal errors
// ============================================================================

#[test]
fn cyclic_inline_template_is_a_definition_error() {
    let cyclic = payout_burst()
        .edge(EdgeSpec::new(
            "refund",
            "beneficiary",
            "originator",
            Relation::Transfer,
            Some(Distribution::fixed(10.0)),
        ))
        .timing("refund", &["payout"], Distribution::fixed(0.1));
    let mut cyclic = cyclic;
    cyclic.temporal[0].after = vec!["refund".into()];
    let cfg = motif_only(1, population(5, 1), cyclic);
    match Generator::from_config(cfg) {
        Err(SynthError::MotifDefinition(err)) => assert_eq!(err.template, "payout_burst"),
        other => panic!("expected a definition error, got {:?}", other.err()),
    }
}

#[test]
fn malformed_population_is_a_configuration_error() {
    let mut cfg = SynthConfig::default();
    cfg.population.persons.flags.insert("mule".into(), 1.5);
    match Generator::from_config(cfg) {
        Err(SynthError::Configuration(err)) => assert_eq!(err.field, "population.persons.flags.mule"),
        other => panic!("expected a configuration error, got {:?}", other.err()),
    }
}
