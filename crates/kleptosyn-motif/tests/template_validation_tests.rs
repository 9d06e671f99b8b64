use kleptosyn_motif::{
    Distribution, EdgeSpec, EntityKind, LibraryError, MotifLibrary, MotifRule, MotifShape,
    MotifTemplate, Relation, RoleSlot,
};
use proptest::prelude::*;
use std::fs;

fn ring(n: usize) -> MotifTemplate {
    let mut t = MotifTemplate::new("ring", MotifShape::Static);
    for i in 0..n {
        t = t.role(RoleSlot::single(format!("r{i}"), EntityKind::Organization));
    }
    for i in 0..n {
        t = t.edge(EdgeSpec::new(
            format!("e{i}"),
            format!("r{i}"),
            format!("r{}", (i + 1) % n),
            Relation::Transfer,
            Some(Distribution::fixed(10.0)),
        ));
    }
    t
}

fn with_predecessors(mut t: MotifTemplate, preds: &[Vec<usize>]) -> MotifTemplate {
    for (i, ps) in preds.iter().enumerate() {
        if ps.is_empty() {
            continue;
        }
        let names: Vec<String> = ps.iter().map(|p| format!("e{p}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        t = t.timing(&format!("e{i}"), &refs, Distribution::fixed(1.0));
    }
    t
}

/// Predecessor lists that only point backwards, so always acyclic.
fn forward_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2usize..8).prop_flat_map(|n| {
        (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::collection::vec(0..i, 0..=i.min(3)).boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn acyclic_timing_validates_and_order_respects_predecessors(preds in forward_dag()) {
        let n = preds.len();
        let v = kleptosyn_motif::validate(with_predecessors(ring(n), &preds)).unwrap();
        let order = v.topological_order();
        prop_assert_eq!(order.len(), n);
        let mut position = vec![0usize; n];
        for (pos, &edge) in order.iter().enumerate() {
            position[edge] = pos;
        }
        for edge in 0..n {
            for &p in v.predecessors(edge) {
                prop_assert!(position[p] < position[edge]);
            }
        }
    }

    #[test]
    fn closing_a_predecessor_loop_is_rejected(n in 2usize..8) {
        let preds: Vec<Vec<usize>> = (0..n).map(|i| vec![(i + n - 1) % n]).collect();
        let err = kleptosyn_motif::validate(with_predecessors(ring(n), &preds)).unwrap_err();
        match err.rule {
            MotifRule::TemporalCycle(edges) => prop_assert_eq!(edges.len(), n),
            other => prop_assert!(false, "unexpected rule {other:?}"),
        }
    }
}

#[test]
fn structural_rules_name_the_offense() {
    let mut t = ring(3);
    t.edges[1].target = "ghost".into();
    assert_eq!(
        kleptosyn_motif::validate(t).unwrap_err().rule,
        MotifRule::UnknownRole {
            edge: "e1".into(),
            role: "ghost".into()
        }
    );

    let mut t = ring(3);
    t.edges[0].target = "r0".into();
    assert_eq!(
        kleptosyn_motif::validate(t).unwrap_err().rule,
        MotifRule::SelfLoop("e0".into())
    );

    let mut t = ring(3);
    t.roles[2].name = "r1".into();
    assert_eq!(
        kleptosyn_motif::validate(t).unwrap_err().rule,
        MotifRule::DuplicateRole("r1".into())
    );

    let t = ring(3).role(RoleSlot::many("crowd", EntityKind::Person, 4, 2));
    assert!(matches!(
        kleptosyn_motif::validate(t).unwrap_err().rule,
        MotifRule::InvalidCardinality { min: 4, max: 2, .. }
    ));

    let t = ring(3).timing("e9", &[], Distribution::fixed(1.0));
    assert_eq!(
        kleptosyn_motif::validate(t).unwrap_err().rule,
        MotifRule::UnknownEdge("e9".into())
    );

    let t = ring(3).timing("e1", &["e1"], Distribution::fixed(1.0));
    assert_eq!(
        kleptosyn_motif::validate(t).unwrap_err().rule,
        MotifRule::SelfPredecessor("e1".into())
    );

    let mut t = ring(3);
    t.shape = MotifShape::Burst { window_hours: 0.0 };
    assert_eq!(
        kleptosyn_motif::validate(t).unwrap_err().rule,
        MotifRule::InvalidBurstWindow(0.0)
    );

    let mut t = ring(3);
    t.edges[2].weight = Some(Distribution::uniform(3.0, 1.0));
    assert!(matches!(
        kleptosyn_motif::validate(t).unwrap_err().rule,
        MotifRule::InvalidDistribution { .. }
    ));
}

#[test]
fn error_message_names_template_and_rule() {
    let t = MotifTemplate::new("empty", MotifShape::Static);
    let err = kleptosyn_motif::validate(t).unwrap_err();
    assert_eq!(err.to_string(), "motif `empty` is invalid: template declares no roles");
}

#[test]
fn load_dir_reads_json_in_sorted_order_and_shadows_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let mut burst = kleptosyn_motif::builtin::fan_out_burst();
    burst.shape = MotifShape::Burst { window_hours: 1.0 };
    fs::write(
        dir.path().join("b_fan_out.json"),
        serde_json::to_string_pretty(&burst).unwrap(),
    )
    .unwrap();
    fs::write(
        dir.path().join("a_ring.json"),
        serde_json::to_string_pretty(&ring(3)).unwrap(),
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a template").unwrap();

    let mut lib = MotifLibrary::builtin().unwrap();
    let loaded = lib.load_dir(dir.path()).unwrap();
    assert_eq!(loaded, vec!["ring".to_string(), "fan_out_burst".to_string()]);
    assert_eq!(lib.len(), 6);
    assert_eq!(lib.names().last(), Some("ring"));
    assert_eq!(
        lib.get("fan_out_burst").unwrap().shape().window_hours(),
        Some(1.0)
    );
}

#[test]
fn load_dir_reports_parse_errors_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("broken.json");
    fs::write(&bad, "{ \"name\": ").unwrap();
    let mut lib = MotifLibrary::new();
    match lib.load_dir(dir.path()).unwrap_err() {
        LibraryError::Parse { path, .. } => assert_eq!(path, bad),
        other => panic!("unexpected error: {other}"),
    }
}
