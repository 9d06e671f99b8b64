//! Built-in tradecraft catalog.
//!
//! Amount and timing constants come from the OCCRP leak analysis the tool
//! was first calibrated on: a median transfer chunk of ~196k and a median
//! inter-arrival of 8.7 days between layering hops.

use crate::distribution::Distribution;
use crate::template::{EdgeSpec, EntityKind, MotifShape, MotifTemplate, Relation, RoleSlot};

pub const TRANSFER_CHUNK_MEDIAN: f64 = 196_389.0;
pub const TRANSFER_CHUNK_SIGMA: f64 = 0.5;
pub const INTER_ARRIVAL_MEDIAN_HOURS: f64 = 8.7 * 24.0;

/// Names of the built-in templates, in catalog order.
pub const BUILTIN_NAMES: [&str; 5] = [
    "rapid_movement",
    "peel_chain",
    "mule_burst",
    "fan_out_burst",
    "shell_ownership",
];

pub fn builtin_templates() -> Vec<MotifTemplate> {
    vec![
        rapid_movement(
            4,
            0.1,
            Distribution::log_normal(TRANSFER_CHUNK_MEDIAN, TRANSFER_CHUNK_SIGMA),
        ),
        peel_chain(3, 0.05),
        mule_burst(),
        fan_out_burst(),
        shell_ownership(),
    ]
}

/// Closed circuit of `hops` shell companies; funds come back to where they
/// started, losing `bleed` at every hop.
pub fn rapid_movement(hops: usize, bleed: f64, start: Distribution) -> MotifTemplate {
    let mut t = MotifTemplate::new("rapid_movement", MotifShape::Chain { bleed_fraction: bleed })
        .describe("funds cycle through a closed circuit of shell companies with bleed-off");
    for i in 0..hops {
        t = t.role(RoleSlot::single(format!("node_{i}"), EntityKind::Organization).requiring("shell"));
    }
    for i in 0..hops {
        let weight = (i == 0).then(|| start.clone());
        t = t.edge(EdgeSpec::new(
            format!("hop_{i}"),
            format!("node_{i}"),
            format!("node_{}", (i + 1) % hops.max(1)),
            Relation::Transfer,
            weight,
        ));
    }
    for i in 0..hops {
        let edge = format!("hop_{i}");
        let after = if i == 0 { Vec::new() } else { vec![format!("hop_{}", i - 1)] };
        let after: Vec<&str> = after.iter().map(String::as_str).collect();
        t = t.timing(&edge, &after, Distribution::exponential(6.0));
    }
    t
}

/// Open layering chain: an origin pushes funds through `layers` shells to a
/// beneficiary, each intermediary keeping a slice.
pub fn peel_chain(layers: usize, bleed: f64) -> MotifTemplate {
    let mut names = vec!["origin".to_string()];
    names.extend((0..layers).map(|i| format!("layer_{i}")));
    names.push("sink".to_string());

    let mut t = MotifTemplate::new("peel_chain", MotifShape::Chain { bleed_fraction: bleed })
        .describe("layering chain through shell companies ending at a beneficiary")
        .role(RoleSlot::single("origin", EntityKind::Organization));
    for name in &names[1..names.len() - 1] {
        t = t.role(RoleSlot::single(name.clone(), EntityKind::Organization).requiring("shell"));
    }
    t = t.role(RoleSlot::single("sink", EntityKind::Person).requiring("beneficiary"));

    let latency = Distribution::exponential(INTER_ARRIVAL_MEDIAN_HOURS);
    for (i, pair) in names.windows(2).enumerate() {
        let weight = (i == 0)
            .then(|| Distribution::log_normal(TRANSFER_CHUNK_MEDIAN, TRANSFER_CHUNK_SIGMA));
        let id = format!("peel_{i}");
        t = t.edge(EdgeSpec::new(&id, &pair[0], &pair[1], Relation::Transfer, weight));
        let prev = format!("peel_{}", i.saturating_sub(1));
        let after: &[&str] = if i == 0 { &[] } else { &[prev.as_str()] };
        t = t.timing(&id, after, latency.clone());
    }
    t
}

/// Mules each pay just under the reporting threshold to one collector within
/// two hours.
pub fn mule_burst() -> MotifTemplate {
    MotifTemplate::new("mule_burst", MotifShape::Burst { window_hours: 2.0 })
        .describe("several mule accounts pay one collector within a short window")
        .role(RoleSlot::many("mule", EntityKind::Person, 3, 8).requiring("mule"))
        .role(RoleSlot::single("collector", EntityKind::Organization))
        .edge(EdgeSpec::new(
            "deposit",
            "mule",
            "collector",
            Relation::Transfer,
            Some(Distribution::uniform(9_000.0, 9_900.0)),
        ))
        .timing("deposit", &[], Distribution::exponential(0.5))
}

/// One organization pays out to several persons within two hours.
pub fn fan_out_burst() -> MotifTemplate {
    MotifTemplate::new("fan_out_burst", MotifShape::Burst { window_hours: 2.0 })
        .describe("one originator pays several beneficiaries within a short window")
        .role(RoleSlot::single("originator", EntityKind::Organization))
        .role(RoleSlot::many("beneficiary", EntityKind::Person, 3, 6))
        .edge(EdgeSpec::new(
            "payout",
            "originator",
            "beneficiary",
            Relation::Transfer,
            Some(Distribution::log_normal(9_500.0, 0.3)),
        ))
        .timing("payout", &[], Distribution::exponential(0.5))
}

/// A UBO owns a handful of shells, each of which names a beneficiary.
pub fn shell_ownership() -> MotifTemplate {
    MotifTemplate::new("shell_ownership", MotifShape::Static)
        .describe("ultimate beneficial owner behind several shell companies")
        .role(RoleSlot::single("ubo", EntityKind::Person).requiring("ubo"))
        .role(RoleSlot::many("shell", EntityKind::Organization, 3, 6).requiring("shell"))
        .role(RoleSlot::single("beneficiary", EntityKind::Person).requiring("beneficiary"))
        .edge(EdgeSpec::new(
            "owns",
            "ubo",
            "shell",
            Relation::Ownership,
            Some(Distribution::beta(2.0, 2.0)),
        ))
        .edge(EdgeSpec::new(
            "names",
            "shell",
            "beneficiary",
            Relation::Beneficiary,
            Some(Distribution::beta(5.0, 1.0)),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;

    #[test]
    fn every_builtin_validates() {
        let templates = builtin_templates();
        let names: Vec<&str> = templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, BUILTIN_NAMES);
        for t in templates {
            let name = t.name.clone();
            validate(t).unwrap_or_else(|e| panic!("{name}: {e}"));
        }
    }

    #[test]
    fn rapid_movement_closes_the_circuit() {
        let v = validate(rapid_movement(4, 0.1, Distribution::fixed(100_000.0))).unwrap();
        let t = v.template();
        assert_eq!(t.edges[3].target, "node_0");
        assert_eq!(v.topological_order(), &[0, 1, 2, 3]);
        assert!(v.is_derived(3));
        assert!(!v.is_derived(0));
    }

    #[test]
    fn peel_chain_ends_at_a_person() {
        let t = peel_chain(2, 0.05);
        assert_eq!(t.roles.len(), 4);
        assert_eq!(t.roles[3].kind, EntityKind::Person);
        assert_eq!(t.edges.len(), 3);
        assert_eq!(t.temporal[2].after, vec!["peel_1".to_string()]);
    }
}
