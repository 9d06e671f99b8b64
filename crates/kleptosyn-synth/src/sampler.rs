//! Entity Sampler: draws the population.
//!
//! Per entity the draws are, in order: country, each flag (key order), each
//! matching correlation rule (declared order), anomaly, name. Persons get
//! the low ids, organizations follow.

use crate::config::{Condition, CorrelationRule, KindDistribution, PopulationConfig};
use crate::entity::{Entity, EntityId};
use crate::error::ConfigurationError;
use crate::names::draw_name;
use crate::vocabulary::VocabularyConfig;
use kleptosyn_motif::EntityKind;
use rand::Rng;
use std::collections::BTreeMap;

pub struct EntitySampler<'a> {
    population: &'a PopulationConfig,
}

impl<'a> EntitySampler<'a> {
    pub fn new(
        population: &'a PopulationConfig,
        vocabulary: &VocabularyConfig,
    ) -> Result<Self, ConfigurationError> {
        population.validate(vocabulary)?;
        Ok(Self { population })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Entity> {
        let mut out = Vec::with_capacity(self.population.total());
        for kind in EntityKind::ALL {
            let dist = self.population.kind(kind);
            for _ in 0..dist.count {
                let id = EntityId(out.len() as u32);
                out.push(self.sample_one(id, kind, dist, rng));
            }
        }
        tracing::debug!(
            persons = self.population.persons.count,
            organizations = self.population.organizations.count,
            anomalies = out.iter().filter(|e| e.anomaly).count(),
            "sampled population"
        );
        out
    }

    fn sample_one<R: Rng + ?Sized>(
        &self,
        id: EntityId,
        kind: EntityKind,
        dist: &KindDistribution,
        rng: &mut R,
    ) -> Entity {
        let country = draw_country(dist, rng);

        let mut flags: BTreeMap<String, bool> = dist
            .flags
            .iter()
            .map(|(flag, &p)| (flag.clone(), rng.gen::<f64>() < p))
            .collect();

        for rule in &self.population.correlations {
            if matches(rule, kind, &country, &flags) {
                flags.insert(rule.flag.clone(), rng.gen::<f64>() < rule.probability);
            }
        }

        let anomaly = rng.gen::<f64>() < dist.anomaly_rate;
        let name = draw_name(kind, rng);

        Entity {
            id,
            kind,
            type_tag: dist.type_tag.clone(),
            name,
            country,
            flags,
            anomaly,
        }
    }
}

fn draw_country<R: Rng + ?Sized>(dist: &KindDistribution, rng: &mut R) -> String {
    let u: f64 = rng.gen();
    let mut acc = 0.0;
    for share in &dist.countries {
        acc += share.p;
        if u < acc {
            return share.code.clone();
        }
    }
    // Float slack in the cumulative sum lands on the last row.
    dist.countries
        .last()
        .map(|s| s.code.clone())
        .unwrap_or_default()
}

fn matches(
    rule: &CorrelationRule,
    kind: EntityKind,
    country: &str,
    flags: &BTreeMap<String, bool>,
) -> bool {
    match &rule.when {
        Condition::Kind(k) => *k == kind,
        Condition::Flag(f) => flags.get(f).copied().unwrap_or(false),
        Condition::Country(c) => c == country,
    }
}
