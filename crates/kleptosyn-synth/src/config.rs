//! Generation configuration.
//!
//! A single JSON document drives a run. Every section has defaults, so
//! `{}` is a valid configuration; [`SynthConfig::default`] is what
//! `kleptosyn config init` writes out.

use crate::error::{ConfigurationError, SynthError};
use crate::money::RoundingConfig;
use crate::vocabulary::{VocabularyConfig, Vocabulary};
use chrono::{DateTime, Duration, TimeZone, Utc};
use kleptosyn_motif::{Distribution, EntityKind, MotifLibrary, MotifTemplate, Relation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Tolerance for probability tables summing to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Keys the serializer already uses on node records; flags may not shadow them.
pub const RESERVED_ATTRIBUTES: [&str; 12] = [
    "id",
    "kind",
    "type",
    "name",
    "country",
    "anomaly",
    "in_degree",
    "out_degree",
    "component",
    "component_size",
    "degree_centrality",
    "flags",
];

// ============================================================================
// Population
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryShare {
    pub code: String,
    pub p: f64,
}

/// How entities of one kind are drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindDistribution {
    pub count: usize,
    pub type_tag: String,
    /// Sampled in declared order.
    pub countries: Vec<CountryShare>,
    /// Independent Bernoulli probability per flag, drawn in key order.
    #[serde(default)]
    pub flags: BTreeMap<String, f64>,
    #[serde(default)]
    pub anomaly_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Kind(EntityKind),
    Flag(String),
    Country(String),
}

/// When `when` holds for an entity, `flag` is redrawn with `probability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub flag: String,
    pub when: Condition,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub persons: KindDistribution,
    pub organizations: KindDistribution,
    #[serde(default)]
    pub correlations: Vec<CorrelationRule>,
}

impl PopulationConfig {
    pub fn kind(&self, kind: EntityKind) -> &KindDistribution {
        match kind {
            EntityKind::Person => &self.persons,
            EntityKind::Organization => &self.organizations,
        }
    }

    pub fn total(&self) -> usize {
        self.persons.count + self.organizations.count
    }

    pub fn validate(&self, vocab: &VocabularyConfig) -> Result<(), ConfigurationError> {
        for kind in EntityKind::ALL {
            let field = format!("population.{}", plural(kind));
            let dist = self.kind(kind);

            if !vocab.entity_types.contains(&dist.type_tag) {
                return Err(ConfigurationError::new(
                    format!("{field}.type_tag"),
                    format!("`{}` is not in the entity type vocabulary", dist.type_tag),
                ));
            }

            if dist.countries.is_empty() {
                if dist.count > 0 {
                    return Err(ConfigurationError::new(
                        format!("{field}.countries"),
                        "table is empty but count is non-zero",
                    ));
                }
            } else {
                for (i, share) in dist.countries.iter().enumerate() {
                    if !vocab.countries.contains(&share.code) {
                        return Err(ConfigurationError::new(
                            format!("{field}.countries[{i}].code"),
                            format!("`{}` is not in the country vocabulary", share.code),
                        ));
                    }
                    check_probability(&format!("{field}.countries[{i}].p"), share.p)?;
                }
                check_sums_to_one(
                    &format!("{field}.countries"),
                    dist.countries.iter().map(|c| c.p),
                )?;
            }

            for (flag, &p) in &dist.flags {
                check_flag_name(&format!("{field}.flags"), flag)?;
                check_probability(&format!("{field}.flags.{flag}"), p)?;
            }
            check_probability(&format!("{field}.anomaly_rate"), dist.anomaly_rate)?;
        }

        for (i, rule) in self.correlations.iter().enumerate() {
            let field = format!("population.correlations[{i}]");
            check_flag_name(&format!("{field}.flag"), &rule.flag)?;
            if !self.is_known_flag(&rule.flag) {
                return Err(ConfigurationError::new(
                    format!("{field}.flag"),
                    format!("unknown flag `{}`", rule.flag),
                ));
            }
            match &rule.when {
                Condition::Flag(flag) if !self.is_known_flag(flag) => {
                    return Err(ConfigurationError::new(
                        format!("{field}.when.flag"),
                        format!("unknown flag `{flag}`"),
                    ));
                }
                Condition::Country(code) if !vocab.countries.contains(code) => {
                    return Err(ConfigurationError::new(
                        format!("{field}.when.country"),
                        format!("`{code}` is not in the country vocabulary"),
                    ));
                }
                _ => {}
            }
            check_probability(&format!("{field}.probability"), rule.probability)?;
        }
        Ok(())
    }

    fn is_known_flag(&self, flag: &str) -> bool {
        self.persons.flags.contains_key(flag) || self.organizations.flags.contains_key(flag)
    }
}

fn plural(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Person => "persons",
        EntityKind::Organization => "organizations",
    }
}

fn check_probability(field: &str, p: f64) -> Result<(), ConfigurationError> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(ConfigurationError::new(
            field,
            format!("probability {p} is outside [0, 1]"),
        ))
    }
}

fn check_sums_to_one(
    field: &str,
    values: impl Iterator<Item = f64>,
) -> Result<(), ConfigurationError> {
    let sum: f64 = values.sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(ConfigurationError::new(
            field,
            format!("probabilities sum to {sum}, expected 1"),
        ));
    }
    Ok(())
}

fn check_flag_name(field: &str, flag: &str) -> Result<(), ConfigurationError> {
    if flag.is_empty() || RESERVED_ATTRIBUTES.contains(&flag) {
        return Err(ConfigurationError::new(
            field,
            format!("`{flag}` cannot be used as a flag name"),
        ));
    }
    Ok(())
}

// ============================================================================
// Motifs, background, time
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotifRequest {
    pub template: String,
    pub count: usize,
}

/// One row of the background relation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundRelation {
    pub relation: Relation,
    pub probability: f64,
    /// Restrict endpoints to one kind; `None` means any entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_kind: Option<EntityKind>,
    pub weight: Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    pub mean_degree: f64,
    #[serde(default)]
    pub relations: Vec<BackgroundRelation>,
}

/// The span motif anchors and background timestamps are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn span_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    /// Uniform instant in `[start, end)`, second resolution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DateTime<Utc> {
        let offset = rng.gen_range(0..self.span_seconds().max(1));
        self.start + Duration::seconds(offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReusePolicy {
    #[serde(default)]
    pub allow_entity_reuse: bool,
    /// Upper bound on instances per entity when reuse is allowed.
    #[serde(default = "default_max_reuse")]
    pub max_reuse: usize,
}

fn default_max_reuse() -> usize {
    2
}

impl Default for ReusePolicy {
    fn default() -> Self {
        Self {
            allow_entity_reuse: false,
            max_reuse: default_max_reuse(),
        }
    }
}

impl ReusePolicy {
    /// How many instances one entity may join.
    pub fn limit(&self) -> usize {
        if self.allow_entity_reuse {
            self.max_reuse
        } else {
            1
        }
    }
}

/// How candidates for a role are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Every eligible candidate is equally likely.
    Uniform,
    /// Candidates already used are down-weighted by `decay^uses`.
    Availability {
        #[serde(default = "default_decay")]
        decay: f64,
    },
}

fn default_decay() -> f64 {
    0.5
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::Availability {
            decay: default_decay(),
        }
    }
}

impl SelectionPolicy {
    pub fn weight(&self, uses: usize) -> f64 {
        match *self {
            SelectionPolicy::Uniform => 1.0,
            SelectionPolicy::Availability { decay } => decay.powi(uses as i32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_max_retries() -> usize {
    5
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub seed: u64,
    pub population: PopulationConfig,
    pub vocabulary: VocabularyConfig,
    /// Inline templates; they shadow catalog entries of the same name.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<MotifTemplate>,
    pub motifs: Vec<MotifRequest>,
    pub background: BackgroundConfig,
    pub window: TimeWindow,
    pub reuse: ReusePolicy,
    pub selection: SelectionPolicy,
    pub rounding: RoundingConfig,
    pub temporal: TemporalConfig,
    pub relax_eligibility: bool,
    pub parallel: bool,
}

impl SynthConfig {
    pub fn load(path: &Path) -> Result<Self, SynthError> {
        let text = std::fs::read_to_string(path).map_err(|e| SynthError::io(path, e))?;
        Ok(Self::from_json_str(&text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(text).map_err(|e| ConfigurationError::new("config", e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check everything that does not need instantiation. Template names in
    /// `motifs` are resolved against `library`.
    pub fn validate(&self, library: &MotifLibrary) -> Result<(), ConfigurationError> {
        self.population.validate(&self.vocabulary)?;

        for (i, request) in self.motifs.iter().enumerate() {
            if library.get(&request.template).is_none() {
                return Err(ConfigurationError::new(
                    format!("motifs[{i}].template"),
                    format!("unknown template `{}`", request.template),
                ));
            }
        }

        self.validate_background()?;

        if self.window.span_seconds() <= 0 {
            return Err(ConfigurationError::new(
                "window",
                format!("start {} is not before end {}", self.window.start, self.window.end),
            ));
        }
        if self.reuse.allow_entity_reuse && self.reuse.max_reuse == 0 {
            return Err(ConfigurationError::new(
                "reuse.max_reuse",
                "must be at least 1 when reuse is allowed",
            ));
        }
        if let SelectionPolicy::Availability { decay } = self.selection {
            if !(decay.is_finite() && decay > 0.0 && decay <= 1.0) {
                return Err(ConfigurationError::new(
                    "selection.decay",
                    format!("{decay} is outside (0, 1]"),
                ));
            }
        }
        if self.rounding.minor_unit_digits > 6 {
            return Err(ConfigurationError::new(
                "rounding.minor_unit_digits",
                "at most 6 digits are supported",
            ));
        }
        Ok(())
    }

    fn validate_background(&self) -> Result<(), ConfigurationError> {
        let bg = &self.background;
        if !(bg.mean_degree.is_finite() && bg.mean_degree >= 0.0) {
            return Err(ConfigurationError::new(
                "background.mean_degree",
                format!("{} must be finite and >= 0", bg.mean_degree),
            ));
        }
        let ceiling = self.population.total().saturating_sub(1) as f64;
        if bg.mean_degree > ceiling {
            return Err(ConfigurationError::new(
                "background.mean_degree",
                format!(
                    "{} exceeds {ceiling}, the densest simple directed graph on the population",
                    bg.mean_degree
                ),
            ));
        }
        if bg.mean_degree == 0.0 {
            return Ok(());
        }
        if bg.relations.is_empty() {
            return Err(ConfigurationError::new(
                "background.relations",
                "table is empty but mean_degree is non-zero",
            ));
        }
        for (i, row) in bg.relations.iter().enumerate() {
            let field = format!("background.relations[{i}]");
            check_probability(&format!("{field}.probability"), row.probability)?;
            row.weight.validate().map_err(|e| {
                ConfigurationError::new(format!("{field}.weight"), e.to_string())
            })?;
            let count = |k: Option<EntityKind>| match k {
                Some(kind) => self.population.kind(kind).count,
                None => self.population.total(),
            };
            let (sources, targets) = (count(row.source_kind), count(row.target_kind));
            let shared = row.source_kind.is_none()
                || row.target_kind.is_none()
                || row.source_kind == row.target_kind;
            if sources == 0 || targets == 0 || (shared && sources.min(targets) < 2) {
                return Err(ConfigurationError::new(
                    field,
                    "population cannot supply two distinct endpoints",
                ));
            }
        }
        check_sums_to_one(
            "background.relations",
            bg.relations.iter().map(|r| r.probability),
        )
    }
}

fn utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

impl Default for TimeWindow {
    fn default() -> Self {
        // 2024-01-01 .. 2024-04-01
        Self {
            start: utc(1_704_067_200),
            end: utc(1_711_929_600),
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            mean_degree: 1.5,
            relations: vec![
                BackgroundRelation {
                    relation: Relation::Transfer,
                    probability: 0.6,
                    source_kind: None,
                    target_kind: None,
                    weight: Distribution::log_normal(5_000.0, 1.2),
                },
                BackgroundRelation {
                    relation: Relation::Employment,
                    probability: 0.2,
                    source_kind: Some(EntityKind::Person),
                    target_kind: Some(EntityKind::Organization),
                    weight: Distribution::beta(2.0, 2.0),
                },
                BackgroundRelation {
                    relation: Relation::Ownership,
                    probability: 0.15,
                    source_kind: None,
                    target_kind: Some(EntityKind::Organization),
                    weight: Distribution::beta(2.0, 5.0),
                },
                BackgroundRelation {
                    relation: Relation::Associate,
                    probability: 0.05,
                    source_kind: Some(EntityKind::Person),
                    target_kind: Some(EntityKind::Person),
                    weight: Distribution::uniform(0.1, 1.0),
                },
            ],
        }
    }
}

fn shares(table: &[(&str, f64)]) -> Vec<CountryShare> {
    table
        .iter()
        .map(|&(code, p)| CountryShare {
            code: code.to_string(),
            p,
        })
        .collect()
}

fn flags(table: &[(&str, f64)]) -> BTreeMap<String, f64> {
    table.iter().map(|&(f, p)| (f.to_string(), p)).collect()
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            persons: KindDistribution {
                count: 200,
                type_tag: "Person".to_string(),
                countries: shares(&[
                    ("GB", 0.3),
                    ("US", 0.25),
                    ("CY", 0.15),
                    ("RU", 0.1),
                    ("AE", 0.1),
                    ("LV", 0.1),
                ]),
                flags: flags(&[
                    ("mule", 0.15),
                    ("ubo", 0.1),
                    ("beneficiary", 0.2),
                    ("sanctioned", 0.02),
                    ("pep", 0.03),
                ]),
                anomaly_rate: 0.02,
            },
            organizations: KindDistribution {
                count: 120,
                type_tag: "Company".to_string(),
                countries: shares(&[
                    ("VG", 0.25),
                    ("CY", 0.2),
                    ("GB", 0.2),
                    ("AE", 0.15),
                    ("LV", 0.1),
                    ("PA", 0.1),
                ]),
                flags: flags(&[("shell", 0.5), ("sanctioned", 0.01)]),
                anomaly_rate: 0.02,
            },
            correlations: vec![
                CorrelationRule {
                    flag: "beneficiary".to_string(),
                    when: Condition::Flag("ubo".to_string()),
                    probability: 0.6,
                },
                CorrelationRule {
                    flag: "sanctioned".to_string(),
                    when: Condition::Country("RU".to_string()),
                    probability: 0.25,
                },
            ],
        }
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        let request = |template: &str, count| MotifRequest {
            template: template.to_string(),
            count,
        };
        Self {
            seed: 42,
            population: PopulationConfig::default(),
            vocabulary: VocabularyConfig::default(),
            templates: Vec::new(),
            motifs: vec![
                request("rapid_movement", 3),
                request("peel_chain", 2),
                request("mule_burst", 3),
                request("fan_out_burst", 2),
                request("shell_ownership", 4),
            ],
            background: BackgroundConfig::default(),
            window: TimeWindow::default(),
            reuse: ReusePolicy::default(),
            selection: SelectionPolicy::default(),
            rounding: RoundingConfig::default(),
            temporal: TemporalConfig::default(),
            relax_eligibility: false,
            parallel: true,
        }
    }
}
