//! Motif Instantiator.
//!
//! Two phases per run:
//!
//! 1. **Plan** (parallel across motif requests): every random quantity an
//!    instance needs is drawn up front from the request's own stream:
//!    multi-role cardinalities, a selection seed, the anchor, then per edge
//!    (topological order) per copy a weight and a latency. Selection keys
//!    are regenerated from the seed at commit, so a plan stays small no
//!    matter how large the population is.
//! 2. **Commit** (serial, request order then instance order): roles are
//!    reserved against the shared pool, edges are materialized, and burst
//!    windows are verified with bounded latency redraws. A latency that
//!    pushes a timestamp out of the representable range is treated like a
//!    missed window.
//!
//! Because nothing random happens in commit except redraws from the
//! request's own stream, the output does not depend on scheduling.

use crate::config::{SynthConfig, TimeWindow};
use crate::entity::EntityId;
use crate::error::{InsufficientPopulationError, SynthError, TemporalConstraintError};
use crate::instance::{ConcreteEdge, MotifInstance, RoleBinding};
use crate::money::{Amount, RoundingConfig};
use crate::pool::{EntityPool, RoleRequest, Shortfall};
use crate::report::{DropReason, DroppedInstance};
use crate::rng::{stream_rng, template_stream};
use crate::simulator::check_burst_window;
use chrono::{DateTime, Duration, Utc};
use kleptosyn_motif::{MotifLibrary, Relation, RoleSlot, ValidatedTemplate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::HashMap;

/// Everything random about one instance, drawn before binding.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancePlan {
    pub id: String,
    pub ordinal: usize,
    /// Entities per role.
    pub counts: Vec<usize>,
    /// Seeds the selection keys, see [`InstancePlan::selection_keys`].
    pub selection_seed: u64,
    pub anchor: DateTime<Utc>,
    /// Per template edge, one weight per copy (empty for derived edges).
    pub weights: Vec<Vec<f64>>,
    /// Per template edge, one latency in hours per copy (empty if untimed).
    pub latencies: Vec<Vec<f64>>,
}

impl InstancePlan {
    /// Per role, one key in `(0, 1]` per candidate of the role's kind.
    pub fn selection_keys(&self, roles: &[RoleSlot], pool: &EntityPool) -> Vec<Vec<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.selection_seed);
        roles
            .iter()
            .map(|role| {
                (0..pool.candidates(role.kind).len())
                    .map(|_| 1.0 - rng.gen::<f64>())
                    .collect()
            })
            .collect()
    }
}

/// The capability a motif shape needs to become concrete edges.
pub trait Instantiate {
    fn plan<R: Rng + ?Sized>(
        &self,
        id: String,
        ordinal: usize,
        window: &TimeWindow,
        rng: &mut R,
    ) -> Result<InstancePlan, SynthError>;

    fn redraw_latencies<R: Rng + ?Sized>(
        &self,
        plan: &mut InstancePlan,
        rng: &mut R,
    ) -> Result<(), SynthError>;

    fn materialize(
        &self,
        plan: &InstancePlan,
        bindings: &[Vec<EntityId>],
        rounding: &RoundingConfig,
    ) -> Result<Vec<ConcreteEdge>, TemporalConstraintError>;
}

/// Latency in hours to whole seconds, never below one.
fn latency_seconds(hours: f64) -> i64 {
    let secs = (hours * 3600.0).round();
    if secs.is_finite() && secs >= 1.0 {
        secs as i64
    } else {
        1
    }
}

/// `base` moved forward by a latency, or `None` past the last representable instant.
fn offset(base: DateTime<Utc>, hours: f64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(latency_seconds(hours)).and_then(|d| base.checked_add_signed(d))
}

fn transfer_amount(rounding: &RoundingConfig, major: f64) -> Amount {
    Amount(rounding.to_minor(major).0.max(1))
}

impl Instantiate for ValidatedTemplate {
    fn plan<R: Rng + ?Sized>(
        &self,
        id: String,
        ordinal: usize,
        window: &TimeWindow,
        rng: &mut R,
    ) -> Result<InstancePlan, SynthError> {
        let roles = self.roles();

        let mut counts = Vec::with_capacity(roles.len());
        for role in roles {
            let (min, max) = role.cardinality.bounds();
            counts.push(if min == max {
                min
            } else {
                rng.gen_range(min..=max)
            });
        }

        let selection_seed = rng.gen::<u64>();

        let anchor = window.sample(rng);

        let edges = &self.template().edges;
        let mut weights = vec![Vec::new(); edges.len()];
        let mut latencies = vec![Vec::new(); edges.len()];
        for &i in self.topological_order() {
            let (s, t) = self.endpoints(i);
            let derived = self.is_derived(i);
            for _ in 0..counts[s] * counts[t] {
                if !derived {
                    if let Some(w) = &edges[i].weight {
                        weights[i].push(w.sample(rng)?);
                    }
                }
                if self.is_timed(i) {
                    latencies[i].push(self.latency(i).sample(rng)?);
                }
            }
        }

        Ok(InstancePlan {
            id,
            ordinal,
            counts,
            selection_seed,
            anchor,
            weights,
            latencies,
        })
    }

    fn redraw_latencies<R: Rng + ?Sized>(
        &self,
        plan: &mut InstancePlan,
        rng: &mut R,
    ) -> Result<(), SynthError> {
        for &i in self.topological_order() {
            for slot in plan.latencies[i].iter_mut() {
                *slot = self.latency(i).sample(rng)?;
            }
        }
        Ok(())
    }

    fn materialize(
        &self,
        plan: &InstancePlan,
        bindings: &[Vec<EntityId>],
        rounding: &RoundingConfig,
    ) -> Result<Vec<ConcreteEdge>, TemporalConstraintError> {
        let specs = &self.template().edges;
        let fraction = self.shape().bleed_fraction();
        let mut per_edge: Vec<Vec<ConcreteEdge>> = vec![Vec::new(); specs.len()];

        for &i in self.topological_order() {
            let spec = &specs[i];
            let (s, t) = self.endpoints(i);
            let base = self
                .predecessors(i)
                .iter()
                .flat_map(|&p| per_edge[p].iter().filter_map(|e| e.timestamp))
                .max()
                .unwrap_or(plan.anchor);
            // Chain roles are single, so a derived edge has one predecessor copy.
            let incoming = match (fraction, self.is_derived(i)) {
                (Some(f), true) => self
                    .predecessors(i)
                    .first()
                    .and_then(|&p| per_edge[p].first())
                    .map(|e| (f, e.weight, e.amount)),
                _ => None,
            };

            let mut out = Vec::with_capacity(bindings[s].len() * bindings[t].len());
            for &source in &bindings[s] {
                for &target in &bindings[t] {
                    let copy = out.len();
                    let (weight, amount) = match incoming {
                        Some((f, _, Some(a))) if spec.relation == Relation::Transfer => {
                            let amount = rounding.bleed(a, f);
                            (rounding.to_major(amount), Some(amount))
                        }
                        Some((f, w, _)) => {
                            let w = w * (1.0 - f);
                            if spec.relation == Relation::Transfer {
                                let amount = transfer_amount(rounding, w);
                                (rounding.to_major(amount), Some(amount))
                            } else {
                                (w, None)
                            }
                        }
                        None => {
                            let w = plan.weights[i].get(copy).copied().unwrap_or(0.0);
                            if spec.relation == Relation::Transfer {
                                let amount = transfer_amount(rounding, w);
                                (rounding.to_major(amount), Some(amount))
                            } else {
                                (w, None)
                            }
                        }
                    };
                    let timestamp = match plan.latencies[i].get(copy) {
                        Some(&hours) => Some(offset(base, hours).ok_or_else(|| {
                            TemporalConstraintError {
                                instance: plan.id.clone(),
                                window_hours: (DateTime::<Utc>::MAX_UTC - base).num_seconds()
                                    as f64
                                    / 3600.0,
                                observed_hours: hours,
                                attempts: 0,
                            }
                        })?),
                        None => None,
                    };
                    out.push(ConcreteEdge {
                        spec_index: i,
                        copy,
                        source,
                        target,
                        relation: spec.relation,
                        weight,
                        amount,
                        timestamp,
                    });
                }
            }
            per_edge[i] = out;
        }

        Ok(per_edge.into_iter().flatten().collect())
    }
}

// ============================================================================
// Running all requests
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Instantiation {
    pub instances: Vec<MotifInstance>,
    pub dropped: Vec<DroppedInstance>,
}

struct RequestPlan<'a> {
    ordinal: usize,
    template: &'a ValidatedTemplate,
    rng: ChaCha8Rng,
    instances: Vec<InstancePlan>,
}

pub struct MotifInstantiator<'a> {
    library: &'a MotifLibrary,
    pool: &'a EntityPool,
    config: &'a SynthConfig,
}

impl<'a> MotifInstantiator<'a> {
    pub fn new(library: &'a MotifLibrary, pool: &'a EntityPool, config: &'a SynthConfig) -> Self {
        Self {
            library,
            pool,
            config,
        }
    }

    pub fn run(&self) -> Result<Instantiation, SynthError> {
        let requests = &self.config.motifs;

        // Instance numbers continue across requests for the same template.
        let mut next: HashMap<&str, usize> = HashMap::new();
        let starts: Vec<usize> = requests
            .iter()
            .map(|r| {
                let n = next.entry(r.template.as_str()).or_insert(0);
                let start = *n;
                *n += r.count;
                start
            })
            .collect();

        let plans: Vec<RequestPlan<'a>> = if self.config.parallel {
            (0..requests.len())
                .into_par_iter()
                .map(|t| self.plan_request(t, starts[t]))
                .collect::<Result<_, _>>()?
        } else {
            (0..requests.len())
                .map(|t| self.plan_request(t, starts[t]))
                .collect::<Result<_, _>>()?
        };
        tracing::info!(
            requests = plans.len(),
            instances = plans.iter().map(|p| p.instances.len()).sum::<usize>(),
            parallel = self.config.parallel,
            "planned motif instances"
        );

        let mut out = Instantiation::default();
        for mut request in plans {
            let planned = std::mem::take(&mut request.instances);
            for plan in planned {
                let id = plan.id.clone();
                let template = request.template.name().to_string();
                match self.commit(&mut request, plan) {
                    Ok(instance) => {
                        tracing::debug!(
                            instance = %instance.id,
                            edges = instance.edges.len(),
                            relaxed = instance.relaxed,
                            "committed motif instance"
                        );
                        out.instances.push(instance);
                    }
                    Err(SynthError::InsufficientPopulation(err)) => {
                        tracing::warn!(instance = %id, error = %err, "dropping motif instance");
                        out.dropped.push(DroppedInstance {
                            instance: id,
                            template,
                            reason: DropReason::InsufficientPopulation,
                            attempts: 0,
                            detail: err.to_string(),
                        });
                    }
                    Err(SynthError::TemporalConstraint(err)) => {
                        tracing::warn!(instance = %id, error = %err, "dropping motif instance");
                        out.dropped.push(DroppedInstance {
                            instance: id,
                            template,
                            reason: DropReason::TemporalConstraint,
                            attempts: err.attempts,
                            detail: err.to_string(),
                        });
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        tracing::info!(
            committed = out.instances.len(),
            dropped = out.dropped.len(),
            "instantiated motifs"
        );
        Ok(out)
    }

    fn plan_request(&self, ordinal: usize, start: usize) -> Result<RequestPlan<'a>, SynthError> {
        let request = &self.config.motifs[ordinal];
        let template = self.library.get(&request.template).ok_or_else(|| {
            crate::error::ConfigurationError::new(
                format!("motifs[{ordinal}].template"),
                format!("unknown template `{}`", request.template),
            )
        })?;
        let mut rng = stream_rng(self.config.seed, template_stream(ordinal));
        let mut instances = Vec::with_capacity(request.count);
        for k in 0..request.count {
            let n = start + k;
            let id = MotifInstance::instance_id(template.name(), n);
            instances.push(template.plan(id, n, &self.config.window, &mut rng)?);
        }
        Ok(RequestPlan {
            ordinal,
            template,
            rng,
            instances,
        })
    }

    fn commit(
        &self,
        request: &mut RequestPlan<'a>,
        mut plan: InstancePlan,
    ) -> Result<MotifInstance, SynthError> {
        let template = request.template;
        let config = self.config;

        let (bindings, relaxed) = {
            let keys = plan.selection_keys(template.roles(), self.pool);
            let roles: Vec<RoleRequest<'_>> = template
                .roles()
                .iter()
                .enumerate()
                .map(|(r, role)| RoleRequest {
                    kind: role.kind,
                    count: plan.counts[r],
                    eligibility: &role.eligibility,
                    keys: &keys[r],
                })
                .collect();
            match self.pool.reserve(&roles, &config.selection, &config.reuse, false) {
                Ok(b) => (b, false),
                Err(_) if config.relax_eligibility => {
                    match self.pool.reserve(&roles, &config.selection, &config.reuse, true) {
                        Ok(b) => (b, true),
                        Err(short) => return Err(self.shortfall(template, &plan, short)),
                    }
                }
                Err(short) => return Err(self.shortfall(template, &plan, short)),
            }
        };

        let mut instance = MotifInstance {
            id: plan.id.clone(),
            template: template.name().to_string(),
            template_ordinal: request.ordinal,
            ordinal: plan.ordinal,
            anchor: plan.anchor,
            bindings: template
                .roles()
                .iter()
                .zip(&bindings)
                .map(|(role, ids)| RoleBinding {
                    role: role.name.clone(),
                    entities: ids.clone(),
                })
                .collect(),
            edges: Vec::new(),
            relaxed,
        };

        let window = template.shape().window_hours();
        let mut attempts = 0;
        loop {
            let checked = template
                .materialize(&plan, &bindings, &config.rounding)
                .and_then(|edges| {
                    instance.edges = edges;
                    match window {
                        Some(hours) => check_burst_window(&instance, hours, attempts),
                        None => Ok(()),
                    }
                });
            let Err(mut err) = checked else {
                return Ok(instance);
            };
            if attempts >= config.temporal.max_retries {
                self.pool.release(&bindings);
                err.attempts = attempts;
                return Err(err.into());
            }
            attempts += 1;
            if let Err(redraw) = template.redraw_latencies(&mut plan, &mut request.rng) {
                self.pool.release(&bindings);
                return Err(redraw);
            }
        }
    }

    fn shortfall(
        &self,
        template: &ValidatedTemplate,
        plan: &InstancePlan,
        short: Shortfall,
    ) -> SynthError {
        InsufficientPopulationError {
            instance: plan.id.clone(),
            role: template.roles()[short.role].name.clone(),
            required: short.required,
            available: short.available,
        }
        .into()
    }
}
