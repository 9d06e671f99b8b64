//! The generation manifest.

use crate::config::MotifRequest;
use crate::graph::Graph;
use crate::instance::MotifInstance;
use crate::simulator::EventLog;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    InsufficientPopulation,
    TemporalConstraint,
}

/// An instance that was planned but not emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedInstance {
    pub instance: String,
    pub template: String,
    pub reason: DropReason,
    /// Latency redraws spent before giving up (0 for population shortfalls).
    pub attempts: usize,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateReport {
    pub template: String,
    pub requested: usize,
    pub achieved: usize,
    pub relaxed: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub entities: usize,
    pub anomalies: usize,
    pub edges: usize,
    pub motif_edges: usize,
    pub background_edges: usize,
    pub events: usize,
    pub components: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub seed: u64,
    pub generator: String,
    pub templates: Vec<TemplateReport>,
    pub dropped: Vec<DroppedInstance>,
    pub counts: Counts,
}

impl GenerationReport {
    /// Per-template rows follow first appearance in `requests`.
    pub fn build(
        seed: u64,
        requests: &[MotifRequest],
        instances: &[MotifInstance],
        dropped: &[DroppedInstance],
        graph: &Graph,
        events: &EventLog,
    ) -> Self {
        let mut templates: Vec<TemplateReport> = Vec::new();
        for req in requests {
            match templates.iter_mut().find(|t| t.template == req.template) {
                Some(row) => row.requested += req.count,
                None => templates.push(TemplateReport {
                    template: req.template.clone(),
                    requested: req.count,
                    achieved: 0,
                    relaxed: 0,
                    dropped: 0,
                }),
            }
        }
        for inst in instances {
            if let Some(row) = templates.iter_mut().find(|t| t.template == inst.template) {
                row.achieved += 1;
                row.relaxed += usize::from(inst.relaxed);
            }
        }
        for d in dropped {
            if let Some(row) = templates.iter_mut().find(|t| t.template == d.template) {
                row.dropped += 1;
            }
        }

        let motif_edges = graph.edges().iter().filter(|e| !e.origin.is_background()).count();
        let counts = Counts {
            entities: graph.node_count(),
            anomalies: graph.nodes().iter().filter(|n| n.entity.anomaly).count(),
            edges: graph.edge_count(),
            motif_edges,
            background_edges: graph.edge_count() - motif_edges,
            events: events.len(),
            components: graph.component_count(),
        };

        Self {
            seed,
            generator: format!("kleptosyn {}", env!("CARGO_PKG_VERSION")),
            templates,
            dropped: dropped.to_vec(),
            counts,
        }
    }

    pub fn requested(&self) -> usize {
        self.templates.iter().map(|t| t.requested).sum()
    }

    pub fn achieved(&self) -> usize {
        self.templates.iter().map(|t| t.achieved).sum()
    }
}
