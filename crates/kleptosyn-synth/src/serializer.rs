//! Serializer: node-link JSON, JSONL event log, TSV transactions.
//!
//! The node-link layout matches networkx `node_link_data(G, edges="edges")`
//! for a `MultiDiGraph`, so `nx.node_link_graph(data, edges="edges")` loads
//! it directly. Output is pretty-printed with a fixed key order, so equal
//! graphs serialize to equal bytes.

use crate::entity::{Entity, EntityId};
use crate::error::{IntegrityViolationError, SynthError};
use crate::graph::{Graph, GraphEdge, NodeMetrics};
use crate::instance::Origin;
use crate::money::{Amount, RoundingConfig};
use crate::simulator::{EventLog, TransactionEvent};
use chrono::{DateTime, Utc};
use kleptosyn_motif::{EntityKind, Relation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

// ============================================================================
// Node-link graph
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMeta {
    pub name: String,
    pub seed: u64,
    pub generator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub name: String,
    pub country: String,
    pub anomaly: bool,
    // Metrics must precede flags: the flag map takes whatever keys are left.
    #[serde(flatten)]
    pub metrics: NodeMetrics,
    #[serde(flatten)]
    pub flags: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: EntityId,
    pub target: EntityId,
    pub key: usize,
    pub relation: Relation,
    pub weight: f64,
    /// Minor units, transfers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLinkGraph {
    pub directed: bool,
    pub multigraph: bool,
    pub graph: GraphMeta,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl NodeLinkGraph {
    pub fn from_graph(graph: &Graph, meta: GraphMeta) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .map(|n| NodeRecord {
                id: n.entity.id,
                kind: n.entity.kind,
                type_tag: n.entity.type_tag.clone(),
                name: n.entity.name.clone(),
                country: n.entity.country.clone(),
                anomaly: n.entity.anomaly,
                metrics: n.metrics.clone(),
                flags: n.entity.flags.clone(),
            })
            .collect();
        let edges = graph
            .edges()
            .iter()
            .map(|e| EdgeRecord {
                source: e.source,
                target: e.target,
                key: e.key,
                relation: e.relation,
                weight: e.weight,
                amount: e.amount,
                timestamp: e.timestamp,
                origin: e.origin.clone(),
            })
            .collect();
        Self {
            directed: true,
            multigraph: true,
            graph: meta,
            nodes,
            edges,
        }
    }

    /// Rebuild the in-memory graph. Metrics are recomputed, and keys must
    /// agree with insertion order.
    pub fn to_graph(&self) -> Result<Graph, SynthError> {
        let entities = self
            .nodes
            .iter()
            .map(|n| Entity {
                id: n.id,
                kind: n.kind,
                type_tag: n.type_tag.clone(),
                name: n.name.clone(),
                country: n.country.clone(),
                flags: n.flags.clone(),
                anomaly: n.anomaly,
            })
            .collect();
        let mut graph = Graph::new(entities)?;
        for e in &self.edges {
            let key = graph.add_edge(GraphEdge {
                source: e.source,
                target: e.target,
                key: e.key,
                relation: e.relation,
                weight: e.weight,
                amount: e.amount,
                timestamp: e.timestamp,
                origin: e.origin.clone(),
            })?;
            if key != e.key {
                return Err(IntegrityViolationError(format!(
                    "edge {} -> {} has key {}, expected {key}",
                    e.source, e.target, e.key
                ))
                .into());
            }
        }
        graph.compute_metrics();
        Ok(graph)
    }

    /// Drop nodes in weak components smaller than `min_size`, with their
    /// edges. Ids are kept, so the result is for export only.
    pub fn prune_components(&self, min_size: usize) -> Self {
        let kept: HashSet<EntityId> = self
            .nodes
            .iter()
            .filter(|n| n.metrics.component_size >= min_size)
            .map(|n| n.id)
            .collect();
        Self {
            directed: self.directed,
            multigraph: self.multigraph,
            graph: self.graph.clone(),
            nodes: self
                .nodes
                .iter()
                .filter(|n| kept.contains(&n.id))
                .cloned()
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|e| kept.contains(&e.source) && kept.contains(&e.target))
                .cloned()
                .collect(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SynthError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), SynthError> {
        let file = File::create(path).map_err(|e| SynthError::io(path, e))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.write_all(b"\n")
            .and_then(|_| out.flush())
            .map_err(|e| SynthError::io(path, e))
    }

    pub fn read(path: &Path) -> Result<Self, SynthError> {
        let file = File::open(path).map_err(|e| SynthError::io(path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

// ============================================================================
// Event log
// ============================================================================

/// One JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: usize,
    pub source: EntityId,
    pub destination: EntityId,
    /// Major units, for readers that do not care about exactness.
    pub amount: f64,
    pub amount_minor: Amount,
    pub timestamp: DateTime<Utc>,
    pub motif_instance_id: Origin,
}

impl EventRecord {
    pub fn new(event: &TransactionEvent, rounding: &RoundingConfig) -> Self {
        Self {
            sequence: event.sequence,
            source: event.source,
            destination: event.destination,
            amount: rounding.to_major(event.amount),
            amount_minor: event.amount,
            timestamp: event.timestamp,
            motif_instance_id: event.origin.clone(),
        }
    }
}

pub fn write_events_jsonl(
    events: &EventLog,
    rounding: &RoundingConfig,
    path: &Path,
) -> Result<(), SynthError> {
    let file = File::create(path).map_err(|e| SynthError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for event in events.iter() {
        serde_json::to_writer(&mut out, &EventRecord::new(event, rounding))?;
        out.write_all(b"\n").map_err(|e| SynthError::io(path, e))?;
    }
    out.flush().map_err(|e| SynthError::io(path, e))
}

pub fn read_events_jsonl(path: &Path) -> Result<Vec<EventRecord>, SynthError> {
    let file = File::open(path).map_err(|e| SynthError::io(path, e))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| SynthError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

// ============================================================================
// Transactions TSV
// ============================================================================

pub const TSV_HEADER: &str = "payer\tpayer_country\tbenef\tbenef_country\tamount\tdate";

/// The flat transaction export: one row per event, names and countries
/// resolved from the graph, `date` as an ISO day.
pub fn write_transactions_tsv(
    events: &EventLog,
    graph: &Graph,
    rounding: &RoundingConfig,
    path: &Path,
) -> Result<(), SynthError> {
    let file = File::create(path).map_err(|e| SynthError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let digits = rounding.minor_unit_digits as usize;
    let io = |e| SynthError::io(path, e);

    writeln!(out, "{TSV_HEADER}").map_err(io)?;
    for event in events.iter() {
        let (payer, benef) = match (graph.node(event.source), graph.node(event.destination)) {
            (Some(p), Some(b)) => (&p.entity, &b.entity),
            _ => {
                return Err(IntegrityViolationError(format!(
                    "event {} references a missing node",
                    event.sequence
                ))
                .into())
            }
        };
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{:.*}\t{}",
            payer.name,
            payer.country,
            benef.name,
            benef.country,
            digits,
            rounding.to_major(event.amount),
            event.timestamp.date_naive().format("%Y-%m-%d")
        )
        .map_err(io)?;
    }
    out.flush().map_err(io)
}
