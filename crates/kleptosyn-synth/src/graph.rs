//! The assembled multi-relational graph.
//!
//! Directed multigraph with dense node ids. Parallel edges between the same
//! ordered pair are told apart by a per-pair `key` (0, 1, 2, ...), the same
//! convention networkx uses for `MultiDiGraph`.

use crate::entity::{Entity, EntityId};
use crate::error::IntegrityViolationError;
use crate::instance::Origin;
use crate::money::Amount;
use chrono::{DateTime, Utc};
use kleptosyn_motif::Relation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Derived after assembly; never an input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub in_degree: usize,
    pub out_degree: usize,
    /// Weak component id, numbered by lowest member id.
    pub component: usize,
    pub component_size: usize,
    pub degree_centrality: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub entity: Entity,
    pub metrics: NodeMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub source: EntityId,
    pub target: EntityId,
    pub key: usize,
    pub relation: Relation,
    pub weight: f64,
    pub amount: Option<Amount>,
    pub timestamp: Option<DateTime<Utc>>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    pair_keys: HashMap<(EntityId, EntityId), usize>,
    components: usize,
}

impl Graph {
    /// Nodes must arrive with ids `0..n` in order.
    pub fn new(entities: Vec<Entity>) -> Result<Self, IntegrityViolationError> {
        let mut nodes = Vec::with_capacity(entities.len());
        for (i, entity) in entities.into_iter().enumerate() {
            if entity.id.index() != i {
                return Err(IntegrityViolationError(format!(
                    "node id {} at position {i}",
                    entity.id
                )));
            }
            nodes.push(GraphNode {
                entity,
                metrics: NodeMetrics::default(),
            });
        }
        Ok(Self {
            nodes,
            ..Self::default()
        })
    }

    /// Append an edge, assigning its multigraph key. Both endpoints must exist.
    pub fn add_edge(&mut self, mut edge: GraphEdge) -> Result<usize, IntegrityViolationError> {
        for endpoint in [edge.source, edge.target] {
            if endpoint.index() >= self.nodes.len() {
                return Err(IntegrityViolationError(format!(
                    "edge {} -> {} ({}) references unknown node {endpoint}",
                    edge.source, edge.target, edge.origin
                )));
            }
        }
        let next = self.pair_keys.entry((edge.source, edge.target)).or_insert(0);
        edge.key = *next;
        *next += 1;
        let key = edge.key;
        self.edges.push(edge);
        Ok(key)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, id: EntityId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Valid after [`Graph::compute_metrics`].
    pub fn component_count(&self) -> usize {
        self.components
    }

    /// Degrees, weak components, degree centrality.
    pub fn compute_metrics(&mut self) {
        let n = self.nodes.len();
        let mut uf = UnionFind::new(n);
        for node in &mut self.nodes {
            node.metrics = NodeMetrics::default();
        }
        for e in &self.edges {
            self.nodes[e.source.index()].metrics.out_degree += 1;
            self.nodes[e.target.index()].metrics.in_degree += 1;
            uf.union(e.source.index(), e.target.index());
        }

        let ids = uf.component_ids();
        let mut sizes = vec![0usize; uf.num_components()];
        for &c in &ids {
            sizes[c] += 1;
        }
        let denom = n.saturating_sub(1).max(1) as f64;
        for (node, &c) in self.nodes.iter_mut().zip(&ids) {
            let m = &mut node.metrics;
            m.component = c;
            m.component_size = sizes[c];
            m.degree_centrality = if n > 1 {
                (m.in_degree + m.out_degree) as f64 / denom
            } else {
                0.0
            };
        }
        self.components = sizes.len();
    }

    /// Members of each weak component, ordered by component id.
    pub fn weakly_connected_components(&self) -> Vec<Vec<EntityId>> {
        let mut out: Vec<Vec<EntityId>> = vec![Vec::new(); self.components];
        for node in &self.nodes {
            if let Some(members) = out.get_mut(node.metrics.component) {
                members.push(node.entity.id);
            }
        }
        out
    }
}

// ============================================================================
// Union-find (path compression + union by rank)
// ============================================================================

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
    num_components: usize,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            num_components: n,
        }
    }

    fn num_components(&self) -> usize {
        self.num_components
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, x: usize, y: usize) -> bool {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx == ry {
            return false;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
        self.num_components -= 1;
        true
    }

    /// Dense component ids in order of each component's lowest member.
    fn component_ids(&mut self) -> Vec<usize> {
        let n = self.parent.len();
        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let root = self.find(i);
            let next = by_root.len();
            ids.push(*by_root.entry(root).or_insert(next));
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kleptosyn_motif::EntityKind;
    use std::collections::BTreeMap;

    fn entity(id: u32) -> Entity {
        Entity {
            id: EntityId(id),
            kind: EntityKind::Organization,
            type_tag: "Company".into(),
            name: format!("org {id}"),
            country: "CY".into(),
            flags: BTreeMap::new(),
            anomaly: false,
        }
    }

    fn edge(s: u32, t: u32) -> GraphEdge {
        GraphEdge {
            source: EntityId(s),
            target: EntityId(t),
            key: 0,
            relation: Relation::Transfer,
            weight: 1.0,
            amount: Some(Amount(100)),
            timestamp: None,
            origin: Origin::Background,
        }
    }

    #[test]
    fn parallel_edges_get_increasing_keys() {
        let mut g = Graph::new((0..2).map(entity).collect()).unwrap();
        assert_eq!(g.add_edge(edge(0, 1)).unwrap(), 0);
        assert_eq!(g.add_edge(edge(0, 1)).unwrap(), 1);
        assert_eq!(g.add_edge(edge(1, 0)).unwrap(), 0);
    }

    #[test]
    fn unknown_endpoint_is_an_integrity_violation() {
        let mut g = Graph::new((0..2).map(entity).collect()).unwrap();
        assert!(g.add_edge(edge(0, 5)).is_err());
        assert!(Graph::new(vec![entity(1)]).is_err());
    }

    #[test]
    fn metrics_and_components() {
        let mut g = Graph::new((0..5).map(entity).collect()).unwrap();
        g.add_edge(edge(0, 1)).unwrap();
        g.add_edge(edge(2, 1)).unwrap();
        g.add_edge(edge(3, 4)).unwrap();
        g.compute_metrics();

        assert_eq!(g.component_count(), 2);
        assert_eq!(
            g.weakly_connected_components(),
            vec![
                vec![EntityId(0), EntityId(1), EntityId(2)],
                vec![EntityId(3), EntityId(4)]
            ]
        );
        let hub = &g.node(EntityId(1)).unwrap().metrics;
        assert_eq!((hub.in_degree, hub.out_degree), (2, 0));
        assert_eq!(hub.component_size, 3);
        assert_relative_eq!(hub.degree_centrality, 0.5);
    }
}
