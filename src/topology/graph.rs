use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::state::HopSequence;

/// Graph node identity: the local vantage point or a hop address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Source,
    Addr(Ipv4Addr),
}

impl NodeId {
    pub fn addr(&self) -> Option<Ipv4Addr> {
        match self {
            NodeId::Source => None,
            NodeId::Addr(ip) => Some(*ip),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Source => write!(f, "source"),
            NodeId::Addr(ip) => write!(f, "{}", ip),
        }
    }
}

impl FromStr for NodeId {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "source" {
            return Ok(NodeId::Source);
        }
        s.parse().map(NodeId::Addr)
    }
}

impl From<Ipv4Addr> for NodeId {
    fn from(ip: Ipv4Addr) -> Self {
        NodeId::Addr(ip)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What a node is known to be, from all evidence merged so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Source,
    Intermediate,
    Destination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub address: NodeId,
    pub role: NodeRole,
}

impl TopologyNode {
    fn new(address: NodeId, role: NodeRole) -> Self {
        Self { address, role }
    }

    /// Intermediate may become destination; never the reverse
    fn promote(&mut self, role: NodeRole) {
        if self.role == NodeRole::Intermediate && role == NodeRole::Destination {
            self.role = NodeRole::Destination;
        }
    }

    pub fn is_destination(&self) -> bool {
        self.role == NodeRole::Destination
    }
}

/// Directed hop-to-hop adjacency with every latency sample observed on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub samples: Vec<f64>,
}

impl TopologyEdge {
    fn new(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            samples: Vec::new(),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn avg_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
        }
    }

    pub fn min_ms(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    pub fn max_ms(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }

    pub fn latest_ms(&self) -> Option<f64> {
        self.samples.last().copied()
    }
}

/// Node and edge counts of a graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub destination_count: usize,
}

/// Merged topology of every traced path
///
/// Nodes and edges are only ever added; an edge's endpoints always exist as
/// nodes. Both maps are ordered so iteration (and therefore export) does not
/// depend on the order in which traces completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "GraphRepr", from = "GraphRepr")]
pub struct TopologyGraph {
    nodes: BTreeMap<NodeId, TopologyNode>,
    edges: BTreeMap<(NodeId, NodeId), TopologyEdge>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one destination's hop sequence into the graph
    ///
    /// Silent hops are skipped, so an edge may span an unresponsive middle
    /// hop. Each call appends a latency sample to every edge it walks, so
    /// merging the same sequence twice doubles the samples but adds no
    /// nodes or edges.
    pub fn merge(&mut self, sequence: &HopSequence) {
        let mut prev = NodeId::Source;

        for hop in sequence.responding() {
            let Some(addr) = hop.responder else {
                continue;
            };
            let id = NodeId::Addr(addr);
            let role = if hop.reached_destination {
                NodeRole::Destination
            } else {
                NodeRole::Intermediate
            };
            self.upsert_node(id, role);

            // Same responder twice in a row: no self-loop
            if id == prev {
                continue;
            }
            if prev == NodeId::Source {
                self.upsert_node(prev, NodeRole::Source);
            }

            let edge = self
                .edges
                .entry((prev, id))
                .or_insert_with(|| TopologyEdge::new(prev, id));
            edge.samples.extend(hop.rtt_ms);

            prev = id;
        }
    }

    /// Make sure a traced destination has a node even if no trace reached it
    ///
    /// The node is intermediate unless some trace already reached it.
    pub fn register_target(&mut self, destination: Ipv4Addr) {
        self.upsert_node(NodeId::Addr(destination), NodeRole::Intermediate);
    }

    fn upsert_node(&mut self, id: NodeId, role: NodeRole) {
        self.nodes
            .entry(id)
            .or_insert_with(|| TopologyNode::new(id, role))
            .promote(role);
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            destination_count: self.nodes.values().filter(|n| n.is_destination()).count(),
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&TopologyNode> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, from: NodeId, to: NodeId) -> Option<&TopologyEdge> {
        self.edges.get(&(from, to))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TopologyNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &TopologyEdge> {
        self.edges.values()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Wire shape of a graph: flat node and edge lists
#[derive(Serialize, Deserialize)]
struct GraphRepr {
    nodes: Vec<TopologyNode>,
    edges: Vec<TopologyEdge>,
}

impl From<TopologyGraph> for GraphRepr {
    fn from(graph: TopologyGraph) -> Self {
        Self {
            nodes: graph.nodes.into_values().collect(),
            edges: graph.edges.into_values().collect(),
        }
    }
}

impl From<GraphRepr> for TopologyGraph {
    fn from(repr: GraphRepr) -> Self {
        let mut graph = TopologyGraph::new();
        for node in repr.nodes {
            graph.nodes.insert(node.address, node);
        }
        for edge in repr.edges {
            // Keep the endpoint invariant for hand-edited input
            for id in [edge.from, edge.to] {
                graph
                    .nodes
                    .entry(id)
                    .or_insert_with(|| TopologyNode::new(id, NodeRole::Intermediate));
            }
            graph.edges.insert((edge.from, edge.to), edge);
        }
        graph
    }
}
