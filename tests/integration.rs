//! Integration tests for trace→merge→report pipeline
//!
//! These tests drive the orchestrator with a scripted network instead of
//! real sockets, so they need neither network access nor raw-socket privileges.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use topologer::export::{export_csv, export_dot, generate_report_string};
use topologer::probe::{build_udp_payload, parse_icmp_response};
use topologer::state::{HopRecord, Probe, ProbeKey, ReplyKind, TraceOutcome};
use topologer::topology::{NodeId, NodeRole, TopologyGraph};
use topologer::trace::{PendingProbe, TraceOrchestrator, new_pending_map, resolve_pending};
use topologer::{ProberFactory, Prober, TraceError, TraceResult};

const GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const ISP: Ipv4Addr = Ipv4Addr::new(100, 64, 0, 1);
const GOOGLE_EDGE: Ipv4Addr = Ipv4Addr::new(72, 14, 0, 1);
const CF_EDGE: Ipv4Addr = Ipv4Addr::new(141, 101, 0, 1);

const GOOGLE: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);
const CLOUDFLARE: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
/// Never answers at any TTL
const BLACKHOLE: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 1);
/// Probe send fails at TTL 2
const BROKEN: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 66);

/// Per-destination router lists; `None` is a router that never answers
#[derive(Clone)]
struct Network {
    routes: Arc<HashMap<Ipv4Addr, Vec<Option<Ipv4Addr>>>>,
}

impl Network {
    fn new() -> Self {
        let mut routes = HashMap::new();
        routes.insert(GOOGLE, vec![Some(GATEWAY), Some(ISP), None, Some(GOOGLE_EDGE)]);
        routes.insert(CLOUDFLARE, vec![Some(GATEWAY), Some(ISP), Some(CF_EDGE)]);
        routes.insert(BROKEN, vec![Some(GATEWAY)]);
        Self {
            routes: Arc::new(routes),
        }
    }
}

#[async_trait]
impl Prober for Network {
    async fn probe(
        &self,
        destination: Ipv4Addr,
        ttl: u8,
        _timeout: Duration,
    ) -> TraceResult<HopRecord> {
        // Let parallel traces interleave
        tokio::time::sleep(Duration::from_millis(1)).await;
        let rtt = Duration::from_millis(ttl as u64 * 5);

        if destination == BROKEN && ttl == 2 {
            return Err(TraceError::ProbeSend {
                destination,
                ttl,
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }

        let Some(route) = self.routes.get(&destination) else {
            return Ok(HopRecord::silent(ttl));
        };
        let index = ttl as usize - 1;
        Ok(match route.get(index) {
            Some(Some(router)) => HopRecord::intermediate(ttl, *router, rtt),
            Some(None) => HopRecord::silent(ttl),
            None if index == route.len() => HopRecord::destination(ttl, destination, rtt),
            None => HopRecord::silent(ttl),
        })
    }
}

impl ProberFactory for Network {
    type Prober = Network;

    fn open(&self, _port: u16) -> TraceResult<Network> {
        Ok(self.clone())
    }
}

fn orchestrator() -> TraceOrchestrator<Network> {
    TraceOrchestrator::new(Arc::new(Network::new())).with_max_hops(8)
}

fn timeout() -> Duration {
    Duration::from_millis(50)
}

type Structure = (HashSet<NodeId>, HashSet<(NodeId, NodeId)>, Vec<NodeRole>);

fn structure(graph: &TopologyGraph) -> Structure {
    (
        graph.nodes().map(|n| n.address).collect(),
        graph.edges().map(|e| (e.from, e.to)).collect(),
        graph.nodes().map(|n| n.role).collect(),
    )
}

#[tokio::test]
async fn test_shared_prefix_merges_into_shared_nodes() {
    let report = orchestrator()
        .run(&[GOOGLE, CLOUDFLARE], false, 1, timeout(), 33434)
        .await;
    let graph = &report.graph;

    // Each shared hop appears once
    assert_eq!(graph.nodes().filter(|n| n.address == NodeId::Addr(GATEWAY)).count(), 1);
    assert!(graph.edge(NodeId::Source, GATEWAY.into()).is_some());
    assert!(graph.edge(GATEWAY.into(), ISP.into()).is_some());

    // Paths diverge after the ISP hop; Google's silent hop 3 is skipped
    assert!(graph.edge(ISP.into(), GOOGLE_EDGE.into()).is_some());
    assert!(graph.edge(ISP.into(), CF_EDGE.into()).is_some());
    assert!(graph.edge(GOOGLE_EDGE.into(), GOOGLE.into()).is_some());
    assert!(graph.edge(CF_EDGE.into(), CLOUDFLARE.into()).is_some());

    // The shared edges carry one sample per trace
    assert_eq!(graph.edge(GATEWAY.into(), ISP.into()).unwrap().sample_count(), 2);

    let stats = graph.stats();
    assert_eq!(stats.node_count, 7);
    assert_eq!(stats.edge_count, 6);
    assert_eq!(stats.destination_count, 2);

    assert_eq!(report.trace(GOOGLE).unwrap().outcome, TraceOutcome::Reached { hops: 5 });
    assert_eq!(report.trace(CLOUDFLARE).unwrap().outcome, TraceOutcome::Reached { hops: 4 });
}

#[tokio::test]
async fn test_parallel_single_worker_matches_sequential() {
    let dests = [GOOGLE, BLACKHOLE, CLOUDFLARE, BROKEN];

    let sequential = orchestrator().run(&dests, false, 1, timeout(), 33434).await;
    let parallel = orchestrator().run(&dests, true, 1, timeout(), 33434).await;
    let wide = orchestrator().run(&dests, true, 4, timeout(), 33434).await;

    assert_eq!(structure(&parallel.graph), structure(&sequential.graph));
    assert_eq!(structure(&wide.graph), structure(&sequential.graph));
    assert_eq!(wide.stats, sequential.stats);
}

#[tokio::test]
async fn test_unresolved_is_not_a_failure() {
    let report = orchestrator()
        .run(&[BLACKHOLE, GOOGLE], true, 2, timeout(), 33434)
        .await;

    assert!(report.failures.is_empty());
    let blackhole = report.trace(BLACKHOLE).unwrap();
    assert_eq!(blackhole.outcome, TraceOutcome::Unresolved);
    assert_eq!(blackhole.sequence.len(), 8);
    assert!(blackhole.sequence.hops.iter().all(|h| !h.reached_destination));

    // The target still has a node, as an intermediate
    let node = report.graph.node(BLACKHOLE.into()).unwrap();
    assert_eq!(node.role, NodeRole::Intermediate);
    assert_eq!(report.unresolved().count(), 1);
    assert_eq!(report.reached().count(), 1);
}

#[tokio::test]
async fn test_failure_is_isolated() {
    let report = orchestrator()
        .run(&[GOOGLE, BROKEN, CLOUDFLARE], true, 3, timeout(), 33434)
        .await;

    assert_eq!(report.traces.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert!(report.trace(BROKEN).is_none());

    let failure = &report.failures[0];
    assert_eq!(failure.destination(), Some(BROKEN));
    assert!(matches!(failure, TraceError::TraceFailure { .. }));
    assert!(matches!(failure.root(), TraceError::ProbeSend { ttl: 2, .. }));

    // Hops sent before the failure are not merged
    assert!(report.graph.node(BROKEN.into()).is_none());
}

#[tokio::test]
async fn test_duplicates_traced_once() {
    let report = orchestrator()
        .run(&[CLOUDFLARE, CLOUDFLARE, CLOUDFLARE], true, 2, timeout(), 33434)
        .await;

    assert_eq!(report.traces.len(), 1);
    for edge in report.graph.edges() {
        assert_eq!(edge.sample_count(), 1);
    }
}

#[tokio::test]
async fn test_silent_limit_cuts_blackhole_short() {
    let report = TraceOrchestrator::new(Arc::new(Network::new()))
        .with_max_hops(30)
        .with_silent_limit(Some(3))
        .run(&[BLACKHOLE], false, 1, timeout(), 33434)
        .await;

    let trace = report.trace(BLACKHOLE).unwrap();
    assert_eq!(trace.sequence.len(), 3);
    assert_eq!(trace.outcome, TraceOutcome::Unresolved);
}

#[tokio::test]
async fn test_report_exports() {
    let report = orchestrator()
        .run(&[GOOGLE, BLACKHOLE, BROKEN], false, 1, timeout(), 33434)
        .await;

    let text = generate_report_string(&report);
    assert!(text.contains("Destination: 8.8.8.8"));
    assert!(text.contains("  3  *"));
    assert!(text.contains("Reached in 5 hops"));
    assert!(text.contains("Unresolved: not reached within 8 hops"));
    assert!(text.contains("Trace to 203.0.113.66 failed"));

    let mut csv = Vec::new();
    export_csv(&report.graph, &mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 1 + report.stats.edge_count);
    assert!(csv.contains("100.64.0.1,72.14.0.1,1,"));

    let mut dot = Vec::new();
    export_dot(&report.graph, &mut dot).unwrap();
    let dot = String::from_utf8(dot).unwrap();
    assert!(dot.contains("\"8.8.8.8\" [fillcolor=green];"));
    assert!(dot.contains("\"198.51.100.1\" [fillcolor=lightblue];"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["failures"][0]["destination"], "203.0.113.66");
}

/// Build a raw ICMP error quoting a UDP probe, as read from the raw socket
fn icmp_error(responder: Ipv4Addr, icmp_type: u8, key: ProbeKey, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; 56 + payload.len()];
    packet[0] = 0x45;
    packet[9] = 1; // ICMP
    packet[12..16].copy_from_slice(&responder.octets());
    packet[20] = icmp_type;
    packet[21] = if icmp_type == 3 { 3 } else { 0 };
    packet[28] = 0x45;
    packet[37] = 17; // UDP
    packet[44..48].copy_from_slice(&key.destination.octets());
    packet[48..50].copy_from_slice(&key.src_port.to_be_bytes());
    packet[50..52].copy_from_slice(&key.dst_port.to_be_bytes());
    packet[56..].copy_from_slice(payload);
    packet
}

#[tokio::test]
async fn test_receive_path_routes_reply_to_waiting_probe() {
    let pending = new_pending_map();
    let first = ProbeKey::new(GOOGLE, 45001, 33435);
    let second = ProbeKey::new(GOOGLE, 45002, 33435);

    let mut waiters = Vec::new();
    for (key, seq) in [(first, 10u16), (second, 11u16)] {
        let (tx, rx) = oneshot::channel();
        pending.write().insert(
            key,
            PendingProbe {
                probe: Probe::new(GOOGLE, 1, seq),
                reply_tx: tx,
            },
        );
        waiters.push(rx);
    }

    // Reply to the second trace's probe: same destination and TTL, other source port
    let packet = icmp_error(GATEWAY, 11, second, &build_udp_payload(11, 16));
    let parsed = parse_icmp_response(&packet, GATEWAY).unwrap();
    assert!(resolve_pending(
        &pending,
        &parsed.probe_key(),
        parsed.sequence,
        parsed.responder,
        parsed.kind
    ));

    let second_rx = waiters.pop().unwrap();
    let reply = second_rx.await.unwrap();
    assert_eq!(reply.responder, GATEWAY);
    assert_eq!(reply.kind, ReplyKind::TimeExceeded);

    // The first trace's probe is still waiting
    assert_eq!(pending.read().len(), 1);
    assert!(pending.read().contains_key(&first));
}
