use chrono::{DateTime, Utc};
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::net::Ipv4Addr;

use crate::error::TraceError;
use crate::state::{HopSequence, TraceOutcome};
use crate::topology::{GraphStats, TopologyGraph};

/// A completed trace: the destination was reached or the hop bound ran out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationTrace {
    pub destination: Ipv4Addr,
    pub outcome: TraceOutcome,
    pub sequence: HopSequence,
}

impl DestinationTrace {
    pub fn new(sequence: HopSequence) -> Self {
        Self {
            destination: sequence.destination,
            outcome: sequence.outcome(),
            sequence,
        }
    }
}

/// Everything one orchestrator run produced
///
/// Completed traces (reached or unresolved) and failed traces are kept apart:
/// a failed destination never appears in `traces`.
#[derive(Debug, Serialize)]
pub struct TraceReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: GraphStats,
    pub graph: TopologyGraph,
    /// Completed traces, in input order
    pub traces: Vec<DestinationTrace>,
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<TraceError>,
}

impl TraceReport {
    pub fn reached(&self) -> impl Iterator<Item = &DestinationTrace> {
        self.traces
            .iter()
            .filter(|t| matches!(t.outcome, TraceOutcome::Reached { .. }))
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &DestinationTrace> {
        self.traces
            .iter()
            .filter(|t| t.outcome == TraceOutcome::Unresolved)
    }

    pub fn trace(&self, destination: Ipv4Addr) -> Option<&DestinationTrace> {
        self.traces.iter().find(|t| t.destination == destination)
    }

    /// Add failures found outside the run (e.g. rejected inputs)
    pub fn add_failures(&mut self, failures: impl IntoIterator<Item = TraceError>) {
        self.failures.extend(failures);
    }
}

#[derive(Serialize)]
struct FailureView {
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<String>,
    error: String,
}

impl From<&TraceError> for FailureView {
    fn from(err: &TraceError) -> Self {
        let input = match err {
            TraceError::UnresolvedDestination { input, .. } => Some(input.clone()),
            _ => None,
        };
        Self {
            destination: err.destination(),
            input,
            error: err.to_string(),
        }
    }
}

fn serialize_failures<S: Serializer>(failures: &[TraceError], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(failures.len()))?;
    for failure in failures {
        seq.serialize_element(&FailureView::from(failure))?;
    }
    seq.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HopRecord;
    use std::time::Duration;

    fn report() -> TraceReport {
        let reached = Ipv4Addr::new(8, 8, 8, 8);
        let unresolved = Ipv4Addr::new(192, 0, 2, 7);

        let mut graph = TopologyGraph::new();
        let seq = HopSequence::with_hops(
            reached,
            vec![HopRecord::destination(1, reached, Duration::from_millis(9))],
        );
        graph.merge(&seq);
        graph.register_target(unresolved);

        let now = Utc::now();
        TraceReport {
            started_at: now,
            finished_at: now,
            stats: graph.stats(),
            graph,
            traces: vec![
                DestinationTrace::new(seq),
                DestinationTrace::new(HopSequence::with_hops(unresolved, vec![HopRecord::silent(1)])),
            ],
            failures: vec![TraceError::ReceiverStopped.for_destination(Ipv4Addr::new(1, 1, 1, 1))],
        }
    }

    #[test]
    fn test_outcome_filters() {
        let report = report();
        assert_eq!(report.reached().count(), 1);
        assert_eq!(report.unresolved().count(), 1);
        assert!(report.trace(Ipv4Addr::new(1, 1, 1, 1)).is_none());
    }

    #[test]
    fn test_failures_serialize_with_destination() {
        let mut report = report();
        report.add_failures([TraceError::UnresolvedDestination {
            input: "nowhere.invalid".into(),
            reason: "no IPv4 address".into(),
        }]);

        let value = serde_json::to_value(&report).unwrap();
        let failures = value["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0]["destination"], "1.1.1.1");
        assert_eq!(failures[1]["input"], "nowhere.invalid");
        assert!(failures[1].get("destination").is_none());
        assert_eq!(value["traces"][0]["outcome"]["status"], "reached");
        assert_eq!(value["traces"][1]["outcome"]["status"], "unresolved");
    }
}
