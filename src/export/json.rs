use anyhow::Result;
use std::io::Write;

use crate::state::TraceReport;

/// Export the full report (graph, per-destination hops, failures) as JSON
pub fn export_json<W: Write>(report: &TraceReport, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DestinationTrace, HopRecord, HopSequence};
    use crate::topology::TopologyGraph;
    use chrono::Utc;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    #[test]
    fn test_export_json_shape() {
        let dest = Ipv4Addr::new(8, 8, 8, 8);
        let seq = HopSequence::with_hops(
            dest,
            vec![
                HopRecord::intermediate(1, Ipv4Addr::new(192, 168, 1, 1), Duration::from_millis(1)),
                HopRecord::silent(2),
                HopRecord::destination(3, dest, Duration::from_millis(12)),
            ],
        );
        let mut graph = TopologyGraph::new();
        graph.merge(&seq);

        let report = TraceReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stats: graph.stats(),
            graph,
            traces: vec![DestinationTrace::new(seq)],
            failures: Vec::new(),
        };

        let mut buf = Vec::new();
        export_json(&report, &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        assert_eq!(value["stats"]["node_count"], 3);
        assert_eq!(value["stats"]["edge_count"], 2);
        assert_eq!(value["traces"][0]["destination"], "8.8.8.8");
        assert!(value["traces"][0]["sequence"]["hops"][1]["responder"].is_null());
        assert_eq!(value["graph"]["edges"][1]["to"], "8.8.8.8");
    }
}
