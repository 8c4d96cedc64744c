use std::io::Write;

use crate::state::{DestinationTrace, TraceOutcome, TraceReport};

/// Generate a hop-by-hop text report for every traced destination
pub fn generate_report<W: Write>(report: &TraceReport, mut writer: W) -> std::io::Result<()> {
    writeln!(
        writer,
        "topologer report ({} destinations)",
        report.traces.len() + report.failures.len()
    )?;
    writeln!(writer, "Started: {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(writer)?;

    for trace in &report.traces {
        write_trace(&mut writer, trace)?;
        writeln!(writer)?;
    }

    let stats = &report.stats;
    writeln!(
        writer,
        "Topology: {} nodes, {} edges, {} destinations reached",
        stats.node_count, stats.edge_count, stats.destination_count
    )?;

    if !report.failures.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Failed traces:")?;
        for failure in &report.failures {
            writeln!(writer, "  {}", failure)?;
        }
    }

    Ok(())
}

fn write_trace<W: Write>(writer: &mut W, trace: &DestinationTrace) -> std::io::Result<()> {
    writeln!(writer, "Destination: {}", trace.destination)?;
    writeln!(writer, "{:>3}  {:<16} {:>10}", "#", "Host", "RTT")?;
    writeln!(writer, "{}", "-".repeat(31))?;

    for hop in &trace.sequence.hops {
        match (hop.responder, hop.rtt_ms) {
            (Some(ip), Some(rtt)) => {
                writeln!(writer, "{:>3}  {:<16} {:>8.1}ms", hop.ttl, ip, rtt)?
            }
            (Some(ip), None) => writeln!(writer, "{:>3}  {:<16} {:>10}", hop.ttl, ip, "?")?,
            (None, _) => writeln!(writer, "{:>3}  *", hop.ttl)?,
        }
    }

    match trace.outcome {
        TraceOutcome::Reached { hops } => writeln!(writer, "Reached in {} hops", hops),
        TraceOutcome::Unresolved => {
            let last = trace.sequence.last();
            if let Some(hop) = last.filter(|h| h.is_dead_end()) {
                writeln!(
                    writer,
                    "Unresolved: {} reported destination unreachable",
                    hop.responder.map(|ip| ip.to_string()).unwrap_or_default()
                )
            } else {
                writeln!(writer, "Unresolved: not reached within {} hops", trace.sequence.len())
            }
        }
    }
}

/// Generate report to string
pub fn generate_report_string(report: &TraceReport) -> String {
    let mut buf = Vec::new();
    // Writing to a Vec cannot fail
    let _ = generate_report(report, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
