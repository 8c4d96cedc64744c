use anyhow::Result;
use std::io::Write;

use crate::topology::TopologyGraph;

/// Export topology edges to CSV format
pub fn export_csv<W: Write>(graph: &TopologyGraph, mut writer: W) -> Result<()> {
    writeln!(writer, "from,to,samples,avg_ms,min_ms,max_ms,latest_ms")?;

    for edge in graph.edges() {
        writeln!(
            writer,
            "{},{},{},{},{},{},{}",
            escape_csv(&edge.from.to_string()),
            escape_csv(&edge.to.to_string()),
            edge.sample_count(),
            format_ms(edge.avg_ms()),
            format_ms(edge.min_ms()),
            format_ms(edge.max_ms()),
            format_ms(edge.latest_ms()),
        )?;
    }

    Ok(())
}

fn format_ms(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// Escape a string for CSV (quote if contains comma, quote, or newline)
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
