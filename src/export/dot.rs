use std::io::Write;

use crate::topology::{NodeRole, TopologyGraph};

/// Export the topology as a Graphviz digraph
///
/// Destinations are filled green, intermediate hops light blue; edges are
/// labelled with their average latency.
pub fn export_dot<W: Write>(graph: &TopologyGraph, mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "digraph topology {{")?;
    writeln!(writer, "    rankdir=LR;")?;
    writeln!(writer, "    node [shape=ellipse, style=filled, fontname=\"Helvetica\"];")?;

    for node in graph.nodes() {
        let color = match node.role {
            NodeRole::Source => "lightgray",
            NodeRole::Intermediate => "lightblue",
            NodeRole::Destination => "green",
        };
        writeln!(writer, "    \"{}\" [fillcolor={}];", node.address, color)?;
    }

    for edge in graph.edges() {
        match edge.avg_ms() {
            Some(avg) => writeln!(
                writer,
                "    \"{}\" -> \"{}\" [label=\"{:.1} ms\"];",
                edge.from, edge.to, avg
            )?,
            None => writeln!(writer, "    \"{}\" -> \"{}\";", edge.from, edge.to)?,
        }
    }

    writeln!(writer, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HopRecord, HopSequence};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    #[test]
    fn test_export_dot() {
        let dest = Ipv4Addr::new(9, 9, 9, 9);
        let router = Ipv4Addr::new(10, 0, 0, 1);
        let mut graph = TopologyGraph::new();
        graph.merge(&HopSequence::with_hops(
            dest,
            vec![
                HopRecord::intermediate(1, router, Duration::from_millis(3)),
                HopRecord::destination(2, dest, Duration::from_millis(8)),
            ],
        ));

        let mut buf = Vec::new();
        export_dot(&graph, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("digraph topology {"));
        assert!(text.contains("\"9.9.9.9\" [fillcolor=green];"));
        assert!(text.contains("\"10.0.0.1\" [fillcolor=lightblue];"));
        assert!(text.contains("\"source\" -> \"10.0.0.1\" [label=\"3.0 ms\"];"));
        assert!(text.trim_end().ends_with('}'));
    }
}
