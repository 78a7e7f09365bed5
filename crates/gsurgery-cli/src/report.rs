//! Report rendering for the terminal and for machines

use gsurgery_passes::{Occurrence, Report, ReportSink};
use std::io::{self, Write};

/// Operators listed in the text histogram unless overridden
pub const DEFAULT_TOP: usize = 10;

/// Plain-text report
#[derive(Debug)]
pub struct TextSink<W> {
    out: W,
    top: usize,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            top: DEFAULT_TOP,
        }
    }

    /// Number of operators shown in the histogram
    #[must_use]
    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextSink<W> {
    fn emit(&mut self, report: &Report) -> io::Result<()> {
        let out = &mut self.out;
        writeln!(out, "nodes: {}", report.node_count())?;
        writeln!(out, "top operators:")?;
        for (op, count) in report.top_ops(self.top) {
            writeln!(out, "  {op:<28} {count}")?;
        }
        occurrences(out, "disallowed", &report.disallowed)?;
        occurrences(out, "suspicious", &report.suspicious)?;
        writeln!(out, "hazards: {}", report.hazards.len())?;
        for hazard in &report.hazards {
            writeln!(out, "  {hazard}")?;
        }
        let status = if report.is_clean() { "clean" } else { "not clean" };
        writeln!(out, "status: {status}")
    }
}

fn occurrences(out: &mut impl Write, label: &str, found: &[Occurrence]) -> io::Result<()> {
    writeln!(out, "{label}: {}", found.len())?;
    for occurrence in found {
        writeln!(
            out,
            "  {} ({}, {} inputs)",
            occurrence.name, occurrence.op, occurrence.inputs
        )?;
    }
    Ok(())
}

/// Pretty JSON report, one document per emit
#[derive(Debug)]
pub struct JsonSink<W> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn emit(&mut self, report: &Report) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, report)?;
        writeln!(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsurgery_graph::{Graph, Node};
    use gsurgery_passes::{classify, Taxonomy};
    use pretty_assertions::assert_eq;

    fn report() -> Report {
        let graph = Graph::from_nodes(vec![
            Node::new("x", "Placeholder"),
            Node::new("s", "Shape").input("x"),
            Node::new("r", "Reshape").input("x").input("s"),
            Node::new("m", "Softmax").input("r"),
        ]);
        classify(&graph, &Taxonomy::vitis_ai())
    }

    #[test]
    fn text_lists_every_section() {
        let mut sink = TextSink::new(Vec::new()).with_top(2);
        sink.emit(&report()).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        assert!(text.starts_with("nodes: 4\n"));
        assert!(text.contains("disallowed: 1\n  m (Softmax, 1 inputs)\n"));
        assert!(text.contains("suspicious: 1\n  r (Reshape, 2 inputs)\n"));
        assert!(text.contains("  r: dynamic shape from Shape\n"));
        assert!(text.contains("top operators:\n  Placeholder"));
        assert!(text.ends_with("status: not clean\n"));
    }

    #[test]
    fn json_round_trips() {
        let mut sink = JsonSink::new(Vec::new());
        sink.emit(&report()).unwrap();
        let parsed: Report = serde_json::from_slice(&sink.into_inner()).unwrap();
        assert_eq!(parsed, report());
    }
}
