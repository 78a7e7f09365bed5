//! Model loading and output discovery
//!
//! A [`ModelLoader`] yields a graph together with its declared input and
//! output names. [`StoreLoader`] reads the engine's own persisted forms; other
//! loaders (foreign frameworks, freezing) live outside this workspace.
//!
//! [`candidates`] suggests names for graphs whose outputs are not known yet.

use crate::error::SurgeryResult;
use gsurgery_graph::{read_graph, Graph};
use serde::Serialize;
use std::path::PathBuf;

/// Operator that marks graph inputs
pub const INPUT_OP: &str = "Placeholder";

/// Graph plus its declared boundary
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub graph: Graph,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Source of graphs
pub trait ModelLoader {
    /// Produce the graph and its declared inputs and outputs
    ///
    /// # Errors
    /// Whatever prevents the model from loading
    fn load(&self) -> SurgeryResult<LoadedModel>;
}

/// Loads a graph file written by the graph store
///
/// Inputs are the `Placeholder` nodes. Outputs are the configured names, or
/// the graph's sinks when none are configured.
#[derive(Debug, Clone)]
pub struct StoreLoader {
    path: PathBuf,
    outputs: Vec<String>,
}

impl StoreLoader {
    /// Loader for the graph at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            outputs: Vec::new(),
        }
    }

    /// Declare output names explicitly
    #[must_use]
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }
}

impl ModelLoader for StoreLoader {
    fn load(&self) -> SurgeryResult<LoadedModel> {
        let graph = read_graph(&self.path)?;
        let inputs = graph
            .nodes_with_op(INPUT_OP)
            .map(|n| n.name.clone())
            .collect();
        let outputs = if self.outputs.is_empty() {
            graph.sinks().into_iter().map(|n| n.name.clone()).collect()
        } else {
            self.outputs.clone()
        };
        tracing::info!(path = %self.path.display(), nodes = graph.len(), "loaded graph");
        Ok(LoadedModel {
            graph,
            inputs,
            outputs,
        })
    }
}

/// Likely boundary names of a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Candidates {
    /// `Placeholder` nodes
    pub inputs: Vec<String>,
    /// Last nodes of the head operator, in sequence order
    pub heads: Vec<String>,
    /// Nodes no other node consumes
    pub sinks: Vec<String>,
}

/// Suggest inputs and outputs: placeholders, the last `last` nodes of
/// `head_op` (detection heads are usually the final convolutions) and sinks
#[must_use]
pub fn candidates(graph: &Graph, head_op: &str, last: usize) -> Candidates {
    let heads: Vec<&str> = graph
        .nodes_with_op(head_op)
        .map(|n| n.name.as_str())
        .collect();
    let skip = heads.len().saturating_sub(last);
    Candidates {
        inputs: graph
            .nodes_with_op(INPUT_OP)
            .map(|n| n.name.clone())
            .collect(),
        heads: heads[skip..].iter().map(|s| (*s).to_string()).collect(),
        sinks: graph.sinks().into_iter().map(|n| n.name.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsurgery_graph::{write_graph, Node};
    use pretty_assertions::assert_eq;

    fn convs() -> Graph {
        Graph::from_nodes(vec![
            Node::new("img", "Placeholder"),
            Node::new("c1", "Conv2D").input("img"),
            Node::new("c2", "Conv2D").input("c1"),
            Node::new("c3", "Conv2D").input("c2"),
            Node::new("out", "Identity").input("c3"),
            Node::new("aux", "Relu").input("c2"),
        ])
    }

    #[test]
    fn candidates_take_last_heads() {
        let found = candidates(&convs(), "Conv2D", 2);
        assert_eq!(found.inputs, vec!["img"]);
        assert_eq!(found.heads, vec!["c2", "c3"]);
        assert_eq!(found.sinks, vec!["out", "aux"]);
    }

    #[test]
    fn candidates_with_fewer_heads_than_requested() {
        let found = candidates(&convs(), "Conv2D", 10);
        assert_eq!(found.heads.len(), 3);
        assert!(candidates(&convs(), "MatMul", 5).heads.is_empty());
    }

    #[test]
    fn store_loader_defaults_outputs_to_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.gsg");
        write_graph(&path, &convs()).unwrap();

        let model = StoreLoader::new(&path).load().unwrap();
        assert_eq!(model.inputs, vec!["img"]);
        assert_eq!(model.outputs, vec!["out", "aux"]);

        let model = StoreLoader::new(&path).with_outputs(["c3"]).load().unwrap();
        assert_eq!(model.outputs, vec!["c3"]);
    }

    #[test]
    fn store_loader_reports_missing_file() {
        let err = StoreLoader::new("/no/such/graph.gsg").load().unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
