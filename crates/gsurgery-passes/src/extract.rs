//! Subgraph extraction by backward reachability
//!
//! Starting from the requested outputs, follow every input reference (data and
//! control) back to its producer. The result keeps exactly the nodes visited,
//! verbatim and in their input sequence order.

use crate::error::ExtractError;
use gsurgery_graph::{Graph, NameIndex};
use indexmap::IndexSet;

/// Nodes required to compute a set of outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachableSet {
    /// Positions in the source graph, ascending
    positions: Vec<usize>,
    names: IndexSet<String>,
}

impl ReachableSet {
    /// Number of reachable nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether nothing is reachable
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Whether `name` is required
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Required names in source order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    /// Required positions in source order
    #[inline]
    #[must_use]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }
}

/// Compute the reachable set of `outputs`
///
/// # Errors
/// - [`ExtractError::MissingNode`] for an output not in the graph
/// - [`ExtractError::UnresolvedInput`] when a visited node references a
///   producer that does not exist
pub fn reachable<S: AsRef<str>>(
    graph: &Graph,
    outputs: &[S],
) -> Result<ReachableSet, ExtractError> {
    let index = NameIndex::build(graph);
    let mut visited = vec![false; graph.len()];
    let mut worklist = Vec::with_capacity(outputs.len());

    for output in outputs {
        let output = output.as_ref();
        let pos = index
            .get(output)
            .ok_or_else(|| ExtractError::MissingNode(output.to_string()))?;
        worklist.push(pos);
    }

    while let Some(pos) = worklist.pop() {
        if visited[pos] {
            continue;
        }
        visited[pos] = true;

        let node = &graph.nodes()[pos];
        for input in &node.inputs {
            let producer = index
                .resolve(input)
                .ok_or_else(|| ExtractError::UnresolvedInput {
                    consumer: node.name.clone(),
                    producer: input.producer().to_string(),
                })?;
            if !visited[producer] {
                worklist.push(producer);
            }
        }
    }

    let positions: Vec<usize> = visited
        .iter()
        .enumerate()
        .filter_map(|(pos, seen)| seen.then_some(pos))
        .collect();
    let names = positions
        .iter()
        .map(|&pos| graph.nodes()[pos].name.clone())
        .collect();
    Ok(ReachableSet { positions, names })
}

/// Keep only the nodes required to compute `outputs`
///
/// # Errors
/// See [`reachable`]
pub fn extract<S: AsRef<str>>(graph: &Graph, outputs: &[S]) -> Result<Graph, ExtractError> {
    let set = reachable(graph, outputs)?;
    let nodes: Vec<_> = set
        .positions()
        .iter()
        .map(|&pos| graph.nodes()[pos].clone())
        .collect();

    tracing::info!(
        outputs = outputs.len(),
        kept = nodes.len(),
        dropped = graph.len() - nodes.len(),
        "extracted subgraph"
    );
    Ok(Graph::from_nodes(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsurgery_graph::Node;
    use pretty_assertions::assert_eq;

    fn names(graph: &Graph) -> Vec<&str> {
        graph.iter().map(|n| n.name.as_str()).collect()
    }

    fn diamond() -> Graph {
        Graph::from_nodes(vec![
            Node::new("out", "Add").inputs(["l", "r"]),
            Node::new("l", "Relu").input("x"),
            Node::new("r", "Relu").input("x:0"),
            Node::new("x", "Placeholder"),
            Node::new("unused", "Const"),
        ])
    }

    #[test]
    fn keeps_reachable_nodes_in_source_order() {
        let out = extract(&diamond(), &["out"]).unwrap();
        assert_eq!(names(&out), vec!["out", "l", "r", "x"]);
        assert_eq!(out.nodes()[0], diamond().nodes()[0]);
    }

    #[test]
    fn extracting_a_leaf_keeps_only_it() {
        let out = extract(&diamond(), &["x"]).unwrap();
        assert_eq!(names(&out), vec!["x"]);
    }

    #[test]
    fn control_references_are_followed() {
        let graph = Graph::from_nodes(vec![
            Node::new("init", "NoOp"),
            Node::new("x", "Placeholder"),
            Node::new("y", "Identity").inputs(["x", "^init"]),
        ]);
        let set = reachable(&graph, &["y"]).unwrap();
        assert!(set.contains("init"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn missing_output() {
        let err = extract(&diamond(), &["out", "nope"]).unwrap_err();
        assert_eq!(err, ExtractError::MissingNode("nope".into()));
    }

    #[test]
    fn unresolved_reference_on_visited_path() {
        let graph = Graph::from_nodes(vec![
            Node::new("a", "Identity").input("ghost"),
            Node::new("b", "Identity").input("phantom"),
        ]);
        let err = extract(&graph, &["a"]).unwrap_err();
        assert_eq!(
            err,
            ExtractError::UnresolvedInput {
                consumer: "a".into(),
                producer: "ghost".into(),
            }
        );
    }

    #[test]
    fn dangling_reference_off_path_is_ignored() {
        let graph = Graph::from_nodes(vec![
            Node::new("x", "Placeholder"),
            Node::new("b", "Identity").input("phantom"),
        ]);
        assert_eq!(names(&extract(&graph, &["x"]).unwrap()), vec!["x"]);
    }

    #[test]
    fn cycles_terminate() {
        let graph = Graph::from_nodes(vec![
            Node::new("a", "Identity").input("b"),
            Node::new("b", "Identity").input("a"),
        ]);
        assert_eq!(reachable(&graph, &["a"]).unwrap().len(), 2);
    }

    #[test]
    fn empty_outputs_yield_empty_graph() {
        let out = extract::<&str>(&diamond(), &[]).unwrap();
        assert!(out.is_empty());
    }
}
