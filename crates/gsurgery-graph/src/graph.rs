//! The canonical in-memory graph
//!
//! [`Graph`] is an ordered node sequence. Order carries no meaning: consumers
//! may appear before or after their producers. Uniqueness of names and
//! acyclicity are not enforced by construction; [`Graph::validate`] checks
//! them and the store's load boundary rejects duplicate or empty names.

use crate::error::GraphError;
use crate::node::{InputRef, Node};
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ordered sequence of nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    /// Create an empty graph
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Wrap an existing node sequence
    #[inline]
    #[must_use]
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Append a node
    #[inline]
    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// All nodes in sequence order
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Consume the graph, returning its nodes
    #[inline]
    #[must_use]
    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Iterate nodes in sequence order
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by name (linear scan; build a [`NameIndex`] for bulk lookups)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Position of a node by name
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Whether a node with this name exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Operator occurrence counts in first-seen order
    #[must_use]
    pub fn op_histogram(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for node in &self.nodes {
            *counts.entry(node.op.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Nodes whose operator is `op`, in sequence order
    pub fn nodes_with_op<'a>(&'a self, op: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| n.op == op)
    }

    /// Nodes that no other node consumes (natural output candidates)
    #[must_use]
    pub fn sinks(&self) -> Vec<&Node> {
        let consumed: HashSet<&str> = self
            .nodes
            .iter()
            .flat_map(|n| n.inputs.iter().map(InputRef::producer))
            .collect();
        self.nodes
            .iter()
            .filter(|n| !consumed.contains(n.name.as_str()))
            .collect()
    }

    /// Check that every name is non-empty and unique, and that every input
    /// reference is [well formed](InputRef::is_well_formed)
    ///
    /// # Errors
    /// [`GraphError::EmptyName`], [`GraphError::DuplicateNode`] or
    /// [`GraphError::InvalidInputRef`] for the first offender
    pub fn check_names(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            if node.name.is_empty() {
                return Err(GraphError::EmptyName { index });
            }
            if !seen.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateNode(node.name.clone()));
            }
            if let Some(input) = node.inputs.iter().find(|i| !i.is_well_formed()) {
                return Err(GraphError::InvalidInputRef(input.to_string()));
            }
        }
        Ok(())
    }

    /// Full structural validation: names, references and acyclicity
    ///
    /// # Errors
    /// The first [`GraphError`] found
    pub fn validate(&self) -> Result<(), GraphError> {
        self.check_names()?;
        self.topological_order().map(|_| ())
    }

    /// Producers-before-consumers ordering of node names
    ///
    /// # Errors
    /// - [`GraphError::UnresolvedInput`] for a dangling reference
    /// - [`GraphError::Cycle`] naming a node on a cycle
    pub fn topological_order(&self) -> Result<Vec<&str>, GraphError> {
        let dag = self.dependency_graph(true)?;
        let order = toposort(&dag, None)
            .map_err(|cycle| GraphError::Cycle(self.nodes[dag[cycle.node_id()]].name.clone()))?;
        Ok(order
            .into_iter()
            .map(|ix| self.nodes[dag[ix]].name.as_str())
            .collect())
    }

    /// Fail if references form a cycle
    ///
    /// # Errors
    /// See [`Graph::topological_order`]
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        self.topological_order().map(|_| ())
    }

    /// A node on some cycle, ignoring references that do not resolve
    #[must_use]
    pub fn find_cycle(&self) -> Option<&str> {
        let dag = self.dependency_graph(false).ok()?;
        toposort(&dag, None)
            .err()
            .map(|cycle| self.nodes[dag[cycle.node_id()]].name.as_str())
    }

    /// Producer → consumer edges over node positions
    ///
    /// In strict mode a dangling reference is an error; otherwise it is skipped.
    fn dependency_graph(&self, strict: bool) -> Result<DiGraph<usize, ()>, GraphError> {
        let index = NameIndex::build(self);
        let mut dag = DiGraph::with_capacity(self.nodes.len(), self.nodes.len());
        let ids: Vec<NodeIndex> = (0..self.nodes.len()).map(|i| dag.add_node(i)).collect();

        for (consumer, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                match index.resolve(input) {
                    Some(producer) => {
                        dag.add_edge(ids[producer], ids[consumer], ());
                    }
                    None if strict => {
                        return Err(GraphError::UnresolvedInput {
                            consumer: node.name.clone(),
                            producer: input.producer().to_string(),
                        });
                    }
                    None => {}
                }
            }
        }
        Ok(dag)
    }
}

impl FromIterator<Node> for Graph {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        Self::from_nodes(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Graph {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Name → position map, built once per pass
///
/// When names collide the first occurrence wins.
#[derive(Debug, Clone)]
pub struct NameIndex<'g> {
    positions: HashMap<&'g str, usize>,
}

impl<'g> NameIndex<'g> {
    /// Index every node of `graph`
    #[must_use]
    pub fn build(graph: &'g Graph) -> Self {
        let mut positions = HashMap::with_capacity(graph.len());
        for (i, node) in graph.nodes().iter().enumerate() {
            positions.entry(node.name.as_str()).or_insert(i);
        }
        Self { positions }
    }

    /// Position of `name`
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Position of the producer behind `input`
    #[inline]
    #[must_use]
    pub fn resolve(&self, input: &InputRef) -> Option<usize> {
        self.get(input.producer())
    }

    /// Whether `name` is indexed
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Graph {
        // Consumers listed before producers on purpose
        Graph::from_nodes(vec![
            Node::new("out", "Identity").input("conv"),
            Node::new("conv", "Conv2D").inputs(["img", "w"]),
            Node::new("w", "Const"),
            Node::new("img", "Placeholder"),
        ])
    }

    #[test]
    fn topological_order_ignores_sequence_order() {
        let g = chain();
        let order = g.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|n| *n == name).unwrap();
        assert!(pos("img") < pos("conv"));
        assert!(pos("w") < pos("conv"));
        assert!(pos("conv") < pos("out"));
    }

    #[test]
    fn validate_reports_cycle() {
        let g = Graph::from_nodes(vec![
            Node::new("a", "Add").input("b"),
            Node::new("b", "Add").input("a"),
        ]);
        assert!(matches!(g.validate(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn validate_reports_self_loop() {
        let g = Graph::from_nodes(vec![Node::new("a", "Add").input("a")]);
        assert_eq!(g.validate(), Err(GraphError::Cycle("a".to_string())));
    }

    #[test]
    fn find_cycle_skips_dangling_references() {
        let g = Graph::from_nodes(vec![
            Node::new("a", "Add").inputs(["b", "ghost"]),
            Node::new("b", "Add").input("a"),
        ]);
        assert!(matches!(g.find_cycle(), Some("a" | "b")));
        assert_eq!(chain().find_cycle(), None);
    }

    #[test]
    fn validate_reports_dangling_reference() {
        let g = Graph::from_nodes(vec![Node::new("a", "Relu").input("ghost:1")]);
        assert_eq!(
            g.validate(),
            Err(GraphError::UnresolvedInput {
                consumer: "a".to_string(),
                producer: "ghost".to_string(),
            })
        );
    }

    #[test]
    fn check_names_rejects_duplicates_and_empty() {
        let dup = Graph::from_nodes(vec![Node::new("a", "Const"), Node::new("a", "Const")]);
        assert_eq!(dup.check_names(), Err(GraphError::DuplicateNode("a".to_string())));

        let empty = Graph::from_nodes(vec![Node::new("a", "Const"), Node::new("", "Const")]);
        assert_eq!(empty.check_names(), Err(GraphError::EmptyName { index: 1 }));
    }

    #[test]
    fn sinks_and_histogram() {
        let g = chain();
        let sinks: Vec<_> = g.sinks().into_iter().map(|n| n.name.as_str()).collect();
        assert_eq!(sinks, vec!["out"]);

        let hist = g.op_histogram();
        assert_eq!(hist.get("Conv2D"), Some(&1));
        assert_eq!(hist.keys().next().map(String::as_str), Some("Identity"));
    }

    #[test]
    fn name_index_resolves_slotted_refs() {
        let g = chain();
        let index = NameIndex::build(&g);
        assert_eq!(index.resolve(&InputRef::with_slot("conv", 3)), Some(1));
        assert!(!index.contains("ghost"));
    }

    #[test]
    fn malformed_references_fail_validation() {
        let g = Graph::from_nodes(vec![
            Node::new("a", "Const"),
            Node::new("b", "Relu").inputs(["a", ""]),
        ]);
        assert_eq!(g.check_names(), Err(GraphError::InvalidInputRef(String::new())));
        assert_eq!(g.validate(), Err(GraphError::InvalidInputRef(String::new())));
    }
}
