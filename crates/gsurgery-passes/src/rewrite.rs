//! Operator rewriter
//!
//! Replaces every node whose operator is disallowed with a pass-through node
//! that forwards one selected data input. The node keeps its name, so
//! consumers stay wired to it without any relinking.
//!
//! # Input selection
//!
//! Which input survives depends on the operator's calling convention: `Split`
//! carries its axis first and its data second, `ConcatV2` carries the axis
//! last. [`InputSelection`] records the position to keep and the minimum
//! number of data inputs a well-formed node has.
//!
//! # Single-slot convention
//!
//! A pass-through node has one output slot. Consumers that read `split:1`
//! keep that reference and must treat it as slot 0.

use crate::error::RewriteError;
use gsurgery_graph::{AttrMap, AttrValue, DataType, Graph, InputRef, Node};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Which data input survives a rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSelection {
    /// Data input position to keep
    pub index: usize,
    /// Fewest data inputs a well-formed node has
    pub min_inputs: usize,
}

impl InputSelection {
    /// Keep `index`, requiring at least `min_inputs` data inputs
    #[must_use]
    pub const fn new(index: usize, min_inputs: usize) -> Self {
        Self { index, min_inputs }
    }

    /// Data inputs needed for this selection to apply
    #[must_use]
    pub const fn required(&self) -> usize {
        let reach = self.index + 1;
        if reach > self.min_inputs {
            reach
        } else {
            self.min_inputs
        }
    }
}

impl Default for InputSelection {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

/// Rewrite rule table
///
/// Missing fields in a config file fall back to an empty disallowed set, no
/// selection overrides, `Identity`, `T` and `float32`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteRules {
    /// Operators to replace
    #[serde(default)]
    pub disallowed: IndexSet<String>,
    /// Per-operator input selection; others use [`InputSelection::default`]
    #[serde(default)]
    pub select: IndexMap<String, InputSelection>,
    /// Operator of replacement nodes
    #[serde(default = "default_passthrough")]
    pub passthrough: String,
    /// Attribute key carrying the element type
    #[serde(default = "default_dtype_key")]
    pub dtype_key: String,
    /// Element type written to replacement nodes
    #[serde(default = "default_dtype")]
    pub dtype: DataType,
}

fn default_passthrough() -> String {
    "Identity".to_string()
}

fn default_dtype_key() -> String {
    "T".to_string()
}

const fn default_dtype() -> DataType {
    DataType::Float32
}

impl RewriteRules {
    /// Rules replacing `disallowed` with default settings
    pub fn new<I, S>(disallowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disallowed: disallowed.into_iter().map(Into::into).collect(),
            select: IndexMap::new(),
            passthrough: default_passthrough(),
            dtype_key: default_dtype_key(),
            dtype: default_dtype(),
        }
    }

    /// Override input selection for `op`
    #[must_use]
    pub fn with_selection(mut self, op: impl Into<String>, selection: InputSelection) -> Self {
        self.select.insert(op.into(), selection);
        self
    }

    /// Use a different pass-through operator
    #[must_use]
    pub fn with_passthrough(mut self, op: impl Into<String>) -> Self {
        self.passthrough = op.into();
        self
    }

    /// Operators that crash the Vitis AI quantizer
    #[must_use]
    pub fn vitis_ai() -> Self {
        Self::new([
            "BatchMatMulV2",
            "BatchMatMul",
            "Softmax",
            "Split",
            "SplitV",
            "ConcatV2",
        ])
        // Split(axis, value)
        .with_selection("Split", InputSelection::new(1, 2))
        // SplitV(value, size_splits, axis)
        .with_selection("SplitV", InputSelection::new(0, 1))
        // ConcatV2(values..., axis)
        .with_selection("ConcatV2", InputSelection::new(0, 2))
    }

    /// Whether nodes of `op` are replaced
    #[inline]
    #[must_use]
    pub fn is_disallowed(&self, op: &str) -> bool {
        self.disallowed.contains(op)
    }

    /// Selection rule for `op`
    #[must_use]
    pub fn selection_for(&self, op: &str) -> InputSelection {
        self.select.get(op).copied().unwrap_or_default()
    }
}

impl Default for RewriteRules {
    fn default() -> Self {
        Self::vitis_ai()
    }
}

/// One converted node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRecord {
    pub node: String,
    /// Operator before the rewrite
    pub op: String,
    /// Input forwarded by the pass-through
    pub kept: InputRef,
    /// Inputs dropped, control references included
    pub discarded: Vec<InputRef>,
}

/// Result of [`rewrite`]
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub graph: Graph,
    /// Number of converted nodes
    pub rewritten: usize,
    pub records: Vec<RewriteRecord>,
}

/// Replace every disallowed node with a pass-through
///
/// # Errors
/// - [`RewriteError::PassthroughDisallowed`] before anything is touched
/// - [`RewriteError::InsufficientInputs`] for the first malformed node
/// - [`RewriteError::CycleIntroduced`] when the result is cyclic
pub fn rewrite(graph: &Graph, rules: &RewriteRules) -> Result<RewriteOutcome, RewriteError> {
    if rules.is_disallowed(&rules.passthrough) {
        return Err(RewriteError::PassthroughDisallowed(rules.passthrough.clone()));
    }

    let mut nodes = Vec::with_capacity(graph.len());
    let mut records = Vec::new();
    for node in graph {
        if rules.is_disallowed(&node.op) {
            let (replacement, record) = pass_through(node, rules)?;
            tracing::debug!(
                node = %node.name,
                op = %node.op,
                kept = %record.kept,
                "replaced with pass-through"
            );
            nodes.push(replacement);
            records.push(record);
        } else {
            nodes.push(node.clone());
        }
    }

    let graph = Graph::from_nodes(nodes);
    if let Some(node) = graph.find_cycle() {
        return Err(RewriteError::CycleIntroduced(node.to_string()));
    }

    tracing::info!(rewritten = records.len(), "rewrote disallowed operators");
    Ok(RewriteOutcome {
        graph,
        rewritten: records.len(),
        records,
    })
}

fn pass_through(node: &Node, rules: &RewriteRules) -> Result<(Node, RewriteRecord), RewriteError> {
    let selection = rules.selection_for(&node.op);
    let data: Vec<usize> = node
        .inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| input.is_data())
        .map(|(pos, _)| pos)
        .collect();
    let required = selection.required();
    if data.len() < required {
        return Err(RewriteError::InsufficientInputs {
            node: node.name.clone(),
            op: node.op.clone(),
            required,
            actual: data.len(),
        });
    }

    let kept_pos = data[selection.index];
    let kept = node.inputs[kept_pos].clone();
    let discarded = node
        .inputs
        .iter()
        .enumerate()
        .filter(|(pos, _)| *pos != kept_pos)
        .map(|(_, input)| input.clone())
        .collect();

    let mut attrs = AttrMap::new();
    attrs.insert(rules.dtype_key.clone(), AttrValue::Type(rules.dtype));
    let replacement = Node {
        name: node.name.clone(),
        op: rules.passthrough.clone(),
        inputs: vec![kept.clone()],
        attrs,
    };
    Ok((
        replacement,
        RewriteRecord {
            node: node.name.clone(),
            op: node.op.clone(),
            kept,
            discarded,
        },
    ))
}
