//! Attribute sanitizer
//!
//! Removes attributes that older graph consumers reject. Each
//! [`AttributeRule`] names a target operator (or `*` for every operator) and
//! the attribute keys to drop; the keys of all matching rules are merged per
//! node, so a key listed twice is removed and counted once.

use gsurgery_graph::Graph;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Operator wildcard in [`AttributeRule::op`]
pub const ANY_OP: &str = "*";

/// Keys to drop from nodes of one operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeRule {
    /// Target operator, or `*`
    pub op: String,
    /// Attribute keys removed when present
    pub drop: Vec<String>,
}

impl AttributeRule {
    /// Rule for `op` dropping `keys`
    pub fn new<I, S>(op: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            op: op.into(),
            drop: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this rule applies to `op`
    #[inline]
    #[must_use]
    pub fn matches(&self, op: &str) -> bool {
        self.op == ANY_OP || self.op == op
    }
}

/// Ordered attribute-drop rule table
///
/// Serialized as a plain list of rules. The default table is
/// [`AttributeRules::tf2_compat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeRules {
    rules: Vec<AttributeRule>,
}

impl AttributeRules {
    /// Wrap a rule list
    #[must_use]
    pub fn new(rules: Vec<AttributeRule>) -> Self {
        Self { rules }
    }

    /// Attributes newer framework versions emit and older loaders reject
    #[must_use]
    pub fn tf2_compat() -> Self {
        Self::new(vec![
            AttributeRule::new("BatchMatMulV2", ["grad_x", "grad_y"]),
            AttributeRule::new(ANY_OP, ["explicit_paddings"]),
            AttributeRule::new("FusedBatchNormV3", ["U"]),
        ])
    }

    /// Rules in declaration order
    #[must_use]
    pub fn rules(&self) -> &[AttributeRule] {
        &self.rules
    }

    /// Union of keys to drop from a node of `op`
    #[must_use]
    pub fn keys_for(&self, op: &str) -> IndexSet<&str> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(op))
            .flat_map(|rule| rule.drop.iter().map(String::as_str))
            .collect()
    }
}

impl Default for AttributeRules {
    fn default() -> Self {
        Self::tf2_compat()
    }
}

/// Result of [`sanitize`]
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizeOutcome {
    /// Graph with offending attributes removed
    pub graph: Graph,
    /// Number of (node, key) removals
    pub fixed: usize,
    /// Removals per attribute key, in first-seen order
    pub by_key: IndexMap<String, usize>,
}

/// Drop every attribute the rules name
///
/// Total and idempotent: a second run over the result reports `fixed == 0`.
#[must_use]
pub fn sanitize(graph: &Graph, rules: &AttributeRules) -> SanitizeOutcome {
    let mut by_key: IndexMap<String, usize> = IndexMap::new();
    let mut fixed = 0;

    let nodes = graph
        .iter()
        .map(|node| {
            let mut node = node.clone();
            for key in rules.keys_for(&node.op) {
                if node.attrs.shift_remove(key).is_some() {
                    tracing::trace!(node = %node.name, key, "dropped attribute");
                    *by_key.entry(key.to_string()).or_insert(0) += 1;
                    fixed += 1;
                }
            }
            node
        })
        .collect();

    tracing::info!(fixed, nodes = graph.len(), "sanitized attributes");
    SanitizeOutcome {
        graph: Graph::from_nodes(nodes),
        fixed,
        by_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsurgery_graph::{AttrValue, Node};
    use pretty_assertions::assert_eq;

    fn flag() -> AttrValue {
        AttrValue::Bool(false)
    }

    #[test]
    fn removes_keys_of_matching_rules() {
        let graph = Graph::from_nodes(vec![
            Node::new("mm", "BatchMatMulV2")
                .attr("grad_x", flag())
                .attr("grad_y", flag())
                .attr("adj_x", flag()),
            Node::new("conv", "Conv2D")
                .attr("explicit_paddings", AttrValue::List(vec![]))
                .attr("padding", AttrValue::text("SAME")),
            Node::new("bn", "FusedBatchNormV3").attr("U", flag()),
            Node::new("relu", "Relu").attr("grad_x", flag()),
        ]);

        let out = sanitize(&graph, &AttributeRules::tf2_compat());
        assert_eq!(out.fixed, 4);
        assert_eq!(out.by_key["grad_x"], 1);
        assert_eq!(out.by_key["explicit_paddings"], 1);

        let mm = out.graph.get("mm").unwrap();
        assert_eq!(mm.attrs.keys().collect::<Vec<_>>(), vec!["adj_x"]);
        let conv = out.graph.get("conv").unwrap();
        assert_eq!(conv.attrs.keys().collect::<Vec<_>>(), vec!["padding"]);
        // Rule targets BatchMatMulV2 only
        assert!(out.graph.get("relu").unwrap().attrs.contains_key("grad_x"));
    }

    #[test]
    fn overlapping_rules_count_once() {
        let rules = AttributeRules::new(vec![
            AttributeRule::new(ANY_OP, ["U"]),
            AttributeRule::new("FusedBatchNormV3", ["U"]),
        ]);
        let graph = Graph::from_nodes(vec![Node::new("bn", "FusedBatchNormV3").attr("U", flag())]);

        let out = sanitize(&graph, &rules);
        assert_eq!(out.fixed, 1);
    }

    #[test]
    fn second_run_is_noop() {
        let graph = Graph::from_nodes(vec![
            Node::new("mm", "BatchMatMulV2").attr("grad_x", flag()),
            Node::new("conv", "Conv2D").attr("explicit_paddings", AttrValue::List(vec![])),
        ]);
        let once = sanitize(&graph, &AttributeRules::default());
        let twice = sanitize(&once.graph, &AttributeRules::default());

        assert_eq!(once.fixed, 2);
        assert_eq!(twice.fixed, 0);
        assert_eq!(twice.graph, once.graph);
    }

    #[test]
    fn preserves_remaining_attribute_order() {
        let graph = Graph::from_nodes(vec![Node::new("conv", "Conv2D")
            .attr("T", flag())
            .attr("explicit_paddings", flag())
            .attr("strides", flag())
            .attr("padding", flag())]);
        let out = sanitize(&graph, &AttributeRules::default());
        let keys: Vec<_> = out.graph.nodes()[0].attrs.keys().cloned().collect();
        assert_eq!(keys, vec!["T", "strides", "padding"]);
    }

    #[test]
    fn rules_deserialize_as_list() {
        let rules: AttributeRules =
            serde_json::from_str(r#"[{"op":"*","drop":["explicit_paddings"]}]"#).unwrap();
        assert_eq!(rules.rules().len(), 1);
        assert!(rules.keys_for("MaxPool").contains("explicit_paddings"));
    }
}
