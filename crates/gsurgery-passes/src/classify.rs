//! Operator classifier
//!
//! Read-only compatibility analysis of a graph against a [`Taxonomy`].
//!
//! # Core Concepts
//!
//! - [`Category`]: `Disallowed` operators are rejected by the downstream
//!   consumer, `Suspicious` ones are tolerated with caveats
//! - [`HazardRules`]: which operators introduce dynamic shapes
//! - [`Report`]: op histogram, categorized occurrences and hazards
//! - [`ReportSink`]: where a finished report goes

use crate::error::ConfigError;
use gsurgery_graph::{Graph, NameIndex, Node};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Compatibility category of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Rejected outright
    Disallowed,
    /// Tolerated with caveats
    Suspicious,
}

/// Dynamic-shape detection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HazardRules {
    /// Reshape-like operators whose shape operand must be constant
    pub reshape_ops: Vec<String>,
    /// Data input position of the shape operand
    pub shape_operand: usize,
    /// Producers that count as compile-time constants
    pub constant_ops: Vec<String>,
    /// Operators that read shapes at run time
    pub shape_ops: Vec<String>,
}

impl Default for HazardRules {
    fn default() -> Self {
        Self {
            reshape_ops: vec!["Reshape".into()],
            shape_operand: 1,
            constant_ops: vec!["Const".into()],
            shape_ops: ["Shape", "ShapeN", "Size", "Rank"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Taxonomy as written in config files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaxonomyFile {
    pub disallowed: Vec<String>,
    pub suspicious: Vec<String>,
    pub hazards: HazardRules,
}

/// Operator → category table plus hazard settings
///
/// An operator belongs to at most one category; construction fails otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaxonomyFile", into = "TaxonomyFile")]
pub struct Taxonomy {
    categories: IndexMap<String, Category>,
    hazards: HazardRules,
}

impl Taxonomy {
    /// Build from category lists with default hazard settings
    ///
    /// # Errors
    /// [`ConfigError::CategoryConflict`] when an operator is in both lists
    pub fn new<D, S>(disallowed: D, suspicious: S) -> Result<Self, ConfigError>
    where
        D: IntoIterator,
        D::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let mut categories = IndexMap::new();
        for op in disallowed {
            categories.insert(op.into(), Category::Disallowed);
        }
        for op in suspicious {
            let op = op.into();
            if categories.get(&op) == Some(&Category::Disallowed) {
                return Err(ConfigError::CategoryConflict(op));
            }
            categories.insert(op, Category::Suspicious);
        }
        Ok(Self {
            categories,
            hazards: HazardRules::default(),
        })
    }

    /// Replace hazard settings
    #[must_use]
    pub fn with_hazards(mut self, hazards: HazardRules) -> Self {
        self.hazards = hazards;
        self
    }

    /// Operator table for the Vitis AI DPU toolchain
    #[must_use]
    pub fn vitis_ai() -> Self {
        let categories = VITIS_DISALLOWED
            .iter()
            .map(|op| ((*op).to_string(), Category::Disallowed))
            .chain(
                VITIS_SUSPICIOUS
                    .iter()
                    .map(|op| ((*op).to_string(), Category::Suspicious)),
            )
            .collect();
        Self {
            categories,
            hazards: HazardRules::default(),
        }
    }

    /// Category of `op`, if listed
    #[inline]
    #[must_use]
    pub fn category(&self, op: &str) -> Option<Category> {
        self.categories.get(op).copied()
    }

    /// Operators in `category`, in declaration order
    pub fn ops_in(&self, category: Category) -> impl Iterator<Item = &str> + '_ {
        self.categories
            .iter()
            .filter(move |(_, c)| **c == category)
            .map(|(op, _)| op.as_str())
    }

    /// Hazard settings
    #[inline]
    #[must_use]
    pub fn hazards(&self) -> &HazardRules {
        &self.hazards
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::vitis_ai()
    }
}

impl TryFrom<TaxonomyFile> for Taxonomy {
    type Error = ConfigError;

    fn try_from(file: TaxonomyFile) -> Result<Self, Self::Error> {
        Ok(Self::new(file.disallowed, file.suspicious)?.with_hazards(file.hazards))
    }
}

impl From<Taxonomy> for TaxonomyFile {
    fn from(taxonomy: Taxonomy) -> Self {
        Self {
            disallowed: taxonomy.ops_in(Category::Disallowed).map(String::from).collect(),
            suspicious: taxonomy.ops_in(Category::Suspicious).map(String::from).collect(),
            hazards: taxonomy.hazards,
        }
    }
}

const VITIS_DISALLOWED: &[&str] = &[
    // Matrix ops
    "BatchMatMulV2",
    "BatchMatMul",
    "MatMul",
    "Softmax",
    "LogSoftmax",
    "GatherV2",
    "Gather",
    "ScatterNd",
    // Conditional
    "Where",
    "Select",
    "SelectV2",
    "Range",
    "Fill",
    "TensorArrayV3",
    "TensorArrayReadV3",
    "ExpandDims",
    "Squeeze",
    "StridedSlice",
    "Pack",
    "Unpack",
    "Tile",
    "Cast",
];

const VITIS_SUSPICIOUS: &[&str] = &[
    "Reshape",
    "Transpose",
    "Split",
    "SplitV",
    "ConcatV2",
    "ResizeNearestNeighbor",
    "ResizeBilinear",
];

/// One categorized node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub name: String,
    pub op: String,
    /// Number of inputs, control references included
    pub inputs: usize,
}

impl Occurrence {
    fn of(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            op: node.op.clone(),
            inputs: node.inputs.len(),
        }
    }
}

/// Why a node may produce a run-time shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HazardKind {
    /// Shape operand comes from a non-constant producer
    DynamicShape { producer_op: String },
    /// Shape operand names a producer that does not exist
    UnresolvedShapeOperand { producer: String },
    /// Reshape has no shape operand at all
    MissingShapeOperand,
    /// Node reads a tensor shape at run time
    ShapeIntrospection { op: String },
}

impl Display for HazardKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DynamicShape { producer_op } => write!(f, "dynamic shape from {producer_op}"),
            Self::UnresolvedShapeOperand { producer } => {
                write!(f, "unresolved shape operand {producer}")
            }
            Self::MissingShapeOperand => f.write_str("missing shape operand"),
            Self::ShapeIntrospection { op } => write!(f, "shape introspection via {op}"),
        }
    }
}

/// Dynamic-shape hazard on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub node: String,
    #[serde(flatten)]
    pub kind: HazardKind,
}

impl Display for Hazard {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.kind)
    }
}

/// Compatibility report for one graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Occurrences per operator, in first-seen order
    pub op_counts: IndexMap<String, usize>,
    pub disallowed: Vec<Occurrence>,
    pub suspicious: Vec<Occurrence>,
    pub hazards: Vec<Hazard>,
}

impl Report {
    /// Total number of nodes analyzed
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.op_counts.values().sum()
    }

    /// The `n` most frequent operators, count descending then name ascending
    #[must_use]
    pub fn top_ops(&self, n: usize) -> Vec<(&str, usize)> {
        let mut ops: Vec<(&str, usize)> = self
            .op_counts
            .iter()
            .map(|(op, count)| (op.as_str(), *count))
            .collect();
        ops.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ops.truncate(n);
        ops
    }

    /// No disallowed operators and no hazards
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.disallowed.is_empty() && self.hazards.is_empty()
    }
}

/// Destination for a finished report
pub trait ReportSink {
    /// Deliver `report`
    ///
    /// # Errors
    /// Whatever the underlying writer reports
    fn emit(&mut self, report: &Report) -> std::io::Result<()>;
}

/// Classify every node of `graph`
///
/// Read-only and total.
#[must_use]
pub fn classify(graph: &Graph, taxonomy: &Taxonomy) -> Report {
    let index = NameIndex::build(graph);
    let mut report = Report {
        op_counts: graph.op_histogram(),
        ..Report::default()
    };

    for node in graph {
        match taxonomy.category(&node.op) {
            Some(Category::Disallowed) => report.disallowed.push(Occurrence::of(node)),
            Some(Category::Suspicious) => report.suspicious.push(Occurrence::of(node)),
            None => {}
        }
        detect_hazards(graph, &index, taxonomy.hazards(), node, &mut report.hazards);
    }

    tracing::debug!(
        nodes = graph.len(),
        disallowed = report.disallowed.len(),
        suspicious = report.suspicious.len(),
        hazards = report.hazards.len(),
        "classified graph"
    );
    report
}

fn detect_hazards(
    graph: &Graph,
    index: &NameIndex<'_>,
    rules: &HazardRules,
    node: &Node,
    out: &mut Vec<Hazard>,
) {
    let mut record = |kind| {
        out.push(Hazard {
            node: node.name.clone(),
            kind,
        });
    };

    if rules.shape_ops.contains(&node.op) {
        record(HazardKind::ShapeIntrospection {
            op: node.op.clone(),
        });
    }

    if !rules.reshape_ops.contains(&node.op) {
        return;
    }
    let Some(operand) = node.data_inputs().nth(rules.shape_operand) else {
        record(HazardKind::MissingShapeOperand);
        return;
    };
    match index.resolve(operand) {
        None => record(HazardKind::UnresolvedShapeOperand {
            producer: operand.producer().to_string(),
        }),
        Some(pos) => {
            let producer = &graph.nodes()[pos];
            if !rules.constant_ops.contains(&producer.op) {
                record(HazardKind::DynamicShape {
                    producer_op: producer.op.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsurgery_graph::Node;
    use pretty_assertions::assert_eq;

    fn reasons(report: &Report) -> Vec<String> {
        report.hazards.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn conflicting_categories_rejected() {
        let err = Taxonomy::new(["Softmax", "Split"], ["Split"]).unwrap_err();
        assert!(matches!(err, ConfigError::CategoryConflict(op) if op == "Split"));
    }

    #[test]
    fn vitis_table_has_no_overlap() {
        let taxonomy = Taxonomy::vitis_ai();
        let file = TaxonomyFile::from(taxonomy.clone());
        assert_eq!(Taxonomy::try_from(file).unwrap(), taxonomy);
        assert_eq!(taxonomy.category("Softmax"), Some(Category::Disallowed));
        assert_eq!(taxonomy.category("ConcatV2"), Some(Category::Suspicious));
        assert_eq!(taxonomy.category("Conv2D"), None);
    }

    #[test]
    fn counts_and_categorizes() {
        let graph = Graph::from_nodes(vec![
            Node::new("x", "Placeholder"),
            Node::new("a", "Softmax").inputs(["x", "^x"]),
            Node::new("b", "Transpose").input("a"),
            Node::new("c", "Softmax").input("b"),
        ]);
        let report = classify(&graph, &Taxonomy::vitis_ai());

        assert_eq!(report.op_counts["Softmax"], 2);
        assert_eq!(report.node_count(), 4);
        assert_eq!(
            report.disallowed,
            vec![
                Occurrence {
                    name: "a".into(),
                    op: "Softmax".into(),
                    inputs: 2,
                },
                Occurrence {
                    name: "c".into(),
                    op: "Softmax".into(),
                    inputs: 1,
                },
            ]
        );
        assert_eq!(report.suspicious.len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn reshape_from_shape_is_dynamic() {
        let graph = Graph::from_nodes(vec![
            Node::new("x", "Placeholder"),
            Node::new("s", "Shape").input("x"),
            Node::new("r", "Reshape").inputs(["x", "s"]),
        ]);
        let report = classify(&graph, &Taxonomy::vitis_ai());
        assert_eq!(
            reasons(&report),
            vec!["s: shape introspection via Shape", "r: dynamic shape from Shape"]
        );
    }

    #[test]
    fn constant_shape_operand_is_static() {
        let graph = Graph::from_nodes(vec![
            Node::new("x", "Placeholder"),
            Node::new("dims", "Const"),
            Node::new("r", "Reshape").inputs(["x", "dims"]),
        ]);
        assert!(classify(&graph, &Taxonomy::vitis_ai()).hazards.is_empty());
    }

    #[test]
    fn missing_and_unresolved_operands_are_hazards() {
        let graph = Graph::from_nodes(vec![
            Node::new("x", "Placeholder"),
            // Control reference is not a shape operand
            Node::new("r1", "Reshape").inputs(["x", "^x"]),
            Node::new("r2", "Reshape").inputs(["x", "ghost:0"]),
        ]);
        let report = classify(&graph, &Taxonomy::vitis_ai());
        assert_eq!(
            reasons(&report),
            vec![
                "r1: missing shape operand",
                "r2: unresolved shape operand ghost",
            ]
        );
    }

    #[test]
    fn custom_hazard_rules() {
        let hazards = HazardRules {
            reshape_ops: vec!["Tile".into()],
            shape_operand: 1,
            constant_ops: vec!["Const".into(), "HostConst".into()],
            shape_ops: vec![],
        };
        let taxonomy = Taxonomy::new(Vec::<String>::new(), Vec::<String>::new())
            .unwrap()
            .with_hazards(hazards);
        let graph = Graph::from_nodes(vec![
            Node::new("x", "Placeholder"),
            Node::new("m", "HostConst"),
            Node::new("t", "Tile").inputs(["x", "m"]),
            Node::new("s", "Shape").input("x"),
        ]);
        assert!(classify(&graph, &taxonomy).is_clean());
    }

    #[test]
    fn top_ops_breaks_ties_by_name() {
        let graph = Graph::from_nodes(vec![
            Node::new("a", "Relu"),
            Node::new("b", "Conv2D"),
            Node::new("c", "Relu"),
            Node::new("d", "Add"),
            Node::new("e", "Conv2D"),
            Node::new("f", "Const"),
        ]);
        let report = classify(&graph, &Taxonomy::vitis_ai());
        assert_eq!(report.top_ops(3), vec![("Conv2D", 2), ("Relu", 2), ("Add", 1)]);
    }

    #[test]
    fn report_serializes_hazard_reason() {
        let hazard = Hazard {
            node: "r".into(),
            kind: HazardKind::DynamicShape {
                producer_op: "Shape".into(),
            },
        };
        let json = serde_json::to_value(&hazard).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"node": "r", "kind": "dynamic_shape", "producer_op": "Shape"})
        );
    }
}
