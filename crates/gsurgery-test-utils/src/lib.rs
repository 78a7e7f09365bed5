//! Testing utilities for the graph surgery workspace
//!
//! Shared fixtures and proptest strategies.

#![allow(missing_docs)]

use gsurgery_graph::{AttrMap, AttrValue, DataType, Graph, InputRef, Node, TensorValue};
use proptest::prelude::*;

/// Scalar int32 constant tensor
pub fn int_scalar(value: i32) -> AttrValue {
    AttrValue::Tensor(TensorValue {
        dtype: DataType::Int32,
        dims: vec![],
        content: value.to_le_bytes().to_vec(),
    })
}

/// int32 vector constant tensor
pub fn int_vector(values: &[i32]) -> AttrValue {
    AttrValue::Tensor(TensorValue {
        dtype: DataType::Int32,
        dims: vec![values.len() as u64],
        content: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    })
}

pub fn placeholder(name: &str) -> Node {
    Node::new(name, "Placeholder")
        .attr("dtype", AttrValue::Type(DataType::Float32))
        .attr("shape", AttrValue::Shape(vec![Some(1), Some(640), Some(640), Some(3)]))
}

pub fn conv(name: &str, input: &str) -> Node {
    Node::new(name, "Conv2D")
        .input(input)
        .attr("T", AttrValue::Type(DataType::Float32))
        .attr("strides", AttrValue::ints(&[1, 1, 1, 1]))
        .attr("padding", AttrValue::text("SAME"))
        .attr("explicit_paddings", AttrValue::List(Vec::new()))
}

/// The six-node graph used throughout the documentation:
///
/// `A(Placeholder)`, `axis(Const)`, `B(Conv2D, [A])`, `C(Split, [axis, B])`,
/// `D(Conv2D, [C:1])`, `E(Identity, [D])`
pub fn scenario_graph() -> Graph {
    Graph::from_nodes(vec![
        placeholder("A"),
        Node::new("axis", "Const").attr("value", int_scalar(3)),
        conv("B", "A"),
        Node::new("C", "Split")
            .inputs(["axis", "B"])
            .attr("num_split", AttrValue::Int(2))
            .attr("T", AttrValue::Type(DataType::Float32)),
        conv("D", "C:1"),
        Node::new("E", "Identity")
            .input("D")
            .attr("T", AttrValue::Type(DataType::Float32)),
    ])
}

/// Detector-shaped graph with the usual trouble spots
///
/// - a split/concat block whose concat merges two branches of one split
/// - an attention block (`BatchMatMulV2`, `Softmax`)
/// - a post-processing head with a dynamic reshape fed by `Shape`
/// - attributes newer consumers reject (`explicit_paddings`, `grad_x`, `U`)
///
/// Output heads are `head/conv`; `post/out` is the post-processing sink.
pub fn detector_graph() -> Graph {
    Graph::from_nodes(vec![
        placeholder("images"),
        conv("stem/conv", "images"),
        Node::new("stem/bn", "FusedBatchNormV3")
            .input("stem/conv")
            .attr("U", AttrValue::Type(DataType::Float32))
            .attr("epsilon", AttrValue::Float(1e-3)),
        Node::new("c2f/axis", "Const").attr("value", int_scalar(3)),
        Node::new("c2f/split", "Split").inputs(["c2f/axis", "stem/bn"]),
        conv("c2f/m0", "c2f/split:1"),
        Node::new("c2f/concat", "ConcatV2").inputs(["c2f/split", "c2f/m0", "c2f/axis"]),
        Node::new("attn/q", "Identity").input("c2f/concat"),
        Node::new("attn/k", "Identity").input("c2f/concat"),
        Node::new("attn/matmul", "BatchMatMulV2")
            .inputs(["attn/q", "attn/k"])
            .attr("adj_x", AttrValue::Bool(false))
            .attr("grad_x", AttrValue::Bool(false))
            .attr("grad_y", AttrValue::Bool(false)),
        Node::new("attn/softmax", "Softmax").input("attn/matmul"),
        conv("head/conv", "attn/softmax"),
        Node::new("post/shape", "Shape").input("head/conv"),
        Node::new("post/reshape", "Reshape").inputs(["head/conv", "post/shape"]),
        Node::new("post/out", "Identity").input("post/reshape"),
    ])
}

/// `input → id_0 → ... → id_{n-1}` with an unrelated side branch
pub fn identity_chain(len: usize) -> Graph {
    let mut nodes = Vec::with_capacity(len + 3);
    nodes.push(placeholder("input"));
    let mut prev = "input".to_string();
    for i in 0..len {
        let name = format!("id_{i}");
        nodes.push(Node::new(name.clone(), "Identity").input(prev.as_str()));
        prev = name;
    }
    nodes.push(Node::new("side/const", "Const").attr("value", int_scalar(0)));
    nodes.push(Node::new("side/out", "Identity").input("side/const"));
    Graph::from_nodes(nodes)
}

/// Names of a graph's nodes in sequence order
pub fn names(graph: &Graph) -> Vec<&str> {
    graph.iter().map(|n| n.name.as_str()).collect()
}

// ---------------------------------------------------------------------------
// proptest strategies
// ---------------------------------------------------------------------------

/// Operators drawn by the random graph strategy
pub const ARB_OPS: &[&str] = &[
    "Placeholder",
    "Const",
    "Conv2D",
    "Identity",
    "Relu",
    "Split",
    "SplitV",
    "ConcatV2",
    "Softmax",
    "BatchMatMulV2",
    "FusedBatchNormV3",
    "Reshape",
    "Shape",
];

/// Attribute keys drawn by the random graph strategy
pub const ARB_KEYS: &[&str] = &[
    "T",
    "padding",
    "strides",
    "explicit_paddings",
    "grad_x",
    "grad_y",
    "U",
    "value",
];

pub fn node_name(index: usize) -> String {
    format!("block{}/n{index}", index % 3)
}

pub fn arb_data_type() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::Float32),
        Just(DataType::Float16),
        Just(DataType::Int32),
        Just(DataType::Int64),
        Just(DataType::UInt8),
        Just(DataType::Bool),
        Just(DataType::String),
        (100u32..200).prop_map(DataType::Other),
    ]
}

pub fn arb_tensor() -> impl Strategy<Value = TensorValue> {
    (
        arb_data_type(),
        prop::collection::vec(0u64..5, 0..3),
        prop::collection::vec(any::<u8>(), 0..24),
    )
        .prop_map(|(dtype, dims, content)| TensorValue {
            dtype,
            dims,
            content,
        })
}

pub fn arb_attr_value() -> impl Strategy<Value = AttrValue> {
    let leaf = prop_oneof![
        arb_data_type().prop_map(AttrValue::Type),
        any::<i64>().prop_map(AttrValue::Int),
        any::<f32>().prop_map(AttrValue::Float),
        any::<bool>().prop_map(AttrValue::Bool),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(AttrValue::Bytes),
        prop::collection::vec(prop::option::of(-1i64..4096), 0..5).prop_map(AttrValue::Shape),
        arb_tensor().prop_map(AttrValue::Tensor),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(AttrValue::List)
    })
}

pub fn arb_attrs() -> impl Strategy<Value = AttrMap> {
    prop::collection::vec((prop::sample::select(ARB_KEYS), arb_attr_value()), 0..4).prop_map(
        |pairs| {
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect()
        },
    )
}

/// Node at `index` whose inputs only reference lower indices
fn arb_node(index: usize) -> BoxedStrategy<Node> {
    let inputs = if index == 0 {
        Just(Vec::new()).boxed()
    } else {
        prop::collection::vec((0..index, 0u32..3, prop::bool::weighted(0.1)), 0..4).boxed()
    };
    (prop::sample::select(ARB_OPS), inputs, arb_attrs())
        .prop_map(move |(op, inputs, attrs)| {
            let mut node = Node::new(node_name(index), op);
            node.inputs = inputs
                .into_iter()
                .map(|(producer, slot, control)| {
                    if control {
                        InputRef::control(node_name(producer))
                    } else {
                        InputRef::with_slot(node_name(producer), slot)
                    }
                })
                .collect();
            node.attrs = attrs;
            node
        })
        .boxed()
}

/// Random acyclic, fully resolved graph in shuffled sequence order
pub fn arb_dag(max_nodes: usize) -> impl Strategy<Value = Graph> {
    (1..=max_nodes)
        .prop_flat_map(|n| (0..n).map(arb_node).collect::<Vec<_>>().prop_shuffle())
        .prop_map(Graph::from_nodes)
}

/// Random graph plus a non-empty subset of its node names
pub fn arb_dag_with_outputs(max_nodes: usize) -> impl Strategy<Value = (Graph, Vec<String>)> {
    arb_dag(max_nodes).prop_flat_map(|graph| {
        let all: Vec<String> = graph.iter().map(|n| n.name.clone()).collect();
        let len = all.len();
        (Just(graph), prop::sample::subsequence(all, 1..=len))
    })
}
