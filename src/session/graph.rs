//! Minimal graph model passed through the executor
//!
//! Graph construction and partitioning happen outside this crate; these types
//! only carry enough structure for a session to compile what it is given.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tensor::TensorId;

/// A node of an ANF graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnfNode {
    /// Unique node name within its graph
    pub name: String,

    /// Primitive name, e.g. "MatMul"
    pub op: String,

    /// Names of the nodes feeding this one
    pub inputs: Vec<String>,
}

impl AnfNode {
    pub fn new(name: impl Into<String>, op: impl Into<String>, inputs: Vec<String>) -> AnfNodeRef {
        Arc::new(Self {
            name: name.into(),
            op: op.into(),
            inputs,
        })
    }
}

pub type AnfNodeRef = Arc<AnfNode>;

/// A contiguous run of nodes cut out of a larger graph by the partitioner
#[derive(Debug, Clone, Default)]
pub struct GraphSegment {
    pub nodes: Vec<AnfNodeRef>,

    /// Whether the segment ends at a cut node (control flow, host op)
    pub is_cut: bool,
}

impl GraphSegment {
    pub fn new(nodes: Vec<AnfNodeRef>) -> Self {
        Self { nodes, is_cut: false }
    }
}

/// A whole function graph
#[derive(Debug, Clone, Default)]
pub struct FuncGraph {
    pub name: String,
    pub nodes: Vec<AnfNodeRef>,
    pub outputs: Vec<AnfNodeRef>,
}

impl FuncGraph {
    /// Build a straight-line graph `input -> op_1 -> ... -> op_n`
    pub fn chain(name: impl Into<String>, ops: &[&str]) -> Self {
        let mut nodes = Vec::with_capacity(ops.len());
        let mut previous = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            let node = AnfNode::new(format!("{}_{}", op.to_lowercase(), i), *op, previous);
            previous = vec![node.name.clone()];
            nodes.push(node);
        }
        let outputs = nodes.last().cloned().into_iter().collect();
        Self {
            name: name.into(),
            nodes,
            outputs,
        }
    }
}

/// A node output: the producing node and which of its outputs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelWithIndex {
    pub node: String,
    pub output_index: usize,
}

/// Output tensor identity to the node that produces it
pub type TensorToNode = HashMap<TensorId, KernelWithIndex>;
