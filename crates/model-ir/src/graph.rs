// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph IR: a traced model as a static sequence of operations.
//!
//! # Type-State Pattern
//!
//! The graph transitions through states enforced at compile time:
//!
//! ```text
//! Graph<Loaded>    : nodes recorded or decoded, not yet checked.
//!       │  .validate()
//!       ▼
//! Graph<Validated> : every value defined before use, shapes re-inferred.
//! ```
//!
//! The compiler only accepts `Graph<Validated>`. Rewriting passes call
//! [`Graph::into_loaded`] and validate again afterwards, so a pass can never
//! hand on a graph it broke.

use crate::{ModelError, Op};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tensor_core::{Shape, Tensor};

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been built but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: graph has been validated and can be compiled or evaluated.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

// ── Values and nodes ───────────────────────────────────────────────

/// A named graph input or output.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValueInfo {
    pub name: String,
    /// Concrete shape seen while tracing.
    pub shape: Shape,
    /// Axes whose size may change at inference time (the batch axis).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_axes: Vec<usize>,
}

impl ValueInfo {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            dynamic_axes: Vec::new(),
        }
    }

    /// Marks `axis` as dynamic.
    pub fn with_dynamic_axis(mut self, axis: usize) -> Self {
        if !self.dynamic_axes.contains(&axis) {
            self.dynamic_axes.push(axis);
        }
        self
    }
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// Unique node name, derived from the source layer name.
    pub name: String,
    pub op: Op,
    /// Name of the activation this node consumes.
    pub input: String,
    /// Parameter names (keys into [`Graph::params`]), in op order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    /// Name of the activation this node produces.
    pub output: String,
    pub output_shape: Shape,
}

impl Node {
    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        format!(
            "{} = {}({}{}) -> {}",
            self.output,
            self.op,
            self.input,
            self.params.iter().map(|p| format!(", {p}")).collect::<String>(),
            self.output_shape,
        )
    }
}

/// Serializable graph structure without parameter data.
///
/// This is what frozen bundles and compiled artifacts embed as their JSON
/// header; parameter tensors are stored beside it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Topology {
    pub name: String,
    pub input: ValueInfo,
    pub output: ValueInfo,
    pub nodes: Vec<Node>,
}

// ── Graph ──────────────────────────────────────────────────────────

/// A single-input, single-output computation graph.
///
/// Nodes are stored in execution order. The generic parameter `S` encodes
/// the validation state at compile time.
#[derive(Debug, Clone)]
pub struct Graph<S: GraphState = Loaded> {
    /// Model name the graph was traced from.
    pub name: String,
    pub input: ValueInfo,
    pub output: ValueInfo,
    /// Nodes in execution order.
    pub nodes: Vec<Node>,
    /// Parameter tensors keyed by name. A `BTreeMap` keeps iteration (and
    /// therefore serialization) order stable.
    pub params: BTreeMap<String, Tensor>,
    _state: std::marker::PhantomData<S>,
}

// ── Loaded state ───────────────────────────────────────────────────

impl Graph<Loaded> {
    /// Creates a new graph in the `Loaded` state.
    pub fn new(
        name: impl Into<String>,
        input: ValueInfo,
        output: ValueInfo,
        nodes: Vec<Node>,
        params: BTreeMap<String, Tensor>,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            nodes,
            params,
            _state: std::marker::PhantomData,
        }
    }

    /// Rebuilds a graph from a decoded topology and its parameters.
    pub fn from_topology(topology: Topology, params: BTreeMap<String, Tensor>) -> Self {
        Self::new(
            topology.name,
            topology.input,
            topology.output,
            topology.nodes,
            params,
        )
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - The graph has at least one node and a non-empty input.
    /// - Dynamic axes exist in the input shape.
    /// - Node names are unique and no value is produced twice.
    /// - Every node reads a value defined earlier (or the graph input).
    /// - Every referenced parameter exists.
    /// - Re-inferred output shapes equal the recorded ones.
    /// - The declared output is produced with the declared shape.
    pub fn validate(self) -> Result<Graph<Validated>, ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidGraph(format!(
                "graph '{}' contains no nodes",
                self.name
            )));
        }
        if self.input.shape.num_elements() == 0 {
            return Err(ModelError::InvalidGraph(format!(
                "input '{}' has zero elements ({})",
                self.input.name, self.input.shape
            )));
        }
        if let Some(axis) = self
            .input
            .dynamic_axes
            .iter()
            .find(|&&a| a >= self.input.shape.rank())
        {
            return Err(ModelError::InvalidGraph(format!(
                "dynamic axis {axis} out of range for input shape {}",
                self.input.shape
            )));
        }

        let mut values: HashMap<&str, &Shape> = HashMap::new();
        values.insert(self.input.name.as_str(), &self.input.shape);
        let mut names = HashSet::new();
        let mut used_params = HashSet::new();

        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ModelError::InvalidGraph(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
            let input_shape = values.get(node.input.as_str()).ok_or_else(|| {
                ModelError::InvalidGraph(format!(
                    "node '{}' reads undefined value '{}'",
                    node.name, node.input
                ))
            })?;

            let mut param_shapes = Vec::with_capacity(node.params.len());
            for p in &node.params {
                let t = self.params.get(p).ok_or_else(|| {
                    ModelError::InvalidGraph(format!(
                        "node '{}' references missing parameter '{p}'",
                        node.name
                    ))
                })?;
                param_shapes.push(t.shape());
                used_params.insert(p.as_str());
            }

            let inferred = node
                .op
                .infer_shape(input_shape, &param_shapes)
                .map_err(|source| ModelError::ShapeMismatch {
                    layer: node.name.clone(),
                    source,
                })?;
            if inferred != node.output_shape {
                return Err(ModelError::InvalidLayer {
                    layer: node.name.clone(),
                    detail: format!(
                        "recorded output shape {} but inferred {inferred}",
                        node.output_shape
                    ),
                });
            }

            if values.insert(node.output.as_str(), &node.output_shape).is_some() {
                return Err(ModelError::InvalidGraph(format!(
                    "value '{}' is produced more than once",
                    node.output
                )));
            }
        }

        match values.get(self.output.name.as_str()) {
            None => {
                return Err(ModelError::InvalidGraph(format!(
                    "declared output '{}' is never produced",
                    self.output.name
                )))
            }
            Some(&shape) if shape != &self.output.shape => {
                return Err(ModelError::InvalidGraph(format!(
                    "declared output shape {} but graph produces {shape}",
                    self.output.shape
                )))
            }
            Some(_) => {}
        }

        let unused = self.params.len() - used_params.len();
        if unused > 0 {
            tracing::warn!(
                "graph '{}' carries {unused} parameter tensors no node reads",
                self.name
            );
        }

        Ok(Graph {
            name: self.name,
            input: self.input,
            output: self.output,
            nodes: self.nodes,
            params: self.params,
            _state: std::marker::PhantomData,
        })
    }
}

// ── Validated state ────────────────────────────────────────────────

impl Graph<Validated> {
    /// Returns the number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Returns an iterator over the nodes in execution order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Returns a reference to a node by index.
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.params.values().map(|t| t.shape().num_elements()).sum()
    }

    /// Total parameter memory in bytes.
    pub fn total_param_bytes(&self) -> usize {
        self.params.values().map(Tensor::size_bytes).sum()
    }

    /// Releases the validation guarantee so a pass can rewrite the graph.
    pub fn into_loaded(self) -> Graph<Loaded> {
        Graph::new(self.name, self.input, self.output, self.nodes, self.params)
    }

    /// Runs the graph on `input` with the reference kernels.
    ///
    /// Dynamic axes of the input may differ from the traced shape; all other
    /// dimensions must match.
    pub fn evaluate(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        let expected = self.input.shape.dims();
        let given = input.shape().dims();
        let compatible = expected.len() == given.len()
            && expected
                .iter()
                .zip(given)
                .enumerate()
                .all(|(axis, (e, g))| e == g || self.input.dynamic_axes.contains(&axis));
        if !compatible {
            return Err(ModelError::ShapeMismatch {
                layer: self.input.name.clone(),
                source: tensor_core::TensorError::ShapeMismatch {
                    op: "graph input",
                    lhs: self.input.shape.clone(),
                    rhs: input.shape().clone(),
                },
            });
        }

        let mut values: HashMap<&str, Tensor> = HashMap::new();
        values.insert(self.input.name.as_str(), input.clone());

        for node in &self.nodes {
            let x = values.get(node.input.as_str()).ok_or_else(|| {
                ModelError::InvalidGraph(format!("value '{}' not computed", node.input))
            })?;
            let params: Vec<&Tensor> = node
                .params
                .iter()
                .filter_map(|p| self.params.get(p))
                .collect();
            let y = node
                .op
                .execute(x, &params)
                .map_err(|source| ModelError::ShapeMismatch {
                    layer: node.name.clone(),
                    source,
                })?;
            values.insert(node.output.as_str(), y);
        }

        values.remove(self.output.name.as_str()).ok_or_else(|| {
            ModelError::InvalidGraph(format!("output '{}' not computed", self.output.name))
        })
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        let param_mb = self.total_param_bytes() as f64 / (1024.0 * 1024.0);
        format!(
            "Graph '{}': {} nodes, {} parameters ({:.2} MB), input {} {}, output {} {}",
            self.name,
            self.num_nodes(),
            self.num_parameters(),
            param_mb,
            self.input.name,
            self.input.shape,
            self.output.name,
            self.output.shape,
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> Graph<S> {
    /// Returns the parameter-free structure of the graph.
    pub fn topology(&self) -> Topology {
        Topology {
            name: self.name.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            nodes: self.nodes.clone(),
        }
    }
}

impl<S: GraphState> fmt::Display for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph '{}' ({} nodes):", self.name, self.nodes.len())?;
        for node in &self.nodes {
            writeln!(f, "  {}", node.summary())?;
        }
        Ok(())
    }
}
