// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Recording a forward pass into a [`Graph`].
//!
//! A [`Tracer`] executes every operation it is asked to record on real
//! tensors and appends a [`Node`] for it. Because the model runs on one
//! concrete input, any branch that depends on activation values is
//! resolved to the branch taken for that input; the other branch never
//! reaches the tracer and is absent from the graph.

use crate::graph::{Loaded, Node, ValueInfo};
use crate::{Graph, ModelError, Op};
use std::collections::{BTreeMap, HashMap};
use tensor_core::{Shape, Tensor, TensorError};

/// An activation flowing through a trace: the concrete tensor plus the
/// name of the graph value it corresponds to.
#[derive(Debug, Clone)]
pub struct Traced {
    name: String,
    tensor: Tensor,
}

impl Traced {
    /// Name of the graph value.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concrete value computed for the synthetic input.
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn shape(&self) -> &Shape {
        self.tensor.shape()
    }
}

/// Records operations into a graph while executing them.
#[derive(Debug)]
pub struct Tracer {
    graph_name: String,
    input: ValueInfo,
    nodes: Vec<Node>,
    params: BTreeMap<String, Tensor>,
    /// How many nodes each layer name has produced so far.
    name_counts: HashMap<String, usize>,
}

impl Tracer {
    /// Starts a trace whose graph input is `input`.
    pub fn new(graph_name: impl Into<String>, input_name: &str, input: Tensor) -> (Self, Traced) {
        let tracer = Self {
            graph_name: graph_name.into(),
            input: ValueInfo::new(input_name, input.shape().clone()),
            nodes: Vec::new(),
            params: BTreeMap::new(),
            name_counts: HashMap::new(),
        };
        let traced = Traced {
            name: input_name.to_string(),
            tensor: input,
        };
        (tracer, traced)
    }

    /// Number of nodes recorded so far.
    pub fn num_recorded(&self) -> usize {
        self.nodes.len()
    }

    /// Executes `op` on `input` and records it as a node named after `layer`.
    ///
    /// `params` are `(name, tensor)` pairs in the order the op expects. A
    /// parameter name seen before is reused if it holds the same tensor,
    /// which is how shared weights show up.
    ///
    /// # Errors
    /// - [`ModelError::ShapeMismatch`] if the op rejects the input shape.
    /// - [`ModelError::InvalidLayer`] for bad hyper-parameters or a
    ///   parameter name reused with a different tensor.
    pub fn record(
        &mut self,
        layer: &str,
        op: Op,
        input: &Traced,
        params: &[(&str, &Tensor)],
    ) -> Result<Traced, ModelError> {
        let tensors: Vec<&Tensor> = params.iter().map(|(_, t)| *t).collect();
        let output = op.execute(&input.tensor, &tensors).map_err(|e| match e {
            TensorError::ShapeMismatch { .. } | TensorError::BufferSizeMismatch { .. } => {
                ModelError::ShapeMismatch {
                    layer: layer.to_string(),
                    source: e,
                }
            }
            other => ModelError::InvalidLayer {
                layer: layer.to_string(),
                detail: other.to_string(),
            },
        })?;

        let mut param_names = Vec::with_capacity(params.len());
        for (name, tensor) in params {
            match self.params.get(*name) {
                Some(existing) if existing != *tensor => {
                    return Err(ModelError::InvalidLayer {
                        layer: layer.to_string(),
                        detail: format!("parameter '{name}' already bound to a different tensor"),
                    });
                }
                Some(_) => {}
                None => {
                    self.params.insert(name.to_string(), (*tensor).clone());
                }
            }
            param_names.push(name.to_string());
        }

        let node_name = self.unique_name(layer);
        let value_name = format!("{node_name}.out");
        tracing::debug!(
            node = %node_name,
            op = %op,
            shape = %output.shape(),
            "recorded"
        );

        self.nodes.push(Node {
            name: node_name,
            op,
            input: input.name.clone(),
            params: param_names,
            output: value_name.clone(),
            output_shape: output.shape().clone(),
        });

        Ok(Traced {
            name: value_name,
            tensor: output,
        })
    }

    /// Ends the trace, naming the graph output `output_name`.
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidGraph`] if `output` is the untouched
    /// graph input or was not produced by this tracer.
    pub fn finish(mut self, output: Traced, output_name: &str) -> Result<Graph<Loaded>, ModelError> {
        if output.name == self.input.name {
            return Err(ModelError::InvalidGraph(format!(
                "model '{}' records no operations",
                self.graph_name
            )));
        }
        if !self.nodes.iter().any(|n| n.output == output.name) {
            return Err(ModelError::InvalidGraph(format!(
                "value '{}' was not produced by this trace",
                output.name
            )));
        }

        for node in &mut self.nodes {
            if node.output == output.name {
                node.output = output_name.to_string();
            }
            if node.input == output.name {
                node.input = output_name.to_string();
            }
        }

        Ok(Graph::new(
            self.graph_name,
            self.input,
            ValueInfo::new(output_name, output.tensor.shape().clone()),
            self.nodes,
            self.params,
        ))
    }

    fn unique_name(&mut self, layer: &str) -> String {
        let count = self.name_counts.entry(layer.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            layer.to_string()
        } else {
            format!("{layer}_{count}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Activation;

    fn relu() -> Op {
        Op::Activation {
            kind: Activation::Relu,
        }
    }

    #[test]
    fn test_record_and_finish() {
        let (mut tracer, x) = Tracer::new("t", "input", Tensor::zeros(Shape::matrix(1, 4)));
        let w = Tensor::zeros(Shape::matrix(2, 4));
        let h = tracer.record("fc", Op::Linear, &x, &[("fc.weight", &w)]).unwrap();
        assert_eq!(h.shape(), &Shape::matrix(1, 2));
        let y = tracer.record("act", relu(), &h, &[]).unwrap();
        assert_eq!(tracer.num_recorded(), 2);

        let graph = tracer.finish(y, "output").unwrap();
        assert_eq!(graph.output.name, "output");
        assert_eq!(graph.nodes[1].output, "output");
        assert_eq!(graph.nodes[1].input, "fc.out");
        graph.validate().unwrap();
    }

    #[test]
    fn test_repeated_layer_names_are_unique() {
        let (mut tracer, x) = Tracer::new("t", "input", Tensor::zeros(Shape::vector(3)));
        let a = tracer.record("act", relu(), &x, &[]).unwrap();
        let b = tracer.record("act", relu(), &a, &[]).unwrap();
        assert_eq!(a.name(), "act.out");
        assert_eq!(b.name(), "act_2.out");
        tracer.finish(b, "output").unwrap().validate().unwrap();
    }

    #[test]
    fn test_shared_weights_stored_once() {
        let (mut tracer, x) = Tracer::new("t", "input", Tensor::zeros(Shape::matrix(1, 2)));
        let w = Tensor::zeros(Shape::matrix(2, 2));
        let a = tracer.record("fc", Op::Linear, &x, &[("shared", &w)]).unwrap();
        let b = tracer.record("fc", Op::Linear, &a, &[("shared", &w)]).unwrap();
        let graph = tracer.finish(b, "output").unwrap();
        assert_eq!(graph.params.len(), 1);
    }

    #[test]
    fn test_conflicting_param_name() {
        let (mut tracer, x) = Tracer::new("t", "input", Tensor::zeros(Shape::matrix(1, 2)));
        let w1 = Tensor::zeros(Shape::matrix(2, 2));
        let w2 = Tensor::from_f32(Shape::matrix(2, 2), &[1.0; 4]).unwrap();
        let a = tracer.record("fc1", Op::Linear, &x, &[("w", &w1)]).unwrap();
        let err = tracer.record("fc2", Op::Linear, &a, &[("w", &w2)]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidLayer { .. }));
    }

    #[test]
    fn test_shape_mismatch_names_layer() {
        let (mut tracer, x) = Tracer::new("t", "input", Tensor::zeros(Shape::matrix(1, 3)));
        let w = Tensor::zeros(Shape::matrix(2, 4));
        let err = tracer.record("head", Op::Linear, &x, &[("w", &w)]).unwrap_err();
        match err {
            ModelError::ShapeMismatch { layer, .. } => assert_eq!(layer, "head"),
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_finish_without_ops() {
        let (tracer, x) = Tracer::new("t", "input", Tensor::zeros(Shape::vector(1)));
        assert!(matches!(
            tracer.finish(x, "output"),
            Err(ModelError::InvalidGraph(_))
        ));
    }
}
