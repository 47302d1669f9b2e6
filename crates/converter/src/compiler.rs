// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Target compiler: turns a validated graph into a [`CompiledArtifact`].
//!
//! Compilation checks the requested target options, binds the input
//! specification and classifier labels, and runs the lowering passes.

use crate::artifact::CompiledArtifact;
use crate::config::CompileOptions;
use crate::input::InputSpec;
use crate::labels::ClassLabels;
use crate::ConvertError;
use model_ir::graph::Validated;
use model_ir::{Graph, Node, Op};
use std::collections::{BTreeMap, HashMap, HashSet};
use tensor_core::{Shape, Tensor};

/// Name recorded for the conv + batch-norm folding pass.
pub const FOLD_BATCH_NORM: &str = "fold_batch_norm";

/// Compiles `graph` for the target described by `options`.
///
/// The artifact is named after the graph.
///
/// # Errors
/// - [`ConvertError::UnsupportedTarget`] for option combinations the target
///   cannot run.
/// - [`ConvertError::ShapeMismatch`] if `input` does not declare the graph's
///   input shape.
/// - [`ConvertError::LabelCountMismatch`] if `labels` are given and their
///   count differs from the width of the graph output.
pub fn compile(
    graph: Graph<Validated>,
    input: InputSpec,
    options: &CompileOptions,
    labels: Option<ClassLabels>,
) -> Result<CompiledArtifact, ConvertError> {
    options.check()?;

    if input.shape() != &graph.input.shape {
        return Err(ConvertError::ShapeMismatch(format!(
            "input '{}' declares {} but graph '{}' takes {}",
            input.name(),
            input.shape(),
            graph.name,
            graph.input.shape
        )));
    }

    if let Some(labels) = &labels {
        let outputs = graph.output.shape.last_dim().unwrap_or(0);
        if labels.len() != outputs {
            return Err(ConvertError::LabelCountMismatch {
                labels: labels.len(),
                outputs,
            });
        }
    }

    let mut passes = Vec::new();
    let (graph, folded) = fold_batch_norm(graph)?;
    if folded > 0 {
        tracing::debug!(graph = %graph.name, folded, "folded batch norms into convolutions");
        passes.push(FOLD_BATCH_NORM.to_string());
    }

    tracing::info!(
        model = %graph.name,
        target = %options.target,
        compute_units = %options.compute_units,
        format = %options.format,
        nodes = graph.num_nodes(),
        classifier = labels.is_some(),
        "compiled model"
    );

    Ok(CompiledArtifact {
        name: graph.name.clone(),
        graph,
        input,
        labels,
        options: *options,
        passes,
        metadata: None,
    })
}

// ── Lowering passes ────────────────────────────────────────────────

/// Folds every batch norm that directly consumes a convolution (and is its
/// only consumer) into that convolution's weight and bias.
///
/// Returns the rewritten graph and the number of folds.
pub fn fold_batch_norm(graph: Graph<Validated>) -> Result<(Graph<Validated>, usize), ConvertError> {
    let mut graph = graph.into_loaded();

    let mut consumers: HashMap<String, usize> = HashMap::new();
    for node in &graph.nodes {
        *consumers.entry(node.input.clone()).or_default() += 1;
    }

    let mut nodes = Vec::with_capacity(graph.nodes.len());
    let mut folded = 0;
    let mut pending = std::mem::take(&mut graph.nodes).into_iter().peekable();
    while let Some(node) = pending.next() {
        let foldable = matches!(node.op, Op::Conv2d(_))
            && node.output != graph.output.name
            && consumers.get(&node.output) == Some(&1)
            && pending
                .peek()
                .is_some_and(|next| matches!(next.op, Op::BatchNorm { .. }) && next.input == node.output);
        if !foldable {
            nodes.push(node);
            continue;
        }
        let Some(bn) = pending.next() else {
            nodes.push(node);
            break;
        };
        nodes.push(fold_pair(&node, &bn, &mut graph.params)?);
        folded += 1;
    }

    let used: HashSet<&str> = nodes
        .iter()
        .flat_map(|n| n.params.iter().map(String::as_str))
        .collect();
    let params: BTreeMap<String, Tensor> = std::mem::take(&mut graph.params)
        .into_iter()
        .filter(|(name, _)| used.contains(name.as_str()))
        .collect();

    let graph = Graph::new(graph.name, graph.input, graph.output, nodes, params).validate()?;
    Ok((graph, folded))
}

/// `W'[o] = W[o] * s[o]`, `b'[o] = (b[o] - mean[o]) * s[o] + beta[o]`,
/// with `s = gamma / sqrt(var + eps)`.
fn fold_pair(
    conv: &Node,
    bn: &Node,
    params: &mut BTreeMap<String, Tensor>,
) -> Result<Node, ConvertError> {
    let Op::BatchNorm { epsilon } = bn.op else {
        return Err(ConvertError::MalformedGraph(format!(
            "node '{}' is not a batch norm",
            bn.name
        )));
    };
    let get = |name: Option<&String>| -> Result<&Tensor, ConvertError> {
        name.and_then(|n| params.get(n)).ok_or_else(|| {
            ConvertError::MalformedGraph(format!(
                "parameters of '{}' + '{}' are incomplete",
                conv.name, bn.name
            ))
        })
    };

    let weight = get(conv.params.first())?;
    let bias = conv.params.get(1).and_then(|n| params.get(n));
    let gamma = get(bn.params.first())?.as_f32_slice();
    let beta = get(bn.params.get(1))?.as_f32_slice();
    let mean = get(bn.params.get(2))?.as_f32_slice();
    let var = get(bn.params.get(3))?.as_f32_slice();

    let out_channels = weight.shape().dim(0).unwrap_or(0);
    let per_channel = weight.shape().num_elements() / out_channels.max(1);
    let mut new_weight = weight.clone();
    let mut new_bias = vec![0.0f32; out_channels];
    for o in 0..out_channels {
        let s = gamma[o] / (var[o] + epsilon).sqrt();
        for w in &mut new_weight.as_f32_slice_mut()[o * per_channel..(o + 1) * per_channel] {
            *w *= s;
        }
        let b = bias.map_or(0.0, |b| b.as_f32_slice()[o]);
        new_bias[o] = (b - mean[o]) * s + beta[o];
    }
    let new_bias = Tensor::from_vec(Shape::vector(out_channels), new_bias)
        .map_err(|e| ConvertError::ShapeMismatch(e.to_string()))?;

    let weight_name = format!("{}.folded.weight", conv.name);
    let bias_name = format!("{}.folded.bias", conv.name);
    params.insert(weight_name.clone(), new_weight);
    params.insert(bias_name.clone(), new_bias);

    Ok(Node {
        name: conv.name.clone(),
        op: conv.op.clone(),
        input: conv.input.clone(),
        params: vec![weight_name, bias_name],
        output: bn.output.clone(),
        output_shape: bn.output_shape.clone(),
    })
}
