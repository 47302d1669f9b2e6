// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Source models: what the converter takes as input.
//!
//! Anything that can run its forward pass through a [`Tracer`] is a
//! [`SourceModel`]. Implementations must not branch on anything a tracer
//! cannot see other than activation values; a branch on activation values
//! is frozen to whichever side the synthetic input takes.

use crate::layer::{LayerDef, LayerType};
use crate::trace::{Traced, Tracer};
use crate::{ModelError, Op};
use std::fmt;
use tensor_core::Tensor;

/// Whether a model is set up for training or inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Stochastic layers active, statistics updating.
    Train,
    /// Dropout disabled, batch-norm uses running statistics.
    Eval,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => f.write_str("train"),
            Mode::Eval => f.write_str("eval"),
        }
    }
}

/// A trained model that can be traced.
pub trait SourceModel {
    /// Model name, used for graph and artifact naming.
    fn name(&self) -> &str;

    /// Current mode. Only [`Mode::Eval`] models can be exported.
    fn mode(&self) -> Mode;

    /// Runs the forward pass, recording every operation on `tracer`.
    fn forward(&self, tracer: &mut Tracer, input: Traced) -> Result<Traced, ModelError>;
}

/// A layer definition together with its weight tensors.
#[derive(Debug, Clone)]
pub struct Layer {
    pub def: LayerDef,
    /// Weights in the order of `def.weight_names`.
    pub weights: Vec<Tensor>,
}

impl Layer {
    /// Builds a layer from named weights, checking the weight count.
    pub fn new(
        name: impl Into<String>,
        layer_type: LayerType,
        weights: Vec<(String, Tensor)>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if !layer_type.weight_arity().contains(&weights.len()) {
            return Err(ModelError::InvalidLayer {
                layer: name,
                detail: format!("{layer_type} cannot take {} weight tensors", weights.len()),
            });
        }
        let (weight_names, weights) = weights.into_iter().unzip();
        Ok(Self {
            def: LayerDef {
                name,
                layer_type,
                weight_names,
            },
            weights,
        })
    }

    /// Number of scalar parameters in this layer.
    pub fn num_parameters(&self) -> usize {
        self.weights.iter().map(|w| w.shape().num_elements()).sum()
    }

    /// IR op for this layer, `None` for layers that vanish in eval mode.
    fn op(&self) -> Result<Option<Op>, ModelError> {
        let op = match &self.def.layer_type {
            LayerType::Conv2d(p) => Op::Conv2d(*p),
            LayerType::Linear => Op::Linear,
            LayerType::BatchNorm { epsilon } => Op::BatchNorm { epsilon: *epsilon },
            LayerType::Activation(kind) => Op::Activation { kind: *kind },
            LayerType::MaxPool2d(p) => Op::MaxPool2d(*p),
            LayerType::GlobalAvgPool => Op::GlobalAvgPool,
            LayerType::Flatten => Op::Flatten,
            LayerType::Softmax => Op::Softmax,
            LayerType::Dropout => return Ok(None),
            LayerType::Custom(op) => {
                return Err(ModelError::UnsupportedOperation {
                    layer: self.def.name.clone(),
                    op: op.clone(),
                })
            }
        };
        Ok(Some(op))
    }
}

/// A model made of layers applied one after another.
#[derive(Debug, Clone)]
pub struct SequentialModel {
    name: String,
    layers: Vec<Layer>,
    mode: Mode,
}

impl SequentialModel {
    /// Creates a model in [`Mode::Train`], the state a freshly built
    /// network starts in.
    pub fn new(name: impl Into<String>, layers: Vec<Layer>) -> Self {
        Self {
            name: name.into(),
            layers,
            mode: Mode::Train,
        }
    }

    /// Switches to inference mode.
    pub fn eval(mut self) -> Self {
        self.mode = Mode::Eval;
        self
    }

    /// Switches to training mode.
    pub fn train(mut self) -> Self {
        self.mode = Mode::Train;
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(Layer::num_parameters).sum()
    }
}

impl SourceModel for SequentialModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn forward(&self, tracer: &mut Tracer, input: Traced) -> Result<Traced, ModelError> {
        let mut x = input;
        for layer in &self.layers {
            let Some(op) = layer.op()? else {
                tracing::debug!(layer = %layer.def.name, "identity in eval mode, not recorded");
                continue;
            };
            let params: Vec<(&str, &Tensor)> = layer
                .def
                .weight_names
                .iter()
                .map(String::as_str)
                .zip(&layer.weights)
                .collect();
            x = tracer.record(&layer.def.name, op, &x, &params)?;
        }
        Ok(x)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tensor_core::{Activation, Conv2dParams, Shape};

    /// `[1, 3, 8, 8]` → conv(4, s2) → bn → relu6 → gap → flatten → dropout → linear(5).
    pub(crate) fn tiny_cnn() -> SequentialModel {
        let conv_w = Tensor::from_vec(
            Shape::new(vec![4, 3, 3, 3]),
            (0..108).map(|i| ((i % 7) as f32 - 3.0) * 0.1).collect(),
        )
        .unwrap();
        let stat = |v: f32| Tensor::from_f32(Shape::vector(4), &[v; 4]).unwrap();
        let fc_w = Tensor::from_vec(
            Shape::matrix(5, 4),
            (0..20).map(|i| (i as f32 - 10.0) * 0.05).collect(),
        )
        .unwrap();
        let layers = vec![
            Layer::new(
                "stem.conv",
                LayerType::Conv2d(Conv2dParams {
                    stride: [2, 2],
                    padding: [1, 1],
                    groups: 1,
                }),
                vec![("stem.conv.weight".into(), conv_w)],
            )
            .unwrap(),
            Layer::new(
                "stem.bn",
                LayerType::BatchNorm { epsilon: 1e-5 },
                vec![
                    ("stem.bn.weight".into(), stat(1.5)),
                    ("stem.bn.bias".into(), stat(0.1)),
                    ("stem.bn.running_mean".into(), stat(0.2)),
                    ("stem.bn.running_var".into(), stat(4.0)),
                ],
            )
            .unwrap(),
            Layer::new("stem.act", LayerType::Activation(Activation::Relu6), vec![]).unwrap(),
            Layer::new("pool", LayerType::GlobalAvgPool, vec![]).unwrap(),
            Layer::new("flatten", LayerType::Flatten, vec![]).unwrap(),
            Layer::new("drop", LayerType::Dropout, vec![]).unwrap(),
            Layer::new(
                "classifier",
                LayerType::Linear,
                vec![
                    ("classifier.weight".into(), fc_w),
                    ("classifier.bias".into(), Tensor::zeros(Shape::vector(5))),
                ],
            )
            .unwrap(),
        ];
        SequentialModel::new("tiny_cnn", layers).eval()
    }

    fn trace(model: &SequentialModel, shape: Shape) -> Result<crate::Graph, ModelError> {
        let (mut tracer, x) = Tracer::new(model.name(), "input", Tensor::zeros(shape));
        let y = model.forward(&mut tracer, x)?;
        tracer.finish(y, "output")
    }

    #[test]
    fn test_forward_skips_dropout() {
        let graph = trace(&tiny_cnn(), Shape::new(vec![1, 3, 8, 8])).unwrap();
        assert_eq!(graph.nodes.len(), 6);
        assert!(graph.nodes.iter().all(|n| n.name != "drop"));
        let graph = graph.validate().unwrap();
        assert_eq!(graph.output.shape, Shape::matrix(1, 5));
    }

    #[test]
    fn test_custom_layer_unsupported() {
        let model = SequentialModel::new(
            "custom",
            vec![
                Layer::new("act", LayerType::Activation(Activation::Relu), vec![]).unwrap(),
                Layer::new("roi", LayerType::Custom("roi_align".into()), vec![]).unwrap(),
            ],
        )
        .eval();
        let err = trace(&model, Shape::matrix(1, 2)).unwrap_err();
        match err {
            ModelError::UnsupportedOperation { layer, op } => {
                assert_eq!(layer, "roi");
                assert_eq!(op, "roi_align");
            }
            other => panic!("expected UnsupportedOperation, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_input_channels() {
        let err = trace(&tiny_cnn(), Shape::new(vec![1, 1, 8, 8])).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { ref layer, .. } if layer == "stem.conv"));
    }

    #[test]
    fn test_layer_weight_count_checked() {
        let r = Layer::new("bn", LayerType::BatchNorm { epsilon: 1e-5 }, vec![]);
        assert!(r.is_err());
    }

    #[test]
    fn test_mode_switching() {
        let model = tiny_cnn();
        assert_eq!(model.mode(), Mode::Eval);
        let model = model.train();
        assert_eq!(model.mode(), Mode::Train);
        assert_eq!(model.mode().to_string(), "train");
    }

    #[test]
    fn test_num_parameters() {
        assert_eq!(tiny_cnn().num_parameters(), 108 + 16 + 20 + 5);
    }
}
