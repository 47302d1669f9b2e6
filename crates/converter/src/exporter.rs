// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph exporter: traces a source model into the graph IR.
//!
//! The model runs once on a synthetic input of the declared shape and every
//! operation it performs is recorded. Control flow that depends on tensor
//! values is therefore frozen to the branch the synthetic input took; this
//! is a limitation of tracing, not an error.

use crate::input::ShapeDescriptor;
use crate::{onnx, persist, ConvertError};
use model_ir::graph::Validated;
use model_ir::{Graph, Mode, SourceModel, Tracer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tensor_core::Tensor;

/// Name of the graph input value.
pub const INPUT_NAME: &str = "input";
/// Name of the graph output value.
pub const OUTPUT_NAME: &str = "output";
/// Seed of the synthetic trace input, fixed so exports are reproducible.
pub const TRACE_SEED: u64 = 0x6d6f_64656c;

/// How the exporter hands its graph to the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportRoute {
    /// Trace straight into the compiler's IR.
    DirectTrace,
    /// Trace, then write an ONNX file at `path` that must pass validation
    /// before compilation.
    ExchangeFormat { path: PathBuf },
}

/// Seeded uniform `[0, 1)` tensor of exactly the descriptor's shape.
pub fn synthetic_input(descriptor: &ShapeDescriptor) -> Tensor {
    let mut rng = StdRng::seed_from_u64(TRACE_SEED);
    Tensor::random_uniform(descriptor.shape(), &mut rng)
}

/// Traces `model` on a synthetic input shaped by `descriptor`.
///
/// The graph input is named [`INPUT_NAME`], the output [`OUTPUT_NAME`],
/// and both mark axis 0 (the batch) as dynamic.
///
/// # Errors
/// - [`ConvertError::Precondition`] if the model is not in eval mode or the
///   descriptor is invalid.
/// - [`ConvertError::UnsupportedOperation`] for untraceable operations.
/// - [`ConvertError::ShapeMismatch`] if a layer rejects the shape it gets.
pub fn trace(
    model: &dyn SourceModel,
    descriptor: &ShapeDescriptor,
) -> Result<Graph<Validated>, ConvertError> {
    if model.mode() != Mode::Eval {
        return Err(ConvertError::Precondition(format!(
            "model '{}' is in {} mode; call eval() before exporting",
            model.name(),
            model.mode()
        )));
    }
    descriptor.check()?;

    let (mut tracer, x) = Tracer::new(model.name(), INPUT_NAME, synthetic_input(descriptor));
    let y = model.forward(&mut tracer, x)?;
    let recorded = tracer.num_recorded();
    let mut graph = tracer.finish(y, OUTPUT_NAME)?;
    graph.input = graph.input.clone().with_dynamic_axis(0);
    graph.output = graph.output.clone().with_dynamic_axis(0);
    let graph = graph.validate()?;

    tracing::info!(
        model = %model.name(),
        nodes = recorded,
        input = %graph.input.shape,
        output = %graph.output.shape,
        "traced model"
    );
    Ok(graph)
}

/// Writes `graph` as an ONNX file at `path`.
pub fn write_exchange(graph: &Graph<Validated>, path: &Path) -> Result<(), ConvertError> {
    persist::write_atomic(path, &onnx::encode(graph))?;
    tracing::info!(graph = %graph.name, path = %path.display(), "wrote ONNX exchange file");
    Ok(())
}

/// Runs the exporter along `route`.
///
/// The direct route returns the traced graph. The exchange route also
/// writes the ONNX file; its caller validates that file before compiling.
pub fn export(
    model: &dyn SourceModel,
    descriptor: &ShapeDescriptor,
    route: &ExportRoute,
) -> Result<Graph<Validated>, ConvertError> {
    let graph = trace(model, descriptor)?;
    if let ExportRoute::ExchangeFormat { path } = route {
        write_exchange(&graph, path)?;
    }
    Ok(graph)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use model_ir::{Layer, LayerType, SequentialModel};
    use tensor_core::{Activation, Conv2dParams, Shape};

    /// `[N, 3, H, W]` → conv(4, s2) → bn → relu6 → gap → flatten → dropout
    /// → linear(`classes`).
    pub(crate) fn tiny_classifier(classes: usize) -> SequentialModel {
        let conv_w = Tensor::from_vec(
            Shape::new(vec![4, 3, 3, 3]),
            (0..108).map(|i| ((i % 7) as f32 - 3.0) * 0.1).collect(),
        )
        .unwrap();
        let stat = |v: &[f32; 4]| Tensor::from_f32(Shape::vector(4), v).unwrap();
        let fc_w = Tensor::from_vec(
            Shape::matrix(classes, 4),
            (0..classes * 4).map(|i| (i as f32 - 10.0) * 0.05).collect(),
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
                    ("stem.bn.weight".into(), stat(&[1.5, 0.5, 1.0, 2.0])),
                    ("stem.bn.bias".into(), stat(&[0.1, -0.2, 0.0, 0.3])),
                    ("stem.bn.running_mean".into(), stat(&[0.2, 0.0, -0.1, 0.05])),
                    ("stem.bn.running_var".into(), stat(&[4.0, 1.0, 0.5, 2.0])),
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
                    ("classifier.bias".into(), Tensor::zeros(Shape::vector(classes))),
                ],
            )
            .unwrap(),
        ];
        SequentialModel::new("tiny_classifier", layers).eval()
    }

    #[test]
    fn test_synthetic_input_is_seeded() {
        let d = ShapeDescriptor::new(2, 3, 4, 4).unwrap();
        let a = synthetic_input(&d);
        let b = synthetic_input(&d);
        assert_eq!(a, b);
        assert_eq!(a.shape().dims(), &[2, 3, 4, 4]);
        assert!(a.as_f32_slice().iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_trace_names_and_dynamic_batch() {
        let d = ShapeDescriptor::new(1, 3, 8, 8).unwrap();
        let graph = trace(&tiny_classifier(5), &d).unwrap();
        assert_eq!(graph.input.name, INPUT_NAME);
        assert_eq!(graph.output.name, OUTPUT_NAME);
        assert_eq!(graph.input.shape, d.shape());
        assert_eq!(graph.input.dynamic_axes, vec![0]);
        assert_eq!(graph.output.shape, Shape::matrix(1, 5));
        // Dropout is an identity in eval mode.
        assert_eq!(graph.num_nodes(), 6);
    }

    #[test]
    fn test_trace_requires_eval_mode() {
        let d = ShapeDescriptor::new(1, 3, 8, 8).unwrap();
        let model = tiny_classifier(5).train();
        assert!(matches!(
            trace(&model, &d),
            Err(ConvertError::Precondition(_))
        ));
    }

    #[test]
    fn test_trace_wrong_channels() {
        let d = ShapeDescriptor::new(1, 1, 8, 8).unwrap();
        assert!(matches!(
            trace(&tiny_classifier(5), &d),
            Err(ConvertError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_trace_custom_layer_unsupported() {
        let model = SequentialModel::new(
            "custom",
            vec![Layer::new("roi", LayerType::Custom("roi_align".into()), vec![]).unwrap()],
        )
        .eval();
        let d = ShapeDescriptor::new(1, 3, 8, 8).unwrap();
        assert!(matches!(
            trace(&model, &d),
            Err(ConvertError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_export_exchange_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/model.onnx");
        let d = ShapeDescriptor::new(1, 3, 8, 8).unwrap();
        let route = ExportRoute::ExchangeFormat { path: path.clone() };
        let graph = export(&tiny_classifier(5), &d, &route).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, onnx::encode(&graph));
    }
}
