// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operations recorded in the graph IR.
//!
//! Every [`Op`] knows how to infer its output shape and how to execute on
//! concrete tensors. The tracer executes ops while recording them; graph
//! validation re-runs shape inference; the reference interpreter executes
//! a whole graph.

use std::ops::RangeInclusive;
use tensor_core::{
    activation, batch_norm, conv2d, flatten, global_avg_pool, linear, max_pool2d, softmax,
    Activation, Conv2dParams, Pool2dParams, Shape, Tensor, TensorError,
};

/// A concrete, shape-static operation.
///
/// Parameters (weights, biases, statistics) are not stored in the op; a
/// [`Node`](crate::graph::Node) refers to them by name in a fixed order:
///
/// | Op          | Params                                   |
/// |-------------|------------------------------------------|
/// | `Conv2d`    | weight `[O, C/g, KH, KW]`, bias `[O]`?   |
/// | `Linear`    | weight `[O, K]`, bias `[O]`?             |
/// | `BatchNorm` | gamma, beta, running mean, running var   |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Conv2d(Conv2dParams),
    Linear,
    BatchNorm { epsilon: f32 },
    Activation { kind: Activation },
    MaxPool2d(Pool2dParams),
    GlobalAvgPool,
    Flatten,
    Softmax,
}

impl Op {
    /// Number of named parameters the op accepts.
    pub fn param_arity(&self) -> RangeInclusive<usize> {
        match self {
            Op::Conv2d(_) | Op::Linear => 1..=2,
            Op::BatchNorm { .. } => 4..=4,
            _ => 0..=0,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Conv2d(_) => "conv2d",
            Op::Linear => "linear",
            Op::BatchNorm { .. } => "batch_norm",
            Op::Activation { kind } => kind.as_str(),
            Op::MaxPool2d(_) => "max_pool2d",
            Op::GlobalAvgPool => "global_avg_pool",
            Op::Flatten => "flatten",
            Op::Softmax => "softmax",
        }
    }

    fn check_arity(&self, given: usize) -> Result<(), TensorError> {
        let arity = self.param_arity();
        if arity.contains(&given) {
            Ok(())
        } else {
            Err(TensorError::InvalidParameter {
                op: self.as_str(),
                detail: format!(
                    "expects {}..={} parameters, got {given}",
                    arity.start(),
                    arity.end()
                ),
            })
        }
    }

    /// Infers the output shape from the input shape and parameter shapes.
    pub fn infer_shape(&self, input: &Shape, params: &[&Shape]) -> Result<Shape, TensorError> {
        self.check_arity(params.len())?;
        let mismatch = |op: &'static str, rhs: &Shape| TensorError::ShapeMismatch {
            op,
            lhs: input.clone(),
            rhs: rhs.clone(),
        };

        match self {
            Op::Conv2d(p) => {
                let out = p.output_shape(input, params[0])?;
                if let Some(bias) = params.get(1) {
                    if Some(bias.num_elements()) != out.dim(1) {
                        return Err(mismatch("conv2d (bias)", *bias));
                    }
                }
                Ok(out)
            }
            Op::Linear => {
                let (x, w) = (input.dims(), params[0].dims());
                if x.len() != 2 || w.len() != 2 || x[1] != w[1] {
                    return Err(mismatch("linear", params[0]));
                }
                if let Some(bias) = params.get(1) {
                    if bias.num_elements() != w[0] {
                        return Err(mismatch("linear (bias)", *bias));
                    }
                }
                Ok(Shape::matrix(x[0], w[0]))
            }
            Op::BatchNorm { .. } => {
                let channels = input
                    .dim(1)
                    .ok_or_else(|| mismatch("batch_norm (rank < 2)", params[0]))?;
                if let Some(stat) = params.iter().find(|s| s.num_elements() != channels) {
                    return Err(mismatch("batch_norm (statistics)", *stat));
                }
                Ok(input.clone())
            }
            Op::Activation { .. } => Ok(input.clone()),
            Op::Softmax => {
                if input.rank() == 0 {
                    return Err(mismatch("softmax (scalar input)", &Shape::vector(1)));
                }
                Ok(input.clone())
            }
            Op::MaxPool2d(p) => p.output_shape(input),
            Op::GlobalAvgPool => {
                let (n, c, _, _) = input
                    .nchw()
                    .ok_or_else(|| mismatch("global_avg_pool (input rank)", &Shape::new(vec![0; 4])))?;
                Ok(Shape::new(vec![n, c, 1, 1]))
            }
            Op::Flatten => match input.dims() {
                [] => Err(mismatch("flatten (scalar input)", &Shape::vector(1))),
                [n, rest @ ..] => Ok(Shape::matrix(*n, rest.iter().product())),
            },
        }
    }

    /// Executes the op on concrete tensors.
    pub fn execute(&self, input: &Tensor, params: &[&Tensor]) -> Result<Tensor, TensorError> {
        self.check_arity(params.len())?;
        let x = input.view();

        match self {
            Op::Conv2d(p) => {
                let bias = params.get(1).map(|b| b.view());
                conv2d(&x, &params[0].view(), bias.as_ref(), p)
            }
            Op::Linear => {
                let bias = params.get(1).map(|b| b.view());
                linear(&x, &params[0].view(), bias.as_ref())
            }
            Op::BatchNorm { epsilon } => {
                let mut out = Tensor::zeros(input.shape().clone());
                batch_norm(
                    &x,
                    &params[0].view(),
                    &params[1].view(),
                    &params[2].view(),
                    &params[3].view(),
                    *epsilon,
                    &mut out,
                )?;
                Ok(out)
            }
            Op::Activation { kind } => {
                let mut out = Tensor::zeros(input.shape().clone());
                activation(*kind, &x, &mut out)?;
                Ok(out)
            }
            Op::Softmax => {
                let mut out = Tensor::zeros(input.shape().clone());
                softmax(&x, &mut out)?;
                Ok(out)
            }
            Op::MaxPool2d(p) => max_pool2d(&x, p),
            Op::GlobalAvgPool => global_avg_pool(&x),
            Op::Flatten => flatten(&x),
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv_infer_matches_execute() {
        let op = Op::Conv2d(Conv2dParams {
            stride: [2, 2],
            padding: [1, 1],
            groups: 1,
        });
        let input = Tensor::zeros(Shape::new(vec![1, 3, 8, 8]));
        let weight = Tensor::zeros(Shape::new(vec![4, 3, 3, 3]));
        let bias = Tensor::zeros(Shape::vector(4));
        let inferred = op
            .infer_shape(input.shape(), &[weight.shape(), bias.shape()])
            .unwrap();
        let out = op.execute(&input, &[&weight, &bias]).unwrap();
        assert_eq!(&inferred, out.shape());
        assert_eq!(inferred.dims(), &[1, 4, 4, 4]);
    }

    #[test]
    fn test_linear_rejects_wrong_features() {
        let err = Op::Linear
            .infer_shape(&Shape::matrix(1, 8), &[&Shape::matrix(10, 16)])
            .unwrap_err();
        assert!(matches!(err, TensorError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_linear_bias_length() {
        let r = Op::Linear.infer_shape(
            &Shape::matrix(1, 8),
            &[&Shape::matrix(10, 8), &Shape::vector(9)],
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_arity_checked() {
        let r = Op::BatchNorm { epsilon: 1e-5 }
            .infer_shape(&Shape::new(vec![1, 2, 2, 2]), &[&Shape::vector(2)]);
        assert!(matches!(r, Err(TensorError::InvalidParameter { .. })));
        let r = Op::Flatten.infer_shape(&Shape::matrix(1, 2), &[&Shape::vector(2)]);
        assert!(r.is_err());
    }

    #[test]
    fn test_flatten_and_pool_shapes() {
        let s = Shape::new(vec![2, 16, 7, 7]);
        let pooled = Op::GlobalAvgPool.infer_shape(&s, &[]).unwrap();
        assert_eq!(pooled.dims(), &[2, 16, 1, 1]);
        let flat = Op::Flatten.infer_shape(&pooled, &[]).unwrap();
        assert_eq!(flat, Shape::matrix(2, 16));
    }

    #[test]
    fn test_activation_execute() {
        let op = Op::Activation {
            kind: Activation::Relu6,
        };
        let input = Tensor::from_f32(Shape::vector(3), &[-2.0, 1.0, 8.0]).unwrap();
        let out = op.execute(&input, &[]).unwrap();
        assert_eq!(out.as_f32_slice(), &[0.0, 1.0, 6.0]);
    }

    #[test]
    fn test_serde_tagged() {
        let op = Op::BatchNorm { epsilon: 0.001 };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains(r#""op":"batch_norm""#));
        let back: Op = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);

        let conv: Op = serde_json::from_str(
            r#"{"op":"conv2d","stride":[1,1],"padding":[0,0],"groups":1}"#,
        )
        .unwrap();
        assert_eq!(conv, Op::Conv2d(Conv2dParams::default()));
    }
}
