// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fully-connected layer.

use crate::{Shape, Tensor, TensorError, TensorView};

/// Computes `output = input @ weightᵀ + bias`.
///
/// `input` is `[N, K]`, `weight` is `[O, K]` (the row-per-output layout
/// checkpoints store), `bias` is `[O]`. The result is `[N, O]`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if `K` differs between input and
/// weight or the bias length is not `O`.
pub fn linear(
    input: &TensorView<'_>,
    weight: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
) -> Result<Tensor, TensorError> {
    let in_dims = input.shape().dims();
    let w_dims = weight.shape().dims();
    if in_dims.len() != 2 || w_dims.len() != 2 || in_dims[1] != w_dims[1] {
        return Err(TensorError::ShapeMismatch {
            op: "linear",
            lhs: input.shape().clone(),
            rhs: weight.shape().clone(),
        });
    }
    let (n, k) = (in_dims[0], in_dims[1]);
    let o = w_dims[0];

    // Rows of `weight` are contiguous, so each output is a dot product of
    // two contiguous slices.
    let x = input.as_f32_slice();
    let w = weight.as_f32_slice();
    let mut values = Vec::with_capacity(n * o);
    for sample in x.chunks_exact(k).take(n) {
        values.extend(
            w.chunks_exact(k)
                .map(|unit| sample.iter().zip(unit).map(|(a, b)| a * b).sum::<f32>()),
        );
    }
    let mut out = Tensor::from_vec(Shape::matrix(n, o), values)?;

    if let Some(b) = bias {
        if b.shape().num_elements() != o {
            return Err(TensorError::ShapeMismatch {
                op: "linear (bias)",
                lhs: Shape::vector(o),
                rhs: b.shape().clone(),
            });
        }
        let b = b.as_f32_slice();
        for row in out.as_f32_slice_mut().chunks_mut(o) {
            row.iter_mut().zip(b).for_each(|(y, b)| *y += b);
        }
    }

    Ok(out)
}
