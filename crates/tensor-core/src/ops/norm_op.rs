// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference-mode batch normalization.

use crate::{Tensor, TensorError, TensorView};

/// Applies batch normalization with frozen running statistics:
///
/// `output = gamma * (x - mean) / sqrt(var + eps) + beta`
///
/// # Arguments
/// * `input` : `[N, C, ...]` activations, normalised per channel `C`.
/// * `gamma`, `beta`, `mean`, `var`: 1-D with length `C`.
/// * `eps`   : small constant for numerical stability (typically 1e-5).
/// * `output`: pre-allocated output tensor (same shape as `input`).
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if shapes are incompatible.
pub fn batch_norm(
    input: &TensorView<'_>,
    gamma: &TensorView<'_>,
    beta: &TensorView<'_>,
    mean: &TensorView<'_>,
    var: &TensorView<'_>,
    eps: f32,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    if input.shape() != output.shape() {
        return Err(TensorError::ShapeMismatch {
            op: "batch_norm (input vs output)",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }

    let dims = input.shape().dims();
    if dims.len() < 2 {
        return Err(TensorError::ShapeMismatch {
            op: "batch_norm (rank < 2)",
            lhs: input.shape().clone(),
            rhs: gamma.shape().clone(),
        });
    }
    let channels = dims[1];
    for stat in [gamma, beta, mean, var] {
        if stat.shape().num_elements() != channels {
            return Err(TensorError::ShapeMismatch {
                op: "batch_norm (statistics)",
                lhs: input.shape().clone(),
                rhs: stat.shape().clone(),
            });
        }
    }

    let inner: usize = dims[2..].iter().product();
    let (g, b, m, v) = (
        gamma.as_f32_slice(),
        beta.as_f32_slice(),
        mean.as_f32_slice(),
        var.as_f32_slice(),
    );
    let src = input.as_f32_slice();
    let dst = output.as_f32_slice_mut();

    for (i, (d, &s)) in dst.iter_mut().zip(src).enumerate() {
        let ch = (i / inner.max(1)) % channels;
        let inv_std = 1.0 / (v[ch] + eps).sqrt();
        *d = g[ch] * (s - m[ch]) * inv_std + b[ch];
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    fn vec1(values: &[f32]) -> Tensor {
        Tensor::from_f32(Shape::vector(values.len()), values).unwrap()
    }

    #[test]
    fn test_identity_statistics() {
        let input = Tensor::from_f32(Shape::new(vec![1, 2, 1, 2]), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let (g, b, m, v) = (vec1(&[1.0, 1.0]), vec1(&[0.0, 0.0]), vec1(&[0.0, 0.0]), vec1(&[1.0, 1.0]));
        let mut out = Tensor::zeros(input.shape().clone());
        batch_norm(&input.view(), &g.view(), &b.view(), &m.view(), &v.view(), 0.0, &mut out).unwrap();
        assert_eq!(out.as_f32_slice(), input.as_f32_slice());
    }

    #[test]
    fn test_per_channel_affine() {
        let input = Tensor::from_f32(Shape::new(vec![1, 2, 1, 1]), &[5.0, 5.0]).unwrap();
        // ch0: (5 - 1) / 2 * 3 + 1 = 7;  ch1: (5 - 5) / 1 * 2 - 1 = -1
        let (g, b, m, v) = (vec1(&[3.0, 2.0]), vec1(&[1.0, -1.0]), vec1(&[1.0, 5.0]), vec1(&[4.0, 1.0]));
        let mut out = Tensor::zeros(input.shape().clone());
        batch_norm(&input.view(), &g.view(), &b.view(), &m.view(), &v.view(), 0.0, &mut out).unwrap();
        let r = out.as_f32_slice();
        assert!((r[0] - 7.0).abs() < 1e-6);
        assert!((r[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_statistics_length_mismatch() {
        let input = Tensor::zeros(Shape::new(vec![1, 3, 2, 2]));
        let s = vec1(&[1.0, 1.0]);
        let mut out = Tensor::zeros(input.shape().clone());
        let r = batch_norm(&input.view(), &s.view(), &s.view(), &s.view(), &s.view(), 1e-5, &mut out);
        assert!(r.is_err());
    }
}
