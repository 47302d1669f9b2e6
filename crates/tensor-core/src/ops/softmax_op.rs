// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax over class scores.

use crate::{Tensor, TensorError, TensorView};

/// Normalizes each row of the last axis into probabilities.
///
/// The row maximum is subtracted before exponentiation so large logits
/// stay finite. A scalar input maps to `1.0`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if `output` is not shaped like
/// `input`.
pub fn softmax(input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    if input.shape() != output.shape() {
        return Err(TensorError::ShapeMismatch {
            op: "softmax",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }

    let width = input.shape().last_dim().unwrap_or(1);
    if width == 0 {
        return Ok(());
    }

    let rows = input.as_f32_slice().chunks_exact(width);
    for (logits, probs) in rows.zip(output.as_f32_slice_mut().chunks_exact_mut(width)) {
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        for (p, &l) in probs.iter_mut().zip(logits) {
            *p = (l - max).exp();
        }
        let total: f32 = probs.iter().sum();
        if total > 0.0 {
            probs.iter_mut().for_each(|p| *p /= total);
        }
    }
    Ok(())
}
