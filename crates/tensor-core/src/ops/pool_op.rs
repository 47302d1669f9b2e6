// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pooling and flattening over NCHW activations.

use crate::{Shape, Tensor, TensorError, TensorView};

/// Hyper-parameters of a 2-D pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Pool2dParams {
    /// Window size, `[vertical, horizontal]`.
    pub kernel: [usize; 2],
    /// Window step, `[vertical, horizontal]`.
    pub stride: [usize; 2],
    /// Padding added to each side (padded cells never win the max).
    pub padding: [usize; 2],
}

impl Pool2dParams {
    /// Computes the output shape for an `[N, C, H, W]` input.
    pub fn output_shape(&self, input: &Shape) -> Result<Shape, TensorError> {
        let (n, c, h, w) = input.nchw().ok_or_else(|| TensorError::ShapeMismatch {
            op: "max_pool2d (input rank)",
            lhs: input.clone(),
            rhs: Shape::new(self.kernel.to_vec()),
        })?;
        if self.kernel.contains(&0) || self.stride.contains(&0) {
            return Err(TensorError::InvalidParameter {
                op: "max_pool2d",
                detail: format!(
                    "kernel {:?} and stride {:?} must be non-zero",
                    self.kernel, self.stride
                ),
            });
        }
        let pad = |extent: usize, p: usize| p.checked_mul(2).and_then(|p| p.checked_add(extent));
        let (Some(padded_h), Some(padded_w)) = (pad(h, self.padding[0]), pad(w, self.padding[1]))
        else {
            return Err(TensorError::InvalidParameter {
                op: "max_pool2d",
                detail: format!("padding {:?} is too large", self.padding),
            });
        };
        if padded_h < self.kernel[0] || padded_w < self.kernel[1] {
            return Err(TensorError::ShapeMismatch {
                op: "max_pool2d (window larger than input)",
                lhs: input.clone(),
                rhs: Shape::new(self.kernel.to_vec()),
            });
        }
        let out = Shape::new(vec![
            n,
            c,
            (padded_h - self.kernel[0]) / self.stride[0] + 1,
            (padded_w - self.kernel[1]) / self.stride[1] + 1,
        ]);
        if out.checked_size_bytes(crate::DType::F32).is_none() {
            return Err(TensorError::Overflow(out));
        }
        Ok(out)
    }
}

/// Max pooling over each channel independently.
pub fn max_pool2d(input: &TensorView<'_>, params: &Pool2dParams) -> Result<Tensor, TensorError> {
    let out_shape = params.output_shape(input.shape())?;
    let (n, c, h, w) = input.shape().nchw().unwrap_or_default();
    let (_, _, out_h, out_w) = out_shape.nchw().unwrap_or_default();

    let x = input.as_f32_slice();
    let mut out = Tensor::zeros(out_shape);
    let y = out.as_f32_slice_mut();

    for plane in 0..n * c {
        let src = &x[plane * h * w..(plane + 1) * h * w];
        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut best = f32::NEG_INFINITY;
                for ky in 0..params.kernel[0] {
                    let iy = (oy * params.stride[0] + ky) as isize - params.padding[0] as isize;
                    if iy < 0 || iy >= h as isize {
                        continue;
                    }
                    for kx in 0..params.kernel[1] {
                        let ix = (ox * params.stride[1] + kx) as isize - params.padding[1] as isize;
                        if ix < 0 || ix >= w as isize {
                            continue;
                        }
                        best = best.max(src[iy as usize * w + ix as usize]);
                    }
                }
                y[(plane * out_h + oy) * out_w + ox] = best;
            }
        }
    }

    Ok(out)
}

/// Averages each channel plane, producing `[N, C, 1, 1]`.
pub fn global_avg_pool(input: &TensorView<'_>) -> Result<Tensor, TensorError> {
    let (n, c, h, w) = input.shape().nchw().ok_or_else(|| TensorError::ShapeMismatch {
        op: "global_avg_pool (input rank)",
        lhs: input.shape().clone(),
        rhs: Shape::new(vec![0, 0, 0, 0]),
    })?;
    if h * w == 0 {
        return Err(TensorError::InvalidParameter {
            op: "global_avg_pool",
            detail: "empty spatial plane".into(),
        });
    }
    let x = input.as_f32_slice();
    let area = (h * w) as f32;
    let values = x
        .chunks(h * w)
        .take(n * c)
        .map(|plane| plane.iter().sum::<f32>() / area)
        .collect();
    Tensor::from_vec(Shape::new(vec![n, c, 1, 1]), values)
}

/// Collapses every dimension after the first: `[N, ...] → [N, prod(...)]`.
pub fn flatten(input: &TensorView<'_>) -> Result<Tensor, TensorError> {
    let dims = input.shape().dims();
    if dims.is_empty() {
        return Err(TensorError::ShapeMismatch {
            op: "flatten (scalar input)",
            lhs: input.shape().clone(),
            rhs: Shape::vector(1),
        });
    }
    let n = dims[0];
    let rest = dims[1..].iter().product();
    Tensor::from_f32(Shape::matrix(n, rest), input.as_f32_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pool_2x2() {
        let input = Tensor::from_f32(
            Shape::new(vec![1, 1, 2, 4]),
            &[1.0, 5.0, 2.0, 0.0, 3.0, 4.0, 9.0, 8.0],
        )
        .unwrap();
        let p = Pool2dParams {
            kernel: [2, 2],
            stride: [2, 2],
            padding: [0, 0],
        };
        let out = max_pool2d(&input.view(), &p).unwrap();
        assert_eq!(out.shape().dims(), &[1, 1, 1, 2]);
        assert_eq!(out.as_f32_slice(), &[5.0, 9.0]);
    }

    #[test]
    fn test_max_pool_padding_never_wins() {
        let input = Tensor::from_f32(Shape::new(vec![1, 1, 1, 1]), &[-3.0]).unwrap();
        let p = Pool2dParams {
            kernel: [3, 3],
            stride: [1, 1],
            padding: [1, 1],
        };
        let out = max_pool2d(&input.view(), &p).unwrap();
        assert_eq!(out.as_f32_slice(), &[-3.0]);
    }

    #[test]
    fn test_huge_padding_rejected() {
        let p = Pool2dParams {
            kernel: [1, 1],
            stride: [1, 1],
            padding: [0, usize::MAX / 2],
        };
        let r = p.output_shape(&Shape::new(vec![1, 1, 2, 2]));
        assert!(matches!(r, Err(TensorError::InvalidParameter { .. })));
    }

    #[test]
    fn test_global_avg_pool() {
        let input = Tensor::from_f32(
            Shape::new(vec![1, 2, 2, 1]),
            &[1.0, 3.0, 10.0, 20.0],
        )
        .unwrap();
        let out = global_avg_pool(&input.view()).unwrap();
        assert_eq!(out.shape().dims(), &[1, 2, 1, 1]);
        assert_eq!(out.as_f32_slice(), &[2.0, 15.0]);
    }

    #[test]
    fn test_flatten() {
        let input = Tensor::zeros(Shape::new(vec![2, 4, 1, 1]));
        let out = flatten(&input.view()).unwrap();
        assert_eq!(out.shape(), &Shape::matrix(2, 4));
    }

    #[test]
    fn test_global_avg_pool_rejects_matrix() {
        let input = Tensor::zeros(Shape::matrix(2, 4));
        assert!(global_avg_pool(&input.view()).is_err());
    }
}
