// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! 2-D convolution over NCHW activations.

use crate::{Shape, Tensor, TensorError, TensorView};

/// Hyper-parameters of a 2-D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Conv2dParams {
    /// Step between kernel applications, `[vertical, horizontal]`.
    pub stride: [usize; 2],
    /// Zero padding added to each side, `[vertical, horizontal]`.
    pub padding: [usize; 2],
    /// Number of channel groups (`in_channels` for depthwise convolution).
    pub groups: usize,
}

impl Default for Conv2dParams {
    fn default() -> Self {
        Self {
            stride: [1, 1],
            padding: [0, 0],
            groups: 1,
        }
    }
}

impl Conv2dParams {
    /// Computes the output shape for `input` `[N, C, H, W]` and `weight`
    /// `[O, C / groups, KH, KW]`.
    pub fn output_shape(&self, input: &Shape, weight: &Shape) -> Result<Shape, TensorError> {
        let (n, c, h, w) = input.nchw().ok_or_else(|| TensorError::ShapeMismatch {
            op: "conv2d (input rank)",
            lhs: input.clone(),
            rhs: weight.clone(),
        })?;
        let (o, c_per_group, kh, kw) = weight.nchw().ok_or_else(|| TensorError::ShapeMismatch {
            op: "conv2d (weight rank)",
            lhs: input.clone(),
            rhs: weight.clone(),
        })?;

        if self.groups == 0 || self.stride[0] == 0 || self.stride[1] == 0 {
            return Err(TensorError::InvalidParameter {
                op: "conv2d",
                detail: format!("stride {:?} and groups {} must be non-zero", self.stride, self.groups),
            });
        }
        if c % self.groups != 0 || o % self.groups != 0 || c / self.groups != c_per_group {
            return Err(TensorError::ShapeMismatch {
                op: "conv2d (channels)",
                lhs: input.clone(),
                rhs: weight.clone(),
            });
        }

        let pad = |extent: usize, p: usize| p.checked_mul(2).and_then(|p| p.checked_add(extent));
        let (Some(padded_h), Some(padded_w)) = (pad(h, self.padding[0]), pad(w, self.padding[1]))
        else {
            return Err(TensorError::InvalidParameter {
                op: "conv2d",
                detail: format!("padding {:?} is too large", self.padding),
            });
        };
        if padded_h < kh || padded_w < kw {
            return Err(TensorError::ShapeMismatch {
                op: "conv2d (kernel larger than input)",
                lhs: input.clone(),
                rhs: weight.clone(),
            });
        }

        let out_h = (padded_h - kh) / self.stride[0] + 1;
        let out_w = (padded_w - kw) / self.stride[1] + 1;
        let out = Shape::new(vec![n, o, out_h, out_w]);
        if out.checked_size_bytes(crate::DType::F32).is_none() {
            return Err(TensorError::Overflow(out));
        }
        Ok(out)
    }
}

/// Applies a grouped 2-D convolution with optional bias.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the input channel count does
/// not match the weight, or the bias length differs from the output
/// channel count.
pub fn conv2d(
    input: &TensorView<'_>,
    weight: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    params: &Conv2dParams,
) -> Result<Tensor, TensorError> {
    let out_shape = params.output_shape(input.shape(), weight.shape())?;
    let (n, c, h, w) = input.shape().nchw().unwrap_or_default();
    let (o, cg, kh, kw) = weight.shape().nchw().unwrap_or_default();
    let (_, _, out_h, out_w) = out_shape.nchw().unwrap_or_default();

    if let Some(b) = bias {
        if b.shape().num_elements() != o {
            return Err(TensorError::ShapeMismatch {
                op: "conv2d (bias)",
                lhs: Shape::vector(o),
                rhs: b.shape().clone(),
            });
        }
    }

    let x = input.as_f32_slice();
    let k = weight.as_f32_slice();
    let bias = bias.map(|b| b.as_f32_slice());
    let mut out = Tensor::zeros(out_shape);
    let y = out.as_f32_slice_mut();

    let out_per_group = o / params.groups;
    let [sh, sw] = params.stride;
    let [ph, pw] = params.padding;

    for batch in 0..n {
        for oc in 0..o {
            let group = oc / out_per_group;
            let init = bias.map_or(0.0, |b| b[oc]);
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = init;
                    for icg in 0..cg {
                        let ic = group * cg + icg;
                        for ky in 0..kh {
                            let iy = (oy * sh + ky) as isize - ph as isize;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            for kx in 0..kw {
                                let ix = (ox * sw + kx) as isize - pw as isize;
                                if ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                let xi = ((batch * c + ic) * h + iy as usize) * w + ix as usize;
                                let ki = ((oc * cg + icg) * kh + ky) * kw + kx;
                                acc += x[xi] * k[ki];
                            }
                        }
                    }
                    y[((batch * o + oc) * out_h + oy) * out_w + ox] = acc;
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape_same_padding() {
        let p = Conv2dParams {
            stride: [1, 1],
            padding: [1, 1],
            groups: 1,
        };
        let s = p
            .output_shape(&Shape::new(vec![1, 3, 8, 8]), &Shape::new(vec![4, 3, 3, 3]))
            .unwrap();
        assert_eq!(s.dims(), &[1, 4, 8, 8]);
    }

    #[test]
    fn test_output_shape_strided() {
        let p = Conv2dParams {
            stride: [2, 2],
            padding: [1, 1],
            groups: 1,
        };
        let s = p
            .output_shape(&Shape::new(vec![2, 3, 224, 224]), &Shape::new(vec![16, 3, 3, 3]))
            .unwrap();
        assert_eq!(s.dims(), &[2, 16, 112, 112]);
    }

    #[test]
    fn test_channel_mismatch() {
        let p = Conv2dParams::default();
        let r = p.output_shape(&Shape::new(vec![1, 1, 8, 8]), &Shape::new(vec![4, 3, 3, 3]));
        assert!(matches!(r, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_zero_stride_rejected() {
        let p = Conv2dParams {
            stride: [0, 1],
            ..Default::default()
        };
        let r = p.output_shape(&Shape::new(vec![1, 1, 4, 4]), &Shape::new(vec![1, 1, 1, 1]));
        assert!(matches!(r, Err(TensorError::InvalidParameter { .. })));
    }

    #[test]
    fn test_huge_padding_rejected() {
        let p = Conv2dParams {
            padding: [usize::MAX / 2, 0],
            ..Default::default()
        };
        let r = p.output_shape(&Shape::new(vec![1, 1, 4, 4]), &Shape::new(vec![1, 1, 1, 1]));
        assert!(matches!(r, Err(TensorError::InvalidParameter { .. })));

        let p = Conv2dParams {
            padding: [1 << 30, 1 << 30],
            ..Default::default()
        };
        let r = p.output_shape(&Shape::new(vec![1, 1, 4, 4]), &Shape::new(vec![1, 1, 1, 1]));
        assert!(matches!(r, Err(TensorError::Overflow(_))));
    }

    #[test]
    fn test_conv_1x1_is_channel_mix() {
        // Two input channels, one output channel: y = 2*a + 3*b + 1.
        let input = Tensor::from_f32(
            Shape::new(vec![1, 2, 1, 2]),
            &[1.0, 2.0, 10.0, 20.0],
        )
        .unwrap();
        let weight = Tensor::from_f32(Shape::new(vec![1, 2, 1, 1]), &[2.0, 3.0]).unwrap();
        let bias = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();

        let out = conv2d(
            &input.view(),
            &weight.view(),
            Some(&bias.view()),
            &Conv2dParams::default(),
        )
        .unwrap();
        assert_eq!(out.shape().dims(), &[1, 1, 1, 2]);
        assert_eq!(out.as_f32_slice(), &[33.0, 65.0]);
    }

    #[test]
    fn test_conv_3x3_padding_sums_neighbourhood() {
        let input = Tensor::from_f32(Shape::new(vec![1, 1, 2, 2]), &[1.0; 4]).unwrap();
        let weight = Tensor::from_f32(Shape::new(vec![1, 1, 3, 3]), &[1.0; 9]).unwrap();
        let p = Conv2dParams {
            padding: [1, 1],
            ..Default::default()
        };
        let out = conv2d(&input.view(), &weight.view(), None, &p).unwrap();
        // Every output position sees all four ones.
        assert_eq!(out.as_f32_slice(), &[4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_depthwise() {
        let input = Tensor::from_f32(Shape::new(vec![1, 2, 1, 1]), &[3.0, 5.0]).unwrap();
        let weight = Tensor::from_f32(Shape::new(vec![2, 1, 1, 1]), &[2.0, -1.0]).unwrap();
        let p = Conv2dParams {
            groups: 2,
            ..Default::default()
        };
        let out = conv2d(&input.view(), &weight.view(), None, &p).unwrap();
        assert_eq!(out.as_f32_slice(), &[6.0, -5.0]);
    }

    #[test]
    fn test_bias_length_checked() {
        let input = Tensor::zeros(Shape::new(vec![1, 1, 2, 2]));
        let weight = Tensor::zeros(Shape::new(vec![2, 1, 1, 1]));
        let bias = Tensor::zeros(Shape::vector(3));
        let r = conv2d(&input.view(), &weight.view(), Some(&bias.view()), &Conv2dParams::default());
        assert!(r.is_err());
    }
}
