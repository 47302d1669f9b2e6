// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Input shape descriptors and input specifications.
//!
//! A [`ShapeDescriptor`] drives both the synthetic trace input and the
//! compiled input declaration. An [`InputSpec`] tells the deployment
//! runtime how to feed the model: either as an image with preprocessing
//! folded into `scale` and `bias`, or as a plain tensor.

use crate::ConvertError;
use tensor_core::{DType, Shape, Tensor};

/// ImageNet per-channel mean (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet per-channel standard deviation (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Declared `(N, C, H, W)` input shape and element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ShapeDescriptor {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
}

fn default_dtype() -> DType {
    DType::F32
}

impl ShapeDescriptor {
    /// Creates an `f32` descriptor.
    ///
    /// # Errors
    /// [`ConvertError::Precondition`] if any dimension is zero.
    pub fn new(batch: usize, channels: usize, height: usize, width: usize) -> Result<Self, ConvertError> {
        let d = Self {
            batch,
            channels,
            height,
            width,
            dtype: DType::F32,
        };
        d.check()?;
        Ok(d)
    }

    /// Builds a descriptor from `[N, C, H, W]`.
    pub fn from_dims(dims: &[usize]) -> Result<Self, ConvertError> {
        match *dims {
            [n, c, h, w] => Self::new(n, c, h, w),
            _ => Err(ConvertError::Precondition(format!(
                "input shape must have four dimensions (N, C, H, W), got {dims:?}"
            ))),
        }
    }

    /// Checks the dimension invariants (useful after deserializing).
    pub fn check(&self) -> Result<(), ConvertError> {
        if self.dims().contains(&0) {
            return Err(ConvertError::Precondition(format!(
                "input shape {} has a zero dimension",
                self.shape()
            )));
        }
        Ok(())
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.dims().to_vec())
    }
}

impl std::fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}x{}x{} ({})",
            self.batch, self.channels, self.height, self.width, self.dtype
        )
    }
}

/// Per-channel normalization a model was trained with:
/// `normalized = (pixel / 255 - mean) / std`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl Normalization {
    pub fn check(&self) -> Result<(), ConvertError> {
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ConvertError::Config(format!(
                "normalization std must be positive, got {:?}",
                self.std
            )));
        }
        Ok(())
    }
}

/// Channel order of image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorLayout {
    #[default]
    Rgb,
    Bgr,
    Grayscale,
}

impl ColorLayout {
    pub fn channels(self) -> usize {
        match self {
            ColorLayout::Rgb | ColorLayout::Bgr => 3,
            ColorLayout::Grayscale => 1,
        }
    }
}

/// How the deployed model receives its input.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSpec {
    /// 8-bit image; the runtime computes `pixel * scale + bias[channel]`.
    Image {
        name: String,
        shape: Shape,
        color_layout: ColorLayout,
        scale: f32,
        bias: Vec<f32>,
    },
    /// Raw tensor fed as-is.
    Tensor {
        name: String,
        shape: Shape,
        dtype: DType,
    },
}

impl InputSpec {
    /// Image input with normalization folded into `scale` and `bias`.
    ///
    /// `scale` is `1/255` and `bias[c]` is `-mean[c] / std[c]`. The runtime
    /// therefore feeds `pixel / 255 - mean / std`; dividing the `pixel / 255`
    /// term by `std` as well is left to the model.
    ///
    /// BGR input reverses the statistics; grayscale uses their average.
    ///
    /// # Errors
    /// - [`ConvertError::ShapeMismatch`] if the descriptor's channel count
    ///   does not match the color layout.
    /// - [`ConvertError::Config`] if a std entry is not positive.
    pub fn image(
        name: impl Into<String>,
        descriptor: &ShapeDescriptor,
        normalization: &Normalization,
        color_layout: ColorLayout,
    ) -> Result<Self, ConvertError> {
        normalization.check()?;
        if descriptor.channels != color_layout.channels() {
            return Err(ConvertError::ShapeMismatch(format!(
                "{color_layout:?} image input needs {} channels, descriptor declares {}",
                color_layout.channels(),
                descriptor.channels
            )));
        }

        let per_channel: Vec<f32> = normalization
            .mean
            .iter()
            .zip(&normalization.std)
            .map(|(m, s)| -m / s)
            .collect();
        let bias = match color_layout {
            ColorLayout::Rgb => per_channel,
            ColorLayout::Bgr => per_channel.into_iter().rev().collect(),
            ColorLayout::Grayscale => vec![per_channel.iter().sum::<f32>() / 3.0],
        };

        Ok(Self::Image {
            name: name.into(),
            shape: descriptor.shape(),
            color_layout,
            scale: 1.0 / 255.0,
            bias,
        })
    }

    /// Plain tensor input.
    pub fn tensor(name: impl Into<String>, descriptor: &ShapeDescriptor) -> Self {
        Self::Tensor {
            name: name.into(),
            shape: descriptor.shape(),
            dtype: descriptor.dtype,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Image { name, .. } | Self::Tensor { name, .. } => name,
        }
    }

    pub fn shape(&self) -> &Shape {
        match self {
            Self::Image { shape, .. } | Self::Tensor { shape, .. } => shape,
        }
    }

    /// Applies the preprocessing the runtime performs to raw input.
    ///
    /// For image input `pixels` are `[N, C, H, W]` values in `0..=255`.
    /// Tensor input is returned unchanged.
    pub fn preprocess(&self, pixels: &Tensor) -> Result<Tensor, ConvertError> {
        let Self::Image {
            shape, scale, bias, ..
        } = self
        else {
            return Ok(pixels.clone());
        };
        if pixels.shape() != shape {
            return Err(ConvertError::ShapeMismatch(format!(
                "expected pixels of shape {shape}, got {}",
                pixels.shape()
            )));
        }
        let plane: usize = shape.dims()[2..].iter().product();
        let mut out = pixels.clone();
        for (i, v) in out.as_f32_slice_mut().iter_mut().enumerate() {
            let channel = (i / plane.max(1)) % bias.len();
            *v = *v * scale + bias[channel];
        }
        Ok(out)
    }
}
