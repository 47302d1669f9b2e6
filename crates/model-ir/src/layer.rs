// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer definitions of a source model.
//!
//! A [`LayerDef`] is what the architecture manifest says about one layer:
//! its name, the kind of computation and the checkpoint tensors it reads.
//! Weight data lives next to it in [`SequentialModel`](crate::SequentialModel).

use crate::manifest::ManifestLayer;
use crate::ModelError;
use std::ops::RangeInclusive;
use tensor_core::{Activation, Conv2dParams, Pool2dParams};

/// Default batch-norm epsilon used by common training frameworks.
pub const DEFAULT_BN_EPSILON: f32 = 1e-5;

/// The type of computation a source layer performs.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerType {
    /// Grouped 2-D convolution (weight, optional bias).
    Conv2d(Conv2dParams),
    /// Fully-connected layer (weight `[out, in]`, optional bias).
    Linear,
    /// Batch normalization (gamma, beta, running mean, running var).
    BatchNorm { epsilon: f32 },
    /// Element-wise activation.
    Activation(Activation),
    /// Max pooling.
    MaxPool2d(Pool2dParams),
    /// Adaptive average pooling to `1x1`.
    GlobalAvgPool,
    /// `[N, ...] → [N, prod(...)]`.
    Flatten,
    /// Softmax over the last dimension.
    Softmax,
    /// Dropout; an identity outside of training.
    Dropout,
    /// A layer type the tracer has no equivalent for.
    Custom(String),
}

impl LayerType {
    /// Builds a layer type from a manifest entry.
    ///
    /// Layer type strings are matched loosely (`"conv"`, `"Conv2d"`,
    /// `"bn"`, `"fc"`...). Unknown strings become [`LayerType::Custom`].
    pub fn from_manifest(layer: &ManifestLayer) -> Result<Self, ModelError> {
        let layer_type = match layer.layer_type.to_lowercase().as_str() {
            "conv2d" | "conv" => Self::Conv2d(Conv2dParams {
                stride: layer.stride.unwrap_or([1, 1]),
                padding: layer.padding.unwrap_or([0, 0]),
                groups: layer.groups.unwrap_or(1),
            }),
            "linear" | "fc" | "dense" => Self::Linear,
            "batch_norm" | "batchnorm" | "batchnorm2d" | "bn" => Self::BatchNorm {
                epsilon: layer.eps.unwrap_or(DEFAULT_BN_EPSILON),
            },
            "relu" => Self::Activation(Activation::Relu),
            "relu6" => Self::Activation(Activation::Relu6),
            "sigmoid" => Self::Activation(Activation::Sigmoid),
            "hard_swish" | "hardswish" => Self::Activation(Activation::HardSwish),
            "max_pool2d" | "maxpool2d" | "maxpool" => {
                let kernel = layer.kernel_size.ok_or_else(|| ModelError::InvalidLayer {
                    layer: layer.name.clone(),
                    detail: "max pooling requires 'kernel_size'".into(),
                })?;
                Self::MaxPool2d(Pool2dParams {
                    kernel,
                    stride: layer.stride.unwrap_or(kernel),
                    padding: layer.padding.unwrap_or([0, 0]),
                })
            }
            "adaptive_avg_pool" | "global_avg_pool" | "avgpool" => Self::GlobalAvgPool,
            "flatten" => Self::Flatten,
            "softmax" => Self::Softmax,
            "dropout" => Self::Dropout,
            _ => Self::Custom(layer.layer_type.clone()),
        };
        Ok(layer_type)
    }

    /// Number of checkpoint tensors this layer type accepts.
    pub fn weight_arity(&self) -> RangeInclusive<usize> {
        match self {
            Self::Conv2d(_) | Self::Linear => 1..=2,
            Self::BatchNorm { .. } => 4..=4,
            Self::Custom(_) => 0..=usize::MAX,
            _ => 0..=0,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Conv2d(_) => "conv2d",
            Self::Linear => "linear",
            Self::BatchNorm { .. } => "batch_norm",
            Self::Activation(a) => a.as_str(),
            Self::MaxPool2d(_) => "max_pool2d",
            Self::GlobalAvgPool => "global_avg_pool",
            Self::Flatten => "flatten",
            Self::Softmax => "softmax",
            Self::Dropout => "dropout",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata describing a single layer of a source model.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDef {
    /// Unique identifier for this layer (e.g., `"features.0.0"`).
    pub name: String,
    /// The type of computation this layer performs.
    pub layer_type: LayerType,
    /// Names of the checkpoint tensors this layer reads, in order.
    pub weight_names: Vec<String>,
}

impl LayerDef {
    pub fn new(name: impl Into<String>, layer_type: LayerType) -> Self {
        Self {
            name: name.into(),
            layer_type,
            weight_names: Vec::new(),
        }
    }

    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        format!(
            "{} ({}), {} weight tensors",
            self.name,
            self.layer_type,
            self.weight_names.len()
        )
    }
}
