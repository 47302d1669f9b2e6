// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON architecture manifest parsing.
//!
//! The manifest (`architecture.json`) describes a source model as an ordered
//! list of layers and maps each layer to the weight tensors it reads from
//! the SafeTensors checkpoint.
//!
//! # Format
//! ```json
//! {
//!   "name": "mobilenet_v2",
//!   "architecture": "mobilenet",
//!   "dtype": "f32",
//!   "layers": [
//!     {
//!       "name": "features.0.0",
//!       "layer_type": "conv2d",
//!       "weights": ["features.0.0.weight"],
//!       "stride": [2, 2],
//!       "padding": [1, 1]
//!     },
//!     { "name": "features.0.1", "layer_type": "batch_norm", "weights": ["..."] },
//!     ...
//!   ]
//! }
//! ```
//!
//! Layer types the manifest does not recognise are kept as
//! [`LayerType::Custom`](crate::LayerType::Custom); they load fine and only
//! fail once a trace reaches them.

use crate::{LayerType, ModelError};
use std::collections::HashSet;
use std::path::Path;
use tensor_core::DType;

/// Top-level architecture manifest, deserialized from JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    /// Human-readable model name (e.g., `"mobilenet_v2"`).
    pub name: String,
    /// Architecture family (e.g., `"resnet"`, `"mobilenet"`).
    #[serde(default)]
    pub architecture: String,
    /// Data type of the checkpoint weights.
    #[serde(default = "default_dtype")]
    pub dtype: String,
    /// Layers in execution order.
    pub layers: Vec<ManifestLayer>,
}

fn default_dtype() -> String {
    "f32".to_string()
}

/// A single layer entry in the manifest.
///
/// Hyper-parameters are optional; each layer type picks the ones it needs
/// and falls back to the usual framework defaults.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ManifestLayer {
    /// Layer name (e.g., `"features.3.conv.0"`).
    pub name: String,
    /// Layer type string (e.g., `"conv2d"`, `"relu6"`).
    pub layer_type: String,
    /// Weight tensor names in the checkpoint, in the order the layer expects.
    #[serde(default)]
    pub weights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_size: Option<[usize; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<[usize; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<[usize; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<usize>,
    /// Batch-norm epsilon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eps: Option<f32>,
}

impl ModelManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Validates that the manifest is internally consistent.
    ///
    /// Checks:
    /// - At least one layer is defined.
    /// - The dtype is `f32` (the tracer computes in single precision).
    /// - No duplicate layer names.
    /// - Every recognised layer lists a plausible number of weights and
    ///   well-formed hyper-parameters.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::InvalidGraph("manifest contains no layers".into()));
        }

        match DType::from_str_loose(&self.dtype) {
            Some(DType::F32) => {}
            _ => {
                return Err(ModelError::InvalidLayer {
                    layer: self.name.clone(),
                    detail: format!("unsupported checkpoint dtype '{}'", self.dtype),
                })
            }
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.name.as_str()) {
                return Err(ModelError::InvalidLayer {
                    layer: layer.name.clone(),
                    detail: "duplicate layer name".into(),
                });
            }
            let layer_type = LayerType::from_manifest(layer)?;
            let arity = layer_type.weight_arity();
            if !arity.contains(&layer.weights.len()) {
                return Err(ModelError::InvalidLayer {
                    layer: layer.name.clone(),
                    detail: format!(
                        "{layer_type} takes {}..={} weight tensors, manifest lists {}",
                        arity.start(),
                        arity.end(),
                        layer.weights.len()
                    ),
                });
            }
        }

        Ok(())
    }
}
