// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for source models, tracing and IR construction.

/// Errors that can occur when working with model representations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A manifest, checkpoint or bundle file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document (manifest or embedded header) is malformed.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A weight tensor referenced by a layer was not found in the checkpoint.
    #[error("weight tensor not found: {name}")]
    WeightNotFound { name: String },

    /// A SafeTensors container could not be decoded or encoded.
    #[error("SafeTensors error: {0}")]
    SafeTensors(String),

    /// A layer definition is invalid (wrong weight count, bad parameters...).
    #[error("invalid layer '{layer}': {detail}")]
    InvalidLayer { layer: String, detail: String },

    /// The graph is structurally malformed.
    #[error("invalid model graph: {0}")]
    InvalidGraph(String),

    /// The model performs an operation the tracer cannot record.
    #[error("layer '{layer}' uses operation '{op}' which has no traceable equivalent")]
    UnsupportedOperation { layer: String, op: String },

    /// A layer rejected the shape of the activation it received.
    #[error("layer '{layer}' rejected its input: {source}")]
    ShapeMismatch {
        layer: String,
        #[source]
        source: tensor_core::TensorError,
    },
}
