// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the conversion pipeline.

use model_ir::ModelError;
use std::fmt;
use std::path::PathBuf;

/// Errors that can end a conversion. None of them is retried.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The source model performs an operation with no traceable equivalent.
    #[error("unsupported operation '{op}' in layer '{layer}'")]
    UnsupportedOperation { layer: String, op: String },

    /// A declared shape does not fit the model.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The exchange file (or a decoded graph) is structurally invalid.
    #[error("malformed graph: {0}")]
    MalformedGraph(String),

    /// The number of class labels differs from the classifier output width.
    #[error("{labels} class labels given but the model produces {outputs} outputs")]
    LabelCountMismatch { labels: usize, outputs: usize },

    /// The requested deployment target / compute units / format combination
    /// is not supported.
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    /// A file could not be read or written.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A precondition of the pipeline does not hold.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Job configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Loading a checkpoint or bundle failed.
    #[error("model error: {0}")]
    Model(#[source] ModelError),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ModelError> for ConvertError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::UnsupportedOperation { layer, op } => Self::UnsupportedOperation { layer, op },
            ModelError::ShapeMismatch { .. } => Self::ShapeMismatch(e.to_string()),
            ModelError::InvalidGraph(detail) => Self::MalformedGraph(detail),
            ModelError::Io { path, source } => Self::Io { path, source },
            other => Self::Model(other),
        }
    }
}

/// Pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Loading the source model or bundle.
    Load,
    Export,
    Validate,
    Compile,
    Annotate,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Load => "load",
            Stage::Export => "export",
            Stage::Validate => "validate",
            Stage::Compile => "compile",
            Stage::Annotate => "annotate",
            Stage::Persist => "persist",
        };
        f.write_str(s)
    }
}

/// A conversion failure, naming the model and the stage that failed.
#[derive(Debug, thiserror::Error)]
#[error("converting '{model}' failed during {stage}: {source}")]
pub struct ConversionFailure {
    pub model: String,
    pub stage: Stage,
    #[source]
    pub source: ConvertError,
}

impl ConversionFailure {
    pub fn new(model: impl Into<String>, stage: Stage, source: impl Into<ConvertError>) -> Self {
        Self {
            model: model.into(),
            stage,
            source: source.into(),
        }
    }
}
