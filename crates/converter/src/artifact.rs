// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compiled deployment artifacts.
//!
//! An artifact is a single SafeTensors container: weights as tensors, and a
//! JSON header carrying the graph topology, input specification, classifier
//! labels, target options, applied passes and metadata.

use crate::config::CompileOptions;
use crate::input::InputSpec;
use crate::labels::ClassLabels;
use crate::{persist, ConvertError};
use model_ir::graph::Validated;
use model_ir::{container, Graph, Topology};
use std::fmt;
use std::path::Path;

/// Container kind tag for artifacts.
pub const ARTIFACT_KIND: &str = "modelport.artifact";
/// Current artifact header version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Descriptive metadata attached by the annotator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArtifactMetadata {
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    pub description: String,
    pub version: String,
}

/// A model compiled for deployment.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
    /// Model name.
    pub name: String,
    pub graph: Graph<Validated>,
    pub input: InputSpec,
    /// Bound classifier labels, in output order.
    pub labels: Option<ClassLabels>,
    pub options: CompileOptions,
    /// Lowering passes that rewrote the graph, in order.
    pub passes: Vec<String>,
    /// `None` until the artifact has been annotated.
    pub metadata: Option<ArtifactMetadata>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ArtifactHeader {
    version: u32,
    name: String,
    graph: Topology,
    input: InputSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    labels: Option<ClassLabels>,
    options: CompileOptions,
    #[serde(default)]
    passes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<ArtifactMetadata>,
}

impl CompiledArtifact {
    /// Width of the graph output's last axis.
    pub fn output_width(&self) -> usize {
        self.graph.output.shape.last_dim().unwrap_or(0)
    }

    /// Encodes the artifact. Equal artifacts encode to equal bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ConvertError> {
        let header = ArtifactHeader {
            version: ARTIFACT_VERSION,
            name: self.name.clone(),
            graph: self.graph.topology(),
            input: self.input.clone(),
            labels: self.labels.clone(),
            options: self.options,
            passes: self.passes.clone(),
            metadata: self.metadata.clone(),
        };
        let json = serde_json::to_string(&header)
            .map_err(|e| ConvertError::Model(e.into()))?;
        Ok(container::encode(ARTIFACT_KIND, &json, &self.graph.params)?)
    }

    /// Decodes and re-validates an artifact.
    pub fn decode(bytes: &[u8]) -> Result<Self, ConvertError> {
        let (json, params) = container::decode(bytes, ARTIFACT_KIND)?;
        Self::from_parts(&json, params)
    }

    /// Writes the artifact to `path` (see [`persist::write_atomic`]).
    pub fn save(&self, path: &Path) -> Result<(), ConvertError> {
        persist::write_atomic(path, &self.encode()?)
    }

    /// Reads an artifact from `path`.
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let (json, params) = container::decode_file(path, ARTIFACT_KIND)?;
        Self::from_parts(&json, params)
    }

    fn from_parts(
        json: &str,
        params: std::collections::BTreeMap<String, tensor_core::Tensor>,
    ) -> Result<Self, ConvertError> {
        let header: ArtifactHeader = serde_json::from_str(json)
            .map_err(|e| ConvertError::MalformedGraph(format!("artifact header: {e}")))?;
        if header.version != ARTIFACT_VERSION {
            return Err(ConvertError::MalformedGraph(format!(
                "unsupported artifact version {} (expected {ARTIFACT_VERSION})",
                header.version
            )));
        }
        let graph = Graph::from_topology(header.graph, params).validate()?;
        Ok(Self {
            name: header.name,
            graph,
            input: header.input,
            labels: header.labels,
            options: header.options,
            passes: header.passes,
            metadata: header.metadata,
        })
    }
}

impl fmt::Display for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Artifact '{}'", self.name)?;
        writeln!(
            f,
            "  target {} | compute units {} | format {} | precision {}",
            self.options.target, self.options.compute_units, self.options.format, self.options.precision
        )?;
        match &self.input {
            InputSpec::Image {
                name,
                shape,
                color_layout,
                scale,
                bias,
            } => writeln!(
                f,
                "  input '{name}' image {shape} {color_layout:?} scale={scale:.6} bias={bias:?}"
            )?,
            InputSpec::Tensor { name, shape, dtype } => {
                writeln!(f, "  input '{name}' tensor {shape} {dtype}")?
            }
        }
        writeln!(
            f,
            "  output '{}' {}",
            self.graph.output.name, self.graph.output.shape
        )?;
        if let Some(labels) = &self.labels {
            let preview: Vec<&str> = labels.iter().take(5).collect();
            let more = if labels.len() > 5 { ", ..." } else { "" };
            writeln!(f, "  labels ({}): {}{more}", labels.len(), preview.join(", "))?;
        }
        if !self.passes.is_empty() {
            writeln!(f, "  passes: {}", self.passes.join(", "))?;
        }
        if let Some(m) = &self.metadata {
            writeln!(
                f,
                "  metadata: author={} license={} version={}",
                m.author,
                m.license.as_deref().unwrap_or("-"),
                m.version
            )?;
            writeln!(f, "  description: {}", m.description)?;
        }
        write!(f, "{}", self.graph)
    }
}
