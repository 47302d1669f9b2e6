// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Frozen graph bundles.
//!
//! A bundle is an already-traced graph saved as a single file: the
//! topology as JSON in the container header, the parameters as tensors.
//! The converter accepts bundles directly, without tracing or exchange
//! validation.

use crate::graph::{Loaded, Topology, Validated};
use crate::{container, Graph, ModelError};
use std::path::Path;

/// Container kind tag for bundles.
pub const BUNDLE_KIND: &str = "modelport.frozen_graph";

/// Current bundle format version.
pub const BUNDLE_VERSION: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct BundleHeader {
    version: u32,
    graph: Topology,
}

/// Encodes a validated graph as bundle bytes.
pub fn encode(graph: &Graph<Validated>) -> Result<Vec<u8>, ModelError> {
    let header = serde_json::to_string(&BundleHeader {
        version: BUNDLE_VERSION,
        graph: graph.topology(),
    })?;
    container::encode(BUNDLE_KIND, &header, &graph.params)
}

/// Decodes bundle bytes. The result still has to be validated.
pub fn decode(bytes: &[u8]) -> Result<Graph<Loaded>, ModelError> {
    let (header, params) = container::decode(bytes, BUNDLE_KIND)?;
    into_graph(&header, params)
}

/// Writes a bundle to `path`, creating parent directories.
pub fn write(graph: &Graph<Validated>, path: &Path) -> Result<(), ModelError> {
    let bytes = encode(graph)?;
    let io = |source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    std::fs::write(path, bytes).map_err(io)?;
    tracing::info!(graph = %graph.name, path = %path.display(), "wrote frozen graph bundle");
    Ok(())
}

/// Reads and validates a bundle from `path`.
pub fn load(path: &Path) -> Result<Graph<Validated>, ModelError> {
    let (header, params) = container::decode_file(path, BUNDLE_KIND)?;
    into_graph(&header, params)?.validate()
}

fn into_graph(
    header: &str,
    params: std::collections::BTreeMap<String, tensor_core::Tensor>,
) -> Result<Graph<Loaded>, ModelError> {
    let header: BundleHeader = serde_json::from_str(header)?;
    if header.version != BUNDLE_VERSION {
        return Err(ModelError::InvalidGraph(format!(
            "unsupported bundle version {} (expected {BUNDLE_VERSION})",
            header.version
        )));
    }
    Ok(Graph::from_topology(header.graph, params))
}
