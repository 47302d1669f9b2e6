// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `modelport export-onnx` command: trace a checkpoint into an ONNX file.

use super::parse_shape;
use converter::{exporter, ExportRoute, ShapeDescriptor};
use model_ir::SourceModel;
use std::path::PathBuf;

pub fn execute(model: PathBuf, shape: String, out: PathBuf) -> anyhow::Result<()> {
    let descriptor = ShapeDescriptor::from_dims(&parse_shape(&shape)?)?;
    let source = model_ir::ModelLoader::load(&model).map_err(|e| {
        anyhow::anyhow!("failed to load model from '{}': {e}", model.display())
    })?;

    let graph = exporter::export(
        &source,
        &descriptor,
        &ExportRoute::ExchangeFormat { path: out.clone() },
    )?;

    println!(
        "Exported {} ({} nodes, {} parameters) to {}",
        source.name(),
        graph.num_nodes(),
        graph.num_parameters(),
        out.display()
    );
    println!("  input  '{}' {} (batch axis dynamic)", graph.input.name, graph.input.shape);
    println!("  output '{}' {}", graph.output.name, graph.output.shape);
    Ok(())
}
