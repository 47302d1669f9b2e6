// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `modelport validate` command: structural check of an ONNX file.

use std::path::PathBuf;

pub fn execute(path: PathBuf, batch: usize) -> anyhow::Result<()> {
    super::banner("modelport · Exchange Validator");

    let (graph, report) = converter::validator::validate_file(&path, batch)?;

    println!("  File:     {}", path.display());
    println!("  Producer: {}", report.producer);
    println!("  IR:       v{}", report.ir_version);
    println!("  Opset:    {}", report.opset);
    println!(
        "  Nodes:    {} ({} initializers)",
        report.num_nodes, report.num_initializers
    );
    println!();
    println!("{}", graph.summary());
    println!();
    println!("  OK");
    Ok(())
}
