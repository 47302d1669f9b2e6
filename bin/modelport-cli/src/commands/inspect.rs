// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `modelport inspect` command: display a compiled artifact.

use converter::CompiledArtifact;
use std::path::PathBuf;

pub fn execute(path: PathBuf) -> anyhow::Result<()> {
    super::banner("modelport · Artifact Inspector");

    let artifact = CompiledArtifact::load(&path).map_err(|e| {
        anyhow::anyhow!("failed to load artifact '{}': {e}", path.display())
    })?;

    println!("{artifact}");
    println!();
    println!(
        "  Parameters: {} ({:.2} MB)",
        artifact.graph.num_parameters(),
        artifact.graph.total_param_bytes() as f64 / (1024.0 * 1024.0),
    );

    // ── Per-Node Detail ────────────────────────────────────────
    println!();
    println!("  {:<4} {:<28} {:<20} {:<20}", "Idx", "Node", "Op", "Output");
    println!("  {}", "-".repeat(74));
    for (idx, node) in artifact.graph.iter_nodes().enumerate() {
        println!(
            "  {:<4} {:<28} {:<20} {:<20}",
            idx,
            truncate(&node.name, 28),
            node.op.to_string(),
            node.output_shape.to_string(),
        );
    }
    println!();
    Ok(())
}

/// Truncates a string to `max_len` with ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}
