// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `modelport fetch` command: download weights unless already present.

use converter::WeightSource;
use std::path::PathBuf;

pub fn execute(url: String, dest_dir: PathBuf) -> anyhow::Result<()> {
    let source = WeightSource::remote_into(&url, &dest_dir)?;
    let path = source.fetch()?;
    println!("Weights available at {}", path.display());
    Ok(())
}
