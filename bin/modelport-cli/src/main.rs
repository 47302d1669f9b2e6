// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # modelport
//!
//! Command-line interface for the modelport converter.
//!
//! ## Usage
//! ```bash
//! # Convert every model listed in a batch file
//! modelport convert --config models.toml
//!
//! # Convert one checkpoint directory
//! modelport convert --model ./models/resnet18 --name resnet18 --shape 1,3,224,224 \
//!     --labels imagenet_classes.txt
//!
//! # Write and check an ONNX exchange file
//! modelport export-onnx --model ./models/resnet18 --shape 1,3,224,224 --out resnet18.onnx
//! modelport validate resnet18.onnx
//!
//! # Print a compiled artifact
//! modelport inspect resnet18.mlpack
//!
//! # Download weights
//! modelport fetch --url https://example.com/resnet18/model.safetensors --dest-dir ./models/resnet18
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "modelport",
    about = "Convert trained image classifiers into compiled deployment artifacts",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert models from a batch file, or a single checkpoint directory.
    Convert {
        /// Batch configuration (TOML). Overrides the single-model flags.
        #[arg(short, long, conflicts_with = "model")]
        config: Option<PathBuf>,

        /// Checkpoint directory holding model.json and model.safetensors.
        #[arg(short, long, required_unless_present = "config")]
        model: Option<PathBuf>,

        /// Model name; defaults to the checkpoint directory name.
        #[arg(short, long)]
        name: Option<String>,

        /// Input shape as N,C,H,W (e.g., "1,3,224,224").
        #[arg(short, long, default_value = "1,3,224,224")]
        shape: String,

        /// Class labels file, one label per line.
        #[arg(short, long)]
        labels: Option<PathBuf>,

        /// Target preset: classifier, portable.
        #[arg(short, long, default_value = "classifier")]
        preset: String,

        /// Go through a validated ONNX exchange file.
        #[arg(long)]
        exchange: bool,

        /// Artifact path for a single model.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory for artifacts without an explicit output path.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Trace a checkpoint and write it as an ONNX exchange file.
    ExportOnnx {
        /// Checkpoint directory.
        #[arg(short, long)]
        model: PathBuf,

        /// Input shape as N,C,H,W.
        #[arg(short, long, default_value = "1,3,224,224")]
        shape: String,

        /// Destination of the ONNX file.
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Check an ONNX exchange file for structural problems.
    Validate {
        /// Path to the ONNX file.
        path: PathBuf,

        /// Batch size substituted for the symbolic batch axis.
        #[arg(short, long, default_value_t = 1)]
        batch: usize,
    },

    /// Print a compiled artifact: target, input, labels, metadata and graph.
    Inspect {
        /// Path to the .mlpack artifact.
        path: PathBuf,
    },

    /// Download weights unless they are already present.
    Fetch {
        /// HTTP(S) URL of the weights file.
        #[arg(short, long)]
        url: String,

        /// Directory to store the file in, under the URL's file name.
        #[arg(short, long, default_value = ".")]
        dest_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert {
            config,
            model,
            name,
            shape,
            labels,
            preset,
            exchange,
            output,
            output_dir,
        } => commands::convert::execute(commands::convert::Args {
            config,
            model,
            name,
            shape,
            labels,
            preset,
            exchange,
            output,
            output_dir,
        }),
        Commands::ExportOnnx { model, shape, out } => {
            commands::export_onnx::execute(model, shape, out)
        }
        Commands::Validate { path, batch } => commands::validate::execute(path, batch),
        Commands::Inspect { path } => commands::inspect::execute(path),
        Commands::Fetch { url, dest_dir } => commands::fetch::execute(url, dest_dir),
    }
}
