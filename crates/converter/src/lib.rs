// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # converter
//!
//! Converts trained image classifiers into compiled deployment artifacts.
//!
//! The converter takes:
//! - A [`SourceModel`](model_ir::SourceModel) from `model-ir` (or a frozen
//!   graph bundle).
//! - A [`ShapeDescriptor`] fixing the input `[N, C, H, W]`.
//! - Optional [`ClassLabels`] and a [`Preset`] of target options.
//!
//! And produces a `.mlpack` artifact: the compiled graph, an image input
//! specification carrying ImageNet normalization as `scale` / `bias`, the
//! bound labels and descriptive metadata.
//!
//! # Type-State Pipeline
//! ```text
//! Conversion<Pending> → Conversion<Exported> → Conversion<Compiled>
//!                     → Conversion<Annotated> → file on disk
//! ```
//! Stages cannot be skipped or reordered; every failure names its model
//! and stage ([`ConversionFailure`]).
//!
//! # Routes
//! - **direct**: trace the model straight into the compiler IR.
//! - **exchange**: trace, write an ONNX file, validate it and compile from
//!   the validated file.
//! - **bundle**: load an already frozen graph.
//!
//! # Example
//! ```no_run
//! use converter::{convert, ClassLabels, ConvertRequest, ShapeDescriptor};
//! use model_ir::ModelLoader;
//! use std::path::Path;
//!
//! let model = ModelLoader::load(Path::new("./models/resnet18")).unwrap();
//! let request = ConvertRequest::new("resnet18", ShapeDescriptor::new(1, 3, 224, 224).unwrap())
//!     .with_labels(ClassLabels::from_file(Path::new("imagenet_classes.txt")).unwrap());
//! let path = convert(&model, &request).unwrap();
//! println!("Successfully converted resnet18 to {}", path.display());
//! ```

mod artifact;
pub mod compiler;
mod config;
mod error;
pub mod exporter;
mod fetch;
mod input;
mod labels;
pub mod metadata;
pub mod onnx;
pub mod persist;
mod pipeline;
mod target;
pub mod validator;

pub use artifact::{ArtifactMetadata, CompiledArtifact, ARTIFACT_KIND, ARTIFACT_VERSION};
pub use config::{
    default_artifact_name, BatchConfig, CompileOptions, Defaults, InputKind, MetadataConfig,
    ModelJob, Preset, RouteKind, ARTIFACT_EXTENSION,
};
pub use error::{ConversionFailure, ConvertError, Stage};
pub use exporter::ExportRoute;
pub use fetch::WeightSource;
pub use input::{ColorLayout, InputSpec, Normalization, ShapeDescriptor, IMAGENET_MEAN, IMAGENET_STD};
pub use labels::ClassLabels;
pub use pipeline::{
    convert, run_batch, run_job, Annotated, BatchReport, Compiled, Conversion, ConversionState,
    ConvertRequest, Exported, JobOutcome, Pending,
};
pub use target::{check_compatibility, ComputePrecision, ComputeUnits, DeploymentTarget, ModelFormat};
pub use validator::ExchangeReport;
