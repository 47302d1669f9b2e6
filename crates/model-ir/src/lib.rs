// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! Source models, tracing and the graph intermediate representation the
//! converter compiles from.
//!
//! - [`SourceModel`]: a trained model that can run its forward pass
//!   through a [`Tracer`]. [`SequentialModel`] is the stock implementation.
//! - [`ModelLoader`]: builds a [`SequentialModel`] from a JSON
//!   architecture manifest + SafeTensors checkpoint.
//! - [`Tracer`]: executes operations on concrete tensors and records them.
//! - [`Graph`]: the traced computation, with a **type-state pattern**
//!   (`Loaded` → `Validated`).
//! - [`bundle`]: frozen graphs saved as a single SafeTensors file.
//!
//! # Example
//! ```no_run
//! use model_ir::{ModelLoader, SourceModel, Tracer};
//! use std::path::Path;
//! use tensor_core::{Shape, Tensor};
//!
//! let model = ModelLoader::load(Path::new("./models/resnet18")).unwrap();
//! let input = Tensor::zeros(Shape::new(vec![1, 3, 224, 224]));
//! let (mut tracer, x) = Tracer::new(model.name(), "input", input);
//! let y = model.forward(&mut tracer, x).unwrap();
//! let graph = tracer.finish(y, "output").unwrap().validate().unwrap();
//! println!("{}", graph.summary());
//! ```

pub mod bundle;
pub mod container;
mod error;
pub mod graph;
mod layer;
mod loader;
pub(crate) mod manifest;
mod op;
mod source;
mod trace;

pub use error::ModelError;
pub use graph::{Graph, Node, Topology, ValueInfo};
pub use layer::{LayerDef, LayerType, DEFAULT_BN_EPSILON};
pub use loader::{ModelLoader, MANIFEST_FILE, WEIGHTS_FILE};
pub use manifest::{ManifestLayer, ModelManifest};
pub use op::Op;
pub use source::{Layer, Mode, SequentialModel, SourceModel};
pub use trace::{Traced, Tracer};
