// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Conversion configuration: presets, compile options, metadata and
//! batch jobs loaded from TOML.
//!
//! # TOML Format
//! ```toml
//! [defaults]
//! preset = "classifier"
//! output_dir = "./converted"
//!
//! [normalization]
//! mean = [0.485, 0.456, 0.406]
//! std = [0.229, 0.224, 0.225]
//!
//! [[model]]
//! name = "content_classifier"
//! source = "./models/content"
//! input_shape = [1, 3, 224, 224]
//! labels_file = "./models/content/labels.txt"
//!
//! [[model]]
//! name = "selfie_segmenter"
//! route = "bundle"
//! source = "./models/selfie/selfie.bundle"
//! preset = "portable"
//! input = "tensor"
//! ```

use crate::input::{ColorLayout, Normalization};
use crate::labels::ClassLabels;
use crate::target::{
    check_compatibility, ComputePrecision, ComputeUnits, DeploymentTarget, ModelFormat,
};
use crate::ConvertError;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File extension of compiled artifacts.
pub const ARTIFACT_EXTENSION: &str = "mlpack";

/// Placeholder substituted with the model name in description templates.
pub const MODEL_PLACEHOLDER: &str = "{model}";

// ── Metadata ───────────────────────────────────────────────────────

/// Descriptive metadata attached to every artifact.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetadataConfig {
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Description template; `{model}` is replaced by the model name.
    pub description: String,
    pub version: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            author: "SteinsAlbum".to_string(),
            license: Some("MIT".to_string()),
            description: format!("Image classification model for {MODEL_PLACEHOLDER}"),
            version: "1.0".to_string(),
        }
    }
}

impl MetadataConfig {
    pub fn render_description(&self, model: &str) -> String {
        self.description.replace(MODEL_PLACEHOLDER, model)
    }
}

// ── Compile options and presets ────────────────────────────────────

/// Target-format options handed to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompileOptions {
    pub target: DeploymentTarget,
    pub compute_units: ComputeUnits,
    pub format: ModelFormat,
    pub precision: ComputePrecision,
}

impl CompileOptions {
    pub fn check(&self) -> Result<(), ConvertError> {
        check_compatibility(self.target, self.compute_units, self.format, self.precision)
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Preset::Classifier.compile_options()
    }
}

/// Named bundles of compile options and metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// iOS15 ML program on CPU + Neural Engine, float16, full metadata.
    #[default]
    Classifier,
    /// iOS15 ML program on all compute units, float32, no license field.
    Portable,
}

impl Preset {
    pub fn compile_options(self) -> CompileOptions {
        match self {
            Preset::Classifier => CompileOptions {
                target: DeploymentTarget::Ios15,
                compute_units: ComputeUnits::CpuAndNeuralEngine,
                format: ModelFormat::MlProgram,
                precision: ComputePrecision::Float16,
            },
            Preset::Portable => CompileOptions {
                target: DeploymentTarget::Ios15,
                compute_units: ComputeUnits::All,
                format: ModelFormat::MlProgram,
                precision: ComputePrecision::Float32,
            },
        }
    }

    pub fn metadata(self) -> MetadataConfig {
        match self {
            Preset::Classifier => MetadataConfig::default(),
            Preset::Portable => MetadataConfig {
                license: None,
                ..MetadataConfig::default()
            },
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Preset::Classifier => "classifier",
            Preset::Portable => "portable",
        })
    }
}

impl FromStr for Preset {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classifier" => Ok(Preset::Classifier),
            "portable" => Ok(Preset::Portable),
            other => Err(ConvertError::Config(format!(
                "unknown preset '{other}'; expected 'classifier' or 'portable'"
            ))),
        }
    }
}

// ── Batch jobs ─────────────────────────────────────────────────────

/// How a job obtains its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    /// Trace the checkpoint in `source` directly.
    #[default]
    Direct,
    /// Trace, write an ONNX file, validate it and compile from it.
    Exchange,
    /// Load a frozen graph bundle from `source`.
    Bundle,
}

/// Whether the compiled input is an image or a raw tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Image,
    Tensor,
}

/// Batch-wide defaults. Explicit fields override the preset.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub preset: Preset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DeploymentTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_units: Option<ComputeUnits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ModelFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<ComputePrecision>,
    /// Directory for artifacts without an explicit `output`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// One model to convert.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelJob {
    pub name: String,
    #[serde(default)]
    pub route: RouteKind,
    /// Checkpoint directory (direct / exchange) or bundle file (bundle).
    pub source: PathBuf,
    /// `[N, C, H, W]`. Required unless the route is `bundle`, where it
    /// defaults to the bundle's input shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub input: InputKind,
    #[serde(default)]
    pub color_layout: ColorLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Where the exchange route writes its ONNX file. Defaults to the
    /// artifact path with an `.onnx` extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_path: Option<PathBuf>,
}

impl ModelJob {
    /// A direct-route job with every optional field unset.
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            route: RouteKind::Direct,
            source: source.into(),
            input_shape: None,
            preset: None,
            input: InputKind::Image,
            color_layout: ColorLayout::Rgb,
            labels: None,
            labels_file: None,
            output: None,
            exchange_path: None,
        }
    }

    /// Resolves the labels from the inline list or the labels file.
    pub fn class_labels(&self) -> Result<Option<ClassLabels>, ConvertError> {
        match (&self.labels, &self.labels_file) {
            (Some(_), Some(_)) => Err(ConvertError::Config(format!(
                "model '{}' sets both 'labels' and 'labels_file'",
                self.name
            ))),
            (Some(list), None) => Ok(Some(ClassLabels::new(list.iter().map(String::as_str)))),
            (None, Some(path)) => ClassLabels::from_file(path).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Artifact path: `output`, else `<output_dir>/<name>.mlpack`, else
    /// `<name>.mlpack` in the working directory.
    pub fn output_path(&self, defaults: &Defaults) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        let file = default_artifact_name(&self.name);
        match &defaults.output_dir {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }

    pub fn exchange_path(&self, defaults: &Defaults) -> PathBuf {
        self.exchange_path
            .clone()
            .unwrap_or_else(|| self.output_path(defaults).with_extension("onnx"))
    }
}

/// `<model>.mlpack`
pub fn default_artifact_name(model: &str) -> String {
    format!("{model}.{ARTIFACT_EXTENSION}")
}

/// A batch of conversions.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub defaults: Defaults,
    /// Overrides the preset's metadata for every job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataConfig>,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default, rename = "model")]
    pub models: Vec<ModelJob>,
}

impl BatchConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConvertError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses and checks configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConvertError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ConvertError::Config(format!("TOML parse error: {e}")))?;
        config.check()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConvertError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConvertError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn check(&self) -> Result<(), ConvertError> {
        self.normalization.check()?;
        let mut names = HashSet::new();
        for job in &self.models {
            if job.name.trim().is_empty() {
                return Err(ConvertError::Config("model with an empty name".into()));
            }
            if !names.insert(job.name.as_str()) {
                return Err(ConvertError::Config(format!(
                    "model '{}' is listed more than once",
                    job.name
                )));
            }
            if job.labels.is_some() && job.labels_file.is_some() {
                return Err(ConvertError::Config(format!(
                    "model '{}' sets both 'labels' and 'labels_file'",
                    job.name
                )));
            }
            if job.input_shape.is_none() && job.route != RouteKind::Bundle {
                return Err(ConvertError::Config(format!(
                    "model '{}' needs 'input_shape' for the {:?} route",
                    job.name, job.route
                )));
            }
        }
        Ok(())
    }

    /// Resolves the compile options for `job`: its preset (or the batch
    /// preset), then any explicit `[defaults]` overrides.
    pub fn compile_options(&self, job: &ModelJob) -> CompileOptions {
        let base = job.preset.unwrap_or(self.defaults.preset).compile_options();
        CompileOptions {
            target: self.defaults.target.unwrap_or(base.target),
            compute_units: self.defaults.compute_units.unwrap_or(base.compute_units),
            format: self.defaults.format.unwrap_or(base.format),
            precision: self.defaults.precision.unwrap_or(base.precision),
        }
    }

    /// Metadata for `job`: the `[metadata]` table if present, else the
    /// preset's.
    pub fn metadata_for(&self, job: &ModelJob) -> MetadataConfig {
        self.metadata
            .clone()
            .unwrap_or_else(|| job.preset.unwrap_or(self.defaults.preset).metadata())
    }
}
