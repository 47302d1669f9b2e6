// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The conversion pipeline with type-state enforced stage order.
//!
//! ```text
//! Conversion<Pending>
//!     │  .export() / .from_bundle()
//!     ▼
//! Conversion<Exported>
//!     │  .compile()
//!     ▼
//! Conversion<Compiled>
//!     │  .annotate()
//!     ▼
//! Conversion<Annotated>
//!     │  .persist()
//!     ▼
//!   artifact on disk
//! ```
//!
//! Each transition consumes the old value, so stages cannot be skipped or
//! reordered. Every failure is a [`ConversionFailure`] naming the model and
//! stage. A batch runs its jobs one after another and keeps going past
//! failed ones.

use crate::artifact::CompiledArtifact;
use crate::config::{
    default_artifact_name, BatchConfig, CompileOptions, InputKind, MetadataConfig, ModelJob,
    Preset, RouteKind,
};
use crate::exporter::{self, ExportRoute, INPUT_NAME};
use crate::input::{ColorLayout, InputSpec, Normalization, ShapeDescriptor};
use crate::labels::ClassLabels;
use crate::{metadata, validator, ConversionFailure, ConvertError, Stage};
use model_ir::graph::Validated;
use model_ir::{Graph, ModelLoader, SourceModel};
use std::path::{Path, PathBuf};
use tensor_core::DType;

// ── Type-state markers ─────────────────────────────────────────────

/// Nothing has run yet.
#[derive(Debug)]
pub struct Pending;

/// A validated graph is available.
#[derive(Debug)]
pub struct Exported {
    graph: Graph<Validated>,
}

/// The graph has been compiled for its target.
#[derive(Debug)]
pub struct Compiled {
    artifact: CompiledArtifact,
}

/// Metadata is attached; the artifact is ready to persist.
#[derive(Debug)]
pub struct Annotated {
    artifact: CompiledArtifact,
}

/// Sealed trait for conversion states.
pub trait ConversionState: std::fmt::Debug {}
impl ConversionState for Pending {}
impl ConversionState for Exported {}
impl ConversionState for Compiled {}
impl ConversionState for Annotated {}

// ── Conversion ─────────────────────────────────────────────────────

/// One model's trip through the pipeline.
#[derive(Debug)]
pub struct Conversion<S: ConversionState = Pending> {
    model: String,
    state: S,
}

impl<S: ConversionState> Conversion<S> {
    /// Name of the model being converted.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn fail(&self, stage: Stage, source: impl Into<ConvertError>) -> ConversionFailure {
        ConversionFailure::new(self.model.clone(), stage, source)
    }

    fn advance<T: ConversionState>(self, state: T) -> Conversion<T> {
        Conversion {
            model: self.model,
            state,
        }
    }
}

// ── Pending → Exported ─────────────────────────────────────────────

impl Conversion<Pending> {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            state: Pending,
        }
    }

    /// Traces `source` and, on the exchange route, writes and validates the
    /// ONNX file, continuing from the validated file's graph.
    pub fn export(
        self,
        source: &dyn SourceModel,
        descriptor: &ShapeDescriptor,
        route: &ExportRoute,
    ) -> Result<Conversion<Exported>, ConversionFailure> {
        let traced =
            exporter::export(source, descriptor, route).map_err(|e| self.fail(Stage::Export, e))?;
        let graph = match route {
            ExportRoute::DirectTrace => traced,
            ExportRoute::ExchangeFormat { path } => {
                let (graph, report) = validator::validate_file(path, descriptor.batch)
                    .map_err(|e| self.fail(Stage::Validate, e))?;
                tracing::info!(model = %self.model, "exchange file valid: {report}");
                graph
            }
        };
        Ok(self.advance(Exported { graph }))
    }

    /// Loads a frozen graph bundle, skipping export and validation.
    pub fn from_bundle(self, path: &Path) -> Result<Conversion<Exported>, ConversionFailure> {
        let graph = model_ir::bundle::load(path).map_err(|e| self.fail(Stage::Load, e))?;
        tracing::info!(model = %self.model, path = %path.display(), "loaded frozen graph bundle");
        Ok(self.advance(Exported { graph }))
    }

    /// Continues from an already validated graph.
    pub fn from_graph(self, graph: Graph<Validated>) -> Conversion<Exported> {
        self.advance(Exported { graph })
    }
}

// ── Exported → Compiled ────────────────────────────────────────────

impl Conversion<Exported> {
    pub fn graph(&self) -> &Graph<Validated> {
        &self.state.graph
    }

    /// Compiles the graph; the artifact takes the conversion's model name.
    pub fn compile(
        self,
        input: InputSpec,
        options: &CompileOptions,
        labels: Option<ClassLabels>,
    ) -> Result<Conversion<Compiled>, ConversionFailure> {
        let mut graph = self.state.graph;
        graph.name = self.model.clone();
        match crate::compiler::compile(graph, input, options, labels) {
            Ok(artifact) => Ok(Conversion {
                model: self.model,
                state: Compiled { artifact },
            }),
            Err(e) => Err(ConversionFailure::new(self.model, Stage::Compile, e)),
        }
    }
}

// ── Compiled → Annotated ───────────────────────────────────────────

impl Conversion<Compiled> {
    pub fn artifact(&self) -> &CompiledArtifact {
        &self.state.artifact
    }

    pub fn annotate(self, config: &MetadataConfig) -> Result<Conversion<Annotated>, ConversionFailure> {
        let mut artifact = self.state.artifact;
        if let Err(e) = metadata::annotate(&mut artifact, config) {
            return Err(ConversionFailure::new(self.model, Stage::Annotate, e));
        }
        Ok(Conversion {
            model: self.model,
            state: Annotated { artifact },
        })
    }
}

// ── Annotated → disk ───────────────────────────────────────────────

impl Conversion<Annotated> {
    pub fn artifact(&self) -> &CompiledArtifact {
        &self.state.artifact
    }

    /// Writes the artifact to `path`, creating directories and replacing any
    /// existing file.
    pub fn persist(self, path: &Path) -> Result<PathBuf, ConversionFailure> {
        self.state
            .artifact
            .save(path)
            .map_err(|e| self.fail(Stage::Persist, e))?;
        tracing::info!(model = %self.model, path = %path.display(), "saved artifact");
        Ok(path.to_path_buf())
    }
}

// ── Single-model conversion ────────────────────────────────────────

/// Everything needed to convert one in-memory model.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub name: String,
    pub descriptor: ShapeDescriptor,
    pub route: ExportRoute,
    pub preset: Preset,
    pub normalization: Normalization,
    pub color_layout: ColorLayout,
    pub labels: Option<ClassLabels>,
    /// Defaults to `<name>.mlpack` in the working directory.
    pub output: Option<PathBuf>,
}

impl ConvertRequest {
    /// A direct-route classifier-preset request with ImageNet normalization.
    pub fn new(name: impl Into<String>, descriptor: ShapeDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            route: ExportRoute::DirectTrace,
            preset: Preset::Classifier,
            normalization: Normalization::default(),
            color_layout: ColorLayout::Rgb,
            labels: None,
            output: None,
        }
    }

    pub fn with_labels(mut self, labels: ClassLabels) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn with_route(mut self, route: ExportRoute) -> Self {
        self.route = route;
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_artifact_name(&self.name)))
    }
}

/// Converts `source` as described by `request` and returns the artifact path.
pub fn convert(source: &dyn SourceModel, request: &ConvertRequest) -> Result<PathBuf, ConversionFailure> {
    let input = InputSpec::image(
        INPUT_NAME,
        &request.descriptor,
        &request.normalization,
        request.color_layout,
    )
    .map_err(|e| ConversionFailure::new(request.name.clone(), Stage::Compile, e))?;

    Conversion::new(request.name.clone())
        .export(source, &request.descriptor, &request.route)?
        .compile(input, &request.preset.compile_options(), request.labels.clone())?
        .annotate(&request.preset.metadata())?
        .persist(&request.output_path())
}

// ── Batches ────────────────────────────────────────────────────────

/// Result of one batch job.
#[derive(Debug)]
pub struct JobOutcome {
    pub model: String,
    pub result: Result<PathBuf, ConversionFailure>,
}

/// Results of a batch, in job order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|p| (o.model.as_str(), p.as_path())))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ConversionFailure> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn num_failed(&self) -> usize {
        self.failed().count()
    }

    pub fn is_success(&self) -> bool {
        self.num_failed() == 0
    }
}

fn job_input(
    config: &BatchConfig,
    job: &ModelJob,
    graph: &Graph<Validated>,
    descriptor: Option<&ShapeDescriptor>,
) -> Result<InputSpec, ConvertError> {
    let name = graph.input.name.clone();
    match (job.input, descriptor) {
        (InputKind::Image, Some(d)) => {
            InputSpec::image(name, d, &config.normalization, job.color_layout)
        }
        (InputKind::Tensor, Some(d)) => Ok(InputSpec::tensor(name, d)),
        (InputKind::Image, None) => {
            let d = ShapeDescriptor::from_dims(graph.input.shape.dims())?;
            InputSpec::image(name, &d, &config.normalization, job.color_layout)
        }
        (InputKind::Tensor, None) => Ok(InputSpec::Tensor {
            name,
            shape: graph.input.shape.clone(),
            dtype: DType::F32,
        }),
    }
}

/// Runs one batch job through every stage.
pub fn run_job(config: &BatchConfig, job: &ModelJob) -> Result<PathBuf, ConversionFailure> {
    let load_err = |e: ConvertError| ConversionFailure::new(job.name.clone(), Stage::Load, e);
    let labels = job.class_labels().map_err(load_err)?;
    let descriptor = job
        .input_shape
        .as_deref()
        .map(ShapeDescriptor::from_dims)
        .transpose()
        .map_err(load_err)?;
    let output = job.output_path(&config.defaults);

    let conversion = Conversion::new(job.name.clone());
    let exported = match job.route {
        RouteKind::Bundle => conversion.from_bundle(&job.source)?,
        RouteKind::Direct | RouteKind::Exchange => {
            let Some(descriptor) = descriptor.as_ref() else {
                return Err(load_err(ConvertError::Config(format!(
                    "model '{}' needs 'input_shape'",
                    job.name
                ))));
            };
            let model = ModelLoader::load(&job.source).map_err(|e| load_err(e.into()))?;
            let route = match job.route {
                RouteKind::Exchange => ExportRoute::ExchangeFormat {
                    path: job.exchange_path(&config.defaults),
                },
                _ => ExportRoute::DirectTrace,
            };
            conversion.export(&model, descriptor, &route)?
        }
    };

    let input = job_input(config, job, exported.graph(), descriptor.as_ref())
        .map_err(|e| ConversionFailure::new(job.name.clone(), Stage::Compile, e))?;
    exported
        .compile(input, &config.compile_options(job), labels)?
        .annotate(&config.metadata_for(job))?
        .persist(&output)
}

/// Runs every job in `config`. A failed job is reported and the batch moves
/// on to the next one.
pub fn run_batch(config: &BatchConfig) -> BatchReport {
    let mut report = BatchReport::default();
    for job in &config.models {
        let result = run_job(config, job);
        match &result {
            Ok(path) => tracing::info!(model = %job.name, path = %path.display(), "conversion succeeded"),
            Err(e) => tracing::error!("{e}"),
        }
        report.outcomes.push(JobOutcome {
            model: job.name.clone(),
            result,
        });
    }
    tracing::info!(
        jobs = report.outcomes.len(),
        failed = report.num_failed(),
        "batch finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::tests::tiny_classifier;
    use crate::onnx::tests::traced_cnn;

    fn descriptor() -> ShapeDescriptor {
        ShapeDescriptor::new(1, 3, 8, 8).unwrap()
    }

    #[test]
    fn test_stages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/tiny.mlpack");
        let model = tiny_classifier(5);
        let d = descriptor();
        let input = InputSpec::image(INPUT_NAME, &d, &Normalization::default(), ColorLayout::Rgb).unwrap();

        let exported = Conversion::new("tiny")
            .export(&model, &d, &ExportRoute::DirectTrace)
            .unwrap();
        assert_eq!(exported.graph().input.shape, d.shape());
        let compiled = exported
            .compile(input, &CompileOptions::default(), None)
            .unwrap();
        assert_eq!(compiled.artifact().name, "tiny");
        let annotated = compiled.annotate(&MetadataConfig::default()).unwrap();
        assert!(annotated.artifact().metadata.is_some());
        assert_eq!(annotated.persist(&path).unwrap(), path);
        assert!(path.is_file());
    }

    #[test]
    fn test_failure_names_stage() {
        let model = tiny_classifier(5);
        let d = descriptor();
        let input = InputSpec::tensor(INPUT_NAME, &d);
        let err = Conversion::new("tiny")
            .export(&model, &d, &ExportRoute::DirectTrace)
            .unwrap()
            .compile(input, &CompileOptions::default(), Some(ClassLabels::new(["x"])))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Compile);
        assert_eq!(err.model, "tiny");
    }

    #[test]
    fn test_export_failure_stage() {
        let model = tiny_classifier(5).train();
        let err = Conversion::new("tiny")
            .export(&model, &descriptor(), &ExportRoute::DirectTrace)
            .unwrap_err();
        assert_eq!(err.stage, Stage::Export);
        assert!(matches!(err.source, ConvertError::Precondition(_)));
    }

    #[test]
    fn test_from_graph() {
        let conv = Conversion::new("g").from_graph(traced_cnn());
        assert_eq!(conv.model(), "g");
        assert_eq!(conv.graph().num_nodes(), 6);
    }

    #[test]
    fn test_request_default_output() {
        let r = ConvertRequest::new("mobilenet", descriptor());
        assert_eq!(r.output_path(), PathBuf::from("mobilenet.mlpack"));
        let r = r.with_output("/tmp/x.mlpack").with_preset(Preset::Portable);
        assert_eq!(r.output_path(), PathBuf::from("/tmp/x.mlpack"));
        assert_eq!(r.preset, Preset::Portable);
    }

    #[test]
    fn test_batch_report_counts() {
        let report = BatchReport {
            outcomes: vec![
                JobOutcome {
                    model: "a".into(),
                    result: Ok(PathBuf::from("a.mlpack")),
                },
                JobOutcome {
                    model: "b".into(),
                    result: Err(ConversionFailure::new(
                        "b",
                        Stage::Load,
                        ConvertError::Config("x".into()),
                    )),
                },
            ],
        };
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(report.num_failed(), 1);
        assert!(!report.is_success());
    }
}
