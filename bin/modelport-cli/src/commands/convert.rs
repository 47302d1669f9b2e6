// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `modelport convert` command: run the conversion pipeline.
//!
//! ```text
//! load → export (→ validate) → compile → annotate → persist
//! ```
//!
//! A batch keeps going after a failed model; the command fails at the end
//! if any model did.

use super::parse_shape;
use converter::{BatchConfig, ModelJob, Preset, RouteKind};
use std::path::PathBuf;

/// Flags of the `convert` subcommand.
pub struct Args {
    pub config: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub name: Option<String>,
    pub shape: String,
    pub labels: Option<PathBuf>,
    pub preset: String,
    pub exchange: bool,
    pub output: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

pub fn execute(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => BatchConfig::from_file(path)?,
        None => single_model_config(&args)?,
    };
    if let Some(dir) = args.output_dir {
        if let Some(previous) = config.defaults.output_dir.as_ref().filter(|p| **p != dir) {
            tracing::warn!(
                configured = %previous.display(),
                using = %dir.display(),
                "--output-dir overrides the configured output directory"
            );
        }
        config.defaults.output_dir = Some(dir);
    }
    tracing::debug!(models = config.models.len(), "starting batch");

    let report = converter::run_batch(&config);

    for (model, path) in report.succeeded() {
        println!("Successfully converted {model} to {}", path.display());
    }
    for failure in report.failed() {
        eprintln!("Error converting {} ({} stage): {}", failure.model, failure.stage, failure.source);
    }

    let failed = report.num_failed();
    if failed > 0 {
        anyhow::bail!("{failed} of {} conversions failed", report.outcomes.len());
    }
    Ok(())
}

/// A one-job batch built from the single-model flags.
fn single_model_config(args: &Args) -> anyhow::Result<BatchConfig> {
    let Some(model) = &args.model else {
        anyhow::bail!("either --config or --model is required");
    };
    let name = match &args.name {
        Some(name) => name.clone(),
        None => model
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("cannot derive a model name from '{}'", model.display()))?,
    };

    let mut job = ModelJob::new(name, model.clone());
    job.input_shape = Some(parse_shape(&args.shape)?);
    job.preset = Some(args.preset.parse::<Preset>()?);
    job.labels_file = args.labels.clone();
    job.output = args.output.clone();
    if args.exchange {
        job.route = RouteKind::Exchange;
    }

    let config = BatchConfig {
        models: vec![job],
        ..BatchConfig::default()
    };
    config.check()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            config: None,
            model: Some(PathBuf::from("./models/resnet18")),
            name: None,
            shape: "1,3,224,224".into(),
            labels: None,
            preset: "portable".into(),
            exchange: true,
            output: None,
            output_dir: None,
        }
    }

    #[test]
    fn test_single_model_config() {
        let config = single_model_config(&args()).unwrap();
        let job = &config.models[0];
        assert_eq!(job.name, "resnet18");
        assert_eq!(job.route, RouteKind::Exchange);
        assert_eq!(job.preset, Some(Preset::Portable));
        assert_eq!(job.input_shape, Some(vec![1, 3, 224, 224]));
    }

    #[test]
    fn test_bad_preset() {
        let mut a = args();
        a.preset = "tiny".into();
        assert!(single_model_config(&a).is_err());
    }

    #[test]
    fn test_failed_job_fails_command() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let config = dir.path().join("batch.toml");
        std::fs::write(
            &config,
            r#"
[defaults]
output_dir = "elsewhere"

[[model]]
name = "ghost"
source = "does/not/exist"
input_shape = [1, 3, 8, 8]
"#,
        )
        .unwrap();

        let mut a = args();
        a.model = None;
        a.config = Some(config);
        a.output_dir = Some(out.clone());
        let err = execute(a).unwrap_err();
        assert!(err.to_string().contains("1 of 1 conversions failed"));
        assert!(!out.join("ghost.mlpack").exists());
    }
}
