// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Metadata annotator.

use crate::artifact::{ArtifactMetadata, CompiledArtifact};
use crate::config::MetadataConfig;
use crate::ConvertError;

/// Attaches author, license, description and version to `artifact`,
/// replacing any earlier annotation.
///
/// # Errors
/// [`ConvertError::Precondition`] if the artifact has no name or no
/// compiled operations.
pub fn annotate(artifact: &mut CompiledArtifact, config: &MetadataConfig) -> Result<(), ConvertError> {
    if artifact.name.trim().is_empty() {
        return Err(ConvertError::Precondition(
            "cannot annotate an artifact without a model name".into(),
        ));
    }
    if artifact.graph.num_nodes() == 0 {
        return Err(ConvertError::Precondition(format!(
            "artifact '{}' has no compiled operations",
            artifact.name
        )));
    }

    let description = config.render_description(&artifact.name);
    tracing::debug!(model = %artifact.name, %description, "annotated artifact");
    artifact.metadata = Some(ArtifactMetadata {
        author: config.author.clone(),
        license: config.license.clone(),
        description,
        version: config.version.clone(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::config::{CompileOptions, Preset};
    use crate::input::{InputSpec, ShapeDescriptor};
    use crate::onnx::tests::traced_cnn;

    fn compiled() -> CompiledArtifact {
        let d = ShapeDescriptor::new(1, 3, 8, 8).unwrap();
        compile(traced_cnn(), InputSpec::tensor("input", &d), &CompileOptions::default(), None).unwrap()
    }

    #[test]
    fn test_annotate_defaults() {
        let mut a = compiled();
        annotate(&mut a, &MetadataConfig::default()).unwrap();
        let m = a.metadata.unwrap();
        assert_eq!(m.author, "SteinsAlbum");
        assert_eq!(m.license.as_deref(), Some("MIT"));
        assert_eq!(m.version, "1.0");
        assert_eq!(m.description, "Image classification model for tiny_classifier");
    }

    #[test]
    fn test_portable_metadata_has_no_license() {
        let mut a = compiled();
        annotate(&mut a, &Preset::Portable.metadata()).unwrap();
        assert!(a.metadata.unwrap().license.is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut a = compiled();
        a.name = "  ".into();
        assert!(matches!(
            annotate(&mut a, &MetadataConfig::default()),
            Err(ConvertError::Precondition(_))
        ));
        assert!(a.metadata.is_none());
    }

    #[test]
    fn test_artifact_without_operations_rejected() {
        let mut a = compiled();
        a.graph.nodes.clear();
        let err = annotate(&mut a, &MetadataConfig::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Precondition(_)));
        assert!(err.to_string().contains("no compiled operations"));
        assert!(a.metadata.is_none());
    }
}
