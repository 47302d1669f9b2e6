// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Source model loading from manifest + SafeTensors checkpoint.
//!
//! A model directory contains:
//! - `model.json`: the architecture manifest (see [`ModelManifest`]).
//! - `model.safetensors`: the trained weights in SafeTensors format.
//!
//! The checkpoint is memory-mapped and only the tensors the manifest
//! references are copied out.

use crate::layer::LayerType;
use crate::source::{Layer, SequentialModel};
use crate::{ModelError, ModelManifest};
use std::collections::HashMap;
use std::path::Path;
use tensor_core::{DType, Shape, Tensor};

/// Default manifest filename.
pub const MANIFEST_FILE: &str = "model.json";

/// Default checkpoint filename.
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Loads a [`SequentialModel`] from disk.
///
/// # Example
/// ```no_run
/// use model_ir::{ModelLoader, SourceModel};
/// use std::path::Path;
///
/// let model = ModelLoader::load(Path::new("./models/mobilenet_v2")).unwrap();
/// println!("loaded {} ({} layers)", model.name(), model.layers().len());
/// ```
pub struct ModelLoader;

impl ModelLoader {
    /// Loads a model from a directory holding `model.json` and
    /// `model.safetensors`.
    pub fn load(model_dir: &Path) -> Result<SequentialModel, ModelError> {
        Self::load_files(&model_dir.join(MANIFEST_FILE), &model_dir.join(WEIGHTS_FILE))
    }

    /// Loads a model from an explicit manifest and checkpoint path.
    ///
    /// The returned model is in eval mode: a checkpoint loaded for
    /// conversion is loaded for inference.
    pub fn load_files(manifest_path: &Path, weights_path: &Path) -> Result<SequentialModel, ModelError> {
        let manifest = ModelManifest::from_file(manifest_path)?;
        manifest.validate()?;

        let weights = Self::read_weights(&manifest, weights_path)?;
        let model = Self::from_manifest_and_weights(&manifest, &weights)?;
        tracing::info!(
            model = %manifest.name,
            layers = manifest.layers.len(),
            parameters = model.num_parameters(),
            "loaded source model"
        );
        Ok(model)
    }

    /// Builds a model from a parsed manifest and an in-memory weight map.
    ///
    /// Useful for testing without checkpoint files.
    pub fn from_manifest_and_weights(
        manifest: &ModelManifest,
        weights: &HashMap<String, Tensor>,
    ) -> Result<SequentialModel, ModelError> {
        manifest.validate()?;

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for ml in &manifest.layers {
            let layer_type = LayerType::from_manifest(ml)?;
            let mut named = Vec::with_capacity(ml.weights.len());
            for wname in &ml.weights {
                let tensor = weights.get(wname).ok_or_else(|| ModelError::WeightNotFound {
                    name: wname.clone(),
                })?;
                named.push((wname.clone(), tensor.clone()));
            }
            layers.push(Layer::new(ml.name.clone(), layer_type, named)?);
        }

        Ok(SequentialModel::new(manifest.name.clone(), layers).eval())
    }

    /// Copies the tensors referenced by `manifest` out of the checkpoint.
    fn read_weights(
        manifest: &ModelManifest,
        weights_path: &Path,
    ) -> Result<HashMap<String, Tensor>, ModelError> {
        let file = std::fs::File::open(weights_path).map_err(|source| ModelError::Io {
            path: weights_path.to_path_buf(),
            source,
        })?;

        // SAFETY: the mapping is read-only and dropped before returning;
        // the checkpoint is not expected to change while we read it.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|source| ModelError::Io {
            path: weights_path.to_path_buf(),
            source,
        })?;

        let tensors = safetensors::SafeTensors::deserialize(&mmap)
            .map_err(|e| ModelError::SafeTensors(format!("{}: {e}", weights_path.display())))?;

        let mut out = HashMap::new();
        for wname in manifest.layers.iter().flat_map(|l| l.weights.iter()) {
            if out.contains_key(wname) {
                continue;
            }
            let view = tensors
                .tensor(wname)
                .map_err(|_| ModelError::WeightNotFound { name: wname.clone() })?;
            let dtype = convert_safetensor_dtype(view.dtype())?;
            let tensor = Tensor::from_le_bytes(Shape::new(view.shape().to_vec()), dtype, view.data())
                .map_err(|e| ModelError::InvalidLayer {
                    layer: wname.clone(),
                    detail: e.to_string(),
                })?;
            out.insert(wname.clone(), tensor);
        }

        Ok(out)
    }
}

/// Converts a SafeTensors `Dtype` to our [`DType`].
pub(crate) fn convert_safetensor_dtype(st_dtype: safetensors::Dtype) -> Result<DType, ModelError> {
    match st_dtype {
        safetensors::Dtype::F32 => Ok(DType::F32),
        safetensors::Dtype::F16 => Ok(DType::F16),
        safetensors::Dtype::BF16 => Ok(DType::BF16),
        safetensors::Dtype::I8 => Ok(DType::I8),
        safetensors::Dtype::U8 => Ok(DType::U8),
        other => Err(ModelError::SafeTensors(format!(
            "unsupported SafeTensors dtype: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::tiny_cnn_json;
    use crate::SourceModel;

    fn tiny_cnn_weights() -> HashMap<String, Tensor> {
        let mut w = HashMap::new();
        w.insert(
            "stem.conv.weight".to_string(),
            Tensor::zeros(Shape::new(vec![8, 3, 3, 3])),
        );
        for stat in ["weight", "bias", "running_mean", "running_var"] {
            w.insert(
                format!("stem.bn.{stat}"),
                Tensor::from_f32(Shape::vector(8), &[1.0; 8]).unwrap(),
            );
        }
        w.insert("classifier.weight".to_string(), Tensor::zeros(Shape::matrix(10, 8)));
        w.insert("classifier.bias".to_string(), Tensor::zeros(Shape::vector(10)));
        w
    }

    fn write_checkpoint(path: &Path, weights: &HashMap<String, Tensor>) {
        let bytes: HashMap<&String, (Vec<usize>, Vec<u8>)> = weights
            .iter()
            .map(|(k, t)| (k, (t.shape().dims().to_vec(), t.to_le_bytes())))
            .collect();
        let views: Vec<(String, safetensors::tensor::TensorView<'_>)> = bytes
            .iter()
            .map(|(k, (shape, data))| {
                let view = safetensors::tensor::TensorView::new(
                    safetensors::Dtype::F32,
                    shape.clone(),
                    data,
                )
                .unwrap();
                ((*k).clone(), view)
            })
            .collect();
        let buf = safetensors::serialize(views, &None).unwrap();
        std::fs::write(path, buf).unwrap();
    }

    #[test]
    fn test_from_manifest_and_weights() {
        let manifest = ModelManifest::from_json(tiny_cnn_json()).unwrap();
        let model = ModelLoader::from_manifest_and_weights(&manifest, &tiny_cnn_weights()).unwrap();
        assert_eq!(model.name(), "tiny_cnn");
        assert_eq!(model.layers().len(), 7);
        assert_eq!(model.mode(), crate::Mode::Eval);
    }

    #[test]
    fn test_missing_weight() {
        let manifest = ModelManifest::from_json(tiny_cnn_json()).unwrap();
        let mut weights = tiny_cnn_weights();
        weights.remove("classifier.bias");
        let err = ModelLoader::from_manifest_and_weights(&manifest, &weights).unwrap_err();
        assert!(matches!(err, ModelError::WeightNotFound { ref name } if name == "classifier.bias"));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), tiny_cnn_json()).unwrap();
        write_checkpoint(&dir.path().join(WEIGHTS_FILE), &tiny_cnn_weights());

        let model = ModelLoader::load(dir.path()).unwrap();
        assert_eq!(model.layers().len(), 7);
        assert_eq!(model.num_parameters(), 8 * 27 + 4 * 8 + 80 + 10);
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), tiny_cnn_json()).unwrap();
        let err = ModelLoader::load(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }

    #[test]
    fn test_load_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), tiny_cnn_json()).unwrap();
        std::fs::write(dir.path().join(WEIGHTS_FILE), b"not a checkpoint").unwrap();
        let err = ModelLoader::load(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::SafeTensors(_)));
    }

    #[test]
    fn test_convert_dtype() {
        assert_eq!(convert_safetensor_dtype(safetensors::Dtype::F32).unwrap(), DType::F32);
        assert!(convert_safetensor_dtype(safetensors::Dtype::F64).is_err());
    }
}
