// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single-file SafeTensors containers with a JSON header.
//!
//! Frozen graph bundles and compiled artifacts share this layout: the
//! tensors are ordinary SafeTensors entries and the `__metadata__` table
//! holds exactly one entry, `kind → header JSON`. A single entry keeps the
//! encoded bytes independent of hash-map iteration order, so encoding the
//! same content twice yields the same file.

use crate::ModelError;
use safetensors::{Dtype, SafeTensors, View};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tensor_core::{Shape, Tensor};

/// An `f32` tensor in the little-endian layout SafeTensors stores.
struct F32Data {
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl View for F32Data {
    fn dtype(&self) -> Dtype {
        Dtype::F32
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.bytes)
    }

    fn data_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Encodes `tensors` and a header tagged with `kind`.
pub fn encode(
    kind: &str,
    header: &str,
    tensors: &BTreeMap<String, Tensor>,
) -> Result<Vec<u8>, ModelError> {
    let entries = tensors.iter().map(|(name, t)| {
        (
            name.clone(),
            F32Data {
                shape: t.shape().dims().to_vec(),
                bytes: t.to_le_bytes(),
            },
        )
    });
    let metadata = Some(HashMap::from([(kind.to_string(), header.to_string())]));
    safetensors::serialize(entries, &metadata).map_err(|e| ModelError::SafeTensors(e.to_string()))
}

/// Decodes a container, returning its header and tensors.
///
/// # Errors
/// [`ModelError::SafeTensors`] if the bytes are not a SafeTensors file, if
/// the header for `kind` is missing or a tensor is not `f32`.
pub fn decode(bytes: &[u8], kind: &str) -> Result<(String, BTreeMap<String, Tensor>), ModelError> {
    let (_, metadata) =
        SafeTensors::read_metadata(bytes).map_err(|e| ModelError::SafeTensors(e.to_string()))?;
    let header = metadata
        .metadata()
        .as_ref()
        .and_then(|m| m.get(kind))
        .cloned()
        .ok_or_else(|| ModelError::SafeTensors(format!("no '{kind}' header present")))?;

    let st = SafeTensors::deserialize(bytes).map_err(|e| ModelError::SafeTensors(e.to_string()))?;
    let mut tensors = BTreeMap::new();
    for (name, view) in st.tensors() {
        let dtype = crate::loader::convert_safetensor_dtype(view.dtype())?;
        let tensor = Tensor::from_le_bytes(Shape::new(view.shape().to_vec()), dtype, view.data())
            .map_err(|e| ModelError::SafeTensors(format!("tensor '{name}': {e}")))?;
        tensors.insert(name, tensor);
    }

    Ok((header, tensors))
}

/// Memory-maps `path` and decodes it.
pub fn decode_file(path: &Path, kind: &str) -> Result<(String, BTreeMap<String, Tensor>), ModelError> {
    let io = |source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io)?;
    // SAFETY: read-only mapping that does not outlive this call.
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(io)?;
    decode(&mmap, kind)
}
