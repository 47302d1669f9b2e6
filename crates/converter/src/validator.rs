// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Intermediate validator for ONNX exchange files.
//!
//! Every defect is reported as [`ConvertError::MalformedGraph`], so a bad
//! exchange file always stops the conversion before compilation.

use crate::onnx::{self, SUPPORTED_OPS, SUPPORTED_OPSETS};
use crate::ConvertError;
use model_ir::graph::Validated;
use model_ir::Graph;
use std::collections::HashSet;
use std::path::Path;
use tract_onnx::pb::ModelProto;

/// What the validator saw in an exchange file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    pub producer: String,
    pub ir_version: i64,
    pub opset: i64,
    pub num_nodes: usize,
    pub num_initializers: usize,
}

impl std::fmt::Display for ExchangeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ONNX IR v{} opset {} from '{}': {} nodes, {} initializers",
            self.ir_version, self.opset, self.producer, self.num_nodes, self.num_initializers
        )
    }
}

/// Structural checks that need no shape information.
///
/// # Checks
/// - A graph is present.
/// - A default-domain (`""` or `ai.onnx`) opset in [`SUPPORTED_OPSETS`]
///   is imported.
/// - Every operator is in [`SUPPORTED_OPS`].
/// - Every node input is a graph input, an initializer or an earlier
///   node's output.
/// - Every declared graph output is produced.
pub fn check_structure(model: &ModelProto) -> Result<ExchangeReport, ConvertError> {
    let malformed = |detail: String| ConvertError::MalformedGraph(detail);
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| malformed("model contains no graph".into()))?;

    let opset = model
        .opset_import
        .iter()
        .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
        .map(|o| o.version)
        .ok_or_else(|| malformed("no default-domain opset imported".into()))?;
    if !SUPPORTED_OPSETS.contains(&opset) {
        return Err(malformed(format!(
            "opset {opset} outside supported range {}..={}",
            SUPPORTED_OPSETS.start(),
            SUPPORTED_OPSETS.end()
        )));
    }

    let mut defined: HashSet<&str> = graph.input.iter().map(|v| v.name.as_str()).collect();
    defined.extend(graph.initializer.iter().map(|t| t.name.as_str()));

    for (index, node) in graph.node.iter().enumerate() {
        let label = if node.name.is_empty() {
            format!("#{index}")
        } else {
            format!("'{}'", node.name)
        };
        if !SUPPORTED_OPS.contains(&node.op_type.as_str()) {
            return Err(malformed(format!(
                "node {label} uses unknown operator '{}'",
                node.op_type
            )));
        }
        if let Some(missing) = node
            .input
            .iter()
            .filter(|i| !i.is_empty())
            .find(|i| !defined.contains(i.as_str()))
        {
            return Err(malformed(format!(
                "node {label} reads undefined value '{missing}'"
            )));
        }
        defined.extend(node.output.iter().map(String::as_str));
    }

    if graph.output.is_empty() {
        return Err(malformed("graph declares no outputs".into()));
    }
    if let Some(out) = graph
        .output
        .iter()
        .find(|o| !defined.contains(o.name.as_str()))
    {
        return Err(malformed(format!(
            "declared output '{}' is never produced",
            out.name
        )));
    }

    Ok(ExchangeReport {
        producer: model.producer_name.clone(),
        ir_version: model.ir_version,
        opset,
        num_nodes: graph.node.len(),
        num_initializers: graph.initializer.len(),
    })
}

/// Validates decoded bytes and lifts them into a validated graph.
///
/// Shapes are re-inferred from the initializers with the symbolic batch
/// axis set to `batch`; any inconsistency is malformed.
pub fn validate_bytes(
    bytes: &[u8],
    batch: usize,
) -> Result<(Graph<Validated>, ExchangeReport), ConvertError> {
    let model = onnx::decode(bytes)?;
    let report = check_structure(&model)?;
    let graph = onnx::import(&model, batch)
        .and_then(|g| g.validate().map_err(ConvertError::from))
        .map_err(|e| match e {
            ConvertError::MalformedGraph(_) => e,
            other => ConvertError::MalformedGraph(other.to_string()),
        })?;
    Ok((graph, report))
}

/// Reads and validates the exchange file at `path`.
///
/// # Errors
/// - [`ConvertError::Io`] if the file is missing or unreadable.
/// - [`ConvertError::MalformedGraph`] for any defect in its content.
pub fn validate_file(
    path: &Path,
    batch: usize,
) -> Result<(Graph<Validated>, ExchangeReport), ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
    let (graph, report) = validate_bytes(&bytes, batch)?;
    tracing::info!(path = %path.display(), "{report}");
    Ok((graph, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx::tests::traced_cnn;
    use crate::onnx::to_model_proto;
    use prost_tract_compat::Message;

    fn bytes_of(model: &ModelProto) -> Vec<u8> {
        model.encode_to_vec()
    }

    #[test]
    fn test_valid_file() {
        let graph = traced_cnn();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.onnx");
        std::fs::write(&path, onnx::encode(&graph)).unwrap();
        let (validated, report) = validate_file(&path, 1).unwrap();
        assert_eq!(validated.nodes, graph.nodes);
        assert_eq!(report.opset, onnx::OPSET_VERSION);
        assert_eq!(report.num_nodes, graph.num_nodes());
    }

    #[test]
    fn test_missing_file_is_io() {
        assert!(matches!(
            validate_file(Path::new("/nonexistent/m.onnx"), 1),
            Err(ConvertError::Io { .. })
        ));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = onnx::encode(&traced_cnn());
        let cut = &bytes[..bytes.len() / 2];
        assert!(matches!(
            validate_bytes(cut, 1),
            Err(ConvertError::MalformedGraph(_))
        ));
    }

    #[test]
    fn test_no_graph() {
        let mut model = to_model_proto(&traced_cnn());
        model.graph = None;
        assert!(matches!(
            validate_bytes(&bytes_of(&model), 1),
            Err(ConvertError::MalformedGraph(_))
        ));
    }

    #[test]
    fn test_unsupported_opset() {
        let mut model = to_model_proto(&traced_cnn());
        model.opset_import[0].version = 5;
        let err = validate_bytes(&bytes_of(&model), 1).unwrap_err();
        assert!(err.to_string().contains("opset 5"));
    }

    #[test]
    fn test_unknown_operator_is_malformed() {
        let mut model = to_model_proto(&traced_cnn());
        if let Some(g) = model.graph.as_mut() {
            g.node[1].op_type = "FancyNorm".into();
        }
        assert!(matches!(
            validate_bytes(&bytes_of(&model), 1),
            Err(ConvertError::MalformedGraph(_))
        ));
    }

    #[test]
    fn test_dangling_input() {
        let mut model = to_model_proto(&traced_cnn());
        if let Some(g) = model.graph.as_mut() {
            g.node[2].input[0] = "ghost".into();
        }
        let err = validate_bytes(&bytes_of(&model), 1).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_output_never_produced() {
        let mut model = to_model_proto(&traced_cnn());
        if let Some(g) = model.graph.as_mut() {
            g.output[0].name = "logits".into();
        }
        assert!(validate_bytes(&bytes_of(&model), 1).is_err());
    }

    #[test]
    fn test_inconsistent_initializer_shape() {
        let mut model = to_model_proto(&traced_cnn());
        if let Some(g) = model.graph.as_mut() {
            let w = g
                .initializer
                .iter_mut()
                .find(|t| t.name == "classifier.weight")
                .unwrap();
            // Same element count, wrong layout.
            w.dims = vec![4, 5];
        }
        assert!(matches!(
            validate_bytes(&bytes_of(&model), 1),
            Err(ConvertError::MalformedGraph(_))
        ));
    }

    #[test]
    fn test_oversized_initializer_is_malformed() {
        let mut model = to_model_proto(&traced_cnn());
        if let Some(g) = model.graph.as_mut() {
            let w = g
                .initializer
                .iter_mut()
                .find(|t| t.name == "classifier.weight")
                .unwrap();
            w.dims = vec![1 << 40, 1 << 40];
            w.raw_data.clear();
            w.float_data.clear();
        }
        let err = validate_bytes(&bytes_of(&model), 1).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedGraph(_)));
        assert!(err.to_string().contains("classifier.weight"));
    }

    #[test]
    fn test_oversized_input_dims_are_malformed() {
        use tract_onnx::pb::tensor_shape_proto::dimension::Value as DimensionValue;
        use tract_onnx::pb::type_proto::Value as TypeValue;

        let mut model = to_model_proto(&traced_cnn());
        if let Some(g) = model.graph.as_mut() {
            let Some(TypeValue::TensorType(t)) =
                g.input[0].r#type.as_mut().and_then(|t| t.value.as_mut())
            else {
                panic!("input is not a tensor");
            };
            let dims = &mut t.shape.as_mut().unwrap().dim;
            dims[2].value = Some(DimensionValue::DimValue(1 << 40));
            dims[3].value = Some(DimensionValue::DimValue(1 << 40));
        }
        let err = validate_bytes(&bytes_of(&model), 1).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedGraph(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_conv_kernel_shape_must_match_weight() {
        let mut model = to_model_proto(&traced_cnn());
        if let Some(g) = model.graph.as_mut() {
            let conv = g.node.iter_mut().find(|n| n.op_type == "Conv").unwrap();
            let k = conv
                .attribute
                .iter_mut()
                .find(|a| a.name == "kernel_shape")
                .unwrap();
            k.ints = vec![5, 5];
        }
        let err = validate_bytes(&bytes_of(&model), 1).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedGraph(_)));
        assert!(err.to_string().contains("kernel_shape"));
    }
}
