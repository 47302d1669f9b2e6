// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! ONNX exchange files.
//!
//! [`to_model_proto`] lowers a validated graph to an opset-14 `ModelProto`
//! whose batch axis is the symbolic dimension `batch`. [`import`] maps a
//! decoded `ModelProto` back onto the graph IR, resolving `batch` to a
//! concrete size. Only single-input chains of the operators in
//! [`SUPPORTED_OPS`] are representable.

use crate::ConvertError;
use model_ir::graph::{Loaded, Validated};
use model_ir::{Graph, Node, Op, ValueInfo};
use prost_tract_compat::Message;
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use tensor_core::{Activation, Conv2dParams, DType, Pool2dParams, Shape, Tensor};
use tract_onnx::pb::attribute_proto::AttributeType;
use tract_onnx::pb::tensor_proto::DataType;
use tract_onnx::pb::tensor_shape_proto::dimension::Value as DimensionValue;
use tract_onnx::pb::tensor_shape_proto::Dimension;
use tract_onnx::pb::type_proto::{Tensor as TensorTypeProto, Value as TypeValue};
use tract_onnx::pb::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto,
};

/// Opset written by [`to_model_proto`].
pub const OPSET_VERSION: i64 = 14;
/// ONNX IR version written by [`to_model_proto`].
pub const IR_VERSION: i64 = 7;
/// Default-domain opsets accepted on import.
pub const SUPPORTED_OPSETS: RangeInclusive<i64> = 7..=18;
/// Symbolic name of the dynamic batch axis.
pub const BATCH_DIM_PARAM: &str = "batch";
pub const PRODUCER_NAME: &str = "modelport";

/// Operator types the importer understands.
pub const SUPPORTED_OPS: &[&str] = &[
    "Conv",
    "Gemm",
    "BatchNormalization",
    "Relu",
    "Clip",
    "Sigmoid",
    "HardSwish",
    "MaxPool",
    "GlobalAveragePool",
    "Flatten",
    "Softmax",
    "Dropout",
    "Identity",
];

// ── Writing ────────────────────────────────────────────────────────

fn int_attr(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

fn ints_attr(name: &str, values: &[usize]) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Ints as i32,
        ints: values.iter().map(|&v| v as i64).collect(),
        ..Default::default()
    }
}

fn float_attr(name: &str, value: f32) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Float as i32,
        f: value,
        ..Default::default()
    }
}

fn tensor_proto(name: &str, tensor: &Tensor) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: tensor.shape().dims().iter().map(|&d| d as i64).collect(),
        data_type: DataType::Float as i32,
        raw_data: tensor.to_le_bytes(),
        ..Default::default()
    }
}

fn value_info_proto(info: &ValueInfo) -> ValueInfoProto {
    let dim = info
        .shape
        .dims()
        .iter()
        .enumerate()
        .map(|(axis, &size)| {
            let value = if info.dynamic_axes.contains(&axis) {
                let param = if axis == 0 {
                    BATCH_DIM_PARAM.to_string()
                } else {
                    format!("dim_{axis}")
                };
                DimensionValue::DimParam(param)
            } else {
                DimensionValue::DimValue(size as i64)
            };
            Dimension {
                value: Some(value),
                ..Default::default()
            }
        })
        .collect();

    ValueInfoProto {
        name: info.name.clone(),
        r#type: Some(TypeProto {
            value: Some(TypeValue::TensorType(TensorTypeProto {
                elem_type: DataType::Float as i32,
                shape: Some(TensorShapeProto {
                    dim,
                    ..Default::default()
                }),
                ..Default::default()
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Lowers one IR node. Clip bounds become extra initializers.
fn lower_node(
    node: &Node,
    graph: &Graph<Validated>,
    extra: &mut Vec<TensorProto>,
) -> NodeProto {
    let mut inputs = vec![node.input.clone()];
    inputs.extend(node.params.iter().cloned());
    let mut attribute = Vec::new();

    let op_type = match &node.op {
        Op::Conv2d(p) => {
            if let Some(w) = node.params.first().and_then(|w| graph.params.get(w)) {
                attribute.push(ints_attr("kernel_shape", &w.shape().dims()[2..]));
            }
            attribute.push(ints_attr("strides", &p.stride));
            attribute.push(ints_attr(
                "pads",
                &[p.padding[0], p.padding[1], p.padding[0], p.padding[1]],
            ));
            attribute.push(ints_attr("dilations", &[1, 1]));
            attribute.push(int_attr("group", p.groups as i64));
            "Conv"
        }
        Op::Linear => {
            attribute.push(int_attr("transB", 1));
            "Gemm"
        }
        Op::BatchNorm { epsilon } => {
            attribute.push(float_attr("epsilon", *epsilon));
            "BatchNormalization"
        }
        Op::Activation { kind } => match kind {
            Activation::Relu => "Relu",
            Activation::Sigmoid => "Sigmoid",
            Activation::HardSwish => "HardSwish",
            Activation::Relu6 => {
                let min = format!("{}.clip_min", node.name);
                let max = format!("{}.clip_max", node.name);
                extra.push(tensor_proto(&min, &scalar(0.0)));
                extra.push(tensor_proto(&max, &scalar(6.0)));
                inputs.push(min);
                inputs.push(max);
                "Clip"
            }
        },
        Op::MaxPool2d(p) => {
            attribute.push(ints_attr("kernel_shape", &p.kernel));
            attribute.push(ints_attr("strides", &p.stride));
            attribute.push(ints_attr(
                "pads",
                &[p.padding[0], p.padding[1], p.padding[0], p.padding[1]],
            ));
            "MaxPool"
        }
        Op::GlobalAvgPool => "GlobalAveragePool",
        Op::Flatten => {
            attribute.push(int_attr("axis", 1));
            "Flatten"
        }
        Op::Softmax => {
            attribute.push(int_attr("axis", -1));
            "Softmax"
        }
    };

    NodeProto {
        name: node.name.clone(),
        op_type: op_type.to_string(),
        input: inputs,
        output: vec![node.output.clone()],
        attribute,
        ..Default::default()
    }
}

fn scalar(value: f32) -> Tensor {
    Tensor::from_vec(Shape::scalar(), vec![value]).unwrap_or_else(|_| Tensor::zeros(Shape::scalar()))
}

/// Lowers a validated graph to an ONNX model.
pub fn to_model_proto(graph: &Graph<Validated>) -> ModelProto {
    let mut initializer: Vec<TensorProto> = graph
        .params
        .iter()
        .map(|(name, t)| tensor_proto(name, t))
        .collect();
    let mut extra = Vec::new();
    let node = graph
        .iter_nodes()
        .map(|n| lower_node(n, graph, &mut extra))
        .collect();
    initializer.extend(extra);

    ModelProto {
        ir_version: IR_VERSION,
        producer_name: PRODUCER_NAME.to_string(),
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: OPSET_VERSION,
            ..Default::default()
        }],
        graph: Some(GraphProto {
            name: graph.name.clone(),
            node,
            initializer,
            input: vec![value_info_proto(&graph.input)],
            output: vec![value_info_proto(&graph.output)],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Serializes a graph as ONNX protobuf bytes.
pub fn encode(graph: &Graph<Validated>) -> Vec<u8> {
    to_model_proto(graph).encode_to_vec()
}

/// Decodes ONNX protobuf bytes.
///
/// # Errors
/// [`ConvertError::MalformedGraph`] if the bytes are not a `ModelProto`.
pub fn decode(bytes: &[u8]) -> Result<ModelProto, ConvertError> {
    ModelProto::decode(bytes)
        .map_err(|e| ConvertError::MalformedGraph(format!("not an ONNX model: {e}")))
}

// ── Reading ────────────────────────────────────────────────────────

fn malformed(detail: impl Into<String>) -> ConvertError {
    ConvertError::MalformedGraph(detail.into())
}

fn unsupported(node: &str, op: impl Into<String>) -> ConvertError {
    ConvertError::UnsupportedOperation {
        layer: node.to_string(),
        op: op.into(),
    }
}

/// Converts an initializer to an `f32` tensor.
pub(crate) fn tensor_from_proto(proto: &TensorProto) -> Result<Tensor, ConvertError> {
    if DataType::from_i32(proto.data_type) != Some(DataType::Float) {
        return Err(malformed(format!(
            "initializer '{}' has data type {}, only float is supported",
            proto.name, proto.data_type
        )));
    }
    let dims = proto
        .dims
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed(format!("initializer '{}' has a negative dimension", proto.name)))?;
    let shape = Shape::new(dims);
    if shape.checked_size_bytes(DType::F32).is_none() {
        return Err(malformed(format!(
            "initializer '{}' dimensions {shape} are too large",
            proto.name
        )));
    }
    let tensor = if !proto.raw_data.is_empty() {
        Tensor::from_le_bytes(shape, DType::F32, &proto.raw_data)
    } else {
        Tensor::from_vec(shape, proto.float_data.clone())
    };
    tensor.map_err(|e| malformed(format!("initializer '{}': {e}", proto.name)))
}

/// Resolves a declared shape. `batch` replaces a symbolic leading axis.
fn shape_from_value_info(
    info: &ValueInfoProto,
    batch: usize,
) -> Result<(Shape, Vec<usize>), ConvertError> {
    let dims = match info.r#type.as_ref().and_then(|t| t.value.as_ref()) {
        Some(TypeValue::TensorType(t)) => t.shape.as_ref().map(|s| s.dim.as_slice()).unwrap_or(&[]),
        _ => return Err(malformed(format!("value '{}' is not a tensor", info.name))),
    };
    if dims.is_empty() {
        return Err(malformed(format!("value '{}' declares no shape", info.name)));
    }

    let mut sizes = Vec::with_capacity(dims.len());
    let mut dynamic = Vec::new();
    for (axis, dim) in dims.iter().enumerate() {
        match &dim.value {
            Some(DimensionValue::DimValue(v)) if *v > 0 => {
                let size = usize::try_from(*v).map_err(|_| {
                    malformed(format!("value '{}' axis {axis} is too large", info.name))
                })?;
                sizes.push(size);
            }
            Some(DimensionValue::DimParam(_)) | None if axis == 0 => {
                sizes.push(batch);
                dynamic.push(0);
            }
            other => {
                return Err(malformed(format!(
                    "value '{}' axis {axis} has unsupported dimension {other:?}",
                    info.name
                )))
            }
        }
    }
    let shape = Shape::new(sizes);
    if shape.checked_size_bytes(DType::F32).is_none() {
        return Err(malformed(format!(
            "value '{}' dimensions {shape} are too large",
            info.name
        )));
    }
    Ok((shape, dynamic))
}

fn attr<'a>(node: &'a NodeProto, name: &str) -> Option<&'a AttributeProto> {
    node.attribute.iter().find(|a| a.name == name)
}

fn attr_int(node: &NodeProto, name: &str, default: i64) -> i64 {
    attr(node, name).map_or(default, |a| a.i)
}

fn attr_float(node: &NodeProto, name: &str, default: f32) -> f32 {
    attr(node, name).map_or(default, |a| a.f)
}

fn attr_pair(node: &NodeProto, name: &str, default: [usize; 2]) -> Result<[usize; 2], ConvertError> {
    let Some(a) = attr(node, name) else {
        return Ok(default);
    };
    match a.ints.as_slice() {
        [h, w] if *h >= 0 && *w >= 0 => Ok([*h as usize, *w as usize]),
        other => Err(unsupported(&node.name, format!("{} ({name}={other:?})", node.op_type))),
    }
}

/// Symmetric `[top, left, bottom, right]` pads as `[vertical, horizontal]`.
fn attr_pads(node: &NodeProto) -> Result<[usize; 2], ConvertError> {
    if let Some(a) = attr(node, "auto_pad") {
        let mode = String::from_utf8_lossy(&a.s);
        if !mode.is_empty() && mode != "NOTSET" {
            return Err(unsupported(&node.name, format!("{} (auto_pad={mode})", node.op_type)));
        }
    }
    let Some(a) = attr(node, "pads") else {
        return Ok([0, 0]);
    };
    match a.ints.as_slice() {
        [t, l, b, r] if t == b && l == r && *t >= 0 && *l >= 0 => Ok([*t as usize, *l as usize]),
        other => Err(unsupported(
            &node.name,
            format!("{} (asymmetric pads {other:?})", node.op_type),
        )),
    }
}

/// Maps one ONNX node to an IR op. Returns `None` for identities.
fn lift_op(
    node: &NodeProto,
    consts: &HashMap<&str, Tensor>,
    rank: usize,
) -> Result<Option<Op>, ConvertError> {
    let op = match node.op_type.as_str() {
        "Conv" => {
            if let Some(d) = attr(node, "dilations") {
                if d.ints.iter().any(|&v| v != 1) {
                    return Err(unsupported(&node.name, "Conv (dilation)"));
                }
            }
            let weight = node.input.get(1).and_then(|w| consts.get(w.as_str()));
            if let (Some(k), Some(w)) = (attr(node, "kernel_shape"), weight) {
                let spatial = w.shape().dims().get(2..).unwrap_or(&[]);
                let agrees = k.ints.len() == spatial.len()
                    && k.ints.iter().zip(spatial).all(|(&a, &d)| usize::try_from(a) == Ok(d));
                if !agrees {
                    return Err(malformed(format!(
                        "Conv '{}' kernel_shape {:?} disagrees with weight {}",
                        node.name,
                        k.ints,
                        w.shape()
                    )));
                }
            }
            Op::Conv2d(Conv2dParams {
                stride: attr_pair(node, "strides", [1, 1])?,
                padding: attr_pads(node)?,
                groups: usize::try_from(attr_int(node, "group", 1))
                    .map_err(|_| malformed(format!("node '{}' has a negative group", node.name)))?,
            })
        }
        "Gemm" => {
            let plain = attr_int(node, "transA", 0) == 0
                && attr_int(node, "transB", 0) == 1
                && attr_float(node, "alpha", 1.0) == 1.0
                && attr_float(node, "beta", 1.0) == 1.0;
            if !plain {
                return Err(unsupported(&node.name, "Gemm (only x * W^T + b)"));
            }
            Op::Linear
        }
        "BatchNormalization" => Op::BatchNorm {
            epsilon: attr_float(node, "epsilon", 1e-5),
        },
        "Relu" => Op::Activation {
            kind: Activation::Relu,
        },
        "Sigmoid" => Op::Activation {
            kind: Activation::Sigmoid,
        },
        "HardSwish" => Op::Activation {
            kind: Activation::HardSwish,
        },
        "Clip" => {
            let bound = |index: usize, attr_name: &str| -> Result<Option<f32>, ConvertError> {
                match node.input.get(index).filter(|n| !n.is_empty()) {
                    Some(name) => {
                        let t = consts.get(name.as_str()).ok_or_else(|| {
                            unsupported(&node.name, "Clip (non-constant bound)")
                        })?;
                        match t.as_f32_slice() {
                            [v] => Ok(Some(*v)),
                            _ => Err(malformed(format!("Clip bound '{name}' is not a scalar"))),
                        }
                    }
                    None => Ok(attr(node, attr_name).map(|a| a.f)),
                }
            };
            match (bound(1, "min")?, bound(2, "max")?) {
                (Some(lo), Some(hi)) if lo == 0.0 && hi == 6.0 => Op::Activation {
                    kind: Activation::Relu6,
                },
                (Some(lo), None) if lo == 0.0 => Op::Activation {
                    kind: Activation::Relu,
                },
                (lo, hi) => {
                    return Err(unsupported(&node.name, format!("Clip ({lo:?}, {hi:?})")));
                }
            }
        }
        "MaxPool" => {
            let kernel = attr_pair(node, "kernel_shape", [0, 0])?;
            if kernel.contains(&0) {
                return Err(malformed(format!("MaxPool '{}' has no kernel_shape", node.name)));
            }
            if attr_int(node, "ceil_mode", 0) != 0 {
                return Err(unsupported(&node.name, "MaxPool (ceil_mode)"));
            }
            Op::MaxPool2d(Pool2dParams {
                kernel,
                stride: attr_pair(node, "strides", [1, 1])?,
                padding: attr_pads(node)?,
            })
        }
        "GlobalAveragePool" => Op::GlobalAvgPool,
        "Flatten" => {
            if attr_int(node, "axis", 1) != 1 {
                return Err(unsupported(&node.name, "Flatten (axis != 1)"));
            }
            Op::Flatten
        }
        "Softmax" => {
            let axis = attr_int(node, "axis", -1);
            if axis != -1 && axis != rank as i64 - 1 {
                return Err(unsupported(&node.name, format!("Softmax (axis={axis})")));
            }
            Op::Softmax
        }
        "Dropout" | "Identity" => return Ok(None),
        other => return Err(unsupported(&node.name, other)),
    };
    Ok(Some(op))
}

/// Maps a decoded ONNX model onto the graph IR.
///
/// A symbolic batch axis is given the concrete size `batch`.
///
/// # Errors
/// - [`ConvertError::MalformedGraph`] for missing graphs, undefined values,
///   non-float initializers and shape inconsistencies.
/// - [`ConvertError::UnsupportedOperation`] for operators (or operator
///   attributes) with no IR equivalent.
pub fn import(model: &ModelProto, batch: usize) -> Result<Graph<Loaded>, ConvertError> {
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| malformed("model contains no graph"))?;

    let mut consts: HashMap<&str, Tensor> = HashMap::new();
    for init in &graph.initializer {
        consts.insert(init.name.as_str(), tensor_from_proto(init)?);
    }

    let data_inputs: Vec<&ValueInfoProto> = graph
        .input
        .iter()
        .filter(|vi| !consts.contains_key(vi.name.as_str()))
        .collect();
    let [input_vi] = data_inputs.as_slice() else {
        return Err(malformed(format!(
            "expected exactly one graph input, found {}",
            data_inputs.len()
        )));
    };
    let [output_vi] = graph.output.as_slice() else {
        return Err(malformed(format!(
            "expected exactly one graph output, found {}",
            graph.output.len()
        )));
    };

    let (input_shape, input_dynamic) = shape_from_value_info(input_vi, batch)?;
    let mut input = ValueInfo::new(&input_vi.name, input_shape.clone());
    input.dynamic_axes = input_dynamic;

    // Value name -> (IR value name, shape). Identities alias their input.
    let mut values: HashMap<String, (String, Shape)> = HashMap::new();
    values.insert(input.name.clone(), (input.name.clone(), input_shape));
    let mut nodes = Vec::with_capacity(graph.node.len());
    let mut params = BTreeMap::new();

    for (index, proto) in graph.node.iter().enumerate() {
        let name = if proto.name.is_empty() {
            format!("{}_{index}", proto.op_type.to_lowercase())
        } else {
            proto.name.clone()
        };
        let mut proto = proto.clone();
        proto.name = name.clone();

        let mut data = Vec::new();
        let mut node_params = Vec::new();
        for input_name in proto.input.iter().filter(|n| !n.is_empty()) {
            if consts.contains_key(input_name.as_str()) {
                node_params.push(input_name.clone());
            } else {
                data.push(input_name.clone());
            }
        }
        let [data_input] = data.as_slice() else {
            return Err(unsupported(
                &name,
                format!("{} with {} activation inputs", proto.op_type, data.len()),
            ));
        };
        let (source, input_shape) = values.get(data_input).cloned().ok_or_else(|| {
            malformed(format!("node '{name}' reads undefined value '{data_input}'"))
        })?;
        let output = proto
            .output
            .first()
            .filter(|o| !o.is_empty())
            .cloned()
            .ok_or_else(|| malformed(format!("node '{name}' has no output")))?;

        let Some(op) = lift_op(&proto, &consts, input_shape.rank())? else {
            values.insert(output, (source, input_shape));
            continue;
        };
        if matches!(op, Op::Activation { .. }) {
            // Clip bounds were folded into the op.
            node_params.clear();
        }

        let param_shapes: Vec<&Shape> = node_params
            .iter()
            .filter_map(|p| consts.get(p.as_str()).map(Tensor::shape))
            .collect();
        let output_shape = op.infer_shape(&input_shape, &param_shapes).map_err(|e| {
            malformed(format!("node '{name}' ({}): {e}", proto.op_type))
        })?;
        for p in &node_params {
            if let Some(t) = consts.get(p.as_str()) {
                params.insert(p.clone(), t.clone());
            }
        }

        values.insert(output.clone(), (output.clone(), output_shape.clone()));
        nodes.push(Node {
            name,
            op,
            input: source,
            params: node_params,
            output,
            output_shape,
        });
    }

    let (output_value, produced) = values.get(&output_vi.name).cloned().ok_or_else(|| {
        malformed(format!("declared output '{}' is never produced", output_vi.name))
    })?;
    let (declared, output_dynamic) = shape_from_value_info(output_vi, batch)?;
    if declared != produced {
        return Err(malformed(format!(
            "declared output shape {declared} but graph produces {produced}"
        )));
    }
    // An identity at the end leaves the output under its aliased name.
    for node in &mut nodes {
        if node.output == output_value {
            node.output = output_vi.name.clone();
        }
        if node.input == output_value {
            node.input = output_vi.name.clone();
        }
    }
    let mut output = ValueInfo::new(&output_vi.name, produced);
    output.dynamic_axes = output_dynamic;

    tracing::debug!(
        graph = %graph.name,
        nodes = nodes.len(),
        params = params.len(),
        "imported ONNX graph"
    );
    let name = if graph.name.is_empty() {
        "onnx".to_string()
    } else {
        graph.name.clone()
    };
    Ok(Graph::new(name, input, output, nodes, params))
}
