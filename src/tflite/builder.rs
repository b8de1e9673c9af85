//! TFLite flatbuffer assembly
//!
//! Serializes a converted graph into a TFLite model file using the
//! `flatbuffers` builder directly with manual table construction. Tensor
//! slots are assigned graph inputs first, then initializers, then node
//! outputs in node order, so the emitted file is deterministic for a given
//! graph.

use flatbuffers::FlatBufferBuilder;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{ConvertError, ConvertResult};
use crate::proto::tensor_proto::DataType;
use crate::proto::{GraphProto, ModelProto, TensorProto};
use crate::tensor::{i32_to_dtype, tensor_to_vec_f32};

use super::quant::{self, InputRanges, QuantParams};
use super::schema::{
    builtin_for_op, tensor_type, tflite_type_for, vt, TFLITE_FILE_ID, TFLITE_SCHEMA_VERSION,
};
use super::ExportOptions;

/// One tensor slot in the subgraph, resolved before any bytes are written
struct TensorEntry {
    name: String,
    shape: Vec<i32>,
    ttype: i8,
    buffer: u32,
    quant: Option<QuantParams>,
}

/// Serialize a model into TFLite flatbuffer bytes
pub fn export(model: &ModelProto, options: &ExportOptions<'_>) -> ConvertResult<Vec<u8>> {
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| ConvertError::Export("model does not contain a graph".to_string()))?;

    // Calibration runs before any output is assembled, so a missing or
    // cancelled calibration leaves nothing half-written
    let input_ranges = if options.quantize {
        let source = options
            .calibration
            .ok_or(ConvertError::CalibrationMissing)?;
        Some(quant::observe_ranges(source, &options.cancel)?)
    } else {
        None
    };

    reject_unsupported(graph)?;
    options.cancel.check()?;

    let shapes = collect_shapes(graph);
    let initializer_names: FxHashSet<&str> =
        graph.initializer.iter().map(|t| t.name.as_str()).collect();

    // Tensor slot assignment: inputs, initializers, node outputs
    let mut entries: Vec<TensorEntry> = Vec::new();
    let mut index: FxHashMap<&str, i32> = FxHashMap::default();
    let mut subgraph_inputs: Vec<i32> = Vec::new();

    for vi in &graph.input {
        if initializer_names.contains(vi.name.as_str()) {
            continue;
        }
        let quant = input_ranges
            .as_ref()
            .and_then(|r: &InputRanges| r.get(&vi.name))
            .map(|&(min, max)| QuantParams::from_range(min, max));
        let ttype = if quant.is_some() {
            tensor_type::INT8
        } else {
            elem_type_of(vi.elem_type().unwrap_or(0))
        };
        subgraph_inputs.push(entries.len() as i32);
        index.insert(&vi.name, entries.len() as i32);
        entries.push(TensorEntry {
            name: vi.name.clone(),
            shape: shapes.get(vi.name.as_str()).cloned().unwrap_or_default(),
            ttype,
            buffer: 0,
            quant,
        });
    }

    // Initializer payloads, quantized when requested; buffer 0 stays the
    // all-tensors-without-data sentinel
    let mut buffer_payloads: Vec<Vec<u8>> = Vec::new();
    for init in &graph.initializer {
        let dtype = i32_to_dtype(init.data_type)
            .map_err(|e| ConvertError::Export(e.to_string()))?;
        let (bytes, ttype, quant) = if options.quantize && dtype == DataType::Float {
            let values = tensor_to_vec_f32(init)?;
            let (data, params) = quant::quantize_weights(&values);
            let bytes = data.into_iter().map(|v| v as u8).collect();
            (bytes, tensor_type::INT8, Some(params))
        } else {
            (initializer_bytes(init, dtype)?, tflite_type_for(dtype), None)
        };
        buffer_payloads.push(bytes);
        index.insert(&init.name, entries.len() as i32);
        entries.push(TensorEntry {
            name: init.name.clone(),
            shape: init.dims.iter().map(|&d| d as i32).collect(),
            ttype,
            buffer: buffer_payloads.len() as u32,
            quant,
        });
    }

    for node in &graph.node {
        for output in &node.output {
            if output.is_empty() || index.contains_key(output.as_str()) {
                continue;
            }
            index.insert(output, entries.len() as i32);
            entries.push(TensorEntry {
                name: output.clone(),
                shape: shapes.get(output.as_str()).cloned().unwrap_or_default(),
                ttype: shapes
                    .get(output.as_str())
                    .map(|_| elem_type_of(elem_type_from_graph(graph, output)))
                    .unwrap_or(tensor_type::FLOAT32),
                buffer: 0,
                quant: None,
            });
        }
    }

    // Operator codes, deduplicated in order of first appearance
    let mut opcode_index: IndexMap<i32, u32> = IndexMap::new();
    let mut node_opcodes: Vec<u32> = Vec::with_capacity(graph.node.len());
    for node in &graph.node {
        let opcode = builtin_for_op(&node.op_type)
            .ok_or_else(|| ConvertError::Export(format!("unsupported op '{}'", node.op_type)))?;
        let next = opcode_index.len() as u32;
        node_opcodes.push(*opcode_index.entry(opcode).or_insert(next));
    }

    let mut subgraph_outputs: Vec<i32> = Vec::with_capacity(graph.output.len());
    for output in &graph.output {
        let idx = index.get(output.name.as_str()).ok_or_else(|| {
            ConvertError::Export(format!("graph output '{}' has no producer", output.name))
        })?;
        subgraph_outputs.push(*idx);
    }

    Ok(assemble(
        graph,
        &entries,
        &index,
        &buffer_payloads,
        &opcode_index,
        &node_opcodes,
        &subgraph_inputs,
        &subgraph_outputs,
    ))
}

fn reject_unsupported(graph: &GraphProto) -> ConvertResult<()> {
    let mut unsupported: Vec<String> = graph
        .node
        .iter()
        .filter(|n| builtin_for_op(&n.op_type).is_none())
        .map(|n| n.op_type.clone())
        .collect();
    if unsupported.is_empty() {
        return Ok(());
    }
    unsupported.sort();
    unsupported.dedup();
    Err(ConvertError::Export(format!(
        "no TFLite builtin operator for [{}]",
        unsupported.join(", ")
    )))
}

/// Known shapes by tensor name, symbolic dimensions mapped to -1
fn collect_shapes(graph: &GraphProto) -> FxHashMap<&str, Vec<i32>> {
    let mut shapes: FxHashMap<&str, Vec<i32>> = FxHashMap::default();
    let all = graph
        .input
        .iter()
        .chain(graph.value_info.iter())
        .chain(graph.output.iter());
    for vi in all {
        if let Some(dims) = vi.shape() {
            shapes.insert(&vi.name, dims.iter().map(|&d| d as i32).collect());
        }
    }
    shapes
}

fn elem_type_from_graph(graph: &GraphProto, name: &str) -> i32 {
    graph
        .value_info
        .iter()
        .chain(graph.output.iter())
        .find(|vi| vi.name == name)
        .and_then(|vi| vi.elem_type())
        .unwrap_or(0)
}

fn elem_type_of(raw: i32) -> i8 {
    i32_to_dtype(raw)
        .map(tflite_type_for)
        .unwrap_or(tensor_type::FLOAT32)
}

/// Raw little-endian payload of an initializer
fn initializer_bytes(init: &TensorProto, dtype: DataType) -> ConvertResult<Vec<u8>> {
    if !init.raw_data.is_empty() {
        return Ok(init.raw_data.clone());
    }
    let bytes = match dtype {
        DataType::Float => init
            .float_data
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        DataType::Int32 => init
            .int32_data
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        DataType::Int64 => init
            .int64_data
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect(),
        other => {
            return Err(ConvertError::Export(format!(
                "initializer '{}' has unsupported payload type {:?}",
                init.name, other
            )))
        }
    };
    Ok(bytes)
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    graph: &GraphProto,
    entries: &[TensorEntry],
    index: &FxHashMap<&str, i32>,
    buffer_payloads: &[Vec<u8>],
    opcode_index: &IndexMap<i32, u32>,
    node_opcodes: &[u32],
    subgraph_inputs: &[i32],
    subgraph_outputs: &[i32],
) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::with_capacity(4096);

    // Buffers: index 0 is the empty sentinel, then one per initializer
    let mut buffer_offsets = Vec::with_capacity(buffer_payloads.len() + 1);
    {
        let start = fbb.start_table();
        buffer_offsets.push(fbb.end_table(start));
    }
    for payload in buffer_payloads {
        let data = fbb.create_vector(payload);
        let start = fbb.start_table();
        fbb.push_slot_always(vt::buffer::DATA, data);
        buffer_offsets.push(fbb.end_table(start));
    }
    let buffers = fbb.create_vector(&buffer_offsets);

    // Tensors
    let mut tensor_offsets = Vec::with_capacity(entries.len());
    for entry in entries {
        let quantization = entry.quant.map(|q| {
            let min = fbb.create_vector(&[q.min]);
            let max = fbb.create_vector(&[q.max]);
            let scale = fbb.create_vector(&[q.scale]);
            let zero_point = fbb.create_vector(&[q.zero_point]);
            let start = fbb.start_table();
            fbb.push_slot_always(vt::quantization::MIN, min);
            fbb.push_slot_always(vt::quantization::MAX, max);
            fbb.push_slot_always(vt::quantization::SCALE, scale);
            fbb.push_slot_always(vt::quantization::ZERO_POINT, zero_point);
            fbb.end_table(start)
        });
        let shape = fbb.create_vector(&entry.shape);
        let name = fbb.create_string(&entry.name);
        let start = fbb.start_table();
        fbb.push_slot_always(vt::tensor::SHAPE, shape);
        fbb.push_slot::<i8>(vt::tensor::TYPE, entry.ttype, 0);
        fbb.push_slot::<u32>(vt::tensor::BUFFER, entry.buffer, 0);
        fbb.push_slot_always(vt::tensor::NAME, name);
        if let Some(q) = quantization {
            fbb.push_slot_always(vt::tensor::QUANTIZATION, q);
        }
        tensor_offsets.push(fbb.end_table(start));
    }
    let tensors = fbb.create_vector(&tensor_offsets);

    // Operator codes
    let mut opcode_offsets = Vec::with_capacity(opcode_index.len());
    for (&opcode, _) in opcode_index {
        let deprecated = if opcode <= 127 { opcode as i8 } else { 127 };
        let start = fbb.start_table();
        fbb.push_slot::<i8>(vt::operator_code::DEPRECATED_BUILTIN_CODE, deprecated, 0);
        fbb.push_slot::<i32>(vt::operator_code::VERSION, 1, 1);
        fbb.push_slot::<i32>(vt::operator_code::BUILTIN_CODE, opcode, 0);
        opcode_offsets.push(fbb.end_table(start));
    }
    let operator_codes = fbb.create_vector(&opcode_offsets);

    // Operators in node order; an absent optional input becomes slot -1
    let mut operator_offsets = Vec::with_capacity(graph.node.len());
    for (node, &opcode_idx) in graph.node.iter().zip(node_opcodes) {
        let inputs: Vec<i32> = node
            .input
            .iter()
            .map(|name| index.get(name.as_str()).copied().unwrap_or(-1))
            .collect();
        let outputs: Vec<i32> = node
            .output
            .iter()
            .map(|name| index.get(name.as_str()).copied().unwrap_or(-1))
            .collect();
        let inputs = fbb.create_vector(&inputs);
        let outputs = fbb.create_vector(&outputs);
        let start = fbb.start_table();
        fbb.push_slot::<u32>(vt::operator::OPCODE_INDEX, opcode_idx, 0);
        fbb.push_slot_always(vt::operator::INPUTS, inputs);
        fbb.push_slot_always(vt::operator::OUTPUTS, outputs);
        operator_offsets.push(fbb.end_table(start));
    }
    let operators = fbb.create_vector(&operator_offsets);

    // SubGraph and root Model
    let sg_inputs = fbb.create_vector(subgraph_inputs);
    let sg_outputs = fbb.create_vector(subgraph_outputs);
    let sg_name = fbb.create_string(if graph.name.is_empty() {
        "main"
    } else {
        &graph.name
    });
    let subgraph = {
        let start = fbb.start_table();
        fbb.push_slot_always(vt::sub_graph::TENSORS, tensors);
        fbb.push_slot_always(vt::sub_graph::INPUTS, sg_inputs);
        fbb.push_slot_always(vt::sub_graph::OUTPUTS, sg_outputs);
        fbb.push_slot_always(vt::sub_graph::OPERATORS, operators);
        fbb.push_slot_always(vt::sub_graph::NAME, sg_name);
        fbb.end_table(start)
    };
    let subgraphs = fbb.create_vector(&[subgraph]);

    let description = fbb.create_string("converted from ONNX");
    let model = {
        let start = fbb.start_table();
        fbb.push_slot::<u32>(vt::model::VERSION, TFLITE_SCHEMA_VERSION, 0);
        fbb.push_slot_always(vt::model::OPERATOR_CODES, operator_codes);
        fbb.push_slot_always(vt::model::SUBGRAPHS, subgraphs);
        fbb.push_slot_always(vt::model::DESCRIPTION, description);
        fbb.push_slot_always(vt::model::BUFFERS, buffers);
        fbb.end_table(start)
    };

    fbb.finish(model, Some(TFLITE_FILE_ID));
    fbb.finished_data().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::proto::extensions::{make_node, make_tensor_value_info};
    use crate::proto::{ModelProto, OperatorSetIdProto};
    use crate::tflite::quant::InMemoryCalibration;

    fn float_model() -> ModelProto {
        let weight = TensorProto {
            name: "w".to_string(),
            dims: vec![2, 2],
            data_type: DataType::Float as i32,
            float_data: vec![0.5, -0.5, 1.0, -1.0],
            ..Default::default()
        };
        let graph = GraphProto {
            name: "net".to_string(),
            node: vec![
                make_node("MatMul", &["x", "w"], &["h"], "mm"),
                make_node("Relu", &["h"], &["y"], "act"),
            ],
            input: vec![make_tensor_value_info("x", DataType::Float as i32, &[1, 2])],
            output: vec![make_tensor_value_info("y", DataType::Float as i32, &[1, 2])],
            initializer: vec![weight],
            ..Default::default()
        };
        ModelProto {
            ir_version: 8,
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: 13,
            }],
            graph: Some(graph),
            ..Default::default()
        }
    }

    #[test]
    fn test_export_produces_tflite_header() {
        let bytes = export(&float_model(), &ExportOptions::default()).unwrap();
        // File identifier sits right after the root offset
        assert_eq!(&bytes[4..8], b"TFL3");
        assert!(bytes.len() > 64);
    }

    #[test]
    fn test_export_is_deterministic() {
        let model = float_model();
        let a = export(&model, &ExportOptions::default()).unwrap();
        let b = export(&model, &ExportOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unsupported_ops_named() {
        let mut model = float_model();
        model
            .graph
            .as_mut()
            .unwrap()
            .node
            .push(make_node("NonMaxSuppression", &["y"], &["z"], "nms"));
        let err = export(&model, &ExportOptions::default()).unwrap_err();
        assert!(err.to_string().contains("NonMaxSuppression"));
    }

    #[test]
    fn test_quantize_requires_calibration() {
        let options = ExportOptions {
            quantize: true,
            ..Default::default()
        };
        let err = export(&float_model(), &options).unwrap_err();
        assert!(matches!(err, ConvertError::CalibrationMissing));
    }

    #[test]
    fn test_quantized_export_differs_from_float() {
        let calibration =
            InMemoryCalibration::single_input("x", vec![vec![-1.0, 1.0], vec![0.0, 2.0]]);
        let options = ExportOptions {
            quantize: true,
            calibration: Some(&calibration),
            cancel: CancelToken::new(),
        };
        let quantized = export(&float_model(), &options).unwrap();
        let float = export(&float_model(), &ExportOptions::default()).unwrap();
        assert_eq!(&quantized[4..8], b"TFL3");
        assert_ne!(quantized, float);
    }

    #[test]
    fn test_cancelled_export_writes_nothing() {
        let calibration = InMemoryCalibration::single_input("x", vec![vec![0.0]]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let options = ExportOptions {
            quantize: true,
            calibration: Some(&calibration),
            cancel,
        };
        let err = export(&float_model(), &options).unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
    }
}
