//! Model introspection
//!
//! Read-only summaries of a loaded model: interface tensors, operator
//! population, and parameter count. Used for pre/post conversion reporting.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ConvertError, ConvertResult};
use crate::proto::ModelProto;
use crate::tensor::dtype_name;

/// Name, shape, and element type of an interface tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    /// Tensor name
    pub name: String,
    /// Dimensions; -1 marks a symbolic dimension
    pub shape: Vec<i64>,
    /// ONNX element type code
    pub elem_type: i32,
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .shape
            .iter()
            .map(|d| {
                if *d < 0 {
                    "?".to_string()
                } else {
                    d.to_string()
                }
            })
            .collect();
        write!(
            f,
            "{}: {}[{}]",
            self.name,
            dtype_name(self.elem_type),
            dims.join("x")
        )
    }
}

/// Read-only description of a model
#[derive(Debug, Clone, Default)]
pub struct ModelSummary {
    /// Declared IR format revision
    pub ir_version: i64,
    /// Operator set version of the standard domain
    pub opset_version: i64,
    /// Producer string, if the exporter recorded one
    pub producer: String,
    /// Graph inputs, excluding initializers that shadow an input entry
    pub inputs: Vec<TensorDesc>,
    /// Graph outputs
    pub outputs: Vec<TensorDesc>,
    /// Node count per operator kind, ordered by kind
    pub op_histogram: BTreeMap<String, usize>,
    /// Total node count
    pub node_count: usize,
    /// Total element count across all initializers
    pub parameter_count: u64,
}

/// Summarize a model without mutating it
pub fn describe(model: &ModelProto) -> ConvertResult<ModelSummary> {
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| ConvertError::Parse("model does not contain a graph".to_string()))?;

    let mut summary = ModelSummary {
        ir_version: model.ir_version,
        opset_version: model.opset_version().unwrap_or(0),
        producer: if model.producer_version.is_empty() {
            model.producer_name.clone()
        } else {
            format!("{} {}", model.producer_name, model.producer_version)
        },
        node_count: graph.node.len(),
        ..Default::default()
    };

    for vi in &graph.input {
        // Old exporters list every initializer as a graph input; skip those
        if graph.initializer.iter().any(|t| t.name == vi.name) {
            continue;
        }
        summary.inputs.push(TensorDesc {
            name: vi.name.clone(),
            shape: vi.shape().unwrap_or_default(),
            elem_type: vi.elem_type().unwrap_or(0),
        });
    }
    for vi in &graph.output {
        summary.outputs.push(TensorDesc {
            name: vi.name.clone(),
            shape: vi.shape().unwrap_or_default(),
            elem_type: vi.elem_type().unwrap_or(0),
        });
    }

    for node in &graph.node {
        *summary.op_histogram.entry(node.op_type.clone()).or_insert(0) += 1;
    }

    summary.parameter_count = graph
        .initializer
        .iter()
        .map(|t| t.num_elements() as u64)
        .sum();

    Ok(summary)
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ir_version {}, opset {}, producer '{}'",
            self.ir_version, self.opset_version, self.producer
        )?;
        writeln!(f, "{} nodes, {} parameters", self.node_count, self.parameter_count)?;
        writeln!(f, "inputs:")?;
        for t in &self.inputs {
            writeln!(f, "  {t}")?;
        }
        writeln!(f, "outputs:")?;
        for t in &self.outputs {
            writeln!(f, "  {t}")?;
        }
        writeln!(f, "operators:")?;
        for (op, count) in &self.op_histogram {
            writeln!(f, "  {op}: {count}")?;
        }
        Ok(())
    }
}
