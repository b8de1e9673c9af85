//! Graph validation
//!
//! Structural and semantic consistency checks, run after loading and after
//! every mutating pass. Violations are collected into a single report so a
//! caller sees every problem at once, not just the first. Validation never
//! mutates.

use std::collections::{HashMap, HashSet};

use crate::error::{ConvertError, ConvertResult};
use crate::proto::onnx::attribute_proto::AttributeType;
use crate::proto::{GraphProto, ModelProto, NodeProto};

/// Collected validation outcome
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Invariant violations; any entry makes the graph invalid
    pub errors: Vec<String>,
    /// Suspicious but tolerated conditions
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// True when no violations were found
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Expected tagged kind of a required attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrKind {
    Int,
    Ints,
}

impl AttrKind {
    fn matches(self, discriminant: i32) -> bool {
        match self {
            AttrKind::Int => discriminant == AttributeType::Int as i32,
            AttrKind::Ints => discriminant == AttributeType::Ints as i32,
        }
    }
}

/// Input arity and required attributes of an operator kind at a given opset
struct OpSignature {
    min_inputs: usize,
    max_inputs: usize,
    required_attrs: &'static [(&'static str, AttrKind)],
}

/// Signature lookup. Returns `None` for operator kinds the table does not
/// cover; those are skipped rather than guessed at.
fn signature(op_kind: &str, opset: i64) -> Option<OpSignature> {
    let sig = |min, max, attrs| OpSignature {
        min_inputs: min,
        max_inputs: max,
        required_attrs: attrs,
    };
    const NONE: &[(&str, AttrKind)] = &[];
    const AXIS: &[(&str, AttrKind)] = &[("axis", AttrKind::Int)];
    const AXES: &[(&str, AttrKind)] = &[("axes", AttrKind::Ints)];

    Some(match op_kind {
        "Relu" | "Sigmoid" | "Tanh" | "Softmax" | "Identity" | "Transpose" | "Shape" => {
            sig(1, 1, NONE)
        }
        "Add" | "Sub" | "Mul" | "Div" | "MatMul" => sig(2, 2, NONE),
        "Conv" => sig(2, 3, NONE),
        "Gemm" => sig(2, 3, NONE),
        "Concat" => sig(1, usize::MAX, AXIS),
        "Reshape" => sig(2, 2, NONE),
        "Squeeze" => {
            if opset >= 13 {
                sig(1, 2, NONE)
            } else {
                sig(1, 1, NONE)
            }
        }
        "Unsqueeze" => {
            if opset >= 13 {
                sig(2, 2, NONE)
            } else {
                sig(1, 1, AXES)
            }
        }
        "ExpandDims" => sig(1, 2, NONE),
        "Split" => {
            if opset >= 13 {
                sig(1, 2, NONE)
            } else {
                sig(1, 1, NONE)
            }
        }
        "Constant" => sig(0, 0, NONE),
        _ => return None,
    })
}

/// Validate a model: graph presence plus all graph-level checks
pub fn validate_model(model: &ModelProto) -> ValidationReport {
    let mut report = ValidationReport::default();

    if model.opset_import.is_empty() {
        report.warning("model declares no opset imports");
    }

    match &model.graph {
        Some(graph) => {
            let opset = model.opset_version().unwrap_or(1);
            validate_graph_into(graph, opset, &mut report);
        }
        None => report.error("model does not contain a graph"),
    }

    report
}

/// Validate a graph at a given opset version
pub fn validate_graph(graph: &GraphProto, opset: i64) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_graph_into(graph, opset, &mut report);
    report
}

fn validate_graph_into(graph: &GraphProto, opset: i64, report: &mut ValidationReport) {
    // Producer bookkeeping for the single-producer invariant
    let mut producer: HashMap<&str, &str> = HashMap::new();
    for node in &graph.node {
        for output in &node.output {
            if output.is_empty() {
                continue;
            }
            if let Some(first) = producer.get(output.as_str()) {
                report.error(format!(
                    "tensor '{}' has two producers: '{}' and '{}'",
                    output, first, node.name
                ));
            } else {
                producer.insert(output, &node.name);
            }
        }
        if graph
            .initializer
            .iter()
            .any(|t| node.output.iter().any(|o| o == &t.name))
        {
            report.error(format!(
                "node '{}' produces a tensor that is also an initializer",
                node.name
            ));
        }
    }

    // Node name uniqueness (diagnostics depend on it)
    let mut names: HashSet<&str> = HashSet::new();
    for node in &graph.node {
        if node.name.is_empty() {
            report.warning(format!("a '{}' node has no name", node.op_type));
        } else if !names.insert(&node.name) {
            report.error(format!("duplicate node name '{}'", node.name));
        }
    }

    // Topological order: every input must be defined by the time it is used
    let mut known: HashSet<&str> = HashSet::new();
    for vi in &graph.input {
        if vi.name.is_empty() {
            report.error("graph input has empty name");
        } else {
            known.insert(&vi.name);
        }
    }
    for init in &graph.initializer {
        if init.name.is_empty() {
            report.warning("initializer has empty name");
        } else {
            known.insert(&init.name);
        }
    }

    for node in &graph.node {
        if node.op_type.is_empty() {
            report.error(format!("node '{}' has empty op kind", node.name));
        }
        for input in &node.input {
            if input.is_empty() || known.contains(input.as_str()) {
                continue;
            }
            if producer.contains_key(input.as_str()) {
                report.error(format!(
                    "node '{}' uses tensor '{}' before its producer (non-topological order)",
                    node.name, input
                ));
            } else {
                report.error(format!(
                    "node '{}' input '{}' is not a graph input, initializer, or node output",
                    node.name, input
                ));
            }
        }
        for output in &node.output {
            if !output.is_empty() {
                known.insert(output);
            }
        }

        check_signature(node, opset, report);
    }

    for output in &graph.output {
        if output.name.is_empty() {
            report.error("graph output has empty name");
        } else if !known.contains(output.name.as_str()) {
            report.error(format!(
                "graph output '{}' is not produced by any node",
                output.name
            ));
        }
    }
}

fn check_signature(node: &NodeProto, opset: i64, report: &mut ValidationReport) {
    let Some(sig) = signature(&node.op_type, opset) else {
        return;
    };

    let arity = node.input.len();
    if arity < sig.min_inputs || arity > sig.max_inputs {
        let expected = if sig.min_inputs == sig.max_inputs {
            format!("{}", sig.min_inputs)
        } else if sig.max_inputs == usize::MAX {
            format!("at least {}", sig.min_inputs)
        } else {
            format!("{}..={}", sig.min_inputs, sig.max_inputs)
        };
        report.error(format!(
            "node '{}' ({}): {} inputs, expected {} at opset {}",
            node.name, node.op_type, arity, expected, opset
        ));
    }

    for (attr_name, kind) in sig.required_attrs {
        match node.attr(attr_name) {
            None => report.error(format!(
                "node '{}' ({}): missing required attribute '{}' at opset {}",
                node.name, node.op_type, attr_name, opset
            )),
            Some(attr) if !kind.matches(attr.r#type) => report.error(format!(
                "node '{}' ({}): attribute '{}' has wrong kind",
                node.name, node.op_type, attr_name
            )),
            Some(_) => {}
        }
    }
}

/// Validate a model and convert violations into an error
pub fn check_model(model: &ModelProto) -> ConvertResult<()> {
    let report = validate_model(model);
    if report.is_valid() {
        Ok(())
    } else {
        Err(ConvertError::validation(report.errors))
    }
}
