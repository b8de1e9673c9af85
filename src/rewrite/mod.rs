//! Structural node rewrites
//!
//! Some operator kinds encode a structural parameter (an axis list, split
//! sizes) as a runtime input in one dialect and as a compile-time attribute
//! in another. [`rewrite`] migrates the input form to the attribute form when
//! the input resolves to a compile-time constant, then runs the mandatory
//! cleanup pass. Nodes already carrying the attribute are skipped, which
//! makes the pass idempotent; nodes whose input cannot be resolved are left
//! untouched and reported as warnings.

use std::fmt;

use tracing::{debug, warn};

use crate::error::ConvertResult;
use crate::graph::{cleanup, GraphContext};
use crate::proto::ModelProto;

/// One class of input-to-attribute migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewritePattern {
    /// Operator kind the pattern applies to
    pub op_kind: &'static str,
    /// Input position that holds the structural parameter in the legacy form
    pub input_index: usize,
    /// Attribute the parameter moves into
    pub attr_name: &'static str,
}

/// ExpandDims: axes as second input → `axes` attribute
pub fn expand_dims_axes() -> RewritePattern {
    RewritePattern {
        op_kind: "ExpandDims",
        input_index: 1,
        attr_name: "axes",
    }
}

/// Unsqueeze (opset 13+ form): axes as second input → `axes` attribute
pub fn unsqueeze_axes() -> RewritePattern {
    RewritePattern {
        op_kind: "Unsqueeze",
        input_index: 1,
        attr_name: "axes",
    }
}

/// Squeeze (opset 13+ form): axes as second input → `axes` attribute
pub fn squeeze_axes() -> RewritePattern {
    RewritePattern {
        op_kind: "Squeeze",
        input_index: 1,
        attr_name: "axes",
    }
}

/// Split (opset 13+ form): sizes as second input → `split` attribute
pub fn split_sizes() -> RewritePattern {
    RewritePattern {
        op_kind: "Split",
        input_index: 1,
        attr_name: "split",
    }
}

/// The migrations applied by the default pipeline
pub fn standard_patterns() -> Vec<RewritePattern> {
    vec![
        expand_dims_axes(),
        unsqueeze_axes(),
        squeeze_axes(),
        split_sizes(),
    ]
}

/// The migrations that are valid at the given opset version.
///
/// The Unsqueeze/Squeeze/Split attribute forms only exist below opset 13;
/// at 13 and above those operators take the parameter as an input, and
/// migrating it would produce a node invalid at the declared version.
/// ExpandDims is not versioned by the standard domain and always accepts
/// the attribute form.
pub fn patterns_for_opset(opset: i64) -> Vec<RewritePattern> {
    let mut patterns = vec![expand_dims_axes()];
    if opset < 13 {
        patterns.push(unsqueeze_axes());
        patterns.push(squeeze_axes());
        patterns.push(split_sizes());
    }
    patterns
}

/// Per-node diagnostic for a node the rewriter could not migrate
#[derive(Debug, Clone)]
pub struct RewriteWarning {
    /// Node name
    pub node: String,
    /// Operator kind
    pub op_kind: String,
    /// Why the node was left unmodified
    pub reason: String,
}

impl fmt::Display for RewriteWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.node, self.op_kind, self.reason)
    }
}

/// Outcome of one rewrite pass
#[derive(Debug, Default, Clone)]
pub struct RewriteReport {
    /// Whether any node was modified
    pub changed: bool,
    /// Names of rewritten nodes
    pub rewritten: Vec<String>,
    /// Nodes left unmodified with the reason (soft failures)
    pub warnings: Vec<RewriteWarning>,
}

impl RewriteReport {
    /// Fold another report into this one
    pub fn merge(&mut self, other: RewriteReport) {
        self.changed |= other.changed;
        self.rewritten.extend(other.rewritten);
        self.warnings.extend(other.warnings);
    }
}

/// Apply one migration pattern across the graph.
///
/// Consumes the model and returns the transformed model plus a report.
/// Cleanup (dead-code elimination + re-topologizing) runs whenever the edge
/// set changed.
pub fn rewrite(
    mut model: ModelProto,
    pattern: &RewritePattern,
) -> ConvertResult<(ModelProto, RewriteReport)> {
    let mut report = RewriteReport::default();

    // Resolve constants against the pre-mutation graph, then edit.
    let mut planned: Vec<(usize, Vec<i64>)> = Vec::new();
    {
        let graph = model.graph_mut();
        let ctx = GraphContext::new(graph);

        for (idx, node) in graph.node.iter().enumerate() {
            if node.op_type != pattern.op_kind {
                continue;
            }
            // Already migrated
            if node.has_attr(pattern.attr_name) {
                continue;
            }
            let input_name = match node.input.get(pattern.input_index) {
                Some(name) if !name.is_empty() => name,
                // No structural-parameter input either; nothing to migrate
                _ => continue,
            };

            match ctx.constant_ints(input_name) {
                Some(Ok(values)) => planned.push((idx, values)),
                Some(Err(e)) => report.warnings.push(RewriteWarning {
                    node: node.name.clone(),
                    op_kind: node.op_type.clone(),
                    reason: format!("constant input '{}' is unreadable: {}", input_name, e),
                }),
                None => report.warnings.push(RewriteWarning {
                    node: node.name.clone(),
                    op_kind: node.op_type.clone(),
                    reason: format!(
                        "input '{}' is not a compile-time constant",
                        input_name
                    ),
                }),
            }
        }

        for (idx, values) in &planned {
            let node = &mut graph.node[*idx];
            node.set_attr_ints(pattern.attr_name, values.clone());
            node.input.remove(pattern.input_index);
            report.rewritten.push(node.name.clone());
        }
    }

    for warning in &report.warnings {
        warn!(node = %warning.node, op = %warning.op_kind, "rewrite skipped: {}", warning.reason);
    }

    if !planned.is_empty() {
        report.changed = true;
        cleanup::run(model.graph_mut())?;
        debug!(
            pattern = pattern.op_kind,
            rewritten = report.rewritten.len(),
            "rewrite pass changed graph"
        );
    }

    Ok((model, report))
}

/// Apply several patterns until none of them changes the graph
pub fn rewrite_to_fixed_point(
    mut model: ModelProto,
    patterns: &[RewritePattern],
    max_passes: usize,
) -> ConvertResult<(ModelProto, RewriteReport)> {
    let mut total = RewriteReport::default();

    for _ in 0..max_passes {
        let mut changed = false;
        for pattern in patterns {
            let (next, report) = rewrite(model, pattern)?;
            model = next;
            changed |= report.changed;
            total.merge(report);
        }
        if !changed {
            break;
        }
    }

    Ok((model, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::{make_int64_initializer, make_node};
    use crate::proto::{GraphProto, ValueInfoProto};

    fn expand_dims_model(axes_constant: bool) -> ModelProto {
        let mut graph = GraphProto {
            node: vec![make_node("ExpandDims", &["x", "axes_in"], &["y"], "ed_0")],
            input: vec![ValueInfoProto {
                name: "x".to_string(),
                ..Default::default()
            }],
            output: vec![ValueInfoProto {
                name: "y".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        if axes_constant {
            graph
                .initializer
                .push(make_int64_initializer("axes_in", vec![1, 2]));
        } else {
            // axes produced at runtime by another node
            graph
                .node
                .insert(0, make_node("Shape", &["x"], &["axes_in"], "shape_0"));
        }
        ModelProto {
            ir_version: 8,
            graph: Some(graph),
            ..Default::default()
        }
    }

    #[test]
    fn test_pattern_selection_respects_opset() {
        let legacy: Vec<&str> = patterns_for_opset(11).iter().map(|p| p.op_kind).collect();
        assert_eq!(legacy, vec!["ExpandDims", "Unsqueeze", "Squeeze", "Split"]);

        // At 13+ the input form is the valid encoding for the versioned ops
        let modern: Vec<&str> = patterns_for_opset(13).iter().map(|p| p.op_kind).collect();
        assert_eq!(modern, vec!["ExpandDims"]);
    }

    #[test]
    fn test_constant_axes_promoted_to_attribute() {
        let model = expand_dims_model(true);
        let (model, report) = rewrite(model, &expand_dims_axes()).unwrap();

        assert!(report.changed);
        assert_eq!(report.rewritten, vec!["ed_0"]);
        assert!(report.warnings.is_empty());

        let graph = model.graph.as_ref().unwrap();
        let node = graph.node.iter().find(|n| n.name == "ed_0").unwrap();
        assert_eq!(node.attr_ints("axes"), Some(&[1, 2][..]));
        assert_eq!(node.input, vec!["x"]);
        // dead axes initializer is gone
        assert!(graph.initializer.is_empty());
    }

    #[test]
    fn test_second_pass_reports_unchanged() {
        let model = expand_dims_model(true);
        let (model, first) = rewrite(model, &expand_dims_axes()).unwrap();
        assert!(first.changed);

        let before = model.clone();
        let (model, second) = rewrite(model, &expand_dims_axes()).unwrap();
        assert!(!second.changed);
        assert!(second.rewritten.is_empty());
        assert_eq!(model, before);
    }

    #[test]
    fn test_runtime_axes_left_with_warning() {
        let model = expand_dims_model(false);
        let (model, report) = rewrite(model, &expand_dims_axes()).unwrap();

        assert!(!report.changed);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].node, "ed_0");

        let graph = model.graph.as_ref().unwrap();
        let node = graph.node.iter().find(|n| n.name == "ed_0").unwrap();
        assert_eq!(node.input.len(), 2);
        assert!(!node.has_attr("axes"));
    }

    #[test]
    fn test_shared_constant_kept_when_still_referenced() {
        let mut model = expand_dims_model(true);
        {
            let graph = model.graph_mut();
            // a second consumer of the axes constant that is not rewritten
            graph
                .node
                .push(make_node("Identity", &["axes_in"], &["z"], "id_0"));
            graph.output.push(ValueInfoProto {
                name: "z".to_string(),
                ..Default::default()
            });
        }

        let (model, report) = rewrite(model, &expand_dims_axes()).unwrap();
        assert!(report.changed);

        let graph = model.graph.as_ref().unwrap();
        assert!(graph.initializer.iter().any(|t| t.name == "axes_in"));
    }

    #[test]
    fn test_constant_node_value_promoted() {
        use crate::proto::onnx::attribute_proto::AttributeType;
        use crate::proto::AttributeProto;

        let mut model = expand_dims_model(false);
        {
            let graph = model.graph_mut();
            // replace the runtime producer with a Constant node
            graph.node.remove(0);
            let mut constant = make_node("Constant", &[], &["axes_in"], "const_0");
            constant.attribute.push(AttributeProto {
                name: "value".to_string(),
                r#type: AttributeType::Tensor as i32,
                t: Some(Box::new(make_int64_initializer("", vec![0]))),
                ..Default::default()
            });
            graph.node.insert(0, constant);
        }

        let (model, report) = rewrite(model, &expand_dims_axes()).unwrap();
        assert!(report.changed);

        let graph = model.graph.as_ref().unwrap();
        let node = graph.node.iter().find(|n| n.name == "ed_0").unwrap();
        assert_eq!(node.attr_ints("axes"), Some(&[0][..]));
        // the Constant node itself became dead and was eliminated
        assert!(!graph.node.iter().any(|n| n.name == "const_0"));
    }

    #[test]
    fn test_fixed_point_over_standard_patterns() {
        let model = expand_dims_model(true);
        let (model, report) = rewrite_to_fixed_point(model, &standard_patterns(), 8).unwrap();
        assert!(report.changed);

        let (_, second) = rewrite_to_fixed_point(model, &standard_patterns(), 8).unwrap();
        assert!(!second.changed);
    }
}
