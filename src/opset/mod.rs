//! Opset version normalization
//!
//! Reconciles a model's declared operator-set version with a caller-chosen
//! target by applying a registered table of per-operator
//! backward-compatibility rules. The container format revision
//! (`ir_version`) evolves independently of the operator set and is handled
//! by the separate, metadata-only [`set_ir_version`].
//!
//! # Supported downgrades
//!
//! | Operator | Changed in | Rule |
//! |-----------|------------|------|
//! | Squeeze | 13 | axes input → `axes` attribute |
//! | Unsqueeze | 13 | axes input → `axes` attribute |
//! | Split | 13 | sizes input → `split` attribute |
//! | Reshape | 14 | drop `allowzero` when 0; fail when non-zero |
//! | ReduceSum | 13 | none (downgrade across 13 fails) |
//! | Pad | 11 | none (downgrade across 11 fails) |

use tracing::{debug, warn};

use crate::error::{ConvertError, ConvertResult};
use crate::graph::cleanup;
use crate::proto::{ModelProto, OperatorSetIdProto};
use crate::rewrite::{self, RewritePattern};

/// Standard-domain aliases in `opset_import`
const ONNX_DOMAIN: &str = "ai.onnx";

/// How one operator's encoding is migrated below its change boundary
#[derive(Debug, Clone, Copy)]
enum DowngradeRule {
    /// Move a constant input into an attribute (the rewriter's migration)
    PromoteInputToAttr {
        input_index: usize,
        attr_name: &'static str,
    },
    /// Drop an attribute that the older encoding does not know. A value
    /// other than the older implicit default cannot be expressed there, so
    /// it fails the downgrade.
    DropDefaultIntAttr { attr_name: &'static str, default: i64 },
}

/// One recorded encoding change for an operator kind
struct VersionChange {
    op_kind: &'static str,
    changed_in: i64,
    rule: Option<DowngradeRule>,
}

/// Standard-domain encoding changes this crate knows about. Operator kinds
/// absent from this table are treated as version-stable.
const CHANGES: &[VersionChange] = &[
    VersionChange {
        op_kind: "Squeeze",
        changed_in: 13,
        rule: Some(DowngradeRule::PromoteInputToAttr {
            input_index: 1,
            attr_name: "axes",
        }),
    },
    VersionChange {
        op_kind: "Unsqueeze",
        changed_in: 13,
        rule: Some(DowngradeRule::PromoteInputToAttr {
            input_index: 1,
            attr_name: "axes",
        }),
    },
    VersionChange {
        op_kind: "Split",
        changed_in: 13,
        rule: Some(DowngradeRule::PromoteInputToAttr {
            input_index: 1,
            attr_name: "split",
        }),
    },
    VersionChange {
        op_kind: "Reshape",
        changed_in: 14,
        rule: Some(DowngradeRule::DropDefaultIntAttr {
            attr_name: "allowzero",
            default: 0,
        }),
    },
    VersionChange {
        op_kind: "ReduceSum",
        changed_in: 13,
        rule: None,
    },
    VersionChange {
        op_kind: "Pad",
        changed_in: 11,
        rule: None,
    },
];

/// Opset downgrader targeting a specific version
pub struct OpsetDowngrader {
    target: i64,
}

impl OpsetDowngrader {
    /// Create a downgrader for the given target opset version
    pub fn new(target: i64) -> Self {
        Self { target }
    }

    /// Opset version of the standard domain, defaulting to 1 when the model
    /// declares none
    pub fn current_version(model: &ModelProto) -> i64 {
        model.opset_version().unwrap_or(1)
    }

    /// Downgrade a model to the target opset version.
    ///
    /// When the declared version is already at or below the target the model
    /// is returned unchanged. Otherwise every operator kind present in the
    /// graph with an encoding change inside the spanned range must have a
    /// registered rule, and every node affected by an input-promotion rule
    /// must carry a compile-time-constant structural input; anything else
    /// fails the whole pass, naming the unmappable kinds, and the input
    /// model is not modified.
    ///
    /// Only the standard domain is versioned here. Declarations for other
    /// domains in `opset_import` are carried through unchanged, and nodes
    /// from those domains are treated as version-stable; a warning is
    /// logged when any are present.
    pub fn downgrade(&self, model: &ModelProto) -> ConvertResult<ModelProto> {
        let from = Self::current_version(model);
        if from <= self.target {
            return Ok(model.clone());
        }

        let custom_domains: Vec<&str> = model
            .opset_import
            .iter()
            .filter(|o| !o.domain.is_empty() && o.domain != ONNX_DOMAIN)
            .map(|o| o.domain.as_str())
            .collect();
        if !custom_domains.is_empty() {
            warn!(
                domains = ?custom_domains,
                "non-standard opset domains are not downgraded and pass through unchanged"
            );
        }

        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| ConvertError::Parse("model does not contain a graph".to_string()))?;

        // Which recorded changes does this downgrade span?
        let spanned: Vec<&VersionChange> = CHANGES
            .iter()
            .filter(|c| self.target < c.changed_in && c.changed_in <= from)
            .collect();

        let mut unmappable: Vec<String> = Vec::new();
        for change in &spanned {
            if change.rule.is_none()
                && graph.node.iter().any(|n| n.op_type == change.op_kind)
            {
                unmappable.push(change.op_kind.to_string());
            }
        }
        unmappable.sort();
        unmappable.dedup();
        if !unmappable.is_empty() {
            return Err(ConvertError::UnsupportedDowngrade {
                ops: unmappable,
                from,
                to: self.target,
            });
        }

        let mut out = model.clone();
        for change in &spanned {
            match change.rule {
                Some(DowngradeRule::PromoteInputToAttr {
                    input_index,
                    attr_name,
                }) => {
                    let pattern = RewritePattern {
                        op_kind: change.op_kind,
                        input_index,
                        attr_name,
                    };
                    let (next, report) = rewrite::rewrite(out, &pattern)?;
                    out = next;
                    // A downgrade cannot preserve the runtime-input form, so
                    // the rewriter's soft failures are fatal here.
                    if !report.warnings.is_empty() {
                        let mut ops: Vec<String> = report
                            .warnings
                            .iter()
                            .map(|w| w.op_kind.clone())
                            .collect();
                        ops.sort();
                        ops.dedup();
                        return Err(ConvertError::UnsupportedDowngrade {
                            ops,
                            from,
                            to: self.target,
                        });
                    }
                }
                Some(DowngradeRule::DropDefaultIntAttr { attr_name, default }) => {
                    // A non-default value has no encoding in the older
                    // dialect, so carrying the attribute over would emit a
                    // half-converted graph.
                    let blocked = out.graph_mut().node.iter().any(|n| {
                        n.op_type == change.op_kind && n.attr_int(attr_name, default) != default
                    });
                    if blocked {
                        return Err(ConvertError::UnsupportedDowngrade {
                            ops: vec![change.op_kind.to_string()],
                            from,
                            to: self.target,
                        });
                    }
                    for node in &mut out.graph_mut().node {
                        if node.op_type == change.op_kind {
                            node.remove_attr(attr_name);
                        }
                    }
                }
                None => {}
            }
        }

        set_opset_version(&mut out, self.target);
        cleanup::run(out.graph_mut())?;

        debug!(from, to = self.target, "opset downgrade complete");
        Ok(out)
    }
}

/// Set the standard-domain opset declaration, replacing or inserting it
fn set_opset_version(model: &mut ModelProto, version: i64) {
    let mut found = false;
    for opset in &mut model.opset_import {
        if opset.domain.is_empty() || opset.domain == ONNX_DOMAIN {
            opset.version = version;
            found = true;
        }
    }
    if !found {
        model.opset_import.push(OperatorSetIdProto {
            domain: String::new(),
            version,
        });
    }
}

/// Override the container format revision (`ir_version`).
///
/// This is a metadata-only edit: it does **not** verify that the operator
/// encodings in the graph are valid for the chosen revision, and it is
/// unsafe without an accompanying validation pass. It is deliberately a
/// separate operation from [`OpsetDowngrader::downgrade`]; the two version
/// axes evolve independently, and a revision override alone can produce a
/// model that a stricter consumer rejects.
pub fn set_ir_version(model: &mut ModelProto, revision: i64) {
    model.ir_version = revision;
}

/// Downgrade a model to a specific opset version
pub fn downgrade_model(model: &ModelProto, target: i64) -> ConvertResult<ModelProto> {
    OpsetDowngrader::new(target).downgrade(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::{make_int64_initializer, make_node};
    use crate::proto::{GraphProto, ValueInfoProto};

    fn model_at(opset: i64, graph: GraphProto) -> ModelProto {
        ModelProto {
            ir_version: 8,
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: opset,
            }],
            graph: Some(graph),
            ..Default::default()
        }
    }

    fn io_graph(nodes: Vec<crate::proto::NodeProto>) -> GraphProto {
        GraphProto {
            node: nodes,
            input: vec![ValueInfoProto {
                name: "x".to_string(),
                ..Default::default()
            }],
            output: vec![ValueInfoProto {
                name: "y".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_no_downgrade_needed() {
        let model = model_at(11, io_graph(vec![make_node("Relu", &["x"], &["y"], "r0")]));
        let out = downgrade_model(&model, 13).unwrap();
        assert_eq!(out, model);
    }

    #[test]
    fn test_unsqueeze_axes_input_becomes_attribute() {
        let mut graph = io_graph(vec![make_node(
            "Unsqueeze",
            &["x", "axes_c"],
            &["y"],
            "u0",
        )]);
        graph
            .initializer
            .push(make_int64_initializer("axes_c", vec![0, 2]));
        let model = model_at(13, graph);

        let out = downgrade_model(&model, 11).unwrap();
        assert_eq!(out.opset_version(), Some(11));

        let node = &out.graph.as_ref().unwrap().node[0];
        assert_eq!(node.attr_ints("axes"), Some(&[0, 2][..]));
        assert_eq!(node.input, vec!["x"]);
        assert!(out.graph.as_ref().unwrap().initializer.is_empty());
    }

    #[test]
    fn test_reshape_allowzero_dropped() {
        let mut reshape = make_node("Reshape", &["x", "shape_c"], &["y"], "rs0");
        reshape
            .attribute
            .push(crate::proto::AttributeProto::new_int("allowzero", 0));
        let mut graph = io_graph(vec![reshape]);
        graph
            .initializer
            .push(make_int64_initializer("shape_c", vec![1, -1]));
        let model = model_at(14, graph);

        let out = downgrade_model(&model, 13).unwrap();
        assert!(!out.graph.as_ref().unwrap().node[0].has_attr("allowzero"));
    }

    #[test]
    fn test_reshape_allowzero_nonzero_blocks_downgrade() {
        let mut reshape = make_node("Reshape", &["x", "shape_c"], &["y"], "rs0");
        reshape
            .attribute
            .push(crate::proto::AttributeProto::new_int("allowzero", 1));
        let mut graph = io_graph(vec![reshape]);
        graph
            .initializer
            .push(make_int64_initializer("shape_c", vec![0, -1]));
        let model = model_at(14, graph);

        let err = downgrade_model(&model, 13).unwrap_err();
        match err {
            ConvertError::UnsupportedDowngrade { ops, from, to } => {
                assert_eq!(ops, vec!["Reshape"]);
                assert_eq!(from, 14);
                assert_eq!(to, 13);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unruled_operator_fails_and_names_it() {
        let graph = io_graph(vec![make_node("ReduceSum", &["x"], &["y"], "rs0")]);
        let model = model_at(15, graph);

        let err = downgrade_model(&model, 11).unwrap_err();
        match err {
            ConvertError::UnsupportedDowngrade { ops, from, to } => {
                assert_eq!(ops, vec!["ReduceSum"]);
                assert_eq!(from, 15);
                assert_eq!(to, 11);
            }
            other => panic!("unexpected error: {other}"),
        }
        // the input model is untouched
        assert_eq!(model.opset_version(), Some(15));
    }

    #[test]
    fn test_runtime_axes_fail_downgrade() {
        let graph = io_graph(vec![
            make_node("Shape", &["x"], &["axes_rt"], "sh0"),
            make_node("Unsqueeze", &["x", "axes_rt"], &["y"], "u0"),
        ]);
        let model = model_at(13, graph);

        let err = downgrade_model(&model, 11).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::UnsupportedDowngrade { .. }
        ));
    }

    #[test]
    fn test_custom_domain_declaration_passes_through() {
        let mut graph = io_graph(vec![make_node(
            "Unsqueeze",
            &["x", "axes_c"],
            &["y"],
            "u0",
        )]);
        graph
            .initializer
            .push(make_int64_initializer("axes_c", vec![0]));
        let mut model = model_at(13, graph);
        model.opset_import.push(OperatorSetIdProto {
            domain: "com.custom".to_string(),
            version: 2,
        });

        let out = downgrade_model(&model, 11).unwrap();
        assert_eq!(out.opset_version(), Some(11));
        let custom = out
            .opset_import
            .iter()
            .find(|o| o.domain == "com.custom")
            .unwrap();
        assert_eq!(custom.version, 2);
    }

    #[test]
    fn test_ir_version_override_is_metadata_only() {
        let mut model = model_at(13, io_graph(vec![make_node("Relu", &["x"], &["y"], "r0")]));
        let nodes_before = model.graph.as_ref().unwrap().node.clone();

        set_ir_version(&mut model, 9);
        assert_eq!(model.ir_version, 9);
        assert_eq!(model.opset_version(), Some(13));
        assert_eq!(model.graph.as_ref().unwrap().node, nodes_before);
    }
}
