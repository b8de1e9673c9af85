//! Conversion pipeline
//!
//! Drives the full ONNX-to-TFLite flow: validate, downgrade to the target
//! opset, migrate structural parameters into attributes, validate again,
//! then serialize. Every stage takes its knobs from one [`ConvertConfig`]
//! value, so a pipeline invocation is reproducible from the config alone.

use std::path::Path;

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::ConvertResult;
use crate::io;
use crate::opset::{self, OpsetDowngrader};
use crate::proto::ModelProto;
use crate::rewrite;
use crate::tflite::{self, CalibrationSource, ExportOptions};
use crate::validate;

/// Opset the exporter targets by default; matches the most recent version
/// every supported operator has a downgrade path to
pub const DEFAULT_TARGET_OPSET: i64 = 11;

/// Bound on rewrite passes; the patterns converge in one pass on
/// well-formed graphs, so hitting the bound means a pathological input
pub const DEFAULT_MAX_REWRITE_PASSES: usize = 8;

/// All knobs of one conversion run
#[derive(Default)]
pub struct ConvertConfig<'a> {
    /// Opset version to downgrade the model to before export
    pub target_opset: i64,
    /// Rewrite the declared IR format revision in the output metadata.
    /// The payload is not migrated, so the result may not load under the
    /// claimed revision.
    pub ir_version_override: Option<i64>,
    /// Upper bound on structural-parameter rewrite passes
    pub max_rewrite_passes: usize,
    /// Quantize graph inputs and float weights to int8
    pub quantize: bool,
    /// Representative input data; required when `quantize` is set
    pub calibration: Option<&'a dyn CalibrationSource>,
    /// Cancellation token polled during calibration
    pub cancel: CancelToken,
}

impl ConvertConfig<'_> {
    /// Config with the standard target opset and pass bound
    pub fn new() -> Self {
        Self {
            target_opset: DEFAULT_TARGET_OPSET,
            max_rewrite_passes: DEFAULT_MAX_REWRITE_PASSES,
            ..Default::default()
        }
    }
}

/// What one conversion run did
#[derive(Debug, Clone, Default)]
pub struct ConvertStats {
    /// Opset version of the input model
    pub opset_from: i64,
    /// Opset version after downgrading
    pub opset_to: i64,
    /// Nodes whose structural parameters were migrated to attributes
    pub nodes_rewritten: usize,
    /// Nodes skipped by the rewriter with a warning
    pub rewrite_warnings: usize,
    /// Node count of the exported graph
    pub nodes: usize,
    /// Size of the emitted TFLite file
    pub output_bytes: usize,
}

/// Run the pipeline on an in-memory model
pub fn convert_model(
    model: &ModelProto,
    config: &ConvertConfig<'_>,
) -> ConvertResult<(Vec<u8>, ConvertStats)> {
    validate::check_model(model)?;

    let opset_from = OpsetDowngrader::current_version(model);
    let target = if config.target_opset > 0 {
        config.target_opset
    } else {
        DEFAULT_TARGET_OPSET
    };

    let model = OpsetDowngrader::new(target).downgrade(model)?;
    validate::check_model(&model)?;
    let opset_to = OpsetDowngrader::current_version(&model);

    let max_passes = config.max_rewrite_passes.max(1);
    let patterns = rewrite::patterns_for_opset(opset_to);
    let (mut model, report) = rewrite::rewrite_to_fixed_point(model, &patterns, max_passes)?;
    validate::check_model(&model)?;

    if let Some(revision) = config.ir_version_override {
        warn!(
            revision,
            "overriding IR format revision in metadata only; payload is unchanged"
        );
        opset::set_ir_version(&mut model, revision);
    }

    let options = ExportOptions {
        quantize: config.quantize,
        calibration: config.calibration,
        cancel: config.cancel.clone(),
    };
    let bytes = tflite::export(&model, &options)?;

    let stats = ConvertStats {
        opset_from,
        opset_to,
        nodes_rewritten: report.rewritten.len(),
        rewrite_warnings: report.warnings.len(),
        nodes: model.graph.as_ref().map(|g| g.node.len()).unwrap_or(0),
        output_bytes: bytes.len(),
    };
    info!(
        opset_from = stats.opset_from,
        opset_to = stats.opset_to,
        rewritten = stats.nodes_rewritten,
        bytes = stats.output_bytes,
        "conversion complete"
    );

    Ok((bytes, stats))
}

/// Run the pipeline on serialized ONNX bytes
pub fn convert_bytes(
    bytes: &[u8],
    config: &ConvertConfig<'_>,
) -> ConvertResult<(Vec<u8>, ConvertStats)> {
    let model = io::load_model_from_bytes(bytes)?;
    convert_model(&model, config)
}

/// Convert a model file on disk; the output is written atomically
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &ConvertConfig<'_>,
) -> ConvertResult<ConvertStats> {
    let model = io::load_model(input)?;
    let (bytes, stats) = convert_model(&model, config)?;
    io::save_bytes_atomic(&bytes, output)?;
    Ok(stats)
}
