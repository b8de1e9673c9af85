//! TFLite export
//!
//! Serialization of a converted graph into the TFLite flatbuffer format,
//! optionally with post-training int8 quantization of graph inputs and
//! weight tensors.

pub mod builder;
pub mod quant;
pub mod schema;

pub use builder::export;
pub use quant::{CalibrationSample, CalibrationSource, InMemoryCalibration, QuantParams};

use crate::cancel::CancelToken;

/// Export-time options
#[derive(Default)]
pub struct ExportOptions<'a> {
    /// Quantize graph inputs and float weights to int8
    pub quantize: bool,
    /// Representative input data; required when `quantize` is set
    pub calibration: Option<&'a dyn CalibrationSource>,
    /// Cancellation token polled between calibration samples
    pub cancel: CancelToken,
}
