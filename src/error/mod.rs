//! Error types for onnx2tflite
//!
//! All fatal conditions in the conversion pipeline are reported through
//! [`ConvertError`]. Per-node rewrite diagnostics are soft and travel in
//! [`crate::rewrite::RewriteReport`] instead.

use thiserror::Error;

/// Main error type for conversion operations
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Source bytes do not match the ONNX container schema
    #[error("failed to parse model: {0}")]
    Parse(String),

    /// One or more operator kinds cannot be migrated across the requested
    /// opset span
    #[error("no downgrade rule for [{}] over opset {from} -> {to}", ops.join(", "))]
    UnsupportedDowngrade {
        /// Operator kinds lacking a migration rule, sorted and deduplicated
        ops: Vec<String>,
        /// Opset version the graph was authored against
        from: i64,
        /// Requested target opset version
        to: i64,
    },

    /// Structural or semantic invariant violations, collected where feasible
    #[error("graph validation failed: {}", violations.join("; "))]
    Validation {
        /// Every violation detected in one pass
        violations: Vec<String>,
    },

    /// Quantized export was requested without calibration samples
    #[error("quantized export requires calibration samples")]
    CalibrationMissing,

    /// Target-format serialization failure
    #[error("export failed: {0}")]
    Export(String),

    /// Conversion was cancelled cooperatively between stages or samples
    #[error("conversion cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protobuf decode error
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl ConvertError {
    /// Build a validation error from collected violations
    pub fn validation(violations: Vec<String>) -> Self {
        ConvertError::Validation { violations }
    }
}

/// Result type alias for conversion operations
pub type ConvertResult<T> = Result<T, ConvertError>;
