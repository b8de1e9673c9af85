//! # onnx2tflite
//!
//! ONNX to TFLite model converter.
//!
//! This crate loads an ONNX model, downgrades it to a target opset,
//! migrates structural parameters from inputs back into attributes, and
//! serializes the result as a TFLite flatbuffer, optionally with
//! post-training int8 quantization.
//!
//! ## Features
//!
//! - **Opset Downgrading**: Rule-table driven migration to older opsets
//! - **Structural Rewrites**: Axes/split inputs folded into attributes
//! - **Validation**: Structural checks collecting every violation at once
//! - **TFLite Export**: Manual flatbuffer assembly, no generated schema code
//!
//! ## Example
//!
//! ```ignore
//! use onnx2tflite::prelude::*;
//!
//! let stats = convert_file("model.onnx", "model.tflite", &ConvertConfig::new())?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cancel;
pub mod convert;
pub mod error;
pub mod graph;
pub mod inspect;
pub mod io;
pub mod opset;
pub mod proto;
pub mod rewrite;
pub mod tensor;
pub mod tflite;
pub mod validate;

/// Prelude module - import commonly used types with `use onnx2tflite::prelude::*`
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::convert::{
        convert_bytes, convert_file, convert_model, ConvertConfig, ConvertStats,
    };
    pub use crate::error::{ConvertError, ConvertResult};
    pub use crate::graph::GraphContext;
    pub use crate::inspect::{describe, ModelSummary};
    pub use crate::io::{load_model, load_model_from_bytes, save_model};
    pub use crate::opset::{downgrade_model, set_ir_version, OpsetDowngrader};
    pub use crate::proto::onnx::*;
    pub use crate::rewrite::{rewrite, rewrite_to_fixed_point, RewritePattern};
    pub use crate::tflite::{CalibrationSource, ExportOptions, InMemoryCalibration};
    pub use crate::validate::{check_model, validate_model, ValidationReport};
}

pub use convert::{ConvertConfig, ConvertStats, DEFAULT_TARGET_OPSET};
pub use error::{ConvertError, ConvertResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_target() {
        assert_eq!(DEFAULT_TARGET_OPSET, 11);
    }
}
