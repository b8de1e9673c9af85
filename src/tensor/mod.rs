//! Tensor utilities
//!
//! Decoding of ONNX tensor payloads (both `raw_data` and the typed repeated
//! fields) plus element-type bookkeeping shared by the rewriter, validator,
//! and exporter.

pub mod convert;
pub mod dtype;

pub use convert::{tensor_to_array_f32, tensor_to_vec_f32, tensor_to_vec_i64};
pub use dtype::{dtype_name, dtype_size, i32_to_dtype, is_float_type, is_int_type};
