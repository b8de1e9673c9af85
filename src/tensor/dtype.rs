//! ONNX element-type bookkeeping

use crate::error::{ConvertError, ConvertResult};
use crate::proto::tensor_proto::DataType;

/// Size in bytes of one element of the given type
pub fn dtype_size(dtype: DataType) -> ConvertResult<usize> {
    match dtype {
        DataType::Uint8 | DataType::Int8 | DataType::Bool => Ok(1),
        DataType::Uint16 | DataType::Int16 | DataType::Float16 | DataType::Bfloat16 => Ok(2),
        DataType::Float | DataType::Int32 | DataType::Uint32 => Ok(4),
        DataType::Double | DataType::Int64 | DataType::Uint64 => Ok(8),
        other => Err(ConvertError::Parse(format!(
            "unsupported element type {:?}",
            other
        ))),
    }
}

/// Convert a raw i32 discriminant into the DataType enum
pub fn i32_to_dtype(value: i32) -> ConvertResult<DataType> {
    DataType::try_from(value)
        .map_err(|_| ConvertError::Parse(format!("unknown element type {}", value)))
}

/// Human-readable name for a raw element-type code
pub fn dtype_name(value: i32) -> &'static str {
    match DataType::try_from(value) {
        Ok(DataType::Float) => "float32",
        Ok(DataType::Uint8) => "uint8",
        Ok(DataType::Int8) => "int8",
        Ok(DataType::Uint16) => "uint16",
        Ok(DataType::Int16) => "int16",
        Ok(DataType::Int32) => "int32",
        Ok(DataType::Int64) => "int64",
        Ok(DataType::String) => "string",
        Ok(DataType::Bool) => "bool",
        Ok(DataType::Float16) => "float16",
        Ok(DataType::Double) => "float64",
        Ok(DataType::Uint32) => "uint32",
        Ok(DataType::Uint64) => "uint64",
        Ok(DataType::Bfloat16) => "bfloat16",
        _ => "unknown",
    }
}

/// Floating-point element types
pub fn is_float_type(dtype: DataType) -> bool {
    matches!(
        dtype,
        DataType::Float | DataType::Double | DataType::Float16 | DataType::Bfloat16
    )
}

/// Integer element types
pub fn is_int_type(dtype: DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Uint8
            | DataType::Uint16
            | DataType::Uint32
            | DataType::Uint64
    )
}
