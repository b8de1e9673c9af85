//! TFLite flatbuffer schema constants
//!
//! Vtable offsets and enum values transcribed from the TFLite schema
//! (schema_v3). Tables are built by hand with the `flatbuffers` builder, so
//! only the fields the exporter writes are listed. A field with id N lives at
//! vtable offset `4 + 2 * N`.

#![allow(missing_docs)]

/// Flatbuffer file identifier for TFLite models
pub const TFLITE_FILE_ID: &str = "TFL3";

/// TFLite schema version written into the root table
pub const TFLITE_SCHEMA_VERSION: u32 = 3;

/// Vtable field offsets per table
pub mod vt {
    /// Root `Model` table
    pub mod model {
        pub const VERSION: u16 = 4;
        pub const OPERATOR_CODES: u16 = 6;
        pub const SUBGRAPHS: u16 = 8;
        pub const DESCRIPTION: u16 = 10;
        pub const BUFFERS: u16 = 12;
    }

    /// `SubGraph` table
    pub mod sub_graph {
        pub const TENSORS: u16 = 4;
        pub const INPUTS: u16 = 6;
        pub const OUTPUTS: u16 = 8;
        pub const OPERATORS: u16 = 10;
        pub const NAME: u16 = 12;
    }

    /// `Tensor` table
    pub mod tensor {
        pub const SHAPE: u16 = 4;
        pub const TYPE: u16 = 6;
        pub const BUFFER: u16 = 8;
        pub const NAME: u16 = 10;
        pub const QUANTIZATION: u16 = 12;
    }

    /// `Operator` table
    pub mod operator {
        pub const OPCODE_INDEX: u16 = 4;
        pub const INPUTS: u16 = 6;
        pub const OUTPUTS: u16 = 8;
    }

    /// `OperatorCode` table
    pub mod operator_code {
        pub const DEPRECATED_BUILTIN_CODE: u16 = 4;
        pub const CUSTOM_CODE: u16 = 6;
        pub const VERSION: u16 = 8;
        pub const BUILTIN_CODE: u16 = 10;
    }

    /// `Buffer` table
    pub mod buffer {
        pub const DATA: u16 = 4;
    }

    /// `QuantizationParameters` table
    pub mod quantization {
        pub const MIN: u16 = 4;
        pub const MAX: u16 = 6;
        pub const SCALE: u16 = 8;
        pub const ZERO_POINT: u16 = 10;
    }
}

/// `BuiltinOperator` enum values
pub mod builtin_op {
    pub const ADD: i32 = 0;
    pub const AVERAGE_POOL_2D: i32 = 1;
    pub const CONCATENATION: i32 = 2;
    pub const CONV_2D: i32 = 3;
    pub const DEPTHWISE_CONV_2D: i32 = 4;
    pub const FULLY_CONNECTED: i32 = 9;
    pub const LOGISTIC: i32 = 14;
    pub const MAX_POOL_2D: i32 = 17;
    pub const MUL: i32 = 18;
    pub const RELU: i32 = 19;
    pub const RESHAPE: i32 = 22;
    pub const SOFTMAX: i32 = 25;
    pub const TANH: i32 = 28;
    pub const PAD: i32 = 34;
    pub const GATHER: i32 = 36;
    pub const TRANSPOSE: i32 = 39;
    pub const MEAN: i32 = 40;
    pub const SUB: i32 = 41;
    pub const DIV: i32 = 42;
    pub const SQUEEZE: i32 = 43;
    pub const SPLIT: i32 = 49;
    pub const SLICE: i32 = 65;
    pub const EXPAND_DIMS: i32 = 70;
    pub const LEAKY_RELU: i32 = 98;
    pub const BATCH_MATMUL: i32 = 126;
}

/// `TensorType` enum values
pub mod tensor_type {
    pub const FLOAT32: i8 = 0;
    pub const FLOAT16: i8 = 1;
    pub const INT32: i8 = 2;
    pub const UINT8: i8 = 3;
    pub const INT64: i8 = 4;
    pub const STRING: i8 = 5;
    pub const BOOL: i8 = 6;
    pub const INT16: i8 = 7;
    pub const INT8: i8 = 9;
}

use crate::proto::tensor_proto::DataType;

/// Builtin opcode for an ONNX operator kind, if the exporter supports it
pub fn builtin_for_op(op_kind: &str) -> Option<i32> {
    Some(match op_kind {
        "Add" => builtin_op::ADD,
        "AveragePool" => builtin_op::AVERAGE_POOL_2D,
        "Concat" => builtin_op::CONCATENATION,
        "Conv" => builtin_op::CONV_2D,
        "Gemm" | "MatMul" => builtin_op::BATCH_MATMUL,
        "Sigmoid" => builtin_op::LOGISTIC,
        "MaxPool" => builtin_op::MAX_POOL_2D,
        "Mul" => builtin_op::MUL,
        "Relu" => builtin_op::RELU,
        "Reshape" => builtin_op::RESHAPE,
        "Softmax" => builtin_op::SOFTMAX,
        "Tanh" => builtin_op::TANH,
        "Pad" => builtin_op::PAD,
        "Gather" => builtin_op::GATHER,
        "Transpose" => builtin_op::TRANSPOSE,
        "ReduceMean" => builtin_op::MEAN,
        "Sub" => builtin_op::SUB,
        "Div" => builtin_op::DIV,
        "Squeeze" => builtin_op::SQUEEZE,
        "Split" => builtin_op::SPLIT,
        "Slice" => builtin_op::SLICE,
        "Unsqueeze" | "ExpandDims" => builtin_op::EXPAND_DIMS,
        "LeakyRelu" => builtin_op::LEAKY_RELU,
        _ => return None,
    })
}

/// TFLite tensor type for an ONNX element type
pub fn tflite_type_for(dtype: DataType) -> i8 {
    match dtype {
        DataType::Float => tensor_type::FLOAT32,
        DataType::Float16 => tensor_type::FLOAT16,
        DataType::Int32 => tensor_type::INT32,
        DataType::Uint8 => tensor_type::UINT8,
        DataType::Int64 => tensor_type::INT64,
        DataType::String => tensor_type::STRING,
        DataType::Bool => tensor_type::BOOL,
        DataType::Int16 => tensor_type::INT16,
        DataType::Int8 => tensor_type::INT8,
        _ => tensor_type::FLOAT32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_mapping() {
        assert_eq!(builtin_for_op("Conv"), Some(builtin_op::CONV_2D));
        assert_eq!(builtin_for_op("MatMul"), Some(builtin_op::BATCH_MATMUL));
        assert_eq!(builtin_for_op("NonMaxSuppression"), None);
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(tflite_type_for(DataType::Float), tensor_type::FLOAT32);
        assert_eq!(tflite_type_for(DataType::Int8), tensor_type::INT8);
    }
}
