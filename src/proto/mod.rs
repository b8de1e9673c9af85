//! ONNX protobuf types
//!
//! The message definitions live in [`onnx`] as checked-in prost types;
//! convenience methods are provided in the [`extensions`] submodule.

pub mod onnx;

pub use onnx::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto,
};

pub use onnx::tensor_proto;
pub use onnx::tensor_shape_proto;
pub use onnx::type_proto;

pub mod extensions;
