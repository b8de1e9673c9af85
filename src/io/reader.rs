//! ONNX model loading

use std::fs;
use std::path::Path;

use prost::Message;

use crate::error::{ConvertError, ConvertResult};
use crate::proto::ModelProto;

/// Decode an ONNX model from bytes.
///
/// Pure deserialization: no file-system coupling, no mutation. A buffer that
/// does not match the container schema, or a model without a graph payload,
/// is rejected with a parse error.
pub fn load_model_from_bytes(bytes: &[u8]) -> ConvertResult<ModelProto> {
    let model = ModelProto::decode(bytes)
        .map_err(|e| ConvertError::Parse(format!("not a valid ONNX model: {}", e)))?;

    if model.graph.is_none() {
        return Err(ConvertError::Parse(
            "model does not contain a graph".to_string(),
        ));
    }

    Ok(model)
}

/// Load an ONNX model from a file path
pub fn load_model<P: AsRef<Path>>(path: P) -> ConvertResult<ModelProto> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        ConvertError::Parse(format!("failed to read '{}': {}", path.display(), e))
    })?;
    load_model_from_bytes(&bytes)
}
