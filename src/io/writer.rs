//! Artifact writing
//!
//! File-level saves go through a temporary path in the destination directory
//! followed by a rename, so a mid-write failure never leaves a truncated
//! artifact visible at the destination.

use std::fs;
use std::path::Path;

use prost::Message;

use crate::error::{ConvertError, ConvertResult};
use crate::proto::ModelProto;

/// Encode an ONNX model to bytes
pub fn model_to_bytes(model: &ModelProto) -> Vec<u8> {
    model.encode_to_vec()
}

/// Write bytes to a path atomically (temp file + rename)
pub fn save_bytes_atomic<P: AsRef<Path>>(bytes: &[u8], path: P) -> ConvertResult<()> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| ConvertError::Export(format!("invalid path '{}'", path.display())))?;

    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(format!(".tmp.{}", std::process::id()));
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Save an ONNX model to a file, atomically
pub fn save_model<P: AsRef<Path>>(model: &ModelProto, path: P) -> ConvertResult<()> {
    save_bytes_atomic(&model_to_bytes(model), path)
}
