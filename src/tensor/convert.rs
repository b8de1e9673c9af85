//! Decoding ONNX tensor payloads into Rust values
//!
//! ONNX stores tensor data either in `raw_data` (packed little-endian) or in
//! one of the typed repeated fields, depending on the producer. Both forms
//! are handled here.

use ndarray::{Array, ArrayD, IxDyn};

use crate::error::{ConvertError, ConvertResult};
use crate::proto::tensor_proto::DataType;
use crate::proto::TensorProto;

use super::dtype::i32_to_dtype;

/// Decode an integer tensor (axes lists, split sizes, shapes) to a flat vec
pub fn tensor_to_vec_i64(tensor: &TensorProto) -> ConvertResult<Vec<i64>> {
    let dtype = i32_to_dtype(tensor.data_type)?;
    let expected = tensor.num_elements();

    let data: Vec<i64> = if !tensor.raw_data.is_empty() {
        match dtype {
            DataType::Int64 => tensor
                .raw_data
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
                .collect(),
            DataType::Int32 => tensor
                .raw_data
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes(c.try_into().unwrap()) as i64)
                .collect(),
            other => {
                return Err(ConvertError::Parse(format!(
                    "tensor '{}': expected integer data, found {:?}",
                    tensor.name, other
                )))
            }
        }
    } else {
        match dtype {
            DataType::Int64 => tensor.int64_data.clone(),
            DataType::Int32 => tensor.int32_data.iter().map(|&v| v as i64).collect(),
            other => {
                return Err(ConvertError::Parse(format!(
                    "tensor '{}': expected integer data, found {:?}",
                    tensor.name, other
                )))
            }
        }
    };

    if data.len() != expected {
        return Err(ConvertError::Parse(format!(
            "tensor '{}': {} elements do not match shape {:?}",
            tensor.name,
            data.len(),
            tensor.dims
        )));
    }

    Ok(data)
}

/// Decode a float tensor to a flat vec
pub fn tensor_to_vec_f32(tensor: &TensorProto) -> ConvertResult<Vec<f32>> {
    let dtype = i32_to_dtype(tensor.data_type)?;
    let expected = tensor.num_elements();

    let data: Vec<f32> = if !tensor.raw_data.is_empty() {
        match dtype {
            DataType::Float => tensor
                .raw_data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect(),
            DataType::Double => tensor
                .raw_data
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()) as f32)
                .collect(),
            other => {
                return Err(ConvertError::Parse(format!(
                    "tensor '{}': expected float data, found {:?}",
                    tensor.name, other
                )))
            }
        }
    } else {
        match dtype {
            DataType::Float => tensor.float_data.clone(),
            DataType::Double => tensor.double_data.iter().map(|&v| v as f32).collect(),
            other => {
                return Err(ConvertError::Parse(format!(
                    "tensor '{}': expected float data, found {:?}",
                    tensor.name, other
                )))
            }
        }
    };

    if data.len() != expected {
        return Err(ConvertError::Parse(format!(
            "tensor '{}': {} elements do not match shape {:?}",
            tensor.name,
            data.len(),
            tensor.dims
        )));
    }

    Ok(data)
}

/// Decode a float tensor into an ndarray with its declared shape
pub fn tensor_to_array_f32(tensor: &TensorProto) -> ConvertResult<ArrayD<f32>> {
    let shape: Vec<usize> = tensor.dims.iter().map(|&d| d.max(0) as usize).collect();
    let data = tensor_to_vec_f32(tensor)?;
    Array::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| ConvertError::Parse(format!("tensor '{}': {}", tensor.name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int64_tensor(values: &[i64]) -> TensorProto {
        TensorProto {
            name: "t".to_string(),
            dims: vec![values.len() as i64],
            data_type: DataType::Int64 as i32,
            int64_data: values.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_i64_from_typed_field() {
        let t = int64_tensor(&[1, 2]);
        assert_eq!(tensor_to_vec_i64(&t).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_i64_from_raw_data() {
        let mut raw = Vec::new();
        for v in [3i64, -1] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let t = TensorProto {
            name: "t".to_string(),
            dims: vec![2],
            data_type: DataType::Int64 as i32,
            raw_data: raw,
            ..Default::default()
        };
        assert_eq!(tensor_to_vec_i64(&t).unwrap(), vec![3, -1]);
    }

    #[test]
    fn test_f32_from_raw_data() {
        let mut raw = Vec::new();
        for v in [0.5f32, -2.0] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let t = TensorProto {
            name: "t".to_string(),
            dims: vec![2],
            data_type: DataType::Float as i32,
            raw_data: raw,
            ..Default::default()
        };
        assert_eq!(tensor_to_vec_f32(&t).unwrap(), vec![0.5, -2.0]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let t = TensorProto {
            name: "t".to_string(),
            dims: vec![3],
            data_type: DataType::Int64 as i32,
            int64_data: vec![1],
            ..Default::default()
        };
        assert!(tensor_to_vec_i64(&t).is_err());
    }

    #[test]
    fn test_array_shape() {
        let t = TensorProto {
            name: "t".to_string(),
            dims: vec![2, 2],
            data_type: DataType::Float as i32,
            float_data: vec![1.0, 2.0, 3.0, 4.0],
            ..Default::default()
        };
        let arr = tensor_to_array_f32(&t).unwrap();
        assert_eq!(arr.shape(), &[2, 2]);
        assert_eq!(arr[[1, 0]], 3.0);
    }
}
