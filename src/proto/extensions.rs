//! Convenience methods for the ONNX protobuf types

use super::onnx::attribute_proto::AttributeType;
use super::onnx::*;

impl ModelProto {
    /// Opset version declared for the standard domain, if any
    pub fn opset_version(&self) -> Option<i64> {
        self.opset_import
            .iter()
            .find(|op| op.domain.is_empty() || op.domain == "ai.onnx")
            .map(|op| op.version)
    }

    /// Mutable graph reference, creating an empty graph if absent
    pub fn graph_mut(&mut self) -> &mut GraphProto {
        self.graph.get_or_insert_with(GraphProto::default)
    }
}

impl NodeProto {
    /// Get attribute by name
    pub fn attr(&self, name: &str) -> Option<&AttributeProto> {
        self.attribute.iter().find(|a| a.name == name)
    }

    /// Check if the node carries an attribute
    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Integer attribute value, or `default` when absent
    pub fn attr_int(&self, name: &str, default: i64) -> i64 {
        self.attr(name).map(|a| a.i).unwrap_or(default)
    }

    /// Integer-list attribute value
    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        self.attr(name).map(|a| a.ints.as_slice())
    }

    /// Remove an attribute by name, returning it when present
    pub fn remove_attr(&mut self, name: &str) -> Option<AttributeProto> {
        let pos = self.attribute.iter().position(|a| a.name == name)?;
        Some(self.attribute.remove(pos))
    }

    /// Set or replace an integer-list attribute
    pub fn set_attr_ints(&mut self, name: &str, values: Vec<i64>) {
        for attr in &mut self.attribute {
            if attr.name == name {
                attr.ints = values;
                attr.r#type = AttributeType::Ints as i32;
                return;
            }
        }
        self.attribute.push(AttributeProto::new_ints(name, values));
    }
}

impl AttributeProto {
    /// Create an integer attribute
    pub fn new_int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            i: value,
            r#type: AttributeType::Int as i32,
            ..Default::default()
        }
    }

    /// Create an integer-list attribute
    pub fn new_ints(name: &str, values: Vec<i64>) -> Self {
        Self {
            name: name.to_string(),
            ints: values,
            r#type: AttributeType::Ints as i32,
            ..Default::default()
        }
    }
}

impl ValueInfoProto {
    /// Shape dimensions, with -1 standing in for symbolic dimensions
    pub fn shape(&self) -> Option<Vec<i64>> {
        let t = self.r#type.as_ref()?;
        let type_proto::Value::TensorType(tensor) = t.value.as_ref()?;
        let shape = tensor.shape.as_ref()?;
        Some(
            shape
                .dim
                .iter()
                .map(|d| match &d.value {
                    Some(tensor_shape_proto::dimension::Value::DimValue(v)) => *v,
                    _ => -1,
                })
                .collect(),
        )
    }

    /// Element type when this describes a tensor
    pub fn elem_type(&self) -> Option<i32> {
        let t = self.r#type.as_ref()?;
        let type_proto::Value::TensorType(tensor) = t.value.as_ref()?;
        Some(tensor.elem_type)
    }
}

impl TensorProto {
    /// Total number of elements implied by `dims`
    pub fn num_elements(&self) -> usize {
        self.dims.iter().map(|&d| d.max(0) as usize).product()
    }
}

/// Create a NodeProto with the given wiring
pub fn make_node(op_type: &str, inputs: &[&str], outputs: &[&str], name: &str) -> NodeProto {
    NodeProto {
        op_type: op_type.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// Create a ValueInfoProto for a tensor with a concrete shape
pub fn make_tensor_value_info(name: &str, elem_type: i32, shape: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: Some(TensorShapeProto {
                    dim: shape
                        .iter()
                        .map(|&d| tensor_shape_proto::Dimension {
                            value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
                            denotation: String::new(),
                        })
                        .collect(),
                }),
            })),
            denotation: String::new(),
        }),
        doc_string: String::new(),
    }
}

/// Create an int64 initializer tensor
pub fn make_int64_initializer(name: &str, values: Vec<i64>) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: vec![values.len() as i64],
        data_type: tensor_proto::DataType::Int64 as i32,
        int64_data: values,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_accessors() {
        let mut node = make_node("Concat", &["a", "b"], &["c"], "concat_0");
        node.attribute.push(AttributeProto::new_int("axis", 1));

        assert_eq!(node.attr_int("axis", 0), 1);
        assert_eq!(node.attr_int("missing", 7), 7);
        assert!(node.has_attr("axis"));
        assert!(node.remove_attr("axis").is_some());
        assert!(!node.has_attr("axis"));
    }

    #[test]
    fn test_set_attr_ints_replaces() {
        let mut node = make_node("ExpandDims", &["x"], &["y"], "e0");
        node.set_attr_ints("axes", vec![0]);
        node.set_attr_ints("axes", vec![1, 2]);

        assert_eq!(node.attr_ints("axes"), Some(&[1, 2][..]));
        assert_eq!(node.attribute.len(), 1);
    }

    #[test]
    fn test_value_info_shape() {
        let vi = make_tensor_value_info("x", 1, &[1, 3, 512, 512]);
        assert_eq!(vi.shape(), Some(vec![1, 3, 512, 512]));
        assert_eq!(vi.elem_type(), Some(1));
    }

    #[test]
    fn test_opset_version_lookup() {
        let model = ModelProto {
            opset_import: vec![
                OperatorSetIdProto {
                    domain: "com.custom".to_string(),
                    version: 2,
                },
                OperatorSetIdProto {
                    domain: String::new(),
                    version: 13,
                },
            ],
            ..Default::default()
        };
        assert_eq!(model.opset_version(), Some(13));
    }
}
