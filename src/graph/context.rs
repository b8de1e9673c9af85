//! Read-only graph context
//!
//! `GraphContext` is built once per pass over a borrowed `GraphProto` and
//! provides O(1) lookups for producers, consumers, and constants. Passes
//! mutate the `GraphProto` itself and rebuild the context afterwards, so the
//! maps can never drift out of sync with the graph.

use crate::error::ConvertResult;
use crate::proto::{GraphProto, NodeProto, TensorProto};
use crate::tensor::tensor_to_vec_i64;

use super::maps::{
    build_consumer_map, build_initializer_map, build_producer_map, build_use_count_map,
    ConsumerMap, InitializerMap, ProducerMap, UseCountMap,
};

/// Lookup maps over a borrowed graph
#[derive(Debug)]
pub struct GraphContext<'a> {
    graph: &'a GraphProto,
    producer_map: ProducerMap,
    consumer_map: ConsumerMap,
    initializer_map: InitializerMap<'a>,
    use_count_map: UseCountMap,
}

impl<'a> GraphContext<'a> {
    /// Build the context for a graph
    pub fn new(graph: &'a GraphProto) -> Self {
        Self {
            graph,
            producer_map: build_producer_map(graph),
            consumer_map: build_consumer_map(graph),
            initializer_map: build_initializer_map(graph),
            use_count_map: build_use_count_map(graph),
        }
    }

    /// The node producing a tensor, if any
    pub fn producer(&self, tensor_name: &str) -> Option<&'a NodeProto> {
        self.producer_map
            .get(tensor_name)
            .and_then(|&idx| self.graph.node.get(idx))
    }

    /// Nodes consuming a tensor
    pub fn consumers(&self, tensor_name: &str) -> Vec<&'a NodeProto> {
        self.consumer_map
            .get(tensor_name)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node.get(idx))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of uses of a tensor (node inputs plus graph outputs)
    pub fn use_count(&self, tensor_name: &str) -> usize {
        self.use_count_map.get(tensor_name).copied().unwrap_or(0)
    }

    /// Initializer tensor by name
    pub fn initializer(&self, name: &str) -> Option<&'a TensorProto> {
        self.initializer_map.get(name).copied()
    }

    /// Check whether a tensor is an initializer
    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializer_map.contains_key(name)
    }

    /// Check whether a tensor is a graph input
    pub fn is_graph_input(&self, name: &str) -> bool {
        self.graph.input.iter().any(|vi| vi.name == name)
    }

    /// Resolve a tensor name to a compile-time constant tensor.
    ///
    /// Covers both encodings producers use: a graph initializer, or the
    /// `value` attribute of a `Constant` node feeding the reference.
    pub fn constant_tensor(&self, name: &str) -> Option<&'a TensorProto> {
        if let Some(init) = self.initializer(name) {
            return Some(init);
        }
        let producer = self.producer(name)?;
        if producer.op_type == "Constant" {
            return producer.attr("value").and_then(|a| a.t.as_deref());
        }
        None
    }

    /// Resolve a tensor name to a constant integer list, when possible
    pub fn constant_ints(&self, name: &str) -> Option<ConvertResult<Vec<i64>>> {
        self.constant_tensor(name).map(tensor_to_vec_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::{make_int64_initializer, make_node};
    use crate::proto::{AttributeProto, ValueInfoProto};
    use crate::proto::onnx::attribute_proto::AttributeType;

    fn make_test_graph() -> GraphProto {
        GraphProto {
            node: vec![
                make_node("Conv", &["X", "W"], &["conv_out"], "conv_0"),
                make_node("Relu", &["conv_out"], &["Y"], "relu_0"),
            ],
            input: vec![ValueInfoProto {
                name: "X".to_string(),
                ..Default::default()
            }],
            output: vec![ValueInfoProto {
                name: "Y".to_string(),
                ..Default::default()
            }],
            initializer: vec![make_int64_initializer("W", vec![1, 2, 3])],
            ..Default::default()
        }
    }

    #[test]
    fn test_producer_and_consumers() {
        let graph = make_test_graph();
        let ctx = GraphContext::new(&graph);

        assert_eq!(ctx.producer("conv_out").unwrap().name, "conv_0");
        assert!(ctx.producer("X").is_none());

        let consumers = ctx.consumers("conv_out");
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].name, "relu_0");
    }

    #[test]
    fn test_constant_from_initializer() {
        let graph = make_test_graph();
        let ctx = GraphContext::new(&graph);

        assert!(ctx.is_initializer("W"));
        assert_eq!(ctx.constant_ints("W").unwrap().unwrap(), vec![1, 2, 3]);
        assert!(ctx.constant_tensor("X").is_none());
    }

    #[test]
    fn test_constant_from_constant_node() {
        let mut graph = make_test_graph();
        let mut constant = make_node("Constant", &[], &["c"], "const_0");
        constant.attribute.push(AttributeProto {
            name: "value".to_string(),
            r#type: AttributeType::Tensor as i32,
            t: Some(Box::new(make_int64_initializer("", vec![4, 5]))),
            ..Default::default()
        });
        graph.node.insert(0, constant);

        let ctx = GraphContext::new(&graph);
        assert_eq!(ctx.constant_ints("c").unwrap().unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_use_count() {
        let graph = make_test_graph();
        let ctx = GraphContext::new(&graph);

        assert_eq!(ctx.use_count("conv_out"), 1);
        assert_eq!(ctx.use_count("Y"), 1);
        assert_eq!(ctx.use_count("nonexistent"), 0);
    }
}
