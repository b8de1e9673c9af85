//! Lookup-map types and builders for graph traversal

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::proto::{GraphProto, TensorProto};

/// Maps output tensor name → index of the producing node
pub type ProducerMap = FxHashMap<String, usize>;

/// Maps tensor name → indices of consuming nodes.
/// SmallVec optimized for the common case of 1-4 consumers.
pub type ConsumerMap = FxHashMap<String, SmallVec<[usize; 4]>>;

/// Maps initializer name → tensor (insertion order preserved)
pub type InitializerMap<'a> = IndexMap<String, &'a TensorProto>;

/// Maps tensor name → reference count over node inputs and graph outputs
pub type UseCountMap = FxHashMap<String, usize>;

/// Build the producer map. Later nodes win on duplicate output names; the
/// validator reports that case separately.
pub fn build_producer_map(graph: &GraphProto) -> ProducerMap {
    let mut map = FxHashMap::default();
    for (idx, node) in graph.node.iter().enumerate() {
        for output in &node.output {
            if !output.is_empty() {
                map.insert(output.clone(), idx);
            }
        }
    }
    map
}

/// Build the consumer map
pub fn build_consumer_map(graph: &GraphProto) -> ConsumerMap {
    let mut map: ConsumerMap = FxHashMap::default();
    for (idx, node) in graph.node.iter().enumerate() {
        for input in &node.input {
            if !input.is_empty() {
                map.entry(input.clone()).or_default().push(idx);
            }
        }
    }
    map
}

/// Build the initializer map
pub fn build_initializer_map(graph: &GraphProto) -> InitializerMap<'_> {
    graph
        .initializer
        .iter()
        .map(|t| (t.name.clone(), t))
        .collect()
}

/// Build the use-count map
pub fn build_use_count_map(graph: &GraphProto) -> UseCountMap {
    let mut map: UseCountMap = FxHashMap::default();
    for node in &graph.node {
        for input in &node.input {
            if !input.is_empty() {
                *map.entry(input.clone()).or_insert(0) += 1;
            }
        }
    }
    for output in &graph.output {
        *map.entry(output.name.clone()).or_insert(0) += 1;
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::make_node;
    use crate::proto::ValueInfoProto;

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
            initializer: vec![TensorProto {
                name: "W".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_producer_map() {
        let graph = make_test_graph();
        let map = build_producer_map(&graph);

        assert_eq!(map.get("conv_out"), Some(&0));
        assert_eq!(map.get("Y"), Some(&1));
        assert!(map.get("X").is_none());
    }

    #[test]
    fn test_consumer_map() {
        let graph = make_test_graph();
        let map = build_consumer_map(&graph);

        assert_eq!(map.get("conv_out").map(|v| v.as_slice()), Some(&[1][..]));
        assert_eq!(map.get("X").map(|v| v.as_slice()), Some(&[0][..]));
    }

    #[test]
    fn test_use_count_map() {
        let graph = make_test_graph();
        let map = build_use_count_map(&graph);

        assert_eq!(map.get("conv_out"), Some(&1));
        assert_eq!(map.get("W"), Some(&1));
        assert_eq!(map.get("Y"), Some(&1)); // graph output counts as a use
    }
}
