//! Post-mutation cleanup pass
//!
//! Any transformation that changes the input/output edge set must run this
//! pass before handing the graph to the next stage: it removes nodes and
//! initializers that no longer contribute to a graph output, and restores a
//! valid topological order over `node`.

use std::collections::{BTreeSet, HashSet, VecDeque};

use rustc_hash::FxHashMap;

use crate::error::{ConvertError, ConvertResult};
use crate::proto::GraphProto;

/// Statistics from one cleanup run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupStats {
    /// Nodes removed because no graph output depends on them
    pub nodes_removed: usize,
    /// Initializers removed because nothing references them
    pub initializers_removed: usize,
}

/// Dead-code elimination followed by topological re-sort.
///
/// Fails only when the edge set is cyclic, which no earlier valid graph can
/// become through the rewrites this crate applies; the error still surfaces
/// rather than looping.
pub fn run(graph: &mut GraphProto) -> ConvertResult<CleanupStats> {
    let stats = eliminate_dead_code(graph);
    toposort(graph)?;
    Ok(stats)
}

/// Remove nodes unreachable from the graph outputs, then initializers and
/// value_info entries nothing references anymore.
pub fn eliminate_dead_code(graph: &mut GraphProto) -> CleanupStats {
    let mut stats = CleanupStats::default();

    // Producers by output name
    let mut producer: FxHashMap<&str, usize> = FxHashMap::default();
    for (idx, node) in graph.node.iter().enumerate() {
        for output in &node.output {
            if !output.is_empty() {
                producer.insert(output.as_str(), idx);
            }
        }
    }

    // Walk backwards from the graph outputs
    let mut live_nodes: HashSet<usize> = HashSet::new();
    let mut worklist: VecDeque<&str> = graph.output.iter().map(|vi| vi.name.as_str()).collect();
    let mut seen: HashSet<&str> = worklist.iter().copied().collect();

    while let Some(tensor) = worklist.pop_front() {
        if let Some(&idx) = producer.get(tensor) {
            if live_nodes.insert(idx) {
                for input in &graph.node[idx].input {
                    if !input.is_empty() && seen.insert(input.as_str()) {
                        worklist.push_back(input.as_str());
                    }
                }
            }
        }
    }

    let before = graph.node.len();
    let mut idx = 0;
    graph.node.retain(|_| {
        let keep = live_nodes.contains(&idx);
        idx += 1;
        keep
    });
    stats.nodes_removed = before - graph.node.len();

    // Tensors still referenced by surviving nodes or the graph interface
    let mut used: HashSet<&str> = HashSet::new();
    for node in &graph.node {
        for input in &node.input {
            used.insert(input.as_str());
        }
        for output in &node.output {
            used.insert(output.as_str());
        }
    }
    for vi in graph.input.iter().chain(graph.output.iter()) {
        used.insert(vi.name.as_str());
    }
    let used: HashSet<String> = used.into_iter().map(str::to_string).collect();

    let before = graph.initializer.len();
    graph.initializer.retain(|t| used.contains(&t.name));
    stats.initializers_removed = before - graph.initializer.len();

    graph.value_info.retain(|vi| used.contains(&vi.name));

    stats
}

/// Recompute a valid topological order over `graph.node` (Kahn's algorithm,
/// lowest original index first for determinism).
pub fn toposort(graph: &mut GraphProto) -> ConvertResult<()> {
    let n = graph.node.len();

    let mut producer: FxHashMap<&str, usize> = FxHashMap::default();
    for (idx, node) in graph.node.iter().enumerate() {
        for output in &node.output {
            if !output.is_empty() {
                producer.insert(output.as_str(), idx);
            }
        }
    }

    let mut indegree = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (idx, node) in graph.node.iter().enumerate() {
        for input in &node.input {
            if let Some(&src) = producer.get(input.as_str()) {
                if src != idx {
                    successors[src].push(idx);
                    indegree[idx] += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(&idx) = ready.iter().next() {
        ready.remove(&idx);
        order.push(idx);
        for &succ in &successors[idx] {
            indegree[succ] -= 1;
            if indegree[succ] == 0 {
                ready.insert(succ);
            }
        }
    }

    if order.len() != n {
        let stuck: Vec<String> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(i, _)| graph.node[i].name.clone())
            .collect();
        return Err(ConvertError::validation(vec![format!(
            "graph contains a cycle through nodes [{}]",
            stuck.join(", ")
        )]));
    }

    // `order` is a permutation of 0..n, so every slot is taken exactly once
    let mut slots: Vec<Option<crate::proto::NodeProto>> =
        graph.node.drain(..).map(Some).collect();
    let mut nodes = Vec::with_capacity(n);
    for idx in order {
        if let Some(node) = slots[idx].take() {
            nodes.push(node);
        }
    }
    graph.node = nodes;

    Ok(())
}
