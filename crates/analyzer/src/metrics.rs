use crate::types::FileMetrics;
use context_code_scanner::EntityId;
use context_graph::{GraphArena, NodeIndex, Subgraph, SubgraphFilter, SubgraphNode};
use std::collections::{HashMap, HashSet};

/// Entities of `file` plus one hop of reference edges in both directions
pub fn local_subgraph(graph: &GraphArena, file: &str) -> Subgraph {
    graph.query_subgraph(&SubgraphFilter::for_file(file).with_hops(1))
}

/// Reference edge between two entities, by id
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WeightedEdge<'a> {
    pub from: &'a EntityId,
    pub to: &'a EntityId,
    pub confidence: f32,
}

pub(crate) fn weighted_edges(subgraph: &Subgraph) -> Vec<WeightedEdge<'_>> {
    let nodes: HashMap<NodeIndex, &SubgraphNode> =
        subgraph.nodes.iter().map(|node| (node.index, node)).collect();
    subgraph
        .edges
        .iter()
        .filter_map(|edge| {
            let from = nodes.get(&edge.from)?;
            let to = nodes.get(&edge.to)?;
            Some(WeightedEdge {
                from: &from.entity.id,
                to: &to.entity.id,
                confidence: edge.confidence,
            })
        })
        .collect()
}

/// (cohesion, coupling) of an entity set: edge confidence inside the set and
/// across its boundary
pub(crate) fn boundary_weights(edges: &[WeightedEdge<'_>], members: &HashSet<&EntityId>) -> (f32, f32) {
    let mut cohesion = 0.0;
    let mut coupling = 0.0;
    for edge in edges {
        match (members.contains(edge.from), members.contains(edge.to)) {
            (true, true) => cohesion += edge.confidence,
            (true, false) | (false, true) => coupling += edge.confidence,
            (false, false) => {}
        }
    }
    (cohesion, coupling)
}

pub fn file_metrics(subgraph: &Subgraph, file: &str) -> FileMetrics {
    let members: HashSet<&EntityId> = subgraph
        .nodes
        .iter()
        .filter(|node| node.file == file)
        .map(|node| &node.entity.id)
        .collect();
    let edges = weighted_edges(subgraph);
    let (cohesion, coupling) = boundary_weights(&edges, &members);
    let internal_edges = edges
        .iter()
        .filter(|edge| members.contains(edge.from) && members.contains(edge.to))
        .count();
    let external_edges = edges
        .iter()
        .filter(|edge| members.contains(edge.from) != members.contains(edge.to))
        .count();
    FileMetrics {
        file: file.to_string(),
        entities: members.len(),
        cohesion,
        coupling,
        internal_edges,
        external_edges,
    }
}
