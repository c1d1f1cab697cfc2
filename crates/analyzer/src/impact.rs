use context_code_scanner::EntityId;
use context_graph::{GraphArena, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Entity that (transitively) references the changed one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactedEntity {
    pub id: EntityId,
    pub file: String,
    pub qualified_name: String,
    /// Reference hops from the changed entity
    pub depth: usize,
    /// Product of edge confidences along the discovering path
    pub confidence: f32,
}

/// Entities whose behavior may change when `id` changes: reverse reachability
/// over live reference edges, breadth first, up to `max_depth` hops.
pub fn impact_of(graph: &GraphArena, id: &EntityId, max_depth: usize) -> Vec<ImpactedEntity> {
    let Some(start) = graph.entity_index(id) else {
        return Vec::new();
    };
    let mut seen: HashSet<NodeIndex> = HashSet::from([start]);
    let mut queue: VecDeque<(NodeIndex, usize, f32)> = VecDeque::from([(start, 0, 1.0)]);
    let mut impacted = Vec::new();
    while let Some((node, depth, confidence)) = queue.pop_front() {
        if depth == max_depth {
            continue;
        }
        let mut callers: Vec<_> = graph
            .incoming(node)
            .into_iter()
            .filter(|edge| edge.kind.is_reference())
            .map(|edge| (edge.from, edge.confidence))
            .collect();
        callers.sort_by_key(|(from, _)| *from);
        for (from, edge_confidence) in callers {
            if !seen.insert(from) {
                continue;
            }
            let Some(entity) = graph.entity_at(from) else {
                continue;
            };
            let confidence = confidence * edge_confidence;
            impacted.push(ImpactedEntity {
                id: entity.entity.id.clone(),
                file: entity.file.clone(),
                qualified_name: entity.entity.qualified_name.clone(),
                depth: depth + 1,
                confidence,
            });
            queue.push_back((from, depth + 1, confidence));
        }
    }
    impacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_scanner::Scanner;
    use context_graph::GraphBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn walks_callers_across_files() {
        let scanner = Scanner::default();
        let builder = GraphBuilder::new();
        let mut graph = GraphArena::new();
        let files = [
            ("util.py", "def base():\n    return 1\n\n\ndef mid():\n    return base()\n"),
            ("app.py", "from util import mid\n\n\ndef main():\n    return mid()\n"),
        ];
        for (path, source) in files {
            let scan = scanner.scan_source(path, source).unwrap();
            builder.ingest(&mut graph, &scan, 0).unwrap();
        }
        builder.link(&mut graph).unwrap();

        let impacted = impact_of(&graph, &EntityId::new("util.py", "base"), 5);
        let names: Vec<(&str, usize)> = impacted
            .iter()
            .map(|entity| (entity.qualified_name.as_str(), entity.depth))
            .collect();
        assert_eq!(names, vec![("mid", 1), ("main", 2)]);
        assert_eq!(impacted[1].file, "app.py");

        assert_eq!(impact_of(&graph, &EntityId::new("util.py", "base"), 1).len(), 1);
        assert!(impact_of(&graph, &EntityId::new("util.py", "missing"), 3).is_empty());
    }
}
