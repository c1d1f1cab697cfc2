use crate::error::{GraphConsistencyError, GraphError, Result};
use crate::types::{
    entity_key, file_key, module_key, EdgeIndex, EdgeKind, EdgeRecord, EntityNode,
    EntitySnapshot, FileNode, GraphStats, ImportResolution, ModuleNode, NewEdge, NodeData,
    NodeIndex, NodeRecord, StoredEmbedding, Subgraph, SubgraphEdge, SubgraphFilter, SubgraphNode,
};
use context_code_scanner::{Entity, EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

type EdgeKey = (NodeIndex, NodeIndex, EdgeKind);

/// Flat node/edge storage addressed by integer indices.
///
/// Nodes are never removed: entities that disappear from a file are
/// tombstoned, and edges that a later scan no longer produces are retired.
/// Both stay in the arena so edge history remains coherent, but neither is
/// visible to queries.
#[derive(Debug, Clone, Default)]
pub struct GraphArena {
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
    node_index: HashMap<String, NodeIndex>,
    edge_index: HashMap<EdgeKey, EdgeIndex>,
    outgoing: Vec<Vec<EdgeIndex>>,
    incoming: Vec<Vec<EdgeIndex>>,
    file_entities: HashMap<String, Vec<NodeIndex>>,
}

/// Result of a consistency (repair) pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub checked_edges: usize,
    pub violations: Vec<GraphConsistencyError>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

impl GraphArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild lookup tables from persisted records
    pub fn from_records(nodes: Vec<NodeRecord>, edges: Vec<EdgeRecord>) -> Result<Self> {
        let mut arena = Self::new();
        for record in nodes {
            let index = arena.next_node_index()?;
            if let NodeData::Entity(entity) = &record.data {
                arena
                    .file_entities
                    .entry(entity.file.clone())
                    .or_default()
                    .push(index);
            }
            arena.node_index.insert(record.key.clone(), index);
            arena.nodes.push(record);
            arena.outgoing.push(Vec::new());
            arena.incoming.push(Vec::new());
        }
        for edge in edges {
            if edge.from.index() >= arena.nodes.len() || edge.to.index() >= arena.nodes.len() {
                return Err(GraphError::Other(format!(
                    "persisted edge {} -> {} points outside the node table",
                    edge.from.0, edge.to.0
                )));
            }
            arena.push_edge(edge)?;
        }
        Ok(arena)
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    pub fn node(&self, index: NodeIndex) -> Option<&NodeRecord> {
        self.nodes.get(index.index())
    }

    pub fn edge(&self, index: EdgeIndex) -> Option<&EdgeRecord> {
        self.edges.get(index.index())
    }

    pub fn lookup(&self, key: &str) -> Option<NodeIndex> {
        self.node_index.get(key).copied()
    }

    pub fn entity_index(&self, id: &EntityId) -> Option<NodeIndex> {
        self.lookup(id.as_str())
    }

    pub fn file_index(&self, path: &str) -> Option<NodeIndex> {
        self.lookup(&file_key(path))
    }

    /// Live entity by id
    pub fn entity(&self, id: &EntityId) -> Option<&EntityNode> {
        let record = self.node(self.entity_index(id)?)?;
        if !record.is_live() {
            return None;
        }
        record.data.as_entity()
    }

    /// Live entity at an index
    pub fn entity_at(&self, index: NodeIndex) -> Option<&EntityNode> {
        self.node(index)
            .filter(|record| record.is_live())
            .and_then(|record| record.data.as_entity())
    }

    /// Live file by path
    pub fn file(&self, path: &str) -> Option<&FileNode> {
        let record = self.node(self.file_index(path)?)?;
        if !record.is_live() {
            return None;
        }
        record.data.as_file()
    }

    /// Live files sorted by path
    pub fn live_files(&self) -> Vec<(NodeIndex, &FileNode)> {
        let mut files: Vec<(NodeIndex, &FileNode)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_live())
            .filter_map(|(i, record)| record.data.as_file().map(|file| (NodeIndex(i as u32), file)))
            .collect();
        files.sort_by(|a, b| a.1.path.cmp(&b.1.path));
        files
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.live_files()
            .into_iter()
            .map(|(_, file)| file.path.clone())
            .collect()
    }

    /// Live entities of a file in declaration order
    pub fn entities_in_file(&self, path: &str) -> Vec<(NodeIndex, &Entity)> {
        let mut entities: Vec<(NodeIndex, &Entity)> = self
            .file_entities
            .get(path)
            .into_iter()
            .flatten()
            .filter_map(|&index| self.entity_at(index).map(|node| (index, &node.entity)))
            .collect();
        entities.sort_by_key(|(_, entity)| entity.order);
        entities
    }

    fn next_node_index(&self) -> Result<NodeIndex> {
        u32::try_from(self.nodes.len())
            .map(NodeIndex)
            .map_err(|_| GraphError::Other("node arena is full".to_string()))
    }

    fn push_node(&mut self, key: String, data: NodeData) -> Result<NodeIndex> {
        let index = self.next_node_index()?;
        self.node_index.insert(key.clone(), index);
        self.nodes.push(NodeRecord {
            key,
            data,
            tombstoned: false,
            embedding: None,
        });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        Ok(index)
    }

    fn push_edge(&mut self, edge: EdgeRecord) -> Result<EdgeIndex> {
        let index = u32::try_from(self.edges.len())
            .map(EdgeIndex)
            .map_err(|_| GraphError::Other("edge arena is full".to_string()))?;
        self.edge_index
            .insert((edge.from, edge.to, edge.kind.clone()), index);
        self.outgoing[edge.from.index()].push(index);
        self.incoming[edge.to.index()].push(index);
        self.edges.push(edge);
        Ok(index)
    }

    /// Insert or replace a file node; revives a tombstoned file
    pub fn upsert_file(&mut self, file: FileNode) -> Result<NodeIndex> {
        let key = file_key(&file.path);
        match self.lookup(&key) {
            Some(index) => {
                let record = &mut self.nodes[index.index()];
                record.data = NodeData::File(file);
                record.tombstoned = false;
                Ok(index)
            }
            None => self.push_node(key, NodeData::File(file)),
        }
    }

    /// Insert or replace an entity keyed by its stable id.
    ///
    /// The owning file must already be a live node. A stored embedding is
    /// kept; the embedding indexer decides whether it went stale.
    pub fn upsert_node(&mut self, file: &str, entity: Entity) -> Result<NodeIndex> {
        if self.file(file).is_none() {
            return Err(GraphConsistencyError {
                from: file_key(file),
                to: entity_key(&entity.id),
                kind: EdgeKind::Contains.to_string(),
                origin_file: file.to_string(),
                reason: "owning file is not a live node".to_string(),
            }
            .into());
        }
        let key = entity_key(&entity.id);
        let data = NodeData::Entity(EntityNode {
            file: file.to_string(),
            entity,
        });
        match self.lookup(&key) {
            Some(index) => {
                let record = &mut self.nodes[index.index()];
                record.data = data;
                record.tombstoned = false;
                Ok(index)
            }
            None => {
                let index = self.push_node(key, data)?;
                self.file_entities
                    .entry(file.to_string())
                    .or_default()
                    .push(index);
                Ok(index)
            }
        }
    }

    /// Node standing for a module outside the project
    pub fn upsert_module(&mut self, specifier: &str) -> Result<NodeIndex> {
        let key = module_key(specifier);
        match self.lookup(&key) {
            Some(index) => Ok(index),
            None => self.push_node(
                key,
                NodeData::Module(ModuleNode {
                    specifier: specifier.to_string(),
                }),
            ),
        }
    }

    /// Insert or revive an edge keyed by (from, to, kind).
    ///
    /// Both endpoints must be live nodes.
    pub fn upsert_edge(&mut self, edge: NewEdge) -> Result<EdgeIndex> {
        for endpoint in [edge.from, edge.to] {
            let reason = match self.node(endpoint) {
                None => Some("endpoint does not exist"),
                Some(record) if record.tombstoned => Some("endpoint is tombstoned"),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                let violation =
                    self.violation(edge.from, edge.to, &edge.kind, &edge.origin_file, reason);
                return Err(violation.into());
            }
        }

        let key = (edge.from, edge.to, edge.kind.clone());
        if let Some(&index) = self.edge_index.get(&key) {
            let record = &mut self.edges[index.index()];
            record.confidence = edge.confidence;
            record.origin_file = edge.origin_file;
            record.retired = false;
            record.quarantined = false;
            return Ok(index);
        }
        self.push_edge(EdgeRecord {
            from: edge.from,
            to: edge.to,
            kind: edge.kind,
            confidence: edge.confidence,
            origin_file: edge.origin_file,
            retired: false,
            quarantined: false,
        })
    }

    fn violation(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        kind: &EdgeKind,
        origin_file: &str,
        reason: &str,
    ) -> GraphConsistencyError {
        let key_of = |index: NodeIndex| {
            self.node(index)
                .map_or_else(|| format!("#{}", index.0), |record| record.key.clone())
        };
        GraphConsistencyError {
            from: key_of(from),
            to: key_of(to),
            kind: kind.to_string(),
            origin_file: origin_file.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Tombstone entities of `file` that are not in `seen`; returns their ids.
    ///
    /// Edges the file itself produced for those entities are retired. Edges
    /// from other files stay until their next link pass.
    pub fn remove_stale(&mut self, file: &str, seen: &HashSet<EntityId>) -> Vec<EntityId> {
        let candidates: Vec<NodeIndex> = self.file_entities.get(file).cloned().unwrap_or_default();
        let mut removed = Vec::new();
        for index in candidates {
            let record = &mut self.nodes[index.index()];
            if record.tombstoned {
                continue;
            }
            let Some(node) = record.data.as_entity() else {
                continue;
            };
            if seen.contains(&node.entity.id) {
                continue;
            }
            let id = node.entity.id.clone();
            record.tombstoned = true;
            self.retire_incident(index, file);
            removed.push(id);
        }
        removed
    }

    fn retire_incident(&mut self, node: NodeIndex, origin_file: &str) {
        let incident: Vec<EdgeIndex> = self.outgoing[node.index()]
            .iter()
            .chain(self.incoming[node.index()].iter())
            .copied()
            .collect();
        for index in incident {
            let edge = &mut self.edges[index.index()];
            if edge.origin_file == origin_file {
                edge.retired = true;
            }
        }
    }

    /// Tombstone a vanished file and every entity it owned
    pub fn tombstone_file(&mut self, path: &str) -> usize {
        let Some(file_index) = self.file_index(path) else {
            return 0;
        };
        let removed = self.remove_stale(path, &HashSet::new()).len();
        self.nodes[file_index.index()].tombstoned = true;
        for edge in &mut self.edges {
            if edge.origin_file == path {
                edge.retired = true;
            }
        }
        removed
    }

    /// Retire every import and reference edge ahead of a full link pass
    pub fn retire_links(&mut self) -> usize {
        let mut retired = 0;
        for edge in &mut self.edges {
            if edge.kind != EdgeKind::Contains && !edge.retired {
                edge.retired = true;
                retired += 1;
            }
        }
        retired
    }

    /// Not retired, not quarantined, both endpoints live
    pub fn is_edge_live(&self, edge: &EdgeRecord) -> bool {
        !edge.retired
            && !edge.quarantined
            && self.node(edge.from).is_some_and(NodeRecord::is_live)
            && self.node(edge.to).is_some_and(NodeRecord::is_live)
    }

    pub fn live_edges(&self) -> impl Iterator<Item = (EdgeIndex, &EdgeRecord)> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| self.is_edge_live(edge))
            .map(|(i, edge)| (EdgeIndex(i as u32), edge))
    }

    /// Live edges leaving a node
    pub fn outgoing(&self, node: NodeIndex) -> Vec<&EdgeRecord> {
        self.adjacent(&self.outgoing, node)
    }

    /// Live edges entering a node
    pub fn incoming(&self, node: NodeIndex) -> Vec<&EdgeRecord> {
        self.adjacent(&self.incoming, node)
    }

    fn adjacent<'a>(&'a self, table: &'a [Vec<EdgeIndex>], node: NodeIndex) -> Vec<&'a EdgeRecord> {
        table
            .get(node.index())
            .into_iter()
            .flatten()
            .filter_map(|&index| self.edge(index))
            .filter(|edge| self.is_edge_live(edge))
            .collect()
    }

    /// Live entities selected by `filter` plus `filter.hops` of reference
    /// neighbors, with the live reference edges among them.
    pub fn query_subgraph(&self, filter: &SubgraphFilter) -> Subgraph {
        let file_matches = |path: &str| {
            filter
                .files
                .as_ref()
                .map_or(true, |files| files.iter().any(|f| f == path))
        };
        let kind_matches =
            |kind: EntityKind| filter.kinds.is_empty() || filter.kinds.contains(&kind);

        let mut selected: BTreeSet<NodeIndex> = BTreeSet::new();
        for (i, record) in self.nodes.iter().enumerate() {
            if !record.is_live() {
                continue;
            }
            if let Some(node) = record.data.as_entity() {
                if file_matches(&node.file) && kind_matches(node.entity.kind) {
                    selected.insert(NodeIndex(i as u32));
                }
            }
        }

        let mut frontier: Vec<NodeIndex> = selected.iter().copied().collect();
        for _ in 0..filter.hops {
            let mut next = Vec::new();
            for node in frontier {
                let neighbors = self
                    .outgoing(node)
                    .into_iter()
                    .map(|edge| (edge, edge.to))
                    .chain(self.incoming(node).into_iter().map(|edge| (edge, edge.from)));
                for (edge, other) in neighbors {
                    if !edge.kind.is_reference() || edge.confidence < filter.min_confidence {
                        continue;
                    }
                    if self.entity_at(other).is_some() && selected.insert(other) {
                        next.push(other);
                    }
                }
            }
            frontier = next;
        }

        let mut nodes: Vec<SubgraphNode> = selected
            .iter()
            .filter_map(|&index| {
                self.entity_at(index).map(|node| SubgraphNode {
                    index,
                    file: node.file.clone(),
                    entity: node.entity.clone(),
                })
            })
            .collect();
        nodes.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then_with(|| a.entity.order.cmp(&b.entity.order))
        });

        let mut edges: Vec<SubgraphEdge> = self
            .live_edges()
            .filter(|(_, edge)| {
                selected.contains(&edge.from)
                    && selected.contains(&edge.to)
                    && edge.confidence >= filter.min_confidence
            })
            .filter_map(|(_, edge)| match &edge.kind {
                EdgeKind::Reference { kind } => Some(SubgraphEdge {
                    from: edge.from,
                    to: edge.to,
                    kind: *kind,
                    confidence: edge.confidence,
                }),
                _ => None,
            })
            .collect();
        edges.sort_by(|a, b| (a.from, a.to, a.kind).cmp(&(b.from, b.to, b.kind)));

        Subgraph { nodes, edges }
    }

    pub fn set_embedding(&mut self, id: &EntityId, embedding: StoredEmbedding) -> Result<()> {
        let index = self
            .entity_index(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        self.nodes[index.index()].embedding = Some(embedding);
        Ok(())
    }

    /// Live entities with their stored embeddings, ordered by id
    pub fn entity_snapshots(&self) -> Vec<EntitySnapshot> {
        let mut snapshots: Vec<EntitySnapshot> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_live())
            .filter_map(|(i, record)| {
                record.data.as_entity().map(|node| EntitySnapshot {
                    index: NodeIndex(i as u32),
                    file: node.file.clone(),
                    entity: node.entity.clone(),
                    embedding: record.embedding.clone(),
                })
            })
            .collect();
        snapshots.sort_by(|a, b| a.entity.id.cmp(&b.entity.id));
        snapshots
    }

    /// Ids of tombstoned entities
    pub fn tombstoned_entities(&self) -> Vec<EntityId> {
        self.nodes
            .iter()
            .filter(|record| record.tombstoned)
            .filter_map(|record| record.data.as_entity().map(|node| node.entity.id.clone()))
            .collect()
    }

    /// Report every active edge whose endpoints are not both live and
    /// quarantine it. Quarantined edges stay in the arena.
    pub fn consistency_check(&mut self) -> ConsistencyReport {
        let mut report = ConsistencyReport::default();
        let mut offending = Vec::new();
        for (i, edge) in self.edges.iter().enumerate() {
            if edge.retired || edge.quarantined {
                continue;
            }
            report.checked_edges += 1;
            let reason = [("source", edge.from), ("target", edge.to)]
                .into_iter()
                .find_map(|(side, endpoint)| match self.node(endpoint) {
                    None => Some(format!("{side} does not exist")),
                    Some(record) if record.tombstoned => Some(format!("{side} is tombstoned")),
                    Some(_) => None,
                });
            if let Some(reason) = reason {
                let violation =
                    self.violation(edge.from, edge.to, &edge.kind, &edge.origin_file, &reason);
                log::warn!("{violation}");
                report.violations.push(violation);
                offending.push(i);
            }
        }
        for i in offending {
            self.edges[i].quarantined = true;
        }
        report
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats::default();
        for record in &self.nodes {
            match &record.data {
                NodeData::File(_) if record.tombstoned => stats.tombstoned_files += 1,
                NodeData::File(_) => stats.files += 1,
                NodeData::Entity(_) if record.tombstoned => stats.tombstoned_entities += 1,
                NodeData::Entity(_) => {
                    stats.entities += 1;
                    if record.embedding.is_some() {
                        stats.embedded_entities += 1;
                    }
                }
                NodeData::Module(_) => stats.modules += 1,
            }
        }
        for edge in &self.edges {
            if edge.quarantined {
                stats.quarantined_edges += 1;
                continue;
            }
            if edge.retired {
                stats.retired_edges += 1;
                continue;
            }
            if !self.is_edge_live(edge) {
                continue;
            }
            stats.live_edges += 1;
            match &edge.kind {
                EdgeKind::Contains => stats.contains_edges += 1,
                EdgeKind::Import { resolution, .. } => {
                    stats.import_edges += 1;
                    if *resolution == ImportResolution::Unresolved {
                        stats.unresolved_imports += 1;
                    }
                }
                EdgeKind::Reference { .. } => stats.reference_edges += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_scanner::{Language, LineSpan, ReferenceKind, Visibility};
    use pretty_assertions::assert_eq;

    fn file(path: &str) -> FileNode {
        FileNode {
            path: path.to_string(),
            language: Language::Python,
            content_hash: "h".to_string(),
            line_count: 10,
            scanned_at_ms: 0,
            imports: Vec::new(),
            references: Vec::new(),
            exports: None,
            bound_names: Vec::new(),
        }
    }

    fn entity(path: &str, name: &str, order: usize) -> Entity {
        Entity {
            id: EntityId::new(path, name),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: EntityKind::Function,
            parent: None,
            span: LineSpan::new(order + 1, order + 1),
            item_span: LineSpan::new(order + 1, order + 1),
            complexity: 1,
            docstring: None,
            signature: format!("def {name}()"),
            visibility: Visibility::Public,
            mutability: None,
            content_hash: "x".to_string(),
            order,
        }
    }

    fn call(from: NodeIndex, to: NodeIndex, origin: &str) -> NewEdge {
        NewEdge {
            from,
            to,
            kind: EdgeKind::Reference {
                kind: ReferenceKind::Call,
            },
            confidence: 1.0,
            origin_file: origin.to_string(),
        }
    }

    #[test]
    fn upsert_is_keyed_by_stable_id() {
        let mut arena = GraphArena::new();
        arena.upsert_file(file("a.py")).unwrap();
        let first = arena.upsert_node("a.py", entity("a.py", "f", 0)).unwrap();
        let second = arena.upsert_node("a.py", entity("a.py", "f", 0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(arena.stats().entities, 1);
    }

    #[test]
    fn edges_require_live_endpoints() {
        let mut arena = GraphArena::new();
        arena.upsert_file(file("a.py")).unwrap();
        let f = arena.upsert_node("a.py", entity("a.py", "f", 0)).unwrap();
        let g = arena.upsert_node("a.py", entity("a.py", "g", 1)).unwrap();
        arena.upsert_edge(call(f, g, "a.py")).unwrap();

        let seen: HashSet<EntityId> = [EntityId::new("a.py", "f")].into_iter().collect();
        let removed = arena.remove_stale("a.py", &seen);
        assert_eq!(removed, vec![EntityId::new("a.py", "g")]);

        let err = arena.upsert_edge(call(f, g, "a.py")).unwrap_err();
        assert!(matches!(err, GraphError::Consistency(_)));
        assert!(arena.entity(&EntityId::new("a.py", "g")).is_none());
        assert_eq!(arena.stats().tombstoned_entities, 1);
        assert_eq!(arena.stats().reference_edges, 0);
    }

    #[test]
    fn consistency_check_quarantines_cross_file_edges() {
        let mut arena = GraphArena::new();
        arena.upsert_file(file("a.py")).unwrap();
        arena.upsert_file(file("b.py")).unwrap();
        let f = arena.upsert_node("a.py", entity("a.py", "f", 0)).unwrap();
        let g = arena.upsert_node("b.py", entity("b.py", "g", 0)).unwrap();
        arena.upsert_edge(call(f, g, "a.py")).unwrap();

        arena.remove_stale("b.py", &HashSet::new());
        let report = arena.consistency_check();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].origin_file, "a.py");
        assert!(report.violations[0].reason.contains("tombstoned"));

        let stats = arena.stats();
        assert_eq!(stats.quarantined_edges, 1);
        assert_eq!(arena.edges().len(), 1);
        assert!(arena.consistency_check().is_consistent());
    }

    #[test]
    fn subgraph_follows_hops() {
        let mut arena = GraphArena::new();
        arena.upsert_file(file("a.py")).unwrap();
        arena.upsert_file(file("b.py")).unwrap();
        arena.upsert_file(file("c.py")).unwrap();
        let a = arena.upsert_node("a.py", entity("a.py", "a", 0)).unwrap();
        let b = arena.upsert_node("b.py", entity("b.py", "b", 0)).unwrap();
        let c = arena.upsert_node("c.py", entity("c.py", "c", 0)).unwrap();
        arena.upsert_edge(call(a, b, "a.py")).unwrap();
        arena.upsert_edge(call(b, c, "b.py")).unwrap();

        let local = arena.query_subgraph(&SubgraphFilter::for_file("a.py"));
        assert_eq!(local.nodes.len(), 1);
        assert!(local.edges.is_empty());

        let one_hop = arena.query_subgraph(&SubgraphFilter::for_file("a.py").with_hops(1));
        assert_eq!(one_hop.nodes.len(), 2);
        assert_eq!(one_hop.edges.len(), 1);

        let two_hops = arena.query_subgraph(&SubgraphFilter::for_file("a.py").with_hops(2));
        assert_eq!(two_hops.nodes.len(), 3);
    }

    #[test]
    fn tombstoned_file_hides_entities() {
        let mut arena = GraphArena::new();
        arena.upsert_file(file("a.py")).unwrap();
        arena.upsert_node("a.py", entity("a.py", "f", 0)).unwrap();
        assert_eq!(arena.tombstone_file("a.py"), 1);
        assert!(arena.file("a.py").is_none());
        assert!(arena.entities_in_file("a.py").is_empty());
        assert_eq!(arena.stats().tombstoned_files, 1);
    }
}
