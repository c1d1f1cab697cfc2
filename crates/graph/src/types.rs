use context_code_scanner::{
    Entity, EntityId, EntityKind, ImportRecord, Language, ReferenceCandidate, ReferenceKind,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIndex(pub u32);

/// Position of an edge in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeIndex(pub u32);

impl NodeIndex {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeIndex {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Key of a file node
pub fn file_key(path: &str) -> String {
    format!("file:{path}")
}

/// Key of an external or unresolved module node
pub fn module_key(specifier: &str) -> String {
    format!("module:{specifier}")
}

/// Key of an entity node
pub fn entity_key(id: &EntityId) -> String {
    id.as_str().to_string()
}

/// Scanned source file as stored in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub path: String,
    pub language: Language,
    pub content_hash: String,
    pub line_count: usize,
    /// Milliseconds since the Unix epoch
    pub scanned_at_ms: u64,
    pub imports: Vec<ImportRecord>,
    pub references: Vec<ReferenceCandidate>,
    pub exports: Option<Vec<String>>,
    /// Module-scope names bound by statements that are not entities
    #[serde(default)]
    pub bound_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub file: String,
    pub entity: Entity,
}

/// Module that is not a project file (stdlib, third party, unresolved)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub specifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NodeData {
    File(FileNode),
    Entity(EntityNode),
    Module(ModuleNode),
}

impl NodeData {
    pub fn as_entity(&self) -> Option<&EntityNode> {
        match self {
            NodeData::Entity(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            NodeData::File(node) => Some(node),
            _ => None,
        }
    }
}

/// Vector computed for an entity, with the hash of the text it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub vector: Vec<f32>,
    pub text_hash: String,
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub key: String,
    pub data: NodeData,
    pub tombstoned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<StoredEmbedding>,
}

impl NodeRecord {
    pub fn is_live(&self) -> bool {
        !self.tombstoned
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportResolution {
    /// Resolved to a project file
    Internal,
    /// Standard library or third-party module
    External,
    /// Dynamic target or a relative import whose target does not exist
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EdgeKind {
    /// File → top-level entity, class → method
    Contains,
    /// File → file or module node
    Import {
        module: String,
        name: Option<String>,
        resolution: ImportResolution,
    },
    /// Entity → entity
    Reference { kind: ReferenceKind },
}

impl EdgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "contains",
            EdgeKind::Import { .. } => "import",
            EdgeKind::Reference {
                kind: ReferenceKind::Call,
            } => "call",
            EdgeKind::Reference {
                kind: ReferenceKind::Use,
            } => "use",
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, EdgeKind::Reference { .. })
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Edge as passed to [`crate::GraphArena::upsert_edge`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewEdge {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub kind: EdgeKind,
    pub confidence: f32,
    pub origin_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub kind: EdgeKind,
    pub confidence: f32,
    /// File whose scan produced this edge
    pub origin_file: String,
    /// Superseded by a later scan or link pass; kept for history
    pub retired: bool,
    /// Flagged by the consistency check; excluded from queries
    pub quarantined: bool,
}

/// Selection for [`crate::GraphArena::query_subgraph`]
#[derive(Debug, Clone)]
pub struct SubgraphFilter {
    /// Seed files (`None` = every live file)
    pub files: Option<Vec<String>>,
    /// Seed entity kinds (empty = all kinds)
    pub kinds: Vec<EntityKind>,
    /// Hops of reference edges followed from the seeds, in both directions
    pub hops: usize,
    /// Reference edges below this confidence are ignored
    pub min_confidence: f32,
}

impl Default for SubgraphFilter {
    fn default() -> Self {
        Self {
            files: None,
            kinds: Vec::new(),
            hops: 0,
            min_confidence: 0.0,
        }
    }
}

impl SubgraphFilter {
    pub fn for_file(path: impl Into<String>) -> Self {
        Self {
            files: Some(vec![path.into()]),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_hops(mut self, hops: usize) -> Self {
        self.hops = hops;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphNode {
    pub index: NodeIndex,
    pub file: String,
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphEdge {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub kind: ReferenceKind,
    pub confidence: f32,
}

/// Live entities and the live reference edges among them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<SubgraphEdge>,
}

impl Subgraph {
    pub fn node(&self, index: NodeIndex) -> Option<&SubgraphNode> {
        self.nodes.iter().find(|node| node.index == index)
    }

    pub fn by_id(&self, id: &EntityId) -> Option<&SubgraphNode> {
        self.nodes.iter().find(|node| &node.entity.id == id)
    }
}

/// Live entity together with its stored embedding, as read by the embedding indexer
#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    pub index: NodeIndex,
    pub file: String,
    pub entity: Entity,
    pub embedding: Option<StoredEmbedding>,
}

/// Counts derived from the arena contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub tombstoned_files: usize,
    pub entities: usize,
    pub tombstoned_entities: usize,
    pub modules: usize,
    pub live_edges: usize,
    pub retired_edges: usize,
    pub quarantined_edges: usize,
    pub contains_edges: usize,
    pub import_edges: usize,
    pub reference_edges: usize,
    pub unresolved_imports: usize,
    pub embedded_entities: usize,
}
