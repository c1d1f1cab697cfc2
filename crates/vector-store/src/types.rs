use context_code_scanner::{EntityId, EntityKind, LineSpan};
use serde::{Deserialize, Serialize};

/// Entity returned by a semantic search, with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub file: String,
    pub qualified_name: String,
    pub kind: EntityKind,
    pub span: LineSpan,
    pub score: f32,
}

/// Counts from one embedding pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPassReport {
    /// Entities embedded in this pass
    pub embedded: usize,
    /// Entities whose stored vector was still current and only (re)entered the index
    pub reused: usize,
    /// Entities whose embedding failed; retried on the next pass
    pub failed: usize,
    /// Index entries removed because their entity is gone or tombstoned
    pub evicted: usize,
    /// Index size after the pass
    pub indexed: usize,
}
