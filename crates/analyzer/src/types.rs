use context_code_scanner::EntityId;
use serde::{Deserialize, Serialize};

/// Reference-edge weights around one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub file: String,
    pub entities: usize,
    /// Sum of confidences of reference edges between entities of the file
    pub cohesion: f32,
    /// Sum of confidences of reference edges crossing the file boundary
    pub coupling: f32,
    pub internal_edges: usize,
    pub external_edges: usize,
}

/// Cross-group reference that becomes an import in the extracted module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutEdge {
    pub from: EntityId,
    pub to: EntityId,
    pub name: String,
    /// Module the imported name now lives in
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityGroup {
    /// Module name of the extracted file (no extension)
    pub module: String,
    /// Project-relative path of the extracted file
    pub path: String,
    /// Top-level entities moved into the module, in declaration order
    pub entities: Vec<EntityId>,
    pub names: Vec<String>,
    /// Import lines of the module: original bindings, then sibling imports
    pub imports: Vec<String>,
    pub cut_set: Vec<CutEdge>,
    /// Module-level state moved together with its accessors
    pub relocated_state: Vec<String>,
    pub estimated_lines: usize,
    pub cohesion: f32,
    pub coupling: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedEntity {
    pub id: EntityId,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reexport {
    pub name: String,
    pub module: String,
}

/// What stays in the original file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorPlan {
    pub path: String,
    /// Top-level entities left in place, in declaration order
    pub retained: Vec<EntityId>,
    pub pinned: Vec<PinnedEntity>,
    pub reexports: Vec<Reexport>,
    pub estimated_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub file: String,
    /// Hash of the content the plan was computed from
    pub content_hash: String,
    pub max_lines: usize,
    pub original_lines: usize,
    /// Sibling imports are package-relative (`from .m import x`)
    pub package_relative: bool,
    pub groups: Vec<EntityGroup>,
    pub aggregator: AggregatorPlan,
    pub metrics: FileMetrics,
    /// Weight of the reference edges that cross group boundaries
    pub cut_weight: f32,
}

impl SplitPlan {
    pub fn group_paths(&self) -> Vec<String> {
        self.groups.iter().map(|group| group.path.clone()).collect()
    }

    pub fn group_of(&self, id: &EntityId) -> Option<&EntityGroup> {
        self.groups.iter().find(|group| group.entities.contains(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum SplitDecision {
    /// The file is already within the limit
    NotNeeded {
        file: String,
        line_count: usize,
        max_lines: usize,
    },
    Split(SplitPlan),
}

impl SplitDecision {
    pub fn plan(&self) -> Option<&SplitPlan> {
        match self {
            SplitDecision::Split(plan) => Some(plan),
            SplitDecision::NotNeeded { .. } => None,
        }
    }

    pub fn into_plan(self) -> Option<SplitPlan> {
        match self {
            SplitDecision::Split(plan) => Some(plan),
            SplitDecision::NotNeeded { .. } => None,
        }
    }
}
