use crate::error::RefactorFailure;
use context_code_scanner::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// States of one split attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStage {
    Analyze,
    Plan,
    Extract,
    Rewrite,
    Validate,
    Commit,
    Rollback,
}

impl SplitStage {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitStage::Analyze => "ANALYZE",
            SplitStage::Plan => "PLAN",
            SplitStage::Extract => "EXTRACT",
            SplitStage::Rewrite => "REWRITE",
            SplitStage::Validate => "VALIDATE",
            SplitStage::Commit => "COMMIT",
            SplitStage::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for SplitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the validation actually ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assurance {
    /// Syntax, import resolution and the caller's tests passed
    Full,
    /// No test hook was supplied; behavior was not checked
    Reduced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFile {
    pub path: String,
    /// Entities of the original file that now live in `path`
    pub origin_entities: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub aggregator_path: String,
    pub extracted: Vec<ExtractedFile>,
}

/// `original path → where its code went`, for the caller's version-control step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMapping {
    pub entries: BTreeMap<String, HistoryEntry>,
}

impl HistoryMapping {
    pub fn entry(&self, original: &str) -> Option<&HistoryEntry> {
        self.entries.get(original)
    }

    /// New file holding `id`, if it moved
    pub fn destination_of(&self, id: &EntityId) -> Option<&str> {
        self.entries
            .values()
            .flat_map(|entry| &entry.extracted)
            .find(|file| file.origin_entities.contains(id))
            .map(|file| file.path.as_str())
    }
}

/// Terminal outcome of one split attempt
#[derive(Debug)]
pub struct RefactorResult {
    pub file: String,
    pub success: bool,
    /// Stage that failed, or `Commit` on success
    pub stage: SplitStage,
    pub reason: Option<String>,
    pub failure: Option<RefactorFailure>,
    pub history_mapping: Option<HistoryMapping>,
    pub assurance: Assurance,
    /// Stages entered, in order
    pub transitions: Vec<SplitStage>,
    /// Whether the filesystem was restored to its original state
    pub rolled_back: bool,
}

impl RefactorResult {
    pub fn is_lock_contention(&self) -> bool {
        matches!(self.failure, Some(RefactorFailure::LockContention(_)))
    }
}

/// Cooperative cancellation, checked between stages
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
