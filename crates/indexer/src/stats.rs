use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A file the scan could not read or parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// Outcome of one `scan` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Files parsed and (re)ingested
    pub files_scanned: usize,

    /// Files skipped because their content hash matches the graph
    pub files_unchanged: usize,

    /// Files that could not be read or parsed; the previous graph state is kept
    pub failures: Vec<FileFailure>,

    /// Entities recorded for the scanned files
    pub entities: usize,

    /// Entities tombstoned because their file no longer declares them
    pub tombstoned_entities: usize,

    /// Files that disappeared from the scanned scope
    pub tombstoned_files: Vec<String>,

    /// Total lines of scanned files
    pub total_lines: usize,

    /// Scanned files per language
    pub languages: BTreeMap<String, usize>,

    pub import_edges: usize,
    pub reference_edges: usize,
    pub unresolved_imports: usize,

    /// Quarantined edges reported by the consistency check
    pub consistency_violations: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,
}

impl ScanReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, language: &str, lines: usize, entities: usize) {
        self.files_scanned += 1;
        self.total_lines += lines;
        self.entities += entities;
        *self.languages.entry(language.to_string()).or_insert(0) += 1;
    }

    pub fn add_unchanged(&mut self) {
        self.files_unchanged += 1;
    }

    pub fn add_failure(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(FileFailure {
            path: path.into(),
            reason: reason.into(),
        });
    }

    /// Nothing was re-ingested, removed or rejected
    pub fn is_noop(&self) -> bool {
        self.files_scanned == 0 && self.tombstoned_files.is_empty() && self.failures.is_empty()
    }
}
