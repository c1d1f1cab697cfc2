use crate::types::SplitStage;
use context_analyzer::{AnalyzerError, PlanInfeasibleError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RefactorFailure>;

/// Why a split attempt did not commit
#[derive(Error, Debug)]
pub enum RefactorFailure {
    #[error(transparent)]
    Validation(#[from] SplitValidationError),

    #[error(transparent)]
    LockContention(#[from] LockContentionError),

    #[error(transparent)]
    PlanInfeasible(PlanInfeasibleError),

    #[error("Analyzer error: {0}")]
    Analyzer(AnalyzerError),

    #[error("{file} has {line_count} lines, already within the limit of {max_lines}")]
    NotNeeded {
        file: String,
        line_count: usize,
        max_lines: usize,
    },

    #[error("Cannot split {file}: {reason}")]
    Unsupported { file: String, reason: String },

    #[error("{file}: output {path} has {lines} lines, over the limit of {max_lines}")]
    SizeLimit {
        file: String,
        path: String,
        lines: usize,
        max_lines: usize,
    },

    #[error("Split cancelled before {stage}")]
    Cancelled { stage: SplitStage },

    #[error("Scanner error: {0}")]
    Scanner(#[from] context_code_scanner::ScannerError),

    #[error("Graph error: {0}")]
    Graph(#[from] context_graph::GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<AnalyzerError> for RefactorFailure {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::PlanInfeasible(infeasible) => Self::PlanInfeasible(infeasible),
            other => Self::Analyzer(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Syntax,
    ImportResolution,
    Behavior,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationStage::Syntax => "syntax",
            ValidationStage::ImportResolution => "import resolution",
            ValidationStage::Behavior => "behavior",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Validation failed at {stage}: {reason}")]
pub struct SplitValidationError {
    pub stage: ValidationStage,
    pub reason: String,
}

impl SplitValidationError {
    pub fn new(stage: ValidationStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Another split of the same file is in progress
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{file} is locked by another split")]
pub struct LockContentionError {
    pub file: String,
}
