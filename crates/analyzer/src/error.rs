use context_code_scanner::Language;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error(transparent)]
    PlanInfeasible(#[from] PlanInfeasibleError),

    #[error("Splitting {language} files is not supported: {file}")]
    UnsupportedLanguage { file: String, language: Language },

    #[error("{0}")]
    Other(String),
}

/// No partition keeps every output file within `max_lines`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Cannot split {file} within {max_lines} lines: {reason}{}", entity_suffix(.entity))]
pub struct PlanInfeasibleError {
    pub file: String,
    /// Qualified name of the entity that cannot be placed
    pub entity: Option<String>,
    pub estimated_lines: usize,
    pub max_lines: usize,
    pub reason: String,
}

fn entity_suffix(entity: &Option<String>) -> String {
    entity
        .as_ref()
        .map(|name| format!(" (entity `{name}`)"))
        .unwrap_or_default()
}
