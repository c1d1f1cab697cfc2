use context_analyzer::{AnalyzerError, PlanInfeasibleError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Scanner error: {0}")]
    ScannerError(#[from] context_code_scanner::ScannerError),

    #[error("Graph error: {0}")]
    GraphError(#[from] context_graph::GraphError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] context_vector_store::VectorStoreError),

    #[error(transparent)]
    PlanInfeasible(PlanInfeasibleError),

    #[error("Analyzer error: {0}")]
    AnalyzerError(AnalyzerError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("Invalid project path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl From<AnalyzerError> for IndexerError {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::PlanInfeasible(infeasible) => Self::PlanInfeasible(infeasible),
            other => Self::AnalyzerError(other),
        }
    }
}

impl From<anyhow::Error> for IndexerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }
}
