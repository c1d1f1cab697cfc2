use context_graph::GraphError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingGenerationError),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("{0}")]
    Other(String),
}

/// The embedding provider failed for a batch or returned an unusable vector.
///
/// Non-fatal for indexing: affected entities stay unindexed until a later
/// pass succeeds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Embedding generation failed for {target}: {reason}")]
pub struct EmbeddingGenerationError {
    /// Entity id, or `query` / `batch` when not tied to one entity
    pub target: String,
    pub reason: String,
}

impl EmbeddingGenerationError {
    pub fn new(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            reason: reason.into(),
        }
    }
}
