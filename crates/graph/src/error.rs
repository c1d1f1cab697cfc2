use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Consistency(#[from] GraphConsistencyError),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unsupported graph schema_version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// An edge whose endpoints are not both live nodes
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Graph consistency violation: {kind} edge {from} -> {to} (from {origin_file}): {reason}")]
pub struct GraphConsistencyError {
    pub from: String,
    pub to: String,
    pub kind: String,
    pub origin_file: String,
    pub reason: String,
}
