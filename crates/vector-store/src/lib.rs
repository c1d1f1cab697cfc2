//! # Context Vector Store
//!
//! Semantic embeddings for graph entities and nearest-neighbor search.
//!
//! ## Architecture
//!
//! ```text
//! GraphStore (live entities)
//!     │
//!     ├──> EmbeddingIndexer::index_pending
//!     │      ├─ canonical text: kind + qualified name + signature + docstring
//!     │      ├─ EmbeddingProvider (HashingEmbedder by default)
//!     │      └─ vector stored beside the node, inserted into VectorIndex
//!     │
//!     ├──> VectorIndex (ndarray, exact cosine, ties by entity id)
//!     │
//!     └──> EmbeddingWorker (tokio task, mpsc queue, flush)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use context_graph::GraphStore;
//! use context_vector_store::{EmbeddingIndexer, HashingEmbedder};
//! use std::sync::Arc;
//!
//! # async fn demo(graph: Arc<GraphStore>) -> context_vector_store::Result<()> {
//! let indexer = EmbeddingIndexer::new(graph, Arc::new(HashingEmbedder::default()));
//! indexer.index_pending().await?;
//! for hit in indexer.semantic_search("parse configuration", 5).await? {
//!     println!("{} {}: {:.3}", hit.file, hit.qualified_name, hit.score);
//! }
//! # Ok(())
//! # }
//! ```

mod embeddings;
mod error;
mod index;
mod indexer;
mod paths;
mod query_cache;
mod types;
mod worker;

pub use embeddings::{
    canonical_text, cosine_similarity, text_hash, tokenize, EmbeddingProvider, HashingEmbedder,
    DEFAULT_EMBEDDING_DIMENSION,
};
pub use error::{EmbeddingGenerationError, Result, VectorStoreError};
pub use index::VectorIndex;
pub use indexer::{EmbeddingIndexer, DEFAULT_EMBEDDING_BATCH};
pub use paths::{
    config_path_for_project_root, context_dir_for_project_root, graph_path_for_project_root,
    is_context_dir_name, locks_dir_for_project_root, staging_dir_for_project_root,
    CONFIG_FILE_NAME, CONTEXT_DIR_NAME, GRAPH_FILE_NAME, LOCKS_DIR_NAME, STAGING_DIR_NAME,
};
pub use query_cache::{QueryCache, DEFAULT_QUERY_CACHE_CAPACITY};
pub use types::{EntityRef, IndexPassReport};
pub use worker::{EmbeddingWorker, WorkerStatus};
