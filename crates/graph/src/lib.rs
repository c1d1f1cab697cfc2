//! # Context Graph
//!
//! Persistent code-intelligence graph built from file scans.
//!
//! ## Architecture
//!
//! ```text
//! FileScan (context-code-scanner)
//!     │
//!     ├──> GraphBuilder::ingest
//!     │      ├─ Upsert file + entity nodes (keyed, idempotent)
//!     │      ├─ Contains edges (file → entity, class → method)
//!     │      └─ Tombstone entities the file no longer declares
//!     │
//!     ├──> GraphBuilder::link
//!     │      ├─ ModuleResolver: imports → file / module nodes
//!     │      ├─ Re-export chains, star imports
//!     │      └─ Reference edges with confidence
//!     │
//!     └──> GraphStore (RwLock<GraphArena>)
//!            ├─ query_subgraph / consistency_check / stats
//!            └─ JSON persistence (schema_version, tmp + rename)
//! ```

mod builder;
mod error;
mod graph;
mod resolver;
mod store;
mod types;

pub use builder::{
    GraphBuilder, IngestReport, LinkReport, MissingName, PreparedFile, UnresolvedImport,
};
pub use error::{GraphConsistencyError, GraphError, Result};
pub use graph::{ConsistencyReport, GraphArena};
pub use resolver::{ModuleResolver, Resolved};
pub use store::{GraphStore, GRAPH_SCHEMA_VERSION};
pub use types::{
    entity_key, file_key, module_key, EdgeIndex, EdgeKind, EdgeRecord, EntityNode,
    EntitySnapshot, FileNode, GraphStats, ImportResolution, ModuleNode, NewEdge, NodeData,
    NodeIndex, NodeRecord, StoredEmbedding, Subgraph, SubgraphEdge, SubgraphFilter, SubgraphNode,
};
