use crate::builder::{GraphBuilder, IngestReport, LinkReport};
use crate::error::{GraphError, Result};
use crate::graph::{ConsistencyReport, GraphArena};
use crate::types::{
    EdgeRecord, EntityNode, EntitySnapshot, FileNode, GraphStats, NodeRecord, StoredEmbedding,
    Subgraph, SubgraphFilter,
};
use context_code_scanner::{EntityId, FileScan};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const GRAPH_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedGraph {
    schema_version: u32,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
}

/// Shared, lock-protected graph.
///
/// Writes to one file are serialized by that file's lock; records are
/// prepared under it and the arena write lock is held only while they are
/// applied. Readers always observe a graph in which every live edge connects
/// live nodes.
#[derive(Debug, Default)]
pub struct GraphStore {
    arena: RwLock<GraphArena>,
    builder: GraphBuilder,
    file_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(builder: GraphBuilder) -> Self {
        Self {
            arena: RwLock::new(GraphArena::new()),
            builder,
            file_locks: Mutex::default(),
        }
    }

    pub fn from_arena(arena: GraphArena) -> Self {
        Self {
            arena: RwLock::new(arena),
            builder: GraphBuilder::default(),
            file_locks: Mutex::default(),
        }
    }

    pub fn builder(&self) -> &GraphBuilder {
        &self.builder
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphArena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphArena> {
        self.arena.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock serializing writes to the file at `path`
    pub fn file_lock(&self, path: &str) -> Arc<Mutex<()>> {
        self.file_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default()
            .clone()
    }

    pub fn ingest(&self, scan: &FileScan, scanned_at_ms: u64) -> Result<IngestReport> {
        let lock = self.file_lock(&scan.path);
        let _file = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let prepared = self.builder.prepare(scan, scanned_at_ms);
        self.builder.apply(&mut self.write(), prepared)
    }

    pub fn tombstone_file(&self, path: &str) -> usize {
        let lock = self.file_lock(path);
        let _file = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write().tombstone_file(path)
    }

    pub fn link(&self) -> Result<LinkReport> {
        self.builder.link(&mut self.write())
    }

    pub fn query_subgraph(&self, filter: &SubgraphFilter) -> Subgraph {
        self.read().query_subgraph(filter)
    }

    pub fn consistency_check(&self) -> ConsistencyReport {
        self.write().consistency_check()
    }

    pub fn stats(&self) -> GraphStats {
        self.read().stats()
    }

    pub fn file(&self, path: &str) -> Option<FileNode> {
        self.read().file(path).cloned()
    }

    pub fn entity(&self, id: &EntityId) -> Option<EntityNode> {
        self.read().entity(id).cloned()
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.read().file_paths()
    }

    pub fn set_embedding(&self, id: &EntityId, embedding: StoredEmbedding) -> Result<()> {
        self.write().set_embedding(id, embedding)
    }

    pub fn entity_snapshots(&self) -> Vec<EntitySnapshot> {
        self.read().entity_snapshots()
    }

    pub fn tombstoned_entities(&self) -> Vec<EntityId> {
        self.read().tombstoned_entities()
    }

    /// Run `f` against a consistent view of the arena
    pub fn with_arena<R>(&self, f: impl FnOnce(&GraphArena) -> R) -> R {
        f(&self.read())
    }

    pub fn snapshot(&self) -> GraphArena {
        self.read().clone()
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = {
            let arena = self.read();
            let persisted = PersistedGraph {
                schema_version: GRAPH_SCHEMA_VERSION,
                nodes: arena.nodes().to_vec(),
                edges: arena.edges().to_vec(),
            };
            serde_json::to_vec_pretty(&persisted)?
        };
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Saved graph to {}", path.display());
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let persisted: PersistedGraph = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != GRAPH_SCHEMA_VERSION {
            return Err(GraphError::SchemaVersion {
                found: persisted.schema_version,
                expected: GRAPH_SCHEMA_VERSION,
            });
        }
        let arena = GraphArena::from_records(persisted.nodes, persisted.edges)?;
        Ok(Self::from_arena(arena))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_scanner::Scanner;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const LIB: &str = "def helper():\n    return 1\n\n\ndef run():\n    return helper()\n";

    fn store() -> GraphStore {
        let store = GraphStore::new();
        let scan = Scanner::default().scan_source("lib.py", LIB).unwrap();
        store.ingest(&scan, 42).unwrap();
        store.link().unwrap();
        store
    }

    #[tokio::test]
    async fn save_and_load_preserve_graph() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".context").join("graph.json");
        let store = store();
        store
            .set_embedding(
                &EntityId::new("lib.py", "run"),
                StoredEmbedding {
                    vector: vec![0.5, 0.5],
                    text_hash: "t".to_string(),
                    model_id: "m".to_string(),
                },
            )
            .unwrap();
        store.save(&path).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = GraphStore::load(&path).await.unwrap();
        assert_eq!(loaded.stats(), store.stats());
        assert_eq!(loaded.file("lib.py").map(|f| f.scanned_at_ms), Some(42));
        let subgraph = loaded.query_subgraph(&SubgraphFilter::for_file("lib.py"));
        assert_eq!(subgraph.nodes.len(), 2);
        assert_eq!(subgraph.edges.len(), 1);
    }

    #[tokio::test]
    async fn load_rejects_other_schema_versions() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("graph.json");
        tokio::fs::write(&path, r#"{"schema_version": 99, "nodes": [], "edges": []}"#)
            .await
            .unwrap();
        let err = GraphStore::load(&path).await.unwrap_err();
        assert!(matches!(
            err,
            GraphError::SchemaVersion {
                found: 99,
                expected: GRAPH_SCHEMA_VERSION
            }
        ));
    }

    #[test]
    fn concurrent_readers_see_consistent_graph() {
        let store = std::sync::Arc::new(store());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.with_arena(|arena| arena.stats().entities))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
        assert!(store.consistency_check().is_consistent());
    }

    #[test]
    fn writes_to_one_file_wait_while_other_files_proceed() {
        use std::sync::mpsc;
        use std::time::Duration;

        let store = Arc::new(GraphStore::new());
        let held = store.file_lock("a.py");
        let guard = held.lock().unwrap();

        let (tx, rx) = mpsc::channel();
        for path in ["a.py", "b.py"] {
            let store = store.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                let scan = Scanner::default().scan_source(path, LIB).unwrap();
                store.ingest(&scan, 0).unwrap();
                tx.send(path).unwrap();
            });
        }
        assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), "b.py");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        drop(guard);
        assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), "a.py");
        assert_eq!(store.stats().entities, 4);
    }
}
