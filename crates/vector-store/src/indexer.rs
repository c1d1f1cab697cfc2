use crate::embeddings::{canonical_text, text_hash, EmbeddingProvider};
use crate::error::{EmbeddingGenerationError, Result};
use crate::index::VectorIndex;
use crate::query_cache::{QueryCache, DEFAULT_QUERY_CACHE_CAPACITY};
use crate::types::{EntityRef, IndexPassReport};
use context_code_scanner::EntityId;
use context_graph::{GraphStore, StoredEmbedding};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const DEFAULT_EMBEDDING_BATCH: usize = 32;

/// Keeps entity embeddings in the graph and the vector index in step with
/// the graph's live entities.
pub struct EmbeddingIndexer {
    graph: Arc<GraphStore>,
    provider: Arc<dyn EmbeddingProvider>,
    index: RwLock<VectorIndex>,
    cache: QueryCache,
    batch_size: usize,
}

impl EmbeddingIndexer {
    pub fn new(graph: Arc<GraphStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let index = VectorIndex::new(provider.dimension());
        let cache = QueryCache::new(provider.model_id(), DEFAULT_QUERY_CACHE_CAPACITY);
        Self {
            graph,
            provider,
            index: RwLock::new(index),
            cache,
            batch_size: DEFAULT_EMBEDDING_BATCH,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_query_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = QueryCache::new(self.provider.model_id(), capacity);
        self
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn indexed_len(&self) -> usize {
        self.read_index().len()
    }

    pub fn is_indexed(&self, id: &EntityId) -> bool {
        self.read_index().contains(id)
    }

    fn read_index(&self) -> RwLockReadGuard<'_, VectorIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, VectorIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Embed every live entity that has no current vector, load current
    /// stored vectors into the index and evict entities that are gone.
    ///
    /// Embedding failures are logged and counted; the affected entities are
    /// picked up again by the next pass.
    pub async fn index_pending(&self) -> Result<IndexPassReport> {
        let model_id = self.provider.model_id().to_string();
        let dimension = self.provider.dimension();
        let snapshots = self.graph.entity_snapshots();
        let live: HashSet<EntityId> = snapshots.iter().map(|s| s.entity.id.clone()).collect();

        let mut report = IndexPassReport::default();
        let mut pending = Vec::new();
        {
            let mut index = self.write_index();
            report.evicted = index.retain(|id| live.contains(id));
            for snapshot in snapshots {
                let text = canonical_text(&snapshot.entity);
                let hash = text_hash(&text);
                match &snapshot.embedding {
                    Some(stored)
                        if stored.text_hash == hash
                            && stored.model_id == model_id
                            && stored.vector.len() == dimension =>
                    {
                        if !index.contains(&snapshot.entity.id) {
                            index.upsert(snapshot.entity.id.clone(), &stored.vector)?;
                            report.reused += 1;
                        }
                    }
                    _ => {
                        index.remove(&snapshot.entity.id);
                        pending.push((snapshot.entity.id, text, hash));
                    }
                }
            }
        }

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text, _)| text.clone()).collect();
            let vectors = match self.provider.embed_batch(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => vectors,
                Ok(vectors) => {
                    let err = EmbeddingGenerationError::new(
                        "batch",
                        format!("provider returned {} vectors for {} texts", vectors.len(), batch.len()),
                    );
                    warn!("{err}");
                    report.failed += batch.len();
                    continue;
                }
                Err(err) => {
                    warn!("{err}");
                    report.failed += batch.len();
                    continue;
                }
            };
            for ((id, _, hash), vector) in batch.iter().zip(vectors) {
                match self.store_vector(id, hash, &model_id, vector) {
                    Ok(()) => report.embedded += 1,
                    Err(err) => {
                        warn!("{err}");
                        report.failed += 1;
                    }
                }
            }
        }

        report.indexed = self.indexed_len();
        info!(
            "Embedding pass: {} embedded, {} reused, {} failed, {} evicted, {} indexed",
            report.embedded, report.reused, report.failed, report.evicted, report.indexed
        );
        Ok(report)
    }

    fn store_vector(&self, id: &EntityId, hash: &str, model_id: &str, vector: Vec<f32>) -> Result<()> {
        let dimension = self.provider.dimension();
        if vector.len() != dimension {
            return Err(EmbeddingGenerationError::new(
                id.to_string(),
                format!("expected dimension {dimension}, got {}", vector.len()),
            )
            .into());
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(EmbeddingGenerationError::new(id.to_string(), "non-finite vector component").into());
        }
        self.graph.set_embedding(
            id,
            StoredEmbedding {
                vector: vector.clone(),
                text_hash: hash.to_string(),
                model_id: model_id.to_string(),
            },
        )?;
        self.write_index().upsert(id.clone(), &vector)
    }

    /// Up to `k` indexed entity ids ranked by cosine similarity
    pub fn nearest_neighbors(&self, vector: &[f32], k: usize) -> Result<Vec<(EntityId, f32)>> {
        self.read_index().search(vector, k)
    }

    /// Entities whose embeddings are most similar to `query`.
    ///
    /// Hits on entities tombstoned since the last pass are skipped.
    pub async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<EntityRef>> {
        let vector = match self.cache.get(query) {
            Some(vector) => vector,
            None => {
                let vector = self.provider.embed(query).await?;
                if vector.len() != self.provider.dimension() {
                    return Err(EmbeddingGenerationError::new(
                        "query",
                        format!(
                            "expected dimension {}, got {}",
                            self.provider.dimension(),
                            vector.len()
                        ),
                    )
                    .into());
                }
                self.cache.put(query, vector.clone());
                vector
            }
        };

        let candidates = {
            let index = self.read_index();
            index.search(&vector, index.len())?
        };
        let mut results = Vec::with_capacity(k);
        for (id, score) in candidates {
            if results.len() == k {
                break;
            }
            let Some(node) = self.graph.entity(&id) else {
                continue;
            };
            results.push(EntityRef {
                id,
                file: node.file,
                qualified_name: node.entity.qualified_name,
                kind: node.entity.kind,
                span: node.entity.span,
                score,
            });
        }
        debug!("semantic_search({query:?}, {k}) -> {} hits", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::error::VectorStoreError;
    use async_trait::async_trait;
    use context_code_scanner::Scanner;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SHAPES: &str = r#"def circle_area(radius):
    """Compute the area of a circle from its radius."""
    return 3.14159 * radius * radius


def load_settings(path):
    """Read configuration settings from a file on disk."""
    with open(path) as handle:
        return handle.read()


def send_email(address, body):
    """Deliver an email message to the given address."""
    return (address, body)
"#;

    fn graph() -> Arc<GraphStore> {
        let graph = Arc::new(GraphStore::new());
        let scan = Scanner::default().scan_source("shapes.py", SHAPES).unwrap();
        graph.ingest(&scan, 0).unwrap();
        graph
    }

    struct FlakyProvider {
        inner: HashingEmbedder,
        failing: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EmbeddingGenerationError::new("batch", "provider offline").into());
            }
            self.inner.embed_batch(texts).await
        }
    }

    #[tokio::test]
    async fn docstring_query_finds_entity() {
        let indexer = EmbeddingIndexer::new(graph(), Arc::new(HashingEmbedder::default()));
        let report = indexer.index_pending().await.unwrap();
        assert_eq!(report.embedded, 3);
        assert_eq!(report.indexed, 3);

        let hits = indexer.semantic_search("area of a circle", 5).await.unwrap();
        assert_eq!(hits[0].qualified_name, "circle_area");
        assert_eq!(hits[0].file, "shapes.py");

        let hits = indexer.semantic_search("read configuration file", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].qualified_name, "load_settings");
    }

    #[tokio::test]
    async fn second_pass_reuses_stored_vectors() {
        let graph = graph();
        let indexer = EmbeddingIndexer::new(graph.clone(), Arc::new(HashingEmbedder::default()));
        indexer.index_pending().await.unwrap();
        let again = indexer.index_pending().await.unwrap();
        assert_eq!(again.embedded, 0);
        assert_eq!(again.indexed, 3);

        // a fresh indexer over the same graph only loads the stored vectors
        let fresh = EmbeddingIndexer::new(graph, Arc::new(HashingEmbedder::default()));
        let report = fresh.index_pending().await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.reused, 3);
    }

    #[tokio::test]
    async fn failures_are_retried_on_next_pass() {
        let provider = Arc::new(FlakyProvider {
            inner: HashingEmbedder::new(32),
            failing: AtomicBool::new(true),
        });
        let indexer = EmbeddingIndexer::new(graph(), provider.clone()).with_batch_size(2);
        let report = indexer.index_pending().await.unwrap();
        assert_eq!(report.failed, 3);
        assert_eq!(report.indexed, 0);
        assert!(matches!(
            indexer.semantic_search("area", 3).await,
            Err(VectorStoreError::Embedding(_))
        ));

        provider.failing.store(false, Ordering::SeqCst);
        let report = indexer.index_pending().await.unwrap();
        assert_eq!(report.embedded, 3);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn tombstoned_entities_are_evicted() {
        let graph = graph();
        let indexer = EmbeddingIndexer::new(graph.clone(), Arc::new(HashingEmbedder::default()));
        indexer.index_pending().await.unwrap();

        let trimmed = SHAPES.split("\n\n\ndef send_email").next().unwrap().to_string() + "\n";
        let scan = Scanner::default().scan_source("shapes.py", &trimmed).unwrap();
        graph.ingest(&scan, 1).unwrap();

        let hits = indexer.semantic_search("deliver email message", 3).await.unwrap();
        assert!(hits.iter().all(|hit| hit.qualified_name != "send_email"));

        let report = indexer.index_pending().await.unwrap();
        assert_eq!(report.evicted, 1);
        assert!(!indexer.is_indexed(&EntityId::new("shapes.py", "send_email")));
    }
}
