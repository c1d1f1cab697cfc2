use crate::config::EngineConfig;
use crate::error::{IndexerError, Result};
use crate::limits::{ScanConcurrencySnapshot, ScanLimiter};
use crate::pipeline::{now_ms, ScanPipeline};
use crate::scan_lock::acquire_scan_lock;
use crate::scanner::ScanOptions;
use crate::stats::ScanReport;
use context_analyzer::{
    file_metrics, impact_of, join_path, local_subgraph, split_path, Analyzer, FileMetrics,
    ImpactedEntity, SplitDecision, SplitPlan,
};
use context_code_scanner::{EntityId, Scanner};
use context_graph::GraphStore;
use context_refactor::{CancelFlag, RefactorResult, SplitEngine, TestHook};
use context_vector_store::{
    graph_path_for_project_root, EmbeddingIndexer, EmbeddingProvider, EmbeddingWorker, EntityRef,
    HashingEmbedder, IndexPassReport, WorkerStatus,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Entry point for callers: scanning, semantic search and file splitting
/// over one project root.
pub struct CodeIntelligence {
    root: PathBuf,
    config: EngineConfig,
    options: ScanOptions,
    scanner: Scanner,
    analyzer: Analyzer,
    graph: Arc<GraphStore>,
    embeddings: Arc<EmbeddingIndexer>,
    worker: EmbeddingWorker,
    limiter: ScanLimiter,
    test_hook: Option<Arc<dyn TestHook>>,
    cancel: CancelFlag,
}

impl CodeIntelligence {
    /// Open a project. `config = None` reads `.context/config.toml` and the
    /// environment. A persisted graph is loaded when present.
    ///
    /// Must be called inside a tokio runtime (starts the embedding worker).
    pub async fn open(root: impl AsRef<Path>, config: Option<EngineConfig>) -> Result<Self> {
        Self::open_with_provider(root, config, None).await
    }

    /// Like [`open`](Self::open), embedding with `provider` instead of the
    /// built-in hashing embedder
    pub async fn open_with_provider(
        root: impl AsRef<Path>,
        config: Option<EngineConfig>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let root = root.as_ref();
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| IndexerError::InvalidPath(format!("{}: {e}", root.display())))?;
        if !root.is_dir() {
            return Err(IndexerError::InvalidPath(format!(
                "Project root is not a directory: {}",
                root.display()
            )));
        }

        let config = match config {
            Some(config) => {
                config.validate().map_err(IndexerError::Config)?;
                config
            }
            None => EngineConfig::load(&root)?,
        };

        let graph_path = graph_path_for_project_root(&root);
        let graph = if graph_path.exists() {
            match GraphStore::load(&graph_path).await {
                Ok(graph) => {
                    log::info!("Loaded graph from {}", graph_path.display());
                    graph
                }
                Err(e) => {
                    log::warn!("Failed to load graph {}: {e}; starting fresh", graph_path.display());
                    GraphStore::new()
                }
            }
        } else {
            GraphStore::new()
        };
        let graph = Arc::new(graph);

        let provider = provider.unwrap_or_else(|| {
            Arc::new(HashingEmbedder::new(config.embedding_dimension)) as Arc<dyn EmbeddingProvider>
        });
        let embeddings = Arc::new(
            EmbeddingIndexer::new(graph.clone(), provider)
                .with_batch_size(config.embedding_batch)
                .with_query_cache_capacity(config.query_cache_capacity),
        );
        let worker = EmbeddingWorker::start(embeddings.clone());
        if graph.stats().entities > 0 {
            // stored vectors re-enter the in-memory index
            worker.request_pass();
        }

        Ok(Self {
            options: ScanOptions {
                include: config.include.clone(),
                exclude: config.exclude.clone(),
                max_file_size_bytes: config.max_file_size_bytes,
            },
            scanner: Scanner::new(config.scanner.clone()),
            analyzer: Analyzer::new(),
            limiter: ScanLimiter::new(config.scan_concurrency),
            root,
            config,
            graph,
            embeddings,
            worker,
            test_hook: None,
            cancel: CancelFlag::new(),
        })
    }

    /// Behavior check run by `apply_split` before committing
    #[must_use]
    pub fn with_test_hook(mut self, hook: Arc<dyn TestHook>) -> Self {
        self.test_hook = Some(hook);
        self
    }

    /// Replace the configured include/exclude globs for later scans
    #[must_use]
    pub fn with_scan_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> Arc<GraphStore> {
        self.graph.clone()
    }

    /// Flag observed by running splits between stages
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn embedding_status(&self) -> WorkerStatus {
        self.worker.status()
    }

    pub fn scan_concurrency(&self) -> ScanConcurrencySnapshot {
        self.limiter.snapshot()
    }

    /// Scan `path` (the root, a directory or a file inside it; relative paths
    /// are taken from the root) into the graph and queue an embedding pass.
    /// Files that vanished from the scanned scope are tombstoned.
    pub async fn scan(&self, path: impl AsRef<Path>) -> Result<ScanReport> {
        let target = self.resolve(path.as_ref()).await?;
        let _lock = acquire_scan_lock(&self.root).await?;
        let report = ScanPipeline {
            root: &self.root,
            graph: &self.graph,
            scanner: &self.scanner,
            options: &self.options,
            limiter: &self.limiter,
        }
        .run(&target)
        .await?;
        self.worker.request_pass();
        Ok(report)
    }

    /// Plan a split of `file` with every output at most `max_lines` lines.
    /// The file is re-read and re-ingested first when it changed since the
    /// last scan.
    pub async fn plan_split(&self, file: &str, max_lines: usize) -> Result<SplitDecision> {
        let path = self.resolve(Path::new(file)).await?;
        let relative = self.relative_path(&path);
        let content = tokio::fs::read_to_string(&path).await?;

        let scanner = self.scanner.clone();
        let (scan_path, source) = (relative.clone(), content.clone());
        let scan = tokio::task::spawn_blocking(move || scanner.scan_source(&scan_path, &source))
            .await
            .map_err(|e| IndexerError::Other(format!("parse task failed: {e}")))??;

        let known_hash = self.graph.file(&relative).map(|node| node.content_hash);
        if known_hash.as_deref() != Some(scan.content_hash.as_str()) {
            log::debug!("Re-ingesting {relative} before planning");
            self.graph.ingest(&scan, now_ms())?;
            self.graph.link()?;
        }

        let project_files = self.project_files(&relative).await?;
        let decision = self.graph.with_arena(|graph| {
            self.analyzer
                .plan_split(graph, &scan, &content, max_lines, &project_files)
        })?;
        match &decision {
            SplitDecision::NotNeeded { line_count, .. } => {
                log::info!("{relative} has {line_count} lines; no split needed at {max_lines}");
            }
            SplitDecision::Split(plan) => log::info!(
                "Planned split of {relative} into {} modules (cut weight {:.2})",
                plan.groups.len(),
                plan.cut_weight
            ),
        }
        Ok(decision)
    }

    /// [`plan_split`](Self::plan_split) with the configured `max_lines`
    pub async fn plan_split_default(&self, file: &str) -> Result<SplitDecision> {
        self.plan_split(file, self.config.max_lines).await
    }

    /// Carry out a plan. Every outcome, including lock contention and
    /// rollback, is reported in the result.
    pub async fn apply_split(&self, plan: &SplitPlan) -> RefactorResult {
        let result = self.engine().apply(plan).await;
        self.after_split(&result);
        result
    }

    /// Plan and apply in one locked attempt
    pub async fn split_file(&self, file: &str, max_lines: usize) -> RefactorResult {
        let file = self.relative_path(Path::new(file));
        let result = self.engine().split_file(&file, max_lines).await;
        self.after_split(&result);
        result
    }

    pub async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<EntityRef>> {
        Ok(self.embeddings.semantic_search(query, k).await?)
    }

    /// Entities that (transitively) reference `qualified_name` in `file`
    pub fn impact(&self, file: &str, qualified_name: &str, max_depth: usize) -> Vec<ImpactedEntity> {
        let id = EntityId::new(file, qualified_name);
        self.graph.with_arena(|graph| impact_of(graph, &id, max_depth))
    }

    /// Cohesion and coupling of one file
    pub fn file_metrics(&self, file: &str) -> Option<FileMetrics> {
        self.graph.file(file)?;
        Some(self.graph.with_arena(|graph| file_metrics(&local_subgraph(graph, file), file)))
    }

    /// Persist the graph (with stored embeddings) to `.context/graph.json`
    pub async fn save(&self) -> Result<()> {
        let _lock = acquire_scan_lock(&self.root).await?;
        let path = graph_path_for_project_root(&self.root);
        self.graph.save(&path).await?;
        log::info!("Saved graph to {}", path.display());
        Ok(())
    }

    /// Wait for an embedding pass covering everything scanned so far
    pub async fn flush_embeddings(&self) -> Result<IndexPassReport> {
        Ok(self.worker.flush().await?)
    }

    /// Stop the embedding worker
    pub async fn shutdown(&self) {
        self.worker.shutdown().await;
    }

    fn engine(&self) -> SplitEngine {
        let engine = SplitEngine::new(&self.root, self.graph.clone())
            .with_scanner(self.scanner.clone())
            .with_test_timeout(self.config.test_timeout())
            .with_cancel_flag(self.cancel.clone());
        match &self.test_hook {
            Some(hook) => engine.with_test_hook(hook.clone()),
            None => engine,
        }
    }

    fn after_split(&self, result: &RefactorResult) {
        if result.success {
            self.worker.request_pass();
        } else {
            log::warn!(
                "Split of {} stopped at {}: {}",
                result.file,
                result.stage,
                result.reason.as_deref().unwrap_or("unknown reason")
            );
        }
    }

    async fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = tokio::fs::canonicalize(&joined)
            .await
            .map_err(|e| IndexerError::InvalidPath(format!("{}: {e}", joined.display())))?;
        if !resolved.starts_with(&self.root) {
            return Err(IndexerError::InvalidPath(format!(
                "{} is outside the project root {}",
                resolved.display(),
                self.root.display()
            )));
        }
        Ok(resolved)
    }

    fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.to_string_lossy().replace('\\', "/")
    }

    /// Graph files plus whatever already sits next to `file` on disk
    async fn project_files(&self, file: &str) -> Result<BTreeSet<String>> {
        let mut files: BTreeSet<String> = self.graph.file_paths().into_iter().collect();
        let (dir, _) = split_path(file);
        let mut entries = tokio::fs::read_dir(self.root.join(dir)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                files.insert(join_path(dir, name));
            }
        }
        Ok(files)
    }
}
