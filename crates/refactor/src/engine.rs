use crate::backup::BackupRecord;
use crate::error::{RefactorFailure, Result};
use crate::lock;
use crate::staging::StagedTree;
use crate::types::{
    Assurance, CancelFlag, ExtractedFile, HistoryEntry, HistoryMapping, RefactorResult, SplitStage,
};
use crate::validate::{TestHook, Validator, DEFAULT_TEST_TIMEOUT};
use context_analyzer::{join_path, split_path, Analyzer, RenderedFile, SplitPlan};
use context_code_scanner::{EntityId, FileScan, Scanner};
use context_graph::GraphStore;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Hidden sibling of `target` that is never a final path
fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ordinal = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.{}-{ordinal}.split.tmp", std::process::id()))
}

/// Bookkeeping of one attempt, consumed by commit or rollback
struct Attempt {
    file: String,
    stage: SplitStage,
    transitions: Vec<SplitStage>,
    /// Written but not yet renamed: (temp, final)
    pending: Vec<(PathBuf, PathBuf)>,
    backup: Option<BackupRecord>,
    swapped: bool,
    original: Option<FileScan>,
    /// Files the graph saw after the swap
    reingested: Vec<String>,
}

impl Attempt {
    fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            stage: SplitStage::Analyze,
            transitions: Vec::new(),
            pending: Vec::new(),
            backup: None,
            swapped: false,
            original: None,
            reingested: Vec::new(),
        }
    }

    fn enter(&mut self, stage: SplitStage) {
        if self.transitions.is_empty() {
            log::info!("Split {}: {stage}", self.file);
        } else {
            log::info!("Split {}: {} -> {stage}", self.file, self.stage);
        }
        self.stage = stage;
        self.transitions.push(stage);
    }
}

/// File-splitting state machine:
/// `ANALYZE → PLAN → EXTRACT → REWRITE → VALIDATE → COMMIT | ROLLBACK`.
///
/// Every attempt holds the file's split lock from ANALYZE until it resolves
/// and ends in exactly one [`RefactorResult`]. Final paths are only written
/// after a [`BackupRecord`] of all of them exists, and any failure after
/// that restores them byte for byte.
pub struct SplitEngine {
    root: PathBuf,
    graph: Arc<GraphStore>,
    scanner: Scanner,
    analyzer: Analyzer,
    validator: Validator,
    hook: Option<Arc<dyn TestHook>>,
    test_timeout: Duration,
    cancel: CancelFlag,
}

impl SplitEngine {
    pub fn new(root: impl Into<PathBuf>, graph: Arc<GraphStore>) -> Self {
        let scanner = Scanner::default();
        let validator = Validator::new(scanner.clone(), graph.builder().clone());
        Self {
            root: root.into(),
            graph,
            scanner,
            analyzer: Analyzer::new(),
            validator,
            hook: None,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            cancel: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn with_scanner(mut self, scanner: Scanner) -> Self {
        self.validator = Validator::new(scanner.clone(), self.graph.builder().clone());
        self.scanner = scanner;
        self
    }

    #[must_use]
    pub fn with_test_hook(mut self, hook: Arc<dyn TestHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn assurance(&self) -> Assurance {
        if self.hook.is_some() {
            Assurance::Full
        } else {
            Assurance::Reduced
        }
    }

    /// Plan and apply a split of `file` (project-relative)
    pub async fn split_file(&self, file: &str, max_lines: usize) -> RefactorResult {
        self.run(file, max_lines, None).await
    }

    /// Apply `plan`, re-planning if the file changed since it was computed
    pub async fn apply(&self, plan: &SplitPlan) -> RefactorResult {
        self.run(&plan.file, plan.max_lines, Some(plan)).await
    }

    async fn run(&self, file: &str, max_lines: usize, plan: Option<&SplitPlan>) -> RefactorResult {
        let normalized = lock::normalize_relative(file);
        let file = normalized.as_str();
        let mut attempt = Attempt::new(file);
        attempt.enter(SplitStage::Analyze);
        let lock = match lock::try_acquire(&self.root, file) {
            Ok(lock) => lock,
            Err(failure) => {
                log::warn!("Split {file} rejected: {failure}");
                return RefactorResult {
                    file: file.to_string(),
                    success: false,
                    stage: SplitStage::Analyze,
                    reason: Some(failure.to_string()),
                    failure: Some(failure),
                    history_mapping: None,
                    assurance: self.assurance(),
                    transitions: attempt.transitions,
                    rolled_back: false,
                };
            }
        };

        let result = match self.execute(&mut attempt, max_lines, plan).await {
            Ok(history) => {
                log::info!("Split {file} committed");
                RefactorResult {
                    file: file.to_string(),
                    success: true,
                    stage: SplitStage::Commit,
                    reason: None,
                    failure: None,
                    history_mapping: Some(history),
                    assurance: self.assurance(),
                    transitions: attempt.transitions,
                    rolled_back: false,
                }
            }
            Err(failure) => self.rollback(attempt, failure).await,
        };
        drop(lock);
        result
    }

    fn checkpoint(&self, next: SplitStage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RefactorFailure::Cancelled { stage: next });
        }
        Ok(())
    }

    async fn execute(&self, attempt: &mut Attempt, max_lines: usize, plan: Option<&SplitPlan>) -> Result<HistoryMapping> {
        let file = attempt.file.clone();

        // ANALYZE
        let source = tokio::fs::read_to_string(self.root.join(&file)).await?;
        let scan = self.scanner.scan_source(&file, &source)?;
        self.graph.ingest(&scan, now_ms())?;
        self.graph.link()?;
        attempt.original = Some(scan.clone());
        if scan.line_count <= max_lines {
            return Err(RefactorFailure::NotNeeded {
                file,
                line_count: scan.line_count,
                max_lines,
            });
        }

        self.checkpoint(SplitStage::Plan)?;
        attempt.enter(SplitStage::Plan);
        let plan = if scan.language.supports_split() {
            Some(self.fresh_plan(&scan, &source, max_lines, plan).await?)
        } else {
            None
        };

        self.checkpoint(SplitStage::Extract)?;
        attempt.enter(SplitStage::Extract);
        let Some(plan) = plan else {
            return Err(RefactorFailure::Unsupported {
                file,
                reason: format!("extracting {} code into modules is not supported", scan.language),
            });
        };
        let rendered = self.analyzer.render_split(&scan, &source, &plan)?;
        for module in &rendered.modules {
            let target = self.root.join(&module.path);
            if tokio::fs::try_exists(&target).await? {
                return Err(RefactorFailure::Other(format!("{} already exists", module.path)));
            }
            self.write_pending(attempt, module, target).await?;
        }

        self.checkpoint(SplitStage::Rewrite)?;
        attempt.enter(SplitStage::Rewrite);
        if let Some(oversized) = rendered.files().find(|rendered| rendered.line_count() > max_lines) {
            return Err(RefactorFailure::SizeLimit {
                file,
                path: oversized.path.clone(),
                lines: oversized.line_count(),
                max_lines,
            });
        }
        attempt.backup = Some(BackupRecord::capture(rendered.files().map(|file| self.root.join(&file.path))).await?);
        self.write_pending(attempt, &rendered.aggregator, self.root.join(&rendered.aggregator.path))
            .await?;

        self.checkpoint(SplitStage::Validate)?;
        attempt.enter(SplitStage::Validate);
        let proposed = self.validator.check_syntax(&rendered)?;
        self.graph
            .with_arena(|graph| self.validator.check_imports(graph, &scan, &plan, &proposed))?;
        if let Some(hook) = &self.hook {
            let staged = StagedTree::materialize(&self.root, &rendered).await?;
            self.validator
                .check_behavior(hook.as_ref(), staged.root(), staged.touched(), self.test_timeout)
                .await?;
        }

        self.checkpoint(SplitStage::Commit)?;
        attempt.enter(SplitStage::Commit);
        self.swap_in(attempt).await?;
        let scanned_at = now_ms();
        for proposed_scan in &proposed {
            attempt.reingested.push(proposed_scan.path.clone());
            self.graph.ingest(proposed_scan, scanned_at)?;
        }
        self.graph.link()?;
        Ok(history_mapping(&scan, &plan))
    }

    async fn fresh_plan(&self, scan: &FileScan, source: &str, max_lines: usize, plan: Option<&SplitPlan>) -> Result<SplitPlan> {
        if let Some(plan) = plan {
            if plan.content_hash == scan.content_hash && plan.max_lines == max_lines {
                return Ok(plan.clone());
            }
            log::info!("{} changed since it was planned, re-planning", scan.path);
        }
        let project_files = self.project_files(&scan.path).await?;
        let decision = self
            .graph
            .with_arena(|graph| self.analyzer.plan_split(graph, scan, source, max_lines, &project_files))?;
        decision.into_plan().ok_or_else(|| RefactorFailure::NotNeeded {
            file: scan.path.clone(),
            line_count: scan.line_count,
            max_lines,
        })
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

    async fn write_pending(&self, attempt: &mut Attempt, rendered: &RenderedFile, target: PathBuf) -> Result<()> {
        let temp = temp_path_for(&target);
        attempt.pending.push((temp.clone(), target));
        tokio::fs::write(&temp, rendered.content.as_bytes()).await?;
        Ok(())
    }

    async fn swap_in(&self, attempt: &mut Attempt) -> Result<()> {
        while let Some((temp, target)) = attempt.pending.pop() {
            attempt.swapped = true;
            if let Err(err) = tokio::fs::rename(&temp, &target).await {
                attempt.pending.push((temp, target));
                return Err(err.into());
            }
        }
        Ok(())
    }

    async fn rollback(&self, mut attempt: Attempt, failure: RefactorFailure) -> RefactorResult {
        let failed_stage = attempt.stage;
        attempt.enter(SplitStage::Rollback);
        let mut clean = true;

        for (temp, _) in attempt.pending.drain(..) {
            match tokio::fs::remove_file(&temp).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    log::warn!("Failed to remove {}: {err}", temp.display());
                    clean = false;
                }
            }
        }
        if attempt.swapped {
            if let Some(backup) = &attempt.backup {
                if let Err(err) = backup.restore().await {
                    log::warn!("Rollback of {} incomplete: {err}", attempt.file);
                    clean = false;
                }
            }
        }
        if !attempt.reingested.is_empty() {
            if let Some(original) = &attempt.original {
                for path in attempt.reingested.iter().filter(|path| **path != original.path) {
                    self.graph.tombstone_file(path);
                }
                let restored = self
                    .graph
                    .ingest(original, now_ms())
                    .and_then(|_| self.graph.link());
                if let Err(err) = restored {
                    log::warn!("Failed to restore graph for {}: {err}", attempt.file);
                }
            }
        }

        log::warn!("Split {} failed at {failed_stage}: {failure}", attempt.file);
        RefactorResult {
            file: attempt.file,
            success: false,
            stage: failed_stage,
            reason: Some(failure.to_string()),
            failure: Some(failure),
            history_mapping: None,
            assurance: self.assurance(),
            transitions: attempt.transitions,
            rolled_back: clean,
        }
    }
}

/// Which entities of the original went to which new file
fn history_mapping(original: &FileScan, plan: &SplitPlan) -> HistoryMapping {
    let extracted = plan
        .groups
        .iter()
        .map(|group| {
            let mut moved: HashSet<&EntityId> = group.entities.iter().collect();
            let mut origin_entities: Vec<EntityId> = Vec::new();
            // parents precede their members
            for entity in &original.entities {
                let inside = moved.contains(&entity.id)
                    || entity.parent.as_ref().is_some_and(|parent| moved.contains(parent));
                if inside {
                    moved.insert(&entity.id);
                    origin_entities.push(entity.id.clone());
                }
            }
            ExtractedFile {
                path: group.path.clone(),
                origin_entities,
            }
        })
        .collect();
    let mut mapping = HistoryMapping::default();
    mapping.entries.insert(
        plan.file.clone(),
        HistoryEntry {
            aggregator_path: plan.aggregator.path.clone(),
            extracted,
        },
    );
    mapping
}
