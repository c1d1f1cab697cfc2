use crate::error::Result;
use crate::limits::ScanLimiter;
use crate::scanner::{FileScanner, ScanOptions};
use crate::stats::ScanReport;
use context_code_scanner::{content_hash, FileScan, Scanner};
use context_graph::GraphStore;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

enum FileOutcome {
    Unchanged,
    Parsed(FileScan),
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Walk, read, parse and ingest one scope of the project, then link
pub(crate) struct ScanPipeline<'a> {
    pub root: &'a Path,
    pub graph: &'a Arc<GraphStore>,
    pub scanner: &'a Scanner,
    pub options: &'a ScanOptions,
    pub limiter: &'a ScanLimiter,
}

impl ScanPipeline<'_> {
    pub(crate) async fn run(&self, target: &Path) -> Result<ScanReport> {
        let start = Instant::now();
        let mut report = ScanReport::new();
        let walker = FileScanner::new(self.root, self.options)?;
        let scope = walker.relative_path(target);
        log::info!(
            "Scanning {} (concurrency {})",
            if scope.is_empty() { "." } else { scope.as_str() },
            self.limiter.snapshot().limit
        );

        let files: Vec<(PathBuf, String)> = walker
            .scan(target)?
            .into_iter()
            .filter(|path| self.scanner.accepts(path))
            .map(|path| {
                let relative = walker.relative_path(&path);
                (path, relative)
            })
            .collect();
        let live: HashSet<&str> = files.iter().map(|(_, relative)| relative.as_str()).collect();

        let mut tasks = Vec::with_capacity(files.len());
        for (path, relative) in &files {
            let known_hash = self.graph.file(relative).map(|file| file.content_hash);
            let task = tokio::spawn(process_file(
                self.limiter.clone(),
                self.scanner.clone(),
                path.clone(),
                relative.clone(),
                known_hash,
            ));
            tasks.push((relative.as_str(), task));
        }

        let scanned_at = now_ms();
        for (relative, task) in tasks {
            match task.await {
                Ok(Ok(FileOutcome::Unchanged)) => report.add_unchanged(),
                Ok(Ok(FileOutcome::Parsed(scan))) => {
                    let ingest = self.graph.ingest(&scan, scanned_at)?;
                    log::debug!(
                        "Ingested {} ({} entities, {} tombstoned)",
                        ingest.file,
                        ingest.entities,
                        ingest.tombstoned.len()
                    );
                    report.add_file(scan.language.as_str(), scan.line_count, ingest.entities);
                    report.tombstoned_entities += ingest.tombstoned.len();
                }
                Ok(Err(reason)) => {
                    log::warn!("Skipping {relative}: {reason}");
                    report.add_failure(relative, reason);
                }
                Err(e) => report.add_failure(relative, format!("Task panicked: {e}")),
            }
        }

        for path in self.graph.file_paths() {
            if in_scope(&path, &scope) && !live.contains(path.as_str()) {
                let removed = self.graph.tombstone_file(&path);
                log::debug!("Tombstoned {path} ({removed} entities)");
                report.tombstoned_entities += removed;
                report.tombstoned_files.push(path);
            }
        }

        let link = self.graph.link()?;
        report.import_edges = link.import_edges;
        report.reference_edges = link.reference_edges;
        report.unresolved_imports = link.unresolved_imports.len();

        let consistency = self.graph.consistency_check();
        for violation in &consistency.violations {
            log::warn!("Graph consistency: {violation}");
        }
        report.consistency_violations = consistency.violations.len();

        report.time_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "Scan complete: {} scanned, {} unchanged, {} failed, {} tombstoned in {}ms",
            report.files_scanned,
            report.files_unchanged,
            report.failures.len(),
            report.tombstoned_files.len(),
            report.time_ms
        );
        Ok(report)
    }
}

async fn process_file(
    limiter: ScanLimiter,
    scanner: Scanner,
    path: PathBuf,
    relative: String,
    known_hash: Option<String>,
) -> std::result::Result<FileOutcome, String> {
    let _permit = limiter
        .acquire()
        .await
        .map_err(|e| format!("scan limiter closed: {e}"))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| format!("{}: {e}", path.display()))?;
    if known_hash.as_deref() == Some(content_hash(&bytes).as_str()) {
        return Ok(FileOutcome::Unchanged);
    }
    let content = String::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string())?;
    let scan = tokio::task::spawn_blocking(move || scanner.scan_source(&relative, &content))
        .await
        .map_err(|e| format!("parse task failed: {e}"))?
        .map_err(|e| e.to_string())?;
    Ok(FileOutcome::Parsed(scan))
}

/// `path` lies under the relative `scope` (empty = whole project)
fn in_scope(path: &str, scope: &str) -> bool {
    scope.is_empty()
        || path == scope
        || path
            .strip_prefix(scope)
            .is_some_and(|rest| rest.starts_with('/'))
}
