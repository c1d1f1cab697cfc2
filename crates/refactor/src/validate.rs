use crate::error::{SplitValidationError, ValidationStage};
use async_trait::async_trait;
use context_analyzer::{RenderedSplit, SplitPlan};
use context_code_scanner::{FileScan, ModuleItemKind, Scanner};
use context_graph::{GraphArena, GraphBuilder, LinkReport};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(300);

type Validation<T> = std::result::Result<T, SplitValidationError>;

/// Caller-supplied behavior check run against a staged copy of the project
/// with the split applied
#[async_trait]
pub trait TestHook: Send + Sync {
    /// `true` when the tests pass. `root` is the staged project; `paths` are
    /// the files the split touched, inside it.
    async fn run_tests(&self, root: &Path, paths: &[PathBuf]) -> std::io::Result<bool>;
}

/// Runs an external command (e.g. `pytest -q`) from the staged project root
/// with the touched paths appended
#[derive(Debug, Clone)]
pub struct CommandTestHook {
    program: String,
    args: Vec<String>,
    subdir: Option<PathBuf>,
    append_paths: bool,
}

impl CommandTestHook {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            subdir: None,
            append_paths: true,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run from `dir` (relative to the project root) instead of the root
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.subdir = Some(dir.into());
        self
    }

    /// Run the command as is, without the touched paths
    #[must_use]
    pub fn without_paths(mut self) -> Self {
        self.append_paths = false;
        self
    }
}

#[async_trait]
impl TestHook for CommandTestHook {
    async fn run_tests(&self, root: &Path, paths: &[PathBuf]) -> std::io::Result<bool> {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        if self.append_paths {
            command.args(paths);
        }
        match &self.subdir {
            Some(dir) => command.current_dir(root.join(dir)),
            None => command.current_dir(root),
        };
        let output = command.output().await?;
        if !output.status.success() {
            log::warn!(
                "Test command {} failed ({}): {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }
}

/// Names the file binds at module level
fn bound_names(scan: &FileScan) -> HashSet<String> {
    let mut names: HashSet<String> = scan.top_level_entities().map(|entity| entity.name.clone()).collect();
    names.extend(scan.imports.iter().filter(|record| record.top_level).filter_map(|record| record.bound_name()));
    names.extend(
        scan.items
            .iter()
            .filter(|item| item.kind == ModuleItemKind::Other)
            .flat_map(|item| item.binds.iter().cloned()),
    );
    names
}

/// Names other code may rely on: underscore-free top-level names plus `__all__`
pub fn public_interface(scan: &FileScan) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = scan
        .top_level_entities()
        .filter(|entity| entity.is_public() || !entity.name.starts_with('_'))
        .map(|entity| entity.name.clone())
        .collect();
    names.extend(scan.exports.iter().flatten().cloned());
    names
}

type UnresolvedKey = (String, String, Option<String>);
type MissingKey = (String, String, String);

fn unresolved_keys(report: &LinkReport) -> HashSet<UnresolvedKey> {
    report
        .unresolved_imports
        .iter()
        .map(|import| (import.file.clone(), import.module.clone(), import.name.clone()))
        .collect()
}

fn missing_keys(report: &LinkReport) -> HashSet<MissingKey> {
    report
        .missing_names
        .iter()
        .map(|missing| (missing.file.clone(), missing.module.clone(), missing.name.clone()))
        .collect()
}

/// Syntax and import-resolution checks on a proposed file set
#[derive(Debug, Clone, Default)]
pub struct Validator {
    scanner: Scanner,
    builder: GraphBuilder,
}

impl Validator {
    pub fn new(scanner: Scanner, builder: GraphBuilder) -> Self {
        Self { scanner, builder }
    }

    /// Every new or modified file parses
    pub fn check_syntax(&self, rendered: &RenderedSplit) -> Validation<Vec<FileScan>> {
        rendered
            .files()
            .map(|file| {
                self.scanner
                    .scan_source(&file.path, &file.content)
                    .map_err(|err| SplitValidationError::new(ValidationStage::Syntax, format!("{}: {err}", file.path)))
            })
            .collect()
    }

    /// Link the project with the proposed files overlaid and compare with the
    /// current state: no new unresolved imports or missing names, the public
    /// interface of the original still bound by the aggregator, and moved
    /// entities keeping their signatures.
    pub fn check_imports(
        &self,
        graph: &GraphArena,
        original: &FileScan,
        plan: &SplitPlan,
        proposed: &[FileScan],
    ) -> Validation<()> {
        let failure = |reason: String| SplitValidationError::new(ValidationStage::ImportResolution, reason);
        let mut overlay = graph.clone();
        let baseline = self
            .builder
            .link(&mut overlay)
            .map_err(|err| failure(format!("linking current graph: {err}")))?;
        for scan in proposed {
            self.builder
                .ingest(&mut overlay, scan, 0)
                .map_err(|err| failure(format!("ingesting {}: {err}", scan.path)))?;
        }
        let report = self
            .builder
            .link(&mut overlay)
            .map_err(|err| failure(format!("linking proposed files: {err}")))?;

        let touched: HashSet<&str> = proposed.iter().map(|scan| scan.path.as_str()).collect();
        let known_unresolved = unresolved_keys(&baseline);
        if let Some(import) = report.unresolved_imports.iter().find(|import| {
            let inherited = touched.contains(import.file.as_str())
                && known_unresolved.contains(&(original.path.clone(), import.module.clone(), import.name.clone()));
            !inherited && !known_unresolved.contains(&(import.file.clone(), import.module.clone(), import.name.clone()))
        }) {
            return Err(failure(format!(
                "{}:{} import of {}{} does not resolve",
                import.file,
                import.line,
                import.module,
                import.name.as_deref().map(|name| format!(".{name}")).unwrap_or_default()
            )));
        }
        let known_missing = missing_keys(&baseline);
        if let Some(missing) = report.missing_names.iter().find(|missing| {
            let inherited = touched.contains(missing.file.as_str())
                && known_missing.contains(&(original.path.clone(), missing.module.clone(), missing.name.clone()));
            !inherited && !known_missing.contains(&(missing.file.clone(), missing.module.clone(), missing.name.clone()))
        }) {
            return Err(failure(format!(
                "{}:{} imports `{}` from {}, which does not bind it",
                missing.file, missing.line, missing.name, missing.target
            )));
        }

        let Some(aggregator) = proposed.iter().find(|scan| scan.path == original.path) else {
            return Err(failure(format!("no rewritten content for {}", original.path)));
        };
        let bound = bound_names(aggregator);
        if let Some(name) = public_interface(original).into_iter().find(|name| !bound.contains(name)) {
            return Err(failure(format!("public name `{name}` is no longer bound by {}", original.path)));
        }

        for group in &plan.groups {
            let Some(module) = proposed.iter().find(|scan| scan.path == group.path) else {
                return Err(failure(format!("missing extracted module {}", group.path)));
            };
            for id in &group.entities {
                let Some(before) = original.entity(id) else {
                    continue;
                };
                let after = module.top_level_by_name(&before.name);
                match after {
                    Some(after) if after.signature == before.signature => {}
                    Some(after) => {
                        return Err(failure(format!(
                            "signature of `{}` changed: `{}` became `{}`",
                            before.qualified_name, before.signature, after.signature
                        )))
                    }
                    None => {
                        return Err(failure(format!("`{}` is missing from {}", before.qualified_name, group.path)))
                    }
                }
            }
        }
        Ok(())
    }

    /// Caller tests under a deadline; failure, error and timeout all reject
    pub async fn check_behavior(
        &self,
        hook: &dyn TestHook,
        root: &Path,
        paths: &[PathBuf],
        timeout: Duration,
    ) -> Validation<()> {
        let failure = |reason: String| SplitValidationError::new(ValidationStage::Behavior, reason);
        match tokio::time::timeout(timeout, hook.run_tests(root, paths)).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(failure("tests failed".to_string())),
            Ok(Err(err)) => Err(failure(format!("test hook error: {err}"))),
            Err(_) => Err(failure(format!("tests timed out after {}ms", timeout.as_millis()))),
        }
    }
}
