use async_trait::async_trait;
use context_analyzer::{Analyzer, SplitDecision};
use context_code_scanner::{EntityId, Scanner};
use context_graph::{EdgeKind, GraphStore};
use context_refactor::{
    acquire_split_lock, Assurance, CancelFlag, RefactorFailure, SplitEngine, SplitStage, TestHook,
    ValidationStage,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const SHAPES: &str = r#""""Shape helpers."""
from __future__ import annotations

import math


def area(radius):
    return math.pi * radius * radius


def circumference(radius):
    return 2 * math.pi * radius


def describe(radius):
    return f"{area(radius):.2f} / {circumference(radius):.2f}"


class Square:
    def __init__(self, side):
        self.side = side

    def area(self):
        return self.side * self.side


def _scale(square, factor):
    return Square(square.side * factor)


def grow(square):
    return _scale(square, 2)
"#;

const APP: &str = "from pkg.shapes import area, grow\n\n\ndef main():\n    return area(2), grow(None)\n";

struct Project {
    temp: TempDir,
    graph: Arc<GraphStore>,
}

impl Project {
    async fn new(files: &[(&str, &str)]) -> Self {
        let temp = TempDir::new().unwrap();
        let graph = Arc::new(GraphStore::new());
        let scanner = Scanner::default();
        for (path, content) in files {
            let absolute = temp.path().join(path);
            tokio::fs::create_dir_all(absolute.parent().unwrap()).await.unwrap();
            tokio::fs::write(&absolute, content).await.unwrap();
            let scan = scanner.scan_source(path, content).unwrap();
            graph.ingest(&scan, 0).unwrap();
        }
        graph.link().unwrap();
        Self { temp, graph }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn engine(&self) -> SplitEngine {
        SplitEngine::new(self.root(), self.graph.clone())
    }

    async fn read(&self, path: &str) -> Option<String> {
        tokio::fs::read_to_string(self.root().join(path)).await.ok()
    }

    /// Every file under the root except the lock directory
    fn listing(&self) -> BTreeSet<String> {
        fn walk(dir: &Path, root: &Path, out: &mut BTreeSet<String>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.ends_with(".context") {
                    continue;
                }
                if path.is_dir() {
                    walk(&path, root, out);
                } else {
                    out.insert(path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"));
                }
            }
        }
        let mut out = BTreeSet::new();
        walk(self.root(), self.root(), &mut out);
        out
    }
}

async fn shapes_project() -> Project {
    Project::new(&[("pkg/__init__.py", ""), ("pkg/shapes.py", SHAPES), ("app.py", APP)]).await
}

/// Qualified names of live entities and the live reference edges between
/// them, whichever files hold them
fn file_independent_view(graph: &GraphStore) -> (BTreeSet<String>, BTreeSet<(String, String, &'static str)>) {
    graph.with_arena(|arena| {
        let names = arena
            .entity_snapshots()
            .into_iter()
            .map(|snapshot| snapshot.entity.qualified_name)
            .collect();
        let references = arena
            .live_edges()
            .filter(|(_, edge)| matches!(edge.kind, EdgeKind::Reference { .. }))
            .filter_map(|(_, edge)| {
                let from = arena.entity_at(edge.from)?;
                let to = arena.entity_at(edge.to)?;
                Some((
                    from.entity.qualified_name.clone(),
                    to.entity.qualified_name.clone(),
                    edge.kind.label(),
                ))
            })
            .collect();
        (names, references)
    })
}

struct Verdict {
    pass: bool,
    project: PathBuf,
    calls: AtomicUsize,
    staged_root: std::sync::Mutex<Option<PathBuf>>,
    seen: std::sync::Mutex<Vec<PathBuf>>,
}

impl Verdict {
    fn new(pass: bool, project: &Path) -> Arc<Self> {
        Arc::new(Self {
            pass,
            project: project.to_path_buf(),
            calls: AtomicUsize::new(0),
            staged_root: std::sync::Mutex::new(None),
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TestHook for Verdict {
    async fn run_tests(&self, root: &Path, paths: &[PathBuf]) -> std::io::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_ne!(root, self.project.as_path());
        for path in paths {
            assert!(path.starts_with(root), "{} is outside the staged copy", path.display());
            assert!(path.exists(), "{} missing during tests", path.display());
        }
        // untouched project files are staged too
        assert_eq!(std::fs::read_to_string(root.join("app.py"))?, APP);
        // nothing is written to the project before the tests pass
        assert_eq!(std::fs::read_to_string(self.project.join("pkg/shapes.py"))?, SHAPES);
        assert!(!self.project.join("pkg/shapes_area.py").exists());

        *self.staged_root.lock().unwrap() = Some(root.to_path_buf());
        self.seen.lock().unwrap().extend(paths.iter().cloned());
        Ok(self.pass)
    }
}

#[tokio::test]
async fn split_commits_modules_and_keeps_public_interface() {
    let project = shapes_project().await;
    let result = project.engine().split_file("pkg/shapes.py", 22).await;
    assert!(result.success, "split failed: {:?}", result.reason);
    assert_eq!(result.stage, SplitStage::Commit);
    assert_eq!(result.assurance, Assurance::Reduced);
    assert_eq!(
        result.transitions,
        vec![
            SplitStage::Analyze,
            SplitStage::Plan,
            SplitStage::Extract,
            SplitStage::Rewrite,
            SplitStage::Validate,
            SplitStage::Commit,
        ]
    );

    assert_eq!(
        project.listing(),
        BTreeSet::from([
            "app.py".to_string(),
            "pkg/__init__.py".to_string(),
            "pkg/shapes.py".to_string(),
            "pkg/shapes_area.py".to_string(),
            "pkg/shapes_square.py".to_string(),
        ])
    );
    let aggregator = project.read("pkg/shapes.py").await.unwrap();
    assert!(aggregator.contains("from .shapes_area import area\n"));
    assert!(aggregator.contains("from .shapes_square import grow\n"));
    for path in ["pkg/shapes.py", "pkg/shapes_area.py", "pkg/shapes_square.py"] {
        let content = project.read(path).await.unwrap();
        assert!(content.lines().count() <= 22, "{path} is over the limit");
        Scanner::default().scan_source(path, &content).unwrap();
    }
    let square = project.read("pkg/shapes_square.py").await.unwrap();
    assert!(square.contains("def _scale(square, factor):"));

    let history = result.history_mapping.unwrap();
    let entry = history.entry("pkg/shapes.py").unwrap();
    assert_eq!(entry.aggregator_path, "pkg/shapes.py");
    assert_eq!(
        history.destination_of(&EntityId::new("pkg/shapes.py", "Square.area")),
        Some("pkg/shapes_square.py")
    );

    // the graph now holds the new layout and app.py still resolves
    let stats = project.graph.stats();
    assert_eq!(stats.files, 5);
    assert!(project.graph.file("pkg/shapes_area.py").is_some());
    let report = project.graph.link().unwrap();
    assert!(report.unresolved_imports.is_empty());
    assert!(report.missing_names.is_empty());
    assert!(project.graph.consistency_check().is_consistent());
}

#[tokio::test]
async fn failing_tests_roll_back_byte_identically() {
    let project = shapes_project().await;
    let before = project.listing();
    let hook = Verdict::new(false, project.root());
    let result = project
        .engine()
        .with_test_hook(hook.clone())
        .split_file("pkg/shapes.py", 22)
        .await;

    assert!(!result.success);
    assert!(result.rolled_back);
    assert_eq!(result.stage, SplitStage::Validate);
    assert_eq!(result.transitions.last(), Some(&SplitStage::Rollback));
    let Some(RefactorFailure::Validation(err)) = &result.failure else {
        panic!("expected a validation failure, got {:?}", result.failure);
    };
    assert_eq!(err.stage, ValidationStage::Behavior);
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    assert_eq!(hook.seen.lock().unwrap().len(), 3);
    let staged_root = hook.staged_root.lock().unwrap().clone().unwrap();
    assert!(!staged_root.exists());

    assert_eq!(project.listing(), before);
    assert_eq!(project.read("pkg/shapes.py").await.unwrap(), SHAPES);
    assert!(project.graph.file("pkg/shapes_area.py").is_none());
}

#[tokio::test]
async fn passing_tests_give_full_assurance() {
    let project = shapes_project().await;
    let hook = Verdict::new(true, project.root());
    let result = project
        .engine()
        .with_test_hook(hook.clone())
        .split_file("pkg/shapes.py", 22)
        .await;
    assert!(result.success, "split failed: {:?}", result.reason);
    assert_eq!(result.assurance, Assurance::Full);
    assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    assert!(project.read("pkg/shapes_area.py").await.is_some());
    let staged_root = hook.staged_root.lock().unwrap().clone().unwrap();
    assert!(!staged_root.exists());
}

#[tokio::test]
async fn split_keeps_entities_and_references() {
    let project = shapes_project().await;
    let before = file_independent_view(&project.graph);
    assert!(before.0.contains("Square.area"));
    assert!(before.1.contains(&("grow".to_string(), "_scale".to_string(), "call")));
    assert!(before.1.contains(&("main".to_string(), "area".to_string(), "call")));

    let result = project.engine().split_file("pkg/shapes.py", 22).await;
    assert!(result.success, "split failed: {:?}", result.reason);
    assert_eq!(file_independent_view(&project.graph), before);

    // a fresh graph built from the files on disk agrees
    let rebuilt = GraphStore::new();
    for path in project.listing() {
        let content = project.read(&path).await.unwrap();
        rebuilt.ingest(&Scanner::default().scan_source(&path, &content).unwrap(), 0).unwrap();
    }
    rebuilt.link().unwrap();
    assert_eq!(file_independent_view(&rebuilt), before);
}

#[tokio::test]
async fn equivalent_spellings_of_a_path_share_the_split_lock() {
    let project = shapes_project().await;
    let _held = acquire_split_lock(project.root(), "pkg/shapes.py").unwrap();
    for spelling in ["./pkg/shapes.py", "pkg/../pkg/shapes.py"] {
        let result = project.engine().split_file(spelling, 22).await;
        assert!(result.is_lock_contention(), "{spelling}: {:?}", result.reason);
        assert_eq!(result.file, "pkg/shapes.py");
    }
    assert_eq!(project.read("pkg/shapes.py").await.unwrap(), SHAPES);
}

#[tokio::test]
async fn script_header_survives_the_split() {
    let source = format!("#!/usr/bin/env python3\n# -*- coding: utf-8 -*-\n{}", &SHAPES[SHAPES.find('\n').unwrap() + 1..]);
    let project = Project::new(&[("pkg/__init__.py", ""), ("pkg/shapes.py", source.as_str())]).await;
    let result = project.engine().split_file("pkg/shapes.py", 24).await;
    assert!(result.success, "split failed: {:?}", result.reason);
    let aggregator = project.read("pkg/shapes.py").await.unwrap();
    let mut lines = aggregator.lines();
    assert_eq!(lines.next(), Some("#!/usr/bin/env python3"));
    assert_eq!(lines.next(), Some("# -*- coding: utf-8 -*-"));
}

#[tokio::test]
async fn held_lock_rejects_a_second_split() {
    let project = shapes_project().await;
    let _held = acquire_split_lock(project.root(), "pkg/shapes.py").unwrap();
    let result = project.engine().split_file("pkg/shapes.py", 22).await;
    assert!(!result.success);
    assert!(result.is_lock_contention());
    assert_eq!(result.stage, SplitStage::Analyze);
    assert_eq!(result.transitions, vec![SplitStage::Analyze]);
    assert_eq!(project.read("pkg/shapes.py").await.unwrap(), SHAPES);
}

#[tokio::test]
async fn infeasible_plans_leave_files_untouched() {
    let project = shapes_project().await;
    let before = project.listing();
    let result = project.engine().split_file("pkg/shapes.py", 8).await;
    assert!(!result.success);
    assert_eq!(result.stage, SplitStage::Plan);
    assert!(matches!(result.failure, Some(RefactorFailure::PlanInfeasible(_))));
    assert_eq!(project.listing(), before);
}

#[tokio::test]
async fn files_within_the_limit_are_not_split() {
    let project = shapes_project().await;
    let result = project.engine().split_file("pkg/shapes.py", 500).await;
    assert!(!result.success);
    assert_eq!(result.stage, SplitStage::Analyze);
    assert!(matches!(result.failure, Some(RefactorFailure::NotNeeded { line_count: 32, .. })));
}

#[tokio::test]
async fn stale_plans_are_recomputed() {
    let project = shapes_project().await;
    let scan = Scanner::default().scan_source("pkg/shapes.py", SHAPES).unwrap();
    let files: BTreeSet<String> = project.graph.file_paths().into_iter().collect();
    let plan = project
        .graph
        .with_arena(|graph| Analyzer::new().plan_split(graph, &scan, SHAPES, 22, &files))
        .unwrap();
    let SplitDecision::Split(plan) = plan else {
        panic!("expected a split plan");
    };

    let edited = SHAPES.replace("def grow(square):", "def grow(square):\n    \"\"\"Double the side.\"\"\"");
    tokio::fs::write(project.root().join("pkg/shapes.py"), &edited).await.unwrap();
    let result = project.engine().apply(&plan).await;
    assert!(result.success, "split failed: {:?}", result.reason);
    let square = project.read("pkg/shapes_square.py").await.unwrap();
    assert!(square.contains("Double the side."));
}

#[tokio::test]
async fn cancellation_stops_before_the_next_stage() {
    let project = shapes_project().await;
    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = project
        .engine()
        .with_cancel_flag(cancel)
        .split_file("pkg/shapes.py", 22)
        .await;
    assert!(!result.success);
    assert!(matches!(
        result.failure,
        Some(RefactorFailure::Cancelled { stage: SplitStage::Plan })
    ));
    assert_eq!(project.read("pkg/shapes.py").await.unwrap(), SHAPES);
}

#[tokio::test]
async fn other_languages_fail_at_extract() {
    let source: String = (0..30).map(|i| format!("pub fn f{i}() {{}}\n")).collect();
    let project = Project::new(&[("src/lib.rs", source.as_str())]).await;
    let result = project.engine().split_file("src/lib.rs", 10).await;
    assert!(!result.success);
    assert_eq!(result.stage, SplitStage::Extract);
    assert!(matches!(result.failure, Some(RefactorFailure::Unsupported { .. })));
    assert_eq!(project.read("src/lib.rs").await.unwrap(), source);
}
