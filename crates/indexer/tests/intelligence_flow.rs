use async_trait::async_trait;
use context_analyzer::SplitDecision;
use context_code_scanner::{EntityId, Scanner};
use context_indexer::{CodeIntelligence, EngineConfig, IndexerError};
use context_refactor::{acquire_split_lock, Assurance, SplitStage, TestHook};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const SETTINGS: &str = r#""""Settings access."""


def load_settings(path):
    """Parse the configuration file and return the settings mapping."""
    with open(path) as handle:
        return dict(line.split("=", 1) for line in handle if "=" in line)


def setting_or_default(settings, key, default=None):
    """Look up one key with a fallback value."""
    return settings.get(key, default)
"#;

const REPORTS: &str = r#""""Report rendering."""
from settings import setting_or_default


def render_table(rows):
    """Render rows as an aligned text table."""
    width = max((len(str(row)) for row in rows), default=0)
    return "\n".join(str(row).ljust(width) for row in rows)


def send_digest(rows, settings):
    """Email the weekly digest to subscribers."""
    recipient = setting_or_default(settings, "digest_to", "team@example.com")
    return recipient, render_table(rows)


class Archive:
    """Compressed storage of old reports."""

    def store(self, name, body):
        return name, len(body)
"#;

const BROKEN: &str = "def broken(:\n    pass\n";

fn write(root: &Path, path: &str, content: &str) {
    let absolute = root.join(path);
    std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
    std::fs::write(absolute, content).unwrap();
}

fn config() -> EngineConfig {
    EngineConfig {
        scan_concurrency: 2,
        ..Default::default()
    }
}

async fn open(root: &Path) -> CodeIntelligence {
    CodeIntelligence::open(root, Some(config())).await.unwrap()
}

/// Twelve independent sections, each a private helper and a public metric
fn sectioned_module() -> String {
    let sections: Vec<String> = (0..12)
        .map(|i| {
            format!(
                "def _scale_{i}(values):\n    \"\"\"Scale values for section {i}.\"\"\"\n    total = sum(values) or 1\n    return [value / total for value in values]\n\n\ndef metric_{i}(values):\n    \"\"\"Summarize section {i}.\"\"\"\n    scaled = _scale_{i}(values)\n    if not scaled:\n        return 0.0\n    return max(scaled) - min(scaled)\n"
            )
        })
        .collect();
    format!("\"\"\"Statistics toolkit.\"\"\"\n\n\n{}", sections.join("\n\n"))
}

struct Verdict(bool);

#[async_trait]
impl TestHook for Verdict {
    async fn run_tests(&self, _root: &Path, _paths: &[PathBuf]) -> std::io::Result<bool> {
        Ok(self.0)
    }
}

#[tokio::test]
async fn rescanning_an_unchanged_tree_is_a_noop() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "settings.py", SETTINGS);
    write(temp.path(), "reports.py", REPORTS);
    let engine = open(temp.path()).await;

    let first = engine.scan(".").await.unwrap();
    assert_eq!(first.files_scanned, 2);
    assert_eq!(first.languages.get("python"), Some(&2));
    assert!(first.failures.is_empty());
    assert_eq!(first.unresolved_imports, 0);
    assert!(first.reference_edges > 0);
    engine.flush_embeddings().await.unwrap();
    let stats = engine.graph().stats();

    let second = engine.scan(".").await.unwrap();
    engine.flush_embeddings().await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.files_unchanged, 2);
    assert_eq!(second.reference_edges, first.reference_edges);
    assert_eq!(second.import_edges, first.import_edges);
    assert_eq!(engine.graph().stats(), stats);
}

#[tokio::test]
async fn edits_and_deletions_tombstone_what_is_gone() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "settings.py", SETTINGS);
    write(temp.path(), "reports.py", REPORTS);
    let engine = open(temp.path()).await;
    engine.scan(".").await.unwrap();

    let trimmed = SETTINGS.split("\n\n\ndef setting_or_default").next().unwrap().to_string() + "\n";
    write(temp.path(), "settings.py", &trimmed);
    std::fs::remove_file(temp.path().join("reports.py")).unwrap();

    let report = engine.scan(".").await.unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.tombstoned_files, vec!["reports.py".to_string()]);
    // setting_or_default plus render_table, send_digest, Archive and Archive.store
    assert_eq!(report.tombstoned_entities, 5);

    let graph = engine.graph();
    assert!(graph.file("reports.py").is_none());
    assert!(graph.entity(&EntityId::new("settings.py", "setting_or_default")).is_none());
    assert!(graph.entity(&EntityId::new("settings.py", "load_settings")).is_some());
    assert!(graph.consistency_check().is_consistent());
}

#[tokio::test]
async fn unparsable_files_are_reported_and_skipped() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "settings.py", SETTINGS);
    write(temp.path(), "broken.py", BROKEN);
    let engine = open(temp.path()).await;

    let report = engine.scan(".").await.unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "broken.py");
    assert!(engine.graph().file("broken.py").is_none());
}

#[tokio::test]
async fn docstring_queries_find_their_entity() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "settings.py", SETTINGS);
    write(temp.path(), "reports.py", REPORTS);
    let engine = open(temp.path()).await;
    engine.scan(".").await.unwrap();
    let pass = engine.flush_embeddings().await.unwrap();
    assert_eq!(pass.failed, 0);
    assert!(pass.indexed >= 6);

    let hits = engine
        .semantic_search("parse the configuration file", 5)
        .await
        .unwrap();
    assert!(hits.len() <= 5);
    assert!(
        hits.iter().any(|hit| hit.qualified_name == "load_settings"),
        "load_settings missing from {hits:?}"
    );
}

#[tokio::test]
async fn saved_graphs_reopen_with_embeddings() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "settings.py", SETTINGS);
    write(temp.path(), "reports.py", REPORTS);
    let engine = open(temp.path()).await;
    engine.scan(".").await.unwrap();
    engine.flush_embeddings().await.unwrap();
    engine.save().await.unwrap();
    let stats = engine.graph().stats();
    engine.shutdown().await;

    let reopened = open(temp.path()).await;
    assert_eq!(reopened.graph().stats(), stats);
    let pass = reopened.flush_embeddings().await.unwrap();
    assert_eq!(pass.embedded, 0);
    assert_eq!(pass.indexed, stats.entities);
    let hits = reopened.semantic_search("weekly digest email", 3).await.unwrap();
    assert_eq!(hits.first().map(|hit| hit.qualified_name.as_str()), Some("send_digest"));

    let report = reopened.scan(".").await.unwrap();
    assert_eq!(report.files_unchanged, 2);
}

#[tokio::test]
async fn config_file_is_read_when_no_config_is_given() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), ".context/config.toml", "max_lines = 123\nexclude = [\"legacy/**\"]\n");
    write(temp.path(), "settings.py", SETTINGS);
    write(temp.path(), "legacy/old.py", SETTINGS);
    let engine = CodeIntelligence::open(temp.path(), None).await.unwrap();
    assert_eq!(engine.config().max_lines, 123);

    let report = engine.scan(".").await.unwrap();
    assert_eq!(report.files_scanned, 1);
    assert!(engine.graph().file("legacy/old.py").is_none());
}

#[tokio::test]
async fn sectioned_module_splits_into_a_thin_aggregator() {
    let temp = TempDir::new().unwrap();
    let source = sectioned_module();
    write(temp.path(), "stats.py", &source);
    write(temp.path(), "main.py", "from stats import metric_3, metric_11\n\n\ndef run(values):\n    return metric_3(values), metric_11(values)\n");
    let engine = open(temp.path()).await;
    engine.scan(".").await.unwrap();

    let decision = engine.plan_split("stats.py", 60).await.unwrap();
    let SplitDecision::Split(plan) = decision else {
        panic!("expected a split plan, got {decision:?}");
    };
    assert!((2..=4).contains(&plan.groups.len()), "{} groups", plan.groups.len());

    let result = engine.apply_split(&plan).await;
    assert!(result.success, "split failed: {:?}", result.reason);
    assert_eq!(result.stage, SplitStage::Commit);
    assert_eq!(result.assurance, Assurance::Reduced);

    let aggregator = std::fs::read_to_string(temp.path().join("stats.py")).unwrap();
    assert!(aggregator.lines().count() < 30, "aggregator:\n{aggregator}");
    let scan = Scanner::default().scan_source("stats.py", &aggregator).unwrap();
    for i in 0..12 {
        let name = format!("metric_{i}");
        assert!(
            scan.imports.iter().any(|import| import.bound_name().as_deref() == Some(name.as_str())),
            "{name} is not re-exported"
        );
    }
    for group in &plan.groups {
        let content = std::fs::read_to_string(temp.path().join(&group.path)).unwrap();
        assert!(content.lines().count() <= 60, "{} is over the limit", group.path);
    }

    let again = engine.plan_split("stats.py", 60).await.unwrap();
    assert!(matches!(again, SplitDecision::NotNeeded { .. }));

    // the committed layout is already in the graph
    let rescan = engine.scan(".").await.unwrap();
    assert!(rescan.is_noop(), "{rescan:?}");
    assert_eq!(rescan.unresolved_imports, 0);
    assert!(engine.impact("stats.py", "metric_3", 3).is_empty());
    let moved = result
        .history_mapping
        .unwrap()
        .destination_of(&EntityId::new("stats.py", "metric_3"))
        .map(str::to_string)
        .unwrap();
    let impacted = engine.impact(&moved, "metric_3", 3);
    assert!(impacted.iter().any(|entity| entity.qualified_name == "run"));
}

#[tokio::test]
async fn oversized_functions_make_plans_infeasible() {
    let temp = TempDir::new().unwrap();
    let body: String = (0..40).map(|i| format!("    x{i} = {i}\n")).collect();
    let source = format!("def huge():\n{body}    return x0\n\n\ndef small():\n    return 1\n");
    write(temp.path(), "huge.py", &source);
    let engine = open(temp.path()).await;
    engine.scan(".").await.unwrap();

    let err = engine.plan_split("huge.py", 20).await.unwrap_err();
    let IndexerError::PlanInfeasible(infeasible) = err else {
        panic!("expected an infeasible plan, got {err:?}");
    };
    assert_eq!(infeasible.entity.as_deref(), Some("huge"));
    assert_eq!(infeasible.max_lines, 20);
    assert_eq!(std::fs::read_to_string(temp.path().join("huge.py")).unwrap(), source);
}

#[tokio::test]
async fn failing_tests_leave_the_project_untouched() {
    let temp = TempDir::new().unwrap();
    let source = sectioned_module();
    write(temp.path(), "stats.py", &source);
    let engine = open(temp.path()).await.with_test_hook(Arc::new(Verdict(false)));
    engine.scan(".").await.unwrap();
    let stats = engine.graph().stats();

    let result = engine.split_file("stats.py", 60).await;
    assert!(!result.success);
    assert!(result.rolled_back);
    assert_eq!(result.stage, SplitStage::Validate);
    assert_eq!(std::fs::read_to_string(temp.path().join("stats.py")).unwrap(), source);
    let listing: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name != ".context")
        .collect();
    assert_eq!(listing, vec!["stats.py".to_string()]);
    assert_eq!(engine.graph().stats().files, stats.files);
}

#[tokio::test]
async fn concurrent_split_of_a_locked_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "stats.py", &sectioned_module());
    let engine = open(temp.path()).await.with_test_hook(Arc::new(Verdict(true)));
    engine.scan(".").await.unwrap();
    let decision = engine.plan_split("stats.py", 60).await.unwrap();
    let plan = decision.plan().unwrap().clone();

    let held = acquire_split_lock(engine.root(), "stats.py").unwrap();
    let result = engine.apply_split(&plan).await;
    assert!(result.is_lock_contention());
    assert_eq!(result.stage, SplitStage::Analyze);
    drop(held);

    let result = engine.apply_split(&plan).await;
    assert!(result.success, "split failed: {:?}", result.reason);
    assert_eq!(result.assurance, Assurance::Full);
}

#[tokio::test]
async fn paths_outside_the_root_are_rejected() {
    let temp = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    write(other.path(), "elsewhere.py", SETTINGS);
    let engine = open(temp.path()).await;
    assert!(matches!(
        engine.scan(other.path()).await,
        Err(IndexerError::InvalidPath(_))
    ));
    assert!(matches!(
        engine.plan_split(&other.path().join("elsewhere.py").to_string_lossy(), 10).await,
        Err(IndexerError::InvalidPath(_))
    ));
}
