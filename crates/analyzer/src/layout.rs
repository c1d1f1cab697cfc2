//! Exact Python layout of extracted modules and of the aggregator.
//!
//! Planning sizes and the files finally written come from the same
//! functions, so a plan's estimates are the line counts of what gets
//! rendered.

use crate::types::{EntityGroup, SplitPlan};
use context_code_scanner::{python_header_lines, FileScan, ImportRecord, LineSpan, ModuleItemKind};
use std::collections::{BTreeSet, HashSet};

/// `(directory, stem)` of a project-relative path: `pkg/big.py` → (`pkg`, `big`)
pub fn split_path(path: &str) -> (&str, &str) {
    let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    (dir, stem)
}

pub fn join_path(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

/// Whether siblings of `path` live in a package (`__init__.py` next to it)
pub fn is_package_member(path: &str, project_files: &BTreeSet<String>) -> bool {
    let (dir, _) = split_path(path);
    project_files.contains(&join_path(dir, "__init__.py"))
}

pub fn sibling_import(module: &str, name: &str, relative: bool) -> String {
    if relative {
        format!("from .{module} import {name}")
    } else {
        format!("from {module} import {name}")
    }
}

/// `ShapeRegistry` → `shape_registry`, `_private_helper` → `private_helper`
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "part".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<stem>_<slug>` made unique against `taken` paths; records the new path
pub fn unique_module_name(dir: &str, stem: &str, name: &str, taken: &mut BTreeSet<String>) -> String {
    let base = format!("{stem}_{}", slug(name));
    let mut candidate = base.clone();
    let mut ordinal = 2;
    while taken.contains(&join_path(dir, &format!("{candidate}.py"))) {
        candidate = format!("{base}_{ordinal}");
        ordinal += 1;
    }
    taken.insert(join_path(dir, &format!("{candidate}.py")));
    candidate
}

fn module_header(original: &str) -> String {
    let (_, stem) = split_path(original);
    format!("\"\"\"Definitions moved out of {stem}.py.\"\"\"")
}

/// `from __future__` lines every extracted module must repeat
pub fn future_imports(scan: &FileScan) -> Vec<String> {
    scan.imports
        .iter()
        .filter(|record| record.top_level && record.is_future())
        .map(ImportRecord::render_python)
        .collect()
}

/// Original import bindings read by code that reads `uses`, in source order.
/// Star imports are always carried since what they bind is unknown.
pub fn original_imports(scan: &FileScan, uses: &BTreeSet<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    scan.imports
        .iter()
        .filter(|record| record.top_level && !record.is_future() && !record.dynamic)
        .filter(|record| {
            record.wildcard
                || record
                    .bound_name()
                    .is_some_and(|name| uses.contains(name.as_str()))
        })
        .map(ImportRecord::render_python)
        .filter(|line| seen.insert(line.clone()))
        .collect()
}

/// `"\r\n"` when the source uses CRLF line endings, `"\n"` otherwise
pub fn line_ending(source: &str) -> &'static str {
    match source.find('\n') {
        Some(index) if source[..index].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Line count of [`render_module`] without rendering it
pub fn module_line_count(future: usize, imports: usize, bodies: impl IntoIterator<Item = usize>) -> usize {
    let header = 1 + future + if imports > 0 { 1 + imports } else { 0 };
    header + bodies.into_iter().map(|lines| 2 + lines).sum::<usize>()
}

/// Header docstring, future imports, one import per line, then the bodies
/// separated by two blank lines, each line ended by `eol`.
pub fn render_module(
    original: &str,
    future: &[String],
    imports: &[String],
    bodies: &[Vec<&str>],
    eol: &str,
) -> String {
    let mut lines: Vec<String> = vec![module_header(original)];
    lines.extend(future.iter().cloned());
    if !imports.is_empty() {
        lines.push(String::new());
        lines.extend(imports.iter().cloned());
    }
    for body in bodies {
        lines.push(String::new());
        lines.push(String::new());
        lines.extend(body.iter().map(|line| line.to_string()));
    }
    let mut out = lines.join(eol);
    out.push_str(eol);
    out
}

/// Source lines of a 1-based inclusive span
pub fn span_lines<'s>(source_lines: &[&'s str], span: LineSpan) -> Vec<&'s str> {
    let start = span.start.saturating_sub(1).min(source_lines.len());
    let end = span.end.min(source_lines.len());
    source_lines[start..end].to_vec()
}

/// Render the extracted module for `group` of `plan`
pub fn render_group(scan: &FileScan, source: &str, group: &EntityGroup) -> Option<String> {
    let source_lines: Vec<&str> = source.lines().collect();
    let mut bodies = Vec::with_capacity(group.entities.len());
    for id in &group.entities {
        let span = entity_item_span(scan, id)?;
        bodies.push(span_lines(&source_lines, span));
    }
    Some(render_module(
        &scan.path,
        &future_imports(scan),
        &group.imports,
        &bodies,
        line_ending(source),
    ))
}

/// Item span (with decorators and comments) of a top-level entity
pub fn entity_item_span(scan: &FileScan, id: &context_code_scanner::EntityId) -> Option<LineSpan> {
    scan.items.iter().find_map(|item| match &item.kind {
        ModuleItemKind::Entity(item_id) if item_id == id => Some(item.span),
        _ => None,
    })
}

/// Line after which re-export imports go: end of the leading
/// docstring/import block, never above a `#!` line or encoding declaration
fn reexport_anchor(scan: &FileScan, source: &str) -> usize {
    let mut anchor = python_header_lines(source);
    for item in &scan.items {
        match item.kind {
            ModuleItemKind::Docstring | ModuleItemKind::FutureImport | ModuleItemKind::Import => {
                anchor = item.span.end;
            }
            _ => break,
        }
    }
    anchor
}

/// Original content with `removed` spans cut out and `reexports` inserted
/// after the leading import block. Blank runs left at a cut are collapsed
/// to two lines; everything else is kept verbatim.
pub fn render_aggregator(scan: &FileScan, source: &str, removed: &[LineSpan], reexports: &[String]) -> String {
    let anchor = reexport_anchor(scan, source);
    let is_removed = |line: usize| removed.iter().any(|span| span.start <= line && line <= span.end);

    let mut out: Vec<&str> = Vec::new();
    let mut after_cut = false;
    if anchor == 0 {
        out.extend(reexports.iter().map(String::as_str));
    }
    for (index, line) in source.lines().enumerate() {
        let number = index + 1;
        if is_removed(number) {
            after_cut = true;
        } else if line.trim().is_empty() && after_cut {
            let trailing_blanks = out.iter().rev().take_while(|l| l.trim().is_empty()).count();
            if !out.is_empty() && trailing_blanks < 2 {
                out.push(line);
            }
        } else {
            after_cut = false;
            out.push(line);
        }
        if number == anchor {
            out.extend(reexports.iter().map(String::as_str));
        }
    }
    while out.last().is_some_and(|line| line.trim().is_empty()) {
        out.pop();
    }
    let eol = line_ending(source);
    let mut rendered = out.join(eol);
    rendered.push_str(eol);
    rendered
}

/// Render the aggregator for `plan`
pub fn render_plan_aggregator(scan: &FileScan, source: &str, plan: &SplitPlan) -> Option<String> {
    let mut removed = Vec::new();
    for group in &plan.groups {
        for id in &group.entities {
            removed.push(entity_item_span(scan, id)?);
        }
    }
    let reexports: Vec<String> = plan
        .aggregator
        .reexports
        .iter()
        .map(|reexport| sibling_import(&reexport.module, &reexport.name, plan.package_relative))
        .collect();
    Some(render_aggregator(scan, source, &removed, &reexports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_scanner::Scanner;
    use pretty_assertions::assert_eq;

    #[test]
    fn slugs_and_unique_names() {
        assert_eq!(slug("ShapeRegistry"), "shape_registry");
        assert_eq!(slug("_private_helper"), "private_helper");
        assert_eq!(slug("parse2D"), "parse2_d");
        assert_eq!(slug("__"), "part");

        let mut taken = BTreeSet::from(["pkg/big_load.py".to_string()]);
        assert_eq!(unique_module_name("pkg", "big", "load", &mut taken), "big_load_2");
        assert_eq!(unique_module_name("pkg", "big", "load", &mut taken), "big_load_3");
        assert!(taken.contains("pkg/big_load_3.py"));
    }

    #[test]
    fn module_rendering_matches_line_count() {
        let future = vec!["from __future__ import annotations".to_string()];
        let imports = vec!["import os".to_string(), "from .big_a import a".to_string()];
        let bodies = vec![vec!["def b():", "    return a()"], vec!["X = 1"]];
        let rendered = render_module("pkg/big.py", &future, &imports, &bodies, "\n");
        assert_eq!(
            rendered,
            "\"\"\"Definitions moved out of big.py.\"\"\"\nfrom __future__ import annotations\n\nimport os\nfrom .big_a import a\n\n\ndef b():\n    return a()\n\n\nX = 1\n"
        );
        assert_eq!(rendered.lines().count(), module_line_count(1, 2, [2, 1]));
        assert_eq!(module_line_count(0, 0, [3]), 1 + 2 + 3);
    }

    #[test]
    fn aggregator_cuts_spans_and_inserts_reexports() {
        let source = "\"\"\"Doc.\"\"\"\nimport os\n\n\ndef keep():\n    return os.sep\n\n\ndef moved():\n    return 1\n\n\nif __name__ == \"__main__\":\n    keep()\n";
        let scan = Scanner::default().scan_source("big.py", source).unwrap();
        let moved = entity_item_span(&scan, &context_code_scanner::EntityId::new("big.py", "moved")).unwrap();
        let rendered = render_aggregator(&scan, source, &[moved], &["from big_moved import moved".to_string()]);
        assert_eq!(
            rendered,
            "\"\"\"Doc.\"\"\"\nimport os\nfrom big_moved import moved\n\n\ndef keep():\n    return os.sep\n\n\nif __name__ == \"__main__\":\n    keep()\n"
        );
    }

    #[test]
    fn reexports_go_below_script_header() {
        let source = "#!/usr/bin/env python3\n# -*- coding: utf-8 -*-\n\n\ndef alpha():\n    return 1\n\n\ndef beta():\n    return 2\n";
        let scan = Scanner::default().scan_source("tool.py", source).unwrap();
        let alpha = entity_item_span(&scan, &context_code_scanner::EntityId::new("tool.py", "alpha")).unwrap();
        let rendered = render_aggregator(&scan, source, &[alpha], &["from tool_alpha import alpha".to_string()]);
        assert_eq!(
            rendered,
            "#!/usr/bin/env python3\n# -*- coding: utf-8 -*-\nfrom tool_alpha import alpha\n\n\ndef beta():\n    return 2\n"
        );
    }

    #[test]
    fn crlf_sources_keep_crlf() {
        let source = "import os\r\n\r\n\r\ndef keep():\r\n    return os.sep\r\n\r\n\r\ndef moved():\r\n    return 1\r\n";
        assert_eq!(line_ending(source), "\r\n");
        assert_eq!(line_ending("a\nb\r\n"), "\n");
        let scan = Scanner::default().scan_source("big.py", source).unwrap();
        let id = context_code_scanner::EntityId::new("big.py", "moved");
        let moved = entity_item_span(&scan, &id).unwrap();
        let rendered = render_aggregator(&scan, source, &[moved], &["from big_moved import moved".to_string()]);
        assert_eq!(
            rendered,
            "import os\r\nfrom big_moved import moved\r\n\r\n\r\ndef keep():\r\n    return os.sep\r\n"
        );

        let group = EntityGroup {
            module: "big_moved".to_string(),
            path: "big_moved.py".to_string(),
            entities: vec![id],
            names: vec!["moved".to_string()],
            imports: Vec::new(),
            cut_set: Vec::new(),
            relocated_state: Vec::new(),
            estimated_lines: 0,
            cohesion: 0.0,
            coupling: 0.0,
        };
        let module = render_group(&scan, source, &group).unwrap();
        assert!(module.ends_with("def moved():\r\n    return 1\r\n"));
        assert!(!module.replace("\r\n", "").contains('\n'));
    }
}
