use crate::config::ScannerConfig;
use crate::error::{Result, ScannerError};
use crate::extract::{self, find_syntax_error, ScanBuilder};
use crate::language::Language;
use crate::types::{content_hash, FileScan};
use std::path::Path;
use tree_sitter::{Parser, Tree};

/// Structural extractor: source text in, [`FileScan`] out.
///
/// A scanner is cheap to clone and holds no parser state; a fresh
/// tree-sitter parser is created per call so scans can run on any thread.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Whether `path` has a language this scanner is configured to extract
    pub fn accepts(&self, path: impl AsRef<Path>) -> bool {
        self.config
            .is_language_enabled(Language::from_path(path.as_ref()))
    }

    /// Parse `content` and extract entities, imports and reference candidates.
    ///
    /// `path` is the project-relative path used for entity ids. Content that
    /// does not parse cleanly yields [`ScannerError::Parse`].
    pub fn scan_source(&self, path: &str, content: &str) -> Result<FileScan> {
        let language = self.language_for(path)?;
        let tree = self.parse(path, language, content)?;

        let mut builder = ScanBuilder::new(path, language, &self.config, content);
        extract::extract(&mut builder, tree.root_node());
        let scan = builder.finish(content_hash(content.as_bytes()), line_count(content));

        log::debug!(
            "Scanned {}: {} entities, {} imports, {} references",
            path,
            scan.entities.len(),
            scan.imports.len(),
            scan.references.len()
        );
        Ok(scan)
    }

    /// Syntax check only
    pub fn check_syntax(&self, path: &str, content: &str) -> Result<()> {
        let language = self.language_for(path)?;
        self.parse(path, language, content).map(|_| ())
    }

    fn language_for(&self, path: &str) -> Result<Language> {
        let language = Language::from_path(path);
        if !self.config.is_language_enabled(language) {
            return Err(ScannerError::unsupported_language(path, language.as_str()));
        }
        Ok(language)
    }

    fn parse(&self, path: &str, language: Language, content: &str) -> Result<Tree> {
        let ts_language = language.tree_sitter_language(Path::new(path))?;
        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| ScannerError::tree_sitter(format!("Failed to set language: {e}")))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ScannerError::parse(path, 1, "parser produced no tree"))?;
        if let Some((line, reason)) = find_syntax_error(tree.root_node()) {
            return Err(ScannerError::parse(path, line, reason));
        }
        Ok(tree)
    }
}

/// Number of lines as an editor shows them
pub fn line_count(content: &str) -> usize {
    content.lines().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        EntityKind, ModuleItemKind, Receiver, ReferenceKind, StateMutability, Visibility,
    };
    use pretty_assertions::assert_eq;

    const GEOMETRY: &str = r#""""Geometry helpers."""
from __future__ import annotations

import math
from .util import clamp as clip

REGISTRY = {}
SCALE = 2.0
_counter = 0


# Area of a circle.
def area(radius):
    return math.pi * radius ** 2 * SCALE


def bump():
    global _counter
    _counter += 1
    return _counter


class Shape:
    """Base shape."""

    def describe(self):
        return self.name() + str(area(1))

    def name(self):
        if REGISTRY:
            return "shape"
        return "unknown"
"#;

    fn scan(path: &str, source: &str) -> FileScan {
        Scanner::default()
            .scan_source(path, source)
            .expect("scan should succeed")
    }

    #[test]
    fn extracts_python_entities_in_declaration_order() {
        let scan = scan("pkg/geometry.py", GEOMETRY);
        let names: Vec<&str> = scan
            .entities
            .iter()
            .map(|e| e.qualified_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "REGISTRY",
                "SCALE",
                "_counter",
                "area",
                "bump",
                "Shape",
                "Shape.describe",
                "Shape.name"
            ]
        );
        assert_eq!(scan.line_count, 32);

        let area = scan.top_level_by_name("area").expect("area");
        assert_eq!(area.kind, EntityKind::Function);
        assert_eq!(area.docstring.as_deref(), Some("Area of a circle."));
        assert_eq!(area.span.start, 13);
        assert_eq!(area.item_span.start, 12);
        assert_eq!(area.signature, "def area(radius)");

        let shape = scan.top_level_by_name("Shape").expect("Shape");
        assert_eq!(shape.docstring.as_deref(), Some("Base shape."));
        let name_method = scan
            .entities
            .iter()
            .find(|e| e.qualified_name == "Shape.name")
            .expect("method");
        assert_eq!(name_method.kind, EntityKind::Method);
        assert_eq!(name_method.parent.as_ref(), Some(&shape.id));
        assert_eq!(name_method.complexity, 2);
    }

    #[test]
    fn classifies_module_state() {
        let scan = scan("pkg/geometry.py", GEOMETRY);
        let mutability = |name: &str| scan.top_level_by_name(name).and_then(|e| e.mutability);
        assert_eq!(mutability("REGISTRY"), Some(StateMutability::Mutable));
        assert_eq!(mutability("SCALE"), Some(StateMutability::Constant));
        assert_eq!(mutability("_counter"), Some(StateMutability::Rebound));
        assert_eq!(
            scan.top_level_by_name("_counter").map(|e| e.visibility),
            Some(Visibility::Private)
        );
        assert_eq!(
            scan.public_names(),
            vec!["REGISTRY", "SCALE", "area", "bump", "Shape"]
        );
    }

    #[test]
    fn extracts_python_imports_and_items() {
        let scan = scan("pkg/geometry.py", GEOMETRY);
        let rendered: Vec<String> = scan.imports.iter().map(|i| i.render_python()).collect();
        assert_eq!(
            rendered,
            vec![
                "from __future__ import annotations",
                "import math",
                "from .util import clamp as clip"
            ]
        );
        assert!(scan.imports[0].is_future());

        let kinds: Vec<&ModuleItemKind> = scan.items.iter().map(|item| &item.kind).collect();
        assert_eq!(kinds.len(), 10);
        assert_eq!(kinds[0], &ModuleItemKind::Docstring);
        assert_eq!(kinds[1], &ModuleItemKind::FutureImport);
        assert_eq!(kinds[3], &ModuleItemKind::Import);
        assert!(scan.items[3].binds.contains("clip"));

        let area_item = scan
            .items
            .iter()
            .find(|item| item.binds.contains("area"))
            .expect("area item");
        assert!(area_item.uses.contains("math"));
        assert!(area_item.uses.contains("SCALE"));
        assert!(!area_item.uses.contains("pi"));
    }

    #[test]
    fn records_reference_candidates() {
        let scan = scan("pkg/geometry.py", GEOMETRY);
        let describe = scan
            .entities
            .iter()
            .find(|e| e.qualified_name == "Shape.describe")
            .expect("describe");
        let refs: Vec<(&str, &Receiver, ReferenceKind)> = scan
            .references
            .iter()
            .filter(|r| r.owner == describe.id)
            .map(|r| (r.name.as_str(), &r.receiver, r.kind))
            .collect();
        assert!(refs.contains(&("name", &Receiver::SelfRef, ReferenceKind::Call)));
        assert!(refs.contains(&("area", &Receiver::Bare, ReferenceKind::Call)));

        let area = scan.top_level_by_name("area").expect("area");
        assert!(scan.references.iter().any(|r| r.owner == area.id
            && r.name == "SCALE"
            && r.kind == ReferenceKind::Use));
    }

    #[test]
    fn scanning_is_idempotent() {
        let first = scan("pkg/geometry.py", GEOMETRY);
        let second = scan("pkg/geometry.py", GEOMETRY);
        assert_eq!(first, second);
    }

    #[test]
    fn respects_dunder_all() {
        let source = "__all__ = [\"visible\"]\n\n\ndef visible():\n    pass\n\n\ndef hidden():\n    pass\n";
        let scan = scan("mod.py", source);
        assert_eq!(scan.exports, Some(vec!["visible".to_string()]));
        assert_eq!(
            scan.top_level_by_name("hidden").map(|e| e.visibility),
            Some(Visibility::Private)
        );
        assert_eq!(scan.public_names(), vec!["visible"]);
    }

    #[test]
    fn script_header_stays_out_of_item_spans() {
        let source = "#!/usr/bin/env python3\n# -*- coding: utf-8 -*-\ndef main():\n    pass\n";
        assert_eq!(crate::python_header_lines(source), 2);
        let scan = scan("tool.py", source);
        let main = scan.top_level_by_name("main").expect("main");
        assert_eq!(main.item_span.start, 3);

        assert_eq!(crate::python_header_lines("#!/bin/sh\nimport os\n"), 1);
        assert_eq!(crate::python_header_lines("# notes\n# vim: set fileencoding=latin-1 :\n"), 2);
        assert_eq!(crate::python_header_lines("# plain comment\ndef f():\n    pass\n"), 0);
    }

    #[test]
    fn flags_dynamic_imports() {
        let source = "import importlib\n\n\ndef load(name):\n    return importlib.import_module(name)\n";
        let scan = scan("plugins.py", source);
        let dynamic: Vec<_> = scan.imports.iter().filter(|i| i.dynamic).collect();
        assert_eq!(dynamic.len(), 1);
        assert_eq!(dynamic[0].module, "name");
        assert!(!dynamic[0].top_level);
    }

    #[test]
    fn parse_error_names_the_line() {
        let err = Scanner::default()
            .scan_source("broken.py", "def ok():\n    pass\n\ndef broken(:\n    pass\n")
            .expect_err("should fail");
        assert!(err.is_parse());
        match err {
            ScannerError::Parse { path, .. } => assert_eq!(path, Path::new("broken.py")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_unsupported_files() {
        let err = Scanner::default()
            .scan_source("notes.txt", "hello")
            .expect_err("unsupported");
        assert!(matches!(err, ScannerError::UnsupportedLanguage { .. }));
        let python_only = Scanner::new(ScannerConfig::python_only());
        assert!(!python_only.accepts("lib.rs"));
    }

    #[test]
    fn extracts_rust_items() {
        let source = r#"use std::collections::HashMap;
use crate::graph::{Node, edge::Edge as E};

/// Adds numbers.
pub fn add(a: i32, b: i32) -> i32 {
    helper(a) + b
}

fn helper(x: i32) -> i32 {
    if x > 0 { x } else { -x }
}

pub struct Counter {
    value: u32,
}

impl Counter {
    pub fn bump(&mut self) {
        self.value += 1;
    }
}

static mut TOTAL: u32 = 0;
"#;
        let scan = scan("src/math.rs", source);
        let add = scan.top_level_by_name("add").expect("add");
        assert_eq!(add.visibility, Visibility::Public);
        assert_eq!(add.docstring.as_deref(), Some("Adds numbers."));
        let helper = scan.top_level_by_name("helper").expect("helper");
        assert_eq!(helper.visibility, Visibility::Private);
        assert_eq!(helper.complexity, 2);

        let counter = scan.top_level_by_name("Counter").expect("Counter");
        let bump = scan
            .entities
            .iter()
            .find(|e| e.qualified_name == "Counter::bump")
            .expect("bump");
        assert_eq!(bump.parent.as_ref(), Some(&counter.id));
        assert_eq!(
            scan.top_level_by_name("TOTAL").and_then(|e| e.mutability),
            Some(StateMutability::Rebound)
        );

        let imports: Vec<(&str, Option<&str>, Option<&str>)> = scan
            .imports
            .iter()
            .map(|i| (i.module.as_str(), i.name.as_deref(), i.alias.as_deref()))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("std::collections", Some("HashMap"), None),
                ("crate::graph", Some("Node"), None),
                ("crate::graph::edge", Some("Edge"), Some("E")),
            ]
        );
        assert!(scan
            .references
            .iter()
            .any(|r| r.owner == add.id && r.name == "helper" && r.kind == ReferenceKind::Call));
    }

    #[test]
    fn extracts_typescript_items() {
        let source = r#"import { readFile } from "fs";
import * as path from "path";

export function load(name: string): string {
  return readFile(path.join("a", name));
}

export class Store {
  get(key: string) {
    return this.load(key);
  }
  load(key: string) {
    return key;
  }
}

const cache = {};
let hits = 0;
"#;
        let scan = scan("src/store.ts", source);
        let load = scan.top_level_by_name("load").expect("load");
        assert_eq!(load.visibility, Visibility::Public);
        assert_eq!(
            scan.top_level_by_name("cache").and_then(|e| e.mutability),
            Some(StateMutability::Mutable)
        );
        assert_eq!(
            scan.top_level_by_name("hits").and_then(|e| e.mutability),
            Some(StateMutability::Rebound)
        );
        let get = scan
            .entities
            .iter()
            .find(|e| e.qualified_name == "Store.get")
            .expect("get");
        assert!(scan
            .references
            .iter()
            .any(|r| r.owner == get.id && r.name == "load" && r.receiver == Receiver::SelfRef));

        let bound: Vec<String> = scan.imports.iter().filter_map(|i| i.bound_name()).collect();
        assert_eq!(bound, vec!["readFile", "path"]);
    }
}
