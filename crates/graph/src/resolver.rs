use context_code_scanner::{ImportRecord, Language};
use std::collections::BTreeSet;

/// Where an import points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Project file path
    Internal(String),
    External,
    Unresolved,
}

/// Maps import records to project files.
///
/// Paths are project-relative with `/` separators.
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    files: BTreeSet<String>,
}

impl ModuleResolver {
    pub fn new(files: impl IntoIterator<Item = String>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    pub fn resolve(&self, importer: &str, language: Language, record: &ImportRecord) -> Resolved {
        if record.dynamic {
            return Resolved::Unresolved;
        }
        match language {
            Language::Python => self.resolve_python(importer, record),
            Language::JavaScript | Language::TypeScript => self.resolve_script(importer, language, &record.module),
            Language::Rust => self.resolve_rust(importer, record),
            Language::Unknown => Resolved::External,
        }
    }

    /// Project file for `name` imported as a submodule of the record's module
    /// (`from pkg import mod`, `use crate::a::{b}` with `b.rs`).
    pub fn submodule(&self, importer: &str, language: Language, record: &ImportRecord) -> Option<String> {
        let name = record.name.as_deref()?;
        match language {
            Language::Python => {
                let base = self.python_base(importer, record)?;
                self.python_module(&join(&base, name))
            }
            Language::Rust => {
                let (_, dir) = self.rust_module(importer, &record.module)?;
                rust_child(self, &dir, name).map(|(file, _)| file)
            }
            _ => None,
        }
    }

    fn resolve_python(&self, importer: &str, record: &ImportRecord) -> Resolved {
        if record.is_future() {
            return Resolved::External;
        }
        if record.level > 0 {
            let Some(base) = self.python_base(importer, record) else {
                return Resolved::Unresolved;
            };
            return match self.python_module(&base) {
                Some(path) => Resolved::Internal(path),
                None => self
                    .submodule(importer, Language::Python, record)
                    .map_or(Resolved::Unresolved, Resolved::Internal),
            };
        }

        let rel = record.module.replace('.', "/");
        if let Some(path) = self.python_module(&rel) {
            return Resolved::Internal(path);
        }
        if let Some(path) = self.python_module(&join(parent_dir(importer), &rel)) {
            return Resolved::Internal(path);
        }
        let suffix = format!("/{rel}");
        let mut matches = self.files.iter().filter(|path| {
            python_module_path(path).is_some_and(|module| module.ends_with(&suffix))
        });
        match (matches.next(), matches.next()) {
            (Some(path), None) => Resolved::Internal(path.clone()),
            _ => Resolved::External,
        }
    }

    /// Directory-style path of the record's module
    fn python_base(&self, importer: &str, record: &ImportRecord) -> Option<String> {
        let rel = record.module.replace('.', "/");
        if record.level == 0 {
            let sibling = join(parent_dir(importer), &rel);
            if self.python_module(&sibling).is_some() && self.python_module(&rel).is_none() {
                return Some(sibling);
            }
            return Some(rel);
        }
        let mut base = parent_dir(importer).to_string();
        for _ in 1..record.level {
            if base.is_empty() {
                return None;
            }
            base = parent_dir(&base).to_string();
        }
        Some(join(&base, &rel))
    }

    fn python_module(&self, rel: &str) -> Option<String> {
        let candidates = if rel.is_empty() {
            vec!["__init__.py".to_string()]
        } else {
            vec![format!("{rel}.py"), format!("{rel}/__init__.py")]
        };
        candidates.into_iter().find(|path| self.files.contains(path))
    }

    fn resolve_script(&self, importer: &str, language: Language, specifier: &str) -> Resolved {
        if !specifier.starts_with('.') {
            return Resolved::External;
        }
        let Some(base) = normalize(&join(parent_dir(importer), specifier)) else {
            return Resolved::Unresolved;
        };
        if self.files.contains(&base) {
            return Resolved::Internal(base);
        }
        for ext in language.module_extensions() {
            for candidate in [format!("{base}.{ext}"), format!("{base}/index.{ext}")] {
                if self.files.contains(&candidate) {
                    return Resolved::Internal(candidate);
                }
            }
        }
        Resolved::Unresolved
    }

    fn resolve_rust(&self, importer: &str, record: &ImportRecord) -> Resolved {
        let first = record.module.split("::").next().unwrap_or_default();
        if !matches!(first, "crate" | "self" | "super") {
            return Resolved::External;
        }
        if let Some(file) = self.submodule(importer, Language::Rust, record) {
            return Resolved::Internal(file);
        }
        match self.rust_module(importer, &record.module) {
            Some((file, _)) => Resolved::Internal(file),
            None => Resolved::Unresolved,
        }
    }

    /// (module file, module directory) for a `crate::`/`self::`/`super::` path.
    ///
    /// Trailing segments that do not map to files are inline modules or
    /// items; the deepest file-backed module is returned.
    fn rust_module(&self, importer: &str, path: &str) -> Option<(String, String)> {
        let mut segments = path.split("::").filter(|s| !s.is_empty()).peekable();
        let (mut file, mut dir) = match segments.next()? {
            "crate" => {
                let root = crate_root_dir(importer);
                let file = ["lib.rs", "main.rs"]
                    .iter()
                    .map(|name| join(&root, name))
                    .find(|candidate| self.files.contains(candidate))?;
                (file, root)
            }
            "self" => (importer.to_string(), rust_module_dir(importer)),
            "super" => self.rust_parent(importer)?,
            _ => return None,
        };
        while segments.peek() == Some(&"super") {
            segments.next();
            let (parent_file, parent_dir_path) = self.rust_parent(&file)?;
            file = parent_file;
            dir = parent_dir_path;
        }
        for segment in segments {
            match rust_child(self, &dir, segment) {
                Some((child_file, child_dir)) => {
                    file = child_file;
                    dir = child_dir;
                }
                None => break,
            }
        }
        Some((file, dir))
    }

    fn rust_parent(&self, module_file: &str) -> Option<(String, String)> {
        let dir = rust_module_dir(module_file);
        let parent = parent_dir(&dir).to_string();
        if dir == crate_root_dir(module_file) {
            return None;
        }
        if parent == crate_root_dir(module_file) {
            let file = ["lib.rs", "main.rs"]
                .iter()
                .map(|name| join(&parent, name))
                .find(|candidate| self.files.contains(candidate))?;
            return Some((file, parent));
        }
        let file = [format!("{parent}.rs"), join(&parent, "mod.rs")]
            .into_iter()
            .find(|candidate| self.files.contains(candidate))?;
        Some((file, parent))
    }
}

fn rust_child(resolver: &ModuleResolver, dir: &str, name: &str) -> Option<(String, String)> {
    let child_dir = join(dir, name);
    [format!("{child_dir}.rs"), join(&child_dir, "mod.rs")]
        .into_iter()
        .find(|candidate| resolver.files.contains(candidate))
        .map(|file| (file, child_dir))
}

/// Directory whose `.rs` files are children of the module defined by `file`
fn rust_module_dir(file: &str) -> String {
    let dir = parent_dir(file);
    let name = file.rsplit('/').next().unwrap_or(file);
    match name {
        "mod.rs" | "lib.rs" | "main.rs" => dir.to_string(),
        _ => join(dir, name.trim_end_matches(".rs")),
    }
}

/// `.../src` for files under a `src` directory, otherwise the file's directory
fn crate_root_dir(file: &str) -> String {
    let segments: Vec<&str> = file.split('/').collect();
    match segments.iter().rposition(|segment| *segment == "src") {
        Some(pos) if pos + 1 < segments.len() => segments[..=pos].join("/"),
        _ => parent_dir(file).to_string(),
    }
}

/// Dotted-path form of a Python file (`pkg/mod.py` → `pkg/mod`, `pkg/__init__.py` → `pkg`)
fn python_module_path(path: &str) -> Option<String> {
    let stem = path.strip_suffix(".py")?;
    let module = stem.strip_suffix("/__init__").unwrap_or(stem);
    Some(format!("/{module}"))
}

pub(crate) fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

pub(crate) fn join(dir: &str, rest: &str) -> String {
    match (dir.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => dir.to_string(),
        (false, false) => format!("{dir}/{rest}"),
    }
}

/// Collapse `.` and `..` segments; `None` when the path escapes the root
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(module: &str, level: usize, name: Option<&str>) -> ImportRecord {
        ImportRecord {
            module: module.to_string(),
            level,
            name: name.map(str::to_string),
            alias: None,
            wildcard: false,
            dynamic: false,
            top_level: true,
            line: 1,
        }
    }

    fn resolver(files: &[&str]) -> ModuleResolver {
        ModuleResolver::new(files.iter().map(|f| f.to_string()))
    }

    #[test]
    fn python_relative_and_absolute() {
        let r = resolver(&["pkg/__init__.py", "pkg/util.py", "pkg/sub/deep.py", "app.py"]);
        let py = Language::Python;
        assert_eq!(
            r.resolve("pkg/sub/deep.py", py, &record("util", 2, Some("x"))),
            Resolved::Internal("pkg/util.py".to_string())
        );
        assert_eq!(
            r.resolve("app.py", py, &record("pkg.util", 0, Some("x"))),
            Resolved::Internal("pkg/util.py".to_string())
        );
        assert_eq!(
            r.resolve("app.py", py, &record("pkg", 0, None)),
            Resolved::Internal("pkg/__init__.py".to_string())
        );
        assert_eq!(
            r.resolve("pkg/util.py", py, &record("missing", 1, Some("x"))),
            Resolved::Unresolved
        );
        assert_eq!(r.resolve("app.py", py, &record("os.path", 0, None)), Resolved::External);
        assert_eq!(
            r.resolve("pkg/util.py", py, &record("", 1, Some("util"))),
            Resolved::Internal("pkg/__init__.py".to_string())
        );
        assert_eq!(
            r.submodule("pkg/__init__.py", py, &record("", 1, Some("util"))),
            Some("pkg/util.py".to_string())
        );
    }

    #[test]
    fn python_sibling_scripts() {
        let r = resolver(&["tools/report.py", "tools/report_tables.py"]);
        assert_eq!(
            r.resolve("tools/report.py", Language::Python, &record("report_tables", 0, Some("t"))),
            Resolved::Internal("tools/report_tables.py".to_string())
        );
    }

    #[test]
    fn dynamic_imports_are_unresolved() {
        let r = resolver(&["a.py"]);
        let mut dynamic = record("name", 0, None);
        dynamic.dynamic = true;
        assert_eq!(r.resolve("a.py", Language::Python, &dynamic), Resolved::Unresolved);
    }

    #[test]
    fn script_paths_probe_extensions() {
        let r = resolver(&["src/app.ts", "src/lib/index.ts", "src/util.js"]);
        let ts = Language::TypeScript;
        assert_eq!(
            r.resolve("src/app.ts", ts, &record("./lib", 0, None)),
            Resolved::Internal("src/lib/index.ts".to_string())
        );
        assert_eq!(
            r.resolve("src/lib/index.ts", ts, &record("../util", 0, None)),
            Resolved::Internal("src/util.js".to_string())
        );
        assert_eq!(r.resolve("src/app.ts", ts, &record("react", 0, None)), Resolved::External);
        assert_eq!(
            r.resolve("src/app.ts", ts, &record("./nope", 0, None)),
            Resolved::Unresolved
        );
    }

    #[test]
    fn rust_module_paths() {
        let r = resolver(&["src/lib.rs", "src/graph.rs", "src/graph/edge.rs", "src/util/mod.rs"]);
        let rs = Language::Rust;
        assert_eq!(
            r.resolve("src/lib.rs", rs, &record("crate::graph::edge", 0, Some("Edge"))),
            Resolved::Internal("src/graph/edge.rs".to_string())
        );
        assert_eq!(
            r.resolve("src/graph/edge.rs", rs, &record("super", 0, Some("Graph"))),
            Resolved::Internal("src/graph.rs".to_string())
        );
        assert_eq!(
            r.resolve("src/lib.rs", rs, &record("self", 0, Some("util"))),
            Resolved::Internal("src/util/mod.rs".to_string())
        );
        assert_eq!(
            r.resolve("src/lib.rs", rs, &record("std::collections", 0, Some("HashMap"))),
            Resolved::External
        );
    }
}
