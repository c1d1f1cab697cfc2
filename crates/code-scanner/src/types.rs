use crate::language::Language;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt::{self, Write as _};

/// Stable identity of an entity: hash of file path + qualified name.
///
/// The id survives re-scans as long as the file path and the qualified name
/// are unchanged, which is what makes graph upserts idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(path: &str, qualified_name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(qualified_name.as_bytes());
        let digest = hasher.finalize();
        Self(to_hex(&digest[..16]))
    }

    /// Wrap an already computed id (used when loading persisted graphs)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 hex digest of arbitrary content
pub fn content_hash(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Class,
    Function,
    Method,
    /// Synthetic node for a module-level binding (global state)
    State,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
            EntityKind::State => "state",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// How a module-level binding behaves after import time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    /// Immutable literal value
    Constant,
    /// Container or object that may be mutated in place
    Mutable,
    /// Name is re-bound after definition (`global`, re-assignment, `let`/`var`)
    Rebound,
}

/// Inclusive, 1-based line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end + 1 - self.start
    }

    #[must_use]
    pub const fn contains(&self, line: usize) -> bool {
        line >= self.start && line <= self.end
    }
}

/// A class, function, method or module-level state binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub qualified_name: String,
    pub kind: EntityKind,
    /// Owning class for methods
    pub parent: Option<EntityId>,
    /// Lines of the definition itself
    pub span: LineSpan,
    /// Lines including decorators and attached leading comments
    pub item_span: LineSpan,
    pub complexity: u32,
    pub docstring: Option<String>,
    pub signature: String,
    pub visibility: Visibility,
    pub mutability: Option<StateMutability>,
    pub content_hash: String,
    /// Declaration order within the file
    pub order: usize,
}

impl Entity {
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none() && self.kind != EntityKind::Method
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// One name bound by an import statement.
///
/// `import a.b as c` yields `{module: "a.b", name: None, alias: Some("c")}`;
/// `from ..pkg import x` yields `{module: "pkg", level: 2, name: Some("x")}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImportRecord {
    pub module: String,
    pub level: usize,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub wildcard: bool,
    /// Target computed at runtime and not known statically
    pub dynamic: bool,
    pub top_level: bool,
    pub line: usize,
}

impl ImportRecord {
    /// Name this import introduces into the module namespace
    pub fn bound_name(&self) -> Option<String> {
        if self.wildcard || self.dynamic {
            return None;
        }
        if let Some(alias) = &self.alias {
            return Some(alias.clone());
        }
        match &self.name {
            Some(name) => Some(name.clone()),
            None => self
                .module
                .split(['.', ':'])
                .find(|segment| !segment.is_empty())
                .map(str::to_string),
        }
    }

    pub fn is_future(&self) -> bool {
        self.level == 0 && self.module == "__future__"
    }

    /// Module text with relative dots restored (`..pkg`)
    pub fn module_specifier(&self) -> String {
        format!("{}{}", ".".repeat(self.level), self.module)
    }

    /// Render as a standalone single-binding Python import line
    pub fn render_python(&self) -> String {
        let module = self.module_specifier();
        if self.wildcard {
            return format!("from {module} import *");
        }
        match (&self.name, &self.alias) {
            (Some(name), Some(alias)) => format!("from {module} import {name} as {alias}"),
            (Some(name), None) => format!("from {module} import {name}"),
            (None, Some(alias)) => format!("import {module} as {alias}"),
            (None, None) => format!("import {module}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "object")]
pub enum Receiver {
    /// Plain name lookup
    Bare,
    /// `self.x` / `this.x`
    SelfRef,
    /// `obj.x` where `obj` is not the receiver itself
    Attribute(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Call,
    Use,
}

/// Unresolved reference from an entity body; resolved later by the graph linker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceCandidate {
    pub owner: EntityId,
    pub name: String,
    pub receiver: Receiver,
    pub kind: ReferenceKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "entity")]
pub enum ModuleItemKind {
    Docstring,
    FutureImport,
    Import,
    Entity(EntityId),
    Other,
}

/// A top-level statement of the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleItem {
    pub kind: ModuleItemKind,
    pub span: LineSpan,
    /// Identifiers read anywhere inside the statement
    pub uses: BTreeSet<String>,
    /// Names the statement binds at module scope
    pub binds: BTreeSet<String>,
}

/// Everything the scanner extracts from one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileScan {
    pub path: String,
    pub language: Language,
    pub content_hash: String,
    pub line_count: usize,
    pub entities: Vec<Entity>,
    pub imports: Vec<ImportRecord>,
    pub references: Vec<ReferenceCandidate>,
    pub items: Vec<ModuleItem>,
    /// Explicit export list (`__all__`) when declared
    pub exports: Option<Vec<String>>,
}

impl FileScan {
    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| &entity.id == id)
    }

    pub fn top_level_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|entity| entity.is_top_level())
    }

    pub fn top_level_by_name(&self, name: &str) -> Option<&Entity> {
        self.top_level_entities().find(|entity| entity.name == name)
    }

    /// Names the file exposes to importers
    pub fn public_names(&self) -> Vec<String> {
        if let Some(exports) = &self.exports {
            return exports.clone();
        }
        self.top_level_entities()
            .filter(|entity| entity.is_public())
            .map(|entity| entity.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_stable_and_path_scoped() {
        let a = EntityId::new("pkg/geometry.py", "Vector.norm");
        let b = EntityId::new("pkg/geometry.py", "Vector.norm");
        let c = EntityId::new("pkg/other.py", "Vector.norm");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn import_rendering() {
        let record = ImportRecord {
            module: "util".to_string(),
            level: 1,
            name: Some("clamp".to_string()),
            alias: Some("clip".to_string()),
            wildcard: false,
            dynamic: false,
            top_level: true,
            line: 3,
        };
        assert_eq!(record.render_python(), "from .util import clamp as clip");
        assert_eq!(record.bound_name().as_deref(), Some("clip"));

        let plain = ImportRecord {
            module: "os.path".to_string(),
            level: 0,
            name: None,
            alias: None,
            wildcard: false,
            dynamic: false,
            top_level: true,
            line: 1,
        };
        assert_eq!(plain.render_python(), "import os.path");
        assert_eq!(plain.bound_name().as_deref(), Some("os"));
    }

    #[test]
    fn span_line_count() {
        let span = LineSpan::new(10, 12);
        assert_eq!(span.line_count(), 3);
        assert!(span.contains(11));
        assert!(!span.contains(13));
    }
}
