mod ecmascript;
mod python;
mod rust;

pub use python::header_line_count as python_header_lines;

use crate::config::ScannerConfig;
use crate::language::Language;
use crate::types::{
    content_hash, Entity, EntityId, EntityKind, FileScan, ImportRecord, LineSpan, ModuleItem,
    Receiver, ReferenceCandidate, ReferenceKind, StateMutability, Visibility,
};
use std::collections::{BTreeMap, HashMap};
use tree_sitter::Node;

/// Dispatch structural extraction for a parsed tree
pub(crate) fn extract(builder: &mut ScanBuilder<'_>, root: Node) {
    match builder.language {
        Language::Python => python::extract(builder, root),
        Language::Rust => rust::extract(builder, root),
        Language::JavaScript | Language::TypeScript => ecmascript::extract(builder, root),
        Language::Unknown => {}
    }
}

/// Everything needed to create an entity record
pub(crate) struct EntityDraft {
    pub name: String,
    pub qualified_name: String,
    pub kind: EntityKind,
    pub parent: Option<EntityId>,
    pub span: LineSpan,
    pub item_span: LineSpan,
    pub complexity: u32,
    pub docstring: Option<String>,
    pub signature: String,
    pub visibility: Visibility,
    pub mutability: Option<StateMutability>,
}

type ReferenceKey = (EntityId, String, Receiver, ReferenceKind);

/// Accumulates extraction output for one file
pub(crate) struct ScanBuilder<'a> {
    pub path: &'a str,
    pub language: Language,
    pub config: &'a ScannerConfig,
    pub source: &'a str,
    pub lines: Vec<&'a str>,
    entities: Vec<Entity>,
    imports: Vec<ImportRecord>,
    references: BTreeMap<ReferenceKey, usize>,
    items: Vec<ModuleItem>,
    exports: Option<Vec<String>>,
    qualified_counts: HashMap<String, usize>,
}

impl<'a> ScanBuilder<'a> {
    pub fn new(
        path: &'a str,
        language: Language,
        config: &'a ScannerConfig,
        source: &'a str,
    ) -> Self {
        Self {
            path,
            language,
            config,
            source,
            lines: source.lines().collect(),
            entities: Vec::new(),
            imports: Vec::new(),
            references: BTreeMap::new(),
            items: Vec::new(),
            exports: None,
            qualified_counts: HashMap::new(),
        }
    }

    pub fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Register an entity; duplicate qualified names get an ordinal suffix
    pub fn push_entity(&mut self, draft: EntityDraft) -> EntityId {
        let count = self
            .qualified_counts
            .entry(draft.qualified_name.clone())
            .or_insert(0);
        *count += 1;
        let qualified_name = if *count == 1 {
            draft.qualified_name
        } else {
            format!("{}~{}", draft.qualified_name, count)
        };

        let id = EntityId::new(self.path, &qualified_name);
        let body = self.span_text(draft.item_span);
        let docstring = draft
            .docstring
            .map(|doc| truncate_chars(&doc, self.config.max_docstring_chars))
            .filter(|doc| !doc.is_empty());

        self.entities.push(Entity {
            id: id.clone(),
            name: draft.name,
            qualified_name,
            kind: draft.kind,
            parent: draft.parent,
            span: draft.span,
            item_span: draft.item_span,
            complexity: draft.complexity,
            docstring,
            signature: truncate_chars(&draft.signature, self.config.max_signature_chars),
            visibility: draft.visibility,
            mutability: draft.mutability,
            content_hash: content_hash(body.as_bytes()),
            order: self.entities.len(),
        });
        id
    }

    pub fn push_import(&mut self, record: ImportRecord) {
        self.imports.push(record);
    }

    pub fn push_reference(
        &mut self,
        owner: &EntityId,
        name: &str,
        receiver: Receiver,
        kind: ReferenceKind,
        line: usize,
    ) {
        if name.is_empty() {
            return;
        }
        let key = (owner.clone(), name.to_string(), receiver, kind);
        let entry = self.references.entry(key).or_insert(line);
        *entry = (*entry).min(line);
    }

    pub fn push_item(&mut self, item: ModuleItem) {
        self.items.push(item);
    }

    pub fn set_exports(&mut self, exports: Vec<String>) {
        self.exports = Some(exports);
    }

    pub fn extend_exports(&mut self, extra: Vec<String>) {
        self.exports.get_or_insert_with(Vec::new).extend(extra);
    }

    pub fn items(&self) -> &[ModuleItem] {
        &self.items
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn imports(&self) -> &[ImportRecord] {
        &self.imports
    }

    pub fn set_mutability(&mut self, id: &EntityId, mutability: StateMutability) {
        if let Some(entity) = self.entities.iter_mut().find(|entity| &entity.id == id) {
            entity.mutability = Some(mutability);
        }
    }

    /// Source text of an inclusive 1-based line span
    pub fn span_text(&self, span: LineSpan) -> String {
        let start = span.start.saturating_sub(1).min(self.lines.len());
        let end = span.end.min(self.lines.len());
        if start >= end {
            return String::new();
        }
        self.lines[start..end].join("\n")
    }

    /// First line of the comment block directly above `start_line` at the same indentation
    pub fn leading_comment_start(&self, start_line: usize, floor: usize) -> usize {
        let prefixes = self.language.comment_prefixes();
        let Some(indent) = self
            .lines
            .get(start_line.saturating_sub(1))
            .map(|line| indentation(line))
        else {
            return start_line;
        };

        let mut first = start_line;
        while first > 1 && first - 1 > floor {
            let candidate = self.lines[first - 2];
            let trimmed = candidate.trim_start();
            let is_comment = prefixes.iter().any(|prefix| trimmed.starts_with(prefix));
            if !is_comment || indentation(candidate) != indent {
                break;
            }
            first -= 1;
        }
        first
    }

    /// Cleaned text of the comment block directly above `start_line`
    pub fn leading_comments(&self, start_line: usize, floor: usize) -> Option<String> {
        let first = self.leading_comment_start(start_line, floor);
        if first == start_line {
            return None;
        }
        let text = self.lines[first - 1..start_line - 1]
            .iter()
            .map(|line| strip_comment_markers(line))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        (!text.is_empty()).then_some(text)
    }

    pub fn finish(self, content_hash: String, line_count: usize) -> FileScan {
        let mut references: Vec<ReferenceCandidate> = self
            .references
            .into_iter()
            .map(|((owner, name, receiver, kind), line)| ReferenceCandidate {
                owner,
                name,
                receiver,
                kind,
                line,
            })
            .collect();
        references.sort_by(|a, b| {
            a.line
                .cmp(&b.line)
                .then_with(|| a.owner.cmp(&b.owner))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.receiver.cmp(&b.receiver))
                .then_with(|| a.kind.cmp(&b.kind))
        });

        let mut entities = self.entities;
        if let Some(exports) = &self.exports {
            for entity in entities.iter_mut().filter(|entity| entity.is_top_level()) {
                entity.visibility = if exports.contains(&entity.name) {
                    Visibility::Public
                } else {
                    Visibility::Private
                };
            }
        }

        let mut imports = self.imports;
        imports.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.cmp(b)));
        imports.dedup();

        FileScan {
            path: self.path.to_string(),
            language: self.language,
            content_hash,
            line_count,
            entities,
            imports,
            references,
            items: self.items,
            exports: self.exports,
        }
    }
}

pub(crate) fn span_of(node: Node) -> LineSpan {
    LineSpan::new(node.start_position().row + 1, node.end_position().row + 1)
}

/// Collapse whitespace runs so signatures compare textually
pub(crate) fn normalize_signature(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Header text of a definition: everything before its body
pub(crate) fn header_text(node: Node, body: Option<Node>, source: &str) -> String {
    let end = body.map_or(node.end_byte(), |body| body.start_byte());
    let raw = source.get(node.start_byte()..end).unwrap_or("");
    normalize_signature(raw.trim_end().trim_end_matches([':', '{']).trim_end())
}

/// Location and description of the first syntax error in a tree
pub(crate) fn find_syntax_error(root: Node) -> Option<(usize, String)> {
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            return Some((
                node.start_position().row + 1,
                format!("unexpected syntax near column {}", node.start_position().column + 1),
            ));
        }
        if node.is_missing() {
            return Some((
                node.start_position().row + 1,
                format!("missing `{}`", node.kind()),
            ));
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let mut children: Vec<_> = node.children(&mut cursor).collect();
            children.reverse();
            stack.extend(children);
        }
    }
    Some((root.start_position().row + 1, "syntax error".to_string()))
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn strip_comment_markers(line: &str) -> String {
    let trimmed = line.trim();
    let stripped = trimmed
        .trim_start_matches("///")
        .trim_start_matches("//!")
        .trim_start_matches("//")
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_start_matches('#')
        .trim_start_matches('*')
        .trim_end_matches("*/");
    stripped.trim().to_string()
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
