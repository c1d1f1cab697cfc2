use crate::error::Result;
use crate::graph::GraphArena;
use crate::resolver::{ModuleResolver, Resolved};
use crate::types::{
    EdgeKind, FileNode, ImportResolution, NewEdge, NodeIndex,
};
use context_code_scanner::{
    Entity, EntityId, EntityKind, FileScan, ImportRecord, Language, ModuleItemKind,
    ReferenceCandidate, ReferenceKind, Receiver,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const DEFAULT_REEXPORT_DEPTH: usize = 4;
const MAX_DUCK_CANDIDATES: usize = 4;
const SELF_DISPATCH_CONFIDENCE: f32 = 0.9;
const DUCK_TYPED_CONFIDENCE: f32 = 0.5;
const UNRESOLVED_IMPORT_CONFIDENCE: f32 = 0.5;

/// File node and entities of one scan, ready for [`GraphBuilder::apply`]
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFile {
    pub file: FileNode,
    pub entities: Vec<Entity>,
}

/// Outcome of ingesting one file scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub file: String,
    pub entities: usize,
    pub tombstoned: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnresolvedImport {
    pub file: String,
    pub module: String,
    pub name: Option<String>,
    pub line: usize,
    pub dynamic: bool,
}

/// `from m import name` where `m` is a project file that does not bind `name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissingName {
    pub file: String,
    pub module: String,
    pub target: String,
    pub name: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    pub files: usize,
    pub import_edges: usize,
    pub reference_edges: usize,
    pub unresolved_imports: Vec<UnresolvedImport>,
    pub missing_names: Vec<MissingName>,
}

/// Turns file scans into graph nodes (ingest) and resolves imports and
/// references into edges (link).
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    max_reexport_depth: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            max_reexport_depth: DEFAULT_REEXPORT_DEPTH,
        }
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reexport_depth(mut self, depth: usize) -> Self {
        self.max_reexport_depth = depth;
        self
    }

    /// Upsert a file and its entities, add containment edges and tombstone
    /// entities the file no longer declares.
    pub fn ingest(
        &self,
        arena: &mut GraphArena,
        scan: &FileScan,
        scanned_at_ms: u64,
    ) -> Result<IngestReport> {
        self.apply(arena, self.prepare(scan, scanned_at_ms))
    }

    /// Records for one file scan, built without touching the arena
    pub fn prepare(&self, scan: &FileScan, scanned_at_ms: u64) -> PreparedFile {
        let bound_names = scan
            .items
            .iter()
            .filter(|item| item.kind == ModuleItemKind::Other)
            .flat_map(|item| item.binds.iter().cloned())
            .collect();
        PreparedFile {
            file: FileNode {
                path: scan.path.clone(),
                language: scan.language,
                content_hash: scan.content_hash.clone(),
                line_count: scan.line_count,
                scanned_at_ms,
                imports: scan.imports.clone(),
                references: scan.references.clone(),
                exports: scan.exports.clone(),
                bound_names,
            },
            entities: scan.entities.clone(),
        }
    }

    /// Write prepared records into the arena
    pub fn apply(&self, arena: &mut GraphArena, prepared: PreparedFile) -> Result<IngestReport> {
        let PreparedFile { file, entities } = prepared;
        let path = file.path.clone();
        let file_index = arena.upsert_file(file)?;

        let mut seen = HashSet::new();
        let mut placed = Vec::with_capacity(entities.len());
        for entity in entities {
            seen.insert(entity.id.clone());
            let parent = entity.parent.clone();
            placed.push((parent, arena.upsert_node(&path, entity)?));
        }
        let count = placed.len();
        for (parent, index) in placed {
            let container = parent
                .as_ref()
                .and_then(|parent| arena.entity_index(parent))
                .unwrap_or(file_index);
            arena.upsert_edge(NewEdge {
                from: container,
                to: index,
                kind: EdgeKind::Contains,
                confidence: 1.0,
                origin_file: path.clone(),
            })?;
        }

        let tombstoned = arena.remove_stale(&path, &seen);
        if !tombstoned.is_empty() {
            log::debug!("{path}: tombstoned {} entities", tombstoned.len());
        }
        Ok(IngestReport {
            file: path,
            entities: count,
            tombstoned,
        })
    }

    /// Re-resolve imports and references of every live file.
    ///
    /// All previous import/reference edges are retired first and revived by
    /// upsert when still produced, so linking an unchanged graph is a no-op.
    pub fn link(&self, arena: &mut GraphArena) -> Result<LinkReport> {
        let (planned, report) = Linker::new(arena, self.max_reexport_depth).plan();

        arena.retire_links();
        for edge in planned {
            let to = match edge.target {
                Target::Node(index) => index,
                Target::Module(specifier) => arena.upsert_module(&specifier)?,
            };
            arena.upsert_edge(NewEdge {
                from: edge.from,
                to,
                kind: edge.kind,
                confidence: edge.confidence,
                origin_file: edge.origin_file,
            })?;
        }

        log::info!(
            "Linked {} files: {} import edges, {} reference edges, {} unresolved imports",
            report.files,
            report.import_edges,
            report.reference_edges,
            report.unresolved_imports.len()
        );
        Ok(report)
    }
}

enum Target {
    Node(NodeIndex),
    Module(String),
}

struct PlannedEdge {
    from: NodeIndex,
    target: Target,
    kind: EdgeKind,
    confidence: f32,
    origin_file: String,
}

/// What a module-scope name refers to
#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Entity(NodeIndex),
    /// A project file imported as a module
    Module(String),
    External,
    /// Bound, but not to anything the graph models
    Opaque,
}

struct FileView<'a> {
    index: NodeIndex,
    node: &'a FileNode,
    top_level: HashMap<&'a str, NodeIndex>,
}

struct Linker<'a> {
    arena: &'a GraphArena,
    resolver: ModuleResolver,
    files: BTreeMap<&'a str, FileView<'a>>,
    members: HashMap<NodeIndex, HashMap<&'a str, NodeIndex>>,
    methods_by_name: HashMap<&'a str, Vec<NodeIndex>>,
    max_depth: usize,
}

impl<'a> Linker<'a> {
    fn new(arena: &'a GraphArena, max_depth: usize) -> Self {
        let mut files = BTreeMap::new();
        let mut members: HashMap<NodeIndex, HashMap<&'a str, NodeIndex>> = HashMap::new();
        let mut methods_by_name: HashMap<&'a str, Vec<NodeIndex>> = HashMap::new();

        for (index, node) in arena.live_files() {
            let mut top_level = HashMap::new();
            for (entity_index, entity) in arena.entities_in_file(&node.path) {
                if entity.is_top_level() {
                    top_level.entry(entity.name.as_str()).or_insert(entity_index);
                }
                let Some(parent) = entity.parent.as_ref().and_then(|p| arena.entity_index(p))
                else {
                    continue;
                };
                members
                    .entry(parent)
                    .or_default()
                    .entry(entity.name.as_str())
                    .or_insert(entity_index);
                if entity.kind == EntityKind::Method && !is_dunder(&entity.name) {
                    methods_by_name
                        .entry(entity.name.as_str())
                        .or_default()
                        .push(entity_index);
                }
            }
            files.insert(
                node.path.as_str(),
                FileView {
                    index,
                    node,
                    top_level,
                },
            );
        }

        let resolver = ModuleResolver::new(files.keys().map(|path| path.to_string()));
        Self {
            arena,
            resolver,
            files,
            members,
            methods_by_name,
            max_depth,
        }
    }

    fn plan(&self) -> (Vec<PlannedEdge>, LinkReport) {
        let mut edges = Vec::new();
        let mut report = LinkReport::default();
        for view in self.files.values() {
            report.files += 1;
            self.plan_imports(view, &mut edges, &mut report);
            self.plan_references(view, &mut edges, &mut report);
        }
        report.unresolved_imports.sort();
        report.unresolved_imports.dedup();
        report.missing_names.sort();
        report.missing_names.dedup();
        (edges, report)
    }

    fn plan_imports(&self, view: &FileView<'a>, edges: &mut Vec<PlannedEdge>, report: &mut LinkReport) {
        let path = view.node.path.as_str();
        let language = view.node.language;
        for record in &view.node.imports {
            let specifier = record.module_specifier();
            let resolved = self.resolver.resolve(path, language, record);
            let (target, resolution) = match &resolved {
                Resolved::Internal(target) => match self.files.get(target.as_str()) {
                    Some(target_view) => (Target::Node(target_view.index), ImportResolution::Internal),
                    None => (Target::Module(specifier.clone()), ImportResolution::Unresolved),
                },
                Resolved::External => (Target::Module(specifier.clone()), ImportResolution::External),
                Resolved::Unresolved => (Target::Module(specifier.clone()), ImportResolution::Unresolved),
            };
            if resolution == ImportResolution::Unresolved {
                report.unresolved_imports.push(UnresolvedImport {
                    file: path.to_string(),
                    module: specifier.clone(),
                    name: record.name.clone(),
                    line: record.line,
                    dynamic: record.dynamic,
                });
            }
            if let Resolved::Internal(target) = &resolved {
                if let Some(missing) = self.missing_name(view, record, target) {
                    report.missing_names.push(missing);
                }
            }

            report.import_edges += 1;
            edges.push(PlannedEdge {
                from: view.index,
                target,
                kind: EdgeKind::Import {
                    module: specifier,
                    name: record.name.clone(),
                    resolution,
                },
                confidence: if resolution == ImportResolution::Unresolved {
                    UNRESOLVED_IMPORT_CONFIDENCE
                } else {
                    1.0
                },
                origin_file: path.to_string(),
            });
        }
    }

    fn missing_name(&self, view: &FileView<'a>, record: &ImportRecord, target: &str) -> Option<MissingName> {
        let name = record.name.as_deref()?;
        if record.wildcard || view.node.language != Language::Python {
            return None;
        }
        let path = view.node.path.as_str();
        if self.resolve_name(target, name, 1).is_some()
            || self.resolver.submodule(path, view.node.language, record).is_some()
        {
            return None;
        }
        Some(MissingName {
            file: path.to_string(),
            module: record.module_specifier(),
            target: target.to_string(),
            name: name.to_string(),
            line: record.line,
        })
    }

    fn plan_references(
        &self,
        view: &FileView<'a>,
        edges: &mut Vec<PlannedEdge>,
        report: &mut LinkReport,
    ) {
        let path = view.node.path.as_str();
        for candidate in &view.node.references {
            let Some(owner) = self.arena.entity_index(&candidate.owner) else {
                continue;
            };
            if self.arena.entity_at(owner).is_none() {
                continue;
            }
            let targets = match &candidate.receiver {
                Receiver::Bare => match self.resolve_name(path, &candidate.name, 0) {
                    Some(Binding::Entity(target)) => vec![(target, 1.0)],
                    _ => Vec::new(),
                },
                Receiver::SelfRef => self
                    .enclosing_class(owner)
                    .and_then(|class| self.member(class, &candidate.name))
                    .map(|target| vec![(target, SELF_DISPATCH_CONFIDENCE)])
                    .unwrap_or_default(),
                Receiver::Attribute(object) => self.resolve_attribute(view, object, candidate),
            };
            for (target, confidence) in targets {
                if target == owner {
                    continue;
                }
                report.reference_edges += 1;
                edges.push(PlannedEdge {
                    from: owner,
                    target: Target::Node(target),
                    kind: EdgeKind::Reference {
                        kind: candidate.kind,
                    },
                    confidence,
                    origin_file: path.to_string(),
                });
            }
        }
    }

    /// Binding of a module-scope `name` in `file`, following re-export chains
    fn resolve_name(&self, file: &str, name: &str, depth: usize) -> Option<Binding> {
        if depth > self.max_depth {
            return None;
        }
        let view = self.files.get(file)?;
        if let Some(&index) = view.top_level.get(name) {
            return Some(Binding::Entity(index));
        }
        let top_level_imports = view.node.imports.iter().filter(|record| record.top_level);
        for record in top_level_imports.clone().filter(|record| !record.wildcard) {
            if record.bound_name().as_deref() == Some(name) {
                return Some(self.import_binding(view, record, depth));
            }
        }
        if view.node.bound_names.iter().any(|bound| bound == name) {
            return Some(Binding::Opaque);
        }
        for record in top_level_imports.filter(|record| record.wildcard) {
            match self.resolver.resolve(file, view.node.language, record) {
                Resolved::Internal(target) => {
                    if self.exported(&target, name) {
                        if let Some(binding) = self.resolve_name(&target, name, depth + 1) {
                            return Some(binding);
                        }
                    }
                }
                // a star import from outside the project may bind anything
                Resolved::External | Resolved::Unresolved => return Some(Binding::Opaque),
            }
        }
        None
    }

    fn import_binding(&self, view: &FileView<'a>, record: &ImportRecord, depth: usize) -> Binding {
        let path = view.node.path.as_str();
        let language = view.node.language;
        match self.resolver.resolve(path, language, record) {
            Resolved::Internal(target) => match record.name.as_deref() {
                Some(name) => self
                    .resolve_name(&target, name, depth + 1)
                    .or_else(|| {
                        self.resolver
                            .submodule(path, language, record)
                            .map(Binding::Module)
                    })
                    .unwrap_or(Binding::Opaque),
                None => Binding::Module(target),
            },
            Resolved::External | Resolved::Unresolved => Binding::External,
        }
    }

    /// Whether a star import of `file` brings `name` into scope
    fn exported(&self, file: &str, name: &str) -> bool {
        let Some(view) = self.files.get(file) else {
            return false;
        };
        match &view.node.exports {
            Some(exports) => exports.iter().any(|export| export == name),
            None => view.node.language != Language::Python || !name.starts_with('_'),
        }
    }

    fn resolve_attribute(
        &self,
        view: &FileView<'a>,
        object: &str,
        candidate: &ReferenceCandidate,
    ) -> Vec<(NodeIndex, f32)> {
        if object.is_empty() {
            return self.duck_typed(candidate);
        }
        let path = view.node.path.as_str();
        let whole_module = view
            .node
            .imports
            .iter()
            .filter(|record| record.top_level && record.name.is_none() && !record.wildcard)
            .find(|record| match &record.alias {
                Some(alias) => alias == object,
                None => record.module == object,
            })
            .map(|record| self.import_binding(view, record, 0));
        let head = object
            .split(|c| c == '.' || c == ':')
            .next()
            .unwrap_or(object);
        let binding = whole_module.or_else(|| self.resolve_name(path, head, 0));

        match binding {
            Some(Binding::Module(target)) => match self.resolve_name(&target, &candidate.name, 1) {
                Some(Binding::Entity(entity)) => vec![(entity, 1.0)],
                _ => Vec::new(),
            },
            Some(Binding::Entity(entity)) if head == object => {
                let is_class = self
                    .arena
                    .entity_at(entity)
                    .is_some_and(|node| node.entity.kind == EntityKind::Class);
                if is_class {
                    self.member(entity, &candidate.name)
                        .map(|member| vec![(member, 1.0)])
                        .unwrap_or_default()
                } else {
                    self.duck_typed(candidate)
                }
            }
            Some(Binding::External) => Vec::new(),
            _ => self.duck_typed(candidate),
        }
    }

    /// Low-confidence edges to every method with this name, when few enough
    fn duck_typed(&self, candidate: &ReferenceCandidate) -> Vec<(NodeIndex, f32)> {
        if candidate.kind != ReferenceKind::Call {
            return Vec::new();
        }
        let Some(methods) = self.methods_by_name.get(candidate.name.as_str()) else {
            return Vec::new();
        };
        if methods.is_empty() || methods.len() > MAX_DUCK_CANDIDATES {
            return Vec::new();
        }
        let confidence = DUCK_TYPED_CONFIDENCE / methods.len() as f32;
        methods.iter().map(|&method| (method, confidence)).collect()
    }

    fn enclosing_class(&self, owner: NodeIndex) -> Option<NodeIndex> {
        let entity = &self.arena.entity_at(owner)?.entity;
        match entity.kind {
            EntityKind::Class => Some(owner),
            EntityKind::Method => self.arena.entity_index(entity.parent.as_ref()?),
            _ => None,
        }
    }

    fn member(&self, class: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.members.get(&class)?.get(name).copied()
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}
