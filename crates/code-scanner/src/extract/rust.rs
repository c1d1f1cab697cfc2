use super::{header_text, span_of, EntityDraft, ScanBuilder};
use crate::complexity;
use crate::types::{
    EntityId, EntityKind, ImportRecord, LineSpan, ModuleItem, ModuleItemKind, Receiver,
    ReferenceKind, StateMutability, Visibility,
};
use std::collections::{BTreeSet, HashMap};
use tree_sitter::Node;

pub(super) fn extract(builder: &mut ScanBuilder<'_>, root: Node) {
    let mut cursor = root.walk();
    let children: Vec<Node> = root.named_children(&mut cursor).collect();

    let mut types: HashMap<String, EntityId> = HashMap::new();
    let mut pending_attr_start: Option<usize> = None;
    let mut prev_end = 0usize;

    for node in children {
        let span = span_of(node);
        match node.kind() {
            "line_comment" | "block_comment" => continue,
            "attribute_item" | "inner_attribute_item" => {
                pending_attr_start.get_or_insert(span.start);
                continue;
            }
            _ => {}
        }
        let head = pending_attr_start.take().unwrap_or(span.start);
        let item_start = builder.leading_comment_start(head, prev_end);
        let item_span = LineSpan::new(item_start, span.end);
        let docstring = builder.leading_comments(head, prev_end);

        let mut uses = BTreeSet::new();
        collect_uses(node, builder.source, &mut uses);
        let mut binds = BTreeSet::new();

        let kind = match node.kind() {
            "use_declaration" => {
                if let Some(argument) = node.child_by_field_name("argument") {
                    flatten_use(builder, argument, "", None, span.start);
                }
                binds.extend(
                    builder
                        .imports()
                        .iter()
                        .filter(|record| record.line == span.start)
                        .filter_map(ImportRecord::bound_name),
                );
                ModuleItemKind::Import
            }
            "mod_item" if node.child_by_field_name("body").is_none() => {
                if let Some(name) = node.child_by_field_name("name") {
                    let name = builder.text(name).to_string();
                    binds.insert(name.clone());
                    builder.push_import(ImportRecord {
                        module: "self".to_string(),
                        level: 0,
                        name: Some(name),
                        alias: None,
                        wildcard: false,
                        dynamic: false,
                        top_level: true,
                        line: span.start,
                    });
                }
                ModuleItemKind::Import
            }
            "function_item" => {
                let id =
                    item_entity(builder, node, EntityKind::Function, None, item_span, docstring);
                record_references(builder, &id, node);
                bind_name(builder, node, &mut binds);
                ModuleItemKind::Entity(id)
            }
            "struct_item" | "enum_item" | "union_item" | "trait_item" | "type_item" => {
                let id = item_entity(builder, node, EntityKind::Class, None, item_span, docstring);
                if let Some(name) = node.child_by_field_name("name") {
                    types.insert(builder.text(name).to_string(), id.clone());
                }
                if node.kind() == "trait_item" {
                    let qualified = name_of(builder, node);
                    members(builder, node, &id, &qualified);
                } else {
                    record_references(builder, &id, node);
                }
                bind_name(builder, node, &mut binds);
                ModuleItemKind::Entity(id)
            }
            "const_item" | "static_item" => {
                let mut cursor = node.walk();
                let mutable = node
                    .children(&mut cursor)
                    .any(|child| child.kind() == "mutable_specifier");
                let mutability = if mutable {
                    StateMutability::Rebound
                } else if node.kind() == "static_item" {
                    StateMutability::Mutable
                } else {
                    StateMutability::Constant
                };
                let id = item_entity(builder, node, EntityKind::State, None, item_span, docstring);
                builder.set_mutability(&id, mutability);
                if let Some(value) = node.child_by_field_name("value") {
                    record_references(builder, &id, value);
                }
                bind_name(builder, node, &mut binds);
                ModuleItemKind::Entity(id)
            }
            "impl_item" => {
                let target = node
                    .child_by_field_name("type")
                    .map(|ty| base_type_name(builder.text(ty)))
                    .unwrap_or_default();
                match types.get(&target).cloned() {
                    Some(parent) => members(builder, node, &parent, &target),
                    None => detached_members(builder, node, &target),
                }
                ModuleItemKind::Other
            }
            _ => ModuleItemKind::Other,
        };

        prev_end = item_span.end;
        builder.push_item(ModuleItem {
            kind,
            span: item_span,
            uses,
            binds,
        });
    }
}

fn name_of(builder: &ScanBuilder<'_>, node: Node) -> String {
    node.child_by_field_name("name")
        .map(|name| builder.text(name).to_string())
        .unwrap_or_default()
}

fn bind_name(builder: &ScanBuilder<'_>, node: Node, binds: &mut BTreeSet<String>) {
    let name = name_of(builder, node);
    if !name.is_empty() {
        binds.insert(name);
    }
}

fn base_type_name(raw: &str) -> String {
    let without_generics = raw.split('<').next().unwrap_or(raw);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .trim()
        .trim_start_matches('&')
        .to_string()
}

fn visibility(node: Node) -> Visibility {
    let mut cursor = node.walk();
    let is_pub = node
        .named_children(&mut cursor)
        .any(|child| child.kind() == "visibility_modifier");
    if is_pub {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn item_entity(
    builder: &mut ScanBuilder<'_>,
    node: Node,
    kind: EntityKind,
    parent: Option<(&EntityId, &str)>,
    item_span: LineSpan,
    docstring: Option<String>,
) -> EntityId {
    let name = name_of(builder, node);
    let qualified_name = match parent {
        Some((_, owner)) => format!("{owner}::{name}"),
        None => name.clone(),
    };
    let body = node.child_by_field_name("body");
    let signature = match kind {
        EntityKind::State => {
            let ty = node
                .child_by_field_name("type")
                .map(|ty| builder.text(ty).to_string())
                .unwrap_or_default();
            format!("{name}: {ty}")
        }
        _ => header_text(node, body, builder.source),
    };
    builder.push_entity(EntityDraft {
        name,
        qualified_name,
        kind,
        parent: parent.map(|(id, _)| id.clone()),
        span: span_of(node),
        item_span,
        complexity: complexity::estimate(node, builder.source, builder.language),
        docstring,
        signature,
        visibility: visibility(node),
        mutability: None,
    })
}

/// Methods of an `impl`/`trait` whose owner type is declared in this file
fn members(builder: &mut ScanBuilder<'_>, container: Node, parent: &EntityId, owner: &str) {
    let Some(body) = container.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    let functions: Vec<Node> = body
        .named_children(&mut cursor)
        .filter(|child| matches!(child.kind(), "function_item" | "function_signature_item"))
        .collect();
    let mut floor = span_of(container).start;
    for function in functions {
        let span = span_of(function);
        let docstring = builder.leading_comments(span.start, floor);
        let start = builder.leading_comment_start(span.start, floor);
        let id = item_entity(
            builder,
            function,
            EntityKind::Method,
            Some((parent, owner)),
            LineSpan::new(start, span.end),
            docstring,
        );
        record_references(builder, &id, function);
        floor = span.end;
    }
}

/// Methods implemented for a type declared elsewhere become free-standing functions
/// qualified by the type name.
fn detached_members(builder: &mut ScanBuilder<'_>, container: Node, owner: &str) {
    let Some(body) = container.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    let functions: Vec<Node> = body
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "function_item")
        .collect();
    for function in functions {
        let span = span_of(function);
        let name = name_of(builder, function);
        let body = function.child_by_field_name("body");
        let id = builder.push_entity(EntityDraft {
            qualified_name: format!("{owner}::{name}"),
            name,
            kind: EntityKind::Function,
            parent: None,
            span,
            item_span: span,
            complexity: complexity::estimate(function, builder.source, builder.language),
            docstring: builder.leading_comments(span.start, 0),
            signature: header_text(function, body, builder.source),
            visibility: visibility(function),
            mutability: None,
        });
        record_references(builder, &id, function);
    }
}

/// Flatten a `use` tree into one record per bound name
fn flatten_use(
    builder: &mut ScanBuilder<'_>,
    node: Node,
    prefix: &str,
    alias: Option<&str>,
    line: usize,
) {
    let join = |prefix: &str, path: &str| -> String {
        match (prefix.is_empty(), path.is_empty()) {
            (true, _) => path.to_string(),
            (false, true) => prefix.to_string(),
            (false, false) => format!("{prefix}::{path}"),
        }
    };
    let base = ImportRecord {
        module: String::new(),
        level: 0,
        name: None,
        alias: alias.map(str::to_string),
        wildcard: false,
        dynamic: false,
        top_level: true,
        line,
    };

    match node.kind() {
        "scoped_identifier" => {
            let path = node
                .child_by_field_name("path")
                .map(|p| builder.text(p))
                .unwrap_or("");
            let name = node
                .child_by_field_name("name")
                .map(|n| builder.text(n).to_string());
            builder.push_import(ImportRecord {
                module: join(prefix, path),
                name,
                ..base
            });
        }
        "identifier" | "crate" | "super" => {
            let text = builder.text(node);
            if prefix.is_empty() {
                builder.push_import(ImportRecord {
                    module: text.to_string(),
                    ..base
                });
            } else {
                builder.push_import(ImportRecord {
                    module: prefix.to_string(),
                    name: Some(text.to_string()),
                    ..base
                });
            }
        }
        "self" => {
            // `use a::b::{self}` binds `b`
            let (module, name) = match prefix.rsplit_once("::") {
                Some((module, name)) => (module.to_string(), Some(name.to_string())),
                None => (prefix.to_string(), None),
            };
            builder.push_import(ImportRecord {
                module,
                name,
                ..base
            });
        }
        "use_as_clause" => {
            let alias = node.child_by_field_name("alias").map(|a| builder.text(a));
            if let Some(path) = node.child_by_field_name("path") {
                flatten_use(builder, path, prefix, alias, line);
            }
        }
        "scoped_use_list" => {
            let path = node
                .child_by_field_name("path")
                .map(|p| builder.text(p))
                .unwrap_or("");
            let nested = join(prefix, path);
            if let Some(list) = node.child_by_field_name("list") {
                flatten_use(builder, list, &nested, None, line);
            }
        }
        "use_list" => {
            let mut cursor = node.walk();
            let entries: Vec<Node> = node.named_children(&mut cursor).collect();
            for entry in entries {
                flatten_use(builder, entry, prefix, None, line);
            }
        }
        "use_wildcard" => {
            let path = node
                .named_child(0)
                .map(|p| builder.text(p))
                .unwrap_or("");
            builder.push_import(ImportRecord {
                module: join(prefix, path),
                wildcard: true,
                ..base
            });
        }
        _ => {}
    }
}

fn record_references(builder: &mut ScanBuilder<'_>, owner: &EntityId, node: Node) {
    let source = builder.source;
    let mut stack = vec![node];
    let mut sites = Vec::new();
    while let Some(current) = stack.pop() {
        let line = current.start_position().row + 1;
        match current.kind() {
            "call_expression" => {
                if let Some(function) = current.child_by_field_name("function") {
                    if let Some((name, receiver)) = callee(function, source) {
                        sites.push((name, receiver, ReferenceKind::Call, line));
                    }
                }
            }
            "identifier" | "type_identifier" => {
                if let Ok(name) = current.utf8_text(source.as_bytes()) {
                    sites.push((name.to_string(), Receiver::Bare, ReferenceKind::Use, line));
                }
            }
            _ => {}
        }
        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }

    let called: BTreeSet<String> = sites
        .iter()
        .filter(|(_, receiver, kind, _)| {
            *kind == ReferenceKind::Call && *receiver == Receiver::Bare
        })
        .map(|(name, ..)| name.clone())
        .collect();
    let own_name = name_of(builder, node);
    for (name, receiver, kind, line) in sites {
        if kind == ReferenceKind::Use && (called.contains(&name) || name == own_name) {
            continue;
        }
        builder.push_reference(owner, &name, receiver, kind, line);
    }
}

fn callee(function: Node, source: &str) -> Option<(String, Receiver)> {
    let text = |node: Node| node.utf8_text(source.as_bytes()).ok().map(str::to_string);
    match function.kind() {
        "identifier" => Some((text(function)?, Receiver::Bare)),
        "field_expression" => {
            let field = text(function.child_by_field_name("field")?)?;
            let value = function.child_by_field_name("value")?;
            let receiver = match value.kind() {
                "self" => Receiver::SelfRef,
                "identifier" | "field_expression" => Receiver::Attribute(text(value)?),
                _ => Receiver::Attribute(String::new()),
            };
            Some((field, receiver))
        }
        "scoped_identifier" => {
            let name = text(function.child_by_field_name("name")?)?;
            let path = function
                .child_by_field_name("path")
                .and_then(text)
                .unwrap_or_default();
            if path == "Self" {
                Some((name, Receiver::SelfRef))
            } else {
                Some((name, Receiver::Attribute(path)))
            }
        }
        "generic_function" => callee(function.child_by_field_name("function")?, source),
        _ => None,
    }
}

fn collect_uses(node: Node, source: &str, out: &mut BTreeSet<String>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if matches!(current.kind(), "identifier" | "type_identifier") {
            if let Ok(name) = current.utf8_text(source.as_bytes()) {
                out.insert(name.to_string());
            }
        }
        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }
}
