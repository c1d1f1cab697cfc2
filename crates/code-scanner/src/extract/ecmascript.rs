use super::{header_text, span_of, EntityDraft, ScanBuilder};
use crate::complexity;
use crate::types::{
    EntityId, EntityKind, ImportRecord, LineSpan, ModuleItem, ModuleItemKind, Receiver,
    ReferenceKind, StateMutability, Visibility,
};
use std::collections::BTreeSet;
use tree_sitter::Node;

pub(super) fn extract(builder: &mut ScanBuilder<'_>, root: Node) {
    collect_imports(builder, root);

    let mut cursor = root.walk();
    let statements: Vec<Node> = root
        .named_children(&mut cursor)
        .filter(|node| node.kind() != "comment")
        .collect();
    let mut prev_end = 0usize;

    for statement in statements {
        let span = span_of(statement);
        let item_start = builder.leading_comment_start(span.start, prev_end);
        let item_span = LineSpan::new(item_start, span.end);
        let docstring = builder.leading_comments(span.start, prev_end);

        let (declaration, exported) = match statement.kind() {
            "export_statement" => (
                statement
                    .child_by_field_name("declaration")
                    .or_else(|| statement.child_by_field_name("value")),
                true,
            ),
            _ => (Some(statement), false),
        };
        let visibility = if exported {
            Visibility::Public
        } else {
            Visibility::Private
        };

        let mut uses = BTreeSet::new();
        collect_uses(statement, builder.source, &mut uses);
        let mut binds = BTreeSet::new();

        let kind = if statement.kind() == "import_statement" {
            binds.extend(
                builder
                    .imports()
                    .iter()
                    .filter(|record| span.contains(record.line))
                    .filter_map(ImportRecord::bound_name),
            );
            ModuleItemKind::Import
        } else if let Some(node) = declaration {
            let ids =
                declaration_entities(builder, statement, node, visibility, item_span, docstring);
            for id in &ids {
                if let Some(entity) = builder.entities().iter().find(|e| &e.id == id) {
                    binds.insert(entity.name.clone());
                }
            }
            match ids.into_iter().next() {
                Some(id) => ModuleItemKind::Entity(id),
                None => ModuleItemKind::Other,
            }
        } else {
            ModuleItemKind::Other
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

fn declaration_entities(
    builder: &mut ScanBuilder<'_>,
    outer: Node,
    node: Node,
    visibility: Visibility,
    item_span: LineSpan,
    docstring: Option<String>,
) -> Vec<EntityId> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" | "function_signature" => {
            let id = named_entity(
                builder,
                node,
                EntityKind::Function,
                visibility,
                item_span,
                docstring,
            );
            record_references(builder, &id, node);
            vec![id]
        }
        "class_declaration"
        | "abstract_class_declaration"
        | "interface_declaration"
        | "enum_declaration" => {
            let id = named_entity(
                builder,
                node,
                EntityKind::Class,
                visibility,
                item_span,
                docstring,
            );
            class_members(builder, node, &id);
            vec![id]
        }
        "lexical_declaration" | "variable_declaration" => {
            let keyword = node.child(0).map(|token| token.kind()).unwrap_or("var");
            let mut cursor = node.walk();
            let declarators: Vec<Node> = node
                .named_children(&mut cursor)
                .filter(|child| child.kind() == "variable_declarator")
                .collect();
            let mut ids = Vec::new();
            for declarator in declarators {
                if let Some(id) = declarator_entity(
                    builder,
                    outer,
                    declarator,
                    keyword,
                    visibility,
                    item_span,
                    docstring.clone(),
                ) {
                    ids.push(id);
                }
            }
            ids
        }
        _ => Vec::new(),
    }
}

fn named_entity(
    builder: &mut ScanBuilder<'_>,
    node: Node,
    kind: EntityKind,
    visibility: Visibility,
    item_span: LineSpan,
    docstring: Option<String>,
) -> EntityId {
    let name = node
        .child_by_field_name("name")
        .map(|name| builder.text(name).to_string())
        .unwrap_or_else(|| "default".to_string());
    let body = node.child_by_field_name("body");
    builder.push_entity(EntityDraft {
        qualified_name: name.clone(),
        name,
        kind,
        parent: None,
        span: span_of(node),
        item_span,
        complexity: complexity::estimate(node, builder.source, builder.language),
        docstring,
        signature: header_text(node, body, builder.source),
        visibility,
        mutability: None,
    })
}

fn declarator_entity(
    builder: &mut ScanBuilder<'_>,
    outer: Node,
    declarator: Node,
    keyword: &str,
    visibility: Visibility,
    item_span: LineSpan,
    docstring: Option<String>,
) -> Option<EntityId> {
    let name_node = declarator.child_by_field_name("name")?;
    if name_node.kind() != "identifier" {
        return None;
    }
    let name = builder.text(name_node).to_string();
    let value = declarator.child_by_field_name("value");
    if value.is_some_and(|value| is_require_call(builder, value)) {
        return None;
    }

    let (kind, mutability) = match value.map(|v| v.kind()) {
        Some("arrow_function" | "function_expression" | "function" | "generator_function") => {
            (EntityKind::Function, None)
        }
        Some("class") => (EntityKind::Class, None),
        other => {
            let mutability = if keyword != "const" {
                StateMutability::Rebound
            } else if matches!(
                other,
                Some("object" | "array" | "new_expression" | "call_expression")
            ) {
                StateMutability::Mutable
            } else {
                StateMutability::Constant
            };
            (EntityKind::State, Some(mutability))
        }
    };

    let signature = match (kind, value) {
        (EntityKind::Function, Some(function)) => {
            let params = function
                .child_by_field_name("parameters")
                .or_else(|| function.child_by_field_name("parameter"))
                .map(|p| builder.text(p))
                .unwrap_or("()");
            super::normalize_signature(&format!("{keyword} {name} = {params}"))
        }
        _ => format!("{keyword} {name}"),
    };

    let id = builder.push_entity(EntityDraft {
        qualified_name: name.clone(),
        name,
        kind,
        parent: None,
        span: span_of(outer),
        item_span,
        complexity: complexity::estimate(declarator, builder.source, builder.language),
        docstring,
        signature,
        visibility,
        mutability,
    });
    if let Some(value) = value {
        record_references(builder, &id, value);
    }
    Some(id)
}

fn class_members(builder: &mut ScanBuilder<'_>, class: Node, parent: &EntityId) {
    let class_name = class
        .child_by_field_name("name")
        .map(|name| builder.text(name).to_string())
        .unwrap_or_default();
    if let Some(heritage) = heritage_clause(class) {
        record_references(builder, parent, heritage);
    }
    let Some(body) = class.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    let members: Vec<Node> = body
        .named_children(&mut cursor)
        .filter(|member| matches!(member.kind(), "method_definition" | "method_signature"))
        .collect();
    let mut floor = span_of(class).start;
    for member in members {
        let span = span_of(member);
        let name = member
            .child_by_field_name("name")
            .map(|name| builder.text(name).to_string())
            .unwrap_or_default();
        let member_body = member.child_by_field_name("body");
        let visibility = if name.starts_with('#') || name.starts_with('_') {
            Visibility::Private
        } else {
            Visibility::Public
        };
        let start = builder.leading_comment_start(span.start, floor);
        let docstring = builder.leading_comments(span.start, floor);
        let id = builder.push_entity(EntityDraft {
            qualified_name: format!("{class_name}.{name}"),
            name,
            kind: EntityKind::Method,
            parent: Some(parent.clone()),
            span,
            item_span: LineSpan::new(start, span.end),
            complexity: complexity::estimate(member, builder.source, builder.language),
            docstring,
            signature: header_text(member, member_body, builder.source),
            visibility,
            mutability: None,
        });
        record_references(builder, &id, member);
        floor = span.end;
    }
}

fn heritage_clause(class: Node) -> Option<Node> {
    let mut cursor = class.walk();
    let found = class
        .named_children(&mut cursor)
        .find(|child| matches!(child.kind(), "class_heritage" | "extends_type_clause"));
    found
}

fn is_require_call(builder: &ScanBuilder<'_>, node: Node) -> bool {
    node.kind() == "call_expression"
        && node
            .child_by_field_name("function")
            .is_some_and(|function| builder.text(function) == "require")
}

fn string_value(builder: &ScanBuilder<'_>, node: Node) -> String {
    builder
        .text(node)
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .to_string()
}

fn collect_imports(builder: &mut ScanBuilder<'_>, root: Node) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let line = node.start_position().row + 1;
        let top_level = node.parent().is_some_and(|parent| parent.kind() == "program");
        match node.kind() {
            "import_statement" => {
                for record in static_import(builder, node, line, top_level) {
                    builder.push_import(record);
                }
                continue;
            }
            "call_expression" => {
                if let Some(record) = call_import(builder, node, line) {
                    builder.push_import(record);
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
}

fn base_record(module: String, line: usize, top_level: bool) -> ImportRecord {
    ImportRecord {
        module,
        level: 0,
        name: None,
        alias: None,
        wildcard: false,
        dynamic: false,
        top_level,
        line,
    }
}

fn static_import(
    builder: &ScanBuilder<'_>,
    node: Node,
    line: usize,
    top_level: bool,
) -> Vec<ImportRecord> {
    let Some(source) = node.child_by_field_name("source") else {
        return Vec::new();
    };
    let module = string_value(builder, source);
    let mut records = Vec::new();

    let mut cursor = node.walk();
    let clause = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == "import_clause");
    let Some(clause) = clause else {
        records.push(base_record(module, line, top_level));
        return records;
    };

    let mut cursor = clause.walk();
    for part in clause.named_children(&mut cursor) {
        match part.kind() {
            "identifier" => records.push(ImportRecord {
                name: Some("default".to_string()),
                alias: Some(builder.text(part).to_string()),
                ..base_record(module.clone(), line, top_level)
            }),
            "namespace_import" => {
                let alias = part.named_child(0).map(|n| builder.text(n).to_string());
                records.push(ImportRecord {
                    alias,
                    ..base_record(module.clone(), line, top_level)
                });
            }
            "named_imports" => {
                let mut inner = part.walk();
                for specifier in part.named_children(&mut inner) {
                    if specifier.kind() != "import_specifier" {
                        continue;
                    }
                    let name = specifier
                        .child_by_field_name("name")
                        .map(|n| builder.text(n).to_string());
                    let alias = specifier
                        .child_by_field_name("alias")
                        .map(|n| builder.text(n).to_string());
                    records.push(ImportRecord {
                        name,
                        alias,
                        ..base_record(module.clone(), line, top_level)
                    });
                }
            }
            _ => {}
        }
    }
    records
}

/// `require("x")` and `import("x")`
fn call_import(builder: &ScanBuilder<'_>, call: Node, line: usize) -> Option<ImportRecord> {
    let function = call.child_by_field_name("function")?;
    let is_import = function.kind() == "import"
        || (function.kind() == "identifier" && builder.text(function) == "require");
    if !is_import {
        return None;
    }
    let argument = call.child_by_field_name("arguments")?.named_child(0)?;
    let (module, dynamic) = match argument.kind() {
        "string" => (string_value(builder, argument), false),
        _ => (builder.text(argument).to_string(), true),
    };

    // `const x = require("m")` binds x at module level
    let declarator = call
        .parent()
        .filter(|parent| parent.kind() == "variable_declarator");
    let alias = declarator
        .and_then(|d| d.child_by_field_name("name"))
        .filter(|name| name.kind() == "identifier")
        .map(|name| builder.text(name).to_string());
    let top_level = declarator
        .and_then(|d| d.parent())
        .and_then(|decl| decl.parent())
        .is_some_and(|parent| parent.kind() == "program");

    Some(ImportRecord {
        alias,
        dynamic,
        ..base_record(module, line, top_level)
    })
}

fn record_references(builder: &mut ScanBuilder<'_>, owner: &EntityId, node: Node) {
    let source = builder.source;
    let mut sites = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let line = current.start_position().row + 1;
        match current.kind() {
            "call_expression" | "new_expression" => {
                let field = if current.kind() == "call_expression" {
                    "function"
                } else {
                    "constructor"
                };
                if let Some(target) = current.child_by_field_name(field) {
                    if let Some((name, receiver)) = callee(target, source) {
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
    for (name, receiver, kind, line) in sites {
        if kind == ReferenceKind::Use && called.contains(&name) {
            continue;
        }
        builder.push_reference(owner, &name, receiver, kind, line);
    }
}

fn callee(target: Node, source: &str) -> Option<(String, Receiver)> {
    let text = |node: Node| node.utf8_text(source.as_bytes()).ok().map(str::to_string);
    match target.kind() {
        "identifier" => Some((text(target)?, Receiver::Bare)),
        "member_expression" => {
            let property = text(target.child_by_field_name("property")?)?;
            let object = target.child_by_field_name("object")?;
            let receiver = match object.kind() {
                "this" => Receiver::SelfRef,
                "identifier" | "member_expression" => Receiver::Attribute(text(object)?),
                _ => Receiver::Attribute(String::new()),
            };
            Some((property, receiver))
        }
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
        if current.kind() == "import_statement" {
            continue;
        }
        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }
}
