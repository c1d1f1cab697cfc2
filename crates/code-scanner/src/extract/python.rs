use super::{header_text, span_of, EntityDraft, ScanBuilder};
use crate::complexity;
use crate::types::{
    EntityId, EntityKind, ImportRecord, LineSpan, ModuleItem, ModuleItemKind, Receiver,
    ReferenceKind, StateMutability, Visibility,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tree_sitter::Node;

/// Leading lines that must stay at the top of a Python file: a `#!` line and
/// an encoding declaration on line 1 or 2
pub fn header_line_count(source: &str) -> usize {
    let mut lines = source.lines();
    let is_cookie = |line: &str| {
        let trimmed = line.trim_start();
        trimmed.starts_with('#') && (trimmed.contains("coding:") || trimmed.contains("coding="))
    };
    let Some(first) = lines.next() else {
        return 0;
    };
    let second_is_cookie = first.trim_start().starts_with('#') && lines.next().is_some_and(is_cookie);
    if second_is_cookie {
        2
    } else if first.starts_with("#!") || is_cookie(first) {
        1
    } else {
        0
    }
}

pub(super) fn extract(builder: &mut ScanBuilder<'_>, root: Node) {
    let source = builder.source;
    let globals = global_names(root, source);
    let assignment_counts = top_level_assignment_counts(root, source);
    collect_imports(builder, root);

    let mut cursor = root.walk();
    let statements: Vec<Node> = root
        .named_children(&mut cursor)
        .filter(|node| node.kind() != "comment")
        .collect();

    // Module-level names defined by a plain single assignment; later rebinds become `Other`.
    let mut defined_state: HashSet<String> = HashSet::new();
    let mut state_ids: HashMap<String, EntityId> = HashMap::new();
    let mut prev_end = header_line_count(source);

    for (index, statement) in statements.iter().enumerate() {
        let statement = *statement;
        let span = span_of(statement);
        let mut uses = BTreeSet::new();
        collect_uses(statement, source, &mut uses);

        let item = match statement.kind() {
            "expression_statement" if index == 0 && is_string_statement(statement) => ModuleItem {
                kind: ModuleItemKind::Docstring,
                span,
                uses: BTreeSet::new(),
                binds: BTreeSet::new(),
            },
            "future_import_statement" => ModuleItem {
                kind: ModuleItemKind::FutureImport,
                span,
                uses: BTreeSet::new(),
                binds: BTreeSet::new(),
            },
            "import_statement" | "import_from_statement" => ModuleItem {
                kind: ModuleItemKind::Import,
                span,
                uses: BTreeSet::new(),
                binds: import_binds(builder, span),
            },
            "function_definition" | "class_definition" | "decorated_definition" => {
                let Some(definition) = definition_node(statement) else {
                    let item = other_item(span, uses, BTreeSet::new());
                    prev_end = item.span.end;
                    builder.push_item(item);
                    continue;
                };
                let item_start = builder.leading_comment_start(span.start, prev_end);
                let id = definition_entity(
                    builder,
                    statement,
                    definition,
                    None,
                    LineSpan::new(item_start, span.end),
                    prev_end,
                );
                let mut binds = BTreeSet::new();
                if let Some(name) = definition.child_by_field_name("name") {
                    binds.insert(builder.text(name).to_string());
                }
                ModuleItem {
                    kind: ModuleItemKind::Entity(id),
                    span: LineSpan::new(item_start, span.end),
                    uses,
                    binds,
                }
            }
            "expression_statement" => {
                let state = single_assignment(statement, source)
                    .filter(|(name, _)| !is_dunder(name) && !defined_state.contains(name));
                match state {
                    Some((name, assignment)) => {
                        defined_state.insert(name.clone());
                        let item_start = builder.leading_comment_start(span.start, prev_end);
                        let item_span = LineSpan::new(item_start, span.end);
                        let rebound = globals.contains(&name)
                            || assignment_counts.get(&name).copied().unwrap_or(0) > 1;
                        let id = state_entity(
                            builder, &name, assignment, span, item_span, rebound, prev_end,
                        );
                        state_ids.insert(name.clone(), id.clone());
                        ModuleItem {
                            kind: ModuleItemKind::Entity(id),
                            span: item_span,
                            uses,
                            binds: BTreeSet::from([name]),
                        }
                    }
                    None => {
                        record_exports(builder, statement);
                        let mut binds = BTreeSet::new();
                        collect_binds(statement, source, &mut binds);
                        other_item(span, uses, binds)
                    }
                }
            }
            _ => {
                let mut binds = BTreeSet::new();
                collect_binds(statement, source, &mut binds);
                other_item(span, uses, binds)
            }
        };

        prev_end = item.span.end;
        builder.push_item(item);
    }

    // Names re-bound by later top-level statements are shared mutable state.
    for id in statements_binding_state(builder, &state_ids) {
        builder.set_mutability(&id, StateMutability::Rebound);
    }
}

fn other_item(span: LineSpan, uses: BTreeSet<String>, binds: BTreeSet<String>) -> ModuleItem {
    ModuleItem {
        kind: ModuleItemKind::Other,
        span,
        uses,
        binds,
    }
}

fn statements_binding_state(
    builder: &ScanBuilder<'_>,
    state_ids: &HashMap<String, EntityId>,
) -> Vec<EntityId> {
    let mut rebound = Vec::new();
    for item in builder.items() {
        if item.kind != ModuleItemKind::Other {
            continue;
        }
        for name in &item.binds {
            if let Some(id) = state_ids.get(name) {
                rebound.push(id.clone());
            }
        }
    }
    rebound
}

fn definition_node(statement: Node) -> Option<Node> {
    match statement.kind() {
        "decorated_definition" => statement.child_by_field_name("definition"),
        _ => Some(statement),
    }
}

fn definition_entity(
    builder: &mut ScanBuilder<'_>,
    outer: Node,
    definition: Node,
    parent: Option<(&EntityId, &str)>,
    item_span: LineSpan,
    floor: usize,
) -> EntityId {
    let source = builder.source;
    let name = definition
        .child_by_field_name("name")
        .map(|node| builder.text(node).to_string())
        .unwrap_or_default();
    let is_class = definition.kind() == "class_definition";
    let kind = match (is_class, parent.is_some()) {
        (true, _) => EntityKind::Class,
        (false, true) => EntityKind::Method,
        (false, false) => EntityKind::Function,
    };
    let qualified_name = match parent {
        Some((_, parent_name)) => format!("{parent_name}.{name}"),
        None => name.clone(),
    };
    let body = definition.child_by_field_name("body");
    let span = span_of(outer);
    let docstring = body
        .and_then(|body| body_docstring(body, source))
        .or_else(|| builder.leading_comments(span.start, floor));

    let visibility = visibility_of(&name, parent.is_some());
    let id = builder.push_entity(EntityDraft {
        name,
        qualified_name: qualified_name.clone(),
        kind,
        parent: parent.map(|(id, _)| id.clone()),
        span: span_of(definition),
        item_span,
        complexity: complexity::estimate(definition, source, builder.language),
        docstring,
        signature: header_text(definition, body, source),
        visibility,
        mutability: None,
    });

    if is_class {
        record_class_references(builder, &id, outer, definition);
        if let Some(body) = body {
            let mut cursor = body.walk();
            let members: Vec<Node> = body.named_children(&mut cursor).collect();
            let mut member_floor = span_of(definition).start;
            for member in members {
                let Some(inner) = definition_node(member) else {
                    continue;
                };
                if inner.kind() != "function_definition" {
                    continue;
                }
                let member_span = span_of(member);
                let start = builder.leading_comment_start(member_span.start, member_floor);
                definition_entity(
                    builder,
                    member,
                    inner,
                    Some((&id, &qualified_name)),
                    LineSpan::new(start, member_span.end),
                    member_floor,
                );
                member_floor = member_span.end;
            }
        }
    } else {
        record_references(builder, &id, outer);
    }
    id
}

fn state_entity(
    builder: &mut ScanBuilder<'_>,
    name: &str,
    assignment: Node,
    span: LineSpan,
    item_span: LineSpan,
    rebound: bool,
    floor: usize,
) -> EntityId {
    let annotation = assignment
        .child_by_field_name("type")
        .map(|node| builder.text(node).to_string());
    let signature = match annotation {
        Some(annotation) => format!("{name}: {annotation}"),
        None => name.to_string(),
    };
    let mutability = if rebound {
        StateMutability::Rebound
    } else if assignment
        .child_by_field_name("right")
        .is_some_and(|value| is_mutable_value(value))
    {
        StateMutability::Mutable
    } else {
        StateMutability::Constant
    };

    let id = builder.push_entity(EntityDraft {
        name: name.to_string(),
        qualified_name: name.to_string(),
        kind: EntityKind::State,
        parent: None,
        span,
        item_span,
        complexity: 1,
        docstring: builder.leading_comments(span.start, floor),
        signature,
        visibility: visibility_of(name, false),
        mutability: Some(mutability),
    });
    if let Some(value) = assignment.child_by_field_name("right") {
        record_references(builder, &id, value);
    }
    id
}

/// Underscore convention; `__all__` overrides it for top-level names when the file is finished
fn visibility_of(name: &str, is_member: bool) -> Visibility {
    if !name.starts_with('_') || (is_member && is_dunder(name)) {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn is_string_statement(statement: Node) -> bool {
    statement.named_child_count() == 1
        && statement
            .named_child(0)
            .is_some_and(|child| matches!(child.kind(), "string" | "concatenated_string"))
}

fn body_docstring(body: Node, source: &str) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" || !is_string_statement(first) {
        return None;
    }
    let raw = first.named_child(0)?.utf8_text(source.as_bytes()).ok()?;
    Some(clean_string_literal(raw))
}

pub(crate) fn clean_string_literal(raw: &str) -> String {
    let unprefixed = raw.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B', 'f', 'F']);
    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|quote| {
            unprefixed
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
        .unwrap_or(unprefixed);
    inner
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// `name = value` / `name: T = value` with a single identifier target
fn single_assignment<'t>(statement: Node<'t>, source: &str) -> Option<(String, Node<'t>)> {
    let assignment = statement.named_child(0)?;
    if assignment.kind() != "assignment" || statement.named_child_count() != 1 {
        return None;
    }
    let left = assignment.child_by_field_name("left")?;
    if left.kind() != "identifier" {
        return None;
    }
    let name = left.utf8_text(source.as_bytes()).ok()?.to_string();
    Some((name, assignment))
}

fn is_mutable_value(value: Node) -> bool {
    matches!(
        value.kind(),
        "list"
            | "dictionary"
            | "set"
            | "list_comprehension"
            | "dictionary_comprehension"
            | "set_comprehension"
            | "generator_expression"
            | "call"
    )
}

fn top_level_assignment_counts(root: Node, source: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    let mut cursor = root.walk();
    for statement in root.named_children(&mut cursor) {
        if statement.kind() != "expression_statement" {
            continue;
        }
        let Some(inner) = statement.named_child(0) else {
            continue;
        };
        if !matches!(inner.kind(), "assignment" | "augmented_assignment") {
            continue;
        }
        let mut targets = BTreeSet::new();
        if let Some(left) = inner.child_by_field_name("left") {
            collect_targets(left, source, &mut targets);
        }
        for name in targets {
            // augmented assignment always re-binds
            let weight = if inner.kind() == "augmented_assignment" { 2 } else { 1 };
            *counts.entry(name).or_insert(0) += weight;
        }
    }
    counts
}

fn global_names(root: Node, source: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == "global_statement" {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if let Ok(name) = child.utf8_text(source.as_bytes()) {
                    names.insert(name.to_string());
                }
            }
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
    names
}

fn record_exports(builder: &mut ScanBuilder<'_>, statement: Node) {
    let Some(inner) = statement.named_child(0) else {
        return;
    };
    if !matches!(inner.kind(), "assignment" | "augmented_assignment") {
        return;
    }
    let Some(left) = inner.child_by_field_name("left") else {
        return;
    };
    if builder.text(left) != "__all__" {
        return;
    }
    let Some(right) = inner.child_by_field_name("right") else {
        return;
    };
    let mut names = Vec::new();
    let mut cursor = right.walk();
    for element in right.named_children(&mut cursor) {
        if element.kind() == "string" {
            let name = clean_string_literal(builder.text(element));
            if !name.is_empty() {
                names.push(name);
            }
        }
    }
    if inner.kind() == "augmented_assignment" {
        builder.extend_exports(names);
    } else {
        builder.set_exports(names);
    }
}

fn import_binds(builder: &ScanBuilder<'_>, span: LineSpan) -> BTreeSet<String> {
    builder
        .imports()
        .iter()
        .filter(|record| record.top_level && span.contains(record.line))
        .filter_map(ImportRecord::bound_name)
        .collect()
}

fn collect_imports(builder: &mut ScanBuilder<'_>, root: Node) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                let top_level = node.parent().is_some_and(|parent| parent.kind() == "module");
                for record in import_records(builder, node, top_level) {
                    builder.push_import(record);
                }
                continue;
            }
            "call" => {
                if let Some(record) = dynamic_import(builder, node) {
                    builder.push_import(record);
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        stack.extend(node.named_children(&mut cursor));
    }
}

fn import_records(builder: &ScanBuilder<'_>, node: Node, top_level: bool) -> Vec<ImportRecord> {
    let line = node.start_position().row + 1;
    let mut records = Vec::new();
    let base = ImportRecord {
        module: String::new(),
        level: 0,
        name: None,
        alias: None,
        wildcard: false,
        dynamic: false,
        top_level,
        line,
    };

    if node.kind() == "import_statement" {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (module, alias) = split_alias(builder, name);
            records.push(ImportRecord {
                module,
                alias,
                ..base.clone()
            });
        }
        return records;
    }

    let (module, level) = if node.kind() == "future_import_statement" {
        ("__future__".to_string(), 0)
    } else {
        match node.child_by_field_name("module_name") {
            Some(module_node) if module_node.kind() == "relative_import" => {
                relative_module(builder, module_node)
            }
            Some(module_node) => (builder.text(module_node).to_string(), 0),
            None => (String::new(), 0),
        }
    };

    let mut cursor = node.walk();
    let has_wildcard = node
        .named_children(&mut cursor)
        .any(|child| child.kind() == "wildcard_import");
    if has_wildcard {
        records.push(ImportRecord {
            module,
            level,
            wildcard: true,
            ..base
        });
        return records;
    }

    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        let (imported, alias) = split_alias(builder, name);
        records.push(ImportRecord {
            module: module.clone(),
            level,
            name: Some(imported),
            alias,
            ..base.clone()
        });
    }
    records
}

fn split_alias(builder: &ScanBuilder<'_>, node: Node) -> (String, Option<String>) {
    if node.kind() == "aliased_import" {
        let name = node
            .child_by_field_name("name")
            .map(|n| builder.text(n).to_string())
            .unwrap_or_default();
        let alias = node
            .child_by_field_name("alias")
            .map(|n| builder.text(n).to_string());
        (name, alias)
    } else {
        (builder.text(node).to_string(), None)
    }
}

fn relative_module(builder: &ScanBuilder<'_>, node: Node) -> (String, usize) {
    let mut level = 0;
    let mut module = String::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "import_prefix" => level += builder.text(child).matches('.').count(),
            "dotted_name" => module = builder.text(child).to_string(),
            _ => {}
        }
    }
    (module, level)
}

/// `importlib.import_module(x)` / `__import__(x)`
fn dynamic_import(builder: &ScanBuilder<'_>, call: Node) -> Option<ImportRecord> {
    let function = call.child_by_field_name("function")?;
    let callee = builder.text(function);
    if !matches!(callee, "__import__" | "importlib.import_module" | "import_module") {
        return None;
    }
    let arguments = call.child_by_field_name("arguments")?;
    let first = arguments.named_child(0)?;
    let (module, dynamic) = if first.kind() == "string" {
        let mut cursor = first.walk();
        let has_interpolation = first
            .named_children(&mut cursor)
            .any(|part| part.kind() == "interpolation");
        (clean_string_literal(builder.text(first)), has_interpolation)
    } else {
        (builder.text(first).to_string(), true)
    };
    let level = module.chars().take_while(|c| *c == '.').count();
    Some(ImportRecord {
        module: module.trim_start_matches('.').to_string(),
        level,
        name: None,
        alias: None,
        wildcard: false,
        dynamic,
        top_level: false,
        line: call.start_position().row + 1,
    })
}

fn record_class_references(
    builder: &mut ScanBuilder<'_>,
    id: &EntityId,
    outer: Node,
    definition: Node,
) {
    let mut roots = Vec::new();
    if outer.kind() == "decorated_definition" {
        let mut cursor = outer.walk();
        roots.extend(
            outer
                .named_children(&mut cursor)
                .filter(|child| child.kind() == "decorator"),
        );
    }
    if let Some(bases) = definition.child_by_field_name("superclasses") {
        roots.push(bases);
    }
    if let Some(body) = definition.child_by_field_name("body") {
        let mut cursor = body.walk();
        roots.extend(body.named_children(&mut cursor).filter(|member| {
            definition_node(*member).map_or(true, |inner| inner.kind() != "function_definition")
        }));
    }
    for root in roots {
        record_references(builder, id, root);
    }
}

fn record_references(builder: &mut ScanBuilder<'_>, owner: &EntityId, node: Node) {
    let source = builder.source;
    let mut calls = Vec::new();
    collect_calls(node, source, &mut calls);
    let mut called_bare = HashSet::new();
    for (name, receiver, line) in calls {
        if receiver == Receiver::Bare {
            called_bare.insert(name.clone());
        }
        builder.push_reference(owner, &name, receiver, ReferenceKind::Call, line);
    }

    let mut uses = Vec::new();
    collect_use_sites(node, source, &mut uses);
    for (name, line) in uses {
        if called_bare.contains(&name) || is_builtin_receiver(&name) {
            continue;
        }
        builder.push_reference(owner, &name, Receiver::Bare, ReferenceKind::Use, line);
    }
}

fn is_builtin_receiver(name: &str) -> bool {
    matches!(name, "self" | "cls")
}

fn collect_calls(node: Node, source: &str, out: &mut Vec<(String, Receiver, usize)>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "call" {
            if let Some(function) = current.child_by_field_name("function") {
                let line = current.start_position().row + 1;
                match function.kind() {
                    "identifier" => {
                        if let Ok(name) = function.utf8_text(source.as_bytes()) {
                            out.push((name.to_string(), Receiver::Bare, line));
                        }
                    }
                    "attribute" => {
                        let attribute = function
                            .child_by_field_name("attribute")
                            .and_then(|n| n.utf8_text(source.as_bytes()).ok());
                        let object = function.child_by_field_name("object");
                        if let (Some(attribute), Some(object)) = (attribute, object) {
                            let receiver = receiver_of(object, source);
                            out.push((attribute.to_string(), receiver, line));
                        }
                    }
                    _ => {}
                }
            }
        }
        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }
}

fn receiver_of(object: Node, source: &str) -> Receiver {
    let text = object.utf8_text(source.as_bytes()).unwrap_or("");
    match object.kind() {
        "identifier" if matches!(text, "self" | "cls") => Receiver::SelfRef,
        "identifier" | "attribute" => Receiver::Attribute(text.to_string()),
        _ => Receiver::Attribute(String::new()),
    }
}

/// Identifiers read inside `node` (names only, see [`collect_use_sites`])
pub(super) fn collect_uses(node: Node, source: &str, out: &mut BTreeSet<String>) {
    let mut sites = Vec::new();
    collect_use_sites(node, source, &mut sites);
    out.extend(sites.into_iter().map(|(name, _)| name));
}

/// Identifiers read inside `node`, excluding attribute fields, keyword
/// argument names, parameter names and definition names.
fn collect_use_sites(node: Node, source: &str, out: &mut Vec<(String, usize)>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        match current.kind() {
            "identifier" => {
                if let Ok(name) = current.utf8_text(source.as_bytes()) {
                    out.push((name.to_string(), current.start_position().row + 1));
                }
            }
            "attribute" => {
                if let Some(object) = current.child_by_field_name("object") {
                    stack.push(object);
                }
            }
            "keyword_argument" => {
                if let Some(value) = current.child_by_field_name("value") {
                    stack.push(value);
                }
            }
            "function_definition" | "class_definition" | "lambda" => {
                let mut cursor = current.walk();
                for child in current.named_children(&mut cursor) {
                    let is_name = current
                        .child_by_field_name("name")
                        .is_some_and(|name| name.id() == child.id());
                    if !is_name {
                        stack.push(child);
                    }
                }
            }
            "parameters" | "lambda_parameters" => {
                let mut cursor = current.walk();
                for parameter in current.named_children(&mut cursor) {
                    for field in ["value", "type"] {
                        if let Some(part) = parameter.child_by_field_name(field) {
                            stack.push(part);
                        }
                    }
                }
            }
            "import_statement" | "import_from_statement" | "future_import_statement"
            | "comment" => {}
            _ => {
                let mut cursor = current.walk();
                stack.extend(current.named_children(&mut cursor));
            }
        }
    }
}

/// Names bound at module scope by a statement (without entering function bodies)
fn collect_binds(node: Node, source: &str, out: &mut BTreeSet<String>) {
    match node.kind() {
        "assignment" | "augmented_assignment" => {
            if let Some(left) = node.child_by_field_name("left") {
                collect_targets(left, source, out);
            }
            if let Some(right) = node.child_by_field_name("right") {
                if right.kind() == "assignment" {
                    collect_binds(right, source, out);
                }
            }
        }
        "function_definition" | "class_definition" => {
            if let Some(name) = node.child_by_field_name("name") {
                if let Ok(name) = name.utf8_text(source.as_bytes()) {
                    out.insert(name.to_string());
                }
            }
        }
        "decorated_definition" => {
            if let Some(definition) = node.child_by_field_name("definition") {
                collect_binds(definition, source, out);
            }
        }
        "import_statement" | "import_from_statement" => {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let bound = match name.kind() {
                    "aliased_import" => name.child_by_field_name("alias"),
                    _ => Some(name),
                };
                if let Some(text) = bound.and_then(|n| n.utf8_text(source.as_bytes()).ok()) {
                    let first = if node.kind() == "import_statement" {
                        text.split('.').next().unwrap_or(text)
                    } else {
                        text
                    };
                    out.insert(first.to_string());
                }
            }
        }
        "for_statement" => {
            if let Some(left) = node.child_by_field_name("left") {
                collect_targets(left, source, out);
            }
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "block" || child.kind() == "else_clause" {
                    collect_binds(child, source, out);
                }
            }
        }
        "lambda" | "call" => {}
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_binds(child, source, out);
            }
        }
    }
}

fn collect_targets(node: Node, source: &str, out: &mut BTreeSet<String>) {
    match node.kind() {
        "identifier" => {
            if let Ok(name) = node.utf8_text(source.as_bytes()) {
                out.insert(name.to_string());
            }
        }
        "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_targets(child, source, out);
            }
        }
        _ => {}
    }
}
