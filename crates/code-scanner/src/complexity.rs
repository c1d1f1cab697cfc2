use crate::language::Language;
use tree_sitter::Node;

/// Cyclomatic-complexity estimate: one plus the number of branch points.
///
/// Counts conditionals, loops, exception handlers, short-circuit operators,
/// match arms and comprehension filters found anywhere under `node`.
pub fn estimate(node: Node, source: &str, language: Language) -> u32 {
    let mut branches = 0u32;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if is_branch(current, source, language) {
            branches += 1;
        }
        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }
    branches + 1
}

fn is_branch(node: Node, source: &str, language: Language) -> bool {
    match language {
        Language::Python => matches!(
            node.kind(),
            "if_statement"
                | "elif_clause"
                | "for_statement"
                | "while_statement"
                | "except_clause"
                | "conditional_expression"
                | "boolean_operator"
                | "if_clause"
                | "case_clause"
        ),
        Language::Rust => match node.kind() {
            "if_expression" | "while_expression" | "for_expression" | "loop_expression"
            | "match_arm" | "try_expression" => true,
            "binary_expression" => is_short_circuit(node, source),
            _ => false,
        },
        Language::JavaScript | Language::TypeScript => match node.kind() {
            "if_statement" | "for_statement" | "for_in_statement" | "while_statement"
            | "do_statement" | "catch_clause" | "ternary_expression" | "switch_case" => true,
            "binary_expression" => is_short_circuit(node, source),
            _ => false,
        },
        Language::Unknown => false,
    }
}

fn is_short_circuit(node: Node, source: &str) -> bool {
    node.child_by_field_name("operator")
        .and_then(|op| op.utf8_text(source.as_bytes()).ok())
        .is_some_and(|op| matches!(op, "&&" | "||" | "??"))
}
