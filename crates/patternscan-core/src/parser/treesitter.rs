//! Tree-sitter based parsing utilities shared across language parsers.

use tree_sitter::{Language, Node, Parser as TSParser, Tree};

use super::traits::AstProvider;
use crate::error::ParseError;

/// AST provider backed by a tree-sitter grammar.
///
/// A fresh tree-sitter parser is created per call, so one provider can be
/// shared across threads.
pub struct TreeSitterProvider {
    language: Language,
    language_name: &'static str,
}

impl TreeSitterProvider {
    pub fn new(language: Language, language_name: &'static str) -> Self {
        Self {
            language,
            language_name,
        }
    }

    /// Get text for a node from source content.
    pub fn node_text<'a>(node: &Node, content: &'a str) -> &'a str {
        &content[node.byte_range()]
    }

    /// Get line number (1-based) for a node.
    pub fn node_line(node: &Node) -> usize {
        node.start_position().row + 1
    }

    /// Get end line number (1-based) for a node.
    pub fn node_end_line(node: &Node) -> usize {
        node.end_position().row + 1
    }

    /// Find all direct children of a specific kind.
    pub fn children_of_kind<'t>(node: &Node<'t>, kind: &str) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        node.children(&mut cursor)
            .filter(|n| n.kind() == kind)
            .collect()
    }

    /// First direct child of a specific kind.
    pub fn child_of_kind<'t>(node: &Node<'t>, kind: &str) -> Option<Node<'t>> {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).find(|n| n.kind() == kind);
        found
    }

    /// First field present among `fields`; grammars rename fields between releases.
    pub fn field<'t>(node: &Node<'t>, fields: &[&str]) -> Option<Node<'t>> {
        fields.iter().find_map(|f| node.child_by_field_name(f))
    }

    /// First line of a declaration, without the opening brace or arrow.
    pub fn signature(node: &Node, content: &str) -> String {
        Self::node_text(node, content)
            .lines()
            .next()
            .unwrap_or("")
            .trim_end_matches('{')
            .trim_end_matches("=>")
            .trim_end_matches(':')
            .trim()
            .to_string()
    }
}

impl AstProvider for TreeSitterProvider {
    fn language_name(&self) -> &'static str {
        self.language_name
    }

    fn parse_tree(&self, content: &str) -> Result<Tree, ParseError> {
        let mut parser = TSParser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| ParseError::Provider(format!("Failed to set language: {}", e)))?;

        parser
            .parse(content, None)
            .ok_or_else(|| ParseError::Provider("Failed to parse content".to_string()))
    }
}

/// Pre-order walk below (and including) `root` on an explicit stack, so
/// deeply nested expressions cannot exhaust the thread stack. `visit`
/// returns whether to descend into the node's children.
pub fn walk_tree<'t, F: FnMut(&Node<'t>) -> bool>(root: &Node<'t>, mut visit: F) {
    let mut cursor = root.walk();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if !visit(&node) {
            continue;
        }
        let start = stack.len();
        stack.extend(node.children(&mut cursor));
        stack[start..].reverse();
    }
}

/// Depth-first visit of every node below (and including) `node`.
pub fn visit_all<'t, F: FnMut(&Node<'t>)>(node: &Node<'t>, f: &mut F) {
    walk_tree(node, |n| {
        f(n);
        true
    });
}

/// 1-based line of the first `ERROR` or missing node, if any.
pub fn first_error_line(tree: &Tree) -> Option<usize> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }

    let mut line = None;
    walk_tree(&root, |node| {
        if line.is_some() {
            return false;
        }
        if node.is_error() || node.is_missing() {
            line = Some(node.start_position().row + 1);
            return false;
        }
        node.has_error()
    });
    line.or(Some(1))
}

/// Helper to extract doc comments from preceding sibling nodes.
pub fn extract_doc_comment(node: &Node, content: &str) -> Option<String> {
    let mut comments = Vec::new();
    let mut sibling = node.prev_sibling();

    while let Some(s) = sibling {
        if s.kind() != "comment" {
            break;
        }
        let text = TreeSitterProvider::node_text(&s, content);
        let cleaned = text
            .trim_start_matches("///")
            .trim_start_matches("//")
            .trim_start_matches("/**")
            .trim_start_matches("/*")
            .trim_end_matches("*/")
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        comments.push(cleaned);
        sibling = s.prev_sibling();
    }

    if comments.is_empty() {
        None
    } else {
        comments.reverse();
        Some(strip_xml_doc(&comments.join("\n")))
    }
}

/// Strip C#-style XML doc tags down to their text.
fn strip_xml_doc(text: &str) -> String {
    if !text.contains('<') {
        return text.trim().to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csharp() -> TreeSitterProvider {
        TreeSitterProvider::new(tree_sitter_c_sharp::LANGUAGE.into(), "C#")
    }

    #[test]
    fn test_parse_tree() {
        let tree = csharp().parse_tree("class A { }").unwrap();
        assert_eq!(tree.root_node().kind(), "compilation_unit");
        assert!(first_error_line(&tree).is_none());
    }

    #[test]
    fn test_first_error_line() {
        let tree = csharp().parse_tree("class A {\n  void M( {\n}").unwrap();
        assert!(first_error_line(&tree).is_some());
    }

    #[test]
    fn test_visit_all_survives_deep_nesting() {
        let depth = 20_000;
        let source = format!(
            "class A {{ int M() => {}1{}; }}",
            "(".repeat(depth),
            ")".repeat(depth)
        );
        let tree = csharp().parse_tree(&source).unwrap();

        let mut parenthesized = 0;
        visit_all(&tree.root_node(), &mut |node| {
            if node.kind() == "parenthesized_expression" {
                parenthesized += 1;
            }
        });
        assert_eq!(parenthesized, depth);
    }

    #[test]
    fn test_walk_tree_is_preorder() {
        let tree = csharp().parse_tree("class A { } class B { }").unwrap();
        let mut classes = Vec::new();
        walk_tree(&tree.root_node(), |node| {
            if node.kind() == "class_declaration" {
                let name = node.child_by_field_name("name").unwrap();
                classes.push(name.start_byte());
                return false;
            }
            true
        });
        assert_eq!(classes.len(), 2);
        assert!(classes[0] < classes[1]);
    }

    #[test]
    fn test_doc_comment_strips_xml() {
        let source = "/// <summary>\n/// Places orders.\n/// </summary>\nclass OrderService { }";
        let tree = csharp().parse_tree(source).unwrap();
        let class = TreeSitterProvider::child_of_kind(&tree.root_node(), "class_declaration")
            .unwrap();
        assert_eq!(
            extract_doc_comment(&class, source).as_deref(),
            Some("Places orders.")
        );
    }
}
