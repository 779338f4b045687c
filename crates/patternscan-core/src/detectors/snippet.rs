//! Line arithmetic and context-window extraction shared by detectors.

use tree_sitter::Node;

/// Inclusive range of lines `start..=end` (0-based) widened by `context_lines`
/// on both sides and clamped to the source, joined with newlines.
pub fn snippet(lines: &[&str], start: usize, end: usize, context_lines: usize) -> String {
    let Some(last) = lines.len().checked_sub(1) else {
        return String::new();
    };

    let end = end.max(start);
    let from = start.saturating_sub(context_lines).min(last);
    let to = end.saturating_add(context_lines).min(last);

    lines[from..=to].join("\n")
}

/// Context window around a tree-sitter node, using the node's own span.
pub fn snippet_for_node(node: &Node, lines: &[&str], context_lines: usize) -> String {
    snippet(
        lines,
        node.start_position().row,
        node.end_position().row,
        context_lines,
    )
}

/// 1-based line number of a byte offset.
pub fn line_of_offset(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source.as_bytes()[..offset].iter().filter(|&&b| b == b'\n').count() + 1
}

/// Keep at most `max_chars` characters, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "a\nb\nc\nd\ne\nf";

    fn lines() -> Vec<&'static str> {
        SOURCE.lines().collect()
    }

    #[test]
    fn test_snippet_window() {
        assert_eq!(snippet(&lines(), 2, 2, 1), "b\nc\nd");
    }

    #[test]
    fn test_snippet_clamps_both_ends() {
        assert_eq!(snippet(&lines(), 0, 0, 3), "a\nb\nc\nd");
        assert_eq!(snippet(&lines(), 5, 5, 2), "d\ne\nf");
        assert_eq!(snippet(&lines(), 40, 50, 1), "f");
    }

    #[test]
    fn test_snippet_empty_source() {
        assert_eq!(snippet(&[], 0, 3, 2), "");
    }

    #[test]
    fn test_line_of_offset() {
        assert_eq!(line_of_offset(SOURCE, 0), 1);
        assert_eq!(line_of_offset(SOURCE, 2), 2);
        assert_eq!(line_of_offset(SOURCE, SOURCE.len() + 10), 6);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
