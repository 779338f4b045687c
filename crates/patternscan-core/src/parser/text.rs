//! Line-oriented helpers for the languages walked without a tree
//! (VB.NET, Dart, Bicep).

use once_cell::sync::Lazy;
use regex::Regex;

static CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:([A-Za-z_][\w.]*)\s*\.\s*)?\b([A-Za-z_]\w*)\s*(?:<[\w\s,.<>?]*>)?\s*\(").unwrap());

/// 1-based line of a byte offset.
pub fn line_at(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count() + 1
}

/// Replace the inside of string literals and strip a trailing line comment,
/// so braces and calls inside them are not counted.
pub fn code_only(line: &str, comment: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut chars = line.char_indices();

    while let Some((idx, ch)) = chars.next() {
        match quote {
            Some(q) => {
                // VB strings have no backslash escapes
                if ch == '\\' && comment != "'" {
                    chars.next();
                } else if ch == q {
                    quote = None;
                    out.push(ch);
                }
            }
            None => {
                if line[idx..].starts_with(comment) {
                    break;
                }
                if ch == '"' || (ch == '\'' && comment != "'") {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

/// Index of the line closing the brace block opened at or after `start`.
/// Declarations without a body (`;` or `=>` before any `{`) end on their
/// own line.
pub fn brace_block_end(lines: &[String], start: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;

    for (idx, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                ';' if !opened && depth == 0 => return idx,
                _ => {}
            }
        }
        if !opened && line.contains("=>") {
            return if line.trim_end().ends_with(';') { idx } else { (idx + 1).min(lines.len() - 1) };
        }
        if opened && depth <= 0 {
            return idx;
        }
    }
    lines.len().saturating_sub(1)
}

/// Call sites in a code fragment as `(callee, receiver)`, skipping
/// keywords and anything listed in `ignore`.
pub fn calls<'t>(code: &'t str, ignore: &[&str]) -> Vec<(&'t str, Option<&'t str>)> {
    CALL.captures_iter(code)
        .filter_map(|cap| {
            let callee = cap.get(2)?.as_str();
            if ignore.iter().any(|k| k.eq_ignore_ascii_case(callee)) {
                return None;
            }
            // `new Foo(` is construction, handled separately
            let before = code[..cap.get(0)?.start()].trim_end();
            if before.ends_with("new") || before.ends_with("New") {
                return None;
            }
            Some((callee, cap.get(1).map(|r| r.as_str())))
        })
        .collect()
}

/// Contiguous comment lines directly above `idx` that start with `prefix`,
/// with XML doc tags removed.
pub fn doc_above(lines: &[String], idx: usize, prefix: &str) -> Option<String> {
    let mut collected = Vec::new();
    for line in lines[..idx].iter().rev() {
        let trimmed = line.trim();
        if trimmed.starts_with('<') && prefix == "'''" {
            // VB attribute line between doc and declaration
            continue;
        }
        if trimmed.starts_with('@') && prefix == "///" {
            continue;
        }
        match trimmed.strip_prefix(prefix) {
            Some(text) => collected.push(text.trim().to_string()),
            None => break,
        }
    }
    collected.reverse();
    let text = collected.join(" ");
    let text = XML_TAG.replace_all(&text, "");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

static XML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());
