//! Parse result: the unit of output for one file.

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::element::{CodeElement, ElementKind};
use super::pattern::CodePattern;
use super::relationship::{Relationship, RelationshipKind};

/// Metadata key under which the file element carries the file's patterns.
pub const PATTERNS_METADATA_KEY: &str = "detected_patterns";

/// Result of parsing a file or code string.
///
/// Partial results are kept: anything extracted before a failure stays in
/// the lists, and the failure is recorded in `errors`.
#[derive(Debug, Default, Clone)]
pub struct ParseResult {
    /// Logical path of the parsed file.
    pub file_path: String,

    /// Extracted elements; the file element comes first.
    pub elements: Vec<CodeElement>,

    /// Extracted edges, unordered. Duplicates are allowed.
    pub relationships: Vec<Relationship>,

    /// Detector findings.
    pub patterns: Vec<CodePattern>,

    errors: Vec<String>,
}

impl ParseResult {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    /// A result holding a single error and nothing else.
    pub fn failed(file_path: impl Into<String>, error: impl std::fmt::Display) -> Self {
        let mut result = Self::new(file_path);
        result.add_error(error);
        result
    }

    /// `true` iff no errors were recorded.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn add_error(&mut self, error: impl std::fmt::Display) {
        self.errors.push(error.to_string());
    }

    pub fn add_element(&mut self, element: CodeElement) {
        self.elements.push(element);
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    pub fn add_patterns(&mut self, patterns: impl IntoIterator<Item = CodePattern>) {
        self.patterns.extend(patterns);
    }

    /// Append everything from `other`, including its errors.
    pub fn merge(&mut self, other: ParseResult) {
        self.elements.extend(other.elements);
        self.relationships.extend(other.relationships);
        self.patterns.extend(other.patterns);
        self.errors.extend(other.errors);
    }

    pub fn file_element(&self) -> Option<&CodeElement> {
        self.elements.iter().find(|e| e.kind == ElementKind::File)
    }

    pub fn file_element_mut(&mut self) -> Option<&mut CodeElement> {
        self.elements.iter_mut().find(|e| e.kind == ElementKind::File)
    }

    pub fn element(&self, name: &str) -> Option<&CodeElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn elements_of_kind(&self, kind: ElementKind) -> impl Iterator<Item = &CodeElement> {
        self.elements.iter().filter(move |e| e.kind == kind)
    }

    pub fn relationships_of_kind(
        &self,
        kind: RelationshipKind,
    ) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }

    /// Check for an edge `from -kind-> to`.
    pub fn has_relationship(&self, from: &str, to: &str, kind: RelationshipKind) -> bool {
        self.relationships
            .iter()
            .any(|r| r.kind == kind && r.from == from && r.to == to)
    }

    pub fn patterns_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CodePattern> {
        self.patterns.iter().filter(move |p| p.name == name)
    }

    /// Replace every occurrence of `from` as a file path with `to`.
    ///
    /// Used after a path-only parser ran against a temporary copy. Element
    /// names and edge endpoints that were derived from the temp path are
    /// rewritten too.
    pub fn rewrite_file_path(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        self.file_path = to.to_string();
        for element in &mut self.elements {
            if element.file_path == from {
                element.file_path = to.to_string();
            }
            if element.name == from {
                element.name = to.to_string();
            }
        }
        for relationship in &mut self.relationships {
            if relationship.from == from {
                relationship.from = to.to_string();
            }
            if relationship.to == from {
                relationship.to = to.to_string();
            }
        }
        for pattern in &mut self.patterns {
            if pattern.file_path == from {
                pattern.file_path = to.to_string();
            }
        }
        for error in &mut self.errors {
            if error.contains(from) {
                *error = error.replace(from, to);
            }
        }
    }

    /// Copy the top-level patterns onto the file element's metadata.
    pub fn attach_patterns_to_file_element(&mut self) {
        let patterns = match serde_json::to_value(&self.patterns) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %self.file_path, error = %e, "failed to serialize patterns");
                return;
            }
        };
        if let Some(file) = self.file_element_mut() {
            file.metadata.insert(PATTERNS_METADATA_KEY.to_string(), patterns);
        }
    }

    /// Get statistics about the parse result.
    pub fn stats(&self) -> ParseStats {
        let mut stats = ParseStats::default();

        for element in &self.elements {
            *stats.elements.entry(element.kind).or_insert(0) += 1;
        }
        for relationship in &self.relationships {
            *stats.relationships.entry(relationship.kind).or_insert(0) += 1;
        }
        for pattern in &self.patterns {
            if pattern.is_positive {
                stats.positive_patterns += 1;
            } else {
                stats.negative_patterns += 1;
            }
        }

        stats.errors = self.errors.len();
        stats
    }
}

impl Serialize for ParseResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ParseResult", 6)?;
        state.serialize_field("file_path", &self.file_path)?;
        state.serialize_field("elements", &self.elements)?;
        state.serialize_field("relationships", &self.relationships)?;
        state.serialize_field("patterns", &self.patterns)?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("success", &self.success())?;
        state.end()
    }
}

/// Statistics about a parse result.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParseStats {
    pub elements: BTreeMap<ElementKind, usize>,
    pub relationships: BTreeMap<RelationshipKind, usize>,
    pub positive_patterns: usize,
    pub negative_patterns: usize,
    pub errors: usize,
}

impl ParseStats {
    pub fn element_count(&self, kind: ElementKind) -> usize {
        self.elements.get(&kind).copied().unwrap_or(0)
    }

    pub fn relationship_count(&self, kind: RelationshipKind) -> usize {
        self.relationships.get(&kind).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for ParseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Elements:")?;
        for (kind, count) in &self.elements {
            writeln!(f, "  {:<10} {}", kind.to_string(), count)?;
        }
        writeln!(f, "Relationships:")?;
        for (kind, count) in &self.relationships {
            writeln!(f, "  {:<14} {}", kind.relation_name(), count)?;
        }
        writeln!(
            f,
            "Patterns: {} positive, {} negative",
            self.positive_patterns, self.negative_patterns
        )?;
        if self.errors > 0 {
            writeln!(f, "Errors: {}", self.errors)?;
        }
        Ok(())
    }
}
