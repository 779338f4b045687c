//! Code elements: the structural units discovered in a source file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of structural unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    File,
    Class,
    Interface,
    Method,
    Property,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "File"),
            Self::Class => write!(f, "Class"),
            Self::Interface => write!(f, "Interface"),
            Self::Method => write!(f, "Method"),
            Self::Property => write!(f, "Property"),
        }
    }
}

/// A discovered structural unit (file, class, interface, method, property).
///
/// Nested elements are named `Parent.Child`. Names are only unique within
/// their parent scope; there is no separate identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeElement {
    pub kind: ElementKind,

    /// Qualified name (`Outer.Inner.Method`).
    pub name: String,

    /// Owning file path (the caller's logical path, never a temp path).
    pub file_path: String,

    /// Source text of the element.
    pub content: String,

    /// 1-based start line.
    pub line_number: usize,

    /// Purpose/summary, usually taken from doc comments.
    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub signature: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Names this element depends on (injected types, packages, imports).
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,

    /// Logical grouping label.
    pub context: String,
}

impl CodeElement {
    pub fn new(
        kind: ElementKind,
        name: impl Into<String>,
        file_path: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            file_path: file_path.into(),
            content: String::new(),
            line_number: 1,
            summary: String::new(),
            signature: String::new(),
            tags: Vec::new(),
            dependencies: Vec::new(),
            metadata: BTreeMap::new(),
            context: context.into(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line_number = line;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add a tag unless it is already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    /// Record a dependency name unless it is already present.
    pub fn add_dependency(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
