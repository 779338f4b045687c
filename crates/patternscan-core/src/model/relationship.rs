//! Typed, directed edges between element names.
//!
//! Targets are free-text symbol references. They are not resolved against the
//! known elements, so cross-file and unresolved references are expected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipKind {
    Imports,
    Inherits,
    Implements,
    Defines,
    Uses,
    Injects,
    Calls,
    AcceptsType,
    ReturnsType,
    HasType,
    HasAttribute,
    Catches,
    Throws,
    UsesGeneric,
    Contains,
}

impl RelationshipKind {
    /// Upper-case relation name, as used by graph stores.
    pub fn relation_name(&self) -> &'static str {
        match self {
            Self::Imports => "IMPORTS",
            Self::Inherits => "INHERITS",
            Self::Implements => "IMPLEMENTS",
            Self::Defines => "DEFINES",
            Self::Uses => "USES",
            Self::Injects => "INJECTS",
            Self::Calls => "CALLS",
            Self::AcceptsType => "ACCEPTS_TYPE",
            Self::ReturnsType => "RETURNS_TYPE",
            Self::HasType => "HAS_TYPE",
            Self::HasAttribute => "HAS_ATTRIBUTE",
            Self::Catches => "CATCHES",
            Self::Throws => "THROWS",
            Self::UsesGeneric => "USES_GENERIC",
            Self::Contains => "CONTAINS",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.relation_name())
    }
}

/// A directed edge `from -> to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub kind: RelationshipKind,
    pub context: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Relationship {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: RelationshipKind,
        context: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            context: context.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_line(self, line: usize) -> Self {
        self.with_property("line_number", line)
    }
}
