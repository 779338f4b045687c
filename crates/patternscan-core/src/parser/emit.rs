//! Element and relationship emission shared by the language walkers.

use crate::model::{CodeElement, ElementKind, ParseResult, Relationship, RelationshipKind};

use super::types::{split_type, TypeSystem};

/// Appends IR for one file, stamping path and context on everything.
pub struct Emitter<'a, 'r> {
    pub path: &'a str,
    pub context: &'a str,
    pub types: TypeSystem,
    pub result: &'r mut ParseResult,
}

impl<'a, 'r> Emitter<'a, 'r> {
    pub fn new(path: &'a str, context: &'a str, types: TypeSystem, result: &'r mut ParseResult) -> Self {
        Self {
            path,
            context,
            types,
            result,
        }
    }

    /// A new element for this file.
    pub fn element(&self, kind: ElementKind, name: &str, line: usize) -> CodeElement {
        CodeElement::new(kind, name, self.path, self.context).at_line(line)
    }

    /// Add `element` with the `Defines` edge from its lexical parent.
    pub fn define(&mut self, owner: &str, element: CodeElement) {
        let line = element.line_number;
        let name = element.name.clone();
        self.result.add_element(element);
        self.edge(owner, &name, RelationshipKind::Defines, line);
    }

    pub fn edge(&mut self, from: &str, to: &str, kind: RelationshipKind, line: usize) -> &mut Relationship {
        self.result
            .add_relationship(Relationship::new(from, to, kind, self.context).with_line(line));
        let last = self.result.relationships.len() - 1;
        &mut self.result.relationships[last]
    }

    /// Outer type as `kind`, generic arguments as `UsesGeneric`; built-ins
    /// are skipped. Returns the outer type name when one was emitted.
    pub fn type_edges(
        &mut self,
        from: &str,
        type_text: &str,
        kind: RelationshipKind,
        line: usize,
    ) -> Option<String> {
        let type_ref = split_type(type_text, self.types);
        if let Some(outer) = &type_ref.outer {
            self.edge(from, outer, kind, line);
        }
        for arg in &type_ref.generic_args {
            self.edge(from, arg, RelationshipKind::UsesGeneric, line);
        }
        type_ref.outer
    }

    /// Record `dependency` on the most recent element named `owner`.
    pub fn add_dependency(&mut self, owner: &str, dependency: &str) {
        if let Some(element) = self
            .result
            .elements
            .iter_mut()
            .rev()
            .find(|e| e.name == owner)
        {
            element.add_dependency(dependency);
        }
    }

    /// Qualify `name` under `parent` (`Parent.Child`); top-level names
    /// (owned by the file) stay bare.
    pub fn qualify(&self, parent: &str, name: &str) -> String {
        if parent == self.path {
            name.to_string()
        } else {
            format!("{}.{}", parent, name)
        }
    }
}
