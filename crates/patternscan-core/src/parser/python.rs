//! Python parser.
//!
//! The AST comes from a process-wide [`PythonRuntime`]. The runtime is
//! bootstrapped once, never torn down, and holds no lock once bootstrap
//! returns. Every parse takes the runtime's mutex for exactly one call into
//! the grammar; walking the returned tree happens outside the lock, so
//! concurrent parses only serialize on tree construction.
//!
//! Unlike the other tree-sitter languages a tree containing `ERROR` nodes is
//! a terminal syntax error: the file element is returned on its own.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tree_sitter::{Node, Parser as TSParser, Tree};

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::traits::{AstProvider, Parser};
use super::treesitter::{first_error_line, walk_tree, TreeSitterProvider};
use super::types::{base_name, TypeSystem};
use crate::config::ScanConfig;
use crate::detectors::{python, DetectorBank};
use crate::error::ParseError;
use crate::model::{CodeElement, ElementKind, ParseResult, RelationshipKind};

static RUNTIME: OnceCell<PythonRuntime> = OnceCell::new();

/// Process-wide Python AST provider.
pub struct PythonRuntime {
    parser: Result<Mutex<TSParser>, String>,
}

impl PythonRuntime {
    /// The shared runtime, bootstrapped on first use.
    pub fn global() -> &'static PythonRuntime {
        RUNTIME.get_or_init(Self::bootstrap)
    }

    fn bootstrap() -> Self {
        let mut parser = TSParser::new();
        let parser = match parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
            Ok(()) => Ok(Mutex::new(parser)),
            Err(e) => {
                tracing::warn!(error = %e, "python runtime bootstrap failed");
                Err(format!("Python runtime unavailable: {}", e))
            }
        };
        tracing::debug!("python runtime bootstrapped");
        Self { parser }
    }

    /// Build a tree for `content`; syntax errors are reported against `path`.
    pub fn parse(&self, path: &str, content: &str) -> Result<Tree, ParseError> {
        let parser = self
            .parser
            .as_ref()
            .map_err(|e| ParseError::Provider(e.clone()))?;

        let tree = {
            let mut guard = parser.lock();
            guard.reset();
            guard.parse(content, None)
        }
        .ok_or_else(|| ParseError::Provider("Python runtime returned no tree".to_string()))?;

        match first_error_line(&tree) {
            Some(line) => Err(ParseError::Syntax {
                path: path.to_string(),
                line,
                message: "invalid syntax".to_string(),
            }),
            None => Ok(tree),
        }
    }
}

impl AstProvider for PythonRuntime {
    fn language_name(&self) -> &'static str {
        "Python"
    }

    fn parse_tree(&self, content: &str) -> Result<Tree, ParseError> {
        self.parse("<memory>", content)
    }
}

/// Python language parser.
pub struct PythonParser {
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl PythonParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            resolver: ContextResolver::new(&config.context),
            banks: vec![python::bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for PythonParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, "Python");
        if session.cancelled(cancel) {
            return session.finish();
        }

        let tree = match PythonRuntime::global().parse(path, content) {
            Ok(tree) => tree,
            Err(e) => {
                if let ParseError::Syntax { line, .. } = &e {
                    session.flag_syntax_errors(*line);
                }
                session.fail(e);
                return session.finish();
            }
        };

        let context = session.context.clone();
        session.extract("Python declarations", |result| {
            let mut walker = Walker {
                source: content,
                out: Emitter::new(path, &context, TypeSystem::Python, result),
            };
            walker.walk(&tree.root_node(), path, None);
        });

        session.detect(&self.banks, Some(&tree), None, self.snippet_lines);
        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "Python"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["py"]
    }
}

struct Walker<'a, 'r> {
    source: &'a str,
    out: Emitter<'a, 'r>,
}

impl<'a, 'r> Walker<'a, 'r> {
    fn text(&self, node: &Node) -> &'a str {
        TreeSitterProvider::node_text(node, self.source)
    }

    /// `owner` is the enclosing class or the file; `member` the enclosing
    /// function, if any.
    fn walk(&mut self, node: &Node, owner: &str, member: Option<&str>) {
        walk_tree(node, |n| self.visit(n, owner, member));
    }

    /// Handles one node and returns whether its children still need a walk.
    fn visit(&mut self, node: &Node, owner: &str, member: Option<&str>) -> bool {
        match (node.kind(), member) {
            ("import_statement", _) => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    let module = match name.kind() {
                        "aliased_import" => name.child_by_field_name("name").unwrap_or(name),
                        _ => name,
                    };
                    self.import(&module);
                }
            }
            ("import_from_statement", _) => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    self.import(&module);
                }
            }
            ("class_definition", None) => self.visit_class(node, owner),
            ("function_definition", None) => self.visit_function(node, owner),
            ("call", Some(member)) => {
                self.visit_call(node, member);
                return true;
            }
            ("raise_statement", Some(member)) => {
                let raised = node
                    .named_child(0)
                    .map(|n| match n.kind() {
                        "call" => n.child_by_field_name("function").unwrap_or(n),
                        _ => n,
                    })
                    .filter(|n| matches!(n.kind(), "identifier" | "attribute"));
                if let Some(raised) = raised {
                    let ty = self.text(&raised);
                    self.out.edge(member, ty, RelationshipKind::Throws, TreeSitterProvider::node_line(node));
                }
                return true;
            }
            ("except_clause", Some(member)) => {
                self.visit_except(node, member);
                return true;
            }
            _ => return true,
        }
        false
    }

    fn import(&mut self, module: &Node) {
        let name = self.text(module);
        let path = self.out.path;
        self.out
            .edge(path, name, RelationshipKind::Imports, TreeSitterProvider::node_line(module));
    }

    /// The declaration including its decorators, when it has any.
    fn outer<'t>(node: &Node<'t>) -> Node<'t> {
        match node.parent() {
            Some(parent) if parent.kind() == "decorated_definition" => parent,
            _ => *node,
        }
    }

    fn declaration(&self, kind: ElementKind, name: &str, node: &Node) -> CodeElement {
        let outer = Self::outer(node);
        let mut element = self
            .out
            .element(kind, name, TreeSitterProvider::node_line(&outer))
            .with_content(self.text(&outer))
            .with_signature(TreeSitterProvider::signature(node, self.source))
            .with_metadata("end_line", TreeSitterProvider::node_end_line(node));
        if let Some(doc) = node.child_by_field_name("body").and_then(|b| self.docstring(&b)) {
            element = element.with_summary(doc);
        }
        element
    }

    /// First statement of a block when it is a bare string literal.
    fn docstring(&self, body: &Node) -> Option<String> {
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = first.named_child(0).filter(|n| n.kind() == "string")?;
        let text = self
            .text(&string)
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_matches(|c| c == '"' || c == '\'')
            .trim();
        let summary = text
            .lines()
            .map(str::trim)
            .take_while(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!summary.is_empty()).then_some(summary)
    }

    /// Decorator names applied to `node`, emitted as `HasAttribute` edges.
    fn decorators(&mut self, node: &Node, target: &str) -> Vec<&'a str> {
        let outer = Self::outer(node);
        if outer.id() == node.id() {
            return Vec::new();
        }
        let mut names = Vec::new();
        for decorator in TreeSitterProvider::children_of_kind(&outer, "decorator") {
            let name = base_name(self.text(&decorator).trim_start_matches('@').trim());
            self.out.edge(
                target,
                name,
                RelationshipKind::HasAttribute,
                TreeSitterProvider::node_line(&decorator),
            );
            names.push(name);
        }
        names
    }

    fn visit_class(&mut self, node: &Node, owner: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.out.qualify(owner, self.text(&name_node));
        let mut element = self.declaration(ElementKind::Class, &name, node);

        let mut bases = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                if matches!(base.kind(), "identifier" | "attribute" | "subscript") {
                    bases.push(base);
                }
            }
        }
        for base in &bases {
            match base_name(self.text(base)) {
                "ABC" | "Protocol" => element.add_tag("abstract"),
                "Enum" | "IntEnum" | "StrEnum" => element.add_tag("enum"),
                _ => {}
            }
        }

        self.out.define(owner, element);
        self.decorators(node, &name);

        for base in bases {
            let text = self.text(&base);
            let line = TreeSitterProvider::node_line(&base);
            self.out.edge(&name, base_name(text), RelationshipKind::Inherits, line);
            if base.kind() == "subscript" {
                if let Some(args) = base.child_by_field_name("subscript") {
                    let args = self.text(&args);
                    self.out.type_edges(&name, args, RelationshipKind::UsesGeneric, line);
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.class_body(&body, &name);
        }
    }

    fn class_body(&mut self, body: &Node, class: &str) {
        let mut cursor = body.walk();
        for statement in body.named_children(&mut cursor) {
            match statement.kind() {
                "expression_statement" => {
                    let assignment = statement
                        .named_child(0)
                        .filter(|n| n.kind() == "assignment");
                    if let Some(assignment) = assignment {
                        self.visit_field(&assignment, class);
                    }
                }
                "decorated_definition" => {
                    if let Some(definition) = statement.child_by_field_name("definition") {
                        self.walk(&definition, class, None);
                    }
                }
                _ => self.walk(&statement, class, None),
            }
        }
    }

    /// Class-level `name: Type [= value]`.
    fn visit_field(&mut self, assignment: &Node, class: &str) {
        let Some(left) = assignment.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }
        let name = self.out.qualify(class, self.text(&left));
        let element = self.declaration(ElementKind::Property, &name, assignment);
        self.out.define(class, element);

        if let Some(ty) = assignment.child_by_field_name("type") {
            let ty = self.text(&ty);
            self.out.type_edges(&name, ty, RelationshipKind::HasType, TreeSitterProvider::node_line(assignment));
        }
    }

    fn visit_function(&mut self, node: &Node, owner: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let simple = self.text(&name_node);
        let name = self.out.qualify(owner, simple);
        let in_class = owner != self.out.path;
        let is_constructor = in_class && simple == "__init__";

        let mut element = self.declaration(ElementKind::Method, &name, node);
        if TreeSitterProvider::child_of_kind(node, "async").is_some() {
            element.add_tag("async");
        }
        if is_constructor {
            element.add_tag("constructor");
        } else if simple.starts_with('_') && !simple.ends_with("__") {
            element.add_tag("private");
        }
        if !in_class {
            element.add_tag("function");
        }
        self.out.define(owner, element);

        let decorators = self.decorators(node, &name);
        if in_class && decorators.contains(&"property") {
            if let Some(element) = self.out.result.elements.last_mut() {
                if element.name == name {
                    element.kind = ElementKind::Property;
                }
            }
        }

        self.parameters(node, &name, is_constructor.then_some(owner));

        if let Some(returns) = node.child_by_field_name("return_type") {
            let returns = self.text(&returns);
            self.out.type_edges(&name, returns, RelationshipKind::ReturnsType, TreeSitterProvider::node_line(node));
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.walk_body(&body, owner, &name);
        }
    }

    /// Walk a function body for calls and exceptions. Nested functions and
    /// classes are not elements of their own; their bodies count toward the
    /// enclosing function.
    fn walk_body(&mut self, body: &Node, owner: &str, member: &str) {
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            match child.kind() {
                "function_definition" | "class_definition" => {
                    if let Some(inner) = child.child_by_field_name("body") {
                        self.walk_body(&inner, owner, member);
                    }
                }
                _ => self.walk(&child, owner, Some(member)),
            }
        }
    }

    /// Typed parameters become `AcceptsType`; on `__init__` they are also
    /// injected into the class.
    fn parameters(&mut self, function: &Node, name: &str, injects_into: Option<&str>) {
        let Some(params) = function.child_by_field_name("parameters") else {
            return;
        };
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            if !matches!(param.kind(), "typed_parameter" | "typed_default_parameter") {
                continue;
            }
            let Some(ty) = param.child_by_field_name("type") else {
                continue;
            };
            let param_name = param
                .child_by_field_name("name")
                .or_else(|| param.named_child(0))
                .map(|n| self.text(&n))
                .unwrap_or_default();
            let type_text = self.text(&ty);
            let line = TreeSitterProvider::node_line(&param);

            let type_ref = super::types::split_type(type_text, TypeSystem::Python);
            let outer = self.out.type_edges(name, type_text, RelationshipKind::AcceptsType, line);

            // Optional[Service] injects Service
            let injected = outer.or_else(|| type_ref.generic_args.first().cloned());
            if let (Some(class), Some(injected)) = (injects_into, injected) {
                self.out
                    .edge(class, &injected, RelationshipKind::Injects, line)
                    .properties
                    .insert("parameter".to_string(), param_name.into());
                self.out.add_dependency(class, &injected);
            }
        }
    }

    fn visit_call(&mut self, node: &Node, member: &str) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let (callee, receiver) = match function.kind() {
            "attribute" => (
                function.child_by_field_name("attribute").map(|a| self.text(&a)),
                function.child_by_field_name("object").map(|o| self.text(&o)),
            ),
            "identifier" => (Some(self.text(&function)), None),
            _ => (None, None),
        };
        let Some(callee) = callee else {
            return;
        };

        let line = TreeSitterProvider::node_line(node);
        let starts_upper = callee.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        // `Foo()` constructs; Python has no `new`
        let kind = if starts_upper && receiver.is_none() {
            RelationshipKind::Uses
        } else {
            RelationshipKind::Calls
        };
        let edge = self.out.edge(member, callee, kind, line);
        if let Some(receiver) = receiver {
            edge.properties.insert("receiver".to_string(), receiver.into());
        }
    }

    fn visit_except(&mut self, node: &Node, member: &str) {
        let Some(first) = node.named_child(0).filter(|n| n.kind() != "block") else {
            return;
        };
        let caught = match first.kind() {
            "as_pattern" => first.named_child(0).unwrap_or(first),
            _ => first,
        };
        let line = TreeSitterProvider::node_line(node);
        let types: Vec<Node> = match caught.kind() {
            "tuple" | "parenthesized_expression" => {
                let mut cursor = caught.walk();
                caught.named_children(&mut cursor).collect()
            }
            _ => vec![caught],
        };
        for ty in types {
            if matches!(ty.kind(), "identifier" | "attribute") {
                let ty = self.text(&ty);
                self.out.edge(member, ty, RelationshipKind::Catches, line);
            }
        }
    }
}
