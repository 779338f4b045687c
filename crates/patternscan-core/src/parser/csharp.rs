//! C# parser using tree-sitter.

use tokio_util::sync::CancellationToken;
use tree_sitter::Node;

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::traits::{AstProvider, Parser};
use super::treesitter::{extract_doc_comment, first_error_line, walk_tree, TreeSitterProvider};
use super::types::{base_name, is_interface_name, split_type, TypeSystem};
use crate::config::ScanConfig;
use crate::detectors::{csharp, DetectorBank};
use crate::model::{CodeElement, ElementKind, ParseResult, RelationshipKind};

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "struct_declaration",
    "record_declaration",
    "record_struct_declaration",
    "interface_declaration",
    "enum_declaration",
];

/// C# language parser.
pub struct CSharpParser {
    provider: TreeSitterProvider,
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl CSharpParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            provider: TreeSitterProvider::new(tree_sitter_c_sharp::LANGUAGE.into(), "C#"),
            resolver: ContextResolver::new(&config.context),
            banks: vec![csharp::bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }
}

impl Default for CSharpParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for CSharpParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, "C#");
        if session.cancelled(cancel) {
            return session.finish();
        }

        let tree = match self.provider.parse_tree(content) {
            Ok(tree) => tree,
            Err(e) => {
                session.fail(e);
                return session.finish();
            }
        };
        if let Some(line) = first_error_line(&tree) {
            session.flag_syntax_errors(line);
        }

        let context = session.context.clone();
        session.extract("C# declarations", |result| {
            let mut walker = Walker {
                source: content,
                out: Emitter::new(path, &context, TypeSystem::CSharp, result),
            };
            walker.walk(&tree.root_node(), path, None);
        });

        session.detect(&self.banks, Some(&tree), None, self.snippet_lines);
        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "C#"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["cs"]
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

    /// `owner` is the lexical parent: the file path or a type name.
    fn walk(&mut self, node: &Node, owner: &str, member: Option<&str>) {
        walk_tree(node, |n| self.visit(n, owner, member));
    }

    /// Handles one node and returns whether its children still need a walk.
    fn visit(&mut self, node: &Node, owner: &str, member: Option<&str>) -> bool {
        match (node.kind(), member) {
            ("using_directive", _) => self.visit_using(node),
            (kind, _) if TYPE_DECLARATIONS.contains(&kind) => self.visit_type(node, owner),
            ("method_declaration" | "constructor_declaration", _) => self.visit_method(node, owner),
            ("property_declaration", _) => self.visit_property(node, owner),
            ("invocation_expression", Some(member)) => {
                self.visit_invocation(node, member);
                return true;
            }
            ("object_creation_expression", Some(member)) => {
                if let Some(ty) = node.child_by_field_name("type") {
                    let ty = self.text(&ty);
                    self.out.type_edges(member, ty, RelationshipKind::Uses, TreeSitterProvider::node_line(node));
                }
                return true;
            }
            ("throw_statement" | "throw_expression", Some(member)) => {
                let created = TreeSitterProvider::child_of_kind(node, "object_creation_expression")
                    .and_then(|c| c.child_by_field_name("type"));
                if let Some(ty) = created {
                    let thrown = base_name(self.text(&ty));
                    self.out.edge(member, thrown, RelationshipKind::Throws, TreeSitterProvider::node_line(node));
                }
                return true;
            }
            ("catch_declaration", Some(member)) => {
                if let Some(ty) = node.child_by_field_name("type") {
                    let caught = base_name(self.text(&ty));
                    self.out.edge(member, caught, RelationshipKind::Catches, TreeSitterProvider::node_line(node));
                }
            }
            _ => return true,
        }
        false
    }

    fn walk_children(&mut self, node: &Node, owner: &str, member: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(&child, owner, member);
        }
    }

    fn visit_using(&mut self, node: &Node) {
        let text = self.text(node).trim().trim_end_matches(';');
        let text = text.strip_prefix("global").unwrap_or(text).trim_start();
        let text = text.strip_prefix("using").unwrap_or(text).trim_start();
        let text = text.strip_prefix("static ").unwrap_or(text).trim();
        let target = text.rsplit('=').next().unwrap_or(text).trim();
        if !target.is_empty() {
            let path = self.out.path;
            self.out.edge(path, target, RelationshipKind::Imports, TreeSitterProvider::node_line(node));
        }
    }

    fn attributes(&mut self, decl: &Node, owner: &str) {
        for list in TreeSitterProvider::children_of_kind(decl, "attribute_list") {
            for attribute in TreeSitterProvider::children_of_kind(&list, "attribute") {
                let Some(name) = attribute.child_by_field_name("name") else {
                    continue;
                };
                let name = self.text(&name);
                let name = name.strip_suffix("Attribute").unwrap_or(name);
                self.out.edge(owner, name, RelationshipKind::HasAttribute, TreeSitterProvider::node_line(&attribute));
            }
        }
    }

    /// Element for a declaration with content, signature, doc summary and modifiers.
    fn declaration(&self, kind: ElementKind, name: &str, node: &Node) -> CodeElement {
        let mut element = self
            .out
            .element(kind, name, TreeSitterProvider::node_line(node))
            .with_content(self.text(node))
            .with_signature(TreeSitterProvider::signature(node, self.source))
            .with_metadata("end_line", TreeSitterProvider::node_end_line(node));
        for modifier in TreeSitterProvider::children_of_kind(node, "modifier") {
            element.add_tag(self.text(&modifier));
        }
        if let Some(summary) = extract_doc_comment(node, self.source) {
            element = element.with_summary(summary);
        }
        element
    }

    fn base_list<'t>(&self, decl: &Node<'t>) -> Vec<Node<'t>> {
        let list = TreeSitterProvider::field(decl, &["bases"])
            .or_else(|| TreeSitterProvider::child_of_kind(decl, "base_list"));
        let Some(list) = list else {
            return Vec::new();
        };
        let mut cursor = list.walk();
        let bases = list.named_children(&mut cursor).collect();
        bases
    }

    /// Dotted name of the namespaces enclosing `node`, outermost first.
    fn namespace_of(&self, node: &Node) -> Option<String> {
        let mut names = Vec::new();
        let mut file_scoped = false;
        let mut current = node.parent();
        while let Some(ancestor) = current {
            match ancestor.kind() {
                "namespace_declaration" | "file_scoped_namespace_declaration" => {
                    file_scoped |= ancestor.kind() == "file_scoped_namespace_declaration";
                    if let Some(name) = ancestor.child_by_field_name("name") {
                        names.push(self.text(&name));
                    }
                }
                // newer grammars make the file-scoped namespace a sibling of the types
                "compilation_unit" if !file_scoped => {
                    let scoped = TreeSitterProvider::child_of_kind(&ancestor, "file_scoped_namespace_declaration")
                        .and_then(|n| n.child_by_field_name("name"));
                    if let Some(name) = scoped {
                        names.push(self.text(&name));
                    }
                }
                _ => {}
            }
            current = ancestor.parent();
        }
        if names.is_empty() {
            return None;
        }
        names.reverse();
        Some(names.join("."))
    }

    fn visit_type(&mut self, node: &Node, owner: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.out.qualify(owner, self.text(&name_node));
        let is_interface = node.kind() == "interface_declaration";
        let kind = if is_interface {
            ElementKind::Interface
        } else {
            ElementKind::Class
        };

        let mut element = self
            .declaration(kind, &name, node)
            .with_tag(node.kind().trim_end_matches("_declaration"));
        if let Some(namespace) = self.namespace_of(node) {
            element = element.with_metadata("namespace", namespace);
        }
        self.out.define(owner, element);
        self.attributes(node, &name);

        if node.kind() != "enum_declaration" {
            for base in self.base_list(node) {
                // primary-constructor bases carry their argument list
                let base_text = match base.kind() {
                    "primary_constructor_base_type" => base
                        .child_by_field_name("type")
                        .map(|t| self.text(&t))
                        .unwrap_or_else(|| self.text(&base)),
                    _ => self.text(&base),
                };
                let target = base_name(base_text);
                let relation = if !is_interface && is_interface_name(target) {
                    RelationshipKind::Implements
                } else {
                    RelationshipKind::Inherits
                };
                let line = TreeSitterProvider::node_line(&base);
                self.out.edge(&name, target, relation, line);
                for arg in split_type(base_text, TypeSystem::CSharp).generic_args {
                    self.out.edge(&name, &arg, RelationshipKind::UsesGeneric, line);
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.walk_children(&body, &name, None);
        }
    }

    fn visit_method(&mut self, node: &Node, owner: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.out.qualify(owner, self.text(&name_node));
        let line = TreeSitterProvider::node_line(node);
        let is_constructor = node.kind() == "constructor_declaration";

        let mut element = self.declaration(ElementKind::Method, &name, node);
        if is_constructor {
            element.add_tag("constructor");
        }
        self.out.define(owner, element);
        self.attributes(node, &name);

        if let Some(params) = node.child_by_field_name("parameters") {
            for param in TreeSitterProvider::children_of_kind(&params, "parameter") {
                let Some(ty) = param.child_by_field_name("type") else {
                    continue;
                };
                let type_text = self.text(&ty);
                let param_name = param
                    .child_by_field_name("name")
                    .map(|n| self.text(&n))
                    .unwrap_or_default();
                let param_line = TreeSitterProvider::node_line(&param);
                self.out.type_edges(&name, type_text, RelationshipKind::AcceptsType, param_line);

                if is_constructor {
                    self.injection(owner, type_text, param_name, param_line);
                }
            }
        }

        if let Some(returns) = TreeSitterProvider::field(node, &["returns", "type"]) {
            let returns = self.text(&returns);
            self.out.type_edges(&name, returns, RelationshipKind::ReturnsType, line);
        }

        let body_id = node.child_by_field_name("body").map(|b| b.id());
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "arrow_expression_clause" || Some(child.id()) == body_id {
                self.walk(&child, owner, Some(&name));
            }
        }
    }

    /// Constructor parameter as an `Injects` edge from the owning type.
    fn injection(&mut self, owner: &str, type_text: &str, param_name: &str, line: usize) {
        let Some(injected) = split_type(type_text, TypeSystem::CSharp).outer else {
            return;
        };
        let is_interface = is_interface_name(&injected);
        self.out
            .edge(owner, &injected, RelationshipKind::Injects, line)
            .properties
            .extend([
                ("parameter".to_string(), param_name.into()),
                ("is_interface".to_string(), is_interface.into()),
            ]);
        self.out.add_dependency(owner, &injected);
    }

    fn visit_property(&mut self, node: &Node, owner: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.out.qualify(owner, self.text(&name_node));
        let line = TreeSitterProvider::node_line(node);

        let element = self.declaration(ElementKind::Property, &name, node);
        self.out.define(owner, element);
        self.attributes(node, &name);

        if let Some(ty) = node.child_by_field_name("type") {
            let ty = self.text(&ty);
            self.out.type_edges(&name, ty, RelationshipKind::HasType, line);
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if matches!(child.kind(), "accessor_list" | "arrow_expression_clause") {
                self.walk(&child, owner, Some(&name));
            }
        }
    }

    fn visit_invocation(&mut self, node: &Node, member: &str) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };

        let (callee, receiver) = match function.kind() {
            "member_access_expression" => (
                function.child_by_field_name("name").map(|n| self.text(&n)),
                function.child_by_field_name("expression").map(|e| self.text(&e)),
            ),
            "identifier" | "generic_name" => (Some(self.text(&function)), None),
            _ => (None, None),
        };
        let Some(callee) = callee.map(base_name).filter(|c| !c.is_empty()) else {
            return;
        };

        let edge = self
            .out
            .edge(member, callee, RelationshipKind::Calls, TreeSitterProvider::node_line(node));
        if let Some(receiver) = receiver {
            edge.properties.insert("receiver".to_string(), receiver.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        CSharpParser::default().parse_file("src/Shop/Foo.cs", source, None, &CancellationToken::new())
    }

    #[test]
    fn test_end_to_end_example() {
        let source = "public class Foo : IBar { public void Do() { try { Bar(); } catch (InvalidOperationException e) { throw new ArgumentException(); } } }";
        let result = parse(source);

        assert!(result.success(), "{:?}", result.errors());
        assert_eq!(result.elements[0].kind, ElementKind::File);
        assert_eq!(result.element("Foo").unwrap().kind, ElementKind::Class);
        assert_eq!(result.element("Foo.Do").unwrap().kind, ElementKind::Method);
        assert!(result.has_relationship("Foo", "IBar", RelationshipKind::Implements));
        assert!(result.has_relationship("Foo.Do", "Bar", RelationshipKind::Calls));
        assert!(result.has_relationship(
            "Foo.Do",
            "InvalidOperationException",
            RelationshipKind::Catches
        ));
        assert!(result.has_relationship("Foo.Do", "ArgumentException", RelationshipKind::Throws));
    }

    #[test]
    fn test_defines_from_lexical_parent() {
        let result = parse("namespace Shop { class Outer { class Inner { void Run() {} } } }");
        assert!(result.has_relationship("src/Shop/Foo.cs", "Outer", RelationshipKind::Defines));
        assert!(result.has_relationship("Outer", "Outer.Inner", RelationshipKind::Defines));
        assert!(result.has_relationship("Outer.Inner", "Outer.Inner.Run", RelationshipKind::Defines));
        assert_eq!(result.element("Outer").unwrap().metadata["namespace"], "Shop");
        assert_eq!(result.element("Outer").unwrap().context, "Shop");
    }

    #[test]
    fn test_namespace_ends_with_its_block() {
        let result = parse("namespace A { class X {} namespace B { class Y {} } } class Z {}");
        assert_eq!(result.element("X").unwrap().metadata["namespace"], "A");
        assert_eq!(result.element("Y").unwrap().metadata["namespace"], "A.B");
        assert!(!result.element("Z").unwrap().metadata.contains_key("namespace"));

        let result = parse("namespace Shop.Api;\n\nclass Controller {}\nclass Filter {}");
        assert_eq!(result.element("Controller").unwrap().metadata["namespace"], "Shop.Api");
        assert_eq!(result.element("Filter").unwrap().metadata["namespace"], "Shop.Api");
    }

    #[test]
    fn test_long_expression_chain() {
        let chain = vec!["\"ab\""; 5_000].join(" + ");
        let source = format!("class Strings {{ string Build() {{ Log(); return {}; }} }}", chain);
        let result = parse(&source);

        assert!(result.element("Strings.Build").is_some());
        assert!(result.has_relationship("Strings.Build", "Log", RelationshipKind::Calls));
    }

    #[test]
    fn test_constructor_injection_and_types() {
        let source = r#"
using System.Collections.Generic;

public class OrderService : BaseService<Order>, IOrderService
{
    public OrderService(IOrderRepository repository, int retries) { }

    public Task<List<Order>> Find(string customer, Filter filter) => null;

    [JsonIgnore]
    public Customer Owner { get; set; }
}"#;
        let result = parse(source);

        assert!(result.has_relationship("src/Shop/Foo.cs", "System.Collections.Generic", RelationshipKind::Imports));
        assert!(result.has_relationship("OrderService", "BaseService", RelationshipKind::Inherits));
        assert!(result.has_relationship("OrderService", "Order", RelationshipKind::UsesGeneric));
        assert!(result.has_relationship("OrderService", "IOrderService", RelationshipKind::Implements));

        let inject = result
            .relationships_of_kind(RelationshipKind::Injects)
            .collect::<Vec<_>>();
        assert_eq!(inject.len(), 1);
        assert_eq!(inject[0].to, "IOrderRepository");
        assert_eq!(inject[0].properties["parameter"], "repository");
        assert_eq!(inject[0].properties["is_interface"], true);
        assert!(result
            .element("OrderService")
            .unwrap()
            .dependencies
            .contains(&"IOrderRepository".to_string()));

        assert!(result.has_relationship("OrderService.Find", "Filter", RelationshipKind::AcceptsType));
        assert!(!result
            .relationships
            .iter()
            .any(|r| r.to == "string" || r.to == "int"));
        assert!(result.has_relationship("OrderService.Find", "Task", RelationshipKind::ReturnsType));
        assert!(result.has_relationship("OrderService.Find", "Order", RelationshipKind::UsesGeneric));

        assert_eq!(result.element("OrderService.Owner").unwrap().kind, ElementKind::Property);
        assert!(result.has_relationship("OrderService.Owner", "Customer", RelationshipKind::HasType));
        assert!(result.has_relationship("OrderService.Owner", "JsonIgnore", RelationshipKind::HasAttribute));
    }

    #[test]
    fn test_interface_bases_are_inherits() {
        let result = parse("interface IA : IB { void M(); }");
        assert_eq!(result.element("IA").unwrap().kind, ElementKind::Interface);
        assert!(result.has_relationship("IA", "IB", RelationshipKind::Inherits));
        assert!(result.element("IA.M").is_some());
    }

    #[test]
    fn test_calls_record_receiver() {
        let result = parse("class A { void M() { _repo.Save(new Order()); } }");
        let call = result
            .relationships_of_kind(RelationshipKind::Calls)
            .find(|r| r.to == "Save")
            .unwrap();
        assert_eq!(call.properties["receiver"], "_repo");
        assert!(result.has_relationship("A.M", "Order", RelationshipKind::Uses));
    }

    #[test]
    fn test_syntax_errors_are_tolerated() {
        let result = parse("class A {\n void M( {\n}\n");
        assert!(result.success());
        assert_eq!(result.file_element().unwrap().metadata["has_syntax_errors"], true);
    }

    #[test]
    fn test_xml_doc_summary() {
        let result = parse("/// <summary>Places orders.</summary>\npublic class Orders { }");
        assert_eq!(result.element("Orders").unwrap().summary, "Places orders.");
    }

    #[test]
    fn test_cancelled_parse() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = CSharpParser::default().parse_file("A.cs", "class A {}", Some("x"), &cancel);
        assert!(!result.success());
        assert_eq!(result.elements.len(), 1);
    }
}
