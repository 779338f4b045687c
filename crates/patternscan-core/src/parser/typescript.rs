//! TypeScript and JavaScript parser using tree-sitter.
//!
//! `.ts` uses the TypeScript grammar, `.tsx` the TSX grammar and the
//! JavaScript family (`.js`, `.jsx`, `.mjs`, `.cjs`) the JavaScript grammar.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tree_sitter::Node;

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::traits::{AstProvider, Parser};
use super::treesitter::{extract_doc_comment, first_error_line, walk_tree, TreeSitterProvider};
use super::types::{base_name, TypeSystem};
use crate::config::ScanConfig;
use crate::detectors::{typescript, DetectorBank};
use crate::model::{CodeElement, ElementKind, ParseResult, RelationshipKind};

/// TypeScript/JavaScript language parser.
pub struct TypeScriptParser {
    typescript: TreeSitterProvider,
    tsx: TreeSitterProvider,
    javascript: TreeSitterProvider,
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl TypeScriptParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            typescript: TreeSitterProvider::new(
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                "TypeScript",
            ),
            tsx: TreeSitterProvider::new(tree_sitter_typescript::LANGUAGE_TSX.into(), "TSX"),
            javascript: TreeSitterProvider::new(tree_sitter_javascript::LANGUAGE.into(), "JavaScript"),
            resolver: ContextResolver::new(&config.context),
            banks: vec![typescript::bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }

    fn provider_for(&self, path: &str) -> &TreeSitterProvider {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "ts" | "mts" | "cts" => &self.typescript,
            "tsx" => &self.tsx,
            _ => &self.javascript,
        }
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for TypeScriptParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let provider = self.provider_for(path);
        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, provider.language_name());
        if session.cancelled(cancel) {
            return session.finish();
        }

        let tree = match provider.parse_tree(content) {
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
        session.extract("TypeScript declarations", |result| {
            let mut walker = Walker {
                source: content,
                out: Emitter::new(path, &context, TypeSystem::TypeScript, result),
            };
            walker.walk(&tree.root_node(), path, None);
        });

        session.detect(&self.banks, Some(&tree), None, self.snippet_lines);
        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "TypeScript"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
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

    fn walk(&mut self, node: &Node, owner: &str, member: Option<&str>) {
        walk_tree(node, |n| self.visit(n, owner, member));
    }

    /// Handles one node and returns whether its children still need a walk.
    fn visit(&mut self, node: &Node, owner: &str, member: Option<&str>) -> bool {
        match (node.kind(), member) {
            ("import_statement", _) => {
                if let Some(source) = node.child_by_field_name("source") {
                    let module = self.text(&source).trim_matches(|c| c == '"' || c == '\'' || c == '`');
                    let path = self.out.path;
                    self.out.edge(path, module, RelationshipKind::Imports, TreeSitterProvider::node_line(node));
                }
            }
            ("class_declaration" | "abstract_class_declaration" | "class", None) => {
                self.visit_class(node, owner)
            }
            ("interface_declaration", None) => self.visit_interface(node, owner),
            ("function_declaration" | "generator_function_declaration", None) => {
                if let Some(name) = node.child_by_field_name("name") {
                    let name = self.text(&name);
                    self.visit_function(node, node, name, owner);
                }
            }
            ("variable_declarator", None) => {
                let value = node.child_by_field_name("value");
                let name = node.child_by_field_name("name");
                match (name, value) {
                    (Some(name), Some(value))
                        if matches!(value.kind(), "arrow_function" | "function_expression" | "function") =>
                    {
                        let name = self.text(&name);
                        self.visit_function(node, &value, name, owner);
                    }
                    _ => return true,
                }
            }
            ("call_expression", Some(member)) => {
                self.visit_call(node, member);
                return true;
            }
            ("new_expression", Some(member)) => {
                if let Some(constructor) = node.child_by_field_name("constructor") {
                    let ty = self.text(&constructor);
                    self.out.type_edges(member, ty, RelationshipKind::Uses, TreeSitterProvider::node_line(node));
                }
                return true;
            }
            ("throw_statement", Some(member)) => {
                let created = TreeSitterProvider::child_of_kind(node, "new_expression")
                    .and_then(|n| n.child_by_field_name("constructor"));
                if let Some(ty) = created {
                    let thrown = base_name(self.text(&ty));
                    self.out.edge(member, thrown, RelationshipKind::Throws, TreeSitterProvider::node_line(node));
                }
                return true;
            }
            ("catch_clause", Some(member)) => {
                if let Some(ty) = node.child_by_field_name("type") {
                    let ty = self.text(&ty);
                    self.out.type_edges(member, ty, RelationshipKind::Catches, TreeSitterProvider::node_line(node));
                }
                return true;
            }
            _ => return true,
        }
        false
    }

    fn declaration(&self, kind: ElementKind, name: &str, node: &Node) -> CodeElement {
        let mut element = self
            .out
            .element(kind, name, TreeSitterProvider::node_line(node))
            .with_content(self.text(node))
            .with_signature(TreeSitterProvider::signature(node, self.source))
            .with_metadata("end_line", TreeSitterProvider::node_end_line(node));
        let documented = match node.parent() {
            Some(parent) if parent.kind() == "export_statement" => parent,
            _ => *node,
        };
        if let Some(summary) = extract_doc_comment(&documented, self.source) {
            element = element.with_summary(summary);
        }
        if documented.id() != node.id() {
            element.add_tag("exported");
        }
        element
    }

    /// Decorators on the node itself, on a wrapping export, or directly
    /// preceding it in a class body.
    fn decorators(&mut self, node: &Node, owner: &str) {
        let mut found = TreeSitterProvider::children_of_kind(node, "decorator");
        if let Some(parent) = node.parent().filter(|p| p.kind() == "export_statement") {
            found.extend(TreeSitterProvider::children_of_kind(&parent, "decorator"));
        }
        let mut sibling = node.prev_named_sibling();
        while let Some(s) = sibling.filter(|s| s.kind() == "decorator") {
            found.push(s);
            sibling = s.prev_named_sibling();
        }

        for decorator in found {
            let text = self.text(&decorator).trim_start_matches('@');
            let name = base_name(text);
            self.out.edge(owner, name, RelationshipKind::HasAttribute, TreeSitterProvider::node_line(&decorator));
        }
    }

    fn visit_class(&mut self, node: &Node, owner: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.out.qualify(owner, self.text(&name_node));
        let mut element = self.declaration(ElementKind::Class, &name, node);
        if node.kind() == "abstract_class_declaration" {
            element.add_tag("abstract");
        }
        self.out.define(owner, element);
        self.decorators(node, &name);

        if let Some(heritage) = TreeSitterProvider::child_of_kind(node, "class_heritage") {
            self.heritage(&heritage, &name);
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.class_body(&body, &name);
        }
    }

    fn heritage(&mut self, heritage: &Node, class: &str) {
        let mut cursor = heritage.walk();
        for clause in heritage.named_children(&mut cursor) {
            let relation = match clause.kind() {
                "extends_clause" => RelationshipKind::Inherits,
                "implements_clause" => RelationshipKind::Implements,
                // JavaScript: `extends` followed directly by an expression
                _ => {
                    let base = base_name(self.text(&clause));
                    self.out.edge(class, base, RelationshipKind::Inherits, TreeSitterProvider::node_line(&clause));
                    continue;
                }
            };
            let mut inner = clause.walk();
            for base in clause.named_children(&mut inner) {
                if base.kind() == "type_arguments" {
                    let args = self.text(&base);
                    self.out.type_edges(class, args, RelationshipKind::UsesGeneric, TreeSitterProvider::node_line(&base));
                    continue;
                }
                let text = self.text(&base);
                let line = TreeSitterProvider::node_line(&base);
                let target = base_name(text);
                self.out.edge(class, target, relation, line);
                let args = crate::parser::types::split_type(text, TypeSystem::TypeScript).generic_args;
                for arg in args {
                    self.out.edge(class, &arg, RelationshipKind::UsesGeneric, line);
                }
            }
        }
    }

    fn class_body(&mut self, body: &Node, class: &str) {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "method_definition" | "abstract_method_signature" | "method_signature" => {
                    let Some(name) = member.child_by_field_name("name") else {
                        continue;
                    };
                    let name = self.text(&name);
                    self.visit_method(&member, name, class);
                }
                "public_field_definition" | "field_definition" | "property_signature" => {
                    self.visit_property(&member, class);
                }
                _ => {}
            }
        }
    }

    fn visit_interface(&mut self, node: &Node, owner: &str) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.out.qualify(owner, self.text(&name_node));
        let element = self.declaration(ElementKind::Interface, &name, node);
        self.out.define(owner, element);

        if let Some(extends) = TreeSitterProvider::child_of_kind(node, "extends_type_clause") {
            let mut cursor = extends.walk();
            for base in extends.named_children(&mut cursor) {
                let text = self.text(&base);
                self.out.edge(&name, base_name(text), RelationshipKind::Inherits, TreeSitterProvider::node_line(&base));
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.class_body(&body, &name);
        }
    }

    /// A method inside a class or interface body.
    fn visit_method(&mut self, node: &Node, simple_name: &str, class: &str) {
        let name = self.out.qualify(class, simple_name);
        let is_constructor = simple_name == "constructor";
        let mut element = self.declaration(ElementKind::Method, &name, node);
        if is_constructor {
            element.add_tag("constructor");
        }
        if TreeSitterProvider::child_of_kind(node, "async").is_some() {
            element.add_tag("async");
        }
        self.out.define(class, element);
        self.decorators(node, &name);
        self.signature_types(node, &name, is_constructor.then_some(class));

        if let Some(body) = node.child_by_field_name("body") {
            self.walk(&body, class, Some(&name));
        }
    }

    /// A function declaration or a variable bound to a function.
    fn visit_function(&mut self, decl: &Node, function: &Node, simple_name: &str, owner: &str) {
        let name = self.out.qualify(owner, simple_name);
        let mut element = self.declaration(ElementKind::Method, &name, decl);
        element.add_tag("function");
        self.out.define(owner, element);
        self.signature_types(function, &name, None);

        if let Some(body) = function.child_by_field_name("body") {
            self.walk(&body, owner, Some(&name));
        }
    }

    /// Parameter and return type edges; constructor parameters also inject
    /// into `injects_into`.
    fn signature_types(&mut self, function: &Node, name: &str, injects_into: Option<&str>) {
        if let Some(params) = function.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for param in params.named_children(&mut cursor) {
                let Some(ty) = param.child_by_field_name("type") else {
                    continue;
                };
                let type_text = self.text(&ty);
                let line = TreeSitterProvider::node_line(&param);
                let outer = self.out.type_edges(name, type_text, RelationshipKind::AcceptsType, line);

                if let (Some(class), Some(injected)) = (injects_into, outer) {
                    let param_name = param
                        .child_by_field_name("pattern")
                        .map(|p| self.text(&p))
                        .unwrap_or_default();
                    self.out
                        .edge(class, &injected, RelationshipKind::Injects, line)
                        .properties
                        .insert("parameter".to_string(), param_name.into());
                    self.out.add_dependency(class, &injected);
                }
            }
        }

        if let Some(returns) = function.child_by_field_name("return_type") {
            let returns = self.text(&returns);
            self.out.type_edges(name, returns, RelationshipKind::ReturnsType, TreeSitterProvider::node_line(function));
        }
    }

    fn visit_property(&mut self, node: &Node, class: &str) {
        let Some(name_node) = TreeSitterProvider::field(node, &["name", "property"]) else {
            return;
        };
        let name = self.out.qualify(class, self.text(&name_node));
        let element = self.declaration(ElementKind::Property, &name, node);
        self.out.define(class, element);
        self.decorators(node, &name);

        if let Some(ty) = node.child_by_field_name("type") {
            let ty = self.text(&ty);
            self.out.type_edges(&name, ty, RelationshipKind::HasType, TreeSitterProvider::node_line(node));
        }
        if let Some(value) = node.child_by_field_name("value") {
            self.walk(&value, class, Some(&name));
        }
    }

    fn visit_call(&mut self, node: &Node, member: &str) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let (callee, receiver) = match function.kind() {
            "member_expression" => (
                function.child_by_field_name("property").map(|p| self.text(&p)),
                function.child_by_field_name("object").map(|o| self.text(&o)),
            ),
            "identifier" => (Some(self.text(&function)), None),
            _ => (None, None),
        };
        let Some(callee) = callee else {
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

    fn parse(path: &str, source: &str) -> ParseResult {
        TypeScriptParser::default().parse_file(path, source, Some("web"), &CancellationToken::new())
    }

    #[test]
    fn test_class_with_heritage_and_injection() {
        let source = r#"
import { HttpClient } from '@angular/common/http';

@Injectable()
export class OrderService extends BaseService<Order> implements IOrderService, OnInit {
  private cache: Map<string, Order>;

  constructor(private readonly http: HttpClient, private logger: Logger) {
    super();
  }

  async find(id: string): Promise<Order> {
    this.logger.info(id);
    if (!id) {
      throw new NotFoundError();
    }
    return new Order(id);
  }
}
"#;
        let result = parse("src/app/order.service.ts", source);
        assert!(result.success(), "{:?}", result.errors());

        assert!(result.has_relationship("src/app/order.service.ts", "@angular/common/http", RelationshipKind::Imports));
        assert_eq!(result.element("OrderService").unwrap().kind, ElementKind::Class);
        assert!(result.element("OrderService").unwrap().has_tag("exported"));
        assert!(result.has_relationship("OrderService", "Injectable", RelationshipKind::HasAttribute));
        assert!(result.has_relationship("OrderService", "BaseService", RelationshipKind::Inherits));
        assert!(result.has_relationship("OrderService", "Order", RelationshipKind::UsesGeneric));
        assert!(result.has_relationship("OrderService", "IOrderService", RelationshipKind::Implements));
        assert!(result.has_relationship("OrderService", "OnInit", RelationshipKind::Implements));

        assert!(result.has_relationship("OrderService", "HttpClient", RelationshipKind::Injects));
        assert!(result.has_relationship("OrderService", "Logger", RelationshipKind::Injects));

        assert_eq!(result.element("OrderService.cache").unwrap().kind, ElementKind::Property);
        assert!(result.has_relationship("OrderService.cache", "Map", RelationshipKind::HasType));

        let find = result.element("OrderService.find").unwrap();
        assert!(find.has_tag("async"));
        assert!(result.has_relationship("OrderService.find", "Promise", RelationshipKind::ReturnsType));
        assert!(result.has_relationship("OrderService.find", "info", RelationshipKind::Calls));
        assert!(result.has_relationship("OrderService.find", "NotFoundError", RelationshipKind::Throws));
        assert!(result.has_relationship("OrderService.find", "Order", RelationshipKind::Uses));
    }

    #[test]
    fn test_functions_and_interfaces() {
        let source = r#"
export interface Repo extends Base<Item> {
  get(id: number): Item;
}

export function load(repo: Repo): void {
  fetchAll();
}

const total = (items: Item[]) => items.length;
"#;
        let result = parse("lib/repo.ts", source);
        assert_eq!(result.element("Repo").unwrap().kind, ElementKind::Interface);
        assert!(result.has_relationship("Repo", "Base", RelationshipKind::Inherits));
        assert!(result.element("Repo.get").is_some());
        assert!(result.has_relationship("load", "Repo", RelationshipKind::AcceptsType));
        assert!(result.has_relationship("load", "fetchAll", RelationshipKind::Calls));
        assert!(result.has_relationship("lib/repo.ts", "total", RelationshipKind::Defines));
        assert!(result.has_relationship("total", "Item", RelationshipKind::AcceptsType));
    }

    #[test]
    fn test_javascript_grammar() {
        let source = "class Cart extends Base {\n  total() { return sum(this.items); }\n}\n";
        let result = parse("web/cart.js", source);
        assert!(result.has_relationship("Cart", "Base", RelationshipKind::Inherits));
        assert!(result.has_relationship("Cart.total", "sum", RelationshipKind::Calls));
        assert!(result.file_element().unwrap().has_tag("javascript"));
    }

    #[test]
    fn test_tsx_grammar() {
        let source = "export const App = () => <div>{render()}</div>;\n";
        let result = parse("web/App.tsx", source);
        assert!(result.element("App").is_some());
        assert!(result.file_element().unwrap().metadata.get("has_syntax_errors").is_none());
    }

    #[test]
    fn test_long_concatenation() {
        let chain = vec!["'ab'"; 5_000].join(" + ");
        let source = format!("export const TEXT = {};
export function build() {{ log(); return {}; }}
", chain, chain);
        let result = parse("web/gen/strings.ts", &source);

        assert!(result.file_element().is_some());
        assert!(result.element("build").is_some());
        assert!(result.has_relationship("build", "log", RelationshipKind::Calls));
    }
}
