//! VB.NET parser.
//!
//! There is no VB grammar in the tree-sitter family we build against, so
//! declarations are recognized line by line and blocks are closed by their
//! `End ...` statements. Detectors for VB scan text only.

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::text::{calls, code_only, doc_above};
use super::traits::{Parser, ParserCapability};
use super::types::{base_name, is_interface_name, split_type, TypeSystem};
use crate::config::ScanConfig;
use crate::detectors::{vbnet, DetectorBank};
use crate::model::{ElementKind, ParseResult, RelationshipKind};

const MODIFIERS: &str = r"(?:(?:Public|Private|Protected|Friend|Partial|MustInherit|NotInheritable|Shared|Shadows|Overrides|Overridable|NotOverridable|MustOverride|Overloads|Async|Iterator|ReadOnly|WriteOnly|Default|Static|WithEvents|Const)\s+)*";

static IMPORTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Imports\s+(?:\w+\s*=\s*)?([\w.]+)").unwrap());

static NAMESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^Namespace\s+([\w.]+)").unwrap());

static TYPE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^({})(Class|Module|Structure|Interface|Enum)\s+(\w+)", MODIFIERS)).unwrap()
});

static METHOD_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^({})(?:Declare\s+\w*\s*)?(Sub|Function)\s+(\w+)", MODIFIERS)).unwrap()
});

static PROPERTY_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^({})Property\s+(\w+)(.*)$", MODIFIERS)).unwrap()
});

static FIELD_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:Public|Private|Protected|Friend|Dim)\s+(?:(?:ReadOnly|Shared|Shadows|WithEvents|Const)\s+)*(\w+)\s+As\s+(?:New\s+)?(.+?)\s*(?:=.*)?$").unwrap()
});

static END_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^End\s+(Namespace|Class|Module|Structure|Interface|Enum|Sub|Function|Property)\b").unwrap()
});

static HERITAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(Inherits|Implements)\s+(.+)$").unwrap());

static ACCESSOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:(?:Public|Private|Protected|Friend)\s+)?(?:Get|Set)\b").unwrap());

static ATTRIBUTE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<([^>]*)>\s*_?\s*").unwrap());

static ATTRIBUTE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|,)\s*(?:\w+:\s*)?([A-Za-z_][\w.]*)").unwrap());

static MULTILINE_LAMBDA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:Sub|Function)\s*\([^)]*\)\s*$").unwrap());

static NEW_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bNew\s+([A-Za-z_][\w.]*(?:\s*\(\s*Of\s+[^)]*\))?)").unwrap());

static THROW_NEW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^Throw\s+New\s+([\w.]+)").unwrap());

static CATCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^Catch\s+\w+\s+As\s+([\w.]+)").unwrap());

const KEYWORDS: &[&str] = &[
    "If", "ElseIf", "While", "For", "Each", "Select", "Case", "Using", "SyncLock", "With",
    "Return", "Not", "And", "Or", "AndAlso", "OrElse", "Sub", "Function", "New", "Of",
    "CType", "DirectCast", "TryCast", "GetType", "NameOf", "CStr", "CInt", "CLng", "CDbl",
    "CBool", "CDate", "CDec", "CObj", "Throw", "Await", "In", "Is", "IsNot", "Dim",
];

/// VB.NET language parser.
pub struct VbNetParser {
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl VbNetParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            resolver: ContextResolver::new(&config.context),
            banks: vec![vbnet::bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }
}

impl Default for VbNetParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for VbNetParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, "VB.NET");
        if session.cancelled(cancel) {
            return session.finish();
        }

        let context = session.context.clone();
        session.extract("VB.NET declarations", |result| {
            let mut walker = Walker::new(content, Emitter::new(path, &context, TypeSystem::VisualBasic, result));
            walker.run();
        });

        session.detect(&self.banks, None, None, self.snippet_lines);
        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "VB.NET"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["vb"]
    }

    fn capability(&self) -> ParserCapability {
        ParserCapability::Basic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Namespace,
    Type,
    Member,
}

struct Scope {
    block: Block,
    name: String,
    start: usize,
    /// Index into the result's elements, for blocks that are elements.
    element: Option<usize>,
    is_interface: bool,
}

struct Walker<'a, 'r> {
    raw: Vec<&'a str>,
    /// Lines with strings blanked and comments removed.
    code: Vec<String>,
    /// Trimmed lines with comments kept, for doc lookup.
    docs: Vec<String>,
    out: Emitter<'a, 'r>,
    scopes: Vec<Scope>,
    attributes: Vec<(String, usize)>,
    lambda_depth: usize,
}

impl<'a, 'r> Walker<'a, 'r> {
    fn new(content: &'a str, out: Emitter<'a, 'r>) -> Self {
        let raw: Vec<&str> = content.lines().collect();
        let code = raw.iter().map(|l| code_only(l, "'").trim().to_string()).collect();
        let docs = raw.iter().map(|l| l.trim().to_string()).collect();
        Self {
            raw,
            code,
            docs,
            out,
            scopes: Vec::new(),
            attributes: Vec::new(),
            lambda_depth: 0,
        }
    }

    fn owner(&self) -> String {
        self.scopes
            .iter()
            .rev()
            .find(|s| s.block == Block::Type)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| self.out.path.to_string())
    }

    fn namespace(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .scopes
            .iter()
            .filter(|s| s.block == Block::Namespace)
            .map(|s| s.name.as_str())
            .collect();
        (!parts.is_empty()).then(|| parts.join("."))
    }

    fn member(&self) -> Option<String> {
        match self.scopes.last() {
            Some(scope) if scope.block == Block::Member => Some(scope.name.clone()),
            _ => None,
        }
    }

    fn run(&mut self) {
        for idx in 0..self.code.len() {
            let line = self.code[idx].clone();
            // `:` separates statements; `:=` is a named argument
            for statement in line.split(" : ") {
                self.statement(statement.trim(), idx);
            }
        }
        // unterminated blocks run to end of file
        while !self.scopes.is_empty() {
            self.close(self.raw.len().saturating_sub(1));
        }
    }

    fn statement(&mut self, statement: &str, idx: usize) {
        if statement.is_empty() {
            return;
        }
        let line = idx + 1;

        if let Some(cap) = END_BLOCK.captures(statement) {
            let is_member = matches!(cap[1].to_ascii_lowercase().as_str(), "sub" | "function" | "property");
            if is_member && self.lambda_depth > 0 {
                self.lambda_depth -= 1;
            } else {
                self.close(idx);
            }
            return;
        }

        if let Some(member) = self.member() {
            self.body(statement, &member, line);
            return;
        }

        let mut statement = statement;
        while let Some(cap) = ATTRIBUTE_BLOCK.captures(statement) {
            for name in ATTRIBUTE_NAME.captures_iter(&cap[1]) {
                let name = &name[1];
                let name = name.strip_suffix("Attribute").unwrap_or(name);
                self.attributes.push((name.to_string(), line));
            }
            statement = &statement[cap[0].len()..];
        }
        if statement.is_empty() {
            return;
        }

        if let Some(cap) = IMPORTS.captures(statement) {
            let path = self.out.path;
            self.out.edge(path, &cap[1], RelationshipKind::Imports, line);
        } else if let Some(cap) = NAMESPACE.captures(statement) {
            self.push(Block::Namespace, cap[1].to_string(), idx, None, false);
        } else if let Some(cap) = TYPE_DECL.captures(statement) {
            let modifiers = cap[1].to_string();
            self.visit_type(&cap[2], &cap[3], &modifiers, idx);
        } else if let Some(cap) = HERITAGE.captures(statement) {
            self.heritage(&cap[1], &cap[2], line);
        } else if let Some(cap) = METHOD_DECL.captures(statement) {
            let rest = &statement[cap[0].len()..];
            let modifiers = cap[1].to_string();
            self.visit_method(&cap[3], &modifiers, rest, idx);
        } else if let Some(cap) = PROPERTY_DECL.captures(statement) {
            let modifiers = cap[1].to_string();
            self.visit_property(&cap[2], &modifiers, &cap[3], idx);
        } else if let Some(cap) = FIELD_DECL.captures(statement) {
            if self.scopes.iter().any(|s| s.block == Block::Type) {
                self.visit_field(&cap[1], &cap[2], idx);
            }
        }
    }

    fn push(&mut self, block: Block, name: String, start: usize, element: Option<usize>, is_interface: bool) {
        self.scopes.push(Scope {
            block,
            name,
            start,
            element,
            is_interface,
        });
    }

    /// Close the innermost block, filling its element's content span.
    fn close(&mut self, end: usize) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        if let Some(element) = scope.element.and_then(|i| self.out.result.elements.get_mut(i)) {
            let end = end.min(self.raw.len().saturating_sub(1));
            element.content = self.raw[scope.start..=end.max(scope.start)].join("\n");
            element.metadata.insert("end_line".to_string(), (end + 1).into());
        }
    }

    fn define(&mut self, kind: ElementKind, name: &str, modifiers: &str, idx: usize) -> usize {
        let owner = self.owner();
        let mut element = self
            .out
            .element(kind, name, idx + 1)
            .with_content(self.raw[idx])
            .with_signature(self.code[idx].as_str());
        for modifier in modifiers.split_whitespace() {
            element.add_tag(modifier.to_ascii_lowercase());
        }
        if let Some(summary) = doc_above(&self.docs, idx, "'''") {
            element = element.with_summary(summary);
        }
        if let Some(namespace) = self.namespace().filter(|_| kind != ElementKind::Method) {
            element = element.with_metadata("namespace", namespace);
        }
        self.out.define(&owner, element);

        for (attribute, line) in std::mem::take(&mut self.attributes) {
            self.out.edge(name, &attribute, RelationshipKind::HasAttribute, line);
        }
        self.out.result.elements.len() - 1
    }

    fn visit_type(&mut self, keyword: &str, simple: &str, modifiers: &str, idx: usize) {
        let keyword = keyword.to_ascii_lowercase();
        let is_interface = keyword == "interface";
        let kind = if is_interface {
            ElementKind::Interface
        } else {
            ElementKind::Class
        };
        let name = self.out.qualify(&self.owner(), simple);
        let element = self.define(kind, &name, modifiers, idx);
        if matches!(keyword.as_str(), "module" | "structure" | "enum") {
            self.out.result.elements[element].add_tag(keyword);
        }
        self.push(Block::Type, name, idx, Some(element), is_interface);
    }

    fn heritage(&mut self, keyword: &str, list: &str, line: usize) {
        let Some(scope) = self.scopes.last().filter(|s| s.block == Block::Type) else {
            return;
        };
        let class = scope.name.clone();
        let relation = if keyword.eq_ignore_ascii_case("Implements") && !scope.is_interface {
            RelationshipKind::Implements
        } else {
            RelationshipKind::Inherits
        };
        for base in split_top_level(list) {
            let target = base_name(base);
            if target.is_empty() {
                continue;
            }
            self.out.edge(&class, target, relation, line);
            for arg in split_type(base, TypeSystem::VisualBasic).generic_args {
                self.out.edge(&class, &arg, RelationshipKind::UsesGeneric, line);
            }
        }
    }

    fn visit_method(&mut self, simple: &str, modifiers: &str, rest: &str, idx: usize) {
        let owner = self.owner();
        let is_constructor = simple.eq_ignore_ascii_case("New");
        let name = self.out.qualify(&owner, simple);
        let element = self.define(ElementKind::Method, &name, modifiers, idx);
        if is_constructor {
            self.out.result.elements[element].add_tag("constructor");
        }
        let line = idx + 1;

        let mut rest = rest.trim_start();
        if let Some((generics, tail)) = parenthesized(rest) {
            if generics.trim_start().to_ascii_lowercase().starts_with("of ") {
                rest = tail.trim_start();
            }
        }
        let (params, tail) = parenthesized(rest).unwrap_or(("", rest));

        for param in split_top_level(params) {
            let Some((param_name, type_text)) = parameter(param) else {
                continue;
            };
            self.out.type_edges(&name, type_text, RelationshipKind::AcceptsType, line);
            if is_constructor {
                if let Some(injected) = split_type(type_text, TypeSystem::VisualBasic).outer {
                    self.out
                        .edge(&owner, &injected, RelationshipKind::Injects, line)
                        .properties
                        .extend([
                            ("parameter".to_string(), param_name.into()),
                            ("is_interface".to_string(), is_interface_name(&injected).into()),
                        ]);
                    self.out.add_dependency(&owner, &injected);
                }
            }
        }

        if let Some(returns) = as_clause(tail) {
            self.out.type_edges(&name, returns, RelationshipKind::ReturnsType, line);
        }

        let abstract_member = modifiers.to_ascii_lowercase().contains("mustoverride")
            || self.code[idx].to_ascii_lowercase().contains("declare ")
            || self.scopes.iter().rev().find(|s| s.block == Block::Type).is_some_and(|s| s.is_interface);
        if !abstract_member {
            self.push(Block::Member, name, idx, Some(element), false);
        }
    }

    fn visit_property(&mut self, simple: &str, modifiers: &str, rest: &str, idx: usize) {
        let name = self.out.qualify(&self.owner(), simple);
        let element = self.define(ElementKind::Property, &name, modifiers, idx);
        let rest = parenthesized(rest.trim_start()).map(|(_, tail)| tail).unwrap_or(rest);
        if let Some(ty) = as_clause(rest) {
            self.out.type_edges(&name, ty, RelationshipKind::HasType, idx + 1);
        }

        let expanded = self.code[idx + 1..]
            .iter()
            .find(|l| !l.is_empty())
            .is_some_and(|l| ACCESSOR.is_match(l));
        if expanded {
            self.push(Block::Member, name, idx, Some(element), false);
        }
    }

    fn visit_field(&mut self, simple: &str, type_text: &str, idx: usize) {
        let name = self.out.qualify(&self.owner(), simple);
        let element = self.define(ElementKind::Property, &name, "", idx);
        self.out.result.elements[element].add_tag("field");
        self.out.type_edges(&name, type_text, RelationshipKind::HasType, idx + 1);
    }

    fn body(&mut self, statement: &str, member: &str, line: usize) {
        if MULTILINE_LAMBDA.is_match(statement) {
            self.lambda_depth += 1;
        }
        if let Some(cap) = THROW_NEW.captures(statement) {
            self.out.edge(member, base_name(&cap[1]), RelationshipKind::Throws, line);
        }
        if let Some(cap) = CATCH.captures(statement) {
            self.out.edge(member, base_name(&cap[1]), RelationshipKind::Catches, line);
        }
        for cap in NEW_OBJECT.captures_iter(statement) {
            self.out.type_edges(member, &cap[1], RelationshipKind::Uses, line);
        }
        for (callee, receiver) in calls(statement, KEYWORDS) {
            if split_type(callee, TypeSystem::VisualBasic).outer.is_none() {
                continue;
            }
            let edge = self.out.edge(member, callee, RelationshipKind::Calls, line);
            if let Some(receiver) = receiver {
                edge.properties.insert("receiver".to_string(), receiver.into());
            }
        }
    }
}

/// Contents of a leading parenthesized group and the text after it.
fn parenthesized(text: &str) -> Option<(&str, &str)> {
    if !text.starts_with('(') {
        return None;
    }
    let mut depth = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&text[1..idx], &text[idx + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas outside parentheses.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

/// `[Optional] [ByVal|ByRef|ParamArray] name As Type [= default]`.
fn parameter(param: &str) -> Option<(&str, &str)> {
    let param = param.split('=').next().unwrap_or(param).trim();
    let lower = param.to_ascii_lowercase();
    let as_at = lower.find(" as ")?;
    let name = param[..as_at]
        .split_whitespace()
        .last()?
        .trim_end_matches("()");
    let ty = param[as_at + 4..].trim();
    let ty = ty.strip_prefix("New ").unwrap_or(ty);
    Some((name, ty))
}

/// Type of a trailing `As Type`, ignoring `Implements`/`Handles` clauses.
fn as_clause(text: &str) -> Option<&str> {
    let text = text.trim();
    let lower = text.to_ascii_lowercase();
    if !lower.starts_with("as ") {
        return None;
    }
    let ty = text[3..].trim();
    let ty = ty.strip_prefix("New ").unwrap_or(ty);
    let lower = ty.to_ascii_lowercase();
    let end = [" implements ", " handles ", " = "]
        .iter()
        .filter_map(|kw| lower.find(kw))
        .min()
        .unwrap_or(ty.len());
    Some(ty[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        VbNetParser::default().parse_file("src/Billing/OrderService.vb", source, None, &CancellationToken::new())
    }

    const SOURCE: &str = r#"Imports System.Collections.Generic
Imports Billing.Data

Namespace Billing.Services
    ''' <summary>
    ''' Places orders.
    ''' </summary>
    <Serializable>
    Public Class OrderService
        Inherits ServiceBase(Of Order)
        Implements IOrderService, IDisposable

        Private ReadOnly _repo As IOrderRepository

        Public Sub New(ByVal repo As IOrderRepository, ByVal retries As Integer)
            _repo = repo
        End Sub

        Public Property Name As String

        Public ReadOnly Property Count As Integer
            Get
                Return _repo.Count()
            End Get
        End Property

        Public Async Function PlaceAsync(order As Order) As Task(Of Receipt)
            Try
                _repo.Save(order)
                Dim handler = Sub(x)
                                  Log(x)
                              End Sub
            Catch ex As InvalidOperationException
                Throw New OrderException("failed")
            End Try
            Return New Receipt(order)
        End Function

        Public Sub Dispose() Implements IDisposable.Dispose
        End Sub
    End Class

    Public Interface IOrderService
        Inherits IService
        Function PlaceAsync(order As Order) As Task(Of Receipt)
    End Interface
End Namespace
"#;

    #[test]
    fn test_declarations_and_edges() {
        let result = parse(SOURCE);
        assert!(result.success(), "{:?}", result.errors());
        let path = "src/Billing/OrderService.vb";

        assert!(result.has_relationship(path, "System.Collections.Generic", RelationshipKind::Imports));

        let class = result.element("OrderService").unwrap();
        assert_eq!(class.kind, ElementKind::Class);
        assert_eq!(class.summary, "Places orders.");
        assert_eq!(class.metadata["namespace"], "Billing.Services");
        assert!(class.has_tag("public"));
        assert!(class.content.trim_end().ends_with("End Class"));
        assert!(result.has_relationship(path, "OrderService", RelationshipKind::Defines));
        assert!(result.has_relationship("OrderService", "Serializable", RelationshipKind::HasAttribute));
        assert!(result.has_relationship("OrderService", "ServiceBase", RelationshipKind::Inherits));
        assert!(result.has_relationship("OrderService", "Order", RelationshipKind::UsesGeneric));
        assert!(result.has_relationship("OrderService", "IOrderService", RelationshipKind::Implements));
        assert!(result.has_relationship("OrderService", "IDisposable", RelationshipKind::Implements));

        assert!(result.has_relationship("OrderService._repo", "IOrderRepository", RelationshipKind::HasType));

        let ctor = result.element("OrderService.New").unwrap();
        assert!(ctor.has_tag("constructor"));
        assert!(result.has_relationship("OrderService", "IOrderRepository", RelationshipKind::Injects));
        assert!(!result.has_relationship("OrderService", "Integer", RelationshipKind::Injects));
        assert!(result.element("OrderService").unwrap().dependencies.contains(&"IOrderRepository".to_string()));

        assert_eq!(result.element("OrderService.Name").unwrap().kind, ElementKind::Property);
        assert!(result.has_relationship("OrderService.Count", "Count", RelationshipKind::Calls));

        let place = result.element("OrderService.PlaceAsync").unwrap();
        assert!(place.has_tag("async"));
        assert!(place.content.trim_end().ends_with("End Function"));
        assert!(result.has_relationship("OrderService.PlaceAsync", "Order", RelationshipKind::AcceptsType));
        assert!(result.has_relationship("OrderService.PlaceAsync", "Task", RelationshipKind::ReturnsType));
        assert!(result.has_relationship("OrderService.PlaceAsync", "Receipt", RelationshipKind::UsesGeneric));
        assert!(result.has_relationship("OrderService.PlaceAsync", "Save", RelationshipKind::Calls));
        assert!(result.has_relationship("OrderService.PlaceAsync", "Log", RelationshipKind::Calls));
        assert!(result.has_relationship("OrderService.PlaceAsync", "InvalidOperationException", RelationshipKind::Catches));
        assert!(result.has_relationship("OrderService.PlaceAsync", "OrderException", RelationshipKind::Throws));
        assert!(result.has_relationship("OrderService.PlaceAsync", "Receipt", RelationshipKind::Uses));

        assert!(result.element("OrderService.Dispose").is_some());

        let iface = result.element("IOrderService").unwrap();
        assert_eq!(iface.kind, ElementKind::Interface);
        assert!(result.has_relationship("IOrderService", "IService", RelationshipKind::Inherits));
        assert!(result.element("IOrderService.PlaceAsync").is_some());
        assert!(result.has_relationship(path, "IOrderService", RelationshipKind::Defines));
    }

    #[test]
    fn test_parameter_parsing() {
        assert_eq!(parameter("ByVal repo As IRepo"), Some(("repo", "IRepo")));
        assert_eq!(parameter("Optional count As Integer = 5"), Some(("count", "Integer")));
        assert_eq!(parameter("items() As String"), Some(("items", "String")));
        assert_eq!(parameter("x"), None);
        assert_eq!(split_top_level("a As List(Of X, Y), b As Z"), vec!["a As List(Of X, Y)", "b As Z"]);
        assert_eq!(as_clause(" As Task(Of Receipt) Implements IFoo.Bar"), Some("Task(Of Receipt)"));
    }
}
