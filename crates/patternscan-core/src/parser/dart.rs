//! Dart parser.
//!
//! Dart is walked line by line: declarations are recognized by shape and
//! their spans are found by brace counting over string-free code lines.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::text::{brace_block_end, calls, code_only, doc_above};
use super::traits::{Parser, ParserCapability};
use super::types::{base_name, split_type, TypeSystem};
use crate::config::ScanConfig;
use crate::detectors::{dart, DetectorBank};
use crate::model::{ElementKind, ParseResult, RelationshipKind};

static IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:import|export)\s+['"]([^'"]+)['"]"#).unwrap());

static ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@([A-Za-z_][\w.]*)(?:\s*\([^)]*\))?\s*").unwrap());

static TYPE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?:(?:abstract|base|final|sealed|interface|mixin)\s+)*)(class|mixin|enum|extension)\b\s*(\w*)\s*(?:<[^{]*?>)?(.*)$").unwrap()
});

static GETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:static|external|abstract)\s+)*(?:([\w<>?,.\[\] ]+?)\s+)?get\s+(\w+)").unwrap()
});

static METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?:(?:static|external|abstract)\s+)*)(?:([\w<>?,.\[\] ]+?)\s+)?(?:set\s+|operator\s*)?(\w+)\s*(?:<[^>(]*>)?\s*\(").unwrap()
});

static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?:(?:static|final|const|late|var|covariant|external)\s+)*)(?:([\w<>?,.\[\] ]+?)\s+)?(\w+)\s*(?:=[^;]*)?;").unwrap()
});

static HERITAGE_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:extends|with|implements|on)\s").unwrap());

static THROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bthrow\s+(?:new\s+|const\s+)?([A-Za-z_][\w.]*)\s*\(").unwrap());

static ON_CATCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bon\s+([A-Za-z_][\w.]*)\s*(?:catch\b|\{)").unwrap());

static NEW_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnew\s+([A-Za-z_][\w.]*(?:<[^>(]*>)?)\s*\(").unwrap());

const KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "assert", "super", "this", "await",
    "throw", "new", "const", "print", "rethrow", "yield", "sizeof", "typeof",
];

const NOT_METHODS: &[&str] = &["if", "for", "while", "switch", "catch", "return", "assert"];

/// Dart language parser.
pub struct DartParser {
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl DartParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            resolver: ContextResolver::new(&config.context),
            banks: vec![dart::bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }
}

impl Default for DartParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for DartParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, "Dart");
        if session.cancelled(cancel) {
            return session.finish();
        }

        let context = session.context.clone();
        session.extract("Dart declarations", |result| {
            let mut walker = Walker::new(content, Emitter::new(path, &context, TypeSystem::Dart, result));
            let end = walker.code.len();
            walker.walk_range(0, end, path);
        });

        session.detect(&self.banks, None, None, self.snippet_lines);
        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "Dart"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["dart"]
    }

    fn capability(&self) -> ParserCapability {
        ParserCapability::Basic
    }
}

enum Decl {
    Import(String),
    Type,
    Constructor,
    Getter,
    Method,
    Field,
}

struct Member {
    decl: Decl,
    /// Declaration line, after annotations.
    start: usize,
    end: usize,
    attributes: Vec<(String, usize)>,
}

struct Walker<'a, 'r> {
    raw: Vec<&'a str>,
    code: Vec<String>,
    docs: Vec<String>,
    out: Emitter<'a, 'r>,
}

impl<'a, 'r> Walker<'a, 'r> {
    fn new(content: &'a str, out: Emitter<'a, 'r>) -> Self {
        let raw: Vec<&str> = content.lines().collect();
        let code = raw.iter().map(|l| code_only(l, "//").trim().to_string()).collect();
        let docs = raw.iter().map(|l| l.trim().to_string()).collect();
        Self { raw, code, docs, out }
    }

    /// Code of line `idx` with leading annotations removed.
    fn declaration_text(&self, idx: usize) -> &str {
        let mut text = self.code[idx].as_str();
        while let Some(m) = ANNOTATION.find(text) {
            text = &text[m.end()..];
        }
        text
    }

    /// Split lines `[start, end)` into top-level declarations; bodies are
    /// skipped.
    fn members(&self, start: usize, end: usize, class: Option<&str>) -> Vec<Member> {
        let mut members = Vec::new();
        let mut attributes = Vec::new();
        let mut idx = start;

        while idx < end {
            let code = self.code[idx].as_str();
            if code.is_empty() {
                idx += 1;
                continue;
            }
            let mut rest = code;
            while let Some(cap) = ANNOTATION.captures(rest) {
                attributes.push((cap[1].to_string(), idx + 1));
                rest = &rest[cap[0].len()..];
            }
            if rest.trim().is_empty() {
                idx += 1;
                continue;
            }

            let decl = if let Some(cap) = IMPORT.captures(self.raw[idx].trim()) {
                Some(Decl::Import(cap[1].to_string()))
            } else if TYPE_DECL.is_match(rest) {
                Some(Decl::Type)
            } else if class.is_some_and(|c| is_constructor(rest, c)) {
                Some(Decl::Constructor)
            } else if GETTER.is_match(rest) {
                Some(Decl::Getter)
            } else if METHOD
                .captures(rest)
                .is_some_and(|cap| !NOT_METHODS.contains(&&cap[3]) && cap.get(2).map_or(true, |t| !NOT_METHODS.contains(&t.as_str())))
            {
                Some(Decl::Method)
            } else if class.is_some() && FIELD.is_match(rest) {
                Some(Decl::Field)
            } else {
                None
            };

            let block_end = brace_block_end(&self.code, idx).min(end.saturating_sub(1)).max(idx);
            match decl {
                Some(decl) => {
                    let attributes = std::mem::take(&mut attributes);
                    let member_end = match decl {
                        Decl::Import(_) => idx,
                        _ => block_end,
                    };
                    members.push(Member {
                        decl,
                        start: idx,
                        end: member_end,
                        attributes,
                    });
                    idx = member_end + 1;
                }
                None => {
                    attributes.clear();
                    idx = block_end + 1;
                }
            }
        }
        members
    }

    /// Walk lines `[start, end)` owned by `owner` (the file or a type).
    fn walk_range(&mut self, start: usize, end: usize, owner: &str) {
        let class = (owner != self.out.path).then(|| owner.rsplit('.').next().unwrap_or(owner).to_string());
        let members = self.members(start, end, class.as_deref());

        // fields first so `this.field` constructor parameters resolve
        let mut fields = HashMap::new();
        for member in members.iter().filter(|m| matches!(m.decl, Decl::Field)) {
            if let Some((name, ty)) = self.visit_field(member, owner) {
                fields.insert(name, ty);
            }
        }

        for member in &members {
            match &member.decl {
                Decl::Import(module) => {
                    let path = self.out.path;
                    self.out.edge(path, module, RelationshipKind::Imports, member.start + 1);
                }
                Decl::Type => self.visit_type(member, owner),
                Decl::Constructor => self.visit_method(member, owner, true, &fields),
                Decl::Getter => self.visit_getter(member, owner),
                Decl::Method => self.visit_method(member, owner, false, &fields),
                Decl::Field => {}
            }
        }
    }

    fn define(&mut self, kind: ElementKind, name: &str, member: &Member, owner: &str) -> usize {
        let end = member.end;
        let mut element = self
            .out
            .element(kind, name, member.start + 1)
            .with_content(self.raw[member.start..=end].join("\n"))
            .with_signature(self.declaration_text(member.start).trim_end_matches('{').trim())
            .with_metadata("end_line", end + 1);
        if let Some(summary) = doc_above(&self.docs, member.start, "///") {
            element = element.with_summary(summary);
        }
        self.out.define(owner, element);
        for (attribute, line) in &member.attributes {
            self.out.edge(name, attribute, RelationshipKind::HasAttribute, *line);
        }
        self.out.result.elements.len() - 1
    }

    fn visit_type(&mut self, member: &Member, owner: &str) {
        let text = self.declaration_text(member.start).to_string();
        let Some(cap) = TYPE_DECL.captures(&text) else {
            return;
        };
        let keyword = &cap[2];
        let simple = match &cap[3] {
            "" | "on" => "extension",
            name => name,
        };
        let name = self.out.qualify(owner, simple);
        let is_interface = cap[1].split_whitespace().any(|m| m == "interface");
        let kind = if is_interface {
            ElementKind::Interface
        } else {
            ElementKind::Class
        };
        let element = self.define(kind, &name, member, owner);
        for modifier in cap[1].split_whitespace() {
            self.out.result.elements[element].add_tag(modifier);
        }
        if keyword != "class" {
            self.out.result.elements[element].add_tag(keyword);
        }

        let line = member.start + 1;
        let heritage = if cap[3].is_empty() || &cap[3] == "on" {
            format!("on {}", &cap[4])
        } else {
            cap[4].to_string()
        };
        for (keyword_of_clause, list) in heritage_clauses(&heritage) {
            let relation = match keyword_of_clause {
                "extends" => RelationshipKind::Inherits,
                "on" if keyword == "extension" => RelationshipKind::Uses,
                "on" => RelationshipKind::Inherits,
                _ => RelationshipKind::Implements,
            };
            for base in split_commas(list) {
                let target = base_name(base);
                if target.is_empty() {
                    continue;
                }
                let edge = self.out.edge(&name, target, relation, line);
                if keyword_of_clause == "with" {
                    edge.properties.insert("mixin".to_string(), true.into());
                }
                for arg in split_type(base, TypeSystem::Dart).generic_args {
                    self.out.edge(&name, &arg, RelationshipKind::UsesGeneric, line);
                }
            }
        }

        if member.end > member.start {
            self.walk_range(member.start + 1, member.end, &name);
        }
    }

    fn visit_field(&mut self, member: &Member, owner: &str) -> Option<(String, String)> {
        let text = self.declaration_text(member.start).to_string();
        let cap = FIELD.captures(&text)?;
        let simple = cap[3].to_string();
        let name = self.out.qualify(owner, &simple);
        let element = self.define(ElementKind::Property, &name, member, owner);
        for modifier in cap[1].split_whitespace() {
            self.out.result.elements[element].add_tag(modifier);
        }
        let ty = cap.get(2).map(|t| t.as_str().to_string())?;
        self.out.type_edges(&name, &ty, RelationshipKind::HasType, member.start + 1);
        Some((simple, ty))
    }

    fn visit_getter(&mut self, member: &Member, owner: &str) {
        let text = self.declaration_text(member.start).to_string();
        let Some(cap) = GETTER.captures(&text) else {
            return;
        };
        let name = self.out.qualify(owner, &cap[2]);
        let element = self.define(ElementKind::Property, &name, member, owner);
        self.out.result.elements[element].add_tag("getter");
        if let Some(ty) = cap.get(1) {
            self.out.type_edges(&name, ty.as_str(), RelationshipKind::HasType, member.start + 1);
        }
        let body = self.body_after(member, text.find("get").unwrap_or(0));
        self.body(&body, &name, member.start + 1);
    }

    fn visit_method(&mut self, member: &Member, owner: &str, is_constructor: bool, fields: &HashMap<String, String>) {
        let (signature, params_close) = self.signature(member);
        let text = self.declaration_text(member.start).to_string();
        let line = member.start + 1;

        let (simple, returns, modifiers) = if is_constructor {
            let after = strip_prefixes(&text, &["const ", "factory ", "external "]);
            let ctor = after.split('(').next().unwrap_or(after).trim();
            (ctor.to_string(), None, Vec::new())
        } else {
            let Some(cap) = METHOD.captures(&text) else {
                return;
            };
            let modifiers = cap[1].split_whitespace().map(str::to_string).collect();
            (cap[3].to_string(), cap.get(2).map(|t| t.as_str().to_string()), modifiers)
        };
        let name = self.out.qualify(owner, &simple);
        let element = self.define(ElementKind::Method, &name, member, owner);
        let body = self.body_after(member, params_close);
        {
            let is_function = owner == self.out.path;
            let element = &mut self.out.result.elements[element];
            for modifier in modifiers {
                element.add_tag(modifier);
            }
            if is_constructor {
                element.add_tag("constructor");
            }
            if is_function {
                element.add_tag("function");
            }
            if body.trim_start().starts_with("async") {
                element.add_tag("async");
            }
        }

        let params_open = signature.find('(').unwrap_or(0);
        // named `{}` and optional `[]` sections flatten into the list
        let params = signature
            .get(params_open + 1..params_close.saturating_sub(1))
            .unwrap_or_default()
            .replace(['{', '}', '[', ']'], " ");
        for param in split_commas(&params) {
            let Some((param_name, ty)) = parameter(param, fields) else {
                continue;
            };
            let outer = self.out.type_edges(&name, &ty, RelationshipKind::AcceptsType, line);
            if let (true, Some(injected)) = (is_constructor, outer) {
                self.out
                    .edge(owner, &injected, RelationshipKind::Injects, line)
                    .properties
                    .insert("parameter".to_string(), param_name.into());
                self.out.add_dependency(owner, &injected);
            }
        }

        if let Some(returns) = returns {
            self.out.type_edges(&name, &returns, RelationshipKind::ReturnsType, line);
        }

        self.body(&body, &name, line);
    }

    /// Declaration text from its first line to the parameter list's closing
    /// parenthesis, and the offset just past that parenthesis.
    fn signature(&self, member: &Member) -> (String, usize) {
        let mut text = String::new();
        let mut depth = 0i32;
        let mut seen = false;
        for idx in member.start..=member.end {
            let line = if idx == member.start {
                self.declaration_text(idx)
            } else {
                self.code[idx].as_str()
            };
            for ch in line.chars() {
                text.push(ch);
                match ch {
                    '(' => {
                        depth += 1;
                        seen = true;
                    }
                    ')' => {
                        depth -= 1;
                        if seen && depth == 0 {
                            let close = text.len();
                            return (text, close);
                        }
                    }
                    _ => {}
                }
            }
            text.push(' ');
        }
        let len = text.len();
        (text, len)
    }

    /// Member code after byte `offset` of its declaration text.
    fn body_after(&self, member: &Member, offset: usize) -> String {
        let mut body = String::new();
        for idx in member.start..=member.end {
            let line = if idx == member.start {
                self.declaration_text(idx)
            } else {
                self.code[idx].as_str()
            };
            body.push_str(line);
            body.push('\n');
        }
        body.get(offset..).unwrap_or_default().to_string()
    }

    fn body(&mut self, body: &str, member: &str, first_line: usize) {
        for (offset, line) in body.lines().enumerate() {
            let line_number = first_line + offset;
            if let Some(cap) = THROW.captures(line) {
                self.out.edge(member, base_name(&cap[1]), RelationshipKind::Throws, line_number);
            }
            for cap in ON_CATCH.captures_iter(line) {
                self.out.edge(member, &cap[1], RelationshipKind::Catches, line_number);
            }
            for cap in NEW_OBJECT.captures_iter(line) {
                self.out.type_edges(member, &cap[1], RelationshipKind::Uses, line_number);
            }
            for (callee, receiver) in calls(line, KEYWORDS) {
                let constructs = receiver.is_none()
                    && callee
                        .trim_start_matches('_')
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_ascii_uppercase());
                if constructs {
                    self.out.type_edges(member, callee, RelationshipKind::Uses, line_number);
                    continue;
                }
                let edge = self.out.edge(member, callee, RelationshipKind::Calls, line_number);
                if let Some(receiver) = receiver {
                    edge.properties.insert("receiver".to_string(), receiver.into());
                }
            }
        }
    }
}

fn strip_prefixes<'t>(mut text: &'t str, prefixes: &[&str]) -> &'t str {
    while let Some(rest) = prefixes.iter().find_map(|p| text.strip_prefix(p)) {
        text = rest.trim_start();
    }
    text
}

/// `Name(`, `Name.named(`, optionally after `const`/`factory`.
fn is_constructor(text: &str, class: &str) -> bool {
    let rest = strip_prefixes(text, &["const ", "factory ", "external "]);
    rest.strip_prefix(class)
        .map(|r| r.starts_with('(') || (r.starts_with('.') && r.contains('(')))
        .unwrap_or(false)
}

/// Split on commas outside `<>`, `()`, `[]` and `{}`.
fn split_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '<' | '(' | '[' | '{' => depth += 1,
            '>' | ')' | ']' | '}' => depth -= 1,
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

/// Parameter name and type. `this.x` takes the type of field `x`;
/// `super.x` and untyped parameters have none.
fn parameter(param: &str, fields: &HashMap<String, String>) -> Option<(String, String)> {
    let param = param.split('=').next()?.trim();
    let param = strip_prefixes(param, &["required ", "covariant ", "final "]);
    let param = ANNOTATION.replace(param, "");
    let param = param.trim();

    if let Some(field) = param.strip_prefix("this.") {
        let field = field.trim();
        return Some((field.to_string(), fields.get(field)?.clone()));
    }
    if param.starts_with("super.") {
        return None;
    }
    let (ty, name) = param.rsplit_once(char::is_whitespace)?;
    Some((name.to_string(), ty.trim().to_string()))
}

/// `extends A with B, C implements D` as `(keyword, list)` pairs.
fn heritage_clauses(text: &str) -> Vec<(&str, &str)> {
    let text = text.split('{').next().unwrap_or(text);
    let marks: Vec<_> = HERITAGE_KEYWORD.find_iter(text).collect();
    marks
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let end = marks.get(i + 1).map_or(text.len(), |next| next.start());
            (m.as_str().trim(), text[m.end()..end].trim())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"import 'package:flutter/material.dart';
import 'package:app/data/order_repository.dart';

/// Shows orders.
@immutable
class OrderPage extends StatefulWidget with Diagnosticable implements Screen {
  const OrderPage({super.key, required this.repository});

  final OrderRepository repository;

  @override
  State<OrderPage> createState() => _OrderPageState();
}

class _OrderPageState extends State<OrderPage> {
  int count = 0;
  List<Order> orders = [];

  Future<void> load(String id) async {
    try {
      final result = await widget.repository.fetch(id);
      setState(() {
        orders = result;
      });
    } on NetworkException catch (e) {
      throw OrderLoadException(e.message);
    }
  }

  int get total => orders.length;
}

void main() {
  runApp(const App());
}
"#;

    fn parse(source: &str) -> ParseResult {
        DartParser::default().parse_file("lib/orders/order_page.dart", source, None, &CancellationToken::new())
    }

    #[test]
    fn test_declarations_and_edges() {
        let result = parse(SOURCE);
        assert!(result.success(), "{:?}", result.errors());
        let path = "lib/orders/order_page.dart";

        assert!(result.has_relationship(path, "package:flutter/material.dart", RelationshipKind::Imports));

        let page = result.element("OrderPage").unwrap();
        assert_eq!(page.kind, ElementKind::Class);
        assert_eq!(page.summary, "Shows orders.");
        assert!(result.has_relationship("OrderPage", "immutable", RelationshipKind::HasAttribute));
        assert!(result.has_relationship("OrderPage", "StatefulWidget", RelationshipKind::Inherits));
        assert!(result.has_relationship("OrderPage", "Diagnosticable", RelationshipKind::Implements));
        assert!(result.has_relationship("OrderPage", "Screen", RelationshipKind::Implements));

        assert!(result.element("OrderPage.OrderPage").unwrap().has_tag("constructor"));
        assert!(result.has_relationship("OrderPage", "OrderRepository", RelationshipKind::Injects));
        assert!(page.dependencies.contains(&"OrderRepository".to_string()));
        assert!(result.has_relationship("OrderPage.repository", "OrderRepository", RelationshipKind::HasType));

        assert!(result.has_relationship("OrderPage.createState", "State", RelationshipKind::ReturnsType));
        assert!(result.has_relationship("OrderPage.createState", "override", RelationshipKind::HasAttribute));
        assert!(result.has_relationship("OrderPage.createState", "_OrderPageState", RelationshipKind::Uses));

        assert!(result.has_relationship("_OrderPageState", "State", RelationshipKind::Inherits));
        assert!(result.has_relationship("_OrderPageState", "OrderPage", RelationshipKind::UsesGeneric));
        assert!(result.has_relationship("_OrderPageState.orders", "List", RelationshipKind::HasType));
        assert!(result.element("_OrderPageState.count").is_some());

        let load = result.element("_OrderPageState.load").unwrap();
        assert!(load.has_tag("async"));
        assert!(load.content.trim_end().ends_with('}'));
        assert!(result.has_relationship("_OrderPageState.load", "Future", RelationshipKind::ReturnsType));
        assert!(result.has_relationship("_OrderPageState.load", "fetch", RelationshipKind::Calls));
        assert!(result.has_relationship("_OrderPageState.load", "setState", RelationshipKind::Calls));
        assert!(result.has_relationship("_OrderPageState.load", "NetworkException", RelationshipKind::Catches));
        assert!(result.has_relationship("_OrderPageState.load", "OrderLoadException", RelationshipKind::Throws));

        assert_eq!(result.element("_OrderPageState.total").unwrap().kind, ElementKind::Property);

        assert!(result.element("main").unwrap().has_tag("function"));
        assert!(result.has_relationship("main", "runApp", RelationshipKind::Calls));
        assert!(result.has_relationship("main", "App", RelationshipKind::Uses));
    }

    #[test]
    fn test_extension_and_mixin() {
        let source = "mixin Logging on Service {\n  void log(String m) {}\n}\n\nextension Money on int {\n  String get euros => '$this EUR';\n}\n";
        let result = parse(source);
        assert!(result.element("Logging").unwrap().has_tag("mixin"));
        assert!(result.has_relationship("Logging", "Service", RelationshipKind::Inherits));
        assert!(result.element("Logging.log").is_some());
        assert!(result.element("Money").unwrap().has_tag("extension"));
        assert!(result.element("Money.euros").is_some());
    }
}
