//! Bicep parser.
//!
//! Bicep has no grammar in the tree-sitter stack used here, so top-level
//! declarations are recognized line by line and their spans found by
//! bracket counting over string-free lines.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::text::code_only;
use super::traits::{Parser, ParserCapability};
use super::types::TypeSystem;
use crate::config::ScanConfig;
use crate::detectors::{iac, DetectorBank};
use crate::model::{ElementKind, ParseResult, RelationshipKind};

static TARGET_SCOPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^targetScope\s*=\s*'([^']+)'").unwrap());

static PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^param\s+(\w+)\s+([\w.]+(?:\[\])?)").unwrap());

static VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^var\s+(\w+)\s*=").unwrap());

static RESOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^resource\s+(\w+)\s+'([^'@]+)(?:@([^']+))?'(\s+existing)?").unwrap()
});

static MODULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^module\s+(\w+)\s+'([^']+)'").unwrap());

static OUTPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^output\s+(\w+)\s+([\w.]+(?:\[\])?)").unwrap());

static TYPE_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^type\s+(\w+)\s*=").unwrap());

static DECORATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@(?:sys\.)?(\w+)\s*(?:\((.*)\))?").unwrap());

static FUNCTION_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([a-z]\w*)\s*\(").unwrap());

static SYMBOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z_]\w*\b").unwrap());

const BICEP_PRIMITIVES: &[&str] = &["string", "int", "bool", "object", "array", "any"];

const KEYWORDS: &[&str] = &["if", "for", "in"];

/// Bicep language parser.
pub struct BicepParser {
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl BicepParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            resolver: ContextResolver::new(&config.context),
            banks: vec![iac::bicep_bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }
}

impl Default for BicepParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for BicepParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, "Bicep");
        if session.cancelled(cancel) {
            return session.finish();
        }

        let context = session.context.clone();
        session.extract("Bicep declarations", |result| {
            let mut walker = Walker::new(content, Emitter::new(path, &context, TypeSystem::TypeScript, result));
            walker.walk();
        });

        session.detect(&self.banks, None, None, self.snippet_lines);
        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "Bicep"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["bicep"]
    }

    fn capability(&self) -> ParserCapability {
        ParserCapability::Basic
    }
}

/// One top-level declaration.
struct Declaration {
    kind: ElementKind,
    keyword: &'static str,
    symbol: String,
    start: usize,
    end: usize,
    decorators: Vec<(String, String)>,
}

struct Walker<'a, 'r> {
    lines: Vec<&'a str>,
    code: Vec<String>,
    out: Emitter<'a, 'r>,
}

impl<'a, 'r> Walker<'a, 'r> {
    fn new(source: &'a str, out: Emitter<'a, 'r>) -> Self {
        let lines: Vec<&str> = source.lines().collect();
        let code = lines.iter().map(|l| code_only(l, "//")).collect();
        Self { lines, code, out }
    }

    fn walk(&mut self) {
        let declarations = self.declarations();
        let symbols: BTreeSet<String> = declarations.iter().map(|d| d.symbol.clone()).collect();

        for declaration in &declarations {
            self.visit(declaration, &symbols);
        }
    }

    /// Top-level declarations with their decorators and line spans.
    fn declarations(&mut self) -> Vec<Declaration> {
        let mut found = Vec::new();
        let mut decorators = Vec::new();
        let mut idx = 0;

        while idx < self.lines.len() {
            let line = self.lines[idx].trim();

            if let Some(scope) = TARGET_SCOPE.captures(line) {
                if let Some(file) = self.out.result.file_element_mut() {
                    file.metadata.insert("target_scope".to_string(), Value::from(&scope[1]));
                }
            }

            if let Some(cap) = DECORATOR.captures(line) {
                let args = cap.get(2).map(|a| a.as_str().to_string()).unwrap_or_default();
                decorators.push((cap[1].to_string(), args));
                idx += 1;
                continue;
            }

            let declared = [
                ("param", ElementKind::Property, &*PARAM),
                ("var", ElementKind::Property, &*VAR),
                ("resource", ElementKind::Class, &*RESOURCE),
                ("module", ElementKind::Class, &*MODULE),
                ("output", ElementKind::Property, &*OUTPUT),
                ("type", ElementKind::Class, &*TYPE_DECL),
            ]
            .into_iter()
            .find_map(|(keyword, kind, re)| re.captures(line).map(|cap| (keyword, kind, cap[1].to_string())));

            match declared {
                Some((keyword, kind, symbol)) => {
                    let end = self.span_end(idx);
                    found.push(Declaration {
                        kind,
                        keyword,
                        symbol,
                        start: idx,
                        end,
                        decorators: std::mem::take(&mut decorators),
                    });
                    idx = end + 1;
                }
                None => {
                    if !line.is_empty() && !line.starts_with("//") {
                        decorators.clear();
                    }
                    idx += 1;
                }
            }
        }
        found
    }

    /// Last line of the declaration starting at `start`: the line where
    /// opened brackets balance again.
    fn span_end(&self, start: usize) -> usize {
        let mut depth = 0i32;
        for (idx, line) in self.code.iter().enumerate().skip(start) {
            for ch in line.chars() {
                match ch {
                    '{' | '[' | '(' => depth += 1,
                    '}' | ']' | ')' => depth -= 1,
                    _ => {}
                }
            }
            if depth <= 0 {
                return idx;
            }
        }
        self.lines.len().saturating_sub(1)
    }

    fn visit(&mut self, declaration: &Declaration, symbols: &BTreeSet<String>) {
        let header = self.lines[declaration.start].trim();
        let line = declaration.start + 1;
        let name = declaration.symbol.as_str();

        let mut element = self
            .out
            .element(declaration.kind, name, line)
            .with_content(self.lines[declaration.start..=declaration.end].join("\n"))
            .with_signature(header.trim_end_matches('{').trim())
            .with_tag(declaration.keyword)
            .with_metadata("end_line", declaration.end + 1);

        for (decorator, args) in &declaration.decorators {
            if decorator == "description" {
                element.summary = args.trim().trim_matches('\'').to_string();
            }
            if decorator == "secure" {
                element.add_tag("secure");
            }
        }

        match declaration.keyword {
            "resource" => {
                if let Some(cap) = RESOURCE.captures(header) {
                    element.add_tag(&cap[2]);
                    element.metadata.insert("resource_type".to_string(), Value::from(&cap[2]));
                    if let Some(version) = cap.get(3) {
                        element.metadata.insert("api_version".to_string(), Value::from(version.as_str()));
                    }
                    if cap.get(4).is_some() {
                        element.add_tag("existing");
                    }
                }
            }
            "module" => {
                if let Some(cap) = MODULE.captures(header) {
                    element.add_dependency(&cap[2]);
                }
            }
            _ => {}
        }

        let path = self.out.path;
        self.out.define(path, element);

        for (decorator, _) in &declaration.decorators {
            self.out.edge(name, decorator, RelationshipKind::HasAttribute, line);
        }

        match declaration.keyword {
            "param" | "output" => {
                let re = if declaration.keyword == "param" { &*PARAM } else { &*OUTPUT };
                if let Some(cap) = re.captures(header) {
                    let ty = cap[2].trim_end_matches("[]");
                    if !BICEP_PRIMITIVES.contains(&ty) {
                        self.out.edge(name, ty, RelationshipKind::HasType, line);
                    }
                }
            }
            "module" => {
                if let Some(cap) = MODULE.captures(header) {
                    self.out.edge(name, &cap[2], RelationshipKind::Imports, line);
                }
            }
            _ => {}
        }

        self.references(declaration, symbols);
    }

    /// Symbols of other declarations and function calls used in the body.
    fn references(&mut self, declaration: &Declaration, symbols: &BTreeSet<String>) {
        let name = declaration.symbol.as_str();
        let header_end = self.code[declaration.start].find('=').map(|i| i + 1).unwrap_or(0);

        let mut used = BTreeSet::new();
        let mut called = Vec::new();
        for idx in declaration.start..=declaration.end {
            let code = if idx == declaration.start {
                self.code[idx].get(header_end..).unwrap_or_default()
            } else {
                self.code[idx].as_str()
            };
            for m in SYMBOL.find_iter(code) {
                let symbol = m.as_str();
                if symbol != name && symbols.contains(symbol) && !code[..m.start()].ends_with('.') {
                    used.insert((symbol.to_string(), idx + 1));
                }
            }
            for cap in FUNCTION_CALL.captures_iter(code) {
                let callee = cap[1].to_string();
                if !KEYWORDS.contains(&callee.as_str()) && !symbols.contains(&callee) {
                    called.push((callee, idx + 1));
                }
            }
        }

        let mut seen = BTreeSet::new();
        for (symbol, line) in used {
            if seen.insert(symbol.clone()) {
                self.out.edge(name, &symbol, RelationshipKind::Uses, line);
            }
        }
        for (callee, line) in called {
            self.out.edge(name, &callee, RelationshipKind::Calls, line);
        }
    }
}
