//! Azure Resource Manager template parser.
//!
//! A `.json` file is only treated as a template when [`is_arm_template`]
//! says so; otherwise the parser returns a result with no elements and the
//! router falls back to generic JSON.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::text::line_at;
use super::traits::Parser;
use super::types::TypeSystem;
use crate::config::ScanConfig;
use crate::detectors::{iac, DetectorBank};
use crate::error::ParseError;
use crate::model::{ElementKind, ParseResult, RelationshipKind};

static EXPRESSION_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(parameters|variables)\(\s*'([^']+)'\s*\)").unwrap());

static RESOURCE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\s*resourceId\(\s*'([^']+)'\s*,\s*(.+)\)\s*\]$").unwrap());

/// `$schema` plus a deployment-template schema, a managed-application
/// marker, or a top-level `resources` / `parameters` key.
pub fn is_arm_template(document: &Value) -> bool {
    let Some(object) = document.as_object() else {
        return false;
    };
    let Some(schema) = object.get("$schema") else {
        return false;
    };
    let schema = schema.as_str().unwrap_or_default().to_ascii_lowercase();

    schema.contains("deploymenttemplate")
        || schema.contains("deploymentparameters")
        || schema.contains("managedapplication")
        || object.contains_key("resources")
        || object.contains_key("parameters")
}

/// ARM template parser.
pub struct ArmTemplateParser {
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl ArmTemplateParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            resolver: ContextResolver::new(&config.context),
            banks: vec![iac::arm_bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }
}

impl Default for ArmTemplateParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for ArmTemplateParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        if cancel.is_cancelled() {
            return ParseResult::failed(path, ParseError::Cancelled(path.to_string()));
        }

        let document = match serde_json::from_str::<Value>(content) {
            Ok(document) if is_arm_template(&document) => document,
            Ok(_) => return ParseResult::new(path),
            Err(e) => {
                tracing::trace!(path, error = %e, "not valid JSON, skipping template parse");
                return ParseResult::new(path);
            }
        };

        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, "ARM");

        let context = session.context.clone();
        session.extract("ARM template", |result| {
            let mut walker = Walker {
                source: content,
                cursor: 0,
                out: Emitter::new(path, &context, TypeSystem::TypeScript, result),
            };
            walker.walk(&document);
        });

        session.detect(&self.banks, None, Some(&document), self.snippet_lines);
        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "ARM"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["json"]
    }
}

struct Walker<'a, 'r> {
    source: &'a str,
    /// Byte offset where the next key lookup starts; keys are visited in
    /// document order.
    cursor: usize,
    out: Emitter<'a, 'r>,
}

impl<'a, 'r> Walker<'a, 'r> {
    /// Line of the next `"key"` occurrence.
    fn locate(&mut self, key: &str) -> usize {
        let needle = format!("\"{}\"", key);
        match self.source[self.cursor..].find(&needle) {
            Some(offset) => {
                let at = self.cursor + offset;
                self.cursor = at + needle.len();
                line_at(self.source, at)
            }
            None => 1,
        }
    }

    fn walk(&mut self, document: &Value) {
        if let Some(file) = self.out.result.file_element_mut() {
            file.add_tag("arm");
            for key in ["$schema", "contentVersion"] {
                if let Some(value) = document.get(key).and_then(Value::as_str) {
                    file.metadata.insert(key.trim_start_matches('$').to_string(), Value::from(value));
                }
            }
        }

        // Sections in the order templates conventionally write them.
        for section in ["parameters", "variables", "resources", "outputs"] {
            let Some(value) = document.get(section) else {
                continue;
            };
            self.cursor = self.section_start(section);
            match (section, value) {
                ("resources", Value::Array(resources)) => {
                    let path = self.out.path;
                    self.visit_resources(resources, path);
                }
                // languageVersion 2.0 keys resources by symbolic name
                ("resources", Value::Object(resources)) => {
                    let path = self.out.path;
                    for (symbol, resource) in resources {
                        self.visit_resource(resource, path, Some(symbol));
                    }
                }
                (_, Value::Object(entries)) => self.visit_entries(section, entries),
                _ => {}
            }
        }
    }

    fn section_start(&self, section: &str) -> usize {
        self.source.find(&format!("\"{}\"", section)).unwrap_or(0)
    }

    /// `parameters`, `variables` and `outputs` entries.
    fn visit_entries(&mut self, section: &str, entries: &Map<String, Value>) {
        let start = self.cursor;
        for (key, value) in entries {
            let name = format!("{}.{}", section, key);
            // map order is not document order
            self.cursor = start;
            let line = self.locate(key);
            let mut element = self
                .out
                .element(ElementKind::Property, &name, line)
                .with_content(serde_json::to_string_pretty(value).unwrap_or_default())
                .with_tag(section.trim_end_matches('s'));

            if let Some(ty) = value.get("type").and_then(Value::as_str) {
                element.metadata.insert("type".to_string(), Value::from(ty));
                element.signature = format!("{} {}", ty, key);
                if ty.eq_ignore_ascii_case("securestring") || ty.eq_ignore_ascii_case("secureobject") {
                    element.add_tag("secure");
                }
            }
            if let Some(description) = value
                .get("metadata")
                .and_then(|m| m.get("description"))
                .and_then(Value::as_str)
            {
                element.summary = description.to_string();
            }
            if value.get("defaultValue").is_some() {
                element.metadata.insert("has_default".to_string(), Value::Bool(true));
            }

            let path = self.out.path;
            self.out.define(path, element);
            self.references(&name, value, line);
        }
    }

    fn visit_resources(&mut self, resources: &[Value], owner: &str) {
        for resource in resources {
            self.visit_resource(resource, owner, None);
        }
    }

    fn visit_resource(&mut self, resource: &Value, owner: &str, symbol: Option<&str>) {
        let Some(resource_type) = resource.get("type").and_then(Value::as_str) else {
            return;
        };
        let resource_name = resource.get("name").and_then(Value::as_str);
        let line = self.locate(resource_type);

        let name = match (symbol, resource_name) {
            (Some(symbol), _) => symbol.to_string(),
            (None, Some(resource_name)) => format!("{}/{}", resource_type, resource_name),
            (None, None) => resource_type.to_string(),
        };

        let mut element = self
            .out
            .element(ElementKind::Class, &name, line)
            .with_content(serde_json::to_string_pretty(resource).unwrap_or_default())
            .with_tag("resource")
            .with_tag(resource_type)
            .with_metadata("resource_type", resource_type);
        if let Some(version) = resource.get("apiVersion").and_then(Value::as_str) {
            element.metadata.insert("api_version".to_string(), Value::from(version));
            element.signature = format!("{}@{}", resource_type, version);
        }
        if let Some(resource_name) = resource_name {
            element.metadata.insert("resource_name".to_string(), Value::from(resource_name));
        }
        if let Some(location) = resource.get("location").and_then(Value::as_str) {
            element.metadata.insert("location".to_string(), Value::from(location));
        }
        if resource.get("condition").is_some() {
            element.add_tag("conditional");
        }
        if resource.get("copy").is_some() {
            element.add_tag("copy");
        }

        self.out.define(owner, element);

        if let Some(depends_on) = resource.get("dependsOn").and_then(Value::as_array) {
            for dependency in depends_on.iter().filter_map(Value::as_str) {
                let target = dependency_target(dependency);
                self.out.edge(&name, &target, RelationshipKind::Uses, line);
                self.out.add_dependency(&name, &target);
            }
        }

        // Nested resources stay under their parent.
        let mut stripped = resource.clone();
        let children = stripped
            .as_object_mut()
            .and_then(|o| o.remove("resources"));
        self.references(&name, &stripped, line);

        if let Some(Value::Array(children)) = children {
            self.visit_resources(&children, &name);
        }
    }

    /// `parameters('x')` and `variables('y')` inside any string value.
    fn references(&mut self, from: &str, value: &Value, line: usize) {
        let mut targets = Vec::new();
        collect_strings(value, &mut |text| {
            for cap in EXPRESSION_REFERENCE.captures_iter(text) {
                let target = format!("{}.{}", &cap[1], &cap[2]);
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        });
        for target in targets {
            if target != from {
                self.out.edge(from, &target, RelationshipKind::Uses, line);
            }
        }
    }
}

fn collect_strings(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(text) => f(text),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, f)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, f)),
        _ => {}
    }
}

/// `[resourceId('Microsoft.Network/virtualNetworks', 'vnet')]` becomes
/// `Microsoft.Network/virtualNetworks/vnet`, matching the names given to
/// resource elements. Name arguments that are expressions are kept in
/// brackets; anything else is kept as written.
fn dependency_target(dependency: &str) -> String {
    let Some(cap) = RESOURCE_ID.captures(dependency.trim()) else {
        return dependency.to_string();
    };
    let names: Vec<String> = split_arguments(&cap[2])
        .into_iter()
        .map(|arg| match arg.strip_prefix('\'').and_then(|a| a.strip_suffix('\'')) {
            Some(literal) => literal.to_string(),
            None => format!("[{}]", arg),
        })
        .collect();
    format!("{}/{}", &cap[1], names.join("/"))
}

/// Comma-separated arguments, ignoring commas inside nested calls.
fn split_arguments(args: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, ch) in args.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                out.push(args[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    out.push(args[start..].trim());
    out
}
