//! Terraform (HCL) parser using tree-sitter.
//!
//! Top-level blocks become elements named by their Terraform address:
//!
//! - `resource "type" "name"` -> `type.name`
//! - `data "type" "name"` -> `data.type.name`
//! - `module "name"` -> `module.name`
//! - `variable "name"` -> `var.name`
//! - `output "name"` -> `output.name`
//! - `provider "name"` -> `provider.name`
//! - `locals` attributes -> `local.name`
//! - `terraform` -> `terraform`
//!
//! References between blocks (`var.x`, `module.y.out`, `aws_vpc.main.id`)
//! become `Uses` edges; they are not resolved.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tree_sitter::Node;

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::traits::{AstProvider, Parser};
use super::treesitter::{first_error_line, visit_all, TreeSitterProvider};
use super::types::TypeSystem;
use crate::config::ScanConfig;
use crate::detectors::{iac, DetectorBank};
use crate::model::{ElementKind, ParseResult, RelationshipKind};

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:(?:var|local|module)\.[A-Za-z_][\w-]*|data\.[A-Za-z_][\w-]*\.[A-Za-z_][\w-]*|[a-z][a-z0-9]*_[a-z0-9_]+\.[A-Za-z_][\w-]*)",
    )
    .unwrap()
});

/// Terraform language parser.
pub struct TerraformParser {
    provider: TreeSitterProvider,
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl TerraformParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            provider: TreeSitterProvider::new(tree_sitter_hcl::LANGUAGE.into(), "Terraform"),
            resolver: ContextResolver::new(&config.context),
            banks: vec![iac::terraform_bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }
}

impl Default for TerraformParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for TerraformParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, "Terraform");
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

        let is_tfvars = path.to_ascii_lowercase().ends_with(".tfvars");
        let context = session.context.clone();
        session.extract("Terraform blocks", |result| {
            let mut walker = Walker {
                source: content,
                is_tfvars,
                // HasType edges are emitted as written; type_edges is never used here
                out: Emitter::new(path, &context, TypeSystem::TypeScript, result),
            };
            walker.walk(&tree.root_node());
        });

        session.detect(&self.banks, Some(&tree), None, self.snippet_lines);
        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "Terraform"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["tf", "tfvars"]
    }
}

struct Walker<'a, 'r> {
    source: &'a str,
    is_tfvars: bool,
    out: Emitter<'a, 'r>,
}

impl<'a, 'r> Walker<'a, 'r> {
    fn text(&self, node: &Node) -> &'a str {
        TreeSitterProvider::node_text(node, self.source)
    }

    fn walk(&mut self, root: &Node) {
        let Some(body) = TreeSitterProvider::child_of_kind(root, "body") else {
            return;
        };
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            match child.kind() {
                "block" => self.visit_block(&child),
                "attribute" if self.is_tfvars => self.visit_tfvar(&child),
                _ => {}
            }
        }
    }

    /// Block type and its string labels.
    fn header(&self, block: &Node) -> Option<(&'a str, Vec<&'a str>)> {
        let mut cursor = block.walk();
        let mut block_type = None;
        let mut labels = Vec::new();
        for child in block.children(&mut cursor) {
            match child.kind() {
                "identifier" if block_type.is_none() => block_type = Some(self.text(&child)),
                "string_lit" => labels.push(self.text(&child).trim_matches('"')),
                "block_start" => break,
                _ => {}
            }
        }
        Some((block_type?, labels))
    }

    /// `name = expression` pairs directly inside a block body.
    fn attributes<'t>(block: &Node<'t>) -> Vec<Node<'t>> {
        TreeSitterProvider::child_of_kind(block, "body")
            .map(|body| TreeSitterProvider::children_of_kind(&body, "attribute"))
            .unwrap_or_default()
    }

    fn nested_blocks<'t>(block: &Node<'t>) -> Vec<Node<'t>> {
        TreeSitterProvider::child_of_kind(block, "body")
            .map(|body| TreeSitterProvider::children_of_kind(&body, "block"))
            .unwrap_or_default()
    }

    fn attribute(&self, attribute: &Node) -> Option<(&'a str, &'a str)> {
        let name = TreeSitterProvider::child_of_kind(attribute, "identifier")?;
        let value = TreeSitterProvider::child_of_kind(attribute, "expression")?;
        Some((self.text(&name), self.text(&value)))
    }

    fn attribute_value(&self, block: &Node, key: &str) -> Option<&'a str> {
        Self::attributes(block)
            .iter()
            .filter_map(|a| self.attribute(a))
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.trim().trim_matches('"'))
    }

    fn visit_block(&mut self, block: &Node) {
        let Some((block_type, labels)) = self.header(block) else {
            return;
        };

        if block_type == "locals" {
            for attribute in Self::attributes(block) {
                if let Some((name, value)) = self.attribute(&attribute) {
                    let local = format!("local.{}", name);
                    self.define(ElementKind::Property, &local, &attribute, "local");
                    self.references(&local, value, TreeSitterProvider::node_line(&attribute));
                }
            }
            return;
        }

        let (name, kind) = match (block_type, labels.as_slice()) {
            ("resource", [ty, name, ..]) => (format!("{}.{}", ty, name), ElementKind::Class),
            ("data", [ty, name, ..]) => (format!("data.{}.{}", ty, name), ElementKind::Class),
            ("module", [name, ..]) => (format!("module.{}", name), ElementKind::Class),
            ("variable", [name, ..]) => (format!("var.{}", name), ElementKind::Property),
            ("output", [name, ..]) => (format!("output.{}", name), ElementKind::Property),
            ("provider", [name, ..]) => (format!("provider.{}", name), ElementKind::Class),
            (other, []) => (other.to_string(), ElementKind::Class),
            (other, labels) => (format!("{}.{}", other, labels.join(".")), ElementKind::Class),
        };

        let index = self.define(kind, &name, block, block_type);
        let line = TreeSitterProvider::node_line(block);
        {
            let element = &mut self.out.result.elements[index];
            if matches!(block_type, "resource" | "data") {
                if let Some(ty) = labels.first() {
                    element.add_tag(*ty);
                    element.metadata.insert("resource_type".to_string(), Value::from(*ty));
                }
            }
        }

        match block_type {
            "module" => self.visit_module(block, &name, index),
            "variable" => {
                if let Some(ty) = self.attribute_value(block, "type") {
                    self.out.edge(&name, ty, RelationshipKind::HasType, line);
                }
                self.describe(block, index);
            }
            "output" => self.describe(block, index),
            "terraform" => self.visit_terraform(block, index),
            _ => {}
        }

        if matches!(block_type, "resource" | "data" | "module" | "output" | "provider") {
            let body = self.text(block);
            let start = body.find('{').unwrap_or(0);
            self.references(&name, &body[start..], line);
            self.function_calls(block, &name);
        }
    }

    fn define(&mut self, kind: ElementKind, name: &str, node: &Node, block_type: &str) -> usize {
        let element = self
            .out
            .element(kind, name, TreeSitterProvider::node_line(node))
            .with_content(self.text(node))
            .with_signature(TreeSitterProvider::signature(node, self.source))
            .with_tag(block_type)
            .with_metadata("block_type", block_type)
            .with_metadata("end_line", TreeSitterProvider::node_end_line(node));
        let path = self.out.path;
        self.out.define(path, element);
        self.out.result.elements.len() - 1
    }

    fn describe(&mut self, block: &Node, index: usize) {
        if let Some(description) = self.attribute_value(block, "description") {
            self.out.result.elements[index].summary = description.to_string();
        }
    }

    fn visit_module(&mut self, block: &Node, name: &str, index: usize) {
        let line = TreeSitterProvider::node_line(block);
        if let Some(source) = self.attribute_value(block, "source") {
            self.out.edge(name, source, RelationshipKind::Imports, line);
            self.out.result.elements[index].add_dependency(source);
        }
        if let Some(version) = self.attribute_value(block, "version") {
            self.out.result.elements[index]
                .metadata
                .insert("version".to_string(), Value::from(version));
        }
    }

    /// `required_version`, `required_providers` and `backend`.
    fn visit_terraform(&mut self, block: &Node, index: usize) {
        if let Some(version) = self.attribute_value(block, "required_version") {
            self.out.result.elements[index]
                .metadata
                .insert("required_version".to_string(), Value::from(version));
        }

        for nested in Self::nested_blocks(block) {
            let Some((nested_type, labels)) = self.header(&nested) else {
                continue;
            };
            match nested_type {
                "backend" | "cloud" => {
                    let backend = labels.first().copied().unwrap_or(nested_type);
                    self.out.result.elements[index]
                        .metadata
                        .insert("backend".to_string(), Value::from(backend));
                }
                "required_providers" => {
                    for attribute in Self::attributes(&nested) {
                        let Some((local_name, value)) = self.attribute(&attribute) else {
                            continue;
                        };
                        let source = object_field(value, "source").unwrap_or(local_name);
                        let path = self.out.path;
                        let edge = self.out.edge(
                            path,
                            source,
                            RelationshipKind::Imports,
                            TreeSitterProvider::node_line(&attribute),
                        );
                        edge.properties.insert("provider".to_string(), local_name.into());
                        if let Some(version) = object_field(value, "version") {
                            edge.properties.insert("version".to_string(), version.into());
                        }
                        self.out.result.elements[index].add_dependency(source);
                    }
                }
                _ => {}
            }
        }
    }

    /// `name = value` in a `.tfvars` file.
    fn visit_tfvar(&mut self, attribute: &Node) {
        if let Some((name, _)) = self.attribute(attribute) {
            self.define(ElementKind::Property, &format!("var.{}", name), attribute, "tfvars");
        }
    }

    /// Distinct references in `text` as `Uses` edges.
    fn references(&mut self, from: &str, text: &str, line: usize) {
        let targets: BTreeSet<&str> = REFERENCE
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|r| *r != from)
            .collect();
        for target in targets {
            self.out.edge(from, target, RelationshipKind::Uses, line);
        }
    }

    /// Built-in function calls (`lookup`, `merge`, ...) as `Calls` edges.
    fn function_calls(&mut self, block: &Node, from: &str) {
        let mut calls = Vec::new();
        visit_all(block, &mut |node| {
            if node.kind() == "function_call" {
                if let Some(name) = TreeSitterProvider::child_of_kind(node, "identifier") {
                    calls.push((self.text(&name), TreeSitterProvider::node_line(node)));
                }
            }
        });
        for (callee, line) in calls {
            self.out.edge(from, callee, RelationshipKind::Calls, line);
        }
    }
}

/// `key = "value"` inside an HCL object expression.
fn object_field<'t>(object: &'t str, key: &str) -> Option<&'t str> {
    let start = object.find(key)?;
    let rest = &object[start + key.len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let rest = rest.strip_prefix('"')?;
    rest.split('"').next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN_TF: &str = r#"
terraform {
  required_version = ">= 1.5"
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
  backend "s3" {
    bucket = "state"
  }
}

variable "instance_type" {
  type        = string
  description = "EC2 instance size"
}

locals {
  name = "web-${var.instance_type}"
}

module "vpc" {
  source  = "terraform-aws-modules/vpc/aws"
  version = "5.1.0"
}

data "aws_ami" "ubuntu" {
  most_recent = true
}

resource "aws_instance" "web" {
  ami           = data.aws_ami.ubuntu.id
  instance_type = var.instance_type
  subnet_id     = module.vpc.private_subnets[0]
  tags          = merge(local.tags, { Name = local.name })
}

output "web_ip" {
  description = "Public IP"
  value       = aws_instance.web.public_ip
}
"#;

    fn parse(path: &str, source: &str) -> ParseResult {
        TerraformParser::default().parse_file(path, source, None, &CancellationToken::new())
    }

    #[test]
    fn test_blocks_become_addresses() {
        let result = parse("infra/network/main.tf", MAIN_TF);
        assert!(result.success(), "{:?}", result.errors());
        let path = "infra/network/main.tf";

        let terraform = result.element("terraform").unwrap();
        assert_eq!(terraform.metadata["backend"], "s3");
        assert_eq!(terraform.metadata["required_version"], ">= 1.5");
        assert!(result.has_relationship(path, "hashicorp/aws", RelationshipKind::Imports));

        let var = result.element("var.instance_type").unwrap();
        assert_eq!(var.kind, ElementKind::Property);
        assert_eq!(var.summary, "EC2 instance size");
        assert!(result.has_relationship("var.instance_type", "string", RelationshipKind::HasType));

        assert!(result.element("local.name").is_some());
        assert!(result.has_relationship("local.name", "var.instance_type", RelationshipKind::Uses));

        assert!(result.has_relationship("module.vpc", "terraform-aws-modules/vpc/aws", RelationshipKind::Imports));
        assert_eq!(result.element("module.vpc").unwrap().metadata["version"], "5.1.0");

        let web = result.element("aws_instance.web").unwrap();
        assert_eq!(web.kind, ElementKind::Class);
        assert!(web.has_tag("resource"));
        assert!(web.has_tag("aws_instance"));
        assert!(result.has_relationship(path, "aws_instance.web", RelationshipKind::Defines));
        assert!(result.has_relationship("aws_instance.web", "data.aws_ami.ubuntu", RelationshipKind::Uses));
        assert!(result.has_relationship("aws_instance.web", "var.instance_type", RelationshipKind::Uses));
        assert!(result.has_relationship("aws_instance.web", "module.vpc", RelationshipKind::Uses));
        assert!(result.has_relationship("aws_instance.web", "local.tags", RelationshipKind::Uses));
        assert!(result.has_relationship("aws_instance.web", "merge", RelationshipKind::Calls));

        assert!(result.element("data.aws_ami.ubuntu").is_some());
        assert!(result.has_relationship("output.web_ip", "aws_instance.web", RelationshipKind::Uses));
    }

    #[test]
    fn test_tfvars() {
        let result = parse("env/prod.tfvars", "instance_type = \"t3.large\"\nregion = \"eu-west-1\"\n");
        assert!(result.element("var.instance_type").unwrap().has_tag("tfvars"));
        assert!(result.element("var.region").is_some());
    }

    #[test]
    fn test_object_field() {
        let object = "{\n source = \"hashicorp/aws\"\n version = \"~> 5.0\"\n}";
        assert_eq!(object_field(object, "source"), Some("hashicorp/aws"));
        assert_eq!(object_field(object, "version"), Some("~> 5.0"));
        assert_eq!(object_field(object, "missing"), None);
    }
}
