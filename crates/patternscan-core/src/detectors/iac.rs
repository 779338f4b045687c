//! Infrastructure-as-Code detectors: Terraform, Bicep and ARM templates.
//!
//! Terraform and Bicep are scanned as text. ARM detectors read the parsed
//! JSON document and look up line numbers in the raw source.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::common::HardcodedSecretDetector;
use super::{snippet, DetectionContext, DetectorBank};
use crate::config::DetectorConfig;
use crate::model::{CodePattern, PatternCategory, PatternType};

const TF_PROVIDER_DOC_URL: &str =
    "https://developer.hashicorp.com/terraform/language/providers/requirements";
const TF_MODULE_DOC_URL: &str =
    "https://developer.hashicorp.com/terraform/language/modules/sources";
const TF_BACKEND_DOC_URL: &str =
    "https://developer.hashicorp.com/terraform/language/settings/backends/configuration";
const NSG_DOC_URL: &str =
    "https://learn.microsoft.com/azure/virtual-network/network-security-groups-overview";
const TAGS_DOC_URL: &str =
    "https://learn.microsoft.com/azure/azure-resource-manager/management/tag-resources";
const BICEP_RESOURCE_DOC_URL: &str =
    "https://learn.microsoft.com/azure/azure-resource-manager/bicep/resource-declaration";
const BICEP_SECURE_DOC_URL: &str =
    "https://learn.microsoft.com/azure/azure-resource-manager/bicep/parameters#secure-parameters";
const API_VERSION_DOC_URL: &str =
    "https://learn.microsoft.com/azure/azure-resource-manager/templates/best-practices#api-version";
const ARM_RESOURCE_DOC_URL: &str =
    "https://learn.microsoft.com/azure/azure-resource-manager/templates/resource-declaration";
const ARM_SECURE_DOC_URL: &str =
    "https://learn.microsoft.com/azure/azure-resource-manager/templates/best-practices#security-recommendations-for-parameters";

static TF_PROVIDER_REQUIREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\w-]+)\s*=\s*\{([^{}]*\bsource\s*=[^{}]*)\}").unwrap());

static TF_PROVIDER_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^[ \t]*provider\s+"([\w-]+)"\s*\{"#).unwrap());

static TF_MODULE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^[ \t]*module\s+"([\w-]+)"\s*\{"#).unwrap());

static TF_RESOURCE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^[ \t]*resource\s+"([\w-]+)"\s+"([\w-]+)"\s*\{"#).unwrap());

static TF_SOURCE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*source\s*=\s*"([^"]+)""#).unwrap());

static TF_VERSION_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*version\s*=").unwrap());

static TF_TAGS_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*tags\s*=").unwrap());

static TF_BACKEND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bbackend\s+"([\w-]+)"\s*\{"#).unwrap());

static OPEN_INGRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(cidr_blocks\s*=\s*\[\s*"0\.0\.0\.0/0"|source_address_prefix\s*=\s*"(?:\*|0\.0\.0\.0/0|Internet)"|sourceAddressPrefix\s*:\s*'(?:\*|0\.0\.0\.0/0|Internet)')"#,
    )
    .unwrap()
});

static BICEP_RESOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*resource\s+(\w+)\s+'([^'@]+)@([^']+)'(\s+existing)?").unwrap()
});

static BICEP_SECRET_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*param\s+(\w*(?i:password|secret|token|connectionstring)\w*|\w*(?i:key))\s+string\b",
    )
    .unwrap()
});

/// Terraform detectors.
pub fn terraform_bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("terraform")
        .with_fn("TF_UnversionedProvider", detect_unversioned_provider)
        .with_fn("TF_UnpinnedModuleSource", detect_unpinned_module)
        .with_fn("TF_OpenIngressCidr", |ctx: &DetectionContext<'_>| {
            detect_open_ingress(ctx, "TF_OpenIngressCidr")
        })
        .with_fn("TF_RemoteBackend", detect_remote_backend)
        .with_fn("TF_ResourceTags", detect_resource_tags)
        .with(HardcodedSecretDetector::named("TF_HardcodedSecret"))
        .configured(config)
}

/// Bicep detectors.
pub fn bicep_bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("bicep")
        .with_fn("Bicep_Resource", detect_bicep_resources)
        .with_fn("Bicep_SecretParameterNotSecure", detect_bicep_insecure_params)
        .with_fn("Bicep_PreviewApiVersion", detect_bicep_preview_api)
        .with_fn("Bicep_OpenIngress", |ctx: &DetectionContext<'_>| {
            detect_open_ingress(ctx, "Bicep_OpenIngress")
        })
        .configured(config)
}

/// ARM template detectors. They require a parsed document.
pub fn arm_bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("arm")
        .with_fn("ARM_Resource", detect_arm_resources)
        .with_fn("ARM_SecureStringDefault", detect_arm_secure_defaults)
        .with_fn("ARM_PreviewApiVersion", detect_arm_preview_api)
        .with(HardcodedSecretDetector::named("ARM_HardcodedSecret"))
        .configured(config)
}

/// Text of the block opened on `line` (1-based), up to its closing brace.
fn block_text<'a>(ctx: &DetectionContext<'a>, line: usize) -> String {
    let mut depth = 0i32;
    let mut body = Vec::new();
    for text in ctx.lines.iter().skip(line.saturating_sub(1)) {
        body.push(*text);
        depth += text.matches('{').count() as i32;
        depth -= text.matches('}').count() as i32;
        if depth <= 0 {
            break;
        }
    }
    body.join("\n")
}

fn detect_unversioned_provider(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["required_providers", "provider \""]) {
        return Vec::new();
    }

    let mut found = Vec::new();
    let mut required = HashSet::new();

    for (line, cap) in ctx.find_all(&TF_PROVIDER_REQUIREMENT) {
        let name = cap[1].to_string();
        let has_version = cap[2].contains("version");
        required.insert(name.clone());
        if has_version {
            continue;
        }
        found.push(unversioned_provider(ctx, &name, line));
    }

    for (line, cap) in ctx.find_all(&TF_PROVIDER_BLOCK) {
        let name = &cap[1];
        if required.contains(name) || TF_VERSION_ATTR.is_match(&block_text(ctx, line)) {
            continue;
        }
        found.push(unversioned_provider(ctx, name, line));
    }

    found
}

fn unversioned_provider(ctx: &DetectionContext<'_>, name: &str, line: usize) -> CodePattern {
    ctx.pattern_at_line(
        "TF_UnversionedProvider",
        PatternType::Dependencies,
        PatternCategory::Reliability,
        line,
    )
    .with_implementation(format!("Provider '{}' has no version constraint", name))
    .with_advice(
        "Pin providers with a version constraint in required_providers",
        TF_PROVIDER_DOC_URL,
    )
    .with_confidence(0.85)
    .anti_pattern()
    .with_metadata("provider", name)
}

fn detect_unpinned_module(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("module") {
        return Vec::new();
    }

    let mut found = Vec::new();
    for (line, cap) in ctx.find_all(&TF_MODULE_BLOCK) {
        let body = block_text(ctx, line);
        let Some(source) = TF_SOURCE_ATTR.captures(&body).map(|s| s[1].to_string()) else {
            continue;
        };
        let local = source.starts_with("./") || source.starts_with("../");
        let pinned = TF_VERSION_ATTR.is_match(&body) || source.contains("ref=");
        if local || pinned {
            continue;
        }
        found.push(
            ctx.pattern_at_line(
                "TF_UnpinnedModuleSource",
                PatternType::Dependencies,
                PatternCategory::Reliability,
                line,
            )
            .with_implementation(format!("Module '{}' uses unpinned source {}", &cap[1], source))
            .with_advice(
                "Pin registry modules with version and git sources with ?ref=<tag>",
                TF_MODULE_DOC_URL,
            )
            .with_confidence(0.8)
            .anti_pattern()
            .with_metadata("module", &cap[1])
            .with_metadata("source", source),
        );
    }
    found
}

fn detect_open_ingress(ctx: &DetectionContext<'_>, name: &'static str) -> Vec<CodePattern> {
    if !ctx.contains_any(&["0.0.0.0/0", "'*'", "\"*\"", "Internet"]) {
        return Vec::new();
    }

    ctx.find_all(&OPEN_INGRESS)
        .into_iter()
        .map(|(line, _)| {
            ctx.pattern_at_line(
                name,
                PatternType::Security,
                PatternCategory::Security,
                line,
            )
            .with_implementation("Network rule allows traffic from any address")
            .with_advice(
                "Restrict inbound rules to known address ranges or service tags",
                NSG_DOC_URL,
            )
            .with_confidence(0.85)
            .anti_pattern()
        })
        .collect()
}

fn detect_remote_backend(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("backend") {
        return Vec::new();
    }

    ctx.find_all(&TF_BACKEND)
        .into_iter()
        .filter(|(_, cap)| &cap[1] != "local")
        .map(|(line, cap)| {
            ctx.pattern_at_line(
                "TF_RemoteBackend",
                PatternType::Infrastructure,
                PatternCategory::Operations,
                line,
            )
            .with_implementation(format!("State stored in remote '{}' backend", &cap[1]))
            .with_advice(
                "Use a remote backend with locking and encryption for shared state",
                TF_BACKEND_DOC_URL,
            )
            .with_confidence(0.85)
            .with_metadata("backend", &cap[1])
        })
        .collect()
}

fn detect_resource_tags(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("tags") {
        return Vec::new();
    }

    ctx.find_all(&TF_RESOURCE_BLOCK)
        .into_iter()
        .filter(|(line, _)| TF_TAGS_ATTR.is_match(&block_text(ctx, *line)))
        .map(|(line, cap)| {
            let address = format!("{}.{}", &cap[1], &cap[2]);
            ctx.pattern_at_line(
                "TF_ResourceTags",
                PatternType::Infrastructure,
                PatternCategory::Maintainability,
                line,
            )
            .with_implementation(format!("{} carries resource tags", address))
            .with_advice(
                "Apply a consistent tagging scheme for ownership and cost tracking",
                TAGS_DOC_URL,
            )
            .with_confidence(0.7)
            .with_metadata("resource", address)
        })
        .collect()
}

fn is_preview_version(api_version: &str) -> bool {
    api_version.to_ascii_lowercase().contains("preview")
}

fn detect_bicep_resources(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("resource ") {
        return Vec::new();
    }

    ctx.find_all(&BICEP_RESOURCE)
        .into_iter()
        .map(|(line, cap)| {
            let existing = cap.get(4).is_some();
            ctx.pattern_at_line(
                "Bicep_Resource",
                PatternType::Infrastructure,
                PatternCategory::Operations,
                line,
            )
            .with_implementation(format!(
                "{} '{}' of type {}@{}",
                if existing { "Existing resource" } else { "Resource" },
                &cap[1],
                &cap[2],
                &cap[3]
            ))
            .with_advice(
                "Declare resources with explicit, current API versions",
                BICEP_RESOURCE_DOC_URL,
            )
            .with_confidence(0.9)
            .with_metadata("symbol", &cap[1])
            .with_metadata("resource_type", &cap[2])
            .with_metadata("api_version", &cap[3])
            .with_metadata("existing", existing)
        })
        .collect()
}

fn detect_bicep_insecure_params(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("param ") {
        return Vec::new();
    }

    ctx.find_all(&BICEP_SECRET_PARAM)
        .into_iter()
        .filter(|(line, _)| {
            // decorators sit on the lines directly above the param
            let row = line.saturating_sub(1);
            !ctx.lines[..row.min(ctx.lines.len())]
                .iter()
                .rev()
                .take_while(|l| l.trim_start().starts_with('@'))
                .any(|l| l.contains("@secure()"))
        })
        .map(|(line, cap)| {
            ctx.pattern_at_line(
                "Bicep_SecretParameterNotSecure",
                PatternType::Security,
                PatternCategory::Security,
                line,
            )
            .with_implementation(format!("Parameter '{}' looks secret but is not @secure()", &cap[1]))
            .with_advice(
                "Decorate secret parameters with @secure() so values are not logged",
                BICEP_SECURE_DOC_URL,
            )
            .with_confidence(0.85)
            .anti_pattern()
            .with_metadata("parameter", &cap[1])
        })
        .collect()
}

fn detect_bicep_preview_api(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("preview") {
        return Vec::new();
    }

    ctx.find_all(&BICEP_RESOURCE)
        .into_iter()
        .filter(|(_, cap)| is_preview_version(&cap[3]))
        .map(|(line, cap)| {
            preview_api_pattern(ctx, "Bicep_PreviewApiVersion", &cap[2], &cap[3], line)
        })
        .collect()
}

fn preview_api_pattern(
    ctx: &DetectionContext<'_>,
    name: &str,
    resource_type: &str,
    api_version: &str,
    line: usize,
) -> CodePattern {
    ctx.pattern_at_line(
        name.to_string(),
        PatternType::Infrastructure,
        PatternCategory::Reliability,
        line,
    )
    .with_implementation(format!("{} uses preview API version {}", resource_type, api_version))
    .with_advice(
        "Use a GA API version for production resources",
        API_VERSION_DOC_URL,
    )
    .with_confidence(0.7)
    .anti_pattern()
    .with_metadata("resource_type", resource_type)
    .with_metadata("api_version", api_version)
}

/// One ARM resource declaration, including nested child resources.
struct ArmResource<'a> {
    resource_type: &'a str,
    api_version: &'a str,
    name: Option<&'a str>,
    /// Key of the resource when `resources` is an object (languageVersion 2.0).
    symbol: Option<&'a str>,
}

impl ArmResource<'_> {
    /// Line of the declaration. Array entries are found in document order
    /// from `cursor`; symbolic entries by their key, since map order is not
    /// document order.
    fn line(&self, source: &str, cursor: &mut usize) -> usize {
        match self.symbol {
            Some(symbol) => line_of_text(source, &format!("\"{}\"", symbol), &mut 0),
            None => line_of_text(source, &format!("\"{}\"", self.resource_type), cursor),
        }
    }
}

fn collect_arm_resources<'a>(resources: &'a Value, out: &mut Vec<ArmResource<'a>>) {
    let entries: Vec<(Option<&'a str>, &'a Value)> = match resources {
        Value::Array(entries) => entries.iter().map(|entry| (None, entry)).collect(),
        Value::Object(entries) => entries
            .iter()
            .map(|(symbol, entry)| (Some(symbol.as_str()), entry))
            .collect(),
        _ => return,
    };
    for (symbol, entry) in entries {
        let resource_type = entry.get("type").and_then(Value::as_str);
        let api_version = entry.get("apiVersion").and_then(Value::as_str);
        if let (Some(resource_type), Some(api_version)) = (resource_type, api_version) {
            out.push(ArmResource {
                resource_type,
                api_version,
                name: entry.get("name").and_then(Value::as_str).or(symbol),
                symbol,
            });
        }
        if let Some(children) = entry.get("resources") {
            collect_arm_resources(children, out);
        }
    }
}

fn arm_resources<'a>(ctx: &DetectionContext<'a>) -> Vec<ArmResource<'a>> {
    let mut out = Vec::new();
    if let Some(resources) = ctx.document.and_then(|d| d.get("resources")) {
        collect_arm_resources(resources, &mut out);
    }
    out
}

/// Line of the first occurrence of `needle` at or after byte `from`.
fn line_of_text(source: &str, needle: &str, from: &mut usize) -> usize {
    match source[*from..].find(needle) {
        Some(offset) => {
            let at = *from + offset;
            *from = at + needle.len();
            snippet::line_of_offset(source, at)
        }
        None => 1,
    }
}

fn detect_arm_resources(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    let mut cursor = 0;
    arm_resources(ctx)
        .into_iter()
        .map(|resource| {
            let line = resource.line(ctx.source, &mut cursor);
            ctx.pattern_at_line(
                "ARM_Resource",
                PatternType::Infrastructure,
                PatternCategory::Operations,
                line,
            )
            .with_implementation(format!(
                "Resource {}@{}",
                resource.resource_type, resource.api_version
            ))
            .with_advice(
                "Declare resources with explicit, current API versions",
                ARM_RESOURCE_DOC_URL,
            )
            .with_confidence(0.9)
            .with_metadata("resource_type", resource.resource_type)
            .with_metadata("api_version", resource.api_version)
            .with_metadata("resource_name", resource.name.unwrap_or_default())
        })
        .collect()
}

fn detect_arm_preview_api(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("preview") {
        return Vec::new();
    }

    let mut cursor = 0;
    arm_resources(ctx)
        .into_iter()
        .filter_map(|resource| {
            let line = resource.line(ctx.source, &mut cursor);
            is_preview_version(resource.api_version).then(|| {
                preview_api_pattern(
                    ctx,
                    "ARM_PreviewApiVersion",
                    resource.resource_type,
                    resource.api_version,
                    line,
                )
            })
        })
        .collect()
}

fn detect_arm_secure_defaults(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["securestring", "secureString", "secureObject", "secureobject"]) {
        return Vec::new();
    }
    let Some(parameters) = ctx
        .document
        .and_then(|d| d.get("parameters"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for (name, parameter) in parameters {
        let is_secure = parameter
            .get("type")
            .and_then(Value::as_str)
            .map(|t| t.eq_ignore_ascii_case("securestring") || t.eq_ignore_ascii_case("secureobject"))
            .unwrap_or(false);
        let has_default = match parameter.get("defaultValue") {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !(is_secure && has_default) {
            continue;
        }

        let mut cursor = 0;
        let line = line_of_text(ctx.source, &format!("\"{}\"", name), &mut cursor);
        found.push(
            ctx.pattern_at_line(
                "ARM_SecureStringDefault",
                PatternType::Security,
                PatternCategory::Security,
                line,
            )
            .with_implementation(format!("Secure parameter '{}' has a default value", name))
            .with_advice(
                "Never give secure parameters a default; pass them from Key Vault references",
                ARM_SECURE_DOC_URL,
            )
            .with_confidence(0.9)
            .anti_pattern()
            .with_metadata("parameter", name.as_str()),
        );
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(bank: DetectorBank, path: &str, source: &str) -> Vec<CodePattern> {
        let ctx = DetectionContext::new(path, "infra", source);
        bank.run(&ctx).patterns
    }

    fn names(patterns: &[CodePattern]) -> Vec<&str> {
        patterns.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_terraform_provider_and_module_pinning() {
        let source = r#"terraform {
  required_providers {
    azurerm = {
      source = "hashicorp/azurerm"
    }
    random = {
      source  = "hashicorp/random"
      version = "~> 3.5"
    }
  }
  backend "azurerm" {
    container_name = "tfstate"
  }
}

module "network" {
  source = "Azure/network/azurerm"
}

module "local" {
  source = "./modules/local"
}
"#;
        let found = run(terraform_bank(&DetectorConfig::default()), "main.tf", source);

        let providers: Vec<_> = found.iter().filter(|p| p.name == "TF_UnversionedProvider").collect();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].metadata["provider"], "azurerm");
        assert_eq!(providers[0].line_number, 3);

        let modules: Vec<_> = found.iter().filter(|p| p.name == "TF_UnpinnedModuleSource").collect();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].metadata["module"], "network");

        assert!(names(&found).contains(&"TF_RemoteBackend"));
    }

    #[test]
    fn test_terraform_open_ingress_and_tags() {
        let source = r#"resource "aws_security_group" "web" {
  ingress {
    cidr_blocks = ["0.0.0.0/0"]
  }
  tags = {
    owner = "platform"
  }
}
"#;
        let found = run(terraform_bank(&DetectorConfig::default()), "sg.tf", source);
        let open = found.iter().find(|p| p.name == "TF_OpenIngressCidr").unwrap();
        assert_eq!(open.line_number, 3);
        assert!(!open.is_positive);
        let tags = found.iter().find(|p| p.name == "TF_ResourceTags").unwrap();
        assert_eq!(tags.metadata["resource"], "aws_security_group.web");
    }

    #[test]
    fn test_bicep_resources_and_params() {
        let source = r#"@secure()
param adminPassword string
param apiKey string

resource stg 'Microsoft.Storage/storageAccounts@2023-01-01' = {
  name: 'stg'
}

resource ai 'Microsoft.CognitiveServices/accounts@2024-06-01-preview' = {
  name: 'ai'
}
"#;
        let found = run(bicep_bank(&DetectorConfig::default()), "main.bicep", source);
        let resources: Vec<_> = found.iter().filter(|p| p.name == "Bicep_Resource").collect();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].metadata["resource_type"], "Microsoft.Storage/storageAccounts");

        let insecure: Vec<_> = found
            .iter()
            .filter(|p| p.name == "Bicep_SecretParameterNotSecure")
            .collect();
        assert_eq!(insecure.len(), 1);
        assert_eq!(insecure[0].metadata["parameter"], "apiKey");

        assert!(names(&found).contains(&"Bicep_PreviewApiVersion"));
    }

    #[test]
    fn test_arm_resources_from_document() {
        let source = r#"{
  "$schema": "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#",
  "parameters": {
    "adminPassword": { "type": "securestring", "defaultValue": "Passw0rd!" }
  },
  "resources": [
    { "type": "Microsoft.Storage/storageAccounts", "apiVersion": "2023-01-01", "name": "stg" },
    { "type": "Microsoft.Web/sites", "apiVersion": "2022-09-01-preview", "name": "web" }
  ]
}"#;
        let document: Value = serde_json::from_str(source).unwrap();
        let ctx = DetectionContext::new("azuredeploy.json", "infra", source).with_document(&document);
        let found = arm_bank(&DetectorConfig::default()).run(&ctx).patterns;

        let resources: Vec<_> = found.iter().filter(|p| p.name == "ARM_Resource").collect();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].line_number, 7);
        assert_eq!(resources[1].metadata["api_version"], "2022-09-01-preview");

        assert!(names(&found).contains(&"ARM_SecureStringDefault"));
        assert!(names(&found).contains(&"ARM_PreviewApiVersion"));
    }

    #[test]
    fn test_arm_symbolic_resources() {
        let source = r#"{
  "$schema": "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#",
  "languageVersion": "2.0",
  "resources": {
    "web": { "type": "Microsoft.Web/sites", "apiVersion": "2024-01-01-preview" },
    "logs": {
      "type": "Microsoft.Storage/storageAccounts",
      "apiVersion": "2023-01-01",
      "name": "[parameters('storageName')]"
    }
  }
}"#;
        let document: Value = serde_json::from_str(source).unwrap();
        let ctx = DetectionContext::new("main.json", "infra", source).with_document(&document);
        let found = arm_bank(&DetectorConfig::default()).run(&ctx).patterns;

        let resources: Vec<_> = found.iter().filter(|p| p.name == "ARM_Resource").collect();
        assert_eq!(resources.len(), 2);
        let web = resources
            .iter()
            .find(|p| p.metadata["resource_type"] == "Microsoft.Web/sites")
            .unwrap();
        assert_eq!(web.metadata["resource_name"], "web");
        assert_eq!(web.line_number, 5);
        let logs = resources
            .iter()
            .find(|p| p.metadata["resource_type"] == "Microsoft.Storage/storageAccounts")
            .unwrap();
        assert_eq!(logs.metadata["resource_name"], "[parameters('storageName')]");
        assert_eq!(logs.line_number, 6);

        let preview: Vec<_> = found.iter().filter(|p| p.name == "ARM_PreviewApiVersion").collect();
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].line_number, 5);
    }
}
