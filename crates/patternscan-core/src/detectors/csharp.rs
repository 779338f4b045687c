//! C# pattern detectors.

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use super::common::HardcodedSecretDetector;
use super::{DetectionContext, DetectorBank};
use crate::config::DetectorConfig;
use crate::model::{CodePattern, PatternCategory, PatternType};
use crate::parser::treesitter::TreeSitterProvider;
use crate::parser::types::{base_name, is_interface_name};

const DI_DOC_URL: &str =
    "https://learn.microsoft.com/dotnet/core/extensions/dependency-injection";
const AGENT_DOC_URL: &str = "https://learn.microsoft.com/semantic-kernel/frameworks/agent/";
const PROMPT_DOC_URL: &str =
    "https://learn.microsoft.com/azure/ai-services/openai/concepts/advanced-prompt-engineering";
const KERNEL_FUNCTION_DOC_URL: &str =
    "https://learn.microsoft.com/semantic-kernel/concepts/plugins/";
const CACHING_DOC_URL: &str = "https://learn.microsoft.com/aspnet/core/performance/caching/overview";
const ASYNC_DOC_URL: &str =
    "https://learn.microsoft.com/archive/msdn-magazine/2013/march/async-await-best-practices-in-asynchronous-programming";
const RESILIENCE_DOC_URL: &str =
    "https://learn.microsoft.com/dotnet/core/resilience/http-resilience";
const VALIDATION_DOC_URL: &str =
    "https://learn.microsoft.com/aspnet/core/mvc/models/validation";
const EXCEPTIONS_DOC_URL: &str =
    "https://learn.microsoft.com/dotnet/standard/exceptions/best-practices-for-exceptions";

static DI_REGISTRATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.(AddSingleton|AddScoped|AddTransient|AddHostedService)\s*(?:<([^>()]+)>)?\s*\(")
        .unwrap()
});

static SYSTEM_PROMPT_CONST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:const|static\s+readonly)\s+string\s+(\w*(?i:systemprompt|systemmessage|instructions|prompttemplate)\w*)\s*=",
    )
    .unwrap()
});

static CACHE_USAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(IMemoryCache|IDistributedCache|HybridCache|AddMemoryCache|AddDistributedMemoryCache|AddStackExchangeRedisCache|AddOutputCache)\b",
    )
    .unwrap()
});

static RESILIENCE_POLICY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(Policy\s*\.\s*Handle(?:Result)?|AddResilienceHandler|AddStandardResilienceHandler|AddPolicyHandler|ResiliencePipelineBuilder|WaitAndRetryAsync|CircuitBreakerAsync)\b",
    )
    .unwrap()
});

const VALIDATION_ATTRIBUTES: &[&str] = &[
    "Required",
    "StringLength",
    "Range",
    "EmailAddress",
    "MaxLength",
    "MinLength",
    "RegularExpression",
    "Phone",
    "Url",
];

const TOOL_ATTRIBUTES: &[&str] = &["KernelFunction", "McpServerTool", "Function"];

/// All C# detectors.
pub fn bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("csharp")
        .with_fn("CSharp_DependencyInjectionRegistration", detect_di_registration)
        .with_fn("CSharp_ConstructorInjection", detect_constructor_injection)
        .with_fn("CSharp_AgentBaseClass", detect_agent_base_class)
        .with_fn("CSharp_SystemPromptConstant", detect_system_prompt)
        .with_fn("CSharp_KernelFunction", detect_kernel_function)
        .with_fn("CSharp_Caching", detect_caching)
        .with_fn("CSharp_AsyncVoid", detect_async_void)
        .with_fn("CSharp_ResiliencePolicy", detect_resilience)
        .with_fn("CSharp_DataAnnotationsValidation", detect_data_annotations)
        .with_fn("CSharp_EmptyCatch", detect_empty_catch)
        .with(HardcodedSecretDetector::named("CSharp_HardcodedSecret"))
        .configured(config)
}

fn detect_di_registration(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["AddSingleton", "AddScoped", "AddTransient", "AddHostedService"]) {
        return Vec::new();
    }

    ctx.find_all(&DI_REGISTRATION)
        .into_iter()
        .map(|(line, cap)| {
            let lifetime = &cap[1];
            let services = cap.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            ctx.pattern_at_line(
                "CSharp_DependencyInjectionRegistration",
                PatternType::DependencyInjection,
                PatternCategory::Architecture,
                line,
            )
            .with_implementation(if services.is_empty() {
                format!("Service registered via {}", lifetime)
            } else {
                format!("{} registered via {}", services, lifetime)
            })
            .with_advice(
                "Register abstractions with the narrowest lifetime that is correct for the service",
                DI_DOC_URL,
            )
            .with_confidence(0.9)
            .with_metadata("lifetime", lifetime.trim_start_matches("Add"))
            .with_metadata("services", services)
        })
        .collect()
}

fn detect_constructor_injection(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    let mut found = Vec::new();

    for ctor in ctx.nodes_of_kind("constructor_declaration") {
        let Some(params) = ctor.child_by_field_name("parameters") else {
            continue;
        };
        let injected: Vec<&str> = TreeSitterProvider::children_of_kind(&params, "parameter")
            .iter()
            .filter_map(|p| p.child_by_field_name("type"))
            .map(|t| ctx.text(&t))
            .filter(|t| is_interface_name(base_name(t)))
            .collect();
        if injected.is_empty() {
            continue;
        }

        let class = ctor
            .child_by_field_name("name")
            .map(|n| ctx.text(&n))
            .unwrap_or_default();
        found.push(
            ctx.pattern_at_node(
                "CSharp_ConstructorInjection",
                PatternType::DependencyInjection,
                PatternCategory::Architecture,
                &ctor,
            )
            .with_implementation(format!("{} receives {} through its constructor", class, injected.join(", ")))
            .with_advice("Depend on abstractions injected through the constructor", DI_DOC_URL)
            .with_confidence(0.85)
            .with_metadata("class", class)
            .with_metadata("injected", injected),
        );
    }

    found
}

fn base_types<'a>(ctx: &DetectionContext<'a>, decl: &Node<'a>) -> Vec<&'a str> {
    let list = TreeSitterProvider::field(decl, &["bases"])
        .or_else(|| TreeSitterProvider::child_of_kind(decl, "base_list"));
    let Some(list) = list else {
        return Vec::new();
    };
    let mut cursor = list.walk();
    let bases = list
        .named_children(&mut cursor)
        .map(|n| base_name(ctx.text(&n)))
        .collect();
    bases
}

fn detect_agent_base_class(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("Agent") {
        return Vec::new();
    }

    let mut found = Vec::new();
    for class in ctx.nodes_of_kind("class_declaration") {
        let Some(agent_base) = base_types(ctx, &class)
            .into_iter()
            .find(|b| b.ends_with("Agent") || b.ends_with("AgentBase"))
        else {
            continue;
        };
        let name = class
            .child_by_field_name("name")
            .map(|n| ctx.text(&n))
            .unwrap_or_default();
        found.push(
            ctx.pattern_at_node(
                "CSharp_AgentBaseClass",
                PatternType::AgentFramework,
                PatternCategory::AiIntegration,
                &class,
            )
            .with_implementation(format!("{} derives from agent type {}", name, agent_base))
            .with_advice(
                "Keep agent classes focused on one responsibility and inject their tools",
                AGENT_DOC_URL,
            )
            .with_confidence(0.8)
            .with_metadata("class", name)
            .with_metadata("base_type", agent_base),
        );
    }
    found
}

fn detect_system_prompt(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["Prompt", "prompt", "Instructions", "SystemMessage"]) {
        return Vec::new();
    }

    ctx.find_all(&SYSTEM_PROMPT_CONST)
        .into_iter()
        .map(|(line, cap)| {
            ctx.pattern_at_line(
                "CSharp_SystemPromptConstant",
                PatternType::PromptEngineering,
                PatternCategory::AiIntegration,
                line,
            )
            .with_implementation(format!("System prompt defined in constant '{}'", &cap[1]))
            .with_advice(
                "Keep prompts in versioned templates so they can change without a rebuild",
                PROMPT_DOC_URL,
            )
            .with_confidence(0.85)
            .with_metadata("constant", &cap[1])
        })
        .collect()
}

/// Attribute name without namespace or `Attribute` suffix.
fn attribute_name<'a>(ctx: &DetectionContext<'a>, attribute: &Node<'a>) -> &'a str {
    let name = attribute
        .child_by_field_name("name")
        .map(|n| ctx.text(&n))
        .unwrap_or_default();
    let name = name.rsplit('.').next().unwrap_or(name);
    name.strip_suffix("Attribute").unwrap_or(name)
}

/// Name of the declaration an attribute is applied to.
fn attribute_target<'a>(ctx: &DetectionContext<'a>, attribute: &Node<'a>) -> &'a str {
    attribute
        .parent()
        .and_then(|list| list.parent())
        .and_then(|decl| decl.child_by_field_name("name"))
        .map(|n| ctx.text(&n))
        .unwrap_or_default()
}

fn detect_kernel_function(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["KernelFunction", "McpServerTool", "[Function"]) {
        return Vec::new();
    }

    ctx.nodes_of_kind("attribute")
        .into_iter()
        .filter(|a| TOOL_ATTRIBUTES.contains(&attribute_name(ctx, a)))
        .map(|attr| {
            let target = attribute_target(ctx, &attr);
            let kind = attribute_name(ctx, &attr);
            ctx.pattern_at_node(
                "CSharp_KernelFunction",
                PatternType::ToolIntegration,
                PatternCategory::AiIntegration,
                &attr,
            )
            .with_implementation(format!("{} exposed as a tool via [{}]", target, kind))
            .with_advice(
                "Give every tool function a [Description] so the model can choose it correctly",
                KERNEL_FUNCTION_DOC_URL,
            )
            .with_confidence(0.9)
            .with_metadata("function", target)
            .with_metadata("attribute", kind)
        })
        .collect()
}

fn detect_caching(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("Cache") {
        return Vec::new();
    }

    let mut last_line = 0;
    let mut found = Vec::new();
    for (line, cap) in ctx.find_all(&CACHE_USAGE) {
        if line == last_line {
            continue;
        }
        last_line = line;
        let mechanism = &cap[1];
        found.push(
            ctx.pattern_at_line(
                "CSharp_Caching",
                PatternType::Caching,
                PatternCategory::Performance,
                line,
            )
            .with_implementation(format!("Caching through {}", mechanism))
            .with_advice(
                "Set explicit expirations and size limits on cached entries",
                CACHING_DOC_URL,
            )
            .with_confidence(0.8)
            .with_metadata(
                "distributed",
                mechanism.contains("Distributed") || mechanism.contains("Redis"),
            ),
        );
    }
    found
}

fn has_modifier(ctx: &DetectionContext<'_>, decl: &Node<'_>, modifier: &str) -> bool {
    TreeSitterProvider::children_of_kind(decl, "modifier")
        .iter()
        .any(|m| ctx.text(m) == modifier)
}

fn detect_async_void(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("async void") {
        return Vec::new();
    }

    ctx.nodes_of_kind("method_declaration")
        .into_iter()
        .filter(|m| has_modifier(ctx, m, "async"))
        .filter(|m| {
            TreeSitterProvider::field(m, &["returns", "type"])
                .map(|t| ctx.text(&t) == "void")
                .unwrap_or(false)
        })
        .filter(|m| {
            // event handlers are the accepted exception
            !m.child_by_field_name("parameters")
                .map(|p| ctx.text(&p).contains("EventArgs"))
                .unwrap_or(false)
        })
        .map(|method| {
            let name = method
                .child_by_field_name("name")
                .map(|n| ctx.text(&n))
                .unwrap_or_default();
            ctx.pattern_at_node(
                "CSharp_AsyncVoid",
                PatternType::ErrorHandling,
                PatternCategory::Reliability,
                &method,
            )
            .with_implementation(format!("async void method '{}'", name))
            .with_advice(
                "Return Task from async methods; exceptions in async void crash the process",
                ASYNC_DOC_URL,
            )
            .with_confidence(0.9)
            .anti_pattern()
            .with_metadata("method", name)
        })
        .collect()
}

fn detect_resilience(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["Polly", "Resilience", "Policy", "CircuitBreaker", "Retry"]) {
        return Vec::new();
    }

    ctx.find_all(&RESILIENCE_POLICY)
        .into_iter()
        .map(|(line, cap)| {
            let api: String = cap[1].split_whitespace().collect();
            ctx.pattern_at_line(
                "CSharp_ResiliencePolicy",
                PatternType::Resilience,
                PatternCategory::Reliability,
                line,
            )
            .with_implementation(format!("Resilience policy via {}", api))
            .with_advice(
                "Combine retries with timeouts and a circuit breaker for outbound calls",
                RESILIENCE_DOC_URL,
            )
            .with_confidence(0.85)
            .with_metadata("api", api)
        })
        .collect()
}

fn detect_data_annotations(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(VALIDATION_ATTRIBUTES) {
        return Vec::new();
    }

    ctx.nodes_of_kind("attribute")
        .into_iter()
        .filter(|a| VALIDATION_ATTRIBUTES.contains(&attribute_name(ctx, a)))
        .map(|attr| {
            let target = attribute_target(ctx, &attr);
            let rule = attribute_name(ctx, &attr);
            ctx.pattern_at_node(
                "CSharp_DataAnnotationsValidation",
                PatternType::Validation,
                PatternCategory::Security,
                &attr,
            )
            .with_implementation(format!("{} validated with [{}]", target, rule))
            .with_advice(
                "Validate all external input at the model boundary",
                VALIDATION_DOC_URL,
            )
            .with_confidence(0.85)
            .with_metadata("member", target)
            .with_metadata("rule", rule)
        })
        .collect()
}

fn detect_empty_catch(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("catch") {
        return Vec::new();
    }

    ctx.nodes_of_kind("catch_clause")
        .into_iter()
        .filter(|clause| {
            let body = clause
                .child_by_field_name("body")
                .or_else(|| TreeSitterProvider::child_of_kind(clause, "block"));
            let Some(body) = body else {
                return false;
            };
            let mut cursor = body.walk();
            let is_empty = body
                .named_children(&mut cursor)
                .all(|n| n.kind() == "comment");
            is_empty
        })
        .map(|clause| {
            let caught = TreeSitterProvider::child_of_kind(&clause, "catch_declaration")
                .and_then(|d| d.child_by_field_name("type"))
                .map(|t| ctx.text(&t))
                .unwrap_or("Exception");
            ctx.pattern_at_node(
                "CSharp_EmptyCatch",
                PatternType::ErrorHandling,
                PatternCategory::Reliability,
                &clause,
            )
            .with_implementation(format!("Empty catch block swallows {}", caught))
            .with_advice(
                "Log or rethrow caught exceptions; never swallow them silently",
                EXCEPTIONS_DOC_URL,
            )
            .with_confidence(0.9)
            .anti_pattern()
            .with_metadata("exception", caught)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::traits::AstProvider;

    fn detect(source: &str) -> Vec<CodePattern> {
        let provider = TreeSitterProvider::new(tree_sitter_c_sharp::LANGUAGE.into(), "C#");
        let tree = provider.parse_tree(source).unwrap();
        let ctx = DetectionContext::new("Svc.cs", "app", source).with_tree(&tree);
        bank(&DetectorConfig::default()).run(&ctx).patterns
    }

    fn names(patterns: &[CodePattern]) -> Vec<&str> {
        patterns.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_di_registration() {
        let found = detect(
            "class Startup { void Configure(IServiceCollection services) {\n services.AddScoped<IOrderService, OrderService>();\n } }",
        );
        let di: Vec<_> = found
            .iter()
            .filter(|p| p.name == "CSharp_DependencyInjectionRegistration")
            .collect();
        assert_eq!(di.len(), 1);
        assert_eq!(di[0].line_number, 2);
        assert_eq!(di[0].metadata["lifetime"], "Scoped");
    }

    #[test]
    fn test_constructor_injection_and_agent() {
        let source = r#"
public class ResearchAgent : ChatCompletionAgent
{
    public ResearchAgent(ISearchClient search, string name) { }
}"#;
        let found = detect(source);
        let names = names(&found);
        assert!(names.contains(&"CSharp_ConstructorInjection"));
        assert!(names.contains(&"CSharp_AgentBaseClass"));

        let ctor = found
            .iter()
            .find(|p| p.name == "CSharp_ConstructorInjection")
            .unwrap();
        assert_eq!(ctor.line_number, 4);
        assert_eq!(ctor.metadata["injected"][0], "ISearchClient");
    }

    #[test]
    fn test_anti_patterns() {
        let source = r#"
class Worker
{
    public async void Run()
    {
        try { Go(); } catch (Exception) { }
    }
}"#;
        let found = detect(source);
        let negatives: Vec<_> = found.iter().filter(|p| !p.is_positive).map(|p| p.name.as_str()).collect();
        assert!(negatives.contains(&"CSharp_AsyncVoid"));
        assert!(negatives.contains(&"CSharp_EmptyCatch"));
    }

    #[test]
    fn test_event_handler_async_void_allowed() {
        let found = detect("class F { async void OnClick(object sender, EventArgs e) { } }");
        assert!(!names(&found).contains(&"CSharp_AsyncVoid"));
    }

    #[test]
    fn test_tool_attribute_and_validation() {
        let source = r#"
public class Plugin
{
    [KernelFunction, Description("Gets weather")]
    public string GetWeather(string city) => city;

    [Required]
    public string City { get; set; }
}"#;
        let found = detect(source);
        let tool = found.iter().find(|p| p.name == "CSharp_KernelFunction").unwrap();
        assert_eq!(tool.metadata["function"], "GetWeather");
        let validation = found
            .iter()
            .find(|p| p.name == "CSharp_DataAnnotationsValidation")
            .unwrap();
        assert_eq!(validation.metadata["member"], "City");
    }

    #[test]
    fn test_system_prompt_constant() {
        let found = detect("class A { private const string SystemPrompt = \"You are helpful\"; }");
        assert!(names(&found).contains(&"CSharp_SystemPromptConstant"));
    }

    #[test]
    fn test_disabled_detector_is_skipped() {
        let config = DetectorConfig {
            disabled: vec!["CSharp_EmptyCatch".to_string()],
            ..Default::default()
        };
        let names = bank(&config).detector_names();
        assert!(!names.contains(&"CSharp_EmptyCatch"));
        assert!(names.contains(&"CSharp_AsyncVoid"));
    }
}
