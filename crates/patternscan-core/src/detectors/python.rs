//! Python pattern detectors.

use once_cell::sync::Lazy;
use regex::Regex;

use super::common::HardcodedSecretDetector;
use super::{DetectionContext, DetectorBank};
use crate::config::DetectorConfig;
use crate::model::{CodePattern, PatternCategory, PatternType};

const PROMPT_DOC_URL: &str = "https://platform.openai.com/docs/guides/prompt-engineering";
const PYDANTIC_DOC_URL: &str = "https://docs.pydantic.dev/latest/concepts/models/";
const TOOLS_DOC_URL: &str = "https://python.langchain.com/docs/concepts/tools/";
const CACHE_DOC_URL: &str = "https://docs.python.org/3/library/functools.html#functools.lru_cache";
const EXCEPT_DOC_URL: &str = "https://peps.python.org/pep-0008/#programming-recommendations";
const DEPENDS_DOC_URL: &str = "https://fastapi.tiangolo.com/tutorial/dependencies/";

static SYSTEM_PROMPT_CONST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*([A-Za-z_]*(?i:system_prompt|system_message|instructions|prompt_template)[A-Za-z_0-9]*)\s*(?::\s*[\w\[\]]+\s*)?=",
    )
    .unwrap()
});

static LRU_CACHE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*@(?:functools\.)?(lru_cache|cache|cached_property)\b").unwrap()
});

static FASTAPI_DEPENDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bDepends\s*\(\s*([\w.]*)").unwrap());

const TOOL_DECORATORS: &[&str] = &["tool", "function_tool", "kernel_function", "mcp.tool", "server.tool"];

pub fn bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("python")
        .with_fn("Py_SystemPromptConstant", detect_system_prompt)
        .with_fn("Py_PydanticModel", detect_pydantic_model)
        .with_fn("Py_ToolDecorator", detect_tool_decorator)
        .with_fn("Py_LruCache", detect_lru_cache)
        .with_fn("Py_BareExcept", detect_bare_except)
        .with_fn("Py_FastApiDepends", detect_fastapi_depends)
        .with(HardcodedSecretDetector::named("Py_HardcodedSecret"))
        .configured(config)
}

fn detect_system_prompt(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["PROMPT", "prompt", "INSTRUCTIONS", "instructions", "MESSAGE", "message"]) {
        return Vec::new();
    }

    ctx.find_all(&SYSTEM_PROMPT_CONST)
        .into_iter()
        .map(|(line, cap)| {
            ctx.pattern_at_line(
                "Py_SystemPromptConstant",
                PatternType::PromptEngineering,
                PatternCategory::AiIntegration,
                line,
            )
            .with_implementation(format!("System prompt defined in '{}'", &cap[1]))
            .with_advice(
                "Keep prompts in versioned templates and test them like code",
                PROMPT_DOC_URL,
            )
            .with_confidence(0.85)
            .with_metadata("constant", &cap[1])
        })
        .collect()
}

fn detect_pydantic_model(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("BaseModel") {
        return Vec::new();
    }

    ctx.nodes_of_kind("class_definition")
        .into_iter()
        .filter(|class| {
            class
                .child_by_field_name("superclasses")
                .map(|s| ctx.text(&s).contains("BaseModel"))
                .unwrap_or(false)
        })
        .map(|class| {
            let name = class
                .child_by_field_name("name")
                .map(|n| ctx.text(&n))
                .unwrap_or_default();
            ctx.pattern_at_node(
                "Py_PydanticModel",
                PatternType::Validation,
                PatternCategory::Security,
                &class,
            )
            .with_implementation(format!("{} is a pydantic model", name))
            .with_advice(
                "Validate external payloads through typed models with field constraints",
                PYDANTIC_DOC_URL,
            )
            .with_confidence(0.9)
            .with_metadata("class", name)
        })
        .collect()
}

fn detect_tool_decorator(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["@tool", "@function_tool", "@kernel_function", ".tool"]) {
        return Vec::new();
    }

    ctx.nodes_of_kind("decorator")
        .into_iter()
        .filter_map(|decorator| {
            let text = ctx.text(&decorator).trim_start_matches('@').trim();
            let name = text.split('(').next().unwrap_or(text).trim();
            TOOL_DECORATORS.contains(&name).then_some((decorator, name))
        })
        .map(|(decorator, name)| {
            let function = decorator
                .parent()
                .and_then(|d| d.child_by_field_name("definition"))
                .and_then(|f| f.child_by_field_name("name"))
                .map(|n| ctx.text(&n))
                .unwrap_or_default();
            ctx.pattern_at_node(
                "Py_ToolDecorator",
                PatternType::ToolIntegration,
                PatternCategory::AiIntegration,
                &decorator,
            )
            .with_implementation(format!("{} exposed as a tool via @{}", function, name))
            .with_advice(
                "Document every tool with a docstring; the model reads it to choose the tool",
                TOOLS_DOC_URL,
            )
            .with_confidence(0.9)
            .with_metadata("function", function)
            .with_metadata("decorator", name)
        })
        .collect()
}

fn detect_lru_cache(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("cache") {
        return Vec::new();
    }

    ctx.find_all(&LRU_CACHE)
        .into_iter()
        .map(|(line, cap)| {
            ctx.pattern_at_line("Py_LruCache", PatternType::Caching, PatternCategory::Performance, line)
                .with_implementation(format!("Memoized with @{}", &cap[1]))
                .with_advice(
                    "Bound memoization caches with maxsize and avoid caching methods on instances",
                    CACHE_DOC_URL,
                )
                .with_confidence(0.8)
                .with_metadata("decorator", &cap[1])
        })
        .collect()
}

fn detect_bare_except(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("except") {
        return Vec::new();
    }

    ctx.nodes_of_kind("except_clause")
        .into_iter()
        .filter(|clause| {
            let text = ctx.text(clause);
            text.strip_prefix("except")
                .map(|rest| rest.trim_start().starts_with(':'))
                .unwrap_or(false)
        })
        .map(|clause| {
            ctx.pattern_at_line(
                "Py_BareExcept",
                PatternType::ErrorHandling,
                PatternCategory::Reliability,
                clause.start_position().row + 1,
            )
            .with_implementation("Bare except clause catches every exception including SystemExit")
            .with_advice("Catch specific exception types and log or re-raise", EXCEPT_DOC_URL)
            .with_confidence(0.9)
            .anti_pattern()
        })
        .collect()
}

fn detect_fastapi_depends(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("Depends") {
        return Vec::new();
    }

    ctx.find_all(&FASTAPI_DEPENDS)
        .into_iter()
        .map(|(line, cap)| {
            let provider = &cap[1];
            ctx.pattern_at_line(
                "Py_FastApiDepends",
                PatternType::DependencyInjection,
                PatternCategory::Architecture,
                line,
            )
            .with_implementation(if provider.is_empty() {
                "FastAPI dependency injection".to_string()
            } else {
                format!("FastAPI injects {}", provider)
            })
            .with_advice(
                "Provide shared resources through dependencies instead of module globals",
                DEPENDS_DOC_URL,
            )
            .with_confidence(0.85)
            .with_metadata("provider", provider)
        })
        .collect()
}
