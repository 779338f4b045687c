//! TypeScript/JavaScript pattern detectors.

use once_cell::sync::Lazy;
use regex::Regex;

use super::common::HardcodedSecretDetector;
use super::{DetectionContext, DetectorBank};
use crate::config::DetectorConfig;
use crate::model::{CodePattern, PatternCategory, PatternType};

const ANGULAR_DI_DOC_URL: &str = "https://angular.dev/guide/di";
const NEST_PROVIDERS_DOC_URL: &str = "https://docs.nestjs.com/providers";
const PROMPT_DOC_URL: &str = "https://platform.openai.com/docs/guides/prompt-engineering";
const TOOLS_DOC_URL: &str = "https://platform.openai.com/docs/guides/function-calling";
const ZOD_DOC_URL: &str = "https://zod.dev";
const EVAL_DOC_URL: &str =
    "https://developer.mozilla.org/docs/Web/JavaScript/Reference/Global_Objects/eval#never_use_direct_eval!";

static INJECTABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(Injectable|Controller|Module|Component)\s*\(").unwrap());

static CONSTRUCTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"constructor\s*\(([^)]*)\)").unwrap());

static PARAMETER_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:private|public|protected|readonly)\s+(?:readonly\s+)?(\w+)\s*:\s*([\w.]+)")
        .unwrap()
});

static SYSTEM_PROMPT_CONST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:const|let|var)\s+(\w*(?i:systemprompt|system_prompt|systemmessage|instructions)\w*)\s*(?::\s*\w+\s*)?=",
    )
    .unwrap()
});

static TOOL_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(\btool\s*\(\s*\{|type\s*:\s*["']function["']|\bDynamicStructuredTool\b|\bnew\s+StructuredTool\b|\bserver\.tool\s*\()"#,
    )
    .unwrap()
});

static SCHEMA_VALIDATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\bz\.object\s*\(|\bJoi\.object\s*\(|\byup\.object\s*\(|@(?:IsString|IsEmail|IsInt|IsNotEmpty|Length|ValidateNested)\s*\()",
    )
    .unwrap()
});

pub fn bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("typescript")
        .with_fn("TS_InjectableDecorator", detect_injectable)
        .with_fn("TS_ConstructorInjection", detect_constructor_injection)
        .with_fn("TS_SystemPromptConstant", detect_system_prompt)
        .with_fn("TS_LlmToolDefinition", detect_tool_definition)
        .with_fn("TS_SchemaValidation", detect_schema_validation)
        .with_fn("TS_Eval", detect_eval)
        .with(HardcodedSecretDetector::named("TS_HardcodedSecret"))
        .configured(config)
}

fn detect_injectable(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("@") {
        return Vec::new();
    }

    ctx.find_all(&INJECTABLE)
        .into_iter()
        .map(|(line, cap)| {
            let decorator = &cap[1];
            let url = if ctx.contains("@nestjs") {
                NEST_PROVIDERS_DOC_URL
            } else {
                ANGULAR_DI_DOC_URL
            };
            ctx.pattern_at_line(
                "TS_InjectableDecorator",
                PatternType::DependencyInjection,
                PatternCategory::Architecture,
                line,
            )
            .with_implementation(format!("Class registered with the container via @{}", decorator))
            .with_advice("Keep providers stateless and inject them through constructors", url)
            .with_confidence(0.85)
            .with_metadata("decorator", decorator)
        })
        .collect()
}

fn detect_constructor_injection(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("constructor") {
        return Vec::new();
    }

    let mut found = Vec::new();
    for (line, cap) in ctx.find_all(&CONSTRUCTOR) {
        let injected: Vec<String> = PARAMETER_PROPERTY
            .captures_iter(&cap[1])
            .map(|p| p[2].to_string())
            .collect();
        if injected.is_empty() {
            continue;
        }
        found.push(
            ctx.pattern_at_line(
                "TS_ConstructorInjection",
                PatternType::DependencyInjection,
                PatternCategory::Architecture,
                line,
            )
            .with_implementation(format!("Constructor injects {}", injected.join(", ")))
            .with_advice(
                "Inject collaborators as readonly constructor parameters",
                ANGULAR_DI_DOC_URL,
            )
            .with_confidence(0.8)
            .with_metadata("injected", injected),
        );
    }
    found
}

fn detect_system_prompt(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["rompt", "nstructions", "SystemMessage", "PROMPT", "INSTRUCTIONS"]) {
        return Vec::new();
    }

    ctx.find_all(&SYSTEM_PROMPT_CONST)
        .into_iter()
        .map(|(line, cap)| {
            ctx.pattern_at_line(
                "TS_SystemPromptConstant",
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

fn detect_tool_definition(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["tool", "Tool", "function"]) {
        return Vec::new();
    }

    ctx.find_all(&TOOL_DEFINITION)
        .into_iter()
        .map(|(line, cap)| {
            let form: String = cap[1].split_whitespace().collect();
            ctx.pattern_at_line(
                "TS_LlmToolDefinition",
                PatternType::ToolIntegration,
                PatternCategory::AiIntegration,
                line,
            )
            .with_implementation(format!("LLM tool definition ({})", form))
            .with_advice(
                "Describe every tool parameter with a schema and validate model-supplied arguments",
                TOOLS_DOC_URL,
            )
            .with_confidence(0.75)
            .with_metadata("form", form)
        })
        .collect()
}

fn detect_schema_validation(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["z.object", "Joi.object", "yup.object", "class-validator"]) {
        return Vec::new();
    }

    ctx.find_all(&SCHEMA_VALIDATION)
        .into_iter()
        .map(|(line, cap)| {
            let library = match &cap[1] {
                s if s.starts_with("z.") => "zod",
                s if s.starts_with("Joi") => "joi",
                s if s.starts_with("yup") => "yup",
                _ => "class-validator",
            };
            ctx.pattern_at_line(
                "TS_SchemaValidation",
                PatternType::Validation,
                PatternCategory::Security,
                line,
            )
            .with_implementation(format!("Input validated with {}", library))
            .with_advice("Validate untrusted input at the boundary and reuse the schema for types", ZOD_DOC_URL)
            .with_confidence(0.85)
            .with_metadata("library", library)
        })
        .collect()
}

fn detect_eval(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["eval", "Function("]) {
        return Vec::new();
    }

    let calls = ctx.nodes_of_kind("call_expression").into_iter().filter(|call| {
        call.child_by_field_name("function")
            .map(|f| ctx.text(&f) == "eval")
            .unwrap_or(false)
    });
    let constructors = ctx.nodes_of_kind("new_expression").into_iter().filter(|expr| {
        expr.child_by_field_name("constructor")
            .map(|c| ctx.text(&c) == "Function")
            .unwrap_or(false)
    });

    calls
        .chain(constructors)
        .map(|node| {
            ctx.pattern_at_node("TS_Eval", PatternType::Security, PatternCategory::Security, &node)
                .with_implementation(format!("Dynamic code execution: {}", ctx.text(&node).lines().next().unwrap_or_default()))
                .with_advice("Never evaluate strings as code; parse data with JSON.parse instead", EVAL_DOC_URL)
                .with_confidence(0.9)
                .anti_pattern()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::traits::AstProvider;
    use crate::parser::treesitter::TreeSitterProvider;

    fn detect(source: &str) -> Vec<CodePattern> {
        let provider = TreeSitterProvider::new(
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            "TypeScript",
        );
        let tree = provider.parse_tree(source).unwrap();
        let ctx = DetectionContext::new("svc.ts", "web", source).with_tree(&tree);
        bank(&DetectorConfig::default()).run(&ctx).patterns
    }

    #[test]
    fn test_injectable_service() {
        let source = r#"
@Injectable()
export class OrderService {
  constructor(private readonly http: HttpClient, private logger: Logger) {}
}"#;
        let found = detect(source);
        let injectable = found.iter().find(|p| p.name == "TS_InjectableDecorator").unwrap();
        assert_eq!(injectable.line_number, 2);
        let ctor = found.iter().find(|p| p.name == "TS_ConstructorInjection").unwrap();
        assert_eq!(ctor.metadata["injected"][0], "HttpClient");
        assert_eq!(ctor.metadata["injected"][1], "Logger");
    }

    #[test]
    fn test_prompt_and_tool() {
        let source = "const SYSTEM_PROMPT = `You are a planner`;\nconst tools = [{ type: \"function\", function: { name: \"plan\" } }];\n";
        let found = detect(source);
        let names: Vec<_> = found.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"TS_SystemPromptConstant"));
        assert!(names.contains(&"TS_LlmToolDefinition"));
    }

    #[test]
    fn test_eval_is_negative() {
        let found = detect("const x = eval(userInput);\nconst evaluate = 1;\n");
        let evals: Vec<_> = found.iter().filter(|p| p.name == "TS_Eval").collect();
        assert_eq!(evals.len(), 1);
        assert!(!evals[0].is_positive);
    }

    #[test]
    fn test_zod_schema() {
        let found = detect("import { z } from 'zod';\nconst User = z.object({ name: z.string() });\n");
        let zod = found.iter().find(|p| p.name == "TS_SchemaValidation").unwrap();
        assert_eq!(zod.metadata["library"], "zod");
        assert_eq!(zod.line_number, 2);
    }
}
