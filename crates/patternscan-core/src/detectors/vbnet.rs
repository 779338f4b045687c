//! VB.NET pattern detectors. VB has no tree here, so all detectors scan text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::common::HardcodedSecretDetector;
use super::{DetectionContext, DetectorBank};
use crate::config::DetectorConfig;
use crate::model::{CodePattern, PatternCategory, PatternType};

const DI_DOC_URL: &str =
    "https://learn.microsoft.com/dotnet/core/extensions/dependency-injection";
const ERROR_HANDLING_DOC_URL: &str =
    "https://learn.microsoft.com/dotnet/visual-basic/language-reference/statements/try-catch-finally-statement";

static DI_REGISTRATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(AddSingleton|AddScoped|AddTransient)\s*(?:\(\s*Of\s+([^)]+)\))?\s*\(").unwrap()
});

static ON_ERROR_RESUME_NEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*On\s+Error\s+Resume\s+Next\b").unwrap());

pub fn bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("vbnet")
        .with_fn("VB_DependencyInjectionRegistration", detect_di_registration)
        .with_fn("VB_OnErrorResumeNext", detect_on_error_resume_next)
        .with(HardcodedSecretDetector::named("VB_HardcodedSecret"))
        .configured(config)
}

fn detect_di_registration(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["AddSingleton", "AddScoped", "AddTransient"]) {
        return Vec::new();
    }

    ctx.find_all(&DI_REGISTRATION)
        .into_iter()
        .map(|(line, cap)| {
            let lifetime = &cap[1];
            let services = cap.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            ctx.pattern_at_line(
                "VB_DependencyInjectionRegistration",
                PatternType::DependencyInjection,
                PatternCategory::Architecture,
                line,
            )
            .with_implementation(format!("Service registered via {}", lifetime))
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

fn detect_on_error_resume_next(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["Resume Next", "resume next", "RESUME NEXT"]) {
        return Vec::new();
    }

    ctx.find_all(&ON_ERROR_RESUME_NEXT)
        .into_iter()
        .map(|(line, _)| {
            ctx.pattern_at_line(
                "VB_OnErrorResumeNext",
                PatternType::ErrorHandling,
                PatternCategory::Reliability,
                line,
            )
            .with_implementation("On Error Resume Next suppresses every runtime error")
            .with_advice(
                "Use structured Try/Catch blocks and handle specific exceptions",
                ERROR_HANDLING_DOC_URL,
            )
            .with_confidence(0.95)
            .anti_pattern()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(source: &str) -> Vec<CodePattern> {
        let ctx = DetectionContext::new("Module1.vb", "app", source);
        bank(&DetectorConfig::default()).run(&ctx).patterns
    }

    #[test]
    fn test_di_registration_with_of() {
        let found = detect("services.AddScoped(Of IOrderService, OrderService)()\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata["services"], "IOrderService, OrderService");
    }

    #[test]
    fn test_on_error_resume_next() {
        let found = detect("Sub Main()\n    On Error Resume Next\nEnd Sub\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line_number, 2);
        assert!(!found[0].is_positive);
    }
}
