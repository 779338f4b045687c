//! Detectors shared by several banks.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{DetectionContext, Detector};
use crate::model::{CodePattern, PatternCategory, PatternType};

pub const SECRETS_DOC_URL: &str =
    "https://learn.microsoft.com/azure/key-vault/general/best-practices";

const SECRET_GUARDS: &[&str] = &[
    "password", "Password", "PASSWORD", "secret", "Secret", "SECRET", "apikey", "ApiKey",
    "api_key", "API_KEY", "apiKey", "token", "Token", "TOKEN", "ConnectionString",
    "connectionString", "connection_string", "AccessKey", "access_key", "accessKey",
];

static SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b([a-z0-9_]*(?:password|passwd|pwd|secret|api[_-]?key|access[_-]?key|token|connection[_-]?string)[a-z0-9_]*)["']?\s*(?::=|=|:)\s*@?["']([^"'\s]{8,})["']"#,
    )
    .unwrap()
});

/// Values that look like placeholders or references rather than secrets.
fn is_placeholder(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    value.contains("${")
        || value.contains("{{")
        || value.starts_with('<')
        || value.starts_with("[parameters(")
        || value.starts_with("[variables(")
        || lower.starts_with("keyvault")
        || lower.contains("placeholder")
        || lower.contains("changeme")
        || lower.contains("your_")
        || lower.contains("your-")
        || lower.contains("xxxx")
}

/// Secret-looking names assigned a string literal.
pub struct HardcodedSecretDetector {
    name: &'static str,
}

impl HardcodedSecretDetector {
    pub fn named(name: &'static str) -> Self {
        Self { name }
    }
}

impl Detector for HardcodedSecretDetector {
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
        if !ctx.contains_any(SECRET_GUARDS) {
            return Vec::new();
        }

        ctx.find_all(&SECRET_ASSIGNMENT)
            .into_iter()
            .filter(|(_, cap)| !cap.get(2).map(|v| is_placeholder(v.as_str())).unwrap_or(true))
            .map(|(line, cap)| {
                let key = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
                ctx.pattern_at_line(self.name, PatternType::Security, PatternCategory::Security, line)
                    .with_implementation(format!("Hardcoded secret assigned to '{}'", key))
                    .with_advice(
                        "Load secrets from a secret store or environment configuration instead of source code",
                        SECRETS_DOC_URL,
                    )
                    .with_confidence(0.75)
                    .anti_pattern()
                    .with_metadata("key", key)
            })
            .collect()
    }
}
