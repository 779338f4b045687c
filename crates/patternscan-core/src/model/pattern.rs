//! Detector findings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Specific domain a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    DependencyInjection,
    Security,
    Caching,
    ToolIntegration,
    PromptEngineering,
    AgentFramework,
    Validation,
    ErrorHandling,
    Resilience,
    StateManagement,
    Logging,
    Infrastructure,
    Dependencies,
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DependencyInjection => "DependencyInjection",
            Self::Security => "Security",
            Self::Caching => "Caching",
            Self::ToolIntegration => "ToolIntegration",
            Self::PromptEngineering => "PromptEngineering",
            Self::AgentFramework => "AgentFramework",
            Self::Validation => "Validation",
            Self::ErrorHandling => "ErrorHandling",
            Self::Resilience => "Resilience",
            Self::StateManagement => "StateManagement",
            Self::Logging => "Logging",
            Self::Infrastructure => "Infrastructure",
            Self::Dependencies => "Dependencies",
        };
        f.write_str(name)
    }
}

/// Broad quality attribute a pattern speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Architecture,
    Security,
    Performance,
    Reliability,
    Maintainability,
    AiIntegration,
    Operations,
}

/// One detector finding.
///
/// `confidence` is a fixed per-detector constant, not a calibrated score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodePattern {
    /// Stable detector-assigned name.
    pub name: String,
    pub pattern_type: PatternType,
    pub category: PatternCategory,

    /// Human-readable description of what was observed.
    pub implementation: String,

    pub file_path: String,

    /// 1-based line of the match.
    pub line_number: usize,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_line_number: Option<usize>,

    /// Source lines around the match.
    pub content: String,

    pub best_practice: String,
    pub documentation_url: String,
    pub context: String,
    pub confidence: f32,

    /// `true` for a recommended practice, `false` for an anti-pattern.
    pub is_positive: bool,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl CodePattern {
    pub fn new(
        name: impl Into<String>,
        pattern_type: PatternType,
        category: PatternCategory,
        file_path: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern_type,
            category,
            implementation: String::new(),
            file_path: file_path.into(),
            line_number: 1,
            end_line_number: None,
            content: String::new(),
            best_practice: String::new(),
            documentation_url: String::new(),
            context: context.into(),
            confidence: 0.0,
            is_positive: true,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = implementation.into();
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line_number = line;
        self
    }

    pub fn ending_at(mut self, line: usize) -> Self {
        self.end_line_number = Some(line);
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.content = snippet.into();
        self
    }

    pub fn with_advice(mut self, best_practice: impl Into<String>, url: impl Into<String>) -> Self {
        self.best_practice = best_practice.into();
        self.documentation_url = url.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Mark the finding as an anti-pattern.
    pub fn anti_pattern(mut self) -> Self {
        self.is_positive = false;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
