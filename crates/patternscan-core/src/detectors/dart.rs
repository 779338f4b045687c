//! Dart/Flutter pattern detectors.

use once_cell::sync::Lazy;
use regex::Regex;

use super::common::HardcodedSecretDetector;
use super::{DetectionContext, DetectorBank};
use crate::config::DetectorConfig;
use crate::model::{CodePattern, PatternCategory, PatternType};

const STATE_DOC_URL: &str = "https://docs.flutter.dev/data-and-backend/state-mgmt/intro";
const PROVIDER_DOC_URL: &str = "https://riverpod.dev/docs/introduction/why_riverpod";
const LOGGING_DOC_URL: &str = "https://dart.dev/tools/linter-rules/avoid_print";

static STATEFUL_WIDGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"class\s+(\w+)\s+extends\s+StatefulWidget\b").unwrap());

static SET_STATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bsetState\s*\(").unwrap());

static PROVIDER_DI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(ChangeNotifierProvider|MultiProvider|ProviderScope|StateNotifierProvider|NotifierProvider|FutureProvider|StreamProvider|GetIt\.(?:instance|I))\b",
    )
    .unwrap()
});

static DEBUG_PRINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*print\s*\(").unwrap());

pub fn bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("dart")
        .with_fn("Dart_StatefulWidget", detect_stateful_widget)
        .with_fn("Dart_ProviderDependencyInjection", detect_provider_di)
        .with_fn("Dart_DebugPrint", detect_debug_print)
        .with(HardcodedSecretDetector::named("Dart_HardcodedSecret"))
        .configured(config)
}

fn detect_stateful_widget(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("StatefulWidget") {
        return Vec::new();
    }

    let set_state_calls = SET_STATE.find_iter(ctx.source).count();
    ctx.find_all(&STATEFUL_WIDGET)
        .into_iter()
        .map(|(line, cap)| {
            ctx.pattern_at_line(
                "Dart_StatefulWidget",
                PatternType::StateManagement,
                PatternCategory::Architecture,
                line,
            )
            .with_implementation(format!(
                "{} keeps local widget state ({} setState calls in file)",
                &cap[1], set_state_calls
            ))
            .with_advice(
                "Keep widget-local state small; lift shared state into a state management solution",
                STATE_DOC_URL,
            )
            .with_confidence(0.85)
            .with_metadata("widget", &cap[1])
            .with_metadata("set_state_calls", set_state_calls)
        })
        .collect()
}

fn detect_provider_di(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains_any(&["Provider", "GetIt"]) {
        return Vec::new();
    }

    ctx.find_all(&PROVIDER_DI)
        .into_iter()
        .map(|(line, cap)| {
            let mechanism = &cap[1];
            ctx.pattern_at_line(
                "Dart_ProviderDependencyInjection",
                PatternType::DependencyInjection,
                PatternCategory::Architecture,
                line,
            )
            .with_implementation(format!("Dependencies provided through {}", mechanism))
            .with_advice(
                "Expose dependencies through providers instead of global singletons",
                PROVIDER_DOC_URL,
            )
            .with_confidence(0.8)
            .with_metadata("mechanism", mechanism)
        })
        .collect()
}

fn detect_debug_print(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("print(") {
        return Vec::new();
    }

    ctx.find_all(&DEBUG_PRINT)
        .into_iter()
        .map(|(line, _)| {
            ctx.pattern_at_line(
                "Dart_DebugPrint",
                PatternType::Logging,
                PatternCategory::Operations,
                line,
            )
            .with_implementation("print() used for diagnostics")
            .with_advice("Use a logging package or debugPrint guarded by kDebugMode", LOGGING_DOC_URL)
            .with_confidence(0.7)
            .anti_pattern()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(source: &str) -> Vec<CodePattern> {
        let ctx = DetectionContext::new("lib/counter.dart", "app", source);
        bank(&DetectorConfig::default()).run(&ctx).patterns
    }

    #[test]
    fn test_stateful_widget_counts_set_state() {
        let source = r#"class Counter extends StatefulWidget {
}
class _CounterState extends State<Counter> {
  void inc() { setState(() { n++; }); }
  void dec() { setState(() { n--; }); }
}"#;
        let found = detect(source);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata["widget"], "Counter");
        assert_eq!(found[0].metadata["set_state_calls"], 2);
    }

    #[test]
    fn test_provider_and_print() {
        let source = "void main() {\n  print('starting');\n  runApp(ProviderScope(child: App()));\n}\n";
        let found = detect(source);
        let names: Vec<_> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Dart_ProviderDependencyInjection", "Dart_DebugPrint"]);
        assert!(!found[1].is_positive);
        assert_eq!(found[1].line_number, 2);
    }
}
