use std::sync::Arc;

use patternscan_core::model::PATTERNS_METADATA_KEY;
use patternscan_core::{
    CodeElement, CodePattern, CompositeRouter, DetectionContext, DetectorBank, ElementKind,
    ParseResult, Parser, ParserRegistry, PatternCategory, PatternType, Router, ScanConfig,
};
use tokio_util::sync::CancellationToken;

fn marker(name: &'static str) -> impl Fn(&DetectionContext<'_>) -> Vec<CodePattern> {
    move |ctx: &DetectionContext<'_>| {
        vec![ctx.pattern_at_line(name, PatternType::Logging, PatternCategory::Operations, 1)]
    }
}

/// Line parser whose bank has one detector that panics on `explode`.
struct FragileParser {
    bank: DetectorBank,
}

impl FragileParser {
    fn new() -> Self {
        Self {
            bank: DetectorBank::new("fragile")
                .with_fn("Fragile_First", marker("Fragile_First"))
                .with_fn("Fragile_Broken", |ctx| {
                    if ctx.contains("explode") {
                        panic!("crafted failure");
                    }
                    Vec::new()
                })
                .with_fn("Fragile_Last", marker("Fragile_Last")),
        }
    }
}

impl Parser for FragileParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        _cancel: &CancellationToken,
    ) -> ParseResult {
        let context = context.unwrap_or_default();
        let mut result = ParseResult::new(path);
        result.add_element(CodeElement::new(ElementKind::File, path, path, context));

        let ctx = DetectionContext::new(path, context, content);
        let output = self.bank.run(&ctx);
        result.add_patterns(output.patterns);
        for error in output.errors {
            result.add_error(error);
        }
        result
    }

    fn language_name(&self) -> &'static str {
        "Fragile"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["fragile"]
    }
}

struct PanickingParser;

impl Parser for PanickingParser {
    fn parse_file(
        &self,
        _path: &str,
        _content: &str,
        _context: Option<&str>,
        _cancel: &CancellationToken,
    ) -> ParseResult {
        panic!("grammar blew up")
    }

    fn language_name(&self) -> &'static str {
        "Panicking"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["boom"]
    }
}

/// Fallback that keeps any input as a bare file element.
struct PlainFallback;

impl Parser for PlainFallback {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        _cancel: &CancellationToken,
    ) -> ParseResult {
        let mut result = ParseResult::new(path);
        result.add_element(
            CodeElement::new(ElementKind::File, path, path, context.unwrap_or_default())
                .with_content(content),
        );
        result
    }

    fn language_name(&self) -> &'static str {
        "Plain"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["boom"]
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn router() -> CompositeRouter {
    init_tracing();
    let mut registry = ParserRegistry::empty();
    registry.register(Arc::new(FragileParser::new()));
    registry.register(Arc::new(PanickingParser));
    CompositeRouter::with_registry(registry, &ScanConfig::default())
}

#[tokio::test]
async fn test_failing_detector_keeps_sibling_output() {
    let result = router()
        .route("notes/a.fragile", Some("explode"), None, &CancellationToken::new())
        .await;

    let names: Vec<&str> = result.patterns.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Fragile_First", "Fragile_Last"]);
    assert_eq!(result.errors().len(), 1);
    assert!(result.errors()[0].contains("Fragile_Broken"));

    let attached = result.file_element().unwrap().metadata[PATTERNS_METADATA_KEY]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(attached, 2);
}

#[tokio::test]
async fn test_quiet_input_has_no_errors() {
    let result = router()
        .route("notes/a.fragile", Some("calm"), None, &CancellationToken::new())
        .await;

    assert!(result.success());
    assert_eq!(result.patterns.len(), 2);
}

#[tokio::test]
async fn test_parser_panic_becomes_error() {
    let result = router()
        .route("notes/b.boom", Some("anything"), None, &CancellationToken::new())
        .await;

    assert!(!result.success());
    assert_eq!(result.file_path, "notes/b.boom");
    assert!(result.errors()[0].contains("grammar blew up"));
    assert!(result.elements.is_empty());
}

#[tokio::test]
async fn test_fallback_keeps_primary_errors() {
    init_tracing();
    let mut registry = ParserRegistry::empty();
    registry.register(Arc::new(PanickingParser));
    registry.register_fallback(Arc::new(PlainFallback));
    let router = CompositeRouter::with_registry(registry, &ScanConfig::default());

    let result = router
        .route("notes/c.boom", Some("anything"), None, &CancellationToken::new())
        .await;

    assert_eq!(result.elements.len(), 1);
    assert_eq!(result.elements[0].content, "anything");
    assert_eq!(result.errors().len(), 1);
    assert!(result.errors()[0].contains("Panicking parser failed: grammar blew up"));
}

#[tokio::test]
async fn test_empty_registry_is_unstructured() {
    let router = CompositeRouter::with_registry(ParserRegistry::empty(), &ScanConfig::default());
    let result = router
        .route("src/App/Program.cs", Some("class Program {}"), None, &CancellationToken::new())
        .await;

    assert!(result.success());
    assert!(result.elements[0].has_tag("unstructured"));
}
