//! Pattern detectors.
//!
//! A [`Detector`] looks for one structural or textual signature and emits
//! zero or more [`CodePattern`]s. Detectors are grouped per language/domain
//! into a [`DetectorBank`]; a language parser owns its banks and folds over
//! them after extraction.
//!
//! Detectors are stateless. Each one is run behind its own unwind boundary,
//! so a failing detector contributes nothing and is reported as an error
//! while its siblings still run.
//!
//! Text detectors guard with a cheap substring check on the whole source
//! before running a regex or walking the tree.

pub mod common;
pub mod csharp;
pub mod dart;
pub mod iac;
pub mod project;
pub mod python;
pub mod snippet;
pub mod typescript;
pub mod vbnet;

use std::panic::{catch_unwind, AssertUnwindSafe};

use regex::{Captures, Regex};
use serde_json::Value;
use tree_sitter::{Node, Tree};

use crate::config::{DetectorConfig, DEFAULT_SNIPPET_CONTEXT_LINES};
use crate::error::ParseError;
use crate::model::{CodePattern, PatternCategory, PatternType};
use crate::parser::treesitter::visit_all;

/// Everything a detector may look at.
pub struct DetectionContext<'a> {
    pub file_path: &'a str,
    pub context: &'a str,
    pub source: &'a str,
    pub lines: Vec<&'a str>,
    /// Syntax tree, when the language has one.
    pub tree: Option<&'a Tree>,
    /// Parsed document for JSON formats.
    pub document: Option<&'a Value>,
    pub snippet_lines: usize,
}

impl<'a> DetectionContext<'a> {
    pub fn new(file_path: &'a str, context: &'a str, source: &'a str) -> Self {
        Self {
            file_path,
            context,
            source,
            lines: source.lines().collect(),
            tree: None,
            document: None,
            snippet_lines: DEFAULT_SNIPPET_CONTEXT_LINES,
        }
    }

    pub fn with_tree(mut self, tree: &'a Tree) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn with_document(mut self, document: &'a Value) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_snippet_lines(mut self, lines: usize) -> Self {
        self.snippet_lines = lines;
        self
    }

    /// Cheap whole-file guard.
    pub fn contains(&self, needle: &str) -> bool {
        self.source.contains(needle)
    }

    pub fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.source.contains(n))
    }

    /// Text of a node in this source.
    pub fn text(&self, node: &Node) -> &'a str {
        let source: &'a str = self.source;
        &source[node.byte_range()]
    }

    /// Every node of `kind` in source order; empty without a tree.
    pub fn nodes_of_kind(&self, kind: &str) -> Vec<Node<'a>> {
        let Some(tree) = self.tree else {
            return Vec::new();
        };
        let mut found = Vec::new();
        visit_all(&tree.root_node(), &mut |node| {
            if node.kind() == kind {
                found.push(*node);
            }
        });
        found
    }

    /// Context window around a 1-based line.
    pub fn snippet_at_line(&self, line: usize) -> String {
        let row = line.saturating_sub(1);
        snippet::snippet(&self.lines, row, row, self.snippet_lines)
    }

    /// Context window around a node.
    pub fn snippet_for_node(&self, node: &Node) -> String {
        snippet::snippet_for_node(node, &self.lines, self.snippet_lines)
    }

    /// All matches of `re` in the source with their 1-based lines.
    pub fn find_all<'r>(&self, re: &'r Regex) -> Vec<(usize, Captures<'a>)> {
        let source: &'a str = self.source;
        re.captures_iter(source)
            .filter_map(|cap| {
                let start = cap.get(0)?.start();
                Some((snippet::line_of_offset(source, start), cap))
            })
            .collect()
    }

    /// A pattern pre-filled with this file's path and context.
    pub fn pattern(
        &self,
        name: impl Into<String>,
        pattern_type: PatternType,
        category: PatternCategory,
    ) -> CodePattern {
        CodePattern::new(name, pattern_type, category, self.file_path, self.context)
    }

    /// A pattern anchored at `line` with the surrounding snippet.
    pub fn pattern_at_line(
        &self,
        name: impl Into<String>,
        pattern_type: PatternType,
        category: PatternCategory,
        line: usize,
    ) -> CodePattern {
        self.pattern(name, pattern_type, category)
            .at_line(line)
            .with_snippet(self.snippet_at_line(line))
    }

    /// A pattern anchored at a node's span with the surrounding snippet.
    pub fn pattern_at_node(
        &self,
        name: impl Into<String>,
        pattern_type: PatternType,
        category: PatternCategory,
        node: &Node,
    ) -> CodePattern {
        self.pattern(name, pattern_type, category)
            .at_line(node.start_position().row + 1)
            .ending_at(node.end_position().row + 1)
            .with_snippet(self.snippet_for_node(node))
    }
}

/// A stateless rule that inspects a source file.
pub trait Detector: Send + Sync {
    /// Stable detector name, used in logs and for disabling.
    fn name(&self) -> &'static str;

    /// Return every finding; an empty list on no match.
    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<CodePattern>;
}

/// A detector backed by a plain function.
pub struct FnDetector<F> {
    name: &'static str,
    detect: F,
}

impl<F> FnDetector<F>
where
    F: Fn(&DetectionContext<'_>) -> Vec<CodePattern> + Send + Sync,
{
    pub fn new(name: &'static str, detect: F) -> Self {
        Self { name, detect }
    }
}

impl<F> Detector for FnDetector<F>
where
    F: Fn(&DetectionContext<'_>) -> Vec<CodePattern> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(&self, ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
        (self.detect)(ctx)
    }
}

/// Output of running a bank.
#[derive(Debug, Default)]
pub struct BankOutput {
    pub patterns: Vec<CodePattern>,
    pub errors: Vec<ParseError>,
}

/// An ordered set of detectors for one language or domain.
pub struct DetectorBank {
    name: &'static str,
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorBank {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            detectors: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a detector.
    pub fn register(&mut self, detector: impl Detector + 'static) {
        self.detectors.push(Box::new(detector));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, detector: impl Detector + 'static) -> Self {
        self.register(detector);
        self
    }

    /// Register a function as a detector.
    pub fn with_fn<F>(self, name: &'static str, detect: F) -> Self
    where
        F: Fn(&DetectionContext<'_>) -> Vec<CodePattern> + Send + Sync + 'static,
    {
        self.with(FnDetector::new(name, detect))
    }

    /// Drop detectors disabled by configuration.
    pub fn configured(mut self, config: &DetectorConfig) -> Self {
        self.detectors.retain(|d| config.is_enabled(d.name()));
        self
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector, isolating failures per detector.
    pub fn run(&self, ctx: &DetectionContext<'_>) -> BankOutput {
        let mut output = BankOutput::default();

        for detector in &self.detectors {
            match catch_unwind(AssertUnwindSafe(|| detector.detect(ctx))) {
                Ok(patterns) => {
                    tracing::trace!(
                        bank = self.name,
                        detector = detector.name(),
                        patterns = patterns.len(),
                        "detector finished"
                    );
                    output.patterns.extend(patterns);
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(
                        bank = self.name,
                        detector = detector.name(),
                        path = ctx.file_path,
                        error = %message,
                        "detector failed"
                    );
                    output.errors.push(ParseError::Detector {
                        detector: detector.name().to_string(),
                        message,
                    });
                }
            }
        }

        output
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
