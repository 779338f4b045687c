//! Shared per-file parse scaffolding.
//!
//! Every language parser runs the same sequence: seed the file element,
//! honor cancellation, obtain a tree, walk it, then fold over the detector
//! banks. Each extraction stage and each detector runs behind its own
//! unwind boundary so one failure never discards sibling output.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tree_sitter::Tree;

use crate::detectors::{DetectionContext, DetectorBank};
use crate::error::ParseError;
use crate::model::{CodeElement, ElementKind, ParseResult};

/// State for one parse pass over one file.
pub struct ParseSession<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub context: String,
    pub result: ParseResult,
}

impl<'a> ParseSession<'a> {
    /// Start a pass with the file element pre-seeded.
    pub fn begin(path: &'a str, content: &'a str, context: String, language: &str) -> Self {
        let mut result = ParseResult::new(path);
        result.add_element(file_element(path, content, &context, language));
        Self {
            path,
            content,
            context,
            result,
        }
    }

    /// Record a cancellation error and report whether the caller should stop.
    pub fn cancelled(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            self.result
                .add_error(ParseError::Cancelled(self.path.to_string()));
            return true;
        }
        false
    }

    pub fn fail(&mut self, error: ParseError) {
        tracing::debug!(path = self.path, error = %error, "parse step failed");
        self.result.add_error(error);
    }

    /// Run one extraction stage. A panic is recorded as an error; whatever
    /// the stage added before failing is kept.
    pub fn extract<F>(&mut self, stage: &str, f: F)
    where
        F: FnOnce(&mut ParseResult),
    {
        let result = &mut self.result;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(result))) {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!(path = self.path, stage, error = %message, "extraction failed");
            self.result
                .add_error(ParseError::Provider(format!("{} extraction failed: {}", stage, message)));
        }
    }

    /// Mark the file element as containing syntax errors.
    pub fn flag_syntax_errors(&mut self, first_line: usize) {
        if let Some(file) = self.result.file_element_mut() {
            file.metadata
                .insert("has_syntax_errors".to_string(), Value::Bool(true));
            file.metadata
                .insert("first_error_line".to_string(), Value::from(first_line));
        }
    }

    /// Run every bank over the same source, tree and document.
    pub fn detect(
        &mut self,
        banks: &[DetectorBank],
        tree: Option<&Tree>,
        document: Option<&Value>,
        snippet_lines: usize,
    ) {
        let mut ctx = DetectionContext::new(self.path, &self.context, self.content)
            .with_snippet_lines(snippet_lines);
        ctx.tree = tree;
        ctx.document = document;

        for bank in banks {
            let output = bank.run(&ctx);
            tracing::trace!(
                path = self.path,
                bank = bank.name(),
                patterns = output.patterns.len(),
                "bank finished"
            );
            self.result.add_patterns(output.patterns);
            for error in output.errors {
                self.result.add_error(error);
            }
        }
    }

    pub fn finish(self) -> ParseResult {
        tracing::debug!(
            path = self.path,
            elements = self.result.elements.len(),
            relationships = self.result.relationships.len(),
            patterns = self.result.patterns.len(),
            errors = self.result.errors().len(),
            "parsed file"
        );
        self.result
    }
}

/// The file-level element every structured parse starts from.
pub fn file_element(path: &str, content: &str, context: &str, language: &str) -> CodeElement {
    CodeElement::new(ElementKind::File, path, path, context)
        .with_content(content)
        .with_tag(language.to_ascii_lowercase())
        .with_metadata("language", language)
        .with_metadata("content_hash", content_hash(content))
        .with_metadata("line_count", content.lines().count())
}

/// SHA-256 of the content, hex encoded.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_element_is_seeded() {
        let session = ParseSession::begin("a/b.cs", "class A {}\n", "a".to_string(), "C#");
        let result = session.finish();
        let file = result.file_element().unwrap();
        assert_eq!(file.name, "a/b.cs");
        assert_eq!(file.metadata["line_count"], 1);
        assert_eq!(file.metadata["content_hash"].as_str().unwrap().len(), 64);
        assert!(file.has_tag("c#"));
    }

    #[test]
    fn test_extract_keeps_partial_output() {
        let mut session = ParseSession::begin("a.cs", "", "a".to_string(), "C#");
        session.extract("walk", |result| {
            result.add_error("first");
            panic!("walker bug");
        });
        let result = session.finish();
        assert_eq!(result.errors().len(), 2);
        assert!(result.errors()[1].contains("walker bug"));
        assert_eq!(result.elements.len(), 1);
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        let mut session = ParseSession::begin("a.cs", "", "a".to_string(), "C#");
        assert!(!session.cancelled(&cancel));
        cancel.cancel();
        assert!(session.cancelled(&cancel));
        assert!(!session.finish().success());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
