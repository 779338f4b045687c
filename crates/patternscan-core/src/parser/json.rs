//! Generic JSON fallback for `.json` files that are not ARM templates.
//!
//! The file is kept as one opaque chunk; only its top-level keys are
//! surfaced as properties.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::context::ContextResolver;
use super::emit::Emitter;
use super::session::ParseSession;
use super::text::line_at;
use super::traits::{Parser, ParserCapability};
use super::types::TypeSystem;
use crate::config::ScanConfig;
use crate::model::{ElementKind, ParseResult};

/// Generic JSON parser.
pub struct JsonParser {
    resolver: ContextResolver,
}

impl JsonParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            resolver: ContextResolver::new(&config.context),
        }
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl Parser for JsonParser {
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let context = self.resolver.resolve(path, context);
        let mut session = ParseSession::begin(path, content, context, "JSON");
        if session.cancelled(cancel) {
            return session.finish();
        }

        let document = serde_json::from_str::<Value>(content);
        let keys: Vec<String> = match &document {
            Ok(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };

        if let Some(file) = session.result.file_element_mut() {
            file.add_tag("json");
            file.metadata
                .insert("valid_json".to_string(), Value::Bool(document.is_ok()));
            file.metadata
                .insert("top_level_keys".to_string(), Value::from(keys.clone()));
        }

        let context = session.context.clone();
        let mut out = Emitter::new(path, &context, TypeSystem::TypeScript, &mut session.result);
        for key in &keys {
            let line = content
                .find(&format!("\"{}\"", key))
                .map(|offset| line_at(content, offset))
                .unwrap_or(1);
            let element = out.element(ElementKind::Property, key, line).with_tag("json_key");
            out.define(path, element);
        }

        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "JSON"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["json"]
    }

    fn capability(&self) -> ParserCapability {
        ParserCapability::Basic
    }
}
