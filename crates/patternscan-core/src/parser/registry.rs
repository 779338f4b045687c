//! Parser registry: file extension to parser.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use super::arm::ArmTemplateParser;
use super::bicep::BicepParser;
use super::csharp::CSharpParser;
use super::dart::DartParser;
use super::json::JsonParser;
use super::project::ProjectFileParser;
use super::python::PythonParser;
use super::terraform::TerraformParser;
use super::traits::{PathParser, Parser};
use super::typescript::TypeScriptParser;
use super::vbnet::VbNetParser;
use crate::config::ScanConfig;

/// What handles a given extension.
#[derive(Clone)]
pub enum Dispatch {
    /// In-memory parser, with a fallback tried when it yields no elements.
    Content {
        parser: Arc<dyn Parser>,
        fallback: Option<Arc<dyn Parser>>,
    },
    /// Parser that only reads files on disk.
    Path(Arc<dyn PathParser>),
    /// No parser; kept as a single opaque file element.
    Unstructured,
}

impl Dispatch {
    pub fn parser_name(&self) -> &'static str {
        match self {
            Dispatch::Content { parser, .. } => parser.language_name(),
            Dispatch::Path(parser) => parser.language_name(),
            Dispatch::Unstructured => "unstructured",
        }
    }
}

/// Registry of language parsers.
///
/// Extensions are matched case-insensitively. Registering a second parser
/// for an extension replaces the first.
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
    fallbacks: HashMap<String, Arc<dyn Parser>>,
    path_parsers: HashMap<String, Arc<dyn PathParser>>,
}

impl ParserRegistry {
    /// A registry with no parsers.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
            fallbacks: HashMap::new(),
            path_parsers: HashMap::new(),
        }
    }

    /// A registry with every built-in parser.
    pub fn new(config: &ScanConfig) -> Self {
        let mut registry = Self::empty();

        registry.register(Arc::new(CSharpParser::new(config)));
        registry.register(Arc::new(VbNetParser::new(config)));
        registry.register(Arc::new(TypeScriptParser::new(config)));
        registry.register(Arc::new(PythonParser::new(config)));
        registry.register(Arc::new(DartParser::new(config)));
        registry.register(Arc::new(TerraformParser::new(config)));
        registry.register(Arc::new(BicepParser::new(config)));
        // ARM templates first, anything else as generic JSON
        registry.register(Arc::new(ArmTemplateParser::new(config)));
        registry.register_fallback(Arc::new(JsonParser::new(config)));
        registry.register_path(Arc::new(ProjectFileParser::new(config)));

        registry
    }

    /// Register a parser for its supported extensions.
    pub fn register(&mut self, parser: Arc<dyn Parser>) {
        for ext in parser.supported_extensions() {
            self.path_parsers.remove(&ext.to_lowercase());
            self.parsers.insert(ext.to_lowercase(), Arc::clone(&parser));
        }
    }

    /// Register a parser tried when the primary parser for the same
    /// extension returns no elements.
    pub fn register_fallback(&mut self, parser: Arc<dyn Parser>) {
        for ext in parser.supported_extensions() {
            self.fallbacks.insert(ext.to_lowercase(), Arc::clone(&parser));
        }
    }

    /// Register a path-only parser for its supported extensions.
    pub fn register_path(&mut self, parser: Arc<dyn PathParser>) {
        for ext in parser.supported_extensions() {
            self.parsers.remove(&ext.to_lowercase());
            self.path_parsers.insert(ext.to_lowercase(), Arc::clone(&parser));
        }
    }

    /// Get a parser for the given file extension.
    pub fn parser_for_extension(&self, extension: &str) -> Option<Arc<dyn Parser>> {
        self.parsers.get(&extension.to_lowercase()).cloned()
    }

    pub fn path_parser_for_extension(&self, extension: &str) -> Option<Arc<dyn PathParser>> {
        self.path_parsers.get(&extension.to_lowercase()).cloned()
    }

    /// Decide how a file is handled, from its extension alone.
    pub fn dispatch(&self, path: &str) -> Dispatch {
        let Some(ext) = extension(path) else {
            return Dispatch::Unstructured;
        };

        if let Some(parser) = self.parsers.get(&ext) {
            return Dispatch::Content {
                parser: Arc::clone(parser),
                fallback: self.fallbacks.get(&ext).cloned(),
            };
        }
        if let Some(parser) = self.path_parsers.get(&ext) {
            return Dispatch::Path(Arc::clone(parser));
        }
        match self.fallbacks.get(&ext) {
            Some(parser) => Dispatch::Content {
                parser: Arc::clone(parser),
                fallback: None,
            },
            None => Dispatch::Unstructured,
        }
    }

    /// Check if any parser can handle the given extension.
    pub fn can_parse(&self, extension: &str) -> bool {
        let ext = extension.to_lowercase();
        self.parsers.contains_key(&ext)
            || self.path_parsers.contains_key(&ext)
            || self.fallbacks.contains_key(&ext)
    }

    /// All handled extensions, sorted.
    pub fn supported_extensions(&self) -> Vec<&str> {
        self.parsers
            .keys()
            .chain(self.path_parsers.keys())
            .chain(self.fallbacks.keys())
            .map(|s| s.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// List all registered parsers with their extensions.
    pub fn list_parsers(&self) -> Vec<(&'static str, &[&'static str])> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();

        for parser in self.parsers.values().chain(self.fallbacks.values()) {
            if seen.insert(parser.language_name()) {
                result.push((parser.language_name(), parser.supported_extensions()));
            }
        }
        for parser in self.path_parsers.values() {
            if seen.insert(parser.language_name()) {
                result.push((parser.language_name(), parser.supported_extensions()));
            }
        }

        result.sort_by_key(|(name, _)| *name);
        result
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

/// Lowercased extension of `path`.
pub fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table() {
        let registry = ParserRegistry::default();
        let cases = [
            ("Program.cs", "C#"),
            ("Module1.vb", "VB.NET"),
            ("app.js", "TypeScript"),
            ("App.jsx", "TypeScript"),
            ("app.ts", "TypeScript"),
            ("App.tsx", "TypeScript"),
            ("server.mjs", "TypeScript"),
            ("config.cjs", "TypeScript"),
            ("main.py", "Python"),
            ("main.dart", "Dart"),
            ("main.tf", "Terraform"),
            ("prod.tfvars", "Terraform"),
            ("main.bicep", "Bicep"),
            ("azuredeploy.json", "ARM"),
            ("Shop.sln", "MSBuild"),
            ("Shop.csproj", "MSBuild"),
            ("Shop.vbproj", "MSBuild"),
            ("Shop.fsproj", "MSBuild"),
            ("README.md", "unstructured"),
            ("Makefile", "unstructured"),
        ];
        for (path, expected) in cases {
            assert_eq!(registry.dispatch(path).parser_name(), expected, "{}", path);
        }
    }

    #[test]
    fn test_json_has_fallback() {
        let registry = ParserRegistry::default();
        match registry.dispatch("data/settings.json") {
            Dispatch::Content { parser, fallback } => {
                assert_eq!(parser.language_name(), "ARM");
                assert_eq!(fallback.map(|f| f.language_name()), Some("JSON"));
            }
            _ => panic!("json must dispatch to a content parser"),
        }
    }

    #[test]
    fn test_case_insensitive() {
        let registry = ParserRegistry::default();
        assert!(registry.can_parse("CS"));
        assert!(registry.can_parse("Tf"));
        assert!(registry.can_parse("CSPROJ"));
        assert_eq!(registry.dispatch("SRC/APP.TS").parser_name(), "TypeScript");
        assert!(!registry.can_parse("xyz"));
    }

    #[test]
    fn test_path_parsers_are_separate() {
        let registry = ParserRegistry::default();
        assert!(registry.parser_for_extension("csproj").is_none());
        assert_eq!(
            registry.path_parser_for_extension("CsProj").map(|p| p.language_name()),
            Some("MSBuild")
        );
        assert!(registry.path_parser_for_extension("cs").is_none());
        assert_eq!(registry.parser_for_extension("cs").map(|p| p.language_name()), Some("C#"));
    }

    #[test]
    fn test_supported_extensions_sorted() {
        let registry = ParserRegistry::default();
        let extensions = registry.supported_extensions();
        assert!(extensions.windows(2).all(|w| w[0] < w[1]));
        assert!(extensions.contains(&"json"));
        assert!(extensions.contains(&"sln"));
        assert_eq!(registry.list_parsers().len(), 10);
    }
}
