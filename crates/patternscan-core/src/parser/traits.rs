//! Core parser traits for language-agnostic extraction.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tree_sitter::Tree;

use crate::error::ParseError;
use crate::model::ParseResult;

/// Language parser working on in-memory content.
///
/// Each parser is responsible for:
///
/// 1. **Elements**: file, classes/modules, interfaces, methods, properties
/// 2. **Relationships**: inherits, implements, calls, injects, throws, ...
/// 3. **Patterns**: every detector bank registered for the language
///
/// Failures are recorded in the returned [`ParseResult`], never raised.
pub trait Parser: Send + Sync {
    /// Parse a source file.
    ///
    /// # Arguments
    /// * `path` - Logical path of the file (used for names and context)
    /// * `content` - Source code content
    /// * `context` - Grouping label; resolved from the path when `None`
    /// * `cancel` - Checked before tree construction
    fn parse_file(
        &self,
        path: &str,
        content: &str,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult;

    /// Human-readable language name.
    fn language_name(&self) -> &'static str;

    /// File extensions this parser handles.
    fn supported_extensions(&self) -> &[&'static str];

    /// Check if this parser can handle the given file extension.
    fn can_parse(&self, extension: &str) -> bool {
        self.supported_extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// Parse capability level.
    fn capability(&self) -> ParserCapability {
        ParserCapability::Structural
    }
}

/// Parser whose underlying format reader only accepts a file on disk.
///
/// The router bridges in-memory content to these through a temp file.
pub trait PathParser: Send + Sync {
    /// Parse the file at `path`.
    fn parse_path(
        &self,
        path: &Path,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult;

    fn language_name(&self) -> &'static str;

    fn supported_extensions(&self) -> &[&'static str];
}

/// Wraps a native parser behind "parse text -> tree root".
pub trait AstProvider: Send + Sync {
    fn language_name(&self) -> &'static str;

    fn parse_tree(&self, content: &str) -> Result<Tree, ParseError>;
}

/// Level of parsing capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParserCapability {
    /// Line/regex extraction - names and line numbers only.
    Basic,
    /// AST-based extraction - full signatures, generics, relationships.
    Structural,
}

impl std::fmt::Display for ParserCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "Basic"),
            Self::Structural => write!(f, "Structural"),
        }
    }
}
