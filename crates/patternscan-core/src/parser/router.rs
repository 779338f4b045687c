//! Composite router: one entry point for every file type.
//!
//! Dispatch is by extension only. `.json` goes to the ARM template parser
//! first and to generic JSON when that yields nothing. Unknown extensions
//! and oversize files become a single capped `unstructured` file element.
//! Path-only parsers get the content through a temporary file that is
//! removed on every exit path.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;

use super::context::ContextResolver;
use super::registry::{extension, Dispatch, ParserRegistry};
use super::session::content_hash;
use super::traits::{PathParser, Parser};
use crate::config::{DirectoryScanConfig, RouterConfig, ScanConfig};
use crate::error::ParseError;
use crate::model::{CodeElement, ElementKind, ParseResult};

/// Routes a file to the parser that understands it.
#[async_trait]
pub trait Router: Send + Sync {
    /// Parse `path`. When `content` is `None` the file is read from disk.
    async fn route(
        &self,
        path: &str,
        content: Option<&str>,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult;
}

/// Router over a [`ParserRegistry`].
pub struct CompositeRouter {
    registry: ParserRegistry,
    resolver: ContextResolver,
    config: RouterConfig,
    scan: DirectoryScanConfig,
}

impl CompositeRouter {
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_registry(ParserRegistry::new(config), config)
    }

    pub fn with_registry(registry: ParserRegistry, config: &ScanConfig) -> Self {
        Self {
            registry,
            resolver: ContextResolver::new(&config.context),
            config: config.router.clone(),
            scan: config.scan.clone(),
        }
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Route every file under `root`, git-ignore aware, in path order.
    ///
    /// Result paths are relative to `root`.
    pub async fn route_directory(&self, root: &Path, cancel: &CancellationToken) -> Vec<ParseResult> {
        let scan = self.scan.clone();
        let walk_root = root.to_path_buf();
        let files = match tokio::task::spawn_blocking(move || collect_files(&walk_root, &scan)).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "directory walk failed");
                return Vec::new();
            }
        };
        tracing::debug!(root = %root.display(), files = files.len(), "scanning directory");

        let mut results: Vec<ParseResult> = stream::iter(files)
            .map(|(absolute, relative)| async move {
                if cancel.is_cancelled() {
                    return ParseResult::failed(&relative, ParseError::Cancelled(relative.clone()));
                }
                let content = match read_source(&absolute).await {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::warn!(path = %relative, error = %e, "failed to read file");
                        return ParseResult::failed(&relative, e);
                    }
                };
                let context = self
                    .resolver
                    .resolve_blocking(&absolute.to_string_lossy(), None)
                    .await;
                self.route(&relative, Some(&content), Some(&context), cancel).await
            })
            .buffer_unordered(self.scan.concurrency.max(1))
            .collect()
            .await;

        results.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        results
    }

    /// Parse with `parser`, then with `fallback` when that yields no
    /// elements. Errors from the first attempt are kept.
    async fn parse_content(
        &self,
        parser: &Arc<dyn Parser>,
        fallback: Option<&Arc<dyn Parser>>,
        path: &str,
        content: &str,
        context: &str,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let content: Arc<str> = Arc::from(content);
        let result = parse_text(parser, path, &content, context, cancel).await;

        match fallback {
            Some(fallback) if result.elements.is_empty() => {
                tracing::debug!(path, parser = fallback.language_name(), "falling back");
                let mut fallen = parse_text(fallback, path, &content, context, cancel).await;
                for error in result.errors() {
                    fallen.add_error(error);
                }
                fallen
            }
            _ => result,
        }
    }

    /// Write `content` to a fresh temp file, parse it, and report the
    /// logical path. The temp file is gone when this returns.
    async fn parse_bridged(
        &self,
        parser: &Arc<dyn PathParser>,
        path: &str,
        content: &str,
        context: &str,
        cancel: &CancellationToken,
    ) -> ParseResult {
        let suffix = extension(path).map(|e| format!(".{}", e)).unwrap_or_default();
        let temp = match tempfile::Builder::new()
            .prefix(&self.config.temp_file_prefix)
            .suffix(&suffix)
            .tempfile()
        {
            Ok(temp) => temp,
            Err(e) => return ParseResult::failed(path, ParseError::io(std::env::temp_dir(), e)),
        };

        if let Err(e) = tokio::fs::write(temp.path(), content).await {
            return ParseResult::failed(path, ParseError::io(temp.path(), e));
        }

        let temp_path = temp.path().to_path_buf();
        let mut result = {
            let (parser, temp_path) = (Arc::clone(parser), temp_path.clone());
            let (context, cancel) = (context.to_string(), cancel.clone());
            run_blocking(path, parser.language_name(), move || {
                parser.parse_path(&temp_path, Some(&context), &cancel)
            })
            .await
        };
        result.rewrite_file_path(&temp_path.to_string_lossy(), path);

        if let Err(e) = temp.close() {
            tracing::warn!(path, error = %e, "failed to remove temp file");
        }
        result
    }

    /// One `unstructured` file element holding at most the configured
    /// number of characters.
    fn unstructured(&self, path: &str, content: &str, context: &str) -> ParseResult {
        let cap = self.config.unstructured_content_cap;
        let truncated = content.chars().count() > cap;
        let kept: String = content.chars().take(cap).collect();

        let element = CodeElement::new(ElementKind::File, path, path, context)
            .with_content(kept)
            .with_tag("unstructured")
            .with_metadata("language", "unknown")
            .with_metadata("extension", extension(path).unwrap_or_default())
            .with_metadata("truncated", truncated)
            .with_metadata("original_length", content.chars().count())
            .with_metadata("content_hash", content_hash(content));

        let mut result = ParseResult::new(path);
        result.add_element(element);
        result
    }
}

impl Default for CompositeRouter {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

#[async_trait]
impl Router for CompositeRouter {
    async fn route(
        &self,
        path: &str,
        content: Option<&str>,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> ParseResult {
        if cancel.is_cancelled() {
            return ParseResult::failed(path, ParseError::Cancelled(path.to_string()));
        }

        let loaded;
        let content = match content {
            Some(content) => content,
            None => match read_source(Path::new(path)).await {
                Ok(text) => {
                    loaded = text;
                    loaded.as_str()
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to read file");
                    return ParseResult::failed(path, e);
                }
            },
        };

        if cancel.is_cancelled() {
            return ParseResult::failed(path, ParseError::Cancelled(path.to_string()));
        }

        let context = self.resolver.resolve_blocking(path, context).await;
        let dispatch = if content.len() as u64 > self.config.max_file_size {
            tracing::debug!(path, size = content.len(), "file too large, keeping as unstructured");
            Dispatch::Unstructured
        } else {
            self.registry.dispatch(path)
        };
        tracing::debug!(path, parser = dispatch.parser_name(), "routing file");

        let mut result = match &dispatch {
            Dispatch::Content { parser, fallback } => {
                self.parse_content(parser, fallback.as_ref(), path, content, &context, cancel)
                    .await
            }
            Dispatch::Path(parser) => self.parse_bridged(parser, path, content, &context, cancel).await,
            Dispatch::Unstructured => self.unstructured(path, content, &context),
        };

        result.attach_patterns_to_file_element();
        tracing::debug!(
            path,
            parser = dispatch.parser_name(),
            elements = result.elements.len(),
            patterns = result.patterns.len(),
            errors = result.errors().len(),
            "routed file"
        );
        result
    }
}

/// Files under `root`, git-ignore aware, as (absolute, root-relative) pairs.
fn collect_files(root: &Path, scan: &DirectoryScanConfig) -> Vec<(PathBuf, String)> {
    let excluded = scan.exclude_dirs.clone();
    let walker = WalkBuilder::new(root)
        .hidden(!scan.include_hidden)
        .git_ignore(true)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && excluded.iter().any(|d| entry.file_name() == d.as_str()))
        })
        .build();

    walker
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| {
            let absolute = entry.into_path();
            let relative = absolute
                .strip_prefix(root)
                .unwrap_or(&absolute)
                .to_string_lossy()
                .replace('\\', "/");
            (absolute, relative)
        })
        .collect()
}

/// Read a source file, replacing invalid UTF-8.
async fn read_source(path: &Path) -> Result<String, ParseError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ParseError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Run `parser` over in-memory text on the blocking pool.
async fn parse_text(
    parser: &Arc<dyn Parser>,
    path: &str,
    content: &Arc<str>,
    context: &str,
    cancel: &CancellationToken,
) -> ParseResult {
    let name = parser.language_name();
    let (parser, content, cancel) = (Arc::clone(parser), Arc::clone(content), cancel.clone());
    let (logical, context) = (path.to_string(), context.to_string());
    run_blocking(path, name, move || {
        parser.parse_file(&logical, &content, Some(&context), &cancel)
    })
    .await
}

/// Parsing reads files and walks whole trees, so it stays off the async
/// worker threads.
async fn run_blocking<F>(path: &str, parser: &'static str, parse: F) -> ParseResult
where
    F: FnOnce() -> ParseResult + Send + 'static,
{
    let logical = path.to_string();
    match tokio::task::spawn_blocking(move || guarded(&logical, parser, parse)).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(path, parser, error = %e, "parser task failed");
            ParseResult::failed(path, ParseError::Provider(format!("{} parser failed: {}", parser, e)))
        }
    }
}

/// Run a parser; a panic becomes an error result instead of unwinding
/// into the caller.
fn guarded<F>(path: &str, parser: &str, parse: F) -> ParseResult
where
    F: FnOnce() -> ParseResult,
{
    match catch_unwind(AssertUnwindSafe(parse)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!(path, parser, error = %message, "parser panicked");
            ParseResult::failed(path, ParseError::Provider(format!("{} parser failed: {}", parser, message)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelationshipKind;

    fn router() -> CompositeRouter {
        CompositeRouter::default()
    }

    #[tokio::test]
    async fn test_unknown_extension_is_unstructured() {
        let content = "x".repeat(12_000);
        let result = router()
            .route("docs/notes.txt", Some(&content), None, &CancellationToken::new())
            .await;

        assert!(result.success());
        assert_eq!(result.elements.len(), 1);
        let file = &result.elements[0];
        assert_eq!(file.kind, ElementKind::File);
        assert!(file.has_tag("unstructured"));
        assert_eq!(file.content.chars().count(), 5000);
        assert_eq!(file.metadata["truncated"], true);
        assert_eq!(file.metadata["original_length"], 12_000);
    }

    #[tokio::test]
    async fn test_original_length_counts_characters() {
        let content = "héllo wörld ✓ ".repeat(500);
        let result = router()
            .route("docs/notes.txt", Some(&content), None, &CancellationToken::new())
            .await;

        let file = &result.elements[0];
        let chars = content.chars().count();
        assert!(chars < content.len());
        assert_eq!(file.metadata["original_length"], chars);
        assert_eq!(file.metadata["truncated"], true);
        assert_eq!(file.content.chars().count(), 5000);
    }

    #[tokio::test]
    async fn test_patterns_attached_to_file_element() {
        let source = "resource \"aws_instance\" \"web\" {\n  ami = \"ami-123\"\n}\n";
        let result = router()
            .route("infra/main.tf", Some(source), None, &CancellationToken::new())
            .await;

        let file = result.file_element().unwrap();
        let attached = file.metadata["detected_patterns"].as_array().unwrap();
        assert_eq!(attached.len(), result.patterns.len());
    }

    #[tokio::test]
    async fn test_missing_file_is_single_error() {
        let result = router()
            .route("/definitely/not/here.cs", None, None, &CancellationToken::new())
            .await;
        assert!(!result.success());
        assert_eq!(result.errors().len(), 1);
        assert!(result.elements.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_read() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = router().route("a.cs", Some("class A {}"), None, &cancel).await;
        assert!(!result.success());
        assert!(result.elements.is_empty());
    }

    #[tokio::test]
    async fn test_bridged_paths_are_logical() {
        let csproj = r#"<Project Sdk="Microsoft.NET.Sdk"><ItemGroup><PackageReference Include="Serilog" Version="3.1.1" /></ItemGroup></Project>"#;
        let result = router()
            .route("src/Shop/Shop.csproj", Some(csproj), None, &CancellationToken::new())
            .await;

        assert!(result.success(), "{:?}", result.errors());
        assert_eq!(result.file_path, "src/Shop/Shop.csproj");
        assert!(result.elements.iter().all(|e| e.file_path == "src/Shop/Shop.csproj"));
        assert!(result.has_relationship("src/Shop/Shop.csproj", "Serilog", RelationshipKind::Imports));
    }

    #[tokio::test]
    async fn test_oversize_file_is_unstructured() {
        let mut config = ScanConfig::default();
        config.router.max_file_size = 10;
        let router = CompositeRouter::new(&config);
        let result = router
            .route("a.cs", Some("public class Foo {}"), None, &CancellationToken::new())
            .await;
        assert!(result.elements[0].has_tag("unstructured"));
    }
}
