//! Path-based resolution of the logical grouping label ("context").

use std::path::{Component, Path};

use crate::config::ContextConfig;

/// Resolves a context label from a file path.
///
/// Walking upward from the file, nearest ancestor first:
///
/// 1. a directory holding a project marker file names the context;
/// 2. a conventional source-root directory (`src`, `lib`, ...) makes the
///    next path segment below it the context;
/// 3. otherwise the immediate parent directory name, then the bare file
///    name.
#[derive(Debug, Clone)]
pub struct ContextResolver {
    source_roots: Vec<String>,
    markers: Vec<String>,
}

impl ContextResolver {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            source_roots: config
                .source_root_dirs
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            markers: config.project_markers.clone(),
        }
    }

    /// An explicit non-empty context wins; otherwise resolve from `path`.
    pub fn resolve(&self, path: &str, explicit: Option<&str>) -> String {
        if let Some(context) = explicit.map(str::trim).filter(|c| !c.is_empty()) {
            return context.to_string();
        }
        self.resolve_path(Path::new(path))
    }

    /// [`resolve`](Self::resolve) from async code. Marker lookups touch the
    /// filesystem, so they run on the blocking pool.
    pub async fn resolve_blocking(&self, path: &str, explicit: Option<&str>) -> String {
        if let Some(context) = explicit.map(str::trim).filter(|c| !c.is_empty()) {
            return context.to_string();
        }
        let resolver = self.clone();
        let owned = path.to_string();
        match tokio::task::spawn_blocking(move || resolver.resolve_path(Path::new(&owned))).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(path, error = %e, "context resolution failed");
                String::new()
            }
        }
    }

    pub fn resolve_path(&self, path: &Path) -> String {
        let segments: Vec<&str> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        let Some((file_name, dirs)) = segments.split_last() else {
            return String::new();
        };

        for (idx, dir) in dirs.iter().enumerate().rev() {
            let ancestor: &Path = path
                .ancestors()
                .nth(dirs.len() - idx)
                .unwrap_or(path);
            if self.has_marker(ancestor) {
                return (*dir).to_string();
            }
            if self.source_roots.contains(&dir.to_ascii_lowercase()) && idx + 1 < dirs.len() {
                return dirs[idx + 1].to_string();
            }
        }

        match dirs.last() {
            Some(parent) => (*parent).to_string(),
            None => file_stem(file_name).to_string(),
        }
    }

    fn has_marker(&self, dir: &Path) -> bool {
        if dir.as_os_str().is_empty() || !dir.is_dir() {
            return false;
        }
        self.markers.iter().any(|marker| match marker.strip_prefix("*.") {
            Some(ext) => dir_has_extension(dir, ext),
            None => dir.join(marker).is_file(),
        })
    }
}

impl Default for ContextResolver {
    fn default() -> Self {
        Self::new(&ContextConfig::default())
    }
}

fn dir_has_extension(dir: &Path, ext: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(Result::ok).any(|entry| {
        entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(ext))
            .unwrap_or(false)
    })
}

fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_context_wins() {
        let resolver = ContextResolver::default();
        assert_eq!(resolver.resolve("a/b/c.cs", Some("Billing")), "Billing");
        assert_eq!(resolver.resolve("a/b/c.cs", Some("  ")), "b");
    }

    #[test]
    fn test_source_root_segment() {
        let resolver = ContextResolver::default();
        assert_eq!(
            resolver.resolve("/nonexistent/repo/src/Orders/Domain/Order.cs", None),
            "Orders"
        );
    }

    #[test]
    fn test_parent_then_file_name() {
        let resolver = ContextResolver::default();
        assert_eq!(resolver.resolve("/nonexistent/tools/build.py", None), "tools");
        assert_eq!(resolver.resolve("build.py", None), "build");
    }

    #[test]
    fn test_source_root_as_parent_falls_back() {
        let resolver = ContextResolver::default();
        assert_eq!(resolver.resolve("/nonexistent/repo/src/main.py", None), "src");
    }

    #[test]
    fn test_marker_directory() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("Billing.Api");
        fs::create_dir_all(project.join("Controllers")).unwrap();
        fs::write(project.join("Billing.Api.csproj"), "<Project />").unwrap();

        let file = project.join("Controllers").join("InvoiceController.cs");
        let resolver = ContextResolver::default();
        assert_eq!(resolver.resolve(file.to_str().unwrap(), None), "Billing.Api");
    }

    #[tokio::test]
    async fn test_resolve_blocking_matches_resolve() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("Ledger");
        fs::create_dir_all(project.join("Models")).unwrap();
        fs::write(project.join("pyproject.toml"), "[project]\n").unwrap();
        let file = project.join("Models").join("entry.py");
        let file = file.to_str().unwrap();

        let resolver = ContextResolver::default();
        assert_eq!(resolver.resolve_blocking(file, None).await, resolver.resolve(file, None));
        assert_eq!(resolver.resolve_blocking(file, Some("Audit")).await, "Audit");
    }
}
