//! Default values for scan configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Router Defaults
// ============================================================================

/// Maximum characters kept in the content of an unstructured file element.
pub const DEFAULT_UNSTRUCTURED_CONTENT_CAP: usize = 5000;

/// Files larger than this are routed as unstructured (2 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

/// Prefix for temp files that bridge content to path-only parsers.
pub const DEFAULT_TEMP_FILE_PREFIX: &str = "patternscan-";

/// Files routed concurrently by a directory scan.
pub const DEFAULT_SCAN_CONCURRENCY: usize = 8;

// ============================================================================
// Context Defaults
// ============================================================================

/// Conventional source-root directory names. The segment after one of these
/// becomes the context.
pub const DEFAULT_SOURCE_ROOT_DIRS: &[&str] = &[
    "src", "source", "sources", "lib", "app", "apps", "packages", "projects", "services",
    "modules",
];

/// Files that mark a project root. Entries starting with `*.` match by extension.
pub const DEFAULT_PROJECT_MARKERS: &[&str] = &[
    // .NET
    "*.csproj", "*.vbproj", "*.fsproj", "*.sln",
    // JavaScript/TypeScript
    "package.json",
    // Python
    "pyproject.toml", "setup.py", "setup.cfg",
    // Dart/Flutter
    "pubspec.yaml",
    // Infrastructure
    "main.tf", "main.bicep", "azuredeploy.json",
    // Go
    "go.mod",
];

// ============================================================================
// Detector Defaults
// ============================================================================

/// Lines of source kept on each side of a match.
pub const DEFAULT_SNIPPET_CONTEXT_LINES: usize = 3;

// ============================================================================
// Scan Defaults
// ============================================================================

/// Directories skipped by directory scans.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    // Version control
    ".git", ".svn", ".hg",
    // Dependencies
    "node_modules", "vendor", "venv", ".venv", "__pycache__", ".dart_tool",
    // Build outputs
    "target", "build", "dist", "out", "bin", "obj",
    // Infrastructure state
    ".terraform",
    // IDE/Editor
    ".idea", ".vscode", ".vs",
];

/// Config file looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "patternscan.toml";

/// Directory under the user config dir.
pub const USER_CONFIG_DIR: &str = "patternscan";

/// File name inside [`USER_CONFIG_DIR`].
pub const USER_CONFIG_FILE: &str = "config.toml";
