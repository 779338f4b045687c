//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `patternscan.toml` file
//! 3. User config `~/.config/patternscan/config.toml`
//! 4. Built-in defaults (lowest priority)
//!
//! Detector advice, documentation links and confidences are compiled in and
//! are not configurable.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

mod defaults;

pub use defaults::*;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub router: RouterConfig,
    pub context: ContextConfig,
    pub detectors: DetectorConfig,
    pub scan: DirectoryScanConfig,
}

impl ScanConfig {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./patternscan.toml` (project local)
    /// 2. `~/.config/patternscan/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(PROJECT_CONFIG_FILE).exists() {
            return Self::from_file(PROJECT_CONFIG_FILE);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(USER_CONFIG_DIR).join(USER_CONFIG_FILE);
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ScanConfig = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(cap) = std::env::var("PATTERNSCAN_UNSTRUCTURED_CAP") {
            if let Ok(n) = cap.parse() {
                self.router.unstructured_content_cap = n;
            }
        }
        if let Ok(size) = std::env::var("PATTERNSCAN_MAX_FILE_SIZE") {
            if let Ok(n) = size.parse() {
                self.router.max_file_size = n;
            }
        }
        if let Ok(lines) = std::env::var("PATTERNSCAN_SNIPPET_LINES") {
            if let Ok(n) = lines.parse() {
                self.detectors.snippet_context_lines = n;
            }
        }
        if let Ok(disabled) = std::env::var("PATTERNSCAN_DISABLED_DETECTORS") {
            self.detectors.disabled = disabled
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.router.unstructured_content_cap == 0 {
            return Err(ConfigError::Invalid(
                "router.unstructured_content_cap must be greater than zero".to_string(),
            ));
        }
        if self.scan.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "scan.concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        toml::to_string_pretty(&ScanConfig::default()).unwrap_or_default()
    }
}

/// Dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum characters kept for an unstructured file element.
    pub unstructured_content_cap: usize,

    /// Files above this size (bytes) are not handed to a language parser.
    pub max_file_size: u64,

    /// Prefix for bridging temp files.
    pub temp_file_prefix: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            unstructured_content_cap: DEFAULT_UNSTRUCTURED_CONTENT_CAP,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            temp_file_prefix: DEFAULT_TEMP_FILE_PREFIX.to_string(),
        }
    }
}

/// Context resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Directory names that act as a source root.
    pub source_root_dirs: Vec<String>,

    /// File names (or `*.ext` globs) that mark a project root.
    pub project_markers: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            source_root_dirs: DEFAULT_SOURCE_ROOT_DIRS.iter().map(|s| s.to_string()).collect(),
            project_markers: DEFAULT_PROJECT_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Lines of context kept around each match.
    pub snippet_context_lines: usize,

    /// Detector names left out of every bank.
    pub disabled: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            snippet_context_lines: DEFAULT_SNIPPET_CONTEXT_LINES,
            disabled: Vec::new(),
        }
    }
}

impl DetectorConfig {
    pub fn is_enabled(&self, detector: &str) -> bool {
        !self.disabled.iter().any(|d| d.eq_ignore_ascii_case(detector))
    }
}

/// Directory scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryScanConfig {
    pub exclude_dirs: Vec<String>,
    pub include_hidden: bool,
    pub concurrency: usize,
}

impl Default for DirectoryScanConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            include_hidden: false,
            concurrency: DEFAULT_SCAN_CONCURRENCY,
        }
    }
}
