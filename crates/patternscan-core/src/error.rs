//! Error types.
//!
//! Parse errors never escape a parse as `Err`; they are rendered into
//! `ParseResult::errors` so partial results survive.

use std::path::PathBuf;
use thiserror::Error;

/// Errors recorded while parsing a single file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// File could not be read or a temp file could not be written.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The AST provider rejected the source.
    #[error("Syntax error in {path} at line {line}: {message}")]
    Syntax {
        path: String,
        line: usize,
        message: String,
    },

    /// The AST provider could not be set up or returned no tree.
    #[error("Parser error: {0}")]
    Provider(String),

    /// The caller cancelled the operation.
    #[error("Parsing cancelled for {0}")]
    Cancelled(String),

    /// A single detector failed; its siblings still ran.
    #[error("Detector {detector} failed: {message}")]
    Detector { detector: String, message: String },
}

impl ParseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ParseError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
