pub mod config;
pub mod detectors;
pub mod error;
pub mod model;
pub mod parser;

pub use config::ScanConfig;
pub use detectors::{DetectionContext, Detector, DetectorBank};
pub use error::{ConfigError, ParseError};
pub use model::{
    CodeElement, CodePattern, ElementKind, ParseResult, ParseStats, PatternCategory, PatternType,
    Relationship, RelationshipKind,
};
pub use parser::{CompositeRouter, Parser, ParserRegistry, PathParser, Router};
