//! Shared intermediate representation produced by every parser.
//!
//! - [`CodeElement`] - structural units (file, class, interface, method, property)
//! - [`Relationship`] - typed edges between element names
//! - [`CodePattern`] - detector findings with advisory metadata
//! - [`ParseResult`] - everything produced for one file

mod element;
mod pattern;
mod relationship;
mod result;

pub use element::{CodeElement, ElementKind};
pub use pattern::{CodePattern, PatternCategory, PatternType};
pub use relationship::{Relationship, RelationshipKind};
pub use result::{ParseResult, ParseStats, PATTERNS_METADATA_KEY};
