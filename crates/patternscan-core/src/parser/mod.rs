//! Language parsers and the router in front of them.
//!
//! Every parser turns one file into the shared IR ([`crate::model`]) and
//! runs the detector banks registered for its language.
//!
//! ## Components
//!
//! - `Parser` trait - in-memory parsers
//! - `PathParser` trait - parsers that only read files on disk
//! - `ParserRegistry` - maps file extensions to parsers
//! - `CompositeRouter` - single entry point; fallback, temp-file bridging
//!   and the unstructured catch-all
//!
//! ## Supported Languages
//!
//! - C# (tree-sitter)
//! - TypeScript/JavaScript (tree-sitter)
//! - Python (tree-sitter, process-wide runtime)
//! - Terraform (tree-sitter HCL)
//! - VB.NET, Dart, Bicep (line-based)
//! - ARM templates and generic JSON (serde_json)
//! - .NET solutions and projects (quick-xml)

mod arm;
mod bicep;
mod context;
mod csharp;
mod dart;
mod emit;
mod json;
mod project;
pub(crate) mod python;
mod registry;
mod router;
mod session;
mod terraform;
mod text;
pub(crate) mod traits;
pub(crate) mod treesitter;
pub(crate) mod types;
mod typescript;
mod vbnet;

pub use arm::{is_arm_template, ArmTemplateParser};
pub use bicep::BicepParser;
pub use context::ContextResolver;
pub use csharp::CSharpParser;
pub use dart::DartParser;
pub use json::JsonParser;
pub use project::ProjectFileParser;
pub use python::{PythonParser, PythonRuntime};
pub use registry::{Dispatch, ParserRegistry};
pub use router::{CompositeRouter, Router};
pub use session::content_hash;
pub use terraform::TerraformParser;
pub use traits::{AstProvider, Parser, ParserCapability, PathParser};
pub use treesitter::TreeSitterProvider;
pub use typescript::TypeScriptParser;
pub use vbnet::VbNetParser;
