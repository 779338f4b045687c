//! .NET solution and project file parser.
//!
//! - `.sln` project entries become `Contains` edges from the solution.
//! - `.csproj`/`.vbproj`/`.fsproj` package, project and assembly
//!   references become `Imports` edges and file-element dependencies;
//!   MSBuild properties (`TargetFramework(s)`, `OutputType`, ...) become
//!   file-element metadata.
//!
//! This parser reads from disk; the router bridges in-memory content to it
//! through a temporary file.

use std::borrow::Cow;
use std::path::Path;

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::context::ContextResolver;
use super::session::ParseSession;
use super::text::line_at;
use super::traits::PathParser;
use crate::config::ScanConfig;
use crate::detectors::{project, DetectorBank};
use crate::error::ParseError;
use crate::model::{ParseResult, Relationship, RelationshipKind};

static SLN_PROJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^Project\("\{([0-9A-Fa-f-]+)\}"\)\s*=\s*"([^"]+)"\s*,\s*"([^"]+)"\s*,\s*"\{([0-9A-Fa-f-]+)\}""#)
        .unwrap()
});

static SLN_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Microsoft Visual Studio Solution File, Format Version ([\d.]+)").unwrap());

/// Project type GUID of solution folders, which are not projects.
const SOLUTION_FOLDER_GUID: &str = "2150E333-8FDC-42A3-9474-1A3956D46DE8";

/// MSBuild properties copied to the file element.
const PROJECT_PROPERTIES: &[(&str, &str)] = &[
    ("TargetFramework", "target_framework"),
    ("TargetFrameworks", "target_frameworks"),
    ("TargetFrameworkVersion", "target_framework"),
    ("OutputType", "output_type"),
    ("RootNamespace", "root_namespace"),
    ("AssemblyName", "assembly_name"),
    ("LangVersion", "lang_version"),
    ("Nullable", "nullable"),
];

/// Solution and MSBuild project parser.
pub struct ProjectFileParser {
    resolver: ContextResolver,
    banks: Vec<DetectorBank>,
    snippet_lines: usize,
}

impl ProjectFileParser {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            resolver: ContextResolver::new(&config.context),
            banks: vec![project::bank(&config.detectors)],
            snippet_lines: config.detectors.snippet_context_lines,
        }
    }
}

impl Default for ProjectFileParser {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl PathParser for ProjectFileParser {
    fn parse_path(&self, path: &Path, context: Option<&str>, cancel: &CancellationToken) -> ParseResult {
        let display = path.to_string_lossy();
        if cancel.is_cancelled() {
            return ParseResult::failed(display.as_ref(), ParseError::Cancelled(display.to_string()));
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => return ParseResult::failed(display.as_ref(), ParseError::io(path, e)),
        };

        let is_solution = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("sln"));
        let language = if is_solution { "Solution" } else { "MSBuild" };

        let context = self.resolver.resolve(&display, context);
        let mut session = ParseSession::begin(&display, &content, context, language);

        let context = session.context.clone();
        if is_solution {
            session.extract("solution projects", |result| {
                solution_projects(&display, &content, &context, result)
            });
        } else {
            let mut failure = None;
            session.extract("project references", |result| {
                if let Err(e) = project_references(&display, &content, &context, result) {
                    failure = Some(e);
                }
            });
            if let Some(error) = failure {
                session.fail(error);
            }
            session.detect(&self.banks, None, None, self.snippet_lines);
        }

        session.finish()
    }

    fn language_name(&self) -> &'static str {
        "MSBuild"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["sln", "csproj", "vbproj", "fsproj"]
    }
}

fn solution_projects(path: &str, content: &str, context: &str, result: &mut ParseResult) {
    if let Some(version) = SLN_FORMAT.captures(content) {
        if let Some(file) = result.file_element_mut() {
            file.metadata
                .insert("format_version".to_string(), Value::from(&version[1]));
        }
    }

    let mut projects = Vec::new();
    for cap in SLN_PROJECT.captures_iter(content) {
        let Some(whole) = cap.get(0) else {
            continue;
        };
        let type_guid = &cap[1];
        if type_guid.eq_ignore_ascii_case(SOLUTION_FOLDER_GUID) {
            continue;
        }
        let project_path = normalize_path(&cap[3]);
        result.add_relationship(
            Relationship::new(path, project_path.as_str(), RelationshipKind::Contains, context)
                .with_line(line_at(content, whole.start()))
                .with_property("project_name", &cap[2])
                .with_property("project_guid", &cap[4])
                .with_property("project_type_guid", type_guid),
        );
        projects.push(project_path);
    }

    if let Some(file) = result.file_element_mut() {
        for project in projects {
            file.add_dependency(project);
        }
    }
}

/// Reference currently being read; `Version` may arrive as a child element.
struct PendingReference {
    element: &'static str,
    include: String,
    version: Option<String>,
    line: usize,
}

fn project_references(
    path: &str,
    content: &str,
    context: &str,
    result: &mut ParseResult,
) -> Result<(), ParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut pending: Option<PendingReference> = None;
    let mut references = Vec::new();
    let mut properties: Vec<(&'static str, String)> = Vec::new();

    loop {
        // whitespace before the next tag is skipped by the reader
        let at = (reader.buffer_position() as usize).min(content.len());
        let offset = content[at..]
            .find(|c: char| !c.is_whitespace())
            .map_or(at, |skip| at + skip);
        let event = reader.read_event().map_err(|e| ParseError::Syntax {
            path: path.to_string(),
            line: line_at(content, reader.error_position() as usize),
            message: e.to_string(),
        })?;

        match event {
            Event::Start(start) => {
                let name = local_name(&start);
                if stack.is_empty() {
                    if let Some(sdk) = attribute(&start, "Sdk") {
                        properties.push(("sdk", sdk));
                    }
                }
                if let Some(reference) = reference_start(&start, &name, line_at(content, offset)) {
                    pending = Some(reference);
                }
                stack.push(name);
            }
            Event::Empty(start) => {
                let name = local_name(&start);
                if let Some(reference) = reference_start(&start, &name, line_at(content, offset)) {
                    references.push(reference);
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| ParseError::Syntax {
                    path: path.to_string(),
                    line: line_at(content, offset),
                    message: e.to_string(),
                })?;
                let Some(current) = stack.last() else {
                    continue;
                };
                if current == "Version" {
                    if let Some(reference) = pending.as_mut() {
                        reference.version = Some(text.trim().to_string());
                    }
                } else if in_property_group(&stack) {
                    if let Some((_, key)) = PROJECT_PROPERTIES.iter().find(|(p, _)| p == current) {
                        properties.push((*key, text.trim().to_string()));
                    }
                }
            }
            Event::End(_) => {
                let closed = stack.pop();
                if let (Some(closed), Some(reference)) = (closed, pending.as_ref()) {
                    if closed == reference.element {
                        references.extend(pending.take());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let Some(file) = result.file_element_mut() else {
        return Ok(());
    };
    for (key, value) in properties {
        let value = if key == "target_frameworks" {
            Value::from(value.split(';').map(str::trim).filter(|f| !f.is_empty()).collect::<Vec<_>>())
        } else {
            Value::from(value)
        };
        file.metadata.insert(key.to_string(), value);
    }
    for reference in &references {
        file.add_dependency(reference_target(reference));
    }

    for reference in references {
        let target = reference_target(&reference);
        let kind = match reference.element {
            "PackageReference" => "package",
            "ProjectReference" => "project",
            _ => "assembly",
        };
        let mut relationship = Relationship::new(path, target, RelationshipKind::Imports, context)
            .with_line(reference.line)
            .with_property("reference_kind", kind);
        if let Some(version) = reference.version {
            relationship = relationship.with_property("version", version);
        }
        result.add_relationship(relationship);
    }
    Ok(())
}

fn reference_start(start: &BytesStart, name: &str, line: usize) -> Option<PendingReference> {
    let element = match name {
        "PackageReference" => "PackageReference",
        "ProjectReference" => "ProjectReference",
        "Reference" => "Reference",
        _ => return None,
    };
    let include = attribute(start, "Include").or_else(|| attribute(start, "Update"))?;
    Some(PendingReference {
        element,
        include,
        version: attribute(start, "Version").or_else(|| attribute(start, "VersionOverride")),
        line,
    })
}

fn reference_target(reference: &PendingReference) -> String {
    match reference.element {
        "ProjectReference" => normalize_path(&reference.include),
        // `System.Data, Version=4.0.0.0, Culture=neutral`
        "Reference" => reference
            .include
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
        _ => reference.include.clone(),
    }
}

fn in_property_group(stack: &[String]) -> bool {
    stack.len() >= 2 && stack[stack.len() - 2] == "PropertyGroup"
}

fn local_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attribute(start: &BytesStart, key: &str) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(Cow::into_owned))
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk.Web">
  <PropertyGroup>
    <TargetFrameworks>net8.0;net6.0</TargetFrameworks>
    <RootNamespace>Shop.Api</RootNamespace>
  </PropertyGroup>
  <ItemGroup>
    <PackageReference Include="Serilog" Version="3.1.1" />
    <PackageReference Include="Polly">
      <Version>8.2.0</Version>
    </PackageReference>
    <PackageReference Include="Newtonsoft.Json" />
    <ProjectReference Include="..\Shop.Domain\Shop.Domain.csproj" />
    <Reference Include="System.Data, Version=4.0.0.0, Culture=neutral" />
  </ItemGroup>
</Project>
"#;

    const SLN: &str = r#"
Microsoft Visual Studio Solution File, Format Version 12.00
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "Shop.Api", "src\Shop.Api\Shop.Api.csproj", "{11111111-1111-1111-1111-111111111111}"
EndProject
Project("{2150E333-8FDC-42A3-9474-1A3956D46DE8}") = "Solution Items", "Solution Items", "{22222222-2222-2222-2222-222222222222}"
EndProject
Project("{F184B08F-C81C-45F6-A57F-5ABD9991F28F}") = "Shop.Legacy", "src\Shop.Legacy\Shop.Legacy.vbproj", "{33333333-3333-3333-3333-333333333333}"
EndProject
"#;

    fn parse(name: &str, content: &str) -> (tempfile::TempDir, ParseResult) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        let result = ProjectFileParser::default().parse_path(&path, Some("shop"), &CancellationToken::new());
        (dir, result)
    }

    #[test]
    fn test_csproj_references() {
        let (dir, result) = parse("Shop.Api.csproj", CSPROJ);
        assert!(result.success(), "{:?}", result.errors());
        let path = dir.path().join("Shop.Api.csproj").to_string_lossy().to_string();

        let file = result.file_element().unwrap();
        assert_eq!(file.metadata["sdk"], "Microsoft.NET.Sdk.Web");
        assert_eq!(file.metadata["root_namespace"], "Shop.Api");
        assert_eq!(file.metadata["target_frameworks"], serde_json::json!(["net8.0", "net6.0"]));
        assert_eq!(
            file.dependencies,
            vec!["Serilog", "Polly", "Newtonsoft.Json", "../Shop.Domain/Shop.Domain.csproj", "System.Data"]
        );

        let polly = result
            .relationships
            .iter()
            .find(|r| r.to == "Polly")
            .unwrap();
        assert_eq!(polly.from, path);
        assert_eq!(polly.properties["version"], "8.2.0");
        assert_eq!(polly.properties["reference_kind"], "package");
        assert!(result.has_relationship(&path, "../Shop.Domain/Shop.Domain.csproj", RelationshipKind::Imports));

        assert_eq!(result.patterns_named("Project_UnversionedPackage").count(), 1);
    }

    #[test]
    fn test_solution_projects() {
        let (dir, result) = parse("Shop.sln", SLN);
        let path = dir.path().join("Shop.sln").to_string_lossy().to_string();

        assert!(result.has_relationship(&path, "src/Shop.Api/Shop.Api.csproj", RelationshipKind::Contains));
        assert!(result.has_relationship(&path, "src/Shop.Legacy/Shop.Legacy.vbproj", RelationshipKind::Contains));
        assert_eq!(result.relationships_of_kind(RelationshipKind::Contains).count(), 2);
        assert_eq!(result.file_element().unwrap().metadata["format_version"], "12.00");
    }

    #[test]
    fn test_missing_file_is_a_single_error() {
        let result = ProjectFileParser::default().parse_path(
            Path::new("/nonexistent/App.csproj"),
            None,
            &CancellationToken::new(),
        );
        assert!(!result.success());
        assert!(result.elements.is_empty());
    }

    #[test]
    fn test_malformed_xml_keeps_file_element() {
        let (_dir, result) = parse("Broken.csproj", "<Project><ItemGroup></Project>");
        assert!(!result.success());
        assert_eq!(result.elements.len(), 1);
    }
}
