//! .NET project file detectors (`.csproj`, `.vbproj`, `.fsproj`).

use once_cell::sync::Lazy;
use regex::Regex;

use super::{DetectionContext, DetectorBank};
use crate::config::DetectorConfig;
use crate::model::{CodePattern, PatternCategory, PatternType};

const PACKAGE_DOC_URL: &str =
    "https://learn.microsoft.com/nuget/consume-packages/package-references-in-project-files";
const FRAMEWORK_DOC_URL: &str = "https://dotnet.microsoft.com/platform/support/policy/dotnet-core";

static PACKAGE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<PackageReference\b([^>]*?)(/>|>(.*?)</PackageReference>)"#).unwrap()
});

static INCLUDE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b(?:Include|Update)\s*=\s*"([^"]+)""#).unwrap());

static TARGET_FRAMEWORK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(TargetFrameworks?|TargetFrameworkVersion)>\s*([^<]+?)\s*</").unwrap()
});

/// Frameworks past end of support.
const LEGACY_FRAMEWORK_PREFIXES: &[&str] = &[
    "net2", "net3", "net4", "v2", "v3", "v4", "netcoreapp", "netstandard1", "net5.0", "net6.0",
    "net7.0",
];

pub fn bank(config: &DetectorConfig) -> DetectorBank {
    DetectorBank::new("project")
        .with_fn("Project_UnversionedPackage", detect_unversioned_package)
        .with_fn("Project_LegacyTargetFramework", detect_legacy_framework)
        .configured(config)
}

fn detect_unversioned_package(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("<PackageReference") {
        return Vec::new();
    }

    ctx.find_all(&PACKAGE_REFERENCE)
        .into_iter()
        .filter(|(_, cap)| {
            let in_attributes = cap[1].contains("Version");
            let in_children = cap.get(3).map(|c| c.as_str().contains("<Version")).unwrap_or(false);
            !(in_attributes || in_children)
        })
        .filter_map(|(line, cap)| {
            let package = INCLUDE_ATTR.captures(&cap[1])?.get(1)?.as_str().to_string();
            Some(
                ctx.pattern_at_line(
                    "Project_UnversionedPackage",
                    PatternType::Dependencies,
                    PatternCategory::Reliability,
                    line,
                )
                .with_implementation(format!("Package '{}' referenced without a version", package))
                .with_advice(
                    "Pin package versions, or manage them centrally in Directory.Packages.props",
                    PACKAGE_DOC_URL,
                )
                .with_confidence(0.75)
                .anti_pattern()
                .with_metadata("package", package),
            )
        })
        .collect()
}

fn is_legacy_framework(moniker: &str) -> bool {
    let moniker = moniker.trim().to_ascii_lowercase();
    LEGACY_FRAMEWORK_PREFIXES
        .iter()
        .any(|prefix| moniker.starts_with(prefix))
}

fn detect_legacy_framework(ctx: &DetectionContext<'_>) -> Vec<CodePattern> {
    if !ctx.contains("<TargetFramework") {
        return Vec::new();
    }

    let mut found = Vec::new();
    for (line, cap) in ctx.find_all(&TARGET_FRAMEWORK) {
        for moniker in cap[2].split(';').map(str::trim).filter(|m| is_legacy_framework(m)) {
            found.push(
                ctx.pattern_at_line(
                    "Project_LegacyTargetFramework",
                    PatternType::Dependencies,
                    PatternCategory::Maintainability,
                    line,
                )
                .with_implementation(format!("Targets out-of-support framework {}", moniker))
                .with_advice("Move to a supported .NET LTS release", FRAMEWORK_DOC_URL)
                .with_confidence(0.8)
                .anti_pattern()
                .with_metadata("framework", moniker),
            );
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFrameworks>net8.0;netcoreapp3.1</TargetFrameworks>
  </PropertyGroup>
  <ItemGroup>
    <PackageReference Include="Serilog" Version="3.1.1" />
    <PackageReference Include="Polly" />
    <PackageReference Include="Dapper">
      <Version>2.1.35</Version>
    </PackageReference>
  </ItemGroup>
</Project>"#;

    #[test]
    fn test_unversioned_package() {
        let ctx = DetectionContext::new("App.csproj", "App", CSPROJ);
        let found = detect_unversioned_package(&ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata["package"], "Polly");
        assert_eq!(found[0].line_number, 7);
    }

    #[test]
    fn test_legacy_framework() {
        let ctx = DetectionContext::new("App.csproj", "App", CSPROJ);
        let found = detect_legacy_framework(&ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata["framework"], "netcoreapp3.1");
        assert!(!found[0].is_positive);
    }
}
