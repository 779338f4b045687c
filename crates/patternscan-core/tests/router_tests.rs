use std::fs;
use std::path::Path;

use patternscan_core::model::PATTERNS_METADATA_KEY;
use patternscan_core::{CompositeRouter, ElementKind, ParseResult, RelationshipKind, Router, ScanConfig};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn route(path: &str, content: &str) -> ParseResult {
    CompositeRouter::default()
        .route(path, Some(content), None, &CancellationToken::new())
        .await
}

fn language(result: &ParseResult) -> String {
    result.file_element().unwrap().metadata["language"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_dispatch_by_extension() {
    let cases = [
        ("src/App/Program.cs", "public class Program {}", "C#"),
        ("src/App/Module1.vb", "Public Module Module1\nEnd Module", "VB.NET"),
        ("web/src/app.ts", "export class App {}", "TypeScript"),
        ("web/src/App.JSX", "export function App() { return null; }", "JavaScript"),
        ("svc/main.py", "def main():\n    pass\n", "Python"),
        ("mobile/lib/main.dart", "void main() {}", "Dart"),
        ("infra/main.tf", "variable \"region\" {}", "Terraform"),
        ("infra/main.bicep", "param location string", "Bicep"),
    ];

    for (path, content, expected) in cases {
        let result = route(path, content).await;
        assert!(result.success(), "{}: {:?}", path, result.errors());
        assert_eq!(language(&result), expected, "{}", path);
        assert_eq!(result.elements[0].kind, ElementKind::File);
    }
}

#[tokio::test]
async fn test_unmapped_extension_is_capped() {
    let content = "line of prose\n".repeat(1000);
    let result = route("docs/guide.md", &content).await;

    assert_eq!(result.elements.len(), 1);
    let file = &result.elements[0];
    assert_eq!(file.kind, ElementKind::File);
    assert!(file.has_tag("unstructured"));
    assert!(file.content.chars().count() <= 5000);
    assert!(result.relationships.is_empty());
}

#[tokio::test]
async fn test_arm_template_vs_generic_json() {
    let template = r#"{
  "$schema": "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#",
  "resources": [
    { "type": "Microsoft.Storage/storageAccounts", "apiVersion": "2023-01-01", "name": "logs" },
    { "type": "Microsoft.Web/sites", "apiVersion": "2022-09-01", "name": "web" },
    { "name": "missing-type-and-version" }
  ]
}"#;
    let result = route("deploy/azuredeploy.json", template).await;
    assert_eq!(language(&result), "ARM");
    assert_eq!(result.patterns_named("ARM_Resource").count(), 2);

    let plain = r#"{ "resources": [ { "type": "a", "apiVersion": "1" } ] }"#;
    let result = route("deploy/settings.json", plain).await;
    assert_eq!(language(&result), "JSON");
    assert!(result.file_element().unwrap().has_tag("json"));
    assert_eq!(result.patterns.iter().filter(|p| p.name.starts_with("ARM_")).count(), 0);
}

#[tokio::test]
async fn test_bridged_temp_file_is_removed() {
    let mut config = ScanConfig::default();
    config.router.temp_file_prefix = format!("patternscan-bridge-{}-", std::process::id());
    let router = CompositeRouter::new(&config);

    let csproj = r#"<Project Sdk="Microsoft.NET.Sdk">
  <ItemGroup>
    <PackageReference Include="Dapper" />
  </ItemGroup>
</Project>"#;
    let result = router
        .route("src/Data/Data.csproj", Some(csproj), None, &CancellationToken::new())
        .await;

    assert!(result.success(), "{:?}", result.errors());
    assert_eq!(result.file_path, "src/Data/Data.csproj");
    assert!(result.elements.iter().all(|e| e.file_path == "src/Data/Data.csproj"));
    assert!(result.patterns.iter().all(|p| p.file_path == "src/Data/Data.csproj"));
    assert!(result.has_relationship("src/Data/Data.csproj", "Dapper", RelationshipKind::Imports));
    assert_eq!(result.patterns_named("Project_UnversionedPackage").count(), 1);
    assert_eq!(leftover_temp_files(&config.router.temp_file_prefix), 0);

    // malformed input still cleans up
    let result = router
        .route("src/Data/Broken.csproj", Some("<Project>"), None, &CancellationToken::new())
        .await;
    assert_eq!(result.file_path, "src/Data/Broken.csproj");
    assert_eq!(leftover_temp_files(&config.router.temp_file_prefix), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_routes_share_runtime() {
    let mut config = ScanConfig::default();
    config.router.temp_file_prefix = format!("patternscan-concurrent-{}-", std::process::id());
    let router = CompositeRouter::new(&config);
    let cancel = CancellationToken::new();

    let sources: Vec<(String, String)> = (0..8)
        .map(|i| {
            let csproj = format!(
                r#"<Project Sdk="Microsoft.NET.Sdk"><ItemGroup><PackageReference Include="Lib{}" Version="1.0.0" /></ItemGroup></Project>"#,
                i
            );
            (format!("src/P{}/P{}.csproj", i, i), csproj)
        })
        .chain((0..8).map(|i| (format!("svc/m{}.py", i), format!("def f{}():\n    g()\n", i))))
        .collect();

    let results = futures::future::join_all(
        sources
            .iter()
            .map(|(path, content)| router.route(path, Some(content), None, &cancel)),
    )
    .await;

    for ((path, _), result) in sources.iter().zip(&results) {
        assert!(result.success(), "{}: {:?}", path, result.errors());
        assert_eq!(&result.file_path, path);
    }
    assert!(results[3].has_relationship("src/P3/P3.csproj", "Lib3", RelationshipKind::Imports));
    assert_eq!(leftover_temp_files(&config.router.temp_file_prefix), 0);
}

fn leftover_temp_files(prefix: &str) -> usize {
    fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
                .count()
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn test_route_reads_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("Greeter.cs");
    fs::write(&path, "public class Greeter { public void Hello() {} }").unwrap();

    let result = CompositeRouter::default()
        .route(&path.to_string_lossy(), None, Some("greetings"), &CancellationToken::new())
        .await;

    assert!(result.success());
    let class = result.element("Greeter").unwrap();
    assert_eq!(class.context, "greetings");
    assert!(result.element("Greeter.Hello").is_some());
    assert_eq!(result.elements_of_kind(ElementKind::Method).count(), 1);
}

#[tokio::test]
async fn test_patterns_copied_to_file_element() {
    let source = r#"
public class Startup
{
    public void ConfigureServices(IServiceCollection services)
    {
        services.AddScoped<IOrderService, OrderService>();
    }
}
"#;
    let result = route("src/Api/Startup.cs", source).await;
    assert!(!result.patterns.is_empty());

    let attached = result.file_element().unwrap().metadata[PATTERNS_METADATA_KEY]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(attached, result.patterns.len());
}

#[tokio::test]
async fn test_idempotent() {
    let source = r#"
import { Injectable } from '@angular/core';

@Injectable()
export class CartService {
  constructor(private readonly api: ApiClient) {}

  async total(items: Item[]): Promise<number> {
    return this.api.sum(items);
  }
}
"#;
    let first = route("web/src/cart.service.ts", source).await;
    let second = route("web/src/cart.service.ts", source).await;

    assert_eq!(first.elements, second.elements);
    assert_eq!(first.relationships, second.relationships);
    assert_eq!(first.patterns, second.patterns);
    assert_eq!(first.stats(), second.stats());
}

#[tokio::test]
async fn test_route_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "src/Orders/Order.cs", "public class Order {}");
    write(root, "web/app.ts", "export const x = 1;");
    write(root, "README.md", "# Shop");
    write(root, "node_modules/lib/index.js", "module.exports = {};");
    write(root, "bin/Debug/Order.cs", "public class Copy {}");

    let results = CompositeRouter::default()
        .route_directory(root, &CancellationToken::new())
        .await;

    let paths: Vec<&str> = results.iter().map(|r| r.file_path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "src/Orders/Order.cs", "web/app.ts"]);

    let order = &results[1];
    assert_eq!(order.element("Order").unwrap().context, "Orders");
}

#[tokio::test]
async fn test_route_directory_cancelled() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "a.py", "x = 1\n");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let results = CompositeRouter::default()
        .route_directory(temp_dir.path(), &cancel)
        .await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success());
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
