use patternscan_core::{
    CompositeRouter, ElementKind, ParseResult, PatternType, RelationshipKind, Router,
};
use tokio_util::sync::CancellationToken;

async fn route(path: &str, content: &str) -> ParseResult {
    CompositeRouter::default()
        .route(path, Some(content), None, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_class_with_try_catch() {
    let source = "public class Foo : IBar { public void Do() { try { Bar(); } catch (InvalidOperationException e) { throw new ArgumentException(); } } }";
    let result = route("src/Shop/Foo.cs", source).await;

    assert!(result.success(), "{:?}", result.errors());
    assert_eq!(result.element("Foo").unwrap().kind, ElementKind::Class);
    assert_eq!(result.element("Foo.Do").unwrap().kind, ElementKind::Method);
    assert!(result.has_relationship("Foo", "IBar", RelationshipKind::Implements));
    assert!(result.has_relationship("Foo.Do", "Bar", RelationshipKind::Calls));
    assert!(result.has_relationship("Foo.Do", "InvalidOperationException", RelationshipKind::Catches));
    assert!(result.has_relationship("Foo.Do", "ArgumentException", RelationshipKind::Throws));

    let foo = result.element("Foo").unwrap();
    assert_eq!(foo.context, "Shop");
    assert_eq!(foo.file_path, "src/Shop/Foo.cs");
}

#[tokio::test]
async fn test_service_registration_and_anti_patterns() {
    let source = r#"
using Microsoft.Extensions.DependencyInjection;

namespace Shop.Api
{
    public class Startup
    {
        private const string ApiKey = "sk-live-0123456789abcdef";

        public void ConfigureServices(IServiceCollection services)
        {
            services.AddScoped<IOrderService, OrderService>();
            services.AddSingleton<IClock, SystemClock>();
        }

        public async void Refresh()
        {
            try
            {
                await Task.Delay(10);
            }
            catch (Exception)
            {
            }
        }
    }
}
"#;
    let result = route("src/Shop.Api/Startup.cs", source).await;
    assert!(result.success(), "{:?}", result.errors());

    assert_eq!(result.patterns_named("CSharp_DependencyInjectionRegistration").count(), 2);
    assert_eq!(result.patterns_named("CSharp_AsyncVoid").count(), 1);
    assert_eq!(result.patterns_named("CSharp_EmptyCatch").count(), 1);

    let async_void = result.patterns_named("CSharp_AsyncVoid").next().unwrap();
    assert_eq!(async_void.pattern_type, PatternType::ErrorHandling);
    assert!(!async_void.is_positive);
    assert!(result
        .patterns
        .iter()
        .all(|p| p.file_path == "src/Shop.Api/Startup.cs"));
}
