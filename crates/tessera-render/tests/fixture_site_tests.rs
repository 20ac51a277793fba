//! Tests against the demo tenant tree in testing/fixtures.

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::value::map_from_json;
use tessera_render::{Context, Engine, RequestHint, RequestInfo, SiteConfig, SiteRegistry};

/// Site file relative to the workspace root
const SITES_PATH: &str = "testing/fixtures/sites.yaml";

fn sites_path() -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let workspace_root = std::path::Path::new(&manifest_dir).parent().unwrap().parent().unwrap();
    workspace_root.join(SITES_PATH)
}

fn fixture_engine() -> Arc<Engine> {
    let config = SiteConfig::load(sites_path()).unwrap();
    let registry = Arc::new(SiteRegistry::from_config(&config));
    Arc::new(Engine::standard().with_options(config.engine.clone()).with_sites(registry))
}

fn request(host: &str) -> Option<Arc<dyn RequestHint>> {
    Some(Arc::new(RequestInfo::new(host)))
}

#[test]
fn test_fixture_config() {
    let config = SiteConfig::load(sites_path()).unwrap();
    assert_eq!(config.engine.max_depth, 32);
    let registry = SiteRegistry::from_config(&config);
    let hosts: Vec<&str> = registry.sites().iter().map(|site| site.host.as_str()).collect();
    assert_eq!(hosts, vec!["example.com", "blog.example.org"]);
    assert!(registry.resolve("www.example.com").is_some());
}

#[test]
fn test_home_page_document() {
    let engine = fixture_engine();
    let data = map_from_json(json!({
        "page": {
            "title": "Spring",
            "summary": "Seasonal picks",
            "note": "<script>x()</script>Ships <b>free</b>",
        },
        "products": [{ "name": "kettle", "sale": true }, { "name": "mug" }],
        "year": 2024,
    }));

    let doc = Engine::render_document(&engine, r#"{% render "@app/home" %}"#, data, request("www.example.com"));

    assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);
    assert!(doc.body.contains("<header>Spring</header>"));
    assert!(doc.body.contains("<li>Kettle <em>sale</em></li>"));
    assert!(doc.body.contains("<li>Mug</li>"));
    assert!(!doc.body.contains("Nothing here yet"));
    assert!(doc.body.contains("<p>Ships <b>free</b></p>"));
    assert!(doc.body.contains("<footer>Spring &copy; 2024</footer>"));
    assert!(!doc.body.contains("<script"));

    assert_eq!(
        doc.render_head(),
        concat!(
            "<meta name=\"description\" content=\"Seasonal picks\">\n",
            "<link rel=\"stylesheet\" href=\"/assets/site.css\">\n",
            "<style>header{font-weight:bold}</style>"
        )
    );
    assert_eq!(doc.render_pre_footer(), "<script src=\"/assets/analytics.js\"></script>");
}

#[test]
fn test_home_page_without_products() {
    let engine = fixture_engine();
    let data = map_from_json(json!({ "page": { "title": "Empty" } }));
    let doc = Engine::render_document(&engine, r#"{% render "@app/home" %}"#, data, request("example.com"));
    assert!(doc.body.contains("<li>Nothing here yet</li>"));
    assert!(doc.body.contains("<footer>Empty &copy; </footer>"));
}

#[test]
fn test_second_tenant_uses_its_own_tree() {
    let engine = fixture_engine();
    let data = map_from_json(json!({ "post": { "title": "Hello", "body": "<p onclick=\"x()\">Hi</p>" } }));

    let ctx = Context::new(data, Arc::clone(&engine)).with_request(Arc::new(RequestInfo::new("blog.example.org")));
    let (out, errors) = engine.render(r#"{% include "@app/post" %}"#, &ctx);
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(out.trim_end(), "<article><h1>Hello</h1><p>Hi</p></article>");

    let (_, errors) = engine.render(r#"{% render "@app/home" %}"#, &ctx);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind.name(), "template-not-found");
}
