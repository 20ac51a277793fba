//! `{% asset <kind> <path> [location=<head|pre-footer>] %}`
//!
//! Registers a stylesheet or script as a deferred document tag. Each
//! `(path, kind)` pair is registered once per render; registering the same
//! path under a second kind is a conflict.
//!
//! | kind         | element                  | head | pre-footer |
//! |--------------|--------------------------|------|------------|
//! | `css`        | `<link rel="stylesheet">`| 15   | -          |
//! | `css-inline` | `<style>`                | 20   | -          |
//! | `js`         | `<script src>`           | 20   | 25         |
//! | `js-inline`  | `<script>`               | 25   | 30         |

use super::{malformed, Tag, TagOutcome};
use crate::context::Context;
use crate::syntax::strip_quotes;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;
use tessera_core::{Diagnostic, DiagnosticKind, DocumentTag, Location, TagKind};
use tracing::debug;

const LOCAL_PREFIXES: &[&str] = &["assets/", "public/"];

/// What an `asset` tag registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Css,
    CssInline,
    Js,
    JsInline,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [AssetKind::Css, AssetKind::CssInline, AssetKind::Js, AssetKind::JsInline];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Css => "css",
            AssetKind::CssInline => "css-inline",
            AssetKind::Js => "js",
            AssetKind::JsInline => "js-inline",
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, AssetKind::CssInline | AssetKind::JsInline)
    }

    pub fn is_script(&self) -> bool {
        matches!(self, AssetKind::Js | AssetKind::JsInline)
    }

    pub fn priority(&self, location: Location) -> i32 {
        match (self, location) {
            (AssetKind::Css, _) => 15,
            (AssetKind::CssInline, _) => 20,
            (AssetKind::Js, Location::Head) => 20,
            (AssetKind::Js, Location::PreFooter) => 25,
            (AssetKind::JsInline, Location::Head) => 25,
            (AssetKind::JsInline, Location::PreFooter) => 30,
        }
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown asset kind '{}'", s))
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication key for a registered asset
pub fn asset_key(path: &str, kind: AssetKind) -> String {
    format!("{}|{}", path, kind)
}

/// Validate and normalize an asset path
///
/// Remote assets must be `https://`. Local assets live under `assets/` or
/// `public/` and come back with a single leading `/`.
pub fn normalize_asset_path(path: &str) -> Result<String, String> {
    if path.starts_with("https://") {
        return if path.len() > "https://".len() {
            Ok(path.to_string())
        } else {
            Err("empty remote URL".to_string())
        };
    }

    let relative = path.trim_start_matches('/');
    if !LOCAL_PREFIXES.iter().any(|prefix| relative.starts_with(prefix)) {
        return Err(format!("'{}' is neither https:// nor under assets/ or public/", path));
    }
    let clean = Path::new(relative)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !clean {
        return Err(format!("'{}' leaves the site directory", path));
    }
    Ok(format!("/{}", relative))
}

pub struct AssetTag;

impl Tag for AssetTag {
    fn render(&self, ctx: &Context, _out: &mut String, args: &[String], _source: &str, pos: usize) -> TagOutcome {
        let outcome = TagOutcome::at(pos);
        match register(ctx, args) {
            Ok(()) => outcome,
            Err(diagnostic) => outcome.with(diagnostic),
        }
    }
}

fn register(ctx: &Context, args: &[String]) -> Result<(), Diagnostic> {
    let (raw_kind, raw_path) = match args {
        [kind, path, ..] => (strip_quotes(kind), strip_quotes(path)),
        _ => return Err(malformed("asset", "expected 'asset <kind> <path>'")),
    };

    let kind: AssetKind = raw_kind
        .parse()
        .map_err(|reason: String| Diagnostic::new(DiagnosticKind::InvalidAssetKind, reason))?;

    let location = match explicit_location(&args[2..])? {
        Some(location) if kind.is_script() => location,
        _ if kind.is_script() => ctx.engine().options().default_script_location,
        _ => Location::Head,
    };

    let path = normalize_asset_path(raw_path)
        .map_err(|reason| Diagnostic::new(DiagnosticKind::AssetPathInvalid, reason))?;
    if kind.is_inline() && path.starts_with("https://") {
        return Err(Diagnostic::new(
            DiagnosticKind::AssetPathInvalid,
            format!("{} cannot inline remote '{}'", kind, path),
        ));
    }

    let key = asset_key(&path, kind);
    if ctx.has_asset(&key) {
        return Ok(());
    }
    if let Some(other) = AssetKind::ALL
        .into_iter()
        .find(|other| *other != kind && ctx.has_asset(&asset_key(&path, *other)))
    {
        return Err(Diagnostic::new(
            DiagnosticKind::AssetKindConflict,
            format!("'{}' is already registered as {}, not {}", path, other, kind),
        ));
    }

    let priority = kind.priority(location);
    let tag = match kind {
        AssetKind::Css => DocumentTag::stylesheet(&path, priority),
        AssetKind::Js => DocumentTag::script_src(&path, location, priority),
        AssetKind::CssInline | AssetKind::JsInline => {
            let contents = ctx
                .engine()
                .read_site_file(ctx.host(), path.trim_start_matches('/'))
                .map_err(|err| Diagnostic::new(DiagnosticKind::AssetReadFailed, err.to_string()))?;
            let element = if kind.is_script() { TagKind::Script } else { TagKind::Style };
            DocumentTag::inline(element, &path, location, contents, priority)
        }
    };

    debug!(asset = %path, kind = %kind, %location, "asset registered");
    ctx.import_asset(&key);
    ctx.push_document_tag(tag);
    Ok(())
}

fn explicit_location(options: &[String]) -> Result<Option<Location>, Diagnostic> {
    let mut location = None;
    for option in options {
        match option.split_once('=') {
            Some(("location", value)) => {
                let parsed = strip_quotes(value)
                    .parse::<Location>()
                    .map_err(|reason| malformed("asset", reason))?;
                location = Some(parsed);
            }
            _ => return Err(malformed("asset", format!("unexpected argument '{}'", option))),
        }
    }
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, RequestInfo};
    use crate::engine::Engine;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tessera_core::Map;

    fn render(engine: &Arc<Engine>, source: &str) -> (Context, Vec<Diagnostic>) {
        let ctx = Context::new(Map::new(), Arc::clone(engine)).with_request(Arc::new(RequestInfo::new("a.test")));
        let (out, errors) = engine.render(source, &ctx);
        assert_eq!(out, "");
        (ctx, errors)
    }

    #[test]
    fn test_normalize_asset_path() {
        assert_eq!(normalize_asset_path("assets/main.css").unwrap(), "/assets/main.css");
        assert_eq!(normalize_asset_path("/public/app.js").unwrap(), "/public/app.js");
        assert_eq!(normalize_asset_path("https://cdn.test/x.js").unwrap(), "https://cdn.test/x.js");
        assert!(normalize_asset_path("http://cdn.test/x.js").is_err());
        assert!(normalize_asset_path("static/x.css").is_err());
        assert!(normalize_asset_path("assets/../secret.txt").is_err());
    }

    #[test]
    fn test_css_dedup() {
        let engine = Arc::new(Engine::standard());
        let (ctx, errors) = render(&engine, r#"{% asset "css" "assets/main.css" %}{% asset "css" "/assets/main.css" %}"#);
        assert!(errors.is_empty());
        let tags = ctx.document_tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].to_html(), r#"<link rel="stylesheet" href="/assets/main.css">"#);
        assert_eq!(tags[0].priority, 15);
        assert_eq!(ctx.imported_assets(), vec!["/assets/main.css|css".to_string()]);
    }

    #[test]
    fn test_js_locations() {
        let engine = Arc::new(Engine::standard());
        let (ctx, errors) = render(
            &engine,
            r#"{% asset "js" "assets/a.js" %}{% asset "js" "assets/b.js" location="head" %}"#,
        );
        assert!(errors.is_empty());
        let tags = ctx.document_tags();
        assert_eq!((tags[0].location, tags[0].priority), (Location::PreFooter, 25));
        assert_eq!((tags[1].location, tags[1].priority), (Location::Head, 20));
        assert_eq!(tags[1].to_html(), r#"<script src="/assets/b.js"></script>"#);
    }

    #[test]
    fn test_asset_errors() {
        let engine = Arc::new(Engine::standard());
        let (ctx, errors) = render(
            &engine,
            r#"{% asset "font" "assets/a.woff" %}{% asset "css" "lib/x.css" %}{% asset "css-inline" "https://cdn.test/x.css" %}{% asset "css" "assets/x.css" %}{% asset "js" "assets/x.css" %}"#,
        );
        let kinds: Vec<DiagnosticKind> = errors.into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::InvalidAssetKind,
                DiagnosticKind::AssetPathInvalid,
                DiagnosticKind::AssetPathInvalid,
                DiagnosticKind::AssetKindConflict,
            ]
        );
        assert_eq!(ctx.document_tags().len(), 1);
    }

    #[test]
    fn test_inline_assets_read_from_site_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/site.css"), "body{margin:0}").unwrap();
        std::fs::write(dir.path().join("assets/boot.js"), "boot()").unwrap();

        let root: PathBuf = dir.path().to_path_buf();
        let engine = Arc::new(Engine::standard().with_site_root(Arc::new(move |host: &str| {
            (host == "a.test").then(|| root.clone())
        })));
        let (ctx, errors) = render(
            &engine,
            r#"{% asset "css-inline" "assets/site.css" %}{% asset "js-inline" "assets/boot.js" location=head %}{% asset "js-inline" "assets/none.js" %}"#,
        );

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, DiagnosticKind::AssetReadFailed);
        let tags = ctx.document_tags();
        assert_eq!(tags[0].to_html(), "<style>body{margin:0}</style>");
        assert_eq!(tags[0].priority, 20);
        assert_eq!(tags[1].to_html(), "<script>boot()</script>");
        assert_eq!((tags[1].location, tags[1].priority), (Location::Head, 25));
        assert!(!ctx.has_asset("/assets/none.js|js-inline"));
    }

    #[test]
    fn test_inline_without_site_root_fails() {
        let engine = Arc::new(Engine::standard());
        let (_, errors) = render(&engine, r#"{% asset "css-inline" "assets/site.css" %}"#);
        assert_eq!(errors[0].kind, DiagnosticKind::AssetReadFailed);
    }
}
