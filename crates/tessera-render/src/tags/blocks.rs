//! Named blocks and template composition.
//!
//! `define` stores a raw fragment; `block` renders a stored fragment or its
//! own default body; `render` and `include` pull in a stored fragment or a
//! template file from the tenant's template tree.

use super::{malformed, parse_params, seek_block, Tag, TagOutcome};
use crate::context::Context;
use crate::syntax::strip_quotes;
use tessera_core::{Diagnostic, DiagnosticKind};

/// Template trees reachable through `@<tree>/<name>`
const TEMPLATE_TREES: &[&str] = &["app", "marketing"];

/// `{% define "name" %} ... {% enddefine %}`
pub struct DefineTag;

impl Tag for DefineTag {
    fn render(&self, ctx: &Context, _out: &mut String, args: &[String], source: &str, pos: usize) -> TagOutcome {
        let span = match seek_block(ctx, source, pos, "define") {
            Ok(span) => span,
            Err(diagnostic) => return TagOutcome::at(pos).with(diagnostic),
        };
        match args.first().map(|name| strip_quotes(name)) {
            Some(name) if !name.is_empty() => {
                ctx.define_block(name, &source[span.body_start..span.body_end]);
                TagOutcome::at(span.next)
            }
            _ => TagOutcome::at(span.next).with(malformed("define", "missing block name")),
        }
    }
}

/// `{% block "name" %} default {% endblock %}`
pub struct BlockTag;

impl Tag for BlockTag {
    fn render(&self, ctx: &Context, out: &mut String, args: &[String], source: &str, pos: usize) -> TagOutcome {
        let span = match seek_block(ctx, source, pos, "block") {
            Ok(span) => span,
            Err(diagnostic) => return TagOutcome::at(pos).with(diagnostic),
        };
        let Some(name) = args.first().map(|name| strip_quotes(name)) else {
            return TagOutcome::at(span.next).with(malformed("block", "missing block name"));
        };

        let engine = ctx.engine();
        match ctx.block(name) {
            Some(defined) => engine.render_into(&defined, ctx, out),
            None => engine.render_into(&source[span.body_start..span.body_end], ctx, out),
        }
        TagOutcome::at(span.next)
    }
}

/// `{% render "name" key=value ... %}`
///
/// `@app/<path>` and `@marketing/<path>` load a template file; any other
/// name is a block stored by `define`.
pub struct RenderTag;

impl Tag for RenderTag {
    fn render(&self, ctx: &Context, out: &mut String, args: &[String], _source: &str, pos: usize) -> TagOutcome {
        let Some(raw) = args.first() else {
            return TagOutcome::at(pos).with(malformed("render", "missing template name"));
        };
        let name = strip_quotes(raw);

        let fragment = match resolve_template_name(name) {
            Some(path) => load(ctx, &path),
            None => ctx.block(name).ok_or_else(|| {
                Diagnostic::new(
                    DiagnosticKind::TemplateNotFound,
                    format!("no block named '{}' has been defined", name),
                )
            }),
        };
        compose(ctx, out, "render", fragment, &args[1..], pos)
    }
}

/// `{% include "path" key=value ... %}`: always a template file
pub struct IncludeTag;

impl Tag for IncludeTag {
    fn render(&self, ctx: &Context, out: &mut String, args: &[String], _source: &str, pos: usize) -> TagOutcome {
        let Some(raw) = args.first() else {
            return TagOutcome::at(pos).with(malformed("include", "missing template path"));
        };
        let name = strip_quotes(raw);
        let path = resolve_template_name(name).unwrap_or_else(|| name.to_string());

        let fragment = load(ctx, &path);
        compose(ctx, out, "include", fragment, &args[1..], pos)
    }
}

/// Map `@app/home` to `app/home.html`; `None` for anything else
pub fn resolve_template_name(name: &str) -> Option<String> {
    let rest = name.strip_prefix('@')?;
    let (tree, path) = rest.split_once('/')?;
    if !TEMPLATE_TREES.contains(&tree) || path.is_empty() {
        return None;
    }
    if path.ends_with(".html") {
        Some(format!("{}/{}", tree, path))
    } else {
        Some(format!("{}/{}.html", tree, path))
    }
}

fn load(ctx: &Context, path: &str) -> Result<String, Diagnostic> {
    ctx.load_template(path)
        .map_err(|err| Diagnostic::new(DiagnosticKind::TemplateNotFound, err.to_string()))
}

/// Render a fetched fragment, with `key=value` params as an overlay
fn compose(
    ctx: &Context,
    out: &mut String,
    tag: &str,
    fragment: Result<String, Diagnostic>,
    params: &[String],
    pos: usize,
) -> TagOutcome {
    let fragment = match fragment {
        Ok(fragment) => fragment,
        Err(diagnostic) => return TagOutcome::at(pos).with(diagnostic),
    };

    let engine = ctx.engine();
    if params.is_empty() {
        engine.render_into(&fragment, ctx, out);
        return TagOutcome::at(pos);
    }

    let (overlay, diagnostics) = parse_params(ctx, tag, params);
    ctx.report_all(diagnostics);
    let child = engine.clone_context(ctx, overlay);
    engine.render_into(&fragment, &child, out);
    TagOutcome::at(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::loader::MemoryLoader;
    use serde_json::json;
    use std::sync::Arc;
    use tessera_core::value::map_from_json;

    fn engine_with(templates: &[(&str, &str)]) -> Arc<Engine> {
        let mut loader = MemoryLoader::new();
        for (name, source) in templates {
            loader.insert(name, source);
        }
        Arc::new(Engine::standard().with_loader(Arc::new(loader)))
    }

    fn render_with(engine: &Arc<Engine>, source: &str, data: serde_json::Value) -> (String, Vec<Diagnostic>) {
        let ctx = Context::new(map_from_json(data), Arc::clone(engine));
        engine.render(source, &ctx)
    }

    #[test]
    fn test_resolve_template_name() {
        assert_eq!(resolve_template_name("@app/home").as_deref(), Some("app/home.html"));
        assert_eq!(resolve_template_name("@marketing/promo/hero").as_deref(), Some("marketing/promo/hero.html"));
        assert_eq!(resolve_template_name("@app/page.html").as_deref(), Some("app/page.html"));
        assert_eq!(resolve_template_name("@admin/x"), None);
        assert_eq!(resolve_template_name("body"), None);
        assert_eq!(resolve_template_name("@app/"), None);
    }

    #[test]
    fn test_define_then_block() {
        let engine = engine_with(&[]);
        let source = r#"{% define "body" %}<p>{{ msg }}</p>{% enddefine %}{% block "body" %}default{% endblock %}"#;
        let (out, errors) = render_with(&engine, source, json!({ "msg": "hi" }));
        assert_eq!(out, "<p>hi</p>");
        assert!(errors.is_empty());

        let (out, _) = render_with(&engine, r#"{% block "sidebar" %}<aside>{{ n }}</aside>{% endblock %}"#, json!({ "n": 2 }));
        assert_eq!(out, "<aside>2</aside>");
    }

    #[test]
    fn test_define_stores_raw_body() {
        let engine = engine_with(&[]);
        let source = r#"{% define "greet" %}Hi {{ who }}{% enddefine %}{% for who in people %}{% render "greet" %};{% endfor %}"#;
        let (out, _) = render_with(&engine, source, json!({ "people": ["A", "B"] }));
        assert_eq!(out, "Hi A;Hi B;");
    }

    #[test]
    fn test_render_template_file() {
        let engine = engine_with(&[("app/card.html", "<div>{{ title }}</div>")]);
        let (out, errors) = render_with(&engine, r#"{% render "@app/card" %}"#, json!({ "title": "T" }));
        assert_eq!(out, "<div>T</div>");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_render_params_overlay() {
        let engine = engine_with(&[("app/card.html", "<b>{{ title }}</b>")]);
        let source = r#"{% render "@app/card" title="Fixed" %}{% include "app/card.html" title=page.name|upcase %}{{ title }}"#;
        let (out, errors) = render_with(&engine, source, json!({ "title": "outer", "page": { "name": "x" } }));
        assert_eq!(out, "<b>Fixed</b><b>X</b>outer");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_missing_template_and_block() {
        let engine = engine_with(&[]);
        let (out, errors) = render_with(&engine, r#"a{% render "@app/none" %}{% render "nothing" %}b"#, json!({}));
        assert_eq!(out, "ab");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == DiagnosticKind::TemplateNotFound));
    }

    #[test]
    fn test_template_cached_once() {
        let engine = engine_with(&[("app/x.html", "x")]);
        let ctx = Context::new(Default::default(), Arc::clone(&engine));
        let (out, _) = engine.render(r#"{% render "@app/x" %}{% render "@app/x" %}"#, &ctx);
        assert_eq!(out, "xx");
        assert!(ctx.is_template_cached("app/x.html"));
    }

    #[test]
    fn test_self_reference_hits_recursion_limit() {
        let engine = engine_with(&[]);
        let source = r#"{% define "loop" %}.{% render "loop" %}{% enddefine %}{% render "loop" %}"#;
        let (out, errors) = render_with(&engine, source, json!({}));
        assert!(out.len() < 100);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, DiagnosticKind::RecursionLimit);
    }
}
