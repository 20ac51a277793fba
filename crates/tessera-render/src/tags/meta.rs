//! `meta`: head `<meta>` registration.

use super::{malformed, parse_params, Tag, TagOutcome};
use crate::context::Context;
use tessera_core::MetaTag;

const META_ATTRIBUTES: &[&str] = &["name", "property", "charset", "http-equiv", "content"];

/// `{% meta name="description" content=page.summary %}`
///
/// Appends a `<meta>` record for the document head; writes nothing inline.
pub struct HeadMetaTag;

impl Tag for HeadMetaTag {
    fn render(&self, ctx: &Context, _out: &mut String, args: &[String], _source: &str, pos: usize) -> TagOutcome {
        if args.is_empty() {
            return TagOutcome::at(pos).with(malformed("meta", "no attributes"));
        }

        let (params, diagnostics) = parse_params(ctx, "meta", args);
        let mut outcome = TagOutcome {
            next: pos,
            diagnostics,
        };

        let mut tag = MetaTag::new();
        for (key, value) in &params {
            if META_ATTRIBUTES.contains(&key.as_str()) {
                tag = tag.with(key, &value.to_text());
            } else {
                outcome.diagnostics.push(malformed("meta", format!("unsupported attribute '{}'", key)));
            }
        }

        if !tag.attributes.is_empty() {
            ctx.push_meta_tag(tag);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::engine::Engine;
    use serde_json::json;
    use std::sync::Arc;
    use tessera_core::value::map_from_json;
    use tessera_core::DiagnosticKind;

    #[test]
    fn test_meta_records() {
        let engine = Arc::new(Engine::standard());
        let ctx = Context::new(map_from_json(json!({ "page": { "summary": "A \"quoted\" page" } })), Arc::clone(&engine));
        let (out, errors) = engine.render(
            r#"{% meta charset="utf-8" %}{% meta name="description" content=page.summary %}body"#,
            &ctx,
        );
        assert_eq!(out, "body");
        assert!(errors.is_empty());

        let meta = ctx.meta_tags();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta[0].to_html(), r#"<meta charset="utf-8">"#);
        assert_eq!(meta[1].get("content"), Some("A \"quoted\" page"));
        assert_eq!(
            meta[1].to_html(),
            r#"<meta name="description" content="A &quot;quoted&quot; page">"#
        );
    }

    #[test]
    fn test_unsupported_attribute() {
        let engine = Arc::new(Engine::standard());
        let ctx = Context::new(Default::default(), Arc::clone(&engine));
        let (_, errors) = engine.render(r#"{% meta onload="x" %}"#, &ctx);
        assert_eq!(errors[0].kind, DiagnosticKind::MalformedTag);
        assert!(ctx.meta_tags().is_empty());
    }
}
