//! `if` and `for`.

use super::{malformed, seek_block, Tag, TagOutcome};
use crate::context::Context;
use crate::seek::split_else;
use tessera_core::{Diagnostic, DiagnosticKind, Map, Value};

/// `{% if expr %} ... [{% else %} ...] {% endif %}`
pub struct IfTag;

impl Tag for IfTag {
    fn render(&self, ctx: &Context, out: &mut String, args: &[String], source: &str, pos: usize) -> TagOutcome {
        let span = match seek_block(ctx, source, pos, "if") {
            Ok(span) => span,
            Err(diagnostic) => return TagOutcome::at(pos).with(diagnostic),
        };
        if args.is_empty() {
            return TagOutcome::at(span.next).with(malformed("if", "missing condition"));
        }

        let engine = ctx.engine();
        let body = &source[span.body_start..span.body_end];
        let (then_branch, else_branch) = split_else(engine.syntax(), body);

        let resolved = engine.resolve(ctx, &args.join(" "));
        ctx.report_all(resolved.diagnostics);

        let branch = if resolved.value.is_truthy() {
            Some(then_branch)
        } else {
            else_branch
        };
        if let Some(branch) = branch {
            engine.render_into(branch, ctx, out);
        }
        TagOutcome::at(span.next)
    }
}

/// `{% for item in expr %} ... [{% else %} ...] {% endfor %}`
///
/// Each iteration renders against a clone carrying `item` and a `forloop`
/// mapping (`index`, `index0`, `first`, `last`, `length`). The `else` branch
/// renders when the collection is null or empty.
pub struct ForTag;

impl Tag for ForTag {
    fn render(&self, ctx: &Context, out: &mut String, args: &[String], source: &str, pos: usize) -> TagOutcome {
        let span = match seek_block(ctx, source, pos, "for") {
            Ok(span) => span,
            Err(diagnostic) => return TagOutcome::at(pos).with(diagnostic),
        };
        if args.len() < 3 || args[1] != "in" {
            return TagOutcome::at(span.next).with(malformed("for", "expected 'for <item> in <expr>'"));
        }

        let engine = ctx.engine();
        let body = &source[span.body_start..span.body_end];
        let (loop_body, else_branch) = split_else(engine.syntax(), body);
        let item = args[0].trim_matches(|c| c == '"' || c == '\'');

        let resolved = engine.resolve(ctx, &args[2..].join(" "));
        ctx.report_all(resolved.diagnostics);

        let elements = match iterable(resolved.value) {
            Ok(elements) => elements,
            Err(kind) => {
                let diagnostic = Diagnostic::new(
                    DiagnosticKind::NotIterable,
                    format!("cannot iterate over a {} in 'for {}'", kind, item),
                );
                return TagOutcome::at(span.next).with(diagnostic);
            }
        };

        if elements.is_empty() {
            if let Some(branch) = else_branch {
                engine.render_into(branch, ctx, out);
            }
            return TagOutcome::at(span.next);
        }

        let length = elements.len();
        for (index0, element) in elements.into_iter().enumerate() {
            if ctx.is_halted() {
                break;
            }
            let mut overlay = Map::new();
            overlay.insert(item.to_string(), element);
            overlay.insert("forloop".to_string(), forloop(index0, length));
            let child = engine.clone_context(ctx, overlay);
            engine.render_into(loop_body, &child, out);
        }
        TagOutcome::at(span.next)
    }
}

/// Elements a `for` loop walks, or the offending kind
fn iterable(value: Value) -> Result<Vec<Value>, tessera_core::Kind> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Seq(items) => Ok(items),
        Value::Map(map) => Ok(map.into_values().collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(other.kind()),
    }
}

fn forloop(index0: usize, length: usize) -> Value {
    let mut map = Map::new();
    map.insert("index".to_string(), Value::from(index0 + 1));
    map.insert("index0".to_string(), Value::from(index0));
    map.insert("first".to_string(), Value::Bool(index0 == 0));
    map.insert("last".to_string(), Value::Bool(index0 + 1 == length));
    map.insert("length".to_string(), Value::from(length));
    Value::Map(map)
}
