//! Expression resolution.
//!
//! ```text
//! expr   := source ( "|" filter )*
//! filter := name ( ":" arg ( "," arg )* )?
//! source := literal | dotted-name
//! ```
//!
//! Quoted sources are literals and are left as written. Dotted names read
//! from the context data, and any string they produce is sanitized before
//! the filter chain sees it. Unresolved names are null, never an error.

use crate::context::Context;
use crate::engine::Engine;
use crate::syntax::{is_quoted, split_once_top_level, split_top_level, strip_quotes};
use tessera_core::{Diagnostic, DiagnosticKind, Kind, Value};

/// Outcome of resolving an expression
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    pub kind: Kind,
    pub diagnostics: Vec<Diagnostic>,
}

/// One `name: arg, arg` segment of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCall {
    pub name: String,
    /// Raw arguments, quotes kept
    pub args: Vec<String>,
}

impl FilterCall {
    pub fn parse(segment: &str) -> Self {
        let segment = segment.trim();
        match split_once_top_level(segment, ':') {
            Some((name, rest)) => FilterCall {
                name: name.trim().to_string(),
                args: split_top_level(rest, ',')
                    .into_iter()
                    .map(str::trim)
                    .filter(|arg| !arg.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            None => FilterCall {
                name: segment.to_string(),
                args: Vec::new(),
            },
        }
    }
}

/// Split an expression into its source and filter calls
pub fn parse_expression(expr: &str) -> (&str, Vec<FilterCall>) {
    let mut segments = split_top_level(expr, '|').into_iter();
    let source = segments.next().unwrap_or("").trim();
    (source, segments.map(FilterCall::parse).collect())
}

/// Resolve `expr` against the context data and run its filter chain
pub fn resolve(engine: &Engine, ctx: &Context, expr: &str) -> Resolved {
    let (source, filters) = parse_expression(expr);
    let mut value = resolve_source(engine, ctx, source);
    let mut diagnostics = Vec::new();

    for call in filters {
        let Some(filter) = engine.filters().get(&call.name) else {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::UnknownFilter,
                format!("no filter named '{}'", call.name),
            ));
            continue;
        };

        let kind = value.kind();
        match filter.apply(&value, kind, &call.args) {
            Ok(next) => value = next,
            Err(err) => diagnostics.push(err.into_diagnostic()),
        }
    }

    let kind = value.kind();
    Resolved { value, kind, diagnostics }
}

fn resolve_source(engine: &Engine, ctx: &Context, source: &str) -> Value {
    if is_quoted(source) {
        return Value::String(strip_quotes(source).to_string());
    }
    match ctx.lookup(source) {
        Value::String(s) => Value::String(engine.sanitizer().sanitize(&s)),
        other => other,
    }
}
