//! Tag registry and the built-in tags.
//!
//! A tag is invoked with the cursor just past its opening `%}` and the whole
//! source it was found in. Block tags seek their own terminator and hand
//! back the position after it; self-closing tags return the cursor as is.
//!
//! Built-ins:
//! - `if` / `for` (control)
//! - `define` / `block` / `render` / `include` (blocks)
//! - `verbatim`
//! - `asset`
//! - `meta`

mod asset;
mod blocks;
mod control;
mod meta;
mod verbatim;

pub use asset::{AssetKind, AssetTag};
pub use blocks::{resolve_template_name, BlockTag, DefineTag, IncludeTag, RenderTag};
pub use control::{ForTag, IfTag};
pub use meta::HeadMetaTag;
pub use verbatim::VerbatimTag;

use crate::context::Context;
use crate::seek::{seek_end, BlockSpan};
use crate::syntax::{is_quoted, strip_quotes};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{Diagnostic, DiagnosticKind, Map, Value};

/// Where scanning resumes after a tag, plus what went wrong in it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagOutcome {
    pub next: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl TagOutcome {
    pub fn at(next: usize) -> Self {
        Self {
            next,
            diagnostics: Vec::new(),
        }
    }

    pub fn with(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }
}

/// A `{% name args %}` handler
pub trait Tag: Send + Sync {
    /// Render the tag into `out`
    ///
    /// `args` are the raw tokens after the tag name, quotes kept. `pos` is the
    /// byte offset in `source` immediately after the opening `%}`.
    fn render(&self, ctx: &Context, out: &mut String, args: &[String], source: &str, pos: usize) -> TagOutcome;
}

impl<F> Tag for F
where
    F: Fn(&Context, &mut String, &[String], &str, usize) -> TagOutcome + Send + Sync,
{
    fn render(&self, ctx: &Context, out: &mut String, args: &[String], source: &str, pos: usize) -> TagOutcome {
        self(ctx, out, args, source, pos)
    }
}

/// Name → tag mapping; immutable once handed to an engine
#[derive(Clone, Default)]
pub struct TagMap {
    tags: HashMap<String, Arc<dyn Tag>>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in tags
    pub fn standard() -> Self {
        let mut map = Self::new();
        map.insert("if", IfTag);
        map.insert("for", ForTag);
        map.insert("define", DefineTag);
        map.insert("block", BlockTag);
        map.insert("render", RenderTag);
        map.insert("include", IncludeTag);
        map.insert("verbatim", VerbatimTag);
        map.insert("asset", AssetTag);
        map.insert("meta", HeadMetaTag);
        map
    }

    /// Register or replace a tag
    pub fn insert(&mut self, name: &str, tag: impl Tag + 'static) {
        self.tags.insert(name.to_string(), Arc::new(tag));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tag>> {
        self.tags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Seek the terminator of block `name` opened just before `pos`
pub(crate) fn seek_block(ctx: &Context, source: &str, pos: usize, name: &str) -> Result<BlockSpan, Diagnostic> {
    seek_end(ctx.engine().syntax(), source, pos, name)
}

pub(crate) fn malformed(tag: &str, reason: impl AsRef<str>) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::MalformedTag, format!("{}: {}", tag, reason.as_ref()))
}

/// Parse trailing `key=value` tokens
///
/// Quoted values are literals. Anything else is resolved as an expression
/// against the context, filters included. Tokens without `=` are reported.
pub fn parse_params(ctx: &Context, tag: &str, tokens: &[String]) -> (Map, Vec<Diagnostic>) {
    let mut params = Map::new();
    let mut diagnostics = Vec::new();

    for token in tokens {
        match token.split_once('=') {
            Some((key, raw)) if !key.is_empty() && !is_quoted(key) => {
                let value = param_value(ctx, raw, &mut diagnostics);
                params.insert(key.to_string(), value);
            }
            _ => diagnostics.push(malformed(tag, format!("expected key=value, got '{}'", token))),
        }
    }

    (params, diagnostics)
}

/// Literal for quoted text, resolved expression otherwise
pub fn param_value(ctx: &Context, raw: &str, diagnostics: &mut Vec<Diagnostic>) -> Value {
    if is_quoted(raw) {
        return Value::String(strip_quotes(raw).to_string());
    }
    let resolved = ctx.engine().resolve(ctx, raw);
    diagnostics.extend(resolved.diagnostics);
    resolved.value
}
