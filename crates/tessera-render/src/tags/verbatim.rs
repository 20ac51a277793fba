//! `verbatim`: raw passthrough.

use super::{seek_block, Tag, TagOutcome};
use crate::context::Context;

/// `{% verbatim %} ... {% endverbatim %}`: body copied byte for byte
pub struct VerbatimTag;

impl Tag for VerbatimTag {
    fn render(&self, ctx: &Context, out: &mut String, _args: &[String], source: &str, pos: usize) -> TagOutcome {
        match seek_block(ctx, source, pos, "verbatim") {
            Ok(span) => {
                out.push_str(&source[span.body_start..span.body_end]);
                TagOutcome::at(span.next)
            }
            Err(diagnostic) => TagOutcome::at(pos).with(diagnostic),
        }
    }
}
