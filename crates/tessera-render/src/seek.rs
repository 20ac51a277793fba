//! Nested-tag seeking.
//!
//! Block tags find their own terminator in the raw source. Seeking counts
//! depth so nested `if`/`for` pairs match correctly. Variables, comments and
//! verbatim bodies are invisible to the depth counter.

use crate::syntax::{Sentinel, Syntax};
use tessera_core::{Diagnostic, DiagnosticKind};

/// Byte range of a block body and the cursor after its terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub body_start: usize,
    pub body_end: usize,
    pub next: usize,
}

/// A `{% name ... %}` occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMarker<'a> {
    pub start: usize,
    pub end: usize,
    pub name: &'a str,
}

/// Iterator over tag markers, skipping variables, comments and verbatim bodies
///
/// An unclosed construct is stepped over at its opener, the same way the
/// renderer treats it. A verbatim block without its end stops iteration.
pub struct TagMarkers<'a> {
    syntax: &'a Syntax,
    source: &'a str,
    pos: usize,
}

impl<'a> TagMarkers<'a> {
    pub fn new(syntax: &'a Syntax, source: &'a str, pos: usize) -> Self {
        Self { syntax, source, pos }
    }
}

impl<'a> Iterator for TagMarkers<'a> {
    type Item = TagMarker<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (start, sentinel) = self.syntax.next_sentinel(self.source, self.pos)?;
            let Some((inner_end, after)) = self.syntax.find_close(self.source, start, sentinel) else {
                self.pos = start + self.syntax.open(sentinel).len();
                continue;
            };
            self.pos = after;

            if sentinel != Sentinel::Tag {
                continue;
            }

            let inner = &self.source[start + self.syntax.tag_open.len()..inner_end];
            let name = inner.split_whitespace().next().unwrap_or("");

            if name == "verbatim" {
                let span = find_verbatim_end(self.syntax, self.source, after)?;
                self.pos = span.next;
            }

            return Some(TagMarker { start, end: after, name });
        }
    }
}

/// Find the `end<name>` matching a block opened just before `pos`
pub fn seek_end(syntax: &Syntax, source: &str, pos: usize, name: &str) -> Result<BlockSpan, Diagnostic> {
    if name == "verbatim" {
        return find_verbatim_end(syntax, source, pos).ok_or_else(|| unterminated(name, pos));
    }

    let end_name = format!("end{}", name);
    let mut depth = 1usize;

    for marker in TagMarkers::new(syntax, source, pos) {
        if marker.name == name {
            depth += 1;
        } else if marker.name == end_name {
            depth -= 1;
            if depth == 0 {
                return Ok(BlockSpan {
                    body_start: pos,
                    body_end: marker.start,
                    next: marker.end,
                });
            }
        }
    }

    Err(unterminated(name, pos))
}

/// Blocks that may carry their own `{% else %}`
const ELSE_HOLDERS: &[(&str, &str)] = &[("if", "endif"), ("for", "endfor")];

/// Split a block body at its first top-level `{% else %}`
///
/// An `else` belonging to any nested `if` or `for` is skipped.
pub fn split_else<'s>(syntax: &Syntax, body: &'s str) -> (&'s str, Option<&'s str>) {
    let mut depth = 0usize;

    for marker in TagMarkers::new(syntax, body, 0) {
        if ELSE_HOLDERS.iter().any(|(open, _)| marker.name == *open) {
            depth += 1;
        } else if ELSE_HOLDERS.iter().any(|(_, close)| marker.name == *close) {
            depth = depth.saturating_sub(1);
        } else if marker.name == "else" && depth == 0 {
            return (&body[..marker.start], Some(&body[marker.end..]));
        }
    }

    (body, None)
}

/// Verbatim bodies end at the first `endverbatim`; nothing inside is scanned
fn find_verbatim_end(syntax: &Syntax, source: &str, pos: usize) -> Option<BlockSpan> {
    let mut cursor = pos;
    loop {
        let start = cursor + source.get(cursor..)?.find(syntax.tag_open.as_str())?;
        let (inner_end, after) = syntax.find_close(source, start, Sentinel::Tag)?;
        let inner = &source[start + syntax.tag_open.len()..inner_end];
        if inner.split_whitespace().next() == Some("endverbatim") {
            return Some(BlockSpan {
                body_start: pos,
                body_end: start,
                next: after,
            });
        }
        cursor = start + syntax.tag_open.len();
    }
}

fn unterminated(name: &str, pos: usize) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::unterminated(name),
        format!("no matching end{} found", name),
    )
    .at(pos)
}
