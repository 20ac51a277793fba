//! Sentinels and the low-level scanner.
//!
//! The scanner never builds an AST. It reports byte offsets of the next
//! construct and leaves interpretation to the engine and the tags.

use serde::Deserialize;

/// The three construct delimiters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Syntax {
    pub variable_open: String,
    pub variable_close: String,
    pub tag_open: String,
    pub tag_close: String,
    pub comment_open: String,
    pub comment_close: String,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            variable_open: "{{".to_string(),
            variable_close: "}}".to_string(),
            tag_open: "{%".to_string(),
            tag_close: "%}".to_string(),
            comment_open: "{#".to_string(),
            comment_close: "#}".to_string(),
        }
    }
}

/// Construct introduced by an opening sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Variable,
    Tag,
    Comment,
}

impl Syntax {
    /// Earliest opening sentinel at or after `pos`
    pub fn next_sentinel(&self, source: &str, pos: usize) -> Option<(usize, Sentinel)> {
        let rest = source.get(pos..)?;
        [
            (self.variable_open.as_str(), Sentinel::Variable),
            (self.tag_open.as_str(), Sentinel::Tag),
            (self.comment_open.as_str(), Sentinel::Comment),
        ]
        .into_iter()
        .filter(|(open, _)| !open.is_empty())
        .filter_map(|(open, sentinel)| rest.find(open).map(|at| (pos + at, sentinel)))
        .min_by_key(|(at, _)| *at)
    }

    pub fn open(&self, sentinel: Sentinel) -> &str {
        match sentinel {
            Sentinel::Variable => &self.variable_open,
            Sentinel::Tag => &self.tag_open,
            Sentinel::Comment => &self.comment_open,
        }
    }

    pub fn close(&self, sentinel: Sentinel) -> &str {
        match sentinel {
            Sentinel::Variable => &self.variable_close,
            Sentinel::Tag => &self.tag_close,
            Sentinel::Comment => &self.comment_close,
        }
    }

    /// Locate the closer for a construct opened at `start`
    ///
    /// Returns `(interior_end, after_close)`.
    pub fn find_close(&self, source: &str, start: usize, sentinel: Sentinel) -> Option<(usize, usize)> {
        let inner = start + self.open(sentinel).len();
        let close = self.close(sentinel);
        if close.is_empty() {
            return None;
        }
        source
            .get(inner..)?
            .find(close)
            .map(|at| (inner + at, inner + at + close.len()))
    }
}

/// Split a tag interior on whitespace, keeping quoted runs intact
///
/// Quotes are preserved in the tokens; `location="pre footer"` stays one
/// token.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Split on `sep` wherever it is not inside quotes
pub fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == sep => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            None => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Split at the first unquoted `sep`
pub fn split_once_top_level(input: &str, sep: char) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == sep => return Some((&input[..i], &input[i + c.len_utf8()..])),
            None => {}
        }
    }
    None
}

/// True when the token is wrapped in a matching pair of quotes
pub fn is_quoted(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
}

/// Remove one pair of surrounding quotes, if present
pub fn strip_quotes(token: &str) -> &str {
    if is_quoted(token) {
        &token[1..token.len() - 1]
    } else {
        token
    }
}
