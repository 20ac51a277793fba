//! Filter registry and built-in filters.
//!
//! A filter is a pure transform `(value, kind, args) -> value`. Filters
//! never see the render context, so any chain of them composes freely.
//! Arguments arrive raw, quotes included; each filter decides how to read
//! them.
//!
//! Built-ins:
//! - upcase, downcase, capitalize, trim, strip, escape, newline_to_br, url_encode
//! - append, prepend, remove, replace
//! - split, join, first, last, reverse, size, slice, truncate
//! - default, date

use crate::syntax::{is_quoted, strip_quotes};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tessera_core::{Diagnostic, DiagnosticKind, Kind, Value};
use thiserror::Error;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Why a filter refused its input
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("{filter}: expected {expected}, got {found}")]
    TypeMismatch {
        filter: &'static str,
        expected: &'static str,
        found: Kind,
    },

    #[error("{filter}: {reason}")]
    Argument { filter: &'static str, reason: String },
}

impl FilterError {
    fn mismatch(filter: &'static str, expected: &'static str, found: Kind) -> Self {
        FilterError::TypeMismatch { filter, expected, found }
    }

    fn argument(filter: &'static str, reason: impl Into<String>) -> Self {
        FilterError::Argument { filter, reason: reason.into() }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        let kind = match self {
            FilterError::TypeMismatch { .. } => DiagnosticKind::FilterTypeMismatch,
            FilterError::Argument { .. } => DiagnosticKind::FilterArgument,
        };
        Diagnostic::new(kind, self.to_string())
    }
}

pub type FilterResult = Result<Value, FilterError>;

/// A named value transform
pub trait Filter: Send + Sync {
    fn apply(&self, value: &Value, kind: Kind, args: &[String]) -> FilterResult;
}

impl<F> Filter for F
where
    F: Fn(&Value, Kind, &[String]) -> FilterResult + Send + Sync,
{
    fn apply(&self, value: &Value, kind: Kind, args: &[String]) -> FilterResult {
        self(value, kind, args)
    }
}

/// Name → filter mapping; immutable once handed to an engine
#[derive(Clone, Default)]
pub struct FilterMap {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in filters
    pub fn standard() -> Self {
        let mut map = Self::new();
        map.insert("upcase", upcase);
        map.insert("downcase", downcase);
        map.insert("capitalize", capitalize);
        map.insert("trim", trim);
        map.insert("strip", strip);
        map.insert("escape", escape);
        map.insert("newline_to_br", newline_to_br);
        map.insert("url_encode", url_encode);
        map.insert("append", append);
        map.insert("prepend", prepend);
        map.insert("remove", remove);
        map.insert("replace", replace);
        map.insert("split", split);
        map.insert("join", join);
        map.insert("first", first);
        map.insert("last", last);
        map.insert("reverse", reverse);
        map.insert("size", size);
        map.insert("slice", slice);
        map.insert("truncate", truncate);
        map.insert("default", default);
        map.insert("date", date);
        map
    }

    /// Register or replace a filter
    pub fn insert(&mut self, name: &str, filter: impl Filter + 'static) {
        self.filters.insert(name.to_string(), Arc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Interpret a raw argument as a literal value
///
/// Quoted text is a string; bare `true`/`false` and numbers are typed;
/// anything else is taken as text.
pub fn parse_literal(arg: &str) -> Value {
    let arg = arg.trim();
    if is_quoted(arg) {
        return Value::String(strip_quotes(arg).to_string());
    }
    match arg {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "nil" | "null" => Value::Null,
        _ => {
            if let Ok(i) = arg.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(f) = arg.parse::<f64>() {
                Value::Float(f)
            } else {
                Value::String(arg.to_string())
            }
        }
    }
}

fn text_arg<'a>(filter: &'static str, args: &'a [String], index: usize) -> Result<&'a str, FilterError> {
    args.get(index)
        .map(|arg| strip_quotes(arg.trim()))
        .ok_or_else(|| FilterError::argument(filter, format!("missing argument {}", index + 1)))
}

fn int_arg(filter: &'static str, args: &[String], index: usize) -> Result<Option<i64>, FilterError> {
    match args.get(index) {
        None => Ok(None),
        Some(arg) => strip_quotes(arg.trim())
            .parse::<i64>()
            .map(Some)
            .map_err(|_| FilterError::argument(filter, format!("'{}' is not an integer", arg))),
    }
}

/// Apply a string transform; null passes through untouched
fn on_string(filter: &'static str, value: &Value, f: impl FnOnce(&str) -> Value) -> FilterResult {
    match value {
        Value::String(s) => Ok(f(s)),
        Value::Null => Ok(Value::Null),
        other => Err(FilterError::mismatch(filter, "string", other.kind())),
    }
}

// ============================================================================
// String filters
// ============================================================================

pub fn upcase(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    on_string("upcase", value, |s| Value::String(s.to_uppercase()))
}

pub fn downcase(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    on_string("downcase", value, |s| Value::String(s.to_lowercase()))
}

pub fn capitalize(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    on_string("capitalize", value, |s| {
        let mut chars = s.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        Value::String(capitalized)
    })
}

pub fn trim(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    on_string("trim", value, |s| Value::String(s.trim().to_string()))
}

/// Remove every `<...>` span
pub fn strip(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    on_string("strip", value, |s| Value::String(HTML_TAG.replace_all(s, "").into_owned()))
}

pub fn escape(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    on_string("escape", value, |s| Value::String(escape_html(s)))
}

pub fn newline_to_br(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    on_string("newline_to_br", value, |s| Value::String(s.replace('\n', "<br>\n")))
}

pub fn url_encode(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    on_string("url_encode", value, |s| {
        let mut encoded = String::with_capacity(s.len());
        for byte in s.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    encoded.push(byte as char)
                }
                b' ' => encoded.push('+'),
                _ => encoded.push_str(&format!("%{:02X}", byte)),
            }
        }
        Value::String(encoded)
    })
}

pub fn append(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let suffix = text_arg("append", args, 0)?;
    on_string("append", value, |s| Value::String(format!("{}{}", s, suffix)))
}

pub fn prepend(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let prefix = text_arg("prepend", args, 0)?;
    on_string("prepend", value, |s| Value::String(format!("{}{}", prefix, s)))
}

pub fn remove(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let needle = text_arg("remove", args, 0)?;
    on_string("remove", value, |s| {
        if needle.is_empty() {
            Value::String(s.to_string())
        } else {
            Value::String(s.replace(needle, ""))
        }
    })
}

pub fn replace(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let from = text_arg("replace", args, 0)?;
    let to = text_arg("replace", args, 1)?;
    on_string("replace", value, |s| Value::String(s.replace(from, to)))
}

/// Split into a sequence of trimmed pieces
pub fn split(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let delimiter = text_arg("split", args, 0)?;
    on_string("split", value, |s| {
        let pieces: Vec<Value> = if delimiter.is_empty() {
            s.chars().map(|c| Value::String(c.to_string())).collect()
        } else {
            s.split(delimiter)
                .map(|piece| Value::String(piece.trim().to_string()))
                .collect()
        };
        Value::Seq(pieces)
    })
}

/// Join a sequence with a delimiter (a space when none is given)
pub fn join(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let delimiter = args.first().map(|arg| strip_quotes(arg.trim())).unwrap_or(" ");
    match value {
        Value::Seq(items) => Ok(Value::String(
            items.iter().map(Value::to_text).collect::<Vec<_>>().join(delimiter),
        )),
        Value::String(_) | Value::Null => Ok(value.clone()),
        other => Err(FilterError::mismatch("join", "sequence", other.kind())),
    }
}

pub fn first(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    match value {
        Value::Seq(items) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s.chars().next().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(FilterError::mismatch("first", "sequence or string", other.kind())),
    }
}

pub fn last(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    match value {
        Value::Seq(items) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s.chars().last().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(FilterError::mismatch("last", "sequence or string", other.kind())),
    }
}

pub fn reverse(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    match value {
        Value::Seq(items) => Ok(Value::Seq(items.iter().rev().cloned().collect())),
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        Value::Null => Ok(Value::Null),
        other => Err(FilterError::mismatch("reverse", "sequence or string", other.kind())),
    }
}

/// Length in runes, elements or entries
pub fn size(value: &Value, _kind: Kind, _args: &[String]) -> FilterResult {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::Seq(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::Null => 0,
        other => return Err(FilterError::mismatch("size", "string, sequence or mapping", other.kind())),
    };
    Ok(Value::from(len))
}

/// Half-open range over runes or elements
///
/// Bounds are clamped to the input; a reversed range is swapped.
pub fn slice(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let start = int_arg("slice", args, 0)?
        .ok_or_else(|| FilterError::argument("slice", "missing start index"))?;
    let end = int_arg("slice", args, 1)?;

    let range = |len: usize| {
        let clamp = |i: i64| i.clamp(0, len as i64) as usize;
        let (a, b) = (clamp(start), end.map_or(len, clamp));
        if b < a { (b, a) } else { (a, b) }
    };

    match value {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = range(chars.len());
            Ok(Value::String(chars[a..b].iter().collect()))
        }
        Value::Seq(items) => {
            let (a, b) = range(items.len());
            Ok(Value::Seq(items[a..b].to_vec()))
        }
        Value::Null => Ok(Value::Null),
        other => Err(FilterError::mismatch("slice", "string or sequence", other.kind())),
    }
}

/// Cut to N runes and append an ellipsis (`...` unless given)
pub fn truncate(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let limit = int_arg("truncate", args, 0)?
        .ok_or_else(|| FilterError::argument("truncate", "missing length"))?;
    if limit < 0 {
        return Err(FilterError::argument("truncate", "length must not be negative"));
    }
    let ellipsis = args.get(1).map(|arg| strip_quotes(arg.trim())).unwrap_or("...");

    on_string("truncate", value, |s| {
        let limit = limit as usize;
        if s.chars().count() <= limit {
            Value::String(s.to_string())
        } else {
            let cut: String = s.chars().take(limit).collect();
            Value::String(format!("{}{}", cut, ellipsis))
        }
    })
}

/// Fallback for null, empty strings and empty sequences
pub fn default(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let fallback = args
        .first()
        .map(|arg| parse_literal(arg))
        .ok_or_else(|| FilterError::argument("default", "missing fallback value"))?;
    if value.is_blank() {
        Ok(fallback)
    } else {
        Ok(value.clone())
    }
}

/// Format a timestamp with a strftime pattern (`%Y-%m-%d` by default)
///
/// Accepts RFC 3339 strings, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, or
/// integer unix seconds.
pub fn date(value: &Value, _kind: Kind, args: &[String]) -> FilterResult {
    let pattern = args.first().map(|arg| strip_quotes(arg.trim())).unwrap_or("%Y-%m-%d");

    let timestamp: DateTime<Utc> = match value {
        Value::Null => return Ok(Value::Null),
        Value::Int(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .ok_or_else(|| FilterError::argument("date", format!("{} is out of range", secs)))?,
        Value::String(s) => parse_timestamp(s.trim())
            .ok_or_else(|| FilterError::argument("date", format!("cannot parse '{}' as a date", s)))?,
        other => return Err(FilterError::mismatch("date", "string or integer", other.kind())),
    };

    let mut formatted = String::new();
    write!(formatted, "{}", timestamp.format(pattern))
        .map_err(|_| FilterError::argument("date", format!("invalid format '{}'", pattern)))?;
    Ok(Value::String(formatted))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    fn run(name: &str, value: Value, raw: &[&str]) -> FilterResult {
        let map = FilterMap::standard();
        let kind = value.kind();
        map.get(name).unwrap().apply(&value, kind, &args(raw))
    }

    #[test]
    fn test_case_filters() {
        assert_eq!(run("upcase", s("straße"), &[]), Ok(s("STRASSE")));
        assert_eq!(run("downcase", s("ÀB"), &[]), Ok(s("àb")));
        assert_eq!(run("capitalize", s("élan vital"), &[]), Ok(s("Élan vital")));
        assert_eq!(run("capitalize", s(""), &[]), Ok(s("")));
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(run("upcase", Value::Null, &[]), Ok(Value::Null));
        assert_eq!(run("append", Value::Null, &["\"x\""]), Ok(Value::Null));
    }

    #[test]
    fn test_type_mismatch() {
        let err = run("upcase", Value::Int(3), &[]).unwrap_err();
        assert_eq!(
            err,
            FilterError::TypeMismatch { filter: "upcase", expected: "string", found: Kind::Int }
        );
        assert_eq!(err.into_diagnostic().kind, DiagnosticKind::FilterTypeMismatch);
    }

    #[test]
    fn test_trim_and_strip() {
        assert_eq!(run("trim", s("\u{3000} hi \n"), &[]), Ok(s("hi")));
        assert_eq!(run("strip", s("<p>Hello <b>you</b></p>"), &[]), Ok(s("Hello you")));
    }

    #[test]
    fn test_append_prepend() {
        assert_eq!(run("append", s("a"), &["\"b\""]), Ok(s("ab")));
        assert_eq!(run("prepend", s("a"), &["'z'"]), Ok(s("za")));
        assert!(matches!(run("append", s("a"), &[]), Err(FilterError::Argument { .. })));
    }

    #[test]
    fn test_remove_replace() {
        assert_eq!(run("remove", s("banana"), &["\"an\""]), Ok(s("ba")));
        assert_eq!(run("replace", s("a-b-c"), &["\"-\"", "\"+\""]), Ok(s("a+b+c")));
        assert!(run("replace", s("x"), &["\"-\""]).is_err());
    }

    #[test]
    fn test_split_join() {
        let parts = run("split", s("John, Paul ,George"), &["\",\""]).unwrap();
        assert_eq!(parts, Value::from(vec!["John", "Paul", "George"]));
        assert_eq!(run("join", parts, &["\"-\""]), Ok(s("John-Paul-George")));
        assert_eq!(run("split", s("ab"), &["\"\""]), Ok(Value::from(vec!["a", "b"])));
        assert_eq!(run("join", Value::from(vec![1i64, 2]), &[]), Ok(s("1 2")));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(run("truncate", s("héllo world"), &["5"]), Ok(s("héllo...")));
        assert_eq!(run("truncate", s("héllo world"), &["5", "\"…\""]), Ok(s("héllo…")));
        assert_eq!(run("truncate", s("short"), &["10"]), Ok(s("short")));
        assert!(run("truncate", s("x"), &["ten"]).is_err());
        assert!(run("truncate", s("x"), &["-1"]).is_err());
    }

    #[test]
    fn test_slice() {
        assert_eq!(run("slice", s("abcdef"), &["1", "3"]), Ok(s("bc")));
        assert_eq!(run("slice", s("abcdef"), &["4"]), Ok(s("ef")));
        assert_eq!(run("slice", s("abcdef"), &["4", "1"]), Ok(s("bcd")));
        assert_eq!(run("slice", s("abc"), &["-5", "99"]), Ok(s("abc")));
        assert_eq!(
            run("slice", Value::from(vec!["a", "b", "c"]), &["1", "2"]),
            Ok(Value::from(vec!["b"]))
        );
    }

    #[test]
    fn test_default() {
        assert_eq!(run("default", Value::Null, &["\"n/a\""]), Ok(s("n/a")));
        assert_eq!(run("default", s(""), &["\"n/a\""]), Ok(s("n/a")));
        assert_eq!(run("default", Value::Seq(vec![]), &["0"]), Ok(Value::Int(0)));
        assert_eq!(run("default", s("set"), &["\"n/a\""]), Ok(s("set")));
        assert_eq!(run("default", Value::Bool(false), &["true"]), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_collections() {
        let list = Value::from(vec!["a", "b", "c"]);
        assert_eq!(run("first", list.clone(), &[]), Ok(s("a")));
        assert_eq!(run("last", list.clone(), &[]), Ok(s("c")));
        assert_eq!(run("reverse", list.clone(), &[]), Ok(Value::from(vec!["c", "b", "a"])));
        assert_eq!(run("size", list, &[]), Ok(Value::Int(3)));
        assert_eq!(run("size", s("héllo"), &[]), Ok(Value::Int(5)));
    }

    #[test]
    fn test_escape_and_url_encode() {
        assert_eq!(run("escape", s("<a href='x'>&</a>"), &[]), Ok(s("&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;")));
        assert_eq!(run("url_encode", s("a b&c/é"), &[]), Ok(s("a+b%26c%2F%C3%A9")));
        assert_eq!(run("newline_to_br", s("a\nb"), &[]), Ok(s("a<br>\nb")));
    }

    #[test]
    fn test_date() {
        assert_eq!(run("date", s("2024-03-09T10:00:00Z"), &["\"%d/%m/%Y\""]), Ok(s("09/03/2024")));
        assert_eq!(run("date", s("2024-03-09"), &[]), Ok(s("2024-03-09")));
        assert_eq!(run("date", Value::Int(0), &["\"%Y\""]), Ok(s("1970")));
        assert!(run("date", s("yesterday"), &[]).is_err());
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("\"7\""), s("7"));
        assert_eq!(parse_literal("7"), Value::Int(7));
        assert_eq!(parse_literal("2.5"), Value::Float(2.5));
        assert_eq!(parse_literal("true"), Value::Bool(true));
        assert_eq!(parse_literal("word"), s("word"));
    }

    #[test]
    fn test_custom_filter_registration() {
        let mut map = FilterMap::new();
        map.insert("double", |value: &Value, _kind: Kind, _args: &[String]| -> FilterResult {
            match value {
                Value::Int(i) => Ok(Value::Int(i * 2)),
                other => Ok(other.clone()),
            }
        });
        assert!(map.contains("double"));
        assert_eq!(map.get("double").unwrap().apply(&Value::Int(4), Kind::Int, &[]), Ok(Value::Int(8)));
        assert_eq!(map.names(), vec!["double"]);
    }
}
