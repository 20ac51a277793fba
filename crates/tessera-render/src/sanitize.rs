//! HTML sanitization for user-generated content.
//!
//! Every string resolved from render data passes through a [`Sanitizer`]
//! before it reaches the output. The default [`UgcPolicy`] keeps inline
//! formatting, lists, tables and images, drops scripts and styles together
//! with their content, and strips event handlers and unsafe URLs.
//!
//! Markup is tokenized by `lol_html`, so cleaning is a single streaming pass
//! over the input.
//!
//! Sanitizing is idempotent: running the policy over its own output
//! returns the same string.

use lazy_static::lazy_static;
use lol_html::html_content::{ContentType, Element};
use lol_html::{doc_comments, doc_text, doctype, element, rewrite_str, HandlerResult, RewriteStrSettings};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tessera_core::document::escape_attribute;
use tracing::warn;

/// An HTML cleaning policy
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, html: &str) -> String;
}

/// Process-wide UGC policy
pub static UGC: Lazy<Arc<UgcPolicy>> = Lazy::new(|| Arc::new(UgcPolicy::new()));

lazy_static! {
    /// A complete character reference at the start of the input
    static ref ENTITY: Regex =
        Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]{1,31}|#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6});").unwrap();

    /// Numeric references, with or without the trailing semicolon
    static ref NUMERIC_REF: Regex = Regex::new(r"&#(?:[xX]([0-9A-Fa-f]{1,6})|([0-9]{1,7}));?").unwrap();
}

const INLINE: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "del", "dfn", "em", "i", "ins", "kbd",
    "mark", "q", "s", "samp", "small", "span", "strike", "strong", "sub", "sup", "time", "tt",
    "u", "var", "wbr",
];

const BLOCKS: &[&str] = &[
    "blockquote", "div", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "p", "pre", "details",
    "summary", "figure", "figcaption", "ol", "ul", "li", "dl", "dt", "dd", "table", "caption",
    "thead", "tbody", "tfoot", "tr", "th", "td", "col", "colgroup", "img",
];

const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "textarea",
];

const GLOBAL_ATTRS: &[&str] = &["title", "dir", "lang"];

const URL_ATTRS: &[&str] = &["href", "src", "cite"];

const URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// The user-generated-content whitelist
#[derive(Debug, Clone)]
pub struct UgcPolicy {
    elements: HashSet<&'static str>,
    dropped: HashSet<&'static str>,
    element_attrs: HashMap<&'static str, HashSet<&'static str>>,
    link_rel: &'static str,
}

impl Default for UgcPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl UgcPolicy {
    pub fn new() -> Self {
        let mut element_attrs: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
        let mut allow = |element: &'static str, attrs: &[&'static str]| {
            element_attrs.entry(element).or_default().extend(attrs.iter().copied());
        };
        allow("a", &["href"]);
        allow("img", &["src", "alt", "width", "height"]);
        allow("blockquote", &["cite"]);
        allow("q", &["cite"]);
        allow("del", &["cite"]);
        allow("ins", &["cite"]);
        allow("td", &["colspan", "rowspan"]);
        allow("th", &["colspan", "rowspan"]);
        allow("ol", &["start", "type"]);
        allow("li", &["value"]);
        allow("time", &["datetime"]);

        Self {
            elements: INLINE.iter().chain(BLOCKS).copied().collect(),
            dropped: DROP_WITH_CONTENT.iter().copied().collect(),
            element_attrs,
            link_rel: "nofollow noopener",
        }
    }

    fn attribute_allowed(&self, element: &str, attr: &str) -> bool {
        if attr.starts_with("on") {
            return false;
        }
        GLOBAL_ATTRS.contains(&attr)
            || self
                .element_attrs
                .get(element)
                .map_or(false, |attrs| attrs.contains(attr))
    }

    /// Filter one start tag in place
    fn clean_element(&self, el: &mut Element) -> HandlerResult {
        let name = el.tag_name();
        if self.dropped.contains(name.as_str()) {
            el.remove();
            return Ok(());
        }
        if !self.elements.contains(name.as_str()) {
            el.remove_and_keep_content();
            return Ok(());
        }

        let attributes: Vec<(String, String)> = el
            .attributes()
            .iter()
            .map(|attr| (attr.name(), attr.value()))
            .collect();
        let mut has_href = false;
        for (attr, value) in attributes {
            let unsafe_url = URL_ATTRS.contains(&attr.as_str()) && !is_safe_url(&value);
            if !self.attribute_allowed(&name, &attr) || unsafe_url {
                el.remove_attribute(&attr);
                continue;
            }
            has_href |= attr == "href";
            el.set_attribute(&attr, &escape_keeping_entities(&value, true))?;
        }
        if name == "a" && has_href {
            el.set_attribute("rel", self.link_rel)?;
        }
        Ok(())
    }
}

impl Sanitizer for UgcPolicy {
    fn sanitize(&self, html: &str) -> String {
        let result = rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![element!("*", |el| self.clean_element(el))],
                document_content_handlers: vec![
                    doctype!(|doctype| {
                        doctype.remove();
                        Ok(())
                    }),
                    doc_comments!(|comment| {
                        comment.remove();
                        Ok(())
                    }),
                    doc_text!(|text| {
                        if !text.as_str().is_empty() {
                            let escaped = escape_keeping_entities(text.as_str(), false);
                            text.replace(&escaped, ContentType::Html);
                        }
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::default()
            },
        );

        match result {
            Ok(cleaned) => escape_dangling_tag(cleaned),
            Err(e) => {
                warn!("failed to sanitize HTML, escaping it: {}", e);
                escape_attribute(html)
            }
        }
    }
}

/// Escape a tag left open at the end of the output
///
/// Text is already escaped and kept attribute values are double-quoted, so
/// the only raw `<` that never reaches its `>` is an unfinished tag the
/// rewriter passed through verbatim.
fn escape_dangling_tag(html: String) -> String {
    let mut open: Option<usize> = None;
    let mut quoted = false;
    for (i, b) in html.bytes().enumerate() {
        match (open, b) {
            (None, b'<') => open = Some(i),
            (Some(_), b'"') => quoted = !quoted,
            (Some(_), b'>') if !quoted => open = None,
            _ => {}
        }
    }
    match open {
        Some(start) => {
            let mut out = String::with_capacity(html.len() + 8);
            out.push_str(&html[..start]);
            out.push_str(&escape_attribute(&html[start..]));
            out
        }
        None => html,
    }
}

/// Escape text, leaving well-formed character references alone
fn escape_keeping_entities(text: &str, in_attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '&' if ENTITY.is_match(&text[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Relative URLs and http/https/mailto are allowed
fn is_safe_url(raw: &str) -> bool {
    let decoded = decode_for_scheme_check(raw);
    let compact: String = decoded
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    let scheme_end = match compact.find(|c: char| matches!(c, ':' | '/' | '?' | '#')) {
        Some(at) if compact[at..].starts_with(':') => at,
        _ => return true,
    };
    URL_SCHEMES.contains(&&compact[..scheme_end])
}

fn decode_for_scheme_check(raw: &str) -> String {
    let numeric = NUMERIC_REF.replace_all(raw, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32).map(String::from).unwrap_or_default()
    });
    numeric
        .replace("&colon;", ":")
        .replace("&Tab;", "\t")
        .replace("&NewLine;", "\n")
}
