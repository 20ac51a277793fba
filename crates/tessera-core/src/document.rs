//! Deferred document records.
//!
//! Tags do not write `<link>`, `<script>`, `<style>` or `<meta>` elements
//! into the body. They append records here, and the host places them in the
//! `<head>` or just before the footer when assembling the page.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a document tag is placed in the final page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
    Head,
    PreFooter,
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(Location::Head),
            "pre-footer" => Ok(Location::PreFooter),
            other => Err(format!("unknown location '{}'", other)),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Location::Head => f.write_str("head"),
            Location::PreFooter => f.write_str("pre-footer"),
        }
    }
}

/// Element emitted for a document tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Link,
    Script,
    Style,
}

impl TagKind {
    pub fn element(&self) -> &'static str {
        match self {
            TagKind::Link => "link",
            TagKind::Script => "script",
            TagKind::Style => "style",
        }
    }
}

/// A `<link>`, `<script>` or `<style>` element waiting to be placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTag {
    pub kind: TagKind,
    /// Normalized asset path the tag was registered for
    pub name: String,
    pub location: Location,
    /// Element body; empty for external references
    pub contents: String,
    /// Lower values are emitted first
    pub priority: i32,
    pub attributes: IndexMap<String, String>,
    /// Emit without a closing tag
    pub self_closing: bool,
}

impl DocumentTag {
    /// `<link rel="stylesheet" href="...">`
    pub fn stylesheet(href: &str, priority: i32) -> Self {
        let mut attributes = IndexMap::new();
        attributes.insert("rel".to_string(), "stylesheet".to_string());
        attributes.insert("href".to_string(), href.to_string());
        Self {
            kind: TagKind::Link,
            name: href.to_string(),
            location: Location::Head,
            contents: String::new(),
            priority,
            attributes,
            self_closing: true,
        }
    }

    /// `<script src="..."></script>`
    pub fn script_src(src: &str, location: Location, priority: i32) -> Self {
        let mut attributes = IndexMap::new();
        attributes.insert("src".to_string(), src.to_string());
        Self {
            kind: TagKind::Script,
            name: src.to_string(),
            location,
            contents: String::new(),
            priority,
            attributes,
            self_closing: false,
        }
    }

    /// Inline `<style>` or `<script>` carrying a file body
    pub fn inline(kind: TagKind, name: &str, location: Location, contents: String, priority: i32) -> Self {
        Self {
            kind,
            name: name.to_string(),
            location,
            contents,
            priority,
            attributes: IndexMap::new(),
            self_closing: false,
        }
    }

    pub fn to_html(&self) -> String {
        let mut html = format!("<{}", self.kind.element());
        push_attributes(&mut html, &self.attributes);
        html.push('>');
        if !self.self_closing {
            html.push_str(&self.contents);
            html.push_str(&format!("</{}>", self.kind.element()));
        }
        html
    }
}

/// A `<meta>` element waiting to be placed in the head
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaTag {
    pub attributes: IndexMap<String, String>,
}

impl MetaTag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<meta");
        push_attributes(&mut html, &self.attributes);
        html.push('>');
        html
    }
}

/// Sort tags for emission: ascending priority, stable on registration order
pub fn sorted_by_priority<'a>(tags: impl IntoIterator<Item = &'a DocumentTag>) -> Vec<&'a DocumentTag> {
    let mut sorted: Vec<&DocumentTag> = tags.into_iter().collect();
    sorted.sort_by_key(|tag| tag.priority);
    sorted
}

fn push_attributes(html: &mut String, attributes: &IndexMap<String, String>) {
    for (key, value) in attributes {
        html.push(' ');
        html.push_str(key);
        html.push_str("=\"");
        html.push_str(&escape_attribute(value));
        html.push('"');
    }
}

/// Escape a value for use inside a double-quoted attribute
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stylesheet_html() {
        let tag = DocumentTag::stylesheet("/assets/main.css", 15);
        assert_eq!(tag.to_html(), r#"<link rel="stylesheet" href="/assets/main.css">"#);
    }

    #[test]
    fn test_script_html() {
        let tag = DocumentTag::script_src("https://cdn.example.com/app.js", Location::PreFooter, 25);
        assert_eq!(tag.to_html(), r#"<script src="https://cdn.example.com/app.js"></script>"#);
    }

    #[test]
    fn test_inline_style_html() {
        let tag = DocumentTag::inline(TagKind::Style, "/assets/a.css", Location::Head, "p{}".into(), 20);
        assert_eq!(tag.to_html(), "<style>p{}</style>");
    }

    #[test]
    fn test_meta_html_escapes() {
        let meta = MetaTag::new().with("name", "description").with("content", "Tom & \"Jerry\"");
        assert_eq!(meta.to_html(), r#"<meta name="description" content="Tom &amp; &quot;Jerry&quot;">"#);
    }

    #[test]
    fn test_sort_is_stable() {
        let a = DocumentTag::stylesheet("/a.css", 20);
        let b = DocumentTag::stylesheet("/b.css", 15);
        let c = DocumentTag::stylesheet("/c.css", 20);
        let tags = vec![a, b, c];
        let names: Vec<&str> = sorted_by_priority(&tags).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["/b.css", "/a.css", "/c.css"]);
    }

    #[test]
    fn test_location_parse() {
        assert_eq!("pre-footer".parse::<Location>(), Ok(Location::PreFooter));
        assert!("footer".parse::<Location>().is_err());
    }
}
