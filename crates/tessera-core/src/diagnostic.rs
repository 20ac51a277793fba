//! Non-fatal render diagnostics.
//!
//! A render never aborts. Every recoverable fault becomes a [`Diagnostic`]
//! appended to the context, and the offending construct renders as nothing.

use serde::{Serialize, Serializer};
use std::fmt;

/// Category of a render fault
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    UnclosedVariable,
    UnclosedTag,
    UnclosedComment,
    UnknownTag,
    UnknownFilter,
    /// A block tag whose `end<name>` was never found
    Unterminated(String),
    NotIterable,
    TemplateNotFound,
    InvalidAssetKind,
    AssetPathInvalid,
    AssetKindConflict,
    AssetReadFailed,
    FilterTypeMismatch,
    FilterArgument,
    /// Tag called with arguments it cannot use
    MalformedTag,
    RecursionLimit,
}

impl DiagnosticKind {
    pub fn unterminated(tag: &str) -> Self {
        DiagnosticKind::Unterminated(tag.to_string())
    }

    pub fn name(&self) -> String {
        match self {
            DiagnosticKind::UnclosedVariable => "unclosed-variable".to_string(),
            DiagnosticKind::UnclosedTag => "unclosed-tag".to_string(),
            DiagnosticKind::UnclosedComment => "unclosed-comment".to_string(),
            DiagnosticKind::UnknownTag => "unknown-tag".to_string(),
            DiagnosticKind::UnknownFilter => "unknown-filter".to_string(),
            DiagnosticKind::Unterminated(tag) => format!("unterminated-{}", tag),
            DiagnosticKind::NotIterable => "not-iterable".to_string(),
            DiagnosticKind::TemplateNotFound => "template-not-found".to_string(),
            DiagnosticKind::InvalidAssetKind => "invalid-asset-kind".to_string(),
            DiagnosticKind::AssetPathInvalid => "asset-path-invalid".to_string(),
            DiagnosticKind::AssetKindConflict => "asset-kind-conflict".to_string(),
            DiagnosticKind::AssetReadFailed => "asset-read-failed".to_string(),
            DiagnosticKind::FilterTypeMismatch => "filter-type-mismatch".to_string(),
            DiagnosticKind::FilterArgument => "filter-argument".to_string(),
            DiagnosticKind::MalformedTag => "malformed-tag".to_string(),
            DiagnosticKind::RecursionLimit => "recursion-limit".to_string(),
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for DiagnosticKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// A single render fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Byte offset into the source being rendered, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            offset: None,
        }
    }

    /// Attach a source offset
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{}: {} (at byte {})", self.kind, self.message, offset),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}
