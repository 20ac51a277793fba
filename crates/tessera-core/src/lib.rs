//! Tessera Core: Value model, diagnostics and document records
//!
//! Shared types for the template rendering core. The engine itself lives in
//! `tessera-render`; this crate only carries the data that flows through it
//! and the records a host reads back after a render.

pub mod value;
pub mod diagnostic;
pub mod document;
pub mod error;

pub use value::{HostObject, Kind, Map, Value};
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use document::{DocumentTag, Location, MetaTag, TagKind};
pub use error::{ConfigError, LoadError};

/// Engine version string
pub const TESSERA_VERSION: &str = "1.0.0";
