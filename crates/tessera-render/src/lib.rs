//! Tessera Render: the template rendering core
//!
//! A streaming template engine for multi-tenant sites. Templates mix
//! literal text with three constructs:
//!
//! - `{{ expr | filter: arg }}` variables
//! - `{% tag args %}` tags (`if`, `for`, `define`, `block`, `render`,
//!   `include`, `verbatim`, `asset`, `meta`)
//! - `{# comment #}` comments
//!
//! Rendering never fails. Faults become [`Diagnostic`]s on the context and
//! the offending construct renders as nothing.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_render::{Context, Engine};
//! use tessera_core::value::map_from_json;
//!
//! let engine = Arc::new(Engine::standard());
//! let ctx = Context::new(map_from_json(serde_json::json!({ "name": "Alice" })), Arc::clone(&engine));
//! let (out, diagnostics) = engine.render("Hello {{ name }}!", &ctx);
//! assert_eq!(out, "Hello Alice!");
//! assert!(diagnostics.is_empty());
//! ```

pub mod syntax;
pub mod seek;
pub mod sanitize;
pub mod filters;
pub mod resolver;
pub mod context;
pub mod tags;
pub mod loader;
pub mod options;
pub mod site;
pub mod engine;

pub use context::{Context, RequestHint, RequestInfo};
pub use engine::{Document, Engine, SiteRootFn};
pub use filters::{Filter, FilterError, FilterMap};
pub use loader::{MemoryLoader, TemplateLoader};
pub use options::EngineOptions;
pub use resolver::Resolved;
pub use sanitize::{Sanitizer, UgcPolicy, UGC};
pub use site::{Site, SiteConfig, SiteRegistry};
pub use syntax::Syntax;
pub use tags::{Tag, TagMap, TagOutcome};

pub use tessera_core::{Diagnostic, DiagnosticKind, Kind, Map, Value};
