//! Render Context: per-render state shared through recursion
//!
//! A [`Context`] reads variables through a chain of scopes: each clone owns
//! only its overlay and shares the parent's layers. Every side-effect
//! collection is shared with the contexts cloned from it. Loop bodies and included
//! fragments see their overlay variables, while block definitions, asset
//! registrations, document tags and diagnostics flow back to the top-level
//! render.
//!
//! Contexts are single-threaded (`Rc`/`RefCell`). Parallel renders each
//! build their own.

use crate::engine::Engine;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tessera_core::{Diagnostic, DocumentTag, LoadError, Map, MetaTag, Value};
use tracing::{debug, trace};

/// Request-scoped information a host can expose to tags
pub trait RequestHint: fmt::Debug + Send + Sync {
    /// Host name the request was made for
    fn host(&self) -> &str;

    /// Request-scoped value by key
    fn value(&self, _key: &str) -> Option<Value> {
        None
    }
}

/// A plain [`RequestHint`] built from a host name and a value map
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub host: String,
    pub values: Map,
}

impl RequestInfo {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            values: Map::new(),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }
}

impl RequestHint for RequestInfo {
    fn host(&self) -> &str {
        &self.host
    }

    fn value(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }
}

/// Collections shared by a context and every clone of it
#[derive(Debug, Default)]
struct SideEffects {
    blocks: RefCell<HashMap<String, String>>,
    template_cache: RefCell<HashMap<String, String>>,
    imported_assets: RefCell<HashSet<String>>,
    document_tags: RefCell<Vec<DocumentTag>>,
    meta_tags: RefCell<Vec<MetaTag>>,
    errors: RefCell<Vec<Diagnostic>>,
    depth: Cell<usize>,
    /// Fragments rendered so far
    renders: Cell<usize>,
    /// Set once a limit is hit; no further fragments render
    halted: Cell<bool>,
}

/// One layer of variables; misses fall through to the parent
#[derive(Debug)]
struct Scope {
    vars: Map,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    fn get(&self, key: &str) -> Option<&Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.vars.get(key) {
                return Some(value);
            }
            scope = scope.parent.as_deref()?;
        }
    }
}

/// Per-render state
pub struct Context {
    scope: Rc<Scope>,
    effects: Rc<SideEffects>,
    engine: Arc<Engine>,
    request: Option<Arc<dyn RequestHint>>,
}

/// Decrements the render depth when dropped
pub struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl Context {
    /// Fresh context with empty side-effect collections
    pub fn new(data: Map, engine: Arc<Engine>) -> Self {
        Self {
            scope: Rc::new(Scope { vars: data, parent: None }),
            effects: Rc::new(SideEffects::default()),
            engine,
            request: None,
        }
    }

    pub fn with_request(mut self, request: Arc<dyn RequestHint>) -> Self {
        self.request = Some(request);
        self
    }

    /// New context over `data ∪ overlay`, sharing all side effects
    ///
    /// Overlay keys shadow the parent's. The parent's variables are shared,
    /// not copied; only the overlay is owned by the new context.
    pub fn clone_with(&self, overlay: Map) -> Self {
        let scope = if overlay.is_empty() {
            Rc::clone(&self.scope)
        } else {
            Rc::new(Scope {
                vars: overlay,
                parent: Some(Rc::clone(&self.scope)),
            })
        };
        Self {
            scope,
            effects: Rc::clone(&self.effects),
            engine: Arc::clone(&self.engine),
            request: self.request.clone(),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Top-level variable, searching overlays innermost first
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.scope.get(key)
    }

    /// True when both contexts read the same variable layers
    pub fn shares_data_with(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.scope, &other.scope)
    }

    pub fn request(&self) -> Option<&Arc<dyn RequestHint>> {
        self.request.as_ref()
    }

    /// Host name from the request hint, empty when there is none
    pub fn host(&self) -> &str {
        self.request.as_deref().map_or("", |r| r.host())
    }

    /// Dot-notation lookup into the data namespace
    ///
    /// Dead ends and empty path components resolve to null.
    pub fn lookup(&self, path: &str) -> Value {
        let mut parts = path.split('.');
        match parts.next() {
            Some(first) if !first.is_empty() => match self.get(first) {
                Some(value) => descend(value, parts),
                None => Value::Null,
            },
            _ => Value::Null,
        }
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Store a raw block body; a later definition replaces an earlier one
    pub fn define_block(&self, name: &str, body: &str) {
        trace!(block = name, "defining block");
        self.effects.blocks.borrow_mut().insert(name.to_string(), body.to_string());
    }

    pub fn block(&self, name: &str) -> Option<String> {
        self.effects.blocks.borrow().get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    /// Fetch a template through the cache, loading it on first use
    pub fn load_template(&self, name: &str) -> Result<String, LoadError> {
        if let Some(source) = self.effects.template_cache.borrow().get(name) {
            return Ok(source.clone());
        }

        debug!(template = name, host = self.host(), "loading template");
        let source = self.engine.loader().load(name, self.host())?;
        self.effects
            .template_cache
            .borrow_mut()
            .insert(name.to_string(), source.clone());
        Ok(source)
    }

    pub fn is_template_cached(&self, name: &str) -> bool {
        self.effects.template_cache.borrow().contains_key(name)
    }

    // ------------------------------------------------------------------
    // Assets and document tags
    // ------------------------------------------------------------------

    pub fn has_asset(&self, key: &str) -> bool {
        self.effects.imported_assets.borrow().contains(key)
    }

    /// Record an asset key; false if it was already present
    pub fn import_asset(&self, key: &str) -> bool {
        self.effects.imported_assets.borrow_mut().insert(key.to_string())
    }

    pub fn imported_assets(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.effects.imported_assets.borrow().iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn push_document_tag(&self, tag: DocumentTag) {
        debug!(name = %tag.name, priority = tag.priority, "registering document tag");
        self.effects.document_tags.borrow_mut().push(tag);
    }

    pub fn document_tags(&self) -> Vec<DocumentTag> {
        self.effects.document_tags.borrow().clone()
    }

    pub fn push_meta_tag(&self, tag: MetaTag) {
        self.effects.meta_tags.borrow_mut().push(tag);
    }

    pub fn meta_tags(&self) -> Vec<MetaTag> {
        self.effects.meta_tags.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn report(&self, diagnostic: Diagnostic) {
        trace!(%diagnostic, "render diagnostic");
        self.effects.errors.borrow_mut().push(diagnostic);
    }

    pub fn report_all(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.effects.errors.borrow().clone()
    }

    pub fn error_count(&self) -> usize {
        self.effects.errors.borrow().len()
    }

    /// Diagnostics appended after the first `start`
    pub fn errors_since(&self, start: usize) -> Vec<Diagnostic> {
        self.effects
            .errors
            .borrow()
            .get(start..)
            .map(<[Diagnostic]>::to_vec)
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Recursion depth
    // ------------------------------------------------------------------

    /// Enter one level of rendering; `None` once `max` levels are active
    pub fn enter(&self, max: usize) -> Option<DepthGuard<'_>> {
        let depth = &self.effects.depth;
        if depth.get() >= max {
            return None;
        }
        depth.set(depth.get() + 1);
        Some(DepthGuard { depth })
    }

    pub fn depth(&self) -> usize {
        self.effects.depth.get()
    }

    // ------------------------------------------------------------------
    // Render budget
    // ------------------------------------------------------------------

    /// Count one fragment render; `false` once more than `budget` have run
    pub fn count_render(&self, budget: usize) -> bool {
        let renders = self.effects.renders.get() + 1;
        self.effects.renders.set(renders);
        renders <= budget
    }

    pub fn render_count(&self) -> usize {
        self.effects.renders.get()
    }

    /// Stop all further rendering, reporting `diagnostic` unless already halted
    pub fn halt(&self, diagnostic: Diagnostic) {
        if self.effects.halted.replace(true) {
            return;
        }
        debug!(%diagnostic, "render halted");
        self.report(diagnostic);
    }

    pub fn is_halted(&self) -> bool {
        self.effects.halted.get()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("vars", &self.scope.vars)
            .field("host", &self.host())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// Resolve `a.b.c` against a mapping
pub fn lookup_path(data: &Map, path: &str) -> Value {
    let mut parts = path.split('.');
    match parts.next() {
        Some(first) if !first.is_empty() => match data.get(first) {
            Some(value) => descend(value, parts),
            None => Value::Null,
        },
        _ => Value::Null,
    }
}

fn descend<'a>(mut current: &Value, parts: impl Iterator<Item = &'a str>) -> Value {
    for key in parts {
        if key.is_empty() {
            return Value::Null;
        }
        current = match current.get(key) {
            Some(value) => value,
            None => return Value::Null,
        };
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_core::value::map_from_json;

    fn context(data: serde_json::Value) -> Context {
        Context::new(map_from_json(data), Arc::new(Engine::standard()))
    }

    #[test]
    fn test_lookup_path() {
        let ctx = context(json!({ "user": { "name": "Ada", "tags": ["x"] }, "n": 3 }));
        assert_eq!(ctx.lookup("user.name"), Value::from("Ada"));
        assert_eq!(ctx.lookup("user.missing"), Value::Null);
        assert_eq!(ctx.lookup("n.deeper"), Value::Null);
        assert_eq!(ctx.lookup("user.tags.0"), Value::Null);
        assert_eq!(ctx.lookup(""), Value::Null);
        assert_eq!(ctx.lookup("user..name"), Value::Null);
    }

    #[test]
    fn test_clone_shares_side_effects() {
        let parent = context(json!({ "a": 1, "b": 2 }));
        let mut overlay = Map::new();
        overlay.insert("b".to_string(), Value::from("shadow"));
        let child = parent.clone_with(overlay);

        assert_eq!(child.lookup("a"), Value::Int(1));
        assert_eq!(child.lookup("b"), Value::from("shadow"));
        assert_eq!(parent.lookup("b"), Value::Int(2));

        child.define_block("body", "<p>x</p>");
        child.import_asset("/assets/a.css|css");
        child.report(Diagnostic::new(tessera_core::DiagnosticKind::UnknownTag, "x"));

        assert_eq!(parent.block("body").as_deref(), Some("<p>x</p>"));
        assert!(parent.has_asset("/assets/a.css|css"));
        assert_eq!(parent.error_count(), 1);
    }

    #[test]
    fn test_clone_shares_parent_variables() {
        let parent = context(json!({ "items": (0..1000).collect::<Vec<_>>() }));
        let same = parent.clone_with(Map::new());
        assert!(same.shares_data_with(&parent));

        let mut overlay = Map::new();
        overlay.insert("item".to_string(), Value::Int(7));
        let child = parent.clone_with(overlay);
        assert!(!child.shares_data_with(&parent));
        assert_eq!(child.lookup("item"), Value::Int(7));
        assert_eq!(child.get("items").and_then(Value::as_seq).map(<[Value]>::len), Some(1000));
        assert!(parent.get("item").is_none());

        let mut inner = Map::new();
        inner.insert("item".to_string(), Value::Int(8));
        let grandchild = child.clone_with(inner);
        assert_eq!(grandchild.lookup("item"), Value::Int(8));
        assert_eq!(child.lookup("item"), Value::Int(7));
    }

    #[test]
    fn test_halt_reports_once() {
        let ctx = context(json!({}));
        assert!(ctx.count_render(2));
        assert!(ctx.count_render(2));
        assert!(!ctx.count_render(2));
        assert!(!ctx.is_halted());

        let child = ctx.clone_with(Map::new());
        child.halt(Diagnostic::new(tessera_core::DiagnosticKind::RecursionLimit, "budget"));
        ctx.halt(Diagnostic::new(tessera_core::DiagnosticKind::RecursionLimit, "again"));
        assert!(ctx.is_halted());
        assert_eq!(ctx.error_count(), 1);
        assert_eq!(ctx.render_count(), 3);
    }

    #[test]
    fn test_block_redefinition_overwrites() {
        let ctx = context(json!({}));
        ctx.define_block("a", "first");
        ctx.define_block("a", "second");
        assert_eq!(ctx.block("a").as_deref(), Some("second"));
    }

    #[test]
    fn test_depth_guard() {
        let ctx = context(json!({}));
        {
            let _one = ctx.enter(2).unwrap();
            let _two = ctx.enter(2).unwrap();
            assert!(ctx.enter(2).is_none());
            assert_eq!(ctx.depth(), 2);
        }
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_errors_since() {
        let ctx = context(json!({}));
        ctx.report(Diagnostic::new(tessera_core::DiagnosticKind::UnknownTag, "a"));
        let start = ctx.error_count();
        ctx.report(Diagnostic::new(tessera_core::DiagnosticKind::UnknownFilter, "b"));
        let since = ctx.errors_since(start);
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].message, "b");
    }

    #[test]
    fn test_request_info() {
        let request = RequestInfo::new("example.com").with_value("path", "/about");
        let ctx = context(json!({})).with_request(Arc::new(request));
        assert_eq!(ctx.host(), "example.com");
        assert_eq!(ctx.request().and_then(|r| r.value("path")), Some(Value::from("/about")));
    }
}
