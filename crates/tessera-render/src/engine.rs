//! Engine driver.
//!
//! The engine streams over the source once, copying literal text and
//! dispatching `{{ }}`, `{% %}` and `{# #}` constructs as it meets them.
//! There is no parse tree: block tags seek their own terminators and call
//! back into [`Engine::render_into`] for their bodies.
//!
//! An [`Engine`] is immutable after construction and may be shared across
//! threads behind an `Arc`. Each render gets its own [`Context`].

use crate::context::{Context, RequestHint};
use crate::filters::FilterMap;
use crate::loader::{read_below, MemoryLoader, TemplateLoader};
use crate::options::EngineOptions;
use crate::resolver::{self, Resolved};
use crate::sanitize::{Sanitizer, UgcPolicy, UGC};
use crate::site::SiteRegistry;
use crate::syntax::{tokenize, Sentinel, Syntax};
use crate::tags::TagMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::document::sorted_by_priority;
use tessera_core::{Diagnostic, DiagnosticKind, DocumentTag, LoadError, Location, Map, MetaTag, Value};
use tracing::debug;

/// Yields the site root directory for a host
pub type SiteRootFn = Arc<dyn Fn(&str) -> Option<PathBuf> + Send + Sync>;

/// Tag and filter registries plus the collaborators renders need
pub struct Engine {
    tags: TagMap,
    filters: FilterMap,
    options: EngineOptions,
    loader: Arc<dyn TemplateLoader>,
    site_root: Option<SiteRootFn>,
    sanitizer: Arc<dyn Sanitizer>,
}

impl Engine {
    /// Engine over the given registries, default options, no templates
    pub fn new(tags: TagMap, filters: FilterMap) -> Self {
        let policy: Arc<UgcPolicy> = Arc::clone(&*UGC);
        Self {
            tags,
            filters,
            options: EngineOptions::default(),
            loader: Arc::new(MemoryLoader::new()),
            site_root: None,
            sanitizer: policy,
        }
    }

    /// Engine with every built-in tag and filter
    pub fn standard() -> Self {
        Self::new(TagMap::standard(), FilterMap::standard())
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn TemplateLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_site_root(mut self, site_root: SiteRootFn) -> Self {
        self.site_root = Some(site_root);
        self
    }

    /// Use a site registry for both templates and inline asset reads
    pub fn with_sites(self, sites: Arc<SiteRegistry>) -> Self {
        let roots = Arc::clone(&sites);
        self.with_loader(sites)
            .with_site_root(Arc::new(move |host: &str| roots.site_root(host)))
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn syntax(&self) -> &Syntax {
        &self.options.syntax
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn filters(&self) -> &FilterMap {
        &self.filters
    }

    pub fn sanitizer(&self) -> &Arc<dyn Sanitizer> {
        &self.sanitizer
    }

    pub fn loader(&self) -> &Arc<dyn TemplateLoader> {
        &self.loader
    }

    /// Render `source`, returning the output and the diagnostics it raised
    pub fn render(&self, source: &str, ctx: &Context) -> (String, Vec<Diagnostic>) {
        let start = ctx.error_count();
        let mut out = String::with_capacity(source.len());
        self.render_into(source, ctx, &mut out);
        (out, ctx.errors_since(start))
    }

    /// Render `source` onto `out`, reporting diagnostics to `ctx`
    pub fn render_into(&self, source: &str, ctx: &Context, out: &mut String) {
        if ctx.is_halted() {
            return;
        }
        if !ctx.count_render(self.options.render_budget) {
            ctx.halt(Diagnostic::new(
                DiagnosticKind::RecursionLimit,
                format!("more than {} fragment renders", self.options.render_budget),
            ));
            return;
        }
        let Some(_guard) = ctx.enter(self.options.max_depth) else {
            ctx.halt(Diagnostic::new(
                DiagnosticKind::RecursionLimit,
                format!("nesting deeper than {} renders", self.options.max_depth),
            ));
            return;
        };

        let syntax = self.syntax();
        let mut pos = 0;

        while let Some((start, sentinel)) = syntax.next_sentinel(source, pos) {
            out.push_str(&source[pos..start]);
            let open_len = syntax.open(sentinel).len();

            let Some((inner_end, after)) = syntax.find_close(source, start, sentinel) else {
                ctx.report(unclosed(sentinel).at(start));
                pos = start + open_len;
                continue;
            };
            let inner = &source[start + open_len..inner_end];

            pos = match sentinel {
                Sentinel::Comment => after,
                Sentinel::Variable => {
                    self.write_variable(inner.trim(), ctx, out);
                    after
                }
                Sentinel::Tag => self.dispatch_tag(inner, ctx, out, source, start, after),
            };
        }

        out.push_str(&source[pos..]);
    }

    fn write_variable(&self, expr: &str, ctx: &Context, out: &mut String) {
        let Resolved { value, diagnostics, .. } = self.resolve(ctx, expr);
        ctx.report_all(diagnostics);
        match value {
            Value::Null => {}
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => out.push_str(&value.to_text()),
            other => out.push_str(&self.sanitizer.sanitize(&other.to_text())),
        }
    }

    fn dispatch_tag(&self, inner: &str, ctx: &Context, out: &mut String, source: &str, start: usize, after: usize) -> usize {
        let tokens = tokenize(inner);
        let Some((name, args)) = tokens.split_first() else {
            ctx.report(Diagnostic::new(DiagnosticKind::UnknownTag, "empty tag").at(start));
            return after;
        };
        let Some(tag) = self.tags.get(name) else {
            ctx.report(Diagnostic::new(DiagnosticKind::UnknownTag, format!("no tag named '{}'", name)).at(start));
            return after;
        };

        let outcome = tag.render(ctx, out, args, source, after);
        ctx.report_all(outcome.diagnostics);
        outcome.next.max(after)
    }

    /// Resolve an expression with this engine's filters and sanitizer
    pub fn resolve(&self, ctx: &Context, expr: &str) -> Resolved {
        resolver::resolve(self, ctx, expr)
    }

    /// Clone `ctx` with `overlay` layered over its data, sharing side effects
    pub fn clone_context(&self, ctx: &Context, overlay: Map) -> Context {
        ctx.clone_with(overlay)
    }

    /// Read a file below the site root for `host`
    pub fn read_site_file(&self, host: &str, relative: &str) -> Result<String, LoadError> {
        let root = self
            .site_root
            .as_ref()
            .and_then(|site_root| site_root(host))
            .ok_or_else(|| LoadError::UnknownHost(host.to_string()))?;
        debug!(host, file = relative, "reading site file");
        read_below(&root, relative)
    }

    /// Render a full page: body plus the deferred head and pre-footer tags
    pub fn render_document(
        engine: &Arc<Engine>,
        source: &str,
        data: Map,
        request: Option<Arc<dyn RequestHint>>,
    ) -> Document {
        Document::render(engine, source, data, request)
    }
}

fn unclosed(sentinel: Sentinel) -> Diagnostic {
    let (kind, what) = match sentinel {
        Sentinel::Variable => (DiagnosticKind::UnclosedVariable, "variable"),
        Sentinel::Tag => (DiagnosticKind::UnclosedTag, "tag"),
        Sentinel::Comment => (DiagnosticKind::UnclosedComment, "comment"),
    };
    Diagnostic::new(kind, format!("{} is never closed", what))
}

/// A rendered page and the records the host assembles around it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub body: String,
    pub head: Vec<DocumentTag>,
    pub pre_footer: Vec<DocumentTag>,
    pub meta: Vec<MetaTag>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Document {
    pub fn render(
        engine: &Arc<Engine>,
        source: &str,
        data: Map,
        request: Option<Arc<dyn RequestHint>>,
    ) -> Self {
        let mut ctx = Context::new(data, Arc::clone(engine));
        if let Some(request) = request {
            ctx = ctx.with_request(request);
        }

        let (body, diagnostics) = engine.render(source, &ctx);
        let (head, pre_footer): (Vec<DocumentTag>, Vec<DocumentTag>) = ctx
            .document_tags()
            .into_iter()
            .partition(|tag| tag.location == Location::Head);

        Self {
            body,
            head,
            pre_footer,
            meta: ctx.meta_tags(),
            diagnostics,
        }
    }

    /// Meta tags, then head tags by ascending priority
    pub fn render_head(&self) -> String {
        let meta = self.meta.iter().map(MetaTag::to_html);
        let tags = sorted_by_priority(&self.head).into_iter().map(DocumentTag::to_html);
        meta.chain(tags).collect::<Vec<_>>().join("\n")
    }

    /// Pre-footer tags by ascending priority
    pub fn render_pre_footer(&self) -> String {
        sorted_by_priority(&self.pre_footer)
            .into_iter()
            .map(DocumentTag::to_html)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
