//! Engine options.

use crate::syntax::Syntax;
use serde::Deserialize;
use tessera_core::Location;

/// Default nesting limit for recursive renders
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default cap on fragment renders within one top-level render
pub const DEFAULT_RENDER_BUDGET: usize = 100_000;

/// Tunables read from the `engine:` section of the site configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Template delimiters
    pub syntax: Syntax,
    /// Maximum nesting of recursive renders before giving up on a fragment
    pub max_depth: usize,
    /// Total fragment renders allowed per top-level render, loop bodies and
    /// nested renders included
    pub render_budget: usize,
    /// Placement of `js` / `js-inline` assets without `location=`
    pub default_script_location: Location,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            syntax: Syntax::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            render_budget: DEFAULT_RENDER_BUDGET,
            default_script_location: Location::PreFooter,
        }
    }
}
