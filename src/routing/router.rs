//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Look up the first matching route for a pathname
//! - Expose every matching route, in order, for resolution fallthrough
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) prefix scan (acceptable for typical route counts)
//! - No precedence beyond declaration order; overlapping prefixes are a
//!   configuration concern

use std::sync::Arc;

use crate::config::{RouteConfig, RouteKind};
use crate::routing::matcher::{Matcher, SegmentPrefixMatcher};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub kind: RouteKind,
    /// Tenant directory (SSR) or probing root (conventional) below the
    /// projects root.
    pub name: String,
    /// URL part stripped before segmenting.
    pub base: String,
    matcher: Box<dyn Matcher>,
}

impl Route {
    pub fn new(kind: RouteKind, matcher: Box<dyn Matcher>, name: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into().trim_matches('/').to_string(),
            base: base.into(),
            matcher,
        }
    }

    pub fn from_config(config: &RouteConfig) -> Self {
        let base = config.base.clone().unwrap_or_else(|| config.prefix.clone());
        Self::new(
            config.kind,
            Box::new(SegmentPrefixMatcher::new(&config.prefix)),
            &config.name,
            base.trim_end_matches('/'),
        )
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    /// Remove the base from the front of `path`, ignoring ASCII case.
    /// Returns the path unchanged when it does not start with the base.
    pub fn strip_base<'a>(&self, path: &'a str) -> &'a str {
        match path.get(..self.base.len()) {
            Some(head) if head.eq_ignore_ascii_case(&self.base) => &path[self.base.len()..],
            _ => path,
        }
    }
}

/// Ordered route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: routes.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_config(configs: &[RouteConfig]) -> Self {
        Self::new(configs.iter().map(Route::from_config).collect())
    }

    /// First route whose matcher accepts `path`.
    pub fn match_path(&self, path: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|r| r.matches(path))
    }

    /// Every route accepting `path`, in declaration order.
    pub fn candidates<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Arc<Route>> + 'a {
        self.routes.iter().filter(move |r| r.matches(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
