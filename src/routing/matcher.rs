//! Route matching logic.
//!
//! # Responsibilities
//! - Match the request pathname against a route prefix
//! - Respect segment boundaries (`/vue` matches `/vue/x`, not `/vue2`)
//!
//! # Design Decisions
//! - Prefix matching is case-insensitive, like the patterns it replaces
//! - `/` is the catch-all prefix
//! - No regex to guarantee O(n) matching

/// Trait for matching a pathname against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the pathname matches this condition.
    fn matches(&self, path: &str) -> bool;
}

/// Matches a path prefix ending on a segment boundary.
#[derive(Debug, Clone)]
pub struct SegmentPrefixMatcher {
    /// Lowercased prefix without trailing slash. Empty for the catch-all.
    prefix: String,
}

impl SegmentPrefixMatcher {
    /// Create a new segment prefix matcher.
    /// The prefix is normalized to lowercase for case-insensitive matching.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().to_lowercase();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }
}

impl Matcher for SegmentPrefixMatcher {
    fn matches(&self, path: &str) -> bool {
        if self.prefix.is_empty() {
            return path.starts_with('/');
        }

        let Some(head) = path.get(..self.prefix.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return false;
        }

        matches!(path.as_bytes().get(self.prefix.len()), None | Some(b'/'))
    }
}
