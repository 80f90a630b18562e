//! Development multiplexer.
//!
//! # Data Flow
//! ```text
//! first dev request for a tenant
//!     → registry.rs (one OnceCell per tenant, port allocation)
//!     → overrides.rs (baseline ← generated ← tenant override file)
//!     → capability.rs (DevCapability::create)
//!         command.rs:  external build-and-watch process
//!         loader only: module loading, no asset server
//!     → DevInstanceHandle (cached for the process lifetime)
//!
//! /<asset prefix>/<tenant>/__/…
//!     → tenant_from_asset_path → cached handle → DevInstance::handle
//! ```

pub mod capability;
pub mod command;
pub mod overrides;
pub mod registry;

pub use capability::{DevCapability, DevInstance, DevInstanceHandle, DevInstanceOptions, LoaderOnlyCapability};
pub use command::CommandDevCapability;
pub use registry::DevRegistry;

const TENANT_TERMINATOR: &str = "/__/";

/// Tenant named by a dev asset path `/<prefix>/<tenant>/__/…`, matched
/// lazily up to the first `/__/`. The prefix compares case-insensitively.
pub fn tenant_from_asset_path<'a>(path: &'a str, asset_prefix: &str) -> Option<&'a str> {
    let head_len = asset_prefix.len() + 2;
    let head = path.get(..head_len)?;
    let expected = format!("/{}/", asset_prefix);
    if !head.eq_ignore_ascii_case(&expected) {
        return None;
    }

    let rest = &path[head_len..];
    // `.+?` semantics: at least one character before the terminator.
    let end = rest.get(1..)?.find(TENANT_TERMINATOR)? + 1;
    Some(&rest[..end])
}

/// Tenant named by a hot-reload socket path
/// `/<prefix>/<tenant>/__/<hmr path>…`.
pub fn tenant_from_hmr_path<'a>(path: &'a str, asset_prefix: &str, hmr_path: &str) -> Option<&'a str> {
    let tenant = tenant_from_asset_path(path, asset_prefix)?;
    let after = &path[asset_prefix.len() + 2 + tenant.len() + TENANT_TERMINATOR.len()..];
    let hmr = hmr_path.trim_matches('/');
    match after.get(..hmr.len()) {
        Some(head) if head.eq_ignore_ascii_case(hmr) => Some(tenant),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_from_asset_path() {
        assert_eq!(tenant_from_asset_path("/__dev__/blog/__/src/main.ts", "__dev__"), Some("blog"));
        assert_eq!(tenant_from_asset_path("/__DEV__/blog/__/x", "__dev__"), Some("blog"));
        assert_eq!(
            tenant_from_asset_path("/__dev__/sites/docs/__/@vite/client", "__dev__"),
            Some("sites/docs")
        );
        assert_eq!(tenant_from_asset_path("/__dev__/blog/__/a/__/b", "__dev__"), Some("blog"));
        assert_eq!(tenant_from_asset_path("/__dev__/blog", "__dev__"), None);
        assert_eq!(tenant_from_asset_path("/__dev__//__/x", "__dev__"), None);
        assert_eq!(tenant_from_asset_path("/blog/__/x", "__dev__"), None);
    }

    #[test]
    fn test_tenant_from_hmr_path() {
        assert_eq!(tenant_from_hmr_path("/__dev__/blog/__/__ws__", "__dev__", "__ws__"), Some("blog"));
        assert_eq!(tenant_from_hmr_path("/__dev__/blog/__/__ws__?token=1", "__dev__", "/__ws__"), Some("blog"));
        assert_eq!(tenant_from_hmr_path("/__dev__/blog/__/src/main.ts", "__dev__", "__ws__"), None);
    }
}
