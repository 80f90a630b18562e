//! Resolved project descriptions.

use std::path::PathBuf;
use std::sync::Arc;

use crate::routing::Route;

/// The tenant a request resolved to.
#[derive(Debug, Clone)]
pub struct Tenant {
    /// Tenant identifier, its directory relative to the projects root.
    pub name: String,
    /// Absolute tenant directory.
    pub dir: PathBuf,
    /// Route the tenant was reached through.
    pub route: Arc<Route>,
}

/// SSR tenant whose entry and template exist.
#[derive(Debug, Clone)]
pub struct SsrProject {
    pub tenant: Tenant,
    pub entry: PathBuf,
    pub template: PathBuf,
    /// May be missing; it is parsed only when present.
    pub manifest: PathBuf,
}

/// Controller action whose module file exists.
#[derive(Debug, Clone)]
pub struct ConventionalProject {
    pub tenant: Tenant,
    /// Controller name as it appeared in the URL.
    pub controller: String,
    pub controller_path: PathBuf,
    /// Member name as it appeared in the URL, before casing fallbacks.
    pub method: String,
}

/// Raw page in a tenant without a controller holder directory.
#[derive(Debug, Clone)]
pub struct StaticAsset {
    pub tenant: Tenant,
    pub file_path: PathBuf,
    /// Path of the page relative to the tenant directory.
    pub file_name: String,
}

/// A fully validated resolution result.
#[derive(Debug, Clone)]
pub enum ProjectInfo {
    Ssr(SsrProject),
    Conventional(ConventionalProject),
    Static(StaticAsset),
}

impl ProjectInfo {
    pub fn tenant(&self) -> &Tenant {
        match self {
            ProjectInfo::Ssr(p) => &p.tenant,
            ProjectInfo::Conventional(p) => &p.tenant,
            ProjectInfo::Static(p) => &p.tenant,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProjectInfo::Ssr(_) => "ssr",
            ProjectInfo::Conventional(_) => "conventional",
            ProjectInfo::Static(_) => "static",
        }
    }
}
