//! Project resolution.
//!
//! # Responsibilities
//! - Walk the routes matching a pathname in declaration order
//! - Validate SSR tenants (entry + template on disk)
//! - Segment conventional URLs into tenant / controller / method
//! - Decide between controller dispatch and raw static pages
//!
//! # Design Decisions
//! - Total: a fully validated ProjectInfo or None, never a partial result
//! - A route that does not resolve falls through to the next matching route
//! - Nothing is cached; every call reflects the filesystem at call time

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{LayoutConfig, Mode, RouteKind};
use crate::project::info::{ConventionalProject, ProjectInfo, SsrProject, StaticAsset, Tenant};
use crate::routing::{segment, split_path, Route, RouteTable};

/// Turns pathnames into validated projects.
#[derive(Debug)]
pub struct ProjectResolver {
    routes: Arc<RouteTable>,
    root: PathBuf,
    layout: LayoutConfig,
    mode: Mode,
}

impl ProjectResolver {
    pub fn new(routes: Arc<RouteTable>, root: impl Into<PathBuf>, layout: LayoutConfig, mode: Mode) -> Self {
        Self {
            routes,
            root: root.into(),
            layout,
            mode,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub async fn resolve(&self, pathname: &str) -> Option<ProjectInfo> {
        if pathname.split('/').any(|s| s == "..") {
            return None;
        }

        for route in self.routes.candidates(pathname) {
            let resolved = match route.kind {
                RouteKind::Ssr => self.resolve_ssr(route).await,
                RouteKind::Conventional => self.resolve_conventional(route, pathname).await,
            };

            if resolved.is_some() {
                return resolved;
            }

            tracing::debug!(route = %route.name, path = %pathname, "Route did not resolve, trying next");
        }

        None
    }

    async fn resolve_ssr(&self, route: &Arc<Route>) -> Option<ProjectInfo> {
        let dir = self.root.join(&route.name);

        let entry_name = match self.mode {
            Mode::Production => &self.layout.ssr_entry_production,
            Mode::Development => &self.layout.ssr_entry_development,
        };
        let entry = dir.join(entry_name);
        let template = dir.join(&self.layout.ssr_template);
        let manifest = dir.join(&self.layout.ssr_manifest);

        if !is_file(&entry).await || !is_file(&template).await {
            return None;
        }

        Some(ProjectInfo::Ssr(SsrProject {
            tenant: Tenant {
                name: route.name.clone(),
                dir,
                route: route.clone(),
            },
            entry,
            template,
            manifest,
        }))
    }

    async fn resolve_conventional(&self, route: &Arc<Route>, pathname: &str) -> Option<ProjectInfo> {
        if pathname == "/" {
            return None;
        }

        let probe_root = self.root.join(&route.name);
        let parts = split_path(route.strip_base(pathname));
        let segments = segment(&probe_root, &parts).await;

        let name = join_name(&route.name, &segments.dir_name());
        if name.is_empty() {
            return None;
        }

        let tenant = Tenant {
            name,
            dir: segments.dir_path(&probe_root),
            route: route.clone(),
        };

        let holder = tenant.dir.join(&self.layout.controller_dir);
        let holder_exists = is_dir(&holder).await;

        if let Some(file_name) = self.static_file_name(segments.next.as_deref(), &segments.tail) {
            if holder_exists {
                return None;
            }

            let file_path = tenant.dir.join(&file_name);
            if !is_file(&file_path).await {
                return None;
            }

            return Some(ProjectInfo::Static(StaticAsset {
                tenant,
                file_path,
                file_name,
            }));
        }

        let controller = segments
            .next
            .unwrap_or_else(|| self.layout.default_controller.clone());
        let method = segments
            .tail
            .first()
            .cloned()
            .unwrap_or_else(|| self.layout.default_action.clone());

        let controller_path = holder.join(format!("{}.{}", controller, self.layout.controller_extension));
        if !is_file(&controller_path).await {
            return None;
        }

        if method.starts_with(&self.layout.hidden_marker) {
            return None;
        }

        Some(ProjectInfo::Conventional(ConventionalProject {
            tenant,
            controller,
            controller_path,
            method,
        }))
    }

    /// `next/tail...` cut after the first segment carrying the static suffix,
    /// or None when no segment carries it.
    fn static_file_name(&self, next: Option<&str>, tail: &[String]) -> Option<String> {
        let suffix = &self.layout.static_suffix;
        let mut parts = Vec::new();

        for part in next.into_iter().chain(tail.iter().map(String::as_str)) {
            parts.push(part);
            if ends_with_ignore_case(part, suffix) {
                return Some(parts.join("/"));
            }
        }

        None
    }
}

fn join_name(route_name: &str, sub: &str) -> String {
    match (route_name.is_empty(), sub.is_empty()) {
        (true, _) => sub.to_string(),
        (false, true) => route_name.to_string(),
        (false, false) => format!("{}/{}", route_name, sub),
    }
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool {
    value.len() >= suffix.len()
        && value
            .get(value.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(suffix))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use std::fs;

    fn route(kind: RouteKind, prefix: &str, name: &str, base: &str) -> RouteConfig {
        RouteConfig {
            kind,
            prefix: prefix.to_string(),
            name: name.to_string(),
            base: Some(base.to_string()),
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn resolver(root: &Path, routes: &[RouteConfig], mode: Mode) -> ProjectResolver {
        ProjectResolver::new(
            Arc::new(RouteTable::from_config(routes)),
            root,
            LayoutConfig::default(),
            mode,
        )
    }

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "sites/blog/server/post.js");
        touch(root, "sites/blog/server/index.js");
        touch(root, "sites/docs/intro.html");
        touch(root, "sites/docs/guide/setup.html");
        touch(root, "shop/index.html");
        touch(root, "home/entry-server.ts");
        touch(root, "home/index.html");
        touch(root, "home/server/entry-server.js");
        dir
    }

    fn routes() -> Vec<RouteConfig> {
        vec![
            route(RouteKind::Conventional, "/sites", "sites", "/sites"),
            route(RouteKind::Ssr, "/shop", "shop", "/shop"),
            route(RouteKind::Ssr, "/", "home", ""),
        ]
    }

    #[tokio::test]
    async fn test_controller_method_resolution() {
        let dir = site();
        let resolver = resolver(dir.path(), &routes(), Mode::Development);

        match resolver.resolve("/sites/blog/post/list_all").await {
            Some(ProjectInfo::Conventional(p)) => {
                assert_eq!(p.tenant.name, "sites/blog");
                assert_eq!(p.controller, "post");
                assert_eq!(p.method, "list_all");
                assert_eq!(p.controller_path, dir.path().join("sites/blog/server/post.js"));
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_defaults_for_missing_segments() {
        let dir = site();
        let resolver = resolver(dir.path(), &routes(), Mode::Development);

        let Some(ProjectInfo::Conventional(p)) = resolver.resolve("/sites/blog").await else {
            panic!("expected conventional project");
        };
        assert_eq!(p.controller, "index");
        assert_eq!(p.method, "main");

        let Some(ProjectInfo::Conventional(p)) = resolver.resolve("/sites/blog/post").await else {
            panic!("expected conventional project");
        };
        assert_eq!(p.controller, "post");
        assert_eq!(p.method, "main");
    }

    #[tokio::test]
    async fn test_hidden_method_never_resolves() {
        let dir = site();
        let resolver = resolver(dir.path(), &routes(), Mode::Development);

        // Falls through to the home catch-all instead.
        match resolver.resolve("/sites/blog/post/$secret").await {
            Some(ProjectInfo::Ssr(p)) => assert_eq!(p.tenant.name, "home"),
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_ssr_entry_falls_through() {
        let dir = site();
        let resolver = resolver(dir.path(), &routes(), Mode::Development);

        match resolver.resolve("/shop/cart").await {
            Some(ProjectInfo::Ssr(p)) => {
                assert_eq!(p.tenant.name, "home");
                assert_eq!(p.entry, dir.path().join("home/entry-server.ts"));
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_production_entry_layout() {
        let dir = site();
        let resolver = resolver(dir.path(), &routes(), Mode::Production);

        let Some(ProjectInfo::Ssr(p)) = resolver.resolve("/").await else {
            panic!("expected ssr project");
        };
        assert_eq!(p.entry, dir.path().join("home/server/entry-server.js"));
        assert_eq!(p.manifest, dir.path().join("home/.vite/ssr-manifest.json"));
    }

    #[tokio::test]
    async fn test_static_page_without_controller_holder() {
        let dir = site();
        let resolver = resolver(dir.path(), &routes(), Mode::Development);

        match resolver.resolve("/sites/docs/intro.html").await {
            Some(ProjectInfo::Static(p)) => {
                assert_eq!(p.tenant.name, "sites/docs");
                assert_eq!(p.file_name, "intro.html");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }

        match resolver.resolve("/sites/docs/guide/setup.html").await {
            Some(ProjectInfo::Static(p)) => {
                assert_eq!(p.tenant.name, "sites/docs/guide");
                assert_eq!(p.file_path, dir.path().join("sites/docs/guide/setup.html"));
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_static_suffix_truncates_tail() {
        let dir = site();
        let resolver = resolver(dir.path(), &routes(), Mode::Development);

        match resolver.resolve("/sites/docs/intro.html/extra").await {
            Some(ProjectInfo::Static(p)) => {
                assert_eq!(p.file_name, "intro.html");
                assert_eq!(p.file_path, dir.path().join("sites/docs/intro.html"));
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_static_page_blocked_by_controller_holder() {
        let dir = site();
        touch(dir.path(), "sites/blog/about.html");
        let routes = vec![route(RouteKind::Conventional, "/sites", "sites", "/sites")];
        let resolver = resolver(dir.path(), &routes, Mode::Development);

        assert!(resolver.resolve("/sites/blog/about.html").await.is_none());
    }

    #[tokio::test]
    async fn test_root_url_and_traversal() {
        let dir = site();
        let conventional_only = vec![route(RouteKind::Conventional, "/", "sites", "")];
        let resolver = resolver(dir.path(), &conventional_only, Mode::Development);

        assert!(resolver.resolve("/").await.is_none());
        assert!(resolver.resolve("/blog/../../etc/passwd").await.is_none());
        assert!(resolver.resolve("/blog/post/list").await.is_some());
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let dir = site();
        let resolver = resolver(dir.path(), &routes(), Mode::Development);

        for path in ["/sites/blog/post/x", "/sites/docs/intro.html", "/shop", "/nothing"] {
            let first = format!("{:?}", resolver.resolve(path).await);
            let second = format!("{:?}", resolver.resolve(path).await);
            assert_eq!(first, second, "resolution of {} changed", path);
        }
    }

    #[tokio::test]
    async fn test_unknown_controller_is_a_miss() {
        let dir = site();
        let routes = vec![route(RouteKind::Conventional, "/sites", "sites", "/sites")];
        let resolver = resolver(dir.path(), &routes, Mode::Development);

        assert!(resolver.resolve("/sites/blog/comments/list").await.is_none());
    }
}
