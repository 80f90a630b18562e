//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router and wire up middleware (tracing, request ID,
//!   timeout, body limit)
//! - Build the shared state: resolver, dispatcher, dev registry, relay
//! - Walk each request through the serving order below
//! - Bind to a listener and shut down gracefully
//!
//! # Serving Order
//! ```text
//! /<asset prefix>/<tenant>/__/…   dev asset or hot-reload upgrade (dev only);
//!                                 upgrades for unknown tenants are declined
//! api proxy prefix                forwarded upstream
//! static mounts                   plain files
//! resolver → (dev) provisioning → dispatcher
//! not found
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::{
    limit::RequestBodyLimitLayer,
    services::ServeFile,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ServerConfig, StaticMount};
use crate::dev::{
    tenant_from_asset_path, tenant_from_hmr_path, CommandDevCapability, DevCapability, DevRegistry,
    LoaderOnlyCapability,
};
use crate::dispatch::{Dispatcher, ModuleLoader, ModuleRegistry, ModuleWatcher, PlaceholderEngine, TemplateEngine};
use crate::http::proxy::{http_client, ApiProxy, HttpClient};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::{is_xhr, ErrorPages};
use crate::http::websocket::{declined_upgrade, HmrRelay};
use crate::lifecycle::shutdown::triggered;
use crate::observability::metrics;
use crate::project::ProjectResolver;
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<ProjectResolver>,
    pub dispatcher: Arc<Dispatcher>,
    pub dev: Option<Arc<DevRegistry>>,
    pub relay: Arc<HmrRelay>,
    pub api_proxy: Option<Arc<ApiProxy>>,
    pub mounts: Arc<Vec<StaticMount>>,
    pub client: HttpClient,
    pub error_pages: Arc<ErrorPages>,
}

/// HTTP server hosting every tenant.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    state: AppState,
    modules: Arc<ModuleRegistry>,
}

impl HttpServer {
    /// Create a server. In development, dev instances come from the
    /// configured command, or supply module loading only.
    pub fn new(config: ServerConfig, modules: ModuleRegistry) -> Self {
        Self::build(config, modules, None)
    }

    /// Create a server provisioning dev instances through `capability`.
    pub fn with_dev_capability(config: ServerConfig, modules: ModuleRegistry, capability: Arc<dyn DevCapability>) -> Self {
        Self::build(config, modules, Some(capability))
    }

    fn build(config: ServerConfig, modules: ModuleRegistry, capability: Option<Arc<dyn DevCapability>>) -> Self {
        let modules = Arc::new(modules.with_root(config.projects.root.clone()));
        let loader: Arc<dyn ModuleLoader> = modules.clone();
        let templates: Arc<dyn TemplateEngine> = Arc::new(PlaceholderEngine);

        let routes = Arc::new(RouteTable::from_config(&config.routes));
        let resolver = Arc::new(ProjectResolver::new(
            routes,
            config.projects.root.clone(),
            config.layout.clone(),
            config.mode,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            loader.clone(),
            templates.clone(),
            config.layout.hidden_marker.clone(),
        ));

        let dev = config.is_dev().then(|| {
            let capability = capability.unwrap_or_else(|| default_capability(&config, loader.clone()));
            Arc::new(DevRegistry::new(capability, config.dev.clone()))
        });

        let api_proxy = config.api_proxy.as_ref().and_then(|proxy| match ApiProxy::new(proxy) {
            Ok(proxy) => Some(Arc::new(proxy)),
            Err(e) => {
                tracing::error!(target = %proxy.target, error = %e, "Invalid API proxy target, proxy disabled");
                None
            }
        });

        let state = AppState {
            resolver,
            dispatcher,
            dev,
            relay: Arc::new(HmrRelay::new()),
            api_proxy,
            mounts: Arc::new(config.projects.static_mounts.clone()),
            client: http_client(),
            error_pages: Arc::new(ErrorPages::new(
                config.projects.views_dir.clone(),
                !config.is_dev(),
                templates,
            )),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
            modules,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .fallback(site_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = ?self.config.mode,
            routes = self.config.routes.len(),
            "HTTP server starting"
        );

        let _watcher = match &self.state.dev {
            Some(dev) => {
                dev.set_listen_port(addr.port());
                match ModuleWatcher::new(&self.config.projects.root, self.modules.clone()).run() {
                    Ok(watcher) => Some(watcher),
                    Err(e) => {
                        tracing::warn!(error = %e, "Module watcher unavailable, cached modules stay loaded");
                        None
                    }
                }
            }
            None => None,
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(triggered(shutdown))
            .await?;

        self.state.relay.close_all().await;
        if let Some(dev) = &self.state.dev {
            dev.shutdown_all().await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dev_registry(&self) -> Option<Arc<DevRegistry>> {
        self.state.dev.clone()
    }

    pub fn hmr_relay(&self) -> Arc<HmrRelay> {
        self.state.relay.clone()
    }

    pub fn modules(&self) -> Arc<ModuleRegistry> {
        self.modules.clone()
    }
}

fn default_capability(config: &ServerConfig, loader: Arc<dyn ModuleLoader>) -> Arc<dyn DevCapability> {
    match &config.dev.command {
        Some(command) => Arc::new(CommandDevCapability::new(command.clone()).with_loader(loader)),
        None => Arc::new(LoaderOnlyCapability::new(loader)),
    }
}

/// Single entry point for every request.
async fn site_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let xhr = is_xhr(request.headers());

    tracing::debug!(
        request_id = %request_id,
        remote = %remote,
        method = %method,
        path = %path,
        "Handling request"
    );

    let (kind, response) = serve(&state, request, &path, &url, xhr, &request_id).await;
    metrics::record_request(&method, response.status().as_u16(), kind, start_time);
    response
}

async fn serve(
    state: &AppState,
    request: Request<Body>,
    path: &str,
    url: &str,
    xhr: bool,
    request_id: &str,
) -> (&'static str, Response) {
    let request = match serve_dev(state, request, path, url, xhr).await {
        Ok(response) => return ("dev", response),
        Err(request) => request,
    };

    if let Some(proxy) = state.api_proxy.as_ref().filter(|p| p.matches(path)) {
        return ("api", proxy.forward(&state.client, request).await);
    }

    let request = match serve_mount(&state.mounts, path, request).await {
        Ok(response) => return ("mount", response),
        Err(request) => request,
    };

    let Some(info) = state.resolver.resolve(path).await else {
        tracing::debug!(request_id = %request_id, path = %path, "No project resolved");
        return ("none", state.error_pages.not_found(url, xhr).await);
    };
    let kind = info.kind();

    let dev = match &state.dev {
        Some(registry) => match registry.get_or_create(info.tenant(), request.headers()).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(request_id = %request_id, tenant = %info.tenant().name, error = %e, "Dev provisioning failed");
                return (kind, state.error_pages.for_error(url, xhr, &e).await);
            }
        },
        None => None,
    };

    match state.dispatcher.dispatch(&info, request, dev).await {
        Ok(response) => (kind, response),
        Err(e) if e.is_miss() => {
            if matches!(e, crate::dispatch::DispatchError::MissingMember { .. }) {
                tracing::warn!(request_id = %request_id, path = %path, error = %e, "Dispatch miss");
            } else {
                tracing::debug!(request_id = %request_id, path = %path, "Dispatch miss");
            }
            (kind, state.error_pages.not_found(url, xhr).await)
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                tenant = %info.tenant().name,
                kind,
                error = %e,
                "Dispatch failed"
            );
            (kind, state.error_pages.for_error(url, xhr, &e).await)
        }
    }
}

/// Dev assets and hot-reload upgrades. Hands the request back when the
/// path is not for a ready dev instance.
async fn serve_dev(
    state: &AppState,
    request: Request<Body>,
    path: &str,
    url: &str,
    xhr: bool,
) -> Result<Response, Request<Body>> {
    let Some(registry) = &state.dev else {
        return Err(request);
    };
    let config = registry.config();
    let Some(tenant) = tenant_from_asset_path(path, &config.asset_prefix) else {
        return Err(request);
    };
    let hmr = is_upgrade(&request) && tenant_from_hmr_path(path, &config.asset_prefix, &config.hmr_path).is_some();

    let Some(handle) = registry.get(tenant) else {
        // Hot-reload upgrades never reach resolution or provisioning.
        if hmr {
            tracing::debug!(tenant = %tenant, "Hot-reload upgrade declined, no dev instance");
            return Ok(declined_upgrade());
        }
        return Err(request);
    };

    if hmr {
        return Ok(state.relay.upgrade(request, handle).await);
    }

    match handle.handle_asset(request).await {
        Some(response) => Ok(response),
        None => Ok(state.error_pages.not_found(url, xhr).await),
    }
}

fn is_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Plain files from static mounts, GET and HEAD only.
async fn serve_mount(mounts: &[StaticMount], path: &str, request: Request<Body>) -> Result<Response, Request<Body>> {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return Err(request);
    }

    for mount in mounts {
        let Some(file) = mount_file(mount, path) else {
            continue;
        };
        if !tokio::fs::metadata(&file).await.map(|m| m.is_file()).unwrap_or(false) {
            continue;
        }

        return match ServeFile::new(&file).oneshot(request).await {
            Ok(response) => Ok(response.map(Body::new)),
            Err(never) => match never {},
        };
    }

    Err(request)
}

/// File a mount would serve for `path`, if `path` is below the mount prefix
/// and stays inside the mount directory.
fn mount_file(mount: &StaticMount, path: &str) -> Option<PathBuf> {
    let prefix = mount.prefix.trim_end_matches('/');
    let head = path.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &path[prefix.len()..];
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }

    let rel = Path::new(rest.trim_start_matches('/'));
    if rel.as_os_str().is_empty() || rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(mount.dir.join(rel))
}
