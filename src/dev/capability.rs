//! Dev sub-server capability contract.
//!
//! # Responsibilities
//! - Describe what the registry hands a capability when provisioning
//! - Describe what a provisioned instance offers back (asset handling,
//!   module loading, HTML transforms, teardown)

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};

use crate::dispatch::{DispatchError, ModuleLoader};

/// Everything a capability needs to start one tenant's sub-server.
#[derive(Debug, Clone)]
pub struct DevInstanceOptions {
    pub tenant: String,
    /// URL prefix the instance serves, `/<asset prefix>/<tenant>/__`.
    pub base_token: String,
    /// Per-tenant cache directory.
    pub cache_namespace: PathBuf,
    /// Loopback port of the instance's hot-reload channel.
    pub hmr_port: u16,
    /// Port browsers should use for the hot-reload channel.
    pub hmr_client_port: u16,
    /// Hot-reload path below the base token, e.g. `/__ws__`.
    pub hmr_path: String,
    pub project_path: PathBuf,
    /// Baseline, generated settings and tenant overrides, merged.
    pub config: toml::Table,
    pub defines: BTreeMap<String, String>,
}

#[async_trait]
pub trait DevInstance: Send + Sync {
    /// Serve a request below the base token. `None` means not handled.
    async fn handle(&self, request: Request<Body>) -> Option<Response<Body>>;

    /// Loader to use for this tenant's code units instead of the default.
    fn module_loader(&self) -> Option<Arc<dyn ModuleLoader>> {
        None
    }

    async fn transform_index_html(&self, _url: &str, html: String) -> Result<String, DispatchError> {
        Ok(html)
    }

    async fn shutdown(&self) {}
}

#[async_trait]
pub trait DevCapability: Send + Sync {
    async fn create(&self, options: DevInstanceOptions) -> Result<Arc<dyn DevInstance>, DispatchError>;
}

/// A ready dev instance as cached by the registry.
pub struct DevInstanceHandle {
    pub tenant: String,
    pub base_token: String,
    pub hmr_port: u16,
    instance: Arc<dyn DevInstance>,
}

impl DevInstanceHandle {
    pub fn new(tenant: String, base_token: String, hmr_port: u16, instance: Arc<dyn DevInstance>) -> Self {
        Self {
            tenant,
            base_token,
            hmr_port,
            instance,
        }
    }

    pub async fn handle_asset(&self, request: Request<Body>) -> Option<Response<Body>> {
        self.instance.handle(request).await
    }

    pub fn module_loader(&self) -> Option<Arc<dyn ModuleLoader>> {
        self.instance.module_loader()
    }

    pub async fn transform_index_html(&self, url: &str, html: String) -> Result<String, DispatchError> {
        self.instance.transform_index_html(url, html).await
    }

    pub async fn shutdown(&self) {
        self.instance.shutdown().await
    }
}

impl fmt::Debug for DevInstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevInstanceHandle")
            .field("tenant", &self.tenant)
            .field("base_token", &self.base_token)
            .field("hmr_port", &self.hmr_port)
            .finish_non_exhaustive()
    }
}

/// Capability used when no external build command is configured: the
/// instance only supplies a module loader.
pub struct LoaderOnlyCapability {
    loader: Arc<dyn ModuleLoader>,
}

impl LoaderOnlyCapability {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self { loader }
    }
}

struct LoaderOnlyInstance {
    loader: Arc<dyn ModuleLoader>,
}

#[async_trait]
impl DevCapability for LoaderOnlyCapability {
    async fn create(&self, options: DevInstanceOptions) -> Result<Arc<dyn DevInstance>, DispatchError> {
        tracing::debug!(tenant = %options.tenant, "Loader-only dev instance created");
        Ok(Arc::new(LoaderOnlyInstance {
            loader: self.loader.clone(),
        }))
    }
}

#[async_trait]
impl DevInstance for LoaderOnlyInstance {
    async fn handle(&self, _request: Request<Body>) -> Option<Response<Body>> {
        None
    }

    fn module_loader(&self) -> Option<Arc<dyn ModuleLoader>> {
        Some(self.loader.clone())
    }
}
