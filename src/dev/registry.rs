//! Per-tenant dev instance registry.
//!
//! # Responsibilities
//! - Provision at most one instance per tenant, lazily
//! - Hand concurrent first requests the same in-flight provisioning
//! - Allocate distinct loopback hot-reload ports
//! - Build each instance's layered configuration
//!
//! # Design Decisions
//! - One `OnceCell` per tenant inside a `DashMap`; a failed provisioning
//!   leaves the cell empty so the next request retries
//! - Instances are never evicted

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::HeaderMap;
use dashmap::{DashMap, DashSet};
use tokio::net::TcpListener;
use tokio::sync::OnceCell;
use toml::{Table, Value};

use crate::config::DevConfig;
use crate::dev::capability::{DevCapability, DevInstanceHandle, DevInstanceOptions};
use crate::dev::overrides;
use crate::dispatch::DispatchError;
use crate::observability::metrics;
use crate::project::Tenant;

const PORT_ATTEMPTS: usize = 16;

pub const DEFINE_TENANT_NAME: &str = "TENANT_NAME";
pub const DEFINE_TENANT_BASE_URL: &str = "TENANT_BASE_URL";
pub const DEFINE_TENANT_BASE_PATH: &str = "TENANT_BASE_PATH";

type Slot = Arc<OnceCell<Arc<DevInstanceHandle>>>;

pub struct DevRegistry {
    capability: Arc<dyn DevCapability>,
    config: DevConfig,
    listen_port: AtomicU16,
    instances: DashMap<String, Slot>,
    ports: DashSet<u16>,
    provisions: AtomicUsize,
}

impl DevRegistry {
    pub fn new(capability: Arc<dyn DevCapability>, config: DevConfig) -> Self {
        Self {
            capability,
            config,
            listen_port: AtomicU16::new(0),
            instances: DashMap::new(),
            ports: DashSet::new(),
            provisions: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &DevConfig {
        &self.config
    }

    /// Port of the public listener, the last-resort hot-reload client port.
    pub fn set_listen_port(&self, port: u16) {
        self.listen_port.store(port, Ordering::Relaxed);
    }

    /// Ready instance for `tenant`, provisioning it on first use.
    pub async fn get_or_create(
        &self,
        tenant: &Tenant,
        headers: &HeaderMap,
    ) -> Result<Arc<DevInstanceHandle>, DispatchError> {
        let slot = self
            .instances
            .entry(tenant.name.clone())
            .or_default()
            .value()
            .clone();

        let handle = slot.get_or_try_init(|| self.provision(tenant, headers)).await?;
        Ok(handle.clone())
    }

    /// Ready instance for `tenant`, if any. Never provisions.
    pub fn get(&self, tenant: &str) -> Option<Arc<DevInstanceHandle>> {
        self.instances.get(tenant).and_then(|slot| slot.get().cloned())
    }

    pub fn ready_count(&self) -> usize {
        self.instances.iter().filter(|slot| slot.value().initialized()).count()
    }

    /// Number of provisioning sequences started, successful or not.
    pub fn provision_count(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    pub async fn shutdown_all(&self) {
        let handles: Vec<_> = self
            .instances
            .iter()
            .filter_map(|slot| slot.value().get().cloned())
            .collect();

        for handle in handles {
            tracing::info!(tenant = %handle.tenant, "Stopping dev instance");
            handle.shutdown().await;
        }
    }

    async fn provision(&self, tenant: &Tenant, headers: &HeaderMap) -> Result<Arc<DevInstanceHandle>, DispatchError> {
        self.provisions.fetch_add(1, Ordering::SeqCst);

        let hmr_port = self
            .allocate_port()
            .await
            .map_err(|e| DispatchError::provisioning(&tenant.name, e))?;

        match self.build(tenant, headers, hmr_port).await {
            Ok(handle) => {
                metrics::record_dev_provision(&tenant.name, true);
                metrics::set_dev_instances(self.ready_count() + 1);
                tracing::info!(
                    tenant = %tenant.name,
                    base = %handle.base_token,
                    hmr_port,
                    "Dev instance ready"
                );
                Ok(Arc::new(handle))
            }
            Err(e) => {
                self.ports.remove(&hmr_port);
                metrics::record_dev_provision(&tenant.name, false);
                Err(match e {
                    DispatchError::Provisioning { .. } => e,
                    other => DispatchError::provisioning(&tenant.name, other),
                })
            }
        }
    }

    async fn build(&self, tenant: &Tenant, headers: &HeaderMap, hmr_port: u16) -> Result<DevInstanceHandle, DispatchError> {
        let base_token = format!("/{}/{}/__", self.config.asset_prefix, tenant.name);
        let hmr_path = format!("/{}", self.config.hmr_path.trim_matches('/'));
        let hmr_client_port = client_port(
            headers,
            self.config.client_port,
            self.listen_port.load(Ordering::Relaxed),
        );
        let cache_namespace = self.config.cache_root.join(&tenant.name);
        let defines = tenant_defines(tenant);

        let mut config = self.config.baseline.clone();
        overrides::merge(
            &mut config,
            generated_settings(&base_token, &cache_namespace.display().to_string(), &hmr_path, hmr_port, hmr_client_port, &defines),
        );
        if let Some(tenant_overrides) = overrides::load_override(&tenant.dir.join(&self.config.override_file)).await? {
            tracing::debug!(tenant = %tenant.name, "Applying tenant dev overrides");
            overrides::merge(&mut config, tenant_overrides);
        }

        tracing::info!(tenant = %tenant.name, hmr_port, hmr_client_port, "Provisioning dev instance");

        let options = DevInstanceOptions {
            tenant: tenant.name.clone(),
            base_token: base_token.clone(),
            cache_namespace,
            hmr_port,
            hmr_client_port,
            hmr_path,
            project_path: tenant.dir.clone(),
            config,
            defines,
        };

        let instance = self.capability.create(options).await?;
        Ok(DevInstanceHandle::new(tenant.name.clone(), base_token, hmr_port, instance))
    }

    async fn allocate_port(&self) -> std::io::Result<u16> {
        for _ in 0..PORT_ATTEMPTS {
            let port = free_port().await?;
            if self.ports.insert(port) {
                return Ok(port);
            }
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "no unused loopback port found",
        ))
    }
}

/// A loopback port nothing is listening on right now.
pub async fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    Ok(listener.local_addr()?.port())
}

/// Port browsers reach the hot-reload channel on.
pub fn client_port(headers: &HeaderMap, configured: Option<u16>, listen_port: u16) -> u16 {
    if let Some(port) = configured {
        return port;
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

    if let Some(port) = header("x-forwarded-port").and_then(|v| v.parse().ok()) {
        return port;
    }

    match header("x-forwarded-scheme") {
        Some("http") => 80,
        Some("https") => 443,
        _ => listen_port,
    }
}

fn tenant_defines(tenant: &Tenant) -> BTreeMap<String, String> {
    BTreeMap::from([
        (DEFINE_TENANT_NAME.to_string(), tenant.route.name.clone()),
        (DEFINE_TENANT_BASE_URL.to_string(), tenant.route.base.clone()),
        (DEFINE_TENANT_BASE_PATH.to_string(), format!("/{}", tenant.route.name)),
    ])
}

fn generated_settings(
    base_token: &str,
    cache_dir: &str,
    hmr_path: &str,
    hmr_port: u16,
    client_port: u16,
    defines: &BTreeMap<String, String>,
) -> Table {
    let mut hmr = Table::new();
    hmr.insert("path".into(), Value::String(hmr_path.to_string()));
    hmr.insert("port".into(), Value::Integer(hmr_port.into()));
    hmr.insert("clientPort".into(), Value::Integer(client_port.into()));

    let mut server = Table::new();
    server.insert("hmr".into(), Value::Table(hmr));

    let define = defines
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect::<Table>();

    let mut settings = Table::new();
    settings.insert("base".into(), Value::String(base_token.to_string()));
    settings.insert("cacheDir".into(), Value::String(cache_dir.to_string()));
    settings.insert("server".into(), Value::Table(server));
    settings.insert("define".into(), Value::Table(define));
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteKind;
    use crate::dev::capability::DevInstance;
    use crate::routing::{Route, SegmentPrefixMatcher};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request, Response};
    use std::sync::Mutex;
    use std::time::Duration;

    struct NullInstance;

    #[async_trait]
    impl DevInstance for NullInstance {
        async fn handle(&self, _request: Request<Body>) -> Option<Response<Body>> {
            None
        }
    }

    /// Records options, optionally fails the first N creations.
    #[derive(Default)]
    struct RecordingCapability {
        created: Mutex<Vec<DevInstanceOptions>>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl DevCapability for RecordingCapability {
        async fn create(&self, options: DevInstanceOptions) -> Result<Arc<dyn DevInstance>, DispatchError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DispatchError::invoke("boom"));
            }
            self.created.lock().unwrap().push(options);
            Ok(Arc::new(NullInstance))
        }
    }

    fn tenant(dir: &std::path::Path, name: &str) -> Tenant {
        let route = Route::new(RouteKind::Conventional, Box::new(SegmentPrefixMatcher::new("/blog")), name, "/blog");
        Tenant {
            name: name.to_string(),
            dir: dir.join(name),
            route: Arc::new(route),
        }
    }

    fn registry(capability: Arc<RecordingCapability>, cache_root: &std::path::Path) -> DevRegistry {
        let config = DevConfig {
            cache_root: cache_root.to_path_buf(),
            ..DevConfig::default()
        };
        DevRegistry::new(capability, config)
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_provision_once() {
        let dir = tempfile::tempdir().unwrap();
        let capability = Arc::new(RecordingCapability::default());
        let registry = Arc::new(registry(capability.clone(), dir.path()));
        let blog = tenant(dir.path(), "blog");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let blog = blog.clone();
            tasks.push(tokio::spawn(async move {
                registry.get_or_create(&blog, &HeaderMap::new()).await.unwrap()
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(registry.provision_count(), 1);
        assert_eq!(capability.created.lock().unwrap().len(), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert_eq!(registry.ready_count(), 1);
        assert!(registry.get("blog").is_some());
    }

    #[tokio::test]
    async fn test_failed_provisioning_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let capability = Arc::new(RecordingCapability {
            failures_left: AtomicUsize::new(1),
            ..Default::default()
        });
        let registry = registry(capability, dir.path());
        let blog = tenant(dir.path(), "blog");

        let err = registry.get_or_create(&blog, &HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Provisioning { .. }));
        assert!(registry.get("blog").is_none());

        assert!(registry.get_or_create(&blog, &HeaderMap::new()).await.is_ok());
        assert_eq!(registry.provision_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_ports_and_layered_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("blog")).unwrap();
        std::fs::write(
            dir.path().join("blog/dev.override.toml"),
            "[server.hmr]\npath = \"/custom\"\n[build]\nminify = false\n",
        )
        .unwrap();

        let capability = Arc::new(RecordingCapability::default());
        let registry = registry(capability.clone(), dir.path());

        let a = registry.get_or_create(&tenant(dir.path(), "blog"), &HeaderMap::new()).await.unwrap();
        let b = registry.get_or_create(&tenant(dir.path(), "shop"), &HeaderMap::new()).await.unwrap();
        assert_ne!(a.hmr_port, b.hmr_port);
        assert_eq!(a.base_token, "/__dev__/blog/__");

        let created = capability.created.lock().unwrap();
        let blog = created.iter().find(|o| o.tenant == "blog").unwrap();
        assert_eq!(blog.config["base"].as_str(), Some("/__dev__/blog/__"));
        assert_eq!(blog.config["server"]["hmr"]["path"].as_str(), Some("/custom"));
        assert_eq!(blog.config["server"]["hmr"]["port"].as_integer(), Some(a.hmr_port as i64));
        assert_eq!(blog.config["build"]["minify"].as_bool(), Some(false));
        assert_eq!(blog.defines[DEFINE_TENANT_NAME], "blog");
        assert_eq!(blog.defines[DEFINE_TENANT_BASE_URL], "/blog");
        assert_eq!(blog.cache_namespace, dir.path().join("blog"));
    }

    #[test]
    fn test_client_port_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_port(&headers, Some(9000), 5173), 9000);
        assert_eq!(client_port(&headers, None, 5173), 5173);

        headers.insert("x-forwarded-scheme", HeaderValue::from_static("https"));
        assert_eq!(client_port(&headers, None, 5173), 443);
        headers.insert("x-forwarded-scheme", HeaderValue::from_static("http"));
        assert_eq!(client_port(&headers, None, 5173), 80);

        headers.insert("x-forwarded-port", HeaderValue::from_static("8443"));
        assert_eq!(client_port(&headers, None, 5173), 8443);
        assert_eq!(client_port(&headers, Some(9000), 5173), 9000);
    }
}
