//! Dev instances backed by an external build-and-watch process.
//!
//! # Data Flow
//! ```text
//! create(options)
//!     → write merged config to <cache namespace>/dev-config.toml
//!     → spawn `program args…` (placeholders substituted, defines as env)
//!     → wait until 127.0.0.1:<port> accepts connections
//! handle(request)
//!     → hyper-util client → sub-server
//!     → 404 = not handled (falls through)
//! ```

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::DevCommandConfig;
use crate::dev::capability::{DevCapability, DevInstance, DevInstanceOptions};
use crate::dev::registry::free_port;
use crate::dispatch::{DispatchError, ModuleLoader};
use crate::http::proxy::{forward, http_client, HttpClient};

const CONFIG_FILE: &str = "dev-config.toml";
const READY_POLL: Duration = Duration::from_millis(100);

/// Spawns one configured command per tenant.
pub struct CommandDevCapability {
    command: DevCommandConfig,
    client: HttpClient,
    loader: Option<Arc<dyn ModuleLoader>>,
}

impl CommandDevCapability {
    pub fn new(command: DevCommandConfig) -> Self {
        Self {
            command,
            client: http_client(),
            loader: None,
        }
    }

    /// Module loader handed to every instance.
    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }
}

#[async_trait]
impl DevCapability for CommandDevCapability {
    async fn create(&self, options: DevInstanceOptions) -> Result<Arc<dyn DevInstance>, DispatchError> {
        let port = free_port().await?;

        tokio::fs::create_dir_all(&options.cache_namespace).await?;
        let config_path = options.cache_namespace.join(CONFIG_FILE);
        let rendered = toml::to_string(&options.config).map_err(|e| DispatchError::load(&config_path, e))?;
        tokio::fs::write(&config_path, rendered).await?;

        let vars = BTreeMap::from([
            ("project", options.project_path.display().to_string()),
            ("config", config_path.display().to_string()),
            ("port", port.to_string()),
            ("hmr_port", options.hmr_port.to_string()),
            ("base", options.base_token.clone()),
        ]);

        let mut cmd = Command::new(&self.command.program);
        cmd.args(self.command.args.iter().map(|arg| substitute(arg, &vars)))
            .envs(&options.defines)
            .env("PORT", port.to_string())
            .env("HMR_PORT", options.hmr_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| DispatchError::provisioning(&options.tenant, format!("spawn {}: {}", self.command.program, e)))?;

        tracing::info!(
            tenant = %options.tenant,
            program = %self.command.program,
            pid = child.id().unwrap_or(0),
            port,
            "Dev sub-server spawned"
        );

        let timeout = Duration::from_secs(self.command.startup_timeout_secs);
        wait_for_port(&mut child, port, timeout)
            .await
            .map_err(|reason| DispatchError::provisioning(&options.tenant, reason))?;

        Ok(Arc::new(CommandDevInstance {
            tenant: options.tenant,
            base_token: options.base_token,
            authority: format!("127.0.0.1:{}", port),
            client_entry: self.command.client_entry.clone(),
            client: self.client.clone(),
            loader: self.loader.clone(),
            child: Mutex::new(Some(child)),
        }))
    }
}

struct CommandDevInstance {
    tenant: String,
    base_token: String,
    authority: String,
    client_entry: Option<String>,
    client: HttpClient,
    loader: Option<Arc<dyn ModuleLoader>>,
    child: Mutex<Option<Child>>,
}

#[async_trait]
impl DevInstance for CommandDevInstance {
    async fn handle(&self, request: Request<Body>) -> Option<Response<Body>> {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        match forward(&self.client, request, &self.authority, &path_and_query, false).await {
            Ok(response) if response.status() == StatusCode::NOT_FOUND => None,
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(tenant = %self.tenant, path = %path_and_query, error = %e, "Dev sub-server request failed");
                Some((StatusCode::BAD_GATEWAY, "Dev sub-server unavailable").into_response())
            }
        }
    }

    fn module_loader(&self) -> Option<Arc<dyn ModuleLoader>> {
        self.loader.clone()
    }

    async fn transform_index_html(&self, _url: &str, html: String) -> Result<String, DispatchError> {
        Ok(match &self.client_entry {
            Some(entry) => inject_client(&html, &self.base_token, entry),
            None => html,
        })
    }

    async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(tenant = %self.tenant, error = %e, "Failed to stop dev sub-server");
            }
        }
    }
}

fn substitute(arg: &str, vars: &BTreeMap<&str, String>) -> String {
    vars.iter().fold(arg.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

/// Insert the hot-reload client module right after `<head>`, or at the top
/// when the document has no head.
fn inject_client(html: &str, base_token: &str, entry: &str) -> String {
    let tag = format!(
        r#"<script type="module" src="{}/{}"></script>"#,
        base_token.trim_end_matches('/'),
        entry.trim_start_matches('/')
    );

    match find_ignore_case(html, "<head>") {
        Some(at) => {
            let split = at + "<head>".len();
            format!("{}{}{}", &html[..split], tag, &html[split..])
        }
        None => format!("{}{}", tag, html),
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

async fn wait_for_port(child: &mut Child, port: u16, timeout: Duration) -> Result<(), String> {
    let started = Instant::now();

    loop {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return Ok(());
        }

        match child.try_wait() {
            Ok(Some(status)) => return Err(format!("sub-server exited early with {}", status)),
            Ok(None) => {}
            Err(e) => return Err(format!("failed to poll sub-server: {}", e)),
        }

        if started.elapsed() >= timeout {
            return Err(format!("sub-server did not listen on port {} within {:?}", port, timeout));
        }

        tokio::time::sleep(READY_POLL).await;
    }
}
