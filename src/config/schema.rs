//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the multi-site server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Development or production behaviour.
    pub mode: Mode,

    /// Where tenant projects and shared assets live.
    pub projects: ProjectsConfig,

    /// Filesystem naming conventions inside tenant directories.
    pub layout: LayoutConfig,

    /// Ordered route table; first match wins.
    pub routes: Vec<RouteConfig>,

    /// Development multiplexer settings.
    pub dev: DevConfig,

    /// Optional API forwarding (development helper).
    pub api_proxy: Option<ApiProxyConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ServerConfig {
    pub fn is_dev(&self) -> bool {
        self.mode == Mode::Development
    }
}

/// Runtime mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:5173").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5173".to_string(),
        }
    }
}

/// Project roots and static directories.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectsConfig {
    /// Directory containing every tenant directory.
    pub root: PathBuf,

    /// Optional directory holding `404.html`, `422.html` and `500.html`.
    pub views_dir: Option<PathBuf>,

    /// Plain file directories served before tenant resolution.
    pub static_mounts: Vec<StaticMount>,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("src"),
            views_dir: None,
            static_mounts: Vec::new(),
        }
    }
}

/// A URL prefix served straight from a directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticMount {
    pub prefix: String,
    pub dir: PathBuf,
}

/// Filesystem conventions used by project resolution.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// SSR entry relative to the tenant directory, production builds.
    pub ssr_entry_production: String,

    /// SSR entry relative to the tenant directory, development sources.
    pub ssr_entry_development: String,

    /// HTML template relative to the tenant directory.
    pub ssr_template: String,

    /// SSR manifest relative to the tenant directory.
    pub ssr_manifest: String,

    /// Directory holding controller modules.
    pub controller_dir: String,

    /// File extension of controller modules (without dot).
    pub controller_extension: String,

    /// Controller used when the URL names none.
    pub default_controller: String,

    /// Action used when the URL names none.
    pub default_action: String,

    /// Suffix marking a raw static page.
    pub static_suffix: String,

    /// Members starting with this marker are never dispatched.
    pub hidden_marker: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            ssr_entry_production: "server/entry-server.js".to_string(),
            ssr_entry_development: "entry-server.ts".to_string(),
            ssr_template: "index.html".to_string(),
            ssr_manifest: ".vite/ssr-manifest.json".to_string(),
            controller_dir: "server".to_string(),
            controller_extension: "js".to_string(),
            default_controller: "index".to_string(),
            default_action: "main".to_string(),
            static_suffix: ".html".to_string(),
            hidden_marker: "$".to_string(),
        }
    }
}

/// How a route's tenants are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Ssr,
    Conventional,
}

/// Route configuration mapping a URL prefix to a tenant.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    pub kind: RouteKind,

    /// Path prefix to match (segment boundary, case-insensitive).
    pub prefix: String,

    /// Tenant directory under the projects root. May be empty for a
    /// conventional route probing the root itself.
    #[serde(default)]
    pub name: String,

    /// Part of the URL stripped before segmenting. Defaults to `prefix`.
    pub base: Option<String>,
}

/// Development multiplexer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DevConfig {
    /// Reserved first path segment for proxied dev assets.
    pub asset_prefix: String,

    /// Path of the hot-reload socket below the tenant token.
    pub hmr_path: String,

    /// Port browsers use to reach the hot-reload socket.
    pub client_port: Option<u16>,

    /// Directory under which each tenant gets its cache namespace.
    pub cache_root: PathBuf,

    /// Build configuration shared by every tenant.
    pub baseline: toml::Table,

    /// Per-tenant override file looked up inside the tenant directory.
    pub override_file: String,

    /// External build-and-watch command. When absent, dev instances only
    /// supply module loading.
    pub command: Option<DevCommandConfig>,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            asset_prefix: "__dev__".to_string(),
            hmr_path: "__ws__".to_string(),
            client_port: None,
            cache_root: PathBuf::from("target/.dev-cache"),
            baseline: toml::Table::new(),
            override_file: "dev.override.toml".to_string(),
            command: None,
        }
    }
}

/// External per-tenant sub-server command.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DevCommandConfig {
    pub program: String,

    /// Arguments; `{project}`, `{config}`, `{port}`, `{hmr_port}` and
    /// `{base}` are substituted.
    #[serde(default)]
    pub args: Vec<String>,

    /// How long to wait for the sub-server's HTTP port.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Module injected into dev HTML, relative to the tenant token.
    #[serde(default = "default_client_entry")]
    pub client_entry: Option<String>,
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_client_entry() -> Option<String> {
    Some("@vite/client".to_string())
}

/// API forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiProxyConfig {
    /// Requests starting with this prefix are forwarded.
    #[serde(default = "default_api_prefix")]
    pub prefix: String,

    /// Upstream base URL (e.g., "http://api.internal:8080").
    pub target: String,

    /// Drop the prefix before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 6 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
