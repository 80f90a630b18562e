//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as WsRequest, Response as WsResponse};
use tokio_tungstenite::tungstenite::Message;

use microsite_server::config::{Mode, RouteConfig, RouteKind, ServerConfig, StaticMount};
use microsite_server::dev::{DevCapability, DevInstance, DevInstanceOptions};
use microsite_server::dispatch::{
    html_response, ActionTable, ConstructWith, Controller, ControllerContext, DispatchError, ModuleRegistry,
    RenderContext, RenderOutcome, RenderWith,
};
use microsite_server::{HttpServer, Shutdown};

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Projects root:
///
/// ```text
/// home/        SSR catch-all (dev + production entries)
/// shop/        SSR tenant without an entry
/// site/blog/   conventional tenant (post, index, fails controllers)
/// site/docs/   static-only tenant
/// public/      static mount
/// ```
pub fn site_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(root, "home/entry-server.ts", "");
    write(root, "home/server/entry-server.js", "");
    write(
        root,
        "home/index.html",
        "<html><head><title><%= title %></title></head><body><%:= body %></body></html>",
    );
    write(root, "shop/index.html", "<html>shop</html>");

    write(root, "site/blog/server/post.js", "");
    write(root, "site/blog/server/index.js", "");
    write(root, "site/blog/server/fails.js", "");
    write(root, "site/blog/about.html", "<p>About <%= name %></p>");

    write(root, "site/docs/intro.html", "<html><head></head><body>Intro</body></html>");

    write(root, "public/assets/app.js", "console.log('app');");

    dir
}

pub fn config(root: &Path, mode: Mode) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.mode = mode;
    config.projects.root = root.to_path_buf();
    config.projects.static_mounts = vec![StaticMount {
        prefix: "/assets".to_string(),
        dir: root.join("public/assets"),
    }];
    config.dev.cache_root = root.join(".cache");
    config.routes = vec![
        route(RouteKind::Ssr, "/shop", "shop"),
        route(RouteKind::Conventional, "/site", "site"),
        route(RouteKind::Ssr, "/", "home"),
    ];
    config
}

fn route(kind: RouteKind, prefix: &str, name: &str) -> RouteConfig {
    RouteConfig {
        kind,
        prefix: prefix.to_string(),
        name: name.to_string(),
        base: None,
    }
}

/// Code units for the fixture tenants.
pub fn modules() -> ModuleRegistry {
    let home = || {
        RenderWith(|cx: RenderContext| async move {
            if cx.url == "/redirect" {
                let response = (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response();
                return Ok(RenderOutcome::Handled(response));
            }
            if cx.url.starts_with("/gone") {
                return Ok(RenderOutcome::Data(json!({ "title": "Gone", "httpStatusCode": 410 })));
            }
            if cx.url == "/explode" {
                return Err(DispatchError::invoke("renderer exploded"));
            }
            Ok(RenderOutcome::Data(json!({
                "title": "Home <1>",
                "body": format!("<em>{}</em>", cx.url),
            })))
        })
    };

    let post = ActionTable::new()
        .action("listAll", |_cx| async { Ok(html_response(StatusCode::OK, "all posts")) })
        .action("about", |cx| async move {
            cx.controller.render("about", &json!({ "name": "blog" })).await
        })
        .action("broken", |_cx| async { Err(DispatchError::invoke("database unreachable")) })
        .action("invalid", |_cx| async { Err(DispatchError::Validation("title is required".into())) })
        .action("echoMethod", |cx| async move {
            Ok(html_response(StatusCode::OK, cx.request.method().to_string()))
        })
        .value("version", "1.0")
        .value("$secret", "hidden");

    let mut registry = ModuleRegistry::new();
    registry
        .renderer("home/entry-server.ts", home())
        .renderer("home/server/entry-server.js", home())
        .controller("site/blog/server/post.js", post)
        .controller("site/blog/server/index.js", ActionTable::new().value("main", "blog index"))
        .controller(
            "site/blog/server/fails.js",
            ConstructWith(|_cx: Arc<ControllerContext>| -> Result<Box<dyn Controller>, DispatchError> {
                Err(DispatchError::invoke("constructor failed"))
            }),
        );
    registry
}

/// Bind a loopback port and run `server` until the returned coordinator
/// fires.
pub async fn start_server(server: HttpServer) -> (SocketAddr, Arc<Shutdown>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Start a mock HTTP backend that answers every request with its own
/// request line and `Host` header.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                let request_line = head.lines().next().unwrap_or("").to_string();
                let host = head
                    .lines()
                    .find(|l| l.to_ascii_lowercase().starts_with("host:"))
                    .map(|l| l[5..].trim().to_string())
                    .unwrap_or_default();
                let body = format!("{}|{}", request_line, host);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Counters shared between a [`MockDevCapability`] and the test.
#[derive(Default)]
pub struct HmrStats {
    pub provisions: AtomicUsize,
    pub upstream_opened: AtomicUsize,
    pub upstream_closed: AtomicUsize,
    pub protocols: Mutex<Vec<String>>,
    pub paths: Mutex<Vec<String>>,
}

/// Dev capability whose instances serve `hello.js`, mark transformed HTML,
/// and run a fake hot-reload server on the allocated port.
pub struct MockDevCapability {
    pub stats: Arc<HmrStats>,
    pub delay: Duration,
}

impl MockDevCapability {
    pub fn new(delay: Duration) -> (Self, Arc<HmrStats>) {
        let stats = Arc::new(HmrStats::default());
        (
            Self {
                stats: stats.clone(),
                delay,
            },
            stats,
        )
    }
}

struct MockDevInstance {
    tenant: String,
}

#[async_trait]
impl DevCapability for MockDevCapability {
    async fn create(&self, options: DevInstanceOptions) -> Result<Arc<dyn DevInstance>, DispatchError> {
        self.stats.provisions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let listener = TcpListener::bind(("127.0.0.1", options.hmr_port))
            .await
            .map_err(|e| DispatchError::provisioning(&options.tenant, e))?;
        tokio::spawn(run_hmr_upstream(listener, self.stats.clone()));

        Ok(Arc::new(MockDevInstance { tenant: options.tenant }))
    }
}

#[async_trait]
impl DevInstance for MockDevInstance {
    async fn handle(&self, request: Request<Body>) -> Option<Response<Body>> {
        if request.uri().path().ends_with("/hello.js") {
            let body = format!("console.log('{}');", self.tenant);
            return Some(([(header::CONTENT_TYPE, "application/javascript")], body).into_response());
        }
        None
    }

    async fn transform_index_html(&self, _url: &str, html: String) -> Result<String, DispatchError> {
        Ok(format!("{}<!-- dev:{} -->", html, self.tenant))
    }
}

/// Fake hot-reload server: greets with `connected`, echoes text as
/// `echo:<text>`.
async fn run_hmr_upstream(listener: TcpListener, stats: Arc<HmrStats>) {
    while let Ok((stream, _)) = listener.accept().await {
        let stats = stats.clone();
        tokio::spawn(async move {
            let seen = stats.clone();
            let callback = move |req: &WsRequest, mut resp: WsResponse| -> Result<WsResponse, ErrorResponse> {
                seen.paths.lock().unwrap().push(req.uri().path().to_string());
                if let Some(protocol) = req.headers().get("sec-websocket-protocol") {
                    let first = protocol.to_str().unwrap_or("").split(',').next().unwrap_or("").trim().to_string();
                    seen.protocols.lock().unwrap().push(first.clone());
                    resp.headers_mut()
                        .insert("sec-websocket-protocol", first.parse().unwrap());
                }
                Ok(resp)
            };

            let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                return;
            };
            stats.upstream_opened.fetch_add(1, Ordering::SeqCst);

            let _ = ws.send(Message::text("connected")).await;
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(t) => {
                        let _ = ws.send(Message::text(format!("echo:{}", t.as_str()))).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            stats.upstream_closed.fetch_add(1, Ordering::SeqCst);
        });
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
