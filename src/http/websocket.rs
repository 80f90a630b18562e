//! Hot-reload WebSocket demultiplexing.
//!
//! # Responsibilities
//! - Recognize `/<asset prefix>/<tenant>/__/<hmr path>` upgrades
//! - Reject repeated handshake keys before upgrading
//! - Decline upgrades for tenants without a dev instance
//! - Keep at most one upstream hot-reload connection per tenant
//! - Relay frames between the browser and the tenant's sub-server
//!
//! # Data Flow
//! ```text
//! Browser ←── frames ──→ relay ←── frames ──→ ws://127.0.0.1:<hmr port><same path>
//! ```
//!
//! # Design Decisions
//! - Per-tenant slot guarded by an async mutex; close old, connect new and
//!   install happen under the slot lock, so two upgrades never race
//! - Replacing a session closes the old upstream and also the old browser
//!   socket; a replaced browser never stays attached to a dead relay and
//!   reconnects on its own
//! - A handshake key is remembered while its session lives and released when
//!   the relay ends, so the key set tracks live sessions only
//! - Requested subprotocols are accepted downstream and offered upstream in
//!   the client's order
//! - Ping/pong handled transparently

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::{Message as AxMsg, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use dashmap::{DashMap, DashSet};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as TungMsg;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::dev::DevInstanceHandle;
use crate::observability::metrics;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live relay between one browser socket and one upstream socket.
struct UpstreamSession {
    id: u64,
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl UpstreamSession {
    /// Close both sockets and wait briefly for the relay to finish.
    async fn close(self) {
        let _ = self.close_tx.send(());
        if tokio::time::timeout(CLOSE_GRACE, self.task).await.is_err() {
            tracing::warn!(session = self.id, "Hot-reload relay did not stop in time");
        }
    }
}

type Slot = Arc<Mutex<Option<UpstreamSession>>>;

/// Owns every tenant's hot-reload session and the handshake keys seen.
#[derive(Default)]
pub struct HmrRelay {
    sessions: DashMap<String, Slot>,
    processed_keys: DashSet<String>,
    next_id: AtomicU64,
    replaced: AtomicUsize,
}

impl HmrRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upgrade `request` and relay it to `dev`'s hot-reload port.
    pub async fn upgrade(self: &Arc<Self>, request: Request<Body>, dev: Arc<DevInstanceHandle>) -> Response {
        let key = request
            .headers()
            .get(header::SEC_WEBSOCKET_KEY)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(key) = &key {
            if !self.processed_keys.insert(key.clone()) {
                tracing::warn!(tenant = %dev.tenant, "Duplicate WebSocket handshake key rejected");
                return duplicate_handshake();
            }
        }

        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let protocols = requested_protocols(request.headers());

        let (mut parts, _body) = request.into_parts();
        let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(ws) => ws,
            Err(rejection) => {
                self.release_key(key.as_deref());
                return rejection.into_response();
            }
        };

        let upstream_url = format!("ws://127.0.0.1:{}{}", dev.hmr_port, path_and_query);
        let relay = self.clone();
        let failed = self.clone();
        let failed_key = key.clone();
        let tenant = dev.tenant.clone();

        ws.protocols(protocols.clone())
            .on_failed_upgrade(move |e| {
                tracing::warn!(error = %e, "WebSocket upgrade failed");
                failed.release_key(failed_key.as_deref());
            })
            .on_upgrade(move |socket| async move {
                relay.attach(tenant, socket, upstream_url, protocols, key).await;
            })
    }

    /// Replace the tenant's session with one relaying `downstream`.
    async fn attach(
        self: Arc<Self>,
        tenant: String,
        downstream: WebSocket,
        upstream_url: String,
        protocols: Vec<String>,
        key: Option<String>,
    ) {
        let slot = self
            .sessions
            .entry(tenant.clone())
            .or_default()
            .value()
            .clone();
        let mut current = slot.lock().await;

        if let Some(old) = current.take() {
            tracing::info!(tenant = %tenant, session = old.id, "Replacing hot-reload session");
            old.close().await;
            self.replaced.fetch_add(1, Ordering::SeqCst);
            metrics::record_hmr_replaced(&tenant);
        }

        let upstream = match connect_upstream(&upstream_url, &protocols).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(tenant = %tenant, url = %upstream_url, error = %e, "Hot-reload upstream unreachable");
                self.release_key(key.as_deref());
                return;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (close_tx, close_rx) = oneshot::channel();
        let relay = self.clone();
        let session_tenant = tenant.clone();
        let task = tokio::spawn(async move {
            relay_frames(session_tenant, id, downstream, upstream, close_rx).await;
            relay.release_key(key.as_deref());
        });

        tracing::debug!(tenant = %tenant, session = id, "Hot-reload session established");
        *current = Some(UpstreamSession { id, close_tx, task });
    }

    /// Whether `tenant` has a relay that is still running.
    pub async fn is_active(&self, tenant: &str) -> bool {
        let Some(slot) = self.sessions.get(tenant).map(|s| s.value().clone()) else {
            return false;
        };
        let current = slot.lock().await;
        current.as_ref().map(|s| !s.task.is_finished()).unwrap_or(false)
    }

    fn release_key(&self, key: Option<&str>) {
        if let Some(key) = key {
            self.processed_keys.remove(key);
        }
    }

    /// Handshake keys belonging to sessions that are still open.
    pub fn tracked_keys(&self) -> usize {
        self.processed_keys.len()
    }

    /// Sessions closed because a newer one replaced them.
    pub fn replaced_count(&self) -> usize {
        self.replaced.load(Ordering::SeqCst)
    }

    pub async fn close_all(&self) {
        let slots: Vec<Slot> = self.sessions.iter().map(|s| s.value().clone()).collect();
        for slot in slots {
            if let Some(session) = slot.lock().await.take() {
                session.close().await;
            }
        }
    }
}

fn duplicate_handshake() -> Response {
    (
        StatusCode::BAD_REQUEST,
        [(header::CONNECTION, HeaderValue::from_static("close"))],
        "Duplicate WebSocket handshake",
    )
        .into_response()
}

/// Answer for a hot-reload upgrade whose tenant has no dev instance yet.
pub fn declined_upgrade() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONNECTION, HeaderValue::from_static("close"))],
        "No dev instance for this tenant",
    )
        .into_response()
}

/// Subprotocols in the order the client listed them, without repeats.
fn requested_protocols(headers: &HeaderMap) -> Vec<String> {
    let mut protocols: Vec<String> = Vec::new();
    for protocol in headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        if !protocols.iter().any(|p| p == protocol) {
            protocols.push(protocol.to_string());
        }
    }
    protocols
}

async fn connect_upstream(url: &str, protocols: &[String]) -> Result<Upstream, tokio_tungstenite::tungstenite::Error> {
    let mut request = url.into_client_request()?;
    if !protocols.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&protocols.join(", ")) {
            request.headers_mut().insert(header::SEC_WEBSOCKET_PROTOCOL, value);
        }
    }
    let (upstream, _) = connect_async(request).await?;
    Ok(upstream)
}

async fn relay_frames(
    tenant: String,
    id: u64,
    downstream: WebSocket,
    upstream: Upstream,
    mut close_rx: oneshot::Receiver<()>,
) {
    let (mut down_tx, mut down_rx) = downstream.split();
    let (mut up_tx, mut up_rx) = upstream.split();

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = up_tx.send(TungMsg::Close(None)).await;
                let _ = down_tx.send(AxMsg::Close(None)).await;
                break;
            }
            msg = down_rx.next() => {
                let msg = match msg {
                    Some(Ok(AxMsg::Close(_))) | None => {
                        let _ = up_tx.send(TungMsg::Close(None)).await;
                        break;
                    }
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!(tenant = %tenant, session = id, error = %e, "Browser socket error");
                        break;
                    }
                };
                let forwarded = match msg {
                    AxMsg::Text(t) => TungMsg::text(t.as_str()),
                    AxMsg::Binary(b) => TungMsg::binary(b),
                    AxMsg::Ping(p) => TungMsg::Ping(p),
                    AxMsg::Pong(p) => TungMsg::Pong(p),
                    AxMsg::Close(_) => break,
                };
                if up_tx.send(forwarded).await.is_err() {
                    break;
                }
            }
            msg = up_rx.next() => {
                let msg = match msg {
                    Some(Ok(TungMsg::Close(_))) | None => {
                        let _ = down_tx.send(AxMsg::Close(None)).await;
                        break;
                    }
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::warn!(tenant = %tenant, session = id, error = %e, "Hot-reload upstream error");
                        break;
                    }
                };
                let forwarded = match msg {
                    TungMsg::Text(t) => AxMsg::Text(t.as_str().into()),
                    TungMsg::Binary(b) => AxMsg::Binary(b),
                    TungMsg::Ping(p) => AxMsg::Ping(p),
                    TungMsg::Pong(p) => AxMsg::Pong(p),
                    TungMsg::Close(_) | TungMsg::Frame(_) => continue,
                };
                if down_tx.send(forwarded).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!(tenant = %tenant, session = id, "Hot-reload session ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_protocols() {
        let mut headers = HeaderMap::new();
        assert!(requested_protocols(&headers).is_empty());

        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("vite-hmr"));
        assert_eq!(requested_protocols(&headers), vec!["vite-hmr".to_string()]);

        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("b, a, b"));
        headers.append(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("c, a"));
        assert_eq!(
            requested_protocols(&headers),
            vec!["b".to_string(), "a".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_declined_upgrade_response() {
        let response = declined_upgrade();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[test]
    fn test_release_key() {
        let relay = HmrRelay::new();
        relay.processed_keys.insert("k1".to_string());
        relay.processed_keys.insert("k2".to_string());

        relay.release_key(Some("k1"));
        relay.release_key(None);

        assert_eq!(relay.tracked_keys(), 1);
        assert!(relay.processed_keys.insert("k1".to_string()));
    }

    #[test]
    fn test_duplicate_handshake_response() {
        let response = duplicate_handshake();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }
}
