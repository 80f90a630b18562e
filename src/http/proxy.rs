//! Request forwarding.
//!
//! # Responsibilities
//! - Re-target a request at a loopback or remote HTTP authority
//! - Forward `/api/`-style prefixes to a configured upstream
//!
//! # Design Decisions
//! - One pooled `hyper-util` client shared by every forwarder
//! - Hop-by-hop headers are dropped; everything else is copied
//! - Upstream failures answer 502, never retried

use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use url::Url;

use crate::config::ApiProxyConfig;
use crate::routing::{Matcher, SegmentPrefixMatcher};

pub type HttpClient = Client<HttpConnector, Body>;

const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid forward target: {0}")]
    Target(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Send `request` to `http://<authority><path_and_query>`.
///
/// With `change_origin` the `Host` header is rewritten to the target.
pub async fn forward(
    client: &HttpClient,
    request: Request<Body>,
    authority: &str,
    path_and_query: &str,
    change_origin: bool,
) -> Result<Response<Body>, ForwardError> {
    let (parts, body) = request.into_parts();

    let uri = Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()?;

    let mut builder = Request::builder()
        .method(parts.method)
        .uri(uri)
        .version(Version::HTTP_11);

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            if HOP_BY_HOP.contains(name) || (change_origin && name == header::HOST) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        if change_origin {
            let host = HeaderValue::from_str(authority).map_err(axum::http::Error::from)?;
            headers.insert(header::HOST, host);
        }
    }

    let response = client.request(builder.body(body)?).await?;
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}

/// Forwards a URL prefix to an upstream API.
#[derive(Debug)]
pub struct ApiProxy {
    matcher: SegmentPrefixMatcher,
    prefix_len: usize,
    authority: String,
    target_path: String,
    strip_prefix: bool,
}

impl ApiProxy {
    pub fn new(config: &ApiProxyConfig) -> Result<Self, url::ParseError> {
        let target = Url::parse(&config.target)?;
        let host = target.host_str().ok_or(url::ParseError::EmptyHost)?;
        let authority = match target.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let prefix = config.prefix.trim_end_matches('/');

        Ok(Self {
            matcher: SegmentPrefixMatcher::new(prefix),
            prefix_len: prefix.len(),
            authority,
            target_path: target.path().trim_end_matches('/').to_string(),
            strip_prefix: config.strip_prefix,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefix_len > 0 && self.matcher.matches(path)
    }

    /// Upstream path and query for an incoming URI.
    fn upstream_path(&self, uri: &Uri) -> String {
        let path = uri.path();
        let path = if self.strip_prefix {
            path.get(self.prefix_len..).unwrap_or("")
        } else {
            path
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        match uri.query() {
            Some(query) => format!("{}{}?{}", self.target_path, path, query),
            None => format!("{}{}", self.target_path, path),
        }
    }

    pub async fn forward(&self, client: &HttpClient, request: Request<Body>) -> Response<Body> {
        let path_and_query = self.upstream_path(request.uri());

        match forward(client, request, &self.authority, &path_and_query, true).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(target = %self.authority, path = %path_and_query, error = %e, "API proxy error");
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }
}
