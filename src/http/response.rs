//! Not-found and error responses.
//!
//! # Responsibilities
//! - 404 as HTML, or JSON `{url, error}` for XMLHttpRequest callers
//! - 422 for validation failures, 500 for everything else
//! - Optional `404.html` / `422.html` / `500.html` overrides rendered
//!   through the template engine
//!
//! # Design Decisions
//! - Error detail is shown only outside production
//! - A broken override page falls back to the built-in page

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::dispatch::{html_response, DispatchError, TemplateEngine};

const NOT_FOUND_MESSAGE: &str = "Not found";

const BUILTIN_404: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>404 Not Found</title></head>\
<body><h1>404 Not Found</h1><p><%= url %></p></body></html>";

const BUILTIN_422: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>422 Unprocessable Entity</title></head>\
<body><h1>422 Unprocessable Entity</h1><pre><%= error %></pre></body></html>";

const BUILTIN_500: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>500 Internal Server Error</title></head>\
<body><h1>500 Internal Server Error</h1><pre><%= error %></pre></body></html>";

/// Whether the caller asked for JSON errors.
pub fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
        .unwrap_or(false)
}

pub struct ErrorPages {
    views_dir: Option<PathBuf>,
    production: bool,
    templates: Arc<dyn TemplateEngine>,
}

impl ErrorPages {
    pub fn new(views_dir: Option<PathBuf>, production: bool, templates: Arc<dyn TemplateEngine>) -> Self {
        Self {
            views_dir,
            production,
            templates,
        }
    }

    pub async fn not_found(&self, url: &str, xhr: bool) -> Response<Body> {
        let payload = json!({ "url": url, "error": NOT_FOUND_MESSAGE });
        if xhr {
            return (StatusCode::NOT_FOUND, Json(payload)).into_response();
        }
        self.page(StatusCode::NOT_FOUND, BUILTIN_404, &payload).await
    }

    /// Response for a failed dispatch. Misses become the not-found page.
    pub async fn for_error(&self, url: &str, xhr: bool, err: &DispatchError) -> Response<Body> {
        if err.is_miss() {
            return self.not_found(url, xhr).await;
        }

        let status = err.status();
        let detail = if self.production { String::new() } else { err.to_string() };
        let payload = json!({ "url": url, "error": detail });

        if xhr {
            return (status, Json(payload)).into_response();
        }

        let builtin = if status == StatusCode::UNPROCESSABLE_ENTITY {
            BUILTIN_422
        } else {
            BUILTIN_500
        };
        self.page(status, builtin, &payload).await
    }

    async fn page(&self, status: StatusCode, builtin: &str, data: &Value) -> Response<Body> {
        if let Some(html) = self.render_override(status, data).await {
            return html_response(status, html);
        }

        match self.templates.render(builtin, data) {
            Ok(html) => html_response(status, html),
            Err(e) => {
                tracing::error!(error = %e, "Built-in error page failed to render");
                (status, status.canonical_reason().unwrap_or("Error")).into_response()
            }
        }
    }

    async fn render_override(&self, status: StatusCode, data: &Value) -> Option<String> {
        let path = self.views_dir.as_ref()?.join(format!("{}.html", status.as_u16()));
        let source = tokio::fs::read_to_string(&path).await.ok()?;

        match self.templates.render(&source, data) {
            Ok(html) => Some(html),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Error page override failed to render");
                None
            }
        }
    }
}
