//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! ProjectInfo + request (+ dev instance)
//!     → loader.rs (dev instance loader, else the registry)
//!     → ssr.rs          renderer → template → HTML
//!     → conventional.rs controller → member → action / value
//!     → static_page.rs  file → placeholders → dev transform
//!     → Response | DispatchError (miss → 404, failure → error page)
//! ```
//!
//! # Design Decisions
//! - Tenant code is compiled in and looked up by path (contract.rs)
//! - Errors are values; the HTTP layer decides how they render

pub mod contract;
pub mod conventional;
pub mod error;
pub mod loader;
pub mod ssr;
pub mod static_page;
pub mod template;
pub mod watcher;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};

pub use contract::{
    ActionContext, ActionFn, ActionResult, ActionTable, ConstructWith, Controller, ControllerContext,
    ControllerFactory, Member, RenderContext, RenderOutcome, RenderWith, Renderer,
};
pub use error::DispatchError;
pub use loader::{Module, ModuleLoader, ModuleRegistry};
pub use template::{PlaceholderEngine, TemplateEngine};
pub use watcher::ModuleWatcher;

use crate::dev::DevInstanceHandle;
use crate::project::ProjectInfo;

/// Runs the pipeline matching a resolved project.
pub struct Dispatcher {
    loader: Arc<dyn ModuleLoader>,
    templates: Arc<dyn TemplateEngine>,
    hidden_marker: String,
}

impl Dispatcher {
    pub fn new(
        loader: Arc<dyn ModuleLoader>,
        templates: Arc<dyn TemplateEngine>,
        hidden_marker: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            templates,
            hidden_marker: hidden_marker.into(),
        }
    }

    pub async fn dispatch(
        &self,
        info: &ProjectInfo,
        request: Request<Body>,
        dev: Option<Arc<DevInstanceHandle>>,
    ) -> ActionResult {
        let loader = dev
            .as_ref()
            .and_then(|d| d.module_loader())
            .unwrap_or_else(|| self.loader.clone());

        let url = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        tracing::debug!(
            kind = info.kind(),
            tenant = %info.tenant().name,
            url = %url,
            "Dispatching"
        );

        match info {
            ProjectInfo::Ssr(project) => {
                ssr::run(project, request, url, loader.as_ref(), self.templates.as_ref(), dev).await
            }
            ProjectInfo::Conventional(project) => {
                let conventions = conventional::Conventions {
                    loader: loader.as_ref(),
                    templates: self.templates.clone(),
                    hidden_marker: &self.hidden_marker,
                };
                conventional::run(project, request, url, conventions, dev).await
            }
            ProjectInfo::Static(page) => {
                static_page::run(page, &url, self.templates.as_ref(), dev.as_deref()).await
            }
        }
    }
}

/// `text/html` response with the given status.
pub fn html_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body.into(),
    )
        .into_response()
}
