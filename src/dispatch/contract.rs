//! Contracts between the dispatcher and tenant code units.
//!
//! # Responsibilities
//! - Renderer: `{url, manifest, request}` → handled response or template data
//! - Controller: named members, either async actions or plain values
//! - ControllerFactory: builds a controller per request
//!
//! # Design Decisions
//! - Units are compiled in and registered by path (see loader.rs); nothing
//!   is evaluated dynamically
//! - Members are looked up by name so URL casing fallbacks stay in the
//!   dispatcher, not in every controller

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::dev::DevInstanceHandle;
use crate::dispatch::error::DispatchError;
use crate::dispatch::static_page::render_page;
use crate::dispatch::template::TemplateEngine;
use crate::project::Tenant;

pub type ActionResult = Result<Response<Body>, DispatchError>;
pub type ActionFn = Arc<dyn Fn(ActionContext) -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// What a renderer hands back.
pub enum RenderOutcome {
    /// The renderer built the whole response itself.
    Handled(Response<Body>),
    /// Data merged into the tenant template. An `httpStatusCode` entry sets
    /// the response status.
    Data(Value),
}

/// Input to a renderer.
pub struct RenderContext {
    /// Original path and query.
    pub url: String,
    /// Parsed SSR manifest, `{}` when absent or in development.
    pub manifest: Value,
    pub request: Request<Body>,
    pub tenant: Tenant,
    pub dev: Option<Arc<DevInstanceHandle>>,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, cx: RenderContext) -> Result<RenderOutcome, DispatchError>;
}

/// Adapts an async closure into a [`Renderer`].
pub struct RenderWith<F>(pub F);

#[async_trait]
impl<F, Fut> Renderer for RenderWith<F>
where
    F: Fn(RenderContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RenderOutcome, DispatchError>> + Send + 'static,
{
    async fn render(&self, cx: RenderContext) -> Result<RenderOutcome, DispatchError> {
        (self.0)(cx).await
    }
}

/// Per-request state handed to controller constructors and actions.
pub struct ControllerContext {
    pub tenant: Tenant,
    pub dev: Option<Arc<DevInstanceHandle>>,
    /// Original path and query.
    pub url: String,
    templates: Arc<dyn TemplateEngine>,
}

impl ControllerContext {
    pub fn new(
        tenant: Tenant,
        dev: Option<Arc<DevInstanceHandle>>,
        url: impl Into<String>,
        templates: Arc<dyn TemplateEngine>,
    ) -> Self {
        Self {
            tenant,
            dev,
            url: url.into(),
            templates,
        }
    }

    /// Render `<tenant dir>/<name>.html` with `data`.
    pub async fn render(&self, name: &str, data: &Value) -> ActionResult {
        let file = format!("{}.html", strip_html_suffix(name));
        let path = self.tenant.dir.join(Path::new(&file));
        render_page(self.templates.as_ref(), self.dev.as_deref(), &self.url, &path, data).await
    }
}

fn strip_html_suffix(name: &str) -> &str {
    let cut = name.len().saturating_sub(5);
    match name.get(cut..) {
        Some(tail) if tail.eq_ignore_ascii_case(".html") => &name[..cut],
        _ => name,
    }
}

/// Input to an action.
pub struct ActionContext {
    pub controller: Arc<ControllerContext>,
    pub request: Request<Body>,
}

/// A controller member.
#[derive(Clone)]
pub enum Member {
    Action(ActionFn),
    /// Written verbatim as an HTML body.
    Value(String),
}

pub trait Controller: Send + Sync {
    /// Exact-name lookup.
    fn member(&self, name: &str) -> Option<Member>;
}

pub trait ControllerFactory: Send + Sync {
    fn construct(&self, cx: Arc<ControllerContext>) -> Result<Box<dyn Controller>, DispatchError>;
}

/// Adapts a closure into a [`ControllerFactory`].
pub struct ConstructWith<F>(pub F);

impl<F> ControllerFactory for ConstructWith<F>
where
    F: Fn(Arc<ControllerContext>) -> Result<Box<dyn Controller>, DispatchError> + Send + Sync,
{
    fn construct(&self, cx: Arc<ControllerContext>) -> Result<Box<dyn Controller>, DispatchError> {
        (self.0)(cx)
    }
}

/// A controller defined by a table of members.
#[derive(Clone, Default)]
pub struct ActionTable {
    members: HashMap<String, Member>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let action: ActionFn = Arc::new(move |cx| Box::pin(action(cx)));
        self.members.insert(name.into(), Member::Action(action));
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.members.insert(name.into(), Member::Value(value.into()));
        self
    }
}

impl Controller for ActionTable {
    fn member(&self, name: &str) -> Option<Member> {
        self.members.get(name).cloned()
    }
}

impl ControllerFactory for ActionTable {
    fn construct(&self, _cx: Arc<ControllerContext>) -> Result<Box<dyn Controller>, DispatchError> {
        Ok(Box::new(self.clone()))
    }
}
