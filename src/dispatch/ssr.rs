//! SSR pipeline.
//!
//! ```text
//! entry renderer ← loader
//! manifest       ← tenant dir (production, when present) | {} (development)
//! render({url, manifest, request})
//!     Handled(response) → sent as is
//!     Data(value)       → template → dev transform → placeholders → HTML
//!                         status from `httpStatusCode`, default 200
//! ```

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use serde_json::{Map, Value};

use crate::dev::DevInstanceHandle;
use crate::dispatch::contract::{ActionResult, RenderContext, RenderOutcome};
use crate::dispatch::error::DispatchError;
use crate::dispatch::html_response;
use crate::dispatch::loader::ModuleLoader;
use crate::dispatch::template::TemplateEngine;
use crate::project::SsrProject;

const STATUS_FIELD: &str = "httpStatusCode";

pub(crate) async fn run(
    project: &SsrProject,
    request: Request<Body>,
    url: String,
    loader: &dyn ModuleLoader,
    templates: &dyn TemplateEngine,
    dev: Option<Arc<DevInstanceHandle>>,
) -> ActionResult {
    let renderer = loader.load_renderer(&project.entry).await?;

    let manifest = match dev {
        Some(_) => Value::Object(Map::new()),
        None => read_manifest(&project.manifest).await?,
    };

    let cx = RenderContext {
        url: url.clone(),
        manifest,
        request,
        tenant: project.tenant.clone(),
        dev: dev.clone(),
    };

    let data = match renderer.render(cx).await? {
        RenderOutcome::Handled(response) => return Ok(response),
        RenderOutcome::Data(data) => data,
    };

    let template = tokio::fs::read_to_string(&project.template).await?;
    let template = match dev.as_deref() {
        Some(dev) => dev.transform_index_html(&url, template).await?,
        None => template,
    };

    let html = templates.render(&template, &data)?;
    let mut response = html_response(status_from(&data), html);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}

async fn read_manifest(path: &Path) -> Result<Value, DispatchError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| DispatchError::load(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Object(Map::new())),
        Err(e) => Err(DispatchError::Io(e)),
    }
}

fn status_from(data: &Value) -> StatusCode {
    data.get(STATUS_FIELD)
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK)
}
