//! Raw static pages and shared HTML page rendering.

use std::path::Path;

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::dev::DevInstanceHandle;
use crate::dispatch::contract::ActionResult;
use crate::dispatch::html_response;
use crate::dispatch::template::TemplateEngine;
use crate::project::StaticAsset;

pub(crate) async fn run(
    page: &StaticAsset,
    url: &str,
    templates: &dyn TemplateEngine,
    dev: Option<&DevInstanceHandle>,
) -> ActionResult {
    render_page(templates, dev, url, &page.file_path, &json!({})).await
}

/// Read an HTML file, fill its placeholders, then let the dev instance
/// (if any) transform the result.
pub(crate) async fn render_page(
    templates: &dyn TemplateEngine,
    dev: Option<&DevInstanceHandle>,
    url: &str,
    path: &Path,
    data: &Value,
) -> ActionResult {
    let source = tokio::fs::read_to_string(path).await?;
    let html = templates.render(&source, data)?;
    let html = match dev {
        Some(dev) => dev.transform_index_html(url, html).await?,
        None => html,
    };
    Ok(html_response(StatusCode::OK, html))
}
