//! Conventional controller pipeline.
//!
//! ```text
//! controller factory ← loader
//! construct(ControllerContext)
//! member lookup: name → camelCase(name, '_') → camelCase(name, '-')
//!     Action → awaited, its response returned
//!     Value  → written as HTML
//!     none   → POST: MissingMember | otherwise: ResolutionMiss
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};

use crate::dev::DevInstanceHandle;
use crate::dispatch::contract::{ActionContext, ActionResult, Controller, ControllerContext, Member};
use crate::dispatch::error::DispatchError;
use crate::dispatch::html_response;
use crate::dispatch::loader::ModuleLoader;
use crate::dispatch::template::TemplateEngine;
use crate::project::ConventionalProject;

pub(crate) struct Conventions<'a> {
    pub loader: &'a dyn ModuleLoader,
    pub templates: Arc<dyn TemplateEngine>,
    pub hidden_marker: &'a str,
}

pub(crate) async fn run(
    project: &ConventionalProject,
    request: Request<Body>,
    url: String,
    conventions: Conventions<'_>,
    dev: Option<Arc<DevInstanceHandle>>,
) -> ActionResult {
    let factory = conventions.loader.load_controller(&project.controller_path).await?;

    let cx = Arc::new(ControllerContext::new(
        project.tenant.clone(),
        dev,
        url,
        conventions.templates,
    ));
    let controller = factory.construct(cx.clone())?;

    let strict = request.method() == Method::POST;

    match find_member(controller.as_ref(), &project.method, conventions.hidden_marker) {
        Some(Member::Action(action)) => {
            action(ActionContext {
                controller: cx,
                request,
            })
            .await
        }
        Some(Member::Value(value)) => Ok(html_response(StatusCode::OK, value)),
        None if strict => Err(DispatchError::MissingMember {
            member: project.method.clone(),
            controller: project.controller_path.display().to_string(),
        }),
        None => Err(DispatchError::ResolutionMiss),
    }
}

fn find_member(controller: &dyn Controller, name: &str, hidden_marker: &str) -> Option<Member> {
    if name.is_empty() || (!hidden_marker.is_empty() && name.starts_with(hidden_marker)) {
        return None;
    }

    [name.to_string(), camel_case(name, '_'), camel_case(name, '-')]
        .iter()
        .find_map(|candidate| controller.member(candidate))
}

/// Replace every `<delim><lowercase letter>` with the uppercased letter.
fn camel_case(name: &str, delim: char) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        if c == delim {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_lowercase() {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}
