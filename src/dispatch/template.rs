//! Placeholder templating for tenant HTML.
//!
//! Supported tags:
//! - `<%= path %>` inserts the value at `path`, HTML-escaped
//! - `<%:= path %>` inserts it raw
//!
//! Paths are dotted lookups into the data object (`user.name`, `items.0`).
//! Missing values and `null` render as nothing; objects and arrays render
//! as JSON.

use serde_json::Value;

use crate::dispatch::error::DispatchError;

const OPEN: &str = "<%";
const CLOSE: &str = "%>";

pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, data: &Value) -> Result<String, DispatchError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderEngine;

impl TemplateEngine for PlaceholderEngine {
    fn render(&self, template: &str, data: &Value) -> Result<String, DispatchError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open
                .find(CLOSE)
                .ok_or_else(|| DispatchError::invoke("unterminated template tag"))?;
            let tag = &after_open[..end];

            if let Some(path) = tag.strip_prefix(":=") {
                out.push_str(&stringify(lookup(data, path.trim())));
            } else if let Some(path) = tag.strip_prefix('=') {
                out.push_str(&escape_html(&stringify(lookup(data, path.trim()))));
            } else {
                return Err(DispatchError::invoke(format!(
                    "unsupported template tag `{}{}{}`",
                    OPEN,
                    tag.trim(),
                    CLOSE
                )));
            }

            rest = &after_open[end + CLOSE.len()..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|key| !key.is_empty())
        .try_fold(data, |value, key| match value {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
