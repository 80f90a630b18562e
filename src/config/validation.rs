//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate route prefixes, bases and tenant names
//! - Validate the dev token and API proxy target
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::{RouteKind, ServerConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one route must be configured")]
    NoRoutes,

    #[error("route #{index}: {field} must start with '/' (got {value:?})")]
    NotAbsolute {
        index: usize,
        field: &'static str,
        value: String,
    },

    #[error("route #{index}: ssr routes need a tenant name")]
    MissingName { index: usize },

    #[error("route #{index}: tenant name {name:?} must not contain '..' or a leading '/'")]
    InvalidName { index: usize, name: String },

    #[error("dev.asset_prefix must be a single non-empty path segment (got {0:?})")]
    InvalidAssetPrefix(String),

    #[error("api_proxy.target {0:?} is not an http(s) URL")]
    InvalidProxyTarget(String),

    #[error("layout.{0} must not be empty")]
    EmptyLayoutField(&'static str),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }

    for (index, route) in config.routes.iter().enumerate() {
        if !route.prefix.starts_with('/') {
            errors.push(ValidationError::NotAbsolute {
                index,
                field: "prefix",
                value: route.prefix.clone(),
            });
        }

        // An empty base strips nothing and is always fine.
        if let Some(base) = route.base.as_deref() {
            if !base.is_empty() && !base.starts_with('/') {
                errors.push(ValidationError::NotAbsolute {
                    index,
                    field: "base",
                    value: base.to_string(),
                });
            }
        }

        if route.kind == RouteKind::Ssr && route.name.trim_matches('/').is_empty() {
            errors.push(ValidationError::MissingName { index });
        }

        if route.name.starts_with('/') || route.name.split('/').any(|s| s == "..") {
            errors.push(ValidationError::InvalidName {
                index,
                name: route.name.clone(),
            });
        }
    }

    let prefix = &config.dev.asset_prefix;
    if prefix.is_empty() || prefix.contains('/') {
        errors.push(ValidationError::InvalidAssetPrefix(prefix.clone()));
    }

    if let Some(proxy) = &config.api_proxy {
        let valid = url::Url::parse(&proxy.target)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidProxyTarget(proxy.target.clone()));
        }
    }

    let layout = &config.layout;
    for (field, value) in [
        ("controller_dir", &layout.controller_dir),
        ("default_controller", &layout.default_controller),
        ("default_action", &layout.default_action),
        ("static_suffix", &layout.static_suffix),
        ("hidden_marker", &layout.hidden_marker),
    ] {
        if value.is_empty() {
            errors.push(ValidationError::EmptyLayoutField(field));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ApiProxyConfig, RouteConfig};

    fn route(kind: RouteKind, prefix: &str, name: &str) -> RouteConfig {
        RouteConfig {
            kind,
            prefix: prefix.to_string(),
            name: name.to_string(),
            base: None,
        }
    }

    #[test]
    fn test_valid_config() {
        let mut config = ServerConfig::default();
        config.routes.push(route(RouteKind::Conventional, "/react", "react"));
        config.routes.push(route(RouteKind::Ssr, "/", "home"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ServerConfig::default();
        config.routes.push(route(RouteKind::Ssr, "vue", ""));
        config.routes.push(route(RouteKind::Conventional, "/x", "../etc"));
        config.dev.asset_prefix = "a/b".to_string();
        config.api_proxy = Some(ApiProxyConfig {
            prefix: "/api/".to_string(),
            target: "ftp://nowhere".to_string(),
            strip_prefix: false,
        });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::NotAbsolute {
            index: 0,
            field: "prefix",
            value: "vue".to_string(),
        }));
        assert!(errors.contains(&ValidationError::MissingName { index: 0 }));
        assert!(errors.contains(&ValidationError::InvalidName {
            index: 1,
            name: "../etc".to_string(),
        }));
        assert!(errors.contains(&ValidationError::InvalidAssetPrefix("a/b".to_string())));
        assert!(errors.contains(&ValidationError::InvalidProxyTarget("ftp://nowhere".to_string())));
    }

    #[test]
    fn test_empty_route_table() {
        let errors = validate_config(&ServerConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoRoutes]);
    }
}
