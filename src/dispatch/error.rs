//! Dispatch error taxonomy.

use std::path::Path;

use axum::http::StatusCode;
use thiserror::Error;

/// Everything that can stop a request between resolution and response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Tenant, template, controller or member not found. Soft.
    #[error("not found")]
    ResolutionMiss,

    /// Strict requests (POST) naming a member the controller lacks. Soft.
    #[error("method or property \"{member}\" is not found in {controller}")]
    MissingMember { member: String, controller: String },

    /// A code unit could not be loaded.
    #[error("failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    /// A renderer, controller constructor or action failed.
    #[error("{0}")]
    Invoke(String),

    /// Input rejected by an action.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A dev sub-server could not be created.
    #[error("failed to provision dev instance for {tenant}: {reason}")]
    Provisioning { tenant: String, reason: String },

    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl DispatchError {
    pub fn load(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invoke(reason: impl std::fmt::Display) -> Self {
        Self::Invoke(reason.to_string())
    }

    pub fn provisioning(tenant: &str, reason: impl std::fmt::Display) -> Self {
        Self::Provisioning {
            tenant: tenant.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Resolution misses fall through to the not-found handler and are
    /// never logged as errors.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::ResolutionMiss | Self::MissingMember { .. })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ResolutionMiss | Self::MissingMember { .. } => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::ResolutionMiss
        } else {
            Self::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_io_is_a_miss() {
        let err: DispatchError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(err.is_miss());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: DispatchError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(!err.is_miss());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(DispatchError::Validation("bad".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(DispatchError::invoke("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            DispatchError::provisioning("blog", "no port").to_string(),
            "failed to provision dev instance for blog: no port"
        );
    }
}
