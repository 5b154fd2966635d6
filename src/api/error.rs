//! # API Error Types
//!
//! Maps service errors to HTTP status codes and JSON bodies. Detailed
//! messages always reach the operator log; callers only see them in the
//! development environment.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Environment;
use crate::issuer::IssueError;
use crate::service::ServiceError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "FORBIDDEN").
    pub code: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request parameters are invalid (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid bearer token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credential not in a renderable state (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Concurrent issuance could not be settled; re-read and retry (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). `detail` is logged, `public` is returned.
    #[error("internal error: {detail}")]
    Internal { public: String, detail: String },
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "RECORD_NOT_APPROVED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "ISSUANCE_CONFLICT"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    pub fn internal(detail: impl ToString, environment: Environment) -> Self {
        let detail = detail.to_string();
        let public = if environment.exposes_error_details() {
            detail.clone()
        } else {
            "An internal error occurred".to_string()
        };
        Self::Internal { public, detail }
    }

    /// Translate a service failure, choosing message detail by environment.
    pub fn from_service(err: ServiceError, environment: Environment) -> Self {
        let detail = err.to_string();
        let pick = |generic: &str| {
            if environment.exposes_error_details() {
                detail.clone()
            } else {
                generic.to_string()
            }
        };

        match &err {
            ServiceError::NotFound(_) => Self::NotFound(pick("Credential not found")),
            ServiceError::NotApproved { .. } => Self::Forbidden(pick("Credential is not approved")),
            ServiceError::Issue(IssueError::Conflict { .. }) => {
                Self::Conflict(pick("Issuance conflict, re-read the credential and retry"))
            }
            ServiceError::Render(render) => Self::Internal {
                public: pick(render.public_message()),
                detail,
            },
            ServiceError::Issue(_) | ServiceError::Store(_) => Self::Internal {
                public: pick("An internal error occurred"),
                detail,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal { public, detail } => {
                tracing::error!(error = %detail, "internal server error");
                public.clone()
            }
            Self::Conflict(msg) => {
                tracing::warn!(error = %msg, "issuance conflict");
                msg.clone()
            }
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg) => msg.clone(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialId, CredentialStatus};
    use crate::render::RenderError;

    #[test]
    fn not_approved_is_forbidden() {
        let err = AppError::from_service(
            ServiceError::NotApproved {
                id: CredentialId::new("c1"),
                status: CredentialStatus::Rejected,
            },
            Environment::Production,
        );
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(code, "RECORD_NOT_APPROVED");
    }

    #[test]
    fn production_hides_render_detail() {
        let err = AppError::from_service(
            ServiceError::Render(RenderError::AssetMissing("/srv/secret/bg.png".to_string())),
            Environment::Production,
        );
        match err {
            AppError::Internal { public, detail } => {
                assert!(!public.contains("/srv"));
                assert!(detail.contains("/srv"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn development_shows_render_detail() {
        let err = AppError::from_service(
            ServiceError::Render(RenderError::AssetMissing("/srv/secret/bg.png".to_string())),
            Environment::Development,
        );
        match err {
            AppError::Internal { public, .. } => assert!(public.contains("/srv")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn issuance_conflict_is_409() {
        let err = AppError::from_service(
            ServiceError::Issue(IssueError::Conflict {
                id: CredentialId::new("c1"),
                reason: "lost race".to_string(),
            }),
            Environment::Production,
        );
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
    }
}
