//! Unified application error model and mapping helpers.
//! Every failure in the sign-on gate and the grant flow maps to exactly one variant here,
//! which in turn carries the user-facing message, a stable code and an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::flash::Severity;

/// Which part of the identity-info response was unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileGap {
    Domain,
    Emails,
    AccountEmail,
}

impl std::fmt::Display for ProfileGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileGap::Domain => write!(f, "The response from the Google Plus API is missing a required field: domain"),
            ProfileGap::Emails => write!(f, "The response from the Google Plus API is missing a required field: emails"),
            ProfileGap::AccountEmail => write!(f, "The response from the Google Plus API did not include an email of type: account"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    #[error("You need to log in first")]
    AuthenticationMissing,
    #[error("Could not get your profile information from Google")]
    ProfileFetchFailed,
    #[error("{0}")]
    ProfileIncomplete(ProfileGap),
    #[error("The account you are logged in with does not match the configured whitelist")]
    DomainNotAllowed { domain: String },
    #[error("Could not find project ID in provided URL")]
    ProjectNotResolved,
    #[error("Could not fetch IAM policy for: {project}. This likely means the project ID was invalid or you do not have access to that project.")]
    PolicyFetchFailed { project: String },
    #[error("Could not apply new policy: {message}")]
    PolicyWriteFailed { message: String },
    #[error("invalid csrf token")]
    Csrf,
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::AuthenticationMissing => "authentication_missing",
            AppError::ProfileFetchFailed => "profile_fetch_failed",
            AppError::ProfileIncomplete(_) => "profile_incomplete",
            AppError::DomainNotAllowed { .. } => "domain_not_allowed",
            AppError::ProjectNotResolved => "project_not_resolved",
            AppError::PolicyFetchFailed { .. } => "policy_fetch_failed",
            AppError::PolicyWriteFailed { .. } => "policy_write_failed",
            AppError::Csrf => "csrf",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn message(&self) -> String { self.to_string() }

    /// Every error surfaces to the user with the `error` tag.
    pub fn severity(&self) -> Severity { Severity::Error }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::AuthenticationMissing => 401,
            AppError::ProfileFetchFailed
            | AppError::ProfileIncomplete(_)
            | AppError::DomainNotAllowed { .. }
            | AppError::Csrf => 403,
            AppError::ProjectNotResolved | AppError::BadRequest(_) => 400,
            AppError::PolicyFetchFailed { .. } | AppError::PolicyWriteFailed { .. } => 502,
            AppError::Internal(_) => 500,
        }
    }

    /// Failures produced by the sign-on gate, rendered as the fixed "sorry" response.
    pub fn is_gate_failure(&self) -> bool {
        matches!(
            self,
            AppError::ProfileFetchFailed | AppError::ProfileIncomplete(_) | AppError::DomainNotAllowed { .. }
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let label = if self.is_gate_failure() { "sorry" } else { "error" };
        let body = serde_json::json!({
            "status": label,
            "code": self.code_str(),
            "severity": self.severity().as_str(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}
