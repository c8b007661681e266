//! One-shot user-facing messages queued on a session and drained on the next read.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Success,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Success => "success",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub severity: Severity,
    pub message: String,
}

impl Flash {
    pub fn error<S: Into<String>>(message: S) -> Self { Flash { severity: Severity::Error, message: message.into() } }
    pub fn success<S: Into<String>>(message: S) -> Self { Flash { severity: Severity::Success, message: message.into() } }
}

impl From<&crate::error::AppError> for Flash {
    fn from(err: &crate::error::AppError) -> Self {
        Flash { severity: err.severity(), message: err.message() }
    }
}
