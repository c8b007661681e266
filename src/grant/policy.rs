//! IAM policy documents as exchanged with the resource-manager API.
//!
//! Only `bindings`, `version` and `etag` are interpreted. Every other field of the fetched
//! document, at any level, is kept in `extra` and written back untouched.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Policy format that supports conditional bindings.
pub const CONDITIONAL_POLICY_VERSION: i64 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Concurrency token of the fetched policy. Writing it back unchanged lets the remote API
    /// reject the write if the policy changed in between.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub members: Vec<String>,
    pub role: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// ISO-8601 rendering of an instant in UTC with a `+00:00` offset.
pub fn format_expiry(expiry: DateTime<Utc>) -> String {
    expiry.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn expiry_expression(expiry: DateTime<Utc>) -> String {
    format!("request.time < timestamp(\"{}\")", format_expiry(expiry))
}

pub fn user_member(target: &str, domain: &str) -> String {
    format!("user:{}@{}", target, domain)
}

impl Binding {
    /// A binding of `role` to a single user that stops applying at `expiry`.
    pub fn expiring(role: &str, member: String, granted_by: &str, expiry: DateTime<Utc>) -> Self {
        Binding {
            condition: Some(Condition {
                expression: expiry_expression(expiry),
                title: Some(format!("granted by {}", granted_by)),
                extra: Map::new(),
            }),
            members: vec![member],
            role: role.to_string(),
            extra: Map::new(),
        }
    }
}

impl Policy {
    /// Append a binding, raising the policy format so the condition is honoured.
    pub fn add_binding(&mut self, binding: Binding) {
        if self.version.unwrap_or(0) < CONDITIONAL_POLICY_VERSION {
            self.version = Some(CONDITIONAL_POLICY_VERSION);
        }
        self.bindings.push(binding);
    }
}
