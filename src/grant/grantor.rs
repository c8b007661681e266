//! The grant flow: resolve the project, read its policy, append one expiring binding, write it back.
//!
//! The read and the write are not atomic. The fetched `etag` travels back with the write, so a
//! policy that changed in between is rejected by the remote API instead of being overwritten;
//! that rejection surfaces as a failed write and is not retried.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::client::PolicyApi;
use super::policy::{user_member, Binding, Policy};
use super::project::resolve_project_id;
use crate::error::{AppError, AppResult};

pub const GRANTED_MESSAGE: &str = "Great success, they'll have access in a minute!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    /// Console URL or raw project ID.
    pub project: String,
    pub period_minutes: u32,
    /// User name of the grantee, without domain.
    pub target: String,
    pub domain: String,
    pub role: String,
}

/// What was written, for logging and the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub project: String,
    pub member: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

impl Grant {
    pub fn message(&self) -> &'static str { GRANTED_MESSAGE }
}

pub async fn grant_access(api: &dyn PolicyApi, request: &GrantRequest, acting_account: &str) -> AppResult<Grant> {
    grant_access_at(api, request, acting_account, Utc::now()).await
}

/// [`grant_access`] with the current time supplied by the caller.
pub async fn grant_access_at(
    api: &dyn PolicyApi,
    request: &GrantRequest,
    acting_account: &str,
    now: DateTime<Utc>,
) -> AppResult<Grant> {
    let project = resolve_project_id(&request.project);
    if project.is_empty() {
        return Err(AppError::ProjectNotResolved);
    }
    info!(
        target: "grant",
        %project, target_user = %request.target, domain = %request.domain, role = %request.role,
        granted_by = %acting_account, period_minutes = request.period_minutes,
        "grant requested"
    );

    let fetched = match api.get_iam_policy(&project).await {
        Ok(resp) if resp.is_success() => resp,
        Ok(resp) => {
            error!(target: "grant", %project, status = resp.status, "getIamPolicy failed");
            return Err(AppError::PolicyFetchFailed { project });
        }
        Err(e) => {
            error!(target: "grant", %project, "getIamPolicy failed: {:#}", e);
            return Err(AppError::PolicyFetchFailed { project });
        }
    };
    let mut policy: Policy = serde_json::from_value(fetched.body).map_err(|e| {
        error!(target: "grant", %project, "unreadable policy: {}", e);
        AppError::PolicyFetchFailed { project: project.clone() }
    })?;

    let expires_at = now
        .checked_add_signed(Duration::minutes(i64::from(request.period_minutes)))
        .ok_or_else(|| AppError::BadRequest(format!("period of {} minutes is out of range", request.period_minutes)))?;
    let member = user_member(&request.target, &request.domain);
    policy.add_binding(Binding::expiring(&request.role, member.clone(), acting_account, expires_at));

    let body = json!({ "policy": policy });
    let written = match api.set_iam_policy(&project, &body).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(target: "grant", %project, "setIamPolicy failed: {:#}", e);
            return Err(AppError::PolicyWriteFailed { message: format!("{:#}", e) });
        }
    };
    if !written.is_success() {
        let message = written
            .error_message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", written.status));
        error!(target: "grant", %project, status = written.status, %message, "setIamPolicy rejected");
        return Err(AppError::PolicyWriteFailed { message });
    }

    info!(
        target: "grant",
        %project, %member, role = %request.role, granted_by = %acting_account, expires_at = %expires_at,
        "conditional binding added"
    );
    Ok(Grant { project, member, role: request.role.clone(), expires_at })
}
