use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::policy::CONDITIONAL_POLICY_VERSION;
use crate::remote::{ApiResponse, GoogleApi};

/// Project-level IAM policy endpoints. `project` is already URL encoded.
#[async_trait]
pub trait PolicyApi: Send + Sync {
    async fn get_iam_policy(&self, project: &str) -> Result<ApiResponse>;
    async fn set_iam_policy(&self, project: &str, body: &Value) -> Result<ApiResponse>;
}

pub struct ResourceManagerClient {
    api: GoogleApi,
    base: String,
}

impl ResourceManagerClient {
    pub fn new(api: GoogleApi, base: &str) -> Self {
        Self { api, base: base.trim_end_matches('/').to_string() }
    }

    pub fn method_url(&self, project: &str, method: &str) -> String {
        format!("{}/{}:{}", self.base, project, method)
    }
}

#[async_trait]
impl PolicyApi for ResourceManagerClient {
    async fn get_iam_policy(&self, project: &str) -> Result<ApiResponse> {
        let body = json!({"options": {"requestedPolicyVersion": CONDITIONAL_POLICY_VERSION}});
        self.api.post(&self.method_url(project, "getIamPolicy"), &body).await
    }

    async fn set_iam_policy(&self, project: &str, body: &Value) -> Result<ApiResponse> {
        self.api.post(&self.method_url(project, "setIamPolicy"), body).await
    }
}
