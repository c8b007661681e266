use anyhow::Result;
use async_trait::async_trait;

use crate::remote::{ApiResponse, GoogleApi};

pub const PROFILE_PATH: &str = "/plus/v1/people/me";

/// Source of the signed-in user's identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Whether the OAuth client holds a token for this session.
    fn authorized(&self) -> bool;

    /// Raw response of the identity-info endpoint.
    async fn fetch_profile(&self) -> Result<ApiResponse>;
}

/// Identity provider backed by the Google People endpoint, using the access token
/// the external OAuth client placed in the session.
pub struct GoogleIdentityProvider {
    api: Option<GoogleApi>,
    profile_url: String,
}

impl GoogleIdentityProvider {
    pub fn new(client: reqwest::Client, api_base: &str, token: Option<String>) -> Self {
        Self {
            api: token.map(|t| GoogleApi::new(client, t)),
            profile_url: format!("{}{}", api_base.trim_end_matches('/'), PROFILE_PATH),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn authorized(&self) -> bool { self.api.is_some() }

    async fn fetch_profile(&self) -> Result<ApiResponse> {
        let Some(api) = &self.api else {
            return Err(anyhow::anyhow!("no access token in session"));
        };
        api.get(&self.profile_url).await
    }
}
