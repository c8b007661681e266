use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

/// Status and decoded JSON body of a call against a Google API.
/// Bodies that are not JSON decode to `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    /// `error.message` from a Google API error payload.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str())
    }
}

pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("building HTTP client")
}

/// Requests authorized with the OAuth access token of the signed-in user.
#[derive(Clone)]
pub struct GoogleApi {
    client: reqwest::Client,
    token: String,
}

impl GoogleApi {
    pub fn new<S: Into<String>>(client: reqwest::Client, token: S) -> Self {
        Self { client, token: token.into() }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token)).context("access token is not a valid header value")?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        let resp = self.client.get(url).headers(self.headers()?).send().await
            .with_context(|| format!("GET {}", url))?;
        Ok(finish(resp).await)
    }

    pub async fn post(&self, url: &str, body: &Value) -> Result<ApiResponse> {
        let resp = self.client.post(url).headers(self.headers()?).json(body).send().await
            .with_context(|| format!("POST {}", url))?;
        Ok(finish(resp).await)
    }
}

async fn finish(resp: reqwest::Response) -> ApiResponse {
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    ApiResponse { status, body }
}
