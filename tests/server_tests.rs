//! End-to-end tests: the gimme router on an ephemeral port, talking to the fake Google APIs.

mod common;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION};
use reqwest::StatusCode;
use serde_json::{json, Value};

use gimme::config::Config;
use gimme::identity::SessionManager;
use gimme::server::{router, AppState, ACCESS_TOKEN_HEADER, CSRF_HEADER};

use common::{spawn_router, start_fake_google, FakeGoogle, FakeGoogleState};

struct Harness {
    base: String,
    google: FakeGoogle,
    sessions: SessionManager,
    _server: tokio::task::JoinHandle<()>,
}

impl Drop for Harness {
    fn drop(&mut self) { self._server.abort(); }
}

async fn start(google_state: FakeGoogleState, allowed: &[&str]) -> Result<Harness> {
    let google = start_fake_google(google_state).await;
    let config = Config {
        allowed_domains: allowed.iter().map(|d| d.to_string()).collect(),
        login_url: "/login/google".into(),
        identity_api_base: google.identity_base(),
        resource_manager_base: google.resource_manager_base(),
        secure_cookies: false,
        http_timeout_secs: 5,
        ..Config::default()
    };
    let state = AppState::new(config)?;
    let sessions = state.sessions.clone();
    let (base, server) = spawn_router(router(state)).await;
    Ok(Harness { base, google, sessions, _server: server })
}

fn client(token: Option<&str>) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Some(t) = token {
        headers.insert(ACCESS_TOKEN_HEADER, HeaderValue::from_str(t)?);
    }
    Ok(reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .default_headers(headers)
        .build()?)
}

async fn csrf(c: &reqwest::Client, base: &str) -> Result<String> {
    let v: Value = c.get(format!("{}/csrf", base)).send().await?.json().await?;
    Ok(v["csrf"].as_str().unwrap_or_default().to_string())
}

fn grant_form(project: &str) -> Vec<(&'static str, String)> {
    vec![
        ("project", project.to_string()),
        ("period", "30".to_string()),
        ("target", "bob".to_string()),
        ("domain", "acme.com".to_string()),
        ("access", "roles/viewer".to_string()),
    ]
}

#[tokio::test]
async fn health_is_open() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["acme.com"]).await?;
    let resp = client(None)?.get(format!("{}/healthz", h.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await?, "ok");
    Ok(())
}

#[tokio::test]
async fn missing_token_redirects_to_login() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["acme.com"]).await?;
    let resp = client(None)?.get(format!("{}/", h.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()), Some("/login/google"));
    assert_eq!(h.google.state.lock().profile_calls, 0);
    Ok(())
}

#[tokio::test]
async fn anonymous_requests_leave_no_sessions_behind() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["acme.com"]).await?;
    let c = client(None)?;
    for _ in 0..20 {
        let resp = c.get(format!("{}/", h.base)).send().await?;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert!(resp.headers().get(reqwest::header::SET_COOKIE).is_none());
    }
    assert_eq!(h.sessions.len(), 0);

    let resp = client(Some("tok"))?.get(format!("{}/", h.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.sessions.len(), 1);
    Ok(())
}

#[tokio::test]
async fn signed_in_user_sees_identity_and_profile_is_fetched_once() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["acme.com"]).await?;
    let c = client(Some("tok-1"))?;
    for _ in 0..3 {
        let resp = c.get(format!("{}/", h.base)).send().await?;
        assert_eq!(resp.status(), StatusCode::OK);
        let v: Value = resp.json().await?;
        assert_eq!(v["account"], json!("a@acme.com"));
        assert_eq!(v["domain"], json!("acme.com"));
    }
    let s = h.google.state.lock();
    assert_eq!(s.profile_calls, 1);
    assert_eq!(s.auth_headers, vec!["Bearer tok-1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn foreign_domain_gets_sorry() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["other.com"]).await?;
    let resp = client(Some("tok"))?.get(format!("{}/", h.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let v: Value = resp.json().await?;
    assert_eq!(v["status"], json!("sorry"));
    assert_eq!(v["severity"], json!("error"));
    assert_eq!(v["message"], json!("The account you are logged in with does not match the configured whitelist"));
    Ok(())
}

#[tokio::test]
async fn profile_failure_gets_sorry() -> Result<()> {
    let h = start(FakeGoogleState { profile_status: 500, ..Default::default() }, &["acme.com"]).await?;
    let resp = client(Some("tok"))?.get(format!("{}/", h.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let v: Value = resp.json().await?;
    assert_eq!(v["message"], json!("Could not get your profile information from Google"));
    Ok(())
}

#[tokio::test]
async fn grant_end_to_end() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["acme.com"]).await?;
    let c = client(Some("tok-9"))?;
    let token = csrf(&c, &h.base).await?;
    assert!(!token.is_empty());

    let resp = c.post(format!("{}/grant", h.base))
        .header(CSRF_HEADER, &token)
        .form(&grant_form("https://console.cloud.google.com/home?project=my-proj"))
        .send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Value = resp.json().await?;
    assert_eq!(v["severity"], json!("success"));
    assert_eq!(v["message"], json!("Great success, they'll have access in a minute!"));
    assert_eq!(v["grant"]["member"], json!("user:bob@acme.com"));

    {
        let s = h.google.state.lock();
        assert_eq!(s.set_calls.len(), 1);
        let binding = &s.set_calls[0].1["policy"]["bindings"][1];
        assert_eq!(binding["condition"]["title"], json!("granted by a@acme.com"));
        assert_eq!(binding["role"], json!("roles/viewer"));
        assert!(binding["condition"]["expression"].as_str().unwrap_or_default().starts_with("request.time < timestamp(\""));
    }

    // the outcome is also queued as a flash and drained by the next page view
    let v: Value = c.get(format!("{}/", h.base)).send().await?.json().await?;
    assert_eq!(v["flashes"], json!([{"severity": "success", "message": "Great success, they'll have access in a minute!"}]));
    let v: Value = c.get(format!("{}/", h.base)).send().await?.json().await?;
    assert_eq!(v["flashes"], json!([]));
    Ok(())
}

#[tokio::test]
async fn grant_requires_csrf() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["acme.com"]).await?;
    let c = client(Some("tok"))?;
    let _ = csrf(&c, &h.base).await?;
    let resp = c.post(format!("{}/grant", h.base))
        .header(CSRF_HEADER, "not-the-token")
        .form(&grant_form("my-proj"))
        .send().await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(h.google.state.lock().get_calls.is_empty());
    Ok(())
}

#[tokio::test]
async fn grant_errors_are_reported() -> Result<()> {
    let h = start(FakeGoogleState { get_status: 403, ..Default::default() }, &["acme.com"]).await?;
    let c = client(Some("tok"))?;
    let token = csrf(&c, &h.base).await?;

    let resp = c.post(format!("{}/grant", h.base))
        .header(CSRF_HEADER, &token)
        .form(&grant_form("https://console.cloud.google.com/home"))
        .send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v: Value = resp.json().await?;
    assert_eq!(v["message"], json!("Could not find project ID in provided URL"));

    let resp = c.post(format!("{}/grant", h.base))
        .header(CSRF_HEADER, &token)
        .form(&grant_form("secret-proj"))
        .send().await?;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let v: Value = resp.json().await?;
    assert_eq!(v["code"], json!("policy_fetch_failed"));
    assert!(v["message"].as_str().unwrap_or_default().contains("secret-proj"));
    assert!(h.google.state.lock().set_calls.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_grant_form_is_a_bad_request() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["acme.com"]).await?;
    let c = client(Some("tok"))?;
    let token = csrf(&c, &h.base).await?;

    for period in ["abc", "-5"] {
        let mut form = grant_form("my-proj");
        form[1].1 = period.to_string();
        let resp = c.post(format!("{}/grant", h.base))
            .header(CSRF_HEADER, &token)
            .form(&form)
            .send().await?;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "period={}", period);
        let v: Value = resp.json().await?;
        assert_eq!(v["code"], json!("bad_request"));
        assert_eq!(v["severity"], json!("error"));
        assert!(v["message"].as_str().unwrap_or_default().contains("period"));
    }
    assert!(h.google.state.lock().get_calls.is_empty());
    Ok(())
}

#[tokio::test]
async fn logout_ends_the_session() -> Result<()> {
    let h = start(FakeGoogleState::default(), &["acme.com"]).await?;
    let c = client(Some("tok"))?;
    let token = csrf(&c, &h.base).await?;

    let resp = c.post(format!("{}/logout", h.base)).header(CSRF_HEADER, &token).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // a new session starts, so the profile is fetched again
    let resp = c.get(format!("{}/", h.base)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.google.state.lock().profile_calls, 2);
    Ok(())
}
