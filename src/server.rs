//!
//! gimme HTTP server
//! ------------------
//! Axum front end for the grant flow.
//!
//! Responsibilities:
//! - Server-side sessions behind an HttpOnly cookie, with a per-session CSRF token.
//! - Picking up the access token forwarded by the external OAuth client.
//! - Running the sign-on gate in front of every route that touches user data.
//! - Turning grant form posts into conditional IAM bindings.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::FormRejection;
use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Extension, Form, Json, Router};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::flash::Flash;
use crate::grant::{grant_access, GrantRequest, ResourceManagerClient};
use crate::identity::{enforce, AllowList, GateDecision, GoogleIdentityProvider, Identity, SessionHandle, SessionManager, SessionStore, TOKEN_KEY};
use crate::remote::{build_http_client, GoogleApi};

pub const SESSION_COOKIE: &str = "gimme_session";
pub const ACCESS_TOKEN_HEADER: &str = "x-forwarded-access-token";
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Longest grant the form accepts: one week.
pub const MAX_PERIOD_MINUTES: u32 = 7 * 24 * 60;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub allow_list: Arc<AllowList>,
    pub sessions: SessionManager,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = build_http_client(config.http_timeout_secs)?;
        let sessions = SessionManager::new(Duration::from_secs(config.session_ttl_secs));
        let allow_list = AllowList::new(config.allowed_domains.iter().cloned());
        Ok(Self { config: Arc::new(config), allow_list: Arc::new(allow_list), sessions, http })
    }
}

pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/", get(index))
        .route("/csrf", get(get_csrf))
        .route("/grant", post(grant))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login))
        .route_layer(middleware::from_fn_with_state(state.clone(), attach_session));

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/logout", post(logout))
        .merge(gated)
        .with_state(state)
}

fn log_startup(state: &AppState) {
    let config = &state.config;
    info!(
        target: "startup",
        "gimme starting: bind={}:{}, login_url={}, identity_api={}, resource_manager={}, session_ttl_secs={}, secure_cookies={}",
        config.bind_addr, config.http_port, config.login_url, config.identity_api_base,
        config.resource_manager_base, config.session_ttl_secs, config.secure_cookies
    );
    if state.allow_list.is_empty() {
        warn!(target: "startup", "no allowed domains configured; every sign-in will be refused");
    } else {
        info!(target: "startup", "allowed domains: {}", config.allowed_domains.join(", "));
    }
}

/// Start the HTTP server and block until it stops.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.http_port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind_addr, config.http_port))?;
    let state = AppState::new(config)?;
    log_startup(&state);

    // Background session sweeper
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                let removed = sessions.sweep();
                if removed > 0 { debug!(target: "session", removed = removed, "session_sweep"); }
            }
        });
    }

    let app = router(state);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all("cookie").iter() {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

fn session_cookie(sid: &str, secure: bool) -> Option<HeaderValue> {
    let secure = if secure { " Secure;" } else { "" };
    HeaderValue::from_str(&format!("{}={}; HttpOnly;{} SameSite=Strict; Path=/", SESSION_COOKIE, sid, secure)).ok()
}

fn clear_session_cookie(secure: bool) -> Option<HeaderValue> {
    let secure = if secure { " Secure;" } else { "" };
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly;{} SameSite=Strict; Path=/",
        SESSION_COOKIE, secure
    )).ok()
}

fn validate_csrf(session: &SessionHandle, headers: &HeaderMap) -> bool {
    let Some(provided) = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) else { return false; };
    session.csrf_token().as_deref() == Some(provided)
}

fn forwarded_token(headers: &HeaderMap) -> Option<String> {
    let token = headers.get(ACCESS_TOKEN_HEADER)?.to_str().ok()?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Find the caller's session and record any forwarded access token on it. A new session is only
/// started for callers that bring a token; anonymous requests pass through without one.
async fn attach_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = forwarded_token(req.headers());
    let existing = parse_cookie(req.headers(), SESSION_COOKIE).and_then(|sid| state.sessions.lookup(&sid));
    let (session, fresh) = match (existing, &token) {
        (Some(session), _) => (session, false),
        (None, Some(_)) => match state.sessions.issue() {
            Ok(session) => (session, true),
            Err(e) => {
                error!(target: "session", "could not start session: {}", e);
                return e.into_response();
            }
        },
        (None, None) => return next.run(req).await,
    };
    if let Some(token) = &token {
        session.adopt_token(token);
    }
    req.extensions_mut().insert(session.clone());

    let mut resp = next.run(req).await;
    if fresh {
        if let Some(cookie) = session_cookie(session.id(), state.config.secure_cookies) {
            resp.headers_mut().append(SET_COOKIE, cookie);
        }
    }
    resp
}

/// The sign-on gate as a route layer: either short-circuits with a redirect or a "sorry"
/// response, or runs the route with the resolved [`Identity`] attached.
async fn require_login(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(session) = req.extensions().get::<SessionHandle>().cloned() else {
        return Redirect::to(&state.config.login_url).into_response();
    };
    let provider = GoogleIdentityProvider::new(state.http.clone(), &state.config.identity_api_base, session.get(TOKEN_KEY));
    match enforce(&provider, &state.allow_list, &session).await {
        GateDecision::Allow(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        GateDecision::RedirectToLogin => Redirect::to(&state.config.login_url).into_response(),
        GateDecision::Deny(err) => err.into_response(),
    }
}

async fn index(Extension(session): Extension<SessionHandle>, Extension(identity): Extension<Identity>) -> impl IntoResponse {
    Json(serde_json::json!({
        "account": identity.account,
        "domain": identity.domain,
        "flashes": session.take_flashes(),
    }))
}

async fn get_csrf(Extension(session): Extension<SessionHandle>) -> Response {
    match session.csrf_token() {
        Some(token) => Json(serde_json::json!({"status": "ok", "csrf": token})).into_response(),
        None => AppError::Internal("csrf not available".into()).into_response(),
    }
}

/// Fields of the grant form.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantForm {
    pub project: String,
    pub period: u32,
    pub target: String,
    pub domain: String,
    pub access: String,
}

impl GrantForm {
    pub fn validate(self) -> Result<GrantRequest, AppError> {
        if self.period == 0 || self.period > MAX_PERIOD_MINUTES {
            return Err(AppError::BadRequest(format!("period must be between 1 and {} minutes", MAX_PERIOD_MINUTES)));
        }
        for (name, value) in [("project", &self.project), ("target", &self.target), ("domain", &self.domain), ("access", &self.access)] {
            if value.trim().is_empty() {
                return Err(AppError::BadRequest(format!("{} is required", name)));
            }
        }
        Ok(GrantRequest {
            project: self.project.trim().to_string(),
            period_minutes: self.period,
            target: self.target.trim().to_string(),
            domain: self.domain.trim().to_string(),
            role: self.access.trim().to_string(),
        })
    }
}

async fn grant(
    State(state): State<AppState>,
    Extension(session): Extension<SessionHandle>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    form: Result<Form<GrantForm>, FormRejection>,
) -> Response {
    if !validate_csrf(&session, &headers) {
        return AppError::Csrf.into_response();
    }
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return AppError::BadRequest(rejection.body_text()).into_response(),
    };
    let request = match form.validate() {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    let Some(token) = session.get(TOKEN_KEY) else {
        return AppError::AuthenticationMissing.into_response();
    };
    let client = ResourceManagerClient::new(GoogleApi::new(state.http.clone(), token), &state.config.resource_manager_base);

    match grant_access(&client, &request, &identity.account).await {
        Ok(granted) => {
            let flash = Flash::success(granted.message());
            session.push_flash(flash.clone());
            (StatusCode::OK, Json(serde_json::json!({
                "severity": flash.severity,
                "message": flash.message,
                "grant": granted,
            }))).into_response()
        }
        Err(e) => {
            session.push_flash(Flash::from(&e));
            e.into_response()
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) = parse_cookie(&headers, SESSION_COOKIE).and_then(|sid| state.sessions.lookup(&sid)) else {
        return AppError::Csrf.into_response();
    };
    if !validate_csrf(&session, &headers) {
        return AppError::Csrf.into_response();
    }
    state.sessions.logout(session.id());
    let mut h = HeaderMap::new();
    if let Some(cookie) = clear_session_cookie(state.config.secure_cookies) {
        h.insert(SET_COOKIE, cookie);
    }
    (StatusCode::OK, h, Json(serde_json::json!({"status": "ok"}))).into_response()
}
