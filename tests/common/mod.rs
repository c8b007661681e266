//! In-process stand-in for the Google identity and resource-manager APIs, bound to an ephemeral
//! localhost port. Tests flip its canned responses and inspect what it received.
#![allow(dead_code)]

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct FakeGoogleState {
    pub profile_status: u16,
    pub profile_body: Value,
    pub get_status: u16,
    pub policy: Value,
    pub set_status: u16,
    pub set_body: Option<Value>,
    pub profile_calls: usize,
    pub get_calls: Vec<(String, Value)>,
    pub set_calls: Vec<(String, Value)>,
    pub auth_headers: Vec<String>,
}

impl Default for FakeGoogleState {
    fn default() -> Self {
        Self {
            profile_status: 200,
            profile_body: json!({
                "domain": "acme.com",
                "emails": [{"type": "account", "value": "a@acme.com"}]
            }),
            get_status: 200,
            policy: json!({
                "version": 1,
                "etag": "BwWWja0YfJA=",
                "bindings": [{"role": "roles/owner", "members": ["user:root@acme.com"]}]
            }),
            set_status: 200,
            set_body: None,
            profile_calls: 0,
            get_calls: Vec::new(),
            set_calls: Vec::new(),
            auth_headers: Vec::new(),
        }
    }
}

pub type Shared = Arc<Mutex<FakeGoogleState>>;

pub struct FakeGoogle {
    pub base: String,
    pub state: Shared,
    handle: JoinHandle<()>,
}

impl FakeGoogle {
    pub fn identity_base(&self) -> String { self.base.clone() }
    pub fn resource_manager_base(&self) -> String { format!("{}/v1/projects", self.base) }
}

impl Drop for FakeGoogle {
    fn drop(&mut self) { self.handle.abort(); }
}

fn record_auth(state: &Shared, headers: &HeaderMap) {
    if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.lock().auth_headers.push(v.to_string());
    }
}

fn status(code: u16) -> StatusCode { StatusCode::from_u16(code).unwrap() }

async fn profile(State(state): State<Shared>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    record_auth(&state, &headers);
    let mut s = state.lock();
    s.profile_calls += 1;
    (status(s.profile_status), Json(s.profile_body.clone()))
}

async fn project_method(
    State(state): State<Shared>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    record_auth(&state, &headers);
    let (project, method) = action.rsplit_once(':').unwrap_or((action.as_str(), ""));
    let mut s = state.lock();
    match method {
        "getIamPolicy" => {
            s.get_calls.push((project.to_string(), body));
            if s.get_status == 200 {
                (StatusCode::OK, Json(s.policy.clone()))
            } else {
                (status(s.get_status), Json(json!({"error": {"code": s.get_status, "message": "denied"}})))
            }
        }
        "setIamPolicy" => {
            s.set_calls.push((project.to_string(), body.clone()));
            if s.set_status == 200 {
                let written = body.get("policy").cloned().unwrap_or(Value::Null);
                (StatusCode::OK, Json(written))
            } else {
                let reply = s.set_body.clone().unwrap_or(Value::Null);
                (status(s.set_status), Json(reply))
            }
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": {"message": "unknown method"}}))),
    }
}

pub async fn spawn_router(app: Router) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("test server error: {e:?}");
        }
    });
    (format!("http://{}", addr), handle)
}

pub async fn start_fake_google(state: FakeGoogleState) -> FakeGoogle {
    let shared: Shared = Arc::new(Mutex::new(state));
    let app = Router::new()
        .route("/plus/v1/people/me", get(profile))
        .route("/v1/projects/{action}", post(project_method))
        .with_state(shared.clone());
    let (base, handle) = spawn_router(app).await;
    FakeGoogle { base, state: shared, handle }
}
