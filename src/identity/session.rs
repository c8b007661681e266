use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::flash::Flash;

pub const DOMAIN_KEY: &str = "domain";
pub const ACCOUNT_KEY: &str = "account";
pub const TOKEN_KEY: &str = "token";

/// Key/value view of one session.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
}

#[derive(Debug)]
struct SessionEntry {
    values: HashMap<String, String>,
    flashes: Vec<Flash>,
    csrf: String,
    expires_at: Instant,
}

fn gen_id(len: usize) -> AppResult<String> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::Internal(format!("session id: {}", e)))?;
    let mut out = String::with_capacity(len * 2);
    for b in &buf { let _ = write!(&mut out, "{:02x}", b); }
    Ok(out)
}

/// Server-side sessions keyed by the id carried in the session cookie.
/// Clones share the same table.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    ttl: Duration,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    pub fn issue(&self) -> AppResult<SessionHandle> {
        let sid = gen_id(16)?;
        let csrf = gen_id(32)?;
        let entry = SessionEntry {
            values: HashMap::new(),
            flashes: Vec::new(),
            csrf,
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions.write().insert(sid.clone(), entry);
        debug!(target: "session", ttl_secs = self.ttl.as_secs(), "session.issue");
        Ok(SessionHandle { id: sid, manager: self.clone() })
    }

    /// Handle for a live session; expired sessions are dropped on sight.
    pub fn lookup(&self, sid: &str) -> Option<SessionHandle> {
        let now = Instant::now();
        let expired = {
            let map = self.sessions.read();
            match map.get(sid) {
                Some(ent) if ent.expires_at > now => {
                    return Some(SessionHandle { id: sid.to_string(), manager: self.clone() });
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.sessions.write().remove(sid);
        }
        None
    }

    pub fn logout(&self, sid: &str) -> bool {
        self.sessions.write().remove(sid).is_some()
    }

    /// Remove every expired session, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.sessions.write();
        let before = map.len();
        map.retain(|_, ent| ent.expires_at > now);
        before - map.len()
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// One session inside a [`SessionManager`]. Operations on a session that has since
/// been removed are no-ops.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    manager: SessionManager,
}

impl SessionHandle {
    pub fn id(&self) -> &str { &self.id }

    pub fn csrf_token(&self) -> Option<String> {
        self.manager.sessions.read().get(&self.id).map(|e| e.csrf.clone())
    }

    pub fn push_flash(&self, flash: Flash) {
        if let Some(ent) = self.manager.sessions.write().get_mut(&self.id) {
            ent.flashes.push(flash);
        }
    }

    pub fn take_flashes(&self) -> Vec<Flash> {
        self.manager.sessions.write()
            .get_mut(&self.id)
            .map(|e| std::mem::take(&mut e.flashes))
            .unwrap_or_default()
    }

    /// Record the access token handed over by the OAuth client. A different token may belong to
    /// a different account, so the cached identity is dropped with it.
    pub fn adopt_token(&self, token: &str) {
        let mut map = self.manager.sessions.write();
        let Some(ent) = map.get_mut(&self.id) else { return; };
        if ent.values.get(TOKEN_KEY).map(|t| t.as_str()) == Some(token) { return; }
        ent.values.remove(DOMAIN_KEY);
        ent.values.remove(ACCOUNT_KEY);
        ent.values.insert(TOKEN_KEY.to_string(), token.to_string());
    }
}

impl SessionStore for SessionHandle {
    fn get(&self, key: &str) -> Option<String> {
        self.manager.sessions.read().get(&self.id).and_then(|e| e.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) {
        if let Some(ent) = self.manager.sessions.write().get_mut(&self.id) {
            ent.values.insert(key.to_string(), value);
        }
    }
}
