//! Sign-on gate: resolves who is calling and decides whether they may use the tool at all.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use super::principal::Identity;
use super::provider::IdentityProvider;
use super::session::{SessionStore, ACCOUNT_KEY, DOMAIN_KEY};
use crate::error::{AppError, ProfileGap};

/// Sign-on domains permitted to use the tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList(HashSet<String>);

impl AllowList {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowList(domains.into_iter().map(Into::into).collect())
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, domain: &str) -> bool { self.0.contains(domain) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow(Identity),
    RedirectToLogin,
    Deny(AppError),
}

pub fn check_valid_domain(domain: &str, allow_list: &AllowList) -> bool {
    allow_list.contains(domain)
}

/// Pull domain and account email out of an identity-info response body.
pub fn parse_profile(body: &Value) -> Result<Identity, ProfileGap> {
    let domain = body.get("domain").and_then(|v| v.as_str()).ok_or(ProfileGap::Domain)?;
    let emails = match body.get("emails") {
        None | Some(Value::Null) => return Err(ProfileGap::Emails),
        Some(v) => v,
    };
    let account = emails
        .as_array()
        .into_iter()
        .flatten()
        .find(|e| e.get("type").and_then(|t| t.as_str()) == Some("account"))
        .and_then(|e| e.get("value"))
        .and_then(|v| v.as_str())
        .ok_or(ProfileGap::AccountEmail)?;
    Ok(Identity { domain: domain.to_string(), account: account.to_string() })
}

fn cached_identity(session: &dyn SessionStore) -> Option<Identity> {
    Some(Identity { domain: session.get(DOMAIN_KEY)?, account: session.get(ACCOUNT_KEY)? })
}

/// Decide whether the current request may proceed. The profile endpoint is called at most once
/// per session; afterwards the cached domain and account are used.
pub async fn enforce(
    provider: &dyn IdentityProvider,
    allow_list: &AllowList,
    session: &dyn SessionStore,
) -> GateDecision {
    if !provider.authorized() {
        return GateDecision::RedirectToLogin;
    }

    let identity = match cached_identity(session) {
        Some(identity) => identity,
        None => {
            let resp = match provider.fetch_profile().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(target: "gate", "profile fetch failed: {:#}", e);
                    return GateDecision::Deny(AppError::ProfileFetchFailed);
                }
            };
            if !resp.is_success() {
                warn!(target: "gate", status = resp.status, "profile endpoint returned non-success");
                return GateDecision::Deny(AppError::ProfileFetchFailed);
            }
            let identity = match parse_profile(&resp.body) {
                Ok(identity) => identity,
                Err(gap) => {
                    warn!(target: "gate", "incomplete profile: {}", gap);
                    return GateDecision::Deny(AppError::ProfileIncomplete(gap));
                }
            };
            session.set(DOMAIN_KEY, identity.domain.clone());
            session.set(ACCOUNT_KEY, identity.account.clone());
            debug!(target: "gate", account = %identity.account, "profile cached in session");
            identity
        }
    };

    if check_valid_domain(&identity.domain, allow_list) {
        GateDecision::Allow(identity)
    } else {
        warn!(target: "gate", domain = %identity.domain, account = %identity.account, "domain not in allowlist");
        GateDecision::Deny(AppError::DomainNotAllowed { domain: identity.domain })
    }
}
