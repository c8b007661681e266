//! Sign-on identity and session handling.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod gate;

pub use principal::Identity;
pub use session::{SessionStore, SessionManager, SessionHandle, DOMAIN_KEY, ACCOUNT_KEY, TOKEN_KEY};
pub use provider::{IdentityProvider, GoogleIdentityProvider, PROFILE_PATH};
pub use gate::{AllowList, GateDecision, check_valid_domain, enforce, parse_profile};
