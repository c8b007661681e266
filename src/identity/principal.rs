use serde::{Deserialize, Serialize};

/// Who is signed in, as resolved from the identity-info endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Sign-on domain of the account.
    pub domain: String,
    /// Email of the account.
    pub account: String,
}
