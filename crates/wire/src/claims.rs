use serde::{Deserialize, Serialize};

/// Claims carried by the auth bearer token, beyond the standard `exp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub uid: u64,
    pub idp: String,
    pub app_id: String,
    /// Standard expiry claim, seconds since the epoch. Required by
    /// `jsonwebtoken`'s default validation.
    pub exp: u64,
}
