use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::AuthStatus;

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[serde(alias = "Access")]
    Access,
    #[serde(alias = "Refresh")]
    Refresh,
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,          // user ID
    pub iat: usize,         // issued at (unix timestamp)
    pub exp: usize,         // expires at (unix timestamp)
    pub iss: String,        // issuer
    pub aud: String,        // audience
    pub kind: TokenKind,    // token type
    pub jti: Uuid,          // token id, the blacklist key
    pub status: AuthStatus, // account status when signed
}

/// Token pair handed out on signup, verification and login.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}
