use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tokens::TokenPair;
use crate::users::model::{AuthStatus, AuthType};

/// Request body for signup.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email_phone_number: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub success: bool,
    pub id: Uuid,
    pub username: String,
    pub auth_type: AuthType,
    pub auth_status: AuthStatus,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub code: Option<String>,
}

/// Returned whenever an operation changes the account status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: &'static str,
    pub auth_status: AuthStatus,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

impl MessageResponse {
    pub fn ok(message: &'static str) -> Self {
        Self {
            success: true,
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_input: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub auth_status: AuthStatus,
    pub full_name: String,
}

/// Request body for token refresh and logout.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email_or_phone: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// The caller's own profile.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub auth_type: AuthType,
    pub auth_status: AuthStatus,
    pub photo: Option<String>,
}
