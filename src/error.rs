use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::users::UsernameError;

/// Coarse classification used to pick the HTTP status of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Permission,
    Unauthenticated,
    Conflict,
    Token,
    Internal,
}

impl ErrorCategory {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCategory::Validation | ErrorCategory::Token => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Permission => StatusCode::FORBIDDEN,
            ErrorCategory::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid email or phone number")]
    InvalidIdentifier,

    #[error("This {0} is already in use")]
    DuplicateIdentifier(&'static str),

    #[error("Passwords mismatch")]
    PasswordMismatch,

    #[error("{0}")]
    WeakPassword(&'static str),

    #[error("{0}")]
    InvalidUsername(#[from] UsernameError),

    #[error("{0}")]
    InvalidName(&'static str),

    #[error("You must enter a username, email or phone number")]
    UnrecognizedIdentifier,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Registration is incomplete")]
    RegistrationIncomplete,

    #[error("Sorry, login or password you entered is incorrect. Please check and try again")]
    InvalidCredentials,

    #[error("{0}")]
    PermissionDenied(&'static str),

    #[error("Verification code has been sent to you. Please wait a while to send again")]
    CodeAlreadyPending,

    #[error("Enter the code sent to you")]
    MissingCode,

    #[error("The verification code is incorrect or expired")]
    InvalidOrExpiredCode,

    #[error("You have already liked this {0}")]
    AlreadyLiked(&'static str),

    #[error("Token is invalid or expired")]
    TokenInvalid,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::InvalidIdentifier
            | AppError::DuplicateIdentifier(_)
            | AppError::PasswordMismatch
            | AppError::WeakPassword(_)
            | AppError::InvalidUsername(_)
            | AppError::InvalidName(_)
            | AppError::UnrecognizedIdentifier
            | AppError::MissingCode
            | AppError::InvalidOrExpiredCode
            | AppError::BadRequest(_) => ErrorCategory::Validation,
            AppError::NotFound(_) => ErrorCategory::NotFound,
            AppError::RegistrationIncomplete
            | AppError::InvalidCredentials
            | AppError::PermissionDenied(_) => ErrorCategory::Permission,
            AppError::Unauthorized(_) => ErrorCategory::Unauthenticated,
            AppError::CodeAlreadyPending | AppError::AlreadyLiked(_) => ErrorCategory::Conflict,
            AppError::TokenInvalid => ErrorCategory::Token,
            AppError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let category = self.category();
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => {
                tracing::debug!(error = %other, ?category, "request rejected");
                other.to_string()
            }
        };
        let body = json!({ "success": false, "message": message });
        (category.status(), Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// SQLSTATE 23505: a UNIQUE constraint rejected the write.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
