use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::context::Actor;
use crate::error::AppError;
use crate::tokens::claims::TokenKind;
use crate::tokens::jwt::JwtKeys;

/// Extracts and validates the bearer access token.
#[derive(Debug)]
pub struct AuthUser(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthorized("Missing Authorization header"))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized("Invalid Authorization header"))?;

        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            AppError::Unauthorized("Invalid or expired token")
        })?;

        if claims.kind != TokenKind::Access {
            return Err(AppError::Unauthorized("Access token required"));
        }

        Ok(AuthUser(Actor {
            id: claims.sub,
            status: claims.status,
        }))
    }
}

/// An authenticated caller whose registration is finished.
#[derive(Debug)]
pub struct ActiveUser(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for ActiveUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        actor.require_active()?;
        Ok(ActiveUser(actor))
    }
}
