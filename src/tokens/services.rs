use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::context::Actor;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::tokens::claims::TokenPair;
use crate::tokens::jwt::JwtKeys;
use crate::users::{classify_login_input, password, LoginInput, User};

pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
}

async fn resolve_login_user(st: &AppState, user_input: &str) -> AppResult<User> {
    let found = match classify_login_input(user_input)? {
        LoginInput::Username(username) => st.users.find_by_username(&username).await?,
        LoginInput::Contact(identifier) => st.users.find_by_identifier(&identifier).await?,
    };
    found.ok_or(AppError::NotFound("Active account"))
}

/// Exchange a username / email / phone plus password for a token pair.
pub async fn login(st: &AppState, user_input: &str, password: &str) -> AppResult<LoginOutcome> {
    let user = resolve_login_user(st, user_input).await?;

    if user.auth_status.registration_incomplete() {
        warn!(user_id = %user.id, status = ?user.auth_status, "login before registration finished");
        return Err(AppError::RegistrationIncomplete);
    }

    if !password::matches_stored(password, user.password_hash.as_deref())? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    if !user.auth_status.can_login() {
        return Err(AppError::PermissionDenied(
            "You do not have permission to login!",
        ));
    }

    let tokens = JwtKeys::from_ref(st).pair(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(LoginOutcome { user, tokens })
}

/// Redeem a refresh token for a new access token.
pub async fn refresh(st: &AppState, refresh_token: &str, now: OffsetDateTime) -> AppResult<String> {
    let keys = JwtKeys::from_ref(st);
    let claims = keys
        .verify_refresh(refresh_token)
        .map_err(|_| AppError::TokenInvalid)?;
    if st.blacklist.is_revoked(claims.jti).await? {
        warn!(user_id = %claims.sub, "revoked refresh token presented");
        return Err(AppError::TokenInvalid);
    }
    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::TokenInvalid)?;
    st.users.touch_last_login(user.id, now).await?;
    Ok(keys.sign_access(user.id, user.auth_status)?)
}

/// Blacklist the caller's refresh token. A token can only be revoked once.
pub async fn logout(st: &AppState, actor: &Actor, refresh_token: &str) -> AppResult<()> {
    let claims = JwtKeys::from_ref(st)
        .verify_refresh(refresh_token)
        .map_err(|_| AppError::TokenInvalid)?;
    if claims.sub != actor.id {
        warn!(user_id = %actor.id, "logout with someone else's refresh token");
        return Err(AppError::TokenInvalid);
    }
    let expires_at =
        OffsetDateTime::from_unix_timestamp(claims.exp as i64).map_err(anyhow::Error::from)?;
    if !st.blacklist.revoke(claims.jti, claims.sub, expires_at).await? {
        return Err(AppError::TokenInvalid);
    }
    info!(user_id = %actor.id, "refresh token revoked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::services::{change_user, signup, ChangeUser};
    use crate::users::AuthStatus;
    use crate::verification::services::confirm_code;

    const PASSWORD: &str = "Str0ng-pass";

    /// Signs up, verifies and completes the profile of `john_doe`.
    async fn registered(st: &AppState, mem: &crate::store::MemoryStore) -> User {
        let now = OffsetDateTime::now_utc();
        let user = signup(st, "john@example.com", now).await.expect("signup").user;
        let code = mem.latest_code(user.id).expect("code").code;
        let user = confirm_code(st, &user, Some(&code), now).await.expect("verify");
        change_user(
            st,
            &user,
            ChangeUser {
                first_name: "John".into(),
                last_name: "Doe".into(),
                username: "john_doe".into(),
                password: PASSWORD.into(),
                confirm_password: PASSWORD.into(),
            },
        )
        .await
        .expect("change user")
    }

    #[tokio::test]
    async fn login_by_username_email_and_phone_forms() {
        let (st, mem) = AppState::fake();
        let user = registered(&st, &mem).await;
        assert_eq!(user.auth_status, AuthStatus::Done);

        for input in ["john_doe", "JOHN@example.com"] {
            let out = login(&st, input, PASSWORD).await.expect("login");
            assert_eq!(out.user.id, user.id);
            let claims = JwtKeys::from_ref(&st).verify(&out.tokens.access).expect("access");
            assert_eq!(claims.status, AuthStatus::Done);
        }
    }

    #[tokio::test]
    async fn incomplete_registration_blocks_login_regardless_of_password() {
        let (st, mem) = AppState::fake();
        let now = OffsetDateTime::now_utc();
        let user = signup(&st, "new@example.com", now).await.expect("signup").user;
        for pw in ["", "wrong", PASSWORD] {
            assert!(matches!(
                login(&st, "new@example.com", pw).await,
                Err(AppError::RegistrationIncomplete)
            ));
        }
        let code = mem.latest_code(user.id).expect("code").code;
        confirm_code(&st, &user, Some(&code), now).await.expect("verify");
        assert!(matches!(
            login(&st, "new@example.com", PASSWORD).await,
            Err(AppError::RegistrationIncomplete)
        ));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_users() {
        let (st, mem) = AppState::fake();
        registered(&st, &mem).await;
        assert!(matches!(
            login(&st, "john_doe", "nope-nope").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&st, "jane_doe", PASSWORD).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            login(&st, "??", PASSWORD).await,
            Err(AppError::UnrecognizedIdentifier)
        ));
    }

    #[tokio::test]
    async fn refresh_then_logout_then_refresh_fails() {
        let (st, mem) = AppState::fake();
        let user = registered(&st, &mem).await;
        let out = login(&st, "john_doe", PASSWORD).await.expect("login");
        let actor = Actor {
            id: user.id,
            status: user.auth_status,
        };
        let now = OffsetDateTime::now_utc();

        let access = refresh(&st, &out.tokens.refresh, now).await.expect("refresh");
        assert!(JwtKeys::from_ref(&st).verify(&access).is_ok());
        assert!(mem.user(user.id).expect("user").last_login.is_some());

        logout(&st, &actor, &out.tokens.refresh).await.expect("logout");
        assert!(matches!(
            logout(&st, &actor, &out.tokens.refresh).await,
            Err(AppError::TokenInvalid)
        ));
        assert!(matches!(
            refresh(&st, &out.tokens.refresh, now).await,
            Err(AppError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn logout_rejects_malformed_access_and_foreign_tokens() {
        let (st, mem) = AppState::fake();
        let user = registered(&st, &mem).await;
        let out = login(&st, "john_doe", PASSWORD).await.expect("login");
        let actor = Actor {
            id: user.id,
            status: user.auth_status,
        };
        assert!(matches!(
            logout(&st, &actor, "garbage").await,
            Err(AppError::TokenInvalid)
        ));
        assert!(matches!(
            logout(&st, &actor, &out.tokens.access).await,
            Err(AppError::TokenInvalid)
        ));
        let stranger = Actor {
            id: uuid::Uuid::new_v4(),
            status: AuthStatus::Done,
        };
        assert!(matches!(
            logout(&st, &stranger, &out.tokens.refresh).await,
            Err(AppError::TokenInvalid)
        ));
    }
}
