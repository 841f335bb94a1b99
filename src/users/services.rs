use axum::extract::FromRef;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::images::{self, Upload, PROFILE_PHOTO_EXTENSIONS};
use crate::notify::CodePurpose;
use crate::state::AppState;
use crate::tokens::{JwtKeys, TokenPair};
use crate::users::identifier::classify_identifier;
use crate::users::model::User;
use crate::users::password::hash_password;
use crate::users::repo::{NewUser, ProfileUpdate};
use crate::users::validate::{validate_name, validate_new_password, validate_username};
use crate::verification::services::{issue_code, send_code};
use crate::verification::NewCode;

/// A user together with a freshly signed token pair.
pub struct UserWithTokens {
    pub user: User,
    pub tokens: TokenPair,
}

pub struct ChangeUser {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

fn placeholder_username() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("user_{}", &id[..8])
}

pub async fn load_user(st: &AppState, id: Uuid) -> AppResult<User> {
    st.users.find_by_id(id).await?.ok_or(AppError::NotFound("User"))
}

/// Register from a single email-or-phone identifier; the first code goes out
/// in the background.
pub async fn signup(st: &AppState, raw: &str, now: OffsetDateTime) -> AppResult<UserWithTokens> {
    let identifier = classify_identifier(raw)?;
    if st.users.find_by_identifier(&identifier).await?.is_some() {
        warn!(identifier = %identifier.as_str(), "identifier already registered");
        return Err(AppError::DuplicateIdentifier(identifier.label()));
    }

    let code = NewCode::fresh(identifier.channel(), &st.config.codes, now);
    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: placeholder_username(),
        identifier: identifier.clone(),
        created_at: now,
    };
    let user = st
        .users
        .register(new_user, &code)
        .await?
        .ok_or(AppError::DuplicateIdentifier(identifier.label()))?;

    send_code(st, &identifier, &code, CodePurpose::Registration);
    let tokens = JwtKeys::from_ref(st).pair(&user)?;
    info!(user_id = %user.id, auth_type = ?user.auth_type, "user registered");
    Ok(UserWithTokens { user, tokens })
}

/// Set names, username and password. A verified account becomes DONE.
pub async fn change_user(st: &AppState, user: &User, req: ChangeUser) -> AppResult<User> {
    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    let username = req.username.trim();
    validate_new_password(&req.password, &req.confirm_password)?;
    validate_name(first_name, "First name must contain only letters")?;
    validate_name(last_name, "Last name must contain only letters")?;
    validate_username(username)?;

    let update = ProfileUpdate {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        username: username.to_string(),
        password_hash: hash_password(&req.password)?,
    };
    let advance = user.auth_status.on_profile_completed();
    let updated = st
        .users
        .update_profile(user.id, update, advance)
        .await?
        .ok_or(AppError::DuplicateIdentifier("username"))?;
    info!(user_id = %user.id, status = ?updated.auth_status, "profile updated");
    Ok(updated)
}

/// Store a new profile photo. DONE accounts advance to PHOTO_DONE.
pub async fn change_photo(st: &AppState, user: &User, upload: Upload) -> AppResult<User> {
    let key = images::store_image(
        st.storage.as_ref(),
        "users",
        user.id,
        upload,
        PROFILE_PHOTO_EXTENSIONS,
    )
    .await?;
    let advance = user.auth_status.on_photo_set();
    let updated = match st.users.set_photo(user.id, &key, advance).await {
        Ok(updated) => updated,
        Err(e) => {
            images::discard_image(st.storage.as_ref(), &key).await;
            return Err(e.into());
        }
    };
    if let Some(old) = user.photo.as_deref() {
        if let Err(e) = st.storage.delete_object(old).await {
            warn!(error = %e, key = %old, "failed to delete replaced photo");
        }
    }
    info!(user_id = %user.id, status = ?updated.auth_status, "profile photo updated");
    Ok(updated)
}

/// Send a reset code to the account owning `raw`.
pub async fn forgot_password(
    st: &AppState,
    raw: &str,
    now: OffsetDateTime,
) -> AppResult<UserWithTokens> {
    let identifier = classify_identifier(raw)?;
    let user = st
        .users
        .find_by_identifier(&identifier)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    issue_code(st, &user, &identifier, CodePurpose::PasswordReset, now).await?;
    let tokens = JwtKeys::from_ref(st).pair(&user)?;
    Ok(UserWithTokens { user, tokens })
}

/// Set a new password. Requires a code confirmed within the reset window.
pub async fn reset_password(
    st: &AppState,
    user: &User,
    password: &str,
    confirm_password: &str,
    now: OffsetDateTime,
) -> AppResult<TokenPair> {
    validate_new_password(password, confirm_password)?;
    let since = now - Duration::minutes(st.config.codes.reset_window_minutes);
    if !st.codes.confirmed_since(user.id, since).await? {
        warn!(user_id = %user.id, "password reset without a recently confirmed code");
        return Err(AppError::PermissionDenied(
            "Confirm the code sent to you before resetting your password",
        ));
    }
    st.users.set_password(user.id, &hash_password(password)?).await?;
    info!(user_id = %user.id, "password reset");
    Ok(JwtKeys::from_ref(st).pair(user)?)
}
