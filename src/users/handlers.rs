use axum::{
    extract::{FromRef, Multipart, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    images,
    state::AppState,
    tokens::{services as token_services, AuthUser, JwtKeys},
    users::{
        dto::{
            ChangeUserRequest, ForgotPasswordRequest, LoginRequest, LoginResponse,
            MessageResponse, PublicUser, RefreshRequest, RefreshResponse, ResetPasswordRequest,
            ResetPasswordResponse, SignupRequest, SignupResponse, StatusResponse, VerifyRequest,
        },
        services::{self, load_user, ChangeUser},
    },
    verification::services as verification,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/verify", post(verify))
        .route("/users/new-verify", get(new_verify))
        .route("/users/change-user", put(change_user))
        .route("/users/change-user-photo", put(change_user_photo))
        .route("/users/login", post(login))
        .route("/users/login/refresh", post(login_refresh))
        .route("/users/logout", post(logout))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/reset-password", put(reset_password))
        .route("/users/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let out =
        services::signup(&state, &payload.email_phone_number, OffsetDateTime::now_utc()).await?;
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            success: true,
            id: out.user.id,
            username: out.user.username,
            auth_type: out.user.auth_type,
            auth_status: out.user.auth_status,
            tokens: out.tokens,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<VerifyRequest>,
) -> AppResult<Json<StatusResponse>> {
    let user = load_user(&state, actor.id).await?;
    let user = verification::confirm_code(
        &state,
        &user,
        payload.code.as_deref(),
        OffsetDateTime::now_utc(),
    )
    .await?;
    let tokens = JwtKeys::from_ref(&state).pair(&user)?;
    Ok(Json(StatusResponse {
        success: true,
        message: "Code confirmed",
        auth_status: user.auth_status,
        tokens,
    }))
}

#[instrument(skip(state))]
pub async fn new_verify(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> AppResult<Json<MessageResponse>> {
    let user = load_user(&state, actor.id).await?;
    verification::resend_code(&state, &user, OffsetDateTime::now_utc()).await?;
    Ok(Json(MessageResponse::ok("The verification code has been re-sent")))
}

#[instrument(skip(state, payload))]
pub async fn change_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<ChangeUserRequest>,
) -> AppResult<Json<StatusResponse>> {
    let user = load_user(&state, actor.id).await?;
    let user = services::change_user(
        &state,
        &user,
        ChangeUser {
            first_name: payload.first_name,
            last_name: payload.last_name,
            username: payload.username,
            password: payload.password,
            confirm_password: payload.confirm_password,
        },
    )
    .await?;
    let tokens = JwtKeys::from_ref(&state).pair(&user)?;
    Ok(Json(StatusResponse {
        success: true,
        message: "User information updated successfully",
        auth_status: user.auth_status,
        tokens,
    }))
}

#[instrument(skip(state, mp))]
pub async fn change_user_photo(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    mp: Multipart,
) -> AppResult<Json<StatusResponse>> {
    let mut form = images::read_form(mp).await?;
    let photo = form
        .take_file("photo")
        .ok_or_else(|| AppError::BadRequest("photo is required".into()))?;
    let user = load_user(&state, actor.id).await?;
    let user = services::change_photo(&state, &user, photo).await?;
    let tokens = JwtKeys::from_ref(&state).pair(&user)?;
    Ok(Json(StatusResponse {
        success: true,
        message: "User photo updated successfully",
        auth_status: user.auth_status,
        tokens,
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let out = token_services::login(&state, &payload.user_input, &payload.password).await?;
    Ok(Json(LoginResponse {
        tokens: out.tokens,
        auth_status: out.user.auth_status,
        full_name: out.user.full_name(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login_refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let access =
        token_services::refresh(&state, &payload.refresh, OffsetDateTime::now_utc()).await?;
    Ok(Json(RefreshResponse { access }))
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    token_services::logout(&state, &actor, &payload.refresh).await?;
    Ok((
        StatusCode::RESET_CONTENT,
        Json(MessageResponse::ok("You are logged out")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<StatusResponse>> {
    let out =
        services::forgot_password(&state, &payload.email_or_phone, OffsetDateTime::now_utc())
            .await?;
    Ok(Json(StatusResponse {
        success: true,
        message: "Verification code has been sent",
        auth_status: out.user.auth_status,
        tokens: out.tokens,
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<ResetPasswordResponse>> {
    let user = load_user(&state, actor.id).await?;
    let tokens = services::reset_password(
        &state,
        &user,
        &payload.password,
        &payload.confirm_password,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(Json(ResetPasswordResponse {
        success: true,
        message: "Your password has been successfully changed",
        tokens,
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> AppResult<Json<PublicUser>> {
    let user = load_user(&state, actor.id).await?;
    let photo = images::presign_opt(state.storage.as_ref(), user.photo.as_deref()).await?;
    Ok(Json(PublicUser {
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        phone_number: user.phone_number,
        auth_type: user.auth_type,
        auth_status: user.auth_status,
        photo,
    }))
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use crate::users::{AuthStatus, AuthType};

    #[test]
    fn test_me_response_serialization() {
        let response = PublicUser {
            id: uuid::Uuid::new_v4(),
            username: "john_doe".into(),
            first_name: None,
            last_name: None,
            email: Some("test@example.com".into()),
            phone_number: None,
            auth_type: AuthType::Email,
            auth_status: AuthStatus::Done,
            photo: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"auth_status\":\"done\""));
        assert!(json.contains("\"auth_type\":\"email\""));
    }
}
