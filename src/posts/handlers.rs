use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    images,
    posts::{
        dto::{CreateCommentRequest, LikeToggleResponse, Page, Pagination},
        model::LikeTarget,
        services,
        views::{CommentView, LikeView, PostView},
    },
    state::AppState,
    tokens::{ActiveUser, AuthUser},
};

pub fn posts_routes() -> Router<AppState> {
    Router::new()
        .route("/posts/list", get(list_posts))
        .route("/posts/create", post(create_post))
        .route(
            "/posts/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/posts/comments/:id",
            get(get_comment).delete(delete_comment),
        )
        .route("/posts/comments/:id/likes", get(comment_likes))
        .route("/posts/comments/:id/liking", post(like_comment))
        .route("/posts/:id", get(get_post))
        .route("/posts/:id/update", put(update_post))
        .route("/posts/:id/delete", delete(delete_post))
        .route("/posts/:id/likes", get(post_likes))
        .route("/posts/:id/comments", get(post_comments))
        .route("/posts/:id/comments/create", post(create_post_comment))
        .route("/posts/:id/liking", post(like_post))
}

fn viewer(auth: &Option<AuthUser>) -> Option<&crate::context::Actor> {
    auth.as_ref().map(|AuthUser(actor)| actor)
}

fn toggled(liked: bool) -> (StatusCode, Json<LikeToggleResponse>) {
    if liked {
        (
            StatusCode::CREATED,
            Json(LikeToggleResponse {
                success: true,
                message: "Liked",
                liked,
            }),
        )
    } else {
        (
            StatusCode::OK,
            Json(LikeToggleResponse {
                success: true,
                message: "Like removed",
                liked,
            }),
        )
    }
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Page<PostView>>> {
    Ok(Json(services::list_posts(&state, viewer(&auth), p).await?))
}

#[instrument(skip(state, mp))]
pub async fn create_post(
    State(state): State<AppState>,
    ActiveUser(actor): ActiveUser,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let mut form = images::read_form(mp).await?;
    let image = form
        .take_file("image")
        .ok_or_else(|| AppError::BadRequest("image is required".into()))?;
    let description = form.field("description").unwrap_or_default().to_string();
    let view = services::create_post(
        &state,
        &actor,
        &description,
        image,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostView>> {
    Ok(Json(services::get_post(&state, viewer(&auth), id).await?))
}

#[instrument(skip(state, mp))]
pub async fn update_post(
    State(state): State<AppState>,
    ActiveUser(actor): ActiveUser,
    Path(id): Path<Uuid>,
    mp: Multipart,
) -> AppResult<Json<PostView>> {
    let mut form = images::read_form(mp).await?;
    let image = form.take_file("image");
    let view =
        services::update_post(&state, &actor, id, form.field("description"), image).await?;
    Ok(Json(view))
}

#[instrument(skip(state))]
pub async fn delete_post(
    State(state): State<AppState>,
    ActiveUser(actor): ActiveUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    services::delete_post(&state, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn post_likes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Page<LikeView>>> {
    Ok(Json(
        services::list_likes(&state, LikeTarget::Post(id), p).await?,
    ))
}

#[instrument(skip(state))]
pub async fn post_comments(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<CommentView>>> {
    Ok(Json(
        services::post_comments(&state, viewer(&auth), id).await?,
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_post_comment(
    State(state): State<AppState>,
    ActiveUser(actor): ActiveUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let view = services::create_comment(
        &state,
        &actor,
        id,
        payload.parent,
        &payload.comment,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state))]
pub async fn like_post(
    State(state): State<AppState>,
    ActiveUser(actor): ActiveUser,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<LikeToggleResponse>)> {
    let liked = services::toggle_like(
        &state,
        &actor,
        LikeTarget::Post(id),
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(toggled(liked))
}

#[instrument(skip(state))]
pub async fn list_comments(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Page<CommentView>>> {
    Ok(Json(
        services::list_comments(&state, viewer(&auth), p).await?,
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_comment(
    State(state): State<AppState>,
    ActiveUser(actor): ActiveUser,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let post_id = payload
        .post
        .ok_or_else(|| AppError::BadRequest("post is required".into()))?;
    let view = services::create_comment(
        &state,
        &actor,
        post_id,
        payload.parent,
        &payload.comment,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state))]
pub async fn get_comment(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CommentView>> {
    Ok(Json(services::get_comment(&state, viewer(&auth), id).await?))
}

#[instrument(skip(state))]
pub async fn delete_comment(
    State(state): State<AppState>,
    ActiveUser(actor): ActiveUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    services::delete_comment(&state, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn comment_likes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Page<LikeView>>> {
    Ok(Json(
        services::list_likes(&state, LikeTarget::Comment(id), p).await?,
    ))
}

#[instrument(skip(state))]
pub async fn like_comment(
    State(state): State<AppState>,
    ActiveUser(actor): ActiveUser,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<LikeToggleResponse>)> {
    let liked = services::toggle_like(
        &state,
        &actor,
        LikeTarget::Comment(id),
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(toggled(liked))
}
