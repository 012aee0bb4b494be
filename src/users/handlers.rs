use anyhow::Context;
use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AuthResponse, LoginRequest, MessageResponse, RegisterRequest},
    model::User,
    services,
};
use crate::{
    auth::extractors::AuthUser,
    emails,
    error::AppError,
    images::services::{read_avatar_upload, resize_avatar, AvatarError},
    state::AppState,
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/logoutall", post(logout_all))
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
        .route("/users/:id", get(get_user))
        .route("/users/:id/avatar", get(get_avatar))
}

/// Room for multipart headers and boundaries on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn avatar_routes(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/users/me/avatar",
            get(me_avatar_not_found)
                .post(upload_avatar)
                .delete(delete_avatar),
        )
        // the per-file limit is checked while reading
        .layer(DefaultBodyLimit::max(max_bytes.saturating_add(MULTIPART_OVERHEAD)))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::bad_request(e.body_text()))
}

/// Ids that are not UUIDs cannot name a stored user.
fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}

#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let (user, token) = services::register(&state, json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let req = json_body(payload)?;
    let user = services::find_by_credentials(&state, &req.email, &req.password).await?;
    let token = services::issue_token(&state, &user).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse { user, token }))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn get_me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    state.users.remove_token(auth.user.id, &auth.token).await?;
    info!("session closed");
    Ok(StatusCode::OK)
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn logout_all(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    state.users.clear_tokens(auth.user.id).await?;
    info!("all sessions closed");
    Ok(StatusCode::OK)
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let id = parse_id(&id)?;
    let user = state.users.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let body = json_body(payload)?;
    let user = services::apply_update(&state, auth.user, body).await?;
    Ok(Json(user))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn delete_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, AppError> {
    let user = auth.user;
    if !state.users.delete(user.id).await? {
        return Err(AppError::NotFound);
    }
    state
        .mailer
        .dispatch(emails::cancellation(&state.config.mail.from, &user.email, &user.name));
    info!("account deleted");
    Ok(Json(user))
}

fn upload_rejected(e: AvatarError) -> AppError {
    warn!(error = %e, "avatar upload rejected");
    AppError::BadRequest(e.to_string())
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let raw = read_avatar_upload(multipart, state.config.avatar_max_bytes)
        .await
        .map_err(upload_rejected)?;

    let png = tokio::task::spawn_blocking(move || resize_avatar(&raw))
        .await
        .context("avatar resize task")?
        .map_err(upload_rejected)?;

    state.users.set_avatar(auth.user.id, Some(png)).await?;
    Ok(Json(MessageResponse {
        message: "uploaded successfully",
    }))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn delete_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    state.users.set_avatar(auth.user.id, None).await?;
    Ok(Json(MessageResponse {
        message: "removed successfully.",
    }))
}

/// `me` is not a user id, so there is no avatar to serve under it.
async fn me_avatar_not_found() -> AppError {
    AppError::NotFound
}

#[instrument(skip(state))]
pub async fn get_avatar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let avatar = state.users.avatar(id).await?.ok_or(AppError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], avatar))
}
