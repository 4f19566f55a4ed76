//! User API endpoints

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, patch, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::AppError;
use crate::service::UserInfo;

/// Create user router
///
/// Routes:
/// - POST /register
/// - POST /login
/// - POST /verification-code
/// - GET  /:id
/// - PATCH /me
/// - GET/PATCH /me/settings
/// - POST /:id/approve (admin)
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verification-code", post(verification_code))
        .route("/me", patch(update_me))
        .route("/me/settings", get(get_settings).patch(update_settings))
        .route("/:id", get(get_user))
        .route("/:id/approve", post(approve_user))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
    verification_code: Option<String>,
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = state
        .users
        .register(
            &body.username,
            &body.email,
            &body.password,
            body.verification_code.as_deref(),
        )
        .await?;
    Ok(Json(serde_json::json!({ "user_id": user_id })))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (token, user) = state.users.login(&body.username, &body.password, "").await?;
    Ok(Json(serde_json::json!({ "token": token, "user": user })))
}

#[derive(Debug, Deserialize)]
struct VerificationCodeRequest {
    email: String,
}

async fn verification_code(
    State(state): State<AppState>,
    Json(body): Json<VerificationCodeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    // Code delivery is an external concern; the issued code is returned so
    // the delivery worker (or a test) can pick it up.
    let code = state.users.issue_verification_code(&body.email).await?;
    Ok(Json(serde_json::json!({ "code": code })))
}

async fn get_user(
    State(state): State<AppState>,
    CurrentUser(_claims): CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<Json<UserInfo>, AppError> {
    Ok(Json(state.users.get_info(user_id).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateProfileRequest {
    nickname: Option<String>,
    avatar: Option<String>,
}

async fn update_me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserInfo>, AppError> {
    let info = state
        .users
        .update_profile(claims.user_id, body.nickname.as_deref(), body.avatar.as_deref())
        .await?;
    Ok(Json(info))
}

async fn get_settings(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<crate::data::UserSettings>, AppError> {
    Ok(Json(state.users.get_settings(claims.user_id).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateSettingsRequest {
    notification_enabled: bool,
}

async fn update_settings(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<crate::data::UserSettings>, AppError> {
    Ok(Json(
        state
            .users
            .update_settings(claims.user_id, body.notification_enabled)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    approve: bool,
}

async fn approve_user(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Path(user_id): Path<i64>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<UserInfo>, AppError> {
    let info = state
        .users
        .approve(claims.user_id, user_id, body.approve)
        .await?;
    Ok(Json(info))
}
