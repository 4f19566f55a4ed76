//! Group membership API endpoints
//!
//! A group exists as its member set: the first join creates it.

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{delete, get, post},
};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

pub fn groups_router() -> Router<AppState> {
    Router::new()
        .route("/:id/members", post(join).get(members))
        .route("/:id/members/me", delete(leave))
}

async fn join(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(group_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let joined = state.groups.join(group_id, claims.user_id).await?;
    Ok(Json(serde_json::json!({
        "group_id": group_id,
        "joined": joined,
    })))
}

async fn leave(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(group_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.groups.leave(group_id, claims.user_id).await?;
    Ok(Json(serde_json::json!({ "left": true })))
}

async fn members(
    State(state): State<AppState>,
    CurrentUser(_claims): CurrentUser,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<i64>>, AppError> {
    let mut members = state.groups.members(group_id).await?;
    if members.is_empty() {
        return Err(AppError::NotFound("group"));
    }
    members.sort_unstable();
    Ok(Json(members))
}
