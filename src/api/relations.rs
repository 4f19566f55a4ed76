//! Relation API endpoints

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{delete, get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{FriendInfo, FriendRequest};
use crate::error::AppError;

/// Create relation router
///
/// Routes:
/// - POST   /requests       send a friend request
/// - GET    /requests       list incoming pending requests
/// - POST   /requests/:id   accept or reject
/// - GET    /friends        list friends
/// - DELETE /friends/:id    delete a friend (both sides notified)
pub fn relations_router() -> Router<AppState> {
    Router::new()
        .route("/requests", post(send_request).get(pending_requests))
        .route("/requests/:id", post(handle_request))
        .route("/friends", get(list_friends))
        .route("/friends/:id", delete(delete_friend))
}

#[derive(Debug, Deserialize)]
struct SendRequestBody {
    to_user_id: i64,
    #[serde(default)]
    message: String,
}

async fn send_request(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(body): Json<SendRequestBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let request_id = state
        .relations
        .send_request(claims.user_id, body.to_user_id, &body.message)
        .await?;
    Ok(Json(serde_json::json!({ "request_id": request_id })))
}

async fn pending_requests(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<Vec<FriendRequest>>, AppError> {
    Ok(Json(state.relations.pending_requests(claims.user_id).await?))
}

#[derive(Debug, Deserialize)]
struct HandleRequestBody {
    accept: bool,
}

async fn handle_request(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(request_id): Path<i64>,
    Json(body): Json<HandleRequestBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let handled = state
        .relations
        .handle_request(request_id, claims.user_id, body.accept)
        .await?;
    Ok(Json(serde_json::json!({
        "request_id": request_id,
        "accepted": handled.accepted,
    })))
}

async fn list_friends(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<Vec<FriendInfo>>, AppError> {
    Ok(Json(state.relations.list_friends(claims.user_id).await?))
}

async fn delete_friend(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(friend_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .relations
        .delete_friend(claims.user_id, friend_id)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
