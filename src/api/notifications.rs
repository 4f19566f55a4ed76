//! Notification API endpoints
//!
//! The reconnect path: peek at queued notification envelopes without
//! destructive reads, or drain them once displayed.

use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

pub fn notifications_router() -> Router<AppState> {
    Router::new()
        .route("/", get(peek))
        .route("/drain", post(drain))
        .route("/unread", get(unread))
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn peek(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(params): Query<NotificationParams>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    Ok(Json(
        state
            .offline
            .peek_notifications(claims.user_id, params.limit)
            .await?,
    ))
}

async fn drain(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(params): Query<NotificationParams>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    Ok(Json(
        state
            .offline
            .drain_notifications(claims.user_id, params.limit)
            .await?,
    ))
}

/// Unread notification rows from the relational store; the durable view
/// behind the KV queue.
async fn unread(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(params): Query<NotificationParams>,
) -> Result<Json<Vec<crate::data::Notification>>, AppError> {
    Ok(Json(
        state
            .db
            .unread_notifications(claims.user_id, params.limit as i64)
            .await?,
    ))
}
