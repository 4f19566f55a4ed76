//! Admin API endpoints
//!
//! System status, system broadcast and fanout-subservice restart.
//! All routes require the admin role.

use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::AdminUser;
use crate::data::now_seconds;
use crate::error::AppError;
use crate::events::{EventPayload, topics};

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/broadcast", post(broadcast))
        .route("/restart", post(restart))
}

/// GET /admin/status
async fn status(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let online_users = state.registry.online_user_ids();
    Ok(Json(serde_json::json!({
        "uptime_seconds": now_seconds() - state.started_at,
        "sessions": state.registry.session_count(),
        "online_users": online_users.len(),
        "fanout_running": state.fanout_running(),
    })))
}

#[derive(Debug, Deserialize)]
struct BroadcastRequest {
    content: String,
    #[serde(default)]
    title: Option<String>,
}

/// POST /admin/broadcast
///
/// Persists a system announcement and fans it out to every authorized
/// session through the event bus.
async fn broadcast(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.content.is_empty() {
        return Err(AppError::InvalidArgument("content required".to_string()));
    }
    let title = body.title.as_deref().unwrap_or("System broadcast");
    let announcement_id = state
        .db
        .insert_announcement(title, &body.content, claims.user_id)
        .await?;

    state.bus.publish(
        topics::SYSTEM_EVENTS,
        &claims.user_id.to_string(),
        &EventPayload::SystemBroadcast {
            from_user_id: claims.user_id,
            content: body.content,
        },
    )?;

    Ok(Json(serde_json::json!({ "announcement_id": announcement_id })))
}

#[derive(Debug, Deserialize)]
struct RestartRequest {
    service: String,
}

/// POST /admin/restart
///
/// Tears down and re-creates the named subservice. Only the fanout
/// consumer is restartable; its consumer group resumes from committed
/// offsets, so nothing is lost across the restart.
async fn restart(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
    Json(body): Json<RestartRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    match body.service.as_str() {
        "fanout" => {
            state.restart_fanout();
            tracing::info!("Fanout subservice restarted");
            Ok(Json(serde_json::json!({ "restarted": "fanout" })))
        }
        other => Err(AppError::InvalidArgument(format!(
            "unknown subservice: {other}"
        ))),
    }
}
