//! Message API endpoints

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{ChatType, MessageEnvelope, MessageKind};
use crate::error::AppError;
use crate::service::SubmitReceipt;

/// Create message router
///
/// Routes:
/// - POST /            send a 1:1 or group message
/// - GET  /history     conversation history
/// - GET  /offline     drain queued offline messages
/// - POST /:id/read    read receipt
pub fn messages_router() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/history", get(history))
        .route("/offline", get(offline))
        .route("/:id/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    /// "personal" (default) or "group"
    #[serde(default)]
    chat_type: Option<String>,
    /// Recipient user id for 1:1, group id for group messages
    to: i64,
    /// "text", "image", "file_meta" or "system"
    #[serde(default)]
    kind: Option<String>,
    content: String,
    #[serde(default)]
    extra_info: Option<String>,
}

async fn send_message(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SubmitReceipt>, AppError> {
    let chat_type = match body.chat_type.as_deref() {
        None | Some("personal") => ChatType::Personal,
        Some("group") => ChatType::Group,
        Some(other) => {
            return Err(AppError::InvalidArgument(format!(
                "unknown chat type: {other}"
            )));
        }
    };
    let kind = match body.kind.as_deref() {
        None => MessageKind::Text,
        Some(raw) => MessageKind::parse(raw)
            .ok_or_else(|| AppError::InvalidArgument(format!("unknown message kind: {raw}")))?,
    };

    let receipt = state
        .delivery
        .submit(
            claims.user_id,
            chat_type,
            body.to,
            kind,
            &body.content,
            body.extra_info.as_deref(),
        )
        .await?;
    Ok(Json(receipt))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    /// Peer user id for 1:1 history
    peer_id: Option<i64>,
    /// Group id for group history
    group_id: Option<i64>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

async fn history(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<MessageEnvelope>>, AppError> {
    let messages = match (params.peer_id, params.group_id) {
        (Some(peer_id), None) => {
            state
                .delivery
                .personal_history(
                    claims.user_id,
                    peer_id,
                    params.start_time,
                    params.end_time,
                    params.limit,
                )
                .await?
        }
        (None, Some(group_id)) => {
            state
                .delivery
                .group_history(claims.user_id, group_id, params.limit)
                .await?
        }
        _ => {
            return Err(AppError::InvalidArgument(
                "exactly one of peer_id or group_id is required".to_string(),
            ));
        }
    };
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
struct OfflineParams {
    #[serde(default = "default_offline_limit")]
    limit: usize,
}

fn default_offline_limit() -> usize {
    100
}

async fn offline(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(params): Query<OfflineParams>,
) -> Result<Json<Vec<MessageEnvelope>>, AppError> {
    let envelopes = state
        .offline
        .drain_messages(claims.user_id, params.limit)
        .await?;
    Ok(Json(envelopes))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(message_id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let newly_read = state.delivery.mark_read(claims.user_id, message_id).await?;
    Ok(Json(serde_json::json!({ "newly_read": newly_read })))
}
