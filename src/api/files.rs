//! File API endpoints
//!
//! Upload/download initiation and transfer requests. Chunk streaming is a
//! transport concern; these endpoints drive the state machine around it.

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{FileRecord, FileTransferRequest};
use crate::error::AppError;

pub fn files_router() -> Router<AppState> {
    Router::new()
        .route("/uploads", post(upload_init))
        .route("/:id/complete", post(upload_complete))
        .route("/:id/download", get(download_init))
        .route("/transfers", post(send_transfer))
        .route("/transfers/:id", post(handle_transfer))
}

#[derive(Debug, Deserialize)]
struct UploadInitRequest {
    file_name: String,
    file_size: i64,
}

async fn upload_init(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(body): Json<UploadInitRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let file_id = state
        .files
        .upload_init(claims.user_id, &body.file_name, body.file_size)
        .await?;
    Ok(Json(serde_json::json!({ "file_id": file_id })))
}

#[derive(Debug, Deserialize)]
struct UploadCompleteRequest {
    file_path: String,
}

async fn upload_complete(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(file_id): Path<i64>,
    Json(body): Json<UploadCompleteRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .files
        .upload_complete(claims.user_id, file_id, &body.file_path)
        .await?;
    Ok(Json(serde_json::json!({ "file_id": file_id, "status": "complete" })))
}

async fn download_init(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(file_id): Path<i64>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(state.files.download_init(claims.user_id, file_id).await?))
}

#[derive(Debug, Deserialize)]
struct SendTransferRequest {
    to_user_id: i64,
    file_id: i64,
}

async fn send_transfer(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(body): Json<SendTransferRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let request_id = state
        .files
        .send_transfer_request(claims.user_id, body.to_user_id, body.file_id)
        .await?;
    Ok(Json(serde_json::json!({ "request_id": request_id })))
}

#[derive(Debug, Deserialize)]
struct HandleTransferRequest {
    accept: bool,
}

async fn handle_transfer(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(request_id): Path<i64>,
    Json(body): Json<HandleTransferRequest>,
) -> Result<Json<FileTransferRequest>, AppError> {
    let request = state
        .files
        .handle_transfer_request(request_id, claims.user_id, body.accept)
        .await?;
    Ok(Json(request))
}
