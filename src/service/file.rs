//! File service
//!
//! Upload/download initiation and the transfer-request state machine.
//! Chunked bytes-on-the-wire are handled by the transport frontends; this
//! service owns the records and the pending -> accepted | rejected
//! transitions.

use std::sync::Arc;

use crate::data::{Database, FileRecord, FileTransferRequest};
use crate::error::{AppError, ConflictKind};
use crate::events::{EventBus, EventPayload, topics};

pub struct FileService {
    db: Arc<Database>,
    bus: Arc<EventBus>,
}

impl FileService {
    pub fn new(db: Arc<Database>, bus: Arc<EventBus>) -> Self {
        Self { db, bus }
    }

    /// Register an upload; the returned id keys the chunk stream.
    pub async fn upload_init(
        &self,
        uploader_id: i64,
        file_name: &str,
        file_size: i64,
    ) -> Result<i64, AppError> {
        if file_name.is_empty() {
            return Err(AppError::InvalidArgument("file name required".to_string()));
        }
        if file_size <= 0 {
            return Err(AppError::InvalidArgument(
                "file size must be positive".to_string(),
            ));
        }
        let file_id = self.db.insert_file(uploader_id, file_name, file_size).await?;
        tracing::info!(file_id, uploader_id, file_name, "Upload initiated");
        Ok(file_id)
    }

    /// Finish an upload: pending -> complete, one-shot.
    pub async fn upload_complete(
        &self,
        uploader_id: i64,
        file_id: i64,
        file_path: &str,
    ) -> Result<(), AppError> {
        let file = self
            .db
            .get_file(file_id)
            .await?
            .ok_or(AppError::NotFound("file"))?;
        if file.uploader_id != uploader_id {
            return Err(AppError::PermissionDenied);
        }
        if !self.db.complete_file(file_id, file_path).await? {
            return Err(AppError::Conflict(
                ConflictKind::UploadAlreadyComplete,
                "upload already completed".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate access and return the record that keys the download stream.
    pub async fn download_init(&self, user_id: i64, file_id: i64) -> Result<FileRecord, AppError> {
        let file = self
            .db
            .get_file(file_id)
            .await?
            .ok_or(AppError::NotFound("file"))?;
        if file.status != "complete" {
            return Err(AppError::Conflict(
                ConflictKind::UploadIncomplete,
                "upload not completed".to_string(),
            ));
        }
        if !self.db.can_access_file(file_id, user_id).await? {
            return Err(AppError::PermissionDenied);
        }
        Ok(file)
    }

    /// Offer a file to another user.
    pub async fn send_transfer_request(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        file_id: i64,
    ) -> Result<i64, AppError> {
        if !self.db.user_exists(to_user_id).await? {
            return Err(AppError::NotFound("user"));
        }
        let file = self
            .db
            .get_file(file_id)
            .await?
            .ok_or(AppError::NotFound("file"))?;
        if file.uploader_id != from_user_id {
            return Err(AppError::PermissionDenied);
        }

        let request_id = self
            .db
            .create_transfer_request(from_user_id, to_user_id, &file)
            .await?;

        self.publish(
            &to_user_id.to_string(),
            &EventPayload::FileTransferRequest {
                request_id,
                from_user_id,
                to_user_id,
                file_name: file.file_name.clone(),
                file_size: file.file_size,
            },
        );

        tracing::info!(request_id, from_user_id, to_user_id, file_id, "File transfer requested");
        Ok(request_id)
    }

    /// Accept or reject a transfer request; `Conflict` once handled.
    pub async fn handle_transfer_request(
        &self,
        request_id: i64,
        handler_id: i64,
        accept: bool,
    ) -> Result<FileTransferRequest, AppError> {
        let (handled, request) = self
            .db
            .handle_transfer_request(request_id, handler_id, accept)
            .await?;

        let payload = if handled.accepted {
            EventPayload::FileTransferAccepted {
                request_id,
                from_user_id: request.from_user_id,
                to_user_id: request.to_user_id,
                file_id: request.file_id,
                file_name: request.file_name.clone(),
            }
        } else {
            EventPayload::FileTransferRejected {
                request_id,
                from_user_id: request.from_user_id,
                to_user_id: request.to_user_id,
                file_id: request.file_id,
                file_name: request.file_name.clone(),
            }
        };
        self.publish(&request.from_user_id.to_string(), &payload);

        tracing::info!(request_id, accepted = handled.accepted, "File transfer handled");
        Ok(request)
    }

    fn publish(&self, key: &str, payload: &EventPayload) {
        if let Err(error) = self.bus.publish(topics::FILE_EVENTS, key, payload) {
            tracing::warn!(%error, "Failed to publish file event");
        }
    }
}
