//! Error types for ferrochat
//!
//! All errors in the application are converted to `AppError`, which carries a
//! numeric code grouped by domain and implements `IntoResponse` for HTTP
//! error responses. WebSocket error frames reuse the same codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Persistence failures are fatal to the current call; cache and event-bus
/// failures are logged at the call site and the call continues, so those
/// variants normally never reach a response.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid token (401)
    #[error("Authentication required")]
    Unauthenticated,

    /// Authenticated but not allowed (403)
    #[error("Access denied")]
    PermissionDenied,

    /// Schema or constraint violation (400)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced user/message/file missing (404)
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Duplicate registration, duplicate friend request (409)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// State machine violation, e.g. a request already handled when
    /// accept/reject is attempted (409). The kind selects the
    /// domain-grouped numeric code.
    #[error("Conflict: {1}")]
    Conflict(ConflictKind, String),

    /// Relational store failure (500)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// KV store failure; treated as a cache miss where possible (500)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Event log failure; delivery continues on the direct path (500)
    #[error("Event bus error: {0}")]
    EventBus(String),

    /// Write failure on a session stream (500)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<turso::Error> for AppError {
    fn from(err: turso::Error) -> Self {
        AppError::Cache(err.to_string())
    }
}

/// Numeric error codes, grouped by domain.
///
/// Success = 0; general 1000; user 2000; friend 3000; group 4000;
/// message 5000; file 6000; storage 7000; cache 8000; event bus 9000;
/// network 10000; RPC 11000; WebSocket 12000; security 13000.
pub mod code {
    pub const SUCCESS: u32 = 0;
    pub const INVALID_PARAMS: u32 = 1001;
    pub const INTERNAL_ERROR: u32 = 1002;
    pub const NOT_FOUND: u32 = 1004;
    pub const ALREADY_EXISTS: u32 = 1005;
    pub const PERMISSION_DENIED: u32 = 1006;
    pub const RATE_LIMIT_EXCEEDED: u32 = 1007;
    pub const CONFIG_ERROR: u32 = 1010;
    pub const USER_TOKEN_INVALID: u32 = 2004;
    pub const FRIEND_REQUEST_ALREADY_HANDLED: u32 = 3003;
    pub const FILE_ALREADY_EXISTS: u32 = 6005;
    pub const FILE_UPLOAD_INCOMPLETE: u32 = 6007;
    pub const FILE_TRANSFER_ALREADY_HANDLED: u32 = 6011;
    pub const STORAGE_FAILED: u32 = 7001;
    pub const CACHE_FAILED: u32 = 8001;
    pub const EVENT_BUS_FAILED: u32 = 9001;
    pub const NETWORK_DISCONNECTED: u32 = 10002;
    pub const WEBSOCKET_UNKNOWN_FRAME: u32 = 12001;
    pub const WEBSOCKET_ALREADY_AUTHORIZED: u32 = 12002;
}

/// The state conflict that occurred; each maps into its own domain's code
/// group (friend 3xxx, file 6xxx, WebSocket 12xxx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Friend request already accepted or rejected
    FriendRequestHandled,
    /// File transfer request already accepted or rejected
    FileTransferHandled,
    /// Upload already marked complete
    UploadAlreadyComplete,
    /// Download attempted before the upload completed
    UploadIncomplete,
    /// Session already bound to a user
    SessionAlreadyAuthorized,
}

impl ConflictKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::FriendRequestHandled => code::FRIEND_REQUEST_ALREADY_HANDLED,
            Self::FileTransferHandled => code::FILE_TRANSFER_ALREADY_HANDLED,
            Self::UploadAlreadyComplete => code::FILE_ALREADY_EXISTS,
            Self::UploadIncomplete => code::FILE_UPLOAD_INCOMPLETE,
            Self::SessionAlreadyAuthorized => code::WEBSOCKET_ALREADY_AUTHORIZED,
        }
    }
}

impl AppError {
    /// Numeric code for typed responses and WebSocket error frames.
    pub fn code(&self) -> u32 {
        match self {
            AppError::Unauthenticated => code::USER_TOKEN_INVALID,
            AppError::PermissionDenied => code::PERMISSION_DENIED,
            AppError::InvalidArgument(_) => code::INVALID_PARAMS,
            AppError::NotFound(_) => code::NOT_FOUND,
            AppError::AlreadyExists(_) => code::ALREADY_EXISTS,
            AppError::Conflict(kind, _) => kind.code(),
            AppError::Storage(_) => code::STORAGE_FAILED,
            AppError::Cache(_) => code::CACHE_FAILED,
            AppError::EventBus(_) => code::EVENT_BUS_FAILED,
            AppError::Transport(_) => code::NETWORK_DISCONNECTED,
            AppError::RateLimited => code::RATE_LIMIT_EXCEEDED,
            AppError::Config(_) => code::CONFIG_ERROR,
            AppError::Internal(_) => code::INTERNAL_ERROR,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) | AppError::Conflict(..) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable, sanitized message for the client. Internal detail stays in
    /// the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Storage(_) => "Storage error".to_string(),
            AppError::Cache(_) => "Cache error".to_string(),
            AppError::EventBus(_) => "Event bus error".to_string(),
            AppError::Transport(_) => "Transport error".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::PermissionDenied => "permission_denied",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Conflict(..) => "conflict",
            AppError::Storage(_) => "storage",
            AppError::Cache(_) => "cache",
            AppError::EventBus(_) => "event_bus",
            AppError::Transport(_) => "transport",
            AppError::RateLimited => "rate_limited",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each variant to its status code, numeric domain code and a
    /// sanitized JSON body.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed with internal details");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.kind()]).inc();

        let body = Json(serde_json::json!({
            "code": self.code(),
            "error": self.public_message(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
