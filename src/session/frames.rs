//! WebSocket frame envelope
//!
//! Text frames containing UTF-8 JSON, `{ "type": <string>, ... }`. Every
//! server frame carries `timestamp` in unix seconds.

use serde::{Deserialize, Serialize};

use crate::data::now_seconds;

/// Frames accepted from clients
///
/// Unauthenticated sessions may only send `auth` and `ping`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        token: String,
    },
    Ping,
    ChatMessage {
        to_user_id: i64,
        content: String,
        #[serde(default)]
        message_id: Option<i64>,
    },
    GroupMessage {
        group_id: i64,
        content: String,
        #[serde(default)]
        message_id: Option<i64>,
    },
    StatusUpdate {
        status: String,
    },
    ReadReceipt {
        message_id: i64,
        sender_id: i64,
    },
    Broadcast {
        content: String,
    },
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Ping => "ping",
            Self::ChatMessage { .. } => "chat_message",
            Self::GroupMessage { .. } => "group_message",
            Self::StatusUpdate { .. } => "status_update",
            Self::ReadReceipt { .. } => "read_receipt",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

/// Frames written to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        session_id: String,
        message: String,
        timestamp: i64,
    },
    AuthResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<i64>,
        message: String,
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
    ChatMessage {
        message_id: i64,
        from_user_id: i64,
        content: String,
        message_type: String,
        extra_info: String,
        timestamp: i64,
    },
    GroupMessage {
        message_id: i64,
        group_id: i64,
        from_user_id: i64,
        content: String,
        message_type: String,
        timestamp: i64,
    },
    UserStatus {
        user_id: i64,
        status: String,
        timestamp: i64,
    },
    GroupUserStatus {
        group_id: i64,
        user_id: i64,
        status: String,
        timestamp: i64,
    },
    SystemBroadcast {
        from_user_id: i64,
        content: String,
        timestamp: i64,
    },
    MessageAck {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        server_message_id: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: i64,
    },
    MessageAcknowledgement {
        message_id: i64,
        /// "delivered" or "read"
        status: String,
        timestamp: i64,
    },
    ReadReceiptAck {
        success: bool,
        message_id: i64,
        timestamp: i64,
    },
    /// Relationship and file events pushed by the fanout router
    Notification {
        kind: String,
        payload: serde_json::Value,
        timestamp: i64,
    },
    Error {
        code: u32,
        message: String,
        timestamp: i64,
    },
}

impl ServerFrame {
    pub fn welcome(session_id: &str) -> Self {
        Self::Welcome {
            session_id: session_id.to_string(),
            message: "Welcome to the messaging server".to_string(),
            timestamp: now_seconds(),
        }
    }

    pub fn auth_success(user_id: i64) -> Self {
        Self::AuthResponse {
            success: true,
            user_id: Some(user_id),
            message: "Authenticated".to_string(),
            timestamp: now_seconds(),
        }
    }

    pub fn auth_failure(message: &str) -> Self {
        Self::AuthResponse {
            success: false,
            user_id: None,
            message: message.to_string(),
            timestamp: now_seconds(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_seconds(),
        }
    }

    pub fn error(code: u32, message: &str) -> Self {
        Self::Error {
            code,
            message: message.to_string(),
            timestamp: now_seconds(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::AuthResponse { .. } => "auth_response",
            Self::Pong { .. } => "pong",
            Self::ChatMessage { .. } => "chat_message",
            Self::GroupMessage { .. } => "group_message",
            Self::UserStatus { .. } => "user_status",
            Self::GroupUserStatus { .. } => "group_user_status",
            Self::SystemBroadcast { .. } => "system_broadcast",
            Self::MessageAck { .. } => "message_ack",
            Self::MessageAcknowledgement { .. } => "message_acknowledgement",
            Self::ReadReceiptAck { .. } => "read_receipt_ack",
            Self::Notification { .. } => "notification",
            Self::Error { .. } => "error",
        }
    }
}
