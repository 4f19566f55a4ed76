//! Data models
//!
//! Rust structs representing database rows plus the envelope types shared by
//! the cache, the offline queues, the event bus and the WebSocket frames.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current unix time in seconds.
pub fn now_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Current unix time in milliseconds. Message send times use this clock.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Enumerations (stored as TEXT)
// =============================================================================

/// Message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    FileMeta,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::FileMeta => "file_meta",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file_meta" => Some(Self::FileMeta),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Conversation kinds: 1:1 or group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Personal,
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Group => "group",
        }
    }
}

/// Friend request / file transfer request states.
///
/// Transitions are one-shot: pending -> accepted | rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Accepted,
    Rejected,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Account lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Pending,
    Active,
    Disabled,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A registered account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub role: String,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_login_at: Option<i64>,
}

/// Per-user settings row, created at registration
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSettings {
    pub user_id: i64,
    pub notification_enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A persisted message row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub from_user_id: i64,
    /// User id for 1:1, group id for group conversations
    pub to_user_id: i64,
    pub recipient_kind: String,
    pub message_type: String,
    pub content: String,
    /// Milliseconds since epoch, server-stamped
    pub send_time: i64,
    pub is_read: bool,
    pub extra_info: String,
}

impl Message {
    /// Envelope used for caching, offline queues and WebSocket push.
    pub fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            id: self.id,
            from_user_id: self.from_user_id,
            to_user_id: self.to_user_id,
            chat_type: if self.recipient_kind == "group" {
                ChatType::Group
            } else {
                ChatType::Personal
            },
            message_type: self.message_type.clone(),
            content: self.content.clone(),
            send_time: self.send_time,
            is_read: self.is_read,
            extra_info: self.extra_info.clone(),
        }
    }
}

/// Serialized message form shared by caches, queues, events and frames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub chat_type: ChatType,
    pub message_type: String,
    pub content: String,
    pub send_time: i64,
    pub is_read: bool,
    pub extra_info: String,
}

/// A friend request row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FriendRequest {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub message: String,
    pub state: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Friend list entry joined with user info
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FriendInfo {
    pub friend_id: i64,
    pub remark: Option<String>,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

/// An uploaded file record (bytes-on-the-wire handled elsewhere)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: i64,
    pub uploader_id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub file_path: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A file transfer request row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FileTransferRequest {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub file_id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub state: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A stored notification row for offline recipients
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub content: String,
    pub created_at: i64,
    pub is_read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_round_trip() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::FileMeta,
            MessageKind::System,
        ] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("video"), None);
    }

    #[test]
    fn request_state_round_trip() {
        for state in [
            RequestState::Pending,
            RequestState::Accepted,
            RequestState::Rejected,
        ] {
            assert_eq!(RequestState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn envelope_preserves_group_chat_type() {
        let row = Message {
            id: 7,
            from_user_id: 1,
            to_user_id: 99,
            recipient_kind: "group".to_string(),
            message_type: "text".to_string(),
            content: "hi all".to_string(),
            send_time: 1,
            is_read: false,
            extra_info: "{}".to_string(),
        };
        assert_eq!(row.envelope().chat_type, ChatType::Group);
    }
}
