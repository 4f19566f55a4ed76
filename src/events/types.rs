//! Event topics and payloads
//!
//! Payloads are JSON objects carrying `event_type` plus event-specific
//! fields; keys are recipient-id strings. Handlers must stay idempotent on
//! `(event_id, recipient)`.

use serde::{Deserialize, Serialize};

use crate::data::MessageEnvelope;

/// Topic names, one per logical stream.
pub mod topics {
    pub const MESSAGES_PERSONAL: &str = "messages-personal";
    pub const MESSAGES_GROUP: &str = "messages-group";
    pub const OFFLINE_MESSAGES: &str = "offline-messages";
    pub const RELATIONSHIP_EVENTS: &str = "relationship-events";
    pub const SYSTEM_EVENTS: &str = "system-events";
    pub const FILE_EVENTS: &str = "file-events";
}

/// Event payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventPayload {
    MessageSent {
        message: MessageEnvelope,
    },
    OfflineQueued {
        user_id: i64,
        message: MessageEnvelope,
    },
    FriendRequestSent {
        request_id: i64,
        from_user_id: i64,
        to_user_id: i64,
        message: String,
    },
    FriendRequestAccepted {
        request_id: i64,
        from_user_id: i64,
        to_user_id: i64,
    },
    FriendRequestRejected {
        request_id: i64,
        from_user_id: i64,
        to_user_id: i64,
    },
    FriendDeleted {
        user_id: i64,
        friend_id: i64,
    },
    FileTransferRequest {
        request_id: i64,
        from_user_id: i64,
        to_user_id: i64,
        file_name: String,
        file_size: i64,
    },
    FileTransferAccepted {
        request_id: i64,
        from_user_id: i64,
        to_user_id: i64,
        file_id: i64,
        file_name: String,
    },
    FileTransferRejected {
        request_id: i64,
        from_user_id: i64,
        to_user_id: i64,
        file_id: i64,
        file_name: String,
    },
    PresenceChange {
        user_id: i64,
        status: String,
    },
    SystemBroadcast {
        from_user_id: i64,
        content: String,
    },
    UserRegistered {
        user_id: i64,
        username: String,
    },
    UserLogin {
        user_id: i64,
        username: String,
    },
}
