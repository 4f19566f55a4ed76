//! Offline store
//!
//! Per-user FIFO queues of message and notification envelopes over the KV
//! store. Messages keep for 30 days, notifications for 7; both are capped
//! per user by trimming the oldest.

use std::sync::Arc;

use serde_json::Value;

use crate::config::DeliveryConfig;
use crate::data::{KvStore, MessageEnvelope, OfflineKind, now_seconds};
use crate::error::AppError;

/// Offline queues handle
pub struct OfflineStore {
    kv: Arc<KvStore>,
    config: DeliveryConfig,
}

impl OfflineStore {
    pub fn new(kv: Arc<KvStore>, config: DeliveryConfig) -> Self {
        Self { kv, config }
    }

    /// Append a message envelope for a recipient with no live session.
    pub async fn enqueue_message(
        &self,
        user_id: i64,
        envelope: &MessageEnvelope,
    ) -> Result<(), AppError> {
        let json =
            serde_json::to_string(envelope).map_err(|e| AppError::Cache(e.to_string()))?;
        self.kv
            .offline_push(
                user_id,
                OfflineKind::Message,
                &json,
                self.config.offline_message_ttl_seconds,
                self.config.offline_queue_cap,
            )
            .await
    }

    /// Append a notification envelope (`{kind, payload, queued_at}`).
    pub async fn enqueue_notification(
        &self,
        user_id: i64,
        kind: &str,
        payload: &Value,
    ) -> Result<(), AppError> {
        let envelope = serde_json::json!({
            "kind": kind,
            "payload": payload,
            "queued_at": now_seconds(),
        });
        self.kv
            .offline_push(
                user_id,
                OfflineKind::Notification,
                &envelope.to_string(),
                self.config.offline_notification_ttl_seconds,
                self.config.offline_queue_cap,
            )
            .await
    }

    /// Pop up to `max` queued messages, oldest first.
    pub async fn drain_messages(
        &self,
        user_id: i64,
        max: usize,
    ) -> Result<Vec<MessageEnvelope>, AppError> {
        let raw = self
            .kv
            .offline_drain(user_id, OfflineKind::Message, max)
            .await?;
        Ok(decode_envelopes(user_id, raw))
    }

    /// Read queued notifications without removing them; the reconnect path
    /// must not lose envelopes on a dropped response.
    pub async fn peek_notifications(&self, user_id: i64, max: usize) -> Result<Vec<Value>, AppError> {
        let raw = self
            .kv
            .offline_peek(user_id, OfflineKind::Notification, max)
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|json| serde_json::from_str(&json).ok())
            .collect())
    }

    /// Pop up to `max` queued notifications, oldest first.
    pub async fn drain_notifications(
        &self,
        user_id: i64,
        max: usize,
    ) -> Result<Vec<Value>, AppError> {
        let raw = self
            .kv
            .offline_drain(user_id, OfflineKind::Notification, max)
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|json| serde_json::from_str(&json).ok())
            .collect())
    }

    pub async fn message_count(&self, user_id: i64) -> Result<i64, AppError> {
        self.kv.offline_len(user_id, OfflineKind::Message).await
    }
}

fn decode_envelopes(user_id: i64, raw: Vec<String>) -> Vec<MessageEnvelope> {
    raw.into_iter()
        .filter_map(|json| match serde_json::from_str(&json) {
            Ok(envelope) => Some(envelope),
            Err(error) => {
                tracing::warn!(%error, user_id, "Dropping undecodable offline envelope");
                None
            }
        })
        .collect()
}
