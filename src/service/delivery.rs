//! Delivery engine
//!
//! Message ingress pipeline. Each submission runs, in order:
//! validate -> persist -> cache -> publish event -> push-or-enqueue.
//! The persistence leg is fatal to the call; everything after it is
//! best-effort and recoverable through the consumer loops or a later
//! history query.

use std::sync::Arc;

use super::group::GroupService;
use super::offline::OfflineStore;
use super::presence::PresenceService;
use crate::config::DeliveryConfig;
use crate::data::{
    ChatType, Database, KvStore, MessageEnvelope, MessageKind, group_conversation_key, now_millis,
    now_seconds, personal_conversation_key,
};
use crate::error::AppError;
use crate::events::{EventBus, EventPayload, topics};
use crate::session::{ServerFrame, SessionRegistry};

/// What a successful submit returns to the caller
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SubmitReceipt {
    pub message_id: i64,
    /// Server-stamped, milliseconds since epoch
    pub send_time: i64,
    /// Sessions the message was pushed to in real time
    pub delivered_sessions: usize,
    /// Recipients enqueued for offline pickup
    pub queued_offline: usize,
}

/// Message ingress and receipt handling
pub struct DeliveryEngine {
    db: Arc<Database>,
    kv: Arc<KvStore>,
    bus: Arc<EventBus>,
    registry: Arc<SessionRegistry>,
    offline: Arc<OfflineStore>,
    presence: PresenceService,
    groups: Arc<GroupService>,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        kv: Arc<KvStore>,
        bus: Arc<EventBus>,
        registry: Arc<SessionRegistry>,
        offline: Arc<OfflineStore>,
        presence: PresenceService,
        groups: Arc<GroupService>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            db,
            kv,
            bus,
            registry,
            offline,
            presence,
            groups,
            config,
        }
    }

    /// Submit a message for delivery.
    ///
    /// # Errors
    /// `InvalidArgument` for an oversized payload, `NotFound` for a missing
    /// recipient, `PermissionDenied` when a non-member posts to a group,
    /// `Storage` when the insert fails. Post-persistence failures never
    /// surface here.
    pub async fn submit(
        &self,
        sender_id: i64,
        chat_type: ChatType,
        recipient_id: i64,
        kind: MessageKind,
        content: &str,
        extra_info: Option<&str>,
    ) -> Result<SubmitReceipt, AppError> {
        // 1. Validate. A payload of exactly the configured size passes.
        if content.len() > self.config.max_payload_bytes {
            return Err(AppError::InvalidArgument(format!(
                "payload exceeds {} bytes",
                self.config.max_payload_bytes
            )));
        }
        let members = match chat_type {
            ChatType::Personal => {
                if !self.db.user_exists(recipient_id).await? {
                    return Err(AppError::NotFound("recipient"));
                }
                Vec::new()
            }
            ChatType::Group => {
                let members = self.groups.members(recipient_id).await?;
                if members.is_empty() {
                    return Err(AppError::NotFound("group"));
                }
                if !members.contains(&sender_id) {
                    return Err(AppError::PermissionDenied);
                }
                members
            }
        };
        let extra_info = extra_info.unwrap_or("{}");

        // 2. Persist. The relation assigns the id; the send time is stamped
        //    here and never altered.
        let send_time = now_millis();
        let message_id = self
            .db
            .insert_message(sender_id, recipient_id, chat_type, kind, content, send_time, extra_info)
            .await?;

        let envelope = MessageEnvelope {
            id: message_id,
            from_user_id: sender_id,
            to_user_id: recipient_id,
            chat_type,
            message_type: kind.as_str().to_string(),
            content: content.to_string(),
            send_time,
            is_read: false,
            extra_info: extra_info.to_string(),
        };

        crate::metrics::MESSAGES_SUBMITTED_TOTAL
            .with_label_values(&[chat_type.as_str(), kind.as_str()])
            .inc();

        // 3. Cache the envelope; a cache failure never blocks delivery.
        self.cache_envelope(&envelope).await;

        // 4. Publish the durable event; failures are logged and the direct
        //    path below still runs.
        let topic = match chat_type {
            ChatType::Personal => topics::MESSAGES_PERSONAL,
            ChatType::Group => topics::MESSAGES_GROUP,
        };
        if let Err(error) = self.bus.publish(
            topic,
            &recipient_id.to_string(),
            &EventPayload::MessageSent {
                message: envelope.clone(),
            },
        ) {
            tracing::warn!(%error, message_id, "Failed to publish message event");
        }

        // 5. Push to online sessions, enqueue for everyone else.
        let receipt = match chat_type {
            ChatType::Personal => {
                self.deliver_personal(sender_id, recipient_id, &envelope)
                    .await
            }
            ChatType::Group => {
                self.deliver_group(sender_id, recipient_id, &members, &envelope)
                    .await
            }
        };

        Ok(SubmitReceipt {
            message_id,
            send_time,
            delivered_sessions: receipt.0,
            queued_offline: receipt.1,
        })
    }

    async fn deliver_personal(
        &self,
        sender_id: i64,
        recipient_id: i64,
        envelope: &MessageEnvelope,
    ) -> (usize, usize) {
        let frame = personal_frame(envelope);
        let delivered = self.registry.send_to_user(recipient_id, &frame);
        if delivered > 0 {
            crate::metrics::MESSAGES_DELIVERED_TOTAL
                .with_label_values(&["realtime"])
                .inc();
            self.acknowledge(sender_id, envelope.id, "delivered");
            (delivered, 0)
        } else {
            self.enqueue_offline(recipient_id, envelope).await;
            (0, 1)
        }
    }

    async fn deliver_group(
        &self,
        sender_id: i64,
        group_id: i64,
        members: &[i64],
        envelope: &MessageEnvelope,
    ) -> (usize, usize) {
        let frame = group_frame(envelope, group_id);
        let mut delivered = 0;
        let mut queued = 0;
        for member in members {
            // Group broadcast never echoes back to the sender.
            if *member == sender_id {
                continue;
            }
            let sent = self.registry.send_to_user(*member, &frame);
            if sent > 0 {
                delivered += sent;
                crate::metrics::MESSAGES_DELIVERED_TOTAL
                    .with_label_values(&["realtime"])
                    .inc();
            } else {
                self.enqueue_offline(*member, envelope).await;
                queued += 1;
            }
        }
        if delivered > 0 {
            self.acknowledge(sender_id, envelope.id, "delivered");
        }
        (delivered, queued)
    }

    async fn enqueue_offline(&self, recipient_id: i64, envelope: &MessageEnvelope) {
        crate::metrics::MESSAGES_DELIVERED_TOTAL
            .with_label_values(&["offline"])
            .inc();
        if let Err(error) = self.offline.enqueue_message(recipient_id, envelope).await {
            tracing::error!(%error, recipient_id, message_id = envelope.id, "Failed to enqueue offline message");
        }
        if let Err(error) = self.bus.publish(
            topics::OFFLINE_MESSAGES,
            &recipient_id.to_string(),
            &EventPayload::OfflineQueued {
                user_id: recipient_id,
                message: envelope.clone(),
            },
        ) {
            tracing::warn!(%error, recipient_id, "Failed to publish offline-queue event");
        }
    }

    async fn cache_envelope(&self, envelope: &MessageEnvelope) {
        let conv_key = match envelope.chat_type {
            ChatType::Personal => {
                personal_conversation_key(envelope.from_user_id, envelope.to_user_id)
            }
            ChatType::Group => group_conversation_key(envelope.to_user_id),
        };
        let json = match serde_json::to_string(envelope) {
            Ok(json) => json,
            Err(error) => {
                tracing::warn!(%error, "Failed to serialize envelope for cache");
                return;
            }
        };
        if let Err(error) = self
            .kv
            .conversation_push(
                &conv_key,
                &json,
                self.config.history_cache_len,
                self.config.history_cache_ttl_seconds,
            )
            .await
        {
            tracing::warn!(%error, conv_key, "Conversation cache write failed");
        }
    }

    /// Send a delivered/read acknowledgement to every session of a user.
    fn acknowledge(&self, user_id: i64, message_id: i64, status: &str) {
        let frame = ServerFrame::MessageAcknowledgement {
            message_id,
            status: status.to_string(),
            timestamp: now_seconds(),
        };
        self.registry.send_to_user(user_id, &frame);
    }

    /// Apply a read receipt.
    ///
    /// The read flag flips under a predicate requiring the reader to be the
    /// recipient, so repeats are no-ops; the `read` ack reaches the original
    /// sender at most once per flip.
    pub async fn mark_read(&self, reader_id: i64, message_id: i64) -> Result<bool, AppError> {
        let newly_read = self.db.mark_read(message_id, reader_id).await?;
        if newly_read {
            if let Some(message) = self.db.get_message(message_id).await? {
                self.acknowledge(message.from_user_id, message_id, "read");
            }
        }
        Ok(newly_read)
    }

    /// Recent 1:1 history: served from the conversation cache when warm,
    /// from the relational store otherwise.
    pub async fn personal_history(
        &self,
        user_id: i64,
        peer_id: i64,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: usize,
    ) -> Result<Vec<MessageEnvelope>, AppError> {
        let limit = limit.clamp(1, 100);

        if start_time.is_none() && end_time.is_none() {
            let conv_key = personal_conversation_key(user_id, peer_id);
            match self.kv.conversation_recent(&conv_key, limit).await {
                Ok(cached) if !cached.is_empty() => {
                    return Ok(cached
                        .into_iter()
                        .filter_map(|json| serde_json::from_str(&json).ok())
                        .collect());
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(%error, "Conversation cache read failed, falling back to store");
                }
            }
        }

        let rows = self
            .db
            .personal_history(user_id, peer_id, start_time, end_time, limit as i64)
            .await?;
        Ok(rows.iter().map(|m| m.envelope()).collect())
    }

    /// Recent group history for a member.
    pub async fn group_history(
        &self,
        user_id: i64,
        group_id: i64,
        limit: usize,
    ) -> Result<Vec<MessageEnvelope>, AppError> {
        if !self.groups.members(group_id).await?.contains(&user_id) {
            return Err(AppError::PermissionDenied);
        }
        let limit = limit.clamp(1, 100);

        let conv_key = group_conversation_key(group_id);
        match self.kv.conversation_recent(&conv_key, limit).await {
            Ok(cached) if !cached.is_empty() => {
                return Ok(cached
                    .into_iter()
                    .filter_map(|json| serde_json::from_str(&json).ok())
                    .collect());
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, "Group cache read failed, falling back to store");
            }
        }

        let rows = self.db.group_history(group_id, limit as i64).await?;
        Ok(rows.iter().map(|m| m.envelope()).collect())
    }

    /// Whether a user counts as online: live local session or unexpired
    /// marker.
    pub async fn is_online(&self, user_id: i64) -> bool {
        self.presence
            .is_online(user_id, self.registry.user_session_count(user_id) > 0)
            .await
    }
}

fn personal_frame(envelope: &MessageEnvelope) -> ServerFrame {
    ServerFrame::ChatMessage {
        message_id: envelope.id,
        from_user_id: envelope.from_user_id,
        content: envelope.content.clone(),
        message_type: envelope.message_type.clone(),
        extra_info: envelope.extra_info.clone(),
        timestamp: now_seconds(),
    }
}

fn group_frame(envelope: &MessageEnvelope, group_id: i64) -> ServerFrame {
    ServerFrame::GroupMessage {
        message_id: envelope.id,
        group_id,
        from_user_id: envelope.from_user_id,
        content: envelope.content.clone(),
        message_type: envelope.message_type.clone(),
        timestamp: now_seconds(),
    }
}
