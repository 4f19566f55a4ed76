//! Fanout router
//!
//! Consumes relationship, file and system events and turns each one into
//! per-recipient deliveries: a frame for every recipient with a live
//! session, an offline notification envelope for the rest, deduplicated by
//! an idempotency key derived from the event id. Keeping recipient-set
//! computation here keeps it out of the hot ingress path and makes delivery
//! uniform regardless of where an event was produced.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::group::GroupService;
use super::offline::OfflineStore;
use super::relation::RelationService;
use crate::data::{Database, KvStore, now_seconds};
use crate::error::AppError;
use crate::events::{EventHandler, EventPayload, EventRecord};
use crate::session::{ServerFrame, SessionRegistry};

/// Idempotency window for offline notification dedup
const DEDUP_TTL_SECONDS: i64 = 3600;

pub struct FanoutRouter {
    registry: Arc<SessionRegistry>,
    db: Arc<Database>,
    kv: Arc<KvStore>,
    offline: Arc<OfflineStore>,
    relations: Arc<RelationService>,
    groups: Arc<GroupService>,
}

impl FanoutRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        db: Arc<Database>,
        kv: Arc<KvStore>,
        offline: Arc<OfflineStore>,
        relations: Arc<RelationService>,
        groups: Arc<GroupService>,
    ) -> Self {
        Self {
            registry,
            db,
            kv,
            offline,
            relations,
            groups,
        }
    }

    async fn route(&self, record: &EventRecord) -> Result<(), AppError> {
        let Some(payload) = record.decode() else {
            tracing::warn!(topic = %record.topic, offset = record.offset, "Skipping undecodable event");
            return Ok(());
        };

        match payload {
            EventPayload::FriendRequestSent {
                request_id,
                from_user_id,
                to_user_id,
                message,
            } => {
                self.notify(
                    record,
                    to_user_id,
                    "friend_request",
                    json!({
                        "request_id": request_id,
                        "from_user_id": from_user_id,
                        "message": message,
                    }),
                )
                .await
            }
            EventPayload::FriendRequestAccepted {
                request_id,
                from_user_id,
                to_user_id,
            } => {
                self.notify(
                    record,
                    from_user_id,
                    "friend_request_accepted",
                    json!({ "request_id": request_id, "by_user_id": to_user_id }),
                )
                .await
            }
            EventPayload::FriendRequestRejected {
                request_id,
                from_user_id,
                to_user_id,
            } => {
                self.notify(
                    record,
                    from_user_id,
                    "friend_request_rejected",
                    json!({ "request_id": request_id, "by_user_id": to_user_id }),
                )
                .await
            }
            EventPayload::FriendDeleted { user_id, friend_id } => {
                // Both parties learn about the deletion.
                self.notify(
                    record,
                    user_id,
                    "friend_deleted",
                    json!({ "friend_id": friend_id }),
                )
                .await?;
                self.notify(
                    record,
                    friend_id,
                    "friend_deleted",
                    json!({ "friend_id": user_id }),
                )
                .await
            }
            EventPayload::FileTransferRequest {
                request_id,
                from_user_id,
                to_user_id,
                file_name,
                file_size,
            } => {
                self.notify(
                    record,
                    to_user_id,
                    "file_transfer_request",
                    json!({
                        "request_id": request_id,
                        "from_user_id": from_user_id,
                        "file_name": file_name,
                        "file_size": file_size,
                    }),
                )
                .await
            }
            EventPayload::FileTransferAccepted {
                request_id,
                from_user_id,
                to_user_id,
                file_id,
                file_name,
            } => {
                self.notify(
                    record,
                    from_user_id,
                    "file_transfer_accepted",
                    json!({
                        "request_id": request_id,
                        "by_user_id": to_user_id,
                        "file_id": file_id,
                        "file_name": file_name,
                    }),
                )
                .await
            }
            EventPayload::FileTransferRejected {
                request_id,
                from_user_id,
                to_user_id,
                file_id,
                file_name,
            } => {
                self.notify(
                    record,
                    from_user_id,
                    "file_transfer_rejected",
                    json!({
                        "request_id": request_id,
                        "by_user_id": to_user_id,
                        "file_id": file_id,
                        "file_name": file_name,
                    }),
                )
                .await
            }
            EventPayload::PresenceChange { user_id, status } => {
                self.fan_out_presence(user_id, &status).await
            }
            EventPayload::SystemBroadcast {
                from_user_id,
                content,
            } => {
                let delivered = self.registry.broadcast(&ServerFrame::SystemBroadcast {
                    from_user_id,
                    content,
                    timestamp: now_seconds(),
                });
                tracing::info!(from_user_id, delivered, "System broadcast fanned out");
                Ok(())
            }
            // Registration/login audit events need no fanout.
            EventPayload::UserRegistered { .. } | EventPayload::UserLogin { .. } => Ok(()),
            // Message topics are delivered on the ingress path.
            EventPayload::MessageSent { .. } | EventPayload::OfflineQueued { .. } => Ok(()),
        }
    }

    /// Deliver one notification: live sessions get a frame; a recipient with
    /// none gets an offline envelope, stored once per event id.
    async fn notify(
        &self,
        record: &EventRecord,
        recipient: i64,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppError> {
        let frame = ServerFrame::Notification {
            kind: kind.to_string(),
            payload: payload.clone(),
            timestamp: now_seconds(),
        };
        if self.registry.send_to_user(recipient, &frame) > 0 {
            return Ok(());
        }

        let dedup_key = format!("{}:{}", record.event_id, recipient);
        match self.kv.dedup_insert(&dedup_key, DEDUP_TTL_SECONDS).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(error) => {
                // Dedup is advisory; better to risk a duplicate than to drop.
                tracing::warn!(%error, recipient, "Notification dedup check failed");
            }
        }

        self.offline
            .enqueue_notification(recipient, kind, &payload)
            .await?;
        self.db
            .insert_notification(recipient, kind, &payload.to_string())
            .await?;
        Ok(())
    }

    /// Presence deltas go to friends (`user_status`) and fellow group
    /// members (`group_user_status`), with overlapping recipients collapsed:
    /// a friend sharing a group hears once, as a friend. Presence is
    /// transient, so recipients with no live session are skipped rather
    /// than queued.
    async fn fan_out_presence(&self, user_id: i64, status: &str) -> Result<(), AppError> {
        let timestamp = now_seconds();
        let mut notified: HashSet<i64> = HashSet::new();
        notified.insert(user_id);

        let friend_frame = ServerFrame::UserStatus {
            user_id,
            status: status.to_string(),
            timestamp,
        };
        for friend_id in self.relations.friend_ids(user_id).await? {
            if notified.insert(friend_id) {
                self.registry.send_to_user(friend_id, &friend_frame);
            }
        }

        for group_id in self.groups.groups_of(user_id).await? {
            let frame = ServerFrame::GroupUserStatus {
                group_id,
                user_id,
                status: status.to_string(),
                timestamp,
            };
            for member_id in self.groups.members(group_id).await? {
                if notified.insert(member_id) {
                    self.registry.send_to_user(member_id, &frame);
                }
            }
        }

        tracing::debug!(
            user_id,
            status,
            recipients = notified.len() - 1,
            "Presence change fanned out"
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler for FanoutRouter {
    async fn handle(&self, record: &EventRecord) -> bool {
        match self.route(record).await {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(
                    %error,
                    topic = %record.topic,
                    offset = record.offset,
                    "Fanout failed, event will be redelivered"
                );
                false
            }
        }
    }
}
