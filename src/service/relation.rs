//! Friend relationships
//!
//! Friend requests with one-shot state transitions, the symmetric friend
//! set, and the relationship events that drive notification fanout.

use std::sync::Arc;

use crate::data::{Database, FriendInfo, FriendRequest, HandledRequest, KvStore, friends_key};
use crate::error::AppError;
use crate::events::{EventBus, EventPayload, topics};

const ROSTER_CACHE_TTL_SECONDS: i64 = 3600;

pub struct RelationService {
    db: Arc<Database>,
    kv: Arc<KvStore>,
    bus: Arc<EventBus>,
}

impl RelationService {
    pub fn new(db: Arc<Database>, kv: Arc<KvStore>, bus: Arc<EventBus>) -> Self {
        Self { db, kv, bus }
    }

    /// Send a friend request.
    ///
    /// # Errors
    /// `InvalidArgument` for a self-request, `NotFound` for an unknown
    /// target, `AlreadyExists` when already friends or a pending request for
    /// the ordered pair exists.
    pub async fn send_request(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        message: &str,
    ) -> Result<i64, AppError> {
        if from_user_id == to_user_id {
            return Err(AppError::InvalidArgument(
                "cannot send a friend request to yourself".to_string(),
            ));
        }
        if !self.db.user_exists(to_user_id).await? {
            return Err(AppError::NotFound("user"));
        }
        if self.db.are_friends(from_user_id, to_user_id).await? {
            return Err(AppError::AlreadyExists("friendship".to_string()));
        }
        if self.db.has_pending_request(from_user_id, to_user_id).await? {
            return Err(AppError::AlreadyExists("pending friend request".to_string()));
        }

        let request_id = self
            .db
            .create_friend_request(from_user_id, to_user_id, message)
            .await?;

        self.publish(
            &to_user_id.to_string(),
            &EventPayload::FriendRequestSent {
                request_id,
                from_user_id,
                to_user_id,
                message: message.to_string(),
            },
        );

        tracing::info!(request_id, from_user_id, to_user_id, "Friend request sent");
        Ok(request_id)
    }

    /// Accept or reject a request. The state machine is monotonic: once
    /// handled, further calls fail with `Conflict`.
    pub async fn handle_request(
        &self,
        request_id: i64,
        handler_id: i64,
        accept: bool,
    ) -> Result<HandledRequest, AppError> {
        let handled = self
            .db
            .handle_friend_request(request_id, handler_id, accept)
            .await?;

        if handled.accepted {
            self.invalidate_friends(handled.from_user_id).await;
            self.invalidate_friends(handled.to_user_id).await;
        }

        let payload = if handled.accepted {
            EventPayload::FriendRequestAccepted {
                request_id,
                from_user_id: handled.from_user_id,
                to_user_id: handled.to_user_id,
            }
        } else {
            EventPayload::FriendRequestRejected {
                request_id,
                from_user_id: handled.from_user_id,
                to_user_id: handled.to_user_id,
            }
        };
        self.publish(&handled.from_user_id.to_string(), &payload);

        tracing::info!(
            request_id,
            accepted = handled.accepted,
            "Friend request handled"
        );
        Ok(handled)
    }

    pub async fn pending_requests(&self, user_id: i64) -> Result<Vec<FriendRequest>, AppError> {
        self.db.pending_requests(user_id).await
    }

    pub async fn list_friends(&self, user_id: i64) -> Result<Vec<FriendInfo>, AppError> {
        self.db.list_friends(user_id).await
    }

    /// Friend ids, cache-first with relational fallback.
    pub async fn friend_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let key = friends_key(user_id);
        match self.kv.set_get(&key).await {
            Ok(Some(ids)) => return Ok(ids),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, user_id, "Friend cache read failed");
            }
        }

        let ids = self.db.friend_ids(user_id).await?;
        if !ids.is_empty() {
            if let Err(error) = self.kv.set_put(&key, &ids, ROSTER_CACHE_TTL_SECONDS).await {
                tracing::warn!(%error, user_id, "Friend cache repopulate failed");
            }
        }
        Ok(ids)
    }

    /// Delete a friendship in both directions; both parties are notified.
    pub async fn delete_friend(&self, user_id: i64, friend_id: i64) -> Result<(), AppError> {
        if !self.db.delete_friend(user_id, friend_id).await? {
            return Err(AppError::NotFound("friendship"));
        }
        self.invalidate_friends(user_id).await;
        self.invalidate_friends(friend_id).await;

        self.publish(
            &user_id.to_string(),
            &EventPayload::FriendDeleted { user_id, friend_id },
        );

        tracing::info!(user_id, friend_id, "Friendship deleted");
        Ok(())
    }

    fn publish(&self, key: &str, payload: &EventPayload) {
        if let Err(error) = self.bus.publish(topics::RELATIONSHIP_EVENTS, key, payload) {
            tracing::warn!(%error, "Failed to publish relationship event");
        }
    }

    async fn invalidate_friends(&self, user_id: i64) {
        if let Err(error) = self.kv.set_invalidate(&friends_key(user_id)).await {
            tracing::warn!(%error, user_id, "Friend cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::watch;

    async fn service() -> (RelationService, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&dir.path().join("test.db")).await.unwrap());
        let kv = Arc::new(KvStore::open(":memory:").await.unwrap());
        let (_tx, rx) = watch::channel(false);
        let bus = Arc::new(EventBus::new(1024, rx));
        (RelationService::new(db, kv, bus), dir)
    }

    async fn seed_user(service: &RelationService, name: &str) -> i64 {
        service
            .db
            .create_user(
                name,
                &format!("{name}@example.com"),
                "hash",
                "salt",
                "user",
                crate::data::UserStatus::Active,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn request_lifecycle_with_conflict_on_repeat() {
        let (service, _dir) = service().await;
        let a = seed_user(&service, "alice").await;
        let b = seed_user(&service, "bob").await;

        let request_id = service.send_request(a, b, "hi").await.unwrap();
        let handled = service.handle_request(request_id, b, true).await.unwrap();
        assert!(handled.accepted);

        let repeat = service.handle_request(request_id, b, false).await;
        assert!(matches!(
            repeat,
            Err(AppError::Conflict(
                crate::error::ConflictKind::FriendRequestHandled,
                _
            ))
        ));

        let mut ids = service.friend_ids(a).await.unwrap();
        ids.sort_unstable();
        assert_eq!(ids, vec![b]);
    }

    #[tokio::test]
    async fn duplicate_pending_request_is_rejected() {
        let (service, _dir) = service().await;
        let a = seed_user(&service, "alice").await;
        let b = seed_user(&service, "bob").await;

        service.send_request(a, b, "hi").await.unwrap();
        assert!(matches!(
            service.send_request(a, b, "hi again").await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn self_request_is_invalid() {
        let (service, _dir) = service().await;
        let a = seed_user(&service, "alice").await;
        assert!(matches!(
            service.send_request(a, a, "hi me").await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn delete_requires_existing_friendship() {
        let (service, _dir) = service().await;
        let a = seed_user(&service, "alice").await;
        let b = seed_user(&service, "bob").await;
        assert!(matches!(
            service.delete_friend(a, b).await,
            Err(AppError::NotFound(_))
        ));

        let request_id = service.send_request(a, b, "").await.unwrap();
        service.handle_request(request_id, b, true).await.unwrap();
        service.delete_friend(a, b).await.unwrap();
        assert!(service.friend_ids(a).await.unwrap().is_empty());
    }
}
