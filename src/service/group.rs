//! Group membership
//!
//! A group is its member set: the first join creates it, the last leave
//! dissolves it. The relational rows are authoritative; the KV sets
//! (`group:{id}:members`, `user:{id}:groups`) are read-through caches
//! repopulated on miss and invalidated on mutation.

use std::sync::Arc;

use crate::data::{Database, KvStore, group_members_key, user_groups_key};
use crate::error::AppError;

const ROSTER_CACHE_TTL_SECONDS: i64 = 3600;

pub struct GroupService {
    db: Arc<Database>,
    kv: Arc<KvStore>,
}

impl GroupService {
    pub fn new(db: Arc<Database>, kv: Arc<KvStore>) -> Self {
        Self { db, kv }
    }

    pub async fn join(&self, group_id: i64, user_id: i64) -> Result<bool, AppError> {
        if !self.db.user_exists(user_id).await? {
            return Err(AppError::NotFound("user"));
        }
        let joined = self.db.join_group(group_id, user_id).await?;
        if joined {
            self.invalidate(group_id, user_id).await;
        }
        Ok(joined)
    }

    pub async fn leave(&self, group_id: i64, user_id: i64) -> Result<(), AppError> {
        if !self.db.leave_group(group_id, user_id).await? {
            return Err(AppError::NotFound("group membership"));
        }
        self.invalidate(group_id, user_id).await;
        Ok(())
    }

    /// Membership of a group, cache-first with relational fallback.
    pub async fn members(&self, group_id: i64) -> Result<Vec<i64>, AppError> {
        let key = group_members_key(group_id);
        match self.kv.set_get(&key).await {
            Ok(Some(members)) => return Ok(members),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, group_id, "Group member cache read failed");
            }
        }

        let members = self.db.group_members(group_id).await?;
        if !members.is_empty() {
            if let Err(error) = self.kv.set_put(&key, &members, ROSTER_CACHE_TTL_SECONDS).await {
                tracing::warn!(%error, group_id, "Group member cache repopulate failed");
            }
        }
        Ok(members)
    }

    /// Groups a user belongs to, cache-first.
    pub async fn groups_of(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let key = user_groups_key(user_id);
        match self.kv.set_get(&key).await {
            Ok(Some(groups)) => return Ok(groups),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, user_id, "User group cache read failed");
            }
        }

        let groups = self.db.user_groups(user_id).await?;
        if !groups.is_empty() {
            if let Err(error) = self.kv.set_put(&key, &groups, ROSTER_CACHE_TTL_SECONDS).await {
                tracing::warn!(%error, user_id, "User group cache repopulate failed");
            }
        }
        Ok(groups)
    }

    pub async fn is_member(&self, group_id: i64, user_id: i64) -> Result<bool, AppError> {
        Ok(self.members(group_id).await?.contains(&user_id))
    }

    async fn invalidate(&self, group_id: i64, user_id: i64) {
        for key in [group_members_key(group_id), user_groups_key(user_id)] {
            if let Err(error) = self.kv.set_invalidate(&key).await {
                tracing::warn!(%error, key, "Roster cache invalidation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn service() -> (GroupService, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&dir.path().join("test.db")).await.unwrap());
        let kv = Arc::new(KvStore::open(":memory:").await.unwrap());
        (GroupService::new(db, kv), dir)
    }

    async fn seed_user(service: &GroupService, name: &str) -> i64 {
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
    async fn join_populates_and_leave_invalidates() {
        let (service, _dir) = service().await;
        let a = seed_user(&service, "alice").await;
        let b = seed_user(&service, "bob").await;

        assert!(service.join(9, a).await.unwrap());
        assert!(service.join(9, b).await.unwrap());

        let mut members = service.members(9).await.unwrap();
        members.sort_unstable();
        assert_eq!(members, vec![a, b]);
        // Second read is served from the cache.
        assert_eq!(service.members(9).await.unwrap().len(), 2);

        service.leave(9, a).await.unwrap();
        assert_eq!(service.members(9).await.unwrap(), vec![b]);
        assert!(!service.is_member(9, a).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_user_cannot_join() {
        let (service, _dir) = service().await;
        assert!(matches!(
            service.join(9, 12345).await,
            Err(AppError::NotFound(_))
        ));
    }
}
