//! Embedded key/value store backed by a local turso database.
//!
//! This is the process-local stand-in for the external KV collaborator:
//! presence markers, conversation caches, offline queues, roster sets,
//! fanout idempotency keys and verification codes, all with TTL columns
//! pruned on access. File-backed by default so offline queues survive a
//! restart; `:memory:` in tests.

use turso::{Builder, Connection};

use crate::error::AppError;

/// Envelope kinds held in the offline queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineKind {
    Message,
    Notification,
}

impl OfflineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Notification => "notification",
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Key/value store handle
pub struct KvStore {
    /// Hold database for lifetime management.
    _db: turso::Database,
    conn: Connection,
}

impl KvStore {
    /// Open the store at `path` (":memory:" for a volatile store) and create
    /// the schema.
    pub async fn open(path: &str) -> Result<Self, AppError> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| AppError::Cache(format!("kv store path: {e}")))?;
                }
            }
        }

        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS presence (
                user_id INTEGER PRIMARY KEY,
                online_until_ms INTEGER,
                status TEXT,
                status_expires_at_ms INTEGER,
                last_seen INTEGER
            );
            CREATE TABLE IF NOT EXISTS conversation_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conv_key TEXT NOT NULL,
                envelope TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conversation_cache_key
                ON conversation_cache(conv_key, id DESC);
            CREATE TABLE IF NOT EXISTS offline_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                envelope TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_offline_queue_user
                ON offline_queue(user_id, kind, seq);
            CREATE TABLE IF NOT EXISTS roster_sets (
                set_key TEXT NOT NULL,
                member_id INTEGER NOT NULL,
                expires_at_ms INTEGER NOT NULL,
                PRIMARY KEY (set_key, member_id)
            );
            CREATE TABLE IF NOT EXISTS dedup_keys (
                dedup_key TEXT PRIMARY KEY,
                expires_at_ms INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS string_values (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            );
            "#,
        )
        .await?;

        Ok(Self { _db: db, conn })
    }

    // =========================================================================
    // Presence markers
    // =========================================================================

    /// Set or refresh the online marker with the given TTL.
    pub async fn presence_mark_online(
        &self,
        user_id: i64,
        ttl_seconds: i64,
    ) -> Result<(), AppError> {
        let until = now_ms() + ttl_seconds * 1000;
        self.conn
            .execute(
                r#"
                INSERT INTO presence (user_id, online_until_ms) VALUES (?1, ?2)
                ON CONFLICT(user_id) DO UPDATE SET online_until_ms = excluded.online_until_ms
                "#,
                (user_id, until),
            )
            .await?;
        Ok(())
    }

    /// Clear the marker and record the last-seen timestamp (unix seconds).
    pub async fn presence_mark_offline(
        &self,
        user_id: i64,
        last_seen: i64,
    ) -> Result<(), AppError> {
        self.conn
            .execute(
                r#"
                INSERT INTO presence (user_id, online_until_ms, last_seen) VALUES (?1, NULL, ?2)
                ON CONFLICT(user_id) DO UPDATE SET
                    online_until_ms = NULL,
                    last_seen = excluded.last_seen
                "#,
                (user_id, last_seen),
            )
            .await?;
        Ok(())
    }

    /// Whether the online marker exists and is unexpired.
    pub async fn presence_is_online(&self, user_id: i64) -> Result<bool, AppError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM presence WHERE user_id = ?1 AND online_until_ms > ?2",
                (user_id, now_ms()),
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count > 0)
    }

    pub async fn presence_last_seen(&self, user_id: i64) -> Result<Option<i64>, AppError> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_seen FROM presence WHERE user_id = ?1",
                [user_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<i64>>(0)?),
            None => Ok(None),
        }
    }

    /// Store a free-form status value (WS `status_update`) with its own TTL.
    pub async fn presence_set_status(
        &self,
        user_id: i64,
        status: &str,
        ttl_seconds: i64,
    ) -> Result<(), AppError> {
        let expires = now_ms() + ttl_seconds * 1000;
        self.conn
            .execute(
                r#"
                INSERT INTO presence (user_id, status, status_expires_at_ms) VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id) DO UPDATE SET
                    status = excluded.status,
                    status_expires_at_ms = excluded.status_expires_at_ms
                "#,
                (user_id, status, expires),
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Conversation caches
    // =========================================================================

    /// Push an envelope to the front of a conversation cache, refresh the
    /// list TTL and trim to `cap` entries.
    pub async fn conversation_push(
        &self,
        conv_key: &str,
        envelope: &str,
        cap: usize,
        ttl_seconds: i64,
    ) -> Result<(), AppError> {
        let expires = now_ms() + ttl_seconds * 1000;
        self.prune_conversations().await?;
        self.conn
            .execute(
                "INSERT INTO conversation_cache (conv_key, envelope, expires_at_ms) VALUES (?1, ?2, ?3)",
                (conv_key, envelope, expires),
            )
            .await?;
        // Pushing refreshes the whole list's TTL, like EXPIRE on a list key.
        self.conn
            .execute(
                "UPDATE conversation_cache SET expires_at_ms = ?1 WHERE conv_key = ?2",
                (expires, conv_key),
            )
            .await?;
        self.conn
            .execute(
                r#"
                DELETE FROM conversation_cache
                WHERE conv_key = ?1 AND id NOT IN (
                    SELECT id FROM conversation_cache
                    WHERE conv_key = ?1
                    ORDER BY id DESC
                    LIMIT ?2
                )
                "#,
                (conv_key, cap as i64),
            )
            .await?;
        Ok(())
    }

    /// Most recent envelopes first, up to `limit`.
    pub async fn conversation_recent(
        &self,
        conv_key: &str,
        limit: usize,
    ) -> Result<Vec<String>, AppError> {
        self.prune_conversations().await?;
        let mut rows = self
            .conn
            .query(
                "SELECT envelope FROM conversation_cache WHERE conv_key = ?1 \
                 ORDER BY id DESC LIMIT ?2",
                (conv_key, limit as i64),
            )
            .await?;
        let mut envelopes = Vec::new();
        while let Some(row) = rows.next().await? {
            envelopes.push(row.get::<String>(0)?);
        }

        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
        if envelopes.is_empty() {
            CACHE_MISSES_TOTAL.with_label_values(&["conversation"]).inc();
        } else {
            CACHE_HITS_TOTAL.with_label_values(&["conversation"]).inc();
        }
        Ok(envelopes)
    }

    pub async fn conversation_len(&self, conv_key: &str) -> Result<i64, AppError> {
        self.prune_conversations().await?;
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM conversation_cache WHERE conv_key = ?1",
                [conv_key],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    async fn prune_conversations(&self) -> Result<(), AppError> {
        self.conn
            .execute(
                "DELETE FROM conversation_cache WHERE expires_at_ms < ?1",
                [now_ms()],
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Offline queues
    // =========================================================================

    /// Append an envelope; trims the oldest entries above `cap`.
    pub async fn offline_push(
        &self,
        user_id: i64,
        kind: OfflineKind,
        envelope: &str,
        ttl_seconds: i64,
        cap: usize,
    ) -> Result<(), AppError> {
        let expires = now_ms() + ttl_seconds * 1000;
        self.prune_offline().await?;
        self.conn
            .execute(
                "INSERT INTO offline_queue (user_id, kind, envelope, expires_at_ms) \
                 VALUES (?1, ?2, ?3, ?4)",
                (user_id, kind.as_str(), envelope, expires),
            )
            .await?;
        self.conn
            .execute(
                r#"
                DELETE FROM offline_queue
                WHERE user_id = ?1 AND kind = ?2 AND seq NOT IN (
                    SELECT seq FROM offline_queue
                    WHERE user_id = ?1 AND kind = ?2
                    ORDER BY seq DESC
                    LIMIT ?3
                )
                "#,
                (user_id, kind.as_str(), cap as i64),
            )
            .await?;
        self.update_offline_depth(kind).await?;
        Ok(())
    }

    /// Pop up to `max` envelopes from the head, oldest first.
    pub async fn offline_drain(
        &self,
        user_id: i64,
        kind: OfflineKind,
        max: usize,
    ) -> Result<Vec<String>, AppError> {
        self.prune_offline().await?;
        let mut rows = self
            .conn
            .query(
                "SELECT seq, envelope FROM offline_queue \
                 WHERE user_id = ?1 AND kind = ?2 ORDER BY seq ASC LIMIT ?3",
                (user_id, kind.as_str(), max as i64),
            )
            .await?;
        let mut envelopes = Vec::new();
        let mut last_seq = None;
        while let Some(row) = rows.next().await? {
            last_seq = Some(row.get::<i64>(0)?);
            envelopes.push(row.get::<String>(1)?);
        }
        if let Some(seq) = last_seq {
            self.conn
                .execute(
                    "DELETE FROM offline_queue WHERE user_id = ?1 AND kind = ?2 AND seq <= ?3",
                    (user_id, kind.as_str(), seq),
                )
                .await?;
        }
        self.update_offline_depth(kind).await?;
        Ok(envelopes)
    }

    /// Read up to `max` envelopes without removing them.
    pub async fn offline_peek(
        &self,
        user_id: i64,
        kind: OfflineKind,
        max: usize,
    ) -> Result<Vec<String>, AppError> {
        self.prune_offline().await?;
        let mut rows = self
            .conn
            .query(
                "SELECT envelope FROM offline_queue \
                 WHERE user_id = ?1 AND kind = ?2 ORDER BY seq ASC LIMIT ?3",
                (user_id, kind.as_str(), max as i64),
            )
            .await?;
        let mut envelopes = Vec::new();
        while let Some(row) = rows.next().await? {
            envelopes.push(row.get::<String>(0)?);
        }
        Ok(envelopes)
    }

    pub async fn offline_len(&self, user_id: i64, kind: OfflineKind) -> Result<i64, AppError> {
        self.prune_offline().await?;
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM offline_queue WHERE user_id = ?1 AND kind = ?2",
                (user_id, kind.as_str()),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    async fn prune_offline(&self) -> Result<(), AppError> {
        self.conn
            .execute("DELETE FROM offline_queue WHERE expires_at_ms < ?1", [now_ms()])
            .await?;
        Ok(())
    }

    async fn update_offline_depth(&self, kind: OfflineKind) -> Result<(), AppError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM offline_queue WHERE kind = ?1",
                [kind.as_str()],
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        use crate::metrics::OFFLINE_QUEUE_DEPTH;
        OFFLINE_QUEUE_DEPTH
            .with_label_values(&[kind.as_str()])
            .set(count);
        Ok(())
    }

    // =========================================================================
    // Roster sets (friends, groups, group members)
    // =========================================================================

    /// Replace a set's members and TTL.
    pub async fn set_put(
        &self,
        set_key: &str,
        members: &[i64],
        ttl_seconds: i64,
    ) -> Result<(), AppError> {
        let expires = now_ms() + ttl_seconds * 1000;
        self.conn
            .execute("DELETE FROM roster_sets WHERE set_key = ?1", [set_key])
            .await?;
        for member in members {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO roster_sets (set_key, member_id, expires_at_ms) \
                     VALUES (?1, ?2, ?3)",
                    (set_key, *member, expires),
                )
                .await?;
        }
        Ok(())
    }

    /// Members of a cached set; `None` on a miss (expired or never cached).
    ///
    /// An intentionally cached empty set cannot be told apart from a miss;
    /// callers fall back to the relational store in both cases.
    pub async fn set_get(&self, set_key: &str) -> Result<Option<Vec<i64>>, AppError> {
        self.conn
            .execute("DELETE FROM roster_sets WHERE expires_at_ms < ?1", [now_ms()])
            .await?;
        let mut rows = self
            .conn
            .query(
                "SELECT member_id FROM roster_sets WHERE set_key = ?1",
                [set_key],
            )
            .await?;
        let mut members = Vec::new();
        while let Some(row) = rows.next().await? {
            members.push(row.get::<i64>(0)?);
        }

        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};
        if members.is_empty() {
            CACHE_MISSES_TOTAL.with_label_values(&["roster"]).inc();
            Ok(None)
        } else {
            CACHE_HITS_TOTAL.with_label_values(&["roster"]).inc();
            Ok(Some(members))
        }
    }

    pub async fn set_invalidate(&self, set_key: &str) -> Result<(), AppError> {
        self.conn
            .execute("DELETE FROM roster_sets WHERE set_key = ?1", [set_key])
            .await?;
        Ok(())
    }

    // =========================================================================
    // Idempotency keys
    // =========================================================================

    /// Insert a dedup key; returns true when the key was not present, false
    /// when a delivery with this key already happened inside the window.
    pub async fn dedup_insert(&self, dedup_key: &str, ttl_seconds: i64) -> Result<bool, AppError> {
        let now = now_ms();
        self.conn
            .execute("DELETE FROM dedup_keys WHERE expires_at_ms < ?1", [now])
            .await?;
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO dedup_keys (dedup_key, expires_at_ms) VALUES (?1, ?2)",
                (dedup_key, now + ttl_seconds * 1000),
            )
            .await?;
        Ok(inserted > 0)
    }

    // =========================================================================
    // String values (verification codes, rate keys)
    // =========================================================================

    pub async fn value_set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), AppError> {
        self.conn
            .execute(
                r#"
                INSERT INTO string_values (key, value, expires_at_ms) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at_ms = excluded.expires_at_ms
                "#,
                (key, value, now_ms() + ttl_seconds * 1000),
            )
            .await?;
        Ok(())
    }

    pub async fn value_get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.conn
            .execute("DELETE FROM string_values WHERE expires_at_ms < ?1", [now_ms()])
            .await?;
        let mut rows = self
            .conn
            .query("SELECT value FROM string_values WHERE key = ?1", [key])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    pub async fn value_delete(&self, key: &str) -> Result<(), AppError> {
        self.conn
            .execute("DELETE FROM string_values WHERE key = ?1", [key])
            .await?;
        Ok(())
    }
}

// Key derivation helpers shared by the services.

/// Symmetric 1:1 conversation key: both participants derive the same key.
pub fn pair_key(a: i64, b: i64) -> i64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    lo * (1 << 30) + hi
}

pub fn personal_conversation_key(a: i64, b: i64) -> String {
    format!("chat:personal:{}:messages", pair_key(a, b))
}

pub fn group_conversation_key(group_id: i64) -> String {
    format!("chat:group:{}:messages", group_id)
}

pub fn friends_key(user_id: i64) -> String {
    format!("user:{}:friends", user_id)
}

pub fn user_groups_key(user_id: i64) -> String {
    format!("user:{}:groups", user_id)
}

pub fn group_members_key(group_id: i64) -> String {
    format!("group:{}:members", group_id)
}

pub fn verification_code_key(email: &str) -> String {
    format!("verification_code:{}", email)
}

pub fn email_verify_rate_key(email: &str) -> String {
    format!("email_verify_rate:{}", email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_symmetric() {
        assert_eq!(pair_key(3, 9), pair_key(9, 3));
        assert_eq!(pair_key(1, 2), pair_key(2, 1));
        assert_ne!(pair_key(1, 2), pair_key(1, 3));
    }

    #[test]
    fn pair_key_is_collision_free_for_small_ids() {
        let mut seen = std::collections::HashSet::new();
        for a in 1..40i64 {
            for b in (a + 1)..40i64 {
                assert!(seen.insert(pair_key(a, b)), "collision for ({a}, {b})");
            }
        }
    }

    #[tokio::test]
    async fn conversation_cache_trims_to_cap() {
        let kv = KvStore::open(":memory:").await.unwrap();
        for i in 0..10 {
            kv.conversation_push("chat:personal:1:messages", &format!("m{i}"), 5, 60)
                .await
                .unwrap();
        }
        let recent = kv
            .conversation_recent("chat:personal:1:messages", 100)
            .await
            .unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0], "m9");
        assert_eq!(recent[4], "m5");
    }

    #[tokio::test]
    async fn offline_queue_is_fifo_and_drains() {
        let kv = KvStore::open(":memory:").await.unwrap();
        for i in 0..4 {
            kv.offline_push(7, OfflineKind::Message, &format!("m{i}"), 60, 100)
                .await
                .unwrap();
        }
        let first = kv.offline_drain(7, OfflineKind::Message, 2).await.unwrap();
        assert_eq!(first, vec!["m0", "m1"]);
        let rest = kv.offline_drain(7, OfflineKind::Message, 10).await.unwrap();
        assert_eq!(rest, vec!["m2", "m3"]);
        assert_eq!(kv.offline_len(7, OfflineKind::Message).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn offline_queue_caps_by_trimming_oldest() {
        let kv = KvStore::open(":memory:").await.unwrap();
        for i in 0..6 {
            kv.offline_push(7, OfflineKind::Message, &format!("m{i}"), 60, 3)
                .await
                .unwrap();
        }
        let all = kv.offline_peek(7, OfflineKind::Message, 10).await.unwrap();
        assert_eq!(all, vec!["m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn peek_is_not_destructive() {
        let kv = KvStore::open(":memory:").await.unwrap();
        kv.offline_push(7, OfflineKind::Notification, "n0", 60, 100)
            .await
            .unwrap();
        assert_eq!(
            kv.offline_peek(7, OfflineKind::Notification, 10)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(kv.offline_len(7, OfflineKind::Notification).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn presence_marker_lifecycle() {
        let kv = KvStore::open(":memory:").await.unwrap();
        assert!(!kv.presence_is_online(5).await.unwrap());
        kv.presence_mark_online(5, 60).await.unwrap();
        assert!(kv.presence_is_online(5).await.unwrap());
        kv.presence_mark_offline(5, 1_700_000_000).await.unwrap();
        assert!(!kv.presence_is_online(5).await.unwrap());
        assert_eq!(kv.presence_last_seen(5).await.unwrap(), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn dedup_keys_deduplicate_within_window() {
        let kv = KvStore::open(":memory:").await.unwrap();
        assert!(kv.dedup_insert("evt:1:42", 60).await.unwrap());
        assert!(!kv.dedup_insert("evt:1:42", 60).await.unwrap());
        assert!(kv.dedup_insert("evt:1:43", 60).await.unwrap());
    }

    #[tokio::test]
    async fn roster_set_round_trip() {
        let kv = KvStore::open(":memory:").await.unwrap();
        assert!(kv.set_get("group:9:members").await.unwrap().is_none());
        kv.set_put("group:9:members", &[1, 2, 3], 60).await.unwrap();
        let mut members = kv.set_get("group:9:members").await.unwrap().unwrap();
        members.sort_unstable();
        assert_eq!(members, vec![1, 2, 3]);
        kv.set_invalidate("group:9:members").await.unwrap();
        assert!(kv.set_get("group:9:members").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn string_values_expire_by_ttl() {
        let kv = KvStore::open(":memory:").await.unwrap();
        kv.value_set("verification_code:a@b.c", "123456", 60)
            .await
            .unwrap();
        assert_eq!(
            kv.value_get("verification_code:a@b.c").await.unwrap(),
            Some("123456".to_string())
        );
        kv.value_set("verification_code:x@y.z", "654321", -1)
            .await
            .unwrap();
        assert_eq!(kv.value_get("verification_code:x@y.z").await.unwrap(), None);
    }
}
