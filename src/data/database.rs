//! Relational store
//!
//! All SQL access goes through this module. Queries are runtime-bound
//! (`sqlx::query(...).bind(...)`); migrations run at connect time.

use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::models::*;
use crate::error::{AppError, ConflictKind};

/// Database connection pool wrapper
pub struct Database {
    pool: SqlitePool,
}

/// Outcome of handling a friend or file-transfer request
#[derive(Debug, Clone, Copy)]
pub struct HandledRequest {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub accepted: bool,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to the SQLite database
    ///
    /// Creates the database file if it doesn't exist and runs pending
    /// migrations.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AppError::Storage(sqlx::Error::Io(e)))?;
            }
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!("Migration failed: {}", e);
            AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
        })?;

        tracing::info!("Database connected and migrated");
        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn username_taken(&self, username: &str) -> Result<bool, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn email_taken(&self, email: &str) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Insert a user and its settings row in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        salt: &str,
        role: &str,
        status: UserStatus,
    ) -> Result<i64, AppError> {
        let now = now_seconds();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, salt, role, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(salt)
        .bind(role)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let user_id = result.last_insert_rowid();

        sqlx::query(
            "INSERT INTO user_settings (user_id, notification_enabled, created_at, updated_at) \
             VALUES (?, 1, ?, ?)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user_id)
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn user_exists(&self, user_id: i64) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        nickname: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET nickname = COALESCE(?, nickname), avatar = COALESCE(?, avatar), \
             updated_at = ? WHERE id = ?",
        )
        .bind(nickname)
        .bind(avatar)
        .bind(now_seconds())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_login(
        &self,
        user_id: i64,
        ip_address: &str,
        status: &str,
    ) -> Result<(), AppError> {
        let now = now_seconds();
        sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "INSERT INTO login_logs (user_id, ip_address, login_time, status) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(ip_address)
        .bind(now)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip account status and write the approval audit row.
    pub async fn approve_user(
        &self,
        user_id: i64,
        admin_id: i64,
        new_status: UserStatus,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let old_status: Option<String> =
            sqlx::query_scalar("SELECT status FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(old_status) = old_status else {
            return Err(AppError::NotFound("user"));
        };

        let now = now_seconds();
        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(new_status.as_str())
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO approval_logs (user_id, admin_id, old_status, new_status, approval_time) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(admin_id)
        .bind(&old_status)
        .bind(new_status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_settings(&self, user_id: i64) -> Result<Option<UserSettings>, AppError> {
        let settings =
            sqlx::query_as::<_, UserSettings>("SELECT * FROM user_settings WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(settings)
    }

    pub async fn update_settings(
        &self,
        user_id: i64,
        notification_enabled: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE user_settings SET notification_enabled = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(notification_enabled)
        .bind(now_seconds())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Insert a message row. The id is assigned by the relation; `send_time`
    /// must already be server-stamped by the caller.
    pub async fn insert_message(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        chat_type: ChatType,
        kind: MessageKind,
        content: &str,
        send_time: i64,
        extra_info: &str,
    ) -> Result<i64, AppError> {
        let recipient_kind = match chat_type {
            ChatType::Personal => "user",
            ChatType::Group => "group",
        };
        let result = sqlx::query(
            "INSERT INTO messages (from_user_id, to_user_id, recipient_kind, message_type, content, send_time, is_read, extra_info) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .bind(recipient_kind)
        .bind(kind.as_str())
        .bind(content)
        .bind(send_time)
        .bind(extra_info)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_message(&self, message_id: i64) -> Result<Option<Message>, AppError> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    /// 1:1 history between two users, newest first.
    pub async fn personal_history(
        &self,
        user_id: i64,
        peer_id: i64,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        let messages = match (start_time, end_time) {
            (Some(start), Some(end)) => {
                sqlx::query_as::<_, Message>(
                    "SELECT * FROM messages WHERE recipient_kind = 'user' \
                     AND ((from_user_id = ? AND to_user_id = ?) OR (from_user_id = ? AND to_user_id = ?)) \
                     AND send_time BETWEEN ? AND ? ORDER BY send_time DESC LIMIT ?",
                )
                .bind(user_id)
                .bind(peer_id)
                .bind(peer_id)
                .bind(user_id)
                .bind(start)
                .bind(end)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            _ => {
                sqlx::query_as::<_, Message>(
                    "SELECT * FROM messages WHERE recipient_kind = 'user' \
                     AND ((from_user_id = ? AND to_user_id = ?) OR (from_user_id = ? AND to_user_id = ?)) \
                     ORDER BY send_time DESC LIMIT ?",
                )
                .bind(user_id)
                .bind(peer_id)
                .bind(peer_id)
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(messages)
    }

    /// Group history, newest first.
    pub async fn group_history(&self, group_id: i64, limit: i64) -> Result<Vec<Message>, AppError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE recipient_kind = 'group' AND to_user_id = ? \
             ORDER BY send_time DESC LIMIT ?",
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Flip the read flag. The predicate requires the authenticated reader to
    /// be the recipient, so the transition is false -> true only and
    /// idempotent: the first call returns true, repeats return false.
    pub async fn mark_read(&self, message_id: i64, reader_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1 WHERE id = ? AND to_user_id = ? AND is_read = 0",
        )
        .bind(message_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Friend relations
    // =========================================================================

    pub async fn are_friends(&self, user_id: i64, friend_id: i64) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM friend_relations WHERE user_id = ? AND friend_id = ?",
        )
        .bind(user_id)
        .bind(friend_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn has_pending_request(
        &self,
        from_user_id: i64,
        to_user_id: i64,
    ) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM friend_requests \
             WHERE from_user_id = ? AND to_user_id = ? AND state = 'pending'",
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn create_friend_request(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        message: &str,
    ) -> Result<i64, AppError> {
        let now = now_seconds();
        let result = sqlx::query(
            "INSERT INTO friend_requests (from_user_id, to_user_id, message, state, created_at, updated_at) \
             VALUES (?, ?, ?, 'pending', ?, ?)",
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .bind(message)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_friend_request(
        &self,
        request_id: i64,
    ) -> Result<Option<FriendRequest>, AppError> {
        let request =
            sqlx::query_as::<_, FriendRequest>("SELECT * FROM friend_requests WHERE id = ?")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(request)
    }

    /// Accept or reject a friend request.
    ///
    /// Runs in one transaction: the state flip is conditional on the request
    /// still being pending; acceptance inserts both directed friendship rows.
    /// Returns `Conflict` if the request was already handled and
    /// `PermissionDenied` if `handler_id` is not the addressee.
    pub async fn handle_friend_request(
        &self,
        request_id: i64,
        handler_id: i64,
        accept: bool,
    ) -> Result<HandledRequest, AppError> {
        let mut tx = self.pool.begin().await?;

        let request = sqlx::query_as::<_, FriendRequest>(
            "SELECT * FROM friend_requests WHERE id = ?",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("friend request"))?;

        if request.to_user_id != handler_id {
            return Err(AppError::PermissionDenied);
        }

        let new_state = if accept {
            RequestState::Accepted
        } else {
            RequestState::Rejected
        };
        let updated = sqlx::query(
            "UPDATE friend_requests SET state = ?, updated_at = ? WHERE id = ? AND state = 'pending'",
        )
        .bind(new_state.as_str())
        .bind(now_seconds())
        .bind(request_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::Conflict(
                ConflictKind::FriendRequestHandled,
                "friend request already handled".to_string(),
            ));
        }

        if accept {
            let now = now_seconds();
            sqlx::query(
                "INSERT OR IGNORE INTO friend_relations (user_id, friend_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(request.from_user_id)
            .bind(request.to_user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT OR IGNORE INTO friend_relations (user_id, friend_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(request.to_user_id)
            .bind(request.from_user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(HandledRequest {
            from_user_id: request.from_user_id,
            to_user_id: request.to_user_id,
            accepted: accept,
        })
    }

    pub async fn pending_requests(&self, user_id: i64) -> Result<Vec<FriendRequest>, AppError> {
        let requests = sqlx::query_as::<_, FriendRequest>(
            "SELECT * FROM friend_requests WHERE to_user_id = ? AND state = 'pending' \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    pub async fn list_friends(&self, user_id: i64) -> Result<Vec<FriendInfo>, AppError> {
        let friends = sqlx::query_as::<_, FriendInfo>(
            "SELECT f.friend_id, f.remark, u.username, u.nickname, u.avatar \
             FROM friend_relations f JOIN users u ON f.friend_id = u.id \
             WHERE f.user_id = ? ORDER BY u.username",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(friends)
    }

    pub async fn friend_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT friend_id FROM friend_relations WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    /// Delete both directed friendship rows. Returns false when no
    /// relationship existed.
    pub async fn delete_friend(&self, user_id: i64, friend_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM friend_relations WHERE \
             (user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?)",
        )
        .bind(user_id)
        .bind(friend_id)
        .bind(friend_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Group membership
    // =========================================================================

    pub async fn join_group(&self, group_id: i64, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(now_seconds())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn leave_group(&self, group_id: i64, user_id: i64) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
                .bind(group_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn group_members(&self, group_id: i64) -> Result<Vec<i64>, AppError> {
        let members: Vec<i64> =
            sqlx::query_scalar("SELECT user_id FROM group_members WHERE group_id = ?")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(members)
    }

    pub async fn user_groups(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let groups: Vec<i64> =
            sqlx::query_scalar("SELECT group_id FROM group_members WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(groups)
    }

    pub async fn is_group_member(&self, group_id: i64, user_id: i64) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM group_members WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    // =========================================================================
    // Files and transfer requests
    // =========================================================================

    pub async fn insert_file(
        &self,
        uploader_id: i64,
        file_name: &str,
        file_size: i64,
    ) -> Result<i64, AppError> {
        let now = now_seconds();
        let result = sqlx::query(
            "INSERT INTO files (uploader_id, file_name, file_size, status, created_at, updated_at) \
             VALUES (?, ?, ?, 'pending', ?, ?)",
        )
        .bind(uploader_id)
        .bind(file_name)
        .bind(file_size)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Upload state machine: pending -> complete, one-shot.
    pub async fn complete_file(&self, file_id: i64, file_path: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE files SET status = 'complete', file_path = ?, updated_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(file_path)
        .bind(now_seconds())
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_file(&self, file_id: i64) -> Result<Option<FileRecord>, AppError> {
        let file = sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(file)
    }

    pub async fn create_transfer_request(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        file: &FileRecord,
    ) -> Result<i64, AppError> {
        let now = now_seconds();
        let result = sqlx::query(
            "INSERT INTO file_transfer_requests \
             (from_user_id, to_user_id, file_id, file_name, file_size, state, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .bind(file.id)
        .bind(&file.file_name)
        .bind(file.file_size)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_transfer_request(
        &self,
        request_id: i64,
    ) -> Result<Option<FileTransferRequest>, AppError> {
        let request = sqlx::query_as::<_, FileTransferRequest>(
            "SELECT * FROM file_transfer_requests WHERE id = ?",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    /// Accept or reject a transfer request; one-shot like friend requests.
    pub async fn handle_transfer_request(
        &self,
        request_id: i64,
        handler_id: i64,
        accept: bool,
    ) -> Result<(HandledRequest, FileTransferRequest), AppError> {
        let request = self
            .get_transfer_request(request_id)
            .await?
            .ok_or(AppError::NotFound("file transfer request"))?;
        if request.to_user_id != handler_id {
            return Err(AppError::PermissionDenied);
        }

        let new_state = if accept {
            RequestState::Accepted
        } else {
            RequestState::Rejected
        };
        let updated = sqlx::query(
            "UPDATE file_transfer_requests SET state = ?, updated_at = ? \
             WHERE id = ? AND state = 'pending'",
        )
        .bind(new_state.as_str())
        .bind(now_seconds())
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::Conflict(
                ConflictKind::FileTransferHandled,
                "file transfer request already handled".to_string(),
            ));
        }

        Ok((
            HandledRequest {
                from_user_id: request.from_user_id,
                to_user_id: request.to_user_id,
                accepted: accept,
            },
            request,
        ))
    }

    /// True when `user_id` may download `file_id`: uploader or the accepted
    /// target of a transfer request for it.
    pub async fn can_access_file(&self, file_id: i64, user_id: i64) -> Result<bool, AppError> {
        let uploader: Option<i64> =
            sqlx::query_scalar("SELECT uploader_id FROM files WHERE id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
        match uploader {
            None => Ok(false),
            Some(uploader_id) if uploader_id == user_id => Ok(true),
            Some(_) => {
                let count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM file_transfer_requests \
                     WHERE file_id = ? AND to_user_id = ? AND state = 'accepted'",
                )
                .bind(file_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(count > 0)
            }
        }
    }

    // =========================================================================
    // Notifications and announcements
    // =========================================================================

    pub async fn insert_notification(
        &self,
        user_id: i64,
        kind: &str,
        content: &str,
    ) -> Result<i64, AppError> {
        let result = sqlx::query(
            "INSERT INTO notifications (user_id, kind, content, created_at, is_read) \
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(user_id)
        .bind(kind)
        .bind(content)
        .bind(now_seconds())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn unread_notifications(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE user_id = ? AND is_read = 0 \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    pub async fn insert_announcement(
        &self,
        title: &str,
        content: &str,
        sender_id: i64,
    ) -> Result<i64, AppError> {
        let result = sqlx::query(
            "INSERT INTO system_announcements (title, content, sender_id, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(title)
        .bind(content)
        .bind(sender_id)
        .bind(now_seconds())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
