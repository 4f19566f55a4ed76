//! User accounts
//!
//! Registration (optionally gated on an email verification code), login with
//! salted password hashes, profile and settings, admin approval.
//! Verification-code delivery itself is an external concern; issuing and
//! checking codes is modeled here.

use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::auth::{AuthClaims, create_token};
use crate::config::AuthConfig;
use crate::data::{
    Database, KvStore, User, UserSettings, UserStatus, email_verify_rate_key,
    verification_code_key,
};
use crate::error::AppError;
use crate::events::{EventBus, EventPayload, topics};

const VERIFICATION_CODE_TTL_SECONDS: i64 = 600;
const VERIFICATION_RATE_TTL_SECONDS: i64 = 60;

/// Public view of an account
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub status: String,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            status: user.status.clone(),
        }
    }
}

pub struct UserService {
    db: Arc<Database>,
    kv: Arc<KvStore>,
    bus: Arc<EventBus>,
    config: AuthConfig,
}

impl UserService {
    pub fn new(db: Arc<Database>, kv: Arc<KvStore>, bus: Arc<EventBus>, config: AuthConfig) -> Self {
        Self { db, kv, bus, config }
    }

    /// Register an account.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        verification_code: Option<&str>,
    ) -> Result<i64, AppError> {
        if username.len() < 3 || username.len() > 32 {
            return Err(AppError::InvalidArgument(
                "username must be 3-32 characters".to_string(),
            ));
        }
        if password.len() < 8 {
            return Err(AppError::InvalidArgument(
                "password must be at least 8 characters".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(AppError::InvalidArgument("invalid email".to_string()));
        }

        if self.config.require_verification {
            let stored = self
                .kv
                .value_get(&verification_code_key(email))
                .await
                .unwrap_or(None);
            match (stored, verification_code) {
                (Some(stored), Some(given)) if stored == given => {}
                _ => {
                    return Err(AppError::InvalidArgument(
                        "invalid or expired verification code".to_string(),
                    ));
                }
            }
        }

        if self.db.username_taken(username).await? {
            return Err(AppError::AlreadyExists("username".to_string()));
        }
        if self.db.email_taken(email).await? {
            return Err(AppError::AlreadyExists("email".to_string()));
        }

        let salt = generate_salt();
        let password_hash = hash_password(&salt, password);
        let status = if self.config.auto_approve {
            UserStatus::Active
        } else {
            UserStatus::Pending
        };
        let user_id = self
            .db
            .create_user(username, email, &password_hash, &salt, "user", status)
            .await?;

        if self.config.require_verification {
            if let Err(error) = self.kv.value_delete(&verification_code_key(email)).await {
                tracing::warn!(%error, "Failed to consume verification code");
            }
        }

        self.publish_system(
            &user_id.to_string(),
            &EventPayload::UserRegistered {
                user_id,
                username: username.to_string(),
            },
        );
        tracing::info!(user_id, username, "User registered");
        Ok(user_id)
    }

    /// Verify credentials and issue a bearer token.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip_address: &str,
    ) -> Result<(String, UserInfo), AppError> {
        let Some(user) = self.db.get_user_by_username(username).await? else {
            return Err(AppError::Unauthenticated);
        };

        if hash_password(&user.salt, password) != user.password_hash {
            if let Err(error) = self.db.record_login(user.id, ip_address, "failed").await {
                tracing::warn!(%error, user_id = user.id, "Failed to record login attempt");
            }
            return Err(AppError::Unauthenticated);
        }

        match user.status.as_str() {
            "active" => {}
            "pending" => {
                return Err(AppError::PermissionDenied);
            }
            _ => return Err(AppError::PermissionDenied),
        }

        self.db.record_login(user.id, ip_address, "success").await?;

        let claims = AuthClaims::new(user.id, &user.role, self.config.token_ttl_seconds);
        let token = create_token(&claims, &self.config.token_secret)?;

        self.publish_system(
            &user.id.to_string(),
            &EventPayload::UserLogin {
                user_id: user.id,
                username: user.username.clone(),
            },
        );
        tracing::info!(user_id = user.id, username, "User logged in");
        Ok((token, UserInfo::from(&user)))
    }

    /// Issue a verification code for an email, rate-limited to one per
    /// minute per address. Returns the code; handing it to a mail sender is
    /// out of scope.
    pub async fn issue_verification_code(&self, email: &str) -> Result<String, AppError> {
        if !email.contains('@') {
            return Err(AppError::InvalidArgument("invalid email".to_string()));
        }

        let rate_key = email_verify_rate_key(email);
        if self.kv.value_get(&rate_key).await?.is_some() {
            return Err(AppError::RateLimited);
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.kv
            .value_set(&verification_code_key(email), &code, VERIFICATION_CODE_TTL_SECONDS)
            .await?;
        self.kv
            .value_set(&rate_key, "1", VERIFICATION_RATE_TTL_SECONDS)
            .await?;

        tracing::info!(email, "Verification code issued");
        Ok(code)
    }

    pub async fn get_info(&self, user_id: i64) -> Result<UserInfo, AppError> {
        let user = self
            .db
            .get_user_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound("user"))?;
        Ok(UserInfo::from(&user))
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        nickname: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<UserInfo, AppError> {
        self.db.update_profile(user_id, nickname, avatar).await?;
        self.get_info(user_id).await
    }

    pub async fn get_settings(&self, user_id: i64) -> Result<UserSettings, AppError> {
        self.db
            .get_settings(user_id)
            .await?
            .ok_or(AppError::NotFound("user settings"))
    }

    pub async fn update_settings(
        &self,
        user_id: i64,
        notification_enabled: bool,
    ) -> Result<UserSettings, AppError> {
        self.db.update_settings(user_id, notification_enabled).await?;
        self.get_settings(user_id).await
    }

    /// Admin approval: flips account status and writes the audit row.
    pub async fn approve(
        &self,
        admin_id: i64,
        user_id: i64,
        approve: bool,
    ) -> Result<UserInfo, AppError> {
        let status = if approve {
            UserStatus::Active
        } else {
            UserStatus::Disabled
        };
        self.db.approve_user(user_id, admin_id, status).await?;
        self.get_info(user_id).await
    }

    /// Create the configured bootstrap admin account if it doesn't exist.
    pub async fn ensure_bootstrap_admin(&self) -> Result<(), AppError> {
        let (Some(username), Some(password)) =
            (&self.config.admin_username, &self.config.admin_password)
        else {
            return Ok(());
        };
        if self.db.username_taken(username).await? {
            return Ok(());
        }

        let salt = generate_salt();
        let password_hash = hash_password(&salt, password);
        let user_id = self
            .db
            .create_user(
                username,
                &format!("{username}@localhost"),
                &password_hash,
                &salt,
                "admin",
                UserStatus::Active,
            )
            .await?;
        tracing::info!(user_id, username = username.as_str(), "Bootstrap admin created");
        Ok(())
    }

    fn publish_system(&self, key: &str, payload: &EventPayload) {
        if let Err(error) = self.bus.publish(topics::SYSTEM_EVENTS, key, payload) {
            tracing::warn!(%error, "Failed to publish system event");
        }
    }
}

fn generate_salt() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex_encode(&bytes)
}

fn hash_password(salt: &str, password: &str) -> String {
    let digest = Sha256::digest(format!("{salt}{password}").as_bytes());
    hex_encode(digest.as_slice())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::watch;

    fn auth_config(require_verification: bool, auto_approve: bool) -> AuthConfig {
        AuthConfig {
            token_secret: "test-secret".to_string(),
            token_ttl_seconds: 3600,
            require_verification,
            auto_approve,
            admin_username: None,
            admin_password: None,
        }
    }

    async fn service(config: AuthConfig) -> (UserService, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::connect(&dir.path().join("test.db")).await.unwrap());
        let kv = Arc::new(KvStore::open(":memory:").await.unwrap());
        let (_tx, rx) = watch::channel(false);
        let bus = Arc::new(EventBus::new(1024, rx));
        (UserService::new(db, kv, bus, config), dir)
    }

    #[tokio::test]
    async fn register_and_login_round_trip() {
        let (service, _dir) = service(auth_config(false, true)).await;
        let user_id = service
            .register("alice", "alice@example.com", "correct horse", None)
            .await
            .unwrap();

        let (token, info) = service.login("alice", "correct horse", "127.0.0.1").await.unwrap();
        assert!(!token.is_empty());
        assert_eq!(info.id, user_id);
        assert_eq!(info.status, "active");
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let (service, _dir) = service(auth_config(false, true)).await;
        service
            .register("alice", "alice@example.com", "correct horse", None)
            .await
            .unwrap();
        assert!(matches!(
            service.login("alice", "wrong horse", "").await,
            Err(AppError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (service, _dir) = service(auth_config(false, true)).await;
        service
            .register("alice", "alice@example.com", "correct horse", None)
            .await
            .unwrap();
        assert!(matches!(
            service
                .register("alice", "other@example.com", "correct horse", None)
                .await,
            Err(AppError::AlreadyExists(_))
        ));
        assert!(matches!(
            service
                .register("alice2", "alice@example.com", "correct horse", None)
                .await,
            Err(AppError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn verification_code_gates_registration() {
        let (service, _dir) = service(auth_config(true, true)).await;
        let email = "alice@example.com";

        let missing = service.register("alice", email, "correct horse", None).await;
        assert!(matches!(missing, Err(AppError::InvalidArgument(_))));

        let code = service.issue_verification_code(email).await.unwrap();
        assert_eq!(code.len(), 6);

        // Re-issuing within the rate window is refused.
        assert!(matches!(
            service.issue_verification_code(email).await,
            Err(AppError::RateLimited)
        ));

        let user_id = service
            .register("alice", email, "correct horse", Some(&code))
            .await
            .unwrap();
        assert!(user_id > 0);
    }

    #[tokio::test]
    async fn unapproved_account_cannot_login() {
        let (service, _dir) = service(auth_config(false, false)).await;
        let user_id = service
            .register("alice", "alice@example.com", "correct horse", None)
            .await
            .unwrap();
        assert!(matches!(
            service.login("alice", "correct horse", "").await,
            Err(AppError::PermissionDenied)
        ));

        // Seed an admin and approve.
        let admin_id = service
            .register("admin", "admin@example.com", "correct horse", None)
            .await
            .unwrap();
        service.approve(admin_id, user_id, true).await.unwrap();
        assert!(service.login("alice", "correct horse", "").await.is_ok());
    }
}
