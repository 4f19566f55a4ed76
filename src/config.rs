//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override, FERROCHAT__ prefix)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub delivery: DeliveryConfig,
    pub presence: PresenceConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_grace_seconds: u64,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
    /// Path to the embedded KV store (":memory:" for a volatile store)
    pub kv_path: String,
}

/// Auth token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens
    pub token_secret: String,
    /// Token lifetime in seconds
    pub token_ttl_seconds: i64,
    /// Require an email verification code at registration
    pub require_verification: bool,
    /// Newly registered accounts become active without admin approval
    pub auto_approve: bool,
    /// Bootstrap admin account, created at startup when missing
    #[serde(default)]
    pub admin_username: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

/// Session registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Sweeper period in seconds
    pub sweep_interval_seconds: u64,
    /// Idle age after which a session is evicted
    pub expiry_seconds: i64,
    /// Idle age after which a session gets a liveness probe
    pub zombie_seconds: i64,
    /// Deadline for the auth frame after the WebSocket upgrade
    pub auth_timeout_seconds: u64,
    /// Outbound frame buffer per session
    pub outbound_buffer: usize,
}

/// Delivery engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum message payload in bytes
    pub max_payload_bytes: usize,
    /// Recent messages kept per conversation in the cache
    pub history_cache_len: usize,
    /// Conversation cache TTL in seconds
    pub history_cache_ttl_seconds: i64,
    /// Offline message envelope TTL in seconds (30 days)
    pub offline_message_ttl_seconds: i64,
    /// Offline notification envelope TTL in seconds (7 days)
    pub offline_notification_ttl_seconds: i64,
    /// Per-user offline queue cap
    pub offline_queue_cap: usize,
}

/// Presence service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Online marker TTL in seconds
    pub marker_ttl_seconds: i64,
    /// Flap debounce window in seconds
    pub debounce_seconds: u64,
}

/// Event bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Records retained per topic before the oldest are dropped
    pub topic_retention: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace|debug|info|warn|error|off)
    pub level: String,
    /// Log format ("pretty" or "json")
    pub format: String,
}

impl AppConfig {
    /// Load configuration
    ///
    /// # Sources (later overrides earlier)
    /// 1. Defaults below
    /// 2. config/default.toml, config/local.toml (both optional)
    /// 3. An explicit file passed as `path`
    /// 4. Environment variables (FERROCHAT__*)
    pub fn load(path: Option<&str>) -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.shutdown_grace_seconds", 10)?
            .set_default("database.path", "data/ferrochat.db")?
            .set_default("database.kv_path", "data/kv.db")?
            .set_default("auth.token_secret", "")?
            .set_default("auth.token_ttl_seconds", 86400)?
            .set_default("auth.require_verification", false)?
            .set_default("auth.auto_approve", true)?
            .set_default("session.sweep_interval_seconds", 60)?
            .set_default("session.expiry_seconds", 300)?
            .set_default("session.zombie_seconds", 120)?
            .set_default("session.auth_timeout_seconds", 10)?
            .set_default("session.outbound_buffer", 256)?
            .set_default("delivery.max_payload_bytes", 8192)?
            .set_default("delivery.history_cache_len", 100)?
            .set_default("delivery.history_cache_ttl_seconds", 86400)?
            .set_default("delivery.offline_message_ttl_seconds", 30 * 86400)?
            .set_default("delivery.offline_notification_ttl_seconds", 7 * 86400)?
            .set_default("delivery.offline_queue_cap", 10_000)?
            .set_default("presence.marker_ttl_seconds", 3600)?
            .set_default("presence.debounce_seconds", 5)?
            .set_default("events.topic_retention", 65_536)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("FERROCHAT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.auth.token_secret.is_empty() {
            return Err(crate::error::AppError::Config(
                "auth.token_secret must be set".to_string(),
            ));
        }
        if self.session.zombie_seconds >= self.session.expiry_seconds {
            return Err(crate::error::AppError::Config(
                "session.zombie_seconds must be below session.expiry_seconds".to_string(),
            ));
        }
        if self.delivery.max_payload_bytes == 0 {
            return Err(crate::error::AppError::Config(
                "delivery.max_payload_bytes must be positive".to_string(),
            ));
        }
        if self.presence.marker_ttl_seconds < self.session.sweep_interval_seconds as i64 {
            return Err(crate::error::AppError::Config(
                "presence.marker_ttl_seconds must cover the heartbeat interval".to_string(),
            ));
        }
        Ok(())
    }
}
