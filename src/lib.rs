//! ferrochat - a real-time instant-messaging server core
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Frontends (Axum HTTP + WebSocket)             │
//! │  - REST endpoints per domain                                │
//! │  - /ws real-time sessions                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service layer                            │
//! │  - Session registry, delivery engine, fanout router         │
//! │  - Presence, offline store, users/relations/groups/files    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data layer                              │
//! │  - SQLite relational store (sqlx)                           │
//! │  - Embedded KV store (presence, caches, queues)             │
//! │  - In-process event log                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod metrics;
pub mod service;
pub mod session;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::data::{Database, KvStore, now_seconds};
use crate::error::AppError;
use crate::events::{EventBus, topics};
use crate::service::{
    DeliveryEngine, FanoutRouter, FileService, GroupService, OfflineStore, PresenceService,
    RelationService, UserService,
};
use crate::session::SessionRegistry;

/// Application state shared across all handlers
///
/// Cloned per request; every component behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub db: Arc<Database>,
    pub kv: Arc<KvStore>,
    pub bus: Arc<EventBus>,
    pub registry: Arc<SessionRegistry>,
    pub presence: PresenceService,
    pub offline: Arc<OfflineStore>,
    pub delivery: Arc<DeliveryEngine>,
    pub users: Arc<UserService>,
    pub relations: Arc<RelationService>,
    pub groups: Arc<GroupService>,
    pub files: Arc<FileService>,
    fanout: Arc<FanoutRouter>,
    fanout_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    shutdown: Arc<watch::Sender<bool>>,
    pub started_at: i64,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Open the KV store and connect the relational store
    /// 2. Create the event bus and the shutdown signal
    /// 3. Wire the services (presence -> registry -> delivery/fanout)
    /// 4. Bootstrap the admin account if configured
    pub async fn new(config: config::AppConfig) -> Result<Self, AppError> {
        tracing::info!("Initializing application state...");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let kv = Arc::new(KvStore::open(&config.database.kv_path).await?);
        tracing::info!("KV store opened");

        let db = Arc::new(Database::connect(&config.database.path).await?);

        let bus = Arc::new(EventBus::new(config.events.topic_retention, shutdown_rx));

        let presence = PresenceService::new(
            config.presence.clone(),
            Arc::clone(&kv),
            Arc::clone(&bus),
        );
        let registry = Arc::new(SessionRegistry::new(
            config.session.clone(),
            Arc::new(presence.clone()),
        ));
        let offline = Arc::new(OfflineStore::new(Arc::clone(&kv), config.delivery.clone()));
        let groups = Arc::new(GroupService::new(Arc::clone(&db), Arc::clone(&kv)));
        let relations = Arc::new(RelationService::new(
            Arc::clone(&db),
            Arc::clone(&kv),
            Arc::clone(&bus),
        ));
        let delivery = Arc::new(DeliveryEngine::new(
            Arc::clone(&db),
            Arc::clone(&kv),
            Arc::clone(&bus),
            Arc::clone(&registry),
            Arc::clone(&offline),
            presence.clone(),
            Arc::clone(&groups),
            config.delivery.clone(),
        ));
        let users = Arc::new(UserService::new(
            Arc::clone(&db),
            Arc::clone(&kv),
            Arc::clone(&bus),
            config.auth.clone(),
        ));
        let files = Arc::new(FileService::new(Arc::clone(&db), Arc::clone(&bus)));
        let fanout = Arc::new(FanoutRouter::new(
            Arc::clone(&registry),
            Arc::clone(&db),
            Arc::clone(&kv),
            Arc::clone(&offline),
            Arc::clone(&relations),
            Arc::clone(&groups),
        ));

        users.ensure_bootstrap_admin().await?;

        tracing::info!("Application state initialized");
        Ok(Self {
            config: Arc::new(config),
            db,
            kv,
            bus,
            registry,
            presence,
            offline,
            delivery,
            users,
            relations,
            groups,
            files,
            fanout,
            fanout_task: Arc::new(Mutex::new(None)),
            shutdown: Arc::new(shutdown_tx),
            started_at: now_seconds(),
        })
    }

    /// Start the background loops: the fanout consumer and the session
    /// sweeper.
    pub fn start_background_tasks(&self) {
        self.subscribe_fanout();

        let registry = Arc::clone(&self.registry);
        let interval_seconds = self.config.session.sweep_interval_seconds;
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => registry.sweep().await,
                    _ = shutdown.changed() => break,
                }
            }
            tracing::info!("Session sweeper stopped");
        });
    }

    fn subscribe_fanout(&self) {
        let handle = self.bus.subscribe(
            vec![
                topics::RELATIONSHIP_EVENTS.to_string(),
                topics::FILE_EVENTS.to_string(),
                topics::SYSTEM_EVENTS.to_string(),
            ],
            "fanout",
            self.fanout.clone(),
        );
        let mut guard = self.fanout_task.lock().expect("fanout task lock poisoned");
        *guard = Some(handle);
    }

    /// Tear down and re-create the fanout subscription. The consumer group
    /// resumes from its committed offsets.
    pub fn restart_fanout(&self) {
        {
            let mut guard = self.fanout_task.lock().expect("fanout task lock poisoned");
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        self.subscribe_fanout();
    }

    pub fn fanout_running(&self) -> bool {
        let guard = self.fanout_task.lock().expect("fanout task lock poisoned");
        guard.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Signal every background loop to stop and close all sessions.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        self.registry.shutdown().await;
    }
}

/// Build the Axum router with all routes.
///
/// Shared by the binary and the integration tests to keep route composition
/// consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use axum::routing::get;
    use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(api::ws_handler))
        .nest("/api/users", api::users_router())
        .nest("/api/messages", api::messages_router())
        .nest("/api/relations", api::relations_router())
        .nest("/api/groups", api::groups_router())
        .nest("/api/files", api::files_router())
        .nest("/api/notifications", api::notifications_router())
        .nest("/admin", api::admin_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
