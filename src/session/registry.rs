//! Session registry
//!
//! Exclusively owns every live session. Sessions are indexed by session id
//! and by user id; removal is the single destruction site. All other holders
//! keep lookup-only handles (ids), never the session itself.
//!
//! The index lock is a plain `RwLock` and is never held across an await:
//! outbound writes go through each session's bounded channel, drained by the
//! connection's writer task, which keeps frame order per session.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use super::frames::ServerFrame;
use crate::config::SessionConfig;
use crate::data::now_seconds;
use crate::error::{AppError, ConflictKind};
use crate::service::PresenceService;

pub type SessionId = Uuid;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Unauthenticated,
    Authorized,
    Closing,
    Closed,
}

/// Stream variants behind one capability set: write, close, id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Bidirectional WebSocket stream
    WebSocket,
    /// Server-push only stream (notification subscriptions)
    ServerStream,
}

/// Outcome of a frame write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The session no longer exists (or its channel is closed)
    Gone,
    /// The outbound buffer is full; the frame was dropped
    Backpressure,
}

/// A live session owned by the registry
pub struct Session {
    id: SessionId,
    transport: TransportKind,
    created_at: i64,
    user_id: AtomicI64,
    authorized: AtomicBool,
    admin: AtomicBool,
    last_active: AtomicI64,
    state: Mutex<SessionState>,
    outbound: mpsc::Sender<ServerFrame>,
    closed: Notify,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// 0 until authenticated
    pub fn user_id(&self) -> i64 {
        self.user_id.load(Ordering::Acquire)
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }

    pub fn is_admin(&self) -> bool {
        self.admin.load(Ordering::Acquire)
    }

    pub fn last_active(&self) -> i64 {
        self.last_active.load(Ordering::Acquire)
    }

    /// Every inbound frame refreshes activity.
    pub fn touch(&self) {
        self.last_active.store(now_seconds(), Ordering::Release);
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    /// Resolves once the registry has removed this session, so transport
    /// tasks can tear the connection down on sweep eviction or forced
    /// disconnect. Also resolves when removal happened before the call.
    pub async fn wait_closed(&self) {
        self.closed.notified().await;
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("session state lock poisoned") = state;
    }

    fn try_send(&self, frame: ServerFrame) -> SendOutcome {
        match self.outbound.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Gone,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Backpressure,
        }
    }
}

struct Inner {
    sessions: HashMap<SessionId, Arc<Session>>,
    by_user: HashMap<i64, HashSet<SessionId>>,
}

/// The session registry
pub struct SessionRegistry {
    inner: RwLock<Inner>,
    presence: Arc<PresenceService>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, presence: Arc<PresenceService>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                sessions: HashMap::new(),
                by_user: HashMap::new(),
            }),
            presence,
            config,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Register a new session around its outbound channel. The session
    /// starts in the handshaking state; callers flip it to unauthenticated
    /// once the transport handshake (welcome frame) is done.
    pub fn accept(
        &self,
        transport: TransportKind,
        outbound: mpsc::Sender<ServerFrame>,
    ) -> Arc<Session> {
        let now = now_seconds();
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            transport,
            created_at: now,
            user_id: AtomicI64::new(0),
            authorized: AtomicBool::new(false),
            admin: AtomicBool::new(false),
            last_active: AtomicI64::new(now),
            state: Mutex::new(SessionState::Handshaking),
            outbound,
            closed: Notify::new(),
        });

        let mut inner = self.inner.write().expect("session index lock poisoned");
        inner.sessions.insert(session.id, Arc::clone(&session));
        crate::metrics::SESSIONS_ACTIVE.set(inner.sessions.len() as i64);

        tracing::info!(session_id = %session.id, transport = ?transport, "Session accepted");
        session
    }

    /// Mark the transport handshake complete.
    pub fn mark_established(&self, session: &Session) {
        session.set_state(SessionState::Unauthenticated);
    }

    /// Bind a verified user to a session and index it.
    ///
    /// A session that raced with `remove` is gone from the index; the
    /// token-verification result is dropped and the caller observes
    /// `Unauthenticated`.
    pub fn authorize(
        &self,
        session_id: SessionId,
        user_id: i64,
        is_admin: bool,
    ) -> Result<AuthorizeOutcome, AppError> {
        let first_session;
        {
            let mut inner = self.inner.write().expect("session index lock poisoned");
            let Some(session) = inner.sessions.get(&session_id).cloned() else {
                return Err(AppError::Unauthenticated);
            };
            if session.is_authorized() {
                return Err(AppError::Conflict(
                    ConflictKind::SessionAlreadyAuthorized,
                    "session already authorized".to_string(),
                ));
            }

            session.user_id.store(user_id, Ordering::Release);
            session.admin.store(is_admin, Ordering::Release);
            session.authorized.store(true, Ordering::Release);
            session.set_state(SessionState::Authorized);
            session.touch();

            let user_sessions = inner.by_user.entry(user_id).or_default();
            user_sessions.insert(session_id);
            first_session = user_sessions.len() == 1;
            crate::metrics::USERS_ONLINE.set(inner.by_user.len() as i64);
        }

        tracing::info!(session_id = %session_id, user_id, first_session, "Session authorized");
        Ok(AuthorizeOutcome {
            user_id,
            first_session,
        })
    }

    /// Tear down a session. If it was the user's last session, the presence
    /// service records last-seen and fires the offline transition.
    ///
    /// After this returns, `send` for the session id reports `Gone`.
    pub async fn remove(&self, session_id: SessionId, reason: &str) {
        let removed;
        let mut offline_user = None;
        {
            let mut inner = self.inner.write().expect("session index lock poisoned");
            removed = inner.sessions.remove(&session_id);
            if let Some(session) = &removed {
                session.set_state(SessionState::Closing);
                let user_id = session.user_id();
                if user_id > 0 {
                    let now_empty = match inner.by_user.get_mut(&user_id) {
                        Some(ids) => {
                            ids.remove(&session_id);
                            ids.is_empty()
                        }
                        None => false,
                    };
                    if now_empty {
                        inner.by_user.remove(&user_id);
                        offline_user = Some(user_id);
                    }
                }
            }
            crate::metrics::SESSIONS_ACTIVE.set(inner.sessions.len() as i64);
            crate::metrics::USERS_ONLINE.set(inner.by_user.len() as i64);
        }

        let Some(session) = removed else { return };
        session.set_state(SessionState::Closed);
        session.closed.notify_one();
        tracing::info!(session_id = %session_id, user_id = session.user_id(), reason, "Session removed");

        if let Some(user_id) = offline_user {
            self.presence.session_closed(user_id).await;
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a frame to one session.
    pub fn send(&self, session_id: SessionId, frame: ServerFrame) -> SendOutcome {
        let session = {
            let inner = self.inner.read().expect("session index lock poisoned");
            inner.sessions.get(&session_id).cloned()
        };
        match session {
            Some(session) => session.try_send(frame),
            None => SendOutcome::Gone,
        }
    }

    /// Write a frame to every session bound to a user. Returns the number of
    /// sessions written.
    pub fn send_to_user(&self, user_id: i64, frame: &ServerFrame) -> usize {
        let sessions = self.sessions_for_user(user_id);
        let mut delivered = 0;
        for session in sessions {
            if session.try_send(frame.clone()) == SendOutcome::Sent {
                delivered += 1;
            }
        }
        delivered
    }

    /// Write a frame to every authorized session.
    pub fn broadcast(&self, frame: &ServerFrame) -> usize {
        let sessions: Vec<Arc<Session>> = {
            let inner = self.inner.read().expect("session index lock poisoned");
            inner
                .sessions
                .values()
                .filter(|s| s.is_authorized())
                .cloned()
                .collect()
        };
        let mut delivered = 0;
        for session in sessions {
            if session.try_send(frame.clone()) == SendOutcome::Sent {
                delivered += 1;
            }
        }
        delivered
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn get(&self, session_id: SessionId) -> Option<Arc<Session>> {
        let inner = self.inner.read().expect("session index lock poisoned");
        inner.sessions.get(&session_id).cloned()
    }

    pub fn sessions_for_user(&self, user_id: i64) -> Vec<Arc<Session>> {
        let inner = self.inner.read().expect("session index lock poisoned");
        let Some(ids) = inner.by_user.get(&user_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect()
    }

    pub fn user_session_count(&self, user_id: i64) -> usize {
        let inner = self.inner.read().expect("session index lock poisoned");
        inner.by_user.get(&user_id).map_or(0, |ids| ids.len())
    }

    pub fn session_count(&self) -> usize {
        let inner = self.inner.read().expect("session index lock poisoned");
        inner.sessions.len()
    }

    pub fn online_user_ids(&self) -> Vec<i64> {
        let inner = self.inner.read().expect("session index lock poisoned");
        inner.by_user.keys().copied().collect()
    }

    // =========================================================================
    // Sweep
    // =========================================================================

    /// Evict sessions idle past the expiry threshold and probe zombies
    /// (idle past the zombie threshold but not yet expired) with a ping
    /// frame; a failed probe removes the session immediately.
    pub async fn sweep(&self) {
        let now = now_seconds();
        let expiry = self.config.expiry_seconds;
        let zombie = self.config.zombie_seconds;

        let mut expired = Vec::new();
        let mut zombies = Vec::new();
        {
            let inner = self.inner.read().expect("session index lock poisoned");
            for (id, session) in &inner.sessions {
                let idle = now - session.last_active();
                if idle > expiry {
                    expired.push(*id);
                } else if idle > zombie {
                    zombies.push(*id);
                }
            }
        }

        for id in expired {
            crate::metrics::SESSIONS_EVICTED_TOTAL
                .with_label_values(&["expired"])
                .inc();
            self.remove(id, "expired").await;
        }

        for id in zombies {
            tracing::warn!(session_id = %id, "Probing zombie session");
            match self.send(id, ServerFrame::pong()) {
                SendOutcome::Sent => {}
                _ => {
                    crate::metrics::SESSIONS_EVICTED_TOTAL
                        .with_label_values(&["zombie"])
                        .inc();
                    self.remove(id, "zombie probe failed").await;
                }
            }
        }

        // Keep presence markers alive for users that still have sessions.
        for user_id in self.online_user_ids() {
            self.presence.refresh(user_id).await;
        }
    }

    /// Close every session; used during shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = {
            let inner = self.inner.read().expect("session index lock poisoned");
            inner.sessions.keys().copied().collect()
        };
        for id in ids {
            self.remove(id, "shutdown").await;
        }
    }
}

/// Result of a successful `authorize`
#[derive(Debug, Clone, Copy)]
pub struct AuthorizeOutcome {
    pub user_id: i64,
    /// True when this is the user's first active session
    pub first_session: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PresenceConfig;
    use crate::data::KvStore;
    use crate::events::EventBus;
    use tokio::sync::watch;

    fn session_config() -> SessionConfig {
        SessionConfig {
            sweep_interval_seconds: 60,
            expiry_seconds: 300,
            zombie_seconds: 120,
            auth_timeout_seconds: 10,
            outbound_buffer: 4,
        }
    }

    async fn registry() -> SessionRegistry {
        let (_tx, rx) = watch::channel(false);
        let kv = Arc::new(KvStore::open(":memory:").await.unwrap());
        let bus = Arc::new(EventBus::new(64, rx));
        let presence = Arc::new(PresenceService::new(
            PresenceConfig {
                marker_ttl_seconds: 3600,
                debounce_seconds: 0,
            },
            kv,
            bus,
        ));
        SessionRegistry::new(session_config(), presence)
    }

    fn channel() -> (mpsc::Sender<ServerFrame>, mpsc::Receiver<ServerFrame>) {
        mpsc::channel(4)
    }

    #[tokio::test]
    async fn accept_authorize_remove_lifecycle() {
        let registry = registry().await;
        let (tx, _rx) = channel();
        let session = registry.accept(TransportKind::WebSocket, tx);
        assert_eq!(session.state(), SessionState::Handshaking);

        registry.mark_established(&session);
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(!session.is_authorized());

        let outcome = registry.authorize(session.id(), 7, false).unwrap();
        assert!(outcome.first_session);
        assert_eq!(session.user_id(), 7);
        assert_eq!(registry.user_session_count(7), 1);

        registry.remove(session.id(), "test").await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(registry.user_session_count(7), 0);
        assert!(registry.get(session.id()).is_none());
    }

    #[tokio::test]
    async fn second_device_is_not_first_session() {
        let registry = registry().await;
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();
        let first = registry.accept(TransportKind::WebSocket, tx1);
        let second = registry.accept(TransportKind::WebSocket, tx2);

        assert!(registry.authorize(first.id(), 7, false).unwrap().first_session);
        assert!(!registry.authorize(second.id(), 7, false).unwrap().first_session);
        assert_eq!(registry.user_session_count(7), 2);

        registry.remove(first.id(), "test").await;
        assert_eq!(registry.user_session_count(7), 1);
    }

    #[tokio::test]
    async fn authorize_after_remove_is_rejected() {
        let registry = registry().await;
        let (tx, _rx) = channel();
        let session = registry.accept(TransportKind::WebSocket, tx);
        registry.remove(session.id(), "test").await;
        assert!(registry.authorize(session.id(), 7, false).is_err());
    }

    #[tokio::test]
    async fn wait_closed_resolves_after_remove() {
        let registry = registry().await;
        let (tx, _rx) = channel();
        let session = registry.accept(TransportKind::WebSocket, tx);

        registry.remove(session.id(), "test").await;
        // The permit is stored, so a waiter arriving late still resolves.
        tokio::time::timeout(std::time::Duration::from_secs(1), session.wait_closed())
            .await
            .expect("close signal fires on removal");
    }

    #[tokio::test]
    async fn send_after_remove_reports_gone() {
        let registry = registry().await;
        let (tx, mut rx) = channel();
        let session = registry.accept(TransportKind::WebSocket, tx);
        assert_eq!(
            registry.send(session.id(), ServerFrame::pong()),
            SendOutcome::Sent
        );
        registry.remove(session.id(), "test").await;
        assert_eq!(
            registry.send(session.id(), ServerFrame::pong()),
            SendOutcome::Gone
        );
        // Only the pre-removal frame is in the channel.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_user_writes_every_session() {
        let registry = registry().await;
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let first = registry.accept(TransportKind::WebSocket, tx1);
        let second = registry.accept(TransportKind::WebSocket, tx2);
        registry.authorize(first.id(), 7, false).unwrap();
        registry.authorize(second.id(), 7, false).unwrap();

        let delivered = registry.send_to_user(7, &ServerFrame::pong());
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_skips_unauthenticated_sessions() {
        let registry = registry().await;
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let (tx3, mut rx3) = channel();
        // Server-push notification streams count like any other session.
        let authorized = registry.accept(TransportKind::ServerStream, tx1);
        let _unauthenticated = registry.accept(TransportKind::WebSocket, tx2);
        let also_authorized = registry.accept(TransportKind::WebSocket, tx3);
        registry.authorize(authorized.id(), 7, false).unwrap();
        registry.authorize(also_authorized.id(), 8, false).unwrap();
        assert_eq!(authorized.transport(), TransportKind::ServerStream);

        assert_eq!(registry.broadcast(&ServerFrame::pong()), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    async fn frames_preserve_order_within_a_session() {
        let registry = registry().await;
        let (tx, mut rx) = channel();
        let session = registry.accept(TransportKind::WebSocket, tx);
        registry.authorize(session.id(), 7, false).unwrap();

        for i in 0..3 {
            registry.send(
                session.id(),
                ServerFrame::UserStatus {
                    user_id: i,
                    status: "online".to_string(),
                    timestamp: 0,
                },
            );
        }
        for expected in 0..3 {
            match rx.try_recv().unwrap() {
                ServerFrame::UserStatus { user_id, .. } => assert_eq!(user_id, expected),
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn sweep_evicts_expired_and_probes_zombies() {
        let registry = registry().await;
        let (tx1, _rx1) = channel();
        let expired = registry.accept(TransportKind::WebSocket, tx1);
        registry.authorize(expired.id(), 7, false).unwrap();
        expired
            .last_active
            .store(now_seconds() - 400, Ordering::Release);

        // Zombie whose channel receiver is gone: the probe fails.
        let (tx2, rx2) = channel();
        drop(rx2);
        let zombie = registry.accept(TransportKind::WebSocket, tx2);
        registry.authorize(zombie.id(), 8, false).unwrap();
        zombie
            .last_active
            .store(now_seconds() - 200, Ordering::Release);

        // Zombie with a live channel: probed, kept.
        let (tx3, mut rx3) = channel();
        let probed = registry.accept(TransportKind::WebSocket, tx3);
        registry.authorize(probed.id(), 9, false).unwrap();
        probed
            .last_active
            .store(now_seconds() - 200, Ordering::Release);

        registry.sweep().await;

        assert!(registry.get(expired.id()).is_none());
        assert!(registry.get(zombie.id()).is_none());
        assert!(registry.get(probed.id()).is_some());
        assert!(rx3.try_recv().is_ok());
    }

    #[tokio::test]
    async fn backpressure_is_reported_when_buffer_fills() {
        let registry = registry().await;
        let (tx, _rx) = channel();
        let session = registry.accept(TransportKind::WebSocket, tx);
        for _ in 0..4 {
            assert_eq!(
                registry.send(session.id(), ServerFrame::pong()),
                SendOutcome::Sent
            );
        }
        assert_eq!(
            registry.send(session.id(), ServerFrame::pong()),
            SendOutcome::Backpressure
        );
    }
}
