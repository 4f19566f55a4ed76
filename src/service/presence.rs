//! Presence service
//!
//! Owns the per-user online marker and last-seen timestamp in the KV store
//! and publishes `presence_change` events on the first session of a user and
//! the removal of the last one. Flaps inside the debounce window collapse to
//! a single fanout: the leading transition publishes immediately, a trailing
//! check publishes once more only if the settled state differs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::PresenceConfig;
use crate::data::KvStore;
use crate::events::{EventBus, EventPayload, topics};

#[derive(Default)]
struct FlapState {
    /// Last state actually published
    published_online: bool,
    /// State the user has settled on
    desired_online: bool,
    /// A trailing debounce task is pending
    window_open: bool,
}

struct PresenceInner {
    config: PresenceConfig,
    kv: Arc<KvStore>,
    bus: Arc<EventBus>,
    flaps: Mutex<HashMap<i64, FlapState>>,
}

impl PresenceInner {
    fn publish(&self, user_id: i64, online: bool) {
        let status = if online { "online" } else { "offline" };
        let payload = EventPayload::PresenceChange {
            user_id,
            status: status.to_string(),
        };
        if let Err(error) = self
            .bus
            .publish(topics::SYSTEM_EVENTS, &user_id.to_string(), &payload)
        {
            tracing::warn!(%error, user_id, status, "Failed to publish presence change");
        }
    }
}

/// Presence tracking and fanout trigger
#[derive(Clone)]
pub struct PresenceService {
    inner: Arc<PresenceInner>,
}

impl PresenceService {
    pub fn new(config: PresenceConfig, kv: Arc<KvStore>, bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                config,
                kv,
                bus,
                flaps: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// First authorized session of a user: set the marker and fire the
    /// online transition.
    pub async fn session_opened(&self, user_id: i64) {
        self.refresh(user_id).await;
        self.transition(user_id, true);
    }

    /// Refresh the online marker TTL while any session exists.
    pub async fn refresh(&self, user_id: i64) {
        if let Err(error) = self
            .inner
            .kv
            .presence_mark_online(user_id, self.inner.config.marker_ttl_seconds)
            .await
        {
            tracing::warn!(%error, user_id, "Failed to refresh presence marker");
        }
    }

    /// Last session of a user removed: record last-seen, clear the marker
    /// and fire the offline transition.
    pub async fn session_closed(&self, user_id: i64) {
        let last_seen = crate::data::now_seconds();
        if let Err(error) = self.inner.kv.presence_mark_offline(user_id, last_seen).await {
            tracing::warn!(%error, user_id, "Failed to clear presence marker");
        }
        self.transition(user_id, false);
    }

    /// True iff the registry has a live session for the user or the KV
    /// marker is unexpired.
    pub async fn is_online(&self, user_id: i64, has_local_sessions: bool) -> bool {
        if has_local_sessions {
            return true;
        }
        self.inner
            .kv
            .presence_is_online(user_id)
            .await
            .unwrap_or(false)
    }

    pub async fn last_seen(&self, user_id: i64) -> Option<i64> {
        self.inner.kv.presence_last_seen(user_id).await.ok().flatten()
    }

    /// Store a client-reported free-form status (WS `status_update`).
    pub async fn set_status(&self, user_id: i64, status: &str) {
        if let Err(error) = self
            .inner
            .kv
            .presence_set_status(user_id, status, self.inner.config.marker_ttl_seconds)
            .await
        {
            tracing::warn!(%error, user_id, "Failed to store user status");
        }
    }

    /// Debounced state transition.
    fn transition(&self, user_id: i64, online: bool) {
        let window = self.inner.config.debounce_seconds;
        let publish_now;
        {
            let mut flaps = self.inner.flaps.lock().expect("presence lock poisoned");
            let entry = flaps.entry(user_id).or_default();
            entry.desired_online = online;
            if entry.window_open {
                // Coalesced: the trailing check settles it.
                return;
            }
            if entry.published_online == online {
                return;
            }
            entry.published_online = online;
            if window > 0 {
                entry.window_open = true;
            }
            publish_now = true;
        }

        if publish_now {
            self.inner.publish(user_id, online);
        }

        if window > 0 {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(window)).await;
                let settle;
                {
                    let mut flaps = inner.flaps.lock().expect("presence lock poisoned");
                    let entry = flaps.entry(user_id).or_default();
                    entry.window_open = false;
                    if entry.desired_online != entry.published_online {
                        entry.published_online = entry.desired_online;
                        settle = Some(entry.desired_online);
                    } else {
                        settle = None;
                    }
                }
                if let Some(online) = settle {
                    inner.publish(user_id, online);
                }
            });
        }
    }
}
