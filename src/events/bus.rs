//! In-process event bus
//!
//! Append-only per-topic logs with consumer groups and committed offsets:
//! the same contract a broker-backed adapter would satisfy. `publish`
//! returns on local append; consumers start from the earliest uncommitted
//! offset and see at-least-once delivery — a handler that returns false
//! leaves its offset uncommitted and the record is redelivered.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, watch};
use uuid::Uuid;

use super::types::EventPayload;
use crate::error::AppError;

/// A consumed record
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub topic: String,
    /// Single node: always partition 0.
    pub partition: u32,
    pub offset: u64,
    /// Recipient (or group) id as a decimal string
    pub key: String,
    /// Unique id for idempotency keys
    pub event_id: String,
    /// JSON payload with `event_type`
    pub payload: String,
}

impl EventRecord {
    /// Decode the payload. Malformed records are a consumer bug surfaced as
    /// `None`; consumers skip and commit them.
    pub fn decode(&self) -> Option<EventPayload> {
        serde_json::from_str(&self.payload).ok()
    }
}

/// Handler invoked by a consumer loop.
///
/// Return true to commit the offset, false to leave it uncommitted for
/// redelivery. Handlers must be idempotent on `(event_id, recipient)`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, record: &EventRecord) -> bool;
}

struct TopicLog {
    records: VecDeque<EventRecord>,
    /// Offset of the first retained record
    base_offset: u64,
    next_offset: u64,
}

impl TopicLog {
    fn new() -> Self {
        Self {
            records: VecDeque::new(),
            base_offset: 0,
            next_offset: 0,
        }
    }
}

struct BusState {
    topics: HashMap<String, TopicLog>,
    /// Committed offset per (group, topic): the next offset to consume
    commits: HashMap<(String, String), u64>,
}

struct BusInner {
    state: Mutex<BusState>,
    notify: Notify,
    retention: usize,
    shutdown: watch::Receiver<bool>,
}

/// In-process event bus
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(retention: usize, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState {
                    topics: HashMap::new(),
                    commits: HashMap::new(),
                }),
                notify: Notify::new(),
                retention: retention.max(1),
                shutdown,
            }),
        }
    }

    /// Append an event. Returns once the record is in the local log.
    pub fn publish(&self, topic: &str, key: &str, payload: &EventPayload) -> Result<(), AppError> {
        let payload_json =
            serde_json::to_string(payload).map_err(|e| AppError::EventBus(e.to_string()))?;

        {
            let mut state = self.inner.state.lock().expect("event bus lock poisoned");
            let log = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(TopicLog::new);
            let record = EventRecord {
                topic: topic.to_string(),
                partition: 0,
                offset: log.next_offset,
                key: key.to_string(),
                event_id: Uuid::new_v4().to_string(),
                payload: payload_json,
            };
            log.next_offset += 1;
            log.records.push_back(record);
            while log.records.len() > self.inner.retention {
                log.records.pop_front();
                log.base_offset += 1;
            }
        }

        use crate::metrics::EVENTS_PUBLISHED_TOTAL;
        EVENTS_PUBLISHED_TOTAL.with_label_values(&[topic]).inc();
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Records for `group` on `topic` past its committed offset.
    fn fetch(&self, group: &str, topic: &str, max: usize) -> Vec<EventRecord> {
        let state = self.inner.state.lock().expect("event bus lock poisoned");
        let Some(log) = state.topics.get(topic) else {
            return Vec::new();
        };
        let committed = state
            .commits
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
            .max(log.base_offset);
        let skip = (committed - log.base_offset) as usize;
        log.records.iter().skip(skip).take(max).cloned().collect()
    }

    fn commit(&self, group: &str, topic: &str, offset: u64) {
        let mut state = self.inner.state.lock().expect("event bus lock poisoned");
        let entry = state
            .commits
            .entry((group.to_string(), topic.to_string()))
            .or_insert(0);
        if offset + 1 > *entry {
            *entry = offset + 1;
        }
    }

    /// Run a consumer loop for `group` over `topics`, invoking `handler` for
    /// each record in order. Returns the task handle so the subscription can
    /// be torn down and re-created.
    pub fn subscribe(
        &self,
        topic_set: Vec<String>,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> tokio::task::JoinHandle<()> {
        let bus = self.clone();
        let group = group.to_string();
        let mut shutdown = self.inner.shutdown.clone();

        tokio::spawn(async move {
            tracing::info!(group = %group, topics = ?topic_set, "Event consumer started");
            loop {
                if *shutdown.borrow() {
                    break;
                }

                let mut stalled = false;
                for topic in &topic_set {
                    for record in bus.fetch(&group, topic, 64) {
                        if handler.handle(&record).await {
                            bus.commit(&group, topic, record.offset);
                            use crate::metrics::EVENTS_CONSUMED_TOTAL;
                            EVENTS_CONSUMED_TOTAL
                                .with_label_values(&[topic.as_str(), group.as_str()])
                                .inc();
                        } else {
                            tracing::warn!(
                                group = %group,
                                topic = %topic,
                                offset = record.offset,
                                "Handler declined commit, record will be redelivered"
                            );
                            stalled = true;
                            break;
                        }
                    }
                }

                if stalled {
                    // Back off before redelivering the uncommitted record.
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }

                tokio::select! {
                    _ = bus.inner.notify.notified() => {}
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = shutdown.changed() => {}
                }
            }
            tracing::info!(group = %group, "Event consumer stopped");
        })
    }
}
