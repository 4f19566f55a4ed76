//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Session metrics
    pub static ref SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "ferrochat_sessions_active",
        "Current number of live sessions"
    ).expect("metric can be created");
    pub static ref USERS_ONLINE: IntGauge = IntGauge::new(
        "ferrochat_users_online",
        "Current number of users with at least one live session"
    ).expect("metric can be created");
    pub static ref SESSIONS_EVICTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_sessions_evicted_total", "Sessions removed by the sweeper"),
        &["reason"]
    ).expect("metric can be created");

    // Delivery metrics
    pub static ref MESSAGES_SUBMITTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_messages_submitted_total", "Messages accepted by the delivery engine"),
        &["chat_type", "kind"]
    ).expect("metric can be created");
    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_messages_delivered_total", "Per-recipient delivery outcomes"),
        &["path"]
    ).expect("metric can be created");
    pub static ref WS_FRAMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_ws_frames_total", "WebSocket frames processed"),
        &["direction", "frame_type"]
    ).expect("metric can be created");

    // Event bus metrics
    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_events_published_total", "Events appended to the bus"),
        &["topic"]
    ).expect("metric can be created");
    pub static ref EVENTS_CONSUMED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_events_consumed_total", "Events handled by consumer loops"),
        &["topic", "group"]
    ).expect("metric can be created");

    // Cache metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref OFFLINE_QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ferrochat_offline_queue_depth", "Offline envelopes currently queued"),
        &["kind"]
    ).expect("metric can be created");

    // Error metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ferrochat_errors_total", "Total number of errors"),
        &["kind"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(SESSIONS_ACTIVE.clone()))
        .expect("SESSIONS_ACTIVE can be registered");
    REGISTRY
        .register(Box::new(USERS_ONLINE.clone()))
        .expect("USERS_ONLINE can be registered");
    REGISTRY
        .register(Box::new(SESSIONS_EVICTED_TOTAL.clone()))
        .expect("SESSIONS_EVICTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MESSAGES_SUBMITTED_TOTAL.clone()))
        .expect("MESSAGES_SUBMITTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MESSAGES_DELIVERED_TOTAL.clone()))
        .expect("MESSAGES_DELIVERED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(WS_FRAMES_TOTAL.clone()))
        .expect("WS_FRAMES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(EVENTS_PUBLISHED_TOTAL.clone()))
        .expect("EVENTS_PUBLISHED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(EVENTS_CONSUMED_TOTAL.clone()))
        .expect("EVENTS_CONSUMED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(OFFLINE_QUEUE_DEPTH.clone()))
        .expect("OFFLINE_QUEUE_DEPTH can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
