//! Data layer
//!
//! Handles all persistence:
//! - SQLite relational store (sqlx)
//! - Embedded KV store (presence, caches, offline queues)

mod cache;
mod database;
mod models;

pub use cache::{
    KvStore, OfflineKind, email_verify_rate_key, friends_key, group_conversation_key,
    group_members_key, pair_key, personal_conversation_key, user_groups_key,
    verification_code_key,
};
pub use database::{Database, HandledRequest};
pub use models::*;
