//! API layer
//!
//! HTTP and WebSocket handlers:
//! - REST endpoints per domain (users, messages, relations, groups, files,
//!   notifications)
//! - `/ws` real-time frontend
//! - Admin API
//! - Metrics (Prometheus)

mod admin;
mod files;
mod groups;
mod messages;
pub mod metrics;
mod notifications;
mod relations;
mod users;
mod ws;

pub use admin::admin_router;
pub use files::files_router;
pub use groups::groups_router;
pub use messages::messages_router;
pub use metrics::metrics_router;
pub use notifications::notifications_router;
pub use relations::relations_router;
pub use users::users_router;
pub use ws::ws_handler;
