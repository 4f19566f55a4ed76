//! Authentication
//!
//! Bearer tokens signed with HMAC-SHA256 and axum extractors for
//! authenticated handlers.

mod middleware;
mod token;

pub use middleware::{AdminUser, CurrentUser};
pub use token::{AuthClaims, create_token, verify_token};
